//! Supervisor scenarios against a simulated ECU on a mock bus, with tokio's
//! paused clock driving both the tick and response timeouts.
mod helpers;

use std::cell::RefCell;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embassy_sync::channel::Channel;
use helpers::{ecu_frame, MockCanBus, MockTimer};
use korri_obd::error::PollerRunError;
use korri_obd::protocol::consumers::{IndexedValue, Sensor};
use korri_obd::protocol::polling::pid_request::{PidRequest, PidRequestConfig};
use korri_obd::protocol::polling::supervisor::{PollerCommand, PollerConfig, PollerService};
use korri_obd::protocol::transport::can_frame::CanFrame;
use korri_obd::protocol::transport::traits::can_bus::CanBus;
use static_cell::StaticCell;
use tokio::time::{sleep, timeout, Duration};

static COMMAND_CHANNEL: StaticCell<Channel<CriticalSectionRawMutex, PollerCommand, 4>> =
    StaticCell::new();

fn armed() -> PollerConfig {
    PollerConfig {
        enabled_by_default: true,
        update_interval_ms: 100,
    }
}

fn rpm_config() -> PidRequestConfig {
    PidRequestConfig::builder(0x7DF, 0x010C)
        .response_id(0x7E8)
        .reply_length(4)
        .timeout_ms(500)
        .interval_ms(1000)
        .build()
        .expect("valid rpm config")
}

#[tokio::test(start_paused = true)]
/// Query, single-frame reply, dispatch at the timeout, new query after the interval.
async fn rpm_cycle_end_to_end() {
    let rpm_values = RefCell::new(Vec::new());
    let mut rpm_sensor = Sensor::new(IndexedValue::new(&[3, 4], false).unwrap(), |raw: f32| {
        rpm_values.borrow_mut().push(raw / 4.0)
    });
    let mut rpm = PidRequest::new(rpm_config());
    rpm.add_sensor(&mut rpm_sensor).unwrap();

    let tx_channel = Channel::<NoopRawMutex, CanFrame, 8>::new();
    let mut service = PollerService::<NoopRawMutex, 4, 8, 1>::new(armed(), &tx_channel, None);
    service.add_request(rpm).unwrap();
    let parts = service.into_parts();
    assert!(parts.handle.is_none());

    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let runner_future = parts.runner.drive(dut_bus, MockTimer::new());
    tokio::pin!(runner_future);
    let started = tokio::time::Instant::now();

    tokio::select! {
        result = &mut runner_future => {
            panic!("poller ended unexpectedly: {:?}", result);
        }
        _ = async {
            let query = host_bus.recv().await.expect("query expected");
            assert_eq!(query.id.raw(), 0x7DF);
            assert!(!query.id.is_extended());
            assert_eq!(query.data, [0x02, 0x01, 0x0C, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA]);

            host_bus
                .send(&ecu_frame(0x7E8, &[0x04, 0x41, 0x0C, 0x1A, 0xF8]))
                .await
                .unwrap();

            // Nothing is published before the timeout closes the cycle.
            sleep(Duration::from_millis(300)).await;
            assert!(rpm_values.borrow().is_empty());

            sleep(Duration::from_millis(300)).await;
            assert_eq!(*rpm_values.borrow(), [1726.0]);

            let second = host_bus.recv().await.expect("second query expected");
            assert_eq!(second.data[2], 0x0C);
            assert!(started.elapsed() >= Duration::from_millis(1000));
        } => {}
    }
}

#[tokio::test(start_paused = true)]
/// A silent ECU produces no dispatch; the PID is asked again once due.
async fn no_reply_times_out_and_repolls() {
    let dispatched = RefCell::new(0usize);
    let mut trigger = |_: &[u8]| *dispatched.borrow_mut() += 1;
    let mut rpm = PidRequest::new(rpm_config());
    rpm.add_trigger(&mut trigger).unwrap();

    let tx_channel = Channel::<NoopRawMutex, CanFrame, 8>::new();
    let mut service = PollerService::<NoopRawMutex, 4, 8, 1>::new(armed(), &tx_channel, None);
    service.add_request(rpm).unwrap();
    let parts = service.into_parts();

    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let runner_future = parts.runner.drive(dut_bus, MockTimer::new());
    tokio::pin!(runner_future);
    let started = tokio::time::Instant::now();

    tokio::select! {
        result = &mut runner_future => {
            panic!("poller ended unexpectedly: {:?}", result);
        }
        _ = async {
            host_bus.recv().await.expect("first query expected");
            host_bus.recv().await.expect("second query expected");
            let elapsed = started.elapsed();
            assert!(elapsed >= Duration::from_millis(1000));
            assert!(elapsed < Duration::from_millis(1200));
            assert_eq!(*dispatched.borrow(), 0);
        } => {}
    }
}

#[tokio::test(start_paused = true)]
/// Multi-frame VIN reply: flow control goes out on the request id after the
/// first frame and the trigger receives every frame, headers included.
async fn vin_reply_uses_flow_control() {
    let vin_bytes = RefCell::new(Vec::new());
    let mut trigger = |data: &[u8]| vin_bytes.borrow_mut().extend_from_slice(data);
    let vin_config = PidRequestConfig::builder(0x7E0, 0x0902)
        .reply_length(20)
        .timeout_ms(500)
        .interval_ms(60_000)
        .build()
        .unwrap();
    let mut vin = PidRequest::new(vin_config);
    vin.add_trigger(&mut trigger).unwrap();

    let tx_channel = Channel::<NoopRawMutex, CanFrame, 8>::new();
    let mut service = PollerService::<NoopRawMutex, 4, 8, 1>::new(armed(), &tx_channel, None);
    service.add_request(vin).unwrap();
    let parts = service.into_parts();

    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let runner_future = parts.runner.drive(dut_bus, MockTimer::new());
    tokio::pin!(runner_future);

    tokio::select! {
        result = &mut runner_future => {
            panic!("poller ended unexpectedly: {:?}", result);
        }
        _ = async {
            let query = host_bus.recv().await.expect("query expected");
            assert_eq!(query.id.raw(), 0x7E0);
            assert_eq!(query.data, [0x02, 0x09, 0x02, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA]);

            host_bus
                .send(&ecu_frame(0x7E8, &[0x10, 0x14, 0x49, 0x02, 0x01, b'1', b'G', b'1']))
                .await
                .unwrap();

            let flow_control = host_bus.recv().await.expect("flow control expected");
            assert_eq!(flow_control.id.raw(), 0x7E0);
            assert_eq!(flow_control.data, [0x30, 0x00, 0x10, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA]);

            let mut first = [0x21u8; 8];
            first[1..].copy_from_slice(b"JC5444R");
            host_bus.send(&ecu_frame(0x7E8, &first)).await.unwrap();
            let mut second = [0x22u8; 8];
            second[1..].copy_from_slice(b"7252367");
            host_bus.send(&ecu_frame(0x7E8, &second)).await.unwrap();

            sleep(Duration::from_millis(600)).await;
            let bytes = vin_bytes.borrow();
            assert_eq!(bytes.len(), 24);
            assert_eq!(bytes[0], 0x10);
            let vin: Vec<u8> = bytes[5..8]
                .iter()
                .chain(&bytes[9..16])
                .chain(&bytes[17..24])
                .copied()
                .collect();
            assert_eq!(vin, b"1G1JC5444R7252367");
        } => {}
    }
}

#[tokio::test(start_paused = true)]
/// Replies from another ECU sharing the bus never reach the consumers.
async fn foreign_frames_are_discarded() {
    let rpm_values = RefCell::new(Vec::new());
    let mut rpm_sensor = Sensor::new(IndexedValue::new(&[3, 4], false).unwrap(), |raw: f32| {
        rpm_values.borrow_mut().push(raw / 4.0)
    });
    let mut rpm = PidRequest::new(rpm_config());
    rpm.add_sensor(&mut rpm_sensor).unwrap();

    let tx_channel = Channel::<NoopRawMutex, CanFrame, 8>::new();
    let mut service = PollerService::<NoopRawMutex, 4, 8, 1>::new(armed(), &tx_channel, None);
    service.add_request(rpm).unwrap();
    let parts = service.into_parts();

    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let runner_future = parts.runner.drive(dut_bus, MockTimer::new());
    tokio::pin!(runner_future);

    tokio::select! {
        result = &mut runner_future => {
            panic!("poller ended unexpectedly: {:?}", result);
        }
        _ = async {
            host_bus.recv().await.expect("query expected");
            host_bus
                .send(&ecu_frame(0x7E9, &[0x04, 0x41, 0x0C, 0x00, 0x00]))
                .await
                .unwrap();
            host_bus
                .send(&ecu_frame(0x7E8, &[0x04, 0x41, 0x0C, 0x0F, 0xA0]))
                .await
                .unwrap();

            sleep(Duration::from_millis(600)).await;
            assert_eq!(*rpm_values.borrow(), [1000.0]);
        } => {}
    }
}

#[tokio::test(start_paused = true)]
/// A disarmed poller stays silent until started and stops querying once stopped.
async fn start_and_stop_commands() {
    let command_channel = COMMAND_CHANNEL.init(Channel::new());
    let tx_channel = Channel::<CriticalSectionRawMutex, CanFrame, 8>::new();

    let mut service = PollerService::<CriticalSectionRawMutex, 4, 8, 4>::new(
        PollerConfig {
            enabled_by_default: false,
            update_interval_ms: 100,
        },
        &tx_channel,
        Some(&*command_channel),
    );
    service
        .add_request(PidRequest::new(rpm_config()))
        .unwrap();
    let parts = service.into_parts();
    let handle = parts
        .handle
        .expect("handle must exist when command channel is provided");

    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let runner_future = parts.runner.drive(dut_bus, MockTimer::new());
    tokio::pin!(runner_future);

    tokio::select! {
        result = &mut runner_future => {
            panic!("poller ended unexpectedly: {:?}", result);
        }
        _ = async {
            let silent = timeout(Duration::from_millis(2000), host_bus.recv()).await;
            assert!(silent.is_err(), "disarmed poller must not query");

            handle.start().await;
            let query = host_bus.recv().await.expect("query expected after start");
            assert_eq!(query.data[2], 0x0C);

            handle.stop().await;
            let silent = timeout(Duration::from_millis(3000), host_bus.recv()).await;
            assert!(silent.is_err(), "stopped poller must not query");
        } => {}
    }
}

#[tokio::test(start_paused = true)]
/// Losing the bus ends the runner with a receive error.
async fn closed_bus_stops_runner() {
    let tx_channel = Channel::<NoopRawMutex, CanFrame, 8>::new();
    let service = PollerService::<NoopRawMutex, 4, 8, 1>::new(
        PollerConfig::default(),
        &tx_channel,
        None,
    );
    let parts = service.into_parts();

    let (dut_bus, host_bus) = MockCanBus::create_pair();
    drop(host_bus);

    let result = parts.runner.drive(dut_bus, MockTimer::new()).await;
    assert!(matches!(result, Err(PollerRunError::Receive(()))));
}

static RESTART_COMMAND_CHANNEL: StaticCell<Channel<CriticalSectionRawMutex, PollerCommand, 4>> =
    StaticCell::new();

#[tokio::test(start_paused = true)]
/// Stopping mid-cycle freezes the request: a reply received while stopped is
/// buffered and only dispatched on the first tick after the restart.
async fn reply_during_stop_dispatched_after_restart() {
    let rpm_values = RefCell::new(Vec::new());
    let mut rpm_sensor = Sensor::new(IndexedValue::new(&[3, 4], false).unwrap(), |raw: f32| {
        rpm_values.borrow_mut().push(raw / 4.0)
    });
    let mut rpm = PidRequest::new(rpm_config());
    rpm.add_sensor(&mut rpm_sensor).unwrap();

    let command_channel = RESTART_COMMAND_CHANNEL.init(Channel::new());
    let tx_channel = Channel::<CriticalSectionRawMutex, CanFrame, 8>::new();
    let mut service = PollerService::<CriticalSectionRawMutex, 4, 8, 4>::new(
        PollerConfig {
            enabled_by_default: false,
            update_interval_ms: 100,
        },
        &tx_channel,
        Some(&*command_channel),
    );
    service.add_request(rpm).unwrap();
    assert_eq!(service.scheduler().len(), 1);
    assert!(!service.scheduler().is_polling());
    let parts = service.into_parts();
    let handle = parts
        .handle
        .expect("handle must exist when command channel is provided");

    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let runner_future = parts.runner.drive(dut_bus, MockTimer::new());
    tokio::pin!(runner_future);

    tokio::select! {
        result = &mut runner_future => {
            panic!("poller ended unexpectedly: {:?}", result);
        }
        _ = async {
            handle.start().await;
            let query = host_bus.recv().await.expect("query expected after start");
            assert_eq!(query.data[2], 0x0C);

            handle.stop().await;
            host_bus
                .send(&ecu_frame(0x7E8, &[0x04, 0x41, 0x0C, 0x1A, 0xF8]))
                .await
                .unwrap();

            // Well past the 500 ms timeout, but no tick runs while stopped.
            sleep(Duration::from_millis(2000)).await;
            assert!(rpm_values.borrow().is_empty());

            handle.start().await;
            sleep(Duration::from_millis(150)).await;
            assert_eq!(*rpm_values.borrow(), [1726.0]);

            let next = host_bus.recv().await.expect("new query after restart");
            assert_eq!(next.data[2], 0x0C);
        } => {}
    }
}
