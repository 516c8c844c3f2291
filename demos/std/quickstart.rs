//! # Quickstart Example
//!
//! Minimal example demonstrating the basics of korri-obd:
//! - Configure PID requests (engine RPM, coolant temperature, MIL status)
//! - Attach sensors decoding the replies
//! - Drive the scheduler by hand and feed it simulated ECU frames
//!
//! This example uses `std` and a synchronous sink that prints every frame.
//! On a target, the same scheduler runs inside `PollerRunner::drive`.
//!
//! ```bash
//! cargo run --example quickstart
//! ```

use embassy_time::Instant;
use korri_obd::protocol::consumers::{BinarySensor, IndexedValue, MaskedFlag, Sensor};
use korri_obd::protocol::polling::pid_request::{PidRequest, PidRequestConfig};
use korri_obd::protocol::polling::scheduler::{PidScheduler, TickEvent};
use korri_obd::protocol::transport::can_frame::CanFrame;
use korri_obd::protocol::transport::can_id::CanId;
use korri_obd::protocol::transport::traits::frame_sink::FrameSink;

/// Sink printing outbound frames instead of writing them to a transceiver.
struct PrintingSink;

impl FrameSink for PrintingSink {
    type Error = ();

    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ()> {
        print!("   -> TX {:#05x}: ", frame.id.raw());
        for byte in frame.payload() {
            print!("{:02X} ", byte);
        }
        println!();
        Ok(())
    }
}

/// Reply a simulated ECU would send for mode 01 `pid` (response id 0x7E8).
fn ecu_reply(pid: u8) -> Option<CanFrame> {
    let payload: &[u8] = match pid {
        0x0C => &[0x04, 0x41, 0x0C, 0x1A, 0xF8, 0xAA, 0xAA, 0xAA],
        0x05 => &[0x03, 0x41, 0x05, 0x7B, 0xAA, 0xAA, 0xAA, 0xAA],
        0x01 => &[0x06, 0x41, 0x01, 0x83, 0x07, 0x65, 0x04, 0xAA],
        _ => return None,
    };
    CanFrame::new(CanId::standard(0x7E8).ok()?, payload)
}

fn main() {
    println!("=== korri-obd Quickstart ===\n");

    // ======================================================================
    // 1. Sensors
    // ======================================================================
    println!("1. Attaching sensors");

    let mut rpm_sensor = Sensor::new(
        IndexedValue::new(&[3, 4], false).expect("two indexes"),
        |raw: f32| println!("   << engine speed: {:.0} rpm", raw / 4.0),
    );
    let mut coolant_sensor = Sensor::new(
        IndexedValue::new(&[3], false).expect("one index"),
        |raw: f32| println!("   << coolant: {:.0} °C", raw - 40.0),
    );
    let mut mil_sensor: BinarySensor<_> = Sensor::new(MaskedFlag::new(3, 0x80), |on: bool| {
        println!("   << check engine light: {}", if on { "ON" } else { "off" })
    });

    // ======================================================================
    // 2. Requests, in priority order
    // ======================================================================
    println!("2. Registering PID requests");

    let request = |pid: u32, reply_length: usize, interval_ms: u32| {
        PidRequestConfig::builder(0x7DF, pid)
            .response_id(0x7E8)
            .reply_length(reply_length)
            .interval_ms(interval_ms)
            .timeout_ms(200)
            .build()
            .expect("valid request")
    };

    let mut rpm = PidRequest::new(request(0x010C, 4, 1_000));
    rpm.add_sensor(&mut rpm_sensor).expect("free sensor slot");
    let mut coolant = PidRequest::new(request(0x0105, 3, 5_000));
    coolant.add_sensor(&mut coolant_sensor).expect("free sensor slot");
    let mut status = PidRequest::new(request(0x0101, 6, 10_000));
    status.add_sensor(&mut mil_sensor).expect("free sensor slot");

    let mut scheduler: PidScheduler<'_, _, 4> = PidScheduler::new(PrintingSink);
    for request in [rpm, coolant, status] {
        let pid = request.pid();
        let handle = scheduler.add_request(request).expect("free scheduler slot");
        println!("   PID {:#04x} -> slot {}", pid, handle.index());
    }
    println!();

    // ======================================================================
    // 3. Polling loop (100 ms tick, simulated time)
    // ======================================================================
    println!("3. Polling for 3 seconds\n");

    for ms in (0..3_000u64).step_by(100) {
        match scheduler.tick(Instant::from_millis(ms)) {
            TickEvent::Started(handle) => {
                println!("[{:>5} ms] query slot {}", ms, handle.index());
                let pid = scheduler
                    .request(handle)
                    .map(|request| request.pid() as u8)
                    .unwrap_or_default();
                if let Some(reply) = ecu_reply(pid) {
                    scheduler.on_frame(&reply);
                }
            }
            TickEvent::Finished(handle, outcome) => {
                println!("[{:>5} ms] slot {} finished: {:?}", ms, handle.index(), outcome);
            }
            TickEvent::Waiting(_) | TickEvent::Idle => {}
        }
    }

    println!("\n=== Done ===");
}
