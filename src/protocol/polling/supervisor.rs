//! Poller supervisor built on top of [`PidScheduler`].
//!
//! It serializes everything that touches the scheduler into one loop:
//!
//! * inbound frames from the [`CanBus`] are routed to the active request;
//! * a tick every `update_interval_ms` advances the polling state machine
//!   (only while the poller is armed);
//! * an optional command channel lets other tasks arm or disarm polling
//!   through a [`PollerHandle`].
//!
//! Frames emitted by the scheduler are queued on a pre-allocated
//! [`embassy_sync::Channel`] and forwarded to the bus after each event. No
//! allocation is performed by the library and there is no dependency on a
//! particular BSP.

use core::fmt::Debug;

use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel, Sender},
};
use embassy_time::{Duration, Instant};
use futures_util::{future::select, future::Either, pin_mut};

use crate::core::DEFAULT_UPDATE_INTERVAL_MS;
use crate::error::{PollerRunError, RegistrationError};
use crate::protocol::polling::pid_request::PidRequest;
use crate::protocol::polling::scheduler::{PidScheduler, RequestHandle};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::frame_sink::ChannelSink;
use crate::protocol::transport::traits::korri_timer::KorriTimer;

/// Scheduler type driven by the supervisor.
pub type ChannelScheduler<'a, M, const N: usize, const TX_CAP: usize> =
    PidScheduler<'a, ChannelSink<'a, M, TX_CAP>, N>;

/// Global poller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollerConfig {
    /// Arm the tick as soon as the runner starts; otherwise wait for
    /// [`PollerHandle::start`].
    pub enabled_by_default: bool,
    /// Delay between two scheduler ticks (ms).
    pub update_interval_ms: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled_by_default: false,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
        }
    }
}

/// Commands queued by producer tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollerCommand {
    /// Arm the periodic tick.
    Start,
    /// Disarm the periodic tick. Frames keep being routed.
    Stop,
}

/// Service assembling the supervisor components.
pub struct PollerService<
    'a,
    M: RawMutex,
    const N: usize,
    const TX_CAP: usize,
    const CMD_CAP: usize,
> {
    scheduler: ChannelScheduler<'a, M, N, TX_CAP>,
    config: PollerConfig,
    tx_channel: &'a Channel<M, CanFrame, TX_CAP>,
    command_channel: Option<&'a Channel<M, PollerCommand, CMD_CAP>>,
}

impl<'a, M, const N: usize, const TX_CAP: usize, const CMD_CAP: usize>
    PollerService<'a, M, N, TX_CAP, CMD_CAP>
where
    M: RawMutex,
{
    /// Build the service around an empty scheduler writing into `tx_channel`.
    pub fn new(
        config: PollerConfig,
        tx_channel: &'a Channel<M, CanFrame, TX_CAP>,
        command_channel: Option<&'a Channel<M, PollerCommand, CMD_CAP>>,
    ) -> Self {
        Self {
            scheduler: PidScheduler::new(ChannelSink::new(tx_channel.sender())),
            config,
            tx_channel,
            command_channel,
        }
    }

    /// Register a request with the underlying scheduler.
    pub fn add_request(
        &mut self,
        request: PidRequest<'a>,
    ) -> Result<RequestHandle, RegistrationError> {
        self.scheduler.add_request(request)
    }

    /// Scheduler holding the registered requests.
    pub fn scheduler(&self) -> &ChannelScheduler<'a, M, N, TX_CAP> {
        &self.scheduler
    }

    /// Split into handle/runner components.
    pub fn into_parts(self) -> PollerServiceParts<'a, M, N, TX_CAP, CMD_CAP> {
        let handle = self.command_channel.map(|channel| PollerHandle {
            sender: channel.sender(),
        });
        PollerServiceParts {
            handle,
            runner: PollerRunner {
                scheduler: self.scheduler,
                config: self.config,
                tx_channel: self.tx_channel,
                command_channel: self.command_channel,
            },
        }
    }
}

/// Bundle returned by [`PollerService::into_parts`].
pub struct PollerServiceParts<'a, M, const N: usize, const TX_CAP: usize, const CMD_CAP: usize>
where
    M: RawMutex,
{
    pub handle: Option<PollerHandle<'a, M, CMD_CAP>>,
    pub runner: PollerRunner<'a, M, N, TX_CAP, CMD_CAP>,
}

/// Runner that drives the supervisor loop.
pub struct PollerRunner<'a, M, const N: usize, const TX_CAP: usize, const CMD_CAP: usize>
where
    M: RawMutex,
{
    scheduler: ChannelScheduler<'a, M, N, TX_CAP>,
    config: PollerConfig,
    tx_channel: &'a Channel<M, CanFrame, TX_CAP>,
    command_channel: Option<&'a Channel<M, PollerCommand, CMD_CAP>>,
}

/// One wake-up of the supervisor loop.
enum LoopEvent<E> {
    Frame(Result<CanFrame, E>),
    Tick,
    Command(PollerCommand),
}

impl<'a, M, const N: usize, const TX_CAP: usize, const CMD_CAP: usize>
    PollerRunner<'a, M, N, TX_CAP, CMD_CAP>
where
    M: RawMutex,
{
    /// Run until the bus fails. Never returns `Ok`.
    pub async fn drive<C, T>(
        mut self,
        mut can_bus: C,
        mut timer: T,
    ) -> Result<(), PollerRunError<C::Error>>
    where
        C: CanBus,
        C::Error: Debug,
        T: KorriTimer,
    {
        let command_channel = self.command_channel;
        let update_interval = Duration::from_millis(self.config.update_interval_ms as u64);
        let mut armed = self.config.enabled_by_default;
        let mut next_tick: Instant = timer.now();

        #[cfg(feature = "defmt")]
        defmt::info!("Poller started, armed: {}", armed);

        loop {
            let wait_ms = next_tick
                .saturating_duration_since(timer.now())
                .as_millis()
                .min(u32::MAX as u64) as u32;

            let event = {
                let recv_future = can_bus.recv();
                let tick_future = timer.delay_ms(wait_ms);
                pin_mut!(recv_future);
                pin_mut!(tick_future);

                match command_channel {
                    Some(cmd_ch) => {
                        let cmd_future = cmd_ch.receive();
                        pin_mut!(cmd_future);

                        match select(recv_future, select(tick_future, cmd_future)).await {
                            Either::Left((result, _)) => LoopEvent::Frame(result),
                            Either::Right((Either::Left(_), _)) => LoopEvent::Tick,
                            Either::Right((Either::Right((command, _)), _)) => {
                                LoopEvent::Command(command)
                            }
                        }
                    }
                    None => match select(recv_future, tick_future).await {
                        Either::Left((result, _)) => LoopEvent::Frame(result),
                        Either::Right(_) => LoopEvent::Tick,
                    },
                }
            }; // bus and timer borrows end here

            match event {
                LoopEvent::Frame(Ok(frame)) => {
                    self.scheduler.on_frame(&frame);
                }
                LoopEvent::Frame(Err(err)) => return Err(PollerRunError::Receive(err)),
                LoopEvent::Tick => {
                    let now = timer.now();
                    if armed {
                        self.scheduler.tick(now);
                    }
                    next_tick = now + update_interval;
                }
                LoopEvent::Command(command) => {
                    armed = command == PollerCommand::Start;
                    #[cfg(feature = "defmt")]
                    defmt::info!("Poller command {}, armed: {}", command, armed);
                }
            }

            self.flush(&mut can_bus).await?;
        }
    }

    /// Forward every frame queued by the scheduler to the bus.
    async fn flush<C>(&mut self, can_bus: &mut C) -> Result<(), PollerRunError<C::Error>>
    where
        C: CanBus,
        C::Error: Debug,
    {
        while let Ok(frame) = self.tx_channel.try_receive() {
            can_bus.send(&frame).await.map_err(PollerRunError::Send)?;
        }
        Ok(())
    }
}

/// Command handle (optional).
pub struct PollerHandle<'a, M: RawMutex, const CMD_CAP: usize> {
    sender: Sender<'a, M, PollerCommand, CMD_CAP>,
}

impl<'a, M: RawMutex, const CMD_CAP: usize> PollerHandle<'a, M, CMD_CAP> {
    /// Arm the periodic tick.
    pub async fn start(&self) {
        self.sender.send(PollerCommand::Start).await;
    }

    /// Disarm the periodic tick; the active request, if any, resumes on restart.
    pub async fn stop(&self) {
        self.sender.send(PollerCommand::Stop).await;
    }
}
