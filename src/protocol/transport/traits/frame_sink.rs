//! Synchronous, fire-and-forget frame output used by the scheduler.
//!
//! Ticks and inbound frames are processed without ever awaiting, so the
//! scheduler cannot talk to an async [`CanBus`](super::can_bus::CanBus)
//! directly. It writes into a [`FrameSink`] instead; [`ChannelSink`] queues the
//! frames so the supervisor loop can forward them to the bus.
use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Sender};

use crate::error::ChannelSinkError;
use crate::protocol::transport::can_frame::CanFrame;

/// Non-blocking frame transmission.
pub trait FrameSink {
    type Error: core::fmt::Debug;
    /// Hand a frame to the transceiver. Must not block.
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), Self::Error>;
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    type Error = S::Error;

    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        (**self).send_frame(frame)
    }
}

/// [`FrameSink`] backed by an `embassy-sync` channel.
pub struct ChannelSink<'a, M: RawMutex, const CAP: usize> {
    sender: Sender<'a, M, CanFrame, CAP>,
}

impl<'a, M: RawMutex, const CAP: usize> ChannelSink<'a, M, CAP> {
    pub fn new(sender: Sender<'a, M, CanFrame, CAP>) -> Self {
        Self { sender }
    }
}

impl<M: RawMutex, const CAP: usize> FrameSink for ChannelSink<'_, M, CAP> {
    type Error = ChannelSinkError;

    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        self.sender
            .try_send(frame.clone())
            .map_err(|_| ChannelSinkError::QueueFull)
    }
}
