//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (CAN ID construction,
//! request configuration, registration, supervisor loop, etc.).
//!
//! Expected polling outcomes (timeouts, discarded frames) are not errors: they
//! are reported through `PollOutcome` and `TickEvent`.
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors that can occur while building a CAN identifier.
pub enum CanIdBuildError {
    /// The raw value does not fit an 11-bit (standard) or 29-bit (extended) identifier.
    #[error("CAN identifier {id:#x} out of range (extended: {extended})")]
    OutOfRange { id: u32, extended: bool },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while validating a PID request configuration.
pub enum RequestConfigError {
    /// Request or response identifier is invalid for the selected frame format.
    #[error("Invalid CAN id: {0}")]
    InvalidCanId(#[from] CanIdBuildError),
    /// PIDs are encoded on at most 24 bits.
    #[error("PID {pid:#x} does not fit in 24 bits")]
    PidOutOfRange { pid: u32 },
    /// Expected reply length must be non-zero and fit the response buffer.
    #[error("Invalid reply length {len} (max {max})")]
    InvalidReplyLength { len: usize, max: usize },
    /// Poll interval and response timeout must be strictly positive.
    #[error("Zero duration for {field}")]
    ZeroDuration { field: &'static str },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while wiring consumers and requests at setup time.
pub enum RegistrationError {
    /// Every request slot of the scheduler is taken.
    #[error("Scheduler full ({capacity} requests)")]
    SchedulerFull { capacity: usize },
    /// Every trigger or sensor slot of the request is taken.
    #[error("Consumer slots full ({capacity} per kind)")]
    ConsumerSlotsFull { capacity: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures of the channel-backed frame sink.
pub enum ChannelSinkError {
    /// The outbound queue had no room left; the frame was dropped.
    #[error("Outbound frame queue full")]
    QueueFull,
}

//==================================================================================RUN_ERROR
#[derive(Debug, Error)]
/// Errors ending the supervisor loop.
pub enum PollerRunError<E: core::fmt::Debug> {
    /// Unable to receive frames from the bus.
    #[error("CAN bus receive error: {0:?}")]
    Receive(E),
    /// CAN layer refused or failed to send a queued frame.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
}
