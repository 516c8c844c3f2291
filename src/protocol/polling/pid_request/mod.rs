//! One polled OBD-II parameter: configuration, request/response state
//! machine, and fan-out of completed replies to consumers.
//!
//! A request cycles forever between two states:
//!
//! ```text
//!          try_start (interval elapsed)
//!   Idle ───────────────────────────────▶ AwaitingReply
//!    ▲                                         │
//!    └──── advance (timeout elapsed) ──────────┘
//!          dispatch if reply_length reached
//! ```
//!
//! Inbound frames are only buffered while `AwaitingReply`; the first frame of
//! a segmented reply triggers one flow-control frame. Consecutive-frame
//! sequence numbers are not checked: raw bytes accumulate until the timeout.
use embassy_time::{Duration, Instant};

use crate::core::{
    ResponseBytes, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REPLY_LENGTH, DEFAULT_RESPONSE_TIMEOUT_MS,
    MAX_RESPONSE_BYTES,
};
use crate::error::{RegistrationError, RequestConfigError};
use crate::protocol::consumers::PidConsumer;
use crate::protocol::transport::{
    can_id::CanId,
    obd_frame::{is_first_frame, pid_query_payload, send_padded, FLOW_CONTROL_PAYLOAD, MAX_PID},
    traits::frame_sink::FrameSink,
};

//==================================================================================Constants
/// Trigger slots per request.
pub const MAX_TRIGGERS: usize = 4;
/// Sensor slots per request.
pub const MAX_SENSORS: usize = 4;

//==================================================================================Enums
/// Polling state of a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestState {
    /// Not polling; eligible for the next `try_start`.
    Idle,
    /// Query sent, collecting reply bytes until the timeout.
    AwaitingReply,
}

/// Result of [`PidRequest::advance`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollOutcome {
    /// Timeout not reached yet; the request stays active.
    Pending,
    /// Reply complete; every consumer received the payload.
    Completed,
    /// Fewer than `reply_length` bytes arrived. No consumer was called.
    TimedOut,
    /// `advance` was called on an idle request. Treated as finished.
    NotPolling,
}

impl PollOutcome {
    /// `true` once the request released the bus.
    pub fn is_done(&self) -> bool {
        !matches!(self, PollOutcome::Pending)
    }
}

//==================================================================================Configuration
/// Validated static configuration of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidRequestConfig {
    request_id: CanId,
    response_id: CanId,
    pid: u32,
    interval: Duration,
    timeout: Duration,
    reply_length: usize,
}

impl PidRequestConfig {
    /// Start a configuration for `pid`, queried on `request_id`.
    pub fn builder(request_id: u32, pid: u32) -> PidRequestConfigBuilder {
        PidRequestConfigBuilder::new(request_id, pid)
    }

    /// Identifier used to send queries.
    pub fn request_id(&self) -> CanId {
        self.request_id
    }

    /// Identifier expected on replies.
    pub fn response_id(&self) -> CanId {
        self.response_id
    }

    /// Parameter identifier (up to 24 bits).
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Minimum time between two polls.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum wait for a complete reply.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Byte count marking a reply as complete.
    pub fn reply_length(&self) -> usize {
        self.reply_length
    }
}

/// Builder applying the defaults of an unconfigured request:
/// 5 s interval, 500 ms timeout, 8-byte reply, response id = request id | 0x08.
#[derive(Debug, Clone, Copy)]
pub struct PidRequestConfigBuilder {
    request_id: u32,
    response_id: Option<u32>,
    extended_id: bool,
    pid: u32,
    interval_ms: u32,
    timeout_ms: u32,
    reply_length: usize,
}

impl PidRequestConfigBuilder {
    /// Builder for `pid` on `request_id` with every other field at its default.
    pub fn new(request_id: u32, pid: u32) -> Self {
        Self {
            request_id,
            response_id: None,
            extended_id: false,
            pid,
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            reply_length: DEFAULT_REPLY_LENGTH,
        }
    }

    /// Explicit reply identifier.
    pub fn response_id(mut self, response_id: u32) -> Self {
        self.response_id = Some(response_id);
        self
    }

    /// Use 29-bit identifiers for both query and reply.
    pub fn extended_id(mut self, extended: bool) -> Self {
        self.extended_id = extended;
        self
    }

    /// Minimum delay between two queries.
    pub fn interval_ms(mut self, interval_ms: u32) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Time allowed for the reply once the query went out.
    pub fn timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Bytes required for the reply to be dispatched.
    pub fn reply_length(mut self, reply_length: usize) -> Self {
        self.reply_length = reply_length;
        self
    }

    /// Validate identifiers, PID width, reply length and durations.
    pub fn build(self) -> Result<PidRequestConfig, RequestConfigError> {
        let request_id = CanId::new(self.request_id, self.extended_id)?;
        let response_id = match self.response_id {
            Some(raw) => CanId::new(raw, self.extended_id)?,
            None => request_id.default_response(),
        };

        if self.pid > MAX_PID {
            return Err(RequestConfigError::PidOutOfRange { pid: self.pid });
        }
        if self.reply_length == 0 || self.reply_length > MAX_RESPONSE_BYTES {
            return Err(RequestConfigError::InvalidReplyLength {
                len: self.reply_length,
                max: MAX_RESPONSE_BYTES,
            });
        }
        if self.interval_ms == 0 {
            return Err(RequestConfigError::ZeroDuration { field: "interval" });
        }
        if self.timeout_ms == 0 {
            return Err(RequestConfigError::ZeroDuration { field: "timeout" });
        }

        Ok(PidRequestConfig {
            request_id,
            response_id,
            pid: self.pid,
            interval: Duration::from_millis(self.interval_ms as u64),
            timeout: Duration::from_millis(self.timeout_ms as u64),
            reply_length: self.reply_length,
        })
    }
}

//==================================================================================PID_REQUEST
/// A configured PID together with its polling state and consumers.
pub struct PidRequest<'a> {
    config: PidRequestConfig,
    state: RequestState,
    /// `None` until the first poll, so the first `try_start` is always eligible.
    last_polled: Option<Instant>,
    response: ResponseBytes,
    triggers: [Option<&'a mut dyn PidConsumer>; MAX_TRIGGERS],
    sensors: [Option<&'a mut dyn PidConsumer>; MAX_SENSORS],
}

impl<'a> PidRequest<'a> {
    pub fn new(config: PidRequestConfig) -> Self {
        Self {
            config,
            state: RequestState::Idle,
            last_polled: None,
            response: ResponseBytes::new(),
            triggers: core::array::from_fn(|_| None),
            sensors: core::array::from_fn(|_| None),
        }
    }

    //==================================================================================Setup
    /// Register a consumer receiving the raw payload. Triggers run before sensors.
    pub fn add_trigger(
        &mut self,
        trigger: &'a mut dyn PidConsumer,
    ) -> Result<(), RegistrationError> {
        store_consumer(&mut self.triggers, trigger)
    }

    /// Register a consumer decoding and publishing a value.
    pub fn add_sensor(
        &mut self,
        sensor: &'a mut dyn PidConsumer,
    ) -> Result<(), RegistrationError> {
        store_consumer(&mut self.sensors, sensor)
    }

    //==================================================================================Accessors
    pub fn config(&self) -> &PidRequestConfig {
        &self.config
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn pid(&self) -> u32 {
        self.config.pid
    }

    pub fn request_id(&self) -> CanId {
        self.config.request_id
    }

    pub fn response_id(&self) -> CanId {
        self.config.response_id
    }

    /// Time of the last query sent, if any.
    pub fn last_polled(&self) -> Option<Instant> {
        self.last_polled
    }

    /// Bytes gathered during the current (or last) polling cycle.
    pub fn response(&self) -> &ResponseBytes {
        &self.response
    }

    //==============================================================================State machine
    /// Send the PID query if the request is idle and its interval has elapsed.
    ///
    /// Returns `true` when the query went out: the caller must treat this request
    /// as the active one. A refused frame still starts the cycle, which then ends
    /// through the normal timeout.
    pub fn try_start<S: FrameSink + ?Sized>(&mut self, now: Instant, sink: &mut S) -> bool {
        if self.state != RequestState::Idle {
            return false;
        }
        if let Some(last) = self.last_polled {
            if now.saturating_duration_since(last) < self.config.interval {
                return false;
            }
        }

        self.response.clear();

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Polling can_id {:#x} for pid {:#x}",
            self.config.request_id.raw(),
            self.config.pid
        );

        send_padded(
            sink,
            self.config.request_id,
            &pid_query_payload(self.config.pid),
        )
        .ok();

        self.last_polled = Some(now);
        self.state = RequestState::AwaitingReply;
        true
    }

    /// Check the response deadline of an active request.
    ///
    /// Once `timeout` has elapsed since the query, the cycle ends: consumers are
    /// called if at least `reply_length` bytes were buffered, otherwise the
    /// cycle is dropped. Either way the request returns to `Idle`.
    pub fn advance(&mut self, now: Instant) -> PollOutcome {
        if self.state != RequestState::AwaitingReply {
            return PollOutcome::NotPolling;
        }
        // AwaitingReply is only entered through try_start, which sets last_polled.
        let Some(last) = self.last_polled else {
            self.state = RequestState::Idle;
            return PollOutcome::NotPolling;
        };
        if now.saturating_duration_since(last) < self.config.timeout {
            return PollOutcome::Pending;
        }

        self.state = RequestState::Idle;

        if self.response.len() < self.config.reply_length {
            #[cfg(feature = "defmt")]
            defmt::debug!(
                "Timeout polling can_id {:#x} for pid {:#x}: {}/{} bytes",
                self.config.request_id.raw(),
                self.config.pid,
                self.response.len(),
                self.config.reply_length
            );
            return PollOutcome::TimedOut;
        }

        self.dispatch();
        PollOutcome::Completed
    }

    /// Buffer an inbound frame while awaiting a reply; ignored otherwise.
    ///
    /// A first frame of a segmented reply is answered with one flow-control
    /// frame before its bytes are appended.
    pub fn handle_incoming<S: FrameSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) {
        if self.state != RequestState::AwaitingReply {
            // Another request sharing this response id may own the frame.
            return;
        }

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Received content for pid {:#x}: {:x}",
            self.config.pid,
            data
        );

        if is_first_frame(data) {
            #[cfg(feature = "defmt")]
            defmt::trace!("First frame for pid {:#x}, sending flow control", self.config.pid);
            send_padded(sink, self.config.request_id, &FLOW_CONTROL_PAYLOAD).ok();
        }

        let stored = self.response.extend_from_slice(data);
        if stored < data.len() {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "Response buffer full for pid {:#x}, dropped {} bytes",
                self.config.pid,
                data.len() - stored
            );
        }
    }

    /// Triggers first, then sensors, each in registration order.
    fn dispatch(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::trace!(
            "Dispatching {} bytes for pid {:#x}",
            self.response.len(),
            self.config.pid
        );

        let data = self.response.as_slice();
        for trigger in self.triggers.iter_mut().flatten() {
            trigger.deliver(data);
        }
        for sensor in self.sensors.iter_mut().flatten() {
            sensor.deliver(data);
        }
    }
}

/// Put `consumer` in the first free slot.
fn store_consumer<'a>(
    slots: &mut [Option<&'a mut dyn PidConsumer>],
    consumer: &'a mut dyn PidConsumer,
) -> Result<(), RegistrationError> {
    let capacity = slots.len();
    match slots.iter_mut().find(|slot| slot.is_none()) {
        Some(slot) => {
            *slot = Some(consumer);
            Ok(())
        }
        None => Err(RegistrationError::ConsumerSlotsFull { capacity }),
    }
}
