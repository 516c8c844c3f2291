//! Arbitration between PID requests sharing one CAN transceiver.
//!
//! The scheduler keeps at most one request awaiting a reply. When idle, each
//! tick scans the requests in registration order and starts the first one whose
//! interval has elapsed (first-eligible-wins). An early request that is always
//! due therefore delays the ones registered after it; request counts are small
//! and the order doubles as a priority, so no fairness is applied.
use embassy_time::Instant;

use crate::error::RegistrationError;
use crate::protocol::polling::pid_request::{PidRequest, PollOutcome};
use crate::protocol::transport::{
    can_frame::CanFrame, can_id::CanId, obd_frame::send_padded, traits::frame_sink::FrameSink,
};

/// Position of a request inside its scheduler, returned at registration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequestHandle(usize);

impl RequestHandle {
    /// Registration index (0 = highest priority).
    pub fn index(&self) -> usize {
        self.0
    }
}

/// What a call to [`PidScheduler::tick`] did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickEvent {
    /// Nothing active and no request due.
    Idle,
    /// The request sent its query and is now active.
    Started(RequestHandle),
    /// The active request is still within its timeout.
    Waiting(RequestHandle),
    /// The active request finished; the next tick selects a new one.
    Finished(RequestHandle, PollOutcome),
}

/// Owner of up to `N` PID requests and of the injected frame sink.
pub struct PidScheduler<'a, S: FrameSink, const N: usize> {
    sink: S,
    requests: [Option<PidRequest<'a>>; N],
    count: usize,
    active: Option<RequestHandle>,
}

impl<'a, S: FrameSink, const N: usize> PidScheduler<'a, S, N> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            requests: core::array::from_fn(|_| None),
            count: 0,
            active: None,
        }
    }

    /// Append a request; registration order is polling priority.
    pub fn add_request(
        &mut self,
        request: PidRequest<'a>,
    ) -> Result<RequestHandle, RegistrationError> {
        let Some(slot) = self.requests.get_mut(self.count) else {
            return Err(RegistrationError::SchedulerFull { capacity: N });
        };

        #[cfg(feature = "defmt")]
        defmt::info!(
            "Add request for can_id {:#x}, pid {:#x}",
            request.request_id().raw(),
            request.pid()
        );

        *slot = Some(request);
        let handle = RequestHandle(self.count);
        self.count += 1;
        Ok(handle)
    }

    //==================================================================================Accessors
    /// Number of registered requests.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Request currently awaiting a reply.
    pub fn active(&self) -> Option<RequestHandle> {
        self.active
    }

    /// `true` while a request is awaiting a reply.
    pub fn is_polling(&self) -> bool {
        self.active.is_some()
    }

    pub fn request(&self, handle: RequestHandle) -> Option<&PidRequest<'a>> {
        self.requests.get(handle.0).and_then(Option::as_ref)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Direct access to the transport, e.g. to queue frames outside a polling cycle.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    //==================================================================================Tick
    /// Start the next eligible request, or advance the active one.
    pub fn tick(&mut self, now: Instant) -> TickEvent {
        match self.active {
            None => self.start_next(now),
            Some(handle) => {
                let outcome = match self.requests.get_mut(handle.0).and_then(Option::as_mut) {
                    Some(request) => request.advance(now),
                    None => PollOutcome::NotPolling,
                };
                if outcome.is_done() {
                    self.active = None;
                    TickEvent::Finished(handle, outcome)
                } else {
                    TickEvent::Waiting(handle)
                }
            }
        }
    }

    fn start_next(&mut self, now: Instant) -> TickEvent {
        let sink = &mut self.sink;
        for (index, request) in self.requests[..self.count].iter_mut().enumerate() {
            let Some(request) = request.as_mut() else {
                continue;
            };
            if request.try_start(now, sink) {
                let handle = RequestHandle(index);
                self.active = Some(handle);
                return TickEvent::Started(handle);
            }
        }
        TickEvent::Idle
    }

    //==================================================================================Inbound
    /// Hand raw frame bytes to the active request; dropped when none is active.
    pub fn route_inbound(&mut self, data: &[u8]) {
        let Some(handle) = self.active else {
            return;
        };
        if let Some(request) = self.requests.get_mut(handle.0).and_then(Option::as_mut) {
            request.handle_incoming(data, &mut self.sink);
        }
    }

    /// Route a received frame when it carries the active request's response id.
    ///
    /// Returns `false` for frames that were discarded (nothing active, or a
    /// reply meant for another request sharing the bus).
    pub fn on_frame(&mut self, frame: &CanFrame) -> bool {
        let expected = self
            .active
            .and_then(|handle| self.request(handle))
            .map(PidRequest::response_id);
        if expected != Some(frame.id) {
            #[cfg(feature = "defmt")]
            defmt::trace!("Discarding frame from can_id {:#x}", frame.id.raw());
            return false;
        }
        self.route_inbound(frame.payload());
        true
    }

    //==================================================================================Outbound
    /// Pad `bytes` to eight with `0xAA` and send them on `id`.
    pub fn send(&mut self, id: CanId, bytes: &[u8]) -> Result<(), S::Error> {
        send_padded(&mut self.sink, id, bytes)
    }
}
