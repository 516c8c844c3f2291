//! PID polling: per-request state machine, scheduler and async supervisor.
pub mod pid_request;
pub mod scheduler;
pub mod supervisor;
