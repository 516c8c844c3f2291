//! Abstraction traits used by the transport layer (CAN bus, timer, and frame sink).
pub mod can_bus;
pub mod frame_sink;
pub mod korri_timer;
