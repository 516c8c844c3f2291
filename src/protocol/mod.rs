//! OBD-II polling components: CAN transport, PID request scheduling and the
//! consumers fed with reassembled replies.
pub mod consumers;
pub mod polling;
pub mod transport;
