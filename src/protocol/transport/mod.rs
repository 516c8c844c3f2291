//! OBD-II transport layer: CAN frame representation, identifiers, request
//! payload encoding, and bus abstraction traits.

pub mod can_frame;
pub mod can_id;
pub mod obd_frame;
pub mod traits;
