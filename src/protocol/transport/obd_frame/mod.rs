//! Payload layouts emitted by the OBD-II poller: single-frame PID queries and
//! the ISO-TP flow-control continuation, all padded to eight bytes.
use crate::protocol::transport::{
    can_frame::CanFrame, can_id::CanId, traits::frame_sink::FrameSink,
};

/// Filler used for the unused tail of every transmitted frame.
pub const PAD_BYTE: u8 = 0xAA;

/// Largest PID the query encoding can carry (24 bits).
pub const MAX_PID: u32 = 0xFF_FFFF;

/// "Continue to send", no block-size limit, minimum separation time.
pub const FLOW_CONTROL_PAYLOAD: [u8; 8] = [
    0x30, 0x00, 0x10, PAD_BYTE, PAD_BYTE, PAD_BYTE, PAD_BYTE, PAD_BYTE,
];

/// Upper-nibble value of a segmented reply's first frame.
const FIRST_FRAME_PCI: u8 = 0x10;

/// Copy `bytes` to the front of an eight-byte frame and pad the rest with [`PAD_BYTE`].
/// Anything past eight bytes is cut off.
pub fn pad_payload(bytes: &[u8]) -> [u8; 8] {
    let mut data = [PAD_BYTE; 8];
    let len = bytes.len().min(8);
    data[..len].copy_from_slice(&bytes[..len]);
    data
}

/// Encode a PID query.
///
/// * `pid <= 0xFFFF` → `[0x02, pid_hi, pid_lo, AA…]`
/// * `pid >  0xFFFF` → `[0x03, pid_hi, pid_mid, pid_lo, AA…]`
///
/// Bits above 24 are ignored; request configuration rejects such PIDs upfront.
pub fn pid_query_payload(pid: u32) -> [u8; 8] {
    if pid > 0xFFFF {
        pad_payload(&[
            0x03,
            ((pid >> 16) & 0xFF) as u8,
            ((pid >> 8) & 0xFF) as u8,
            (pid & 0xFF) as u8,
        ])
    } else {
        pad_payload(&[0x02, ((pid >> 8) & 0xFF) as u8, (pid & 0xFF) as u8])
    }
}

/// `true` when the frame opens a multi-frame reply (first byte `0x10..=0x1F`).
pub fn is_first_frame(frame: &[u8]) -> bool {
    frame
        .first()
        .is_some_and(|pci| pci & 0xF0 == FIRST_FRAME_PCI)
}

/// Pad `bytes` to a full frame and hand it to `sink`.
///
/// Transmission is fire-and-forget: a refused frame is logged and returned to
/// the caller, who is free to ignore it.
pub fn send_padded<S: FrameSink + ?Sized>(
    sink: &mut S,
    id: CanId,
    bytes: &[u8],
) -> Result<(), S::Error> {
    let frame = CanFrame {
        id,
        data: pad_payload(bytes),
        len: 8,
    };
    let result = sink.send_frame(&frame);
    if result.is_err() {
        #[cfg(feature = "defmt")]
        defmt::warn!("Failed to send frame to can_id {:#x}", id.raw());
    }
    result
}
