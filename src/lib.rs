//! `korri-obd` library: OBD-II parameter polling over a CAN bus in a `no_std`
//! environment. The crate exposes the shared data types, the CAN transport
//! primitives and collaborator traits, the PID request scheduler, and the
//! consumers that turn reassembled payloads into values.
#![no_std]
//==================================================================================
/// Core data types shared by the transport and polling layers.
pub mod core;
/// Configuration and runtime errors (CAN identifiers, request setup,
/// registration, supervisor loop).
pub mod error;
/// OBD-II polling implementation: CAN transport, PID request state machine,
/// scheduler, and payload consumers.
pub mod protocol;
//==================================================================================
