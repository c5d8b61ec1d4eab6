//! # Protocol Constants
//!
//! Values both sides must agree on. Changing any of them is a protocol break.

/// Default host port for game traffic.
pub const DEFAULT_PORT: u16 = 4296;

/// Default fixed simulation rate (steps per second, 20ms per step).
pub const DEFAULT_TICK_RATE: u32 = 50;

/// Size of the envelope header: tag (2) + payload length (4).
pub const ENVELOPE_HEADER_LEN: usize = 6;

/// Largest payload a single envelope may carry.
///
/// Anything bigger is rejected before allocation on the receive path.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;
