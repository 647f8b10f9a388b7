//! Constants for DS2 and KWP framing.

/// Format byte leading every KWP frame on the K-line.
pub const KWP_FORMAT: u8 = 0xb8;

/// Address the diagnostic tool uses as its source on KWP.
pub const TESTER_ADDRESS: u8 = 0xf1;

/// Smallest length byte accepted in a DS2 reply header.
pub const DS2_MIN_LENGTH: u8 = 2;

/// Smallest length byte accepted in a KWP reply header.
pub const KWP_MIN_LENGTH: u8 = 4;

/// The DS2 length byte also counts address, length and checksum.
pub const DS2_MAX_PAYLOAD: usize = 0xff - 3;

pub const KWP_MAX_PAYLOAD: usize = 0xff;

/// Identify request payload on DS2.
pub static DS2_IDENTIFY: &[u8] = &[0x00];

/// Identify request payload on KWP (readEcuIdentification).
pub static KWP_IDENTIFY: &[u8] = &[0x1a, 0x80];
