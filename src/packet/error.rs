//! Framing errors for DS2 and KWP packets.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Short Header: got {0} bytes")]
    ShortHeader(usize),
    #[error("Length Too Small: 0x{length:02x}, minimum 0x{minimum:02x}")]
    LengthTooSmall { length: u8, minimum: u8 },
    #[error("Length Mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Missing Checksum")]
    MissingChecksum,
    #[error("Payload Too Large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("Source Address Required")]
    MissingSourceAddress,
    #[error("Unexpected Source Address: 0x{0:02x}")]
    UnexpectedSourceAddress(u8),
}
