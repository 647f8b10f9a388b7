//! Types shared by the framing and transport layers.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::packet::Packet;

/// Byte order used when a multi-byte field is read out of a payload.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Non-fatal anomaly observed while receiving a frame. The payload is still returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The bus did not echo back exactly what was written.
    EchoMismatch { expected: Vec<u8>, received: Vec<u8> },
    /// The leading marker pair of a KWP reply was not what we expected.
    MarkerMismatch { expected: [u8; 2], received: [u8; 2] },
    /// The received checksum doesn't match the one computed over the frame.
    ChecksumMismatch { expected: u8, received: u8 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::EchoMismatch { expected, received } => write!(
                f,
                "Echo Mismatch: expected {}, got {}",
                hex::encode(expected),
                hex::encode(received)
            ),
            Warning::MarkerMismatch { expected, received } => write!(
                f,
                "Marker Mismatch: expected {}, got {}",
                hex::encode(expected),
                hex::encode(received)
            ),
            Warning::ChecksumMismatch { expected, received } => {
                write!(f, "Checksum Mismatch: expected 0x{:02x}, got 0x{:02x}", expected, received)
            }
        }
    }
}

/// A received frame together with the checksum byte that came with it and any soft failures.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub packet: Packet,
    /// Checksum byte as received on the wire
    pub checksum: u8,
    pub warnings: Vec<Warning>,
}

impl Reply {
    pub fn checksum_valid(&self) -> bool {
        !self
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::ChecksumMismatch { .. }))
    }

    pub fn into_packet(self) -> Packet {
        self.packet
    }
}
