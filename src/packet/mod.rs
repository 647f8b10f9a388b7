//! DS2 and KWP packet framing.
//!
//! Both protocols share one shape on the wire: an addressing header, a length byte, the payload and a
//! single checksum byte computed over everything before it. KWP frames additionally start with a format
//! byte and carry a source address.
//!
//! ## Example
//! ```rust
//! use ds2::packet::{Packet, Protocol};
//!
//! let request = Packet::ds2(0x12, &[0x00]).unwrap();
//! assert_eq!(request.to_bytes(), vec![0x12, 0x04, 0x00, 0x16]);
//!
//! let reply = Packet::parse(Protocol::DS2, &[0x12, 0x05, 0xaa, 0xbb, 0x06]).unwrap();
//! assert!(reply.checksum_valid());
//! assert_eq!(reply.packet.payload(), &[0xaa, 0xbb]);
//! ```

mod constants;
pub mod error;
mod types;

pub use constants::*;
pub use error::Error;
pub use types::*;

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Framing variant spoken on the line.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Protocol {
    /// Proprietary two-wire protocol. XOR checksum, no source address.
    #[default]
    DS2,
    /// KWP2000-style framing with a format byte, a source address and an additive checksum.
    KWP,
}

impl Protocol {
    pub fn has_source_address(&self) -> bool {
        matches!(self, Protocol::KWP)
    }

    /// Number of bytes preceding the `[address][length]` header of a frame.
    pub fn marker_len(&self) -> usize {
        match self {
            Protocol::DS2 => 0,
            Protocol::KWP => 2,
        }
    }

    /// Marker pair expected in front of a reply addressed to `tester`.
    pub fn reply_markers(&self, tester: u8) -> Option<[u8; 2]> {
        match self {
            Protocol::DS2 => None,
            Protocol::KWP => Some([KWP_FORMAT, tester]),
        }
    }

    /// Smallest length byte accepted in a reply header.
    pub fn min_length(&self) -> u8 {
        match self {
            Protocol::DS2 => DS2_MIN_LENGTH,
            Protocol::KWP => KWP_MIN_LENGTH,
        }
    }

    pub fn max_payload(&self) -> usize {
        match self {
            Protocol::DS2 => DS2_MAX_PAYLOAD,
            Protocol::KWP => KWP_MAX_PAYLOAD,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        ByteOrder::Big
    }

    pub fn identify_payload(&self) -> &'static [u8] {
        match self {
            Protocol::DS2 => DS2_IDENTIFY,
            Protocol::KWP => KWP_IDENTIFY,
        }
    }

    /// Single byte accumulator over every byte of the frame preceding the checksum.
    pub fn checksum(&self, data: &[u8]) -> u8 {
        match self {
            Protocol::DS2 => data.iter().fold(0, |acc, &x| acc ^ x),
            Protocol::KWP => data.iter().fold(0, |acc: u8, &x| acc.wrapping_add(x)),
        }
    }

    /// Length byte describing a payload of `payload_len` bytes.
    pub fn length_byte(&self, payload_len: usize) -> u8 {
        match self {
            Protocol::DS2 => (payload_len + 3) as u8,
            Protocol::KWP => payload_len as u8,
        }
    }

    /// Number of bytes following the two header bytes, i.e. the payload plus the checksum.
    pub fn region_len(&self, length: u8) -> Result<usize, Error> {
        match self {
            Protocol::DS2 => (length as usize)
                .checked_sub(2)
                .ok_or(Error::LengthTooSmall {
                    length,
                    minimum: DS2_MIN_LENGTH,
                }),
            Protocol::KWP => Ok(length as usize + 1),
        }
    }

    /// Rejects reply headers whose length byte can't describe a valid frame.
    pub fn check_reply_length(&self, length: u8) -> Result<(), Error> {
        let minimum = self.min_length();
        if length < minimum {
            return Err(Error::LengthTooSmall { length, minimum });
        }
        Ok(())
    }
}

/// One frame of either protocol. The checksum is never stored, it is derived from the other fields.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    protocol: Protocol,
    target_address: u8,
    source_address: Option<u8>,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(
        protocol: Protocol,
        target_address: u8,
        source_address: Option<u8>,
        payload: &[u8],
    ) -> Result<Packet, Error> {
        match (protocol.has_source_address(), source_address) {
            (true, None) => return Err(Error::MissingSourceAddress),
            (false, Some(source)) => return Err(Error::UnexpectedSourceAddress(source)),
            _ => {}
        }

        if payload.len() > protocol.max_payload() {
            return Err(Error::PayloadTooLarge(payload.len()));
        }

        Ok(Packet {
            protocol,
            target_address,
            source_address,
            payload: payload.to_vec(),
        })
    }

    pub fn ds2(target_address: u8, payload: &[u8]) -> Result<Packet, Error> {
        Packet::new(Protocol::DS2, target_address, None, payload)
    }

    pub fn kwp(target_address: u8, source_address: u8, payload: &[u8]) -> Result<Packet, Error> {
        Packet::new(Protocol::KWP, target_address, Some(source_address), payload)
    }

    /// Identify request for the unit at `target_address`. KWP requests are sent from [`TESTER_ADDRESS`].
    pub fn identify(protocol: Protocol, target_address: u8) -> Packet {
        Packet {
            protocol,
            target_address,
            source_address: protocol.has_source_address().then_some(TESTER_ADDRESS),
            payload: protocol.identify_payload().to_vec(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn target_address(&self) -> u8 {
        self.target_address
    }

    pub fn source_address(&self) -> Option<u8> {
        self.source_address
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Address of the control unit that sent this packet, assuming it is a reply. DS2 replies carry the
    /// unit's own address, KWP replies name it as the source.
    pub fn ecu_address(&self) -> u8 {
        self.source_address.unwrap_or(self.target_address)
    }

    pub fn length_byte(&self) -> u8 {
        self.protocol.length_byte(self.payload.len())
    }

    fn header(&self) -> Vec<u8> {
        match self.source_address {
            Some(source) => vec![KWP_FORMAT, self.target_address, source, self.length_byte()],
            None => vec![self.target_address, self.length_byte()],
        }
    }

    pub fn checksum(&self) -> u8 {
        let mut frame = self.header();
        frame.extend(&self.payload);
        self.protocol.checksum(&frame)
    }

    /// Serialize into the bytes written to the line, checksum included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut frame = self.header();
        frame.extend(&self.payload);
        frame.push(self.protocol.checksum(&frame));
        frame
    }

    /// Parse one complete frame. A checksum or marker mismatch is reported as a [`Warning`] on the
    /// returned [`Reply`], only malformed headers and lengths are errors.
    pub fn parse(protocol: Protocol, data: &[u8]) -> Result<Reply, Error> {
        let expected = match data {
            [_, target, ..] => protocol.reply_markers(*target),
            _ => None,
        };
        Packet::parse_with_markers(protocol, data, expected)
    }

    pub(crate) fn parse_with_markers(
        protocol: Protocol,
        data: &[u8],
        expected_markers: Option<[u8; 2]>,
    ) -> Result<Reply, Error> {
        let marker_len = protocol.marker_len();
        if data.len() < marker_len + 2 {
            return Err(Error::ShortHeader(data.len()));
        }

        let mut warnings = vec![];
        let (markers, frame) = data.split_at(marker_len);

        let (target_address, source_address) = if protocol.has_source_address() {
            let received = [markers[0], markers[1]];
            if let Some(expected) = expected_markers {
                if received != expected {
                    warnings.push(Warning::MarkerMismatch { expected, received });
                }
            }
            (markers[1], Some(frame[0]))
        } else {
            (frame[0], None)
        };

        let length = frame[1];
        let region = protocol.region_len(length)?;
        if frame.len() != region + 2 {
            return Err(Error::LengthMismatch {
                expected: marker_len + region + 2,
                actual: data.len(),
            });
        }
        if region == 0 {
            return Err(Error::MissingChecksum);
        }

        let checksum = frame[frame.len() - 1];
        let packet = Packet {
            protocol,
            target_address,
            source_address,
            payload: frame[2..frame.len() - 1].to_vec(),
        };

        let expected = packet.checksum();
        if expected != checksum {
            warnings.push(Warning::ChecksumMismatch {
                expected,
                received: checksum,
            });
        }

        Ok(Reply {
            packet,
            checksum,
            warnings,
        })
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("protocol", &self.protocol)
            .field("target_address", &format_args!("0x{:02x}", self.target_address))
            .field("source_address", &self.source_address.map(|s| format!("0x{:02x}", s)))
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.protocol, hex::encode(self.to_bytes()))
    }
}
