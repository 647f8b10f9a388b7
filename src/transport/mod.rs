//! Blocking request/response exchange on a half-duplex K-line.
//!
//! A query writes one frame, reads back the bus echo of that frame and then reads the reply header
//! to learn how many more bytes to wait for. Echo, marker and checksum anomalies are logged and
//! attached to the [`Reply`] as warnings, only framing and timeouts abort the exchange.
//!
//! ## Example
//! ```rust
//! use ds2::packet::{Packet, Protocol};
//! use ds2::serial::mock::MockAdapter;
//! use ds2::transport::Transport;
//!
//! let mut adapter = MockAdapter::new();
//! adapter.push_reply(&[0x12, 0x05, 0xaa, 0xbb, 0x06]);
//!
//! let mut transport = Transport::new(adapter);
//! let reply = transport.query(&Packet::identify(Protocol::DS2, 0x12)).unwrap();
//! assert_eq!(reply.packet.payload(), &[0xaa, 0xbb]);
//! assert!(reply.warnings.is_empty());
//! ```

pub mod error;

use tracing::{debug, trace, warn};

use crate::packet::{Error as FramingError, Packet, Reply, Warning};
use crate::serial::{SerialAdapter, Timing};
use crate::{Error, Result};

const READ_CHUNK_SIZE: usize = 64;

/// Configuration for a [`Transport`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Timing used by [`Transport::query`]
    pub timing: Timing,
    /// Whether the line echoes written bytes back before the reply
    pub expect_echo: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            timing: Timing::default(),
            expect_echo: true,
        }
    }
}

/// Owns a serial line. Taking `&mut self` for every query keeps exchanges from interleaving.
pub struct Transport<A: SerialAdapter> {
    adapter: A,
    config: TransportConfig,
}

impl<A: SerialAdapter> Transport<A> {
    pub fn new(adapter: A) -> Self {
        Self::with_config(adapter, TransportConfig::default())
    }

    pub fn with_config(adapter: A, config: TransportConfig) -> Self {
        Self { adapter, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn into_inner(self) -> A {
        self.adapter
    }

    /// Send `request` and wait for the reply using the configured timing.
    pub fn query(&mut self, request: &Packet) -> Result<Reply> {
        let timing = self.config.timing;
        self.query_with(request, timing)
    }

    /// Send `request` and wait for the reply using `timing`.
    pub fn query_with(&mut self, request: &Packet, timing: Timing) -> Result<Reply> {
        if !self.adapter.is_open() {
            return Err(error::Error::NotConnected.into());
        }

        let protocol = request.protocol();
        self.adapter.configure(protocol)?;

        let bytes = request.to_bytes();
        debug!("TX {} {}", protocol, hex::encode(&bytes));

        let written = self.adapter.write(&bytes)?;
        if written != bytes.len() {
            return Err(error::Error::ShortWrite {
                written,
                expected: bytes.len(),
            }
            .into());
        }

        if !timing.settle_delay.is_zero() {
            std::thread::sleep(timing.settle_delay);
        }

        let mut warnings = vec![];
        if self.config.expect_echo {
            let (echo, _) = self.read_bytes(bytes.len(), &timing)?;
            if echo != bytes {
                let warning = Warning::EchoMismatch {
                    expected: bytes.clone(),
                    received: echo,
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }

        // Markers and header: nothing at all means the unit is absent, a partial header is garbage
        let header_len = protocol.marker_len() + 2;
        let mut frame = match self.read_bytes(header_len, &timing)? {
            (data, true) => data,
            (data, false) if data.is_empty() => {
                debug!("No reply from 0x{:02x}", request.ecu_address());
                return Err(Error::Timeout);
            }
            (data, false) => return Err(FramingError::ShortHeader(data.len()).into()),
        };

        let length = frame[header_len - 1];
        protocol.check_reply_length(length)?;
        let region = protocol.region_len(length)?;

        let (rest, complete) = self.read_bytes(region, &timing)?;
        frame.extend_from_slice(&rest);
        if !complete {
            return Err(FramingError::LengthMismatch {
                expected: header_len + region,
                actual: frame.len(),
            }
            .into());
        }
        debug!("RX {} {}", protocol, hex::encode(&frame));

        let expected_markers = request
            .source_address()
            .and_then(|tester| protocol.reply_markers(tester));
        let mut reply = Packet::parse_with_markers(protocol, &frame, expected_markers)?;

        for warning in &reply.warnings {
            warn!("{}", warning);
        }
        warnings.append(&mut reply.warnings);
        reply.warnings = warnings;

        Ok(reply)
    }

    /// Read up to `len` bytes. Gives up after `max_timeouts` consecutive empty polls and returns
    /// what arrived so far together with whether the read completed. Progress resets the counter.
    fn read_bytes(&mut self, len: usize, timing: &Timing) -> Result<(Vec<u8>, bool)> {
        let mut data = Vec::with_capacity(len);
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let mut timeouts = 0;

        while data.len() < len {
            let want = (len - data.len()).min(buf.len());
            let n = self.adapter.read(&mut buf[..want], timing.poll_timeout)?;

            if n == 0 {
                timeouts += 1;
                trace!("Poll timeout {}/{}", timeouts, timing.max_timeouts);
                if timeouts >= timing.max_timeouts {
                    return Ok((data, false));
                }
                continue;
            }

            timeouts = 0;
            data.extend_from_slice(&buf[..n]);
        }

        Ok((data, true))
    }
}
