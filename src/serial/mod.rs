//! Blocking byte-line adapters driven by the [`crate::transport::Transport`].
//!
//! The K-line is half duplex: every byte written is echoed back by the bus before the control unit
//! answers. Adapters only move bytes, framing and echo handling live in the transport.

pub mod mock;
mod timing;

#[cfg(all(unix, feature = "raw-fd"))]
pub mod fd;
#[cfg(feature = "serialport")]
pub mod port;

pub use timing::{Timing, TimingProfile};

use std::time::Duration;

use crate::packet::Protocol;
use crate::Result;

/// Trait for a blocking serial line
pub trait SerialAdapter {
    /// Whether the underlying descriptor is still usable.
    fn is_open(&self) -> bool;

    /// Switch line settings for `protocol`. Lines configured out-of-band can ignore this.
    fn configure(&mut self, _protocol: Protocol) -> Result<()> {
        Ok(())
    }

    /// Write `data`, returning how many bytes the line accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Wait up to `timeout` for bytes and read what is available. `Ok(0)` means the poll timed out.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

impl<T: SerialAdapter + ?Sized> SerialAdapter for Box<T> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn configure(&mut self, protocol: Protocol) -> Result<()> {
        (**self).configure(protocol)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }
}
