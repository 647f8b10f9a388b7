//! [`SerialAdapter`] backed by the `serialport` crate.
use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::packet::Protocol;
use crate::serial::timing::DEFAULT_POLL_TIMEOUT_MS;
use crate::serial::SerialAdapter;
use crate::Result;

/// Baud rate and parity used on the K-line for each protocol. Both use 8 data bits and 1 stop bit.
pub fn line_settings(protocol: Protocol) -> (u32, Parity) {
    match protocol {
        Protocol::DS2 => (9600, Parity::Even),
        Protocol::KWP => (10400, Parity::None),
    }
}

/// Serial port adapter, typically an FTDI based K+DCAN cable.
pub struct SerialPortAdapter {
    port: Box<dyn SerialPort>,
    protocol: Option<Protocol>,
}

impl SerialPortAdapter {
    /// Open the port at `path` configured for `protocol`.
    pub fn open(path: &str, protocol: Protocol) -> Result<SerialPortAdapter> {
        let (baud_rate, parity) = line_settings(protocol);
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(parity)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
            .open()?;
        info!("Opened {} at {} baud ({})", path, baud_rate, protocol);

        let mut adapter = SerialPortAdapter {
            port,
            protocol: Some(protocol),
        };

        // Cables powered from RTS need it raised before the line is usable
        adapter.port.write_request_to_send(true)?;

        Ok(adapter)
    }

    /// Wrap an already opened port. Line settings are applied on the first query.
    pub fn new(port: Box<dyn SerialPort>) -> SerialPortAdapter {
        SerialPortAdapter {
            port,
            protocol: None,
        }
    }
}

impl SerialAdapter for SerialPortAdapter {
    /// The port handle can't be closed while the adapter owns it, so an open adapter stays open.
    fn is_open(&self) -> bool {
        true
    }

    fn configure(&mut self, protocol: Protocol) -> Result<()> {
        if self.protocol == Some(protocol) {
            return Ok(());
        }

        let (baud_rate, parity) = line_settings(protocol);
        self.port.set_baud_rate(baud_rate)?;
        self.port.set_parity(parity)?;
        self.port.set_data_bits(DataBits::Eight)?;
        self.port.set_stop_bits(StopBits::One)?;
        self.protocol = Some(protocol);

        debug!("Line reconfigured for {} at {} baud", protocol, baud_rate);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let written = self.port.write(data)?;
        self.port.flush()?;
        Ok(written)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.port.set_timeout(timeout)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
