//! Scripted serial line for testing.
use std::collections::VecDeque;
use std::time::Duration;

use crate::packet::Protocol;
use crate::serial::SerialAdapter;
use crate::Result;

/// Something the line delivers to a single read call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Bytes(Vec<u8>),
    /// One poll that times out without data
    Silence,
}

/// Mock line. Every write is echoed back (unless disabled) followed by the next scripted reply.
#[derive(Debug)]
pub struct MockAdapter {
    open: bool,
    echo: bool,
    short_write: Option<usize>,
    replies: VecDeque<Vec<Chunk>>,
    rx: VecDeque<Chunk>,
    written: Vec<Vec<u8>>,
    configured: Vec<Protocol>,
    reads: usize,
    timeouts: usize,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            open: true,
            echo: true,
            short_write: None,
            replies: VecDeque::new(),
            rx: VecDeque::new(),
            written: vec![],
            configured: vec![],
            reads: 0,
            timeouts: 0,
        }
    }

    /// Line that doesn't echo writes back.
    pub fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }

    /// Queue the reply delivered after the next write that has no reply yet.
    pub fn push_reply(&mut self, bytes: &[u8]) {
        self.replies.push_back(vec![Chunk::Bytes(bytes.to_vec())]);
    }

    /// Queue a reply delivered piecewise, possibly with silent polls in between.
    pub fn push_reply_chunks(&mut self, chunks: Vec<Chunk>) {
        self.replies.push_back(chunks);
    }

    /// Queue a write that gets no answer at all.
    pub fn push_no_reply(&mut self) {
        self.replies.push_back(vec![]);
    }

    /// The next write only accepts `n` bytes.
    pub fn set_short_write(&mut self, n: usize) {
        self.short_write = Some(n);
    }

    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn configured(&self) -> &[Protocol] {
        &self.configured
    }

    /// Number of read calls made so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Number of read calls that timed out.
    pub fn timeouts(&self) -> usize {
        self.timeouts
    }
}

impl SerialAdapter for MockAdapter {
    fn is_open(&self) -> bool {
        self.open
    }

    fn configure(&mut self, protocol: Protocol) -> Result<()> {
        self.configured.push(protocol);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = self.short_write.take().unwrap_or(data.len()).min(data.len());
        self.written.push(data[..n].to_vec());

        if self.echo {
            self.rx.push_back(Chunk::Bytes(data[..n].to_vec()));
        }
        if let Some(reply) = self.replies.pop_front() {
            self.rx.extend(reply);
        }

        Ok(n)
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        self.reads += 1;

        match self.rx.pop_front() {
            Some(Chunk::Bytes(mut bytes)) if !bytes.is_empty() => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.rx.push_front(Chunk::Bytes(bytes.split_off(n)));
                }
                Ok(n)
            }
            _ => {
                self.timeouts += 1;
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_then_reply() {
        let mut mock = MockAdapter::new();
        mock.push_reply(&[0x12, 0x03, 0x11]);

        assert_eq!(mock.write(&[0x12, 0x04, 0x00, 0x16]).unwrap(), 4);

        let mut buf = [0u8; 3];
        assert_eq!(mock.read(&mut buf, Duration::ZERO).unwrap(), 3);
        assert_eq!(buf, [0x12, 0x04, 0x00]);
        assert_eq!(mock.read(&mut buf[..1], Duration::ZERO).unwrap(), 1);
        assert_eq!(buf[0], 0x16);
        assert_eq!(mock.read(&mut buf, Duration::ZERO).unwrap(), 3);
        assert_eq!(buf, [0x12, 0x03, 0x11]);
        assert_eq!(mock.read(&mut buf, Duration::ZERO).unwrap(), 0);
        assert_eq!(mock.timeouts(), 1);
    }

    #[test]
    fn test_short_write() {
        let mut mock = MockAdapter::new().without_echo();
        mock.set_short_write(2);
        assert_eq!(mock.write(&[1, 2, 3]).unwrap(), 2);
        assert_eq!(mock.write(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(mock.written(), &[vec![1, 2], vec![1, 2, 3]]);
    }
}
