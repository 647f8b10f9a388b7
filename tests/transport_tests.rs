use std::time::Duration;

use ds2::packet::{Packet, Protocol, Warning, TESTER_ADDRESS};
use ds2::serial::mock::{Chunk, MockAdapter};
use ds2::serial::Timing;
use ds2::transport::{Transport, TransportConfig};
use ds2::Error;

static MAX_TIMEOUTS: u32 = 5;

fn transport(adapter: MockAdapter) -> Transport<MockAdapter> {
    let config = TransportConfig {
        timing: Timing {
            settle_delay: Duration::ZERO,
            poll_timeout: Duration::from_millis(500),
            max_timeouts: MAX_TIMEOUTS,
        },
        expect_echo: true,
    };
    Transport::with_config(adapter, config)
}

#[test]
fn ds2_query() {
    let mut adapter = MockAdapter::new();
    adapter.push_reply(&[0x12, 0x05, 0xaa, 0xbb, 0x06]);
    let mut transport = transport(adapter);

    let reply = transport.query(&Packet::identify(Protocol::DS2, 0x12)).unwrap();
    assert_eq!(reply.packet.target_address(), 0x12);
    assert_eq!(reply.packet.payload(), &[0xaa, 0xbb]);
    assert!(reply.checksum_valid());
    assert!(reply.warnings.is_empty());

    assert_eq!(transport.adapter().written(), &[vec![0x12, 0x04, 0x00, 0x16]]);
    assert_eq!(transport.adapter().configured(), &[Protocol::DS2]);
}

#[test]
fn kwp_query() {
    let reply_bytes = Packet::kwp(TESTER_ADDRESS, 0x12, &[0x5a, 0x80, 0x01, 0x02]).unwrap().to_bytes();
    let mut adapter = MockAdapter::new();
    adapter.push_reply(&reply_bytes);
    let mut transport = transport(adapter);

    let reply = transport.query(&Packet::identify(Protocol::KWP, 0x12)).unwrap();
    assert_eq!(reply.packet.ecu_address(), 0x12);
    assert_eq!(reply.packet.target_address(), TESTER_ADDRESS);
    assert_eq!(reply.packet.payload(), &[0x5a, 0x80, 0x01, 0x02]);
    assert!(reply.warnings.is_empty());
}

#[test]
fn checksum_mismatch_is_a_warning() {
    let mut adapter = MockAdapter::new();
    adapter.push_reply(&[0x12, 0x05, 0xaa, 0xbb, 0x00]);
    let mut transport = transport(adapter);

    let reply = transport.query(&Packet::identify(Protocol::DS2, 0x12)).unwrap();
    assert_eq!(reply.packet.payload(), &[0xaa, 0xbb]);
    assert!(!reply.checksum_valid());
    assert_eq!(
        reply.warnings,
        vec![Warning::ChecksumMismatch {
            expected: 0x06,
            received: 0x00
        }]
    );
}

#[test]
fn missing_echo_is_a_warning() {
    // The reply arrives where the echo was expected, so the echo read consumes it
    let mut adapter = MockAdapter::new().without_echo();
    adapter.push_reply_chunks(vec![
        Chunk::Bytes(vec![0xff, 0xff, 0xff, 0xff]),
        Chunk::Bytes(vec![0x12, 0x05, 0xaa, 0xbb, 0x06]),
    ]);
    let mut transport = transport(adapter);

    let reply = transport.query(&Packet::identify(Protocol::DS2, 0x12)).unwrap();
    assert_eq!(reply.packet.payload(), &[0xaa, 0xbb]);
    assert_eq!(
        reply.warnings,
        vec![Warning::EchoMismatch {
            expected: vec![0x12, 0x04, 0x00, 0x16],
            received: vec![0xff, 0xff, 0xff, 0xff]
        }]
    );
}

#[test]
fn no_echo_expected() {
    let mut adapter = MockAdapter::new().without_echo();
    adapter.push_reply(&[0x12, 0x05, 0xaa, 0xbb, 0x06]);
    let config = TransportConfig {
        timing: Timing {
            settle_delay: Duration::ZERO,
            ..Timing::default()
        },
        expect_echo: false,
    };
    let mut transport = Transport::with_config(adapter, config);

    let reply = transport.query(&Packet::identify(Protocol::DS2, 0x12)).unwrap();
    assert!(reply.warnings.is_empty());
}

#[test]
fn timeout_raised_once() {
    let mut adapter = MockAdapter::new();
    adapter.push_no_reply();
    let mut transport = transport(adapter);

    let result = transport.query(&Packet::identify(Protocol::DS2, 0x12));
    assert!(matches!(result, Err(Error::Timeout)));
    assert_eq!(transport.adapter().timeouts(), MAX_TIMEOUTS as usize);
}

#[test]
fn timeout_counter_resets_on_progress() {
    let mut chunks = vec![Chunk::Bytes(vec![0x12, 0x05])];
    chunks.extend(std::iter::repeat(Chunk::Silence).take(MAX_TIMEOUTS as usize - 1));
    chunks.push(Chunk::Bytes(vec![0xaa]));
    chunks.extend(std::iter::repeat(Chunk::Silence).take(MAX_TIMEOUTS as usize - 1));
    chunks.push(Chunk::Bytes(vec![0xbb, 0x06]));

    let mut adapter = MockAdapter::new();
    adapter.push_reply_chunks(chunks);
    let mut transport = transport(adapter);

    let reply = transport.query(&Packet::identify(Protocol::DS2, 0x12)).unwrap();
    assert_eq!(reply.packet.payload(), &[0xaa, 0xbb]);
    assert_eq!(transport.adapter().timeouts(), 2 * (MAX_TIMEOUTS as usize - 1));
}

#[test]
fn kwp_length_below_minimum() {
    let mut adapter = MockAdapter::new();
    adapter.push_reply(&[0xb8, 0xf1, 0x12, 0x03, 0x01, 0x02, 0x03, 0x00]);
    let mut transport = transport(adapter);

    let result = transport.query(&Packet::identify(Protocol::KWP, 0x12));
    assert!(matches!(
        result,
        Err(Error::FramingError(ds2::packet::Error::LengthTooSmall { length: 3, minimum: 4 }))
    ));
}

#[test]
fn partial_header_is_a_framing_error() {
    let mut adapter = MockAdapter::new();
    adapter.push_reply(&[0x12]);
    let mut transport = transport(adapter);

    let result = transport.query(&Packet::identify(Protocol::DS2, 0x12));
    assert!(matches!(result, Err(Error::FramingError(ds2::packet::Error::ShortHeader(1)))));
}

#[test]
fn truncated_reply_is_a_framing_error() {
    let mut adapter = MockAdapter::new();
    adapter.push_reply(&[0x12, 0x06, 0xaa]);
    let mut transport = transport(adapter);

    let result = transport.query(&Packet::identify(Protocol::DS2, 0x12));
    assert!(matches!(
        result,
        Err(Error::FramingError(ds2::packet::Error::LengthMismatch { .. }))
    ));
}

#[test]
fn short_write() {
    let mut adapter = MockAdapter::new();
    adapter.set_short_write(2);
    let mut transport = transport(adapter);

    let result = transport.query(&Packet::identify(Protocol::DS2, 0x12));
    assert!(matches!(
        result,
        Err(Error::TransportError(ds2::transport::error::Error::ShortWrite {
            written: 2,
            expected: 4
        }))
    ));
    assert_eq!(transport.adapter().reads(), 0);
}

#[test]
fn closed_line() {
    let mut adapter = MockAdapter::new();
    adapter.set_open(false);
    let mut transport = transport(adapter);

    let result = transport.query(&Packet::identify(Protocol::DS2, 0x12));
    assert!(matches!(
        result,
        Err(Error::TransportError(ds2::transport::error::Error::NotConnected))
    ));
    assert!(transport.adapter().written().is_empty());
}

#[test]
fn payload_lengths_survive_framing() {
    for len in 0..=40u8 {
        let payload: Vec<u8> = (0..len).collect();
        let mut adapter = MockAdapter::new();
        adapter.push_reply(&Packet::ds2(0x12, &payload).unwrap().to_bytes());
        let reply = transport(adapter).query(&Packet::identify(Protocol::DS2, 0x12)).unwrap();
        assert_eq!(reply.packet.payload(), payload.as_slice());
        assert!(reply.checksum_valid());
    }

    for len in 4..=40u8 {
        let payload: Vec<u8> = (0..len).collect();
        let mut adapter = MockAdapter::new();
        adapter.push_reply(&Packet::kwp(TESTER_ADDRESS, 0x12, &payload).unwrap().to_bytes());
        let reply = transport(adapter).query(&Packet::identify(Protocol::KWP, 0x12)).unwrap();
        assert_eq!(reply.packet.payload(), payload.as_slice());
        assert!(reply.checksum_valid());
    }
}
