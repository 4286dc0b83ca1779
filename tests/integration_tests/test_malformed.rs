use hex_literal::hex;
use obex_engine_rs::{engine::error::ObexError, models::event::Event};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::integration_tests::common::{Recorder, raw_pair, recording};

/// A header that declares more bytes than the packet holds is fatal for
/// the transaction: BAD_REQUEST on the wire, ParseErr to the host, engine
/// back to idle.
#[tokio::test]
async fn test_truncated_header_is_rejected() {
    let log = recording();
    let (mut server, mut far) = raw_pair(Recorder::new(log.clone()));

    // PUT whose Name header claims 0x0100 bytes in a 16-byte packet.
    far.write_all(&hex!("02 0010 01 0100 0000 0000 0000 0000 0000"))
        .await
        .expect("inject request");

    let mut failed = false;
    for _ in 0..10 {
        match server.work().await {
            Err(ObexError::Parse(_)) => {
                failed = true;
                break;
            },
            _ => {},
        }
    }
    assert!(failed, "parse error never surfaced");

    let mut reply = [0u8; 3];
    far.read_exact(&mut reply).await.expect("read reply");
    assert_eq!(reply, hex!("C0 0003"));

    let events = log.lock().expect("log").events();
    assert_eq!(events, vec![Event::ReqHint, Event::ParseErr]);
    assert!(server.is_idle());
    assert!(!server.has_object());
}

/// A mid-transaction packet with a different command byte breaks the
/// transaction the same way.
#[tokio::test]
async fn test_command_mismatch_mid_transaction() {
    let log = recording();
    let (mut server, mut far) = raw_pair(Recorder::new(log.clone()));

    // Non-final PUT, then a GET continuation.
    far.write_all(&hex!("02 0003")).await.expect("first packet");
    for _ in 0..6 {
        let _ = server.work().await;
    }
    assert!(!server.is_idle());

    far.write_all(&hex!("03 0003")).await.expect("second packet");
    let mut failed = false;
    for _ in 0..10 {
        if matches!(server.work().await, Err(ObexError::Parse(_))) {
            failed = true;
            break;
        }
    }
    assert!(failed, "command mismatch never surfaced");

    let events = log.lock().expect("log").events();
    assert!(events.contains(&Event::ParseErr));
    assert!(server.is_idle());
}
