use bytes::Bytes;
use obex_engine_rs::models::{
    event::Event,
    header::{HeaderFlags, RawHeaderId},
    opcode::Opcode,
};

use crate::integration_tests::common::{Recorder, drive_until, pair, recording};

/// A polite cancel mid-PUT turns into an ABORT packet; the server
/// acknowledges and both sides report `Abort`, not an error.
#[tokio::test]
async fn test_nice_cancel_sends_abort() {
    let client_log = recording();
    let server_log = recording();

    let mut client_rec = Recorder::new(client_log.clone());
    client_rec.on_stream_empty = Some(Box::new(|object| {
        // An endless body source; the transfer only stops via cancel.
        object
            .add_header(
                RawHeaderId::BODY,
                Bytes::from(vec![0x42; 4096]),
                HeaderFlags::STREAM_DATA,
            )
            .expect("feed stream");
    }));

    let (mut client, mut server) = pair(client_rec, Recorder::new(server_log.clone()));

    let mut object = client.new_object(Opcode::Put);
    object
        .add_unicode(RawHeaderId::NAME, "big.bin", HeaderFlags::empty())
        .expect("name");
    object
        .add_header(RawHeaderId::BODY, Bytes::new(), HeaderFlags::STREAM_START)
        .expect("start stream");
    client.request(object).expect("submit");

    // Let a few data packets through before pulling the plug.
    let progress_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        progress_log.lock().expect("log").count(Event::Progress) >= 4
    })
    .await;

    client.cancel(true).await;

    let done_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        done_log.lock().expect("log").count(Event::Abort) > 0
    })
    .await;

    assert!(client.is_idle());
    assert!(!client.has_object());
    let client_events = client_log.lock().expect("log").events();
    assert_eq!(client_events.last(), Some(&Event::Abort));
    assert_eq!(client_log.lock().expect("log").count(Event::LinkErr), 0);

    // The server saw the abort too and went back to idle.
    assert!(server_log.lock().expect("log").count(Event::Abort) > 0);
    assert!(server.is_idle());
    assert!(!server.has_object());
}

/// A hard cancel reports exactly `Abort` then `LinkErr` and drops the
/// transport.
#[tokio::test]
async fn test_hard_cancel_event_pair() {
    let client_log = recording();
    let server_log = recording();
    let (mut client, mut server) =
        pair(Recorder::new(client_log.clone()), Recorder::new(server_log.clone()));

    let mut object = client.new_object(Opcode::Put);
    object
        .add_header(
            RawHeaderId::BODY,
            Bytes::from(vec![0x17; 2000]),
            HeaderFlags::empty(),
        )
        .expect("body");
    client.request(object).expect("submit");

    let progress_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        progress_log.lock().expect("log").count(Event::Progress) >= 2
    })
    .await;

    client.cancel(false).await;

    assert!(client.is_idle());
    assert!(!client.has_object());
    let events = client_log.lock().expect("log").events();
    let tail = &events[events.len() - 2..];
    assert_eq!(tail, &[Event::Abort, Event::LinkErr]);
}
