use bytes::Bytes;
use obex_engine_rs::models::{
    event::Event,
    header::{HeaderFlags, RawHeaderId},
    opcode::Opcode,
    response::ResponseCode,
};

use crate::integration_tests::common::{Recorder, drive_until, pair, recording};

/// While an object is suspended no packets go out and the peer sees
/// nothing; resume picks the transfer up where it stopped.
#[tokio::test]
async fn test_suspend_stalls_resume_completes() {
    let client_log = recording();
    let server_log = recording();
    let (mut client, mut server) =
        pair(Recorder::new(client_log.clone()), Recorder::new(server_log.clone()));

    let mut object = client.new_object(Opcode::Put);
    object
        .add_header(
            RawHeaderId::BODY,
            Bytes::from(vec![0x33; 2000]),
            HeaderFlags::empty(),
        )
        .expect("body");
    client.request(object).expect("submit");

    let progress_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        progress_log.lock().expect("log").count(Event::Progress) >= 2
    })
    .await;

    client.suspend_request().expect("suspend");
    let stalled_at = server_log.lock().expect("log").events.len();

    for _ in 0..10 {
        let _ = client.work().await;
        let _ = server.work().await;
    }
    assert_eq!(
        server_log.lock().expect("log").events.len(),
        stalled_at,
        "server made progress while the client was suspended"
    );
    assert!(!client.is_idle());

    client.resume_request().expect("resume");
    let done_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        done_log.lock().expect("log").count(Event::ReqDone) > 0
    })
    .await;

    assert_eq!(
        client_log.lock().expect("log").last_response(Event::ReqDone),
        Some(ResponseCode::SUCCESS.raw())
    );
    assert!(server_log.lock().expect("log").count(Event::ReqDone) > 0);
}

/// A header flagged SUSPEND parks the object after it is sent.
#[tokio::test]
async fn test_suspend_flag_on_header() {
    let client_log = recording();
    let server_log = recording();
    let (mut client, mut server) =
        pair(Recorder::new(client_log.clone()), Recorder::new(server_log.clone()));

    let mut object = client.new_object(Opcode::Put);
    object
        .add_unicode(RawHeaderId::NAME, "staged.bin", HeaderFlags::SUSPEND)
        .expect("name");
    object
        .add_header(
            RawHeaderId::BODY,
            Bytes::from_static(b"tail"),
            HeaderFlags::empty(),
        )
        .expect("body");
    client.request(object).expect("submit");

    // The name goes out, then the object parks itself.
    for _ in 0..8 {
        let _ = client.work().await;
        let _ = server.work().await;
    }
    assert!(!client.is_idle());
    assert_eq!(client_log.lock().expect("log").count(Event::ReqDone), 0);

    client.resume_request().expect("resume");
    let done_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        done_log.lock().expect("log").count(Event::ReqDone) > 0
    })
    .await;
    assert!(client.is_idle());
}
