use bytes::Bytes;
use obex_engine_rs::models::{
    event::{Event, RspMode},
    header::{HeaderFlags, RawHeaderId},
    opcode::Opcode,
    response::ResponseCode,
    srm::SRM_ENABLE,
};

use crate::integration_tests::common::{Recorder, drive_until, pair, recording};

/// Single-Response-Mode PUT: the client pushes every request packet
/// back-to-back and the server answers exactly once, at the end.
#[tokio::test]
async fn test_srm_put_single_response() {
    let payload: Vec<u8> = (0..2500u32).map(|i| (i % 241) as u8).collect();

    let client_log = recording();
    let server_log = recording();

    let mut server_rec = Recorder::new(server_log.clone());
    server_rec.enable_srm = true;
    server_rec.on_req = Some(Box::new(|object| {
        object
            .add_u8(RawHeaderId::SRM, SRM_ENABLE, HeaderFlags::empty())
            .expect("srm ack");
    }));

    let (mut client, mut server) = pair(Recorder::new(client_log.clone()), server_rec);
    client.set_response_mode(RspMode::Single);

    let mut object = client.new_object(Opcode::Put);
    object
        .add_u8(RawHeaderId::SRM, SRM_ENABLE, HeaderFlags::empty())
        .expect("srm");
    object
        .add_unicode(RawHeaderId::NAME, "bulk.bin", HeaderFlags::empty())
        .expect("name");
    object
        .add_header(
            RawHeaderId::BODY,
            Bytes::from(payload.clone()),
            HeaderFlags::empty(),
        )
        .expect("body");
    client.request(object).expect("submit");

    let done_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        done_log.lock().expect("log").count(Event::ReqDone) > 0
    })
    .await;

    assert_eq!(
        client_log.lock().expect("log").last_response(Event::ReqDone),
        Some(ResponseCode::SUCCESS.raw())
    );

    // No intermediate CONTINUE reached the client: every client Progress
    // came from its own send path, one per request packet, and nothing was
    // flagged unexpected.
    let client_events = client_log.lock().expect("log");
    assert_eq!(client_events.count(Event::Unexpected), 0);
    let packets = client_events.count(Event::Progress);
    assert!(packets >= 10, "expected a burst of request packets, got {packets}");

    // The server emitted exactly one response packet: a single Progress
    // after the Req event.
    let server_events = server_log.lock().expect("log").events();
    let req_at = server_events
        .iter()
        .position(|e| *e == Event::Req)
        .expect("server saw the request");
    let responses = server_events[req_at..]
        .iter()
        .filter(|e| **e == Event::Progress)
        .count();
    assert_eq!(responses, 1);

    assert!(server.is_idle());
    assert_eq!(server.response_mode(), RspMode::Single);
}
