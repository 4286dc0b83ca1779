use bytes::Bytes;
use obex_engine_rs::models::{
    event::Event,
    header::{HeaderFlags, RawHeaderId},
    opcode::Opcode,
    response::ResponseCode,
};

use crate::integration_tests::common::{Recorder, drive_until, pair, recording};

/// A 600-byte GET at the 255-byte minimum MTU: the body arrives in three
/// fragments and coalesces into exactly one Body header on the client.
#[tokio::test]
async fn test_get_reassembles_split_body() {
    let payload: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
    let served = Bytes::from(payload.clone());

    let client_log = recording();
    let server_log = recording();

    let mut server_rec = Recorder::new(server_log.clone());
    server_rec.on_req = Some(Box::new(move |object| {
        object.set_response(ResponseCode::CONTINUE, ResponseCode::SUCCESS);
        object
            .add_u32(RawHeaderId::LENGTH, served.len() as u32, HeaderFlags::empty())
            .expect("length");
        object
            .add_header(RawHeaderId::BODY, served.clone(), HeaderFlags::empty())
            .expect("body");
    }));

    let mut client_rec = Recorder::new(client_log.clone());
    let received = recording();
    let received_inner = received.clone();
    client_rec.on_req_done = Some(Box::new(move |object| {
        let mut out = received_inner.lock().expect("received lock");

        // First walk.
        let mut first = Vec::new();
        while let Some(hdr) = object.next_rx_header() {
            first.push((hdr.id().raw(), hdr.bytes().to_vec()));
        }
        // Rewinding yields the identical sequence.
        object.reparse_rx_headers();
        let mut second = Vec::new();
        while let Some(hdr) = object.next_rx_header() {
            second.push((hdr.id().raw(), hdr.bytes().to_vec()));
        }
        assert_eq!(first, second);

        for (id, data) in first {
            if id == RawHeaderId::BODY.raw() {
                out.events.push((Event::Progress, Some(id)));
                out.stream_body.extend_from_slice(&data);
            }
        }
    }));

    let (mut client, mut server) = pair(client_rec, server_rec);

    let mut object = client.new_object(Opcode::Get);
    object
        .add_unicode(RawHeaderId::NAME, "x", HeaderFlags::empty())
        .expect("name");
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

    let received = received.lock().expect("received");
    // Exactly one Body header with the full payload.
    assert_eq!(received.events.len(), 1);
    assert_eq!(received.stream_body, payload);

    // The server needed several response packets for 600 bytes at MTU 255.
    assert!(server_log.lock().expect("log").count(Event::Progress) >= 3);
}

/// The same transfer with a streaming receiver: fragments arrive as
/// `StreamAvail` views followed by an empty end-of-stream sentinel.
#[tokio::test]
async fn test_get_streamed_receiver() {
    let payload: Vec<u8> = (0..600u32).map(|i| (i % 163) as u8).collect();
    let served = Bytes::from(payload.clone());

    let server_log = recording();
    let mut server_rec = Recorder::new(server_log.clone());
    server_rec.on_req = Some(Box::new(move |object| {
        object.set_response(ResponseCode::CONTINUE, ResponseCode::SUCCESS);
        object
            .add_header(RawHeaderId::BODY, served.clone(), HeaderFlags::empty())
            .expect("body");
    }));

    let client_log = recording();
    let (mut client, mut server) = pair(Recorder::new(client_log.clone()), server_rec);

    let mut object = client.new_object(Opcode::Get);
    object
        .add_unicode(RawHeaderId::NAME, "x", HeaderFlags::empty())
        .expect("name");
    object.stream_body();
    client.request(object).expect("submit");

    let done_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        done_log.lock().expect("log").count(Event::ReqDone) > 0
    })
    .await;

    let log = client_log.lock().expect("log");
    assert_eq!(log.stream_body, payload);
    assert!(log.count(Event::StreamAvail) >= 2);
    assert_eq!(log.last_response(Event::ReqDone), Some(0x20));
}
