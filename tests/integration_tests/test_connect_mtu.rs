use obex_engine_rs::models::{
    event::Event, opcode::Opcode, response::ResponseCode,
};

use crate::integration_tests::common::{Recorder, drive_until, pair, recording};

async fn negotiate(
    client_mtu: (u16, u16),
    server_mtu: (u16, u16),
) -> (u16, u16) {
    let client_log = recording();
    let server_log = recording();

    let mut server_rec = Recorder::new(server_log.clone());
    server_rec.on_req = Some(Box::new(|object| {
        object.set_response(ResponseCode::SUCCESS, ResponseCode::SUCCESS);
    }));

    let (mut client, mut server) = pair(Recorder::new(client_log.clone()), server_rec);
    client
        .set_mtu(client_mtu.0, client_mtu.1)
        .expect("client mtu");
    server
        .set_mtu(server_mtu.0, server_mtu.1)
        .expect("server mtu");

    let object = client.new_object(Opcode::Connect);
    client.request(object).expect("submit connect");

    let done_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        done_log.lock().expect("log").count(Event::ReqDone) > 0
    })
    .await;

    assert_eq!(
        client_log.lock().expect("log").last_response(Event::ReqDone),
        Some(ResponseCode::SUCCESS.raw())
    );
    (client.mtu_tx(), server.mtu_tx())
}

/// The negotiated TX MTU is the peer's receive window capped by our own
/// transmit bound.
#[tokio::test]
async fn test_connect_negotiates_min_of_peer_and_cap() {
    // Peer accepts 512, we could send 1024: 512 wins.
    let (client_tx, server_tx) = negotiate((1024, 1024), (512, 4096)).await;
    assert_eq!(client_tx, 512);
    // The server sends toward our 1024-byte receive window.
    assert_eq!(server_tx, 1024);
}

#[tokio::test]
async fn test_connect_caps_at_own_maximum() {
    // Peer would accept 4096 but our cap is 1024.
    let (client_tx, _) = negotiate((1024, 1024), (4096, 4096)).await;
    assert_eq!(client_tx, 1024);
}

/// DISCONNECT drops the negotiated MTU back to the protocol minimum.
#[tokio::test]
async fn test_disconnect_resets_mtu() {
    let client_log = recording();
    let server_log = recording();

    let mut server_rec = Recorder::new(server_log.clone());
    server_rec.on_req = Some(Box::new(|object| {
        object.set_response(ResponseCode::SUCCESS, ResponseCode::SUCCESS);
    }));

    let (mut client, mut server) = pair(Recorder::new(client_log.clone()), server_rec);
    client.set_mtu(2048, 2048).expect("client mtu");
    server.set_mtu(2048, 2048).expect("server mtu");

    let object = client.new_object(Opcode::Connect);
    client.request(object).expect("submit connect");
    let done_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        done_log.lock().expect("log").count(Event::ReqDone) > 0
    })
    .await;
    assert_eq!(client.mtu_tx(), 2048);

    let object = client.new_object(Opcode::Disconnect);
    client.request(object).expect("submit disconnect");
    let done_log = client_log.clone();
    drive_until(&mut client, &mut server, move || {
        done_log.lock().expect("log").count(Event::ReqDone) > 1
    })
    .await;

    assert_eq!(client.mtu_tx(), 255);
    assert_eq!(server.mtu_tx(), 255);
}
