use std::net::SocketAddr;

use bytes::Bytes;
use obex_engine_rs::{
    engine::{Engine, InitFlags},
    models::{
        event::Event,
        header::{HeaderFlags, RawHeaderId},
        opcode::Opcode,
        response::ResponseCode,
    },
    transport::{Transport, tcp::TcpTransport},
};
use serial_test::serial;

use crate::integration_tests::common::{
    Recorder, drive_until, init_test_logging, recording,
};

/// A PUT over real loopback TCP, exercising listen/accept/connect.
#[tokio::test]
#[serial]
async fn test_put_over_tcp() {
    init_test_logging();
    let bind: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let mut server_transport = TcpTransport::new().with_local(bind);
    server_transport.listen().await.expect("listen");
    let addr = server_transport.local_addr().expect("bound addr");

    let client_log = recording();
    let server_log = recording();

    let mut server_rec = Recorder::new(server_log.clone());
    server_rec.on_req = Some(Box::new(|object| {
        object.set_response(ResponseCode::SUCCESS, ResponseCode::SUCCESS);
    }));

    let mut server = Engine::new(server_transport, server_rec, InitFlags::empty());
    let mut client = Engine::new(
        TcpTransport::new().with_remote(addr),
        Recorder::new(client_log.clone()),
        InitFlags::empty(),
    );
    client.set_timeout(20);
    server.set_timeout(20);

    client.transport_connect().await.expect("connect");

    let mut object = client.new_object(Opcode::Put);
    object
        .add_unicode(RawHeaderId::NAME, "tcp.txt", HeaderFlags::empty())
        .expect("name");
    object
        .add_header(
            RawHeaderId::BODY,
            Bytes::from_static(b"over tcp"),
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
    assert!(server_log.lock().expect("log").count(Event::ReqDone) > 0);
}
