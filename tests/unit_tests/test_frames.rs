use hex_literal::hex;
use obex_engine_rs::models::frame::{
    CommonFrame, ConnectFrame, DEFAULT_MTU, FRAME_LEN, MINIMUM_MTU, OBEX_VERSION,
    SetPathFrame,
};

#[test]
fn test_common_frame_peek() {
    let frame = CommonFrame::peek(&hex!("A0 0003")).expect("full frame");
    assert_eq!(frame.opcode.raw(), 0xA0);
    assert!(frame.opcode.is_final());
    assert_eq!(frame.total_len(), 3);

    assert!(CommonFrame::peek(&hex!("A0 00")).is_none());
}

#[test]
fn test_connect_frame_roundtrip() {
    let encoded = ConnectFrame::new(0x2000).encode();
    assert_eq!(&encoded[..], hex!("10 00 2000"));

    let parsed = ConnectFrame::parse(&encoded).expect("parse");
    assert_eq!(parsed.version, OBEX_VERSION);
    assert_eq!(parsed.flags, 0x00);
    assert_eq!(parsed.mtu.get(), 0x2000);
}

#[test]
fn test_connect_frame_needs_four_bytes() {
    assert!(ConnectFrame::parse(&hex!("10 00 20")).is_err());
}

#[test]
fn test_setpath_frame_passthrough() {
    let encoded = SetPathFrame::new(0x02, 0x00).encode();
    assert_eq!(&encoded[..], hex!("02 00"));
    let parsed = SetPathFrame::parse(&encoded).expect("parse");
    assert_eq!(parsed.flags, 0x02);
    assert_eq!(parsed.constants, 0x00);
}

#[test]
fn test_protocol_constants() {
    assert_eq!(FRAME_LEN, 3);
    assert_eq!(MINIMUM_MTU, 255);
    assert_eq!(DEFAULT_MTU, 1024);
    assert_eq!(OBEX_VERSION, 0x10);
}
