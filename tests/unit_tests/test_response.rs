use obex_engine_rs::models::response::ResponseCode;

#[test]
fn test_wire_byte_strips_final_bit() {
    assert_eq!(ResponseCode::from_wire(0x90), ResponseCode::CONTINUE);
    assert_eq!(ResponseCode::from_wire(0xA0), ResponseCode::SUCCESS);
    assert_eq!(ResponseCode::from_wire(0xC3), ResponseCode::FORBIDDEN);
    assert_eq!(ResponseCode::from_wire(0xD0), ResponseCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_categories() {
    assert!(ResponseCode::CONTINUE.is_informational());
    assert!(ResponseCode::CONTINUE.is_accepted());
    assert!(ResponseCode::SUCCESS.is_success());
    assert!(ResponseCode::SUCCESS.is_accepted());
    assert!(!ResponseCode::BAD_REQUEST.is_accepted());
    assert!(!ResponseCode::NOT_IMPLEMENTED.is_accepted());
}

#[test]
fn test_display_strings() {
    assert_eq!(ResponseCode::SUCCESS.to_string(), "OK, Success");
    assert_eq!(ResponseCode::NOT_FOUND.to_string(), "Not found");
    assert_eq!(ResponseCode::DATABASE_LOCKED.to_string(), "Database locked");
    assert_eq!(ResponseCode::from_wire(0x7E).to_string(), "Unknown response");
}
