use payment_orders::signature::{sign_payload, verify_signature, SignatureMode, WebhookVerifier};

const SECRET: &str = "wsk_r2d2c3po";
const PAYLOAD: &[u8] = br#"{"event":"ORDER_COMPLETED","order_id":"6516e61c-d279-a454-a837-bc52ce55ed49"}"#;
const TIMESTAMP: &str = "1683650202360";

#[test]
fn valid_signature_is_accepted() {
    let header = sign_payload(SECRET, PAYLOAD, TIMESTAMP);
    assert!(header.starts_with("v1="));
    assert_eq!(header.len(), 3 + 64);
    assert!(verify_signature(SECRET, PAYLOAD, &header, TIMESTAMP));
}

#[test]
fn any_single_byte_change_is_rejected() {
    let header = sign_payload(SECRET, PAYLOAD, TIMESTAMP);

    let mut tampered = PAYLOAD.to_vec();
    tampered[10] ^= 0x01;
    assert!(!verify_signature(SECRET, &tampered, &header, TIMESTAMP));

    assert!(!verify_signature(SECRET, PAYLOAD, &header, "1683650202361"));
    assert!(!verify_signature("wsk_r2d2c3pO", PAYLOAD, &header, TIMESTAMP));
}

#[test]
fn malformed_headers_are_rejected() {
    let header = sign_payload(SECRET, PAYLOAD, TIMESTAMP);
    let bare_hex = header.trim_start_matches("v1=");

    assert!(!verify_signature(SECRET, PAYLOAD, bare_hex, TIMESTAMP));
    assert!(!verify_signature(SECRET, PAYLOAD, &header[..header.len() - 2], TIMESTAMP));
    assert!(!verify_signature(SECRET, PAYLOAD, "v1=not-hex", TIMESTAMP));
    assert!(!verify_signature(SECRET, PAYLOAD, "", TIMESTAMP));
    assert!(!verify_signature(SECRET, PAYLOAD, &header, ""));
}

#[test]
fn strict_mode_without_secret_rejects_everything() {
    let verifier = WebhookVerifier::new(None, SignatureMode::Strict, None);
    let header = sign_payload(SECRET, PAYLOAD, TIMESTAMP);
    assert!(!verifier.verify(PAYLOAD, &header, TIMESTAMP));
}

#[test]
fn permissive_mode_without_secret_accepts_unsigned() {
    let verifier = WebhookVerifier::new(Some(String::new()), SignatureMode::Permissive, None);
    assert!(verifier.verify(PAYLOAD, "", ""));
}

#[test]
fn permissive_mode_with_secret_still_verifies() {
    let verifier = WebhookVerifier::new(Some(SECRET.to_string()), SignatureMode::Permissive, None);
    assert!(!verifier.verify(PAYLOAD, "v1=00", TIMESTAMP));
}

#[test]
fn stale_timestamps_fail_when_tolerance_is_set() {
    let verifier = WebhookVerifier::new(Some(SECRET.to_string()), SignatureMode::Strict, Some(300));

    let fresh = chrono::Utc::now().timestamp_millis().to_string();
    let header = sign_payload(SECRET, PAYLOAD, &fresh);
    assert!(verifier.verify(PAYLOAD, &header, &fresh));

    let stale = (chrono::Utc::now().timestamp_millis() - 10 * 60 * 1000).to_string();
    let header = sign_payload(SECRET, PAYLOAD, &stale);
    assert!(!verifier.verify(PAYLOAD, &header, &stale));
}
