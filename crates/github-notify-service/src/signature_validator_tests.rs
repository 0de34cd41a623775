//! Tests for [`WebhookSignatureValidator`].

use super::*;

fn sign_sha256(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn sign_sha1(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

const PAYLOAD: &[u8] = br#"{"zen":"Speak like a human."}"#;

#[test]
fn test_valid_sha256_signature_accepted() {
    let validator = WebhookSignatureValidator::new("it's-a-secret");
    let signature = sign_sha256("it's-a-secret", PAYLOAD);

    assert_eq!(validator.verify(PAYLOAD, Some(&signature), None), Ok(()));
}

/// Example delivery from GitHub's webhook validation documentation
#[test]
fn test_github_documented_example() {
    let validator = WebhookSignatureValidator::new("It's a Secret to Everybody");
    let signature = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";

    assert_eq!(validator.verify(b"Hello, World!", Some(signature), None), Ok(()));
}

#[test]
fn test_wrong_secret_rejected() {
    let validator = WebhookSignatureValidator::new("right");
    let signature = sign_sha256("wrong", PAYLOAD);

    assert_eq!(
        validator.verify(PAYLOAD, Some(&signature), None),
        Err(SignatureError::Mismatch)
    );
}

#[test]
fn test_tampered_payload_rejected() {
    let validator = WebhookSignatureValidator::new("secret");
    let signature = sign_sha256("secret", PAYLOAD);

    assert_eq!(
        validator.verify(br#"{"zen":"Tampered."}"#, Some(&signature), None),
        Err(SignatureError::Mismatch)
    );
}

#[test]
fn test_legacy_sha1_signature_accepted() {
    let validator = WebhookSignatureValidator::new("secret");
    let signature = sign_sha1("secret", PAYLOAD);

    assert_eq!(validator.verify(PAYLOAD, None, Some(&signature)), Ok(()));
    assert_eq!(
        validator.verify(b"other", None, Some(&signature)),
        Err(SignatureError::Mismatch)
    );
}

#[test]
fn test_sha256_takes_precedence_over_sha1() {
    let validator = WebhookSignatureValidator::new("secret");
    let good_sha1 = sign_sha1("secret", PAYLOAD);
    let bad_sha256 = sign_sha256("other", PAYLOAD);

    assert_eq!(
        validator.verify(PAYLOAD, Some(&bad_sha256), Some(&good_sha1)),
        Err(SignatureError::Mismatch)
    );
}

#[test]
fn test_missing_and_malformed_signatures() {
    let validator = WebhookSignatureValidator::new("secret");

    assert_eq!(validator.verify(PAYLOAD, None, None), Err(SignatureError::Missing));
    assert!(matches!(
        validator.verify(PAYLOAD, Some("sha256=zz"), None),
        Err(SignatureError::Malformed { .. })
    ));
    assert!(matches!(
        validator.verify(PAYLOAD, Some("md5=abcd"), None),
        Err(SignatureError::Malformed { .. })
    ));
    // Truncated digest
    assert_eq!(
        validator.verify(PAYLOAD, Some("sha256=abcd"), None),
        Err(SignatureError::Mismatch)
    );
}

#[test]
fn test_debug_redacts_secret() {
    let debug = format!("{:?}", WebhookSignatureValidator::new("hunter2"));
    assert!(!debug.contains("hunter2"));
}
