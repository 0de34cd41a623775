//! Tests for the github-notify-core library module.

use super::*;

#[test]
fn test_repository_key_is_lowercased() {
    let key = RepositoryKey::new("Acme", "Widgets").unwrap();
    assert_eq!(key.as_str(), "acme/widgets");
    assert_eq!(key.owner(), "acme");
    assert_eq!(key.repo(), Some("widgets"));
    assert!(!key.is_org_wide());
}

#[test]
fn test_repository_key_org_wide() {
    let key = RepositoryKey::from_full_name("ACME").unwrap();
    assert_eq!(key.as_str(), "acme");
    assert!(key.is_org_wide());
    assert_eq!(key.repo(), None);
    assert_eq!(key.org_key(), key);

    let repo = RepositoryKey::from_full_name("acme/widgets").unwrap();
    assert_eq!(repo.org_key(), key);
}

#[test]
fn test_repository_key_rejects_bad_input() {
    assert!(matches!(
        RepositoryKey::from_full_name(""),
        Err(ValidationError::Required { .. })
    ));
    assert!(matches!(
        RepositoryKey::from_full_name("acme/wid gets"),
        Err(ValidationError::InvalidCharacters { .. })
    ));
    assert!(matches!(
        RepositoryKey::from_full_name("acme/widgets/extra"),
        Err(ValidationError::InvalidFormat { .. })
    ));
}

#[test]
fn test_delivery_id_validation() {
    assert!(DeliveryId::new("72d3162e-cc78-11e3-81ab-4c9367dc0958").is_ok());
    assert!(matches!(
        DeliveryId::new(""),
        Err(ValidationError::Required { .. })
    ));
    assert!(matches!(
        DeliveryId::new("a".repeat(129)),
        Err(ValidationError::TooLong { .. })
    ));
    assert!(matches!(
        DeliveryId::new("has space"),
        Err(ValidationError::InvalidCharacters { .. })
    ));
}

#[test]
fn test_delivery_id_from_payload_is_stable() {
    let a = DeliveryId::from_payload(br#"{"zen":"hi"}"#);
    let b = DeliveryId::from_payload(br#"{"zen":"hi"}"#);
    let c = DeliveryId::from_payload(br#"{"zen":"bye"}"#);

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.as_str().starts_with("body-"));
    assert_eq!(a.as_str().len(), "body-".len() + 64);
}

#[test]
fn test_retry_policy_delay_calculation() {
    let policy = RetryPolicy::exponential();

    let delay1 = policy.calculate_delay(1);
    let delay2 = policy.calculate_delay(2);
    let delay3 = policy.calculate_delay(3);

    assert!(delay1 > Duration::ZERO);
    assert!(delay2 > delay1);
    assert!(delay3 > delay2);
    assert!(delay3 <= policy.max_delay);

    assert_eq!(RetryPolicy::immediate(3).calculate_delay(2), Duration::ZERO);
}

#[test]
fn test_retry_jitter_is_bounded_and_varies() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1000),
        max_delay: Duration::from_secs(10),
        backoff_multiplier: 2.0,
        jitter_enabled: true,
    };

    let delays: std::collections::HashSet<Duration> = (0..200).map(|_| policy.calculate_delay(1)).collect();

    assert!(delays
        .iter()
        .all(|d| *d >= Duration::from_millis(750) && *d <= Duration::from_millis(1250)));
    // Contending writers retrying the same attempt must not wake in lockstep
    assert!(delays.len() > 1);
}

#[test]
fn test_error_categories() {
    let storage = NotifyError::Storage(kv::KvError::Unavailable {
        message: "down".to_string(),
    });
    assert!(storage.is_transient());
    assert_eq!(storage.error_category(), ErrorCategory::Transient);

    let forbidden = NotifyError::GitHub(github::GitHubError::Forbidden {
        message: "no".to_string(),
    });
    assert_eq!(forbidden.error_category(), ErrorCategory::Authorization);

    let config = NotifyError::Configuration {
        message: "bad".to_string(),
    };
    assert!(!config.is_transient());
    assert_eq!(config.error_category(), ErrorCategory::Configuration);
}
