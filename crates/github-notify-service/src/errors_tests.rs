use super::*;
use github_notify_core::NormalizationError;

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_status_codes() {
    let cases = [
        (
            WebhookHandlerError::InvalidHeaders(ValidationError::Required {
                field: "X-GitHub-Event".to_string(),
            }),
            StatusCode::BAD_REQUEST,
        ),
        (
            WebhookHandlerError::InvalidSignature(SignatureError::Mismatch),
            StatusCode::UNAUTHORIZED,
        ),
        (WebhookHandlerError::Unauthorized, StatusCode::UNAUTHORIZED),
        (WebhookHandlerError::Unavailable, StatusCode::SERVICE_UNAVAILABLE),
        (
            WebhookHandlerError::InternalError {
                message: "boom".to_string(),
            },
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(error.into_response().status(), expected);
    }
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let error = WebhookHandlerError::from(PipelineError::MalformedPayload(NormalizationError::MalformedPayload {
        event_type: "issues".to_string(),
        message: "expected value".to_string(),
    }));
    assert_eq!(error.reason(), "malformed_payload");
    assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unavailable_sets_retry_after() {
    let response = WebhookHandlerError::Unavailable.into_response();

    assert_eq!(
        response.headers().get("Retry-After").unwrap(),
        RETRY_AFTER_SECONDS.to_string().as_str()
    );
    let body = body_json(response).await;
    assert_eq!(body["status"], 503);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_internal_error_details_hidden() {
    let response = WebhookHandlerError::InternalError {
        message: "kv store connection string leaked".to_string(),
    }
    .into_response();

    assert!(response.headers().get("Retry-After").is_none());
    let body = body_json(response).await;
    assert!(!body["error"].as_str().unwrap().contains("leaked"));
}
