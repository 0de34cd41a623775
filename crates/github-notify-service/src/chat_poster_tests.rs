use super::*;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn poster(server: &MockServer) -> IncomingWebhookPoster {
    IncomingWebhookPoster::new(format!("{}/hooks/abc", server.uri()), "github", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_create_post_sends_channel_and_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/abc"))
        .and(body_json(serde_json::json!({
            "channel": "town-square",
            "username": "github",
            "text": "hello"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let channel = ChannelId::new("town-square").unwrap();
    poster(&server).create_post(&channel, "hello").await.unwrap();
}

#[tokio::test]
async fn test_direct_message_addresses_username() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/abc"))
        .and(body_json(serde_json::json!({
            "channel": "@alice",
            "username": "github",
            "text": "connected"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let poster = poster(&server).with_user_directory(HashMap::from([(
        "8xk3q1w9ftb5mcdzr7ny4haope".to_string(),
        "alice".to_string(),
    )]));
    let user = UserId::new("8xk3q1w9ftb5mcdzr7ny4haope").unwrap();
    poster.direct_message(&user, "connected").await.unwrap();
}

#[tokio::test]
async fn test_direct_message_to_unknown_user_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let user = UserId::new("8xk3q1w9ftb5mcdzr7ny4haope").unwrap();
    let err = poster(&server).direct_message(&user, "connected").await.unwrap_err();

    assert!(matches!(err, ChatError::Rejected { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_error_statuses_classified() {
    let channel = ChannelId::new("c1").unwrap();

    for (status, transient) in [(400, false), (403, false), (429, true), (500, true), (503, true)] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = poster(&server).create_post(&channel, "x").await.unwrap_err();
        assert_eq!(err.is_transient(), transient, "status {status}: {err:?}");
        if !transient {
            assert!(matches!(err, ChatError::Rejected { .. }));
        }
    }
}

#[tokio::test]
async fn test_unreachable_host_is_unavailable() {
    let poster = IncomingWebhookPoster::new("http://127.0.0.1:9/hooks/abc", "github", Duration::from_secs(1)).unwrap();
    let channel = ChannelId::new("c1").unwrap();

    let err = poster.create_post(&channel, "x").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_user_events_are_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let user = UserId::new("alice").unwrap();
    poster(&server)
        .publish_user_event(&user, "connect", serde_json::json!({"connected": true}))
        .await
        .unwrap();
}

#[test]
fn test_logging_adapters_always_succeed() {
    let channel = ChannelId::new("c1").unwrap();
    let user = UserId::new("u1").unwrap();

    tokio_test::block_on(async {
        LoggingPoster.create_post(&channel, "x").await.unwrap();
        LoggingPoster.direct_message(&user, "x").await.unwrap();
        SingleNodeNotifier
            .send_oauth_complete(&OAuthCompleteEvent {
                user_id: user.clone(),
                error: None,
            })
            .await
            .unwrap();
    });
}
