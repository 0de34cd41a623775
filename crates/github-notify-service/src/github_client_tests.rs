//! Tests for [`RestGitHubClient`] against a mock GitHub API.

use super::*;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user() -> UserId {
    UserId::new("u1").unwrap()
}

async fn client(server: &MockServer) -> RestGitHubClient {
    RestGitHubClient::new(&server.uri(), Some("test-token".to_string()), Duration::from_secs(5))
        .unwrap()
        .with_user_logins(HashMap::from([("u1".to_string(), "alice".to_string())]))
}

#[tokio::test]
async fn test_repository_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("Accept", "application/vnd.github+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1,
            "full_name": "Acme/Widgets",
            "private": true,
            "html_url": "https://github.com/Acme/Widgets"
        })))
        .mount(&server)
        .await;

    let info = client(&server).await.repository(&user(), "acme", "widgets").await.unwrap();

    assert_eq!(
        info,
        RepositoryInfo {
            full_name: "Acme/Widgets".to_string(),
            private: true,
            html_url: "https://github.com/Acme/Widgets".to_string(),
        }
    );
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let server = MockServer::start().await;
    for (repo, status) in [("missing", 404), ("denied", 403), ("expired", 401), ("broken", 502)] {
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/{}", repo)))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;
    }
    let client = client(&server).await;

    let lookup = |repo: &'static str| {
        let client = client.clone();
        async move { client.repository(&user(), "acme", repo).await.unwrap_err() }
    };

    assert!(matches!(lookup("missing").await, GitHubError::NotFound { .. }));
    assert!(matches!(lookup("denied").await, GitHubError::Forbidden { .. }));
    assert!(matches!(lookup("expired").await, GitHubError::Unauthorized { .. }));
    let broken = lookup("broken").await;
    assert!(broken.is_transient(), "{broken:?}");
}

#[tokio::test]
async fn test_repository_access_follows_collaborator_permission() {
    let server = MockServer::start().await;
    for (repo, permission) in [("widgets", "write"), ("docs", "read"), ("revoked", "none")] {
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/{}/collaborators/alice/permission", repo)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "permission": permission,
                "user": {"login": "alice"}
            })))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/repos/acme/secret/collaborators/alice/permission"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/broken/collaborators/alice/permission"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let client = client(&server).await;

    assert!(client.has_repository_access(&user(), "acme/widgets").await.unwrap());
    assert!(client.has_repository_access(&user(), "acme/docs").await.unwrap());
    assert!(!client.has_repository_access(&user(), "acme/revoked").await.unwrap());
    assert!(!client.has_repository_access(&user(), "acme/secret").await.unwrap());
    assert!(client.has_repository_access(&user(), "acme/broken").await.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_unmapped_user_has_no_access() {
    let server = MockServer::start().await;
    // The service token can read the repository, which must not leak to other users
    Mock::given(method("GET"))
        .and(path("/repos/acme/secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"full_name": "acme/secret"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/secret/collaborators/alice/permission"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"permission": "admin"})))
        .mount(&server)
        .await;
    let client = client(&server).await;

    let stranger = UserId::new("u2").unwrap();
    assert!(!client.has_repository_access(&stranger, "acme/secret").await.unwrap());
    assert!(client.has_repository_access(&user(), "acme/secret").await.unwrap());
}

#[tokio::test]
async fn test_webhook_exists_matches_delivery_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/hooks"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 1, "config": {"url": "https://ci.example.com/hook"}},
            {"id": 2, "config": {"url": "https://notify.example.com/webhook"}}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/hooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 3, "config": {"url": "https://ci.example.com/hook"}}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/secret/hooks"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let client = client(&server)
        .await
        .with_webhook_url(Some("https://notify.example.com".to_string()));

    assert!(client.webhook_exists(&user(), "acme", Some("widgets")).await.unwrap());
    assert!(!client.webhook_exists(&user(), "acme", None).await.unwrap());
    assert!(matches!(
        client.webhook_exists(&user(), "acme", Some("secret")).await,
        Err(GitHubError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_webhook_exists_follows_pages() {
    let server = MockServer::start().await;
    let foreign: Vec<serde_json::Value> = (0..100)
        .map(|id| serde_json::json!({"id": id, "config": {"url": "https://ci.example.com/hook"}}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/orgs/acme/hooks"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(foreign))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/hooks"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 100, "config": {"url": "https://notify.example.com/webhook"}}
        ])))
        .mount(&server)
        .await;
    let client = client(&server)
        .await
        .with_webhook_url(Some("https://notify.example.com".to_string()));

    assert!(client.webhook_exists(&user(), "acme", None).await.unwrap());
}

#[tokio::test]
async fn test_organization_membership() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/members/alice"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/members/mallory"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/members/bob"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let client = client(&server).await;

    assert!(client.is_organization_member("acme", "alice").await.unwrap());
    assert!(!client.is_organization_member("acme", "mallory").await.unwrap());
    assert!(client.is_organization_member("acme", "bob").await.is_err());
}

#[tokio::test]
async fn test_owner_exists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"login": "acme"})))
        .mount(&server)
        .await;
    let client = client(&server).await;

    assert!(client.owner_exists(&user(), "acme").await.unwrap());
    // Unmatched requests get wiremock's default 404
    assert!(!client.owner_exists(&user(), "nobody").await.unwrap());
}

#[tokio::test]
async fn test_unreachable_api_is_transient() {
    let client = RestGitHubClient::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();

    let err = client.owner_exists(&user(), "acme").await.unwrap_err();
    assert!(err.is_transient());
}
