//! # GitHub Notify HTTP Service
//!
//! HTTP server receiving GitHub webhooks and turning them into chat channel
//! notifications through [`github_notify_core::NotificationPipeline`].
//!
//! This service provides:
//! - GitHub webhook endpoint with signature validation
//! - `/github subscriptions …` slash command endpoint
//! - Health check and Prometheus metrics endpoints

pub mod chat_poster;
pub mod config;
pub mod errors;
pub mod github_client;
pub mod metrics;
pub mod responses;
pub mod signature_validator;

use crate::chat_poster::{IncomingWebhookPoster, LoggingPoster, SingleNodeNotifier};
use crate::config::ServiceConfig;
use crate::errors::{ServiceError, WebhookHandlerError};
use crate::github_client::RestGitHubClient;
use crate::metrics::ServiceMetrics;
use crate::responses::{CommandRequest, CommandResponse, HealthResponse, WebhookResponse};
use crate::signature_validator::WebhookSignatureValidator;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{Json, Response},
    routing::{get, post},
    Form, Router,
};
use bytes::Bytes;
use github_notify_core::{
    broker::ClusterNotifier,
    chat::StaticUsernameResolver,
    parse_command,
    webhook::WebhookHeaders,
    ChannelId, ChatPoster, CommandInvocation, DeliveryBroker, DeliveryOutcome, GitHubClient,
    InMemoryKvStore, KvStore, NotificationPipeline, OAuthBroker, PingBroker, SubscriptionMatcher,
    SubscriptionService, SubscriptionStore, UserId, WebhookRequest,
};
use std::{collections::HashMap, sync::Arc, time::Instant};
use subtle::ConstantTimeEq;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Action of the slash command handled by this service
const SUBSCRIPTIONS_ACTION: &str = "subscriptions";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Webhook-to-post pipeline
    pub pipeline: NotificationPipeline,

    /// Subscription command handling
    pub subscriptions: SubscriptionService,

    /// Present when a webhook secret is configured
    pub signature_validator: Option<Arc<WebhookSignatureValidator>>,

    /// OAuth completion waiters, closed on shutdown
    pub oauth: Arc<OAuthBroker>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Wire the core components on top of the given collaborators
    pub fn build(
        config: ServiceConfig,
        kv: Arc<dyn KvStore>,
        github: Arc<dyn GitHubClient>,
        poster: Arc<dyn ChatPoster>,
        notifier: Arc<dyn ClusterNotifier>,
    ) -> Result<Self, ServiceError> {
        let metrics = ServiceMetrics::new().map_err(|e| ServiceError::Initialization {
            component: "metrics".to_string(),
            message: e.to_string(),
        })?;

        let notify = &config.notify;
        let store = SubscriptionStore::with_retry_policy(kv.clone(), notify.store_retry_policy());
        let broker = Arc::new(DeliveryBroker::new(kv, poster.clone(), notify));
        let matcher = SubscriptionMatcher::new(store.clone(), github.clone(), notify);

        let resolver = config
            .chat
            .usernames
            .iter()
            .fold(StaticUsernameResolver::new(), |resolver, (login, username)| {
                resolver.with_mapping(login, username)
            });

        let pipeline = NotificationPipeline::new(broker, matcher, Arc::new(resolver), PingBroker::new());
        let subscriptions = SubscriptionService::new(store, github, poster.clone(), notify);
        let oauth = Arc::new(OAuthBroker::new(notifier, poster, notify.oauth_wait()));
        let signature_validator = config
            .webhook_secret()
            .map(|secret| Arc::new(WebhookSignatureValidator::new(secret)));

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            subscriptions,
            signature_validator,
            oauth,
            metrics,
        })
    }

    /// Build the state with the production adapters for a single instance
    pub fn from_config(config: ServiceConfig) -> Result<Self, ServiceError> {
        let timeout = config.notify.request_timeout();

        let github = RestGitHubClient::new(&config.github.api_url, config.github.token.clone(), timeout)
            .map_err(|e| ServiceError::Initialization {
                component: "GitHub client".to_string(),
                message: e.to_string(),
            })?
            .with_user_logins(config.github.user_logins.clone())
            .with_webhook_url(config.github.webhook_url.clone());

        let poster: Arc<dyn ChatPoster> = match &config.chat.incoming_webhook_url {
            Some(url) => Arc::new(
                IncomingWebhookPoster::new(url, &config.chat.bot_username, timeout)
                    .map_err(|e| ServiceError::Initialization {
                        component: "chat poster".to_string(),
                        message: e.to_string(),
                    })?
                    .with_user_directory(config.chat.user_directory.clone()),
            ),
            None => {
                warn!("No chat.incoming_webhook_url configured, posts will only be logged");
                Arc::new(LoggingPoster)
            }
        };

        Self::build(
            config,
            Arc::new(InMemoryKvStore::new()),
            Arc::new(github),
            poster,
            Arc::new(SingleNodeNotifier),
        )
    }
}

// ============================================================================
// Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .route(&state.config.webhook.endpoint_path, post(handle_webhook))
        .route("/commands/github", post(handle_command))
        .route("/health", get(handle_health_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    request_logging_middleware,
                ))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server and run until a shutdown signal arrives
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let oauth = state.oauth.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: format!("{}:{}", host, port),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}:{}", host, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    // Pending OAuth waiters end with Closed instead of timing out
    oauth.close();

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

// ============================================================================
// Webhook Handler
// ============================================================================

/// Handle GitHub webhook requests
///
/// Processing is synchronous: the response is sent once every matching
/// channel has been posted to. A delivery whose ownership cannot be confirmed
/// is answered with `503` so GitHub may redeliver it.
#[instrument(skip(state, headers, body), fields(body_size = body.len()))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookHandlerError> {
    let result = process_webhook(&state, &headers, body).await;
    if let Err(e) = &result {
        state.metrics.record_rejection(e.reason());
    }
    result
}

async fn process_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookHandlerError> {
    let header_map: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_lowercase(), v.to_str().unwrap_or("").to_string()))
        .collect();

    let webhook_headers = WebhookHeaders::from_http_headers(&header_map)?;

    if let Some(validator) = &state.signature_validator {
        validator.verify(
            &body,
            webhook_headers.signature.as_deref(),
            webhook_headers.legacy_signature.as_deref(),
        )?;
    }

    let request = WebhookRequest::new(webhook_headers, body);
    let delivery_id = request.delivery_id();

    let started = Instant::now();
    let outcome = state.pipeline.handle_delivery(&request).await?;
    state.metrics.record_delivery(&outcome, started.elapsed());

    let message = match &outcome {
        DeliveryOutcome::Skipped => return Err(WebhookHandlerError::Unavailable),
        DeliveryOutcome::Ignored { event_type } => format!("Event type '{}' is not handled", event_type),
        DeliveryOutcome::Ping { listeners } => format!("Pong ({} listener(s))", listeners),
        DeliveryOutcome::Duplicate => "Delivery already handled".to_string(),
        DeliveryOutcome::Dropped => "Delivery could not be matched; no posts were made".to_string(),
        DeliveryOutcome::Delivered(report) => {
            info!(
                delivery_id = %delivery_id,
                successful = report.successful.len(),
                failed = report.failed.len(),
                "Webhook delivered"
            );
            format!(
                "Posted to {} channel(s), {} failed",
                report.successful.len(),
                report.failed.len()
            )
        }
    };

    Ok(Json(WebhookResponse {
        delivery_id: delivery_id.to_string(),
        status: outcome.label().to_string(),
        message,
    }))
}

// ============================================================================
// Command Handler
// ============================================================================

/// Handle `/github subscriptions …` slash commands
#[instrument(skip(state, request), fields(channel_id = %request.channel_id, user_id = %request.user_id))]
pub async fn handle_command(
    State(state): State<AppState>,
    Form(request): Form<CommandRequest>,
) -> Result<Json<CommandResponse>, WebhookHandlerError> {
    if let Some(expected) = state.config.chat.command_token.as_deref().filter(|t| !t.is_empty()) {
        if !bool::from(expected.as_bytes().ct_eq(request.token.as_bytes())) {
            state.metrics.record_rejection(WebhookHandlerError::Unauthorized.reason());
            return Err(WebhookHandlerError::Unauthorized);
        }
    }

    let invocation = CommandInvocation {
        channel_id: ChannelId::new(request.channel_id.as_str())?,
        user_id: UserId::new(request.user_id.as_str())?,
        username: request.user_name.clone(),
    };

    state.metrics.commands_total.inc();

    let parsed = parse_command(&format!("{} {}", request.command, request.text));
    if parsed.action != SUBSCRIPTIONS_ACTION {
        return Ok(Json(CommandResponse::ephemeral(format!(
            "Unknown action '{}'. Available actions: {}",
            parsed.action, SUBSCRIPTIONS_ACTION
        ))));
    }

    let reply = state
        .subscriptions
        .execute(&invocation, &parsed.parameters)
        .await;
    Ok(Json(CommandResponse::ephemeral(reply)))
}

// ============================================================================
// Health and Metrics
// ============================================================================

/// Basic health check endpoint
#[instrument(skip_all)]
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.render().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Correlation ID propagation, request logging and request counting
async fn request_logging_middleware(
    State(state): State<AppState>,
    mut request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response.headers_mut().insert("x-correlation-id", header_value);
    }

    let status = response.status();
    state.metrics.record_http_request(method.as_str(), status.as_u16());

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}
