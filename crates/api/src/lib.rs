mod guards;
mod rate_limit;
mod settings;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Json, Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use teller_agents::{build_router, BankingRouter, BootstrapOptions, RouterConfig};
use teller_core::{ChatInput, Outcome, ResponseEnvelope, ResponseStatus, RoutingError};
use teller_observability::{AppMetrics, MetricsSnapshot};
use teller_storage::Store;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use crate::rate_limit::IpRateLimiter;
pub use crate::settings::{ApiSettings, DEFAULT_API_KEY};

const MAX_BODY_BYTES: usize = 64 * 1024;
const MAX_TEXT_CHARS: usize = 2_000;
const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 20;

#[derive(Clone)]
pub struct ApiState {
    pub router: Arc<BankingRouter<Store>>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub default_account: String,
    pub allowed_origins: Arc<Vec<String>>,
}

impl ApiState {
    pub fn new(
        router: BankingRouter<Store>,
        default_account: impl Into<String>,
        settings: ApiSettings,
    ) -> Self {
        Self {
            metrics: router.metrics().clone(),
            router: Arc::new(router),
            api_key: settings.api_key,
            limiter: IpRateLimiter::new(settings.rate_limit_window, settings.rate_limit_max),
            default_account: default_account.into(),
            allowed_origins: Arc::new(settings.allowed_origins),
        }
    }
}

pub async fn build_app(kb_root: impl AsRef<Path>) -> Result<Router> {
    let options = BootstrapOptions::from_env(kb_root.as_ref());
    let router = build_router(&options).await?;
    let state = ApiState::new(router, options.account_id.clone(), ApiSettings::from_env());
    Ok(build_routes(state))
}

pub fn build_routes(state: ApiState) -> Router {
    let http_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    Router::new()
        .route("/health", get(health))
        .route("/v1/chat", post(chat))
        .route("/v1/accounts/:account_id", get(account))
        .route("/v1/accounts/:account_id/transactions", get(transactions))
        .route("/v1/kb/search", get(kb_search))
        // Guards sit inside the header layers so 401 and 429 replies carry them.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guards::require_api_key,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), guards::throttle))
        .layer(middleware::from_fn(guards::security_headers))
        .layer(guards::cors_layer(&state.allowed_origins))
        .layer(http_stack)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    ledger_backend: &'static str,
    metrics: MetricsSnapshot,
    config: RouterConfig,
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        ledger_backend: state.router.ledger().backend(),
        metrics: state.metrics.snapshot(),
        config: state.router.config().clone(),
    };
    (StatusCode::OK, Json(payload))
}

async fn chat(State(state): State<ApiState>, Json(input): Json<ChatInput>) -> Response {
    let text = input.text.trim();
    if text.is_empty() || text.chars().count() > MAX_TEXT_CHARS {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_text",
            format!("text must be between 1 and {MAX_TEXT_CHARS} characters"),
        );
    }

    let account_id = input
        .account_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(&state.default_account);

    let envelope = state.router.handle(account_id, text).await;
    (envelope_status(&envelope), Json(envelope)).into_response()
}

fn envelope_status(envelope: &ResponseEnvelope) -> StatusCode {
    match envelope.status {
        ResponseStatus::Ok | ResponseStatus::Rejected => StatusCode::OK,
        ResponseStatus::Error => match &envelope.decision.outcome {
            Outcome::Declined { error } if error.is_service_unavailable() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

async fn account(
    State(state): State<ApiState>,
    AxumPath(account_id): AxumPath<String>,
) -> Response {
    match state.router.account(&account_id).await {
        Ok(Some(account)) => (StatusCode::OK, Json(account)).into_response(),
        Ok(None) => routing_error_response(RoutingError::AccountNotFound { account_id }),
        Err(err) => routing_error_response(err),
    }
}

async fn transactions(
    State(state): State<ApiState>,
    AxumPath(account_id): AxumPath<String>,
) -> Response {
    match state.router.history(&account_id).await {
        Ok(history) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "account_id": account_id,
                "transactions": history,
            })),
        )
            .into_response(),
        Err(err) => routing_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct KbSearchQuery {
    q: String,
    limit: Option<usize>,
}

async fn kb_search(State(state): State<ApiState>, Query(query): Query<KbSearchQuery>) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    match state.router.kb_search(&query.q, limit).await {
        Ok(hits) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "query": query.q,
                "hits": hits,
            })),
        )
            .into_response(),
        Err(err) => routing_error_response(err),
    }
}

fn routing_error_response(err: RoutingError) -> Response {
    let status = match &err {
        RoutingError::AccountNotFound { .. } => StatusCode::NOT_FOUND,
        err if err.is_service_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
        RoutingError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.kind(), err.to_string())
}

pub(crate) fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use teller_core::{Adapter, RouterDecision, SideEffects};

    fn envelope(status: ResponseStatus, error: Option<RoutingError>) -> ResponseEnvelope {
        let outcome = match error {
            Some(error) => Outcome::Declined { error },
            None => Outcome::Frozen {
                account_id: "primary".to_string(),
            },
        };
        ResponseEnvelope {
            status,
            message: String::new(),
            side_effects: SideEffects::default(),
            decision: RouterDecision {
                account_id: "primary".to_string(),
                action_class: None,
                raw_intent: None,
                resolved_intent: None,
                corrected: false,
                entities: Vec::new(),
                outcome,
            },
        }
    }

    #[test]
    fn adapter_failures_map_to_service_unavailable() {
        let timed_out = envelope(
            ResponseStatus::Error,
            Some(RoutingError::AdapterTimeout {
                adapter: Adapter::RetrievalGateway,
                timeout_ms: 2000,
            }),
        );
        assert_eq!(envelope_status(&timed_out), StatusCode::SERVICE_UNAVAILABLE);

        let storage = envelope(
            ResponseStatus::Error,
            Some(RoutingError::Storage {
                reason: "disk full".to_string(),
            }),
        );
        assert_eq!(envelope_status(&storage), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejected_envelopes_are_still_http_ok() {
        assert_eq!(envelope_status(&envelope(ResponseStatus::Rejected, None)), StatusCode::OK);
    }
}
