use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use teller_agents::{Adapters, BankingRouter, RouterConfig};
use teller_api::{build_app, build_routes, ApiSettings, ApiState};
use teller_core::{EntityMention, IntentLabel, IntentPrediction, RetrievedChunk, RoutingTables};
use teller_ml::{EntityExtractor, IntentClassifier, RuleEntityExtractor, RuleIntentClassifier};
use teller_observability::AppMetrics;
use teller_retrieval::RetrievalGateway;
use teller_storage::{LedgerRepository, Store};
use tower::ServiceExt;

const API_KEY: &str = "dev-teller-key";

fn kb_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../kb")
}

async fn app() -> Router {
    build_app(kb_root()).await.expect("app should build")
}

struct BrokenEntities;

impl EntityExtractor for BrokenEntities {
    fn model_name(&self) -> &'static str {
        "broken"
    }

    fn extract(&self, _text: &str) -> anyhow::Result<Vec<EntityMention>> {
        anyhow::bail!("ner model not loaded")
    }
}

struct SlowRetrieval;

impl RetrievalGateway for SlowRetrieval {
    fn search(&self, _query: &str) -> anyhow::Result<Vec<RetrievedChunk>> {
        std::thread::sleep(Duration::from_millis(400));
        Ok(Vec::new())
    }
}

struct AlwaysCardArrival;

impl IntentClassifier for AlwaysCardArrival {
    fn model_name(&self) -> &'static str {
        "fixed"
    }

    fn classify(&self, _text: &str) -> anyhow::Result<IntentPrediction> {
        Ok(IntentPrediction::new(IntentLabel::CardArrival, 0.9))
    }
}

async fn app_with(adapters: Adapters, settings: ApiSettings) -> Router {
    let store = Store::memory();
    store.open_account("primary", dec!(5000.00)).await.unwrap();
    let router = BankingRouter::new(
        adapters,
        RoutingTables::default(),
        Arc::new(store),
        AppMetrics::shared(),
        RouterConfig::default().with_adapter_timeout(Duration::from_millis(100)),
    );
    build_routes(ApiState::new(router, "primary", settings))
}

fn rule_adapters(retrieval: Arc<dyn RetrievalGateway>) -> Adapters {
    Adapters {
        classifier: Arc::new(RuleIntentClassifier),
        extractor: Arc::new(RuleEntityExtractor::new()),
        retrieval,
    }
}

fn chat_request(text: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(json!({ "text": text }).to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let response = app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["ledger_backend"], "memory");
}

#[tokio::test]
async fn chat_requires_api_key() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "Send $100 to John" }).to_string()))
        .unwrap();

    let response = app().await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unauthorized_replies_carry_security_and_cors_headers() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .header("origin", "http://localhost:3000")
        .body(Body::from(json!({ "text": "Send $100 to John" }).to_string()))
        .unwrap();

    let response = app().await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["access-control-allow-origin"], "http://localhost:3000");
    assert!(headers.get("x-request-id").is_some());
}

#[tokio::test]
async fn throttled_replies_carry_security_headers() {
    let settings = ApiSettings {
        rate_limit_max: 1,
        ..ApiSettings::default()
    };
    let app = app_with(rule_adapters(Arc::new(SlowRetrieval)), settings).await;

    let first = app.clone().oneshot(get("/v1/accounts/primary")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(get("/v1/accounts/primary")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["x-frame-options"], "DENY");
}

#[tokio::test]
async fn failing_extractor_is_503() {
    let adapters = Adapters {
        extractor: Arc::new(BrokenEntities),
        ..rule_adapters(Arc::new(SlowRetrieval))
    };
    let app = app_with(adapters, ApiSettings::default()).await;

    let response = app
        .clone()
        .oneshot(chat_request("Send $100 to John"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ERROR");
    assert_eq!(parsed["decision"]["outcome"]["error"]["kind"], "adapter_failure");

    let history = json_body(
        app.oneshot(get("/v1/accounts/primary/transactions"))
            .await
            .unwrap(),
    )
    .await;
    assert!(history["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn slow_retrieval_is_503() {
    let adapters = Adapters {
        classifier: Arc::new(AlwaysCardArrival),
        ..rule_adapters(Arc::new(SlowRetrieval))
    };
    let app = app_with(adapters, ApiSettings::default()).await;

    let response = app
        .oneshot(chat_request("when will my card arrive"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let parsed = json_body(response).await;
    assert_eq!(parsed["decision"]["outcome"]["error"]["kind"], "adapter_timeout");
}

#[tokio::test]
async fn chat_transfer_returns_envelope_and_updates_balance() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(chat_request("Send $100 to John"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "OK");
    assert_eq!(parsed["decision"]["action_class"], "transfer_action");
    assert_eq!(parsed["side_effects"]["transaction"]["status"], "COMMITTED");
    assert_eq!(parsed["side_effects"]["transaction"]["counterparty"], "John");
    assert!(parsed["message"].as_str().unwrap().contains("$4900.00"));

    let account = json_body(app.clone().oneshot(get("/v1/accounts/primary")).await.unwrap()).await;
    assert_eq!(account["balance"], "4900.00");

    let history = json_body(
        app.oneshot(get("/v1/accounts/primary/transactions"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(history["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn lost_card_freezes_the_account() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(chat_request("I lost my card on the train"))
        .await
        .unwrap();
    let parsed = json_body(response).await;
    assert_eq!(parsed["decision"]["action_class"], "safety_action");
    assert_eq!(parsed["side_effects"]["frozen"], true);
    assert!(parsed["message"].as_str().unwrap().starts_with("SECURITY ALERT"));

    let account = json_body(app.oneshot(get("/v1/accounts/primary")).await.unwrap()).await;
    assert_eq!(account["frozen"], true);
}

#[tokio::test]
async fn transfer_without_amount_asks_for_one() {
    let response = app()
        .await
        .oneshot(chat_request("Send money to John"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "REJECTED");
    assert_eq!(parsed["decision"]["outcome"]["error"]["kind"], "missing_entity");
    let message = parsed["message"].as_str().unwrap();
    assert!(message.contains("John"));
    assert!(message.contains("$5000.00"));
}

#[tokio::test]
async fn unknown_account_is_404() {
    let response = app()
        .await
        .oneshot(get("/v1/accounts/nobody"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "account_not_found");
}

#[tokio::test]
async fn kb_search_returns_ranked_hits() {
    let response = app()
        .await
        .oneshot(get("/v1/kb/search?q=card%20delivery&limit=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    let hits = parsed["hits"].as_array().unwrap();
    assert!(!hits.is_empty() && hits.len() <= 2);
    assert!(hits[0]["chunk"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("card"));
}

#[tokio::test]
async fn empty_chat_text_is_rejected() {
    let response = app().await.oneshot(chat_request("   ")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
