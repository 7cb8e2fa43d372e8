use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use w402::proto::{Base64Bytes, SettlementConfirmation};
use w402_http::facilitator::FacilitatorClient;
use w402_node::config::NodeConfig;
use w402_node::server::{GateState, gate_router};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAYER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

fn config() -> NodeConfig {
    NodeConfig::from_json(
        r#"{
            "gates": [
                {
                    "path": "/weather",
                    "network": "base-sepolia-testnet",
                    "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                    "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                    "amountRequired": "10000",
                    "description": "Current weather",
                    "response": {"forecast": "sunny"}
                },
                {
                    "path": "/orders",
                    "method": "post",
                    "network": "base",
                    "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                    "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                    "amountRequired": "500"
                }
            ]
        }"#,
        |_| None,
    )
    .unwrap()
}

fn app(facilitator: Option<FacilitatorClient>) -> Router {
    app_with(GateState::new(registry(), CancellationToken::new()).with_facilitator(facilitator))
}

fn registry() -> Arc<w402::networks::NetworkRegistry> {
    Arc::new(config().registry().unwrap())
}

fn app_with(state: GateState) -> Router {
    gate_router(config().gates, &state).unwrap()
}

fn payment_header() -> String {
    Base64Bytes::encode_json(&json!({
        "x402Version": 1,
        "scheme": "exact",
        "network": "base-sepolia",
        "payload": {"signature": "0x01", "authorization": {"from": PAYER}}
    }))
    .unwrap()
    .to_string()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, http::HeaderMap, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn paid_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-PAYMENT", payment_header())
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_unpaid_request_is_challenged() {
    let request = Request::builder()
        .uri("/weather?city=Lisbon")
        .header("host", "gate.example:4021")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(app(None), request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(body["x402Version"], 1);
    assert_eq!(body["error"], "Payment required to access this resource");
    let accept = &body["accepts"][0];
    assert_eq!(accept["scheme"], "exact");
    assert_eq!(accept["network"], "base-sepolia");
    assert_eq!(accept["maxAmountRequired"], "10000");
    assert_eq!(accept["resource"], "http://gate.example:4021/weather?city=Lisbon");
    assert_eq!(accept["description"], "Current weather");
}

#[tokio::test]
async fn test_challenge_resource_is_absolute() {
    let request = Request::builder()
        .uri("/weather")
        .header("host", "internal:4021")
        .header("x-forwarded-proto", "https")
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send(app(None), request).await;
    assert_eq!(body["accepts"][0]["resource"], "https://internal:4021/weather");

    let state = GateState::new(registry(), CancellationToken::new())
        .with_public_url(Some("https://api.example.com/".to_owned()));
    let request = Request::builder()
        .uri("/weather?city=Porto")
        .header("host", "internal:4021")
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send(app_with(state), request).await;
    assert_eq!(body["accepts"][0]["resource"], "https://api.example.com/weather?city=Porto");

    let request = Request::builder().uri("/weather").body(Body::empty()).unwrap();
    let (_, _, body) = send(app(None), request).await;
    assert_eq!(body["accepts"][0]["resource"], "/weather");
}

#[tokio::test]
async fn test_malformed_payment_is_challenged() {
    let request = Request::builder()
        .uri("/weather")
        .header("X-PAYMENT", "not-base64!")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(app(None), request).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn test_paid_request_is_settled() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isValid": true, "payer": PAYER})))
        .expect(1)
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "transaction": "0xfeed",
            "network": "base-sepolia",
            "payer": PAYER
        })))
        .expect(1)
        .mount(&facilitator)
        .await;
    let client = FacilitatorClient::try_from(facilitator.uri().as_str()).unwrap();

    let (status, headers, body) = send(app(Some(client)), paid_get("/weather")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"forecast": "sunny"}));
    let header = headers["x-payment-response"].to_str().unwrap();
    let settlement: SettlementConfirmation = Base64Bytes::from(header).decode_json().unwrap();
    assert!(settlement.success);
    assert_eq!(settlement.transaction, "0xfeed");
    assert_eq!(settlement.payer, PAYER);

    let requests = facilitator.received_requests().await.unwrap();
    let verify: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(verify["x402Version"], 1);
    assert_eq!(verify["paymentPayload"]["scheme"], "exact");
    assert_eq!(verify["paymentRequirements"]["payTo"], "0x209693Bc6afc0C5328bA36FaF03C514EF312287C");
}

#[tokio::test]
async fn test_rejected_payment_is_challenged_with_reason() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isValid": false,
            "invalidReason": "insufficient_funds"
        })))
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&facilitator)
        .await;
    let client = FacilitatorClient::try_from(facilitator.uri().as_str()).unwrap();

    let (status, headers, body) = send(app(Some(client)), paid_get("/weather")).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "insufficient_funds");
    assert!(headers.get("x-payment-response").is_none());
}

#[tokio::test]
async fn test_unreachable_facilitator_is_bad_gateway() {
    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&facilitator)
        .await;
    let client = FacilitatorClient::try_from(facilitator.uri().as_str()).unwrap();

    let (status, _, body) = send(app(Some(client)), paid_get("/weather")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_paid_request_without_facilitator() {
    let (status, headers, body) = send(app(None), paid_get("/weather")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"forecast": "sunny"}));
    assert!(headers.get("x-payment-response").is_none());
}

#[tokio::test]
async fn test_method_filter_and_health() {
    let (status, _, _) = send(app(None), paid_get("/orders")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("X-PAYMENT", payment_header())
        .body(Body::from(r#"{"sku": "A-1"}"#))
        .unwrap();
    let (status, _, body) = send(app(None), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(app(None), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
