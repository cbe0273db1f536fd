//! Request-pipeline tests: banner routes, origin policy, rate limiting,
//! API-key guard, body handling, and the response envelope contract

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::StatusCode, routing::get};
use reqwest::Method;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use telematics_auth_gateway::config::{Config, Environment};
use telematics_auth_gateway::gateway::router::{self, AppState, create_router};

fn base_config() -> Config {
    let mut config = Config::default();
    config.upstream.client_id = "client-id".to_string();
    config.upstream.client_secret = "client-secret".to_string();
    config.upstream.redirect_uri = "https://app.example/callback".to_string();
    config.upstream.timeout_secs = 1;
    config.rate_limit.enabled = false;
    config.cors.allowed_origins = vec!["https://app.example".to_string()];
    config.validate().unwrap();
    config
}

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_gateway(config: Config) -> String {
    let state = Arc::new(AppState::new(Arc::new(config)).unwrap());
    spawn(create_router(state)).await
}

#[tokio::test]
async fn banner_and_health_report_service_metadata() {
    let base = spawn_gateway(base_config()).await;
    let client = reqwest::Client::new();

    let banner: Value = client
        .get(&base)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(banner["success"], json!(true));
    assert_eq!(banner["version"], json!(env!("CARGO_PKG_VERSION")));
    assert_eq!(banner["environment"], json!("development"));
    assert!(banner["timestamp"].as_str().is_some());

    let health = client
        .get(format!("{base}/api/auth/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let health: Value = health.json().await.unwrap();
    assert_eq!(health["success"], json!(true));
    assert!(
        health["message"]
            .as_str()
            .unwrap()
            .contains("running")
    );
}

#[tokio::test]
async fn unknown_routes_get_an_enveloped_404() {
    let base = spawn_gateway(base_config()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/api/auth/nonexistent"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("Not found"));
    assert_eq!(body["message"], json!("Route /api/auth/nonexistent not found"));
    assert!(body.get("data").is_none());

    // Wrong method on a known prefix also falls through to the envelope
    let response = client
        .post(format!("{base}/totally/elsewhere"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quota_headers_count_down_and_the_excess_request_is_rejected() {
    let mut config = base_config();
    config.rate_limit.enabled = true;
    config.rate_limit.window_ms = 60_000;
    config.rate_limit.max_requests = 5;
    let base = spawn_gateway(config).await;
    let client = reqwest::Client::new();

    for expected_remaining in (0..5).rev() {
        let response = client
            .get(format!("{base}/api/auth/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("x-ratelimit-remaining")
                .unwrap()
                .to_str()
                .unwrap(),
            expected_remaining.to_string()
        );
        assert_eq!(
            response
                .headers()
                .get("x-ratelimit-limit")
                .unwrap()
                .to_str()
                .unwrap(),
            "5"
        );
    }

    let response = client
        .get(format!("{base}/api/auth/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("Too many requests"));
    assert_eq!(
        body["message"],
        json!("Rate limit exceeded. Please try again later.")
    );
}

#[tokio::test]
async fn quota_is_admitted_again_in_a_new_window() {
    let mut config = base_config();
    config.rate_limit.enabled = true;
    config.rate_limit.window_ms = 500;
    config.rate_limit.max_requests = 2;
    let base = spawn_gateway(config).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/api/auth/health");

    assert_eq!(client.get(&url).send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(client.get(&url).send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        client.get(&url).send().await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(client.get(&url).send().await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn forwarded_clients_are_limited_independently() {
    let mut config = base_config();
    config.rate_limit.enabled = true;
    config.rate_limit.window_ms = 60_000;
    config.rate_limit.max_requests = 2;
    let base = spawn_gateway(config).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/api/auth/health");

    for _ in 0..2 {
        let response = client
            .get(&url)
            .header("x-forwarded-for", "203.0.113.7")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.7")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different forwarded address still has a full quota
    let response = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.8")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn production_rejects_unlisted_origins_with_a_plain_403() {
    let mut config = base_config();
    config.server.environment = Environment::Production;
    let base = spawn_gateway(config).await;
    let client = reqwest::Client::new();

    let response = client
        .get(&base)
        .header("origin", "https://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.text().await.unwrap(), "Not allowed by CORS");

    // A listed origin is admitted and reflected
    let response = client
        .get(&base)
        .header("origin", "https://app.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap()
            .to_str()
            .unwrap(),
        "https://app.example"
    );
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-credentials")
            .unwrap()
            .to_str()
            .unwrap(),
        "true"
    );

    // Non-browser callers send no origin and are always admitted
    let response = client.get(&base).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn development_admits_unlisted_origins() {
    let base = spawn_gateway(base_config()).await;

    let response = reqwest::Client::new()
        .get(&base)
        .header("origin", "https://unlisted.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap()
            .to_str()
            .unwrap(),
        "https://unlisted.example"
    );
}

#[tokio::test]
async fn preflight_requests_are_answered_directly() {
    let base = spawn_gateway(base_config()).await;

    let response = reqwest::Client::new()
        .request(Method::OPTIONS, format!("{base}/api/auth/exchange"))
        .header("origin", "https://app.example")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let allow_methods = response
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(allow_methods.contains("POST"));
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-headers")
    );
}

#[tokio::test]
async fn security_headers_are_stamped_on_every_response() {
    let base = spawn_gateway(base_config()).await;
    let client = reqwest::Client::new();

    for url in [base.clone(), format!("{base}/no/such/route")] {
        let response = client.get(&url).send().await.unwrap();
        let hsts = response
            .headers()
            .get("strict-transport-security")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(hsts.contains("max-age=31536000"));
        assert!(
            response
                .headers()
                .contains_key("content-security-policy")
        );
    }
}

#[tokio::test]
async fn api_key_guard_protects_non_public_paths() {
    let mut config = base_config();
    config.auth.api_key = Some("sekret-key".to_string());
    let base = spawn_gateway(config).await;
    let client = reqwest::Client::new();

    // Public paths stay open
    let response = client
        .get(format!("{base}/api/auth/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Missing key
    let response = client
        .post(format!("{base}/api/auth/exchange"))
        .json(&json!({"code": "auth-code-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("API key required"));

    // Wrong key
    let response = client
        .post(format!("{base}/api/auth/exchange"))
        .header("x-api-key", "wrong-key")
        .json(&json!({"code": "auth-code-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("Invalid API key"));

    // Correct key passes the guard; the empty payload then fails validation,
    // proving the request reached the handler
    let response = client
        .post(format!("{base}/api/auth/exchange"))
        .header("x-api-key", "sekret-key")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("Missing authorization code"));
}

#[tokio::test]
async fn a_panicking_handler_yields_a_500_envelope_over_http() {
    async fn explode() {
        panic!("deliberate");
    }
    let state = Arc::new(AppState::new(Arc::new(base_config())).unwrap());
    let app = router::pipeline(
        router::routes().route("/explode", get(explode)),
        state,
    );
    let base = spawn(app).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/explode"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = response.text().await.unwrap();
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("Internal server error"));
    assert!(!text.contains("deliberate"));
}

#[tokio::test]
async fn pre_envelope_cors_denial_carries_no_quota_headers() {
    // The origin check sits in front of the rate limiter, so a denied
    // origin neither consumes quota nor receives quota metadata
    let mut config = base_config();
    config.server.environment = Environment::Production;
    config.rate_limit.enabled = true;
    let base = spawn_gateway(config).await;

    let response = reqwest::Client::new()
        .get(&base)
        .header("origin", "https://evil.example")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!response.headers().contains_key("x-ratelimit-limit"));
    assert!(!response.headers().contains_key("x-ratelimit-remaining"));

    // Admitted requests carry the metadata as usual
    let response = reqwest::Client::new().get(&base).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-limit"));
}

#[tokio::test]
async fn malformed_json_bodies_get_the_envelope_not_a_bare_rejection() {
    let base = spawn_gateway(base_config()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/auth/exchange"))
        .header("content-type", "application/json")
        .body("{not valid json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("Invalid request body"));
}

#[tokio::test]
async fn envelopes_never_mix_data_and_error() {
    let base = spawn_gateway(base_config()).await;
    let client = reqwest::Client::new();

    let failure: Value = client
        .post(format!("{base}/api/auth/exchange"))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(failure["success"], json!(false));
    assert!(failure.get("data").is_none());
    assert!(failure.get("error").is_some());

    let success: Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(success["success"], json!(true));
    assert!(success.get("error").is_none());
}
