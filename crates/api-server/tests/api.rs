//! End-to-end tests against the router with in-memory stores.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use std::sync::Arc;
use tower::util::ServiceExt;

use api_server::{create_router, AppState, ServerConfig};

fn test_config() -> ServerConfig {
    ServerConfig {
        access_secret: "it-access-secret".to_string(),
        refresh_secret: "it-refresh-secret".to_string(),
        ..ServerConfig::default()
    }
}

async fn test_router(config: ServerConfig) -> Router {
    let state = Arc::new(AppState::new(&config, None).await.unwrap());
    create_router(state)
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn login(router: &Router, username: &str, password: &str) -> serde_json::Value {
    let (status, body) = send(
        router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(serde_json::json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body
}

async fn access_token(router: &Router, username: &str, password: &str) -> String {
    login(router, username, password).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

fn current_admin_code() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    security::totp::code_at(api_server::seed::DEFAULT_ADMIN_TOTP_SECRET, now).unwrap()
}

/// The seeded admin has 2FA enrolled; complete the challenge to get a token.
async fn admin_token(router: &Router) -> String {
    let challenge = login(router, "admin", "admin123").await;
    assert_eq!(challenge["requires_two_factor"], true);
    let user_id = challenge["user_id"].as_str().unwrap();

    let (status, body) = send(
        router,
        "POST",
        "/api/v1/auth/2fa/verify",
        None,
        Some(serde_json::json!({ "user_id": user_id, "code": current_admin_code() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "2FA verify failed: {body}");
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_login_success_and_failure() {
    let router = test_router(test_config()).await;

    let body = login(&router, "trader", "trader123").await;
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["user"]["role"], "trader");

    // Wrong password and unknown user: identical status and code.
    for (user, pass) in [("trader", "wrong"), ("nobody", "trader123")] {
        let (status, body) = send(
            &router,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(serde_json::json!({ "username": user, "password": pass })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }
}

#[tokio::test]
async fn test_admin_login_requires_second_factor() {
    let router = test_router(test_config()).await;

    // Password alone yields a challenge, never tokens.
    let challenge = login(&router, "admin", "admin123").await;
    assert_eq!(challenge["requires_two_factor"], true);
    assert!(challenge.get("access_token").is_none());

    // A wrong code is rejected. (Skip the assertion in the astronomically
    // unlikely window where 000000 is the live code.)
    let user_id = challenge["user_id"].as_str().unwrap();
    if current_admin_code() != "000000" {
        let (status, body) = send(
            &router,
            "POST",
            "/api/v1/auth/2fa/verify",
            None,
            Some(serde_json::json!({ "user_id": user_id, "code": "000000" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_2FA_CODE");
    }

    // The real code completes the login.
    let token = admin_token(&router).await;
    let (status, _) = send(
        &router,
        "GET",
        "/api/v1/arbitrage/opportunities",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_protected_route_requires_valid_token() {
    let router = test_router(test_config()).await;

    let (status, body) = send(&router, "GET", "/api/v1/arbitrage/opportunities", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/arbitrage/opportunities",
        Some("garbage"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "TOKEN_INVALID");

    let token = access_token(&router, "viewer", "viewer123").await;
    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/arbitrage/opportunities",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().is_some_and(|a| !a.is_empty()));
}

#[tokio::test]
async fn test_refresh_and_logout_flow() {
    let router = test_router(test_config()).await;
    let session = login(&router, "trader", "trader123").await;
    let refresh_token = session["refresh_token"].as_str().unwrap();
    let access = session["access_token"].as_str().unwrap();

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(serde_json::json!({ "refresh_token": refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());

    let (status, _) = send(&router, "POST", "/api/v1/auth/logout", Some(access), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The refresh token is dead after logout.
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(serde_json::json!({ "refresh_token": refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_trade_execution_policy() {
    let router = test_router(test_config()).await;

    // Viewer holds no trading role.
    let viewer = access_token(&router, "viewer", "viewer123").await;
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/arbitrage/execute",
        Some(&viewer),
        Some(serde_json::json!({
            "opportunity_id": "opp-eth-usdc-001",
            "pair": "ETH/USDC",
            "amount_usd": "100",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "PERMISSION_DENIED");

    // Trader above the threshold without confirmation.
    let trader = access_token(&router, "trader", "trader123").await;
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/arbitrage/execute",
        Some(&trader),
        Some(serde_json::json!({
            "opportunity_id": "opp-eth-usdc-001",
            "pair": "ETH/USDC",
            "amount_usd": "5000",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CONFIRMATION_REQUIRED");
    assert_eq!(body["details"]["allowed"], false);

    // Same trade, confirmed.
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/arbitrage/execute",
        Some(&trader),
        Some(serde_json::json!({
            "opportunity_id": "opp-eth-usdc-001",
            "pair": "ETH/USDC",
            "amount_usd": "5000",
            "confirmed": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "filled");
    assert_eq!(
        body["profit_usd"].as_str().map(|s| s.parse::<Decimal>().unwrap()),
        Some(Decimal::new(125, 1)) // 25 bps of 5000
    );
}

#[tokio::test]
async fn test_validate_operation_endpoint() {
    let router = test_router(test_config()).await;
    let trader = access_token(&router, "trader", "trader123").await;

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/security/validate-operation",
        Some(&trader),
        Some(serde_json::json!({
            "operation_type": "mode_switch",
            "data": { "mode": "live" },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);

    // Config updates are admin-only.
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/security/validate-operation",
        Some(&trader),
        Some(serde_json::json!({
            "operation_type": "config_update",
            "data": { "keys": ["min_profit_bps"] },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "PERMISSION_DENIED");

    // Unknown operation types are denied, not 404'd.
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/security/validate-operation",
        Some(&trader),
        Some(serde_json::json!({
            "operation_type": "drain_wallets",
            "data": {},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNKNOWN_OPERATION_TYPE");
    assert_eq!(body["details"]["allowed"], false);

    // A known type with a payload missing its required fields is a
    // different failure than an unknown type.
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/security/validate-operation",
        Some(&trader),
        Some(serde_json::json!({
            "operation_type": "trade_execution",
            "data": {},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_OPERATION_PAYLOAD");
}

#[tokio::test]
async fn test_confirmation_denial_is_audited() {
    let router = test_router(test_config()).await;
    let trader = access_token(&router, "trader", "trader123").await;

    // An unconfirmed large trade is bounced at stage one.
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/security/validate-operation",
        Some(&trader),
        Some(serde_json::json!({
            "operation_type": "trade_execution",
            "data": { "amount_usd": "5000" },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CONFIRMATION_REQUIRED");

    // The denial still lands in the audit trail.
    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/security/audit-logs?action=validate_operation",
        Some(&trader),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert!(entries
        .iter()
        .any(|e| e["details"]["allowed"] == false && e["details"]["stage"] == "precheck"));
}

#[tokio::test]
async fn test_encrypt_decrypt_and_admin_gate() {
    let router = test_router(test_config()).await;
    let trader = access_token(&router, "trader", "trader123").await;
    let admin = admin_token(&router).await;

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/security/encrypt",
        Some(&trader),
        Some(serde_json::json!({ "data": "exchange-api-key" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let envelope = body["encrypted"].as_str().unwrap().to_string();

    // Decryption is admin-only.
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/security/decrypt",
        Some(&trader),
        Some(serde_json::json!({ "encrypted": envelope })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "PERMISSION_DENIED");

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/security/decrypt",
        Some(&admin),
        Some(serde_json::json!({ "encrypted": envelope })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decrypted"], "exchange-api-key");

    // Tampered envelope fails uniformly.
    let mut tampered = envelope.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '0' { '1' } else { '0' });
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/security/decrypt",
        Some(&admin),
        Some(serde_json::json!({ "encrypted": tampered })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DECRYPTION_FAILED");
}

#[tokio::test]
async fn test_viewer_audit_scope() {
    let router = test_router(test_config()).await;
    let _trader = access_token(&router, "trader", "trader123").await;
    let viewer = access_token(&router, "viewer", "viewer123").await;

    // Even asking for another user's trail, the viewer only sees their own.
    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/security/audit-logs?user_id=user-trader-002",
        Some(&viewer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert!(!entries.is_empty());
    for entry in entries {
        assert_eq!(entry["user_id"], "user-viewer-003");
    }

    // A trader can filter freely.
    let trader = access_token(&router, "trader", "trader123").await;
    let (status, body) = send(
        &router,
        "GET",
        "/api/v1/security/audit-logs?action=login_success",
        Some(&trader),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    for entry in body["entries"].as_array().unwrap() {
        assert_eq!(entry["action"], "login_success");
    }
}

#[tokio::test]
async fn test_rate_limit_on_login() {
    let config = ServerConfig {
        rate_limit_max_requests: 3,
        ..test_config()
    };
    let router = test_router(config).await;

    let body = serde_json::json!({ "username": "trader", "password": "wrong" });
    for _ in 0..3 {
        let (status, _) = send(&router, "POST", "/api/v1/auth/login", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, resp) = send(&router, "POST", "/api/v1/auth/login", None, Some(body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp["code"], "RATE_LIMITED");
}
