//! End-to-end gateway tests.
//!
//! Drives the full router - sub-request verdicts, the proof-of-work token
//! round trip and limiter-driven revocation - without binding a socket.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use sha2::{Digest, Sha512};
use std::path::PathBuf;
use std::time::Duration;
use tower::ServiceExt;

use aegis_common::{Complexity, Protection, VerificationKind};
use aegis_gateway::config::{AppConfig, LoggerConfig, VerificationConfig};
use aegis_gateway::routes::create_router;
use aegis_gateway::state::AppState;

const CLIENT_ADDR: &str = "203.0.113.7";
const OTHER_ADDR: &str = "198.51.100.3";
const USER_AGENT: &str = "UA";

/// Writes a minimal PoW page template and returns the assets directory.
fn prepare_assets(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("aegis-e2e-{}-{}", test, std::process::id()));
    std::fs::create_dir_all(dir.join("challenge")).unwrap();
    std::fs::write(
        dir.join("challenge/index.html"),
        "<html><body data-challenge=\"{{challenge}}\"></body></html>",
    )
    .unwrap();
    dir
}

fn build(test: &str, protections: Vec<Protection>) -> (Router, AppState) {
    let assets = prepare_assets(test);
    let config = AppConfig {
        address: "localhost:0".to_string(),
        logger: LoggerConfig::default(),
        verification: VerificationConfig {
            kind: VerificationKind::JsChallenge,
            complexity: Complexity::Easy,
        },
        permanent_tokens: vec!["skeleton-key".to_string()],
        protections,
        assets_dir: assets.to_str().unwrap().to_string(),
        captcha_templates: "/nonexistent/captcha.json".to_string(),
    };
    let state = AppState::new(config).unwrap();
    (create_router(state.clone()), state)
}

fn protection(path: &str, method: &str, limit: u32) -> Protection {
    Protection {
        path: path.to_string(),
        method: method.to_string(),
        limit,
    }
}

/// A sub-request as the front proxy would send it.
fn subrequest(method: &str, url: &str, addr: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/aegis/handlers/http")
        .header("X-Original-Method", method)
        .header("X-Original-Url", url)
        .header("X-Original-Addr", addr)
        .header("User-Agent", USER_AGENT);
    if let Some(cookie) = cookie {
        builder = builder.header("Cookie", format!("AEGIS_TOKEN={}", cookie));
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Brute-force a preimage whose SHA-512 digest starts with `suffix`.
fn solve(suffix: &[u8]) -> Vec<u8> {
    for nonce in 0u64.. {
        let candidate = nonce.to_le_bytes().to_vec();
        let digest = Sha512::digest(&candidate);
        if digest[..suffix.len()] == *suffix {
            return candidate;
        }
    }
    unreachable!("search space exhausted");
}

/// Runs the GET-solve-POST round trip and returns the minted token.
async fn earn_token(router: &Router, addr: &str) -> String {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/aegis/token")
                .header("X-Original-Addr", addr)
                .header("User-Agent", USER_AGENT)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_string(response).await;

    let marker = "data-challenge=\"";
    let start = page.find(marker).expect("challenge embedded in page") + marker.len();
    let end = page[start..].find('"').unwrap() + start;
    let suffix = STANDARD.decode(&page[start..end]).unwrap();

    let solution = solve(&suffix);
    let payload = STANDARD.encode([suffix, solution].concat());
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/aegis/token")
                .header("X-Original-Addr", addr)
                .header("User-Agent", USER_AGENT)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_string(response).await;
    assert!(!token.is_empty());
    token
}

#[tokio::test]
async fn unprotected_path_is_allowed() {
    let (router, _state) = build("unprotected", vec![]);
    let response = router
        .oneshot(subrequest("GET", "/public", CLIENT_ADDR, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn protected_path_without_token_is_denied() {
    let (router, _state) = build("deny", vec![protection("^/api/", "GET", 5)]);
    let response = router
        .oneshot(subrequest("GET", "/api/foo", CLIENT_ADDR, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/aegis/token"
    );
}

#[tokio::test]
async fn pow_round_trip_earns_access() {
    let (router, _state) = build("roundtrip", vec![protection("^/api/", "GET", 5)]);

    let token = earn_token(&router, CLIENT_ADDR).await;
    let response = router
        .oneshot(subrequest("GET", "/api/foo", CLIENT_ADDR, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn solution_from_another_address_is_rejected() {
    let (router, _state) = build("wrongclient", vec![]);

    // Fetch the challenge as one client
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/aegis/token")
                .header("X-Original-Addr", CLIENT_ADDR)
                .header("User-Agent", USER_AGENT)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let page = body_string(response).await;
    let marker = "data-challenge=\"";
    let start = page.find(marker).unwrap() + marker.len();
    let end = page[start..].find('"').unwrap() + start;
    let suffix = STANDARD.decode(&page[start..end]).unwrap();
    let solution = solve(&suffix);
    let payload = STANDARD.encode([suffix, solution].concat());

    // Post the solution from a different address with the same headers
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/aegis/token")
                .header("X-Original-Addr", OTHER_ADDR)
                .header("User-Agent", USER_AGENT)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_solution_is_unprocessable() {
    let (router, _state) = build("garbage", vec![]);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/aegis/token")
                .header("X-Original-Addr", CLIENT_ADDR)
                .body(Body::from("@@not-base64@@"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn exceeding_the_rate_limit_revokes_access() {
    let (router, state) = build("ratelimit", vec![protection("^/api/$", "POST", 2)]);

    let token = earn_token(&router, CLIENT_ADDR).await;
    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(subrequest("POST", "/api/", CLIENT_ADDR, Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    state.limiter.rotate();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = router
        .oneshot(subrequest("POST", "/api/", CLIENT_ADDR, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn permanent_token_works_from_any_address() {
    let (router, _state) = build("permanent", vec![protection("^/api/", "GET", 5)]);
    for addr in [CLIENT_ADDR, OTHER_ADDR] {
        let response = router
            .clone()
            .oneshot(subrequest("GET", "/api/foo", addr, Some("skeleton-key")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}

#[tokio::test]
async fn challenge_page_carries_no_cache_headers() {
    let (router, _state) = build("headers", vec![]);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/aegis/token")
                .header("X-Original-Addr", CLIENT_ADDR)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "text/html; charset=utf-8"
    );
    assert_eq!(
        headers.get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
}

#[tokio::test]
async fn solver_page_is_served() {
    let (router, _state) = build("solver", vec![]);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/aegis/challenge/index.html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_string(response).await;
    assert!(page.contains("SHA-512"));
}

#[tokio::test]
async fn metrics_are_exposed() {
    let (router, _state) = build("metrics", vec![]);

    let response = router
        .clone()
        .oneshot(subrequest("GET", "/public", CLIENT_ADDR, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_string(response).await;
    assert!(text.contains("aegis_antibot_response{code=\"204\"} 1"));
}
