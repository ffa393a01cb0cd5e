//! Proxy sub-request entry point.
//!
//! The front proxy forwards every transaction here with the real client's
//! method, path and address in `X-Original-*` headers. The handler
//! materialises the internal request, runs the verification pipeline and
//! maps the verdict onto the response contract.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;

use aegis_common::constants::{endpoints, headers as subrequest};
use aegis_common::{CheckRequest, Verdict};

use crate::metrics::Metrics;
use crate::state::AppState;

pub(super) async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request = materialize(&headers, &body);
    let verdict = state.chain.execute(&mut request);
    tracing::debug!(
        address = %request.client_address,
        method = %request.method,
        path = %request.path,
        verdict = ?verdict,
        "Handled sub-request"
    );
    match verdict {
        Verdict::Allow => {
            Metrics::inc(&state.metrics.allow_responses);
            StatusCode::NO_CONTENT.into_response()
        }
        Verdict::Deny => {
            Metrics::inc(&state.metrics.deny_responses);
            (
                StatusCode::FORBIDDEN,
                [(header::LOCATION, endpoints::TOKEN)],
            )
                .into_response()
        }
        Verdict::Challenge => {
            Metrics::inc(&state.metrics.challenge_responses);
            (StatusCode::FOUND, [(header::LOCATION, endpoints::TOKEN)]).into_response()
        }
    }
}

/// Build the internal request from the sub-request envelope: `X-Original-*`
/// fields, folded headers, cookies and the raw body.
pub(crate) fn materialize(headers: &HeaderMap, body: &[u8]) -> CheckRequest {
    let mut folded = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            folded.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    let cookies = parse_cookies(folded.get("cookie").map(String::as_str));

    CheckRequest {
        client_address: folded
            .get(subrequest::X_ORIGINAL_ADDR)
            .cloned()
            .unwrap_or_default(),
        method: folded
            .get(subrequest::X_ORIGINAL_METHOD)
            .map(|m| m.to_uppercase())
            .unwrap_or_default(),
        path: folded
            .get(subrequest::X_ORIGINAL_URL)
            .cloned()
            .unwrap_or_default(),
        body: String::from_utf8_lossy(body).into_owned(),
        headers: folded,
        cookies,
        fingerprint: None,
    }
}

fn parse_cookies(header: Option<&str>) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    let Some(header) = header else {
        return cookies;
    };
    for pair in header.split(';') {
        if let Some((name, value)) = pair.split_once('=') {
            cookies.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    cookies
}
