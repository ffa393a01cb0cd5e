//! Challenge issuance and solution verification endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use aegis_common::AegisError;

use crate::metrics::Metrics;
use crate::state::AppState;

use super::check::materialize;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Static solver page for the proof-of-work flow. It fetches a fresh
/// challenge, brute-forces a preimage with WebCrypto and posts the solution.
const SOLVER_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Verification</title>
</head>
<body>
    <p id="status">Verifying your browser&hellip;</p>
    <script>
        async function solve(challenge) {
            const target = Uint8Array.from(atob(challenge), c => c.charCodeAt(0));
            for (let nonce = 0; ; nonce++) {
                const preimage = new TextEncoder().encode(String(nonce));
                const digest = new Uint8Array(await crypto.subtle.digest("SHA-512", preimage));
                if (target.every((b, i) => digest[i] === b)) {
                    const payload = new Uint8Array(target.length + preimage.length);
                    payload.set(target);
                    payload.set(preimage, target.length);
                    return btoa(String.fromCharCode(...payload));
                }
            }
        }
        (async () => {
            const page = await fetch("/aegis/token").then(r => r.text());
            const challenge = page.match(/data-challenge="([^"]+)"/)[1];
            const solution = await solve(challenge);
            const response = await fetch("/aegis/token", { method: "POST", body: solution });
            if (response.ok) {
                const token = await response.text();
                document.cookie = "AEGIS_TOKEN=" + token + "; path=/";
                location.reload();
            } else {
                document.getElementById("status").textContent = "Verification failed.";
            }
        })();
    </script>
</body>
</html>
"#;

/// GET /aegis/token - render a challenge page bound to the requester's
/// fingerprint.
pub(super) async fn get_challenge(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request = materialize(&headers, b"");
    let fingerprint = state.fingerprinter.calculate(&request);

    match state.verifier.challenge_page(&fingerprint) {
        Ok(page) => {
            Metrics::inc(&state.metrics.challenge_requests);
            (no_cache_html_headers(), Html(page)).into_response()
        }
        Err(e) => {
            tracing::warn!(
                fingerprint = %fingerprint,
                error = %e,
                "Unable to prepare challenge page"
            );
            status_for(&e).into_response()
        }
    }
}

/// POST /aegis/token - verify a solution and answer with the minted token.
pub(super) async fn post_solution(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = materialize(&headers, &body);
    let fingerprint = state.fingerprinter.calculate(&request);

    match state.verifier.verify_and_mint(&fingerprint, &body) {
        Ok(token) => {
            Metrics::inc(&state.metrics.tokens_issued);
            // Opaque token body; axum labels the string text/plain
            ([(header::CACHE_CONTROL, NO_CACHE)], token).into_response()
        }
        Err(e) => {
            match e {
                AegisError::Unprocessable(_) => {
                    Metrics::inc(&state.metrics.solutions_unprocessable)
                }
                _ => Metrics::inc(&state.metrics.solutions_rejected),
            }
            tracing::info!(
                fingerprint = %fingerprint,
                error = %e,
                "Challenge solution rejected"
            );
            (status_for(&e), e.to_string()).into_response()
        }
    }
}

/// GET /aegis/challenge/index.html - the static solver page.
pub(super) async fn challenge_index() -> Response {
    (no_cache_html_headers(), Html(SOLVER_PAGE)).into_response()
}

fn no_cache_html_headers() -> [(header::HeaderName, &'static str); 4] {
    [
        (header::CONTENT_TYPE, "text/html; charset=utf-8"),
        (header::CACHE_CONTROL, NO_CACHE),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    ]
}

fn status_for(error: &AegisError) -> StatusCode {
    StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
