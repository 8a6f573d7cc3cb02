// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Bearer-token authentication middleware. This gateway is bring-your-own-key:
//! it has no operator-configured secret to check requests against. Every
//! request past `/healthz` must carry a non-empty `Authorization: Bearer
//! <key>` — that key is the caller's own upstream API key, forwarded
//! verbatim into the launched container's environment so the harness can
//! authenticate outbound. Its presence is all this middleware verifies;
//! `routes::chat` and `routes::agents` are what actually use its value.

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

pub async fn bearer_auth_mw(req: Request, next: Next) -> Response {
    match extract_bearer(req.headers()) {
        Some(key) if !key.is_empty() => next.run(req).await,
        _ => {
            warn!("rejected request with no bearer API key");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("abc123"));
    }

    #[test]
    fn extract_bearer_missing_header_is_none() {
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
