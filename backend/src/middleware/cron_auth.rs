//! Shared-secret authentication for the cron trigger routes
//!
//! The scheduler presents the secret as an `x-cron-secret` header, an
//! `Authorization: Bearer` header or a `secret` query parameter. Both sides
//! are run through HMAC-SHA256 and the digests compared with `verify_slice`,
//! which does not short-circuit on the first differing byte.

use axum::{
    extract::{Query, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

use crate::error::AppError;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

const DIGEST_LABEL: &[u8] = b"gardenwatch-cron";

fn digest(secret: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(DIGEST_LABEL);
    Some(mac)
}

/// Compare a presented secret against the configured one.
/// An empty configured secret rejects everything.
pub fn secret_matches(configured: &str, presented: &str) -> bool {
    if configured.is_empty() {
        return false;
    }
    let (Some(expected), Some(candidate)) = (digest(configured), digest(presented)) else {
        return false;
    };
    let expected = expected.finalize().into_bytes();
    candidate.verify_slice(&expected).is_ok()
}

/// The secret the caller presented, if any
pub fn presented_secret(request: &Request) -> Option<String> {
    let headers = request.headers();

    if let Some(value) = headers.get(CRON_SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }

    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove("secret"))
}

/// Rejects cron requests that do not carry the configured secret
pub async fn cron_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = presented_secret(&request)
        .ok_or_else(|| AppError::Unauthorized("Missing cron secret".to_string()))?;

    if !secret_matches(&state.config.cron.secret, &presented) {
        tracing::warn!(path = %request.uri().path(), "Rejected cron request with wrong secret");
        return Err(AppError::Unauthorized("Invalid cron secret".to_string()));
    }

    Ok(next.run(request).await)
}
