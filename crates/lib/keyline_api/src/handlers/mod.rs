//! HTTP request handlers. Thin: extract, delegate to a service, wrap in
//! the response envelope.

pub mod auth;
pub mod external;
pub mod sessions;
pub mod users;

use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;

use keyline_core::models::session::ClientInfo;

/// Client metadata from request headers plus an optional device name from
/// the request body.
pub(crate) fn client_info(headers: &HeaderMap, device_name: Option<String>) -> ClientInfo {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ClientInfo {
        ip_address,
        user_agent,
        device_name,
    }
}
