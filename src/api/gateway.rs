//! Origin/User-Agent admission gate for the HTTP API surface.
//!
//! Sits in front of every REST route (not the event channel): rejects
//! requests from common automation agents and, when an allow-list is
//! configured, requires `Origin` or `Referer` to name one of its entries.

use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Case-insensitive substrings identifying common CLI/scripting HTTP
/// clients and crawlers, not browsers.
const BLOCKED_AGENTS: &[&str] = &[
    "curl", "wget", "python-requests", "python-urllib", "go-http-client",
    "postmanruntime", "insomnia", "scrapy", "bot", "spider", "crawler",
    "headlesschrome", "axios", "okhttp",
];

fn is_blocked_agent(user_agent: &str) -> bool {
    let lower = user_agent.to_ascii_lowercase();
    BLOCKED_AGENTS.iter().any(|needle| lower.contains(needle))
}

fn header_origin(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

fn origin_allowed(origin: &str, allowed_origins: &[String]) -> bool {
    allowed_origins.iter().any(|allowed| origin.starts_with(allowed.as_str()))
}

fn reject(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": message, "code": "GATEWAY_REJECTED" })),
    )
        .into_response()
}

/// `axum::middleware::from_fn_with_state` handler enforcing the gateway's
/// admission policy. With an empty `allowed_origins` the Origin/Referer
/// check is skipped (open deployment); the User-Agent check always runs.
pub async fn admission_gate(
    axum::extract::State(allowed_origins): axum::extract::State<std::sync::Arc<Vec<String>>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if is_blocked_agent(user_agent) {
        return reject("automation agents are not permitted");
    }

    if !allowed_origins.is_empty() {
        let origin = header_origin(headers, "origin").or_else(|| header_origin(headers, "referer"));
        match origin {
            Some(origin) if origin_allowed(&origin, &allowed_origins) => {}
            _ => return reject("missing or disallowed Origin/Referer"),
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_common_automation_agents() {
        assert!(is_blocked_agent("curl/8.4.0"));
        assert!(is_blocked_agent("python-requests/2.31"));
        assert!(is_blocked_agent("Mozilla/5.0 (compatible; Googlebot/2.1)"));
        assert!(!is_blocked_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15) AppleWebKit/605.1.15"));
    }

    #[test]
    fn test_origin_allowed_matches_prefix() {
        let allowed = vec!["https://relay.example.com".to_string()];
        assert!(origin_allowed("https://relay.example.com", &allowed));
        assert!(!origin_allowed("https://evil.example.com", &allowed));
    }
}
