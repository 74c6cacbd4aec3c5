//! Shared HTTP utilities for the profile platform workspace.
//!
//! Provides common response builders and utility functions used by
//! api-server and future frontends.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Resource not found",
        "bad_request" => "Bad request",
        "invalid_username" => "Invalid username",
        "unauthorized" => "Authentication required",
        "forbidden" => "Access denied",
        "conflict" => "Resource already exists",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

// ============================================================================
// URL Building
// ============================================================================

/// Build the public profile URL for a username.
///
/// If `PROFILE_DOMAIN` env var is set and non-empty, uses that as the base.
/// Otherwise falls back to `https://{host}/{username}` or `/{username}` if
/// host is empty. This is also the URL a QR code for the profile encodes.
pub fn build_profile_url_from_host(host: &str, username: &str) -> String {
    if let Ok(dom) = std::env::var("PROFILE_DOMAIN") {
        if !dom.is_empty() {
            return format!("{}/{}", dom.trim_end_matches('/'), username);
        }
    }
    if host.is_empty() {
        format!("/{}", username)
    } else {
        format!("https://{}/{}", host, username)
    }
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC3339 string to SystemTime.
///
/// Returns an error if the string is not a valid RFC3339 timestamp.
pub fn rfc3339_to_system_time(s: &str) -> Result<SystemTime, chrono::ParseError> {
    let dt = DateTime::parse_from_rfc3339(s)?;
    Ok(dt.with_timezone(&Utc).into())
}
