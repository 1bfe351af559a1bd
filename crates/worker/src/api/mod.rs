//! Typed API client surface
//!
//! Composes retry, rate limiting, and credential acquisition into a typed
//! request pipeline. See [`client::ApiClient`] for the composition order.

pub mod client;

pub use client::{ApiClient, ApiClientConfig, CallOutcome, RequestOptions};

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Fallback used when a `Retry-After` value is absent or unparseable.
const RETRY_AFTER_FALLBACK_SECS: u64 = 60;

/// Parse a `Retry-After` header value into seconds.
///
/// Parsing order: integer seconds, then HTTP-date (delta from now, floored at
/// zero). Absence or a parse failure yields the 60-second fallback.
pub fn parse_retry_after(value: Option<&str>) -> u64 {
    let Some(value) = value else {
        return RETRY_AFTER_FALLBACK_SECS;
    };
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        let delta = date.with_timezone(&Utc) - Utc::now();
        return delta.num_seconds().max(0) as u64;
    }

    RETRY_AFTER_FALLBACK_SECS
}

/// Error body convention: `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Maximum length of a raw-body excerpt carried in error messages.
const BODY_EXCERPT_LIMIT: usize = 200;

/// Extract a short human-readable message from an error response body.
///
/// Prefers the structured error convention; falls back to the raw body
/// truncated to 200 characters.
pub fn error_body_excerpt(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return format!("{}: {}", parsed.error.code, parsed.error.message);
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    trimmed.chars().take(BODY_EXCERPT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    //! Unit tests for Retry-After parsing and the error body convention.
    use super::*;

    /// Validates `parse_retry_after` behavior for the integer seconds
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms plain integers parse directly.
    /// - Confirms surrounding whitespace is tolerated.
    #[test]
    fn parses_integer_seconds() {
        assert_eq!(parse_retry_after(Some("2")), 2);
        assert_eq!(parse_retry_after(Some(" 120 ")), 120);
        assert_eq!(parse_retry_after(Some("0")), 0);
    }

    /// Validates `parse_retry_after` behavior for the HTTP-date scenario.
    ///
    /// Assertions:
    /// - Confirms a future date yields a positive delta.
    /// - Confirms a past date floors to zero.
    #[test]
    fn parses_http_dates() {
        let future = (Utc::now() + chrono::Duration::seconds(90)).to_rfc2822();
        let parsed = parse_retry_after(Some(&future));
        assert!((85..=90).contains(&parsed), "got {parsed}");

        let past = (Utc::now() - chrono::Duration::seconds(90)).to_rfc2822();
        assert_eq!(parse_retry_after(Some(&past)), 0);
    }

    /// Validates `parse_retry_after` behavior for the fallback scenario.
    ///
    /// Assertions:
    /// - Confirms absence and garbage both yield 60.
    #[test]
    fn falls_back_to_sixty_seconds() {
        assert_eq!(parse_retry_after(None), 60);
        assert_eq!(parse_retry_after(Some("soonish")), 60);
        assert_eq!(parse_retry_after(Some("-5")), 60);
    }

    /// Validates `error_body_excerpt` behavior for the structured error body
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the code and message are extracted.
    #[test]
    fn extracts_structured_error_body() {
        let body = r#"{"error": {"code": "record_locked", "message": "record is locked"}}"#;
        assert_eq!(error_body_excerpt(body), "record_locked: record is locked");
    }

    /// Validates `error_body_excerpt` behavior for the raw body fallback
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms non-JSON bodies pass through trimmed.
    /// - Confirms long bodies are truncated to 200 characters.
    /// - Confirms empty bodies get a placeholder.
    #[test]
    fn falls_back_to_raw_excerpt() {
        assert_eq!(error_body_excerpt("  plain text failure "), "plain text failure");
        assert_eq!(error_body_excerpt("").as_str(), "<empty body>");

        let long = "x".repeat(500);
        assert_eq!(error_body_excerpt(&long).len(), 200);
    }
}
