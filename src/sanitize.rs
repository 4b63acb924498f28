//! Input sanitization: HTML escaping for stored text and a request filter
//! that blocks naive injection patterns in paths and query strings.

use axum::{extract::Request, middleware::Next, response::Response};
use thiserror::Error;

use crate::EcommerceError;

const SQL_PATTERNS: &[&str] = &["--", "/*", "*/", ";", "' or ", "\" or ", "union select", "drop table", "insert into", "delete from"];
const SCRIPT_PATTERNS: &[&str] = &["<script", "javascript:", "<iframe", "<img", "onerror", "onload", "onclick", "alert("];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    #[error("text must be at least {0} characters long")]
    TooShort(usize),
    #[error("text cannot exceed {0} characters")]
    TooLong(usize),
    #[error("text contains disallowed content")]
    Disallowed,
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

pub fn contains_script(text: &str) -> bool {
    let lower = text.to_lowercase();
    SCRIPT_PATTERNS.iter().any(|p| lower.contains(p))
}

pub fn contains_sql_pattern(text: &str) -> bool {
    let lower = text.to_lowercase();
    SQL_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Length and content check for free text (comments, reviews, reasons).
pub fn check_text(text: &str, min: usize, max: usize) -> Result<(), TextError> {
    let len = text.chars().count();
    if len < min { return Err(TextError::TooShort(min)); }
    if len > max { return Err(TextError::TooLong(max)); }
    if contains_script(text) { return Err(TextError::Disallowed); }
    Ok(())
}

/// Percent-decodes a path so encoded payloads are inspected too.
fn decode_path(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

/// Like [`decode_path`], with `+` read as a space as in form encoding.
fn decode_query(raw: &str) -> String {
    decode_path(&raw.replace('+', " "))
}

/// Rejects requests whose path or query carries injection markers.
pub async fn block_suspicious_input(req: Request, next: Next) -> Result<Response, EcommerceError> {
    let path = decode_path(req.uri().path());
    let query = req.uri().query().map(decode_query).unwrap_or_default();
    if contains_sql_pattern(&path) || contains_sql_pattern(&query) || contains_script(&path) || contains_script(&query) {
        tracing::warn!(path = %req.uri().path(), "blocked request with suspicious input");
        return Err(EcommerceError::Validation("request contains disallowed content".into()));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">Tom's</a>"), "&lt;a href=&quot;x&quot;&gt;Tom&#x27;s&lt;/a&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_patterns() {
        assert!(contains_sql_pattern("1; DROP TABLE users"));
        assert!(contains_sql_pattern("name' OR '1'='1"));
        assert!(!contains_sql_pattern("wireless headphones"));
        assert!(contains_script("<ScRiPt>"));
        assert!(!contains_script("great speaker"));
    }

    #[test]
    fn test_check_text() {
        assert_eq!(check_text("", 1, 10), Err(TextError::TooShort(1)));
        assert_eq!(check_text("abcdefghijk", 1, 10), Err(TextError::TooLong(10)));
        assert_eq!(check_text("javascript:void(0)", 1, 100), Err(TextError::Disallowed));
        assert!(check_text("nice", 1, 10).is_ok());
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode_query("q=union%20select"), "q=union select");
        assert_eq!(decode_query("q=a+b%2B"), "q=a b+");
        assert_eq!(decode_path("/api/products/a+b"), "/api/products/a+b");
        assert_eq!(decode_path("/%3Cscript%3E"), "/<script>");
        assert!(contains_sql_pattern(&decode_query("q=x%27+or+%271%27%3D%271")));
    }
}
