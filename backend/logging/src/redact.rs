//! Log Redaction Layer
//!
//! Scrubs API keys, bearer tokens and credential query parameters from
//! strings prior to logging. Plugin hook errors often echo request URLs.

use regex::Regex;
use std::sync::LazyLock;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9]{32,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").unwrap()
});
static QUERY_SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([?&](?:api[_-]?key|access[_-]?token|token|key)=)[^&\s]+").unwrap()
});
static URL_PASSWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(://[^:/\s@]+:)[^@\s]+@").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = API_KEY_RE.replace_all(input, "[REDACTED_TOKEN]");
    let redacted = QUERY_SECRET_RE.replace_all(&redacted, "${1}[REDACTED]");
    URL_PASSWORD_RE
        .replace_all(&redacted, "${1}[REDACTED]@")
        .into_owned()
}
