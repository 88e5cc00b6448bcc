//! Redaction helpers for grant keys and other secrets.
//!
//! Grant keys are opaque secrets. Anything that may reach a log line or the
//! terminal goes through [`redact_sensitive`] or [`mask_secret`] first.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";
/// Number of trailing characters left visible by [`mask_secret`].
const VISIBLE_SUFFIX: usize = 4;
/// Secrets shorter than this are masked entirely.
const MIN_MASKABLE_LENGTH: usize = 8;

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)("grant_?key"\s*:\s*")([^"]*)(")"#).unwrap(),
        Regex::new(r"(?i)(grant_?key\s*[=:]\s*)([^\s,;]+)()").unwrap(),
        Regex::new(r"(?i)(authorization:\s+)([^\s]+(?:\s+[^\s]+)*)()").unwrap(),
        Regex::new(r"(?i)((?:^|\b)Bearer\s+)([A-Za-z0-9\-._~+/]+=*)()").unwrap(),
    ]
});

/// Redacts values that look like secrets in a string.
///
/// Covers grant keys embedded as JSON fields (`"grantKey": "..."`), as
/// `key=value` pairs, and authorization headers.
///
/// # Example
/// ```rust
/// use grantsync_util::redact_sensitive;
///
/// let redacted = redact_sensitive(r#"{"grantKey":"abc123"}"#);
/// assert_eq!(redacted, r#"{"grantKey":"[REDACTED]"}"#);
/// ```
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                let suffix = captures.get(3).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}{REDACTED}{suffix}")
            })
            .to_string();
    }
    redacted
}

/// Mask a secret for display, keeping only its last few characters.
///
/// Empty input stays empty so "not configured" remains distinguishable.
pub fn mask_secret(secret: &str) -> String {
    let length = secret.chars().count();
    if length == 0 {
        return String::new();
    }
    if length < MIN_MASKABLE_LENGTH {
        return "*".repeat(length);
    }
    let suffix: String = secret.chars().skip(length - VISIBLE_SUFFIX).collect();
    format!("{}{}", "*".repeat(length - VISIBLE_SUFFIX), suffix)
}
