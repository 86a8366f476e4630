//! Shape validation for externally registered URL entries.
//!
//! Every violation in an entry is reported, not only the first one, so the
//! producer's author sees the full list at once. An entry with any violation
//! is dropped.

use crate::record::{SourceKind, UrlRecord};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;
use url::Url;

/// 2001-01-01T00:00:00Z. Earlier non-zero timestamps are rejected.
pub const TIMESTAMP_FLOOR: i64 = 978_307_200;

/// Keys every candidate entry must carry.
pub const REQUIRED_KEYS: [&str; 3] = ["url", "identifier", "last_modified"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("missing keys in URL registration")]
    MissingKeys,
    #[error("identifier must be a string or a number")]
    InvalidIdentifier,
    #[error("malformed URL provided")]
    MalformedUrl,
    #[error("invalid or missing URL scheme provided")]
    InvalidScheme,
    #[error("no hostname found in URL")]
    MissingHost,
    #[error("last modified is not a timestamp")]
    NotATimestamp,
    #[error("last modified is not a valid timestamp")]
    InvalidTimestamp,
    #[error("last modified cannot be in the future")]
    FutureTimestamp,
}

/// Receives one event per violation found in a candidate entry.
///
/// Implementations must not fail back into the validator.
pub trait ValidationErrorSink {
    fn notify(&self, candidate: &Value, message: &str);
}

impl<F> ValidationErrorSink for F
where
    F: Fn(&Value, &str),
{
    fn notify(&self, candidate: &Value, message: &str) {
        self(candidate, message)
    }
}

/// Default sink: a `warn` event per violation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ValidationErrorSink for LogErrorSink {
    fn notify(&self, candidate: &Value, message: &str) {
        warn!(%candidate, "URL registration rejected: {message}");
    }
}

/// A candidate that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidEntry {
    pub url: Url,
    pub identifier: String,
    pub last_modified: i64,
}

impl ValidEntry {
    pub fn into_record(self, source: SourceKind) -> UrlRecord {
        UrlRecord {
            source,
            identifier: self.identifier,
            url: self.url,
            last_modified: self.last_modified,
        }
    }
}

/// Validate a candidate against `now` (Unix seconds), collecting every violation.
pub fn validate(candidate: &Value, now: i64) -> Result<ValidEntry, Vec<Violation>> {
    let Some(entry) = candidate.as_object() else {
        return Err(vec![Violation::MissingKeys]);
    };

    let mut violations = Vec::new();

    if REQUIRED_KEYS.iter().any(|key| !entry.contains_key(*key)) {
        violations.push(Violation::MissingKeys);
    }

    let identifier = entry.get("identifier").and_then(|value| match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => {
            violations.push(Violation::InvalidIdentifier);
            None
        }
    });

    let url = check_url(entry, &mut violations);
    let last_modified = check_last_modified(entry, now, &mut violations);

    match (violations.is_empty(), url, identifier, last_modified) {
        (true, Some(url), Some(identifier), Some(last_modified)) => Ok(ValidEntry {
            url,
            identifier,
            last_modified,
        }),
        _ => Err(violations),
    }
}

/// Validate a candidate and report each violation to `errors`.
///
/// Returns the record to register when the candidate is clean.
pub fn validate_and_report(
    candidate: &Value,
    now: i64,
    source: SourceKind,
    errors: &dyn ValidationErrorSink,
) -> Option<UrlRecord> {
    match validate(candidate, now) {
        Ok(entry) => Some(entry.into_record(source)),
        Err(violations) => {
            for violation in &violations {
                errors.notify(candidate, &violation.to_string());
            }
            None
        }
    }
}

fn check_url(entry: &Map<String, Value>, violations: &mut Vec<Violation>) -> Option<Url> {
    let raw = entry.get("url")?;
    let Some(raw) = raw.as_str() else {
        violations.push(Violation::MalformedUrl);
        return None;
    };
    let Ok(url) = Url::parse(raw) else {
        violations.push(Violation::MalformedUrl);
        return None;
    };

    let mut ok = true;
    if !matches!(url.scheme(), "http" | "https") {
        violations.push(Violation::InvalidScheme);
        ok = false;
    }
    if url.host().is_none() {
        violations.push(Violation::MissingHost);
        ok = false;
    }
    ok.then_some(url)
}

fn check_last_modified(
    entry: &Map<String, Value>,
    now: i64,
    violations: &mut Vec<Violation>,
) -> Option<i64> {
    let raw = entry.get("last_modified")?;

    let is_integer = raw.is_i64() || raw.is_u64();
    if !is_integer {
        violations.push(Violation::NotATimestamp);
    }

    let timestamp = integer_value(raw)?;

    let mut ok = is_integer;
    if timestamp < 0 || (timestamp > 0 && timestamp < TIMESTAMP_FLOOR) {
        violations.push(Violation::InvalidTimestamp);
        ok = false;
    }
    if timestamp > now {
        violations.push(Violation::FutureTimestamp);
        ok = false;
    }
    ok.then_some(timestamp)
}

/// Integer reading of a JSON value, accepting numeric strings.
fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
