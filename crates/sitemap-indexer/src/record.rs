//! Records flowing out of the indexer and the persisted progress indicator.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use url::Url;

/// Which kind of source produced a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Paged,
    Callback,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Paged => f.write_str("paged"),
            SourceKind::Callback => f.write_str("callback"),
        }
    }
}

/// A URL handed to the registration sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub source: SourceKind,
    /// Unique within `source`.
    pub identifier: String,
    pub url: Url,
    /// Unix timestamp; `0` means unknown.
    pub last_modified: i64,
}

/// A progress estimate that a source may or may not be able to give.
///
/// Serialized as a number, or the string `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Estimate {
    Known(u64),
    #[default]
    Unknown,
}

impl From<Option<u64>> for Estimate {
    fn from(value: Option<u64>) -> Self {
        value.map(Estimate::Known).unwrap_or(Estimate::Unknown)
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Estimate::Known(n) => write!(f, "{n}"),
            Estimate::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for Estimate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Estimate::Known(n) => serializer.serialize_u64(*n),
            Estimate::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for Estimate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(Estimate::Known)
                .ok_or_else(|| de::Error::custom(format!("invalid estimate: {n}"))),
            serde_json::Value::String(s) if s == "unknown" => Ok(Estimate::Unknown),
            other => Err(de::Error::custom(format!("invalid estimate: {other}"))),
        }
    }
}

/// The source currently being indexed, with enough metadata to report progress.
///
/// Persisted as `{"type": ..., "meta": {...}}`. Its presence in the store means
/// an invocation stopped before finishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "meta", rename_all = "snake_case")]
pub enum IndexIndicator {
    Paged {
        source: String,
        partition: String,
        offset: u64,
        total: Estimate,
    },
    Callback {
        source: String,
        iteration: u64,
        iterations: Estimate,
    },
}

impl IndexIndicator {
    pub fn kind(&self) -> SourceKind {
        match self {
            IndexIndicator::Paged { .. } => SourceKind::Paged,
            IndexIndicator::Callback { .. } => SourceKind::Callback,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            IndexIndicator::Paged { source, .. } | IndexIndicator::Callback { source, .. } => {
                source
            }
        }
    }
}

impl fmt::Display for IndexIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexIndicator::Paged {
                source,
                partition,
                offset,
                total,
            } => write!(f, "{source}/{partition} at offset {offset} of {total}"),
            IndexIndicator::Callback {
                source,
                iteration,
                iterations,
            } => write!(f, "{source} at iteration {iteration} of {iterations}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_indicator_wire_shape() {
        let indicator = IndexIndicator::Paged {
            source: "content".into(),
            partition: "post".into(),
            offset: 50,
            total: Estimate::Known(120),
        };
        assert_eq!(
            serde_json::to_value(&indicator).unwrap(),
            json!({
                "type": "paged",
                "meta": {"source": "content", "partition": "post", "offset": 50, "total": 120}
            })
        );

        let indicator = IndexIndicator::Callback {
            source: "custom".into(),
            iteration: 3,
            iterations: Estimate::Unknown,
        };
        let value = serde_json::to_value(&indicator).unwrap();
        assert_eq!(value["type"], "callback");
        assert_eq!(value["meta"]["iterations"], "unknown");

        let back: IndexIndicator = serde_json::from_value(value).unwrap();
        assert_eq!(back, indicator);
        assert_eq!(back.kind(), SourceKind::Callback);
    }

    #[test]
    fn test_estimate_rejects_other_strings() {
        assert!(serde_json::from_value::<Estimate>(json!("many")).is_err());
        assert_eq!(serde_json::from_value::<Estimate>(json!(7)).unwrap(), Estimate::Known(7));
    }

    #[test]
    fn test_indicator_display() {
        let indicator = IndexIndicator::Callback {
            source: "custom".into(),
            iteration: 2,
            iterations: Estimate::Known(5),
        };
        assert_eq!(indicator.to_string(), "custom at iteration 2 of 5");
    }
}
