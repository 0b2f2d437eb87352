//! Candidate and accepted coupon records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Code emitted when the extractor finds nothing at all.
///
/// Always rejected by the validator, so it never reaches a caller.
pub const NO_CODES_FOUND: &str = "NO_CODES_FOUND";

// ---------------------------------------------------------------------------
// CandidateRecord
// ---------------------------------------------------------------------------

/// An unvalidated record pulled out of a model answer.
///
/// Lives only between the extractor and the validator.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateRecord {
    /// A key-value object. Either field may be missing or unusable.
    Record {
        code: Option<String>,
        description: Option<String>,
    },
    /// A list element that was not an object (null, number, string, array).
    Malformed(Value),
}

impl CandidateRecord {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Record {
            code: Some(code.into()),
            description: Some(description.into()),
        }
    }

    /// Coerce one JSON list element.
    ///
    /// Numeric codes (`12345`) are kept as their decimal text; booleans,
    /// objects and arrays in a field count as absent.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::Record {
                code: map.get("code").and_then(scalar_text),
                description: map.get("description").and_then(scalar_text),
            },
            other => Self::Malformed(other.clone()),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Record { code, .. } => code.as_deref(),
            Self::Malformed(_) => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Record { description, .. } => description.as_deref(),
            Self::Malformed(_) => None,
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// AcceptedRecord
// ---------------------------------------------------------------------------

/// A record that passed every validator rule.
///
/// Only the validator constructs these; values read back from the cache were
/// validated before they were written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcceptedRecord {
    code: String,
    description: String,
}

impl AcceptedRecord {
    pub(crate) fn new(code: String, description: String) -> Self {
        Self { code, description }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl From<&AcceptedRecord> for CandidateRecord {
    fn from(record: &AcceptedRecord) -> Self {
        Self::new(record.code.clone(), record.description.clone())
    }
}
