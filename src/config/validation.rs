//! Configuration validation against example documents.
//!
//! # Responsibilities
//! - Check that every key of the example document is present
//! - Apply per-path rules (`required`, `same_as_example`)
//! - Report every offending path at once
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over (example, actual, rules)
//! - Runs before a document is merged into the global tree

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::tree::{get_path, key_paths};

/// Checks applied to a single dotted key path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Rule {
    /// Value must be present, non-null and not an empty string.
    pub required: bool,

    /// Value must deeply equal the example document's value.
    #[serde(alias = "sameAsExample")]
    pub same_as_example: bool,
}

impl Rule {
    pub fn required() -> Self {
        Self { required: true, same_as_example: false }
    }

    pub fn same_as_example() -> Self {
        Self { required: false, same_as_example: true }
    }
}

/// Rule set keyed by dotted path.
pub type Rules = BTreeMap<String, Rule>;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing key `{0}` (present in example)")]
    MissingKey(String),

    #[error("required value `{0}` is missing or empty")]
    MissingValue(String),

    #[error("value `{path}` is {actual}, example requires {expected}")]
    Mismatch {
        path: String,
        expected: Value,
        actual: Value,
    },
}

impl ValidationError {
    /// Dotted path the failure refers to.
    pub fn path(&self) -> &str {
        match self {
            ValidationError::MissingKey(path) | ValidationError::MissingValue(path) => path,
            ValidationError::Mismatch { path, .. } => path,
        }
    }
}

/// Every validation failure for one configuration source.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub source: String,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn missing_keys(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().filter_map(|e| match e {
            ValidationError::MissingKey(path) => Some(path.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config `{}` failed validation ({} errors):", self.source, self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  - {}", err)?;
        }
        Ok(())
    }
}

/// Validate `actual` against `example` and `rules`.
///
/// Both documents are expected to already be scoped to their group.
pub fn validate(example: &Value, actual: &Value, rules: &Rules) -> Vec<ValidationError> {
    let present: HashSet<String> = key_paths(actual).into_iter().collect();

    let mut errors: Vec<ValidationError> = key_paths(example)
        .into_iter()
        .filter(|path| !present.contains(path))
        .map(ValidationError::MissingKey)
        .collect();

    for (path, rule) in rules {
        let value = get_path(actual, path);

        if rule.required && is_blank(value) {
            errors.push(ValidationError::MissingValue(path.clone()));
        }

        if rule.same_as_example {
            let expected = get_path(example, path).cloned().unwrap_or(Value::Null);
            let actual = value.cloned().unwrap_or(Value::Null);
            if expected != actual {
                errors.push(ValidationError::Mismatch {
                    path: path.clone(),
                    expected,
                    actual,
                });
            }
        }
    }

    errors
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}
