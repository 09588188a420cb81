//! Structured validation errors.

use std::fmt;

use super::{Entity, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    /// A required field is absent.
    Required,
    /// The value has the wrong JSON type (or is null where null is not allowed).
    InvalidType { expected: &'static str },
    /// The key is not a field of the entity (or not valid at this position).
    Unrecognized,
    /// A date-time string is not RFC 3339.
    InvalidDateTime,
    /// No complete unique key is present in a where-unique input.
    MissingUniqueKey,
    /// An aggregate that needs a numeric field was given another kind.
    NotNumeric,
    /// A number is out of the allowed range.
    OutOfRange,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("required"),
            Self::InvalidType { expected } => write!(f, "expected {expected}"),
            Self::Unrecognized => f.write_str("unrecognized key"),
            Self::InvalidDateTime => f.write_str("invalid RFC 3339 date-time"),
            Self::MissingUniqueKey => f.write_str("no unique key given"),
            Self::NotNumeric => f.write_str("field is not numeric"),
            Self::OutOfRange => f.write_str("out of range"),
        }
    }
}

/// One violated constraint at a dotted field path (`""` is the root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub code: IssueCode,
}

/// A payload failed its entity's validation contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {operation} validation failed: {}", format_issues(issues))]
pub struct ValidationError {
    pub entity: Entity,
    pub operation: Operation,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Paths of all violating fields, in report order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.issues.iter().map(|i| i.path.as_str()).collect()
    }

    /// Issue for `path`, if any.
    #[must_use]
    pub fn issue(&self, path: &str) -> Option<&ValidationIssue> {
        self.issues.iter().find(|i| i.path == path)
    }
}

/// `email: required; name: expected string`, with `<root>` for the empty path.
fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| {
            let path = if issue.path.is_empty() { "<root>" } else { issue.path.as_str() };
            format!("{path}: {}", issue.code)
        })
        .collect::<Vec<_>>()
        .join("; ")
}
