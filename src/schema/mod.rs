//! Validation contracts for persisted entities.
//!
//! DESIGN
//! ======
//! Each entity has one declarative field table ([`EntitySchema`]) mirroring
//! its relational columns: name, kind, nullability, and whether the
//! database supplies a default. Every request shape the data layer accepts
//! (create, update, where-unique, where, select, aggregate) is checked
//! against that one table, so there is exactly one contract per entity.
//!
//! Validators are pure: a `serde_json::Value` goes in and comes back
//! unchanged on success, or a [`ValidationError`] lists every violated field
//! path. Nothing here touches the network.

pub mod entities;
mod error;

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub use error::{IssueCode, ValidationError, ValidationIssue};

// =============================================================================
// FIELDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Opaque non-empty string identifier.
    Id,
    Text,
    Int,
    Float,
    Bool,
    /// RFC 3339 date-time string.
    DateTime,
    /// Any JSON value.
    Json,
}

impl FieldKind {
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    fn expected(self) -> &'static str {
        match self {
            Self::Id => "non-empty string",
            Self::Text | Self::DateTime => "string",
            Self::Int => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    /// The database fills the column when the create payload omits it.
    pub has_default: bool,
}

impl FieldSpec {
    #[must_use]
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, nullable: false, has_default: false }
    }

    #[must_use]
    pub const fn nullable(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, nullable: true, has_default: false }
    }

    #[must_use]
    pub const fn defaulted(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, nullable: false, has_default: true }
    }

    /// Must be present in a create payload.
    #[must_use]
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.has_default
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Users,
    Projects,
    ProjectCollaborators,
    Tags,
    Groups,
    MetricCards,
    MetricCardTags,
    Relationships,
    RelationshipTags,
    CommentThreads,
    Comments,
    CommentMentions,
    Notifications,
}

impl Entity {
    pub const ALL: [Self; 13] = [
        Self::Users,
        Self::Projects,
        Self::ProjectCollaborators,
        Self::Tags,
        Self::Groups,
        Self::MetricCards,
        Self::MetricCardTags,
        Self::Relationships,
        Self::RelationshipTags,
        Self::CommentThreads,
        Self::Comments,
        Self::CommentMentions,
        Self::Notifications,
    ];

    /// Table name in the relational schema.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Projects => "projects",
            Self::ProjectCollaborators => "project_collaborators",
            Self::Tags => "tags",
            Self::Groups => "groups",
            Self::MetricCards => "metric_cards",
            Self::MetricCardTags => "metric_card_tags",
            Self::Relationships => "relationships",
            Self::RelationshipTags => "relationship_tags",
            Self::CommentThreads => "comment_threads",
            Self::Comments => "comments",
            Self::CommentMentions => "comment_mentions",
            Self::Notifications => "notifications",
        }
    }

    #[must_use]
    pub fn schema(self) -> &'static EntitySchema {
        entities::schema_for(self)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity: {0}")]
pub struct UnknownEntity(pub String);

impl FromStr for Entity {
    type Err = UnknownEntity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.table() == s)
            .ok_or_else(|| UnknownEntity(s.to_owned()))
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    WhereUnique,
    Where,
    Select,
    Aggregate,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::WhereUnique => "where_unique",
            Self::Where => "where",
            Self::Select => "select",
            Self::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Create, Self::Update, Self::WhereUnique, Self::Where, Self::Select, Self::Aggregate]
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_owned()))
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

#[derive(Debug)]
pub struct EntitySchema {
    pub entity: Entity,
    pub fields: &'static [FieldSpec],
    /// Column sets that each identify one row.
    pub unique_keys: &'static [&'static [&'static str]],
}

impl EntitySchema {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check `value` against the shape expected for `operation`.
    ///
    /// # Errors
    ///
    /// Returns every violated field path when the value does not conform.
    pub fn validate(&self, operation: Operation, value: Value) -> Result<Value, ValidationError> {
        let mut checker = Checker::default();
        match value.as_object() {
            None => checker.push("", IssueCode::InvalidType { expected: "object" }),
            Some(obj) => match operation {
                Operation::Create => self.check_data(&mut checker, obj, true),
                Operation::Update => self.check_data(&mut checker, obj, false),
                Operation::WhereUnique => self.check_where_unique(&mut checker, obj),
                Operation::Where => self.check_where(&mut checker, obj, ""),
                Operation::Select => self.check_flags(&mut checker, obj, "", false, false),
                Operation::Aggregate => self.check_aggregate(&mut checker, obj),
            },
        }

        if checker.issues.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError { entity: self.entity, operation, issues: checker.issues })
        }
    }

    fn check_data(&self, checker: &mut Checker, obj: &Map<String, Value>, is_create: bool) {
        for (key, value) in obj {
            match self.field(key) {
                Some(field) => check_field(checker, field, value, key, field.nullable),
                None => checker.push(key, IssueCode::Unrecognized),
            }
        }
        if is_create {
            for field in self.fields.iter().filter(|f| f.is_required()) {
                if !obj.contains_key(field.name) {
                    checker.push(field.name, IssueCode::Required);
                }
            }
        }
    }

    fn check_where_unique(&self, checker: &mut Checker, obj: &Map<String, Value>) {
        for (key, value) in obj {
            match self.field(key) {
                Some(field) => check_field(checker, field, value, key, false),
                None => checker.push(key, IssueCode::Unrecognized),
            }
        }
        let has_key = self
            .unique_keys
            .iter()
            .any(|key| key.iter().all(|col| obj.get(*col).is_some_and(|v| !v.is_null())));
        if !has_key {
            checker.push("", IssueCode::MissingUniqueKey);
        }
    }

    fn check_where(&self, checker: &mut Checker, obj: &Map<String, Value>, prefix: &str) {
        for (key, value) in obj {
            let path = join(prefix, key);
            match self.field(key) {
                Some(field) => check_field(checker, field, value, &path, true),
                None => checker.push(&path, IssueCode::Unrecognized),
            }
        }
    }

    /// `{ field: bool }` maps used by select and the aggregate selectors.
    fn check_flags(&self, checker: &mut Checker, obj: &Map<String, Value>, prefix: &str, allow_all: bool, numeric: bool) {
        for (key, value) in obj {
            let path = join(prefix, key);
            // `_count: { _all: true }` counts rows rather than a column.
            if !(allow_all && key == "_all") {
                match self.field(key) {
                    None => {
                        checker.push(&path, IssueCode::Unrecognized);
                        continue;
                    }
                    Some(field) if numeric && !field.kind.is_numeric() => {
                        checker.push(&path, IssueCode::NotNumeric);
                        continue;
                    }
                    Some(_) => {}
                }
            }
            if !value.is_boolean() {
                checker.push(&path, IssueCode::InvalidType { expected: "boolean" });
            }
        }
    }

    fn check_aggregate(&self, checker: &mut Checker, obj: &Map<String, Value>) {
        for (key, value) in obj {
            match key.as_str() {
                "_count" => match value {
                    Value::Bool(_) => {}
                    Value::Object(inner) => self.check_flags(checker, inner, key, true, false),
                    _ => checker.push(key, IssueCode::InvalidType { expected: "boolean or object" }),
                },
                "_min" | "_max" | "_avg" | "_sum" => match value.as_object() {
                    Some(inner) => {
                        let numeric = matches!(key.as_str(), "_avg" | "_sum");
                        self.check_flags(checker, inner, key, false, numeric);
                    }
                    None => checker.push(key, IssueCode::InvalidType { expected: "object" }),
                },
                "where" => match value.as_object() {
                    Some(inner) => self.check_where(checker, inner, key),
                    None => checker.push(key, IssueCode::InvalidType { expected: "object" }),
                },
                "take" => {
                    if value.as_i64().is_none() {
                        checker.push(key, IssueCode::InvalidType { expected: "integer" });
                    }
                }
                "skip" => match value.as_i64() {
                    None => checker.push(key, IssueCode::InvalidType { expected: "integer" }),
                    Some(n) if n < 0 => checker.push(key, IssueCode::OutOfRange),
                    Some(_) => {}
                },
                _ => checker.push(key, IssueCode::Unrecognized),
            }
        }
    }
}

// =============================================================================
// VALUE CHECKS
// =============================================================================

#[derive(Default)]
struct Checker {
    issues: Vec<ValidationIssue>,
}

impl Checker {
    fn push(&mut self, path: &str, code: IssueCode) {
        self.issues.push(ValidationIssue { path: path.to_owned(), code });
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() { key.to_owned() } else { format!("{prefix}.{key}") }
}

fn check_field(checker: &mut Checker, field: &FieldSpec, value: &Value, path: &str, allow_null: bool) {
    if value.is_null() {
        if !allow_null {
            checker.push(path, IssueCode::InvalidType { expected: field.kind.expected() });
        }
        return;
    }

    let ok = match field.kind {
        FieldKind::Id => value.as_str().is_some_and(|s| !s.is_empty()),
        FieldKind::Text => value.is_string(),
        FieldKind::Int => value.is_i64() || value.is_u64(),
        FieldKind::Float => value.is_number(),
        FieldKind::Bool => value.is_boolean(),
        FieldKind::Json => true,
        FieldKind::DateTime => match value.as_str() {
            Some(s) => {
                if OffsetDateTime::parse(s, &Rfc3339).is_err() {
                    checker.push(path, IssueCode::InvalidDateTime);
                }
                true
            }
            None => false,
        },
    };
    if !ok {
        checker.push(path, IssueCode::InvalidType { expected: field.kind.expected() });
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
