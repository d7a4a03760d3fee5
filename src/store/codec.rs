//! The structure pass: schema-ordered serialize and deserialize.

use std::borrow::Cow;

use thiserror::Error;

use crate::convert::{Owner, Shape};
use crate::schema::Schema;
use crate::value::{Map, Value, ValueKind};

/// The document root could not be used at all; the pass was skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructureError {
    #[error("expected a Map at the document root, found {0}")]
    NotAMap(ValueKind),
}

/// Why one member kept its previous value.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberIssue {
    Missing {
        member: String,
    },
    NullNotAllowed {
        member: String,
    },
    ShapeMismatch {
        member: String,
        expected: Shape,
        found: ValueKind,
    },
    Conversion {
        member: String,
        error: String,
    },
}

impl MemberIssue {
    pub fn member(&self) -> &str {
        match self {
            MemberIssue::Missing { member }
            | MemberIssue::NullNotAllowed { member }
            | MemberIssue::ShapeMismatch { member, .. }
            | MemberIssue::Conversion { member, .. } => member,
        }
    }
}

/// Outcome of one deserialize pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeserializeReport {
    pub applied: usize,
    pub issues: Vec<MemberIssue>,
}

impl DeserializeReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issue_for(&self, member: &str) -> Option<&MemberIssue> {
        self.issues.iter().find(|issue| issue.member() == member)
    }
}

/// Applies Integer/Float coercion for `shape`; `None` is a shape mismatch.
pub(crate) fn coerce(value: &Value, shape: Shape) -> Option<Cow<'_, Value>> {
    match (shape, value) {
        (Shape::Any, _) | (_, Value::Null) => Some(Cow::Borrowed(value)),
        (Shape::Numeric, Value::Integer(_) | Value::Float(_)) => Some(Cow::Borrowed(value)),
        (Shape::Kind(kind), _) if kind == value.kind() => Some(Cow::Borrowed(value)),
        (Shape::Kind(ValueKind::Float), Value::Integer(_)) => {
            value.as_float().map(|d| Cow::Owned(Value::Float(d)))
        }
        (Shape::Kind(ValueKind::Integer), Value::Float(_)) => {
            value.as_integer().map(|i| Cow::Owned(Value::Integer(i)))
        }
        _ => None,
    }
}

pub(crate) fn serialize_members<T>(schema: &Schema<T>, obj: &T, owner: &Owner) -> Value {
    let mut map = Map::with_capacity(schema.len());
    for member in schema.members() {
        let value = member.ops.serialize(obj, owner);
        if value.is_null() && !member.allow_null {
            tracing::warn!(
                member = %member.name,
                member_type = member.type_name(),
                "Member does not allow null but has no value, writing null"
            );
        }
        map.insert(member.name.clone(), value);
    }
    Value::Map(map)
}

pub(crate) fn deserialize_members<T>(
    schema: &Schema<T>,
    obj: &mut T,
    value: &Value,
    owner: &Owner,
) -> Result<DeserializeReport, StructureError> {
    let map = value
        .as_map()
        .ok_or_else(|| StructureError::NotAMap(value.kind()))?;

    let mut report = DeserializeReport::default();
    for member in schema.members() {
        let name = member.name.as_str();
        let Some(raw) = map.get(name) else {
            tracing::warn!(member = %name, "Missing key for member, keeping current value");
            report.issues.push(MemberIssue::Missing {
                member: name.to_string(),
            });
            continue;
        };

        if raw.is_null() && !member.allow_null {
            tracing::warn!(member = %name, "Member is not nullable, keeping current value");
            report.issues.push(MemberIssue::NullNotAllowed {
                member: name.to_string(),
            });
            continue;
        }

        let shape = member.ops.shape();
        let Some(coerced) = coerce(raw, shape) else {
            tracing::warn!(
                member = %name,
                expected = ?shape,
                found = %raw.kind(),
                "Unexpected type for member, keeping current value"
            );
            report.issues.push(MemberIssue::ShapeMismatch {
                member: name.to_string(),
                expected: shape,
                found: raw.kind(),
            });
            continue;
        };

        match member.ops.deserialize(obj, &coerced, owner) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                tracing::warn!(member = %name, error = %e, "Error converting member, keeping current value");
                report.issues.push(MemberIssue::Conversion {
                    member: name.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

pub(crate) fn attach_members<T>(schema: &Schema<T>, obj: &mut T, owner: &Owner) {
    for member in schema.members() {
        member.ops.attach(obj, owner);
    }
}
