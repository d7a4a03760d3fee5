//! Converter framework: typed conversion between native values and [`Value`] trees.
//!
//! # Responsibilities
//! - Define the [`ValueConverter`] contract (`from_value` fails, `to_value` is total)
//! - Resolve a default converter for every supported member type through [`Convertible`]
//! - Provide scalar, optional, collection, enum and time converters
//! - Erase converters so they can be declared by name or attached to a schema at runtime
//!
//! # Design Decisions
//! - Resolution is static: each convertible type names its converter, the way
//!   a default-converter lookup would, but checked at compile time
//! - The `owner` argument carries the logical parent store so nested stores can
//!   link themselves into the tree they are decoded into

mod collections;
mod enums;
mod registry;
mod scalar;
mod time;

pub use collections::{CollectionConverter, DictionaryConverter, OptionConverter};
pub use enums::{CaseInsensitiveEnumConverter, ConfigEnum, EnumConverter, NumericEnumConverter};
pub use registry::{ConverterRegistry, ErasedAdapter, ErasedConverter};
pub use scalar::{
    BoolConverter, CharConverter, DecimalConverter, FloatConverter, IntegerConverter,
    StringConverter, UnsignedConverter,
};
pub use time::{DurationConverter, OffsetDateTimeConverter, UtcDateTimeConverter};

use std::sync::{Arc, Weak};

use rust_decimal::Decimal;
use thiserror::Error;

use crate::schema::SchemaCache;
use crate::store::StoreLink;
use crate::value::{Value, ValueKind};

/// A conversion could not produce a native value from the given node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("expected {expected}, found {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: ValueKind,
    },

    #[error("{value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("invalid {target} text {text:?}: {reason}")]
    InvalidText {
        target: &'static str,
        text: String,
        reason: String,
    },

    #[error("no variant of {target} matches {text:?}")]
    UnknownVariant { target: &'static str, text: String },

    #[error("nested store rejected the document: {0}")]
    Nested(String),

    #[error("{0}")]
    Custom(String),
}

impl ConversionError {
    pub fn unexpected(expected: &'static str, found: &Value) -> Self {
        ConversionError::UnexpectedKind {
            expected,
            found: found.kind(),
        }
    }

    pub fn out_of_range(value: impl ToString, target: &'static str) -> Self {
        ConversionError::OutOfRange {
            value: value.to_string(),
            target,
        }
    }
}

/// The node kind a converter expects, used by the structure pass for
/// shape checks and Integer/Float coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Exactly this kind.
    Kind(ValueKind),
    /// Either `Integer` or `Float`.
    Numeric,
    /// The converter inspects the node itself.
    Any,
}

/// The logical parent of a value being converted.
#[derive(Clone)]
pub struct Owner {
    parent: Option<Weak<dyn StoreLink>>,
    schemas: Arc<SchemaCache>,
}

impl Owner {
    pub(crate) fn new(parent: Weak<dyn StoreLink>, schemas: Arc<SchemaCache>) -> Self {
        Self {
            parent: Some(parent),
            schemas,
        }
    }

    /// An owner outside any store tree.
    pub fn detached(schemas: Arc<SchemaCache>) -> Self {
        Self {
            parent: None,
            schemas,
        }
    }

    pub fn parent(&self) -> Option<&Weak<dyn StoreLink>> {
        self.parent.as_ref()
    }

    pub fn schemas(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }
}

impl std::fmt::Debug for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owner")
            .field("attached", &self.parent.is_some())
            .finish()
    }
}

/// Converts between `Self::Target` and [`Value`] nodes.
pub trait ValueConverter: Send + Sync + 'static {
    type Target;

    fn from_value(&self, value: &Value, owner: &Owner) -> Result<Self::Target, ConversionError>;

    fn to_value(&self, obj: &Self::Target, owner: &Owner) -> Value;

    fn shape(&self) -> Shape {
        Shape::Any
    }

    /// Decodes `value` into an existing target.
    ///
    /// Replaces the target by default. Converters for stores override this
    /// to update the existing node in place so handles held elsewhere stay valid.
    fn merge_into(
        &self,
        target: &mut Self::Target,
        value: &Value,
        owner: &Owner,
    ) -> Result<(), ConversionError> {
        *target = self.from_value(value, owner)?;
        Ok(())
    }
}

pub type ConverterRef<T> = Arc<dyn ValueConverter<Target = T>>;

/// A type with a default converter.
pub trait Convertible: Sized + Send + Sync + 'static {
    /// `Null` is a legal encoding (optional members).
    const NULLABLE: bool = false;
    /// The encoding is a Map produced by a schema.
    const NESTED: bool = false;

    fn default_converter() -> ConverterRef<Self>;

    /// Links nested stores inside `self` to `owner`.
    fn attach(&mut self, _owner: &Owner) {}
}

/// Integral value of a numeric node, coercing an exactly integral `Float`.
pub fn int_value(value: &Value) -> Option<i64> {
    value.as_integer()
}

/// Decimal value of a numeric node, widening an `Integer`.
pub fn float_value(value: &Value) -> Option<Decimal> {
    value.as_float()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_helpers() {
        assert_eq!(int_value(&Value::Float(Decimal::new(70, 1))), Some(7));
        assert_eq!(int_value(&Value::Float(Decimal::new(75, 1))), None);
        assert_eq!(float_value(&Value::Integer(3)), Some(Decimal::from(3)));
        assert_eq!(float_value(&Value::text("3")), None);
    }

    #[test]
    fn test_error_messages() {
        let err = ConversionError::unexpected("Integer", &Value::text("x"));
        assert_eq!(err.to_string(), "expected Integer, found Text");

        let err = ConversionError::out_of_range(300, "u8");
        assert_eq!(err.to_string(), "300 is out of range for u8");
    }
}
