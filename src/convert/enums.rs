//! Enum converters and the `config_enum!` declaration macro.

use std::marker::PhantomData;

use super::{int_value, ConversionError, Owner, Shape, ValueConverter};
use crate::value::{Value, ValueKind};

/// A fieldless enum with named variants and integer discriminants.
///
/// Usually implemented through [`config_enum!`](crate::config_enum).
pub trait ConfigEnum: Copy + Send + Sync + 'static {
    const VARIANTS: &'static [Self];

    fn name(&self) -> &'static str;

    fn discriminant(&self) -> i64;
}

/// Variant name as `Text`, matched exactly.
pub struct EnumConverter<E>(PhantomData<fn() -> E>);

/// Variant name as `Text`, matched ignoring ASCII case. The default for enums.
pub struct CaseInsensitiveEnumConverter<E>(PhantomData<fn() -> E>);

/// Discriminant as `Integer`.
pub struct NumericEnumConverter<E>(PhantomData<fn() -> E>);

macro_rules! marker_ctor {
    ($($conv:ident),*) => {$(
        impl<E> $conv<E> {
            pub fn new() -> Self {
                Self(PhantomData)
            }
        }

        impl<E> Default for $conv<E> {
            fn default() -> Self {
                Self::new()
            }
        }
    )*};
}

marker_ctor!(EnumConverter, CaseInsensitiveEnumConverter, NumericEnumConverter);

fn find_by_name<E: ConfigEnum>(value: &Value, matches: impl Fn(&str, &str) -> bool) -> Result<E, ConversionError> {
    let text = value
        .as_text()
        .ok_or_else(|| ConversionError::unexpected("Text", value))?;
    E::VARIANTS
        .iter()
        .copied()
        .find(|variant| matches(variant.name(), text))
        .ok_or_else(|| ConversionError::UnknownVariant {
            target: std::any::type_name::<E>(),
            text: text.to_string(),
        })
}

impl<E: ConfigEnum> ValueConverter for EnumConverter<E> {
    type Target = E;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<E, ConversionError> {
        find_by_name(value, |name, text| name == text)
    }

    fn to_value(&self, obj: &E, _owner: &Owner) -> Value {
        Value::text(obj.name())
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Text)
    }
}

impl<E: ConfigEnum> ValueConverter for CaseInsensitiveEnumConverter<E> {
    type Target = E;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<E, ConversionError> {
        find_by_name(value, |name, text| name.eq_ignore_ascii_case(text))
    }

    fn to_value(&self, obj: &E, _owner: &Owner) -> Value {
        Value::text(obj.name())
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Text)
    }
}

impl<E: ConfigEnum> ValueConverter for NumericEnumConverter<E> {
    type Target = E;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<E, ConversionError> {
        let n = int_value(value).ok_or_else(|| ConversionError::unexpected("Integer", value))?;
        E::VARIANTS
            .iter()
            .copied()
            .find(|variant| variant.discriminant() == n)
            .ok_or_else(|| ConversionError::UnknownVariant {
                target: std::any::type_name::<E>(),
                text: n.to_string(),
            })
    }

    fn to_value(&self, obj: &E, _owner: &Owner) -> Value {
        Value::Integer(obj.discriminant())
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Integer)
    }
}

/// Declares a fieldless enum usable as a config member.
///
/// The enum gets `Debug, Clone, Copy, PartialEq, Eq, Hash`, a [`ConfigEnum`]
/// impl and a case-insensitive default converter.
///
/// ```
/// config_store::config_enum! {
///     #[derive(Default)]
///     pub enum Color {
///         #[default]
///         Red,
///         Green = 5,
///         Blue,
///     }
/// }
/// ```
#[macro_export]
macro_rules! config_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident $(= $disc:expr)?),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant $(= $disc)?),+
        }

        impl $crate::convert::ConfigEnum for $name {
            const VARIANTS: &'static [Self] = &[$($name::$variant),+];

            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            fn discriminant(&self) -> i64 {
                *self as i64
            }
        }

        impl $crate::convert::Convertible for $name {
            fn default_converter() -> $crate::convert::ConverterRef<Self> {
                ::std::sync::Arc::new($crate::convert::CaseInsensitiveEnumConverter::<$name>::new())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Convertible;
    use crate::schema::SchemaCache;
    use std::sync::Arc;

    crate::config_enum! {
        enum Color {
            Red,
            Green = 5,
            Blue,
        }
    }

    fn owner() -> Owner {
        Owner::detached(Arc::new(SchemaCache::default()))
    }

    #[test]
    fn test_default_is_case_insensitive() {
        let conv = Color::default_converter();
        for text in ["blue", "BLUE", "Blue"] {
            assert_eq!(conv.from_value(&Value::text(text), &owner()), Ok(Color::Blue));
        }
        assert_eq!(conv.to_value(&Color::Blue, &owner()), Value::text("Blue"));
    }

    #[test]
    fn test_exact_converter_rejects_other_case() {
        let conv = EnumConverter::<Color>::new();
        assert_eq!(conv.from_value(&Value::text("Green"), &owner()), Ok(Color::Green));
        assert!(matches!(
            conv.from_value(&Value::text("green"), &owner()),
            Err(ConversionError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn test_numeric_converter_uses_discriminants() {
        let conv = NumericEnumConverter::<Color>::new();
        assert_eq!(conv.to_value(&Color::Blue, &owner()), Value::Integer(6));
        assert_eq!(conv.from_value(&Value::Integer(5), &owner()), Ok(Color::Green));
        assert!(conv.from_value(&Value::Integer(1), &owner()).is_err());
        assert!(conv.from_value(&Value::text("Red"), &owner()).is_err());
    }
}
