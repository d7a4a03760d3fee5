use std::marker::PhantomData;
use std::sync::Arc;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::{float_value, int_value, ConversionError, ConverterRef, Convertible, Owner, Shape, ValueConverter};
use crate::value::{Value, ValueKind};

/// Signed and narrow unsigned integers, encoded as `Integer`.
pub struct IntegerConverter<T>(PhantomData<fn() -> T>);

impl<T> IntegerConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for IntegerConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValueConverter for IntegerConverter<T>
where
    T: TryFrom<i64> + Into<i64> + Copy + 'static,
{
    type Target = T;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<T, ConversionError> {
        let i = int_value(value).ok_or_else(|| ConversionError::unexpected("Integer", value))?;
        T::try_from(i).map_err(|_| ConversionError::out_of_range(i, std::any::type_name::<T>()))
    }

    fn to_value(&self, obj: &T, _owner: &Owner) -> Value {
        Value::Integer((*obj).into())
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Integer)
    }
}

/// Wide unsigned integers. Values above `i64::MAX` are written as `Float`.
pub struct UnsignedConverter<T>(PhantomData<fn() -> T>);

impl<T> UnsignedConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for UnsignedConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValueConverter for UnsignedConverter<T>
where
    T: TryFrom<u64> + TryInto<u64> + Copy + 'static,
{
    type Target = T;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<T, ConversionError> {
        let target = std::any::type_name::<T>();
        let wide = match value {
            Value::Integer(i) => u64::try_from(*i).map_err(|_| ConversionError::out_of_range(i, target))?,
            Value::Float(d) if d.fract().is_zero() => {
                d.to_u64().ok_or_else(|| ConversionError::out_of_range(d, target))?
            }
            _ => return Err(ConversionError::unexpected("Integer", value)),
        };
        T::try_from(wide).map_err(|_| ConversionError::out_of_range(wide, target))
    }

    fn to_value(&self, obj: &T, _owner: &Owner) -> Value {
        let wide: u64 = (*obj).try_into().unwrap_or(u64::MAX);
        match i64::try_from(wide) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Float(Decimal::from(wide)),
        }
    }

    fn shape(&self) -> Shape {
        Shape::Numeric
    }
}

/// `f32` / `f64`, encoded as `Float`. Non-finite values have no encoding and
/// are written as `Null`.
pub struct FloatConverter<T>(PhantomData<fn() -> T>);

impl<T> FloatConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for FloatConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValueConverter for FloatConverter<T>
where
    T: FloatWidth,
{
    type Target = T;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<T, ConversionError> {
        let d = float_value(value).ok_or_else(|| ConversionError::unexpected("Float", value))?;
        T::from_decimal(d).ok_or_else(|| ConversionError::out_of_range(d, std::any::type_name::<T>()))
    }

    fn to_value(&self, obj: &T, _owner: &Owner) -> Value {
        match obj.to_decimal() {
            Some(d) => Value::Float(d),
            None => {
                tracing::warn!(value = ?obj, "Float has no decimal representation, writing null");
                Value::Null
            }
        }
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Float)
    }
}

/// Binary floating point widths that round-trip through `Decimal`.
pub trait FloatWidth: Copy + std::fmt::Debug + Send + Sync + 'static {
    fn from_decimal(d: Decimal) -> Option<Self>;
    fn to_decimal(self) -> Option<Decimal>;
}

impl FloatWidth for f32 {
    fn from_decimal(d: Decimal) -> Option<Self> {
        d.to_f32()
    }

    fn to_decimal(self) -> Option<Decimal> {
        Decimal::from_f32(self)
    }
}

impl FloatWidth for f64 {
    fn from_decimal(d: Decimal) -> Option<Self> {
        d.to_f64()
    }

    fn to_decimal(self) -> Option<Decimal> {
        Decimal::from_f64(self)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DecimalConverter;

impl ValueConverter for DecimalConverter {
    type Target = Decimal;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<Decimal, ConversionError> {
        float_value(value).ok_or_else(|| ConversionError::unexpected("Float", value))
    }

    fn to_value(&self, obj: &Decimal, _owner: &Owner) -> Value {
        Value::Float(*obj)
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Float)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BoolConverter;

impl ValueConverter for BoolConverter {
    type Target = bool;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<bool, ConversionError> {
        value
            .as_bool()
            .ok_or_else(|| ConversionError::unexpected("Boolean", value))
    }

    fn to_value(&self, obj: &bool, _owner: &Owner) -> Value {
        Value::Boolean(*obj)
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Boolean)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StringConverter;

impl ValueConverter for StringConverter {
    type Target = String;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<String, ConversionError> {
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| ConversionError::unexpected("Text", value))
    }

    fn to_value(&self, obj: &String, _owner: &Owner) -> Value {
        Value::Text(obj.clone())
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Text)
    }
}

/// A `char` is a one-character `Text`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharConverter;

impl ValueConverter for CharConverter {
    type Target = char;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<char, ConversionError> {
        let text = value
            .as_text()
            .ok_or_else(|| ConversionError::unexpected("Text", value))?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(ConversionError::InvalidText {
                target: "char",
                text: text.to_string(),
                reason: "expected exactly one character".to_string(),
            }),
        }
    }

    fn to_value(&self, obj: &char, _owner: &Owner) -> Value {
        Value::Text(obj.to_string())
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Text)
    }
}

macro_rules! convertible {
    ($($ty:ty => $conv:expr),* $(,)?) => {$(
        impl Convertible for $ty {
            fn default_converter() -> ConverterRef<Self> {
                Arc::new($conv)
            }
        }
    )*};
}

convertible! {
    i8 => IntegerConverter::<i8>::new(),
    i16 => IntegerConverter::<i16>::new(),
    i32 => IntegerConverter::<i32>::new(),
    i64 => IntegerConverter::<i64>::new(),
    u8 => IntegerConverter::<u8>::new(),
    u16 => IntegerConverter::<u16>::new(),
    u32 => IntegerConverter::<u32>::new(),
    u64 => UnsignedConverter::<u64>::new(),
    usize => UnsignedConverter::<usize>::new(),
    f32 => FloatConverter::<f32>::new(),
    f64 => FloatConverter::<f64>::new(),
    Decimal => DecimalConverter,
    bool => BoolConverter,
    String => StringConverter,
    char => CharConverter,
}

/// `isize` has no `Into<i64>`, so it goes through its own converter.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsizeConverter;

impl ValueConverter for IsizeConverter {
    type Target = isize;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<isize, ConversionError> {
        let i = int_value(value).ok_or_else(|| ConversionError::unexpected("Integer", value))?;
        isize::try_from(i).map_err(|_| ConversionError::out_of_range(i, "isize"))
    }

    fn to_value(&self, obj: &isize, _owner: &Owner) -> Value {
        i64::try_from(*obj)
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Float(Decimal::from(*obj)))
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Integer)
    }
}

convertible! {
    isize => IsizeConverter,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaCache;

    fn owner() -> Owner {
        Owner::detached(Arc::new(SchemaCache::default()))
    }

    #[test]
    fn test_integer_accepts_integral_float() {
        let conv = i32::default_converter();
        assert_eq!(conv.from_value(&Value::Float(Decimal::new(50, 1)), &owner()), Ok(5));
        assert!(conv.from_value(&Value::Float(Decimal::new(55, 1)), &owner()).is_err());
        assert_eq!(conv.to_value(&-7, &owner()), Value::Integer(-7));
    }

    #[test]
    fn test_narrow_integer_range() {
        let conv = u8::default_converter();
        assert_eq!(conv.from_value(&Value::Integer(255), &owner()), Ok(255));
        assert!(matches!(
            conv.from_value(&Value::Integer(256), &owner()),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(conv.from_value(&Value::Integer(-1), &owner()).is_err());
    }

    #[test]
    fn test_wide_unsigned_overflows_to_float() {
        let conv = u64::default_converter();
        let big = u64::MAX;
        let encoded = conv.to_value(&big, &owner());
        assert_eq!(encoded, Value::Float(Decimal::from(big)));
        assert_eq!(conv.from_value(&encoded, &owner()), Ok(big));
        assert_eq!(conv.to_value(&42, &owner()), Value::Integer(42));
    }

    #[test]
    fn test_float_widens_integer() {
        let conv = f64::default_converter();
        assert_eq!(conv.from_value(&Value::Integer(5), &owner()), Ok(5.0));
        assert_eq!(conv.to_value(&0.25, &owner()), Value::Float(Decimal::new(25, 2)));
        assert_eq!(conv.to_value(&f64::NAN, &owner()), Value::Null);
    }

    #[test]
    fn test_char_requires_single_character() {
        let conv = char::default_converter();
        assert_eq!(conv.from_value(&Value::text("x"), &owner()), Ok('x'));
        assert!(conv.from_value(&Value::text("xy"), &owner()).is_err());
        assert!(conv.from_value(&Value::text(""), &owner()).is_err());
        assert_eq!(conv.to_value(&'q', &owner()), Value::text("q"));
    }

    #[test]
    fn test_text_and_bool_reject_other_kinds() {
        assert!(String::default_converter()
            .from_value(&Value::Integer(1), &owner())
            .is_err());
        assert!(bool::default_converter()
            .from_value(&Value::text("true"), &owner())
            .is_err());
    }
}
