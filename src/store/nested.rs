//! Converters for nested config objects.

use std::marker::PhantomData;

use super::{attach_members, deserialize_members, serialize_members, Store};
use crate::convert::{ConversionError, Owner, Shape, ValueConverter};
use crate::schema::Configurable;
use crate::value::{Value, ValueKind};

/// Reference-type members: a child [`Store`] linked under the owner.
///
/// Decoding into an existing child updates it in place, so handles to the
/// child stay valid across reloads.
pub struct NestedConverter<U>(PhantomData<fn() -> U>);

impl<U> NestedConverter<U> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<U> Default for NestedConverter<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: Configurable> ValueConverter for NestedConverter<U> {
    type Target = Store<U>;

    fn from_value(&self, value: &Value, owner: &Owner) -> Result<Store<U>, ConversionError> {
        let child = Store::new(U::default());
        child.link_to(owner);
        self.merge_into(&mut child.clone(), value, owner)?;
        Ok(child)
    }

    fn to_value(&self, obj: &Store<U>, _owner: &Owner) -> Value {
        obj.serialize()
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Map)
    }

    fn merge_into(
        &self,
        target: &mut Store<U>,
        value: &Value,
        _owner: &Owner,
    ) -> Result<(), ConversionError> {
        target
            .deserialize(value)
            .map(|_| ())
            .map_err(|e| ConversionError::Nested(e.to_string()))
    }
}

/// Value-type members: an embedded Map without a lock of its own.
///
/// Implemented for a type with [`inline_config!`](crate::inline_config).
pub struct InlineConverter<U>(PhantomData<fn() -> U>);

impl<U> InlineConverter<U> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<U> Default for InlineConverter<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: Configurable> InlineConverter<U> {
    /// Links stores inside an inline value to the enclosing store.
    pub fn attach(obj: &mut U, owner: &Owner) {
        let schema = owner.schemas().get::<U>();
        attach_members(&schema, obj, owner);
    }
}

impl<U: Configurable> ValueConverter for InlineConverter<U> {
    type Target = U;

    fn from_value(&self, value: &Value, owner: &Owner) -> Result<U, ConversionError> {
        let mut obj = U::default();
        self.merge_into(&mut obj, value, owner)?;
        Ok(obj)
    }

    fn to_value(&self, obj: &U, owner: &Owner) -> Value {
        let schema = owner.schemas().get::<U>();
        serialize_members(&schema, obj, owner)
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Map)
    }

    fn merge_into(&self, target: &mut U, value: &Value, owner: &Owner) -> Result<(), ConversionError> {
        let schema = owner.schemas().get::<U>();
        deserialize_members(&schema, target, value, owner)
            .map(|_| ())
            .map_err(|e| ConversionError::Nested(e.to_string()))
    }
}

/// Makes plain [`Configurable`] structs usable as embedded members.
///
/// ```
/// use config_store::schema::{Configurable, SchemaBuilder};
///
/// #[derive(Default)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// impl Configurable for Point {
///     fn describe(s: &mut SchemaBuilder<Self>) {
///         s.field("x", |p| &p.x, |p| &mut p.x);
///         s.field("y", |p| &p.y, |p| &mut p.y);
///     }
/// }
///
/// config_store::inline_config!(Point);
/// ```
#[macro_export]
macro_rules! inline_config {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::convert::Convertible for $ty {
            const NESTED: bool = true;

            fn default_converter() -> $crate::convert::ConverterRef<Self> {
                ::std::sync::Arc::new($crate::store::InlineConverter::<$ty>::new())
            }

            fn attach(&mut self, owner: &$crate::convert::Owner) {
                $crate::store::InlineConverter::<$ty>::attach(self, owner);
            }
        }
    )+};
}
