//! Type-erased converters and the named converter registry.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;

use super::{ConversionError, Owner, Shape, ValueConverter};
use crate::value::Value;

/// A converter whose target type is only known at runtime.
pub trait ErasedConverter: Send + Sync {
    fn target_type(&self) -> TypeId;

    fn target_name(&self) -> &'static str;

    fn from_value_erased(
        &self,
        value: &Value,
        owner: &Owner,
    ) -> Result<Box<dyn Any + Send>, ConversionError>;

    /// `None` when `obj` is not of the target type.
    fn to_value_erased(&self, obj: &dyn Any, owner: &Owner) -> Option<Value>;

    fn shape(&self) -> Shape;
}

impl<C> ErasedConverter for C
where
    C: ValueConverter,
    C::Target: Send + 'static,
{
    fn target_type(&self) -> TypeId {
        TypeId::of::<C::Target>()
    }

    fn target_name(&self) -> &'static str {
        std::any::type_name::<C::Target>()
    }

    fn from_value_erased(
        &self,
        value: &Value,
        owner: &Owner,
    ) -> Result<Box<dyn Any + Send>, ConversionError> {
        let obj = self.from_value(value, owner)?;
        Ok(Box::new(obj))
    }

    fn to_value_erased(&self, obj: &dyn Any, owner: &Owner) -> Option<Value> {
        obj.downcast_ref::<C::Target>()
            .map(|obj| self.to_value(obj, owner))
    }

    fn shape(&self) -> Shape {
        ValueConverter::shape(self)
    }
}

/// Restores the static target type of an erased converter.
///
/// Only built after the target type was checked against `T`.
pub struct ErasedAdapter<T> {
    inner: Arc<dyn ErasedConverter>,
    _target: PhantomData<fn() -> T>,
}

impl<T: 'static> ErasedAdapter<T> {
    pub fn new(inner: Arc<dyn ErasedConverter>) -> Option<Self> {
        (inner.target_type() == TypeId::of::<T>()).then(|| Self {
            inner,
            _target: PhantomData,
        })
    }
}

impl<T: Send + 'static> ValueConverter for ErasedAdapter<T> {
    type Target = T;

    fn from_value(&self, value: &Value, owner: &Owner) -> Result<T, ConversionError> {
        self.inner
            .from_value_erased(value, owner)?
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                ConversionError::Custom(format!(
                    "converter for {} produced another type",
                    self.inner.target_name()
                ))
            })
    }

    fn to_value(&self, obj: &T, owner: &Owner) -> Value {
        self.inner.to_value_erased(obj, owner).unwrap_or(Value::Null)
    }

    fn shape(&self) -> Shape {
        self.inner.shape()
    }
}

/// Converters registered under a name, requested from schemas by that name.
#[derive(Default)]
pub struct ConverterRegistry {
    named: DashMap<String, Arc<dyn ErasedConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `converter` under `name`, replacing any previous entry.
    pub fn register<C>(&self, name: impl Into<String>, converter: C)
    where
        C: ValueConverter,
        C::Target: Send + 'static,
    {
        let name = name.into();
        let converter: Arc<dyn ErasedConverter> = Arc::new(converter);
        if let Some(previous) = self.named.insert(name.clone(), converter) {
            tracing::warn!(
                converter = %name,
                previous_target = previous.target_name(),
                "Named converter replaced"
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ErasedConverter>> {
        self.named.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{NumericEnumConverter, StringConverter};
    use crate::schema::SchemaCache;

    crate::config_enum! {
        enum Level {
            Low = 1,
            High = 2,
        }
    }

    fn owner() -> Owner {
        Owner::detached(Arc::new(SchemaCache::default()))
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ConverterRegistry::new();
        registry.register("level-number", NumericEnumConverter::<Level>::new());

        let conv = registry.get("level-number").unwrap();
        assert_eq!(conv.target_type(), TypeId::of::<Level>());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_adapter_checks_target_type() {
        let erased: Arc<dyn ErasedConverter> = Arc::new(NumericEnumConverter::<Level>::new());
        assert!(ErasedAdapter::<String>::new(Arc::clone(&erased)).is_none());

        let adapter = ErasedAdapter::<Level>::new(erased).unwrap();
        assert_eq!(adapter.from_value(&Value::Integer(2), &owner()), Ok(Level::High));
        assert_eq!(adapter.to_value(&Level::Low, &owner()), Value::Integer(1));
    }

    #[test]
    fn test_erased_round_trip() {
        let erased: Arc<dyn ErasedConverter> = Arc::new(StringConverter);
        let boxed = erased.from_value_erased(&Value::text("hi"), &owner()).unwrap();
        let text = boxed.downcast::<String>().unwrap();
        assert_eq!(*text, "hi");
        assert_eq!(erased.to_value_erased(&42_i32, &owner()), None);
    }
}
