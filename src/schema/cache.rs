use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

use super::{Configurable, Schema};
use crate::convert::ConverterRegistry;

/// Schemas keyed by type, built on first use and kept for the process lifetime.
///
/// Owned by the composition root and shared by every store it creates.
pub struct SchemaCache {
    entries: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    converters: Arc<ConverterRegistry>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(Arc::new(ConverterRegistry::new()))
    }
}

impl SchemaCache {
    pub fn new(converters: Arc<ConverterRegistry>) -> Self {
        Self {
            entries: DashMap::new(),
            converters,
        }
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    /// The schema of `T`, built at most once.
    pub fn get<T: Configurable>(&self) -> Arc<Schema<T>> {
        let key = TypeId::of::<T>();
        let cached = self.entries.get(&key).map(|entry| Arc::clone(entry.value()));
        let erased = match cached {
            Some(erased) => erased,
            None => {
                let entry = self.entries.entry(key).or_insert_with(|| {
                    tracing::debug!(config_type = std::any::type_name::<T>(), "Building schema");
                    let schema: Arc<dyn Any + Send + Sync> =
                        Arc::new(Schema::<T>::build(&self.converters));
                    schema
                });
                Arc::clone(entry.value())
            }
        };

        match erased.downcast::<Schema<T>>() {
            Ok(schema) => schema,
            Err(_) => Arc::new(Schema::<T>::build(&self.converters)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    #[derive(Default)]
    struct Probe {
        value: i64,
    }

    impl Configurable for Probe {
        fn describe(s: &mut SchemaBuilder<Self>) {
            s.field("value", |c| &c.value, |c| &mut c.value);
        }
    }

    #[test]
    fn test_schema_built_once() {
        let cache = SchemaCache::default();
        let first = cache.get::<Probe>();
        let second = cache.get::<Probe>();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }
}
