use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{ConversionError, ConverterRef, Convertible, Owner, Shape, ValueConverter};
use crate::value::{Map, Value, ValueKind};

/// `Option<T>`: `Null` is `None`, anything else goes through the inner converter.
pub struct OptionConverter<T> {
    inner: ConverterRef<T>,
}

impl<T: Convertible> Default for OptionConverter<T> {
    fn default() -> Self {
        Self::new(T::default_converter())
    }
}

impl<T> OptionConverter<T> {
    pub fn new(inner: ConverterRef<T>) -> Self {
        Self { inner }
    }
}

impl<T: Send + Sync + 'static> ValueConverter for OptionConverter<T> {
    type Target = Option<T>;

    fn from_value(&self, value: &Value, owner: &Owner) -> Result<Option<T>, ConversionError> {
        if value.is_null() {
            return Ok(None);
        }
        self.inner.from_value(value, owner).map(Some)
    }

    fn to_value(&self, obj: &Option<T>, owner: &Owner) -> Value {
        match obj {
            Some(inner) => self.inner.to_value(inner, owner),
            None => Value::Null,
        }
    }

    fn shape(&self) -> Shape {
        self.inner.shape()
    }

    fn merge_into(
        &self,
        target: &mut Option<T>,
        value: &Value,
        owner: &Owner,
    ) -> Result<(), ConversionError> {
        match (target.as_mut(), value.is_null()) {
            (_, true) => *target = None,
            (Some(existing), false) => self.inner.merge_into(existing, value, owner)?,
            (None, false) => *target = Some(self.inner.from_value(value, owner)?),
        }
        Ok(())
    }
}

/// Any sequence or set collected from a `List`.
pub struct CollectionConverter<C, T> {
    inner: ConverterRef<T>,
    _collection: PhantomData<fn() -> C>,
}

impl<C, T: Convertible> Default for CollectionConverter<C, T> {
    fn default() -> Self {
        Self::new(T::default_converter())
    }
}

impl<C, T> CollectionConverter<C, T> {
    pub fn new(inner: ConverterRef<T>) -> Self {
        Self {
            inner,
            _collection: PhantomData,
        }
    }
}

impl<C, T> ValueConverter for CollectionConverter<C, T>
where
    C: FromIterator<T> + 'static,
    for<'a> &'a C: IntoIterator<Item = &'a T>,
    T: 'static,
{
    type Target = C;

    fn from_value(&self, value: &Value, owner: &Owner) -> Result<C, ConversionError> {
        let items = value
            .as_list()
            .ok_or_else(|| ConversionError::unexpected("List", value))?;
        items
            .iter()
            .map(|item| self.inner.from_value(item, owner))
            .collect()
    }

    fn to_value(&self, obj: &C, owner: &Owner) -> Value {
        Value::List(obj.into_iter().map(|item| self.inner.to_value(item, owner)).collect())
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::List)
    }
}

/// String-keyed dictionaries. Keys are written in sorted order so the
/// encoding does not depend on hash iteration order.
pub struct DictionaryConverter<M, V> {
    inner: ConverterRef<V>,
    _map: PhantomData<fn() -> M>,
}

impl<M, V: Convertible> Default for DictionaryConverter<M, V> {
    fn default() -> Self {
        Self::new(V::default_converter())
    }
}

impl<M, V> DictionaryConverter<M, V> {
    pub fn new(inner: ConverterRef<V>) -> Self {
        Self {
            inner,
            _map: PhantomData,
        }
    }
}

impl<M, V> ValueConverter for DictionaryConverter<M, V>
where
    M: FromIterator<(String, V)> + 'static,
    for<'a> &'a M: IntoIterator<Item = (&'a String, &'a V)>,
    V: 'static,
{
    type Target = M;

    fn from_value(&self, value: &Value, owner: &Owner) -> Result<M, ConversionError> {
        let map = value
            .as_map()
            .ok_or_else(|| ConversionError::unexpected("Map", value))?;
        map.iter()
            .map(|(k, v)| self.inner.from_value(v, owner).map(|v| (k.to_string(), v)))
            .collect()
    }

    fn to_value(&self, obj: &M, owner: &Owner) -> Value {
        let mut entries: Vec<(&String, &V)> = obj.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut map = Map::with_capacity(entries.len());
        for (k, v) in entries {
            map.insert(k.clone(), self.inner.to_value(v, owner));
        }
        Value::Map(map)
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Map)
    }
}

impl<T: Convertible> Convertible for Option<T> {
    const NULLABLE: bool = true;
    const NESTED: bool = T::NESTED;

    fn default_converter() -> ConverterRef<Self> {
        Arc::new(OptionConverter::<T>::default())
    }

    fn attach(&mut self, owner: &Owner) {
        if let Some(inner) = self {
            inner.attach(owner);
        }
    }
}

impl<T: Convertible> Convertible for Vec<T> {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(CollectionConverter::<Vec<T>, T>::default())
    }

    fn attach(&mut self, owner: &Owner) {
        self.iter_mut().for_each(|item| item.attach(owner));
    }
}

impl<T: Convertible> Convertible for VecDeque<T> {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(CollectionConverter::<VecDeque<T>, T>::default())
    }

    fn attach(&mut self, owner: &Owner) {
        self.iter_mut().for_each(|item| item.attach(owner));
    }
}

impl<T: Convertible> Convertible for LinkedList<T> {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(CollectionConverter::<LinkedList<T>, T>::default())
    }

    fn attach(&mut self, owner: &Owner) {
        self.iter_mut().for_each(|item| item.attach(owner));
    }
}

impl<T: Convertible + Eq + Hash> Convertible for HashSet<T> {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(CollectionConverter::<HashSet<T>, T>::default())
    }
}

impl<T: Convertible + Ord> Convertible for BTreeSet<T> {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(CollectionConverter::<BTreeSet<T>, T>::default())
    }
}

impl<V: Convertible> Convertible for HashMap<String, V> {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(DictionaryConverter::<HashMap<String, V>, V>::default())
    }

    fn attach(&mut self, owner: &Owner) {
        self.values_mut().for_each(|v| v.attach(owner));
    }
}

impl<V: Convertible> Convertible for BTreeMap<String, V> {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(DictionaryConverter::<BTreeMap<String, V>, V>::default())
    }

    fn attach(&mut self, owner: &Owner) {
        self.values_mut().for_each(|v| v.attach(owner));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaCache;

    fn owner() -> Owner {
        Owner::detached(Arc::new(SchemaCache::default()))
    }

    #[test]
    fn test_option_maps_null() {
        let conv = Option::<i32>::default_converter();
        assert_eq!(conv.from_value(&Value::Null, &owner()), Ok(None));
        assert_eq!(conv.from_value(&Value::Integer(3), &owner()), Ok(Some(3)));
        assert_eq!(conv.to_value(&None, &owner()), Value::Null);
        assert_eq!(conv.shape(), Shape::Kind(ValueKind::Integer));
    }

    #[test]
    fn test_list_fails_on_bad_item() {
        let conv = Vec::<u8>::default_converter();
        let good = Value::list([1, 2, 3]);
        assert_eq!(conv.from_value(&good, &owner()), Ok(vec![1, 2, 3]));

        let bad = Value::List(vec![Value::Integer(1), Value::text("two")]);
        assert!(conv.from_value(&bad, &owner()).is_err());
    }

    #[test]
    fn test_set_and_deque() {
        let conv = BTreeSet::<String>::default_converter();
        let decoded = conv
            .from_value(&Value::list(["b", "a", "b"]), &owner())
            .unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(conv.to_value(&decoded, &owner()), Value::list(["a", "b"]));

        let conv = VecDeque::<bool>::default_converter();
        let decoded = conv.from_value(&Value::list([true, false]), &owner()).unwrap();
        assert_eq!(decoded.front(), Some(&true));
    }

    #[test]
    fn test_dictionary_writes_sorted_keys() {
        let conv = HashMap::<String, i64>::default_converter();
        let mut dict = HashMap::new();
        dict.insert("zeta".to_string(), 1);
        dict.insert("alpha".to_string(), 2);

        let encoded = conv.to_value(&dict, &owner());
        let keys: Vec<_> = encoded.as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
        assert_eq!(conv.from_value(&encoded, &owner()), Ok(dict));
    }
}
