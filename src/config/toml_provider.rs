//! TOML backend.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::{FormatProvider, ProviderError};
use crate::value::{Map, Value};

/// Reads and writes TOML documents.
///
/// TOML has no null: `Null` map entries are left out when writing, which
/// reads back as a missing key. Datetimes are read as `Text`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlProvider;

impl TomlProvider {
    pub fn new() -> Self {
        Self
    }
}

impl FormatProvider for TomlProvider {
    fn extension(&self) -> &str {
        "toml"
    }

    fn decode(&self, text: &str) -> Result<Value, ProviderError> {
        let table: toml::Table = text
            .parse()
            .map_err(|e: toml::de::Error| ProviderError::Parse(e.to_string()))?;
        Ok(from_table(table))
    }

    fn encode(&self, value: &Value) -> Result<String, ProviderError> {
        let Value::Map(map) = value else {
            return Err(ProviderError::Encode(format!(
                "a TOML document must be a Map, found {}",
                value.kind()
            )));
        };
        let table = to_table(map)?;
        toml::to_string_pretty(&table).map_err(|e| ProviderError::Encode(e.to_string()))
    }
}

fn from_table(table: toml::Table) -> Value {
    let mut map = Map::with_capacity(table.len());
    for (key, value) in table {
        map.insert(key, from_toml(value));
    }
    Value::Map(map)
}

fn from_toml(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::Text(s),
        toml::Value::Integer(i) => Value::Integer(i),
        toml::Value::Float(f) => from_float(f),
        toml::Value::Boolean(b) => Value::Boolean(b),
        toml::Value::Datetime(dt) => Value::Text(dt.to_string()),
        toml::Value::Array(items) => Value::List(items.into_iter().map(from_toml).collect()),
        toml::Value::Table(table) => from_table(table),
    }
}

/// Non-finite floats and floats beyond the `Decimal` range read as `Null`.
fn from_float(f: f64) -> Value {
    match Decimal::from_f64(f) {
        Some(d) => Value::Float(d),
        None if f.abs() < 1.0 => Value::Float(Decimal::ZERO),
        None => {
            tracing::warn!(float = %f, "TOML float has no decimal form, reading as null");
            Value::Null
        }
    }
}

fn to_table(map: &Map) -> Result<toml::Table, ProviderError> {
    let mut table = toml::Table::new();
    for (key, value) in map.iter() {
        if value.is_null() {
            continue;
        }
        table.insert(key.to_string(), to_toml(value)?);
    }
    Ok(table)
}

fn to_toml(value: &Value) -> Result<toml::Value, ProviderError> {
    Ok(match value {
        Value::Null => {
            return Err(ProviderError::Encode(
                "TOML arrays cannot contain null".to_string(),
            ))
        }
        Value::Boolean(b) => toml::Value::Boolean(*b),
        Value::Integer(i) => toml::Value::Integer(*i),
        Value::Float(d) => toml::Value::Float(
            d.to_f64()
                .ok_or_else(|| ProviderError::Encode(format!("float {d} has no binary form")))?,
        ),
        Value::Text(s) => toml::Value::String(s.clone()),
        Value::List(items) => {
            toml::Value::Array(items.iter().map(to_toml).collect::<Result<_, _>>()?)
        }
        Value::Map(map) => toml::Value::Table(to_table(map)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_nested_table() {
        let provider = TomlProvider::new();
        let doc = Value::map([
            ("name", Value::text("demo")),
            ("count", Value::Integer(3)),
            ("ratio", Value::Float(Decimal::new(25, 2))),
            ("enabled", Value::Boolean(false)),
            ("tags", Value::list(["a", "b"])),
            ("inner", Value::map([("depth", Value::Integer(1))])),
        ]);

        let text = provider.encode(&doc).unwrap();
        assert_eq!(provider.decode(&text).unwrap(), doc);
    }

    #[test]
    fn test_null_entries_are_omitted() {
        let provider = TomlProvider::new();
        let doc = Value::map([("kept", Value::Integer(1)), ("dropped", Value::Null)]);

        let back = provider.decode(&provider.encode(&doc).unwrap()).unwrap();
        let map = back.as_map().unwrap();
        assert!(map.contains_key("kept"));
        assert!(!map.contains_key("dropped"));
    }

    #[test]
    fn test_non_map_root_rejected() {
        assert!(matches!(
            TomlProvider::new().encode(&Value::Integer(1)),
            Err(ProviderError::Encode(_))
        ));
    }

    #[test]
    fn test_non_finite_float_keeps_document() {
        let doc = TomlProvider::new()
            .decode("level = 3\nratio = nan\nlimit = -inf\n")
            .unwrap();
        let map = doc.as_map().unwrap();
        assert_eq!(map.get("level"), Some(&Value::Integer(3)));
        assert_eq!(map.get("ratio"), Some(&Value::Null));
        assert_eq!(map.get("limit"), Some(&Value::Null));
    }

    #[test]
    fn test_datetime_reads_as_text() {
        let doc = TomlProvider::new()
            .decode("at = 1979-05-27T07:32:00Z\n")
            .unwrap();
        assert_eq!(
            doc.as_map().unwrap().get("at"),
            Some(&Value::text("1979-05-27T07:32:00Z"))
        );
    }
}
