//! JSON backend.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Number;

use super::{FormatProvider, ProviderError};
use crate::value::{Map, Value};

/// Reads and writes indented JSON.
///
/// Integral numbers become `Integer`, every other number becomes `Float`.
/// Floats are written with a fractional part so they read back as `Float`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProvider;

impl JsonProvider {
    pub fn new() -> Self {
        Self
    }
}

impl FormatProvider for JsonProvider {
    fn extension(&self) -> &str {
        "json"
    }

    fn decode(&self, text: &str) -> Result<Value, ProviderError> {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(from_json(json))
    }

    fn encode(&self, value: &Value) -> Result<String, ProviderError> {
        let json = to_json(value)?;
        serde_json::to_string_pretty(&json).map_err(|e| ProviderError::Encode(e.to_string()))
    }
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => from_number(&n),
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(object) => {
            let mut map = Map::with_capacity(object.len());
            for (key, value) in object {
                map.insert(key, from_json(value));
            }
            Value::Map(map)
        }
    }
}

/// Numbers outside the `Decimal` range never fail the document: magnitudes
/// below its precision read as zero, magnitudes above its range read as `Null`.
fn from_number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Integer(i);
    }
    let text = n.to_string();
    if let Ok(d) = Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)) {
        return Value::Float(d);
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() && f.abs() < 1.0 => {
            tracing::warn!(number = %text, "JSON number below decimal precision, reading as 0");
            Value::Float(Decimal::ZERO)
        }
        _ => {
            tracing::warn!(number = %text, "JSON number out of decimal range, reading as null");
            Value::Null
        }
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, ProviderError> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Float(d) => serde_json::Value::Number(float_number(d)?),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<Result<_, _>>()?)
        }
        Value::Map(map) => {
            let mut object = serde_json::Map::with_capacity(map.len());
            for (key, value) in map.iter() {
                object.insert(key.to_string(), to_json(value)?);
            }
            serde_json::Value::Object(object)
        }
    })
}

fn float_number(d: &Decimal) -> Result<Number, ProviderError> {
    let mut text = d.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    Number::from_str(&text).map_err(|e| ProviderError::Encode(format!("float {text}: {e}")))
}
