//! Date/time and time span converters.
//!
//! Timestamps are RFC 3339 text. Durations use the `[d.]hh:mm:ss[.fffffff]`
//! text form, with the fraction in 100ns ticks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use super::{ConversionError, ConverterRef, Convertible, Owner, Shape, ValueConverter};
use crate::value::{Value, ValueKind};

const SECS_PER_DAY: u64 = 86_400;
const NANOS_PER_TICK: u32 = 100;

fn text_of<'v>(value: &'v Value) -> Result<&'v str, ConversionError> {
    value
        .as_text()
        .ok_or_else(|| ConversionError::unexpected("Text", value))
}

fn invalid(target: &'static str, text: &str, reason: impl ToString) -> ConversionError {
    ConversionError::InvalidText {
        target,
        text: text.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UtcDateTimeConverter;

impl ValueConverter for UtcDateTimeConverter {
    type Target = DateTime<Utc>;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<DateTime<Utc>, ConversionError> {
        let text = text_of(value)?;
        DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| invalid("DateTime<Utc>", text, e))
    }

    fn to_value(&self, obj: &DateTime<Utc>, _owner: &Owner) -> Value {
        Value::Text(obj.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Text)
    }
}

/// Keeps the offset that was read, so a round trip does not move the timestamp
/// into another zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct OffsetDateTimeConverter;

impl ValueConverter for OffsetDateTimeConverter {
    type Target = DateTime<FixedOffset>;

    fn from_value(
        &self,
        value: &Value,
        _owner: &Owner,
    ) -> Result<DateTime<FixedOffset>, ConversionError> {
        let text = text_of(value)?;
        DateTime::parse_from_rfc3339(text).map_err(|e| invalid("DateTime<FixedOffset>", text, e))
    }

    fn to_value(&self, obj: &DateTime<FixedOffset>, _owner: &Owner) -> Value {
        Value::Text(obj.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Text)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DurationConverter;

impl DurationConverter {
    pub fn format(d: &Duration) -> String {
        let total = d.as_secs();
        let days = total / SECS_PER_DAY;
        let hours = (total % SECS_PER_DAY) / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        let ticks = d.subsec_nanos() / NANOS_PER_TICK;

        let mut out = String::new();
        if days > 0 {
            out.push_str(&format!("{days}."));
        }
        out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
        if ticks > 0 {
            out.push_str(&format!(".{ticks:07}"));
        }
        out
    }

    pub fn parse(text: &str) -> Result<Duration, ConversionError> {
        let bad = |reason: &str| invalid("Duration", text, reason);

        let first_colon = text.find(':').ok_or_else(|| bad("missing ':' separator"))?;
        let (days, clock) = match text[..first_colon].find('.') {
            Some(dot) => {
                let days: u64 = text[..dot].parse().map_err(|_| bad("invalid day count"))?;
                (days, &text[dot + 1..])
            }
            None => (0, text),
        };

        let mut parts = clock.splitn(3, ':');
        let hours = parse_field(parts.next(), 23).ok_or_else(|| bad("invalid hours"))?;
        let minutes = parse_field(parts.next(), 59).ok_or_else(|| bad("invalid minutes"))?;
        let rest = parts.next().ok_or_else(|| bad("missing seconds"))?;

        let (secs_text, fraction) = match rest.split_once('.') {
            Some((s, f)) => (s, Some(f)),
            None => (rest, None),
        };
        let seconds = parse_field(Some(secs_text), 59).ok_or_else(|| bad("invalid seconds"))?;
        let nanos = match fraction {
            Some(f) => parse_fraction(f).ok_or_else(|| bad("invalid fraction"))?,
            None => 0,
        };

        let total = days
            .checked_mul(SECS_PER_DAY)
            .and_then(|s| s.checked_add(hours * 3600 + minutes * 60 + seconds))
            .ok_or_else(|| bad("out of range"))?;
        Ok(Duration::new(total, nanos))
    }
}

fn parse_field(part: Option<&str>, max: u64) -> Option<u64> {
    let part = part?;
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok().filter(|v| *v <= max)
}

/// Up to nine fractional digits, right-padded to nanoseconds.
fn parse_fraction(fraction: &str) -> Option<u32> {
    if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{fraction:0<9}");
    padded.parse().ok()
}

impl ValueConverter for DurationConverter {
    type Target = Duration;

    fn from_value(&self, value: &Value, _owner: &Owner) -> Result<Duration, ConversionError> {
        Self::parse(text_of(value)?)
    }

    fn to_value(&self, obj: &Duration, _owner: &Owner) -> Value {
        Value::Text(Self::format(obj))
    }

    fn shape(&self) -> Shape {
        Shape::Kind(ValueKind::Text)
    }
}

impl Convertible for DateTime<Utc> {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(UtcDateTimeConverter)
    }
}

impl Convertible for DateTime<FixedOffset> {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(OffsetDateTimeConverter)
    }
}

impl Convertible for Duration {
    fn default_converter() -> ConverterRef<Self> {
        Arc::new(DurationConverter)
    }
}
