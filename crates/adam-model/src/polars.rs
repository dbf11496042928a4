//! Polars cell conversion helpers.
//!
//! Derivations read cells out of polars frames into [`Value`]s and build
//! output columns back from plain vectors.

use polars::prelude::*;

use crate::value::{ColumnType, Value, parse_iso_date};

/// Converts a Polars `AnyValue` to a `String` representation.
///
/// Returns an empty string for `Null` and formats floats without trailing zeros.
///
/// # Examples
///
/// ```
/// use polars::prelude::AnyValue;
/// use adam_model::polars::any_to_string;
///
/// assert_eq!(any_to_string(AnyValue::Null), "");
/// assert_eq!(any_to_string(AnyValue::Float64(50.0)), "50");
/// assert_eq!(any_to_string(AnyValue::String("ADSL")), "ADSL");
/// ```
pub fn any_to_string(value: AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::Int8(v) => v.to_string(),
        AnyValue::Int16(v) => v.to_string(),
        AnyValue::Int32(v) => v.to_string(),
        AnyValue::Int64(v) => v.to_string(),
        AnyValue::UInt8(v) => v.to_string(),
        AnyValue::UInt16(v) => v.to_string(),
        AnyValue::UInt32(v) => v.to_string(),
        AnyValue::UInt64(v) => v.to_string(),
        AnyValue::Float32(v) => format_numeric(f64::from(v)),
        AnyValue::Float64(v) => format_numeric(v),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Boolean(b) => if b { "Y" } else { "N" }.to_string(),
        other => other.to_string(),
    }
}

/// Converts `AnyValue` to `String`, returning `None` for null or blank cells.
pub fn any_to_string_non_empty(value: AnyValue<'_>) -> Option<String> {
    let s = any_to_string(value);
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Formats a floating-point number without trailing zeros.
///
/// ```
/// use adam_model::polars::format_numeric;
///
/// assert_eq!(format_numeric(8400.0), "8400");
/// assert_eq!(format_numeric(2.30), "2.3");
/// ```
pub fn format_numeric(v: f64) -> String {
    let s = format!("{v}");
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Converts an `AnyValue` to `f64`, returning `None` for non-numeric or null values.
pub fn any_to_f64(value: AnyValue<'_>) -> Option<f64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(f64::from(v)),
        AnyValue::Int16(v) => Some(f64::from(v)),
        AnyValue::Int32(v) => Some(f64::from(v)),
        AnyValue::Int64(v) => Some(v as f64),
        AnyValue::UInt8(v) => Some(f64::from(v)),
        AnyValue::UInt16(v) => Some(f64::from(v)),
        AnyValue::UInt32(v) => Some(f64::from(v)),
        AnyValue::UInt64(v) => Some(v as f64),
        AnyValue::Float32(v) => Some(f64::from(v)),
        AnyValue::Float64(v) => Some(v),
        AnyValue::String(s) => parse_f64(s),
        AnyValue::StringOwned(s) => parse_f64(&s),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Parses a string as `f64`, returning `None` for invalid or empty strings.
pub fn parse_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Reads one cell as a typed [`Value`].
///
/// Unparseable numbers and dates come back as missing; load-time schema
/// validation is responsible for rejecting them earlier.
pub fn cell_value(column: &Column, idx: usize, column_type: ColumnType) -> Value {
    let any = column.get(idx).unwrap_or(AnyValue::Null);
    match column_type {
        ColumnType::Num => Value::opt_num(any_to_f64(any)),
        ColumnType::Char => Value::opt_text(any_to_string_non_empty(any).as_deref()),
        ColumnType::Date => {
            Value::opt_date(any_to_string_non_empty(any).and_then(|s| parse_iso_date(&s)))
        }
        ColumnType::DateTime => {
            let text = Value::opt_text(any_to_string_non_empty(any).as_deref());
            Value::opt_datetime(text.as_datetime())
        }
    }
}

/// Builds a string column from optional values.
pub fn text_column(name: &str, values: Vec<Option<String>>) -> Column {
    Series::new(name.into(), values).into_column()
}

/// Builds a Float64 column from optional values.
pub fn num_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Series::new(name.into(), values).into_column()
}

/// Builds a column of `column_type` from row values.
pub fn values_column(name: &str, column_type: ColumnType, values: &[Value]) -> Column {
    match column_type {
        ColumnType::Num => num_column(name, values.iter().map(Value::as_f64).collect()),
        _ => text_column(name, values.iter().map(Value::render).collect()),
    }
}
