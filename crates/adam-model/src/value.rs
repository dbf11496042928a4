//! Typed scalar values used by row-level derivations.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::polars::format_numeric;

/// A derived row keyed by variable name.
pub type Record = BTreeMap<String, Value>;

/// Storage type of a dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Char,
    Num,
    /// Calendar date, persisted as `YYYY-MM-DD`.
    Date,
    /// Date and time, persisted as `YYYY-MM-DDThh:mm:ss`.
    DateTime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Char => "text",
            ColumnType::Num => "float",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Num)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    /// Accepts the data type spellings found in define and metacore workbooks.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "char" | "character" | "string" => Ok(ColumnType::Char),
            "integer" | "float" | "num" | "numeric" | "double" => Ok(ColumnType::Num),
            "date" => Ok(ColumnType::Date),
            "datetime" => Ok(ColumnType::DateTime),
            other => Err(format!("unknown data type: {other}")),
        }
    }
}

/// A single cell value.
///
/// Blank text never exists as [`Value::Char`]; constructors map it to
/// [`Value::Missing`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Missing,
    Char(String),
    Num(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl Value {
    /// Text value, with blank input treated as missing.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Value::Missing
        } else if trimmed.len() == value.len() {
            Value::Char(value)
        } else {
            Value::Char(trimmed.to_string())
        }
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        value.map_or(Value::Missing, Value::text)
    }

    pub fn opt_num(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Value::Num(v),
            _ => Value::Missing,
        }
    }

    pub fn opt_date(value: Option<NaiveDate>) -> Self {
        value.map_or(Value::Missing, Value::Date)
    }

    pub fn opt_datetime(value: Option<NaiveDateTime>) -> Self {
        value.map_or(Value::Missing, Value::DateTime)
    }

    /// `"Y"` or `"N"`.
    pub fn yes_no(flag: bool) -> Self {
        Value::Char(if flag { "Y" } else { "N" }.to_string())
    }

    /// `"Y"` when set, missing otherwise.
    pub fn yes_or_missing(flag: bool) -> Self {
        if flag {
            Value::Char("Y".to_string())
        } else {
            Value::Missing
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Char(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_yes(&self) -> bool {
        self.as_str() == Some("Y")
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            Value::Char(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::Char(s) => parse_iso_date(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Char(s) => NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT).ok(),
            _ => None,
        }
    }

    /// Cell text as persisted; `None` for missing.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Missing => None,
            Value::Char(s) => Some(s.clone()),
            Value::Num(v) => Some(format_numeric(*v)),
            Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
        }
    }

    /// Sort order used for key sorting: missing values sort first, then
    /// numbers, dates, and text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Missing, Value::Missing) => Ordering::Equal,
            (Value::Missing, _) => Ordering::Less,
            (_, Value::Missing) => Ordering::Greater,
            (Value::Num(a), Value::Num(b)) => a.total_cmp(b),
            (Value::Char(a), Value::Char(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Missing => 0,
            Value::Num(_) => 1,
            Value::Date(_) => 2,
            Value::DateTime(_) => 3,
            Value::Char(_) => 4,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::opt_num(Some(value))
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Value::Missing, Value::text)
    }
}

impl From<Option<f64>> for Value {
    fn from(value: Option<f64>) -> Self {
        Value::opt_num(value)
    }
}

impl From<Option<NaiveDate>> for Value {
    fn from(value: Option<NaiveDate>) -> Self {
        Value::opt_date(value)
    }
}

/// Parses a complete `YYYY-MM-DD` date, ignoring any trailing time part.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let date_part = trimmed.split('T').next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}
