//! Controlled terminology and category groupings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One term of a codelist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodelistTerm {
    /// Submitted code (numeric codes are stored as text, e.g. `"54"`).
    pub code: String,
    /// Decoded display value.
    pub decode: String,
    pub order: Option<u32>,
}

/// A closed mapping from codes to decoded values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Codelist {
    pub id: String,
    pub name: Option<String>,
    pub terms: Vec<CodelistTerm>,
}

impl Codelist {
    /// Code whose decode equals `decode`.
    pub fn code_for(&self, decode: &str) -> Option<&str> {
        let decode = decode.trim();
        self.terms
            .iter()
            .find(|term| term.decode == decode)
            .or_else(|| {
                self.terms
                    .iter()
                    .find(|term| term.decode.eq_ignore_ascii_case(decode))
            })
            .map(|term| term.code.as_str())
    }

    /// Numeric code whose decode equals `decode`.
    pub fn numeric_code_for(&self, decode: &str) -> Option<f64> {
        self.code_for(decode)
            .and_then(|code| code.trim().parse::<f64>().ok())
    }

    /// Decode of `code`.
    pub fn decode_for(&self, code: &str) -> Option<&str> {
        let code = code.trim();
        self.terms
            .iter()
            .find(|term| term.code == code)
            .or_else(|| self.terms.iter().find(|term| term.code.eq_ignore_ascii_case(code)))
            .map(|term| term.decode.as_str())
    }

    /// Cut-point bands parsed from the decoded values, in term order.
    pub fn groupings(&self) -> Vec<Grouping> {
        let mut terms: Vec<&CodelistTerm> = self.terms.iter().collect();
        terms.sort_by_key(|term| term.order.unwrap_or(u32::MAX));
        terms
            .into_iter()
            .filter_map(|term| term.decode.parse::<Grouping>().ok())
            .collect()
    }

    /// Label of the first band containing `value`.
    pub fn group_for(&self, value: f64) -> Option<String> {
        self.groupings()
            .into_iter()
            .find(|grouping| grouping.contains(value))
            .map(|grouping| grouping.label)
    }
}

/// One end of a cut-point band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: f64,
    pub inclusive: bool,
}

/// A category band such as `<65`, `65-80`, `25-<30` or `>=30`.
///
/// `a-b` is inclusive at both ends; `a-<b` excludes the upper end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grouping {
    pub label: String,
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl Grouping {
    pub fn contains(&self, value: f64) -> bool {
        let above = match self.lower {
            Some(bound) if bound.inclusive => value >= bound.value,
            Some(bound) => value > bound.value,
            None => true,
        };
        let below = match self.upper {
            Some(bound) if bound.inclusive => value <= bound.value,
            Some(bound) => value < bound.value,
            None => true,
        };
        above && below
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl FromStr for Grouping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_string();
        let compact: String = label.chars().filter(|ch| !ch.is_whitespace()).collect();
        let number = |text: &str| -> Result<f64, String> {
            text.parse::<f64>()
                .map_err(|_| format!("invalid cut-point in '{label}'"))
        };
        let bound = |text: &str, inclusive: bool| -> Result<Option<Bound>, String> {
            Ok(Some(Bound {
                value: number(text)?,
                inclusive,
            }))
        };

        let (lower, upper) = if let Some(rest) = compact.strip_prefix("<=") {
            (None, bound(rest, true)?)
        } else if let Some(rest) = compact.strip_prefix('<') {
            (None, bound(rest, false)?)
        } else if let Some(rest) = compact.strip_prefix(">=") {
            (bound(rest, true)?, None)
        } else if let Some(rest) = compact.strip_prefix('>') {
            (bound(rest, false)?, None)
        } else {
            let Some((low, high)) = compact.split_once('-') else {
                return Err(format!("not a cut-point band: '{label}'"));
            };
            match high.strip_prefix('<') {
                Some(high) => (bound(low, true)?, bound(high, false)?),
                None => (bound(low, true)?, bound(high, true)?),
            }
        };
        Ok(Grouping {
            label,
            lower,
            upper,
        })
    }
}
