use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FillError;

/// Taxonomy identifier as used by NCBI and OTT dumps: digits, optionally
/// behind a short alphabetic prefix (e.g. `9606`, `ott770315`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxonId(String);

impl TaxonId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonId {
    type Err = FillError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
            && normalized.chars().any(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(FillError::InvalidTaxonId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Semantic primitive of an attribute; selects the `<type>_value` field the
/// canonical summary lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Integer,
    Double,
    Keyword,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Double)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Integer => write!(f, "integer"),
            ValueType::Double => write!(f, "double"),
            ValueType::Keyword => write!(f, "keyword"),
        }
    }
}

impl FromStr for ValueType {
    type Err = FillError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "integer" | "long" | "short" => Ok(ValueType::Integer),
            "double" | "float" | "1dp" | "2dp" => Ok(ValueType::Double),
            "keyword" => Ok(ValueType::Keyword),
            other => Err(FillError::InvalidValueType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStat {
    Count,
    Min,
    Max,
    Mean,
    Median,
    MedianHigh,
    MedianLow,
    Mode,
    List,
}

impl SummaryStat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStat::Count => "count",
            SummaryStat::Min => "min",
            SummaryStat::Max => "max",
            SummaryStat::Mean => "mean",
            SummaryStat::Median => "median",
            SummaryStat::MedianHigh => "median_high",
            SummaryStat::MedianLow => "median_low",
            SummaryStat::Mode => "mode",
            SummaryStat::List => "list",
        }
    }
}

impl fmt::Display for SummaryStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SummaryStat {
    type Err = FillError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "count" => Ok(SummaryStat::Count),
            "min" => Ok(SummaryStat::Min),
            "max" => Ok(SummaryStat::Max),
            "mean" => Ok(SummaryStat::Mean),
            "median" => Ok(SummaryStat::Median),
            "median_high" => Ok(SummaryStat::MedianHigh),
            "median_low" => Ok(SummaryStat::MedianLow),
            "mode" => Ok(SummaryStat::Mode),
            "list" => Ok(SummaryStat::List),
            other => Err(FillError::InvalidSummaryStat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ascending,
    Descending,
    Both,
}

impl Direction {
    pub fn runs_ascending(&self) -> bool {
        matches!(self, Direction::Ascending | Direction::Both)
    }

    pub fn runs_descending(&self) -> bool {
        matches!(self, Direction::Descending | Direction::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ascending => write!(f, "ascending"),
            Direction::Descending => write!(f, "descending"),
            Direction::Both => write!(f, "both"),
        }
    }
}
