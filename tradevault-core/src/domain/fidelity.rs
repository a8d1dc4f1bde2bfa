//! Data fidelity: the resolution a job is downloaded at.
//!
//! A fidelity is written by humans in the targets file (`"1 minute"`,
//! `"5 minutes"`, `"day"`, `"tick"`) and appears on disk with spaces replaced
//! by hyphens (`1-minute`). The label is kept as written so that the
//! folder name round-trips exactly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Aggregate bar timespan accepted by the market-data aggregates endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timespan {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Timespan {
    /// Path segment used by the aggregates endpoint.
    pub fn as_api_str(self) -> &'static str {
        match self {
            Timespan::Second => "second",
            Timespan::Minute => "minute",
            Timespan::Hour => "hour",
            Timespan::Day => "day",
            Timespan::Week => "week",
            Timespan::Month => "month",
            Timespan::Quarter => "quarter",
            Timespan::Year => "year",
        }
    }

    fn from_unit(unit: &str) -> Option<Self> {
        let unit = unit.to_ascii_lowercase();
        let singular = unit.strip_suffix('s').unwrap_or(&unit);
        match singular {
            "second" => Some(Timespan::Second),
            "minute" => Some(Timespan::Minute),
            "hour" => Some(Timespan::Hour),
            "day" => Some(Timespan::Day),
            "week" => Some(Timespan::Week),
            "month" => Some(Timespan::Month),
            "quarter" => Some(Timespan::Quarter),
            "year" => Some(Timespan::Year),
            _ => None,
        }
    }
}

/// What a fidelity resolves to when talking to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resolution {
    /// Raw trades.
    Tick,
    /// Aggregate bars of `multiplier` x `timespan`.
    Aggregate { multiplier: u32, timespan: Timespan },
}

/// On-disk partition format. Daily bars are CSV, everything else is Parquet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    Csv,
    Parquet,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "csv" => Some(FileFormat::Csv),
            "parquet" => Some(FileFormat::Parquet),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FidelityError {
    #[error("empty fidelity")]
    Empty,

    #[error("unrecognised fidelity '{0}' (expected 'tick', '<unit>' or '<N> <unit>')")]
    Unrecognised(String),

    #[error("fidelity multiplier must be a positive integer in '{0}'")]
    BadMultiplier(String),
}

/// A parsed fidelity label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fidelity {
    label: String,
    resolution: Resolution,
}

impl Fidelity {
    /// Parse a human label such as `"1 minute"`, `"5 minutes"`, `"day"` or `"tick"`.
    pub fn parse(label: &str) -> Result<Self, FidelityError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(FidelityError::Empty);
        }

        let tokens: Vec<&str> = label.split_whitespace().collect();
        let resolution = match tokens.as_slice() {
            [word] if word.eq_ignore_ascii_case("tick") => Resolution::Tick,
            [unit] => Resolution::Aggregate {
                multiplier: 1,
                timespan: Timespan::from_unit(unit)
                    .ok_or_else(|| FidelityError::Unrecognised(label.to_string()))?,
            },
            [count, unit] => {
                let multiplier: u32 = count
                    .parse()
                    .ok()
                    .filter(|m| *m > 0)
                    .ok_or_else(|| FidelityError::BadMultiplier(label.to_string()))?;
                let timespan = Timespan::from_unit(unit)
                    .ok_or_else(|| FidelityError::Unrecognised(label.to_string()))?;
                Resolution::Aggregate {
                    multiplier,
                    timespan,
                }
            }
            _ => return Err(FidelityError::Unrecognised(label.to_string())),
        };

        Ok(Self {
            label: label.to_string(),
            resolution,
        })
    }

    /// Invert [`Fidelity::folder_name`]: hyphens become spaces again.
    pub fn from_folder_name(folder: &str) -> Result<Self, FidelityError> {
        Self::parse(&folder.replace('-', " "))
    }

    /// The label as written in the targets file.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Directory and filename form: spaces replaced by hyphens.
    pub fn folder_name(&self) -> String {
        self.label.replace(' ', "-")
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_tick(&self) -> bool {
        self.resolution == Resolution::Tick
    }

    /// Daily bars (any multiplier) are stored as CSV; everything else as Parquet.
    pub fn file_format(&self) -> FileFormat {
        match self.resolution {
            Resolution::Aggregate {
                timespan: Timespan::Day,
                ..
            } => FileFormat::Csv,
            _ => FileFormat::Parquet,
        }
    }
}

impl fmt::Display for Fidelity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl FromStr for Fidelity {
    type Err = FidelityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fidelity {
    type Error = FidelityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fidelity> for String {
    fn from(value: Fidelity) -> Self {
        value.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tick() {
        let f = Fidelity::parse("tick").unwrap();
        assert!(f.is_tick());
        assert_eq!(f.file_format(), FileFormat::Parquet);
        assert_eq!(f.folder_name(), "tick");
    }

    #[test]
    fn parses_multiplier_and_plural_unit() {
        let f = Fidelity::parse("5 minutes").unwrap();
        assert_eq!(
            f.resolution(),
            Resolution::Aggregate {
                multiplier: 5,
                timespan: Timespan::Minute
            }
        );
        assert_eq!(f.folder_name(), "5-minutes");
        assert_eq!(f.label(), "5 minutes");
    }

    #[test]
    fn bare_unit_means_multiplier_one() {
        let f = Fidelity::parse("day").unwrap();
        assert_eq!(
            f.resolution(),
            Resolution::Aggregate {
                multiplier: 1,
                timespan: Timespan::Day
            }
        );
        assert_eq!(f.file_format(), FileFormat::Csv);
    }

    #[test]
    fn multi_day_is_still_csv() {
        assert_eq!(Fidelity::parse("2 days").unwrap().file_format(), FileFormat::Csv);
        assert_eq!(Fidelity::parse("1 hour").unwrap().file_format(), FileFormat::Parquet);
    }

    #[test]
    fn folder_name_round_trips() {
        for label in ["1 minute", "15 minutes", "tick", "day", "1 week"] {
            let f = Fidelity::parse(label).unwrap();
            let back = Fidelity::from_folder_name(&f.folder_name()).unwrap();
            assert_eq!(back, f);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Fidelity::parse("   "), Err(FidelityError::Empty));
        assert!(matches!(
            Fidelity::parse("0 minute"),
            Err(FidelityError::BadMultiplier(_))
        ));
        assert!(matches!(
            Fidelity::parse("1 fortnight"),
            Err(FidelityError::Unrecognised(_))
        ));
        assert!(matches!(
            Fidelity::parse("1 2 minute"),
            Err(FidelityError::Unrecognised(_))
        ));
    }

    #[test]
    fn serde_uses_label() {
        let f = Fidelity::parse("1 minute").unwrap();
        let json = serde_json::to_string(&f).unwrap();
        assert_eq!(json, "\"1 minute\"");
        let back: Fidelity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
    }
}
