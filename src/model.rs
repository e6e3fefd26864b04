//! The time-range descriptor produced by the analyzer.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Output formats a client may ask ClickHouse for, with their byte codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OutputFormat {
    #[default]
    Json = 0,
    Csv = 1,
    CsvWithNames = 2,
    TabSeparated = 3,
    TabSeparatedWithNames = 4,
    TabSeparatedWithNamesAndTypes = 5,
}

impl OutputFormat {
    /// Case-insensitive lookup, including the TSV aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let format = match name.to_ascii_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            "csvwithnames" => OutputFormat::CsvWithNames,
            "tabseparated" | "tsv" => OutputFormat::TabSeparated,
            "tabseparatedwithnames" | "tsvwithnames" => OutputFormat::TabSeparatedWithNames,
            "tabseparatedwithnamesandtypes" | "tsvwithnamesandtypes" => {
                OutputFormat::TabSeparatedWithNamesAndTypes
            }
            _ => return None,
        };
        Some(format)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Json => "JSON",
            OutputFormat::Csv => "CSV",
            OutputFormat::CsvWithNames => "CSVWithNames",
            OutputFormat::TabSeparated => "TabSeparated",
            OutputFormat::TabSeparatedWithNames => "TabSeparatedWithNames",
            OutputFormat::TabSeparatedWithNamesAndTypes => "TabSeparatedWithNamesAndTypes",
        }
    }
}

/// Unit of an epoch timestamp, with its byte code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimeFormat {
    #[default]
    Seconds = 0,
    Milliseconds = 1,
    Microseconds = 2,
    Nanoseconds = 3,
}

impl TimeFormat {
    /// Maps a `* N` multiplier applied to an epoch-seconds column.
    pub fn from_multiplier(multiplier: i64) -> Option<Self> {
        match multiplier {
            1 => Some(TimeFormat::Seconds),
            1_000 => Some(TimeFormat::Milliseconds),
            1_000_000 => Some(TimeFormat::Microseconds),
            1_000_000_000 => Some(TimeFormat::Nanoseconds),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Length of one unit in nanoseconds.
    pub fn nanos_per_unit(self) -> i128 {
        match self {
            TimeFormat::Seconds => 1_000_000_000,
            TimeFormat::Milliseconds => 1_000_000,
            TimeFormat::Microseconds => 1_000,
            TimeFormat::Nanoseconds => 1,
        }
    }

    /// Whether `self` resolves time more finely than `other`.
    pub fn is_finer_than(self, other: TimeFormat) -> bool {
        self.nanos_per_unit() < other.nanos_per_unit()
    }
}

/// Inclusive time range covered by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Extent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Extent {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    /// Client-facing time unit of the column.
    pub provider_format_1: TimeFormat,
    /// Backend time unit the column is compared against.
    pub provider_format_2: TimeFormat,
}

impl FieldDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}

/// The canonical description of a time-series query, holding the templated
/// statement used to fetch other extents of the same series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeRangeQuery {
    pub statement: String,
    pub extent: Extent,
    pub step: Duration,
    pub timestamp_field: FieldDefinition,
    pub tag_fields: Vec<FieldDefinition>,
    pub backfill_tolerance: Duration,
    #[serde(skip)]
    pub template_url: Option<Url>,
}

impl fmt::Display for TimeRangeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Response formatting hints derived from the request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    pub output_format: OutputFormat,
    pub time_format: TimeFormat,
    pub base_timestamp_field_name: String,
}
