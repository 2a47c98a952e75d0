//! Column type inference
//!
//! Each column is inferred on its own and never fails the upload: a column
//! that cannot be typed stays text, and values that do not fit the chosen
//! kind become null. Nothing is ever replaced by zero.

use std::fmt;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Builder, Int64Builder, StringBuilder, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::sources::RawValue;

/// Number of leading non-null values checked for date-like text
const DATE_SAMPLE_SIZE: usize = 10;

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\d{4}-\d{2}-\d{2}",
        r"^\d{2}/\d{2}/\d{4}",
        r"^\d{2}-\d{2}-\d{4}",
        r"^\d{4}/\d{2}/\d{2}",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m-%d-%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d"];

/// The type a column carries from ingestion onwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Real,
    DateTime,
    Text,
}

impl ColumnKind {
    /// Declared type used when creating the table
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::DateTime => "TIMESTAMP",
            ColumnKind::Text => "TEXT",
        }
    }

    pub fn arrow_type(&self) -> DataType {
        match self {
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Real => DataType::Float64,
            ColumnKind::DateTime => DataType::Timestamp(TimeUnit::Millisecond, None),
            ColumnKind::Text => DataType::Utf8,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Real => "real",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// Why a column was left as text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    AllNull,
    NotNumeric,
    UnparsableDates,
}

/// How inference went for one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InferenceOutcome {
    /// Every non-null value converted
    Typed(ColumnKind),
    /// Converted, but `nulled` values did not fit and became null
    Coerced { kind: ColumnKind, nulled: usize },
    /// Left as text
    Failed(FallbackReason),
}

impl InferenceOutcome {
    pub fn kind(&self) -> ColumnKind {
        match self {
            InferenceOutcome::Typed(kind) | InferenceOutcome::Coerced { kind, .. } => *kind,
            InferenceOutcome::Failed(_) => ColumnKind::Text,
        }
    }
}

/// Column values after inference
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<Option<i64>>),
    Real(Vec<Option<f64>>),
    /// Milliseconds since the Unix epoch, no timezone
    DateTime(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Integer(_) => ColumnKind::Integer,
            ColumnData::Real(_) => ColumnKind::Real,
            ColumnData::DateTime(_) => ColumnKind::DateTime,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) | ColumnData::DateTime(v) => v.len(),
            ColumnData::Real(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_array(self) -> ArrayRef {
        match self {
            ColumnData::Integer(values) => {
                let mut builder = Int64Builder::with_capacity(values.len());
                for value in values {
                    builder.append_option(value);
                }
                Arc::new(builder.finish())
            }
            ColumnData::Real(values) => {
                let mut builder = Float64Builder::with_capacity(values.len());
                for value in values {
                    builder.append_option(value);
                }
                Arc::new(builder.finish())
            }
            ColumnData::DateTime(values) => {
                let mut builder = TimestampMillisecondBuilder::with_capacity(values.len());
                for value in values {
                    builder.append_option(value);
                }
                Arc::new(builder.finish())
            }
            ColumnData::Text(values) => {
                let mut builder = StringBuilder::new();
                for value in values {
                    builder.append_option(value);
                }
                Arc::new(builder.finish())
            }
        }
    }
}

/// Result of inferring one column
#[derive(Debug, Clone, PartialEq)]
pub struct InferredColumn {
    pub outcome: InferenceOutcome,
    pub data: ColumnData,
}

/// Infer the kind of one column and convert its values
pub fn infer_column(values: &[&RawValue]) -> InferredColumn {
    let non_null = values.iter().filter(|v| !v.is_null()).count();
    if non_null == 0 {
        return InferredColumn {
            outcome: InferenceOutcome::Failed(FallbackReason::AllNull),
            data: ColumnData::Text(vec![None; values.len()]),
        };
    }

    // Values that all read as numbers were never text to begin with
    let numbers: Vec<Option<Number>> = values.iter().map(|v| to_number(v)).collect();
    let failed_numbers = values
        .iter()
        .zip(&numbers)
        .filter(|(raw, parsed)| !raw.is_null() && parsed.is_none())
        .count();

    if failed_numbers == 0 {
        return InferredColumn {
            outcome: InferenceOutcome::Typed(numeric_kind(&numbers)),
            data: numeric_data(&numbers),
        };
    }

    let mut tried_dates = false;
    if looks_like_dates(values) {
        tried_dates = true;
        let parsed: Vec<Option<i64>> = values.iter().map(|v| to_timestamp(v)).collect();
        let converted = parsed.iter().filter(|p| p.is_some()).count();
        if converted > 0 {
            return InferredColumn {
                outcome: outcome(ColumnKind::DateTime, non_null - converted),
                data: ColumnData::DateTime(parsed),
            };
        }
        debug!("Date-like column has no parseable values; trying numbers");
    }

    if failed_numbers < non_null {
        let data = numeric_data(&numbers);
        return InferredColumn {
            outcome: outcome(data.kind(), failed_numbers),
            data,
        };
    }

    let reason = if tried_dates {
        FallbackReason::UnparsableDates
    } else {
        FallbackReason::NotNumeric
    };
    InferredColumn {
        outcome: InferenceOutcome::Failed(reason),
        data: ColumnData::Text(values.iter().map(|v| as_text(v)).collect()),
    }
}

fn outcome(kind: ColumnKind, nulled: usize) -> InferenceOutcome {
    if nulled == 0 {
        InferenceOutcome::Typed(kind)
    } else {
        InferenceOutcome::Coerced { kind, nulled }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_integer(&self) -> Option<i64> {
        match *self {
            Number::Int(i) => Some(i),
            Number::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(f as i64),
            Number::Float(_) => None,
        }
    }

    fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn to_number(value: &RawValue) -> Option<Number> {
    match value {
        RawValue::Null => None,
        RawValue::Integer(i) => Some(Number::Int(*i)),
        RawValue::Float(f) if f.is_nan() => None,
        RawValue::Float(f) => Some(Number::Float(*f)),
        RawValue::Text(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(Number::Int(i));
            }
            match s.parse::<f64>() {
                Ok(f) if !f.is_nan() => Some(Number::Float(f)),
                _ => None,
            }
        }
    }
}

/// Integer when every value is integral, real otherwise
fn numeric_kind(numbers: &[Option<Number>]) -> ColumnKind {
    if numbers.iter().flatten().all(|n| n.as_integer().is_some()) {
        ColumnKind::Integer
    } else {
        ColumnKind::Real
    }
}

fn numeric_data(numbers: &[Option<Number>]) -> ColumnData {
    match numeric_kind(numbers) {
        ColumnKind::Integer => {
            ColumnData::Integer(numbers.iter().map(|n| n.and_then(|n| n.as_integer())).collect())
        }
        _ => ColumnData::Real(numbers.iter().map(|n| n.map(|n| n.as_f64())).collect()),
    }
}

fn looks_like_dates(values: &[&RawValue]) -> bool {
    values
        .iter()
        .filter(|v| !v.is_null())
        .take(DATE_SAMPLE_SIZE)
        .any(|v| {
            let text = v.to_string();
            let text = text.trim();
            DATE_PATTERNS.iter().any(|p| p.is_match(text))
        })
}

fn to_timestamp(value: &RawValue) -> Option<i64> {
    match value {
        RawValue::Text(s) => parse_datetime(s).map(|dt| dt.and_utc().timestamp_millis()),
        _ => None,
    }
}

/// Parse the date and datetime shapes recognized by the date heuristic
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_utc())
}

fn as_text(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn text(values: &[&str]) -> Vec<RawValue> {
        values
            .iter()
            .map(|v| {
                if v.is_empty() {
                    RawValue::Null
                } else {
                    RawValue::Text(v.to_string())
                }
            })
            .collect()
    }

    fn infer(values: &[RawValue]) -> InferredColumn {
        let refs: Vec<&RawValue> = values.iter().collect();
        infer_column(&refs)
    }

    #[test]
    fn test_integer_strings() {
        let column = infer(&text(&["1", "2", "3"]));
        assert_eq!(column.outcome, InferenceOutcome::Typed(ColumnKind::Integer));
        assert_eq!(column.data, ColumnData::Integer(vec![Some(1), Some(2), Some(3)]));
    }

    #[test]
    fn test_float_strings() {
        let column = infer(&text(&["1.5", "2.0"]));
        assert_eq!(column.outcome, InferenceOutcome::Typed(ColumnKind::Real));
        assert_eq!(column.data, ColumnData::Real(vec![Some(1.5), Some(2.0)]));
    }

    #[test]
    fn test_mixed_numeric_nulls_bad_value() {
        let column = infer(&text(&["1", "x", "3"]));
        assert_eq!(
            column.outcome,
            InferenceOutcome::Coerced {
                kind: ColumnKind::Integer,
                nulled: 1
            }
        );
        // The unparseable value is null, never zero
        assert_eq!(column.data, ColumnData::Integer(vec![Some(1), None, Some(3)]));
    }

    #[test]
    fn test_coerced_integral_floats_become_integer() {
        let column = infer(&text(&["1.0", "n/a?", "4"]));
        assert_eq!(column.data, ColumnData::Integer(vec![Some(1), None, Some(4)]));
    }

    #[test]
    fn test_nulls_preserved() {
        let column = infer(&text(&["7", "", "9"]));
        assert_eq!(column.outcome, InferenceOutcome::Typed(ColumnKind::Integer));
        assert_eq!(column.data, ColumnData::Integer(vec![Some(7), None, Some(9)]));
    }

    #[test]
    fn test_all_null_column() {
        let column = infer(&[RawValue::Null, RawValue::Null]);
        assert_eq!(column.outcome, InferenceOutcome::Failed(FallbackReason::AllNull));
        assert_eq!(column.data, ColumnData::Text(vec![None, None]));
    }

    #[test]
    fn test_plain_text_stays_text() {
        let column = infer(&text(&["a", "b", "c"]));
        assert_eq!(column.outcome, InferenceOutcome::Failed(FallbackReason::NotNumeric));
        assert_eq!(column.outcome.kind(), ColumnKind::Text);
        assert_eq!(
            column.data,
            ColumnData::Text(vec![Some("a".into()), Some("b".into()), Some("c".into())])
        );
    }

    #[test]
    fn test_iso_dates() {
        let column = infer(&text(&["2024-01-05", "2024-02-10 08:30:00", ""]));
        assert_eq!(column.outcome, InferenceOutcome::Typed(ColumnKind::DateTime));
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp_millis());
        match column.data {
            ColumnData::DateTime(values) => {
                assert_eq!(values[0], expected);
                assert!(values[1].is_some());
                assert_eq!(values[2], None);
            }
            other => panic!("expected datetime data, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_dates_become_null() {
        let column = infer(&text(&["01/15/2024", "not a date", "13/45/2024"]));
        assert_eq!(
            column.outcome,
            InferenceOutcome::Coerced {
                kind: ColumnKind::DateTime,
                nulled: 2
            }
        );
    }

    #[test]
    fn test_date_pattern_beyond_sample_is_ignored() {
        let mut values = text(&["x"; 10]);
        values.push(RawValue::Text("2024-01-01".to_string()));
        let column = infer(&values);
        assert_eq!(column.outcome.kind(), ColumnKind::Text);
    }

    #[test]
    fn test_unparseable_date_like_text() {
        let column = infer(&text(&["2024-99-99", "2024-13-40"]));
        assert_eq!(
            column.outcome,
            InferenceOutcome::Failed(FallbackReason::UnparsableDates)
        );
    }

    #[test]
    fn test_native_spreadsheet_numbers() {
        let column = infer(&[RawValue::Float(3.0), RawValue::Integer(4), RawValue::Null]);
        assert_eq!(column.data, ColumnData::Integer(vec![Some(3), Some(4), None]));

        let column = infer(&[RawValue::Float(3.25), RawValue::Integer(4)]);
        assert_eq!(column.data, ColumnData::Real(vec![Some(3.25), Some(4.0)]));
    }

    #[test]
    fn test_into_array_keeps_nulls() {
        let array = ColumnData::Text(vec![Some("a".into()), None]).into_array();
        assert_eq!(array.len(), 2);
        assert_eq!(array.null_count(), 1);
        assert_eq!(array.data_type(), &DataType::Utf8);
    }
}
