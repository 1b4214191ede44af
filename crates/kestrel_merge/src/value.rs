//! Type-directed access to result values.
//!
//! Callers ask for a column as a particular host type; the stored datum is
//! converted when the conversion preserves meaning and rejected otherwise.

use std::fmt;
use std::io::{Cursor, Read};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use kestrel_common::datum::{decimal_trim, Datum};
use kestrel_common::error::BindingError;
use kestrel_common::types::DataType;
use url::Url;

/// Host type requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    Url,
    /// The stored datum, unconverted.
    Object,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Boolean => "boolean",
            ValueType::Int8 => "i8",
            ValueType::Int16 => "i16",
            ValueType::Int32 => "i32",
            ValueType::Int64 => "i64",
            ValueType::Float32 => "f32",
            ValueType::Float64 => "f64",
            ValueType::Decimal => "decimal",
            ValueType::Text => "string",
            ValueType::Bytes => "bytes",
            ValueType::Date => "date",
            ValueType::Time => "time",
            ValueType::Timestamp => "timestamp",
            ValueType::Url => "url",
            ValueType::Object => "object",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// mantissa × 10^(-scale)
    Decimal { mantissa: i128, scale: u8 },
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    /// A timestamp read through a caller-supplied offset.
    TimestampTz(DateTime<FixedOffset>),
    Url(Url),
    Object(Datum),
}

/// Encoding of a column read as a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// 7-bit ASCII; other characters become `?`.
    Ascii,
    /// UTF-8 text.
    Unicode,
    Binary,
}

/// Convert `datum` (column `index`) to `value_type`. `Ok(None)` for SQL NULL.
pub fn convert(
    datum: &Datum,
    index: usize,
    value_type: ValueType,
) -> Result<Option<Value>, BindingError> {
    if datum.is_null() {
        return Ok(None);
    }
    let unsupported = || BindingError::UnsupportedConversion {
        index,
        requested: value_type.to_string(),
        actual: datum
            .data_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "NULL".into()),
    };
    let value = match value_type {
        ValueType::Boolean => Value::Boolean(to_bool(datum).ok_or_else(unsupported)?),
        ValueType::Int8 => Value::Int8(narrow(datum).ok_or_else(unsupported)?),
        ValueType::Int16 => Value::Int16(narrow(datum).ok_or_else(unsupported)?),
        ValueType::Int32 => Value::Int32(narrow(datum).ok_or_else(unsupported)?),
        ValueType::Int64 => Value::Int64(to_i64(datum).ok_or_else(unsupported)?),
        ValueType::Float32 => Value::Float32(to_f64(datum).ok_or_else(unsupported)? as f32),
        ValueType::Float64 => Value::Float64(to_f64(datum).ok_or_else(unsupported)?),
        ValueType::Decimal => match datum.convert_to(DataType::Decimal(38, decimal_scale(datum))) {
            Some(Datum::Decimal(mantissa, scale)) => Value::Decimal { mantissa, scale },
            _ => return Err(unsupported()),
        },
        ValueType::Text => Value::Text(datum.to_string()),
        ValueType::Bytes => match datum {
            Datum::Bytea(b) => Value::Bytes(b.clone()),
            Datum::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
            _ => return Err(unsupported()),
        },
        ValueType::Date => Value::Date(
            temporal(datum, DataType::Date)
                .to_naive_date()
                .ok_or_else(unsupported)?,
        ),
        ValueType::Time => {
            let time = match datum {
                Datum::Time(_) | Datum::Timestamp(_) => datum.to_naive_time(),
                _ => temporal(datum, DataType::Time).to_naive_time(),
            };
            Value::Time(time.ok_or_else(unsupported)?)
        }
        ValueType::Timestamp => Value::Timestamp(
            temporal(datum, DataType::Timestamp)
                .to_naive_datetime()
                .ok_or_else(unsupported)?,
        ),
        ValueType::Url => match datum {
            Datum::Text(s) => Value::Url(Url::parse(s.trim()).map_err(|_| unsupported())?),
            _ => return Err(unsupported()),
        },
        ValueType::Object => Value::Object(datum.clone()),
    };
    Ok(Some(value))
}

/// Temporal datum to read a date/time from; NULL when there is none.
fn temporal(datum: &Datum, target: DataType) -> Datum {
    match datum {
        Datum::Date(_) | Datum::Timestamp(_) | Datum::Time(_) => datum.clone(),
        Datum::Text(_) => datum.convert_to(target).unwrap_or(Datum::Null),
        _ => Datum::Null,
    }
}

/// Like [`convert`] but interprets stored (UTC) timestamps in `offset`.
/// Dates and times without a zone are returned unchanged.
pub fn convert_calendar(
    datum: &Datum,
    index: usize,
    value_type: ValueType,
    offset: FixedOffset,
) -> Result<Option<Value>, BindingError> {
    let Some(value) = convert(datum, index, value_type)? else {
        return Ok(None);
    };
    let shifted = match (value, datum) {
        (Value::Timestamp(naive), _) => Value::TimestampTz(offset.from_utc_datetime(&naive)),
        (Value::Date(_), Datum::Timestamp(_)) | (Value::Time(_), Datum::Timestamp(_)) => {
            let utc = datum.to_naive_datetime().ok_or(BindingError::UnsupportedConversion {
                index,
                requested: value_type.to_string(),
                actual: DataType::Timestamp.to_string(),
            })?;
            let local = offset.from_utc_datetime(&utc).naive_local();
            if value_type == ValueType::Date {
                Value::Date(local.date())
            } else {
                Value::Time(local.time())
            }
        }
        (other, _) => other,
    };
    Ok(Some(shifted))
}

/// Read `datum` as a byte stream. `Ok(None)` for SQL NULL.
pub fn stream(datum: &Datum, index: usize, kind: StreamKind) -> Result<Option<Box<dyn Read>>, BindingError> {
    if datum.is_null() {
        return Ok(None);
    }
    let bytes = match (kind, datum) {
        (StreamKind::Binary, Datum::Bytea(b)) => b.clone(),
        (StreamKind::Binary, Datum::Text(s)) => s.as_bytes().to_vec(),
        (StreamKind::Binary, other) => {
            return Err(BindingError::UnsupportedConversion {
                index,
                requested: "binary stream".into(),
                actual: other.data_type().map(|t| t.to_string()).unwrap_or_default(),
            })
        }
        (StreamKind::Unicode, other) => other.to_string().into_bytes(),
        (StreamKind::Ascii, other) => other
            .to_string()
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect(),
    };
    Ok(Some(Box::new(Cursor::new(bytes))))
}

fn to_bool(datum: &Datum) -> Option<bool> {
    match datum {
        Datum::Boolean(b) => Some(*b),
        Datum::Int32(_) | Datum::Int64(_) => datum.as_i64().map(|v| v != 0),
        Datum::Text(_) => datum.convert_to(DataType::Boolean)?.as_bool(),
        _ => None,
    }
}

fn to_i64(datum: &Datum) -> Option<i64> {
    match datum {
        Datum::Boolean(b) => Some(*b as i64),
        _ => datum.convert_to(DataType::Int64)?.as_i64(),
    }
}

fn narrow<T: TryFrom<i64>>(datum: &Datum) -> Option<T> {
    T::try_from(to_i64(datum)?).ok()
}

fn to_f64(datum: &Datum) -> Option<f64> {
    match datum {
        Datum::Text(s) => s.trim().parse().ok(),
        _ => datum.as_f64(),
    }
}

/// Scale that represents `datum` exactly as a decimal, when it has one.
fn decimal_scale(datum: &Datum) -> u8 {
    match datum {
        Datum::Decimal(_, s) => *s,
        Datum::Float64(v) => match Datum::parse_decimal(&v.to_string()) {
            Some(Datum::Decimal(m, s)) => decimal_trim(m, s).1,
            _ => 0,
        },
        Datum::Text(s) => match Datum::parse_decimal(s) {
            Some(Datum::Decimal(_, s)) => s,
            _ => 0,
        },
        _ => 0,
    }
}
