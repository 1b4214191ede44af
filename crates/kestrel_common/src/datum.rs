use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::{DataType, TypeFamily};

const MICROS_PER_SEC: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SEC;

/// A single scalar value as produced by a data node or written in a statement.
/// Small enum, no heap allocation for fixed-size types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    /// Fixed-point decimal: mantissa × 10^(-scale).
    /// e.g. Decimal(12345, 2) = 123.45
    Decimal(i128, u8),
    Text(String),
    Bytea(Vec<u8>),
    Date(i32),      // days since Unix epoch (1970-01-01)
    Time(i64),      // microseconds since midnight
    Timestamp(i64), // microseconds since Unix epoch
}

impl Datum {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Datum::Null => None,
            Datum::Boolean(_) => Some(DataType::Boolean),
            Datum::Int32(_) => Some(DataType::Int32),
            Datum::Int64(_) => Some(DataType::Int64),
            Datum::Float64(_) => Some(DataType::Float64),
            Datum::Decimal(_, scale) => Some(DataType::Decimal(38, *scale)),
            Datum::Text(_) => Some(DataType::Text),
            Datum::Bytea(_) => Some(DataType::Bytea),
            Datum::Date(_) => Some(DataType::Date),
            Datum::Time(_) => Some(DataType::Time),
            Datum::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    /// Comparability family of a non-null datum.
    pub fn family(&self) -> Option<TypeFamily> {
        self.data_type().map(|t| t.family())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int32(v) => Some(*v as i64),
            Datum::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int32(v) => Some(*v as f64),
            Datum::Int64(v) => Some(*v as f64),
            Datum::Float64(v) => Some(*v),
            Datum::Decimal(m, s) => Some(*m as f64 / 10f64.powi(*s as i32)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Same-family comparison. `None` for NULL on either side or for datums
    /// of different families.
    pub fn compare(&self, other: &Datum) -> Option<Ordering> {
        self.partial_cmp(other)
    }

    /// Try to add two datums (for SUM aggregation).
    pub fn add(&self, other: &Datum) -> Option<Datum> {
        match (self, other) {
            (Datum::Int32(a), Datum::Int32(b)) => Some(Datum::Int64(*a as i64 + *b as i64)),
            (Datum::Int64(a), Datum::Int64(b)) => Some(Datum::Int64(a.checked_add(*b)?)),
            (Datum::Int64(a), Datum::Int32(b)) => Some(Datum::Int64(a.checked_add(*b as i64)?)),
            (Datum::Int32(a), Datum::Int64(b)) => Some(Datum::Int64((*a as i64).checked_add(*b)?)),
            (Datum::Float64(a), Datum::Float64(b)) => Some(Datum::Float64(a + b)),
            (Datum::Float64(a), b @ (Datum::Int32(_) | Datum::Int64(_) | Datum::Decimal(_, _))) => {
                Some(Datum::Float64(a + b.as_f64()?))
            }
            (a @ (Datum::Int32(_) | Datum::Int64(_) | Datum::Decimal(_, _)), Datum::Float64(b)) => {
                Some(Datum::Float64(a.as_f64()? + b))
            }
            (Datum::Decimal(a, sa), Datum::Decimal(b, sb)) => decimal_add(*a, *sa, *b, *sb),
            (Datum::Decimal(a, sa), b @ (Datum::Int32(_) | Datum::Int64(_))) => {
                decimal_add(*a, *sa, b.as_i64()? as i128, 0)
            }
            (a @ (Datum::Int32(_) | Datum::Int64(_)), Datum::Decimal(b, sb)) => {
                decimal_add(a.as_i64()? as i128, 0, *b, *sb)
            }
            _ => None,
        }
    }

    /// Create a Decimal from a string like "123.45" or "-0.001".
    pub fn parse_decimal(s: &str) -> Option<Datum> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let (int_part, frac_part) = if let Some(dot_pos) = s.find('.') {
            (&s[..dot_pos], &s[dot_pos + 1..])
        } else {
            (s, "")
        };
        if frac_part.starts_with(['-', '+']) {
            return None;
        }
        let scale = u8::try_from(frac_part.len()).ok()?;
        let combined = format!("{}{}", int_part, frac_part);
        let mantissa: i128 = combined.parse().ok()?;
        Some(Datum::Decimal(mantissa, scale))
    }

    /// Convert to the declared type of a column. Returns `None` when the value
    /// cannot be represented in `target` without changing its meaning.
    pub fn convert_to(&self, target: DataType) -> Option<Datum> {
        if self.data_type() == Some(target) {
            return Some(self.clone());
        }
        match (self, target) {
            (Datum::Null, _) => Some(Datum::Null),
            (Datum::Int32(v), DataType::Int64) => Some(Datum::Int64(*v as i64)),
            (Datum::Int64(v), DataType::Int32) => i32::try_from(*v).ok().map(Datum::Int32),
            (Datum::Int32(_) | Datum::Int64(_), DataType::Float64) => self.as_f64().map(Datum::Float64),
            (Datum::Int32(_) | Datum::Int64(_), DataType::Decimal(_, scale)) => {
                let v = self.as_i64()? as i128;
                v.checked_mul(10i128.checked_pow(scale as u32)?)
                    .map(|m| Datum::Decimal(m, scale))
            }
            (Datum::Float64(v), DataType::Int32 | DataType::Int64) => {
                // i64::MAX as f64 rounds up to 2^63, which is out of range.
                let in_range = *v >= i64::MIN as f64 && *v < i64::MAX as f64;
                if v.fract() != 0.0 || !v.is_finite() || !in_range {
                    return None;
                }
                Datum::Int64(*v as i64).convert_to(target)
            }
            (Datum::Float64(v), DataType::Decimal(_, _)) => {
                Datum::parse_decimal(&v.to_string())?.convert_to(target)
            }
            (Datum::Decimal(m, s), DataType::Int32 | DataType::Int64) => {
                let (tm, ts) = decimal_trim(*m, *s);
                if ts != 0 {
                    return None;
                }
                Datum::Int64(i64::try_from(tm).ok()?).convert_to(target)
            }
            (Datum::Decimal(_, _), DataType::Float64) => self.as_f64().map(Datum::Float64),
            (Datum::Decimal(m, s), DataType::Decimal(_, ts)) => {
                if ts >= *s {
                    m.checked_mul(10i128.checked_pow((ts - s) as u32)?)
                        .map(|v| Datum::Decimal(v, ts))
                } else {
                    let (tm, trimmed) = decimal_trim(*m, *s);
                    if trimmed > ts {
                        return None;
                    }
                    Datum::Decimal(tm, trimmed).convert_to(target)
                }
            }
            (Datum::Text(s), DataType::Int32 | DataType::Int64) => {
                s.trim().parse::<i64>().ok().and_then(|v| Datum::Int64(v).convert_to(target))
            }
            (Datum::Text(s), DataType::Float64) => s.trim().parse::<f64>().ok().map(Datum::Float64),
            (Datum::Text(s), DataType::Decimal(_, _)) => Datum::parse_decimal(s)?.convert_to(target),
            (Datum::Text(s), DataType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Some(Datum::Boolean(true)),
                "false" | "f" | "0" => Some(Datum::Boolean(false)),
                _ => None,
            },
            (Datum::Text(s), DataType::Date) => parse_date(s).map(Datum::Date),
            (Datum::Text(s), DataType::Time) => parse_time(s).map(Datum::Time),
            (Datum::Text(s), DataType::Timestamp) => parse_timestamp(s).map(Datum::Timestamp),
            (Datum::Date(d), DataType::Timestamp) => Some(Datum::Timestamp(*d as i64 * MICROS_PER_DAY)),
            (Datum::Timestamp(us), DataType::Date) => {
                if us.rem_euclid(MICROS_PER_DAY) != 0 {
                    return None;
                }
                i32::try_from(us.div_euclid(MICROS_PER_DAY)).ok().map(Datum::Date)
            }
            (_, DataType::Text) => Some(Datum::Text(self.to_string())),
            _ => None,
        }
    }

    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        match self {
            Datum::Date(days) => epoch_date().checked_add_signed(chrono::Duration::days(*days as i64)),
            Datum::Timestamp(_) => self.to_naive_datetime().map(|dt| dt.date()),
            _ => None,
        }
    }

    pub fn to_naive_time(&self) -> Option<NaiveTime> {
        match self {
            Datum::Time(us) => {
                let secs = u32::try_from(us / MICROS_PER_SEC).ok()?;
                let nanos = u32::try_from((us % MICROS_PER_SEC) * 1000).ok()?;
                NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
            }
            Datum::Timestamp(_) => self.to_naive_datetime().map(|dt| dt.time()),
            _ => None,
        }
    }

    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Datum::Timestamp(us) => {
                let secs = us.div_euclid(MICROS_PER_SEC);
                let nsecs = (us.rem_euclid(MICROS_PER_SEC) * 1000) as u32;
                chrono::DateTime::from_timestamp(secs, nsecs).map(|dt| dt.naive_utc())
            }
            Datum::Date(_) => self.to_naive_date().and_then(|d| d.and_hms_opt(0, 0, 0)),
            _ => None,
        }
    }

    pub fn from_naive_datetime(dt: NaiveDateTime) -> Datum {
        Datum::Timestamp(dt.and_utc().timestamp_micros())
    }

    pub fn from_naive_date(d: NaiveDate) -> Datum {
        Datum::Date(d.signed_duration_since(epoch_date()).num_days() as i32)
    }

    pub fn from_naive_time(t: NaiveTime) -> Datum {
        Datum::Time(time_to_micros(t))
    }
}

fn epoch_date() -> NaiveDate {
    // 1970-01-01 is always valid, the fallback is unreachable.
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn parse_date(s: &str) -> Option<i32> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .map(|d| d.signed_duration_since(epoch_date()).num_days() as i32)
}

fn parse_time(s: &str) -> Option<i64> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
        .ok()
        .map(time_to_micros)
}

fn time_to_micros(t: NaiveTime) -> i64 {
    t.num_seconds_from_midnight() as i64 * MICROS_PER_SEC + (t.nanosecond() as i64 / 1000)
}

fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .map(|dt| dt.and_utc().timestamp_micros())
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int32(v) => write!(f, "{}", v),
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::Float64(v) => write!(f, "{}", v),
            Datum::Decimal(m, s) => write!(f, "{}", decimal_to_string(*m, *s)),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Bytea(bytes) => {
                write!(f, "\\x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Datum::Date(days) => match self.to_naive_date() {
                Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
                None => write!(f, "{}", days),
            },
            Datum::Time(us) => match self.to_naive_time() {
                Some(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
                None => write!(f, "{}", us),
            },
            Datum::Timestamp(us) => match self.to_naive_datetime() {
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
                None => write!(f, "{}", us),
            },
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => false, // NULL != NULL in SQL
            (Datum::Text(a), Datum::Text(b)) => a == b,
            (Datum::Bytea(a), Datum::Bytea(b)) => a == b,
            (Datum::Float64(a), Datum::Float64(b)) => a == b,
            _ => self.partial_cmp(other) == Some(Ordering::Equal),
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Explicit type tags (NOT mem::discriminant) so that equal numerics of
        // different widths hash the same: Int32(1) == Int64(1) == Decimal(10, 1).
        match self {
            Datum::Null => 0u8.hash(state),
            Datum::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Datum::Int32(_) | Datum::Int64(_) | Datum::Float64(_) | Datum::Decimal(_, _) => {
                match integral_value(self) {
                    Some(v) => {
                        2u8.hash(state);
                        v.hash(state);
                    }
                    None => {
                        3u8.hash(state);
                        self.as_f64().unwrap_or(f64::NAN).to_bits().hash(state);
                    }
                }
            }
            Datum::Text(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Datum::Bytea(bytes) => {
                5u8.hash(state);
                bytes.hash(state);
            }
            Datum::Date(days) => {
                6u8.hash(state);
                days.hash(state);
            }
            Datum::Time(us) => {
                7u8.hash(state);
                us.hash(state);
            }
            Datum::Timestamp(us) => {
                8u8.hash(state);
                us.hash(state);
            }
        }
    }
}

/// The exact integer value of a numeric datum, if it has one.
fn integral_value(d: &Datum) -> Option<i128> {
    match d {
        Datum::Int32(v) => Some(*v as i128),
        Datum::Int64(v) => Some(*v as i128),
        Datum::Float64(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Some(*v as i128),
        Datum::Decimal(m, s) => {
            let (tm, ts) = decimal_trim(*m, *s);
            (ts == 0).then_some(tm)
        }
        _ => None,
    }
}

fn numeric_cmp(a: &Datum, b: &Datum) -> Option<Ordering> {
    match (a, b) {
        (Datum::Float64(_), _) | (_, Datum::Float64(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Datum::Decimal(ma, sa), Datum::Decimal(mb, sb)) => Some(decimal_cmp(*ma, *sa, *mb, *sb)),
        (Datum::Decimal(m, s), other) => Some(decimal_cmp(*m, *s, other.as_i64()? as i128, 0)),
        (other, Datum::Decimal(m, s)) => Some(decimal_cmp(other.as_i64()? as i128, 0, *m, *s)),
        _ => a.as_i64()?.partial_cmp(&b.as_i64()?),
    }
}

#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Datum::Null, _) | (_, Datum::Null) => None,
            (Datum::Boolean(a), Datum::Boolean(b)) => a.partial_cmp(b),
            (Datum::Text(a), Datum::Text(b)) => a.partial_cmp(b),
            (Datum::Bytea(a), Datum::Bytea(b)) => a.partial_cmp(b),
            (Datum::Date(a), Datum::Date(b)) => a.partial_cmp(b),
            (Datum::Time(a), Datum::Time(b)) => a.partial_cmp(b),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a.partial_cmp(b),
            (
                Datum::Int32(_) | Datum::Int64(_) | Datum::Float64(_) | Datum::Decimal(_, _),
                Datum::Int32(_) | Datum::Int64(_) | Datum::Float64(_) | Datum::Decimal(_, _),
            ) => numeric_cmp(self, other),
            _ => None,
        }
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

/// A row is an ordered list of datums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedRow {
    pub values: Vec<Datum>,
}

impl OwnedRow {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    pub fn get(&self, idx: usize) -> Option<&Datum> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for OwnedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

// ── Decimal helper functions ────────────────────────────────────────────

/// Convert a (mantissa, scale) decimal to its string representation.
/// e.g. (12345, 2) → "123.45", (-1, 3) → "-0.001", (100, 0) → "100"
pub fn decimal_to_string(mantissa: i128, scale: u8) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let negative = mantissa < 0;
    let s = mantissa.unsigned_abs().to_string();
    let scale = scale as usize;
    let result = if s.len() <= scale {
        format!("0.{}{}", "0".repeat(scale - s.len()), s)
    } else {
        let (int_part, frac_part) = s.split_at(s.len() - scale);
        format!("{}.{}", int_part, frac_part)
    };
    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

/// `mantissa * 10^digits`, or `None` when it does not fit in an i128.
fn rescale(mantissa: i128, digits: u8) -> Option<i128> {
    if mantissa == 0 {
        return Some(0);
    }
    10i128
        .checked_pow(digits as u32)
        .and_then(|p| mantissa.checked_mul(p))
}

/// Exact comparison of `a / 10^sa` with `b / 10^sb`.
fn decimal_cmp(a: i128, sa: u8, b: i128, sb: u8) -> Ordering {
    // A side that overflows when rescaled is larger in magnitude than any
    // i128, so its sign decides.
    match sa.cmp(&sb) {
        Ordering::Equal => a.cmp(&b),
        Ordering::Greater => match rescale(b, sa - sb) {
            Some(nb) => a.cmp(&nb),
            None => 0.cmp(&b),
        },
        Ordering::Less => match rescale(a, sb - sa) {
            Some(na) => na.cmp(&b),
            None => a.cmp(&0),
        },
    }
}

/// Add two decimals at the larger scale. `None` on overflow.
fn decimal_add(a: i128, sa: u8, b: i128, sb: u8) -> Option<Datum> {
    let scale = sa.max(sb);
    let na = rescale(a, scale - sa)?;
    let nb = rescale(b, scale - sb)?;
    Some(Datum::Decimal(na.checked_add(nb)?, scale))
}

/// Remove trailing zeros from a decimal for canonical form.
pub fn decimal_trim(mut mantissa: i128, mut scale: u8) -> (i128, u8) {
    if mantissa == 0 {
        return (0, 0);
    }
    while scale > 0 && mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }
    (mantissa, scale)
}
