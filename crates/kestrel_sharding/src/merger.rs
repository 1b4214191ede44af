//! Intersection of the condition values one AND-group places on a column.

use std::cmp::Ordering;
use std::ops::Bound;

use kestrel_common::datum::Datum;
use kestrel_common::error::DerivationError;
use kestrel_common::types::TypeFamily;

use crate::column::Column;
use crate::value::{ConditionValue, ListValue, RangeValue};

/// Fold every value for `column` left to right. `None` when `values` is empty.
///
/// Every value is checked against the families seen so far, also once the
/// fold has collapsed to `AlwaysFalse`, so a mismatch is reported whatever
/// the predicate order.
pub fn merge_all(
    column: &Column,
    values: impl IntoIterator<Item = ConditionValue>,
) -> Result<Option<ConditionValue>, DerivationError> {
    let mut seen: Vec<TypeFamily> = Vec::new();
    let mut acc: Option<ConditionValue> = None;
    for value in values {
        let families = value.families();
        check_against(column, &seen, &families)?;
        for family in families {
            if !seen.contains(&family) {
                seen.push(family);
            }
        }
        acc = Some(match acc {
            None => normalize(value),
            Some(prev) => merge(column, prev, value)?,
        });
    }
    Ok(acc)
}

/// Intersect two values for the same column.
pub fn merge(
    column: &Column,
    left: ConditionValue,
    right: ConditionValue,
) -> Result<ConditionValue, DerivationError> {
    check_against(column, &left.families(), &right.families())?;
    if left.is_always_false() || right.is_always_false() {
        return Ok(ConditionValue::AlwaysFalse);
    }
    let merged = match (left, right) {
        (ConditionValue::List(a), ConditionValue::List(b)) => intersect_lists(a, b),
        (ConditionValue::Range(a), ConditionValue::Range(b)) => intersect_ranges(a, b),
        (ConditionValue::List(list), ConditionValue::Range(range))
        | (ConditionValue::Range(range), ConditionValue::List(list)) => filter_list(list, &range),
        (ConditionValue::AlwaysFalse, _) | (_, ConditionValue::AlwaysFalse) => ConditionValue::AlwaysFalse,
    };
    Ok(normalize(merged))
}

/// Collapse values that cannot match anything into `AlwaysFalse`.
fn normalize(value: ConditionValue) -> ConditionValue {
    match value {
        ConditionValue::List(ref l) if l.is_empty() => ConditionValue::AlwaysFalse,
        ConditionValue::Range(ref r) if r.is_empty() => ConditionValue::AlwaysFalse,
        other => other,
    }
}

fn check_against(
    column: &Column,
    left: &[TypeFamily],
    right: &[TypeFamily],
) -> Result<(), DerivationError> {
    for l in left {
        if let Some(r) = right.iter().find(|r| *r != l) {
            return Err(DerivationError::TypeMismatch {
                column: column.to_string(),
                left: *l,
                right: *r,
            });
        }
    }
    Ok(())
}

fn intersect_lists(a: ListValue, b: ListValue) -> ConditionValue {
    let values: Vec<Datum> = a
        .values()
        .iter()
        .filter(|v| b.contains(v))
        .cloned()
        .collect();
    let mut parameter_indexes = a.parameter_indexes().to_vec();
    parameter_indexes.extend_from_slice(b.parameter_indexes());
    ConditionValue::List(ListValue::new(values, parameter_indexes))
}

fn filter_list(list: ListValue, range: &RangeValue) -> ConditionValue {
    let values: Vec<Datum> = list
        .values()
        .iter()
        .filter(|v| range.contains(v))
        .cloned()
        .collect();
    ConditionValue::List(ListValue::new(values, list.parameter_indexes().to_vec()))
}

fn intersect_ranges(a: RangeValue, b: RangeValue) -> ConditionValue {
    let (a_lower, a_upper) = a.into_bounds();
    let (b_lower, b_upper) = b.into_bounds();
    let lower = tighter(a_lower, b_lower, Ordering::Greater);
    let upper = tighter(a_upper, b_upper, Ordering::Less);
    ConditionValue::Range(RangeValue::new(lower, upper))
}

/// Pick the more restrictive of two bounds on the same side. `wins` is the
/// ordering that makes the left value tighter (`Greater` for lower bounds).
/// At equal values the exclusive bound is tighter.
fn tighter(a: Bound<Datum>, b: Bound<Datum>, wins: Ordering) -> Bound<Datum> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (a, b) => {
            let (av, bv) = match (&a, &b) {
                (Bound::Included(av) | Bound::Excluded(av), Bound::Included(bv) | Bound::Excluded(bv)) => {
                    (av, bv)
                }
                _ => return a,
            };
            match av.compare(bv) {
                Some(Ordering::Equal) => {
                    if matches!(a, Bound::Excluded(_)) {
                        a
                    } else {
                        b
                    }
                }
                Some(ord) if ord == wins => a,
                _ => b,
            }
        }
    }
}
