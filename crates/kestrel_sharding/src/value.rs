//! Values a routing column may take under one predicate group.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

use kestrel_common::datum::Datum;
use kestrel_common::types::TypeFamily;

/// The possible values of one routing column implied by a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// Equality / IN semantics.
    List(ListValue),
    /// BETWEEN / comparison semantics.
    Range(RangeValue),
    /// The predicate group can never match a row.
    AlwaysFalse,
}

impl ConditionValue {
    pub fn is_always_false(&self) -> bool {
        matches!(self, ConditionValue::AlwaysFalse)
    }

    /// Whether a row whose routing column holds `value` satisfies this condition.
    pub fn matches(&self, value: &Datum) -> bool {
        match self {
            ConditionValue::List(list) => list.contains(value),
            ConditionValue::Range(range) => range.contains(value),
            ConditionValue::AlwaysFalse => false,
        }
    }

    /// The type families of every datum carried by this value.
    pub fn families(&self) -> Vec<TypeFamily> {
        let mut families: Vec<TypeFamily> = match self {
            ConditionValue::List(list) => list.values.iter().filter_map(Datum::family).collect(),
            ConditionValue::Range(range) => [&range.lower, &range.upper]
                .into_iter()
                .filter_map(bound_value)
                .filter_map(Datum::family)
                .collect(),
            ConditionValue::AlwaysFalse => Vec::new(),
        };
        families.sort_by_key(|f| family_rank(*f));
        families.dedup();
        families
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::List(list) => write!(f, "{}", list),
            ConditionValue::Range(range) => write!(f, "{}", range),
            ConditionValue::AlwaysFalse => write!(f, "<always false>"),
        }
    }
}

/// An ordered, de-duplicated set of values plus the parameter positions they
/// came from (for rewrite provenance).
#[derive(Debug, Clone, PartialEq)]
pub struct ListValue {
    values: Vec<Datum>,
    parameter_indexes: Vec<usize>,
}

impl ListValue {
    pub fn new(mut values: Vec<Datum>, mut parameter_indexes: Vec<usize>) -> Self {
        values.retain(|v| !v.is_null());
        values.sort_by(canonical_cmp);
        values.dedup_by(|a, b| canonical_cmp(a, b) == Ordering::Equal);
        parameter_indexes.sort_unstable();
        parameter_indexes.dedup();
        Self {
            values,
            parameter_indexes,
        }
    }

    pub fn single(value: Datum, parameter_index: Option<usize>) -> Self {
        Self::new(vec![value], parameter_index.into_iter().collect())
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    pub fn parameter_indexes(&self) -> &[usize] {
        &self.parameter_indexes
    }

    pub fn contains(&self, value: &Datum) -> bool {
        self.values.iter().any(|v| v == value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for ListValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "}}")
    }
}

/// An interval over one type family. `Bound::Unbounded` is an open side.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeValue {
    lower: Bound<Datum>,
    upper: Bound<Datum>,
}

impl RangeValue {
    pub fn new(lower: Bound<Datum>, upper: Bound<Datum>) -> Self {
        Self { lower, upper }
    }

    /// `[low, high]`, as produced by BETWEEN.
    pub fn closed(low: Datum, high: Datum) -> Self {
        Self::new(Bound::Included(low), Bound::Included(high))
    }

    pub fn greater_than(v: Datum) -> Self {
        Self::new(Bound::Excluded(v), Bound::Unbounded)
    }

    pub fn at_least(v: Datum) -> Self {
        Self::new(Bound::Included(v), Bound::Unbounded)
    }

    pub fn less_than(v: Datum) -> Self {
        Self::new(Bound::Unbounded, Bound::Excluded(v))
    }

    pub fn at_most(v: Datum) -> Self {
        Self::new(Bound::Unbounded, Bound::Included(v))
    }

    pub fn lower(&self) -> &Bound<Datum> {
        &self.lower
    }

    pub fn upper(&self) -> &Bound<Datum> {
        &self.upper
    }

    pub fn into_bounds(self) -> (Bound<Datum>, Bound<Datum>) {
        (self.lower, self.upper)
    }

    pub fn contains(&self, value: &Datum) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(l) => matches!(value.compare(l), Some(Ordering::Greater | Ordering::Equal)),
            Bound::Excluded(l) => matches!(value.compare(l), Some(Ordering::Greater)),
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(u) => matches!(value.compare(u), Some(Ordering::Less | Ordering::Equal)),
            Bound::Excluded(u) => matches!(value.compare(u), Some(Ordering::Less)),
        };
        above_lower && below_upper && !value.is_null()
    }

    /// True when no value can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(l), Bound::Included(u)) => l.compare(u) == Some(Ordering::Greater),
            (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
                matches!(l.compare(u), Some(Ordering::Greater | Ordering::Equal))
            }
        }
    }
}

impl fmt::Display for RangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Unbounded => write!(f, "(-inf")?,
            Bound::Included(v) => write!(f, "[{}", v)?,
            Bound::Excluded(v) => write!(f, "({}", v)?,
        }
        match &self.upper {
            Bound::Unbounded => write!(f, ", +inf)"),
            Bound::Included(v) => write!(f, ", {}]", v),
            Bound::Excluded(v) => write!(f, ", {})", v),
        }
    }
}

pub(crate) fn bound_value(bound: &Bound<Datum>) -> Option<&Datum> {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => Some(v),
        Bound::Unbounded => None,
    }
}

fn family_rank(family: TypeFamily) -> u8 {
    match family {
        TypeFamily::Boolean => 0,
        TypeFamily::Numeric => 1,
        TypeFamily::Text => 2,
        TypeFamily::Binary => 3,
        TypeFamily::Date => 4,
        TypeFamily::Time => 5,
        TypeFamily::Timestamp => 6,
    }
}

/// Total order used to keep list values sorted: by family, then by value.
fn canonical_cmp(a: &Datum, b: &Datum) -> Ordering {
    let fa = a.family().map(family_rank);
    let fb = b.family().map(family_rank);
    fa.cmp(&fb).then_with(|| a.cmp(b))
}
