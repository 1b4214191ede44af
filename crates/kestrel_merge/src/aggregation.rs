//! Aggregation items and per-group accumulation of shard partial results.
//!
//! Each shard returns one row per group with partial aggregates in place:
//! partial COUNTs, partial SUMs, local MAX/MIN, raw values for DISTINCT
//! variants and, for AVG, the derived SUM and COUNT columns added by rewrite.

use std::collections::HashSet;

use kestrel_common::datum::{decimal_trim, Datum};
use kestrel_common::error::BindingError;
use kestrel_common::types::DataType;

/// Scale of AVG results computed from integer or decimal sums.
pub const AVG_SCALE: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Count,
    Sum,
    Avg,
    Max,
    Min,
    CountDistinct,
    SumDistinct,
    AvgDistinct,
}

impl AggregationKind {
    pub fn is_distinct(self) -> bool {
        matches!(
            self,
            AggregationKind::CountDistinct | AggregationKind::SumDistinct | AggregationKind::AvgDistinct
        )
    }
}

/// One aggregate projection. AVG carries its derived SUM and COUNT items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationItem {
    pub kind: AggregationKind,
    pub expression: String,
    pub index: Option<usize>,
    pub derived: Vec<AggregationItem>,
}

impl AggregationItem {
    pub fn new(kind: AggregationKind, expression: impl Into<String>, index: usize) -> Self {
        Self {
            kind,
            expression: expression.into(),
            index: Some(index),
            derived: Vec::new(),
        }
    }

    pub fn count(expression: impl Into<String>, index: usize) -> Self {
        Self::new(AggregationKind::Count, expression, index)
    }

    pub fn sum(expression: impl Into<String>, index: usize) -> Self {
        Self::new(AggregationKind::Sum, expression, index)
    }

    pub fn max(expression: impl Into<String>, index: usize) -> Self {
        Self::new(AggregationKind::Max, expression, index)
    }

    pub fn min(expression: impl Into<String>, index: usize) -> Self {
        Self::new(AggregationKind::Min, expression, index)
    }

    /// AVG at `index` with derived SUM at `sum_index` and COUNT at `count_index`.
    pub fn avg(expression: impl Into<String>, index: usize, sum_index: usize, count_index: usize) -> Self {
        let expression = expression.into();
        let mut item = Self::new(AggregationKind::Avg, expression.clone(), index);
        item.derived = vec![
            Self::sum(format!("AVG_DERIVED_SUM({})", expression), sum_index),
            Self::count(format!("AVG_DERIVED_COUNT({})", expression), count_index),
        ];
        item
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Count(usize),
    Sum(usize),
    Max(usize),
    Min(usize),
    Avg { index: usize, sum: usize, count: usize },
    Distinct { kind: AggregationKind, index: usize },
}

/// Aggregations with every index resolved, validated once per merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationPlan {
    plans: Vec<Plan>,
}

impl AggregationPlan {
    pub fn new(items: &[AggregationItem]) -> Result<Self, BindingError> {
        let plans = items.iter().map(plan_item).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { plans })
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Smallest row width that has a slot for every aggregate output.
    pub fn min_width(&self) -> usize {
        self.plans
            .iter()
            .map(|p| match p {
                Plan::Count(i) | Plan::Sum(i) | Plan::Max(i) | Plan::Min(i) => *i,
                Plan::Avg { index, sum, count } => *index.max(sum).max(count),
                Plan::Distinct { index, .. } => *index,
            })
            .max()
            .map_or(0, |i| i + 1)
    }
}

fn plan_item(item: &AggregationItem) -> Result<Plan, BindingError> {
    let unresolved = |expression: &str| BindingError::UnresolvedIndex {
        item: "aggregation",
        expression: expression.to_string(),
    };
    let index = item.index.ok_or_else(|| unresolved(&item.expression))?;
    Ok(match item.kind {
        AggregationKind::Count => Plan::Count(index),
        AggregationKind::Sum => Plan::Sum(index),
        AggregationKind::Max => Plan::Max(index),
        AggregationKind::Min => Plan::Min(index),
        AggregationKind::Avg => {
            let derived = |kind: AggregationKind| {
                item.derived
                    .iter()
                    .find(|d| d.kind == kind)
                    .and_then(|d| d.index)
                    .ok_or_else(|| unresolved(&item.expression))
            };
            Plan::Avg {
                index,
                sum: derived(AggregationKind::Sum)?,
                count: derived(AggregationKind::Count)?,
            }
        }
        kind @ (AggregationKind::CountDistinct | AggregationKind::SumDistinct | AggregationKind::AvgDistinct) => {
            Plan::Distinct { kind, index }
        }
    })
}

#[derive(Debug, Clone)]
enum State {
    Count(i64),
    Sum(Option<Datum>),
    Max(Option<Datum>),
    Min(Option<Datum>),
    Avg { sum: Option<Datum>, count: i64 },
    Distinct(DistinctValues),
}

/// Insertion-ordered set of values keyed by their group-key encoding.
#[derive(Debug, Clone, Default)]
struct DistinctValues {
    seen: HashSet<Vec<u8>>,
    values: Vec<Datum>,
}

impl DistinctValues {
    fn insert(&mut self, value: &Datum) {
        if value.is_null() {
            return;
        }
        let mut key = Vec::new();
        encode_datum(&mut key, value);
        if self.seen.insert(key) {
            self.values.push(value.clone());
        }
    }

    fn sum(&self) -> Option<Datum> {
        self.values.iter().fold(None, |acc, v| Some(add(acc, v)))
    }
}

/// Running state of one group: the first row as template plus one state per
/// aggregation.
#[derive(Debug, Clone)]
pub struct GroupAccumulator {
    template: Vec<Datum>,
    plans: Vec<Plan>,
    states: Vec<State>,
}

impl GroupAccumulator {
    /// Start a group from its first row and fold that row in.
    pub fn new(first_row: Vec<Datum>, plan: &AggregationPlan) -> Self {
        let mut acc = Self::empty_with(first_row, plan);
        let row = acc.template.clone();
        acc.accumulate(&row);
        acc
    }

    /// The single row reported by an aggregation over no input rows: counts
    /// are zero, everything else NULL.
    pub fn empty(width: usize, plan: &AggregationPlan) -> Self {
        Self::empty_with(vec![Datum::Null; width.max(plan.min_width())], plan)
    }

    fn empty_with(template: Vec<Datum>, plan: &AggregationPlan) -> Self {
        let states = plan
            .plans
            .iter()
            .map(|p| match p {
                Plan::Count(_) => State::Count(0),
                Plan::Sum(_) => State::Sum(None),
                Plan::Max(_) => State::Max(None),
                Plan::Min(_) => State::Min(None),
                Plan::Avg { .. } => State::Avg { sum: None, count: 0 },
                Plan::Distinct { .. } => State::Distinct(DistinctValues::default()),
            })
            .collect();
        Self {
            template,
            plans: plan.plans.clone(),
            states,
        }
    }

    pub fn accumulate(&mut self, row: &[Datum]) {
        let value = |i: usize| row.get(i).unwrap_or(&Datum::Null);
        for (plan, state) in self.plans.iter().zip(self.states.iter_mut()) {
            match (plan, state) {
                (Plan::Count(i), State::Count(n)) => *n = n.saturating_add(partial_count(value(*i))),
                (Plan::Sum(i), State::Sum(acc)) => {
                    let v = value(*i);
                    if !v.is_null() {
                        *acc = Some(add(acc.take(), v));
                    }
                }
                (Plan::Max(i), State::Max(acc)) => keep_extremum(acc, value(*i), std::cmp::Ordering::Greater),
                (Plan::Min(i), State::Min(acc)) => keep_extremum(acc, value(*i), std::cmp::Ordering::Less),
                (Plan::Avg { sum, count, .. }, State::Avg { sum: s, count: n }) => {
                    let v = value(*sum);
                    if !v.is_null() {
                        *s = Some(add(s.take(), v));
                    }
                    *n = n.saturating_add(partial_count(value(*count)));
                }
                (Plan::Distinct { index, .. }, State::Distinct(set)) => set.insert(value(*index)),
                _ => {}
            }
        }
    }

    /// The merged output row.
    pub fn finish(self) -> Vec<Datum> {
        let mut row = self.template;
        let mut put = |i: usize, d: Datum| {
            if let Some(slot) = row.get_mut(i) {
                *slot = d;
            }
        };
        for (plan, state) in self.plans.into_iter().zip(self.states) {
            match (plan, state) {
                (Plan::Count(i), State::Count(n)) => put(i, Datum::Int64(n)),
                (Plan::Sum(i), State::Sum(acc))
                | (Plan::Max(i), State::Max(acc))
                | (Plan::Min(i), State::Min(acc)) => put(i, acc.unwrap_or(Datum::Null)),
                (Plan::Avg { index, sum, count }, State::Avg { sum: s, count: n }) => {
                    put(index, s.as_ref().map_or(Datum::Null, |s| average(s, n)));
                    put(sum, s.unwrap_or(Datum::Null));
                    put(count, Datum::Int64(n));
                }
                (Plan::Distinct { kind, index }, State::Distinct(set)) => {
                    let out = match kind {
                        AggregationKind::CountDistinct => Datum::Int64(set.values.len() as i64),
                        AggregationKind::SumDistinct => set.sum().unwrap_or(Datum::Null),
                        _ => set
                            .sum()
                            .map_or(Datum::Null, |s| average(&s, set.values.len() as i64)),
                    };
                    put(index, out);
                }
                _ => {}
            }
        }
        row
    }
}

fn partial_count(d: &Datum) -> i64 {
    match d {
        Datum::Null => 0,
        other => other
            .as_i64()
            .or_else(|| other.convert_to(DataType::Int64).and_then(|c| c.as_i64()))
            .unwrap_or(0),
    }
}

/// SUM step. Integer overflow widens to Float64; incomparable input keeps
/// the running sum.
fn add(acc: Option<Datum>, v: &Datum) -> Datum {
    match acc {
        None => v.clone(),
        Some(a) => a
            .add(v)
            .or_else(|| Some(Datum::Float64(a.as_f64()? + v.as_f64()?)))
            .unwrap_or(a),
    }
}

fn keep_extremum(acc: &mut Option<Datum>, v: &Datum, wins: std::cmp::Ordering) {
    if v.is_null() {
        return;
    }
    let replace = match acc {
        None => true,
        Some(cur) => v.compare(cur) == Some(wins),
    };
    if replace {
        *acc = Some(v.clone());
    }
}

/// `sum / count`: Float64 for float sums, otherwise a decimal rounded half-up
/// to [`AVG_SCALE`]. NULL for a zero count.
pub fn average(sum: &Datum, count: i64) -> Datum {
    if count == 0 {
        return Datum::Null;
    }
    let (mantissa, scale) = match sum {
        Datum::Float64(v) => return Datum::Float64(v / count as f64),
        Datum::Int32(v) => (*v as i128, 0u8),
        Datum::Int64(v) => (*v as i128, 0u8),
        Datum::Decimal(m, s) => (*m, *s),
        _ => return Datum::Null,
    };
    // One extra digit, then round.
    let Some(scaled) = AVG_SCALE
        .max(scale)
        .checked_add(1)
        .and_then(|target| 10i128.checked_pow((target - scale) as u32))
        .and_then(|p| mantissa.checked_mul(p))
    else {
        return Datum::Float64(sum.as_f64().unwrap_or(0.0) / count as f64);
    };
    let q = scaled / count as i128;
    let rounded = q / 10 + (q % 10).signum() * i128::from((q % 10).abs() >= 5);
    Datum::Decimal(rounded, AVG_SCALE.max(scale))
}

/// Encode the group-by columns of `row` into a binary key. Each datum is
/// prefixed with a type tag; numerics with an integral value share one tag
/// so `Int32(1)`, `Int64(1)` and `Decimal(10, 1)` land in one group.
pub fn encode_group_key(indexes: &[usize], row: &[Datum]) -> Vec<u8> {
    let mut key = Vec::with_capacity(indexes.len() * 17);
    for &i in indexes {
        encode_datum(&mut key, row.get(i).unwrap_or(&Datum::Null));
    }
    key
}

fn encode_decimal(key: &mut Vec<u8>, mantissa: i128, scale: u8) {
    let (m, s) = decimal_trim(mantissa, scale);
    if s == 0 {
        encode_integral(key, m);
    } else {
        key.push(10);
        key.push(s);
        key.extend_from_slice(&m.to_be_bytes());
    }
}

fn encode_datum(key: &mut Vec<u8>, datum: &Datum) {
    match datum {
        Datum::Null => key.push(0),
        Datum::Boolean(b) => {
            key.push(1);
            key.push(u8::from(*b));
        }
        Datum::Int32(v) => encode_integral(key, *v as i128),
        Datum::Int64(v) => encode_integral(key, *v as i128),
        // A float with an exact decimal rendering shares its key with that
        // decimal, so Float64(0.5) and Decimal(5, 1) group together.
        Datum::Float64(v) => match Datum::parse_decimal(&v.to_string()) {
            Some(Datum::Decimal(m, s)) if v.is_finite() => encode_decimal(key, m, s),
            _ => {
                key.push(4);
                key.extend_from_slice(&v.to_be_bytes());
            }
        },
        Datum::Decimal(m, s) => encode_decimal(key, *m, *s),
        Datum::Text(s) => {
            key.push(5);
            key.extend_from_slice(&(s.len() as u32).to_be_bytes());
            key.extend_from_slice(s.as_bytes());
        }
        Datum::Timestamp(v) => {
            key.push(6);
            key.extend_from_slice(&v.to_be_bytes());
        }
        Datum::Date(v) => {
            key.push(9);
            key.extend_from_slice(&v.to_be_bytes());
        }
        Datum::Time(us) => {
            key.push(11);
            key.extend_from_slice(&us.to_be_bytes());
        }
        Datum::Bytea(bytes) => {
            key.push(14);
            key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            key.extend_from_slice(bytes);
        }
    }
}

fn encode_integral(key: &mut Vec<u8>, v: i128) {
    key.push(2);
    key.extend_from_slice(&v.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_key_unifies_integer_widths() {
        let a = encode_group_key(&[0], &[Datum::Int32(1)]);
        let b = encode_group_key(&[0], &[Datum::Int64(1)]);
        let c = encode_group_key(&[0], &[Datum::Decimal(10, 1)]);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_ne!(a, encode_group_key(&[0], &[Datum::Text("1".into())]));
        assert_ne!(
            encode_group_key(&[0, 1], &[Datum::Text("ab".into()), Datum::Text("c".into())]),
            encode_group_key(&[0, 1], &[Datum::Text("a".into()), Datum::Text("bc".into())])
        );
    }

    #[test]
    fn test_avg_requires_derived_columns() {
        let mut item = AggregationItem::new(AggregationKind::Avg, "AVG(price)", 1);
        assert!(AggregationPlan::new(&[item.clone()]).is_err());
        item.derived = vec![AggregationItem::sum("s", 2), AggregationItem::count("c", 3)];
        assert!(AggregationPlan::new(&[item]).is_ok());

        let unresolved = AggregationItem {
            kind: AggregationKind::Count,
            expression: "COUNT(*)".into(),
            index: None,
            derived: vec![],
        };
        assert_eq!(
            AggregationPlan::new(&[unresolved]).unwrap_err(),
            BindingError::UnresolvedIndex {
                item: "aggregation",
                expression: "COUNT(*)".into(),
            }
        );
    }

    #[test]
    fn test_average_rounding() {
        assert_eq!(average(&Datum::Int64(70), 4), Datum::Decimal(175000, 4));
        // 10 / 3 = 3.33333 -> 3.3333
        assert_eq!(average(&Datum::Int64(10), 3), Datum::Decimal(33333, 4));
        // 2 / 3 = 0.66666 -> 0.6667
        assert_eq!(average(&Datum::Int64(2), 3), Datum::Decimal(6667, 4));
        assert_eq!(average(&Datum::Int64(-2), 3), Datum::Decimal(-6667, 4));
        assert_eq!(average(&Datum::Float64(5.0), 2), Datum::Float64(2.5));
        assert!(average(&Datum::Int64(5), 0).is_null());
    }

    #[test]
    fn test_accumulate_partials() {
        // columns: dept, count, sum, max, min, avg, avg_sum, avg_count
        let plan = AggregationPlan::new(&[
            AggregationItem::count("COUNT(*)", 1),
            AggregationItem::sum("SUM(x)", 2),
            AggregationItem::max("MAX(x)", 3),
            AggregationItem::min("MIN(x)", 4),
            AggregationItem::avg("AVG(x)", 5, 6, 7),
        ])
        .unwrap();
        let shard = |count: i64, sum: i64, max: i64, min: i64| {
            vec![
                Datum::Text("A".into()),
                Datum::Int64(count),
                Datum::Int64(sum),
                Datum::Int64(max),
                Datum::Int64(min),
                Datum::Decimal(0, 0),
                Datum::Int64(sum),
                Datum::Int64(count),
            ]
        };
        let mut acc = GroupAccumulator::new(shard(2, 30, 20, 10), &plan);
        acc.accumulate(&shard(3, 60, 40, 5));
        let row = acc.finish();
        assert_eq!(row[0], Datum::Text("A".into()));
        assert_eq!(row[1], Datum::Int64(5));
        assert_eq!(row[2], Datum::Int64(90));
        assert_eq!(row[3], Datum::Int64(40));
        assert_eq!(row[4], Datum::Int64(5));
        assert_eq!(row[5], Datum::Decimal(180000, 4));
        assert_eq!(row[6], Datum::Int64(90));
        assert_eq!(row[7], Datum::Int64(5));
    }

    #[test]
    fn test_distinct_variants() {
        let plan = AggregationPlan::new(&[
            AggregationItem::new(AggregationKind::CountDistinct, "COUNT(DISTINCT x)", 0),
            AggregationItem::new(AggregationKind::SumDistinct, "SUM(DISTINCT x)", 1),
            AggregationItem::new(AggregationKind::AvgDistinct, "AVG(DISTINCT x)", 2),
        ])
        .unwrap();
        let r = |v: Datum| vec![v.clone(), v.clone(), v];
        let mut acc = GroupAccumulator::new(r(Datum::Int64(1)), &plan);
        acc.accumulate(&r(Datum::Int32(1)));
        acc.accumulate(&r(Datum::Int64(2)));
        acc.accumulate(&r(Datum::Null));
        acc.accumulate(&r(Datum::Int64(2)));
        let row = acc.finish();
        assert_eq!(row[0], Datum::Int64(2));
        assert_eq!(row[1], Datum::Int64(3));
        assert_eq!(row[2], Datum::Decimal(15000, 4));
    }

    #[test]
    fn test_empty_aggregation_row() {
        let plan = AggregationPlan::new(&[
            AggregationItem::count("COUNT(*)", 0),
            AggregationItem::sum("SUM(x)", 1),
            AggregationItem::avg("AVG(x)", 2, 3, 4),
        ])
        .unwrap();
        let row = GroupAccumulator::empty(0, &plan).finish();
        assert_eq!(row.len(), 5);
        assert_eq!(row[0], Datum::Int64(0));
        assert!(row[1].is_null());
        assert!(row[2].is_null());
        assert!(row[3].is_null());
        assert_eq!(row[4], Datum::Int64(0));
    }

    #[test]
    fn test_sum_ignores_nulls_and_widens_on_overflow() {
        let plan = AggregationPlan::new(&[AggregationItem::sum("SUM(x)", 0)]).unwrap();
        let mut acc = GroupAccumulator::new(vec![Datum::Null], &plan);
        assert!(acc.clone().finish()[0].is_null());
        acc.accumulate(&[Datum::Int64(i64::MAX)]);
        acc.accumulate(&[Datum::Int64(1)]);
        assert!(matches!(acc.finish()[0], Datum::Float64(_)));
    }

    #[test]
    fn test_group_key_unifies_fractional_float_and_decimal() {
        let half = encode_group_key(&[0], &[Datum::Float64(0.5)]);
        assert_eq!(half, encode_group_key(&[0], &[Datum::Decimal(5, 1)]));
        assert_eq!(half, encode_group_key(&[0], &[Datum::Decimal(500, 3)]));
        assert_eq!(
            encode_group_key(&[0], &[Datum::Float64(1e20)]),
            encode_group_key(&[0], &[Datum::Decimal(100_000_000_000_000_000_000, 0)])
        );
        assert_ne!(half, encode_group_key(&[0], &[Datum::Float64(0.25)]));
        assert_ne!(
            encode_group_key(&[0], &[Datum::Float64(f64::NAN)]),
            encode_group_key(&[0], &[Datum::Float64(f64::INFINITY)])
        );
    }

    #[test]
    fn test_count_distinct_across_float_and_decimal() {
        let plan = AggregationPlan::new(&[AggregationItem::new(
            AggregationKind::CountDistinct,
            "COUNT(DISTINCT x)",
            0,
        )])
        .unwrap();
        let mut acc = GroupAccumulator::new(vec![Datum::Float64(0.5)], &plan);
        acc.accumulate(&[Datum::Decimal(5, 1)]);
        acc.accumulate(&[Datum::Decimal(50, 2)]);
        acc.accumulate(&[Datum::Float64(1.5)]);
        assert_eq!(acc.finish()[0], Datum::Int64(2));
    }

    #[test]
    fn test_sum_of_wide_decimals_widens() {
        let plan = AggregationPlan::new(&[AggregationItem::sum("SUM(x)", 0)]).unwrap();
        let mut acc = GroupAccumulator::new(vec![Datum::Decimal(i128::MAX, 2)], &plan);
        acc.accumulate(&[Datum::Decimal(1, 2)]);
        assert!(matches!(acc.finish()[0], Datum::Float64(_)));
    }

    #[test]
    fn test_average_of_maximal_scale() {
        assert!(matches!(average(&Datum::Decimal(1, u8::MAX), 1), Datum::Float64(_)));
    }
}
