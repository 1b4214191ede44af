//! ORDER BY / GROUP BY items and the row comparator built from them.

use std::cmp::Ordering;

use kestrel_common::datum::Datum;
use kestrel_common::error::BindingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullOrdering {
    First,
    Last,
}

impl OrderDirection {
    /// NULL sorts as the smallest value: first ascending, last descending.
    pub fn default_null_ordering(self) -> NullOrdering {
        match self {
            OrderDirection::Asc => NullOrdering::First,
            OrderDirection::Desc => NullOrdering::Last,
        }
    }
}

/// One ORDER BY or GROUP BY item. `index` is the 0-based result column the
/// expression was resolved to; it must be set before a merger is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderByItem {
    pub expression: String,
    pub direction: OrderDirection,
    pub null_ordering: NullOrdering,
    pub index: Option<usize>,
}

/// GROUP BY items carry the same information as ORDER BY items.
pub type GroupByItem = OrderByItem;

impl OrderByItem {
    pub fn new(expression: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            expression: expression.into(),
            direction,
            null_ordering: direction.default_null_ordering(),
            index: None,
        }
    }

    pub fn asc(expression: impl Into<String>, index: usize) -> Self {
        Self::new(expression, OrderDirection::Asc).with_index(index)
    }

    pub fn desc(expression: impl Into<String>, index: usize) -> Self {
        Self::new(expression, OrderDirection::Desc).with_index(index)
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_null_ordering(mut self, null_ordering: NullOrdering) -> Self {
        self.null_ordering = null_ordering;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SortKey {
    index: usize,
    direction: OrderDirection,
    null_ordering: NullOrdering,
}

/// Multi-key comparator, built once per merge from resolved items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowComparator {
    keys: Vec<SortKey>,
}

impl RowComparator {
    /// `clause` ("ORDER BY" / "GROUP BY") names the items in errors.
    pub fn new(items: &[OrderByItem], clause: &'static str) -> Result<Self, BindingError> {
        let keys = items
            .iter()
            .map(|item| {
                let index = item.index.ok_or_else(|| BindingError::UnresolvedIndex {
                    item: clause,
                    expression: item.expression.clone(),
                })?;
                Ok(SortKey {
                    index,
                    direction: item.direction,
                    null_ordering: item.null_ordering,
                })
            })
            .collect::<Result<Vec<_>, BindingError>>()?;
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Column indexes of the sort keys, in key order.
    pub fn indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.keys.iter().map(|k| k.index)
    }

    /// Compare two full rows.
    pub fn compare_rows(&self, a: &[Datum], b: &[Datum]) -> Ordering {
        for key in &self.keys {
            let ord = compare_key(key, a.get(key.index), b.get(key.index));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compare two already extracted key vectors (see [`RowComparator::indexes`]).
    pub fn compare_keys(&self, a: &[Datum], b: &[Datum]) -> Ordering {
        for (i, key) in self.keys.iter().enumerate() {
            let ord = compare_key(key, a.get(i), b.get(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn compare_key(key: &SortKey, a: Option<&Datum>, b: Option<&Datum>) -> Ordering {
    let a_null = a.map_or(true, Datum::is_null);
    let b_null = b.map_or(true, Datum::is_null);
    match (a_null, b_null) {
        (true, true) => Ordering::Equal,
        (true, false) => match key.null_ordering {
            NullOrdering::First => Ordering::Less,
            NullOrdering::Last => Ordering::Greater,
        },
        (false, true) => match key.null_ordering {
            NullOrdering::First => Ordering::Greater,
            NullOrdering::Last => Ordering::Less,
        },
        (false, false) => {
            let ord = match (a, b) {
                (Some(a), Some(b)) => a.cmp(b),
                _ => Ordering::Equal,
            };
            match key.direction {
                OrderDirection::Asc => ord,
                OrderDirection::Desc => ord.reverse(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[Datum]) -> Vec<Datum> {
        values.to_vec()
    }

    #[test]
    fn test_unresolved_index() {
        let err = RowComparator::new(&[OrderByItem::new("price", OrderDirection::Asc)], "ORDER BY").unwrap_err();
        assert_eq!(
            err,
            BindingError::UnresolvedIndex {
                item: "ORDER BY",
                expression: "price".into(),
            }
        );
    }

    #[test]
    fn test_multi_key_with_direction() {
        let cmp = RowComparator::new(&[OrderByItem::asc("dept", 0), OrderByItem::desc("salary", 1)], "ORDER BY")
            .unwrap();
        let a = row(&[Datum::Text("a".into()), Datum::Int64(10)]);
        let b = row(&[Datum::Text("a".into()), Datum::Int32(20)]);
        let c = row(&[Datum::Text("b".into()), Datum::Int64(99)]);
        assert_eq!(cmp.compare_rows(&a, &b), Ordering::Greater);
        assert_eq!(cmp.compare_rows(&b, &c), Ordering::Less);
        assert_eq!(cmp.compare_rows(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_default_null_ordering() {
        let asc = RowComparator::new(&[OrderByItem::asc("x", 0)], "ORDER BY").unwrap();
        let desc = RowComparator::new(&[OrderByItem::desc("x", 0)], "ORDER BY").unwrap();
        let null = row(&[Datum::Null]);
        let one = row(&[Datum::Int64(1)]);
        assert_eq!(asc.compare_rows(&null, &one), Ordering::Less);
        assert_eq!(desc.compare_rows(&null, &one), Ordering::Greater);
    }

    #[test]
    fn test_explicit_nulls_last_ascending() {
        let cmp = RowComparator::new(
            &[OrderByItem::asc("x", 0).with_null_ordering(NullOrdering::Last)],
            "ORDER BY",
        )
        .unwrap();
        assert_eq!(cmp.compare_rows(&[Datum::Null], &[Datum::Int64(1)]), Ordering::Greater);
    }

    #[test]
    fn test_compare_keys_uses_key_positions() {
        let cmp = RowComparator::new(&[OrderByItem::desc("b", 3)], "ORDER BY").unwrap();
        assert_eq!(cmp.indexes().collect::<Vec<_>>(), vec![3]);
        assert_eq!(cmp.compare_keys(&[Datum::Int64(1)], &[Datum::Int64(2)]), Ordering::Greater);
    }
}
