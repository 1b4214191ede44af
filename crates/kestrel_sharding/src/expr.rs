//! Bound predicate tree handed over by the binder, and its expansion into
//! AND-groups.

use std::fmt;

use kestrel_common::datum::Datum;

use crate::column::Column;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// The operator that keeps the meaning when the operands are swapped
    /// (`5 < id` is `id > 5`).
    pub fn mirror(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        f.write_str(s)
    }
}

/// `CURRENT_TIMESTAMP` / `NOW()`, `CURRENT_DATE`, `CURRENT_TIME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurrentTimeKind {
    Timestamp,
    Date,
    Time,
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(Column),
    Literal(Datum),
    /// 0-based position in the statement's parameter list.
    Parameter(usize),
    CurrentTime(CurrentTimeKind),
    /// Anything the binder could not reduce to the above (function call,
    /// arithmetic, subquery). Never yields a routing value.
    Expression(String),
}

impl Operand {
    pub fn column(name: &str, table_name: &str) -> Self {
        Operand::Column(Column::new(name, table_name))
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Operand::Column(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Datum> for Operand {
    fn from(d: Datum) -> Self {
        Operand::Literal(d)
    }
}

impl From<Column> for Operand {
    fn from(c: Column) -> Self {
        Operand::Column(c)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Between {
        expr: Operand,
        low: Operand,
        high: Operand,
        negated: bool,
    },
    InList {
        expr: Operand,
        list: Vec<Operand>,
        negated: bool,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// A predicate shape that cannot constrain routing (EXISTS, LIKE, ...).
    Opaque,
}

impl Predicate {
    pub fn compare(left: impl Into<Operand>, op: CompareOp, right: impl Into<Operand>) -> Self {
        Predicate::Compare {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    pub fn eq(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::compare(left, CompareOp::Eq, right)
    }

    pub fn between(expr: impl Into<Operand>, low: impl Into<Operand>, high: impl Into<Operand>) -> Self {
        Predicate::Between {
            expr: expr.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    pub fn in_list(expr: impl Into<Operand>, list: Vec<Operand>) -> Self {
        Predicate::InList {
            expr: expr.into(),
            list,
            negated: false,
        }
    }

    /// Distribute OR over AND and return the resulting conjunctions of atoms
    /// (comparison, BETWEEN, IN, NOT and opaque leaves). `None` when more than
    /// `max_groups` groups would be produced.
    pub fn and_groups(&self, max_groups: usize) -> Option<Vec<Vec<&Predicate>>> {
        let groups = expand(self, max_groups)?;
        (groups.len() <= max_groups).then_some(groups)
    }
}

fn expand(predicate: &Predicate, max_groups: usize) -> Option<Vec<Vec<&Predicate>>> {
    match predicate {
        Predicate::And(children) => {
            let mut groups: Vec<Vec<&Predicate>> = vec![Vec::new()];
            for child in children {
                let child_groups = expand(child, max_groups)?;
                if groups.len().saturating_mul(child_groups.len()) > max_groups {
                    return None;
                }
                let mut product = Vec::with_capacity(groups.len() * child_groups.len());
                for group in &groups {
                    for child_group in &child_groups {
                        let mut merged = group.clone();
                        merged.extend(child_group.iter().copied());
                        product.push(merged);
                    }
                }
                groups = product;
            }
            Some(groups)
        }
        Predicate::Or(children) if children.is_empty() => Some(vec![Vec::new()]),
        Predicate::Or(children) => {
            let mut groups = Vec::new();
            for child in children {
                groups.extend(expand(child, max_groups)?);
                if groups.len() > max_groups {
                    return None;
                }
            }
            Some(groups)
        }
        atom => Some(vec![vec![atom]]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Operand {
        Operand::column("id", "t")
    }

    fn id_eq(v: i64) -> Predicate {
        Predicate::eq(id(), Datum::Int64(v))
    }

    #[test]
    fn test_atom_is_single_group() {
        let p = id_eq(1);
        let groups = p.and_groups(8).unwrap();
        assert_eq!(groups, vec![vec![&p]]);
    }

    #[test]
    fn test_or_of_ands() {
        // (a AND b) OR c
        let p = Predicate::Or(vec![Predicate::And(vec![id_eq(1), id_eq(2)]), id_eq(3)]);
        let groups = p.and_groups(8).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1], vec![&id_eq(3)]);
    }

    #[test]
    fn test_and_distributes_over_or() {
        // (a OR b) AND (c OR d) -> 4 groups
        let p = Predicate::And(vec![
            Predicate::Or(vec![id_eq(1), id_eq(2)]),
            Predicate::Or(vec![id_eq(3), id_eq(4)]),
        ]);
        let groups = p.and_groups(8).unwrap();
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0], vec![&id_eq(1), &id_eq(3)]);
        assert_eq!(groups[3], vec![&id_eq(2), &id_eq(4)]);
    }

    #[test]
    fn test_overflow_gives_up() {
        let disjunction = || Predicate::Or(vec![id_eq(1), id_eq(2)]);
        let p = Predicate::And(vec![disjunction(), disjunction(), disjunction()]);
        assert!(p.and_groups(8).is_some());
        assert!(p.and_groups(7).is_none());
    }

    #[test]
    fn test_not_is_a_leaf() {
        let p = Predicate::Not(Box::new(Predicate::Or(vec![id_eq(1), id_eq(2)])));
        assert_eq!(p.and_groups(4).unwrap().len(), 1);
    }

    #[test]
    fn test_mirror() {
        assert_eq!(CompareOp::Lt.mirror(), CompareOp::Gt);
        assert_eq!(CompareOp::GtEq.mirror(), CompareOp::LtEq);
        assert_eq!(CompareOp::Eq.mirror(), CompareOp::Eq);
    }
}
