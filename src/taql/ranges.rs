//! Interval sets extracted from row predicates.
//!
//! A predicate built only from comparisons of a column with constants,
//! `IN` sets of constants, `AND` and `OR` is equivalent to a set of
//! intervals per column. Selection can then read each column once and
//! test interval membership instead of evaluating the expression per row.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::expr::{Expr, ExprKind, InSet, NodeId, SetElement};
use super::syntax::BinaryOp;
use super::value::{Scalar, Value};

/// Interval of scalar values; a missing bound is unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub start: Option<Scalar>,
    pub end: Option<Scalar>,
    pub left_closed: bool,
    pub right_closed: bool,
}

impl Interval {
    pub fn point(value: Scalar) -> Self {
        Self {
            start: Some(value.clone()),
            end: Some(value),
            left_closed: true,
            right_closed: true,
        }
    }

    pub fn above(value: Scalar, closed: bool) -> Self {
        Self {
            start: Some(value),
            end: None,
            left_closed: closed,
            right_closed: false,
        }
    }

    pub fn below(value: Scalar, closed: bool) -> Self {
        Self {
            start: None,
            end: Some(value),
            left_closed: false,
            right_closed: closed,
        }
    }

    pub fn contains(&self, s: &Scalar) -> bool {
        let above = self.start.as_ref().map_or(true, |b| match s.compare(b) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => self.left_closed,
            _ => false,
        });
        above
            && self.end.as_ref().map_or(true, |b| match s.compare(b) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => self.right_closed,
                _ => false,
            })
    }

    fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Some(a), Some(b)) => match a.total_cmp(b) {
                Ordering::Greater => true,
                Ordering::Equal => !(self.left_closed && self.right_closed),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    /// Intersection; `None` when empty.
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let (start, left_closed) = match (&self.start, &other.start) {
            (None, _) => (other.start.clone(), other.left_closed),
            (_, None) => (self.start.clone(), self.left_closed),
            (Some(a), Some(b)) => match a.total_cmp(b) {
                Ordering::Greater => (Some(a.clone()), self.left_closed),
                Ordering::Less => (Some(b.clone()), other.left_closed),
                Ordering::Equal => (Some(a.clone()), self.left_closed && other.left_closed),
            },
        };
        let (end, right_closed) = match (&self.end, &other.end) {
            (None, _) => (other.end.clone(), other.right_closed),
            (_, None) => (self.end.clone(), self.right_closed),
            (Some(a), Some(b)) => match a.total_cmp(b) {
                Ordering::Less => (Some(a.clone()), self.right_closed),
                Ordering::Greater => (Some(b.clone()), other.right_closed),
                Ordering::Equal => (Some(a.clone()), self.right_closed && other.right_closed),
            },
        };
        let out = Interval {
            start,
            end,
            left_closed,
            right_closed,
        };
        (!out.is_empty()).then_some(out)
    }
}

/// Union of intervals per column; a row matches when every column's value
/// lies in one of its intervals.
pub type ColumnRanges = BTreeMap<String, Vec<Interval>>;

/// Test a value against a union of intervals.
pub fn in_ranges(intervals: &[Interval], value: &Scalar) -> bool {
    intervals.iter().any(|i| i.contains(value))
}

/// Interval sets equivalent to the whole predicate, or `None` when some
/// part of it is not a column/constant comparison.
pub fn ranges(expr: &Expr) -> Option<ColumnRanges> {
    extract(expr, expr.root())
}

fn extract(expr: &Expr, id: NodeId) -> Option<ColumnRanges> {
    match &expr.node(id).kind {
        ExprKind::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            let mut l = extract(expr, *left)?;
            for (column, r) in extract(expr, *right)? {
                let merged = match l.remove(&column) {
                    Some(existing) => intersect_unions(&existing, &r),
                    None => r,
                };
                l.insert(column, merged);
            }
            Some(l)
        }
        ExprKind::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => {
            let mut l = extract(expr, *left)?;
            let r = extract(expr, *right)?;
            // Only a disjunction on one and the same column stays a range.
            if l.len() != 1 || r.len() != 1 {
                return None;
            }
            let (column, r) = r.into_iter().next()?;
            l.get_mut(&column)?.extend(r);
            Some(l)
        }
        ExprKind::Binary { op, left, right } if op.is_comparison() => {
            let (column, value, op) = match (column_of(expr, *left), constant_of(expr, *right)) {
                (Some(c), Some(v)) => (c, v, *op),
                _ => (
                    column_of(expr, *right)?,
                    constant_of(expr, *left)?,
                    mirror(*op),
                ),
            };
            let intervals = match op {
                BinaryOp::Eq => vec![Interval::point(value)],
                BinaryOp::Ne => vec![
                    Interval::below(value.clone(), false),
                    Interval::above(value, false),
                ],
                BinaryOp::Gt => vec![Interval::above(value, false)],
                BinaryOp::Ge => vec![Interval::above(value, true)],
                BinaryOp::Lt => vec![Interval::below(value, false)],
                _ => vec![Interval::below(value, true)],
            };
            Some(BTreeMap::from([(column, intervals)]))
        }
        ExprKind::In {
            value,
            set: InSet::Elements(elements),
        } => {
            let column = column_of(expr, *value)?;
            let mut intervals = Vec::with_capacity(elements.len());
            for e in elements {
                match e {
                    SetElement::Value(id) => match expr.node(*id).kind {
                        ExprKind::Const(Value::Array(ref a)) => {
                            intervals.extend(a.data().iter().cloned().map(Interval::point))
                        }
                        _ => intervals.push(Interval::point(constant_of(expr, *id)?)),
                    },
                    SetElement::Interval {
                        start,
                        end,
                        left_closed,
                        right_closed,
                    } => {
                        let bound = |b: &Option<NodeId>| match b {
                            Some(id) => constant_of(expr, *id).map(Some),
                            None => Some(None),
                        };
                        intervals.push(Interval {
                            start: bound(start)?,
                            end: bound(end)?,
                            left_closed: *left_closed,
                            right_closed: *right_closed,
                        });
                    }
                    SetElement::Stepped { .. } => return None,
                }
            }
            Some(BTreeMap::from([(column, intervals)]))
        }
        _ => None,
    }
}

fn intersect_unions(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    a.iter()
        .flat_map(|x| b.iter().filter_map(move |y| x.intersect(y)))
        .collect()
}

/// `c op x` rewritten as `x op' c`.
fn mirror(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Ge => BinaryOp::Le,
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Le => BinaryOp::Ge,
        other => other,
    }
}

/// Scalar column, looking through a type conversion.
fn column_of(expr: &Expr, id: NodeId) -> Option<String> {
    let node = expr.node(id);
    match &node.kind {
        ExprKind::Column { name } if !node.is_array => Some(name.clone()),
        ExprKind::Convert { child, .. } => column_of(expr, *child),
        _ => None,
    }
}

fn constant_of(expr: &Expr, id: NodeId) -> Option<Scalar> {
    match &expr.node(id).kind {
        ExprKind::Const(Value::Scalar(s)) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Scalar {
        Scalar::Int(v)
    }

    #[test]
    fn test_interval_membership() {
        let i = Interval {
            start: Some(int(1)),
            end: Some(int(5)),
            left_closed: true,
            right_closed: false,
        };
        assert!(i.contains(&int(1)));
        assert!(i.contains(&Scalar::Double(4.5)));
        assert!(!i.contains(&int(5)));
        assert!(!i.contains(&int(0)));
        assert!(!Interval::above(int(0), true).contains(&Scalar::Double(f64::NAN)));
        assert!(Interval::above(Scalar::Double(0.0), true).contains(&Scalar::Double(-0.0)));
    }

    #[test]
    fn test_intersection() {
        let a = Interval::above(int(2), false);
        let b = Interval::below(int(4), true);
        let both = a.intersect(&b).unwrap();
        assert!(!both.contains(&int(2)));
        assert!(both.contains(&int(3)));
        assert!(both.contains(&int(4)));
        assert!(Interval::above(int(4), false)
            .intersect(&Interval::below(int(4), true))
            .is_none());
        assert!(Interval::point(int(4))
            .intersect(&Interval::below(int(4), true))
            .is_some());
    }

    #[test]
    fn test_union_membership() {
        let set = vec![Interval::point(int(1)), Interval::above(int(10), true)];
        assert!(in_ranges(&set, &int(1)));
        assert!(in_ranges(&set, &int(12)));
        assert!(!in_ranges(&set, &int(5)));
    }
}
