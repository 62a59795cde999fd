//! Pull-based evaluation of compiled expressions.
//!
//! Evaluating a node for a row evaluates its children for that same row.
//! Column reads over many rows go through [`Evaluator::evaluate_column`],
//! which fetches bare column references in bulk; group aggregates read
//! their argument over all rows of the group.

use std::cell::OnceCell;
use std::cmp::Ordering;

use num_complex::Complex64;

use crate::array::{Array, Shape, Slicer};
use crate::common::{Error, Result};
use crate::table::Table;

use super::expr::{Expr, ExprKind, ExprNode, IndexPart, InSet, NodeId, SetElement};
use super::function::{Aggregate, Function};
use super::reduce::{partial, reduce, window};
use super::syntax::{BinaryOp, UnaryOp};
use super::value::{Scalar, Value};

/// Evaluates one expression against an optional table.
pub struct Evaluator<'a> {
    nodes: &'a [ExprNode],
    root: NodeId,
    table: Option<&'a Table>,
    /// Root row numbers, read on first use of `rowid()`.
    root_rows: OnceCell<Vec<u64>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(expr: &'a Expr, table: Option<&'a Table>) -> Self {
        Self::over(expr.nodes(), expr.root(), table)
    }

    pub(crate) fn over(nodes: &'a [ExprNode], root: NodeId, table: Option<&'a Table>) -> Self {
        Self {
            nodes,
            root,
            table,
            root_rows: OnceCell::new(),
        }
    }

    fn node(&self, id: NodeId) -> &'a ExprNode {
        &self.nodes[id.index()]
    }

    /// Value of the expression at `row` (a row number of the table).
    pub fn evaluate(&self, row: u64) -> Result<Value> {
        self.eval(self.root, row, None)
    }

    /// Value for a group of rows: aggregates reduce over `rows`, anything
    /// else is taken at the first row.
    pub fn evaluate_group(&self, rows: &[u64]) -> Result<Value> {
        let first = rows.first().copied().unwrap_or(0);
        self.eval(self.root, first, Some(rows))
    }

    /// Scalar Bool result at `row`.
    pub fn evaluate_bool(&self, row: u64) -> Result<bool> {
        match self.evaluate(row)? {
            Value::Scalar(s) => s.as_bool(),
            Value::Array(a) => Err(Error::TypeMismatch(format!(
                "condition is an array of shape {}, not a scalar Bool",
                a.shape()
            ))),
        }
    }

    /// Values at many rows.
    pub fn evaluate_column(&self, rows: &[u64]) -> Result<Vec<Value>> {
        self.bulk(self.root, rows)
    }

    fn table(&self) -> Result<&'a Table> {
        self.table
            .ok_or_else(|| Error::InvalidOperation("expression needs a table".into()))
    }

    /// Bulk evaluation: columns are read in one call, elementwise operators
    /// combine the bulk results, everything else falls back to row by row.
    fn bulk(&self, id: NodeId, rows: &[u64]) -> Result<Vec<Value>> {
        let node = self.node(id);
        match &node.kind {
            ExprKind::Const(v) => Ok(vec![v.clone(); rows.len()]),
            ExprKind::Column { name } if !node.is_array => Ok(self
                .table()?
                .get_cells(name, rows)?
                .iter()
                .map(Value::from_cell)
                .collect()),
            ExprKind::Convert { child, to } => self
                .bulk(*child, rows)?
                .iter()
                .map(|v| v.map(|s| s.convert(*to)))
                .collect(),
            ExprKind::Binary { op, left, right }
                if !matches!(op, BinaryOp::And | BinaryOp::Or) =>
            {
                let l = self.bulk(*left, rows)?;
                let r = self.bulk(*right, rows)?;
                l.iter()
                    .zip(&r)
                    .map(|(a, b)| a.zip(b, |x, y| binary(*op, x, y)))
                    .collect()
            }
            _ => rows.iter().map(|&row| self.eval(id, row, None)).collect(),
        }
    }

    fn eval(&self, id: NodeId, row: u64, group: Option<&[u64]>) -> Result<Value> {
        let node = self.node(id);
        match &node.kind {
            ExprKind::Const(v) => Ok(v.clone()),
            ExprKind::Column { name } => {
                let table = self.table()?;
                if node.is_array {
                    Value::from_array_cell(&table.get_array(name, row)?)
                } else {
                    Ok(Value::from_cell(&table.get_cell(name, row)?))
                }
            }
            ExprKind::Convert { child, to } => {
                self.eval(*child, row, group)?.map(|s| s.convert(*to))
            }
            ExprKind::Unary { op, child } => {
                let v = self.eval(*child, row, group)?;
                v.map(|s| unary(*op, s))
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval(*left, row, group)?;
                // Scalar AND/OR short-circuit.
                if let (BinaryOp::And | BinaryOp::Or, Value::Scalar(Scalar::Bool(b))) = (op, &l) {
                    if (*op == BinaryOp::And) != *b {
                        return Ok(Scalar::Bool(*b).into());
                    }
                }
                let r = self.eval(*right, row, group)?;
                l.zip(&r, |x, y| binary(*op, x, y))
            }
            ExprKind::In { value, set } => {
                let v = self.eval(*value, row, group)?;
                match set {
                    InSet::Array(id) => {
                        let members = self.eval(*id, row, group)?;
                        let members = members.elements();
                        v.map(|s| {
                            Ok(Scalar::Bool(
                                members.iter().any(|m| s.compare(m) == Some(Ordering::Equal)),
                            ))
                        })
                    }
                    InSet::Elements(elements) => {
                        let resolved = self.resolve_set(elements, row, group)?;
                        v.map(|s| Ok(Scalar::Bool(resolved.iter().any(|e| e.contains(s)))))
                    }
                }
            }
            ExprKind::Match {
                child,
                regex,
                negate,
                ignore_blanks,
            } => self.eval(*child, row, group)?.map(|s| {
                let text = s.as_str()?;
                let hit = if *ignore_blanks {
                    let squeezed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                    regex.is_match(&squeezed)
                } else {
                    regex.is_match(text)
                };
                Ok(Scalar::Bool(hit != *negate))
            }),
            ExprKind::Index { array, parts } => {
                let value = self.eval(*array, row, group)?;
                self.index(value, parts, row, group)
            }
            ExprKind::ArrayLiteral(ids) => {
                let values = ids
                    .iter()
                    .map(|id| self.eval(*id, row, group))
                    .collect::<Result<Vec<_>>>()?;
                stack(values)
            }
            ExprKind::Func { func, args } => {
                let values = args
                    .iter()
                    .map(|id| self.eval(*id, row, group))
                    .collect::<Result<Vec<_>>>()?;
                if func.is_elementwise() {
                    broadcast(*func, &values)
                } else {
                    func.apply_values(&values)
                }
            }
            ExprKind::Reduce {
                reduction,
                arg,
                fraction,
            } => {
                let v = self.eval(*arg, row, group)?;
                let f = self.fraction(*fraction, row, group)?;
                Ok(reduce(*reduction, v.elements(), f)?.into())
            }
            ExprKind::Partial {
                reduction,
                arg,
                axes,
                fraction,
            } => {
                let v = self.eval(*arg, row, group)?.into_array();
                let axes = self.usizes(*axes, row, group, "axis")?;
                let f = self.fraction(*fraction, row, group)?;
                partial(*reduction, &v, &axes, f)
            }
            ExprKind::Window {
                reduction,
                arg,
                width,
                running,
                fraction,
            } => {
                let v = self.eval(*arg, row, group)?.into_array();
                let widths = self.usizes(*width, row, group, "window width")?;
                let f = self.fraction(*fraction, row, group)?;
                window(*reduction, &v, &widths, *running, f)
            }
            ExprKind::Aggregate {
                aggregate,
                arg,
                fraction,
            } => {
                let rows: Vec<u64> = match group {
                    Some(g) => g.to_vec(),
                    None => vec![row],
                };
                self.aggregate(*aggregate, *arg, *fraction, &rows)
            }
            ExprKind::RowNumber => Ok(Scalar::Int(row as i64).into()),
            ExprKind::RowId => {
                let id = match self.table {
                    Some(table) => {
                        let rows = self.root_rows.get_or_init(|| table.row_numbers());
                        *rows.get(row as usize).ok_or_else(|| {
                            Error::out_of_range("row", row, rows.len() as u64)
                        })?
                    }
                    None => row,
                };
                Ok(Scalar::Int(id as i64).into())
            }
            ExprKind::IsDefined { column } => {
                Ok(Scalar::Bool(self.table()?.is_defined(column, row)?).into())
            }
        }
    }

    fn fraction(&self, id: Option<NodeId>, row: u64, group: Option<&[u64]>) -> Result<Option<f64>> {
        match id {
            Some(id) => Ok(Some(self.eval(id, row, group)?.as_scalar()?.as_f64()?)),
            None => Ok(None),
        }
    }

    fn usizes(&self, id: NodeId, row: u64, group: Option<&[u64]>, what: &str) -> Result<Vec<usize>> {
        self.eval(id, row, group)?
            .elements()
            .iter()
            .map(|s| {
                let v = s.as_int()?;
                usize::try_from(v)
                    .map_err(|_| Error::InvalidOperation(format!("negative {} {}", what, v)))
            })
            .collect()
    }

    fn aggregate(
        &self,
        aggregate: Aggregate,
        arg: Option<NodeId>,
        fraction: Option<NodeId>,
        rows: &[u64],
    ) -> Result<Value> {
        let first = rows.first().copied().unwrap_or(0);
        match aggregate {
            Aggregate::Count => Ok(Scalar::Int(rows.len() as i64).into()),
            Aggregate::First | Aggregate::Last => {
                let row = if aggregate == Aggregate::First {
                    first
                } else {
                    rows.last().copied().unwrap_or(0)
                };
                let arg = arg.ok_or_else(|| Error::internal("aggregate without argument"))?;
                self.eval(arg, row, None)
            }
            Aggregate::Of(reduction) => {
                let arg = arg.ok_or_else(|| Error::internal("aggregate without argument"))?;
                let mut elements = Vec::new();
                for value in self.bulk(arg, rows)? {
                    elements.extend(value.elements().iter().cloned());
                }
                let f = self.fraction(fraction, first, None)?;
                Ok(reduce(reduction, &elements, f)?.into())
            }
        }
    }

    fn resolve_set(
        &self,
        elements: &[SetElement],
        row: u64,
        group: Option<&[u64]>,
    ) -> Result<Vec<Member>> {
        let mut out = Vec::with_capacity(elements.len());
        for e in elements {
            match e {
                SetElement::Value(id) => {
                    for s in self.eval(*id, row, group)?.elements() {
                        out.push(Member::Value(s.clone()));
                    }
                }
                SetElement::Interval {
                    start,
                    end,
                    left_closed,
                    right_closed,
                } => {
                    let bound = |id: &Option<NodeId>| -> Result<Option<Scalar>> {
                        match id {
                            Some(id) => Ok(Some(self.eval(*id, row, group)?.into_scalar()?)),
                            None => Ok(None),
                        }
                    };
                    out.push(Member::Interval {
                        start: bound(start)?,
                        end: bound(end)?,
                        left_closed: *left_closed,
                        right_closed: *right_closed,
                    });
                }
                SetElement::Stepped { start, end, incr } => {
                    let scalar = |id: NodeId| self.eval(id, row, group)?.into_scalar();
                    let (start, end, incr) = (scalar(*start)?, scalar(*end)?, scalar(*incr)?);
                    match (start, end, incr) {
                        (Scalar::Int(start), Scalar::Int(end), Scalar::Int(incr)) => {
                            let step = usize::try_from(incr)
                                .ok()
                                .filter(|&s| s > 0)
                                .ok_or_else(|| bad_step(incr as f64))?;
                            out.extend((start..end).step_by(step).map(|v| Member::Value(Scalar::Int(v))));
                        }
                        (start, end, incr) => {
                            let (start, end, incr) = (start.as_f64()?, end.as_f64()?, incr.as_f64()?);
                            if incr.is_nan() || incr <= 0.0 {
                                return Err(bad_step(incr));
                            }
                            let mut k = 0.0;
                            while start + k * incr < end {
                                out.push(Member::Value(Scalar::Double(start + k * incr)));
                                k += 1.0;
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn index(
        &self,
        value: Value,
        parts: &[IndexPart],
        row: u64,
        group: Option<&[u64]>,
    ) -> Result<Value> {
        let array = match value {
            Value::Array(a) => a,
            Value::Scalar(_) => {
                return Err(Error::ShapeConformance("cannot index a scalar".into()))
            }
        };
        let int = |id: Option<NodeId>| -> Result<Option<i64>> {
            match id {
                Some(id) => Ok(Some(self.eval(id, row, group)?.as_scalar()?.as_int()?)),
                None => Ok(None),
            }
        };
        let bounds = parts
            .iter()
            .map(|p| {
                Ok(IndexBounds {
                    start: int(p.start)?,
                    end: int(p.end)?,
                    incr: int(p.incr)?,
                    single: p.single,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let (slicer, kept) = resolve_slice(array.shape().dims(), &bounds)?;
        let sliced = array.slice(&slicer)?;
        if kept.is_empty() {
            let mut data = sliced.into_vec();
            return data
                .pop()
                .map(Value::Scalar)
                .ok_or_else(|| Error::internal("empty element selection"));
        }
        Ok(Value::Array(sliced.reshape(Shape::new(kept))?))
    }
}

/// Index bounds of one axis as written; `None` takes the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexBounds {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub incr: Option<i64>,
    pub single: bool,
}

/// Slicer selecting `parts` from an array of shape `dims`, and the shape
/// of the selection once single-position axes are removed.
///
/// Positions are 0-based with exclusive ends; negative positions count
/// from the end of the axis. Axes without a part are taken whole.
pub(crate) fn resolve_slice(dims: &[usize], parts: &[IndexBounds]) -> Result<(Slicer, Vec<usize>)> {
    if parts.len() > dims.len() {
        return Err(Error::ShapeConformance(format!(
            "{} indices given for an array with {} axes",
            parts.len(),
            dims.len()
        )));
    }
    let mut blc = Vec::with_capacity(dims.len());
    let mut trc = Vec::with_capacity(dims.len());
    let mut inc = Vec::with_capacity(dims.len());
    let mut kept = Vec::with_capacity(dims.len());
    for (axis, &d) in dims.iter().enumerate() {
        let len = d as i64;
        let resolve = |v: i64| if v < 0 { v + len } else { v };
        let Some(part) = parts.get(axis) else {
            if d == 0 {
                return Err(Error::ShapeConformance("indexing an empty axis".into()));
            }
            blc.push(0);
            trc.push(d - 1);
            inc.push(1);
            kept.push(d);
            continue;
        };
        let start = resolve(part.start.unwrap_or(0));
        let (end, step) = if part.single {
            (start + 1, 1)
        } else {
            (
                resolve(part.end.unwrap_or(len)).min(len),
                part.incr.unwrap_or(1),
            )
        };
        if start < 0 || start >= len {
            return Err(Error::out_of_range(
                format!("index on axis {}", axis),
                start.max(0) as u64,
                d as u64,
            ));
        }
        if end <= start || step <= 0 {
            return Err(Error::InvalidOperation(format!(
                "empty slice {}:{}:{} on axis {}",
                start, end, step, axis
            )));
        }
        blc.push(start as usize);
        trc.push((end - 1) as usize);
        inc.push(step as usize);
        if !part.single {
            kept.push(((end - 1 - start) / step + 1) as usize);
        }
    }
    Ok((Slicer::with_inc(blc, trc, inc), kept))
}

fn bad_step(incr: f64) -> Error {
    Error::InvalidOperation(format!("range increment {} must be positive", incr))
}

/// Resolved element of an `IN` set.
enum Member {
    Value(Scalar),
    Interval {
        start: Option<Scalar>,
        end: Option<Scalar>,
        left_closed: bool,
        right_closed: bool,
    },
}

impl Member {
    fn contains(&self, s: &Scalar) -> bool {
        match self {
            Member::Value(v) => s.compare(v) == Some(Ordering::Equal),
            Member::Interval {
                start,
                end,
                left_closed,
                right_closed,
            } => {
                let above = start.as_ref().map_or(true, |b| match s.compare(b) {
                    Some(Ordering::Greater) => true,
                    Some(Ordering::Equal) => *left_closed,
                    _ => false,
                });
                let below = end.as_ref().map_or(true, |b| match s.compare(b) {
                    Some(Ordering::Less) => true,
                    Some(Ordering::Equal) => *right_closed,
                    _ => false,
                });
                above && below
            }
        }
    }
}

/// Apply an elementwise function, broadcasting scalar arguments over the
/// array arguments.
fn broadcast(func: Function, values: &[Value]) -> Result<Value> {
    let shape = values.iter().find_map(|v| match v {
        Value::Array(a) => Some(a.shape().clone()),
        Value::Scalar(_) => None,
    });
    let Some(shape) = shape else {
        let scalars = values
            .iter()
            .map(|v| v.as_scalar().cloned())
            .collect::<Result<Vec<_>>>()?;
        return Ok(func.apply(&scalars)?.into());
    };
    for v in values {
        if let Value::Array(a) = v {
            shape.check_conform(a.shape(), func.name())?;
        }
    }
    let mut data = Vec::with_capacity(shape.nelements());
    let mut args = Vec::with_capacity(values.len());
    for i in 0..shape.nelements() {
        args.clear();
        for v in values {
            args.push(match v {
                Value::Scalar(s) => s.clone(),
                Value::Array(a) => a.data()[i].clone(),
            });
        }
        data.push(func.apply(&args)?);
    }
    Ok(Value::Array(Array::new(shape, data)?))
}

/// Array literal: scalars form a vector, equal-shape arrays are stacked on
/// a new last axis.
fn stack(values: Vec<Value>) -> Result<Value> {
    if values.iter().all(|v| !v.is_array()) {
        let data = values
            .into_iter()
            .map(Value::into_scalar)
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::Array(Array::from_vec(data)));
    }
    let first = match &values[0] {
        Value::Array(a) => a.shape().clone(),
        Value::Scalar(_) => {
            return Err(Error::ShapeConformance(
                "array literal mixes scalars and arrays".into(),
            ))
        }
    };
    let mut data = Vec::with_capacity(first.nelements() * values.len());
    let n = values.len();
    for v in values {
        match v {
            Value::Array(a) => {
                first.check_conform(a.shape(), "array literal")?;
                data.extend(a.into_vec());
            }
            Value::Scalar(_) => {
                return Err(Error::ShapeConformance(
                    "array literal mixes scalars and arrays".into(),
                ))
            }
        }
    }
    let mut dims = first.dims().to_vec();
    dims.push(n);
    Ok(Value::Array(Array::new(Shape::new(dims), data)?))
}

fn unary(op: UnaryOp, s: &Scalar) -> Result<Scalar> {
    Ok(match (op, s) {
        (UnaryOp::Minus, Scalar::Int(v)) => Scalar::Int(v.wrapping_neg()),
        (UnaryOp::Minus, Scalar::Double(v)) => Scalar::Double(-v),
        (UnaryOp::Minus, Scalar::Complex(v)) => Scalar::Complex(-v),
        (UnaryOp::Not, Scalar::Bool(v)) => Scalar::Bool(!v),
        (UnaryOp::BitNot, Scalar::Int(v)) => Scalar::Int(!v),
        _ => {
            return Err(Error::TypeMismatch(format!(
                "unary {:?} applied to {}",
                op,
                s.value_type()
            )))
        }
    })
}

fn zero_division() -> Error {
    Error::InvalidOperation("integer division by zero".into())
}

fn floor_div(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        return Err(zero_division());
    }
    let q = a.wrapping_div(b);
    Ok(if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    })
}

/// An unordered pair (a NaN operand) is unequal and neither less nor
/// greater.
fn compare(op: BinaryOp, a: &Scalar, b: &Scalar) -> Result<Scalar> {
    let ord = a.compare(b);
    Ok(Scalar::Bool(match op {
        BinaryOp::Eq => ord == Some(Ordering::Equal),
        BinaryOp::Ne => ord != Some(Ordering::Equal),
        BinaryOp::Gt => ord == Some(Ordering::Greater),
        BinaryOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        BinaryOp::Lt => ord == Some(Ordering::Less),
        _ => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
    }))
}

/// One binary operation on operands already converted to their compiled
/// types.
pub(crate) fn binary(op: BinaryOp, a: &Scalar, b: &Scalar) -> Result<Scalar> {
    use BinaryOp::*;
    if op.is_comparison() {
        return compare(op, a, b);
    }
    let unsupported = || {
        Error::TypeMismatch(format!(
            "operator {} cannot combine {} and {}",
            op.symbol().trim(),
            a.value_type(),
            b.value_type()
        ))
    };
    Ok(match (a, b) {
        (Scalar::Bool(x), Scalar::Bool(y)) => match op {
            And => Scalar::Bool(*x && *y),
            Or => Scalar::Bool(*x || *y),
            _ => return Err(unsupported()),
        },
        (Scalar::Int(x), Scalar::Int(y)) => Scalar::Int(match op {
            Plus => x.wrapping_add(*y),
            Minus => x.wrapping_sub(*y),
            Times => x.wrapping_mul(*y),
            DivideTrunc => floor_div(*x, *y)?,
            Modulo => {
                if *y == 0 {
                    return Err(zero_division());
                }
                x.wrapping_rem(*y)
            }
            BitAnd => x & y,
            BitOr => x | y,
            BitXor => x ^ y,
            Divide => return Ok(Scalar::Double(*x as f64 / *y as f64)),
            Power => return Ok(Scalar::Double((*x as f64).powf(*y as f64))),
            _ => return Err(unsupported()),
        }),
        (Scalar::String(x), Scalar::String(y)) if op == Plus => Scalar::String(format!("{}{}", x, y)),
        (Scalar::Date(x), Scalar::Date(y)) if op == Minus => Scalar::Double(x - y),
        (Scalar::Date(x), y) if matches!(op, Plus | Minus) => {
            let y = y.as_f64()?;
            Scalar::Date(if op == Plus { x + y } else { x - y })
        }
        (x, Scalar::Date(y)) if op == Plus => Scalar::Date(x.as_f64()? + y),
        (Scalar::Complex(_), _) | (_, Scalar::Complex(_)) => {
            let (x, y): (Complex64, Complex64) = (a.as_complex()?, b.as_complex()?);
            Scalar::Complex(match op {
                Plus => x + y,
                Minus => x - y,
                Times => x * y,
                Divide => x / y,
                Power => x.powc(y),
                _ => return Err(unsupported()),
            })
        }
        _ => {
            let (x, y) = (a.as_f64().map_err(|_| unsupported())?, b.as_f64().map_err(|_| unsupported())?);
            Scalar::Double(match op {
                Plus => x + y,
                Minus => x - y,
                Times => x * y,
                Divide => x / y,
                DivideTrunc => (x / y).floor(),
                Modulo => x % y,
                Power => x.powf(y),
                _ => return Err(unsupported()),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taql::compile::compile_expr;
    use crate::taql::parser::parse_expr;

    fn eval(text: &str) -> Value {
        let expr = compile_expr(&parse_expr(text).unwrap(), None).unwrap();
        Evaluator::new(&expr, None).evaluate(0).unwrap()
    }

    fn ints(v: &[i64]) -> Vec<Scalar> {
        v.iter().map(|x| Scalar::Int(*x)).collect()
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(binary(BinaryOp::DivideTrunc, &Scalar::Int(-7), &Scalar::Int(2)).unwrap(), Scalar::Int(-4));
        assert_eq!(binary(BinaryOp::Modulo, &Scalar::Int(-7), &Scalar::Int(2)).unwrap(), Scalar::Int(-1));
        assert!(binary(BinaryOp::DivideTrunc, &Scalar::Int(1), &Scalar::Int(0)).is_err());
        assert_eq!(eval("6 & 3 | 8"), Value::Scalar(Scalar::Int(10)));
    }

    #[test]
    fn test_array_literal_and_index() {
        let v = eval("[[1,2,3],[4,5,6]]");
        match &v {
            Value::Array(a) => assert_eq!(a.shape().dims(), &[3, 2]),
            other => panic!("expected an array, got {other:?}"),
        }
        assert_eq!(eval("[[1,2,3],[4,5,6]][1,1]"), Value::Scalar(Scalar::Int(5)));
        assert_eq!(
            eval("[[1,2,3],[4,5,6]][:,0]").elements(),
            &ints(&[1, 2, 3])[..]
        );
        assert_eq!(eval("[1,2,3,4,5][::2]").elements(), &ints(&[1, 3, 5])[..]);
        assert_eq!(eval("[1,2,3,4,5][-2:]").elements(), &ints(&[4, 5])[..]);
        assert_eq!(eval("[1,2,3,4,5][-2]"), Value::Scalar(Scalar::Int(4)));
    }

    #[test]
    fn test_comparisons_with_signed_zero_and_nan() {
        let t = Value::Scalar(Scalar::Bool(true));
        let f = Value::Scalar(Scalar::Bool(false));
        assert_eq!(eval("-0.0 == 0.0"), t);
        assert_eq!(eval("sqrt(-1.0) == sqrt(-1.0)"), f);
        assert_eq!(eval("sqrt(-1.0) != sqrt(-1.0)"), t);
        assert_eq!(eval("sqrt(-1.0) > 1"), f);
        assert_eq!(eval("sqrt(-1.0) <= 1"), f);
        assert_eq!(eval("sqrt(-1.0) IN [sqrt(-1.0), 1]"), f);
        assert_eq!(eval("sqrt(-1.0) IN [{0,>]"), f);
        assert_eq!(eval("-0.0 IN [0.0]"), t);
    }

    #[test]
    fn test_elementwise_broadcast() {
        assert_eq!(eval("[1,2,3] * 2").elements(), &ints(&[2, 4, 6])[..]);
        assert_eq!(
            eval("max([1,5,3], 2)").elements(),
            &ints(&[2, 5, 3])[..]
        );
        assert_eq!(
            eval("[1,5,3] IN [3, {4,6}]").elements(),
            &[Scalar::Bool(false), Scalar::Bool(true), Scalar::Bool(true)][..]
        );
    }

    #[test]
    fn test_in_with_index_style_ranges() {
        let bools = |v: &[bool]| v.iter().map(|b| Scalar::Bool(*b)).collect::<Vec<_>>();
        assert_eq!(
            eval("[0,1,2,3] IN [1:3]").elements(),
            &bools(&[false, true, true, false])[..]
        );
        assert_eq!(
            eval("[0,5,10,15,20] IN [0:20:10]").elements(),
            &bools(&[true, false, true, false, false])[..]
        );
        assert_eq!(
            eval("[0.5,1.0,1.5] IN [0.0:2.0:0.5]").elements(),
            &bools(&[true, true, true])[..]
        );
        assert_eq!(eval("7 IN [:0, 5:]"), Value::Scalar(Scalar::Bool(true)));
        let zero_step = compile_expr(&parse_expr("1 IN [0:5:0]").unwrap(), None)
            .and_then(|e| Evaluator::new(&e, None).evaluate(0));
        assert!(zero_step.is_err());
        assert!(compile_expr(&parse_expr("[1:3]").unwrap(), None).is_err());
        assert!(compile_expr(&parse_expr("1 IN [1::2]").unwrap(), None).is_err());
    }

    #[test]
    fn test_running_window_takes_half_width() {
        let doubles: Vec<Scalar> = [0.0, 2.0, 3.0, 4.0, 0.0].into_iter().map(Scalar::Double).collect();
        assert_eq!(eval("runningmean([1,2,3,4,5], 1)").elements(), &doubles[..]);
        assert_eq!(
            eval("runningsum([1,2,3,4,5], 0)").elements(),
            &ints(&[1, 2, 3, 4, 5])[..]
        );
    }

    #[test]
    fn test_dates() {
        assert_eq!(
            eval("2000/01/02 - 2000/01/01"),
            Value::Scalar(Scalar::Double(1.0))
        );
        assert_eq!(eval("year(2000/01/01 + 366)"), Value::Scalar(Scalar::Int(2001)));
    }
}
