//! Compilation of syntax trees into typed expressions.
//!
//! The compiler resolves column references against the table, types every
//! node, inserts explicit `Convert` nodes wherever operands need promotion
//! and folds row-independent subtrees into constants. Subqueries run once,
//! at compile time.

use log::trace;

use crate::array::Array;
use crate::common::{Error, Result};
use crate::table::Table;

use super::eval::Evaluator;
use super::exec;
use super::expr::{Expr, ExprBuilder, ExprKind, IndexPart, InSet, NodeId, SetElement};
use super::function::{
    full_match_regex, glob_to_regex, lookup, sql_to_regex, Aggregate, Callable, Function, Reduction,
};
use super::syntax::{BinaryOp, Literal, Multi, Regex, SyntaxNode, UnaryOp};
use super::value::{Scalar, Value, ValueType};

/// Compile an expression against an optional table.
pub fn compile_expr(node: &SyntaxNode, table: Option<&Table>) -> Result<Expr> {
    Compiler::new(table, &[]).compile(node)
}

/// Compile a row predicate: a Bool expression without group aggregates.
pub fn compile_predicate(
    node: &SyntaxNode,
    table: Option<&Table>,
    tables: &[Table],
) -> Result<Expr> {
    let expr = Compiler::new(table, tables).compile(node)?;
    if expr.has_aggregate(expr.root()) {
        return Err(Error::InvalidOperation(
            "aggregate functions cannot be used in WHERE".into(),
        ));
    }
    if expr.value_type() != ValueType::Bool {
        return Err(Error::TypeMismatch(format!(
            "condition {} is {}, not Bool",
            node,
            expr.value_type()
        )));
    }
    Ok(expr)
}

pub(crate) fn literal_scalar(value: &Literal) -> Scalar {
    match value {
        Literal::Bool(v) => Scalar::Bool(*v),
        Literal::Int(v) => Scalar::Int(*v),
        Literal::Real(v) => Scalar::Double(*v),
        Literal::Complex(v) => Scalar::Complex(*v),
        Literal::String(s) => Scalar::String(s.clone()),
        Literal::Time(v) => Scalar::Date(*v),
    }
}

fn mismatch(op: &str, left: ValueType, right: ValueType) -> Error {
    Error::TypeMismatch(format!(
        "operator {} cannot combine {} and {}",
        op.trim(),
        left,
        right
    ))
}

fn is_real(t: ValueType) -> bool {
    matches!(t, ValueType::Int | ValueType::Double)
}

/// Operand and result types of a binary operator.
fn binary_types(
    op: BinaryOp,
    left: ValueType,
    right: ValueType,
) -> Result<(ValueType, ValueType, ValueType)> {
    use ValueType::*;
    let err = || mismatch(op.symbol(), left, right);
    let numeric = ValueType::promote(left, right).filter(|t| t.is_numeric());
    match op {
        BinaryOp::Plus => match (left, right) {
            (String, String) => Ok((String, String, String)),
            (Date, r) if is_real(r) => Ok((Date, Double, Date)),
            (l, Date) if is_real(l) => Ok((Double, Date, Date)),
            _ => numeric.map(|t| (t, t, t)).ok_or_else(err),
        },
        BinaryOp::Minus => match (left, right) {
            (Date, Date) => Ok((Date, Date, Double)),
            (Date, r) if is_real(r) => Ok((Date, Double, Date)),
            _ => numeric.map(|t| (t, t, t)).ok_or_else(err),
        },
        BinaryOp::Times => numeric.map(|t| (t, t, t)).ok_or_else(err),
        BinaryOp::Divide | BinaryOp::Power => numeric
            .map(|t| {
                let t = t.max(Double);
                (t, t, t)
            })
            .ok_or_else(err),
        BinaryOp::DivideTrunc | BinaryOp::Modulo => numeric
            .filter(|t| *t != Complex)
            .map(|t| (t, t, t))
            .ok_or_else(err),
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => match (left, right) {
            (Int, Int) => Ok((Int, Int, Int)),
            _ => Err(err()),
        },
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Bool, Bool) => Ok((Bool, Bool, Bool)),
            _ => Err(err()),
        },
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
            match (left, right) {
                (Date, r) if is_real(r) => Ok((Date, Date, Bool)),
                (l, Date) if is_real(l) => Ok((Date, Date, Bool)),
                _ => ValueType::promote(left, right)
                    .map(|t| (t, t, Bool))
                    .ok_or_else(err),
            }
        }
        BinaryOp::In | BinaryOp::Index | BinaryOp::EqRegex | BinaryOp::NeRegex => Err(
            Error::internal(format!("operator {:?} is not typed here", op)),
        ),
    }
}

/// Regex for a `~` pattern literal: `p/glob/`, `m/search/`, `f/full/` or
/// a quoted full regex.
fn pattern_regex(r: &Regex) -> Result<regex::Regex> {
    if r.max_distance.is_some() {
        return Err(Error::InvalidOperation(
            "approximate pattern matching is not supported".into(),
        ));
    }
    let v = r.value.as_str();
    let (form, body) = match v.chars().next() {
        Some('\'') | Some('"') if v.len() >= 2 => ('f', &v[1..v.len() - 1]),
        Some(c @ ('p' | 'm' | 'f')) if v.len() >= 3 => (c, &v[2..v.len() - 1]),
        _ => {
            return Err(Error::InvalidOperation(format!(
                "malformed pattern {}",
                v
            )))
        }
    };
    let body = body.replace("\\/", "/");
    let pattern = match form {
        'p' => glob_to_regex(&body),
        'm' => format!("(?s).*(?:{}).*", body),
        _ => body,
    };
    full_match_regex(&pattern, r.case_insensitive)
}

/// Builds one [`Expr`].
pub struct Compiler<'a> {
    table: Option<&'a Table>,
    /// `$n` table arguments available to subqueries.
    tables: &'a [Table],
    builder: ExprBuilder,
}

impl<'a> Compiler<'a> {
    pub fn new(table: Option<&'a Table>, tables: &'a [Table]) -> Self {
        Self {
            table,
            tables,
            builder: ExprBuilder::new(),
        }
    }

    pub fn compile(mut self, node: &SyntaxNode) -> Result<Expr> {
        let root = self.node(node)?;
        trace!("compiled {} into {} nodes", node, self.builder.nodes().len());
        Ok(self.builder.finish(root))
    }

    // ------------------------------------------------------------------
    // Node helpers
    // ------------------------------------------------------------------

    fn ty(&self, id: NodeId) -> ValueType {
        self.builder.value_type(id)
    }

    fn arr(&self, id: NodeId) -> bool {
        self.builder.is_array(id)
    }

    fn constant(&mut self, value: Value) -> NodeId {
        self.builder.constant(value)
    }

    /// Push a node and fold it when every child is a constant.
    fn push(&mut self, kind: ExprKind, ty: ValueType, is_array: bool) -> Result<NodeId> {
        let id = self.builder.push(kind, ty, is_array);
        self.fold(id)
    }

    fn fold(&mut self, id: NodeId) -> Result<NodeId> {
        let node = self.builder.node(id);
        let foldable = !matches!(
            node.kind,
            ExprKind::Const(_)
                | ExprKind::Column { .. }
                | ExprKind::RowNumber
                | ExprKind::RowId
                | ExprKind::IsDefined { .. }
                | ExprKind::Aggregate { .. }
        ) && node.children().iter().all(|c| self.builder.is_const(*c));
        if !foldable {
            return Ok(id);
        }
        let value = Evaluator::over(self.builder.nodes(), id, None).evaluate(0)?;
        let node = self.builder.node_mut(id);
        node.is_array = value.is_array();
        node.kind = ExprKind::Const(value);
        Ok(id)
    }

    fn convert(&mut self, id: NodeId, to: ValueType) -> Result<NodeId> {
        if self.ty(id) == to {
            return Ok(id);
        }
        let is_array = self.arr(id);
        let unit = self.builder.node(id).unit.clone();
        let out = self.push(ExprKind::Convert { child: id, to }, to, is_array)?;
        self.builder.node_mut(out).unit = unit;
        Ok(out)
    }

    fn require(&self, id: NodeId, ty: ValueType, what: &str) -> Result<()> {
        if self.ty(id) != ty {
            return Err(Error::TypeMismatch(format!(
                "{} must be {}, not {}",
                what,
                ty,
                self.ty(id)
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Syntax nodes
    // ------------------------------------------------------------------

    fn node(&mut self, node: &SyntaxNode) -> Result<NodeId> {
        match node {
            SyntaxNode::Const(c) => {
                if c.is_table_name {
                    return Err(Error::InvalidOperation(format!(
                        "table {} used as a value",
                        node
                    )));
                }
                let id = self.constant(literal_scalar(&c.value).into());
                self.builder.node_mut(id).unit = c.unit.clone();
                Ok(id)
            }
            SyntaxNode::KeyCol { name } => self.column(name),
            SyntaxNode::Unit { unit, child } => {
                let id = self.node(child)?;
                self.builder.node_mut(id).unit = unit.clone();
                Ok(id)
            }
            SyntaxNode::Unary { op, child } => self.unary(*op, child),
            SyntaxNode::Binary { op, left, right } => match op {
                BinaryOp::In => self.in_set(left, right),
                BinaryOp::Index => self.index(left, right),
                BinaryOp::EqRegex | BinaryOp::NeRegex => {
                    let SyntaxNode::Regex(r) = right.as_ref() else {
                        return Err(Error::internal("pattern operator without a pattern"));
                    };
                    let child = self.node(left)?;
                    self.require(child, ValueType::String, "a pattern operand")?;
                    let negate = *op == BinaryOp::NeRegex || r.negate;
                    let kind = ExprKind::Match {
                        child,
                        regex: pattern_regex(r)?,
                        negate,
                        ignore_blanks: r.ignore_blanks,
                    };
                    let is_array = self.arr(child);
                    self.push(kind, ValueType::Bool, is_array)
                }
                _ => self.binary(*op, left, right),
            },
            SyntaxNode::Multi(m) if m.is_set => self.array_literal(m),
            SyntaxNode::Func { name, args } => self.function(name, args),
            SyntaxNode::Select(_) => {
                let values = self.subquery_values(node)?;
                Ok(self.constant(Value::Array(Array::from_vec(values))))
            }
            SyntaxNode::Regex(_) => Err(Error::InvalidOperation(
                "a pattern can only be used with ~ or !~".into(),
            )),
            SyntaxNode::Range(_) => Err(Error::InvalidOperation(
                "an interval can only be used in an IN set".into(),
            )),
            other => Err(Error::InvalidOperation(format!(
                "{} is not an expression",
                other.kind_name()
            ))),
        }
    }

    fn column(&mut self, name: &str) -> Result<NodeId> {
        let table = self.table.ok_or_else(|| {
            Error::SchemaViolation(format!("column {} used without a table", name))
        })?;
        let desc = table.desc();
        if let Some(col) = desc.column(name) {
            return Ok(self.builder.push(
                ExprKind::Column {
                    name: col.name.clone(),
                },
                ValueType::from_data_type(col.data_type),
                col.is_array(),
            ));
        }
        match table.keyword(name) {
            Some(value) => Ok(self.constant(Value::from_cell(&value))),
            None => Err(Error::SchemaViolation(format!(
                "no column or keyword {}",
                name
            ))),
        }
    }

    fn unary(&mut self, op: UnaryOp, child: &SyntaxNode) -> Result<NodeId> {
        if matches!(op, UnaryOp::Exists | UnaryOp::NotExists) {
            let result = exec::run_subquery(child, self.tables, self.table)?;
            let exists = result.nrow() > 0;
            return Ok(self.constant(Scalar::Bool(exists == (op == UnaryOp::Exists)).into()));
        }
        let id = self.node(child)?;
        let ty = self.ty(id);
        let ok = match op {
            UnaryOp::Minus => ty.is_numeric(),
            UnaryOp::Not => ty == ValueType::Bool,
            _ => ty == ValueType::Int,
        };
        if !ok {
            return Err(Error::TypeMismatch(format!(
                "unary {:?} cannot be applied to {}",
                op, ty
            )));
        }
        let is_array = self.arr(id);
        let out = self.push(ExprKind::Unary { op, child: id }, ty, is_array)?;
        if op == UnaryOp::Minus {
            let unit = self.builder.node(id).unit.clone();
            self.builder.node_mut(out).unit = unit;
        }
        Ok(out)
    }

    fn binary(&mut self, op: BinaryOp, left: &SyntaxNode, right: &SyntaxNode) -> Result<NodeId> {
        let l = self.node(left)?;
        let r = self.node(right)?;
        self.arith(op, l, r)
    }

    /// Type, convert and push a binary operator node.
    fn arith(&mut self, op: BinaryOp, l: NodeId, r: NodeId) -> Result<NodeId> {
        let (lt, rt, result) = binary_types(op, self.ty(l), self.ty(r))?;
        let l = self.convert(l, lt)?;
        let r = self.convert(r, rt)?;
        let is_array = self.arr(l) || self.arr(r);
        let unit = if matches!(op, BinaryOp::Plus | BinaryOp::Minus) {
            self.builder.node(l).unit.clone()
        } else {
            String::new()
        };
        let id = self.push(
            ExprKind::Binary {
                op,
                left: l,
                right: r,
            },
            result,
            is_array,
        )?;
        self.builder.node_mut(id).unit = unit;
        Ok(id)
    }

    fn in_set(&mut self, left: &SyntaxNode, right: &SyntaxNode) -> Result<NodeId> {
        let value = self.node(left)?;
        let vt = self.ty(value);
        let is_array = self.arr(value);
        let set = match right {
            SyntaxNode::Multi(m) if m.is_set => {
                let mut elements = Vec::with_capacity(m.nodes.len());
                for element in &m.nodes {
                    elements.push(self.set_element(element, vt)?);
                }
                InSet::Elements(elements)
            }
            other => {
                let id = self.node(other)?;
                self.comparable(vt, self.ty(id))?;
                InSet::Array(id)
            }
        };
        self.push(ExprKind::In { value, set }, ValueType::Bool, is_array)
    }

    fn comparable(&self, a: ValueType, b: ValueType) -> Result<ValueType> {
        match (a, b) {
            (ValueType::Date, t) | (t, ValueType::Date) if is_real(t) => Ok(ValueType::Date),
            _ => ValueType::promote(a, b).ok_or_else(|| mismatch("IN", a, b)),
        }
    }

    fn set_element(&mut self, element: &SyntaxNode, vt: ValueType) -> Result<SetElement> {
        let bound = |c: &mut Self, n: &Option<Box<SyntaxNode>>| -> Result<Option<NodeId>> {
            match n {
                Some(n) => {
                    let id = c.node(n)?;
                    c.comparable(vt, c.ty(id))?;
                    Ok(Some(id))
                }
                None => Ok(None),
            }
        };
        match element {
            SyntaxNode::Range(r) if r.mid_width => {
                let (Some(mid), Some(width)) = (&r.start, &r.end) else {
                    return Err(Error::internal("mid-width interval without bounds"));
                };
                let mid = self.node(mid)?;
                let width = self.node(width)?;
                self.comparable(vt, self.ty(mid))?;
                let half = self.half_width(width)?;
                let start = self.arith(BinaryOp::Minus, mid, half)?;
                let end = self.arith(BinaryOp::Plus, mid, half)?;
                Ok(SetElement::Interval {
                    start: Some(start),
                    end: Some(end),
                    left_closed: true,
                    right_closed: true,
                })
            }
            SyntaxNode::Range(r) => Ok(SetElement::Interval {
                start: bound(self, &r.start)?,
                end: bound(self, &r.end)?,
                left_closed: r.left_closed,
                right_closed: r.right_closed,
            }),
            SyntaxNode::Index {
                start,
                end,
                incr: None,
                ..
            } => Ok(SetElement::Interval {
                start: bound(self, start)?,
                end: bound(self, end)?,
                left_closed: true,
                right_closed: false,
            }),
            SyntaxNode::Index {
                start: Some(start),
                end: Some(end),
                incr: Some(incr),
                ..
            } => {
                let mut real = |n: &SyntaxNode| -> Result<NodeId> {
                    let id = self.node(n)?;
                    if !is_real(self.ty(id)) || self.arr(id) {
                        return Err(Error::TypeMismatch(
                            "a stepped range needs real scalar bounds".into(),
                        ));
                    }
                    Ok(id)
                };
                let (start, end, incr) = (real(&**start)?, real(&**end)?, real(&**incr)?);
                self.comparable(vt, self.ty(start))?;
                Ok(SetElement::Stepped { start, end, incr })
            }
            SyntaxNode::Index { .. } => Err(Error::InvalidOperation(
                "a stepped range needs a start and an end".into(),
            )),
            other => {
                let id = self.node(other)?;
                self.comparable(vt, self.ty(id))?;
                Ok(SetElement::Value(id))
            }
        }
    }

    /// `width / 2` as a Double node.
    fn half_width(&mut self, width: NodeId) -> Result<NodeId> {
        if !is_real(self.ty(width)) {
            return Err(Error::TypeMismatch("interval width must be real".into()));
        }
        let width = self.convert(width, ValueType::Double)?;
        let two = self.constant(Scalar::Double(2.0).into());
        self.push(
            ExprKind::Binary {
                op: BinaryOp::Divide,
                left: width,
                right: two,
            },
            ValueType::Double,
            false,
        )
    }

    fn index(&mut self, left: &SyntaxNode, right: &SyntaxNode) -> Result<NodeId> {
        let array = self.node(left)?;
        let SyntaxNode::Multi(m) = right else {
            return Err(Error::internal("index without an index list"));
        };
        let mut parts = Vec::with_capacity(m.nodes.len());
        let mut all_single = true;
        for part in &m.nodes {
            let SyntaxNode::Index {
                start,
                end,
                incr,
                colon,
            } = part
            else {
                return Err(Error::internal("malformed index list"));
            };
            let mut bound = |n: &Option<Box<SyntaxNode>>| -> Result<Option<NodeId>> {
                match n {
                    Some(n) => {
                        let id = self.node(n)?;
                        self.require(id, ValueType::Int, "an index")?;
                        if self.arr(id) {
                            return Err(Error::TypeMismatch("an index must be a scalar".into()));
                        }
                        Ok(Some(id))
                    }
                    None => Ok(None),
                }
            };
            let single = !colon && start.is_some();
            all_single &= single;
            parts.push(IndexPart {
                start: bound(start)?,
                end: bound(end)?,
                incr: bound(incr)?,
                single,
            });
        }
        let ty = self.ty(array);
        self.push(ExprKind::Index { array, parts }, ty, !all_single)
    }

    fn array_literal(&mut self, m: &Multi) -> Result<NodeId> {
        let mut ids = Vec::with_capacity(m.nodes.len());
        for n in &m.nodes {
            if matches!(n, SyntaxNode::Index { .. }) {
                return Err(Error::InvalidOperation(
                    "a start:end range is only valid in an IN set".into(),
                ));
            }
            ids.push(self.node(n)?);
        }
        let ty = match ids.first() {
            Some(&first) => ids.iter().try_fold(self.ty(first), |acc, id| {
                ValueType::promote(acc, self.ty(*id)).ok_or_else(|| mismatch(",", acc, self.ty(*id)))
            })?,
            None => ValueType::Double,
        };
        let mut converted = Vec::with_capacity(ids.len());
        for id in ids {
            converted.push(self.convert(id, ty)?);
        }
        self.push(ExprKind::ArrayLiteral(converted), ty, true)
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn args(&mut self, args: &Multi) -> Result<Vec<NodeId>> {
        args.nodes.iter().map(|n| self.node(n)).collect()
    }

    fn real_arg(&mut self, node: &SyntaxNode, what: &str) -> Result<NodeId> {
        let id = self.node(node)?;
        if !is_real(self.ty(id)) {
            return Err(Error::TypeMismatch(format!("{} must be real", what)));
        }
        self.convert(id, ValueType::Double)
    }

    fn function(&mut self, name: &str, args: &Multi) -> Result<NodeId> {
        let nargs = args.nodes.len();
        let callable = lookup(name, nargs)
            .ok_or_else(|| Error::InvalidOperation(format!("unknown function {}", name)))?;
        match callable {
            Callable::Scalar(f) => self.scalar_function(f, args),
            Callable::Reduce(r) => {
                let (arg, fraction) = self.reduction_args(r, name, args, 1)?;
                let ty = r.result_type(self.ty(arg))?;
                self.push(
                    ExprKind::Reduce {
                        reduction: r,
                        arg,
                        fraction,
                    },
                    ty,
                    false,
                )
            }
            Callable::Partial(r) | Callable::Running(r) | Callable::Boxed(r) => {
                let (arg, fraction) = self.reduction_args(r, name, args, 2)?;
                let ty = r.result_type(self.ty(arg))?;
                let extra = args
                    .nodes
                    .last()
                    .ok_or_else(|| Error::internal("missing axes argument"))?;
                let extra = self.node(extra)?;
                self.require(extra, ValueType::Int, "an axis or window width")?;
                let kind = match callable {
                    Callable::Partial(_) => ExprKind::Partial {
                        reduction: r,
                        arg,
                        axes: extra,
                        fraction,
                    },
                    _ => ExprKind::Window {
                        reduction: r,
                        arg,
                        width: extra,
                        running: matches!(callable, Callable::Running(_)),
                        fraction,
                    },
                };
                self.push(kind, ty, true)
            }
            Callable::Aggregate(a) => {
                let needs_fraction = matches!(
                    a,
                    Aggregate::Of(Reduction::Fractile)
                );
                let expected = match a {
                    Aggregate::Count => 0,
                    _ if needs_fraction => 2,
                    _ => 1,
                };
                if nargs != expected {
                    return Err(Error::TypeMismatch(format!(
                        "{}() takes {} arguments, got {}",
                        name, expected, nargs
                    )));
                }
                let arg = match args.nodes.first() {
                    Some(n) => {
                        let id = self.node(n)?;
                        if self.contains_aggregate(id) {
                            return Err(Error::InvalidOperation(
                                "aggregate functions cannot be nested".into(),
                            ));
                        }
                        Some(id)
                    }
                    None => None,
                };
                let fraction = if needs_fraction {
                    Some(self.real_arg(&args.nodes[1], "a fraction")?)
                } else {
                    None
                };
                let ty = a.result_type(arg.map(|id| self.ty(id)))?;
                let is_array = matches!(
                    a,
                    Aggregate::First | Aggregate::Last
                ) && arg.is_some_and(|id| self.arr(id));
                self.push(
                    ExprKind::Aggregate {
                        aggregate: a,
                        arg,
                        fraction,
                    },
                    ty,
                    is_array,
                )
            }
        }
    }

    fn contains_aggregate(&self, id: NodeId) -> bool {
        let node = self.builder.node(id);
        matches!(node.kind, ExprKind::Aggregate { .. })
            || node
                .children()
                .into_iter()
                .any(|c| self.contains_aggregate(c))
    }

    /// The array argument and, for fractiles, the fraction. `plain_args`
    /// is the argument count without a fraction.
    fn reduction_args(
        &mut self,
        r: Reduction,
        name: &str,
        args: &Multi,
        plain_args: usize,
    ) -> Result<(NodeId, Option<NodeId>)> {
        let expected = plain_args + usize::from(r.needs_fraction());
        if args.nodes.len() != expected {
            return Err(Error::TypeMismatch(format!(
                "{}() takes {} arguments, got {}",
                name,
                expected,
                args.nodes.len()
            )));
        }
        let arg = self.node(&args.nodes[0])?;
        let fraction = if r.needs_fraction() {
            Some(self.real_arg(&args.nodes[1], "a fraction")?)
        } else {
            None
        };
        Ok((arg, fraction))
    }

    fn scalar_function(&mut self, f: Function, args: &Multi) -> Result<NodeId> {
        match f {
            Function::RowNumber | Function::RowId => {
                if !args.is_empty() {
                    return Err(Error::TypeMismatch(format!(
                        "{}() takes no arguments",
                        f.name()
                    )));
                }
                let kind = if f == Function::RowNumber {
                    ExprKind::RowNumber
                } else {
                    ExprKind::RowId
                };
                return Ok(self.builder.push(kind, ValueType::Int, false));
            }
            Function::IsDefined => {
                let [SyntaxNode::KeyCol { name }] = args.nodes.as_slice() else {
                    return Err(Error::TypeMismatch(
                        "isdefined() takes one column name".into(),
                    ));
                };
                let column = self.column(name)?;
                let ExprKind::Column { name } = &self.builder.node(column).kind else {
                    return Err(Error::InvalidOperation(format!("{} is not a column", name)));
                };
                let column = name.clone();
                return Ok(self
                    .builder
                    .push(ExprKind::IsDefined { column }, ValueType::Bool, false));
            }
            Function::RegexMatch | Function::PatternMatch | Function::SqlPatternMatch => {
                if let [subject, SyntaxNode::Const(c)] = args.nodes.as_slice() {
                    if let Literal::String(p) = &c.value {
                        let pattern = match f {
                            Function::RegexMatch => p.clone(),
                            Function::PatternMatch => glob_to_regex(p),
                            _ => sql_to_regex(p),
                        };
                        let child = self.node(subject)?;
                        self.require(child, ValueType::String, "a pattern operand")?;
                        let is_array = self.arr(child);
                        return self.push(
                            ExprKind::Match {
                                child,
                                regex: full_match_regex(&pattern, false)?,
                                negate: false,
                                ignore_blanks: false,
                            },
                            ValueType::Bool,
                            is_array,
                        );
                    }
                }
            }
            _ => {}
        }
        let mut ids = self.args(args)?;
        let types: Vec<ValueType> = ids.iter().map(|id| self.ty(*id)).collect();
        let ty = f.result_type(&types)?;
        if matches!(f, Function::Iif | Function::Min | Function::Max) {
            let start = if f == Function::Iif { 1 } else { 0 };
            for id in &mut ids[start..] {
                *id = self.convert(*id, ty)?;
            }
        }
        let flags: Vec<bool> = ids.iter().map(|id| self.arr(*id)).collect();
        let is_array = f.result_is_array(&flags);
        self.push(ExprKind::Func { func: f, args: ids }, ty, is_array)
    }

    fn subquery_values(&mut self, node: &SyntaxNode) -> Result<Vec<Scalar>> {
        let result = exec::run_subquery(node, self.tables, self.table)?;
        let mut out = Vec::new();
        for value in result.column_values(0)? {
            out.extend(value.elements().iter().cloned());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taql::parser::parse_expr;

    fn compile(text: &str) -> Result<Expr> {
        compile_expr(&parse_expr(text)?, None)
    }

    #[test]
    fn test_promotion_and_folding() {
        let expr = compile("1 + 2.5").unwrap();
        assert_eq!(expr.value_type(), ValueType::Double);
        assert_eq!(expr.constant(), Some(&Value::Scalar(Scalar::Double(3.5))));

        let expr = compile("'a' + 'b'").unwrap();
        assert_eq!(expr.value_type(), ValueType::String);
        assert_eq!(
            expr.constant(),
            Some(&Value::Scalar(Scalar::String("ab".into())))
        );

        let expr = compile("7 // 2 + 2**3").unwrap();
        assert_eq!(expr.constant(), Some(&Value::Scalar(Scalar::Double(11.0))));
    }

    #[test]
    fn test_type_mismatch_at_compile_time() {
        assert!(matches!(compile("TRUE = 1.5"), Err(Error::TypeMismatch(_))));
        assert!(matches!(compile("'a' * 2"), Err(Error::TypeMismatch(_))));
        assert!(matches!(compile("1 && TRUE"), Err(Error::TypeMismatch(_))));
        assert!(matches!(compile("upcase(3)"), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_sets_and_patterns() {
        let expr = compile("3 IN [1, {2,4>, 10<:>2]").unwrap();
        assert_eq!(expr.constant(), Some(&Value::Scalar(Scalar::Bool(true))));
        let expr = compile("10.9 IN [10<:>2]").unwrap();
        assert_eq!(expr.constant(), Some(&Value::Scalar(Scalar::Bool(true))));
        let expr = compile("'abc.ms' ~ p/*.MS/i").unwrap();
        assert_eq!(expr.constant(), Some(&Value::Scalar(Scalar::Bool(true))));
        let expr = compile("'abc' !~ m/b/").unwrap();
        assert_eq!(expr.constant(), Some(&Value::Scalar(Scalar::Bool(false))));
    }

    #[test]
    fn test_functions_fold() {
        let expr = compile("sum([1,2,3]) + max(2, 3.5)").unwrap();
        assert_eq!(expr.constant(), Some(&Value::Scalar(Scalar::Double(9.5))));
        let expr = compile("iif(1 > 2, 1, 2.5)").unwrap();
        assert_eq!(expr.constant(), Some(&Value::Scalar(Scalar::Double(2.5))));
        assert!(compile("nosuchfunction(1)").is_err());
    }

    #[test]
    fn test_columns_need_a_table() {
        assert!(matches!(compile("X + 1"), Err(Error::SchemaViolation(_))));
    }
}
