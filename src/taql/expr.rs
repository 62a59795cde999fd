//! Compiled expressions.
//!
//! An [`Expr`] is an arena of typed nodes addressed by [`NodeId`]; a node
//! refers to its children by id. Every node resolves to one
//! [`ValueType`] and is either scalar or array valued.

use std::fmt;

use super::function::{Aggregate, Function, Reduction};
use super::syntax::{BinaryOp, UnaryOp};
use super::value::{Value, ValueType};

/// Index of a node in its [`Expr`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One element of an `IN` set.
#[derive(Debug, Clone)]
pub enum SetElement {
    Value(NodeId),
    /// Interval; a missing bound is unbounded.
    Interval {
        start: Option<NodeId>,
        end: Option<NodeId>,
        left_closed: bool,
        right_closed: bool,
    },
    /// `start, start+incr, ...` below `end`.
    Stepped {
        start: NodeId,
        end: NodeId,
        incr: NodeId,
    },
}

/// Right-hand side of `IN`.
#[derive(Debug, Clone)]
pub enum InSet {
    Elements(Vec<SetElement>),
    /// Any array-valued node, e.g. an array column or subquery result.
    Array(NodeId),
}

/// One axis of an index expression; `None` parts take their default.
#[derive(Debug, Clone, Copy)]
pub struct IndexPart {
    pub start: Option<NodeId>,
    pub end: Option<NodeId>,
    pub incr: Option<NodeId>,
    /// A single position (no `:`), which removes the axis.
    pub single: bool,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Const(Value),
    /// A column of the table being evaluated.
    Column { name: String },
    Convert { child: NodeId, to: ValueType },
    Unary { op: UnaryOp, child: NodeId },
    Binary { op: BinaryOp, left: NodeId, right: NodeId },
    In { value: NodeId, set: InSet },
    /// Full match of a string against a regex.
    Match {
        child: NodeId,
        regex: regex::Regex,
        negate: bool,
        ignore_blanks: bool,
    },
    /// Index positions are 0-based, ends exclusive, negatives count from
    /// the end of the axis.
    Index { array: NodeId, parts: Vec<IndexPart> },
    /// Array literal; elements of equal shape are stacked on a new last axis.
    ArrayLiteral(Vec<NodeId>),
    Func { func: Function, args: Vec<NodeId> },
    Reduce {
        reduction: Reduction,
        arg: NodeId,
        fraction: Option<NodeId>,
    },
    Partial {
        reduction: Reduction,
        arg: NodeId,
        axes: NodeId,
        fraction: Option<NodeId>,
    },
    /// Sliding (`running`) or disjoint (`boxed`) windows.
    Window {
        reduction: Reduction,
        arg: NodeId,
        width: NodeId,
        running: bool,
        fraction: Option<NodeId>,
    },
    Aggregate {
        aggregate: Aggregate,
        arg: Option<NodeId>,
        fraction: Option<NodeId>,
    },
    RowNumber,
    RowId,
    IsDefined { column: String },
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub value_type: ValueType,
    pub is_array: bool,
    /// Unit attached to the value; carried, never converted.
    pub unit: String,
}

impl ExprNode {
    /// Ids of the direct children.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let opt = |o: &Option<NodeId>, out: &mut Vec<NodeId>| out.extend(o.iter().copied());
        match &self.kind {
            ExprKind::Const(_)
            | ExprKind::Column { .. }
            | ExprKind::RowNumber
            | ExprKind::RowId
            | ExprKind::IsDefined { .. } => {}
            ExprKind::Convert { child, .. }
            | ExprKind::Unary { child, .. }
            | ExprKind::Match { child, .. } => out.push(*child),
            ExprKind::Binary { left, right, .. } => out.extend([*left, *right]),
            ExprKind::In { value, set } => {
                out.push(*value);
                match set {
                    InSet::Array(id) => out.push(*id),
                    InSet::Elements(elements) => {
                        for e in elements {
                            match e {
                                SetElement::Value(id) => out.push(*id),
                                SetElement::Interval { start, end, .. } => {
                                    opt(start, &mut out);
                                    opt(end, &mut out);
                                }
                                SetElement::Stepped { start, end, incr } => {
                                    out.extend([*start, *end, *incr])
                                }
                            }
                        }
                    }
                }
            }
            ExprKind::Index { array, parts } => {
                out.push(*array);
                for p in parts {
                    opt(&p.start, &mut out);
                    opt(&p.end, &mut out);
                    opt(&p.incr, &mut out);
                }
            }
            ExprKind::ArrayLiteral(ids) | ExprKind::Func { args: ids, .. } => {
                out.extend(ids.iter().copied())
            }
            ExprKind::Reduce { arg, fraction, .. } => {
                out.push(*arg);
                opt(fraction, &mut out);
            }
            ExprKind::Partial {
                arg,
                axes,
                fraction,
                ..
            } => {
                out.extend([*arg, *axes]);
                opt(fraction, &mut out);
            }
            ExprKind::Window {
                arg,
                width,
                fraction,
                ..
            } => {
                out.extend([*arg, *width]);
                opt(fraction, &mut out);
            }
            ExprKind::Aggregate { arg, fraction, .. } => {
                opt(arg, &mut out);
                opt(fraction, &mut out);
            }
        }
        out
    }

    /// The value does not depend on the row.
    fn is_row_independent(&self) -> bool {
        !matches!(
            self.kind,
            ExprKind::Column { .. }
                | ExprKind::RowNumber
                | ExprKind::RowId
                | ExprKind::IsDefined { .. }
                | ExprKind::Aggregate { .. }
        )
    }
}

/// A compiled, typed expression.
#[derive(Debug, Clone)]
pub struct Expr {
    nodes: Vec<ExprNode>,
    root: NodeId,
}

impl Expr {
    pub(crate) fn new(nodes: Vec<ExprNode>, root: NodeId) -> Self {
        Self { nodes, root }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn nodes(&self) -> &[ExprNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn value_type(&self) -> ValueType {
        self.node(self.root).value_type
    }

    pub fn is_array(&self) -> bool {
        self.node(self.root).is_array
    }

    pub fn unit(&self) -> &str {
        &self.node(self.root).unit
    }

    /// The folded value when the whole expression is a constant.
    pub fn constant(&self) -> Option<&Value> {
        match &self.node(self.root).kind {
            ExprKind::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.constant().is_some()
    }

    /// The node and all its descendants are row independent.
    pub fn is_invariant(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.is_row_independent() && node.children().into_iter().all(|c| self.is_invariant(c))
    }

    /// Some node below `id` (inclusive) is a group aggregate.
    pub fn has_aggregate(&self, id: NodeId) -> bool {
        let node = self.node(id);
        matches!(node.kind, ExprKind::Aggregate { .. })
            || node.children().into_iter().any(|c| self.has_aggregate(c))
    }

    /// Column names read anywhere in the expression.
    pub fn columns(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .iter()
            .filter_map(|n| match &n.kind {
                ExprKind::Column { name } | ExprKind::IsDefined { column: name } => {
                    Some(name.clone())
                }
                _ => None,
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Arena under construction.
#[derive(Debug, Default)]
pub(crate) struct ExprBuilder {
    nodes: Vec<ExprNode>,
}

impl ExprBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ExprKind, value_type: ValueType, is_array: bool) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ExprNode {
            kind,
            value_type,
            is_array,
            unit: String::new(),
        });
        id
    }

    pub fn constant(&mut self, value: Value) -> NodeId {
        let value_type = match &value {
            Value::Scalar(s) => s.value_type(),
            Value::Array(a) => a
                .data()
                .first()
                .map_or(ValueType::Double, |s| s.value_type()),
        };
        let is_array = value.is_array();
        self.push(ExprKind::Const(value), value_type, is_array)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[ExprNode] {
        &self.nodes
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut ExprNode {
        &mut self.nodes[id.index()]
    }

    pub fn value_type(&self, id: NodeId) -> ValueType {
        self.node(id).value_type
    }

    pub fn is_array(&self, id: NodeId) -> bool {
        self.node(id).is_array
    }

    pub fn is_const(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, ExprKind::Const(_))
    }

    pub fn finish(self, root: NodeId) -> Expr {
        Expr::new(self.nodes, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taql::value::Scalar;

    #[test]
    fn test_children_and_invariance() {
        let mut b = ExprBuilder::new();
        let one = b.constant(Scalar::Int(1).into());
        let x = b.push(
            ExprKind::Column { name: "X".into() },
            ValueType::Int,
            false,
        );
        let sum = b.push(
            ExprKind::Binary {
                op: BinaryOp::Plus,
                left: x,
                right: one,
            },
            ValueType::Int,
            false,
        );
        let expr = b.finish(sum);
        assert_eq!(expr.node(sum).children(), vec![x, one]);
        assert!(expr.is_invariant(one));
        assert!(!expr.is_invariant(sum));
        assert!(!expr.has_aggregate(sum));
        assert_eq!(expr.columns(), vec!["X".to_string()]);
        assert_eq!(expr.value_type(), ValueType::Int);
        assert!(!expr.is_constant());
    }
}
