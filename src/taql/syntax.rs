//! Syntax tree of a parsed query.
//!
//! Every node prints back (through [`fmt::Display`] and [`SyntaxNode::show`])
//! to text that parses to an equivalent tree. Binary operands are
//! parenthesized, so printed text never depends on operator precedence.

use std::fmt;

use num_complex::Complex64;

use super::lexer::is_keyword;
use super::value::format_mjd;

/// Literal value of a constant node.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Real(f64),
    Complex(Complex64),
    String(String),
    /// Modified Julian Date in days.
    Time(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Const {
    pub value: Literal,
    /// Unit carried along with the value; never converted.
    pub unit: String,
    /// The constant names a table (`$1` or a path).
    pub is_table_name: bool,
}

impl Const {
    pub fn new(value: Literal) -> Self {
        Self {
            value,
            unit: String::new(),
            is_table_name: false,
        }
    }

    pub fn table_arg(n: u32) -> Self {
        Self {
            value: Literal::Int(i64::from(n)),
            unit: String::new(),
            is_table_name: true,
        }
    }

    pub fn table_path(path: impl Into<String>) -> Self {
        Self {
            value: Literal::String(path.into()),
            unit: String::new(),
            is_table_name: true,
        }
    }
}

/// Pattern literal used with `~` and `!~`.
#[derive(Debug, Clone, PartialEq)]
pub struct Regex {
    /// Pattern with its form marker: `p/glob/`, `m/search/`, `f/full/`
    /// or a quoted string.
    pub value: String,
    pub case_insensitive: bool,
    pub negate: bool,
    pub ignore_blanks: bool,
    pub max_distance: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Not,
    Exists,
    NotExists,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Times,
    Divide,
    DivideTrunc,
    Modulo,
    Power,
    Or,
    And,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    Index,
    EqRegex,
    NeRegex,
    BitAnd,
    BitXor,
    BitOr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Times => "*",
            BinaryOp::Divide => "/",
            BinaryOp::DivideTrunc => "//",
            BinaryOp::Modulo => "%",
            BinaryOp::Power => "**",
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::In => " IN ",
            BinaryOp::Index | BinaryOp::EqRegex | BinaryOp::NeRegex => "",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le
        )
    }
}

/// A list of nodes printed with a prefix, postfix and separators.
///
/// `sep2` is used instead of `sep` inside groups of `incr` nodes, so that
/// `a TO b, c TO d` is a multi of four names with `incr = 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Multi {
    pub prefix: String,
    pub postfix: String,
    pub sep: String,
    pub sep2: String,
    pub incr: u32,
    /// The list is a set or array literal rather than an argument list.
    pub is_set: bool,
    pub nodes: Vec<SyntaxNode>,
}

impl Multi {
    pub fn new(nodes: Vec<SyntaxNode>) -> Self {
        Self {
            prefix: String::new(),
            postfix: String::new(),
            sep: ",".into(),
            sep2: String::new(),
            incr: 1,
            is_set: false,
            nodes,
        }
    }

    pub fn bracketed(prefix: &str, postfix: &str, nodes: Vec<SyntaxNode>) -> Self {
        Self {
            prefix: prefix.into(),
            postfix: postfix.into(),
            ..Self::new(nodes)
        }
    }

    /// A `[..]` set or array literal.
    pub fn set(nodes: Vec<SyntaxNode>) -> Self {
        Self {
            is_set: true,
            ..Self::bracketed("[", "]", nodes)
        }
    }

    /// Pairs printed as `a TO b,c TO d`.
    pub fn pairs(nodes: Vec<SyntaxNode>, word: &str) -> Self {
        Self {
            sep2: word.into(),
            incr: 2,
            ..Self::new(nodes)
        }
    }

    pub fn with_sep(mut self, sep: &str) -> Self {
        self.sep = sep.into();
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub start: Option<Box<SyntaxNode>>,
    pub end: Option<Box<SyntaxNode>>,
    pub left_closed: bool,
    pub right_closed: bool,
    /// `start` is the midpoint and `end` the full width.
    pub mid_width: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Default,
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenDropKind {
    RenameColumn,
    DropColumn,
    RenameKeyword,
    DropKeyword,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// A `Columns` node.
    pub columns: Box<SyntaxNode>,
    /// `Table` nodes; `None` reads `$1`.
    pub tables: Option<Multi>,
    pub where_: Option<Box<SyntaxNode>>,
    pub groupby: Option<Box<SyntaxNode>>,
    pub having: Option<Box<SyntaxNode>>,
    pub sort: Option<Box<SyntaxNode>>,
    pub limitoff: Option<Box<SyntaxNode>>,
    pub giving: Option<Box<SyntaxNode>>,
    pub dminfo: Option<Multi>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Count {
    pub columns: Box<SyntaxNode>,
    pub tables: Multi,
    pub where_: Option<Box<SyntaxNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub tables: Multi,
    /// `UpdExpr` nodes.
    pub update: Multi,
    pub from: Option<Multi>,
    pub where_: Option<Box<SyntaxNode>>,
    pub sort: Option<Box<SyntaxNode>>,
    pub limitoff: Option<Box<SyntaxNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub tables: Multi,
    pub columns: Option<Multi>,
    /// A multi of `[..]` value lists, or a `Select`.
    pub values: Box<SyntaxNode>,
    pub limit: Option<Box<SyntaxNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub tables: Multi,
    pub where_: Option<Box<SyntaxNode>>,
    pub sort: Option<Box<SyntaxNode>>,
    pub limitoff: Option<Box<SyntaxNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calc {
    pub tables: Option<Multi>,
    pub expr: Box<SyntaxNode>,
    pub where_: Option<Box<SyntaxNode>>,
    pub sort: Option<Box<SyntaxNode>>,
    pub limitoff: Option<Box<SyntaxNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreTab {
    /// A `Giving` node naming the new table.
    pub giving: Box<SyntaxNode>,
    /// Template table followed by an optional multi of dropped columns.
    pub like: Option<Box<SyntaxNode>>,
    pub like_drop: Option<Multi>,
    /// `ColSpec` nodes.
    pub columns: Option<Multi>,
    pub limit: Option<Box<SyntaxNode>>,
    pub dminfo: Option<Multi>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AltTab {
    pub table: Box<SyntaxNode>,
    pub from: Option<Multi>,
    pub commands: Multi,
}

/// A node of the query syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxNode {
    Const(Const),
    Regex(Regex),
    Unary {
        op: UnaryOp,
        child: Box<SyntaxNode>,
    },
    Binary {
        op: BinaryOp,
        left: Box<SyntaxNode>,
        right: Box<SyntaxNode>,
    },
    Multi(Multi),
    Func {
        name: String,
        args: Multi,
    },
    Range(Range),
    /// `start[:end[:incr]]`; `colon` tells `a[1:]` from `a[1]`.
    Index {
        start: Option<Box<SyntaxNode>>,
        end: Option<Box<SyntaxNode>>,
        incr: Option<Box<SyntaxNode>>,
        colon: bool,
    },
    KeyCol {
        name: String,
    },
    Table {
        table: Box<SyntaxNode>,
        alias: String,
    },
    Col {
        expr: Box<SyntaxNode>,
        name: String,
        dtype: String,
    },
    Columns {
        distinct: bool,
        nodes: Option<Multi>,
    },
    Groupby {
        rollup: bool,
        nodes: Multi,
    },
    SortKey {
        order: SortOrder,
        child: Box<SyntaxNode>,
    },
    Sort {
        unique: bool,
        descending: bool,
        keys: Multi,
    },
    LimitOff {
        limit: Option<Box<SyntaxNode>>,
        offset: Option<Box<SyntaxNode>>,
    },
    /// Result table name, or a list of expressions.
    Giving {
        name: String,
        exprs: Option<Multi>,
    },
    UpdExpr {
        name: String,
        indices: Option<Multi>,
        expr: Box<SyntaxNode>,
    },
    Select(Box<Select>),
    Count(Box<Count>),
    Update(Box<Update>),
    Insert(Box<Insert>),
    Delete(Box<Delete>),
    Calc(Box<Calc>),
    CreTab(Box<CreTab>),
    ColSpec {
        name: String,
        like_col: String,
        dtype: String,
        spec: Option<Multi>,
    },
    RecFld {
        name: String,
        values: Option<Box<SyntaxNode>>,
        dtype: String,
    },
    Unit {
        unit: String,
        child: Box<SyntaxNode>,
    },
    AltTab(Box<AltTab>),
    AddCol {
        columns: Multi,
        dminfo: Option<Multi>,
    },
    RenDrop {
        kind: RenDropKind,
        names: Multi,
    },
    SetKey {
        keyvals: Multi,
    },
    AddRow {
        nrow: Box<SyntaxNode>,
    },
    CopyCol {
        names: Multi,
        dminfo: Option<Multi>,
    },
    DropTab {
        tables: Multi,
    },
    Show {
        names: Option<Multi>,
    },
}

impl SyntaxNode {
    /// Text that parses back to an equivalent tree.
    pub fn show(&self) -> String {
        self.to_string()
    }

    /// Statement kinds, as opposed to expressions and clauses.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            SyntaxNode::Select(_)
                | SyntaxNode::Count(_)
                | SyntaxNode::Update(_)
                | SyntaxNode::Insert(_)
                | SyntaxNode::Delete(_)
                | SyntaxNode::Calc(_)
                | SyntaxNode::CreTab(_)
                | SyntaxNode::AltTab(_)
                | SyntaxNode::DropTab { .. }
                | SyntaxNode::Show { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SyntaxNode::Const(_) => "Const",
            SyntaxNode::Regex(_) => "Regex",
            SyntaxNode::Unary { .. } => "Unary",
            SyntaxNode::Binary { .. } => "Binary",
            SyntaxNode::Multi(_) => "Multi",
            SyntaxNode::Func { .. } => "Func",
            SyntaxNode::Range(_) => "Range",
            SyntaxNode::Index { .. } => "Index",
            SyntaxNode::KeyCol { .. } => "KeyCol",
            SyntaxNode::Table { .. } => "Table",
            SyntaxNode::Col { .. } => "Col",
            SyntaxNode::Columns { .. } => "Columns",
            SyntaxNode::Groupby { .. } => "Groupby",
            SyntaxNode::SortKey { .. } => "SortKey",
            SyntaxNode::Sort { .. } => "Sort",
            SyntaxNode::LimitOff { .. } => "LimitOff",
            SyntaxNode::Giving { .. } => "Giving",
            SyntaxNode::UpdExpr { .. } => "UpdExpr",
            SyntaxNode::Select(_) => "Select",
            SyntaxNode::Count(_) => "Count",
            SyntaxNode::Update(_) => "Update",
            SyntaxNode::Insert(_) => "Insert",
            SyntaxNode::Delete(_) => "Delete",
            SyntaxNode::Calc(_) => "Calc",
            SyntaxNode::CreTab(_) => "CreTab",
            SyntaxNode::ColSpec { .. } => "ColSpec",
            SyntaxNode::RecFld { .. } => "RecFld",
            SyntaxNode::Unit { .. } => "Unit",
            SyntaxNode::AltTab(_) => "AltTab",
            SyntaxNode::AddCol { .. } => "AddCol",
            SyntaxNode::RenDrop { .. } => "RenDrop",
            SyntaxNode::SetKey { .. } => "SetKey",
            SyntaxNode::AddRow { .. } => "AddRow",
            SyntaxNode::CopyCol { .. } => "CopyCol",
            SyntaxNode::DropTab { .. } => "DropTab",
            SyntaxNode::Show { .. } => "Show",
        }
    }
}

// ============================================================================
// Printing
// ============================================================================

/// A name as an identifier when it lexes as one, else quoted.
pub(crate) fn escape_name(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_keyword(&name.to_ascii_uppercase());
    if plain {
        name.to_string()
    } else {
        quote(name)
    }
}

fn quote(s: &str) -> String {
    if s.contains('\'') {
        format!("\"{}\"", s)
    } else {
        format!("'{}'", s)
    }
}

/// Shortest text of a real that still lexes as a real.
fn real_text(v: f64) -> String {
    let text = format!("{:?}", v);
    if text.contains(['.', 'e', 'E']) || !v.is_finite() {
        text
    } else {
        format!("{}.", text)
    }
}

fn show_opt(f: &mut fmt::Formatter<'_>, lead: &str, node: &Option<Box<SyntaxNode>>) -> fmt::Result {
    match node {
        Some(n) => write!(f, "{}{}", lead, n),
        None => Ok(()),
    }
}

fn show_tables(f: &mut fmt::Formatter<'_>, lead: &str, tables: &Option<Multi>) -> fmt::Result {
    match tables {
        Some(t) => write!(f, "{}{}", lead, t),
        None => Ok(()),
    }
}

/// Statements nested inside an expression or a table list are parenthesized.
fn show_nested(f: &mut fmt::Formatter<'_>, node: &SyntaxNode) -> fmt::Result {
    if node.is_statement() {
        write!(f, "({})", node)
    } else {
        write!(f, "{}", node)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(true) => f.write_str("TRUE"),
            Literal::Bool(false) => f.write_str("FALSE"),
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Real(v) => f.write_str(&real_text(*v)),
            Literal::Complex(c) => {
                if c.re != 0.0 {
                    write!(f, "{}+", real_text(c.re))?;
                }
                write!(f, "{}i", real_text(c.im))
            }
            Literal::String(s) => f.write_str(&quote(s)),
            Literal::Time(mjd) => f.write_str(&format_mjd(*mjd)),
        }
    }
}

impl fmt::Display for Multi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)?;
        let incr = self.incr.max(1) as usize;
        for (i, node) in self.nodes.iter().enumerate() {
            if i != 0 {
                f.write_str(if i % incr == 0 { &self.sep } else { &self.sep2 })?;
            }
            show_nested(f, node)?;
        }
        f.write_str(&self.postfix)
    }
}

impl fmt::Display for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxNode::Const(c) => {
                if !c.unit.is_empty() {
                    f.write_str("(")?;
                }
                match (&c.value, c.is_table_name) {
                    (Literal::Int(n), true) => write!(f, "${}", n)?,
                    (Literal::String(s), true) => f.write_str(&escape_name(s))?,
                    (value, _) => write!(f, "{}", value)?,
                }
                if !c.unit.is_empty() {
                    write!(f, "){}", quote(&c.unit))?;
                }
                Ok(())
            }
            SyntaxNode::Regex(r) => {
                if r.negate {
                    f.write_str("!")?;
                }
                write!(f, "~{}", r.value)?;
                if r.case_insensitive {
                    f.write_str("i")?;
                }
                if r.ignore_blanks {
                    f.write_str("b")?;
                }
                if let Some(d) = r.max_distance {
                    write!(f, "{}", d)?;
                }
                Ok(())
            }
            SyntaxNode::Unary { op, child } => match op {
                UnaryOp::Minus => write!(f, "-({})", child),
                UnaryOp::Not => write!(f, "NOT({})", child),
                UnaryOp::BitNot => write!(f, "~({})", child),
                UnaryOp::Exists => {
                    f.write_str("EXISTS ")?;
                    show_nested(f, child)
                }
                UnaryOp::NotExists => {
                    f.write_str("NOT EXISTS ")?;
                    show_nested(f, child)
                }
            },
            SyntaxNode::Binary { op, left, right } => {
                write!(f, "({})", left)?;
                match op {
                    BinaryOp::In => {
                        f.write_str(" IN ")?;
                        show_nested(f, right)
                    }
                    BinaryOp::Index => write!(f, "{}", right),
                    BinaryOp::EqRegex | BinaryOp::NeRegex => write!(f, "{}", right),
                    _ => write!(f, "{}({})", op.symbol(), right),
                }
            }
            SyntaxNode::Multi(m) => write!(f, "{}", m),
            SyntaxNode::Func { name, args } => write!(f, "{}({})", name, args),
            SyntaxNode::Range(r) => {
                if r.mid_width {
                    f.write_str("(")?;
                    show_opt(f, "", &r.start)?;
                    f.write_str(")<:>(")?;
                    show_opt(f, "", &r.end)?;
                    return f.write_str(")");
                }
                f.write_str(if r.left_closed { "{" } else { "<" })?;
                show_opt(f, "", &r.start)?;
                f.write_str(",")?;
                show_opt(f, "", &r.end)?;
                f.write_str(if r.right_closed { "}" } else { ">" })
            }
            SyntaxNode::Index {
                start,
                end,
                incr,
                colon,
            } => {
                show_opt(f, "", start)?;
                if *colon || end.is_some() || incr.is_some() {
                    f.write_str(":")?;
                }
                show_opt(f, "", end)?;
                show_opt(f, ":", incr)
            }
            SyntaxNode::KeyCol { name } => f.write_str(&escape_name(name)),
            SyntaxNode::Table { table, alias } => {
                show_nested(f, table)?;
                if !alias.is_empty() {
                    write!(f, " AS {}", escape_name(alias))?;
                }
                Ok(())
            }
            SyntaxNode::Col { expr, name, dtype } => {
                write!(f, "{}", expr)?;
                if !name.is_empty() {
                    write!(f, " AS {}", escape_name(name))?;
                    if !dtype.is_empty() {
                        write!(f, " {}", dtype)?;
                    }
                }
                Ok(())
            }
            SyntaxNode::Columns { distinct, nodes } => {
                if *distinct {
                    f.write_str(" DISTINCT")?;
                }
                match nodes {
                    Some(m) if !m.is_empty() => write!(f, " {}", m),
                    _ => f.write_str(" *"),
                }
            }
            SyntaxNode::Groupby { rollup, nodes } => {
                f.write_str(" GROUPBY")?;
                if *rollup {
                    f.write_str(" ROLLUP")?;
                }
                write!(f, " {}", nodes)
            }
            SyntaxNode::SortKey { order, child } => {
                write!(f, "{}", child)?;
                match order {
                    SortOrder::Ascending => f.write_str(" ASC"),
                    SortOrder::Descending => f.write_str(" DESC"),
                    SortOrder::Default => Ok(()),
                }
            }
            SyntaxNode::Sort {
                unique,
                descending,
                keys,
            } => {
                f.write_str(" ORDERBY")?;
                if *unique {
                    f.write_str(" UNIQUE")?;
                }
                if *descending {
                    f.write_str(" DESC")?;
                }
                write!(f, " {}", keys)
            }
            SyntaxNode::LimitOff { limit, offset } => {
                show_opt(f, " LIMIT ", limit)?;
                show_opt(f, " OFFSET ", offset)
            }
            SyntaxNode::Giving { name, exprs } => match exprs {
                Some(m) => write!(f, "{}", m),
                None => f.write_str(&escape_name(name)),
            },
            SyntaxNode::UpdExpr {
                name,
                indices,
                expr,
            } => {
                f.write_str(&escape_name(name))?;
                if let Some(ix) = indices {
                    write!(f, "{}", ix)?;
                }
                write!(f, "={}", expr)
            }
            SyntaxNode::Select(s) => {
                write!(f, "SELECT{}", s.columns)?;
                show_tables(f, " FROM ", &s.tables)?;
                show_opt(f, " WHERE ", &s.where_)?;
                show_opt(f, "", &s.groupby)?;
                show_opt(f, " HAVING ", &s.having)?;
                show_opt(f, "", &s.sort)?;
                show_opt(f, "", &s.limitoff)?;
                show_opt(f, " GIVING ", &s.giving)?;
                show_tables(f, " DMINFO ", &s.dminfo)
            }
            SyntaxNode::Count(c) => {
                let columns = c.columns.to_string();
                write!(f, "COUNT {} FROM {}", columns.trim_start(), c.tables)?;
                show_opt(f, " WHERE ", &c.where_)
            }
            SyntaxNode::Update(u) => {
                write!(f, "UPDATE {} SET {}", u.tables, u.update)?;
                show_tables(f, " FROM ", &u.from)?;
                show_opt(f, " WHERE ", &u.where_)?;
                show_opt(f, "", &u.sort)?;
                show_opt(f, "", &u.limitoff)
            }
            SyntaxNode::Insert(i) => {
                f.write_str("INSERT")?;
                show_opt(f, " LIMIT ", &i.limit)?;
                write!(f, " INTO {}", i.tables)?;
                if let Some(cols) = &i.columns {
                    write!(f, " [{}]", cols)?;
                }
                write!(f, " {}", i.values)
            }
            SyntaxNode::Delete(d) => {
                write!(f, "DELETE FROM {}", d.tables)?;
                show_opt(f, " WHERE ", &d.where_)?;
                show_opt(f, "", &d.sort)?;
                show_opt(f, "", &d.limitoff)
            }
            SyntaxNode::Calc(c) => {
                write!(f, "CALC {}", c.expr)?;
                show_tables(f, " FROM ", &c.tables)?;
                show_opt(f, " WHERE ", &c.where_)?;
                show_opt(f, "", &c.sort)?;
                show_opt(f, "", &c.limitoff)
            }
            SyntaxNode::CreTab(c) => {
                write!(f, "CREATE TABLE {}", c.giving)?;
                if let Some(like) = &c.like {
                    write!(f, " LIKE {}", like)?;
                    show_tables(f, " DROP COLUMN ", &c.like_drop)?;
                }
                if let Some(cols) = c.columns.as_ref().filter(|m| !m.is_empty()) {
                    if c.like.is_some() {
                        f.write_str(" ADD COLUMN ")?;
                    } else {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", cols)?;
                }
                show_opt(f, " LIMIT ", &c.limit)?;
                show_tables(f, " DMINFO ", &c.dminfo)
            }
            SyntaxNode::ColSpec {
                name,
                like_col,
                dtype,
                spec,
            } => {
                f.write_str(&escape_name(name))?;
                if !like_col.is_empty() {
                    write!(f, " LIKE {}", escape_name(like_col))?;
                }
                if !dtype.is_empty() {
                    write!(f, " {}", dtype)?;
                }
                if let Some(s) = spec {
                    write!(f, " {}", s)?;
                }
                Ok(())
            }
            SyntaxNode::RecFld {
                name,
                values,
                dtype,
            } => {
                if !name.is_empty() {
                    write!(f, "{}=", escape_name(name))?;
                }
                match values {
                    Some(v) => write!(f, "{}", v)?,
                    None => f.write_str("[]")?,
                }
                if !dtype.is_empty() {
                    write!(f, " AS {}", dtype)?;
                }
                Ok(())
            }
            SyntaxNode::Unit { unit, child } => write!(f, "({}){}", child, quote(unit)),
            SyntaxNode::AltTab(a) => {
                write!(f, "ALTER TABLE {}", a.table)?;
                show_tables(f, " FROM ", &a.from)?;
                write!(f, " {}", a.commands)
            }
            SyntaxNode::AddCol { columns, dminfo } => {
                write!(f, "ADD COLUMN {}", columns)?;
                show_tables(f, " DMINFO ", dminfo)
            }
            SyntaxNode::RenDrop { kind, names } => {
                f.write_str(match kind {
                    RenDropKind::RenameColumn => "RENAME COLUMN ",
                    RenDropKind::DropColumn => "DROP COLUMN ",
                    RenDropKind::RenameKeyword => "RENAME KEYWORD ",
                    RenDropKind::DropKeyword => "DROP KEYWORD ",
                })?;
                write!(f, "{}", names)
            }
            SyntaxNode::SetKey { keyvals } => write!(f, "SET KEYWORD {}", keyvals),
            SyntaxNode::AddRow { nrow } => write!(f, "ADD ROW {}", nrow),
            SyntaxNode::CopyCol { names, dminfo } => {
                write!(f, "COPY COLUMN {}", names)?;
                show_tables(f, " DMINFO ", dminfo)
            }
            SyntaxNode::DropTab { tables } => write!(f, "DROP TABLE {}", tables),
            SyntaxNode::Show { names } => {
                f.write_str("SHOW")?;
                if let Some(n) = names.as_ref().filter(|m| !m.is_empty()) {
                    write!(f, " {}", n)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Box<SyntaxNode> {
        Box::new(SyntaxNode::Const(Const::new(Literal::Int(v))))
    }

    fn col(name: &str) -> Box<SyntaxNode> {
        Box::new(SyntaxNode::KeyCol { name: name.into() })
    }

    #[test]
    fn test_show_binary_and_unary() {
        let node = SyntaxNode::Binary {
            op: BinaryOp::Gt,
            left: col("X"),
            right: int(1),
        };
        assert_eq!(node.show(), "(X)>(1)");
        let not = SyntaxNode::Unary {
            op: UnaryOp::Not,
            child: Box::new(node),
        };
        assert_eq!(not.show(), "NOT((X)>(1))");
    }

    #[test]
    fn test_show_constants() {
        let c = |v| SyntaxNode::Const(Const::new(v)).show();
        assert_eq!(c(Literal::Bool(true)), "TRUE");
        assert_eq!(c(Literal::Real(2.0)), "2.0");
        assert_eq!(c(Literal::Complex(Complex64::new(0.0, 2.5))), "2.5i");
        assert_eq!(c(Literal::String("it's".into())), "\"it's\"");
        assert_eq!(c(Literal::Time(0.0)), "1858/11/17/00:00:00.000");
        let mut with_unit = Const::new(Literal::Int(3));
        with_unit.unit = "km".into();
        assert_eq!(SyntaxNode::Const(with_unit).show(), "(3)'km'");
        assert_eq!(SyntaxNode::Const(Const::table_arg(2)).show(), "$2");
        assert_eq!(
            SyntaxNode::Const(Const::table_path("/tmp/my table")).show(),
            "'/tmp/my table'"
        );
    }

    #[test]
    fn test_show_multi_pairs() {
        let m = Multi::pairs(vec![*col("a"), *col("b"), *col("c"), *col("d")], " TO ");
        assert_eq!(m.to_string(), "a TO b,c TO d");
    }

    #[test]
    fn test_show_ranges_and_index() {
        let r = SyntaxNode::Range(Range {
            start: Some(int(1)),
            end: None,
            left_closed: true,
            right_closed: false,
            mid_width: false,
        });
        assert_eq!(r.show(), "{1,>");
        let ix = SyntaxNode::Index {
            start: None,
            end: Some(int(3)),
            incr: Some(int(2)),
            colon: true,
        };
        assert_eq!(ix.show(), ":3:2");
        let open = SyntaxNode::Index {
            start: Some(int(1)),
            end: None,
            incr: None,
            colon: true,
        };
        assert_eq!(open.show(), "1:");
    }

    #[test]
    fn test_escape_name() {
        assert_eq!(escape_name("X"), "X");
        assert_eq!(escape_name("select"), "'select'");
        assert_eq!(escape_name("a/b"), "'a/b'");
    }
}
