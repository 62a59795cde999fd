//! Portable binary form of syntax trees.
//!
//! A tree is written depth first; every node starts with a one-byte kind
//! tag and absent optional children are written as tag 0. The byte image
//! starts with [`SYNTAX_VERSION`] so that older images stay readable.

use std::path::Path;

use log::debug;
use num_complex::Complex64;

use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::{Endian, Error, Result};
use crate::storage::file_header::{read_sealed, write_sealed};
use crate::storage::FileKind;

use super::syntax::{
    AltTab, BinaryOp, Calc, Const, Count, CreTab, Delete, Insert, Literal, Multi, Range, Regex,
    RenDropKind, Select, SortOrder, SyntaxNode, UnaryOp, Update,
};

/// Current version of the binary form.
pub const SYNTAX_VERSION: u32 = 1;

const ENDIAN: Endian = Endian::Little;

mod tag {
    pub const NONE: u8 = 0;
    pub const CONST: u8 = 1;
    pub const REGEX: u8 = 2;
    pub const UNARY: u8 = 3;
    pub const BINARY: u8 = 4;
    pub const MULTI: u8 = 5;
    pub const FUNC: u8 = 6;
    pub const RANGE: u8 = 7;
    pub const INDEX: u8 = 8;
    pub const KEYCOL: u8 = 9;
    pub const TABLE: u8 = 10;
    pub const COL: u8 = 11;
    pub const COLUMNS: u8 = 12;
    pub const GROUPBY: u8 = 13;
    pub const SORTKEY: u8 = 14;
    pub const SORT: u8 = 15;
    pub const LIMITOFF: u8 = 16;
    pub const GIVING: u8 = 17;
    pub const UPDEXPR: u8 = 18;
    pub const SELECT: u8 = 19;
    pub const COUNT: u8 = 20;
    pub const UPDATE: u8 = 21;
    pub const INSERT: u8 = 22;
    pub const DELETE: u8 = 23;
    pub const CALC: u8 = 24;
    pub const CRETAB: u8 = 25;
    pub const COLSPEC: u8 = 26;
    pub const RECFLD: u8 = 27;
    pub const UNIT: u8 = 28;
    pub const ALTTAB: u8 = 29;
    pub const ADDCOL: u8 = 30;
    pub const RENDROP: u8 = 31;
    pub const SETKEY: u8 = 32;
    pub const ADDROW: u8 = 33;
    pub const COPYCOL: u8 = 34;
    pub const DROPTAB: u8 = 35;
    pub const SHOW: u8 = 36;
}

const UNARY_OPS: [UnaryOp; 5] = [
    UnaryOp::Minus,
    UnaryOp::Not,
    UnaryOp::Exists,
    UnaryOp::NotExists,
    UnaryOp::BitNot,
];

const BINARY_OPS: [BinaryOp; 22] = [
    BinaryOp::Plus,
    BinaryOp::Minus,
    BinaryOp::Times,
    BinaryOp::Divide,
    BinaryOp::DivideTrunc,
    BinaryOp::Modulo,
    BinaryOp::Power,
    BinaryOp::Or,
    BinaryOp::And,
    BinaryOp::Eq,
    BinaryOp::Ne,
    BinaryOp::Gt,
    BinaryOp::Ge,
    BinaryOp::Lt,
    BinaryOp::Le,
    BinaryOp::In,
    BinaryOp::Index,
    BinaryOp::EqRegex,
    BinaryOp::NeRegex,
    BinaryOp::BitAnd,
    BinaryOp::BitXor,
    BinaryOp::BitOr,
];

const SORT_ORDERS: [SortOrder; 3] = [
    SortOrder::Default,
    SortOrder::Ascending,
    SortOrder::Descending,
];

const RENDROP_KINDS: [RenDropKind; 4] = [
    RenDropKind::RenameColumn,
    RenDropKind::DropColumn,
    RenDropKind::RenameKeyword,
    RenDropKind::DropKeyword,
];

fn index_of<T: PartialEq>(table: &[T], value: &T) -> u8 {
    table.iter().position(|v| v == value).unwrap_or_default() as u8
}

fn lookup<T: Copy>(table: &[T], code: u8, what: &str) -> Result<T> {
    table
        .get(code as usize)
        .copied()
        .ok_or_else(|| Error::internal(format!("unknown {} code {} in saved syntax tree", what, code)))
}

// ============================================================================
// Public entry points
// ============================================================================

/// Versioned byte image of a tree.
pub fn save(node: &SyntaxNode) -> Vec<u8> {
    let mut out = ByteWriter::new(ENDIAN);
    out.put_u32(SYNTAX_VERSION);
    write_node(&mut out, node);
    out.into_inner()
}

/// Rebuild a tree saved by [`save`].
///
/// # Errors
/// `StorageInternal` for a truncated image, an unknown tag or a version
/// newer than this library.
pub fn restore(data: &[u8]) -> Result<SyntaxNode> {
    let mut input = ByteReader::new(data, ENDIAN);
    let version = input.get_u32()?;
    if version == 0 || version > SYNTAX_VERSION {
        return Err(Error::internal(format!(
            "unsupported syntax tree version {}",
            version
        )));
    }
    let node = read_opt(&mut input)?
        .ok_or_else(|| Error::internal("saved syntax tree is empty"))?;
    if input.remaining() != 0 {
        return Err(Error::internal(format!(
            "{} trailing bytes after saved syntax tree",
            input.remaining()
        )));
    }
    Ok(*node)
}

/// Save a tree into a sealed file.
pub fn save_to_file(path: &Path, node: &SyntaxNode) -> Result<()> {
    let mut out = ByteWriter::new(ENDIAN);
    write_node(&mut out, node);
    write_sealed(path, FileKind::SyntaxTree, SYNTAX_VERSION, ENDIAN, out.as_slice())?;
    debug!("saved {} syntax tree to {}", node.kind_name(), path.display());
    Ok(())
}

pub fn restore_from_file(path: &Path) -> Result<SyntaxNode> {
    let (header, payload) = read_sealed(path)?;
    if header.kind != FileKind::SyntaxTree {
        return Err(Error::InvalidOperation(format!(
            "{} does not hold a syntax tree",
            path.display()
        )));
    }
    if header.version == 0 || header.version > SYNTAX_VERSION {
        return Err(Error::internal(format!(
            "unsupported syntax tree version {}",
            header.version
        )));
    }
    let mut input = ByteReader::new(&payload, header.endian);
    read_opt(&mut input)?
        .map(|node| *node)
        .ok_or_else(|| Error::internal("saved syntax tree is empty"))
}

// ============================================================================
// Writing
// ============================================================================

fn write_literal(out: &mut ByteWriter, value: &Literal) {
    match value {
        Literal::Bool(v) => {
            out.put_u8(0);
            out.put_bool(*v);
        }
        Literal::Int(v) => {
            out.put_u8(1);
            out.put_i64(*v);
        }
        Literal::Real(v) => {
            out.put_u8(2);
            out.put_f64(*v);
        }
        Literal::Complex(v) => {
            out.put_u8(3);
            out.put_f64(v.re);
            out.put_f64(v.im);
        }
        Literal::String(s) => {
            out.put_u8(4);
            out.put_str(s);
        }
        Literal::Time(v) => {
            out.put_u8(5);
            out.put_f64(*v);
        }
    }
}

fn write_opt(out: &mut ByteWriter, node: Option<&SyntaxNode>) {
    match node {
        Some(n) => write_node(out, n),
        None => out.put_u8(tag::NONE),
    }
}

fn write_box(out: &mut ByteWriter, node: &Option<Box<SyntaxNode>>) {
    write_opt(out, node.as_deref());
}

fn write_multi_body(out: &mut ByteWriter, m: &Multi) {
    out.put_bool(m.is_set);
    out.put_str(&m.prefix);
    out.put_str(&m.postfix);
    out.put_str(&m.sep);
    out.put_str(&m.sep2);
    out.put_u32(m.incr);
    out.put_u32(m.nodes.len() as u32);
    for node in &m.nodes {
        write_node(out, node);
    }
}

fn write_multi(out: &mut ByteWriter, m: &Multi) {
    out.put_u8(tag::MULTI);
    write_multi_body(out, m);
}

fn write_opt_multi(out: &mut ByteWriter, m: &Option<Multi>) {
    match m {
        Some(m) => write_multi(out, m),
        None => out.put_u8(tag::NONE),
    }
}

fn write_node(out: &mut ByteWriter, node: &SyntaxNode) {
    match node {
        SyntaxNode::Const(c) => {
            out.put_u8(tag::CONST);
            write_literal(out, &c.value);
            out.put_str(&c.unit);
            out.put_bool(c.is_table_name);
        }
        SyntaxNode::Regex(r) => {
            out.put_u8(tag::REGEX);
            out.put_str(&r.value);
            out.put_bool(r.case_insensitive);
            out.put_bool(r.negate);
            out.put_bool(r.ignore_blanks);
            out.put_i64(r.max_distance.map_or(-1, i64::from));
        }
        SyntaxNode::Unary { op, child } => {
            out.put_u8(tag::UNARY);
            out.put_u8(index_of(&UNARY_OPS, op));
            write_node(out, child);
        }
        SyntaxNode::Binary { op, left, right } => {
            out.put_u8(tag::BINARY);
            out.put_u8(index_of(&BINARY_OPS, op));
            write_node(out, left);
            write_node(out, right);
        }
        SyntaxNode::Multi(m) => write_multi(out, m),
        SyntaxNode::Func { name, args } => {
            out.put_u8(tag::FUNC);
            out.put_str(name);
            write_multi(out, args);
        }
        SyntaxNode::Range(r) => {
            out.put_u8(tag::RANGE);
            out.put_bool(r.left_closed);
            out.put_bool(r.right_closed);
            out.put_bool(r.mid_width);
            write_box(out, &r.start);
            write_box(out, &r.end);
        }
        SyntaxNode::Index {
            start,
            end,
            incr,
            colon,
        } => {
            out.put_u8(tag::INDEX);
            out.put_bool(*colon);
            write_box(out, start);
            write_box(out, end);
            write_box(out, incr);
        }
        SyntaxNode::KeyCol { name } => {
            out.put_u8(tag::KEYCOL);
            out.put_str(name);
        }
        SyntaxNode::Table { table, alias } => {
            out.put_u8(tag::TABLE);
            out.put_str(alias);
            write_node(out, table);
        }
        SyntaxNode::Col { expr, name, dtype } => {
            out.put_u8(tag::COL);
            out.put_str(name);
            out.put_str(dtype);
            write_node(out, expr);
        }
        SyntaxNode::Columns { distinct, nodes } => {
            out.put_u8(tag::COLUMNS);
            out.put_bool(*distinct);
            write_opt_multi(out, nodes);
        }
        SyntaxNode::Groupby { rollup, nodes } => {
            out.put_u8(tag::GROUPBY);
            out.put_bool(*rollup);
            write_multi(out, nodes);
        }
        SyntaxNode::SortKey { order, child } => {
            out.put_u8(tag::SORTKEY);
            out.put_u8(index_of(&SORT_ORDERS, order));
            write_node(out, child);
        }
        SyntaxNode::Sort {
            unique,
            descending,
            keys,
        } => {
            out.put_u8(tag::SORT);
            out.put_bool(*unique);
            out.put_bool(*descending);
            write_multi(out, keys);
        }
        SyntaxNode::LimitOff { limit, offset } => {
            out.put_u8(tag::LIMITOFF);
            write_box(out, limit);
            write_box(out, offset);
        }
        SyntaxNode::Giving { name, exprs } => {
            out.put_u8(tag::GIVING);
            out.put_str(name);
            write_opt_multi(out, exprs);
        }
        SyntaxNode::UpdExpr {
            name,
            indices,
            expr,
        } => {
            out.put_u8(tag::UPDEXPR);
            out.put_str(name);
            write_opt_multi(out, indices);
            write_node(out, expr);
        }
        SyntaxNode::Select(s) => {
            out.put_u8(tag::SELECT);
            write_node(out, &s.columns);
            write_opt_multi(out, &s.tables);
            write_box(out, &s.where_);
            write_box(out, &s.groupby);
            write_box(out, &s.having);
            write_box(out, &s.sort);
            write_box(out, &s.limitoff);
            write_box(out, &s.giving);
            write_opt_multi(out, &s.dminfo);
        }
        SyntaxNode::Count(c) => {
            out.put_u8(tag::COUNT);
            write_node(out, &c.columns);
            write_multi(out, &c.tables);
            write_box(out, &c.where_);
        }
        SyntaxNode::Update(u) => {
            out.put_u8(tag::UPDATE);
            write_multi(out, &u.tables);
            write_multi(out, &u.update);
            write_opt_multi(out, &u.from);
            write_box(out, &u.where_);
            write_box(out, &u.sort);
            write_box(out, &u.limitoff);
        }
        SyntaxNode::Insert(i) => {
            out.put_u8(tag::INSERT);
            write_multi(out, &i.tables);
            write_opt_multi(out, &i.columns);
            write_node(out, &i.values);
            write_box(out, &i.limit);
        }
        SyntaxNode::Delete(d) => {
            out.put_u8(tag::DELETE);
            write_multi(out, &d.tables);
            write_box(out, &d.where_);
            write_box(out, &d.sort);
            write_box(out, &d.limitoff);
        }
        SyntaxNode::Calc(c) => {
            out.put_u8(tag::CALC);
            write_opt_multi(out, &c.tables);
            write_node(out, &c.expr);
            write_box(out, &c.where_);
            write_box(out, &c.sort);
            write_box(out, &c.limitoff);
        }
        SyntaxNode::CreTab(c) => {
            out.put_u8(tag::CRETAB);
            write_node(out, &c.giving);
            write_box(out, &c.like);
            write_opt_multi(out, &c.like_drop);
            write_opt_multi(out, &c.columns);
            write_box(out, &c.limit);
            write_opt_multi(out, &c.dminfo);
        }
        SyntaxNode::ColSpec {
            name,
            like_col,
            dtype,
            spec,
        } => {
            out.put_u8(tag::COLSPEC);
            out.put_str(name);
            out.put_str(like_col);
            out.put_str(dtype);
            write_opt_multi(out, spec);
        }
        SyntaxNode::RecFld {
            name,
            values,
            dtype,
        } => {
            out.put_u8(tag::RECFLD);
            out.put_str(name);
            out.put_str(dtype);
            write_box(out, values);
        }
        SyntaxNode::Unit { unit, child } => {
            out.put_u8(tag::UNIT);
            out.put_str(unit);
            write_node(out, child);
        }
        SyntaxNode::AltTab(a) => {
            out.put_u8(tag::ALTTAB);
            write_node(out, &a.table);
            write_opt_multi(out, &a.from);
            write_multi(out, &a.commands);
        }
        SyntaxNode::AddCol { columns, dminfo } => {
            out.put_u8(tag::ADDCOL);
            write_multi(out, columns);
            write_opt_multi(out, dminfo);
        }
        SyntaxNode::RenDrop { kind, names } => {
            out.put_u8(tag::RENDROP);
            out.put_u8(index_of(&RENDROP_KINDS, kind));
            write_multi(out, names);
        }
        SyntaxNode::SetKey { keyvals } => {
            out.put_u8(tag::SETKEY);
            write_multi(out, keyvals);
        }
        SyntaxNode::AddRow { nrow } => {
            out.put_u8(tag::ADDROW);
            write_node(out, nrow);
        }
        SyntaxNode::CopyCol { names, dminfo } => {
            out.put_u8(tag::COPYCOL);
            write_multi(out, names);
            write_opt_multi(out, dminfo);
        }
        SyntaxNode::DropTab { tables } => {
            out.put_u8(tag::DROPTAB);
            write_multi(out, tables);
        }
        SyntaxNode::Show { names } => {
            out.put_u8(tag::SHOW);
            write_opt_multi(out, names);
        }
    }
}

// ============================================================================
// Reading
// ============================================================================

fn read_literal(input: &mut ByteReader<'_>) -> Result<Literal> {
    Ok(match input.get_u8()? {
        0 => Literal::Bool(input.get_bool()?),
        1 => Literal::Int(input.get_i64()?),
        2 => Literal::Real(input.get_f64()?),
        3 => {
            let re = input.get_f64()?;
            Literal::Complex(Complex64::new(re, input.get_f64()?))
        }
        4 => Literal::String(input.get_str()?),
        5 => Literal::Time(input.get_f64()?),
        other => {
            return Err(Error::internal(format!(
                "unknown literal code {} in saved syntax tree",
                other
            )))
        }
    })
}

fn required(input: &mut ByteReader<'_>, what: &str) -> Result<Box<SyntaxNode>> {
    read_opt(input)?
        .ok_or_else(|| Error::internal(format!("saved syntax tree lacks its {}", what)))
}

fn read_multi(input: &mut ByteReader<'_>) -> Result<Multi> {
    read_opt_multi(input)?.ok_or_else(|| Error::internal("saved syntax tree lacks a list"))
}

fn read_opt_multi(input: &mut ByteReader<'_>) -> Result<Option<Multi>> {
    match input.get_u8()? {
        tag::NONE => Ok(None),
        tag::MULTI => read_multi_body(input).map(Some),
        other => Err(Error::internal(format!(
            "expected a list in saved syntax tree, found tag {}",
            other
        ))),
    }
}

fn read_multi_body(input: &mut ByteReader<'_>) -> Result<Multi> {
    let is_set = input.get_bool()?;
    let prefix = input.get_str()?;
    let postfix = input.get_str()?;
    let sep = input.get_str()?;
    let sep2 = input.get_str()?;
    let incr = input.get_u32()?;
    let n = input.get_u32()? as usize;
    let mut nodes = Vec::with_capacity(n.min(1024));
    for _ in 0..n {
        nodes.push(*required(input, "list element")?);
    }
    Ok(Multi {
        prefix,
        postfix,
        sep,
        sep2,
        incr,
        is_set,
        nodes,
    })
}

fn read_opt(input: &mut ByteReader<'_>) -> Result<Option<Box<SyntaxNode>>> {
    let node = match input.get_u8()? {
        tag::NONE => return Ok(None),
        tag::CONST => {
            let value = read_literal(input)?;
            let unit = input.get_str()?;
            SyntaxNode::Const(Const {
                value,
                unit,
                is_table_name: input.get_bool()?,
            })
        }
        tag::REGEX => {
            let value = input.get_str()?;
            let case_insensitive = input.get_bool()?;
            let negate = input.get_bool()?;
            let ignore_blanks = input.get_bool()?;
            let max_distance = u32::try_from(input.get_i64()?).ok();
            SyntaxNode::Regex(Regex {
                value,
                case_insensitive,
                negate,
                ignore_blanks,
                max_distance,
            })
        }
        tag::UNARY => {
            let op = lookup(&UNARY_OPS, input.get_u8()?, "unary operator")?;
            SyntaxNode::Unary {
                op,
                child: required(input, "operand")?,
            }
        }
        tag::BINARY => {
            let op = lookup(&BINARY_OPS, input.get_u8()?, "binary operator")?;
            let left = required(input, "left operand")?;
            SyntaxNode::Binary {
                op,
                left,
                right: required(input, "right operand")?,
            }
        }
        tag::MULTI => SyntaxNode::Multi(read_multi_body(input)?),
        tag::FUNC => {
            let name = input.get_str()?;
            SyntaxNode::Func {
                name,
                args: read_multi(input)?,
            }
        }
        tag::RANGE => {
            let left_closed = input.get_bool()?;
            let right_closed = input.get_bool()?;
            let mid_width = input.get_bool()?;
            let start = read_opt(input)?;
            SyntaxNode::Range(Range {
                start,
                end: read_opt(input)?,
                left_closed,
                right_closed,
                mid_width,
            })
        }
        tag::INDEX => {
            let colon = input.get_bool()?;
            let start = read_opt(input)?;
            let end = read_opt(input)?;
            SyntaxNode::Index {
                start,
                end,
                incr: read_opt(input)?,
                colon,
            }
        }
        tag::KEYCOL => SyntaxNode::KeyCol {
            name: input.get_str()?,
        },
        tag::TABLE => {
            let alias = input.get_str()?;
            SyntaxNode::Table {
                table: required(input, "table")?,
                alias,
            }
        }
        tag::COL => {
            let name = input.get_str()?;
            let dtype = input.get_str()?;
            SyntaxNode::Col {
                expr: required(input, "column expression")?,
                name,
                dtype,
            }
        }
        tag::COLUMNS => {
            let distinct = input.get_bool()?;
            SyntaxNode::Columns {
                distinct,
                nodes: read_opt_multi(input)?,
            }
        }
        tag::GROUPBY => {
            let rollup = input.get_bool()?;
            SyntaxNode::Groupby {
                rollup,
                nodes: read_multi(input)?,
            }
        }
        tag::SORTKEY => {
            let order = lookup(&SORT_ORDERS, input.get_u8()?, "sort order")?;
            SyntaxNode::SortKey {
                order,
                child: required(input, "sort key")?,
            }
        }
        tag::SORT => {
            let unique = input.get_bool()?;
            let descending = input.get_bool()?;
            SyntaxNode::Sort {
                unique,
                descending,
                keys: read_multi(input)?,
            }
        }
        tag::LIMITOFF => {
            let limit = read_opt(input)?;
            SyntaxNode::LimitOff {
                limit,
                offset: read_opt(input)?,
            }
        }
        tag::GIVING => {
            let name = input.get_str()?;
            SyntaxNode::Giving {
                name,
                exprs: read_opt_multi(input)?,
            }
        }
        tag::UPDEXPR => {
            let name = input.get_str()?;
            let indices = read_opt_multi(input)?;
            SyntaxNode::UpdExpr {
                name,
                indices,
                expr: required(input, "update expression")?,
            }
        }
        tag::SELECT => SyntaxNode::Select(Box::new(Select {
            columns: required(input, "column list")?,
            tables: read_opt_multi(input)?,
            where_: read_opt(input)?,
            groupby: read_opt(input)?,
            having: read_opt(input)?,
            sort: read_opt(input)?,
            limitoff: read_opt(input)?,
            giving: read_opt(input)?,
            dminfo: read_opt_multi(input)?,
        })),
        tag::COUNT => SyntaxNode::Count(Box::new(Count {
            columns: required(input, "column list")?,
            tables: read_multi(input)?,
            where_: read_opt(input)?,
        })),
        tag::UPDATE => SyntaxNode::Update(Box::new(Update {
            tables: read_multi(input)?,
            update: read_multi(input)?,
            from: read_opt_multi(input)?,
            where_: read_opt(input)?,
            sort: read_opt(input)?,
            limitoff: read_opt(input)?,
        })),
        tag::INSERT => SyntaxNode::Insert(Box::new(Insert {
            tables: read_multi(input)?,
            columns: read_opt_multi(input)?,
            values: required(input, "values")?,
            limit: read_opt(input)?,
        })),
        tag::DELETE => SyntaxNode::Delete(Box::new(Delete {
            tables: read_multi(input)?,
            where_: read_opt(input)?,
            sort: read_opt(input)?,
            limitoff: read_opt(input)?,
        })),
        tag::CALC => SyntaxNode::Calc(Box::new(Calc {
            tables: read_opt_multi(input)?,
            expr: required(input, "expression")?,
            where_: read_opt(input)?,
            sort: read_opt(input)?,
            limitoff: read_opt(input)?,
        })),
        tag::CRETAB => SyntaxNode::CreTab(Box::new(CreTab {
            giving: required(input, "table name")?,
            like: read_opt(input)?,
            like_drop: read_opt_multi(input)?,
            columns: read_opt_multi(input)?,
            limit: read_opt(input)?,
            dminfo: read_opt_multi(input)?,
        })),
        tag::COLSPEC => {
            let name = input.get_str()?;
            let like_col = input.get_str()?;
            let dtype = input.get_str()?;
            SyntaxNode::ColSpec {
                name,
                like_col,
                dtype,
                spec: read_opt_multi(input)?,
            }
        }
        tag::RECFLD => {
            let name = input.get_str()?;
            let dtype = input.get_str()?;
            SyntaxNode::RecFld {
                name,
                values: read_opt(input)?,
                dtype,
            }
        }
        tag::UNIT => {
            let unit = input.get_str()?;
            SyntaxNode::Unit {
                unit,
                child: required(input, "unit operand")?,
            }
        }
        tag::ALTTAB => SyntaxNode::AltTab(Box::new(AltTab {
            table: required(input, "table")?,
            from: read_opt_multi(input)?,
            commands: read_multi(input)?,
        })),
        tag::ADDCOL => {
            let columns = read_multi(input)?;
            SyntaxNode::AddCol {
                columns,
                dminfo: read_opt_multi(input)?,
            }
        }
        tag::RENDROP => {
            let kind = lookup(&RENDROP_KINDS, input.get_u8()?, "rename/drop kind")?;
            SyntaxNode::RenDrop {
                kind,
                names: read_multi(input)?,
            }
        }
        tag::SETKEY => SyntaxNode::SetKey {
            keyvals: read_multi(input)?,
        },
        tag::ADDROW => SyntaxNode::AddRow {
            nrow: required(input, "row count")?,
        },
        tag::COPYCOL => {
            let names = read_multi(input)?;
            SyntaxNode::CopyCol {
                names,
                dminfo: read_opt_multi(input)?,
            }
        }
        tag::DROPTAB => SyntaxNode::DropTab {
            tables: read_multi(input)?,
        },
        tag::SHOW => SyntaxNode::Show {
            names: read_opt_multi(input)?,
        },
        other => {
            return Err(Error::internal(format!(
                "unknown node tag {} in saved syntax tree",
                other
            )))
        }
    };
    Ok(Some(Box::new(node)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> SyntaxNode {
        let cond = SyntaxNode::Binary {
            op: BinaryOp::Gt,
            left: Box::new(SyntaxNode::KeyCol { name: "X".into() }),
            right: Box::new(SyntaxNode::Const(Const::new(Literal::Real(1.5)))),
        };
        SyntaxNode::Select(Box::new(Select {
            columns: Box::new(SyntaxNode::Columns {
                distinct: true,
                nodes: None,
            }),
            tables: Some(Multi::new(vec![SyntaxNode::Table {
                table: Box::new(SyntaxNode::Const(Const::table_arg(1))),
                alias: "t".into(),
            }])),
            where_: Some(Box::new(cond)),
            groupby: None,
            having: None,
            sort: Some(Box::new(SyntaxNode::Sort {
                unique: false,
                descending: true,
                keys: Multi::new(vec![SyntaxNode::SortKey {
                    order: SortOrder::Ascending,
                    child: Box::new(SyntaxNode::KeyCol { name: "X".into() }),
                }]),
            })),
            limitoff: Some(Box::new(SyntaxNode::LimitOff {
                limit: Some(Box::new(SyntaxNode::Const(Const::new(Literal::Int(2))))),
                offset: None,
            })),
            giving: None,
            dminfo: None,
        }))
    }

    #[test]
    fn test_save_restore() {
        let node = sample();
        let restored = restore(&save(&node)).unwrap();
        assert_eq!(restored, node);
    }

    #[test]
    fn test_restore_rejects_newer_version() {
        let mut data = save(&sample());
        data[0] = 99;
        assert!(matches!(restore(&data), Err(Error::StorageInternal(_))));
    }

    #[test]
    fn test_restore_truncated() {
        let data = save(&sample());
        assert!(restore(&data[..data.len() - 3]).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("query.syn");
        save_to_file(&path, &sample()).unwrap();
        assert_eq!(restore_from_file(&path).unwrap(), sample());
    }
}
