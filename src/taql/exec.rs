//! Statement execution.
//!
//! A statement runs against the tables passed as `$1`, `$2`, ... and any
//! table named by path. Selecting plain columns yields a reference table
//! over the input; computed columns, grouping and aggregates yield a
//! materialized [`ResultSet`].

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::fs;
use std::ops::Range;
use std::path::Path;

use log::debug;

use crate::array::{Array, DataType, Shape};
use crate::common::{Error, Result, StorageOptions};
use crate::table::{ColumnDesc, ColumnKind, Table, TableDesc};

use super::compile::{compile_expr, compile_predicate, Compiler};
use super::eval::{resolve_slice, Evaluator, IndexBounds};
use super::expr::Expr;
use super::function::function_names;
use super::parser::ParserLock;
use super::ranges::{in_ranges, ranges};
use super::syntax::{
    AltTab, Calc, Count, CreTab, Delete, Insert, Literal, Multi, RenDropKind, Select, SortOrder,
    SyntaxNode, Update,
};
use super::value::{Scalar, Value, ValueType};

/// Name of the count column of `COUNT`.
pub const COUNT_COLUMN: &str = "_COUNT_";

/// Rows of computed columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    names: Vec<String>,
    types: Vec<ValueType>,
    columns: Vec<Vec<Value>>,
    /// Row of the source table each result row was computed from.
    rows: Vec<u64>,
}

impl ResultSet {
    fn new(rows: Vec<u64>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    fn push_column(&mut self, name: String, value_type: ValueType, values: Vec<Value>) {
        self.names.push(name);
        self.types.push(value_type);
        self.columns.push(values);
    }

    /// All columns and rows of a table.
    pub fn from_table(table: &Table) -> Result<Self> {
        let nrow = table.nrow();
        let mut out = ResultSet::new((0..nrow).collect());
        for col in table.desc().columns() {
            let values = if col.is_scalar() {
                table
                    .get_column(&col.name)?
                    .iter()
                    .map(Value::from_cell)
                    .collect()
            } else {
                let mut values = Vec::with_capacity(nrow as usize);
                for row in 0..nrow {
                    values.push(if table.is_defined(&col.name, row)? {
                        Value::from_array_cell(&table.get_array(&col.name, row)?)?
                    } else {
                        Value::Array(Array::new(Shape::vector(0), Vec::new())?)
                    });
                }
                values
            };
            out.push_column(
                col.name.clone(),
                ValueType::from_data_type(col.data_type),
                values,
            );
        }
        Ok(out)
    }

    pub fn nrow(&self) -> u64 {
        self.rows.len() as u64
    }

    pub fn ncolumn(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn value_type(&self, column: usize) -> Option<ValueType> {
        self.types.get(column).copied()
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        let i = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[i])
    }

    pub fn column_values(&self, column: usize) -> Result<Vec<Value>> {
        self.columns
            .get(column)
            .cloned()
            .ok_or_else(|| Error::out_of_range("result column", column as u64, self.ncolumn() as u64))
    }

    pub fn get(&self, row: u64, column: usize) -> Option<&Value> {
        self.columns.get(column)?.get(row as usize)
    }

    /// Source table rows, one per result row.
    pub fn row_numbers(&self) -> &[u64] {
        &self.rows
    }

    /// Store the rows in a new plain table.
    pub fn write(&self, path: &Path, options: StorageOptions) -> Result<Table> {
        let mut desc = TableDesc::new();
        for (i, name) in self.names.iter().enumerate() {
            let dtype = self.types[i].data_type();
            let col = if self.columns[i].iter().any(Value::is_array) {
                ColumnDesc::array(name.clone(), dtype)
            } else {
                ColumnDesc::scalar(name.clone(), dtype)
            };
            desc.add_column(col)?;
        }
        let table = Table::create(path, desc.clone(), options)?;
        table.add_rows(self.nrow(), true)?;
        for (i, col) in desc.columns().iter().enumerate() {
            for (row, value) in self.columns[i].iter().enumerate() {
                store(&table, col, row as u64, value, None)?;
            }
        }
        table.flush()?;
        debug!("wrote {} result rows to {}", self.nrow(), path.display());
        Ok(table)
    }
}

/// Outcome of one statement.
#[derive(Debug)]
pub enum QueryResult {
    /// A reference table over the input, or a table created or modified.
    Table(Table),
    Rows(ResultSet),
    /// Result of a CALC not depending on any row.
    Value(Value),
    /// Output of SHOW.
    Text(String),
    /// Statement without a result, e.g. DROP TABLE.
    Done,
}

impl QueryResult {
    pub fn nrow(&self) -> u64 {
        match self {
            QueryResult::Table(t) => t.nrow(),
            QueryResult::Rows(r) => r.nrow(),
            QueryResult::Value(_) => 1,
            QueryResult::Text(_) | QueryResult::Done => 0,
        }
    }

    pub fn table(&self) -> Option<&Table> {
        match self {
            QueryResult::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_table(self) -> Result<Table> {
        match self {
            QueryResult::Table(t) => Ok(t),
            other => Err(Error::InvalidOperation(format!(
                "statement result is not a table: {:?}",
                other
            ))),
        }
    }

    /// The result as rows; a table is read in full.
    pub fn into_rows(self) -> Result<ResultSet> {
        match self {
            QueryResult::Rows(r) => Ok(r),
            QueryResult::Table(t) => ResultSet::from_table(&t),
            QueryResult::Value(v) => {
                let mut out = ResultSet::new(vec![0]);
                let ty = v.elements().first().map_or(ValueType::Double, Scalar::value_type);
                out.push_column("CALC".into(), ty, vec![v]);
                Ok(out)
            }
            QueryResult::Text(_) | QueryResult::Done => Ok(ResultSet::default()),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            QueryResult::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Parse and execute a statement; `tables[0]` is `$1`.
///
/// # Example
/// ```
/// use tabledb::taql::{execute, Scalar, Value};
///
/// let result = execute("CALC 1 + 2.5", &[]).unwrap();
/// assert_eq!(result.value(), Some(&Value::Scalar(Scalar::Double(3.5))));
/// ```
pub fn execute(text: &str, tables: &[Table]) -> Result<QueryResult> {
    let lock = ParserLock::acquire();
    let node = lock.parse(text)?;
    debug!("executing {}", node.kind_name());
    execute_node(&node, tables)
}

/// Execute a parsed statement.
pub fn execute_node(node: &SyntaxNode, tables: &[Table]) -> Result<QueryResult> {
    Executor { tables }.run(node)
}

/// Run a nested query; without explicit tables the outer table is `$1`.
pub(crate) fn run_subquery(
    node: &SyntaxNode,
    tables: &[Table],
    outer: Option<&Table>,
) -> Result<ResultSet> {
    let fallback: Vec<Table>;
    let tables = match (tables.is_empty(), outer) {
        (true, Some(t)) => {
            fallback = vec![t.clone()];
            &fallback[..]
        }
        _ => tables,
    };
    Executor { tables }.run(node)?.into_rows()
}

/// Selected rows, or groups of rows once grouping is in play.
struct Units {
    units: Vec<Vec<u64>>,
    grouped: bool,
}

impl Units {
    fn rows(rows: Vec<u64>) -> Self {
        Self {
            units: rows.into_iter().map(|r| vec![r]).collect(),
            grouped: false,
        }
    }

    fn first_rows(&self) -> Vec<u64> {
        self.units.iter().map(|u| u.first().copied().unwrap_or(0)).collect()
    }

    fn keep(&mut self, order: Vec<usize>) {
        let mut old = std::mem::take(&mut self.units);
        self.units = order.into_iter().map(|i| std::mem::take(&mut old[i])).collect();
    }
}

struct Executor<'a> {
    tables: &'a [Table],
}

impl<'a> Executor<'a> {
    fn run(&self, node: &SyntaxNode) -> Result<QueryResult> {
        match node {
            SyntaxNode::Select(s) => self.select(s),
            SyntaxNode::Count(c) => self.count(c),
            SyntaxNode::Calc(c) => self.calc(c),
            SyntaxNode::Update(u) => self.update(u),
            SyntaxNode::Insert(i) => self.insert(i),
            SyntaxNode::Delete(d) => self.delete(d),
            SyntaxNode::CreTab(c) => self.create(c),
            SyntaxNode::AltTab(a) => self.alter(a),
            SyntaxNode::DropTab { tables } => self.drop_tables(tables),
            SyntaxNode::Show { names } => Ok(QueryResult::Text(self.show(names.as_ref())?)),
            other => Err(Error::InvalidOperation(format!(
                "{} is not a statement",
                other.kind_name()
            ))),
        }
    }

    fn compile(&self, node: &SyntaxNode, table: Option<&Table>) -> Result<Expr> {
        Compiler::new(table, self.tables).compile(node)
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    fn table_of(&self, node: &SyntaxNode) -> Result<Table> {
        match node {
            SyntaxNode::Table { table, .. } => self.table_of(table),
            SyntaxNode::Const(c) if c.is_table_name => match &c.value {
                Literal::Int(n) => {
                    let index = usize::try_from(*n - 1).map_err(|_| {
                        Error::InvalidOperation(format!("invalid table argument ${}", n))
                    })?;
                    self.tables.get(index).cloned().ok_or_else(|| {
                        Error::out_of_range("table argument", *n as u64, self.tables.len() as u64)
                    })
                }
                Literal::String(path) => Table::open(Path::new(path)),
                other => Err(Error::internal(format!("table name {}", other))),
            },
            statement if statement.is_statement() => self.run(statement)?.into_table(),
            other => Err(Error::InvalidOperation(format!(
                "{} does not name a table",
                other
            ))),
        }
    }

    /// The single table of a FROM list; no list reads `$1`.
    fn from_tables(&self, tables: Option<&Multi>) -> Result<Option<Table>> {
        match tables {
            Some(m) => self.single(m).map(Some),
            None => Ok(self.tables.first().cloned()),
        }
    }

    fn single(&self, tables: &Multi) -> Result<Table> {
        match tables.nodes.as_slice() {
            [one] => self.table_of(one),
            _ => Err(Error::InvalidOperation(format!(
                "exactly one table expected, {} given",
                tables.len()
            ))),
        }
    }

    fn constant_int(&self, node: &SyntaxNode) -> Result<i64> {
        let expr = compile_expr(node, None)?;
        match expr.constant() {
            Some(v) => v.as_scalar()?.convert(ValueType::Int)?.as_int(),
            None => Err(Error::InvalidOperation(format!("{} is not a constant", node))),
        }
    }

    fn constant_str(&self, node: &SyntaxNode) -> Result<String> {
        let expr = compile_expr(node, None)?;
        match expr.constant() {
            Some(v) => Ok(v.as_scalar()?.as_str()?.to_string()),
            None => Err(Error::InvalidOperation(format!("{} is not a constant", node))),
        }
    }

    fn count_of(&self, node: &SyntaxNode, what: &str) -> Result<u64> {
        let n = self.constant_int(node)?;
        u64::try_from(n).map_err(|_| Error::InvalidOperation(format!("negative {} {}", what, n)))
    }

    /// Storage options from bare `DMINFO` fields or from data manager
    /// records `[NAME=..., TYPE=..., SPEC=[...], COLUMNS=[...]]`.
    fn options(&self, dminfo: Option<&Multi>) -> Result<StorageOptions> {
        let mut options = StorageOptions::default();
        for item in dminfo.map(|m| m.nodes.as_slice()).unwrap_or_default() {
            options = match item {
                SyntaxNode::Multi(record) => self.dm_record(record, options)?,
                field => self.dm_spec_field(field, options)?,
            };
        }
        Ok(options)
    }

    fn dm_record(&self, record: &Multi, mut options: StorageOptions) -> Result<StorageOptions> {
        for field in &record.nodes {
            let (name, value) = record_field(field)?;
            match name.to_ascii_uppercase().as_str() {
                "NAME" | "COLUMNS" => debug!("DMINFO {} = {}", name, value),
                "TYPE" => {
                    let dm = self.constant_str(value)?;
                    if !dm.eq_ignore_ascii_case("IncrementalStMan") {
                        return Err(Error::InvalidOperation(format!(
                            "unsupported data manager type {}",
                            dm
                        )));
                    }
                }
                "SPEC" => {
                    let SyntaxNode::Multi(spec) = value else {
                        return Err(Error::InvalidOperation(
                            "DMINFO SPEC must be a record".into(),
                        ));
                    };
                    for f in &spec.nodes {
                        options = self.dm_spec_field(f, options)?;
                    }
                }
                _ => {
                    return Err(Error::InvalidOperation(format!(
                        "unknown DMINFO record field {}",
                        name
                    )))
                }
            }
        }
        Ok(options)
    }

    fn dm_spec_field(&self, field: &SyntaxNode, options: StorageOptions) -> Result<StorageOptions> {
        let (name, value) = record_field(field)?;
        let n = self.count_of(value, name)? as usize;
        match name.to_ascii_uppercase().as_str() {
            "BUCKETSIZE" => Ok(options.with_bucket_size(n)),
            "CACHESIZE" | "CACHEBUCKETS" => Ok(options.with_cache_buckets(n)),
            _ => Err(Error::InvalidOperation(format!(
                "unknown DMINFO field {}",
                name
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Row selection
    // ------------------------------------------------------------------

    fn filter(
        &self,
        table: Option<&Table>,
        condition: Option<&SyntaxNode>,
        rows: Vec<u64>,
    ) -> Result<Vec<u64>> {
        let Some(condition) = condition else {
            return Ok(rows);
        };
        let expr = compile_predicate(condition, table, self.tables)?;
        if let Some(c) = expr.constant() {
            return Ok(if c.as_scalar()?.as_bool()? { rows } else { Vec::new() });
        }
        if let (Some(table), Some(sets)) = (table, ranges(&expr)) {
            let mut keep = vec![true; rows.len()];
            for (column, intervals) in &sets {
                let cells = table.get_cells(column, &rows)?;
                for (k, cell) in keep.iter_mut().zip(&cells) {
                    *k &= in_ranges(intervals, &Scalar::from_cell(cell));
                }
            }
            return Ok(rows
                .into_iter()
                .zip(keep)
                .filter_map(|(row, k)| k.then_some(row))
                .collect());
        }
        let eval = Evaluator::new(&expr, table);
        let mut out = Vec::new();
        for row in rows {
            if eval.evaluate_bool(row)? {
                out.push(row);
            }
        }
        Ok(out)
    }

    /// Values of `expr` per unit: bulk per row, or per group.
    fn unit_values(&self, expr: &Expr, table: Option<&Table>, units: &Units) -> Result<Vec<Value>> {
        let eval = Evaluator::new(expr, table);
        if units.grouped {
            units.units.iter().map(|g| eval.evaluate_group(g)).collect()
        } else {
            eval.evaluate_column(&units.first_rows())
        }
    }

    fn sort(&self, table: Option<&Table>, sort: Option<&SyntaxNode>, units: &mut Units) -> Result<()> {
        let Some(SyntaxNode::Sort {
            unique,
            descending,
            keys,
        }) = sort
        else {
            return Ok(());
        };
        let mut columns = Vec::with_capacity(keys.len());
        for key in &keys.nodes {
            let SyntaxNode::SortKey { order, child } = key else {
                return Err(Error::internal("malformed sort key"));
            };
            let expr = self.compile(child, table)?;
            if expr.has_aggregate(expr.root()) && !units.grouped {
                return Err(Error::InvalidOperation(
                    "aggregate sort key without grouping".into(),
                ));
            }
            let desc = match order {
                SortOrder::Default => *descending,
                SortOrder::Ascending => false,
                SortOrder::Descending => true,
            };
            columns.push((self.unit_values(&expr, table, units)?, desc));
        }
        let compare = |a: usize, b: usize| {
            for (values, desc) in &columns {
                let ord = compare_values(&values[a], &values[b]);
                let ord = if *desc { ord.reverse() } else { ord };
                if ord.is_ne() {
                    return ord;
                }
            }
            Ordering::Equal
        };
        let mut order: Vec<usize> = (0..units.units.len()).collect();
        order.sort_by(|&a, &b| compare(a, b));
        if *unique {
            order.dedup_by(|b, a| compare(*a, *b).is_eq());
        }
        units.keep(order);
        Ok(())
    }

    /// Positions kept by LIMIT and OFFSET out of `n`.
    fn limit_range(&self, limitoff: Option<&SyntaxNode>, n: usize) -> Result<Range<usize>> {
        let Some(SyntaxNode::LimitOff { limit, offset }) = limitoff else {
            return Ok(0..n);
        };
        let offset = match offset {
            Some(node) => (self.count_of(node, "offset")? as usize).min(n),
            None => 0,
        };
        let end = match limit {
            Some(node) => offset.saturating_add(self.count_of(node, "limit")? as usize).min(n),
            None => n,
        };
        Ok(offset..end)
    }

    /// WHERE, ORDERBY, LIMIT and OFFSET over a whole table.
    fn selection(
        &self,
        table: &Table,
        where_: Option<&SyntaxNode>,
        sort: Option<&SyntaxNode>,
        limitoff: Option<&SyntaxNode>,
    ) -> Result<Vec<u64>> {
        let rows = self.filter(Some(table), where_, (0..table.nrow()).collect())?;
        let mut units = Units::rows(rows);
        self.sort(Some(table), sort, &mut units)?;
        let keep = self.limit_range(limitoff, units.units.len())?;
        units.keep(keep.collect());
        Ok(units.first_rows())
    }

    /// Rows grouped on equal key values, groups in ascending key order.
    /// With `rollup` the groups of every key prefix follow, ending with the
    /// group of all rows.
    fn groups(
        &self,
        table: Option<&Table>,
        keys: &[&SyntaxNode],
        rollup: bool,
        rows: &[u64],
    ) -> Result<Vec<Vec<u64>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let expr = self.compile(key, table)?;
            if expr.has_aggregate(expr.root()) {
                return Err(Error::InvalidOperation(
                    "aggregate functions cannot be used in GROUPBY".into(),
                ));
            }
            values.push(Evaluator::new(&expr, table).evaluate_column(rows)?);
        }
        let levels: Vec<usize> = if rollup { (0..=keys.len()).rev().collect() } else { vec![keys.len()] };
        let mut out = Vec::new();
        for level in levels {
            let compare = |a: usize, b: usize| {
                values[..level]
                    .iter()
                    .map(|v| compare_values(&v[a], &v[b]))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            };
            let mut order: Vec<usize> = (0..rows.len()).collect();
            order.sort_by(|&a, &b| compare(a, b));
            let mut current: Vec<u64> = Vec::new();
            let mut last: Option<usize> = None;
            for i in order {
                if let Some(l) = last {
                    if compare(l, i).is_ne() {
                        out.push(std::mem::take(&mut current));
                    }
                }
                current.push(rows[i]);
                last = Some(i);
            }
            if !current.is_empty() {
                out.push(current);
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    fn select(&self, s: &Select) -> Result<QueryResult> {
        let table = self.from_tables(s.tables.as_ref())?;
        let t = table.as_ref();
        let all = match t {
            Some(t) => (0..t.nrow()).collect(),
            None => vec![0],
        };
        let rows = self.filter(t, s.where_.as_deref(), all)?;

        let SyntaxNode::Columns { distinct, nodes } = &*s.columns else {
            return Err(Error::internal("malformed column list"));
        };
        let mut columns = Vec::new();
        for (i, node) in nodes.iter().flat_map(|m| &m.nodes).enumerate() {
            let SyntaxNode::Col { expr, name, dtype } = node else {
                return Err(Error::internal("malformed column"));
            };
            let compiled = self.compile(expr, t)?;
            let bare = match &**expr {
                SyntaxNode::KeyCol { name } if t.is_some_and(|t| t.desc().is_column(name)) => {
                    Some(name.clone())
                }
                _ => None,
            };
            let out_name = if !name.is_empty() {
                name.clone()
            } else if let Some(b) = &bare {
                b.clone()
            } else {
                format!("Col_{}", i + 1)
            };
            let cast = if dtype.is_empty() {
                None
            } else {
                Some(ValueType::from_data_type(parse_type(dtype)?))
            };
            columns.push(SelectColumn {
                name: out_name,
                expr: compiled,
                cast,
                bare,
            });
        }
        if let (None, Some(t)) = (nodes, t) {
            for name in t.desc().column_names() {
                let expr = self.compile(&SyntaxNode::KeyCol { name: name.clone() }, Some(t))?;
                columns.push(SelectColumn {
                    name: name.clone(),
                    expr,
                    cast: None,
                    bare: Some(name),
                });
            }
        }

        let aggregates = columns.iter().any(|c| c.expr.has_aggregate(c.expr.root()));
        let grouped = s.groupby.is_some() || s.having.is_some() || aggregates;
        let mut units = if grouped {
            let groups = match s.groupby.as_deref() {
                Some(SyntaxNode::Groupby { rollup, nodes }) => {
                    let keys: Vec<&SyntaxNode> = nodes.nodes.iter().collect();
                    self.groups(t, &keys, *rollup, &rows)?
                }
                Some(_) => return Err(Error::internal("malformed GROUPBY")),
                None if rows.is_empty() => Vec::new(),
                None => vec![rows],
            };
            Units {
                units: groups,
                grouped: true,
            }
        } else {
            Units::rows(rows)
        };

        if let Some(having) = s.having.as_deref() {
            let expr = self.compile(having, t)?;
            if expr.value_type() != ValueType::Bool {
                return Err(Error::TypeMismatch(format!("HAVING {} is not Bool", having)));
            }
            let keep = self.unit_values(&expr, t, &units)?;
            let mut order = Vec::new();
            for (i, v) in keep.iter().enumerate() {
                if v.as_scalar()?.as_bool()? {
                    order.push(i);
                }
            }
            units.keep(order);
        }

        self.sort(t, s.sort.as_deref(), &mut units)?;

        let plain = !grouped && columns.iter().all(|c| c.bare.is_some() && c.cast.is_none());
        let mut values = Vec::with_capacity(columns.len());
        // A plain selection only reads its columns to find distinct rows.
        for c in columns.iter().filter(|_| !plain || *distinct) {
            let mut v = self.unit_values(&c.expr, t, &units)?;
            if let Some(to) = c.cast {
                for value in &mut v {
                    *value = value.map(|s| s.convert(to))?;
                }
            }
            values.push(v);
        }
        if *distinct {
            let order = distinct_rows(&values, units.units.len());
            for v in &mut values {
                *v = order.iter().map(|&i| v[i].clone()).collect();
            }
            units.keep(order);
        }
        let keep = self.limit_range(s.limitoff.as_deref(), units.units.len())?;
        for v in &mut values {
            *v = v[keep.clone()].to_vec();
        }
        units.keep(keep.collect());
        let reps = units.first_rows();

        let result = match (plain, t) {
            (true, Some(t)) => {
                let mut view = t.select_rows(&reps)?;
                if nodes.is_some() {
                    let sources: Vec<String> =
                        columns.iter().filter_map(|c| c.bare.clone()).collect();
                    view = view.project(&sources)?;
                    for c in &columns {
                        match &c.bare {
                            Some(src) if *src != c.name => view.rename_column(src, &c.name)?,
                            _ => {}
                        }
                    }
                }
                QueryResult::Table(view)
            }
            (true, None) if nodes.is_none() => {
                return Err(Error::InvalidOperation("SELECT * needs a table".into()))
            }
            _ => {
                let mut out = ResultSet::new(reps.clone());
                for (c, v) in columns.into_iter().zip(values) {
                    let ty = c.cast.unwrap_or(c.expr.value_type());
                    out.push_column(c.name, ty, v);
                }
                QueryResult::Rows(out)
            }
        };
        self.giving(s.giving.as_deref(), s.dminfo.as_ref(), t, &reps, result)
    }

    fn giving(
        &self,
        giving: Option<&SyntaxNode>,
        dminfo: Option<&Multi>,
        table: Option<&Table>,
        rows: &[u64],
        result: QueryResult,
    ) -> Result<QueryResult> {
        let Some(SyntaxNode::Giving { name, exprs }) = giving else {
            return Ok(result);
        };
        if let Some(exprs) = exprs {
            let units = Units::rows(rows.to_vec());
            let mut out = ResultSet::new(rows.to_vec());
            for (i, node) in exprs.nodes.iter().enumerate() {
                let expr = self.compile(node, table)?;
                let values = self.unit_values(&expr, table, &units)?;
                out.push_column(format!("Col_{}", i + 1), expr.value_type(), values);
            }
            return Ok(QueryResult::Rows(out));
        }
        let path = Path::new(name);
        match result {
            QueryResult::Table(view) => {
                view.write_view(path)?;
                debug!("wrote selection of {} rows to {}", view.nrow(), name);
                Ok(QueryResult::Table(view))
            }
            QueryResult::Rows(rows) => Ok(QueryResult::Table(rows.write(path, self.options(dminfo)?)?)),
            other => Ok(other),
        }
    }

    // ------------------------------------------------------------------
    // COUNT and CALC
    // ------------------------------------------------------------------

    fn count(&self, c: &Count) -> Result<QueryResult> {
        let table = self.single(&c.tables)?;
        let rows = self.filter(Some(&table), c.where_.as_deref(), (0..table.nrow()).collect())?;
        let SyntaxNode::Columns { nodes, .. } = &*c.columns else {
            return Err(Error::internal("malformed column list"));
        };
        let mut keys = Vec::new();
        let mut names = Vec::new();
        for (i, node) in nodes.iter().flat_map(|m| &m.nodes).enumerate() {
            let SyntaxNode::Col { expr, name, .. } = node else {
                return Err(Error::internal("malformed column"));
            };
            keys.push(&**expr);
            names.push(match (&**expr, name.is_empty()) {
                (_, false) => name.clone(),
                (SyntaxNode::KeyCol { name }, true) => name.clone(),
                _ => format!("Col_{}", i + 1),
            });
        }
        let groups = if keys.is_empty() {
            vec![rows]
        } else {
            self.groups(Some(&table), &keys, false, &rows)?
        };
        let units = Units {
            units: groups,
            grouped: true,
        };
        let mut out = ResultSet::new(units.first_rows());
        for (key, name) in keys.iter().zip(names) {
            let expr = self.compile(key, Some(&table))?;
            let values = self.unit_values(&expr, Some(&table), &units)?;
            out.push_column(name, expr.value_type(), values);
        }
        let counts = units
            .units
            .iter()
            .map(|g| Value::Scalar(Scalar::Int(g.len() as i64)))
            .collect();
        out.push_column(COUNT_COLUMN.into(), ValueType::Int, counts);
        Ok(QueryResult::Rows(out))
    }

    fn calc(&self, c: &Calc) -> Result<QueryResult> {
        let table = self.from_tables(c.tables.as_ref())?;
        let t = table.as_ref();
        let expr = self.compile(&c.expr, t)?;
        if let Some(v) = expr.constant() {
            return Ok(QueryResult::Value(v.clone()));
        }
        let t = t.ok_or_else(|| Error::InvalidOperation("CALC needs a table".into()))?;
        let rows = self.selection(
            t,
            c.where_.as_deref(),
            c.sort.as_deref(),
            c.limitoff.as_deref(),
        )?;
        let eval = Evaluator::new(&expr, Some(t));
        if expr.has_aggregate(expr.root()) {
            if rows.is_empty() {
                return Err(Error::InvalidOperation("aggregate over zero rows".into()));
            }
            return Ok(QueryResult::Value(eval.evaluate_group(&rows)?));
        }
        let values = eval.evaluate_column(&rows)?;
        let mut out = ResultSet::new(rows);
        out.push_column("CALC".into(), expr.value_type(), values);
        Ok(QueryResult::Rows(out))
    }

    // ------------------------------------------------------------------
    // UPDATE, INSERT, DELETE
    // ------------------------------------------------------------------

    fn update(&self, u: &Update) -> Result<QueryResult> {
        if u.from.is_some() {
            return Err(Error::InvalidOperation(
                "UPDATE ... FROM other tables is not supported".into(),
            ));
        }
        let table = self.single(&u.tables)?;
        let rows = self.selection(
            &table,
            u.where_.as_deref(),
            u.sort.as_deref(),
            u.limitoff.as_deref(),
        )?;
        let desc = table.desc();
        // All new values are computed before anything is written.
        let mut plans = Vec::with_capacity(u.update.len());
        for node in &u.update.nodes {
            let SyntaxNode::UpdExpr {
                name,
                indices,
                expr,
            } = node
            else {
                return Err(Error::internal("malformed update expression"));
            };
            let col = desc.require(name)?.clone();
            let compiled = self.compile(expr, Some(&table))?;
            if compiled.has_aggregate(compiled.root()) {
                return Err(Error::InvalidOperation(
                    "aggregate functions cannot be used in UPDATE".into(),
                ));
            }
            let values = Evaluator::new(&compiled, Some(&table)).evaluate_column(&rows)?;
            let bounds = match indices {
                Some(m) => Some(self.index_bounds(m, &table, &rows)?),
                None => None,
            };
            plans.push((col, values, bounds));
        }
        for (col, values, bounds) in &plans {
            for (i, &row) in rows.iter().enumerate() {
                let b = bounds.as_ref().map(|b| b[i].as_slice());
                store(&table, col, row, &values[i], b)?;
            }
        }
        debug!("updated {} rows", rows.len());
        Ok(QueryResult::Table(table.select_rows(&rows)?))
    }

    /// Index bounds of an update target, per row.
    fn index_bounds(&self, indices: &Multi, table: &Table, rows: &[u64]) -> Result<Vec<Vec<IndexBounds>>> {
        let mut parts = Vec::with_capacity(indices.len());
        for node in &indices.nodes {
            let SyntaxNode::Index {
                start,
                end,
                incr,
                colon,
            } = node
            else {
                return Err(Error::internal("malformed index"));
            };
            let compile = |n: &Option<Box<SyntaxNode>>| -> Result<Option<Expr>> {
                n.as_deref().map(|n| self.compile(n, Some(table))).transpose()
            };
            let single = !colon && start.is_some();
            parts.push((compile(start)?, compile(end)?, compile(incr)?, single));
        }
        let int = |e: &Option<Expr>, row: u64| -> Result<Option<i64>> {
            match e {
                Some(e) => Ok(Some(
                    Evaluator::new(e, Some(table)).evaluate(row)?.as_scalar()?.as_int()?,
                )),
                None => Ok(None),
            }
        };
        rows.iter()
            .map(|&row| {
                parts
                    .iter()
                    .map(|(s, e, i, single)| {
                        Ok(IndexBounds {
                            start: int(s, row)?,
                            end: int(e, row)?,
                            incr: int(i, row)?,
                            single: *single,
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    fn insert(&self, i: &Insert) -> Result<QueryResult> {
        let table = self.single(&i.tables)?;
        let desc = table.desc();
        let names = match &i.columns {
            Some(m) => m.nodes.iter().map(key_name).collect::<Result<Vec<_>>>()?,
            None => desc.column_names(),
        };
        let cols = names
            .iter()
            .map(|n| desc.require(n).cloned())
            .collect::<Result<Vec<_>>>()?;
        let limit = match &i.limit {
            Some(n) => Some(self.count_of(n, "limit")?),
            None => None,
        };
        let first = table.nrow();
        let nnew = match &*i.values {
            SyntaxNode::Multi(m) if !m.is_set => {
                let mut templates = Vec::with_capacity(m.len());
                for row in &m.nodes {
                    let SyntaxNode::Multi(values) = row else {
                        return Err(Error::internal("malformed VALUES row"));
                    };
                    if values.len() != cols.len() {
                        return Err(Error::SchemaViolation(format!(
                            "{} values given for {} columns",
                            values.len(),
                            cols.len()
                        )));
                    }
                    let exprs = values
                        .nodes
                        .iter()
                        .map(|n| self.compile(n, Some(&table)))
                        .collect::<Result<Vec<_>>>()?;
                    templates.push(exprs);
                }
                if templates.is_empty() {
                    return Err(Error::InvalidOperation("no values to insert".into()));
                }
                let nnew = limit.unwrap_or(templates.len() as u64);
                table.add_rows(nnew, true)?;
                for k in 0..nnew {
                    let row = first + k;
                    let exprs = &templates[(k as usize) % templates.len()];
                    for (col, expr) in cols.iter().zip(exprs) {
                        let value = Evaluator::new(expr, Some(&table)).evaluate(row)?;
                        store(&table, col, row, &value, None)?;
                    }
                }
                nnew
            }
            query if query.is_statement() => {
                let rows = self.run(query)?.into_rows()?;
                if rows.ncolumn() != cols.len() {
                    return Err(Error::SchemaViolation(format!(
                        "query gives {} columns for {} target columns",
                        rows.ncolumn(),
                        cols.len()
                    )));
                }
                let nnew = limit.map_or(rows.nrow(), |l| l.min(rows.nrow()));
                table.add_rows(nnew, true)?;
                for (j, col) in cols.iter().enumerate() {
                    for k in 0..nnew {
                        let value = rows
                            .get(k, j)
                            .ok_or_else(|| Error::internal("short result column"))?;
                        store(&table, col, first + k, value, None)?;
                    }
                }
                nnew
            }
            other => {
                return Err(Error::internal(format!("INSERT source {}", other.kind_name())))
            }
        };
        debug!("inserted {} rows", nnew);
        let rows: Vec<u64> = (first..first + nnew).collect();
        Ok(QueryResult::Table(table.select_rows(&rows)?))
    }

    fn delete(&self, d: &Delete) -> Result<QueryResult> {
        let table = self.single(&d.tables)?;
        let mut rows = self.selection(
            &table,
            d.where_.as_deref(),
            d.sort.as_deref(),
            d.limitoff.as_deref(),
        )?;
        rows.sort_unstable();
        rows.dedup();
        table.remove_rows(&rows)?;
        debug!("deleted {} rows", rows.len());
        Ok(QueryResult::Table(table))
    }

    // ------------------------------------------------------------------
    // CREATE, ALTER, DROP
    // ------------------------------------------------------------------

    fn create(&self, c: &CreTab) -> Result<QueryResult> {
        let SyntaxNode::Giving { name, .. } = &*c.giving else {
            return Err(Error::internal("malformed table name"));
        };
        let like = c.like.as_deref().map(|n| self.table_of(n)).transpose()?;
        let mut desc = TableDesc::new();
        if let Some(like) = &like {
            let like_desc = like.desc();
            let dropped = c
                .like_drop
                .iter()
                .flat_map(|m| &m.nodes)
                .map(key_name)
                .collect::<Result<Vec<_>>>()?;
            for d in &dropped {
                like_desc.require(d)?;
            }
            for col in like_desc.columns() {
                if !dropped.contains(&col.name) {
                    desc.add_column(col.clone())?;
                }
            }
        }
        for spec in c.columns.iter().flat_map(|m| &m.nodes) {
            desc.add_column(self.column_spec(spec, like.as_ref())?)?;
        }
        let options = self.options(c.dminfo.as_ref())?;
        let table = Table::create(Path::new(name), desc, options)?;
        if let Some(limit) = &c.limit {
            table.add_rows(self.count_of(limit, "row count")?, true)?;
        }
        debug!("created table {} with {} rows", name, table.nrow());
        Ok(QueryResult::Table(table))
    }

    fn column_spec(&self, node: &SyntaxNode, like: Option<&Table>) -> Result<ColumnDesc> {
        let SyntaxNode::ColSpec {
            name,
            like_col,
            dtype,
            spec,
        } = node
        else {
            return Err(Error::internal("malformed column spec"));
        };
        let mut col = if like_col.is_empty() {
            ColumnDesc::scalar(name.clone(), parse_type(dtype)?)
        } else {
            let like = like.ok_or_else(|| {
                Error::SchemaViolation(format!("column {} is LIKE {} without a LIKE table", name, like_col))
            })?;
            let mut col = like.desc().require(like_col)?.clone();
            col.name = name.clone();
            if !dtype.is_empty() {
                col.data_type = parse_type(dtype)?;
            }
            col
        };
        for field in spec.iter().flat_map(|m| &m.nodes) {
            let SyntaxNode::RecFld {
                name: key,
                values: Some(value),
                ..
            } = field
            else {
                return Err(Error::internal("malformed column field"));
            };
            let constant = compile_expr(value, None)?
                .constant()
                .cloned()
                .ok_or_else(|| Error::InvalidOperation(format!("{} is not a constant", value)))?;
            match key.to_ascii_uppercase().as_str() {
                "NDIM" => {
                    let n = self.count_of(value, "NDIM")? as usize;
                    col.kind = ColumnKind::Array {
                        shape: None,
                        ndim: Some(n),
                    };
                }
                "SHAPE" => {
                    let dims = constant
                        .elements()
                        .iter()
                        .map(|s| {
                            usize::try_from(s.as_int()?).map_err(|_| {
                                Error::ShapeConformance(format!("invalid shape {}", constant))
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    col.kind = ColumnKind::Array {
                        ndim: Some(dims.len()),
                        shape: Some(Shape::new(dims)),
                    };
                }
                "COMMENT" => col.comment = constant.as_scalar()?.as_str()?.to_string(),
                "DEFAULT" => col.default = Some(constant.as_scalar()?.to_cell(col.data_type)?),
                // Units are carried on expressions only.
                "UNIT" => {}
                other => {
                    return Err(Error::InvalidOperation(format!(
                        "unknown column field {}",
                        other
                    )))
                }
            }
        }
        Ok(col)
    }

    fn alter(&self, a: &AltTab) -> Result<QueryResult> {
        if a.from.is_some() {
            return Err(Error::InvalidOperation(
                "ALTER TABLE ... FROM other tables is not supported".into(),
            ));
        }
        let table = self.table_of(&a.table)?;
        for command in &a.commands.nodes {
            match command {
                SyntaxNode::AddRow { nrow } => {
                    table.add_rows(self.count_of(nrow, "row count")?, true)?;
                }
                SyntaxNode::AddCol { columns, dminfo } => {
                    if dminfo.is_some() {
                        self.options(dminfo.as_ref())?;
                    }
                    for spec in &columns.nodes {
                        table.add_column(self.column_spec(spec, Some(&table))?, true)?;
                    }
                }
                SyntaxNode::RenDrop { kind, names } => {
                    let names = names.nodes.iter().map(key_name).collect::<Result<Vec<_>>>()?;
                    match kind {
                        RenDropKind::RenameColumn => {
                            for pair in names.chunks(2) {
                                if let [old, new] = pair {
                                    table.rename_column(old, new)?;
                                }
                            }
                        }
                        RenDropKind::RenameKeyword => {
                            for pair in names.chunks(2) {
                                if let [old, new] = pair {
                                    table.rename_keyword(old, new)?;
                                }
                            }
                        }
                        RenDropKind::DropColumn => {
                            for name in &names {
                                table.remove_column(name)?;
                            }
                        }
                        RenDropKind::DropKeyword => {
                            for name in &names {
                                table.remove_keyword(name)?;
                            }
                        }
                    }
                }
                SyntaxNode::SetKey { keyvals } => {
                    for kv in &keyvals.nodes {
                        let SyntaxNode::UpdExpr { name, expr, .. } = kv else {
                            return Err(Error::internal("malformed keyword value"));
                        };
                        let value = compile_expr(expr, None)?.constant().cloned().ok_or_else(|| {
                            Error::InvalidOperation(format!("keyword value {} is not a constant", expr))
                        })?;
                        let scalar = value.into_scalar()?;
                        let cell = scalar.to_cell(scalar.value_type().data_type())?;
                        table.set_keyword(name, cell)?;
                    }
                }
                SyntaxNode::CopyCol { names, .. } => {
                    for copy in &names.nodes {
                        let SyntaxNode::UpdExpr { name, expr, .. } = copy else {
                            return Err(Error::internal("malformed column copy"));
                        };
                        self.copy_column(&table, &key_name(expr)?, name)?;
                    }
                }
                other => {
                    return Err(Error::internal(format!(
                        "ALTER TABLE command {}",
                        other.kind_name()
                    )))
                }
            }
        }
        table.flush()?;
        Ok(QueryResult::Table(table))
    }

    fn copy_column(&self, table: &Table, source: &str, target: &str) -> Result<()> {
        let mut col = table.desc().require(source)?.clone();
        col.name = target.to_string();
        let scalar = col.is_scalar();
        table.add_column(col, true)?;
        if scalar {
            for (row, cell) in table.get_column(source)?.iter().enumerate() {
                table.put_cell(target, row as u64, cell)?;
            }
        } else {
            for row in 0..table.nrow() {
                if table.is_defined(source, row)? {
                    table.put_array(target, row, &table.get_array(source, row)?)?;
                }
            }
        }
        Ok(())
    }

    fn drop_tables(&self, tables: &Multi) -> Result<QueryResult> {
        for node in &tables.nodes {
            let table = self.table_of(node)?;
            let path = table
                .path()
                .ok_or_else(|| Error::InvalidOperation("cannot drop a view never written".into()))?;
            drop(table);
            fs::remove_dir_all(&path)?;
            debug!("dropped table {}", path.display());
        }
        Ok(QueryResult::Done)
    }

    // ------------------------------------------------------------------
    // SHOW
    // ------------------------------------------------------------------

    fn show(&self, names: Option<&Multi>) -> Result<String> {
        let names = names
            .iter()
            .flat_map(|m| &m.nodes)
            .map(key_name)
            .collect::<Result<Vec<_>>>()?;
        let mut out = String::new();
        let topic = names.first().map(|n| n.to_ascii_lowercase());
        match topic.as_deref() {
            None | Some("command") | Some("commands") => {
                out.push_str(
                    "SELECT, COUNT, CALC, UPDATE, INSERT, DELETE, CREATE TABLE, \
                     ALTER TABLE, DROP TABLE, SHOW\n",
                );
            }
            Some("function") | Some("functions") => {
                for name in function_names() {
                    let _ = writeln!(out, "{}", name);
                }
            }
            Some("datatype") | Some("datatypes") => {
                for t in DataType::ALL {
                    let _ = writeln!(out, "{}", t);
                }
            }
            Some("table") => {
                let name = names
                    .get(1)
                    .ok_or_else(|| Error::InvalidOperation("SHOW TABLE needs a table name".into()))?;
                let table = Table::open(Path::new(name))?;
                let desc = table.desc();
                let _ = writeln!(out, "table {} with {} rows", name, table.nrow());
                for col in desc.columns() {
                    let kind = match (col.fixed_shape(), col.ndim()) {
                        (_, _) if col.is_scalar() => "scalar".to_string(),
                        (Some(shape), _) => format!("array {}", shape),
                        (None, Some(n)) => format!("array ndim={}", n),
                        (None, None) => "array".to_string(),
                    };
                    let _ = writeln!(out, "  {} {} {}", col.name, col.data_type, kind);
                }
                for (key, value) in desc.keywords() {
                    let _ = writeln!(out, "  keyword {} = {}", key, value);
                }
            }
            Some(other) => {
                return Err(Error::InvalidOperation(format!("nothing to show for {}", other)))
            }
        }
        Ok(out)
    }
}

struct SelectColumn {
    name: String,
    expr: Expr,
    cast: Option<ValueType>,
    /// Source column of a bare column reference.
    bare: Option<String>,
}

fn record_field(field: &SyntaxNode) -> Result<(&str, &SyntaxNode)> {
    match field {
        SyntaxNode::RecFld {
            name,
            values: Some(value),
            ..
        } => Ok((name, value)),
        _ => Err(Error::internal("malformed DMINFO field")),
    }
}

fn key_name(node: &SyntaxNode) -> Result<String> {
    match node {
        SyntaxNode::KeyCol { name } => Ok(name.clone()),
        other => Err(Error::internal(format!("expected a name, got {}", other.kind_name()))),
    }
}

fn parse_type(name: &str) -> Result<DataType> {
    DataType::from_name(name)
        .ok_or_else(|| Error::InvalidOperation(format!("unknown data type {:?}", name)))
}

/// Lexicographic order on the elements; scalars sort as one element.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (a, b) = (a.elements(), b.elements());
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Indices of the first row of each distinct combination, in row order.
fn distinct_rows(columns: &[Vec<Value>], nrow: usize) -> Vec<usize> {
    let compare = |a: usize, b: usize| {
        columns
            .iter()
            .map(|c| compare_values(&c[a], &c[b]))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    };
    let mut order: Vec<usize> = (0..nrow).collect();
    order.sort_by(|&a, &b| compare(a, b).then(a.cmp(&b)));
    let mut keep = vec![false; nrow];
    let mut last: Option<usize> = None;
    for i in order {
        if last.map_or(true, |l| compare(l, i).is_ne()) {
            keep[i] = true;
        }
        last = Some(i);
    }
    (0..nrow).filter(|&i| keep[i]).collect()
}

/// Write one value into a column cell, or into a slice of an array cell.
fn store(
    table: &Table,
    col: &ColumnDesc,
    row: u64,
    value: &Value,
    bounds: Option<&[IndexBounds]>,
) -> Result<()> {
    if col.is_scalar() {
        if bounds.is_some() {
            return Err(Error::InvalidOperation(format!(
                "scalar column {} cannot be indexed",
                col.name
            )));
        }
        return table.put_cell(&col.name, row, &value.as_scalar()?.to_cell(col.data_type)?);
    }
    let shape = || -> Result<Shape> {
        table
            .array_shape(&col.name, row)?
            .or_else(|| col.fixed_shape().cloned())
            .ok_or_else(|| {
                Error::InvalidOperation(format!(
                    "array cell {} of row {} has no shape",
                    col.name, row
                ))
            })
    };
    match bounds {
        None => {
            let array = match value {
                Value::Array(a) => a.clone(),
                Value::Scalar(s) => Array::filled(shape()?, s.clone()),
            };
            table.put_array(
                &col.name,
                row,
                &Value::Array(array).to_array_cell(col.data_type)?,
            )
        }
        Some(bounds) => {
            let (slicer, _) = resolve_slice(shape()?.dims(), bounds)?;
            let length = slicer.length();
            let part = match value {
                Value::Scalar(s) => Array::filled(length, s.clone()),
                Value::Array(a) => a.clone().reshape(length)?,
            };
            table.put_array_slice(
                &col.name,
                row,
                &slicer,
                &Value::Array(part).to_array_cell(col.data_type)?,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::CellValue;
    use tempfile::tempdir;

    fn create_table(dir: &Path) -> Table {
        let desc = TableDesc::new()
            .with_column(ColumnDesc::scalar("X", DataType::Int))
            .unwrap()
            .with_column(ColumnDesc::scalar("NAME", DataType::String))
            .unwrap();
        let table = Table::create(&dir.join("t"), desc, StorageOptions::default()).unwrap();
        table.add_rows(5, true).unwrap();
        for (row, (x, name)) in [(1, "a"), (1, "b"), (1, "c"), (2, "d"), (3, "e")]
            .into_iter()
            .enumerate()
        {
            table.put_cell("X", row as u64, &CellValue::Int(x)).unwrap();
            table
                .put_cell("NAME", row as u64, &CellValue::String(name.into()))
                .unwrap();
        }
        table
    }

    #[test]
    fn test_select_where_order_limit() {
        let dir = tempdir().unwrap();
        let t = create_table(dir.path());
        let result = execute("SELECT * WHERE X > 1 ORDERBY X DESC LIMIT 2", &[t]).unwrap();
        let view = result.into_table().unwrap();
        assert_eq!(view.row_numbers(), vec![4, 3]);
    }

    #[test]
    fn test_select_columns_rename() {
        let dir = tempdir().unwrap();
        let t = create_table(dir.path());
        let view = execute("SELECT NAME AS N FROM $1 WHERE X IN [1, 3]", &[t])
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!(view.desc().column_names(), vec!["N".to_string()]);
        assert_eq!(view.row_numbers(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn test_groupby_aggregates() {
        let dir = tempdir().unwrap();
        let t = create_table(dir.path());
        let rows = execute("SELECT X, gcount() AS N FROM $1 GROUPBY X", &[t])
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows.nrow(), 3);
        assert_eq!(
            rows.column("N").unwrap(),
            &[
                Value::Scalar(Scalar::Int(3)),
                Value::Scalar(Scalar::Int(1)),
                Value::Scalar(Scalar::Int(1))
            ]
        );
    }

    #[test]
    fn test_calc_and_count() {
        let dir = tempdir().unwrap();
        let t = create_table(dir.path());
        let sum = execute("CALC gsum(X) FROM $1", &[t.clone()]).unwrap();
        assert_eq!(sum.value(), Some(&Value::Scalar(Scalar::Int(8))));
        let counts = execute("COUNT X FROM $1", &[t]).unwrap().into_rows().unwrap();
        assert_eq!(
            counts.column(COUNT_COLUMN).unwrap()[0],
            Value::Scalar(Scalar::Int(3))
        );
    }

    #[test]
    fn test_update_insert_delete() {
        let dir = tempdir().unwrap();
        let t = create_table(dir.path());
        execute("UPDATE $1 SET X = X * 10 WHERE NAME = 'a'", &[t.clone()]).unwrap();
        assert_eq!(t.get_cell("X", 0).unwrap().as_i64(), Some(10));
        execute("INSERT INTO $1 (X, NAME) VALUES (7, 'f')", &[t.clone()]).unwrap();
        assert_eq!(t.nrow(), 6);
        assert_eq!(t.get_cell("X", 5).unwrap().as_i64(), Some(7));
        execute("DELETE FROM $1 WHERE X < 3", &[t.clone()]).unwrap();
        assert_eq!(t.nrow(), 3);
    }

    #[test]
    fn test_distinct_and_offset() {
        let dir = tempdir().unwrap();
        let t = create_table(dir.path());
        let view = execute("SELECT DISTINCT X FROM $1", &[t.clone()])
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!(view.row_numbers(), vec![0, 3, 4]);
        let rows = execute("SELECT X + 1 FROM $1 OFFSET 3", &[t])
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows.nrow(), 2);
        assert_eq!(rows.get(0, 0), Some(&Value::Scalar(Scalar::Int(3))));
    }

    #[test]
    fn test_create_alter_show() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new");
        let text = format!(
            "CREATE TABLE '{}' A I4, B R8 [SHAPE=[2,2]] LIMIT 3 DMINFO BUCKETSIZE=1024",
            path.display()
        );
        let t = execute(&text, &[]).unwrap().into_table().unwrap();
        assert_eq!(t.nrow(), 3);
        execute(
            "ALTER TABLE $1 RENAME COLUMN A TO C SET KEYWORD K = 5 ADD ROW 2",
            &[t.clone()],
        )
        .unwrap();
        assert_eq!(t.nrow(), 5);
        assert!(t.desc().is_column("C"));
        assert_eq!(t.keyword("K").and_then(|k| k.as_i64()), Some(5));
        let shown = execute(&format!("SHOW TABLE '{}'", path.display()), &[]).unwrap();
        match shown {
            QueryResult::Text(text) => {
                assert!(text.contains("with 5 rows"));
                assert!(text.contains("B DOUBLE array [2, 2]"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    fn dminfo_options(text: &str) -> Result<StorageOptions> {
        let node = crate::taql::parser::parse(text)?;
        let SyntaxNode::CreTab(c) = &node else {
            panic!("expected CREATE TABLE, got {}", node.kind_name());
        };
        Executor { tables: &[] }.options(c.dminfo.as_ref())
    }

    #[test]
    fn test_dminfo_record_list() {
        let options = dminfo_options(
            "CREATE TABLE 't' A I4 DMINFO [NAME='ism', TYPE='IncrementalStMan', \
             SPEC=[BUCKETSIZE=1000, CACHESIZE=4], COLUMNS=['A']]",
        )
        .unwrap();
        assert_eq!(options.bucket_size, 1000);
        assert_eq!(options.cache_buckets, 4);

        let bare = dminfo_options("CREATE TABLE 't' A I4 DMINFO BUCKETSIZE=2048").unwrap();
        assert_eq!(bare.bucket_size, 2048);

        assert!(matches!(
            dminfo_options("CREATE TABLE 't' A I4 DMINFO [TYPE='StandardStMan']"),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            dminfo_options("CREATE TABLE 't' A I4 DMINFO [SPEC=[TILESHAPE=4]]"),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_create_with_dminfo_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec");
        let text = format!(
            "CREATE TABLE '{}' A I4 LIMIT 2 DMINFO [NAME='ism', TYPE='IncrementalStMan', SPEC=[BUCKETSIZE=1000]]",
            path.display()
        );
        let t = execute(&text, &[]).unwrap().into_table().unwrap();
        assert_eq!(t.nrow(), 2);
    }

    #[test]
    fn test_in_subquery() {
        let dir = tempdir().unwrap();
        let t = create_table(dir.path());
        let rows = execute(
            "SELECT * FROM $1 WHERE X IN (SELECT X FROM $1 WHERE NAME = 'e')",
            &[t],
        )
        .unwrap();
        assert_eq!(rows.nrow(), 1);
    }
}
