//! Recursive-descent parser producing [`SyntaxNode`] trees.
//!
//! Operator precedence, loosest first:
//!
//! | level | operators |
//! |---|---|
//! | or | `OR`, `\|\|` |
//! | and | `AND`, `&&` |
//! | not | `NOT` |
//! | comparison | `=` `==` `<>` `!=` `>` `>=` `<` `<=` `IN` `NOT IN` `~ pattern` |
//! | bitwise | `\|`, then `^`, then `&` |
//! | additive | `+` `-` |
//! | multiplicative | `*` `/` `//` `%` |
//! | unary | `-` `+` `~` `!` |
//! | power | `**` (right associative) |
//! | postfix | `[index]`, unit string |
//!
//! All parsing and compilation runs under the process-wide [`ParserLock`].

use parking_lot::{const_reentrant_mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::array::DataType;
use crate::common::{Error, Result};
use crate::table::Table;

use super::compile::compile_expr;
use super::expr::Expr;
use super::lexer::{Lexer, Token, TokenKind};
use super::syntax::{
    AltTab, BinaryOp, Calc, Const, Count, CreTab, Delete, Insert, Literal, Multi, Range, Regex,
    RenDropKind, Select, SortOrder, SyntaxNode, UnaryOp, Update,
};

static PARSER_LOCK: ReentrantMutex<()> = const_reentrant_mutex(());

/// Serializes parsing and compilation across the process.
///
/// The lock is reentrant so that a statement executing a subquery can parse
/// and compile it on the same thread.
pub struct ParserLock {
    _guard: ReentrantMutexGuard<'static, ()>,
}

impl ParserLock {
    pub fn acquire() -> Self {
        Self {
            _guard: PARSER_LOCK.lock(),
        }
    }

    /// Parse a full command; text without a command keyword is a CALC.
    pub fn parse(&self, text: &str) -> Result<SyntaxNode> {
        ParserSession::new(text)?.parse_command()
    }

    pub fn parse_expr(&self, text: &str) -> Result<SyntaxNode> {
        ParserSession::new(text)?.parse_expression()
    }

    /// Parse and compile an expression against an optional table.
    pub fn compile(&self, text: &str, table: Option<&Table>) -> Result<Expr> {
        let node = self.parse_expr(text)?;
        compile_expr(&node, table)
    }

    pub fn compile_node(&self, node: &SyntaxNode, table: Option<&Table>) -> Result<Expr> {
        compile_expr(node, table)
    }
}

/// Parse a command under the parser lock.
pub fn parse(text: &str) -> Result<SyntaxNode> {
    ParserLock::acquire().parse(text)
}

/// Parse a single expression under the parser lock.
pub fn parse_expr(text: &str) -> Result<SyntaxNode> {
    ParserLock::acquire().parse_expr(text)
}

/// State of one parse: the input, its tokens and the cursor.
pub struct ParserSession<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    cursor: usize,
}

impl<'a> ParserSession<'a> {
    pub fn new(input: &'a str) -> Result<Self> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self {
            input,
            tokens,
            cursor: 0,
        })
    }

    /// Byte offset of the next unread token.
    pub fn position(&self) -> usize {
        self.peek().offset
    }

    pub fn parse_command(mut self) -> Result<SyntaxNode> {
        let node = self.command()?;
        self.finish()?;
        Ok(node)
    }

    pub fn parse_expression(mut self) -> Result<SyntaxNode> {
        let node = self.expr()?;
        self.finish()?;
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.cursor + n).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let offset = self.position();
        Error::Parse {
            message: message.into(),
            offset,
            scanned: self.input[..offset].to_string(),
        }
    }

    fn at_keyword(&self, word: &str) -> bool {
        self.peek().is_keyword(word)
    }

    fn at_op(&self, op: &str) -> bool {
        self.peek().is_op(op)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<()> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", word)))
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", op)))
        }
    }

    /// `GROUPBY` or `GROUP BY`, and likewise for ORDER.
    fn eat_joined(&mut self, joined: &str, first: &str) -> Result<bool> {
        if self.eat_keyword(joined) {
            return Ok(true);
        }
        if self.eat_keyword(first) {
            self.expect_keyword("BY")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn finish(&mut self) -> Result<()> {
        self.eat_op(";");
        if self.peek().kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    /// An identifier or a quoted name.
    fn name(&mut self) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Ident(s) | TokenKind::Str(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    fn at_name(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Ident(_) | TokenKind::Str(_))
    }

    /// A data type name, if the next token is one.
    fn data_type(&mut self) -> Option<String> {
        match &self.peek().kind {
            TokenKind::Ident(s) if DataType::from_name(s).is_some() => {
                let s = s.to_ascii_uppercase();
                self.advance();
                Some(s)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn command(&mut self) -> Result<SyntaxNode> {
        let word = match &self.peek().kind {
            TokenKind::Keyword(k) => k.clone(),
            _ => String::new(),
        };
        match word.as_str() {
            "SELECT" => self.select(),
            "COUNT" => self.count(),
            "CALC" => {
                self.advance();
                self.calc()
            }
            "UPDATE" => self.update(),
            "INSERT" => self.insert(),
            "DELETE" => self.delete(),
            "CREATE" => self.create(),
            "ALTER" => self.alter(),
            "DROP" => self.drop_table(),
            "SHOW" => self.show(),
            _ => self.calc(),
        }
    }

    fn select(&mut self) -> Result<SyntaxNode> {
        self.expect_keyword("SELECT")?;
        let columns = self.columns()?;
        let tables = if self.eat_keyword("FROM") {
            Some(self.tables()?)
        } else {
            None
        };
        let where_ = self.opt_where()?;
        let groupby = if self.eat_joined("GROUPBY", "GROUP")? {
            let rollup = self.eat_keyword("ROLLUP");
            Some(Box::new(SyntaxNode::Groupby {
                rollup,
                nodes: Multi::new(self.expr_list()?),
            }))
        } else {
            None
        };
        let having = if self.eat_keyword("HAVING") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        let sort = self.opt_sort()?;
        let limitoff = self.opt_limit_offset()?;
        let giving = if self.eat_keyword("GIVING") {
            Some(Box::new(self.giving()?))
        } else {
            None
        };
        let dminfo = self.opt_dminfo()?;
        Ok(SyntaxNode::Select(Box::new(Select {
            columns: Box::new(columns),
            tables,
            where_,
            groupby,
            having,
            sort,
            limitoff,
            giving,
            dminfo,
        })))
    }

    fn columns(&mut self) -> Result<SyntaxNode> {
        let distinct = self.eat_keyword("DISTINCT");
        if self.eat_op("*") || !self.at_column_start() {
            return Ok(SyntaxNode::Columns {
                distinct,
                nodes: None,
            });
        }
        let mut nodes = Vec::new();
        loop {
            nodes.push(self.column()?);
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(SyntaxNode::Columns {
            distinct,
            nodes: Some(Multi::new(nodes)),
        })
    }

    fn at_column_start(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Keyword(k) => matches!(k.as_str(), "TRUE" | "FALSE" | "NOT" | "EXISTS"),
            TokenKind::Eof => false,
            TokenKind::Op(op) => !matches!(*op, ")" | ";" | ","),
            _ => true,
        }
    }

    fn column(&mut self) -> Result<SyntaxNode> {
        let expr = self.expr()?;
        let (name, dtype) = if self.eat_keyword("AS") {
            let name = self.name()?;
            (name, self.data_type().unwrap_or_default())
        } else {
            (String::new(), String::new())
        };
        Ok(SyntaxNode::Col {
            expr: Box::new(expr),
            name,
            dtype,
        })
    }

    fn tables(&mut self) -> Result<Multi> {
        let mut nodes = vec![self.table()?];
        while self.eat_op(",") {
            nodes.push(self.table()?);
        }
        Ok(Multi::new(nodes))
    }

    fn table(&mut self) -> Result<SyntaxNode> {
        let table = match &self.peek().kind {
            TokenKind::TableArg(n) => {
                let n = *n;
                self.advance();
                SyntaxNode::Const(Const::table_arg(n))
            }
            TokenKind::Ident(_) | TokenKind::Str(_) => {
                SyntaxNode::Const(Const::table_path(self.name()?))
            }
            TokenKind::Op("(") => {
                self.advance();
                let inner = self.command()?;
                self.expect_op(")")?;
                inner
            }
            _ => return Err(self.error("expected a table")),
        };
        let alias = if self.eat_keyword("AS") {
            self.name()?
        } else {
            String::new()
        };
        Ok(SyntaxNode::Table {
            table: Box::new(table),
            alias,
        })
    }

    fn opt_where(&mut self) -> Result<Option<Box<SyntaxNode>>> {
        if self.eat_keyword("WHERE") {
            Ok(Some(Box::new(self.expr()?)))
        } else {
            Ok(None)
        }
    }

    fn opt_sort(&mut self) -> Result<Option<Box<SyntaxNode>>> {
        if !self.eat_joined("ORDERBY", "ORDER")? {
            return Ok(None);
        }
        let unique = self.eat_keyword("UNIQUE");
        let descending = if self.eat_keyword("DESC") {
            true
        } else {
            self.eat_keyword("ASC");
            false
        };
        let mut keys = Vec::new();
        loop {
            let child = Box::new(self.expr()?);
            let order = if self.eat_keyword("ASC") {
                SortOrder::Ascending
            } else if self.eat_keyword("DESC") {
                SortOrder::Descending
            } else {
                SortOrder::Default
            };
            keys.push(SyntaxNode::SortKey { order, child });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(Some(Box::new(SyntaxNode::Sort {
            unique,
            descending,
            keys: Multi::new(keys),
        })))
    }

    fn opt_limit_offset(&mut self) -> Result<Option<Box<SyntaxNode>>> {
        let mut limit = None;
        let mut offset = None;
        loop {
            if limit.is_none() && self.eat_keyword("LIMIT") {
                limit = Some(Box::new(self.expr()?));
            } else if offset.is_none() && self.eat_keyword("OFFSET") {
                offset = Some(Box::new(self.expr()?));
            } else {
                break;
            }
        }
        if limit.is_none() && offset.is_none() {
            return Ok(None);
        }
        Ok(Some(Box::new(SyntaxNode::LimitOff { limit, offset })))
    }

    fn giving(&mut self) -> Result<SyntaxNode> {
        if self.eat_op("[") {
            let exprs = self.expr_list_until("]")?;
            return Ok(SyntaxNode::Giving {
                name: String::new(),
                exprs: Some(Multi::bracketed("[", "]", exprs)),
            });
        }
        Ok(SyntaxNode::Giving {
            name: self.name()?,
            exprs: None,
        })
    }

    /// `DMINFO field=value, ...` or `DMINFO [record], [record], ...`.
    fn opt_dminfo(&mut self) -> Result<Option<Multi>> {
        if !self.eat_keyword("DMINFO") {
            return Ok(None);
        }
        let mut items = Vec::new();
        loop {
            items.push(if self.at_op("[") {
                self.advance();
                SyntaxNode::Multi(self.record_fields()?)
            } else {
                self.record_field()?
            });
            if !self.eat_op(",") {
                return Ok(Some(Multi::new(items)));
            }
        }
    }

    /// True at `[name=`, the start of a nested record.
    fn at_record(&self) -> bool {
        self.at_op("[")
            && matches!(
                self.peek_at(1).kind,
                TokenKind::Ident(_) | TokenKind::Keyword(_) | TokenKind::Str(_)
            )
            && self.peek_at(2).is_op("=")
    }

    /// Fields of a record up to the closing bracket.
    fn record_fields(&mut self) -> Result<Multi> {
        let mut fields = Vec::new();
        while !self.eat_op("]") {
            if !fields.is_empty() {
                self.expect_op(",")?;
            }
            fields.push(self.record_field()?);
        }
        Ok(Multi::bracketed("[", "]", fields))
    }

    /// `name=value [AS type]`; the value may be a nested `[name=value, ...]`
    /// record.
    fn record_field(&mut self) -> Result<SyntaxNode> {
        let name = match &self.peek().kind {
            TokenKind::Keyword(k) => {
                let k = k.clone();
                self.advance();
                k
            }
            _ => self.name()?,
        };
        self.expect_op("=")?;
        let values = if self.at_record() {
            self.advance();
            SyntaxNode::Multi(self.record_fields()?)
        } else {
            self.expr()?
        };
        let dtype = if self.eat_keyword("AS") {
            self.data_type()
                .ok_or_else(|| self.error("expected a data type"))?
        } else {
            String::new()
        };
        Ok(SyntaxNode::RecFld {
            name,
            values: Some(Box::new(values)),
            dtype,
        })
    }

    fn count(&mut self) -> Result<SyntaxNode> {
        self.expect_keyword("COUNT")?;
        let columns = self.columns()?;
        self.expect_keyword("FROM")?;
        let tables = self.tables()?;
        let where_ = self.opt_where()?;
        Ok(SyntaxNode::Count(Box::new(Count {
            columns: Box::new(columns),
            tables,
            where_,
        })))
    }

    fn calc(&mut self) -> Result<SyntaxNode> {
        let expr = Box::new(self.expr()?);
        let tables = if self.eat_keyword("FROM") {
            Some(self.tables()?)
        } else {
            None
        };
        let where_ = self.opt_where()?;
        let sort = self.opt_sort()?;
        let limitoff = self.opt_limit_offset()?;
        Ok(SyntaxNode::Calc(Box::new(Calc {
            tables,
            expr,
            where_,
            sort,
            limitoff,
        })))
    }

    fn update(&mut self) -> Result<SyntaxNode> {
        self.expect_keyword("UPDATE")?;
        let tables = self.tables()?;
        self.expect_keyword("SET")?;
        let mut exprs = vec![self.update_expr()?];
        while self.eat_op(",") {
            exprs.push(self.update_expr()?);
        }
        let from = if self.eat_keyword("FROM") {
            Some(self.tables()?)
        } else {
            None
        };
        let where_ = self.opt_where()?;
        let sort = self.opt_sort()?;
        let limitoff = self.opt_limit_offset()?;
        Ok(SyntaxNode::Update(Box::new(Update {
            tables,
            update: Multi::new(exprs),
            from,
            where_,
            sort,
            limitoff,
        })))
    }

    /// `name[indices]=expr`
    fn update_expr(&mut self) -> Result<SyntaxNode> {
        let name = self.name()?;
        let indices = if self.eat_op("[") {
            Some(self.index_list()?)
        } else {
            None
        };
        self.expect_op("=")?;
        Ok(SyntaxNode::UpdExpr {
            name,
            indices,
            expr: Box::new(self.expr()?),
        })
    }

    fn insert(&mut self) -> Result<SyntaxNode> {
        self.expect_keyword("INSERT")?;
        let mut limit = None;
        if self.eat_keyword("LIMIT") {
            limit = Some(Box::new(self.expr()?));
        }
        self.expect_keyword("INTO")?;
        let tables = self.tables()?;
        let column_list =
            self.at_op("[") || (self.at_op("(") && !self.peek_at(1).is_keyword("SELECT"));
        let mut columns = if column_list {
            let close = if self.eat_op("[") {
                "]"
            } else {
                self.expect_op("(")?;
                ")"
            };
            let mut names = Vec::new();
            while !self.eat_op(close) {
                if !names.is_empty() {
                    self.expect_op(",")?;
                }
                names.push(SyntaxNode::KeyCol { name: self.name()? });
            }
            Some(Multi::new(names))
        } else {
            None
        };
        let values = if self.eat_keyword("VALUES") {
            let mut rows = vec![self.value_row()?];
            while self.eat_op(",") {
                rows.push(self.value_row()?);
            }
            let mut m = Multi::new(rows);
            m.prefix = "VALUES ".into();
            SyntaxNode::Multi(m)
        } else if self.eat_keyword("SET") {
            if columns.is_some() {
                return Err(self.error("INSERT cannot give both a column list and SET"));
            }
            let mut names = Vec::new();
            let mut exprs = Vec::new();
            loop {
                names.push(SyntaxNode::KeyCol { name: self.name()? });
                self.expect_op("=")?;
                exprs.push(self.expr()?);
                if !self.eat_op(",") {
                    break;
                }
            }
            columns = Some(Multi::new(names));
            let mut m = Multi::new(vec![SyntaxNode::Multi(Multi::set(exprs))]);
            m.prefix = "VALUES ".into();
            SyntaxNode::Multi(m)
        } else if self.at_keyword("SELECT") {
            self.select()?
        } else if self.at_op("(") && self.peek_at(1).is_keyword("SELECT") {
            self.advance();
            let node = self.select()?;
            self.expect_op(")")?;
            node
        } else {
            return Err(self.error("expected VALUES, SET or SELECT"));
        };
        Ok(SyntaxNode::Insert(Box::new(Insert {
            tables,
            columns,
            values: Box::new(values),
            limit,
        })))
    }

    /// `[e1, e2]` or `(e1, e2)`
    fn value_row(&mut self) -> Result<SyntaxNode> {
        let close = if self.eat_op("[") {
            "]"
        } else {
            self.expect_op("(")?;
            ")"
        };
        Ok(SyntaxNode::Multi(Multi::set(self.expr_list_until(close)?)))
    }

    fn delete(&mut self) -> Result<SyntaxNode> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let tables = self.tables()?;
        let where_ = self.opt_where()?;
        let sort = self.opt_sort()?;
        let limitoff = self.opt_limit_offset()?;
        Ok(SyntaxNode::Delete(Box::new(Delete {
            tables,
            where_,
            sort,
            limitoff,
        })))
    }

    fn create(&mut self) -> Result<SyntaxNode> {
        self.expect_keyword("CREATE")?;
        self.expect_keyword("TABLE")?;
        let giving = SyntaxNode::Giving {
            name: self.name()?,
            exprs: None,
        };
        let mut like = None;
        let mut like_drop = None;
        if self.eat_keyword("LIKE") {
            like = Some(Box::new(self.table()?));
            if self.at_keyword("DROP") {
                self.advance();
                self.expect_keyword("COLUMN")?;
                like_drop = Some(self.name_list()?);
            }
            if self.eat_keyword("ADD") {
                self.expect_keyword("COLUMN")?;
            }
        }
        let columns = if self.eat_op("(") {
            let specs = self.column_specs()?;
            self.expect_op(")")?;
            Some(specs)
        } else if self.at_name() {
            Some(self.column_specs()?)
        } else {
            None
        };
        let limit = if self.eat_keyword("LIMIT") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        let dminfo = self.opt_dminfo()?;
        Ok(SyntaxNode::CreTab(Box::new(CreTab {
            giving: Box::new(giving),
            like,
            like_drop,
            columns,
            limit,
            dminfo,
        })))
    }

    fn column_specs(&mut self) -> Result<Multi> {
        let mut specs = vec![self.column_spec()?];
        while self.eat_op(",") {
            specs.push(self.column_spec()?);
        }
        Ok(Multi::new(specs))
    }

    /// `name [LIKE column] [type] [[field=value, ...]]`
    fn column_spec(&mut self) -> Result<SyntaxNode> {
        let name = self.name()?;
        let like_col = if self.eat_keyword("LIKE") {
            self.name()?
        } else {
            String::new()
        };
        let dtype = self.data_type().unwrap_or_default();
        if like_col.is_empty() && dtype.is_empty() {
            return Err(self.error(format!("column {} needs a data type", name)));
        }
        let spec = if self.eat_op("[") {
            Some(self.record_fields()?)
        } else {
            None
        };
        Ok(SyntaxNode::ColSpec {
            name,
            like_col,
            dtype,
            spec,
        })
    }

    fn name_list(&mut self) -> Result<Multi> {
        let mut names = vec![SyntaxNode::KeyCol { name: self.name()? }];
        while self.eat_op(",") {
            names.push(SyntaxNode::KeyCol { name: self.name()? });
        }
        Ok(Multi::new(names))
    }

    /// `a TO b, c TO d`
    fn rename_list(&mut self) -> Result<Multi> {
        let mut names = Vec::new();
        loop {
            names.push(SyntaxNode::KeyCol { name: self.name()? });
            self.expect_keyword("TO")?;
            names.push(SyntaxNode::KeyCol { name: self.name()? });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(Multi::pairs(names, " TO "))
    }

    fn alter(&mut self) -> Result<SyntaxNode> {
        self.expect_keyword("ALTER")?;
        self.expect_keyword("TABLE")?;
        let table = self.table()?;
        let from = if self.eat_keyword("FROM") {
            Some(self.tables()?)
        } else {
            None
        };
        let mut commands = Vec::new();
        loop {
            let command = if self.eat_keyword("ADD") {
                if self.eat_keyword("ROW") {
                    SyntaxNode::AddRow {
                        nrow: Box::new(self.expr()?),
                    }
                } else {
                    self.expect_keyword("COLUMN")?;
                    let columns = self.column_specs()?;
                    SyntaxNode::AddCol {
                        columns,
                        dminfo: self.opt_dminfo()?,
                    }
                }
            } else if self.eat_keyword("RENAME") {
                let kind = if self.eat_keyword("KEYWORD") {
                    RenDropKind::RenameKeyword
                } else {
                    self.expect_keyword("COLUMN")?;
                    RenDropKind::RenameColumn
                };
                SyntaxNode::RenDrop {
                    kind,
                    names: self.rename_list()?,
                }
            } else if self.eat_keyword("DROP") {
                let kind = if self.eat_keyword("KEYWORD") {
                    RenDropKind::DropKeyword
                } else {
                    self.expect_keyword("COLUMN")?;
                    RenDropKind::DropColumn
                };
                SyntaxNode::RenDrop {
                    kind,
                    names: self.name_list()?,
                }
            } else if self.eat_keyword("SET") {
                self.expect_keyword("KEYWORD")?;
                let mut keyvals = vec![self.update_expr()?];
                while self.eat_op(",") {
                    keyvals.push(self.update_expr()?);
                }
                SyntaxNode::SetKey {
                    keyvals: Multi::new(keyvals),
                }
            } else if self.eat_keyword("COPY") {
                self.expect_keyword("COLUMN")?;
                let mut names = Vec::new();
                loop {
                    let name = self.name()?;
                    self.expect_op("=")?;
                    let source = self.name()?;
                    names.push(SyntaxNode::UpdExpr {
                        name,
                        indices: None,
                        expr: Box::new(SyntaxNode::KeyCol { name: source }),
                    });
                    if !self.eat_op(",") {
                        break;
                    }
                }
                SyntaxNode::CopyCol {
                    names: Multi::new(names),
                    dminfo: self.opt_dminfo()?,
                }
            } else {
                break;
            };
            commands.push(command);
        }
        if commands.is_empty() {
            return Err(self.error("expected an ALTER TABLE command"));
        }
        Ok(SyntaxNode::AltTab(Box::new(AltTab {
            table: Box::new(table),
            from,
            commands: Multi::new(commands).with_sep(" "),
        })))
    }

    fn drop_table(&mut self) -> Result<SyntaxNode> {
        self.expect_keyword("DROP")?;
        self.expect_keyword("TABLE")?;
        Ok(SyntaxNode::DropTab {
            tables: self.tables()?,
        })
    }

    fn show(&mut self) -> Result<SyntaxNode> {
        self.expect_keyword("SHOW")?;
        let mut names = Vec::new();
        loop {
            let name = match &self.peek().kind {
                TokenKind::Ident(s) | TokenKind::Str(s) | TokenKind::Keyword(s) => s.clone(),
                _ => break,
            };
            self.advance();
            names.push(SyntaxNode::KeyCol { name });
        }
        let names = (!names.is_empty()).then(|| Multi::new(names).with_sep(" "));
        Ok(SyntaxNode::Show { names })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self) -> Result<SyntaxNode> {
        self.or_expr()
    }

    fn expr_list(&mut self) -> Result<Vec<SyntaxNode>> {
        let mut list = vec![self.expr()?];
        while self.eat_op(",") {
            list.push(self.expr()?);
        }
        Ok(list)
    }

    /// Comma separated expressions up to (and including) `close`.
    fn expr_list_until(&mut self, close: &str) -> Result<Vec<SyntaxNode>> {
        let mut list = Vec::new();
        while !self.eat_op(close) {
            if !list.is_empty() {
                self.expect_op(",")?;
            }
            list.push(self.expr()?);
        }
        Ok(list)
    }

    fn binary(op: BinaryOp, left: SyntaxNode, right: SyntaxNode) -> SyntaxNode {
        SyntaxNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn or_expr(&mut self) -> Result<SyntaxNode> {
        let mut node = self.and_expr()?;
        while self.eat_keyword("OR") || self.eat_op("||") {
            let right = self.and_expr()?;
            node = Self::binary(BinaryOp::Or, node, right);
        }
        Ok(node)
    }

    fn and_expr(&mut self) -> Result<SyntaxNode> {
        let mut node = self.not_expr()?;
        while self.eat_keyword("AND") || self.eat_op("&&") {
            let right = self.not_expr()?;
            node = Self::binary(BinaryOp::And, node, right);
        }
        Ok(node)
    }

    fn not_expr(&mut self) -> Result<SyntaxNode> {
        if self.at_keyword("NOT") && !self.peek_at(1).is_keyword("EXISTS") {
            self.advance();
            return Ok(SyntaxNode::Unary {
                op: UnaryOp::Not,
                child: Box::new(self.not_expr()?),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<SyntaxNode> {
        let left = self.bitor_expr()?;
        let op = match &self.peek().kind {
            TokenKind::Op("=") | TokenKind::Op("==") => Some(BinaryOp::Eq),
            TokenKind::Op("<>") | TokenKind::Op("!=") => Some(BinaryOp::Ne),
            TokenKind::Op(">") => Some(BinaryOp::Gt),
            TokenKind::Op(">=") => Some(BinaryOp::Ge),
            TokenKind::Op("<") => Some(BinaryOp::Lt),
            TokenKind::Op("<=") => Some(BinaryOp::Le),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.bitor_expr()?;
            return Ok(Self::binary(op, left, right));
        }
        if let TokenKind::Regex(lit) = &self.peek().kind {
            let lit = lit.clone();
            self.advance();
            let op = if lit.negate {
                BinaryOp::NeRegex
            } else {
                BinaryOp::EqRegex
            };
            let regex = SyntaxNode::Regex(Regex {
                value: lit.value,
                case_insensitive: lit.case_insensitive,
                negate: lit.negate,
                ignore_blanks: lit.ignore_blanks,
                max_distance: lit.max_distance,
            });
            return Ok(Self::binary(op, left, regex));
        }
        if self.eat_keyword("IN") {
            let right = self.in_rhs()?;
            return Ok(Self::binary(BinaryOp::In, left, right));
        }
        if self.at_keyword("NOT") && self.peek_at(1).is_keyword("IN") {
            self.advance();
            self.advance();
            let right = self.in_rhs()?;
            return Ok(SyntaxNode::Unary {
                op: UnaryOp::Not,
                child: Box::new(Self::binary(BinaryOp::In, left, right)),
            });
        }
        Ok(left)
    }

    /// Right side of IN: a set, a subquery, a parenthesized list or any
    /// array-valued operand.
    fn in_rhs(&mut self) -> Result<SyntaxNode> {
        if self.at_op("(") && !self.peek_at(1).is_keyword("SELECT") {
            self.advance();
            let list = self.set_elements(")")?;
            return Ok(SyntaxNode::Multi(Multi::set(list)));
        }
        self.bitor_expr()
    }

    fn bitor_expr(&mut self) -> Result<SyntaxNode> {
        let mut node = self.bitxor_expr()?;
        while self.eat_op("|") {
            let right = self.bitxor_expr()?;
            node = Self::binary(BinaryOp::BitOr, node, right);
        }
        Ok(node)
    }

    fn bitxor_expr(&mut self) -> Result<SyntaxNode> {
        let mut node = self.bitand_expr()?;
        while self.eat_op("^") {
            let right = self.bitand_expr()?;
            node = Self::binary(BinaryOp::BitXor, node, right);
        }
        Ok(node)
    }

    fn bitand_expr(&mut self) -> Result<SyntaxNode> {
        let mut node = self.additive()?;
        while self.eat_op("&") {
            let right = self.additive()?;
            node = Self::binary(BinaryOp::BitAnd, node, right);
        }
        Ok(node)
    }

    fn additive(&mut self) -> Result<SyntaxNode> {
        let mut node = self.multiplicative()?;
        loop {
            let op = if self.eat_op("+") {
                BinaryOp::Plus
            } else if self.eat_op("-") {
                BinaryOp::Minus
            } else {
                return Ok(node);
            };
            let right = self.multiplicative()?;
            node = Self::binary(op, node, right);
        }
    }

    fn multiplicative(&mut self) -> Result<SyntaxNode> {
        let mut node = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinaryOp::Times
            } else if self.eat_op("//") {
                BinaryOp::DivideTrunc
            } else if self.eat_op("/") {
                BinaryOp::Divide
            } else if self.eat_op("%") {
                BinaryOp::Modulo
            } else {
                return Ok(node);
            };
            let right = self.unary()?;
            node = Self::binary(op, node, right);
        }
    }

    fn unary(&mut self) -> Result<SyntaxNode> {
        let op = if self.eat_op("-") {
            UnaryOp::Minus
        } else if self.eat_op("~") {
            UnaryOp::BitNot
        } else if self.eat_op("!") {
            UnaryOp::Not
        } else if self.eat_op("+") {
            return self.unary();
        } else {
            return self.power();
        };
        Ok(SyntaxNode::Unary {
            op,
            child: Box::new(self.unary()?),
        })
    }

    fn power(&mut self) -> Result<SyntaxNode> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exponent = self.unary()?;
            return Ok(Self::binary(BinaryOp::Power, base, exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<SyntaxNode> {
        let mut node = self.primary()?;
        loop {
            if self.eat_op("[") {
                let indices = self.index_list()?;
                node = Self::binary(BinaryOp::Index, node, SyntaxNode::Multi(indices));
            } else if let TokenKind::Str(unit) = &self.peek().kind {
                let unit = unit.clone();
                self.advance();
                node = match node {
                    SyntaxNode::Const(mut c) if c.unit.is_empty() && !c.is_table_name => {
                        c.unit = unit;
                        SyntaxNode::Const(c)
                    }
                    other => SyntaxNode::Unit {
                        unit,
                        child: Box::new(other),
                    },
                };
            } else {
                return Ok(node);
            }
        }
    }

    /// Index elements `[start][:[end][:incr]]` after the opening bracket.
    fn index_list(&mut self) -> Result<Multi> {
        let mut elements = Vec::new();
        loop {
            if elements.is_empty() && self.at_op("]") {
                return Err(self.error("empty index"));
            }
            let start = self.index_part()?;
            elements.push(self.index_rest(start)?);
            if self.eat_op("]") {
                return Ok(Multi::bracketed("[", "]", elements));
            }
            self.expect_op(",")?;
        }
    }

    /// The optional `:[end][:incr]` after an index start.
    fn index_rest(&mut self, start: Option<Box<SyntaxNode>>) -> Result<SyntaxNode> {
        let mut end = None;
        let mut incr = None;
        let colon = self.eat_op(":");
        if colon {
            end = self.index_part()?;
            if self.eat_op(":") {
                incr = self.index_part()?;
            }
        }
        Ok(SyntaxNode::Index {
            start,
            end,
            incr,
            colon,
        })
    }

    fn index_part(&mut self) -> Result<Option<Box<SyntaxNode>>> {
        if self.at_op(":") || self.at_op(",") || self.at_op("]") {
            Ok(None)
        } else {
            Ok(Some(Box::new(self.expr()?)))
        }
    }

    fn primary(&mut self) -> Result<SyntaxNode> {
        let token = self.peek().clone();
        let literal = match token.kind {
            TokenKind::Int(v) => Some(Literal::Int(v)),
            TokenKind::Real(v) => Some(Literal::Real(v)),
            TokenKind::Imag(v) => Some(Literal::Complex(num_complex::Complex64::new(0.0, v))),
            TokenKind::Str(ref s) => Some(Literal::String(s.clone())),
            TokenKind::Time(v) => Some(Literal::Time(v)),
            TokenKind::Keyword(ref k) if k == "TRUE" => Some(Literal::Bool(true)),
            TokenKind::Keyword(ref k) if k == "FALSE" => Some(Literal::Bool(false)),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(SyntaxNode::Const(Const::new(value)));
        }
        match token.kind {
            TokenKind::Keyword(ref k) if k == "EXISTS" => {
                self.advance();
                Ok(SyntaxNode::Unary {
                    op: UnaryOp::Exists,
                    child: Box::new(self.subquery()?),
                })
            }
            TokenKind::Keyword(ref k) if k == "NOT" && self.peek_at(1).is_keyword("EXISTS") => {
                self.advance();
                self.advance();
                Ok(SyntaxNode::Unary {
                    op: UnaryOp::NotExists,
                    child: Box::new(self.subquery()?),
                })
            }
            TokenKind::Op("(") => {
                if self.peek_at(1).is_keyword("SELECT") {
                    return self.subquery();
                }
                self.advance();
                let node = self.expr()?;
                self.expect_op(")")?;
                Ok(node)
            }
            TokenKind::Op("[") => {
                self.advance();
                let list = self.set_elements("]")?;
                Ok(SyntaxNode::Multi(Multi::set(list)))
            }
            TokenKind::Op("{") | TokenKind::Op("<") => self.range(),
            TokenKind::Ident(name) => {
                self.advance();
                if self.eat_op("(") {
                    let args = if self.at_op("*") && self.peek_at(1).is_op(")") {
                        self.advance();
                        self.advance();
                        Vec::new()
                    } else {
                        self.expr_list_until(")")?
                    };
                    return Ok(SyntaxNode::Func {
                        name,
                        args: Multi::new(args),
                    });
                }
                Ok(SyntaxNode::KeyCol { name })
            }
            TokenKind::Eof => Err(self.error("unexpected end of input")),
            _ => Err(self.error("unexpected token in expression")),
        }
    }

    /// `(SELECT ...)`
    fn subquery(&mut self) -> Result<SyntaxNode> {
        self.expect_op("(")?;
        let node = self.select()?;
        self.expect_op(")")?;
        Ok(node)
    }

    /// Elements of a set literal; each is a value, an interval, a
    /// `mid<:>width` interval or a `start:end[:incr]` range.
    fn set_elements(&mut self, close: &str) -> Result<Vec<SyntaxNode>> {
        let mut list = Vec::new();
        while !self.eat_op(close) {
            if !list.is_empty() {
                self.expect_op(",")?;
            }
            let element = if self.at_op("{") || self.at_op("<") {
                self.range()?
            } else if self.at_op(":") {
                self.index_rest(None)?
            } else {
                let value = self.expr()?;
                if self.eat_op("<:>") {
                    let width = self.additive()?;
                    SyntaxNode::Range(Range {
                        start: Some(Box::new(value)),
                        end: Some(Box::new(width)),
                        left_closed: true,
                        right_closed: true,
                        mid_width: true,
                    })
                } else if self.at_op(":") {
                    self.index_rest(Some(Box::new(value)))?
                } else {
                    value
                }
            };
            list.push(element);
        }
        Ok(list)
    }

    /// `{a,b}`, `<a,b>`, `{a,b>`, `<a,b}` with either bound optional.
    fn range(&mut self) -> Result<SyntaxNode> {
        let left_closed = if self.eat_op("{") {
            true
        } else {
            self.expect_op("<")?;
            false
        };
        let start = if self.at_op(",") {
            None
        } else {
            Some(Box::new(self.additive()?))
        };
        self.expect_op(",")?;
        let end = if self.at_op("}") || self.at_op(">") {
            None
        } else {
            Some(Box::new(self.additive()?))
        };
        let right_closed = if self.eat_op("}") {
            true
        } else {
            self.expect_op(">")?;
            false
        };
        Ok(SyntaxNode::Range(Range {
            start,
            end,
            left_closed,
            right_closed,
            mid_width: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reparse_stable(text: &str) {
        let first = parse(text).unwrap().show();
        let second = parse(&first).unwrap().show();
        assert_eq!(first, second, "show of '{}' is not stable", text);
    }

    #[test]
    fn test_precedence() {
        let node = parse_expr("1 + 2 * 3").unwrap();
        assert_eq!(node.show(), "(1)+((2)*(3))");
        let node = parse_expr("-2 ** 2").unwrap();
        assert_eq!(node.show(), "-((2)**(2))");
        let node = parse_expr("a > 1 AND b < 2 OR NOT c").unwrap();
        assert_eq!(node.show(), "(((a)>(1))&&((b)<(2)))||(NOT(c))");
    }

    #[test]
    fn test_plain_expression_is_calc() {
        let node = parse("1 + 2").unwrap();
        assert!(matches!(node, SyntaxNode::Calc(_)));
        assert_eq!(node.show(), "CALC (1)+(2)");
    }

    #[test]
    fn test_select_clauses() {
        let node = parse("SELECT * FROM $1 WHERE X > 1 ORDERBY X DESC LIMIT 2").unwrap();
        assert_eq!(
            node.show(),
            "SELECT * FROM $1 WHERE (X)>(1) ORDERBY X DESC LIMIT 2"
        );
        let node = parse("select distinct a AS b, c from $1 order by unique c limit 3 offset 1")
            .unwrap();
        assert_eq!(
            node.show(),
            "SELECT DISTINCT a AS b,c FROM $1 ORDERBY UNIQUE c LIMIT 3 OFFSET 1"
        );
    }

    #[test]
    fn test_in_sets_and_ranges() {
        let node = parse_expr("X IN [1, {2,3>, 5<:>2]").unwrap();
        assert_eq!(node.show(), "(X) IN [1,{2,3>,(5)<:>(2)]");
        let node = parse_expr("X IN [1:3, 5:, :0, 10:20:5]").unwrap();
        assert_eq!(node.show(), "(X) IN [1:3,5:,:0,10:20:5]");
        let node = parse_expr("X NOT IN (1,2)").unwrap();
        assert_eq!(node.show(), "NOT((X) IN [1,2])");
    }

    #[test]
    fn test_index_and_units() {
        let node = parse_expr("A[1:3, ::2]").unwrap();
        assert_eq!(node.show(), "(A)[1:3,::2]");
        let node = parse_expr("A[1:]").unwrap();
        assert_eq!(node.show(), "(A)[1:]");
        assert_ne!(node, parse_expr("A[1]").unwrap());
        let node = parse_expr("3 'km'").unwrap();
        assert_eq!(node.show(), "(3)'km'");
    }

    #[test]
    fn test_regex() {
        let node = parse_expr("NAME ~ p/ab*/i").unwrap();
        assert!(matches!(
            node,
            SyntaxNode::Binary {
                op: BinaryOp::EqRegex,
                ..
            }
        ));
    }

    #[test]
    fn test_show_reparses() {
        for text in [
            "SELECT a, b + 1 AS c FROM $1 WHERE a IN [1,2] GROUPBY a HAVING gcount() > 1",
            "COUNT a FROM $1 WHERE a > 0",
            "UPDATE $1 SET a = a + 1, b[2] = 0 WHERE a < 3",
            "INSERT INTO $1 [a, b] VALUES [1, 2], [3, 4]",
            "INSERT INTO $1 SET a = 1, b = 'x'",
            "DELETE FROM $1 WHERE a = 2 LIMIT 1",
            "CREATE TABLE '/tmp/t' a I4, b R8 [NDIM=1, SHAPE=[3]] DMINFO BUCKETSIZE=4096",
            "CREATE TABLE '/tmp/t' a I4 DMINFO [NAME='x', TYPE='IncrementalStMan', SPEC=[BUCKETSIZE=1000]], [NAME='y']",
            "SELECT * FROM $1 WHERE a IN [1:3, 5:, 0:10:2]",
            "CALC [1,2,3,4,5][-2:]",
            "ALTER TABLE $1 ADD COLUMN c I4 RENAME COLUMN a TO d SET KEYWORD k = 1 ADD ROW 2",
            "DROP TABLE '/tmp/t'",
            "SHOW TABLE",
            "SELECT FROM $1 GIVING [a + 1, b]",
        ] {
            reparse_stable(text);
        }
    }

    #[test]
    fn test_errors_report_offset() {
        let err = parse("SELECT a FROM $1 WHERE").unwrap_err();
        match err {
            Error::Parse {
                offset, scanned, ..
            } => {
                assert_eq!(offset, 22);
                assert_eq!(scanned, "SELECT a FROM $1 WHERE");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(parse("SELECT a b").is_err());
    }

    #[test]
    fn test_lock_is_reentrant() {
        let outer = ParserLock::acquire();
        let inner = ParserLock::acquire();
        assert!(inner.parse("1").is_ok());
        assert!(outer.parse_expr("2").is_ok());
    }
}
