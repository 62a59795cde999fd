//! Table query language.
//!
//! Text goes through four stages:
//!
//! ```text
//! text --parse--> SyntaxNode --compile--> Expr --evaluate--> Value
//!                     |                                       ^
//!                     +------------- execute -----------------+
//! ```
//!
//! - [`parser`] - [`ParserSession`] and the process-wide [`ParserLock`]
//! - [`syntax`] - The syntax tree; every node prints back to parseable text
//! - [`persist`] - Portable binary form of syntax trees
//! - [`compile`] - Typing, promotion and constant folding into an [`Expr`]
//! - [`eval`] - Row-wise, bulk and group evaluation
//! - [`function`] - The closed set of functions, reductions and aggregates
//! - [`ranges`] - Interval sets extracted from predicates
//! - [`exec`] - Statements: SELECT, UPDATE, INSERT, DELETE, CREATE, ...
//!
//! # Example
//! ```no_run
//! use std::path::Path;
//! use tabledb::table::Table;
//! use tabledb::taql::execute;
//!
//! let table = Table::open(Path::new("my_table")).unwrap();
//! let view = execute("SELECT * WHERE X > 1 ORDERBY X DESC LIMIT 2", &[table])
//!     .unwrap()
//!     .into_table()
//!     .unwrap();
//! println!("{:?}", view.row_numbers());
//! ```

pub mod compile;
pub mod eval;
pub mod exec;
pub mod expr;
pub mod function;
mod lexer;
pub mod parser;
pub mod persist;
pub mod ranges;
mod reduce;
pub mod syntax;
pub mod value;

pub use compile::{compile_expr, compile_predicate};
pub use eval::Evaluator;
pub use exec::{execute, execute_node, QueryResult, ResultSet};
pub use expr::{Expr, NodeId};
pub use parser::{parse, parse_expr, ParserLock, ParserSession};
pub use persist::{restore, save};
pub use syntax::SyntaxNode;
pub use value::{Scalar, Value, ValueType};
