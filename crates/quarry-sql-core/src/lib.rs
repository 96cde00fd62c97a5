//! # quarry-sql-core
//!
//! A dialect-parameterised SQL query generator: it turns a structured,
//! abstract description of a database operation (select, insert, bulk
//! insert, update, increment, delete, index and schema DDL, transaction
//! control) into a final SQL string for a concrete dialect.
//!
//! This crate provides:
//! - A condition compiler lowering nested trees of logical operators,
//!   comparisons, column references and JSON path accessors
//! - A SELECT planner with declarative eager-load joins, the
//!   main-vs-subquery split, and grouped-limit UNIONs
//! - Capability-driven mutation and DDL builders (RETURNING vs OUTPUT,
//!   `DEFAULT VALUES` vs `VALUES ()`, IDENTITY_INSERT, trigger temp tables)
//! - Dialects for MySQL, PostgreSQL, MSSQL, and SQLite
//!
//! The generator is a pure transformation: each entry point maps immutable
//! inputs (model metadata, conditions, options) to a string, holds no
//! mutable state, and is safe to share across threads.
//!
//! ## Quick start
//!
//! ```
//! use quarry_sql_core::dialect::PostgresDialect;
//! use quarry_sql_core::{QueryGenerator, SelectOptions, where_map};
//!
//! let gen = QueryGenerator::new(PostgresDialect::new());
//!
//! let sql = gen
//!     .select_query(
//!         &["users".into()],
//!         &SelectOptions::default()
//!             .attributes(["id", "email"])
//!             .filter(where_map! {
//!                 "email" => where_map! { "$like" => "%@example.com" },
//!                 "active" => true,
//!             })
//!             .limit(10),
//!         None,
//!     )
//!     .unwrap();
//!
//! assert_eq!(
//!     sql,
//!     "SELECT \"id\", \"email\" FROM \"users\" \
//!      WHERE \"users\".\"email\" LIKE '%@example.com' AND \"users\".\"active\" = true \
//!      LIMIT 10;"
//! );
//! ```
//!
//! ## Condition trees
//!
//! Conditions are ordered mappings from keys (attributes, operators, dotted
//! JSON paths, `$delimited.columns$`) to operands; iteration order is the
//! insertion order, so output is deterministic:
//!
//! ```
//! use quarry_sql_core::dialect::MysqlDialect;
//! use quarry_sql_core::{QueryGenerator, WhereOptions, WhereValue, where_map};
//!
//! let gen = QueryGenerator::new(MysqlDialect::new());
//! let cond = where_map! {
//!     "$or" => WhereValue::list([
//!         where_map! { "role" => "admin" },
//!         where_map! { "age" => where_map! { "$gte" => 21 } },
//!     ]),
//! };
//! assert_eq!(
//!     gen.where_items_query(&cond, &WhereOptions::default()).unwrap(),
//!     "(`role` = 'admin' OR `age` >= 21)"
//! );
//! ```

pub mod cond;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod generator;
pub mod model;
pub mod types;
pub mod value;

pub use cond::WhereValue;
pub use error::{GeneratorError, Result};
pub use expr::{cast, col, col_path, func, literal, val, where_expr, SqlExpr, WhereExpr};
pub use generator::ddl::{
    CreateTableOptions, DropTableOptions, IndexField, IndexOptions,
};
pub use generator::mutation::{
    row, BulkInsertOptions, DeleteOptions, FieldValue, InsertOptions, Row, UpdateOptions,
};
pub use generator::select::{
    GroupedLimit, Include, LockMode, LockOptions, SelectAttr, SelectOptions, ThroughInclude,
};
pub use generator::transaction::{IsolationLevel, TransactionRef};
pub use generator::where_clause::{Prefix, WhereOptions};
pub use generator::{
    AssocStep, GeneratorOptions, OrderDirection, OrderItem, OrderTerm, QueryGenerator,
};
pub use model::{Association, AssociationKind, Attribute, ModelMeta, TableAlias, TableRef};
pub use types::SqlType;
pub use value::{value_list, SqlValue, ToSqlValue};
