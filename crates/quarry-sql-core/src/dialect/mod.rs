//! SQL dialect support.
//!
//! The [`Dialect`] trait is both the capability registry consulted by every
//! builder and the home of the few behaviour hooks that cannot be expressed
//! as flags (limit/offset syntax, JSON path access, DELETE shape). Default
//! implementations describe the common / MySQL-ish behaviour; concrete
//! dialects override what differs.

mod mssql;
mod mysql;
mod postgres;
mod sqlite;

pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::{GeneratorError, Result};
use crate::generator::transaction::IsolationLevel;
use crate::model::Attribute;

/// How a dialect returns affected rows from mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStyle {
    /// A trailing `RETURNING *` clause.
    Returning,
    /// An `OUTPUT INSERTED.*` clause between columns and values.
    Output,
}

/// The shape of an INSERT with no columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyInsert {
    /// `INSERT INTO t DEFAULT VALUES`.
    DefaultValues,
    /// `INSERT INTO t VALUES ()`.
    EmptyValues,
}

/// Row-locking abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockCaps {
    /// `FOR UPDATE` is available.
    pub update: bool,
    /// The shared-lock clause, when one exists.
    pub share: Option<&'static str>,
    /// `FOR KEY SHARE` / `FOR NO KEY UPDATE` are available.
    pub key_share: bool,
    /// `OF <table>` may restrict the lock.
    pub of_table: bool,
}

impl LockCaps {
    /// No locking support at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            update: false,
            share: None,
            key_share: false,
            of_table: false,
        }
    }
}

/// Where the `USING <method>` clause sits in `CREATE INDEX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsingPlacement {
    /// Between the index name and `ON <table>`.
    BeforeTable,
    /// After `ON <table>`.
    AfterTable,
}

/// Index-creation abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCaps {
    /// Per-column `COLLATE`.
    pub collate: bool,
    /// Per-column prefix length.
    pub length: bool,
    /// `WITH PARSER`.
    pub parser: bool,
    /// `CREATE INDEX CONCURRENTLY`.
    pub concurrently: bool,
    /// Index type keywords such as `FULLTEXT` / `SPATIAL`.
    pub index_type: bool,
    /// Placement of the `USING` clause.
    pub using: UsingPlacement,
    /// Partial indexes (`WHERE ...`).
    pub where_clause: bool,
    /// Indexes are added through `ALTER TABLE ... ADD INDEX` instead of
    /// `CREATE INDEX`.
    pub via_alter: bool,
}

impl Default for IndexCaps {
    fn default() -> Self {
        Self {
            collate: false,
            length: false,
            parser: false,
            concurrently: false,
            index_type: false,
            using: UsingPlacement::BeforeTable,
            where_clause: false,
            via_alter: false,
        }
    }
}

/// Trait for SQL dialect-specific behaviour and capabilities.
pub trait Dialect {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    /// Returns the identifier quote character.
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Quotes an identifier, doubling any internal delimiter.
    fn quote_identifier(&self, ident: &str) -> String {
        let quote = self.identifier_quote();
        let doubled = ident.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{doubled}{quote}")
    }

    /// Escapes the body of a string literal.
    fn escape_string(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    /// Renders a boolean literal.
    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    /// Renders a binary literal.
    fn blob_literal(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
        format!("X'{hex}'")
    }

    /// Whether tables may be schema-qualified.
    fn supports_schemas(&self) -> bool {
        false
    }

    /// How mutations return affected rows, when they can.
    fn return_style(&self) -> Option<ReturnStyle> {
        None
    }

    /// Whether mutations against tables with triggers must be rewritten
    /// through a temp table.
    fn supports_tmp_table_trigger(&self) -> bool {
        false
    }

    /// Whether a NULL auto-increment value may be written as `DEFAULT`.
    /// When `false` the column is dropped from the statement instead.
    fn autoincrement_default_value(&self) -> bool {
        true
    }

    /// Whether explicit values for identity columns need a
    /// `SET IDENTITY_INSERT` wrap.
    fn supports_identity_insert(&self) -> bool {
        false
    }

    /// Whether UPDATE may touch auto-increment columns.
    fn allows_autoincrement_update(&self) -> bool {
        true
    }

    /// The shape of an INSERT with no columns at all.
    fn empty_insert_form(&self) -> EmptyInsert {
        EmptyInsert::EmptyValues
    }

    /// The duplicate-ignoring modifier placed after `INSERT`, when one
    /// exists.
    fn ignore_clause(&self) -> Option<&'static str> {
        None
    }

    /// Whether `ON DUPLICATE KEY <clause>` is accepted.
    fn supports_on_duplicate_key(&self) -> bool {
        false
    }

    /// Whether bulk inserts accept `ON DUPLICATE KEY UPDATE col=VALUES(col)`.
    fn supports_update_on_duplicate(&self) -> bool {
        false
    }

    /// Whether inserts can be wrapped in an exception-trapping function.
    fn supports_exception_wrapper(&self) -> bool {
        false
    }

    /// Whether UPDATE accepts a LIMIT clause.
    fn supports_limit_on_update(&self) -> bool {
        false
    }

    /// Row-locking abilities.
    fn lock_caps(&self) -> LockCaps {
        LockCaps::none()
    }

    /// Whether `UNION ALL` is available for grouped-limit assembly.
    fn supports_union_all(&self) -> bool {
        true
    }

    /// Index-creation abilities.
    fn index_caps(&self) -> IndexCaps {
        IndexCaps::default()
    }

    /// Whether many-to-many joins may nest the through join inside the ON
    /// target, `JOIN (through INNER JOIN target ON ...) ON ...`.
    fn join_table_dependent(&self) -> bool {
        true
    }

    /// Whether missing bulk-insert cells for serial columns may be filled
    /// with `DEFAULT`.
    fn supports_bulk_default(&self) -> bool {
        false
    }

    /// Renders the LIMIT/OFFSET tail. The default is the MySQL-ish
    /// `LIMIT offset, limit` form with a synthetic large limit when only an
    /// offset is present; dialects with `LIMIT ... OFFSET ...` or
    /// `OFFSET ... FETCH` override.
    fn add_limit_and_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {o}, {l}"),
            (Some(l), None) => format!(" LIMIT {l}"),
            (None, Some(o)) => format!(" LIMIT {o}, 10000000000000"),
            (None, None) => String::new(),
        }
    }

    /// Extra tokens between `SELECT` and the attribute list (`TOP n`).
    fn select_fragment_prefix(&self, _limit: Option<u64>, _offset: Option<u64>) -> String {
        String::new()
    }

    /// Renders a JSON path access over an already-quoted column, optionally
    /// cast. The reference form is the PostgreSQL `#>>` operator.
    fn json_path_select(
        &self,
        column: &str,
        path: &[String],
        cast: Option<&str>,
    ) -> Result<String> {
        let accessor = format!("({column}#>>'{{{}}}')", path.join(","));
        Ok(match cast {
            Some(ty) => format!("{accessor}::{ty}"),
            None => accessor,
        })
    }

    /// Renders a DELETE statement from pre-built pieces. Abstract: concrete
    /// dialects decide how LIMIT interacts with DELETE.
    fn delete_sql(
        &self,
        _table: &str,
        _where_fragment: &str,
        _limit: Option<u64>,
    ) -> Result<String> {
        Err(GeneratorError::UndefinedDialectMethod {
            method: "delete_sql",
            dialect: self.name(),
        })
    }

    /// Renders a TRUNCATE statement.
    fn truncate_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {table}")
    }

    /// The column suffix marking auto-increment, when the dialect uses one.
    fn autoincrement_keyword(&self) -> &'static str {
        "AUTO_INCREMENT"
    }

    /// Renders the type portion of a column definition; dialects with serial
    /// types override for auto-increment columns.
    fn column_type_sql(&self, attribute: &Attribute) -> String {
        attribute.sql_type.to_sql()
    }

    /// The keyword introducing an added column in `ALTER TABLE`.
    fn add_column_clause(&self) -> &'static str {
        "ADD COLUMN"
    }

    /// Renders `DROP INDEX`; dialects that scope index names to tables
    /// override.
    fn drop_index_sql(&self, _table: &str, index: &str) -> String {
        format!("DROP INDEX {index}")
    }

    /// The statement opening a top-level transaction.
    fn start_transaction_sql(&self) -> &'static str {
        "START TRANSACTION"
    }

    /// Renders `SET autocommit`, when the dialect still honours it.
    fn set_autocommit_sql(&self, value: bool) -> Option<String> {
        Some(format!("SET autocommit = {}", i32::from(value)))
    }

    /// Renders the isolation-level statement.
    fn set_isolation_level_sql(&self, level: IsolationLevel) -> Option<String> {
        Some(format!(
            "SET SESSION TRANSACTION ISOLATION LEVEL {}",
            level.as_sql()
        ))
    }

    /// Renders constraint deferral; a no-op outside PostgreSQL.
    fn defer_constraints_sql(&self, _deferred: bool) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BareDialect;

    impl Dialect for BareDialect {
        fn name(&self) -> &'static str {
            "bare"
        }
    }

    #[test]
    fn test_default_quoting() {
        let d = BareDialect;
        assert_eq!(d.quote_identifier("users"), "\"users\"");
        assert_eq!(d.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_default_limit_offset() {
        let d = BareDialect;
        assert_eq!(d.add_limit_and_offset(Some(10), Some(5)), " LIMIT 5, 10");
        assert_eq!(d.add_limit_and_offset(Some(10), None), " LIMIT 10");
        assert_eq!(
            d.add_limit_and_offset(None, Some(5)),
            " LIMIT 5, 10000000000000"
        );
        assert_eq!(d.add_limit_and_offset(None, None), "");
    }

    #[test]
    fn test_abstract_delete_errors() {
        let d = BareDialect;
        let err = d.delete_sql("\"users\"", "", None).unwrap_err();
        assert!(err.to_string().contains("delete_sql"));
    }

    #[test]
    fn test_reference_json_path() {
        let d = BareDialect;
        assert_eq!(
            d.json_path_select("\"meta\"", &["a".to_string(), "b".to_string()], None)
                .unwrap(),
            "(\"meta\"#>>'{a,b}')"
        );
        assert_eq!(
            d.json_path_select("\"meta\"", &["a".to_string()], Some("double precision"))
                .unwrap(),
            "(\"meta\"#>>'{a}')::double precision"
        );
    }
}
