//! SQLite dialect implementation.

use super::{Dialect, EmptyInsert, IndexCaps, ReturnStyle, UsingPlacement};
use crate::error::Result;

/// SQLite dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn return_style(&self) -> Option<ReturnStyle> {
        Some(ReturnStyle::Returning) // SQLite 3.35.0+
    }

    fn autoincrement_default_value(&self) -> bool {
        false
    }

    fn empty_insert_form(&self) -> EmptyInsert {
        EmptyInsert::DefaultValues
    }

    fn ignore_clause(&self) -> Option<&'static str> {
        Some("OR IGNORE")
    }

    fn index_caps(&self) -> IndexCaps {
        IndexCaps {
            collate: true,
            length: false,
            parser: false,
            concurrently: false,
            index_type: false,
            using: UsingPlacement::BeforeTable,
            where_clause: true,
            via_alter: false,
        }
    }

    fn add_limit_and_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
            (Some(l), None) => format!(" LIMIT {l}"),
            // A negative limit means unbounded in SQLite.
            (None, Some(o)) => format!(" LIMIT -1 OFFSET {o}"),
            (None, None) => String::new(),
        }
    }

    fn json_path_select(
        &self,
        column: &str,
        path: &[String],
        cast: Option<&str>,
    ) -> Result<String> {
        let accessor = format!("json_extract({column}, '$.{}')", path.join("."));
        Ok(match cast {
            Some(ty) => format!("CAST({accessor} AS {})", ty.to_uppercase()),
            None => accessor,
        })
    }

    fn delete_sql(&self, table: &str, where_fragment: &str, _limit: Option<u64>) -> Result<String> {
        Ok(format!("DELETE FROM {table}{where_fragment}"))
    }

    fn truncate_sql(&self, table: &str) -> String {
        // SQLite has no TRUNCATE.
        format!("DELETE FROM {table}")
    }

    fn autoincrement_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }

    fn start_transaction_sql(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    fn set_autocommit_sql(&self, _value: bool) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_dialect() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.name(), "sqlite");
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
        assert_eq!(dialect.boolean_literal(false), "0");
        assert_eq!(dialect.return_style(), Some(ReturnStyle::Returning));
        assert_eq!(dialect.ignore_clause(), Some("OR IGNORE"));
        assert_eq!(dialect.empty_insert_form(), EmptyInsert::DefaultValues);
    }

    #[test]
    fn test_truncate_falls_back_to_delete() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.truncate_sql("\"logs\""), "DELETE FROM \"logs\"");
    }

    #[test]
    fn test_offset_only_limit() {
        let dialect = SqliteDialect::new();
        assert_eq!(
            dialect.add_limit_and_offset(None, Some(20)),
            " LIMIT -1 OFFSET 20"
        );
    }
}
