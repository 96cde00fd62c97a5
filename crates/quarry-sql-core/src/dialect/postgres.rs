//! PostgreSQL dialect implementation.
//!
//! The JSON path form (`#>>` with a `::` cast) is already the trait default,
//! so only the capability record and the statement shapes differ here.

use super::{Dialect, EmptyInsert, IndexCaps, LockCaps, ReturnStyle, UsingPlacement};
use crate::error::Result;
use crate::model::Attribute;
use crate::types::SqlType;

/// PostgreSQL dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn blob_literal(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        format!("E'\\\\x{hex}'")
    }

    fn supports_schemas(&self) -> bool {
        true
    }

    fn return_style(&self) -> Option<ReturnStyle> {
        Some(ReturnStyle::Returning)
    }

    fn empty_insert_form(&self) -> EmptyInsert {
        EmptyInsert::DefaultValues
    }

    fn supports_exception_wrapper(&self) -> bool {
        true
    }

    fn lock_caps(&self) -> LockCaps {
        LockCaps {
            update: true,
            share: Some("FOR SHARE"),
            key_share: true,
            of_table: true,
        }
    }

    fn index_caps(&self) -> IndexCaps {
        IndexCaps {
            collate: true,
            length: false,
            parser: false,
            concurrently: true,
            index_type: false,
            using: UsingPlacement::AfterTable,
            where_clause: true,
            via_alter: false,
        }
    }

    fn supports_bulk_default(&self) -> bool {
        true
    }

    fn add_limit_and_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
            (Some(l), None) => format!(" LIMIT {l}"),
            (None, Some(o)) => format!(" OFFSET {o}"),
            (None, None) => String::new(),
        }
    }

    fn delete_sql(&self, table: &str, where_fragment: &str, limit: Option<u64>) -> Result<String> {
        // DELETE has no LIMIT; restrict through ctid when one is requested.
        Ok(match limit {
            Some(n) => format!(
                "DELETE FROM {table} WHERE ctid IN (SELECT ctid FROM {table}{where_fragment} LIMIT {n})"
            ),
            None => format!("DELETE FROM {table}{where_fragment}"),
        })
    }

    fn autoincrement_keyword(&self) -> &'static str {
        ""
    }

    fn column_type_sql(&self, attribute: &Attribute) -> String {
        if attribute.auto_increment {
            match attribute.sql_type {
                SqlType::SmallInt | SqlType::Integer => return "SERIAL".to_string(),
                SqlType::BigInt => return "BIGSERIAL".to_string(),
                _ => {}
            }
        }
        attribute.sql_type.to_sql()
    }

    fn set_autocommit_sql(&self, _value: bool) -> Option<String> {
        // Removed from the server long ago; treated as a no-op.
        None
    }

    fn defer_constraints_sql(&self, deferred: bool) -> Option<String> {
        Some(if deferred {
            "SET CONSTRAINTS ALL DEFERRED".to_string()
        } else {
            "SET CONSTRAINTS ALL IMMEDIATE".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_dialect() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.name(), "postgres");
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
        assert!(dialect.supports_schemas());
        assert_eq!(dialect.return_style(), Some(ReturnStyle::Returning));
        assert_eq!(dialect.empty_insert_form(), EmptyInsert::DefaultValues);
        assert!(dialect.supports_exception_wrapper());
        assert!(dialect.lock_caps().of_table);
    }

    #[test]
    fn test_limit_offset() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.add_limit_and_offset(Some(10), Some(5)),
            " LIMIT 10 OFFSET 5"
        );
        assert_eq!(dialect.add_limit_and_offset(None, Some(5)), " OFFSET 5");
    }

    #[test]
    fn test_serial_mapping() {
        let dialect = PostgresDialect::new();
        let id = Attribute::new("id", SqlType::BigInt).auto_increment();
        assert_eq!(dialect.column_type_sql(&id), "BIGSERIAL");
        let n = Attribute::new("n", SqlType::Integer);
        assert_eq!(dialect.column_type_sql(&n), "INTEGER");
    }

    #[test]
    fn test_delete_with_limit_uses_ctid() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect
                .delete_sql("\"users\"", " WHERE \"active\" = false", Some(10))
                .unwrap(),
            "DELETE FROM \"users\" WHERE ctid IN (SELECT ctid FROM \"users\" WHERE \"active\" = false LIMIT 10)"
        );
    }
}
