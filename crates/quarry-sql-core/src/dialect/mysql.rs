//! MySQL dialect implementation.

use super::{Dialect, IndexCaps, LockCaps, UsingPlacement};
use crate::error::Result;

/// MySQL dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn identifier_quote(&self) -> char {
        '`'
    }

    fn escape_string(&self, value: &str) -> String {
        // Backslash is an escape character in MySQL string literals.
        value.replace('\\', "\\\\").replace('\'', "''")
    }

    fn autoincrement_default_value(&self) -> bool {
        false
    }

    fn ignore_clause(&self) -> Option<&'static str> {
        Some("IGNORE")
    }

    fn supports_on_duplicate_key(&self) -> bool {
        true
    }

    fn supports_update_on_duplicate(&self) -> bool {
        true
    }

    fn supports_limit_on_update(&self) -> bool {
        true
    }

    fn lock_caps(&self) -> LockCaps {
        LockCaps {
            update: true,
            share: Some("LOCK IN SHARE MODE"),
            key_share: false,
            of_table: false,
        }
    }

    fn index_caps(&self) -> IndexCaps {
        IndexCaps {
            collate: false,
            length: true,
            parser: true,
            concurrently: false,
            index_type: true,
            using: UsingPlacement::BeforeTable,
            where_clause: false,
            via_alter: true,
        }
    }

    fn json_path_select(
        &self,
        column: &str,
        path: &[String],
        cast: Option<&str>,
    ) -> Result<String> {
        // json_extract compares numerically on its own; only explicit casts
        // are honoured.
        let accessor = format!("json_unquote(json_extract({column}, '$.{}'))", path.join("."));
        Ok(match cast {
            Some(ty) => format!("CAST({accessor} AS {})", ty.to_uppercase()),
            None => accessor,
        })
    }

    fn delete_sql(&self, table: &str, where_fragment: &str, limit: Option<u64>) -> Result<String> {
        let limit_fragment = limit.map_or_else(String::new, |n| format!(" LIMIT {n}"));
        Ok(format!("DELETE FROM {table}{where_fragment}{limit_fragment}"))
    }

    fn truncate_sql(&self, table: &str) -> String {
        format!("TRUNCATE {table}")
    }

    fn drop_index_sql(&self, table: &str, index: &str) -> String {
        format!("DROP INDEX {index} ON {table}")
    }
}
