//! Microsoft SQL Server dialect implementation.

use super::{Dialect, EmptyInsert, IndexCaps, LockCaps, ReturnStyle, UsingPlacement};
use crate::error::{GeneratorError, Result};
use crate::generator::transaction::IsolationLevel;

/// MSSQL dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Creates a new MSSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn identifier_quote(&self) -> char {
        '['
    }

    fn quote_identifier(&self, ident: &str) -> String {
        let doubled = ident.replace(']', "]]");
        format!("[{doubled}]")
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn blob_literal(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
        format!("0x{hex}")
    }

    fn supports_schemas(&self) -> bool {
        true
    }

    fn return_style(&self) -> Option<ReturnStyle> {
        Some(ReturnStyle::Output)
    }

    fn supports_tmp_table_trigger(&self) -> bool {
        true
    }

    fn autoincrement_default_value(&self) -> bool {
        false
    }

    fn supports_identity_insert(&self) -> bool {
        true
    }

    fn allows_autoincrement_update(&self) -> bool {
        false
    }

    fn empty_insert_form(&self) -> EmptyInsert {
        EmptyInsert::DefaultValues
    }

    fn lock_caps(&self) -> LockCaps {
        LockCaps::none()
    }

    fn index_caps(&self) -> IndexCaps {
        IndexCaps {
            collate: false,
            length: false,
            parser: false,
            concurrently: false,
            index_type: false,
            using: UsingPlacement::BeforeTable,
            where_clause: true,
            via_alter: false,
        }
    }

    fn join_table_dependent(&self) -> bool {
        false
    }

    fn add_limit_and_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        // Plain limits ride on TOP via the select prefix; OFFSET requires
        // the FETCH form.
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" OFFSET {o} ROWS FETCH NEXT {l} ROWS ONLY"),
            (None, Some(o)) => format!(" OFFSET {o} ROWS"),
            _ => String::new(),
        }
    }

    fn select_fragment_prefix(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), None) => format!("TOP {l} "),
            _ => String::new(),
        }
    }

    fn json_path_select(
        &self,
        _column: &str,
        _path: &[String],
        _cast: Option<&str>,
    ) -> Result<String> {
        Err(GeneratorError::UndefinedDialectMethod {
            method: "json_path_select",
            dialect: self.name(),
        })
    }

    fn delete_sql(&self, table: &str, where_fragment: &str, limit: Option<u64>) -> Result<String> {
        let top = limit.map_or_else(String::new, |n| format!(" TOP ({n})"));
        Ok(format!("DELETE{top} FROM {table}{where_fragment}"))
    }

    fn autoincrement_keyword(&self) -> &'static str {
        "IDENTITY(1,1)"
    }

    fn add_column_clause(&self) -> &'static str {
        "ADD"
    }

    fn drop_index_sql(&self, table: &str, index: &str) -> String {
        format!("DROP INDEX {index} ON {table}")
    }

    fn start_transaction_sql(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    fn set_autocommit_sql(&self, _value: bool) -> Option<String> {
        None
    }

    fn set_isolation_level_sql(&self, level: IsolationLevel) -> Option<String> {
        Some(format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            level.as_sql()
        ))
    }
}
