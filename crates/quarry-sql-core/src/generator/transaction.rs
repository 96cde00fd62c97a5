//! Transaction control statements.
//!
//! Nested transactions map onto savepoints; session-level settings
//! (autocommit, isolation level, constraint deferral) are no-ops in nested
//! contexts and dialect-owned otherwise.

use super::QueryGenerator;
use crate::dialect::Dialect;

/// A handle describing where in a transaction stack a statement applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRef {
    /// The savepoint name for nested transactions.
    pub name: String,
    /// Whether this is a nested (savepoint) transaction.
    pub nested: bool,
}

impl TransactionRef {
    /// A top-level transaction.
    #[must_use]
    pub fn root() -> Self {
        Self {
            name: String::new(),
            nested: false,
        }
    }

    /// A nested transaction backed by a named savepoint.
    pub fn savepoint(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nested: true,
        }
    }
}

/// The closed set of transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// `READ UNCOMMITTED`
    ReadUncommitted,
    /// `READ COMMITTED`
    ReadCommitted,
    /// `REPEATABLE READ`
    RepeatableRead,
    /// `SERIALIZABLE`
    Serializable,
}

impl IsolationLevel {
    /// Returns the SQL form.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl<D: Dialect> QueryGenerator<D> {
    /// Opens a transaction, or declares a savepoint when nested.
    #[must_use]
    pub fn start_transaction_query(&self, transaction: &TransactionRef) -> String {
        if transaction.nested {
            format!("SAVEPOINT {};", self.quote_identifier(&transaction.name))
        } else {
            format!("{};", self.dialect().start_transaction_sql())
        }
    }

    /// Commits a transaction; a no-op when nested (savepoints are released
    /// with their parent).
    #[must_use]
    pub fn commit_transaction_query(&self, transaction: &TransactionRef) -> String {
        if transaction.nested {
            String::new()
        } else {
            "COMMIT;".to_string()
        }
    }

    /// Rolls back a transaction, or rewinds to the savepoint when nested.
    #[must_use]
    pub fn rollback_transaction_query(&self, transaction: &TransactionRef) -> String {
        if transaction.nested {
            format!(
                "ROLLBACK TO SAVEPOINT {};",
                self.quote_identifier(&transaction.name)
            )
        } else {
            "ROLLBACK;".to_string()
        }
    }

    /// Sets autocommit; a no-op in nested contexts and on dialects that no
    /// longer honour it.
    #[must_use]
    pub fn set_autocommit_query(&self, value: bool, nested: bool) -> String {
        if nested {
            return String::new();
        }
        self.dialect()
            .set_autocommit_sql(value)
            .map_or_else(String::new, |sql| format!("{sql};"))
    }

    /// Sets the isolation level; a no-op in nested contexts.
    #[must_use]
    pub fn set_isolation_level_query(&self, level: IsolationLevel, nested: bool) -> String {
        if nested {
            return String::new();
        }
        self.dialect()
            .set_isolation_level_sql(level)
            .map_or_else(String::new, |sql| format!("{sql};"))
    }

    /// Defers (or restores) constraint checking; only PostgreSQL emits
    /// anything here.
    #[must_use]
    pub fn defer_constraints_query(&self, deferred: bool) -> String {
        self.dialect()
            .defer_constraints_sql(deferred)
            .map_or_else(String::new, |sql| format!("{sql};"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MssqlDialect, MysqlDialect, PostgresDialect};

    #[test]
    fn test_start_commit_rollback() {
        let gen = QueryGenerator::new(MysqlDialect::new());
        let root = TransactionRef::root();
        assert_eq!(gen.start_transaction_query(&root), "START TRANSACTION;");
        assert_eq!(gen.commit_transaction_query(&root), "COMMIT;");
        assert_eq!(gen.rollback_transaction_query(&root), "ROLLBACK;");
    }

    #[test]
    fn test_savepoints() {
        let gen = QueryGenerator::new(MysqlDialect::new());
        let nested = TransactionRef::savepoint("sp_1");
        assert_eq!(gen.start_transaction_query(&nested), "SAVEPOINT `sp_1`;");
        assert_eq!(gen.commit_transaction_query(&nested), "");
        assert_eq!(
            gen.rollback_transaction_query(&nested),
            "ROLLBACK TO SAVEPOINT `sp_1`;"
        );
    }

    #[test]
    fn test_mssql_begin_transaction() {
        let gen = QueryGenerator::new(MssqlDialect::new());
        assert_eq!(
            gen.start_transaction_query(&TransactionRef::root()),
            "BEGIN TRANSACTION;"
        );
        assert_eq!(
            gen.set_isolation_level_query(IsolationLevel::ReadCommitted, false),
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED;"
        );
    }

    #[test]
    fn test_autocommit_and_isolation() {
        let mysql = QueryGenerator::new(MysqlDialect::new());
        assert_eq!(mysql.set_autocommit_query(true, false), "SET autocommit = 1;");
        assert_eq!(mysql.set_autocommit_query(true, true), "");
        assert_eq!(
            mysql.set_isolation_level_query(IsolationLevel::Serializable, false),
            "SET SESSION TRANSACTION ISOLATION LEVEL SERIALIZABLE;"
        );
        assert_eq!(
            mysql.set_isolation_level_query(IsolationLevel::Serializable, true),
            ""
        );

        let pg = QueryGenerator::new(PostgresDialect::new());
        assert_eq!(pg.set_autocommit_query(true, false), "");
    }

    #[test]
    fn test_defer_constraints() {
        let pg = QueryGenerator::new(PostgresDialect::new());
        assert_eq!(
            pg.defer_constraints_query(true),
            "SET CONSTRAINTS ALL DEFERRED;"
        );
        assert_eq!(
            pg.defer_constraints_query(false),
            "SET CONSTRAINTS ALL IMMEDIATE;"
        );

        let mysql = QueryGenerator::new(MysqlDialect::new());
        assert_eq!(mysql.defer_constraints_query(true), "");
    }
}
