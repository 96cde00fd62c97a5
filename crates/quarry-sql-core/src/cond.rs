//! Condition trees for WHERE and HAVING clauses.
//!
//! A [`WhereValue`] is the multi-shape condition input: an ordered mapping
//! (implicit AND), a sequence, a scalar, an expression node, or nothing.
//! Mappings iterate in insertion order, so generated SQL is deterministic for
//! a given input.

use crate::expr::SqlExpr;
use crate::value::{SqlValue, ToSqlValue};

/// A node in a condition tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WhereValue {
    /// No condition.
    #[default]
    Null,
    /// A scalar operand.
    Value(SqlValue),
    /// An ordered sequence; treated as AND when every element is a mapping,
    /// otherwise as a raw fragment followed by its replacements.
    List(Vec<WhereValue>),
    /// An ordered mapping from keys (attributes, operators, dotted JSON
    /// paths, delimited column strings) to operands; implicit AND.
    Map(Vec<(String, WhereValue)>),
    /// An expression node.
    Expr(SqlExpr),
    /// A predicate synthesised by the select planner, emitted verbatim.
    Injected(String),
}

impl WhereValue {
    /// Returns `true` when the node lowers to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::List(items) => items.is_empty(),
            Self::Map(pairs) => pairs.is_empty(),
            _ => false,
        }
    }

    /// Builds a list node from convertible items.
    pub fn list<T, I>(items: I) -> Self
    where
        T: Into<WhereValue>,
        I: IntoIterator<Item = T>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Combines two conditions with AND, dropping empty sides.
    #[must_use]
    pub fn and(self, other: WhereValue) -> Self {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => Self::Null,
            (true, false) => other,
            (false, true) => self,
            (false, false) => Self::List(vec![self, other]),
        }
    }
}

macro_rules! where_value_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for WhereValue {
                fn from(value: $ty) -> Self {
                    Self::Value(value.to_sql_value())
                }
            }
        )+
    };
}

where_value_from!(
    bool,
    i16,
    i32,
    i64,
    u32,
    f32,
    f64,
    String,
    &str,
    SqlValue,
    chrono::DateTime<chrono::Utc>
);

impl From<SqlExpr> for WhereValue {
    fn from(expr: SqlExpr) -> Self {
        Self::Expr(expr)
    }
}

/// Builds a [`WhereValue::Map`] preserving the written key order.
///
/// ```
/// use quarry_sql_core::where_map;
///
/// let cond = where_map! {
///     "name" => "Alice",
///     "age" => where_map! { "$gte" => 18 },
/// };
/// # let _ = cond;
/// ```
#[macro_export]
macro_rules! where_map {
    () => {
        $crate::WhereValue::Map(Vec::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::WhereValue::Map(vec![
            $( ($key.to_string(), $crate::WhereValue::from($value)) ),+
        ])
    };
}
