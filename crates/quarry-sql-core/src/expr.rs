//! Expression nodes: tagged SQL fragments lowered by the generator.
//!
//! These are the values callers embed wherever a column, function call, cast,
//! or verbatim fragment is accepted — attribute lists, condition trees, order
//! clauses, insert/update values.

use crate::cond::WhereValue;
use crate::value::{SqlValue, ToSqlValue};

/// A tagged SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// Verbatim SQL, emitted untouched and never escaped.
    Literal(String),
    /// A function call, `NAME(arg, …)`.
    Fn {
        /// The function name, emitted as-is.
        name: String,
        /// The arguments; expressions are lowered, values escaped.
        args: Vec<SqlExpr>,
    },
    /// A cast, `CAST(expr AS TYPE)`.
    Cast {
        /// The expression being cast.
        expr: Box<SqlExpr>,
        /// The target type, uppercased on emission.
        ty: String,
    },
    /// An identifier path. `*` passes through unquoted; a multi-segment path
    /// is only valid in order / group context.
    Col(Vec<String>),
    /// An explicit attribute/comparator/logic comparison.
    Where(Box<WhereExpr>),
    /// An escaped scalar in argument position.
    Val(SqlValue),
}

/// The explicit comparator form of a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereExpr {
    /// The left-hand side, usually a column reference.
    pub attribute: SqlExpr,
    /// The SQL comparator, e.g. `=`, `>=`, `LIKE`.
    pub comparator: String,
    /// The right-hand side.
    pub logic: WhereValue,
}

/// Builds a verbatim SQL fragment.
pub fn literal(sql: impl Into<String>) -> SqlExpr {
    SqlExpr::Literal(sql.into())
}

/// Builds a function call expression.
pub fn func(name: impl Into<String>, args: Vec<SqlExpr>) -> SqlExpr {
    SqlExpr::Fn {
        name: name.into(),
        args,
    }
}

/// Builds a cast expression.
pub fn cast(expr: SqlExpr, ty: impl Into<String>) -> SqlExpr {
    SqlExpr::Cast {
        expr: Box::new(expr),
        ty: ty.into(),
    }
}

/// Builds a column reference. Dotted input stays one segment and is split by
/// the identifier quoter, so `col("users.name")` resolves as expected.
pub fn col(name: impl Into<String>) -> SqlExpr {
    SqlExpr::Col(vec![name.into()])
}

/// Builds a multi-segment column reference for order / group clauses.
pub fn col_path<I, S>(segments: I) -> SqlExpr
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    SqlExpr::Col(segments.into_iter().map(Into::into).collect())
}

/// Builds an escaped scalar argument.
pub fn val<T: ToSqlValue>(value: T) -> SqlExpr {
    SqlExpr::Val(value.to_sql_value())
}

/// Builds an explicit comparison expression.
pub fn where_expr(
    attribute: SqlExpr,
    comparator: impl Into<String>,
    logic: impl Into<WhereValue>,
) -> SqlExpr {
    SqlExpr::Where(Box::new(WhereExpr {
        attribute,
        comparator: comparator.into(),
        logic: logic.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(literal("1 = 1"), SqlExpr::Literal("1 = 1".to_string()));
        assert_eq!(col("name"), SqlExpr::Col(vec!["name".to_string()]));
        assert_eq!(
            func("LOWER", vec![col("email")]),
            SqlExpr::Fn {
                name: "LOWER".to_string(),
                args: vec![SqlExpr::Col(vec!["email".to_string()])],
            }
        );
        assert_eq!(val(3_i64), SqlExpr::Val(SqlValue::Int(3)));
    }

    #[test]
    fn test_cast_boxes_inner() {
        let e = cast(col("created_at"), "date");
        match e {
            SqlExpr::Cast { expr, ty } => {
                assert_eq!(*expr, col("created_at"));
                assert_eq!(ty, "date");
            }
            other => panic!("unexpected expression: {other:?}"),
        }
    }
}
