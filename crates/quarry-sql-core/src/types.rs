//! SQL data types as consumed by the generator.
//!
//! Data-type definitions themselves live upstream; the generator only uses
//! their DDL rendering, their JSON / array classification, and optional value
//! validation.

use serde::{Deserialize, Serialize};

use crate::error::{GeneratorError, Result};
use crate::value::SqlValue;

/// A SQL column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlType {
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Single-precision float.
    Real,
    /// Double-precision float.
    Double,
    /// Fixed-point decimal.
    Decimal {
        /// Total number of digits.
        precision: Option<u8>,
        /// Digits after the decimal point.
        scale: Option<u8>,
    },
    /// Fixed-width character string.
    Char(Option<u32>),
    /// Variable-width character string.
    Varchar(Option<u32>),
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Timestamp.
    DateTime,
    /// Binary blob.
    Blob,
    /// UUID.
    Uuid,
    /// JSON document.
    Json,
    /// Binary JSON document.
    Jsonb,
    /// Array of an element type.
    Array(Box<SqlType>),
    /// Computed attribute with no column behind it; never emitted in DDL or
    /// temp-table declarations.
    Virtual,
    /// Escape hatch for dialect-specific types.
    Custom(String),
}

impl SqlType {
    /// Renders the uppercase DDL form of the type.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::SmallInt => "SMALLINT".to_string(),
            Self::Integer => "INTEGER".to_string(),
            Self::BigInt => "BIGINT".to_string(),
            Self::Real => "REAL".to_string(),
            Self::Double => "DOUBLE PRECISION".to_string(),
            Self::Decimal { precision, scale } => match (precision, scale) {
                (Some(p), Some(s)) => format!("DECIMAL({p}, {s})"),
                (Some(p), None) => format!("DECIMAL({p})"),
                _ => "DECIMAL".to_string(),
            },
            Self::Char(len) => match len {
                Some(n) => format!("CHAR({n})"),
                None => "CHAR".to_string(),
            },
            Self::Varchar(len) => match len {
                Some(n) => format!("VARCHAR({n})"),
                None => "VARCHAR(255)".to_string(),
            },
            Self::Text => "TEXT".to_string(),
            Self::Boolean => "BOOLEAN".to_string(),
            Self::Date => "DATE".to_string(),
            Self::DateTime => "TIMESTAMP".to_string(),
            Self::Blob => "BLOB".to_string(),
            Self::Uuid => "UUID".to_string(),
            Self::Json => "JSON".to_string(),
            Self::Jsonb => "JSONB".to_string(),
            Self::Array(inner) => format!("{}[]", inner.to_sql()),
            Self::Virtual => String::new(),
            Self::Custom(name) => name.clone(),
        }
    }

    /// Returns `true` for JSON-document types.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::Jsonb)
    }

    /// Returns `true` for array types.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Validates a value against this type.
    ///
    /// NULL always passes; nullability is checked elsewhere. Only obvious
    /// mismatches are rejected, matching the permissive behaviour of the
    /// upstream type system.
    pub fn validate(&self, value: &SqlValue) -> Result<()> {
        let ok = match (self, value) {
            (_, SqlValue::Null) => true,
            (Self::SmallInt | Self::Integer | Self::BigInt, v) => matches!(v, SqlValue::Int(_)),
            (Self::Real | Self::Double | Self::Decimal { .. }, v) => {
                matches!(v, SqlValue::Int(_) | SqlValue::Float(_))
            }
            (Self::Char(_) | Self::Varchar(_) | Self::Text | Self::Uuid, v) => {
                matches!(v, SqlValue::Text(_))
            }
            (Self::Boolean, v) => matches!(v, SqlValue::Bool(_)),
            (Self::Date | Self::DateTime, v) => {
                matches!(v, SqlValue::DateTime(_) | SqlValue::Text(_))
            }
            (Self::Blob, v) => matches!(v, SqlValue::Blob(_) | SqlValue::Text(_)),
            (Self::Array(inner), SqlValue::List(items)) => {
                for item in items {
                    inner.validate(item)?;
                }
                true
            }
            _ => true,
        };

        if ok {
            Ok(())
        } else {
            Err(GeneratorError::Validation(format!(
                "{value:?} is not a valid {}",
                self.to_sql()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql() {
        assert_eq!(SqlType::BigInt.to_sql(), "BIGINT");
        assert_eq!(SqlType::Varchar(Some(40)).to_sql(), "VARCHAR(40)");
        assert_eq!(
            SqlType::Decimal {
                precision: Some(10),
                scale: Some(2)
            }
            .to_sql(),
            "DECIMAL(10, 2)"
        );
        assert_eq!(
            SqlType::Array(Box::new(SqlType::Integer)).to_sql(),
            "INTEGER[]"
        );
    }

    #[test]
    fn test_classification() {
        assert!(SqlType::Json.is_json());
        assert!(SqlType::Jsonb.is_json());
        assert!(!SqlType::Text.is_json());
        assert!(SqlType::Array(Box::new(SqlType::Text)).is_array());
    }

    #[test]
    fn test_validate() {
        assert!(SqlType::Integer.validate(&SqlValue::Int(1)).is_ok());
        assert!(SqlType::Integer.validate(&SqlValue::Null).is_ok());
        assert!(SqlType::Integer
            .validate(&SqlValue::Text("x".to_string()))
            .is_err());
        assert!(SqlType::Array(Box::new(SqlType::Integer))
            .validate(&SqlValue::List(vec![SqlValue::Int(1), SqlValue::Int(2)]))
            .is_ok());
        assert!(SqlType::Array(Box::new(SqlType::Integer))
            .validate(&SqlValue::List(vec![SqlValue::Bool(true)]))
            .is_err());
    }
}
