//! Error types for the query generator.

use thiserror::Error;

/// Errors raised while generating SQL.
///
/// All errors are raised synchronously; nothing is retried at this layer.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// An abstract builder was invoked on a dialect that does not implement it.
    #[error("the {dialect} dialect does not implement {method}")]
    UndefinedDialectMethod {
        /// The missing builder method.
        method: &'static str,
        /// The dialect it was invoked on.
        dialect: &'static str,
    },

    /// An ORDER BY / GROUP BY reference had a shape the resolver does not
    /// recognise.
    #[error("unknown structure passed to order / group: {0}")]
    InvalidOrderStructure(String),

    /// An ORDER/GROUP path references an association that does not exist.
    #[error("unable to find a valid association along alias path {}", .0.join(" -> "))]
    InvalidAssociationPath(Vec<String>),

    /// A raw string was supplied as a top-level WHERE condition.
    #[error(
        "support for raw string conditions has been removed; \
         use a fragment/replacements pair instead"
    )]
    RawWhereRemoved,

    /// A column list reference was used outside ORDER/GROUP context.
    #[error("cannot use a column list outside of order / group clauses")]
    ColOutsideOrderGroup,

    /// A computed attribute in an eager load is missing its alias.
    #[error("computed attribute on eager-loaded model {model} requires an alias")]
    MissingAliasForComputedAttribute {
        /// The model carrying the offending attribute.
        model: String,
    },

    /// An index field entry lacks a column name.
    #[error("index field entry has no column name")]
    MissingIndexFieldName,

    /// A direction string outside the closed ASC/DESC/NULLS set.
    #[error("invalid order direction: {0}")]
    InvalidOrderDirection(String),

    /// A value failed type validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A value cannot be rendered as a SQL literal.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias for generator operations.
pub type Result<T> = std::result::Result<T, GeneratorError>;
