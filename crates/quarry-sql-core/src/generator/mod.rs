//! The query generator: one struct per dialect instance, all builders as
//! methods.
//!
//! Everything here is a pure transformation from immutable inputs to a SQL
//! string; the generator holds no mutable state and can be shared freely.

pub mod ddl;
pub mod mutation;
pub mod select;
pub mod transaction;
pub mod where_clause;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use crate::cond::WhereValue;
use crate::dialect::Dialect;
use crate::error::{GeneratorError, Result};
use crate::expr::{SqlExpr, WhereExpr};
use crate::model::{Attribute, ModelMeta, TableAlias, TableRef};
use crate::value::SqlValue;

/// Per-generator configuration.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// UTC offset applied when rendering timestamps, `±HH:MM`.
    pub timezone: String,
    /// Whether escaped values are validated against attribute types.
    pub type_validation: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            timezone: "+00:00".to_string(),
            type_validation: false,
        }
    }
}

/// A sort direction from the closed ASC/DESC/NULLS set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// `ASC`
    Asc,
    /// `DESC`
    Desc,
    /// `ASC NULLS FIRST`
    AscNullsFirst,
    /// `DESC NULLS FIRST`
    DescNullsFirst,
    /// `ASC NULLS LAST`
    AscNullsLast,
    /// `DESC NULLS LAST`
    DescNullsLast,
    /// `NULLS FIRST`
    NullsFirst,
    /// `NULLS LAST`
    NullsLast,
}

impl OrderDirection {
    /// Parses a direction string, rejecting anything outside the closed set.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            "ASC NULLS FIRST" => Ok(Self::AscNullsFirst),
            "DESC NULLS FIRST" => Ok(Self::DescNullsFirst),
            "ASC NULLS LAST" => Ok(Self::AscNullsLast),
            "DESC NULLS LAST" => Ok(Self::DescNullsLast),
            "NULLS FIRST" => Ok(Self::NullsFirst),
            "NULLS LAST" => Ok(Self::NullsLast),
            _ => Err(GeneratorError::InvalidOrderDirection(input.to_string())),
        }
    }

    /// Returns the SQL form.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
            Self::AscNullsFirst => "ASC NULLS FIRST",
            Self::DescNullsFirst => "DESC NULLS FIRST",
            Self::AscNullsLast => "ASC NULLS LAST",
            Self::DescNullsLast => "DESC NULLS LAST",
            Self::NullsFirst => "NULLS FIRST",
            Self::NullsLast => "NULLS LAST",
        }
    }
}

/// One association-traversal step in an ORDER/GROUP path.
#[derive(Debug, Clone)]
pub struct AssocStep {
    /// The model being stepped into.
    pub model: Arc<ModelMeta>,
    /// The association alias, when the step names one explicitly.
    pub as_name: Option<String>,
}

impl AssocStep {
    /// Steps into a model under its default alias.
    pub fn model(model: Arc<ModelMeta>) -> Self {
        Self {
            model,
            as_name: None,
        }
    }

    /// Steps into a model under an explicit alias.
    pub fn model_as(model: Arc<ModelMeta>, as_name: impl Into<String>) -> Self {
        Self {
            model,
            as_name: Some(as_name.into()),
        }
    }
}

/// The target of an ORDER BY or GROUP BY item.
#[derive(Debug, Clone)]
pub enum OrderTerm {
    /// A (possibly dotted) column name.
    Col(String),
    /// Verbatim SQL.
    Raw(String),
    /// An expression node.
    Expr(SqlExpr),
    /// An association walk ending in a column.
    Path {
        /// The traversal steps, outermost first.
        steps: Vec<AssocStep>,
        /// The column on the innermost model.
        column: String,
    },
}

/// One ORDER BY item.
#[derive(Debug, Clone)]
pub struct OrderItem {
    /// What to order by.
    pub term: OrderTerm,
    /// The direction, when one was given.
    pub direction: Option<OrderDirection>,
}

impl OrderItem {
    /// Orders by a column with no explicit direction.
    pub fn col(name: impl Into<String>) -> Self {
        Self {
            term: OrderTerm::Col(name.into()),
            direction: None,
        }
    }

    /// Sets the direction.
    #[must_use]
    pub const fn direction(mut self, direction: OrderDirection) -> Self {
        self.direction = Some(direction);
        self
    }
}

impl From<OrderTerm> for OrderItem {
    fn from(term: OrderTerm) -> Self {
        Self {
            term,
            direction: None,
        }
    }
}

/// The dialect-parameterised query generator.
///
/// # Example
///
/// ```
/// use quarry_sql_core::{QueryGenerator, SelectOptions, where_map};
/// use quarry_sql_core::dialect::MysqlDialect;
///
/// let gen = QueryGenerator::new(MysqlDialect::new());
/// let sql = gen
///     .select_query(
///         &["users".into()],
///         &SelectOptions::default().filter(where_map! { "id" => 1 }),
///         None,
///     )
///     .unwrap();
/// assert_eq!(sql, "SELECT * FROM `users` WHERE `users`.`id` = 1;");
/// ```
pub struct QueryGenerator<D: Dialect> {
    dialect: D,
    options: GeneratorOptions,
}

impl<D: Dialect> QueryGenerator<D> {
    /// Creates a generator with default options.
    pub fn new(dialect: D) -> Self {
        Self {
            dialect,
            options: GeneratorOptions::default(),
        }
    }

    /// Creates a generator with explicit options.
    pub fn with_options(dialect: D, options: GeneratorOptions) -> Self {
        Self { dialect, options }
    }

    /// Returns the dialect.
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Returns the generator options.
    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Quotes a single identifier.
    #[must_use]
    pub fn quote_identifier(&self, ident: &str) -> String {
        self.dialect.quote_identifier(ident)
    }

    /// Quotes a dotted identifier, splitting on the last `.` only: everything
    /// before it is one identifier, the final segment another. This keeps
    /// already dot-joined alias paths intact while still separating the
    /// column.
    #[must_use]
    pub fn quote_identifiers(&self, dotted: &str) -> String {
        match dotted.rfind('.') {
            Some(idx) => {
                let (head, tail) = dotted.split_at(idx);
                format!(
                    "{}.{}",
                    self.quote_identifier(head),
                    self.quote_identifier(&tail[1..])
                )
            }
            None => self.quote_identifier(dotted),
        }
    }

    /// Quotes a table reference, with schema qualification when the dialect
    /// supports it and single-identifier collapse when it does not.
    #[must_use]
    pub fn quote_table(&self, table: &TableRef, alias: TableAlias<'_>) -> String {
        let mut sql = match &table.schema {
            Some(schema) if self.dialect.supports_schemas() => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&table.name)
            ),
            Some(schema) => {
                self.quote_identifier(&format!("{schema}{}{}", table.delimiter, table.name))
            }
            None => self.quote_identifier(&table.name),
        };

        match alias {
            TableAlias::None => {}
            TableAlias::Auto => {
                sql.push_str(" AS ");
                sql.push_str(&self.quote_identifier(&table.name));
            }
            TableAlias::Name(name) => {
                sql.push_str(" AS ");
                sql.push_str(&self.quote_identifier(name));
            }
        }
        sql
    }

    /// Escapes a value into a SQL literal, honouring the attribute type when
    /// validation is enabled.
    pub fn escape(&self, value: &SqlValue, attribute: Option<&Attribute>) -> Result<String> {
        self.escape_value(value, attribute, false)
    }

    pub(crate) fn escape_value(
        &self,
        value: &SqlValue,
        attribute: Option<&Attribute>,
        accept_strings: bool,
    ) -> Result<String> {
        if self.options.type_validation {
            if let Some(attr) = attribute {
                let skip = accept_strings && matches!(value, SqlValue::Text(_));
                if !skip {
                    attr.sql_type.validate(value)?;
                }
            }
        }

        Ok(match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => self.dialect.boolean_literal(*b).to_string(),
            SqlValue::Int(n) => n.to_string(),
            SqlValue::Float(f) => {
                if !f.is_finite() {
                    return Err(GeneratorError::InvalidValue(format!(
                        "{f} is not a finite number"
                    )));
                }
                f.to_string()
            }
            SqlValue::Text(s) => format!("'{}'", self.dialect.escape_string(s)),
            SqlValue::Blob(bytes) => self.dialect.blob_literal(bytes),
            SqlValue::DateTime(dt) => format!("'{}'", self.format_datetime(dt)),
            SqlValue::List(items) => {
                let parts = items
                    .iter()
                    .map(|item| self.escape_value(item, attribute, accept_strings))
                    .collect::<Result<Vec<_>>>()?;
                if attribute.is_some_and(|a| a.sql_type.is_array()) {
                    format!("ARRAY[{}]", parts.join(","))
                } else {
                    format!("({})", parts.join(", "))
                }
            }
        })
    }

    /// Renders a timestamp in the configured offset.
    pub(crate) fn format_datetime(&self, value: &DateTime<Utc>) -> String {
        value
            .with_timezone(&self.timezone_offset())
            .format("%Y-%m-%d %H:%M:%S%.3f %:z")
            .to_string()
    }

    fn timezone_offset(&self) -> FixedOffset {
        parse_offset(&self.options.timezone).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }

    /// Lowers an expression node into SQL.
    pub fn expression_sql(&self, expr: &SqlExpr, model: Option<&ModelMeta>) -> Result<String> {
        match expr {
            SqlExpr::Literal(sql) => Ok(sql.clone()),
            SqlExpr::Val(value) => self.escape(value, None),
            SqlExpr::Cast { expr, ty } => Ok(format!(
                "CAST({} AS {})",
                self.expression_sql(expr, model)?,
                ty.to_uppercase()
            )),
            SqlExpr::Fn { name, args } => {
                let parts = args
                    .iter()
                    .map(|arg| self.expression_sql(arg, model))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{name}({})", parts.join(", ")))
            }
            SqlExpr::Col(parts) => match parts.as_slice() {
                [] => Err(GeneratorError::InvalidOrderStructure(
                    "empty column reference".to_string(),
                )),
                [single] if single == "*" => Ok("*".to_string()),
                [single] => Ok(self.quote_identifiers(single)),
                many => {
                    if model.is_none() {
                        return Err(GeneratorError::ColOutsideOrderGroup);
                    }
                    Ok(many
                        .iter()
                        .map(|p| self.quote_identifier(p))
                        .collect::<Vec<_>>()
                        .join("."))
                }
            },
            SqlExpr::Where(node) => self.where_expr_sql(node, model),
        }
    }

    fn where_expr_sql(&self, node: &WhereExpr, model: Option<&ModelMeta>) -> Result<String> {
        let key = match (&node.attribute, model) {
            (SqlExpr::Col(parts), Some(m)) if parts.len() == 1 && parts[0] != "*" => {
                format!(
                    "{}.{}",
                    self.quote_table(&TableRef::new(&m.name), TableAlias::None),
                    self.quote_identifier(m.field_for(&parts[0]))
                )
            }
            (attr, _) => self.expression_sql(attr, model)?,
        };

        let comparator = node.comparator.as_str();
        match &node.logic {
            WhereValue::Null => Ok(format!("{key} IS NULL")),
            WhereValue::Expr(e) => Ok(format!(
                "{key} {comparator} {}",
                self.expression_sql(e, model)?
            )),
            WhereValue::Map(_) => {
                if let SqlExpr::Col(parts) = &node.attribute {
                    if let [name] = parts.as_slice() {
                        let opts = where_clause::WhereOptions {
                            model,
                            ..Default::default()
                        };
                        return self.where_item_query(Some(name), &node.logic, &opts);
                    }
                }
                Err(GeneratorError::InvalidValue(
                    "a mapping condition requires a plain column attribute".to_string(),
                ))
            }
            WhereValue::Value(v) => Ok(format!("{key} {comparator} {}", self.escape(v, None)?)),
            WhereValue::List(items) => {
                let list = SqlValue::List(
                    items
                        .iter()
                        .map(|i| match i {
                            WhereValue::Value(v) => Ok(v.clone()),
                            other => Err(GeneratorError::InvalidValue(format!(
                                "cannot escape {other:?} inside a comparison list"
                            ))),
                        })
                        .collect::<Result<Vec<_>>>()?,
                );
                Ok(format!("{key} {comparator} {}", self.escape(&list, None)?))
            }
            WhereValue::Injected(sql) => Ok(format!("{key} {comparator} {sql}")),
        }
    }

    /// Resolves an ORDER BY / GROUP BY reference, walking association paths
    /// into fully qualified, aliased column references.
    pub fn quote_order_ref<'m>(
        &self,
        term: &'m OrderTerm,
        parent: Option<&'m ModelMeta>,
    ) -> Result<String> {
        match term {
            OrderTerm::Raw(sql) => Ok(sql.clone()),
            OrderTerm::Expr(expr) => self.expression_sql(expr, parent),
            OrderTerm::Col(name) => {
                if name.is_empty() {
                    return Err(GeneratorError::InvalidOrderStructure(
                        "empty order target".to_string(),
                    ));
                }
                Ok(self.quote_identifiers(name))
            }
            OrderTerm::Path { steps, column } => {
                if column.is_empty() {
                    return Err(GeneratorError::InvalidOrderStructure(
                        "association path without a column".to_string(),
                    ));
                }

                let mut table_names: Vec<String> = Vec::new();
                let mut parent_model = parent;
                let mut prev_assoc = None;

                for step in steps {
                    let model = step.model.as_ref();
                    let through_of_prev = prev_assoc
                        .and_then(|a: &crate::model::Association| a.through.as_deref())
                        .is_some_and(|t| t == model.name);

                    let alias = if through_of_prev {
                        // Through tables join under their model name.
                        model.name.clone()
                    } else {
                        match parent_model
                            .and_then(|p| p.get_association(&model.name, step.as_name.as_deref()))
                        {
                            Some(assoc) => {
                                let alias = assoc.as_name.clone();
                                prev_assoc = Some(assoc);
                                alias
                            }
                            None => {
                                let mut path = table_names;
                                path.push(
                                    step.as_name
                                        .clone()
                                        .unwrap_or_else(|| model.name.clone()),
                                );
                                return Err(GeneratorError::InvalidAssociationPath(path));
                            }
                        }
                    };

                    table_names.push(alias);
                    parent_model = Some(model);
                }

                let prefix = if table_names.is_empty() {
                    parent.map_or_else(String::new, |p| {
                        format!("{}.", self.quote_identifier(&p.name))
                    })
                } else {
                    format!("{}.", self.quote_identifier(&table_names.join(".")))
                };
                Ok(format!("{prefix}{}", self.quote_identifiers(column)))
            }
        }
    }
}

fn parse_offset(input: &str) -> Option<FixedOffset> {
    let (sign, rest) = match input.as_bytes().first()? {
        b'+' => (1, &input[1..]),
        b'-' => (-1, &input[1..]),
        _ => (1, input),
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MysqlDialect, PostgresDialect};
    use crate::expr::{cast, col, col_path, func, literal, val, where_expr};
    use crate::types::SqlType;
    use crate::model::Association;
    use chrono::TimeZone;

    fn pg() -> QueryGenerator<PostgresDialect> {
        QueryGenerator::new(PostgresDialect::new())
    }

    #[test]
    fn test_quote_identifiers_splits_on_last_dot() {
        let gen = pg();
        assert_eq!(gen.quote_identifiers("name"), "\"name\"");
        assert_eq!(gen.quote_identifiers("users.name"), "\"users\".\"name\"");
        assert_eq!(
            gen.quote_identifiers("Tasks.Project.name"),
            "\"Tasks.Project\".\"name\""
        );
    }

    #[test]
    fn test_quote_table_schema_support() {
        let table = TableRef::new("users").schema("app");
        let gen = pg();
        assert_eq!(gen.quote_table(&table, TableAlias::None), "\"app\".\"users\"");

        let mysql = QueryGenerator::new(MysqlDialect::new());
        assert_eq!(
            mysql.quote_table(&table, TableAlias::None),
            "`app.users`"
        );
        assert_eq!(
            mysql.quote_table(&TableRef::new("users"), TableAlias::Name("u")),
            "`users` AS `u`"
        );
    }

    #[test]
    fn test_escape_scalars() {
        let gen = pg();
        assert_eq!(gen.escape(&SqlValue::Null, None).unwrap(), "NULL");
        assert_eq!(gen.escape(&SqlValue::Int(42), None).unwrap(), "42");
        assert_eq!(
            gen.escape(&SqlValue::Text("O'Brien".to_string()), None).unwrap(),
            "'O''Brien'"
        );
        assert_eq!(gen.escape(&SqlValue::Bool(true), None).unwrap(), "true");
        assert!(gen.escape(&SqlValue::Float(f64::NAN), None).is_err());
    }

    #[test]
    fn test_escape_datetime_honours_timezone() {
        let gen = QueryGenerator::with_options(
            PostgresDialect::new(),
            GeneratorOptions {
                timezone: "+05:30".to_string(),
                type_validation: false,
            },
        );
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            gen.escape(&SqlValue::DateTime(dt), None).unwrap(),
            "'2024-03-01 17:30:00.000 +05:30'"
        );
    }

    #[test]
    fn test_escape_list_and_array() {
        let gen = pg();
        let list = SqlValue::List(vec![SqlValue::Int(1), SqlValue::Int(2)]);
        assert_eq!(gen.escape(&list, None).unwrap(), "(1, 2)");

        let attr = Attribute::new("tags", SqlType::Array(Box::new(SqlType::Integer)));
        assert_eq!(gen.escape(&list, Some(&attr)).unwrap(), "ARRAY[1,2]");
    }

    #[test]
    fn test_type_validation_gate() {
        let gen = QueryGenerator::with_options(
            PostgresDialect::new(),
            GeneratorOptions {
                timezone: "+00:00".to_string(),
                type_validation: true,
            },
        );
        let attr = Attribute::new("age", SqlType::Integer);
        assert!(gen.escape(&SqlValue::Int(3), Some(&attr)).is_ok());
        assert!(gen
            .escape(&SqlValue::Text("x".to_string()), Some(&attr))
            .is_err());
    }

    #[test]
    fn test_expression_lowering() {
        let gen = pg();
        assert_eq!(
            gen.expression_sql(&literal("1 = 1"), None).unwrap(),
            "1 = 1"
        );
        assert_eq!(
            gen.expression_sql(&func("LOWER", vec![col("email")]), None)
                .unwrap(),
            "LOWER(\"email\")"
        );
        assert_eq!(
            gen.expression_sql(&cast(val(3_i64), "text"), None).unwrap(),
            "CAST(3 AS TEXT)"
        );
        assert_eq!(gen.expression_sql(&col("*"), None).unwrap(), "*");
        assert_eq!(
            gen.expression_sql(&col("users.name"), None).unwrap(),
            "\"users\".\"name\""
        );
    }

    #[test]
    fn test_col_path_requires_context() {
        let gen = pg();
        let err = gen
            .expression_sql(&col_path(["tasks", "id"]), None)
            .unwrap_err();
        assert!(matches!(err, GeneratorError::ColOutsideOrderGroup));

        let model = ModelMeta::new("Task", "tasks");
        assert_eq!(
            gen.expression_sql(&col_path(["tasks", "id"]), Some(&model))
                .unwrap(),
            "\"tasks\".\"id\""
        );
    }

    #[test]
    fn test_where_expr_null_promotes_to_is() {
        let gen = pg();
        let model = ModelMeta::new("User", "users")
            .attribute(Attribute::new("deletedAt", SqlType::DateTime).field("deleted_at"));
        let e = where_expr(col("deletedAt"), "=", WhereValue::Null);
        assert_eq!(
            gen.expression_sql(&e, Some(&model)).unwrap(),
            "\"User\".\"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn test_order_path_walk() {
        let gen = pg();
        let task = Arc::new(ModelMeta::new("Task", "tasks"));
        let user = ModelMeta::new("User", "users")
            .association(Association::has_many("Task", "Tasks", "user_id"));

        let term = OrderTerm::Path {
            steps: vec![AssocStep::model(Arc::clone(&task))],
            column: "title".to_string(),
        };
        assert_eq!(
            gen.quote_order_ref(&term, Some(&user)).unwrap(),
            "\"Tasks\".\"title\""
        );
    }

    #[test]
    fn test_order_path_bad_association() {
        let gen = pg();
        let project = Arc::new(ModelMeta::new("Project", "projects"));
        let user = ModelMeta::new("User", "users");

        let term = OrderTerm::Path {
            steps: vec![AssocStep::model(project)],
            column: "name".to_string(),
        };
        let err = gen.quote_order_ref(&term, Some(&user)).unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidAssociationPath(_)));
    }
}
