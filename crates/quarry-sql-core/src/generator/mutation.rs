//! Mutation builders: INSERT, bulk INSERT, UPDATE, increment, DELETE.
//!
//! Dialect differences are driven by the capability registry; the MSSQL
//! trigger temp-table rewrite and the PostgreSQL exception wrapper are
//! post-processors over an otherwise-assembled statement.

use tracing::debug;
use uuid::Uuid;

use super::where_clause::WhereOptions;
use super::QueryGenerator;
use crate::cond::WhereValue;
use crate::dialect::{Dialect, EmptyInsert, ReturnStyle};
use crate::error::Result;
use crate::expr::SqlExpr;
use crate::model::{ModelMeta, TableAlias, TableRef};
use crate::types::SqlType;
use crate::value::{SqlValue, ToSqlValue};

/// A value in an insert/update row: an escaped scalar or a lowered
/// expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// An escaped scalar.
    Value(SqlValue),
    /// A lowered expression.
    Expr(SqlExpr),
}

macro_rules! field_value_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::Value(value.to_sql_value())
                }
            }
        )+
    };
}

field_value_from!(
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

impl From<SqlExpr> for FieldValue {
    fn from(expr: SqlExpr) -> Self {
        Self::Expr(expr)
    }
}

/// One attribute/value row.
pub type Row = Vec<(String, FieldValue)>;

/// Builds a [`Row`] from anything convertible.
pub fn row<K, V, I>(items: I) -> Row
where
    K: Into<String>,
    V: Into<FieldValue>,
    I: IntoIterator<Item = (K, V)>,
{
    items
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Options for [`insert_query`](QueryGenerator::insert_query).
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    /// Emit the dialect's returning clause.
    pub returning: bool,
    /// Skip duplicate-key rows where the dialect can.
    pub ignore_duplicates: bool,
    /// A raw `ON DUPLICATE KEY <clause>` tail.
    pub on_duplicate: Option<String>,
    /// Trap unique violations in a transient function (PostgreSQL).
    pub exception: bool,
    /// The target table carries triggers; reroute OUTPUT through a temp
    /// table where required.
    pub has_trigger: bool,
}

/// Options for [`bulk_insert_query`](QueryGenerator::bulk_insert_query).
#[derive(Debug, Clone, Default)]
pub struct BulkInsertOptions {
    /// Skip duplicate-key rows where the dialect can.
    pub ignore_duplicates: bool,
    /// Columns to refresh on duplicate keys.
    pub update_on_duplicate: Option<Vec<String>>,
    /// Emit the dialect's returning clause.
    pub returning: bool,
}

/// Options for [`update_query`](QueryGenerator::update_query).
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Emit the dialect's returning clause.
    pub returning: bool,
    /// Cap the number of updated rows where the dialect can.
    pub limit: Option<u64>,
    /// The target table carries triggers.
    pub has_trigger: bool,
}

/// Options for [`delete_query`](QueryGenerator::delete_query).
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Cap the number of deleted rows.
    pub limit: Option<u64>,
    /// Empty the table instead; `limit` and the condition are ignored.
    pub truncate: bool,
}

impl<D: Dialect> QueryGenerator<D> {
    /// Builds a single-row INSERT.
    pub fn insert_query(
        &self,
        table: &TableRef,
        value_row: &Row,
        model: Option<&ModelMeta>,
        options: &InsertOptions,
    ) -> Result<String> {
        debug!(table = %table.name, "building insert query");
        let table_sql = self.quote_table(table, TableAlias::None);

        let mut fields = Vec::with_capacity(value_row.len());
        let mut values = Vec::with_capacity(value_row.len());
        let mut explicit_identity = false;

        for (name, field_value) in value_row {
            let attribute =
                model.and_then(|m| m.attr(name).or_else(|| m.attr_by_field(name)));
            let field = attribute.map_or(name.as_str(), |a| a.field.as_str());
            let is_serial = attribute.is_some_and(|a| a.auto_increment);

            match field_value {
                FieldValue::Value(v) if v.is_null() && is_serial => {
                    // Serial columns take DEFAULT where the dialect allows
                    // it and vanish from the statement where it does not.
                    if self.dialect().autoincrement_default_value() {
                        fields.push(self.quote_identifier(field));
                        values.push("DEFAULT".to_string());
                    }
                }
                FieldValue::Value(v) => {
                    if is_serial {
                        explicit_identity = true;
                    }
                    fields.push(self.quote_identifier(field));
                    values.push(self.escape_value(v, attribute, false)?);
                }
                FieldValue::Expr(e) => {
                    fields.push(self.quote_identifier(field));
                    values.push(self.expression_sql(e, model)?);
                }
            }
        }

        let ignore = self.ignore_fragment(options.ignore_duplicates);
        let style = if options.returning || options.exception {
            self.dialect().return_style()
        } else {
            None
        };
        let output = if style == Some(ReturnStyle::Output) {
            " OUTPUT INSERTED.*"
        } else {
            ""
        };

        let mut core = if fields.is_empty() {
            match self.dialect().empty_insert_form() {
                EmptyInsert::DefaultValues => {
                    format!("INSERT {ignore}INTO {table_sql}{output} DEFAULT VALUES")
                }
                EmptyInsert::EmptyValues => {
                    format!("INSERT {ignore}INTO {table_sql}{output} VALUES ()")
                }
            }
        } else {
            format!(
                "INSERT {ignore}INTO {table_sql} ({}){output} VALUES ({})",
                fields.join(","),
                values.join(",")
            )
        };

        if let Some(clause) = &options.on_duplicate {
            if self.dialect().supports_on_duplicate_key() {
                core.push_str(" ON DUPLICATE KEY ");
                core.push_str(clause);
            }
        }

        if options.exception && self.dialect().supports_exception_wrapper() {
            return Ok(self.exception_wrapper(&table_sql, &core));
        }

        if style == Some(ReturnStyle::Returning) {
            core.push_str(" RETURNING *");
        }

        if options.has_trigger && self.dialect().supports_tmp_table_trigger() {
            return Ok(self.tmp_table_rewrite(&core, model));
        }

        if explicit_identity && self.dialect().supports_identity_insert() {
            return Ok(format!(
                "SET IDENTITY_INSERT {table_sql} ON; {core}; SET IDENTITY_INSERT {table_sql} OFF;"
            ));
        }

        core.push(';');
        Ok(core)
    }

    /// Builds a multi-row INSERT. The column list is the union of all row
    /// keys in first-seen order; absent cells become `DEFAULT` for serial
    /// columns when the dialect allows, `NULL` otherwise.
    pub fn bulk_insert_query(
        &self,
        table: &TableRef,
        rows: &[Row],
        model: Option<&ModelMeta>,
        options: &BulkInsertOptions,
    ) -> Result<String> {
        debug!(table = %table.name, rows = rows.len(), "building bulk insert query");
        let table_sql = self.quote_table(table, TableAlias::None);

        let mut all_attrs: Vec<&str> = Vec::new();
        for value_row in rows {
            for (name, _) in value_row {
                if !all_attrs.contains(&name.as_str()) {
                    all_attrs.push(name);
                }
            }
        }

        let mut tuples = Vec::with_capacity(rows.len());
        for value_row in rows {
            let mut cells = Vec::with_capacity(all_attrs.len());
            for name in &all_attrs {
                let attribute =
                    model.and_then(|m| m.attr(name).or_else(|| m.attr_by_field(name)));
                match value_row.iter().find(|(k, _)| k == name) {
                    Some((_, FieldValue::Value(v))) => {
                        cells.push(self.escape_value(v, attribute, false)?);
                    }
                    Some((_, FieldValue::Expr(e))) => cells.push(self.expression_sql(e, model)?),
                    None => {
                        let serial = attribute.is_some_and(|a| a.auto_increment);
                        if serial && self.dialect().supports_bulk_default() {
                            cells.push("DEFAULT".to_string());
                        } else {
                            cells.push("NULL".to_string());
                        }
                    }
                }
            }
            tuples.push(format!("({})", cells.join(",")));
        }

        let fields = all_attrs
            .iter()
            .map(|name| {
                let field = model.map_or(*name, |m| m.field_for(name));
                self.quote_identifier(field)
            })
            .collect::<Vec<_>>()
            .join(",");

        let ignore = self.ignore_fragment(options.ignore_duplicates);
        let style = if options.returning {
            self.dialect().return_style()
        } else {
            None
        };
        let output = if style == Some(ReturnStyle::Output) {
            " OUTPUT INSERTED.*"
        } else {
            ""
        };

        let mut sql = format!(
            "INSERT {ignore}INTO {table_sql} ({fields}){output} VALUES {}",
            tuples.join(",")
        );

        if let Some(columns) = &options.update_on_duplicate {
            if self.dialect().supports_update_on_duplicate() && !columns.is_empty() {
                let assignments = columns
                    .iter()
                    .map(|c| {
                        let quoted =
                            self.quote_identifier(model.map_or(c.as_str(), |m| m.field_for(c)));
                        format!("{quoted}=VALUES({quoted})")
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                sql.push_str(" ON DUPLICATE KEY UPDATE ");
                sql.push_str(&assignments);
            }
        }

        if style == Some(ReturnStyle::Returning) {
            sql.push_str(" RETURNING *");
        }

        sql.push(';');
        Ok(sql)
    }

    /// Builds an UPDATE; an empty value set is a no-op and returns the empty
    /// string.
    pub fn update_query(
        &self,
        table: &TableRef,
        values: &Row,
        where_clause: &WhereValue,
        model: Option<&ModelMeta>,
        options: &UpdateOptions,
    ) -> Result<String> {
        if values.is_empty() {
            return Ok(String::new());
        }
        debug!(table = %table.name, "building update query");
        let table_sql = self.quote_table(table, TableAlias::None);

        let mut assignments = Vec::with_capacity(values.len());
        for (name, field_value) in values {
            let attribute =
                model.and_then(|m| m.attr(name).or_else(|| m.attr_by_field(name)));
            if attribute.is_some_and(|a| a.auto_increment)
                && !self.dialect().allows_autoincrement_update()
            {
                continue;
            }
            let field = attribute.map_or(name.as_str(), |a| a.field.as_str());
            let rendered = match field_value {
                FieldValue::Value(v) => self.escape_value(v, attribute, false)?,
                FieldValue::Expr(e) => self.expression_sql(e, model)?,
            };
            assignments.push(format!("{}={rendered}", self.quote_identifier(field)));
        }
        if assignments.is_empty() {
            return Ok(String::new());
        }

        let style = if options.returning {
            self.dialect().return_style()
        } else {
            None
        };
        let output = if style == Some(ReturnStyle::Output) {
            " OUTPUT INSERTED.*"
        } else {
            ""
        };

        let where_fragment = self.mutation_where(where_clause, model)?;
        let limit_fragment = match options.limit {
            Some(n) if self.dialect().supports_limit_on_update() => format!(" LIMIT {n}"),
            _ => String::new(),
        };

        let mut sql = format!(
            "UPDATE {table_sql} SET {}{output}{where_fragment}{limit_fragment}",
            assignments.join(",")
        );

        if style == Some(ReturnStyle::Returning) {
            sql.push_str(" RETURNING *");
        }

        if options.has_trigger && self.dialect().supports_tmp_table_trigger() {
            return Ok(self.tmp_table_rewrite(&sql, model));
        }

        sql.push(';');
        Ok(sql)
    }

    /// Builds an UPDATE that adds to columns in place; `extras` are plain
    /// assignments carried along, with NULL entries skipped.
    pub fn increment_query(
        &self,
        table: &TableRef,
        increments: &[(String, SqlValue)],
        extras: &[(String, SqlValue)],
        where_clause: &WhereValue,
        model: Option<&ModelMeta>,
        returning: bool,
    ) -> Result<String> {
        debug!(table = %table.name, "building increment query");
        let table_sql = self.quote_table(table, TableAlias::None);

        let mut assignments = Vec::with_capacity(increments.len() + extras.len());
        for (name, amount) in increments {
            let attribute =
                model.and_then(|m| m.attr(name).or_else(|| m.attr_by_field(name)));
            let field = self.quote_identifier(attribute.map_or(name.as_str(), |a| a.field.as_str()));
            assignments.push(format!(
                "{field}={field} + {}",
                self.escape_value(amount, attribute, false)?
            ));
        }
        for (name, value) in extras {
            if value.is_null() {
                continue;
            }
            let attribute =
                model.and_then(|m| m.attr(name).or_else(|| m.attr_by_field(name)));
            let field = self.quote_identifier(attribute.map_or(name.as_str(), |a| a.field.as_str()));
            assignments.push(format!(
                "{field}={}",
                self.escape_value(value, attribute, false)?
            ));
        }

        let style = if returning {
            self.dialect().return_style()
        } else {
            None
        };
        let output = if style == Some(ReturnStyle::Output) {
            " OUTPUT INSERTED.*"
        } else {
            ""
        };

        let where_fragment = self.mutation_where(where_clause, model)?;
        let mut sql = format!(
            "UPDATE {table_sql} SET {}{output}{where_fragment}",
            assignments.join(",")
        );
        if style == Some(ReturnStyle::Returning) {
            sql.push_str(" RETURNING *");
        }
        sql.push(';');
        Ok(sql)
    }

    /// Builds a DELETE (or TRUNCATE). The statement shape is dialect-owned.
    pub fn delete_query(
        &self,
        table: &TableRef,
        where_clause: &WhereValue,
        options: &DeleteOptions,
        model: Option<&ModelMeta>,
    ) -> Result<String> {
        debug!(table = %table.name, truncate = options.truncate, "building delete query");
        let table_sql = self.quote_table(table, TableAlias::None);

        if options.truncate {
            // Truncation ignores both the condition and the limit.
            return Ok(format!("{};", self.dialect().truncate_sql(&table_sql)));
        }

        let where_fragment = self.mutation_where(where_clause, model)?;
        let core = self
            .dialect()
            .delete_sql(&table_sql, &where_fragment, options.limit)?;
        Ok(format!("{core};"))
    }

    fn mutation_where(
        &self,
        where_clause: &WhereValue,
        model: Option<&ModelMeta>,
    ) -> Result<String> {
        let fragment = self.where_query(
            where_clause,
            &WhereOptions {
                model,
                prefix: None,
                field: None,
            },
        )?;
        Ok(if fragment.is_empty() {
            String::new()
        } else {
            format!(" {fragment}")
        })
    }

    fn ignore_fragment(&self, requested: bool) -> String {
        if requested {
            self.dialect()
                .ignore_clause()
                .map_or_else(String::new, |clause| format!("{clause} "))
        } else {
            String::new()
        }
    }

    /// Reroutes OUTPUT through a declared temp table so triggers cannot
    /// clobber the result set, then reads it back.
    fn tmp_table_rewrite(&self, statement: &str, model: Option<&ModelMeta>) -> String {
        let columns = model.map_or_else(String::new, |m| {
            m.attributes
                .iter()
                .filter(|a| a.sql_type != SqlType::Virtual)
                .map(|a| format!("{} {}", self.quote_identifier(&a.field), a.sql_type.to_sql()))
                .collect::<Vec<_>>()
                .join(",")
        });
        let redirected = statement.replace(" OUTPUT INSERTED.*", " OUTPUT INSERTED.* INTO @tmp");
        format!("declare @tmp table ({columns}); {redirected};select * from @tmp;")
    }

    /// Wraps an INSERT in a transient `pg_temp` function that reports unique
    /// violations instead of raising them.
    fn exception_wrapper(&self, table_sql: &str, insert_core: &str) -> String {
        let uid = Uuid::new_v4().simple().to_string();
        let tag = format!("$body_{uid}$");
        let fname = format!("pg_temp.insert_with_report_{uid}");
        format!(
            "CREATE OR REPLACE FUNCTION {fname}(OUT response {table_sql}, OUT caught_exception text) \
             RETURNS RECORD AS {tag} BEGIN {insert_core} RETURNING * INTO response; \
             EXCEPTION WHEN unique_violation THEN GET STACKED DIAGNOSTICS caught_exception = PG_EXCEPTION_DETAIL; \
             END {tag} LANGUAGE plpgsql; \
             SELECT (f.response).*, f.caught_exception FROM {fname}() AS f; \
             DROP FUNCTION IF EXISTS {fname}();"
        )
    }
}
