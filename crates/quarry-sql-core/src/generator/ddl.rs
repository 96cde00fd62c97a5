//! Schema DDL builders: indexes, tables, columns.
//!
//! Index emission is capability-driven (`ALTER TABLE ... ADD INDEX` vs
//! `CREATE INDEX`, `USING` placement, partial-index support); table and
//! column DDL delegates the dialect-specific pieces (serial types, the
//! ADD COLUMN keyword) to the dialect.

use tracing::debug;

use super::where_clause::WhereOptions;
use super::{OrderDirection, QueryGenerator};
use crate::cond::WhereValue;
use crate::dialect::{Dialect, UsingPlacement};
use crate::error::{GeneratorError, Result};
use crate::expr::SqlExpr;
use crate::model::{Attribute, ModelMeta, TableAlias, TableRef};
use crate::types::SqlType;

/// One indexed column.
#[derive(Debug, Clone)]
pub enum IndexField {
    /// A plain column.
    Name(String),
    /// An expression index entry; requires an explicit index name.
    Expr(SqlExpr),
    /// A column with per-column options.
    Spec {
        /// The column name.
        name: String,
        /// Collation, where the dialect indexes support one.
        collate: Option<String>,
        /// Prefix length, where supported.
        length: Option<u32>,
        /// Sort order.
        order: Option<OrderDirection>,
    },
}

impl From<&str> for IndexField {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Options for [`add_index_query`](QueryGenerator::add_index_query).
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// The indexed columns.
    pub fields: Vec<IndexField>,
    /// The index name; derived from the table and columns when absent.
    pub name: Option<String>,
    /// UNIQUE index.
    pub unique: bool,
    /// Index type keyword (`FULLTEXT`, `SPATIAL`), where supported.
    pub index_type: Option<String>,
    /// Index method (`BTREE`, `GIN`, ...).
    pub using: Option<String>,
    /// Build without locking writes, where supported.
    pub concurrently: bool,
    /// Fulltext parser, where supported.
    pub parser: Option<String>,
    /// Partial-index condition, where supported.
    pub where_clause: Option<WhereValue>,
    /// Overrides the derived-name prefix.
    pub prefix: Option<String>,
}

impl IndexOptions {
    /// Indexes the given columns.
    pub fn fields<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<IndexField>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets the index name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Makes the index UNIQUE.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the index method.
    #[must_use]
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.using = Some(method.into());
        self
    }

    /// Builds the index concurrently.
    #[must_use]
    pub const fn concurrently(mut self) -> Self {
        self.concurrently = true;
        self
    }

    /// Restricts the index to matching rows.
    #[must_use]
    pub fn filter(mut self, where_clause: WhereValue) -> Self {
        self.where_clause = Some(where_clause);
        self
    }
}

/// Options for [`create_table_query`](QueryGenerator::create_table_query).
#[derive(Debug, Clone, Default)]
pub struct CreateTableOptions {
    /// Guard with `IF NOT EXISTS`.
    pub if_not_exists: bool,
}

/// Options for [`drop_table_query`](QueryGenerator::drop_table_query).
#[derive(Debug, Clone, Default)]
pub struct DropTableOptions {
    /// Also drop dependent objects.
    pub cascade: bool,
}

fn underscored(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, c) in input.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl<D: Dialect> QueryGenerator<D> {
    /// Builds an index-creation statement.
    pub fn add_index_query(
        &self,
        table: &TableRef,
        options: &IndexOptions,
        raw_table: Option<&str>,
    ) -> Result<String> {
        debug!(table = %table.name, "building add index query");
        let caps = self.dialect().index_caps();
        let table_sql = self.quote_table(table, TableAlias::None);

        let mut rendered = Vec::with_capacity(options.fields.len());
        let mut field_names = Vec::with_capacity(options.fields.len());
        for field in &options.fields {
            match field {
                IndexField::Name(name) => {
                    if name.is_empty() {
                        return Err(GeneratorError::MissingIndexFieldName);
                    }
                    field_names.push(name.as_str());
                    rendered.push(self.quote_identifier(name));
                }
                IndexField::Expr(expr) => {
                    rendered.push(self.expression_sql(expr, None)?);
                }
                IndexField::Spec {
                    name,
                    collate,
                    length,
                    order,
                } => {
                    if name.is_empty() {
                        return Err(GeneratorError::MissingIndexFieldName);
                    }
                    field_names.push(name.as_str());
                    let mut sql = self.quote_identifier(name);
                    if caps.collate {
                        if let Some(collation) = collate {
                            sql.push_str(" COLLATE ");
                            sql.push_str(&self.quote_identifier(collation));
                        }
                    }
                    if caps.length {
                        if let Some(n) = length {
                            sql.push_str(&format!("({n})"));
                        }
                    }
                    if let Some(direction) = order {
                        sql.push(' ');
                        sql.push_str(direction.as_sql());
                    }
                    rendered.push(sql);
                }
            }
        }

        let index_name = match &options.name {
            Some(name) => name.clone(),
            None => {
                if field_names.len() != options.fields.len() {
                    return Err(GeneratorError::Validation(
                        "an index over expressions requires an explicit name".to_string(),
                    ));
                }
                let prefix = options
                    .prefix
                    .clone()
                    .or_else(|| raw_table.map(str::to_string))
                    .unwrap_or_else(|| table.name.clone());
                let prefix: String = prefix
                    .replace('.', "_")
                    .chars()
                    .filter(|c| !matches!(c, '`' | '"' | '[' | ']'))
                    .collect();
                underscored(&format!("{prefix}_{}", field_names.join("_")))
            }
        };

        let unique = if options.unique { "UNIQUE " } else { "" };
        let index_type = match &options.index_type {
            Some(t) if caps.index_type => format!("{t} "),
            _ => String::new(),
        };
        let concurrently = if options.concurrently && caps.concurrently {
            "CONCURRENTLY "
        } else {
            ""
        };
        let (using_before, using_after) = match &options.using {
            Some(method) => match caps.using {
                UsingPlacement::BeforeTable => (format!(" USING {method}"), String::new()),
                UsingPlacement::AfterTable => (String::new(), format!(" USING {method}")),
            },
            None => (String::new(), String::new()),
        };
        let parser = match &options.parser {
            Some(p) if caps.parser => format!(" WITH PARSER {p}"),
            _ => String::new(),
        };
        let where_fragment = match &options.where_clause {
            Some(w) if caps.where_clause => {
                let clause = self.where_query(w, &WhereOptions::default())?;
                if clause.is_empty() {
                    String::new()
                } else {
                    format!(" {clause}")
                }
            }
            _ => String::new(),
        };

        let fields = rendered.join(", ");
        let name_sql = self.quote_identifier(&index_name);

        if caps.via_alter {
            Ok(format!(
                "ALTER TABLE {table_sql} ADD {unique}{index_type}INDEX {name_sql}{using_before} ({fields})"
            ))
        } else {
            Ok(format!(
                "CREATE {unique}{index_type}INDEX {concurrently}{name_sql}{using_before} ON {table_sql}{using_after} ({fields}){parser}{where_fragment}"
            ))
        }
    }

    /// Builds an index-removal statement.
    pub fn remove_index_query(&self, table: &TableRef, index_name: &str) -> String {
        let table_sql = self.quote_table(table, TableAlias::None);
        self.dialect()
            .drop_index_sql(&table_sql, &self.quote_identifier(index_name))
    }

    /// Builds a CREATE TABLE statement from model metadata.
    pub fn create_table_query(
        &self,
        model: &ModelMeta,
        options: &CreateTableOptions,
    ) -> Result<String> {
        debug!(table = %model.table.name, "building create table query");
        let table_sql = self.quote_table(&model.table, TableAlias::None);
        let single_pk = model.primary_keys.len() == 1;

        let mut definitions = Vec::with_capacity(model.attributes.len());
        for attribute in &model.attributes {
            if attribute.sql_type == SqlType::Virtual {
                continue;
            }
            let mut sql = self.column_definition(attribute);
            if single_pk && model.primary_keys[0] == attribute.name {
                sql.push_str(" PRIMARY KEY");
            }
            definitions.push(sql);
        }
        if model.primary_keys.len() > 1 {
            let columns = model
                .primary_keys
                .iter()
                .map(|pk| self.quote_identifier(model.field_for(pk)))
                .collect::<Vec<_>>()
                .join(", ");
            definitions.push(format!("PRIMARY KEY ({columns})"));
        }

        let guard = if options.if_not_exists {
            "IF NOT EXISTS "
        } else {
            ""
        };
        Ok(format!(
            "CREATE TABLE {guard}{table_sql} ({});",
            definitions.join(", ")
        ))
    }

    /// Builds a DROP TABLE statement.
    pub fn drop_table_query(&self, table: &TableRef, options: &DropTableOptions) -> String {
        let cascade = if options.cascade { " CASCADE" } else { "" };
        format!(
            "DROP TABLE IF EXISTS {}{cascade};",
            self.quote_table(table, TableAlias::None)
        )
    }

    /// Builds a table-rename statement.
    pub fn rename_table_query(&self, before: &TableRef, after: &TableRef) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {};",
            self.quote_table(before, TableAlias::None),
            self.quote_table(after, TableAlias::None)
        )
    }

    /// Builds a column-addition statement.
    pub fn add_column_query(&self, table: &TableRef, attribute: &Attribute) -> String {
        format!(
            "ALTER TABLE {} {} {};",
            self.quote_table(table, TableAlias::None),
            self.dialect().add_column_clause(),
            self.column_definition(attribute)
        )
    }

    /// Builds a column-removal statement.
    pub fn remove_column_query(&self, table: &TableRef, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {};",
            self.quote_table(table, TableAlias::None),
            self.quote_identifier(column)
        )
    }

    /// Builds a column-rename statement.
    pub fn rename_column_query(&self, table: &TableRef, before: &str, after: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            self.quote_table(table, TableAlias::None),
            self.quote_identifier(before),
            self.quote_identifier(after)
        )
    }

    fn column_definition(&self, attribute: &Attribute) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&attribute.field),
            self.dialect().column_type_sql(attribute)
        );
        if !attribute.allow_null {
            sql.push_str(" NOT NULL");
        }
        if attribute.auto_increment {
            let keyword = self.dialect().autoincrement_keyword();
            if !keyword.is_empty() {
                sql.push(' ');
                sql.push_str(keyword);
            }
        }
        sql
    }
}
