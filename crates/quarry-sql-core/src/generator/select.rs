//! The SELECT planner: attribute rewriting, include-tree join generation,
//! the main-vs-sub query split, and grouped-limit UNION assembly.

use std::sync::Arc;

use tracing::{debug, trace};

use super::where_clause::{Prefix, WhereOptions};
use super::{OrderItem, OrderTerm, QueryGenerator};
use crate::cond::WhereValue;
use crate::dialect::Dialect;
use crate::error::{GeneratorError, Result};
use crate::expr::SqlExpr;
use crate::model::{Association, ModelMeta, TableAlias, TableRef};
use crate::value::SqlValue;

/// One entry of a SELECT attribute list.
#[derive(Debug, Clone)]
pub enum SelectAttr {
    /// A plain (possibly dotted) column.
    Col(String),
    /// A column with an alias.
    ColAs(String, String),
    /// An expression without an alias; only verbatim fragments survive eager
    /// loading this way.
    Expr(SqlExpr),
    /// An expression with an alias.
    ExprAs(SqlExpr, String),
}

impl From<&str> for SelectAttr {
    fn from(name: &str) -> Self {
        Self::Col(name.to_string())
    }
}

/// The through-model half of a many-to-many include.
#[derive(Debug, Clone)]
pub struct ThroughInclude {
    /// The join model.
    pub model: Arc<ModelMeta>,
    /// The alias the join table rides under, relative to the include.
    pub as_name: String,
    /// Conditions on the join table.
    pub where_clause: Option<WhereValue>,
    /// Join-table attributes to select.
    pub attributes: Vec<String>,
}

impl ThroughInclude {
    /// Creates a through reference aliased under the model name.
    pub fn new(model: Arc<ModelMeta>) -> Self {
        let as_name = model.name.clone();
        Self {
            model,
            as_name,
            where_clause: None,
            attributes: Vec::new(),
        }
    }

    /// Sets a condition on the join table.
    #[must_use]
    pub fn filter(mut self, where_clause: WhereValue) -> Self {
        self.where_clause = Some(where_clause);
        self
    }

    /// Selects join-table attributes.
    #[must_use]
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }
}

/// A declarative eager-load node.
#[derive(Debug, Clone)]
pub struct Include {
    /// The association being followed; its source must be the parent model.
    pub association: Association,
    /// The target model.
    pub model: Arc<ModelMeta>,
    /// The join alias; defaults to the association alias.
    pub as_name: String,
    /// INNER JOIN instead of LEFT OUTER JOIN.
    pub required: bool,
    /// Whether this include joins inside the subquery when the planner
    /// splits the statement.
    pub subquery: bool,
    /// Whether the include's condition must filter parent rows through a
    /// correlated subquery.
    pub subquery_filter: bool,
    /// Attributes to select from the target.
    pub attributes: Vec<SelectAttr>,
    /// Conditions on the target.
    pub where_clause: Option<WhereValue>,
    /// Combine `where_clause` with OR instead of AND.
    pub or: bool,
    /// Replaces the join predicate entirely.
    pub on: Option<WhereValue>,
    /// The through-model half for many-to-many associations.
    pub through: Option<ThroughInclude>,
    /// Nested includes.
    pub include: Vec<Include>,
}

impl Include {
    /// Creates an include for an association.
    pub fn new(model: Arc<ModelMeta>, association: Association) -> Self {
        let as_name = association.as_name.clone();
        Self {
            association,
            model,
            as_name,
            required: false,
            subquery: false,
            subquery_filter: false,
            attributes: Vec::new(),
            where_clause: None,
            or: false,
            on: None,
            through: None,
            include: Vec::new(),
        }
    }

    /// Makes the join required (INNER JOIN).
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Places the join inside the subquery on a split statement.
    #[must_use]
    pub const fn subquery(mut self) -> Self {
        self.subquery = true;
        self
    }

    /// Filters parent rows through a correlated subquery.
    #[must_use]
    pub const fn subquery_filter(mut self) -> Self {
        self.subquery_filter = true;
        self
    }

    /// Selects attributes from the target.
    #[must_use]
    pub fn attributes<I, A>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<SelectAttr>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a condition on the target.
    #[must_use]
    pub fn filter(mut self, where_clause: WhereValue) -> Self {
        self.where_clause = Some(where_clause);
        self
    }

    /// Combines the condition with OR instead of AND.
    #[must_use]
    pub const fn or(mut self) -> Self {
        self.or = true;
        self
    }

    /// Replaces the join predicate.
    #[must_use]
    pub fn on(mut self, on: WhereValue) -> Self {
        self.on = Some(on);
        self
    }

    /// Sets the through-model half of a many-to-many include.
    #[must_use]
    pub fn through(mut self, through: ThroughInclude) -> Self {
        self.through = Some(through);
        self
    }

    /// Nests a child include.
    #[must_use]
    pub fn include(mut self, child: Include) -> Self {
        self.include.push(child);
        self
    }
}

/// Per-group top-N selection through a UNION of limited sub-selects.
#[derive(Debug, Clone)]
pub struct GroupedLimit {
    /// The grouping column.
    pub on: String,
    /// One UNION branch per value.
    pub values: Vec<SqlValue>,
    /// The per-group limit.
    pub limit: u64,
}

/// Row-lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// `FOR UPDATE`.
    Update,
    /// `FOR SHARE` / `LOCK IN SHARE MODE`.
    Share,
    /// `FOR KEY SHARE`.
    KeyShare,
    /// `FOR NO KEY UPDATE`.
    NoKeyUpdate,
}

/// A row-lock request.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// The lock strength.
    pub mode: LockMode,
    /// Restrict the lock to one table.
    pub of: Option<String>,
}

impl LockOptions {
    /// Locks rows for update.
    #[must_use]
    pub const fn update() -> Self {
        Self {
            mode: LockMode::Update,
            of: None,
        }
    }

    /// Locks rows for shared reads.
    #[must_use]
    pub const fn share() -> Self {
        Self {
            mode: LockMode::Share,
            of: None,
        }
    }

    /// Restricts the lock to one table.
    #[must_use]
    pub fn of(mut self, table: impl Into<String>) -> Self {
        self.of = Some(table.into());
        self
    }
}

/// Options for [`select_query`](QueryGenerator::select_query).
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// The attribute list; `*` when absent.
    pub attributes: Option<Vec<SelectAttr>>,
    /// The WHERE condition.
    pub where_clause: Option<WhereValue>,
    /// Eager-load tree.
    pub include: Vec<Include>,
    /// ORDER BY items.
    pub order: Vec<OrderItem>,
    /// GROUP BY items.
    pub group: Vec<OrderTerm>,
    /// HAVING condition.
    pub having: Option<WhereValue>,
    /// LIMIT.
    pub limit: Option<u64>,
    /// OFFSET.
    pub offset: Option<u64>,
    /// Overrides the derived main-vs-sub decision.
    pub subquery: Option<bool>,
    /// Per-group top-N selection.
    pub grouped_limit: Option<GroupedLimit>,
    /// Row locking.
    pub lock: Option<LockOptions>,
    /// Overrides the main table alias.
    pub table_as: Option<String>,
}

impl SelectOptions {
    /// Sets the attribute list.
    #[must_use]
    pub fn attributes<I, A>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<SelectAttr>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the WHERE condition.
    #[must_use]
    pub fn filter(mut self, where_clause: WhereValue) -> Self {
        self.where_clause = Some(where_clause);
        self
    }

    /// Adds an include.
    #[must_use]
    pub fn include(mut self, include: Include) -> Self {
        self.include.push(include);
        self
    }

    /// Adds an ORDER BY item.
    #[must_use]
    pub fn order(mut self, item: impl Into<OrderItem>) -> Self {
        self.order.push(item.into());
        self
    }

    /// Adds a GROUP BY item.
    #[must_use]
    pub fn group(mut self, term: OrderTerm) -> Self {
        self.group.push(term);
        self
    }

    /// Sets the HAVING condition.
    #[must_use]
    pub fn having(mut self, having: WhereValue) -> Self {
        self.having = Some(having);
        self
    }

    /// Sets the LIMIT.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the OFFSET.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Forces or suppresses the subquery split.
    #[must_use]
    pub const fn subquery(mut self, subquery: bool) -> Self {
        self.subquery = Some(subquery);
        self
    }

    /// Sets a grouped limit.
    #[must_use]
    pub fn grouped_limit(mut self, grouped_limit: GroupedLimit) -> Self {
        self.grouped_limit = Some(grouped_limit);
        self
    }

    /// Sets row locking.
    #[must_use]
    pub fn lock(mut self, lock: LockOptions) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Overrides the main table alias.
    #[must_use]
    pub fn table_as(mut self, alias: impl Into<String>) -> Self {
        self.table_as = Some(alias.into());
        self
    }
}

fn has_multi_association(includes: &[Include]) -> bool {
    includes
        .iter()
        .any(|i| i.association.kind.is_multi() || has_multi_association(&i.include))
}

#[derive(Default)]
struct JoinAccumulator {
    main_attrs: Vec<String>,
    sub_attrs: Vec<String>,
    main_joins: Vec<String>,
    sub_joins: Vec<String>,
    injections: Vec<String>,
}

struct JoinTop<'a> {
    model: &'a ModelMeta,
    table_prefix: &'a str,
    sub_query: bool,
}

impl<D: Dialect> QueryGenerator<D> {
    /// Builds a complete SELECT statement.
    pub fn select_query(
        &self,
        tables: &[TableRef],
        options: &SelectOptions,
        model: Option<&ModelMeta>,
    ) -> Result<String> {
        let main_table = tables.first().ok_or_else(|| {
            GeneratorError::InvalidValue("select requires at least one table".to_string())
        })?;
        debug!(table = %main_table.name, "building select query");

        if let Some(grouped_limit) = &options.grouped_limit {
            return self.grouped_limit_query(tables, options, model, grouped_limit);
        }

        let sub_query = options
            .subquery
            .unwrap_or_else(|| options.limit.is_some() && has_multi_association(&options.include));
        trace!(sub_query, "main-vs-sub query decision");

        let has_includes = !options.include.is_empty();
        let main_table_as = options.table_as.clone().or_else(|| {
            if has_includes || sub_query {
                model.map(|m| m.name.clone())
            } else {
                None
            }
        });
        let table_prefix = main_table_as.as_deref().unwrap_or(main_table.name.as_str());

        // Attribute rewriting, completing primary keys under a subquery so
        // outer joins always have something to correlate on.
        let mut main_attributes = Vec::new();
        match &options.attributes {
            Some(attrs) => {
                let mut attrs = attrs.clone();
                if sub_query {
                    if let Some(m) = model {
                        for pk in &m.primary_keys {
                            let present = attrs.iter().any(|a| match a {
                                SelectAttr::Col(c) => c == pk,
                                SelectAttr::ColAs(_, alias) | SelectAttr::ExprAs(_, alias) => {
                                    alias == pk
                                }
                                SelectAttr::Expr(_) => false,
                            });
                            if !present {
                                let field = m.field_for(pk);
                                attrs.push(if field == pk {
                                    SelectAttr::Col(pk.clone())
                                } else {
                                    SelectAttr::ColAs(field.to_string(), pk.clone())
                                });
                            }
                        }
                    }
                }
                for attr in &attrs {
                    main_attributes.push(self.render_select_attr(
                        attr,
                        table_prefix,
                        has_includes,
                        model,
                    )?);
                }
            }
            None => main_attributes.push(if has_includes {
                format!("{}.*", self.quote_identifier(table_prefix))
            } else {
                "*".to_string()
            }),
        }

        // Include-tree join generation.
        let mut acc = JoinAccumulator::default();
        if has_includes {
            let top_model = model.ok_or_else(|| {
                GeneratorError::InvalidValue(
                    "eager loading requires model metadata".to_string(),
                )
            })?;
            let top = JoinTop {
                model: top_model,
                table_prefix,
                sub_query,
            };
            for include in &options.include {
                self.generate_join_queries(include, &[], top_model, &top, &mut acc)?;
            }
        }

        // WHERE, with planner-synthesised predicates appended.
        let mut where_value = options.where_clause.clone().unwrap_or_default();
        for injection in acc.injections.drain(..) {
            where_value = where_value.and(WhereValue::Injected(injection));
        }
        let prefix_table = match &main_table_as {
            Some(alias) => TableRef::new(alias.clone()),
            None => main_table.clone(),
        };
        let where_options = WhereOptions {
            model,
            prefix: Some(Prefix::Table(prefix_table)),
            field: None,
        };
        let where_fragment = self.where_query(&where_value, &where_options)?;

        let group_fragment = if options.group.is_empty() {
            String::new()
        } else {
            let items = options
                .group
                .iter()
                .map(|term| self.quote_order_ref(term, model))
                .collect::<Result<Vec<_>>>()?;
            format!("GROUP BY {}", items.join(", "))
        };

        let having_fragment = match &options.having {
            Some(having) => {
                let items = self.where_items_query(
                    having,
                    &WhereOptions {
                        model,
                        prefix: None,
                        field: None,
                    },
                )?;
                if items.is_empty() {
                    String::new()
                } else {
                    format!("HAVING {items}")
                }
            }
            None => String::new(),
        };

        let (main_order, sub_order) = self.query_orders(options, model, sub_query)?;
        let limit_fragment = self
            .dialect()
            .add_limit_and_offset(options.limit, options.offset);

        let from_clause = if tables.len() > 1 {
            tables
                .iter()
                .map(|t| self.quote_table(t, TableAlias::None))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            match &main_table_as {
                Some(alias) => self.quote_table(main_table, TableAlias::Name(alias)),
                None => self.quote_table(main_table, TableAlias::None),
            }
        };

        let mut sql;
        if sub_query {
            let mut inner_attrs = main_attributes;
            inner_attrs.append(&mut acc.sub_attrs);
            let inner_prefix = self
                .dialect()
                .select_fragment_prefix(options.limit, options.offset);
            let mut inner = format!(
                "SELECT {inner_prefix}{} FROM {from_clause}",
                inner_attrs.join(", ")
            );
            for join in &acc.sub_joins {
                inner.push(' ');
                inner.push_str(join);
            }
            if !where_fragment.is_empty() {
                inner.push(' ');
                inner.push_str(&where_fragment);
            }
            if !sub_order.is_empty() {
                inner.push_str(" ORDER BY ");
                inner.push_str(&sub_order.join(", "));
            }
            inner.push_str(&limit_fragment);

            let mut outer_attrs = vec![format!("{}.*", self.quote_identifier(table_prefix))];
            outer_attrs.append(&mut acc.main_attrs);
            sql = format!(
                "SELECT {} FROM ({inner}) AS {}",
                outer_attrs.join(", "),
                self.quote_identifier(table_prefix)
            );
            for join in &acc.main_joins {
                sql.push(' ');
                sql.push_str(join);
            }
            for fragment in [&group_fragment, &having_fragment] {
                if !fragment.is_empty() {
                    sql.push(' ');
                    sql.push_str(fragment);
                }
            }
            if !main_order.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&main_order.join(", "));
            }
        } else {
            let select_prefix = self
                .dialect()
                .select_fragment_prefix(options.limit, options.offset);
            let mut attrs = main_attributes;
            attrs.append(&mut acc.main_attrs);
            sql = format!("SELECT {select_prefix}{} FROM {from_clause}", attrs.join(", "));
            for join in &acc.main_joins {
                sql.push(' ');
                sql.push_str(join);
            }
            if !where_fragment.is_empty() {
                sql.push(' ');
                sql.push_str(&where_fragment);
            }
            for fragment in [&group_fragment, &having_fragment] {
                if !fragment.is_empty() {
                    sql.push(' ');
                    sql.push_str(fragment);
                }
            }
            if !main_order.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&main_order.join(", "));
            }
            sql.push_str(&limit_fragment);
        }

        if let Some(lock) = &options.lock {
            sql.push_str(&self.lock_fragment(lock));
        }

        sql.push(';');
        Ok(sql)
    }

    /// Builds the `SELECT ... FROM <table>` head of a statement.
    pub fn select_from_table_fragment(
        &self,
        attributes: &[String],
        table: &TableRef,
        alias: Option<&str>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> String {
        let prefix = self.dialect().select_fragment_prefix(limit, offset);
        let table_sql = match alias {
            Some(name) => self.quote_table(table, TableAlias::Name(name)),
            None => self.quote_table(table, TableAlias::None),
        };
        format!("SELECT {prefix}{} FROM {table_sql}", attributes.join(", "))
    }

    fn render_select_attr(
        &self,
        attr: &SelectAttr,
        table_prefix: &str,
        has_includes: bool,
        model: Option<&ModelMeta>,
    ) -> Result<String> {
        match attr {
            SelectAttr::Expr(expr) => self.expression_sql(expr, model),
            SelectAttr::ExprAs(expr, alias) => Ok(format!(
                "{} AS {}",
                self.expression_sql(expr, model)?,
                self.quote_identifier(alias)
            )),
            SelectAttr::ColAs(column, alias) => Ok(format!(
                "{} AS {}",
                self.quote_attr_string(column),
                self.quote_identifier(alias)
            )),
            SelectAttr::Col(column) => {
                let quoted = self.quote_attr_string(column);
                if has_includes
                    && !column.contains('.')
                    && !column.contains(self.dialect().identifier_quote())
                {
                    Ok(format!(
                        "{}.{quoted}",
                        self.quote_identifier(table_prefix)
                    ))
                } else {
                    Ok(quoted)
                }
            }
        }
    }

    /// Attribute strings already carrying the dialect's quote character pass
    /// through untouched.
    fn quote_attr_string(&self, attr: &str) -> String {
        if attr.contains(self.dialect().identifier_quote()) {
            attr.to_string()
        } else {
            self.quote_identifiers(attr)
        }
    }

    fn generate_join_queries(
        &self,
        include: &Include,
        parent_path: &[String],
        parent_model: &ModelMeta,
        top: &JoinTop<'_>,
        acc: &mut JoinAccumulator,
    ) -> Result<()> {
        let mut as_path = parent_path.to_vec();
        as_path.push(include.as_name.clone());
        let as_name = as_path.join(".");
        let parent_alias = if parent_path.is_empty() {
            top.table_prefix.to_string()
        } else {
            parent_path.join(".")
        };
        let in_sub = include.subquery && top.sub_query;

        // Include attributes surface under dotted aliases.
        for attr in &include.attributes {
            let rendered = match attr {
                SelectAttr::Col(column) => {
                    let field = include.model.field_for(column);
                    format!(
                        "{}.{} AS {}",
                        self.quote_identifier(&as_name),
                        self.quote_identifier(field),
                        self.quote_identifier(&format!("{as_name}.{column}"))
                    )
                }
                SelectAttr::ColAs(column, alias) => format!(
                    "{}.{} AS {}",
                    self.quote_identifier(&as_name),
                    self.quote_identifier(column),
                    self.quote_identifier(&format!("{as_name}.{alias}"))
                ),
                SelectAttr::Expr(SqlExpr::Literal(sql)) => sql.clone(),
                SelectAttr::Expr(_) => {
                    return Err(GeneratorError::MissingAliasForComputedAttribute {
                        model: include.model.name.clone(),
                    })
                }
                SelectAttr::ExprAs(expr, alias) => format!(
                    "{} AS {}",
                    self.expression_sql(expr, Some(include.model.as_ref()))?,
                    self.quote_identifier(&format!("{as_name}.{alias}"))
                ),
            };
            if in_sub {
                acc.sub_attrs.push(rendered);
            } else {
                acc.main_attrs.push(rendered);
            }
        }

        let join_kind = if include.required {
            "INNER JOIN"
        } else {
            "LEFT OUTER JOIN"
        };

        if let Some(through) = &include.through {
            self.generate_through_join(
                include, through, &as_name, &parent_alias, parent_model, join_kind, in_sub, top,
                acc,
            )?;
        } else {
            let join = self.join_include_query(
                include,
                &as_name,
                &parent_alias,
                parent_model,
                parent_path.is_empty(),
                join_kind,
                top,
            )?;
            if in_sub {
                acc.sub_joins.push(join);
            } else {
                acc.main_joins.push(join);
            }
        }

        for child in &include.include {
            self.generate_join_queries(child, &as_path, include.model.as_ref(), top, acc)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_through_join(
        &self,
        include: &Include,
        through: &ThroughInclude,
        as_name: &str,
        parent_alias: &str,
        parent_model: &ModelMeta,
        join_kind: &str,
        in_sub: bool,
        top: &JoinTop<'_>,
        acc: &mut JoinAccumulator,
    ) -> Result<()> {
        let association = &include.association;
        let source_fk = &association.identifier_field;
        let target_fk = association.foreign_identifier_field.as_deref().ok_or_else(|| {
            GeneratorError::InvalidValue(
                "a through association requires a target foreign key".to_string(),
            )
        })?;
        let source_pk = parent_model.primary_key_field();
        let target_pk = include.model.primary_key_field();
        let through_name = format!("{as_name}.{}", through.as_name);

        for attr in &through.attributes {
            let rendered = format!(
                "{}.{} AS {}",
                self.quote_identifier(&through_name),
                self.quote_identifier(attr),
                self.quote_identifier(&format!("{through_name}.{attr}"))
            );
            if in_sub {
                acc.sub_attrs.push(rendered);
            } else {
                acc.main_attrs.push(rendered);
            }
        }

        let join_source = format!(
            "{}.{} = {}.{}",
            self.quote_identifier(parent_alias),
            self.quote_identifier(source_pk),
            self.quote_identifier(&through_name),
            self.quote_identifier(source_fk)
        );
        let join_target = format!(
            "{}.{} = {}.{}",
            self.quote_identifier(as_name),
            self.quote_identifier(target_pk),
            self.quote_identifier(&through_name),
            self.quote_identifier(target_fk)
        );

        let through_where = match &through.where_clause {
            Some(w) => self.where_items_query(
                w,
                &WhereOptions {
                    model: Some(through.model.as_ref()),
                    prefix: Some(Prefix::Literal(self.quote_identifier(&through_name))),
                    field: None,
                },
            )?,
            None => String::new(),
        };
        let target_where = match &include.where_clause {
            Some(w) => self.where_items_query(
                w,
                &WhereOptions {
                    model: Some(include.model.as_ref()),
                    prefix: Some(Prefix::Literal(self.quote_identifier(as_name))),
                    field: None,
                },
            )?,
            None => String::new(),
        };

        let target_on = if target_where.is_empty() {
            join_target.clone()
        } else {
            format!("{join_target} AND {target_where}")
        };
        let source_on = if through_where.is_empty() {
            join_source
        } else {
            format!("{join_source} AND {through_where}")
        };

        let through_table = self.quote_table(&through.model.table, TableAlias::None);
        let target_table = self.quote_table(&include.model.table, TableAlias::None);
        let through_alias = self.quote_identifier(&through_name);
        let target_alias = self.quote_identifier(as_name);

        if self.dialect().join_table_dependent() {
            let join = format!(
                "{join_kind} ({through_table} AS {through_alias} INNER JOIN {target_table} AS {target_alias} ON {target_on}) ON {source_on}"
            );
            if in_sub {
                acc.sub_joins.push(join);
            } else {
                acc.main_joins.push(join);
            }
        } else {
            let first =
                format!("{join_kind} {through_table} AS {through_alias} ON {source_on}");
            let second =
                format!("{join_kind} {target_table} AS {target_alias} ON {target_on}");
            if in_sub {
                acc.sub_joins.push(first);
                acc.sub_joins.push(second);
            } else {
                acc.main_joins.push(first);
                acc.main_joins.push(second);
            }
        }

        // A required many-to-many include under a subquery filters parent
        // rows through a correlated one-row lookup.
        if top.sub_query && (include.required || include.subquery_filter) {
            let top_pk = top.model.primary_key_field();
            let target_filter = if target_where.is_empty() {
                String::new()
            } else {
                format!(" AND {target_where}")
            };
            let exists = format!(
                "(SELECT {through_alias}.{} FROM {through_table} AS {through_alias} INNER JOIN {target_table} AS {target_alias} ON {join_target}{target_filter} WHERE {through_alias}.{} = {}.{} LIMIT 1) IS NOT NULL",
                self.quote_identifier(source_fk),
                self.quote_identifier(source_fk),
                self.quote_identifier(top.table_prefix),
                self.quote_identifier(top_pk),
            );
            acc.injections.push(exists);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn join_include_query(
        &self,
        include: &Include,
        as_name: &str,
        parent_alias: &str,
        parent_model: &ModelMeta,
        parent_is_top: bool,
        join_kind: &str,
        top: &JoinTop<'_>,
    ) -> Result<String> {
        use crate::model::AssociationKind;

        let association = &include.association;
        let (attr_left, field_left, field_right) = match association.kind {
            AssociationKind::BelongsTo => (
                association.identifier.clone(),
                association.identifier_field.clone(),
                include.model.primary_key_field().to_string(),
            ),
            _ => {
                let pk_attr = parent_model
                    .primary_keys
                    .first()
                    .map_or("id", String::as_str);
                (
                    pk_attr.to_string(),
                    parent_model.primary_key_field().to_string(),
                    association.identifier_field.clone(),
                )
            }
        };

        // A join running outside the subquery correlates against the
        // subquery's output, which exposes attribute names.
        let left_column = if top.sub_query && !include.subquery && parent_is_top {
            attr_left
        } else {
            field_left
        };

        let mut predicate = format!(
            "{}.{} = {}.{}",
            self.quote_identifier(parent_alias),
            self.quote_identifier(&left_column),
            self.quote_identifier(as_name),
            self.quote_identifier(&field_right)
        );

        if let Some(on) = &include.on {
            predicate = self.where_items_query(
                on,
                &WhereOptions {
                    model: Some(include.model.as_ref()),
                    prefix: Some(Prefix::Literal(self.quote_identifier(as_name))),
                    field: None,
                },
            )?;
        }

        if let Some(where_clause) = &include.where_clause {
            let fragment = self.where_items_query(
                where_clause,
                &WhereOptions {
                    model: Some(include.model.as_ref()),
                    prefix: Some(Prefix::Literal(self.quote_identifier(as_name))),
                    field: None,
                },
            )?;
            if !fragment.is_empty() {
                let connector = if include.or { " OR " } else { " AND " };
                predicate = format!("{predicate}{connector}{fragment}");
            }
        }

        Ok(format!(
            "{join_kind} {} AS {} ON {predicate}",
            self.quote_table(&include.model.table, TableAlias::None),
            self.quote_identifier(as_name)
        ))
    }

    /// Compiles ORDER BY items, routing non-include items into the subquery
    /// as well when the statement splits.
    fn query_orders(
        &self,
        options: &SelectOptions,
        model: Option<&ModelMeta>,
        sub_query: bool,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut main_order = Vec::with_capacity(options.order.len());
        let mut sub_order = Vec::new();
        for item in &options.order {
            let mut sql = self.quote_order_ref(&item.term, model)?;
            if let Some(direction) = item.direction {
                sql.push(' ');
                sql.push_str(direction.as_sql());
            }
            let belongs_to_include = matches!(item.term, OrderTerm::Path { .. });
            if sub_query && !belongs_to_include {
                sub_order.push(sql.clone());
            }
            main_order.push(sql);
        }
        Ok((main_order, sub_order))
    }

    fn lock_fragment(&self, lock: &LockOptions) -> String {
        let caps = self.dialect().lock_caps();
        let clause = match lock.mode {
            LockMode::Update if caps.update => Some("FOR UPDATE".to_string()),
            LockMode::Share => caps.share.map(str::to_string),
            LockMode::KeyShare if caps.key_share => Some("FOR KEY SHARE".to_string()),
            LockMode::NoKeyUpdate if caps.key_share => Some("FOR NO KEY UPDATE".to_string()),
            _ => None,
        };
        match clause {
            Some(mut clause) => {
                if caps.of_table {
                    if let Some(of) = &lock.of {
                        clause.push_str(" OF ");
                        clause.push_str(&self.quote_identifier(of));
                    }
                }
                format!(" {clause}")
            }
            None => String::new(),
        }
    }

    fn grouped_limit_query(
        &self,
        tables: &[TableRef],
        options: &SelectOptions,
        model: Option<&ModelMeta>,
        grouped_limit: &GroupedLimit,
    ) -> Result<String> {
        let mut branches = Vec::with_capacity(grouped_limit.values.len());
        for value in &grouped_limit.values {
            let mut branch = options.clone();
            branch.grouped_limit = None;
            branch.limit = Some(grouped_limit.limit);
            branch.subquery = Some(false);
            branch.lock = None;
            let extra = WhereValue::Map(vec![(
                grouped_limit.on.clone(),
                WhereValue::Value(value.clone()),
            )]);
            branch.where_clause = Some(match options.where_clause.clone() {
                Some(w) => w.and(extra),
                None => extra,
            });

            let sub = self.select_query(tables, &branch, model)?;
            let sub = sub.strip_suffix(';').map_or(sub.clone(), str::to_string);
            branches.push(format!("({sub})"));
        }

        let union = if self.dialect().supports_union_all() {
            " UNION ALL "
        } else {
            " UNION "
        };
        let alias = options
            .table_as
            .clone()
            .or_else(|| model.map(|m| m.name.clone()))
            .unwrap_or_else(|| tables[0].name.clone());

        let mut sql = format!(
            "SELECT * FROM ({}) AS {}",
            branches.join(union),
            self.quote_identifier(&alias)
        );
        let (main_order, _) = self.query_orders(options, model, false)?;
        if !main_order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&main_order.join(", "));
        }
        sql.push(';');
        Ok(sql)
    }
}
