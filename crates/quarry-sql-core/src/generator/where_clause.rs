//! The condition compiler: recursive lowering of condition trees into SQL
//! fragments.
//!
//! The three entry points form a recursive group: [`where_query`] wraps a
//! non-empty fragment in `WHERE `, [`where_items_query`] lowers a tree with a
//! binding, and [`where_item_query`] lowers one key/value pair.
//!
//! [`where_query`]: QueryGenerator::where_query
//! [`where_items_query`]: QueryGenerator::where_items_query
//! [`where_item_query`]: QueryGenerator::where_item_query

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::QueryGenerator;
use crate::cond::WhereValue;
use crate::dialect::Dialect;
use crate::error::{GeneratorError, Result};
use crate::expr::SqlExpr;
use crate::model::{Attribute, ModelMeta, TableAlias, TableRef};
use crate::value::SqlValue;

/// Table or literal prefix applied to generated keys.
#[derive(Debug, Clone)]
pub enum Prefix {
    /// Prefix with a quoted table reference.
    Table(TableRef),
    /// Prefix with an already-rendered fragment.
    Literal(String),
}

/// Options threaded through the condition compiler.
#[derive(Debug, Clone, Default)]
pub struct WhereOptions<'a> {
    /// The model whose attributes resolve keys to columns.
    pub model: Option<&'a ModelMeta>,
    /// A prefix qualifying every generated key.
    pub prefix: Option<Prefix>,
    /// Overrides attribute resolution for every key.
    pub field: Option<&'a Attribute>,
}

impl<'a> WhereOptions<'a> {
    /// Options resolving keys against a model.
    #[must_use]
    pub fn model(model: &'a ModelMeta) -> Self {
        Self {
            model: Some(model),
            ..Self::default()
        }
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }
}

/// Legacy operator spellings, applied at both key and inner-object level
/// before dispatch. The literal set is authoritative; no case folding happens
/// beyond its explicit entries.
static OPERATOR_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("ne", "$ne"),
        ("in", "$in"),
        ("not", "$not"),
        ("notin", "$notIn"),
        ("gte", "$gte"),
        ("gt", "$gt"),
        ("lte", "$lte"),
        ("lt", "$lt"),
        ("like", "$like"),
        ("ilike", "$iLike"),
        ("$ilike", "$iLike"),
        ("nlike", "$notLike"),
        ("$notlike", "$notLike"),
        ("notilike", "$notILike"),
        ("..", "$between"),
        ("between", "$between"),
        ("!..", "$notBetween"),
        ("notbetween", "$notBetween"),
        ("nbetween", "$notBetween"),
        ("overlap", "$overlap"),
        ("&&", "$overlap"),
        ("@>", "$contains"),
        ("contains", "$contains"),
        ("<@", "$contained"),
        ("contained", "$contained"),
    ])
});

fn canonical_key(key: &str) -> &str {
    OPERATOR_ALIASES.get(key).copied().unwrap_or(key)
}

fn comparator_for(op: &str) -> Option<&'static str> {
    Some(match op {
        "$eq" => "=",
        "$ne" => "!=",
        "$gte" => ">=",
        "$gt" => ">",
        "$lte" => "<=",
        "$lt" => "<",
        "$is" => "IS",
        "$like" => "LIKE",
        "$notLike" => "NOT LIKE",
        "$iLike" => "ILIKE",
        "$notILike" => "NOT ILIKE",
        "$overlap" => "&&",
        "$contains" => "@>",
        "$contained" => "<@",
        "$adjacent" => "-|-",
        "$strictLeft" => "<<",
        "$strictRight" => ">>",
        "$noExtendRight" => "&<",
        "$noExtendLeft" => "&>",
        _ => return None,
    })
}

fn accepts_strings(op: &str) -> bool {
    matches!(op, "$like" | "$notLike" | "$iLike" | "$notILike")
}

/// Keys of the form `$path.to.column$` are delimited column references.
fn is_col_string(key: &str) -> bool {
    key.len() > 2 && key.starts_with('$') && key.ends_with('$')
}

fn is_null_node(value: &WhereValue) -> bool {
    matches!(value, WhereValue::Null) || matches!(value, WhereValue::Value(v) if v.is_null())
}

fn can_treat_array_as_and(items: &[WhereValue]) -> bool {
    items.iter().all(|item| matches!(item, WhereValue::Map(_)))
}

impl<D: Dialect> QueryGenerator<D> {
    /// Lowers a condition tree into a complete `WHERE ...` clause, or an
    /// empty string when the tree lowers to nothing.
    pub fn where_query(&self, node: &WhereValue, options: &WhereOptions<'_>) -> Result<String> {
        let items = self.where_items_query(node, options)?;
        if items.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("WHERE {items}"))
        }
    }

    /// Lowers a condition tree into a bare fragment joined with `AND`.
    pub fn where_items_query(
        &self,
        node: &WhereValue,
        options: &WhereOptions<'_>,
    ) -> Result<String> {
        self.where_items_with_binding(node, options, " AND ")
    }

    pub(crate) fn where_items_with_binding(
        &self,
        node: &WhereValue,
        options: &WhereOptions<'_>,
        binding: &str,
    ) -> Result<String> {
        match node {
            WhereValue::Null => Ok(String::new()),
            WhereValue::Injected(sql) => Ok(sql.clone()),
            WhereValue::Expr(_) => self.where_item_query(None, node, options),
            WhereValue::Value(SqlValue::Text(_)) => Err(GeneratorError::RawWhereRemoved),
            WhereValue::Value(_) => Ok(String::new()),
            WhereValue::Map(pairs) => {
                let mut parts = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let fragment = self.where_item_query(Some(key), value, options)?;
                    if !fragment.is_empty() {
                        parts.push(fragment);
                    }
                }
                Ok(parts.join(binding))
            }
            WhereValue::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    let fragment = self.where_item_query(None, item, options)?;
                    if !fragment.is_empty() {
                        parts.push(fragment);
                    }
                }
                Ok(parts.join(binding))
            }
        }
    }

    /// Lowers one key/value pair of a condition mapping.
    pub fn where_item_query(
        &self,
        key: Option<&str>,
        value: &WhereValue,
        options: &WhereOptions<'_>,
    ) -> Result<String> {
        let Some(raw_key) = key else {
            return match value {
                // A keyless string is a raw fragment.
                WhereValue::Value(SqlValue::Text(sql)) => Ok(sql.clone()),
                WhereValue::Expr(expr) => self.expression_sql(expr, options.model),
                WhereValue::List(items) => {
                    if can_treat_array_as_and(items) {
                        self.where_item_query(Some("$and"), value, options)
                    } else {
                        self.format_raw_pair(items, options)
                    }
                }
                WhereValue::Map(_) => self.where_items_query(value, options),
                WhereValue::Injected(sql) => Ok(sql.clone()),
                WhereValue::Null | WhereValue::Value(_) => Ok(String::new()),
            };
        };

        let key = canonical_key(raw_key);

        if matches!(key, "$or" | "$and" | "$not") {
            return self.logical_query(key, value, options);
        }

        // A dotted key whose head is a JSON attribute becomes a path access:
        // the tail re-nests into the value.
        if key.contains('.') && !is_col_string(key) {
            if let Some(model) = options.model {
                let head = key.split('.').next().unwrap_or(key);
                let head_attr = model.attr(head).or_else(|| model.attr_by_field(head));
                if head_attr.is_some_and(|a| a.sql_type.is_json()) {
                    let tail: Vec<&str> = key.split('.').skip(1).collect();
                    let mut nested = value.clone();
                    for segment in tail.into_iter().rev() {
                        nested = WhereValue::Map(vec![(segment.to_string(), nested)]);
                    }
                    return self.where_item_query(Some(head), &nested, options);
                }
            }
        }

        let attribute = options.field.or_else(|| {
            options
                .model
                .and_then(|m| m.attr(key).or_else(|| m.attr_by_field(key)))
        });

        match value {
            WhereValue::Expr(expr) => {
                // A function value keeps the comparator form; any other
                // expression node short-circuits to its own lowering.
                if matches!(expr, SqlExpr::Fn { .. }) {
                    let key_sql = self.where_key_sql(key, attribute, options);
                    Ok(format!(
                        "{key_sql} = {}",
                        self.expression_sql(expr, options.model)?
                    ))
                } else {
                    self.expression_sql(expr, options.model)
                }
            }
            WhereValue::Map(pairs) => self.where_map_value(key, attribute, pairs, options),
            WhereValue::List(_) if attribute.is_some_and(|a| a.sql_type.is_array()) => {
                let key_sql = self.where_key_sql(key, attribute, options);
                let value_sql = match value {
                    WhereValue::List(items) => {
                        self.escape_where_list(items, attribute, false)?
                    }
                    _ => unreachable!(),
                };
                Ok(format!("{key_sql} = {value_sql}"))
            }
            WhereValue::List(_) => {
                let wrapped = vec![("$in".to_string(), value.clone())];
                self.where_map_value(key, attribute, &wrapped, options)
            }
            WhereValue::Null => {
                let key_sql = self.where_key_sql(key, attribute, options);
                Ok(format!("{key_sql} IS NULL"))
            }
            WhereValue::Value(v) if v.is_null() => {
                let key_sql = self.where_key_sql(key, attribute, options);
                Ok(format!("{key_sql} IS NULL"))
            }
            WhereValue::Value(v) => {
                let key_sql = self.where_key_sql(key, attribute, options);
                Ok(format!(
                    "{key_sql} = {}",
                    self.escape_value(v, attribute, false)?
                ))
            }
            WhereValue::Injected(sql) => Ok(sql.clone()),
        }
    }

    fn logical_query(
        &self,
        op: &str,
        value: &WhereValue,
        options: &WhereOptions<'_>,
    ) -> Result<String> {
        let binding = if op == "$or" { " OR " } else { " AND " };
        let outer_prefix = if op == "$not" { "NOT " } else { "" };
        let vacuous = || {
            if op == "$and" {
                String::new()
            } else {
                // No alternatives to satisfy / nothing excluded from the
                // negation: no rows.
                "0 = 1".to_string()
            }
        };

        let parts = match value {
            WhereValue::List(items) => {
                if items.is_empty() {
                    return Ok(vacuous());
                }
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    let fragment = self.where_items_with_binding(item, options, " AND ")?;
                    if fragment.is_empty() {
                        continue;
                    }
                    let composite = match item {
                        WhereValue::Map(pairs) => pairs.len() > 1,
                        WhereValue::List(list) => list.len() > 1,
                        _ => false,
                    };
                    parts.push(if composite {
                        format!("({fragment})")
                    } else {
                        fragment
                    });
                }
                parts
            }
            WhereValue::Map(pairs) => {
                if pairs.is_empty() {
                    return Ok(vacuous());
                }
                let mut parts = Vec::with_capacity(pairs.len());
                for (key, item) in pairs {
                    let fragment = self.where_item_query(Some(key), item, options)?;
                    if !fragment.is_empty() {
                        parts.push(fragment);
                    }
                }
                parts
            }
            WhereValue::Null => return Ok(vacuous()),
            other => {
                let fragment = self.where_item_query(None, other, options)?;
                if fragment.is_empty() {
                    return Ok(vacuous());
                }
                vec![fragment]
            }
        };

        if parts.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("{outer_prefix}({})", parts.join(binding)))
    }

    fn where_map_value(
        &self,
        key: &str,
        attribute: Option<&Attribute>,
        pairs: &[(String, WhereValue)],
        options: &WhereOptions<'_>,
    ) -> Result<String> {
        if pairs.is_empty() {
            return Ok(String::new());
        }

        // The alias map applies to first-level keys of the value as well.
        let pairs: Vec<(String, WhereValue)> = pairs
            .iter()
            .map(|(k, v)| (canonical_key(k).to_string(), v.clone()))
            .collect();

        if attribute.is_some_and(|a| a.sql_type.is_json()) {
            return self.json_path_where(key, attribute, &pairs, options);
        }

        // $or / $and nested under an attribute key distribute the key across
        // their children.
        if pairs.len() == 1 {
            let (op, inner) = &pairs[0];
            if matches!(op.as_str(), "$or" | "$and") {
                let binding = if op == "$or" { " OR " } else { " AND " };
                let children: Vec<&WhereValue> = match inner {
                    WhereValue::List(items) => items.iter().collect(),
                    single => vec![single],
                };
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    let fragment = self.where_item_query(Some(key), child, options)?;
                    if !fragment.is_empty() {
                        parts.push(fragment);
                    }
                }
                if parts.is_empty() {
                    return Ok(String::new());
                }
                return Ok(format!("({})", parts.join(binding)));
            }
        }

        if pairs.len() > 1 {
            let mut parts = Vec::with_capacity(pairs.len());
            for (op, rhs) in &pairs {
                let single = vec![(op.clone(), rhs.clone())];
                let fragment = self.where_map_value(key, attribute, &single, options)?;
                if !fragment.is_empty() {
                    parts.push(fragment);
                }
            }
            return match parts.len() {
                0 => Ok(String::new()),
                1 => Ok(parts.remove(0)),
                _ => Ok(format!("({})", parts.join(" AND "))),
            };
        }

        let (op, rhs) = &pairs[0];
        let key_sql = self.where_key_sql(key, attribute, options);
        self.operator_query(&key_sql, attribute, op, rhs, options)
    }

    fn operator_query(
        &self,
        key_sql: &str,
        attribute: Option<&Attribute>,
        op: &str,
        rhs: &WhereValue,
        options: &WhereOptions<'_>,
    ) -> Result<String> {
        match op {
            "$in" | "$notIn" => {
                let comparator = if op == "$in" { "IN" } else { "NOT IN" };
                match rhs {
                    WhereValue::List(items) if items.is_empty() => {
                        if op == "$in" {
                            Ok(format!("{key_sql} IN (NULL)"))
                        } else {
                            // An empty exclusion list excludes nothing.
                            Ok(String::new())
                        }
                    }
                    WhereValue::List(items) => {
                        let list = self.escape_where_items(items, attribute, false, options)?;
                        Ok(format!("{key_sql} {comparator} ({})", list.join(", ")))
                    }
                    WhereValue::Expr(SqlExpr::Literal(sql)) => {
                        Ok(format!("{key_sql} {comparator} {sql}"))
                    }
                    other => Err(GeneratorError::InvalidValue(format!(
                        "{op} expects a list, got {other:?}"
                    ))),
                }
            }
            "$between" | "$notBetween" => {
                let comparator = if op == "$between" {
                    "BETWEEN"
                } else {
                    "NOT BETWEEN"
                };
                match rhs {
                    WhereValue::List(items) if items.len() == 2 => {
                        let bounds = self.escape_where_items(items, attribute, false, options)?;
                        Ok(format!(
                            "{key_sql} {comparator} {} AND {}",
                            bounds[0], bounds[1]
                        ))
                    }
                    other => Err(GeneratorError::Validation(format!(
                        "{op} expects exactly two values, got {other:?}"
                    ))),
                }
            }
            "$raw" => match rhs {
                WhereValue::Value(SqlValue::Text(sql)) => Ok(format!("{key_sql} = {sql}")),
                WhereValue::Injected(sql) => Ok(format!("{key_sql} = {sql}")),
                other => Err(GeneratorError::InvalidValue(format!(
                    "$raw expects a SQL string, got {other:?}"
                ))),
            },
            "$col" => match rhs {
                WhereValue::Value(SqlValue::Text(path)) => {
                    Ok(format!("{key_sql} = {}", self.fold_col_path(path)))
                }
                other => Err(GeneratorError::InvalidValue(format!(
                    "$col expects a column path, got {other:?}"
                ))),
            },
            "$any" | "$all" => {
                let quantifier = if op == "$any" { "ANY" } else { "ALL" };
                let rhs_sql = self.quantifier_operand(rhs, attribute, options)?;
                Ok(format!("{key_sql} = {quantifier} {rhs_sql}"))
            }
            "$is" => {
                if is_null_node(rhs) {
                    return Ok(format!("{key_sql} IS NULL"));
                }
                match rhs {
                    WhereValue::Value(SqlValue::Bool(b)) => Ok(format!(
                        "{key_sql} IS {}",
                        self.dialect().boolean_literal(*b)
                    )),
                    other => Err(GeneratorError::InvalidValue(format!(
                        "$is expects NULL or a boolean, got {other:?}"
                    ))),
                }
            }
            "$not" => {
                // In comparator position $not normalises: IS NOT for
                // NULL/booleans, NOT IN for lists, != otherwise.
                if is_null_node(rhs) {
                    return Ok(format!("{key_sql} IS NOT NULL"));
                }
                match rhs {
                    WhereValue::Value(SqlValue::Bool(b)) => Ok(format!(
                        "{key_sql} IS NOT {}",
                        self.dialect().boolean_literal(*b)
                    )),
                    WhereValue::List(_) => {
                        self.operator_query(key_sql, attribute, "$notIn", rhs, options)
                    }
                    other => self.operator_query(key_sql, attribute, "$ne", other, options),
                }
            }
            "$eq" | "$ne" if is_null_node(rhs) => {
                if op == "$eq" {
                    Ok(format!("{key_sql} IS NULL"))
                } else {
                    Ok(format!("{key_sql} IS NOT NULL"))
                }
            }
            _ => {
                let Some(base) = comparator_for(op) else {
                    return Err(GeneratorError::Validation(format!(
                        "unsupported comparison operator {op}"
                    )));
                };
                let accept_strings = accepts_strings(op);

                // A nested $any / $all augments the comparator.
                if let WhereValue::Map(inner) = rhs {
                    if let [(quant, quant_rhs)] = inner.as_slice() {
                        if matches!(canonical_key(quant), "$any" | "$all") {
                            let quantifier = if canonical_key(quant) == "$any" {
                                "ANY"
                            } else {
                                "ALL"
                            };
                            let rhs_sql =
                                self.quantifier_operand(quant_rhs, attribute, options)?;
                            return Ok(format!("{key_sql} {base} {quantifier} {rhs_sql}"));
                        }
                    }
                }

                let rhs_sql = match rhs {
                    WhereValue::Null => "NULL".to_string(),
                    WhereValue::Value(v) => self.escape_value(v, attribute, accept_strings)?,
                    WhereValue::Expr(e) => self.expression_sql(e, options.model)?,
                    WhereValue::List(items) => {
                        self.escape_where_list(items, attribute, accept_strings)?
                    }
                    WhereValue::Injected(sql) => sql.clone(),
                    WhereValue::Map(_) => {
                        return Err(GeneratorError::InvalidValue(format!(
                            "cannot compare against a mapping with {op}"
                        )))
                    }
                };
                Ok(format!("{key_sql} {base} {rhs_sql}"))
            }
        }
    }

    /// Renders the operand of `ANY` / `ALL`: a `(VALUES ...)` table when
    /// wrapped in `$values`, a parenthesised list otherwise.
    fn quantifier_operand(
        &self,
        rhs: &WhereValue,
        attribute: Option<&Attribute>,
        options: &WhereOptions<'_>,
    ) -> Result<String> {
        match rhs {
            WhereValue::Map(pairs) => match pairs.as_slice() {
                [(key, WhereValue::List(items))] if key == "$values" => {
                    let rows = self
                        .escape_where_items(items, attribute, true, options)?
                        .into_iter()
                        .map(|v| format!("({v})"))
                        .collect::<Vec<_>>();
                    Ok(format!("(VALUES {})", rows.join(", ")))
                }
                other => Err(GeneratorError::InvalidValue(format!(
                    "unsupported ANY/ALL operand {other:?}"
                ))),
            },
            WhereValue::List(items) => {
                let list = self.escape_where_items(items, attribute, true, options)?;
                Ok(format!("({})", list.join(", ")))
            }
            WhereValue::Expr(e) => Ok(format!("({})", self.expression_sql(e, options.model)?)),
            other => Err(GeneratorError::InvalidValue(format!(
                "unsupported ANY/ALL operand {other:?}"
            ))),
        }
    }

    fn escape_where_items(
        &self,
        items: &[WhereValue],
        attribute: Option<&Attribute>,
        accept_strings: bool,
        options: &WhereOptions<'_>,
    ) -> Result<Vec<String>> {
        items
            .iter()
            .map(|item| match item {
                WhereValue::Value(v) => self.escape_value(v, attribute, accept_strings),
                WhereValue::Expr(e) => self.expression_sql(e, options.model),
                other => Err(GeneratorError::InvalidValue(format!(
                    "cannot escape {other:?} inside a value list"
                ))),
            })
            .collect()
    }

    fn escape_where_list(
        &self,
        items: &[WhereValue],
        attribute: Option<&Attribute>,
        accept_strings: bool,
    ) -> Result<String> {
        let values = items
            .iter()
            .map(|item| match item {
                WhereValue::Value(v) => Ok(v.clone()),
                other => Err(GeneratorError::InvalidValue(format!(
                    "cannot escape {other:?} inside a value list"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        self.escape_value(&SqlValue::List(values), attribute, accept_strings)
    }

    /// Renders the key side of a condition: delimited column strings fold
    /// into qualified references, everything else quotes as an identifier
    /// (resolved through the attribute's column name) under the optional
    /// prefix.
    pub(crate) fn where_key_sql(
        &self,
        key: &str,
        attribute: Option<&Attribute>,
        options: &WhereOptions<'_>,
    ) -> String {
        if is_col_string(key) {
            return self.fold_col_path(&key[1..key.len() - 1]);
        }

        let field = attribute.map_or(key, |a| a.field.as_str());
        let base = self.quote_identifier(field);
        match &options.prefix {
            Some(Prefix::Literal(sql)) => format!("{sql}.{base}"),
            Some(Prefix::Table(table)) => {
                format!("{}.{base}", self.quote_table(table, TableAlias::None))
            }
            None => base,
        }
    }

    /// Folds a dotted column path: more than two segments collapse everything
    /// but the last into one identifier.
    fn fold_col_path(&self, path: &str) -> String {
        let segments: Vec<&str> = path.split('.').collect();
        match segments.as_slice() {
            [] => String::new(),
            [single] => self.quote_identifier(single),
            [head @ .., last] => format!(
                "{}.{}",
                self.quote_identifier(&head.join(".")),
                self.quote_identifier(last)
            ),
        }
    }

    fn json_path_where(
        &self,
        key: &str,
        attribute: Option<&Attribute>,
        pairs: &[(String, WhereValue)],
        options: &WhereOptions<'_>,
    ) -> Result<String> {
        let column_sql = self.where_key_sql(key, attribute, options);
        let mut conjuncts = Vec::new();
        self.json_walk(&column_sql, &mut Vec::new(), pairs, attribute, options, &mut conjuncts)?;

        match conjuncts.len() {
            0 => Ok(String::new()),
            1 => Ok(conjuncts.remove(0)),
            _ => Ok(format!("({})", conjuncts.join(" AND "))),
        }
    }

    fn json_walk(
        &self,
        column_sql: &str,
        path: &mut Vec<String>,
        pairs: &[(String, WhereValue)],
        attribute: Option<&Attribute>,
        options: &WhereOptions<'_>,
        conjuncts: &mut Vec<String>,
    ) -> Result<()> {
        for (segment, value) in pairs {
            let segment = canonical_key(segment);
            if segment.starts_with('$') && path.is_empty() {
                // Operators at the document root apply to the column itself.
                let fragment =
                    self.operator_query(column_sql, attribute, segment, value, options)?;
                if !fragment.is_empty() {
                    conjuncts.push(fragment);
                }
                continue;
            }

            path.push(segment.to_string());
            match value {
                WhereValue::Map(inner)
                    if !inner.is_empty()
                        && inner.iter().all(|(k, _)| !canonical_key(k).starts_with('$')) =>
                {
                    self.json_walk(column_sql, path, inner, attribute, options, conjuncts)?;
                }
                leaf => {
                    let fragment =
                        self.json_leaf(column_sql, path, leaf, attribute, options)?;
                    if !fragment.is_empty() {
                        conjuncts.push(fragment);
                    }
                }
            }
            path.pop();
        }
        Ok(())
    }

    fn json_leaf(
        &self,
        column_sql: &str,
        path: &[String],
        value: &WhereValue,
        attribute: Option<&Attribute>,
        options: &WhereOptions<'_>,
    ) -> Result<String> {
        let mut segments = path.to_vec();
        let mut cast: Option<String> = None;
        if let Some(last) = segments.last_mut() {
            if let Some((seg, explicit)) = last.split_once("::") {
                cast = Some(explicit.to_string());
                *last = seg.to_string();
            }
        }

        let infer = |v: &SqlValue| -> Option<&'static str> {
            match v {
                SqlValue::Int(_) | SqlValue::Float(_) => Some("double precision"),
                SqlValue::DateTime(_) => Some("timestamptz"),
                SqlValue::Bool(_) => Some("boolean"),
                _ => None,
            }
        };

        match value {
            WhereValue::Map(ops) => {
                let inferred = cast.or_else(|| {
                    ops.iter()
                        .find_map(|(_, v)| match v {
                            WhereValue::Value(sv) => infer(sv).map(str::to_string),
                            _ => None,
                        })
                });
                let accessor = self.dialect().json_path_select(
                    column_sql,
                    &segments,
                    inferred.as_deref(),
                )?;
                let mut parts = Vec::with_capacity(ops.len());
                for (op, rhs) in ops {
                    let fragment =
                        self.operator_query(&accessor, None, canonical_key(op), rhs, options)?;
                    if !fragment.is_empty() {
                        parts.push(fragment);
                    }
                }
                match parts.len() {
                    0 => Ok(String::new()),
                    1 => Ok(parts.remove(0)),
                    _ => Ok(format!("({})", parts.join(" AND "))),
                }
            }
            leaf if is_null_node(leaf) => {
                let accessor =
                    self.dialect()
                        .json_path_select(column_sql, &segments, cast.as_deref())?;
                Ok(format!("{accessor} IS NULL"))
            }
            WhereValue::Value(v) => {
                let inferred = cast.or_else(|| infer(v).map(str::to_string));
                let accessor = self.dialect().json_path_select(
                    column_sql,
                    &segments,
                    inferred.as_deref(),
                )?;
                Ok(format!("{accessor} = {}", self.escape(v, None)?))
            }
            WhereValue::List(_) => {
                let accessor =
                    self.dialect()
                        .json_path_select(column_sql, &segments, cast.as_deref())?;
                self.operator_query(&accessor, None, "$in", value, options)
            }
            other => Err(GeneratorError::InvalidValue(format!(
                "cannot compare a JSON path against {other:?}"
            ))),
        }
    }

    /// Formats a `[sql, replacements]` pair: each `?` placeholder is replaced
    /// left to right with the escaped replacement.
    fn format_raw_pair(
        &self,
        items: &[WhereValue],
        options: &WhereOptions<'_>,
    ) -> Result<String> {
        let mut iter = items.iter();
        let sql = match iter.next() {
            Some(WhereValue::Value(SqlValue::Text(sql))) => sql,
            other => {
                return Err(GeneratorError::InvalidValue(format!(
                    "a raw fragment pair must start with a SQL string, got {other:?}"
                )))
            }
        };

        let mut out = String::with_capacity(sql.len());
        let mut cursor = sql.as_str();
        for replacement in iter {
            let rendered = match replacement {
                WhereValue::Value(v) => self.escape(v, None)?,
                WhereValue::Expr(e) => self.expression_sql(e, options.model)?,
                other => {
                    return Err(GeneratorError::InvalidValue(format!(
                        "cannot bind {other:?} into a raw fragment"
                    )))
                }
            };
            match cursor.find('?') {
                Some(idx) => {
                    out.push_str(&cursor[..idx]);
                    out.push_str(&rendered);
                    cursor = &cursor[idx + 1..];
                }
                None => break,
            }
        }
        out.push_str(cursor);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MssqlDialect, MysqlDialect, PostgresDialect};
    use crate::expr::{col, func, literal, val};
    use crate::model::ModelMeta;
    use crate::types::SqlType;
    use crate::value::value_list;
    use crate::where_map;

    fn gen() -> QueryGenerator<MysqlDialect> {
        QueryGenerator::new(MysqlDialect::new())
    }

    fn opts<'a>() -> WhereOptions<'a> {
        WhereOptions::default()
    }

    #[test]
    fn test_empty_inputs_lower_to_nothing() {
        let g = gen();
        assert_eq!(g.where_items_query(&WhereValue::Null, &opts()).unwrap(), "");
        assert_eq!(g.where_items_query(&where_map! {}, &opts()).unwrap(), "");
        assert_eq!(
            g.where_items_query(&WhereValue::List(vec![]), &opts()).unwrap(),
            ""
        );
        assert_eq!(g.where_query(&WhereValue::Null, &opts()).unwrap(), "");
    }

    #[test]
    fn test_where_query_prepends_keyword() {
        let g = gen();
        assert_eq!(
            g.where_query(&where_map! { "id" => 1 }, &opts()).unwrap(),
            "WHERE `id` = 1"
        );
    }

    #[test]
    fn test_raw_top_level_string_fails() {
        let g = gen();
        let err = g
            .where_items_query(&WhereValue::Value(SqlValue::Text("id = 1".into())), &opts())
            .unwrap_err();
        assert!(matches!(err, GeneratorError::RawWhereRemoved));
    }

    #[test]
    fn test_simple_equality_and_null() {
        let g = gen();
        assert_eq!(
            g.where_items_query(&where_map! { "name" => "Alice" }, &opts())
                .unwrap(),
            "`name` = 'Alice'"
        );
        assert_eq!(
            g.where_items_query(&where_map! { "deleted_at" => WhereValue::Null }, &opts())
                .unwrap(),
            "`deleted_at` IS NULL"
        );
        assert_eq!(
            g.where_items_query(&where_map! { "x" => SqlValue::Null }, &opts())
                .unwrap(),
            "`x` IS NULL"
        );
    }

    #[test]
    fn test_multi_key_operator_mapping() {
        let g = gen();
        let cond = where_map! {
            "name" => where_map! { "$like" => "A%" },
            "age" => where_map! { "$gte" => 18, "$lt" => 65 },
        };
        assert_eq!(
            g.where_items_query(&cond, &opts()).unwrap(),
            "`name` LIKE 'A%' AND (`age` >= 18 AND `age` < 65)"
        );
    }

    #[test]
    fn test_or_and_not_combinators() {
        let g = gen();
        let cond = where_map! {
            "$or" => WhereValue::list([where_map! { "a" => 1 }, where_map! { "b" => 2 }]),
        };
        assert_eq!(
            g.where_items_query(&cond, &opts()).unwrap(),
            "(`a` = 1 OR `b` = 2)"
        );

        let cond = where_map! { "$not" => where_map! { "a" => 1, "b" => 2 } };
        assert_eq!(
            g.where_items_query(&cond, &opts()).unwrap(),
            "NOT (`a` = 1 AND `b` = 2)"
        );
    }

    #[test]
    fn test_empty_logic_shapes() {
        let g = gen();
        assert_eq!(
            g.where_items_query(&where_map! { "$or" => WhereValue::List(vec![]) }, &opts())
                .unwrap(),
            "0 = 1"
        );
        assert_eq!(
            g.where_items_query(&where_map! { "$not" => WhereValue::List(vec![]) }, &opts())
                .unwrap(),
            "0 = 1"
        );
        assert_eq!(
            g.where_items_query(&where_map! { "$and" => WhereValue::List(vec![]) }, &opts())
                .unwrap(),
            ""
        );
    }

    #[test]
    fn test_alias_map_matches_canonical_output() {
        let g = gen();
        let canonical = g
            .where_items_query(&where_map! { "x" => where_map! { "$ne" => 3 } }, &opts())
            .unwrap();
        let aliased = g
            .where_items_query(&where_map! { "x" => where_map! { "ne" => 3 } }, &opts())
            .unwrap();
        assert_eq!(canonical, aliased);
        assert_eq!(canonical, "`x` != 3");

        let between = g
            .where_items_query(
                &where_map! { "x" => where_map! { ".." => value_list([1_i64, 5]) } },
                &opts(),
            )
            .unwrap();
        assert_eq!(between, "`x` BETWEEN 1 AND 5");

        let contains = g
            .where_items_query(
                &where_map! { "x" => where_map! { "@>" => value_list([1_i64]) } },
                &opts(),
            )
            .unwrap();
        assert_eq!(contains, "`x` @> (1)");
    }

    #[test]
    fn test_nested_or_under_attribute_distributes() {
        let g = gen();
        let cond = where_map! {
            "rank" => where_map! { "$or" => WhereValue::list([
                WhereValue::from(1),
                where_map! { "$lt" => 0 },
            ]) },
        };
        assert_eq!(
            g.where_items_query(&cond, &opts()).unwrap(),
            "(`rank` = 1 OR `rank` < 0)"
        );
    }

    #[test]
    fn test_array_rewrites_to_in() {
        let g = gen();
        assert_eq!(
            g.where_items_query(
                &where_map! { "id" => WhereValue::list([1, 2, 3]) },
                &opts()
            )
            .unwrap(),
            "`id` IN (1, 2, 3)"
        );
    }

    #[test]
    fn test_in_edge_cases() {
        let g = gen();
        assert_eq!(
            g.where_items_query(
                &where_map! { "tags" => where_map! { "$in" => WhereValue::List(vec![]) } },
                &opts()
            )
            .unwrap(),
            "`tags` IN (NULL)"
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "tags" => where_map! { "$notIn" => WhereValue::List(vec![]) } },
                &opts()
            )
            .unwrap(),
            ""
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "id" => where_map! { "$in" => literal("(SELECT id FROM admins)") } },
                &opts()
            )
            .unwrap(),
            "`id` IN (SELECT id FROM admins)"
        );
    }

    #[test]
    fn test_not_normalisation() {
        let g = gen();
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! { "$not" => WhereValue::list([1, 2]) } },
                &opts()
            )
            .unwrap(),
            "`x` NOT IN (1, 2)"
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! { "$not" => 3 } },
                &opts()
            )
            .unwrap(),
            "`x` != 3"
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! { "$not" => SqlValue::Null } },
                &opts()
            )
            .unwrap(),
            "`x` IS NOT NULL"
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! { "$not" => true } },
                &opts()
            )
            .unwrap(),
            "`x` IS NOT true"
        );
    }

    #[test]
    fn test_eq_ne_null_promotion() {
        let g = gen();
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! { "$eq" => SqlValue::Null } },
                &opts()
            )
            .unwrap(),
            "`x` IS NULL"
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! { "$ne" => SqlValue::Null } },
                &opts()
            )
            .unwrap(),
            "`x` IS NOT NULL"
        );
    }

    #[test]
    fn test_any_all_and_values() {
        let g = QueryGenerator::new(PostgresDialect::new());
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! { "$any" => WhereValue::list([2, 3]) } },
                &opts()
            )
            .unwrap(),
            "\"x\" = ANY (2, 3)"
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! {
                    "$any" => where_map! { "$values" => WhereValue::list([2, 3]) }
                } },
                &opts()
            )
            .unwrap(),
            "\"x\" = ANY (VALUES (2), (3))"
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! { "$gt" => where_map! { "$any" => WhereValue::list([2, 3]) } } },
                &opts()
            )
            .unwrap(),
            "\"x\" > ANY (2, 3)"
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "x" => where_map! { "$like" => where_map! { "$any" => WhereValue::list(["a%", "b%"]) } } },
                &opts()
            )
            .unwrap(),
            "\"x\" LIKE ANY ('a%', 'b%')"
        );
    }

    #[test]
    fn test_col_references() {
        let g = gen();
        assert_eq!(
            g.where_items_query(
                &where_map! { "user_id" => where_map! { "$col" => "users.id" } },
                &opts()
            )
            .unwrap(),
            "`user_id` = `users`.`id`"
        );
        assert_eq!(
            g.where_items_query(
                &where_map! { "$Tasks.Project.id$" => 3 },
                &opts()
            )
            .unwrap(),
            "`Tasks.Project`.`id` = 3"
        );
    }

    #[test]
    fn test_raw_pair_substitution() {
        let g = gen();
        let pair = WhereValue::List(vec![
            WhereValue::from("lower(name) = ? AND rank > ?"),
            WhereValue::from("bob"),
            WhereValue::from(5),
        ]);
        assert_eq!(
            g.where_items_query(&WhereValue::List(vec![pair]), &opts())
                .unwrap(),
            "lower(name) = 'bob' AND rank > 5"
        );
    }

    #[test]
    fn test_list_of_maps_is_and() {
        let g = gen();
        let cond = WhereValue::List(vec![
            where_map! { "a" => 1 },
            where_map! { "b" => 2 },
        ]);
        assert_eq!(
            g.where_items_query(&cond, &opts()).unwrap(),
            "`a` = 1 AND `b` = 2"
        );
    }

    #[test]
    fn test_fn_value_keeps_key() {
        let g = gen();
        assert_eq!(
            g.where_items_query(
                &where_map! { "created_at" => func("NOW", vec![]) },
                &opts()
            )
            .unwrap(),
            "`created_at` = NOW()"
        );
        // Any other expression node short-circuits past the key.
        assert_eq!(
            g.where_items_query(&where_map! { "x" => literal("1 = 1") }, &opts())
                .unwrap(),
            "1 = 1"
        );
    }

    #[test]
    fn test_prefixing() {
        let g = gen();
        let options = WhereOptions::default().prefix(Prefix::Table(TableRef::new("users")));
        assert_eq!(
            g.where_items_query(&where_map! { "id" => 1 }, &options).unwrap(),
            "`users`.`id` = 1"
        );
        let options = WhereOptions::default().prefix(Prefix::Literal("`u`".to_string()));
        assert_eq!(
            g.where_items_query(&where_map! { "id" => 1 }, &options).unwrap(),
            "`u`.`id` = 1"
        );
    }

    #[test]
    fn test_field_resolution_maps_attribute_to_column() {
        let g = gen();
        let model = ModelMeta::new("User", "users")
            .attribute(Attribute::new("fullName", SqlType::Text).field("full_name"));
        let options = WhereOptions::model(&model);
        assert_eq!(
            g.where_items_query(&where_map! { "fullName" => "x" }, &options)
                .unwrap(),
            "`full_name` = 'x'"
        );
    }

    #[test]
    fn test_json_path_traversal() {
        let g = QueryGenerator::new(PostgresDialect::new());
        let model =
            ModelMeta::new("Event", "events").attribute(Attribute::new("meta", SqlType::Jsonb));
        let options = WhereOptions::model(&model);

        assert_eq!(
            g.where_items_query(
                &where_map! { "meta" => where_map! { "kind" => "click" } },
                &options
            )
            .unwrap(),
            "(\"meta\"#>>'{kind}') = 'click'"
        );

        assert_eq!(
            g.where_items_query(
                &where_map! { "meta" => where_map! { "depth" => where_map! { "$gt" => 3 } } },
                &options
            )
            .unwrap(),
            "(\"meta\"#>>'{depth}')::double precision > 3"
        );

        assert_eq!(
            g.where_items_query(
                &where_map! { "meta.client.os" => "linux" },
                &options
            )
            .unwrap(),
            "(\"meta\"#>>'{client,os}') = 'linux'"
        );

        assert_eq!(
            g.where_items_query(
                &where_map! { "meta" => where_map! { "seen::int" => 1 } },
                &options
            )
            .unwrap(),
            "(\"meta\"#>>'{seen}')::int = 1"
        );
    }

    #[test]
    fn test_json_unsupported_dialect_errors() {
        let g = QueryGenerator::new(MssqlDialect::new());
        let model =
            ModelMeta::new("Event", "events").attribute(Attribute::new("meta", SqlType::Json));
        let options = WhereOptions::model(&model);
        let err = g
            .where_items_query(
                &where_map! { "meta" => where_map! { "kind" => "click" } },
                &options,
            )
            .unwrap_err();
        assert!(matches!(err, GeneratorError::UndefinedDialectMethod { .. }));
    }

    #[test]
    fn test_unknown_dollar_key_is_treated_as_column() {
        let g = gen();
        assert_eq!(
            g.where_items_query(&where_map! { "$weird" => 1 }, &opts())
                .unwrap(),
            "`$weird` = 1"
        );
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let g = gen();
        let err = g
            .where_items_query(
                &where_map! { "x" => where_map! { "$frobnicate" => 1 } },
                &opts(),
            )
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Validation(_)));
    }

    #[test]
    fn test_between_requires_two_values() {
        let g = gen();
        assert!(g
            .where_items_query(
                &where_map! { "x" => where_map! { "$between" => WhereValue::list([1]) } },
                &opts()
            )
            .is_err());
    }

    #[test]
    fn test_where_expr_node() {
        let g = gen();
        let cond = WhereValue::Expr(crate::expr::where_expr(col("rank"), ">=", val(10)));
        assert_eq!(
            g.where_items_query(&cond, &opts()).unwrap(),
            "`rank` >= 10"
        );
    }
}
