//! Model metadata consumed by the query generator.
//!
//! The generator never declares or validates models; it only reads the
//! metadata described here. Everything is plain data, built once and then
//! shared read-only (typically behind an `Arc`), which is what makes the
//! generator safe to call from any number of threads.

use serde::{Deserialize, Serialize};

use crate::cond::WhereValue;
use crate::types::SqlType;
use crate::value::ToSqlValue;

/// A table reference: a bare name or a schema-qualified one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// The table name.
    pub name: String,
    /// The schema, when qualified.
    pub schema: Option<String>,
    /// Separator between schema and name for dialects without schema
    /// support, where both collapse into a single identifier.
    pub delimiter: String,
}

impl TableRef {
    /// Creates an unqualified table reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            delimiter: ".".to_string(),
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the schema delimiter.
    #[must_use]
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Alias handling for [`quote_table`](crate::QueryGenerator::quote_table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAlias<'a> {
    /// No alias.
    None,
    /// Derive the alias from the table name itself.
    Auto,
    /// Use an explicit alias.
    Name(&'a str),
}

/// A model attribute and the column behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The attribute name used in conditions and attribute lists.
    pub name: String,
    /// The SQL column name; defaults to the attribute name.
    pub field: String,
    /// The column type.
    pub sql_type: SqlType,
    /// Whether NULL is allowed.
    pub allow_null: bool,
    /// Whether the column is auto-incrementing.
    pub auto_increment: bool,
}

impl Attribute {
    /// Creates an attribute whose column name equals the attribute name.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        let name = name.into();
        Self {
            field: name.clone(),
            name,
            sql_type,
            allow_null: true,
            auto_increment: false,
        }
    }

    /// Overrides the column name.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    /// Marks the column auto-incrementing.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// The cardinality and direction of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationKind {
    /// The foreign key lives on the source model.
    BelongsTo,
    /// The foreign key lives on the target model; at most one row.
    HasOne,
    /// The foreign key lives on the target model; many rows.
    HasMany,
    /// Both foreign keys live on a through model.
    BelongsToMany,
}

impl AssociationKind {
    /// Returns `true` for associations that can produce multiple target rows
    /// per source row.
    #[must_use]
    pub const fn is_multi(&self) -> bool {
        matches!(self, Self::HasMany | Self::BelongsToMany)
    }
}

/// An association between two models.
///
/// Models are referenced by name so that metadata stays acyclic; the actual
/// [`ModelMeta`] for the target travels with the include tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    /// The association kind.
    pub kind: AssociationKind,
    /// The target model name.
    pub target: String,
    /// The alias the association is known under.
    pub as_name: String,
    /// The foreign-key attribute name.
    pub identifier: String,
    /// The foreign-key column. For `BelongsTo` it lives on the source, for
    /// `HasOne`/`HasMany` on the target, for `BelongsToMany` on the through
    /// model pointing at the source.
    pub identifier_field: String,
    /// The through-model column pointing at the target (`BelongsToMany`
    /// only).
    pub foreign_identifier_field: Option<String>,
    /// The through model name (`BelongsToMany` only).
    pub through: Option<String>,
}

impl Association {
    /// Creates a `BelongsTo` association.
    pub fn belongs_to(
        target: impl Into<String>,
        as_name: impl Into<String>,
        identifier_field: impl Into<String>,
    ) -> Self {
        let identifier_field = identifier_field.into();
        Self {
            kind: AssociationKind::BelongsTo,
            target: target.into(),
            as_name: as_name.into(),
            identifier: identifier_field.clone(),
            identifier_field,
            foreign_identifier_field: None,
            through: None,
        }
    }

    /// Creates a `HasOne` association.
    pub fn has_one(
        target: impl Into<String>,
        as_name: impl Into<String>,
        identifier_field: impl Into<String>,
    ) -> Self {
        Self {
            kind: AssociationKind::HasOne,
            ..Self::belongs_to(target, as_name, identifier_field)
        }
    }

    /// Creates a `HasMany` association.
    pub fn has_many(
        target: impl Into<String>,
        as_name: impl Into<String>,
        identifier_field: impl Into<String>,
    ) -> Self {
        Self {
            kind: AssociationKind::HasMany,
            ..Self::belongs_to(target, as_name, identifier_field)
        }
    }

    /// Creates a `BelongsToMany` association through a join model.
    pub fn belongs_to_many(
        target: impl Into<String>,
        as_name: impl Into<String>,
        through: impl Into<String>,
        identifier_field: impl Into<String>,
        foreign_identifier_field: impl Into<String>,
    ) -> Self {
        Self {
            kind: AssociationKind::BelongsToMany,
            foreign_identifier_field: Some(foreign_identifier_field.into()),
            through: Some(through.into()),
            ..Self::belongs_to(target, as_name, identifier_field)
        }
    }

    /// Overrides the foreign-key attribute name when it differs from the
    /// column name.
    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }
}

/// Metadata for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    /// The model name, used as the default join alias.
    pub name: String,
    /// The table behind the model.
    pub table: TableRef,
    /// The attributes, in declaration order.
    pub attributes: Vec<Attribute>,
    /// The primary-key attribute names.
    pub primary_keys: Vec<String>,
    /// The association directory.
    pub associations: Vec<Association>,
}

impl ModelMeta {
    /// Creates an empty model.
    pub fn new(name: impl Into<String>, table: impl Into<TableRef>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            attributes: Vec::new(),
            primary_keys: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Marks an attribute as (part of) the primary key.
    #[must_use]
    pub fn primary_key(mut self, attribute: impl Into<String>) -> Self {
        self.primary_keys.push(attribute.into());
        self
    }

    /// Adds an association.
    #[must_use]
    pub fn association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Looks up an attribute by its SQL column name.
    #[must_use]
    pub fn attr_by_field(&self, field: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.field == field)
    }

    /// Returns the column name behind an attribute, falling back to the
    /// attribute name itself.
    #[must_use]
    pub fn field_for<'a>(&'a self, attribute: &'a str) -> &'a str {
        self.attr(attribute).map_or(attribute, |a| a.field.as_str())
    }

    /// Resolves an association by target model name and optional alias.
    #[must_use]
    pub fn get_association(&self, target: &str, as_name: Option<&str>) -> Option<&Association> {
        self.associations.iter().find(|a| {
            a.target == target && as_name.map_or(true, |alias| a.as_name == alias)
        })
    }

    /// Returns the first primary-key attribute, if any.
    #[must_use]
    pub fn primary_key_attr(&self) -> Option<&Attribute> {
        self.primary_keys.first().and_then(|pk| self.attr(pk))
    }

    /// Returns the first primary-key column name, falling back to `id`.
    #[must_use]
    pub fn primary_key_field(&self) -> &str {
        self.primary_key_attr().map_or("id", |a| a.field.as_str())
    }

    /// Lowers a primary-key scalar into a condition mapping, the implicit
    /// coercion applied before entering the condition compiler.
    pub fn where_for_pk<V: ToSqlValue>(&self, value: V) -> WhereValue {
        let pk = self
            .primary_keys
            .first()
            .map_or("id", String::as_str)
            .to_string();
        WhereValue::Map(vec![(pk, WhereValue::Value(value.to_sql_value()))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_model() -> ModelMeta {
        ModelMeta::new("User", "users")
            .attribute(Attribute::new("id", SqlType::BigInt).auto_increment())
            .attribute(Attribute::new("fullName", SqlType::Text).field("full_name"))
            .primary_key("id")
            .association(Association::has_many("Task", "Tasks", "user_id"))
    }

    #[test]
    fn test_attribute_lookup() {
        let model = user_model();
        assert_eq!(model.attr("fullName").unwrap().field, "full_name");
        assert_eq!(model.attr_by_field("full_name").unwrap().name, "fullName");
        assert_eq!(model.field_for("fullName"), "full_name");
        assert_eq!(model.field_for("unknown"), "unknown");
    }

    #[test]
    fn test_association_lookup() {
        let model = user_model();
        assert!(model.get_association("Task", Some("Tasks")).is_some());
        assert!(model.get_association("Task", None).is_some());
        assert!(model.get_association("Task", Some("Items")).is_none());
        assert!(model.get_association("Project", None).is_none());
    }

    #[test]
    fn test_where_for_pk() {
        let model = user_model();
        assert_eq!(
            model.where_for_pk(7_i64),
            WhereValue::Map(vec![(
                "id".to_string(),
                WhereValue::Value(crate::SqlValue::Int(7))
            )])
        );
    }

    #[test]
    fn test_multi_kinds() {
        assert!(AssociationKind::HasMany.is_multi());
        assert!(AssociationKind::BelongsToMany.is_multi());
        assert!(!AssociationKind::BelongsTo.is_multi());
    }
}
