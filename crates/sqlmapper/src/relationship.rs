//! Relationship merge specifications.
//!
//! A [`RelationshipSpec`] says how instances of a related type `R` are
//! attached to a list of owners `O`: which relationship kind, through which
//! join column (or join table), into which owner property, and in what
//! order. Specs are cheap, transient values; the SQL they produce is cached
//! by the mapper under the spec's [`fingerprint`](RelationshipSpec::fingerprint).
//!
//! ```ignore
//! let spec = RelationshipSpec::<Order, Customer>::has_one()
//!     .join_column_owning_side("customer_id")
//!     .populate_property("customer");
//! mapper.merge(&spec, &mut orders)?;
//! ```

use std::fmt;
use std::marker::PhantomData;

use sqlmapper_core::{ConfigErrorKind, Error, Result, simple_type_name};

/// How the related rows are reached from the owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// Owner table holds a join column pointing at the related id.
    HasOne,
    /// Related table holds a join column pointing at the owner id.
    HasMany,
    /// A join table links owner ids to related ids.
    HasManyThrough,
}

impl RelationshipKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::HasOne => "HAS_ONE",
            RelationshipKind::HasMany => "HAS_MANY",
            RelationshipKind::HasManyThrough => "HAS_MANY_THROUGH",
        }
    }

    /// Whether the populated property is a collection.
    pub const fn is_many(self) -> bool {
        !matches!(self, RelationshipKind::HasOne)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join table description of a `HAS_MANY_THROUGH` relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughJoin {
    pub table: String,
    pub owner_join_column: String,
    pub related_join_column: String,
}

/// How to merge `R` instances into a list of `O` owners.
pub struct RelationshipSpec<O, R> {
    kind: RelationshipKind,
    join_column_owning_side: Option<String>,
    join_column_many_side: Option<String>,
    through: Option<ThroughJoin>,
    populate_property: Option<String>,
    order_by: Option<String>,
    misuse: Vec<String>,
    _marker: PhantomData<fn() -> (O, R)>,
}

impl<O, R> RelationshipSpec<O, R> {
    fn new(kind: RelationshipKind) -> Self {
        Self {
            kind,
            join_column_owning_side: None,
            join_column_many_side: None,
            through: None,
            populate_property: None,
            order_by: None,
            misuse: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Each owner has at most one `R`, referenced by a join column on the
    /// owner's table.
    pub fn has_one() -> Self {
        Self::new(RelationshipKind::HasOne)
    }

    /// Each owner has many `R`, which reference it by a join column on the
    /// related table.
    pub fn has_many() -> Self {
        Self::new(RelationshipKind::HasMany)
    }

    /// Owners and `R` are linked through `join_table`.
    pub fn has_many_through(
        join_table: &str,
        owner_join_column: &str,
        related_join_column: &str,
    ) -> Self {
        let mut spec = Self::new(RelationshipKind::HasManyThrough);
        spec.through = Some(ThroughJoin {
            table: normalize(join_table),
            owner_join_column: normalize(owner_join_column),
            related_join_column: normalize(related_join_column),
        });
        spec
    }

    /// Join column on the owner's table (`HAS_ONE` only).
    pub fn join_column_owning_side(mut self, column: &str) -> Self {
        if self.kind != RelationshipKind::HasOne {
            self.misuse.push(format!(
                "joinColumnOwningSide() can only be used with hasOne relationships, not {}",
                self.kind
            ));
        } else if column.trim().is_empty() {
            self.misuse
                .push("joinColumnOwningSide() cannot be blank".to_string());
        }
        self.join_column_owning_side = Some(normalize(column));
        self
    }

    /// Join column on the related table (`HAS_MANY` only).
    pub fn join_column_many_side(mut self, column: &str) -> Self {
        if self.kind != RelationshipKind::HasMany {
            self.misuse.push(format!(
                "joinColumnManySide() can only be used with hasMany relationships, not {}",
                self.kind
            ));
        } else if column.trim().is_empty() {
            self.misuse
                .push("joinColumnManySide() cannot be blank".to_string());
        }
        self.join_column_many_side = Some(normalize(column));
        self
    }

    /// Owner property that receives the related instances.
    pub fn populate_property(mut self, property: &str) -> Self {
        if property.trim().is_empty() {
            self.misuse
                .push("populateProperty() cannot be blank".to_string());
        }
        self.populate_property = Some(property.trim().to_string());
        self
    }

    /// Order of related instances within each collection, written as
    /// `table.column [asc|desc], ...` against the related table.
    pub fn order_by(mut self, order_by: &str) -> Self {
        if self.kind == RelationshipKind::HasOne {
            self.misuse.push(
                "orderBy() not supported for hasOne relationships; order is dictated by the merge list"
                    .to_string(),
            );
        }
        self.order_by = Some(order_by.trim().to_string());
        self
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    pub fn join_column_owning_side_name(&self) -> Option<&str> {
        self.join_column_owning_side.as_deref()
    }

    pub fn join_column_many_side_name(&self) -> Option<&str> {
        self.join_column_many_side.as_deref()
    }

    pub fn through(&self) -> Option<&ThroughJoin> {
        self.through.as_ref()
    }

    pub fn populate_property_name(&self) -> Option<&str> {
        self.populate_property.as_deref()
    }

    pub fn order_by_clause(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    /// Report builder misuse and missing required settings.
    pub fn check(&self) -> Result<()> {
        let invalid = |message: &str| self.error(ConfigErrorKind::InvalidRelationship, message);
        if let Some(first) = self.misuse.first() {
            return Err(invalid(first.as_str()));
        }
        if self.populate_property.is_none() {
            return Err(invalid(&format!(
                "{} relationship requires populateProperty()",
                self.kind
            )));
        }
        match self.kind {
            RelationshipKind::HasOne if self.join_column_owning_side.is_none() => Err(invalid(
                "hasOne relationship requires joinColumnOwningSide()",
            )),
            RelationshipKind::HasMany if self.join_column_many_side.is_none() => Err(invalid(
                "hasMany relationship requires joinColumnManySide()",
            )),
            _ => Ok(()),
        }
    }

    /// `Order HAS_ONE Customer`.
    pub fn label(&self) -> String {
        format!(
            "{} {} {}",
            simple_type_name(std::any::type_name::<O>()),
            self.kind,
            simple_type_name(std::any::type_name::<R>())
        )
    }

    /// Configuration error attributed to this relationship.
    pub(crate) fn error(&self, kind: ConfigErrorKind, message: &str) -> Error {
        Error::config(kind, format!("{message} (relationship {})", self.label()))
    }

    /// Cache key of this spec, unique per type pair, setting and mapper.
    pub fn fingerprint(&self, mapper_id: u64) -> String {
        let (table, owner_col, related_col) = match &self.through {
            Some(t) => (
                t.table.as_str(),
                t.owner_join_column.as_str(),
                t.related_join_column.as_str(),
            ),
            None => ("", "", ""),
        };
        [
            std::any::type_name::<O>(),
            std::any::type_name::<R>(),
            self.kind.as_str(),
            self.join_column_owning_side.as_deref().unwrap_or(""),
            self.join_column_many_side.as_deref().unwrap_or(""),
            table,
            owner_col,
            related_col,
            self.populate_property.as_deref().unwrap_or(""),
            self.order_by.as_deref().unwrap_or(""),
            &mapper_id.to_string(),
        ]
        .join("-")
    }
}

impl<O, R> Clone for RelationshipSpec<O, R> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            join_column_owning_side: self.join_column_owning_side.clone(),
            join_column_many_side: self.join_column_many_side.clone(),
            through: self.through.clone(),
            populate_property: self.populate_property.clone(),
            order_by: self.order_by.clone(),
            misuse: self.misuse.clone(),
            _marker: PhantomData,
        }
    }
}

impl<O, R> fmt::Debug for RelationshipSpec<O, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationshipSpec")
            .field("owner", &std::any::type_name::<O>())
            .field("related", &std::any::type_name::<R>())
            .field("kind", &self.kind)
            .field("join_column_owning_side", &self.join_column_owning_side)
            .field("join_column_many_side", &self.join_column_many_side)
            .field("through", &self.through)
            .field("populate_property", &self.populate_property)
            .field("order_by", &self.order_by)
            .finish_non_exhaustive()
    }
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Order;
    struct Customer;

    #[test]
    fn test_has_one_spec() {
        let spec = RelationshipSpec::<Order, Customer>::has_one()
            .join_column_owning_side(" Customer_ID ")
            .populate_property("customer");
        assert!(spec.check().is_ok());
        assert_eq!(spec.join_column_owning_side_name(), Some("customer_id"));
        assert_eq!(spec.kind(), RelationshipKind::HasOne);
    }

    #[test]
    fn test_misuse_is_reported() {
        let spec = RelationshipSpec::<Order, Customer>::has_many()
            .join_column_owning_side("customer_id")
            .populate_property("customers");
        let err = spec.check().unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidRelationship));
        assert!(err.to_string().contains("joinColumnOwningSide"));

        let spec = RelationshipSpec::<Order, Customer>::has_one()
            .join_column_many_side("order_id")
            .populate_property("customer");
        assert!(spec.check().is_err());

        let spec = RelationshipSpec::<Order, Customer>::has_one()
            .join_column_owning_side("customer_id")
            .populate_property("customer")
            .order_by("customer.id");
        assert!(
            spec.check()
                .unwrap_err()
                .to_string()
                .contains("order is dictated by the merge list")
        );
    }

    #[test]
    fn test_missing_required_settings() {
        let spec = RelationshipSpec::<Order, Customer>::has_one().populate_property("customer");
        assert!(spec.check().unwrap_err().to_string().contains("joinColumnOwningSide"));

        let spec = RelationshipSpec::<Order, Customer>::has_many().join_column_many_side("order_id");
        assert!(spec.check().unwrap_err().to_string().contains("populateProperty"));

        let spec = RelationshipSpec::<Order, Customer>::has_many()
            .join_column_many_side(" ")
            .populate_property("lines");
        assert!(spec.check().unwrap_err().to_string().contains("cannot be blank"));
    }

    #[test]
    fn test_errors_name_both_types() {
        let spec = RelationshipSpec::<Order, Customer>::has_one().populate_property("customer");
        assert_eq!(spec.label(), "Order HAS_ONE Customer");
        assert!(
            spec.check()
                .unwrap_err()
                .to_string()
                .ends_with("requires joinColumnOwningSide() (relationship Order HAS_ONE Customer)")
        );

        let spec = RelationshipSpec::<Order, Customer>::has_many()
            .join_column_many_side("")
            .populate_property("customers");
        let message = spec.check().unwrap_err().to_string();
        assert!(message.contains("joinColumnManySide() cannot be blank"));
        assert!(message.contains("Order HAS_MANY Customer"));
    }

    #[test]
    fn test_through_is_normalized() {
        let spec = RelationshipSpec::<Order, Customer>::has_many_through(
            " Employee_Skill ",
            "EMPLOYEE_ID",
            "skill_id",
        )
        .populate_property("skills");
        let through = spec.through().unwrap();
        assert_eq!(through.table, "employee_skill");
        assert_eq!(through.owner_join_column, "employee_id");
        assert!(spec.check().is_ok());
    }

    #[test]
    fn test_fingerprint_distinguishes_settings_and_mappers() {
        let a = RelationshipSpec::<Order, Customer>::has_many()
            .join_column_many_side("order_id")
            .populate_property("lines");
        let b = a.clone().order_by("order_line.id");

        assert_eq!(a.fingerprint(1), a.clone().fingerprint(1));
        assert_ne!(a.fingerprint(1), a.fingerprint(2));
        assert_ne!(a.fingerprint(1), b.fingerprint(1));
        assert!(a.fingerprint(7).ends_with("-7"));
        assert!(a.fingerprint(7).contains("HAS_MANY"));
    }
}
