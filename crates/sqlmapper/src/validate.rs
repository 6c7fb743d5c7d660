//! Structural validation of relationship specs.
//!
//! Everything a merge needs from the declarations and the database metadata
//! is checked here before any merge query is issued: the populate property
//! exists with the right shape and element type, join columns resolve on the
//! correct table with compatible id types, and the order-by clause only
//! names mapped columns of the related table.

use sqlmapper_core::{
    ConfigErrorKind, Connection, Entity, EntityMapping, Error, HostType, RelationDecl,
    RelationShape, Result, is_valid_identifier,
};
use sqlmapper_query::validate_order_by;

use crate::mapper::Mapper;
use crate::relationship::{RelationshipKind, RelationshipSpec};

impl<C: Connection> Mapper<C> {
    /// Validate `spec` against the mappings of `O` and `R`.
    ///
    /// [`merge`](Mapper::merge) runs this once per distinct spec; calling it
    /// directly surfaces configuration mistakes early.
    pub fn validate<O: Entity, R: Entity>(&self, spec: &RelationshipSpec<O, R>) -> Result<()> {
        spec.check()?;
        let owner = self.load_mapping::<O>()?;
        let related = self.load_mapping::<R>()?;
        let property = spec.populate_property_name().unwrap_or_default();

        let relation = owner.model().relation(property);
        if relation.is_none() && owner.model().property_decl(property).is_none() {
            return Err(Error::config(
                ConfigErrorKind::InvalidProperty,
                format!(
                    "Invalid property name {} for class {}",
                    property,
                    O::entity_name()
                ),
            ));
        }

        match spec.kind() {
            RelationshipKind::HasOne => {
                validate_has_one(spec, &owner, &related, relation, property)?;
            }
            RelationshipKind::HasMany => {
                validate_collection::<O, R>(relation, property)?;
                validate_has_many(spec, &owner, &related)?;
            }
            RelationshipKind::HasManyThrough => {
                validate_collection::<O, R>(relation, property)?;
                validate_through(spec)?;
            }
        }

        if let Some(order_by) = spec.order_by_clause() {
            validate_order_by(order_by, related.table(), None)?;
        }
        Ok(())
    }
}

fn validate_has_one<O: Entity, R: Entity>(
    spec: &RelationshipSpec<O, R>,
    owner: &EntityMapping<O>,
    related: &EntityMapping<R>,
    relation: Option<&RelationDecl<O>>,
    property: &str,
) -> Result<()> {
    let declared = match relation {
        Some(r) if r.shape() == RelationShape::One && r.target() == HostType::of::<R>() => None,
        Some(r) => Some(r.declared_type()),
        None => owner
            .model()
            .property_decl(property)
            .map(|d| d.host().simple_name()),
    };
    if let Some(declared) = declared {
        return Err(Error::config(
            ConfigErrorKind::TypeMismatch,
            format!(
                "property type conflict. property {}.{} is of type {} while type for hasOne relationship is {}",
                O::entity_name(),
                property,
                declared,
                R::entity_name()
            ),
        ));
    }

    let join_column = spec.join_column_owning_side_name().unwrap_or_default();
    let Some(join_prop) = owner.table().property_by_column(join_column) else {
        return Err(Error::config(
            ConfigErrorKind::InvalidJoinColumn,
            format!(
                "Invalid join column {} table {} for object {} does not have a column {}",
                join_column,
                owner.table().table_name(),
                O::entity_name(),
                join_column
            ),
        ));
    };

    let related_id = related.table().id();
    if join_prop.host != related_id.host {
        return Err(Error::config(
            ConfigErrorKind::TypeMismatch,
            format!(
                "Property type mismatch. join column {} property {}.{} is of type {} but the property being joined to {}.{} is of type {}",
                join_column,
                O::entity_name(),
                join_prop.property_name,
                join_prop.host,
                R::entity_name(),
                related_id.property_name,
                related_id.host
            ),
        ));
    }
    Ok(())
}

fn validate_has_many<O: Entity, R: Entity>(
    spec: &RelationshipSpec<O, R>,
    owner: &EntityMapping<O>,
    related: &EntityMapping<R>,
) -> Result<()> {
    let join_column = spec.join_column_many_side_name().unwrap_or_default();
    if join_column.is_empty() {
        return Err(spec.error(ConfigErrorKind::InvalidJoinColumn, "joinColumn cannot be null"));
    }
    if join_column.contains('.') {
        return Err(spec.error(
            ConfigErrorKind::InvalidJoinColumn,
            "Invalid joinColumn. It should have no table prefix",
        ));
    }
    let Some(join_prop) = related.table().property_by_column(join_column) else {
        return Err(join_error(format!(
            "Invalid join column {} . table {} for object {} does not have a column {}",
            join_column,
            related.table().table_name(),
            R::entity_name(),
            join_column
        )));
    };

    let owner_id = owner.table().id();
    if join_prop.host != owner_id.host {
        return Err(Error::config(
            ConfigErrorKind::TypeMismatch,
            format!(
                "Property type mismatch. join column {} property {}.{} is of type {} but the property being joined to {}.{} is of type {}",
                join_column,
                R::entity_name(),
                join_prop.property_name,
                join_prop.host,
                O::entity_name(),
                owner_id.property_name,
                owner_id.host
            ),
        ));
    }
    Ok(())
}

fn validate_through<O, R>(spec: &RelationshipSpec<O, R>) -> Result<()> {
    let invalid = |message: &str| spec.error(ConfigErrorKind::InvalidJoinColumn, message);
    let Some(through) = spec.through() else {
        return Err(invalid("throughJoinTable cannot be blank"));
    };
    for (label, value) in [
        ("throughJoinTable", &through.table),
        ("throughOwnerJoinColumn", &through.owner_join_column),
        ("throughRelatedJoinColumn", &through.related_join_column),
    ] {
        if value.is_empty() {
            return Err(invalid(&format!("{label} cannot be blank")));
        }
        if value.contains('.') {
            return Err(invalid(&format!(
                "Invalid {label} {value}. It should have no prefixes"
            )));
        }
        if !is_valid_identifier(value) {
            return Err(invalid(&format!("Invalid {label} {value}")));
        }
    }
    Ok(())
}

fn validate_collection<O: Entity, R: Entity>(
    relation: Option<&RelationDecl<O>>,
    property: &str,
) -> Result<()> {
    let relation = match relation {
        Some(r) if r.shape() == RelationShape::Many => r,
        _ => {
            return Err(Error::config(
                ConfigErrorKind::TypeMismatch,
                format!(
                    "property {}.{} is not a collection. hasMany() relationship requires it to be a collection",
                    O::entity_name(),
                    property
                ),
            ));
        }
    };

    if relation.target() != HostType::of::<R>() {
        return Err(Error::config(
            ConfigErrorKind::TypeMismatch,
            format!(
                "Collection generic type and hasMany relationship type mismatch. {}.{} has generic type {} while the hasMany relationship is of type {}",
                O::entity_name(),
                property,
                relation.target(),
                R::entity_name()
            ),
        ));
    }

    let mut representative = O::default();
    if !relation.is_initialized(&mut representative) {
        return Err(uninitialized::<O>(property));
    }
    Ok(())
}

pub(crate) fn uninitialized<O: Entity>(property: &str) -> Error {
    Error::config(
        ConfigErrorKind::UninitializedCollection,
        format!(
            "Query only works with initialized collections. Collection property {}.{} is not initialized",
            O::entity_name(),
            property
        ),
    )
}

fn join_error(message: String) -> Error {
    Error::config(ConfigErrorKind::InvalidJoinColumn, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Customer, Employee, MockConnection, Order, OrderLine, Skill};

    fn mapper() -> Mapper<MockConnection> {
        Mapper::new(MockConnection::new())
    }

    fn kind_of(result: Result<()>) -> ConfigErrorKind {
        result
            .expect_err("validation should fail")
            .config_kind()
            .expect("configuration error")
    }

    #[test]
    fn test_valid_specs_pass() {
        let mapper = mapper();
        mapper
            .validate(
                &RelationshipSpec::<Order, Customer>::has_one()
                    .join_column_owning_side("customer_long_id")
                    .populate_property("customer"),
            )
            .unwrap();
        mapper
            .validate(
                &RelationshipSpec::<Order, OrderLine>::has_many()
                    .join_column_many_side("ORDER_ID")
                    .populate_property("orderLines")
                    .order_by("order_line.order_line_id desc, order_line.product_id"),
            )
            .unwrap();
        mapper
            .validate(
                &RelationshipSpec::<Employee, Skill>::has_many_through(
                    "employee_skill",
                    "employee_id",
                    "skill_id",
                )
                .populate_property("skills"),
            )
            .unwrap();
        assert!(mapper.connection().statements().is_empty());
    }

    #[test]
    fn test_unknown_populate_property() {
        let err = mapper()
            .validate(
                &RelationshipSpec::<Order, Customer>::has_one()
                    .join_column_owning_side("customer_long_id")
                    .populate_property("buyer"),
            )
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidProperty));
        assert!(err.to_string().contains("Invalid property name buyer for class Order"));
    }

    #[test]
    fn test_has_one_property_type_conflict() {
        let mapper = mapper();
        let err = mapper
            .validate(
                &RelationshipSpec::<Order, Customer>::has_one()
                    .join_column_owning_side("customer_long_id")
                    .populate_property("status"),
            )
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::TypeMismatch));
        assert!(err.to_string().contains("property type conflict. property Order.status"));

        let kind = kind_of(
            mapper.validate(
                &RelationshipSpec::<Order, Customer>::has_one()
                    .join_column_owning_side("customer_long_id")
                    .populate_property("orderLines"),
            ),
        );
        assert_eq!(kind, ConfigErrorKind::TypeMismatch);
    }

    #[test]
    fn test_has_one_join_column_checks() {
        let mapper = mapper();
        let err = mapper
            .validate(
                &RelationshipSpec::<Order, Customer>::has_one()
                    .join_column_owning_side("customer_id")
                    .populate_property("customer"),
            )
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidJoinColumn));
        assert!(err.to_string().contains("table orders for object Order"));

        let err = mapper
            .validate(
                &RelationshipSpec::<Order, Customer>::has_one()
                    .join_column_owning_side("status")
                    .populate_property("customer"),
            )
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::TypeMismatch));
        assert!(err.to_string().contains("Property type mismatch. join column status"));
    }

    #[test]
    fn test_has_many_requires_collection_of_related_type() {
        let mapper = mapper();
        let err = mapper
            .validate(
                &RelationshipSpec::<Order, Customer>::has_many()
                    .join_column_many_side("customer_id")
                    .populate_property("customer"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("Order.customer is not a collection"));

        let err = mapper
            .validate(
                &RelationshipSpec::<Order, Customer>::has_many()
                    .join_column_many_side("customer_id")
                    .populate_property("orderLines"),
            )
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::TypeMismatch));
        assert!(err.to_string().contains("Collection generic type and hasMany relationship type mismatch"));
    }

    #[test]
    fn test_has_many_uninitialized_collection() {
        let kind = kind_of(
            mapper().validate(
                &RelationshipSpec::<Order, OrderLine>::has_many()
                    .join_column_many_side("order_id")
                    .populate_property("lazyLines"),
            ),
        );
        assert_eq!(kind, ConfigErrorKind::UninitializedCollection);
    }

    #[test]
    fn test_has_many_join_column_checks() {
        let mapper = mapper();
        let spec = |column: &str| {
            RelationshipSpec::<Order, OrderLine>::has_many()
                .join_column_many_side(column)
                .populate_property("orderLines")
        };

        let err = mapper.validate(&spec("order_line.order_id")).unwrap_err();
        assert!(err.to_string().contains("It should have no table prefix"));
        assert!(err.to_string().contains("Order HAS_MANY OrderLine"));

        let err = mapper.validate(&spec("order_no")).unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidJoinColumn));
        assert!(err.to_string().contains("table order_line for object OrderLine"));

        let err = mapper.validate(&spec("product_id")).unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::TypeMismatch));
        assert!(err.to_string().contains("OrderLine.productId is of type i32"));
    }

    #[test]
    fn test_through_join_identifiers() {
        let mapper = mapper();
        let spec = |table: &str, owner: &str| {
            RelationshipSpec::<Employee, Skill>::has_many_through(table, owner, "skill_id")
                .populate_property("skills")
        };

        let err = mapper.validate(&spec("", "employee_id")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: throughJoinTable cannot be blank (relationship Employee HAS_MANY_THROUGH Skill)"
        );

        let err = mapper.validate(&spec("hr.employee_skill", "employee_id")).unwrap_err();
        assert!(err.to_string().contains("It should have no prefixes"));

        let kind = kind_of(mapper.validate(&spec("employee_skill", "employee id")));
        assert_eq!(kind, ConfigErrorKind::InvalidJoinColumn);
    }

    #[test]
    fn test_order_by_must_name_related_columns() {
        let mapper = mapper();
        let spec = |order_by: &str| {
            RelationshipSpec::<Order, OrderLine>::has_many()
                .join_column_many_side("order_id")
                .populate_property("orderLines")
                .order_by(order_by)
        };

        for bad in ["order_line_id", "orders.status", "order_line.quantity", ""] {
            let kind = kind_of(mapper.validate(&spec(bad)));
            assert_eq!(kind, ConfigErrorKind::InvalidOrderBy, "order by {bad:?}");
        }
    }

    #[test]
    fn test_spec_misuse_reported_first() {
        let kind = kind_of(
            mapper().validate(
                &RelationshipSpec::<Order, Customer>::has_one()
                    .join_column_many_side("customer_id")
                    .populate_property("customer"),
            ),
        );
        assert_eq!(kind, ConfigErrorKind::InvalidRelationship);
    }
}
