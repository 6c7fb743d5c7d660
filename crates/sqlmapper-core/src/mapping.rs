//! Resolved table mappings.
//!
//! A [`TableMapping`] is the structural link between a struct and a table:
//! which property lives in which column, which property is the id, and which
//! properties carry audit/version roles. It is built once per type by the
//! schema resolver from the entity declaration and the live column metadata,
//! then shared read-only.

use std::collections::HashMap;
use std::sync::Arc;

use heck::ToSnakeCase;

use crate::entity::{Entity, EntityModel, Role};
use crate::error::{ConfigErrorKind, Error, Result};
use crate::types::{HostType, SqlType};
use crate::value::Value;

/// Snake-case column name derived from a property name.
///
/// # Examples
///
/// ```
/// use sqlmapper_core::mapping::column_name_for;
///
/// assert_eq!(column_name_for("customerId"), "customer_id");
/// assert_eq!(column_name_for("order_date"), "order_date");
/// ```
pub fn column_name_for(property: &str) -> String {
    property.to_snake_case()
}

/// Default table name for a struct simple name (`OrderLine` -> `order_line`).
pub fn table_name_for(entity_name: &str) -> String {
    entity_name.to_snake_case()
}

/// One mapped property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMapping {
    /// Property name as declared
    pub property_name: String,
    /// Lower-cased column name
    pub column_name: String,
    /// Host value type (`Option<T>` normalized to `T`)
    pub host: HostType,
    /// SQL type from the column metadata
    pub sql_type: SqlType,
}

impl PropertyMapping {
    pub fn new(
        property_name: impl Into<String>,
        column_name: impl AsRef<str>,
        host: HostType,
        sql_type: SqlType,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            column_name: column_name.as_ref().to_ascii_lowercase(),
            host,
            sql_type,
        }
    }
}

/// Structural mapping between a struct type and a table.
#[derive(Debug, Clone)]
pub struct TableMapping {
    entity_name: String,
    table_name: String,
    properties: Vec<PropertyMapping>,
    id_index: usize,
    id_auto_increment: bool,
    roles: HashMap<Role, usize>,
    by_property: HashMap<String, usize>,
    by_column: HashMap<String, usize>,
}

impl TableMapping {
    /// Assemble a mapping, enforcing its invariants.
    ///
    /// Errors when two properties share a name or column, when `id_property`
    /// is not among `properties`, or when a role names an unmapped property
    /// or is claimed twice.
    pub fn new(
        entity_name: impl Into<String>,
        table_name: impl AsRef<str>,
        properties: Vec<PropertyMapping>,
        id_property: &str,
        id_auto_increment: bool,
        roles: &[(Role, &str)],
    ) -> Result<Self> {
        let entity_name = entity_name.into();
        let table_name = table_name.as_ref().to_ascii_lowercase();

        let mut by_property = HashMap::with_capacity(properties.len());
        let mut by_column = HashMap::with_capacity(properties.len());
        for (index, prop) in properties.iter().enumerate() {
            if by_property.insert(prop.property_name.clone(), index).is_some() {
                return Err(Error::config(
                    ConfigErrorKind::InvalidProperty,
                    format!(
                        "{entity_name} declares property {} more than once",
                        prop.property_name
                    ),
                ));
            }
            if let Some(other) = by_column.insert(prop.column_name.clone(), index) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateColumn,
                    format!(
                        "{entity_name}: properties {} and {} both map to column {}",
                        properties[other].property_name, prop.property_name, prop.column_name
                    ),
                ));
            }
        }

        let id_index = *by_property.get(id_property).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::MissingId,
                format!(
                    "{entity_name}: id property {id_property} does not have a corresponding column in table {table_name}"
                ),
            )
        })?;

        let mut role_map = HashMap::new();
        for (role, property) in roles {
            let index = *by_property.get(*property).ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::UnknownColumn,
                    format!(
                        "{entity_name}.{property} is marked {} but has no corresponding column in table {table_name}",
                        role.name()
                    ),
                )
            })?;
            if role_map.insert(*role, index).is_some() {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateRole,
                    format!(
                        "{entity_name} has more than one property marked {}",
                        role.name()
                    ),
                ));
            }
        }

        Ok(Self {
            entity_name,
            table_name,
            properties,
            id_index,
            id_auto_increment,
            roles: role_map,
            by_property,
            by_column,
        })
    }

    /// Struct simple name.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn properties(&self) -> &[PropertyMapping] {
        &self.properties
    }

    pub fn id(&self) -> &PropertyMapping {
        &self.properties[self.id_index]
    }

    pub fn id_index(&self) -> usize {
        self.id_index
    }

    pub fn id_property_name(&self) -> &str {
        &self.id().property_name
    }

    pub fn id_column_name(&self) -> &str {
        &self.id().column_name
    }

    pub fn is_id_auto_increment(&self) -> bool {
        self.id_auto_increment
    }

    pub fn property(&self, name: &str) -> Option<&PropertyMapping> {
        self.property_index(name).map(|i| &self.properties[i])
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.by_property.get(name).copied()
    }

    /// Property mapped to `column`, compared case-insensitively.
    pub fn property_by_column(&self, column: &str) -> Option<&PropertyMapping> {
        self.by_column
            .get(&column.to_ascii_lowercase())
            .map(|i| &self.properties[*i])
    }

    pub fn column_name(&self, property: &str) -> Option<&str> {
        self.property(property).map(|p| p.column_name.as_str())
    }

    pub fn host_type(&self, property: &str) -> Option<HostType> {
        self.property(property).map(|p| p.host)
    }

    pub fn role(&self, role: Role) -> Option<&PropertyMapping> {
        self.role_index(role).map(|i| &self.properties[i])
    }

    pub fn role_index(&self, role: Role) -> Option<usize> {
        self.roles.get(&role).copied()
    }

    pub fn has_versioning(&self) -> bool {
        self.roles.contains_key(&Role::Version)
    }
}

/// A [`TableMapping`] bound to the accessors of its entity type.
///
/// Property `i` of the table mapping is read and written through
/// declaration `decl_index[i]` of the model.
pub struct EntityMapping<E> {
    table: Arc<TableMapping>,
    model: EntityModel<E>,
    decl_index: Vec<usize>,
}

impl<E: Entity> EntityMapping<E> {
    /// Bind `table` to `model`. Every mapped property must be declared.
    pub fn new(table: TableMapping, model: EntityModel<E>) -> Result<Self> {
        let decl_index = table
            .properties()
            .iter()
            .map(|prop| {
                model
                    .properties()
                    .iter()
                    .position(|d| d.name() == prop.property_name)
                    .ok_or_else(|| {
                        Error::config(
                            ConfigErrorKind::InvalidProperty,
                            format!(
                                "Invalid property name {} for class {}",
                                prop.property_name,
                                table.entity_name()
                            ),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            table: Arc::new(table),
            model,
            decl_index,
        })
    }
}

impl<E> EntityMapping<E> {
    pub fn table(&self) -> &TableMapping {
        &self.table
    }

    /// Shared handle on the table mapping, independent of `E`.
    pub fn table_arc(&self) -> Arc<TableMapping> {
        Arc::clone(&self.table)
    }

    pub fn model(&self) -> &EntityModel<E> {
        &self.model
    }

    /// Read mapped property `index` of `entity`.
    pub fn get(&self, entity: &E, index: usize) -> Value {
        self.model.properties()[self.decl_index[index]].get(entity)
    }

    /// Assign mapped property `index` of `entity` from a converted value.
    pub fn set(&self, entity: &mut E, index: usize, value: &Value) -> Result<()> {
        self.model.properties()[self.decl_index[index]].set(entity, value)
    }

    pub fn id_value(&self, entity: &E) -> Value {
        self.get(entity, self.table.id_index())
    }

    /// Read a mapped property by name.
    pub fn get_by_name(&self, entity: &E, property: &str) -> Option<Value> {
        self.table
            .property_index(property)
            .map(|i| self.get(entity, i))
    }
}

impl<E> std::fmt::Debug for EntityMapping<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMapping")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
