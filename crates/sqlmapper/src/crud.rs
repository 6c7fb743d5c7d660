//! Single-table CRUD on mapped structs.
//!
//! Insert, update and delete statements are generated from the table
//! mapping once per type and cached on the mapper. Inserts and updates fill
//! in the audit properties (created/updated on/by) and maintain the
//! optimistic-locking version when the type declares one.

use std::any::TypeId;
use std::sync::Arc;

use chrono::Utc;
use sqlmapper_core::{
    ConfigErrorKind, Connection, Entity, EntityMapping, Error, OptimisticLockError, Result,
    Role, Value,
};
use sqlmapper_query::{columns_sql, find_columns_sql};

use crate::mapper::Mapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StatementKind {
    Insert,
    Update,
    Delete,
    FindById,
    Columns,
}

/// Cache key of a generated per-type statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StatementKey {
    entity: TypeId,
    kind: StatementKind,
}

impl StatementKey {
    fn of<E: 'static>(kind: StatementKind) -> Self {
        Self {
            entity: TypeId::of::<E>(),
            kind,
        }
    }
}

impl<C: Connection> Mapper<C> {
    /// Insert `entity`.
    ///
    /// An auto-increment id must be unset (null or zero) and is assigned
    /// from the generated key; any other id must be set. Created/updated
    /// timestamps and operators are filled in and the version starts at 1.
    pub fn insert<E: Entity>(&self, entity: &mut E) -> Result<()> {
        let mapping = self.load_mapping::<E>()?;
        let table = mapping.table();
        let id = mapping.id_value(entity);

        if table.is_id_auto_increment() {
            if !(id.is_null() || id.as_i64() == Some(0)) {
                return Err(invalid_state(format!(
                    "For insert() the property {}.{} has to be null since this insert is for an object whose id is auto increment.",
                    table.entity_name(),
                    table.id_property_name()
                )));
            }
        } else if id.is_null() {
            return Err(invalid_state(format!(
                "For insert() the property {}.{} cannot be null since it is not an auto increment id",
                table.entity_name(),
                table.id_property_name()
            )));
        }

        let now = Value::TimestampTz(Utc::now().timestamp_micros());
        self.assign_role(&mapping, entity, Role::CreatedOn, &now)?;
        self.assign_role(&mapping, entity, Role::UpdatedOn, &now)?;
        if let Some(operator) = self.operator() {
            self.assign_role(&mapping, entity, Role::CreatedBy, &operator)?;
            self.assign_role(&mapping, entity, Role::UpdatedBy, &operator)?;
        }
        self.assign_role(&mapping, entity, Role::Version, &Value::Int(1))?;

        let skip_id = table.is_id_auto_increment();
        let sql = self.statement(StatementKey::of::<E>(StatementKind::Insert), || {
            let columns: Vec<&str> = table
                .properties()
                .iter()
                .enumerate()
                .filter(|(i, _)| !(skip_id && *i == table.id_index()))
                .map(|(_, p)| p.column_name.as_str())
                .collect();
            let placeholders: Vec<String> = (1..=columns.len())
                .map(|i| self.connection().dialect().placeholder(i))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.qualified(table.table_name()),
                columns.join(", "),
                placeholders.join(", ")
            )
        });
        let params: Vec<Value> = (0..table.properties().len())
            .filter(|i| !(skip_id && *i == table.id_index()))
            .map(|i| mapping.get(entity, i))
            .collect();

        tracing::debug!(sql = %sql, entity = table.entity_name(), "Inserting record");
        if skip_id {
            let generated = self.connection().insert(&sql, &params)?;
            self.assign(&mapping, entity, table.id_index(), &Value::BigInt(generated))?;
        } else {
            self.connection().execute(&sql, &params)?;
        }
        Ok(())
    }

    /// Update every mapped column of `entity` except id and created-on/by.
    ///
    /// With versioning, the update only matches the stored version; a miss
    /// is [`Error::OptimisticLock`] and a hit increments the in-memory
    /// version.
    pub fn update<E: Entity>(&self, entity: &mut E) -> Result<u64> {
        let mapping = self.load_mapping::<E>()?;
        let table = mapping.table();
        let id = mapping.id_value(entity);
        if id.is_null() {
            return Err(invalid_state(format!(
                "{}.{} cannot be null for update()",
                table.entity_name(),
                table.id_property_name()
            )));
        }

        let version_index = table.role_index(Role::Version);
        let version = match version_index {
            Some(index) => {
                let current = mapping.get(entity, index);
                let Some(n) = current.as_i64() else {
                    return Err(invalid_state(format!(
                        "{}.{} is configured for versioning so it cannot be null",
                        table.entity_name(),
                        table.properties()[index].property_name
                    )));
                };
                Some((index, current, n))
            }
            None => None,
        };

        let now = Value::TimestampTz(Utc::now().timestamp_micros());
        self.assign_role(&mapping, entity, Role::UpdatedOn, &now)?;
        if let Some(operator) = self.operator() {
            self.assign_role(&mapping, entity, Role::UpdatedBy, &operator)?;
        }

        let set_indexes = update_columns(&mapping);
        let sql = self.statement(StatementKey::of::<E>(StatementKind::Update), || {
            let dialect = self.connection().dialect();
            let mut n = 0;
            let mut next = || {
                n += 1;
                dialect.placeholder(n)
            };
            let mut assignments: Vec<String> = set_indexes
                .iter()
                .map(|i| format!("{} = {}", table.properties()[*i].column_name, next()))
                .collect();
            if let Some(index) = version_index {
                assignments.push(format!(
                    "{} = {}",
                    table.properties()[index].column_name,
                    next()
                ));
            }
            let mut sql = format!(
                "UPDATE {} SET {} WHERE {} = {}",
                self.qualified(table.table_name()),
                assignments.join(", "),
                table.id_column_name(),
                next()
            );
            if let Some(index) = version_index {
                sql.push_str(&format!(
                    " AND {} = {}",
                    table.properties()[index].column_name,
                    next()
                ));
            }
            sql
        });

        let mut params: Vec<Value> = set_indexes.iter().map(|i| mapping.get(entity, *i)).collect();
        if let Some((_, _, n)) = &version {
            params.push(Value::BigInt(n + 1));
        }
        params.push(id.clone());
        if let Some((_, current, _)) = &version {
            params.push(current.clone());
        }

        tracing::debug!(sql = %sql, entity = table.entity_name(), "Updating record");
        let count = self.connection().execute(&sql, &params)?;

        if let Some((index, current, n)) = version {
            if count == 0 {
                return Err(Error::OptimisticLock(OptimisticLockError {
                    entity: table.entity_name().to_string(),
                    id: id.to_string(),
                    version: current.to_string(),
                }));
            }
            self.assign(&mapping, entity, index, &Value::BigInt(n + 1))?;
        }
        Ok(count)
    }

    /// Delete the row of `entity` by id.
    pub fn delete<E: Entity>(&self, entity: &E) -> Result<u64> {
        let mapping = self.load_mapping::<E>()?;
        let id = mapping.id_value(entity);
        if id.is_null() {
            return Err(invalid_state(format!(
                "{}.{} cannot be null for delete()",
                mapping.table().entity_name(),
                mapping.table().id_property_name()
            )));
        }
        self.delete_row(&mapping, id)
    }

    /// Delete the row of type `E` with the given id.
    pub fn delete_by_id<E: Entity>(&self, id: impl Into<Value>) -> Result<u64> {
        let mapping = self.load_mapping::<E>()?;
        let id = id.into();
        if id.is_null() {
            return Err(invalid_state(format!(
                "id for delete_by_id() of {} cannot be null",
                E::entity_name()
            )));
        }
        self.delete_row(&mapping, id)
    }

    fn delete_row<E: Entity>(&self, mapping: &EntityMapping<E>, id: Value) -> Result<u64> {
        let table = mapping.table();
        let sql = self.statement(StatementKey::of::<E>(StatementKind::Delete), || {
            format!(
                "DELETE FROM {} WHERE {} = {}",
                self.qualified(table.table_name()),
                table.id_column_name(),
                self.connection().dialect().placeholder(1)
            )
        });
        tracing::debug!(sql = %sql, entity = table.entity_name(), "Deleting record");
        self.connection().execute(&sql, &[id])
    }

    /// Load the row of type `E` with the given id.
    pub fn find_by_id<E: Entity>(&self, id: impl Into<Value>) -> Result<Option<E>> {
        let mapping = self.load_mapping::<E>()?;
        let table = mapping.table();
        let sql = self.statement(StatementKey::of::<E>(StatementKind::FindById), || {
            format!(
                "SELECT {} FROM {} WHERE {} = {}",
                find_columns_sql(table),
                self.qualified(table.table_name()),
                table.id_column_name(),
                self.connection().dialect().placeholder(1)
            )
        });
        match self.connection().query_one(&sql, &[id.into()])? {
            Some(row) => {
                sqlmapper_query::materialize(&row, &mapping, "", self.conversion_service())
            }
            None => Ok(None),
        }
    }

    /// Load all rows of type `E` whose `property` equals `value` (or is
    /// null, for `Value::Null`), optionally ordered by another property.
    pub fn find_by_property<E: Entity>(
        &self,
        property: &str,
        value: impl Into<Value>,
        order_by_property: Option<&str>,
    ) -> Result<Vec<E>> {
        let mapping = self.load_mapping::<E>()?;
        let table = mapping.table();
        let column = property_column(&mapping, property)?;
        let value = value.into();

        let mut sql = format!(
            "SELECT {} FROM {} WHERE ",
            self.columns_sql::<E>()?,
            self.qualified(table.table_name())
        );
        let params = if value.is_null() {
            sql.push_str(&format!("{column} IS NULL"));
            Vec::new()
        } else {
            sql.push_str(&format!(
                "{} = {}",
                column,
                self.connection().dialect().placeholder(1)
            ));
            vec![value]
        };
        if let Some(order_by) = order_by_property {
            sql.push_str(&format!(" ORDER BY {} ASC", property_column(&mapping, order_by)?));
        }
        self.find_rows(&mapping, &sql, &params)
    }

    /// Load all rows of type `E`, optionally ordered by a property.
    pub fn find_all<E: Entity>(&self, order_by_property: Option<&str>) -> Result<Vec<E>> {
        let mapping = self.load_mapping::<E>()?;
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.columns_sql::<E>()?,
            self.qualified(mapping.table().table_name())
        );
        if let Some(order_by) = order_by_property {
            sql.push_str(&format!(" ORDER BY {} ASC", property_column(&mapping, order_by)?));
        }
        self.find_rows(&mapping, &sql, &[])
    }

    fn find_rows<E: Entity>(
        &self,
        mapping: &EntityMapping<E>,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<E>> {
        tracing::debug!(sql = %sql, entity = mapping.table().entity_name(), "Finding records");
        let mut found = Vec::new();
        self.connection().query_each(sql, params, &mut |row| {
            if let Some(entity) =
                sqlmapper_query::materialize(row, mapping, "", self.conversion_service())?
            {
                found.push(entity);
            }
            Ok(())
        })?;
        Ok(found)
    }

    /// `col AS col, ...` for every mapped column of `E`.
    pub fn columns_sql<E: Entity>(&self) -> Result<String> {
        let mapping = self.load_mapping::<E>()?;
        Ok(self
            .statement(StatementKey::of::<E>(StatementKind::Columns), || {
                find_columns_sql(mapping.table())
            })
            .to_string())
    }

    /// `alias.col AS alias_col, ...` for every mapped column of `E`; rows
    /// selected this way are read back with [`materialize`](Mapper::materialize)
    /// and the same alias.
    pub fn select_columns<E: Entity>(&self, alias: &str) -> Result<String> {
        Ok(columns_sql(self.load_mapping::<E>()?.table(), alias))
    }

    fn statement(&self, key: StatementKey, build: impl FnOnce() -> String) -> Arc<str> {
        {
            let statements = self.statements.read().unwrap_or_else(|e| e.into_inner());
            if let Some(sql) = statements.get(&key) {
                return Arc::clone(sql);
            }
        }
        let sql: Arc<str> = Arc::from(build());
        let mut statements = self.statements.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(statements.entry(key).or_insert(sql))
    }

    fn assign<E: Entity>(
        &self,
        mapping: &EntityMapping<E>,
        entity: &mut E,
        index: usize,
        value: &Value,
    ) -> Result<()> {
        let host = mapping.table().properties()[index].host;
        let converted = self.conversion_service().convert(value, host)?;
        mapping.set(entity, index, &converted)
    }

    fn assign_role<E: Entity>(
        &self,
        mapping: &EntityMapping<E>,
        entity: &mut E,
        role: Role,
        value: &Value,
    ) -> Result<()> {
        match mapping.table().role_index(role) {
            Some(index) => self.assign(mapping, entity, index, value),
            None => Ok(()),
        }
    }
}

/// Indexes of the properties an update writes, in mapping order.
fn update_columns<E>(mapping: &EntityMapping<E>) -> Vec<usize> {
    let table = mapping.table();
    let excluded = [
        Some(table.id_index()),
        table.role_index(Role::CreatedOn),
        table.role_index(Role::CreatedBy),
        table.role_index(Role::Version),
    ];
    (0..table.properties().len())
        .filter(|i| !excluded.contains(&Some(*i)))
        .collect()
}

fn property_column<E>(mapping: &EntityMapping<E>, property: &str) -> Result<String> {
    let table = mapping.table();
    table
        .column_name(property)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::config(
                ConfigErrorKind::InvalidProperty,
                format!(
                    "property {}.{} is either invalid or does not have a corresponding column in database.",
                    table.entity_name(),
                    property
                ),
            )
        })
}

fn invalid_state(message: String) -> Error {
    Error::config(ConfigErrorKind::InvalidState, message)
}
