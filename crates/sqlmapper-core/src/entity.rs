//! Registration-time property tables for mapped structs.
//!
//! A struct becomes mappable by implementing [`Entity`] and describing its
//! properties once through [`EntityModel`]. The description replaces runtime
//! reflection: each property carries a getter and setter built from plain
//! field accessors, plus the metadata the schema resolver needs (column
//! override, id designation, audit/version role).
//!
//! ```ignore
//! #[derive(Debug, Default)]
//! struct Order {
//!     id: Option<i64>,
//!     customer_id: Option<i64>,
//!     customer: Option<Customer>,
//!     lines: Vec<OrderLine>,
//! }
//!
//! impl Entity for Order {
//!     fn describe(model: &mut EntityModel<Self>) {
//!         model.table("orders");
//!         model.id("id", |o| &o.id, |o| &mut o.id).auto_increment();
//!         model.property("customer_id", |o| &o.customer_id, |o| &mut o.customer_id);
//!         model.has_one("customer", |o| &mut o.customer);
//!         model.has_many("lines", |o| &mut o.lines);
//!     }
//! }
//! ```

use std::any::Any;

use crate::error::Result;
use crate::row::FromValue;
use crate::types::{HostType, SqlType, TypeInfo, simple_type_name};
use crate::value::Value;

/// A struct that maps to a single table.
///
/// `Default` supplies the blank instance rows are materialized into and the
/// representative instance relationship validation inspects.
pub trait Entity: Default + Send + Sync + 'static {
    /// Declare table, properties and relationship properties.
    fn describe(model: &mut EntityModel<Self>);

    /// Struct name without module path, used in error messages.
    fn entity_name() -> &'static str {
        simple_type_name(std::any::type_name::<Self>())
    }
}

/// Property types that can be stored in a mapped column.
pub trait ColumnValue: TypeInfo + FromValue + Clone + Into<Value> + Send + Sync {}

impl<T> ColumnValue for T where T: TypeInfo + FromValue + Clone + Into<Value> + Send + Sync {}

/// Audit and optimistic-locking roles a property may claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    CreatedOn,
    CreatedBy,
    UpdatedOn,
    UpdatedBy,
    Version,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::CreatedOn,
        Role::CreatedBy,
        Role::UpdatedOn,
        Role::UpdatedBy,
        Role::Version,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Role::CreatedOn => "created_on",
            Role::CreatedBy => "created_by",
            Role::UpdatedOn => "updated_on",
            Role::UpdatedBy => "updated_by",
            Role::Version => "version",
        }
    }
}

/// How an id value comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Generated by the database on insert
    AutoIncrement,
    /// Assigned by the application before insert
    Manual,
}

type Getter<E> = Box<dyn Fn(&E) -> Value + Send + Sync>;
type Setter<E> = Box<dyn Fn(&mut E, &Value) -> Result<()> + Send + Sync>;

/// One declared scalar property.
pub struct PropertyDecl<E> {
    name: &'static str,
    column: Option<String>,
    host: HostType,
    sql_type: SqlType,
    nullable: bool,
    id: Option<IdKind>,
    role: Option<Role>,
    get: Getter<E>,
    set: Setter<E>,
}

impl<E> PropertyDecl<E> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Explicit column name, if one was declared.
    pub fn column_override(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn host(&self) -> HostType {
        self.host
    }

    /// SQL type implied by the Rust type (database metadata takes precedence).
    pub fn sql_type(&self) -> &SqlType {
        &self.sql_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn id_kind(&self) -> Option<IdKind> {
        self.id
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Read the property as a SQL value.
    pub fn get(&self, entity: &E) -> Value {
        (self.get)(entity)
    }

    /// Assign an already-converted value to the property.
    pub fn set(&self, entity: &mut E, value: &Value) -> Result<()> {
        (self.set)(entity, value)
    }
}

impl<E> std::fmt::Debug for PropertyDecl<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDecl")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("host", &self.host)
            .field("id", &self.id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Chained configuration of the property just declared.
pub struct PropertyBuilder<'a, E> {
    decl: &'a mut PropertyDecl<E>,
}

impl<E> PropertyBuilder<'_, E> {
    /// Map to `column` instead of the snake-case property name.
    pub fn column(self, column: impl Into<String>) -> Self {
        self.decl.column = Some(column.into());
        self
    }

    /// The database generates this id on insert.
    pub fn auto_increment(self) -> Self {
        self.decl.id = Some(IdKind::AutoIncrement);
        self
    }

    pub fn created_on(self) -> Self {
        self.role(Role::CreatedOn)
    }

    pub fn created_by(self) -> Self {
        self.role(Role::CreatedBy)
    }

    pub fn updated_on(self) -> Self {
        self.role(Role::UpdatedOn)
    }

    pub fn updated_by(self) -> Self {
        self.role(Role::UpdatedBy)
    }

    /// Optimistic-locking version counter.
    pub fn version(self) -> Self {
        self.role(Role::Version)
    }

    fn role(self, role: Role) -> Self {
        self.decl.role = Some(role);
        self
    }
}

/// Shape of a relationship property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationShape {
    /// `Option<R>`
    One,
    /// `Vec<R>` or `Option<Vec<R>>`
    Many,
}

/// Typed accessor of a `has_one` property.
pub type OneAccessor<E, R> = fn(&mut E) -> &mut Option<R>;

/// Typed accessor of a `has_many` container.
pub enum ManyAccessor<E, R> {
    /// Always-present `Vec<R>`
    Plain(fn(&mut E) -> &mut Vec<R>),
    /// `Option<Vec<R>>`; `None` is an uninitialized collection
    Optional(fn(&mut E) -> Option<&mut Vec<R>>),
}

impl<E, R> ManyAccessor<E, R> {
    /// The container, or `None` if it is not initialized.
    pub fn get<'a>(&self, entity: &'a mut E) -> Option<&'a mut Vec<R>> {
        match self {
            ManyAccessor::Plain(f) => Some(f(entity)),
            ManyAccessor::Optional(f) => f(entity),
        }
    }
}

impl<E, R> Clone for ManyAccessor<E, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, R> Copy for ManyAccessor<E, R> {}

/// One declared relationship property.
pub struct RelationDecl<E> {
    name: &'static str,
    shape: RelationShape,
    target: HostType,
    declared_type: &'static str,
    accessor: Box<dyn Any + Send + Sync>,
    initialized: Box<dyn Fn(&mut E) -> bool + Send + Sync>,
}

impl<E: 'static> RelationDecl<E> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> RelationShape {
        self.shape
    }

    /// Related struct type (element type for containers).
    pub fn target(&self) -> HostType {
        self.target
    }

    /// Declared field type, for messages (`Option<Customer>`, `Vec<OrderLine>`).
    pub fn declared_type(&self) -> &'static str {
        self.declared_type
    }

    /// Whether the container on `entity` is initialized. Always true for `One`.
    pub fn is_initialized(&self, entity: &mut E) -> bool {
        (self.initialized)(entity)
    }

    pub fn one<R: 'static>(&self) -> Option<OneAccessor<E, R>> {
        self.accessor.downcast_ref::<OneAccessor<E, R>>().copied()
    }

    pub fn many<R: 'static>(&self) -> Option<ManyAccessor<E, R>> {
        self.accessor.downcast_ref::<ManyAccessor<E, R>>().copied()
    }
}

impl<E> std::fmt::Debug for RelationDecl<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationDecl")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// The declared shape of an [`Entity`].
pub struct EntityModel<E> {
    table: Option<String>,
    properties: Vec<PropertyDecl<E>>,
    relations: Vec<RelationDecl<E>>,
}

impl<E: Entity> EntityModel<E> {
    /// Run `E::describe` and return the collected declaration.
    pub fn declare() -> Self {
        let mut model = Self {
            table: None,
            properties: Vec::new(),
            relations: Vec::new(),
        };
        E::describe(&mut model);
        model
    }

    /// Override the table name (default: snake-case struct name).
    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.table = Some(name.into());
        self
    }

    /// Declare a scalar property.
    pub fn property<T: ColumnValue>(
        &mut self,
        name: &'static str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> PropertyBuilder<'_, E> {
        self.properties.push(PropertyDecl {
            name,
            column: None,
            host: T::host_type(),
            sql_type: T::SQL_TYPE,
            nullable: T::NULLABLE,
            id: None,
            role: None,
            get: Box::new(move |entity| get(entity).clone().into()),
            set: Box::new(move |entity, value| {
                *get_mut(entity) = T::from_value(value)?;
                Ok(())
            }),
        });
        let last = self.properties.len() - 1;
        PropertyBuilder {
            decl: &mut self.properties[last],
        }
    }

    /// Declare the id property; assigned by the application unless
    /// `.auto_increment()` follows.
    pub fn id<T: ColumnValue>(
        &mut self,
        name: &'static str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> PropertyBuilder<'_, E> {
        let builder = self.property(name, get, get_mut);
        builder.decl.id = Some(IdKind::Manual);
        builder
    }

    /// Declare an `Option<R>` property populated by a `HAS_ONE` merge.
    pub fn has_one<R: Entity>(&mut self, name: &'static str, accessor: OneAccessor<E, R>) {
        self.relations.push(RelationDecl {
            name,
            shape: RelationShape::One,
            target: HostType::of::<R>(),
            declared_type: std::any::type_name::<Option<R>>(),
            accessor: Box::new(accessor),
            initialized: Box::new(|_| true),
        });
    }

    /// Declare a `Vec<R>` property populated by `HAS_MANY` / `HAS_MANY_THROUGH`.
    pub fn has_many<R: Entity>(&mut self, name: &'static str, accessor: fn(&mut E) -> &mut Vec<R>) {
        self.push_many(
            name,
            std::any::type_name::<Vec<R>>(),
            ManyAccessor::Plain(accessor),
        );
    }

    /// Declare an `Option<Vec<R>>` container; `None` counts as uninitialized.
    pub fn has_many_optional<R: Entity>(
        &mut self,
        name: &'static str,
        accessor: fn(&mut E) -> Option<&mut Vec<R>>,
    ) {
        self.push_many(
            name,
            std::any::type_name::<Option<Vec<R>>>(),
            ManyAccessor::Optional(accessor),
        );
    }

    fn push_many<R: Entity>(
        &mut self,
        name: &'static str,
        declared_type: &'static str,
        accessor: ManyAccessor<E, R>,
    ) {
        self.relations.push(RelationDecl {
            name,
            shape: RelationShape::Many,
            target: HostType::of::<R>(),
            declared_type,
            accessor: Box::new(accessor),
            initialized: Box::new(move |entity| accessor.get(entity).is_some()),
        });
    }
}

impl<E> EntityModel<E> {
    pub fn table_override(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn properties(&self) -> &[PropertyDecl<E>] {
        &self.properties
    }

    pub fn property_decl(&self, name: &str) -> Option<&PropertyDecl<E>> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn relations(&self) -> &[RelationDecl<E>] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDecl<E>> {
        self.relations.iter().find(|r| r.name == name)
    }
}

impl<E> std::fmt::Debug for EntityModel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityModel")
            .field("table", &self.table)
            .field("properties", &self.properties)
            .field("relations", &self.relations)
            .finish()
    }
}
