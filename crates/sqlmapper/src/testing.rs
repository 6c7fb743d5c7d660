//! Shared fixtures for unit tests: a recording mock connection and a small
//! order/customer model.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlmapper_core::{Connection, Dialect, Entity, EntityModel, Result, Row, Value};

type Responder = Box<dyn Fn(&str, &[Value]) -> Vec<Row> + Send + Sync>;

#[derive(Default)]
pub(crate) struct MockState {
    /// Every non-metadata statement with its parameters, in order.
    pub statements: Vec<(String, Vec<Value>)>,
    /// Number of `PRAGMA table_info` lookups.
    pub metadata_queries: usize,
    /// Rows-affected count returned by `execute`.
    pub affected: u64,
    /// Next key returned by `insert`.
    pub next_id: i64,
}

/// Mock SQLite connection answering metadata from a fixed catalog and
/// data queries from a responder closure.
pub(crate) struct MockConnection {
    tables: HashMap<String, Vec<(String, String)>>,
    responder: Responder,
    pub state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        let tables = [
            (
                "customer",
                vec![("customer_id", "INTEGER"), ("last_name", "TEXT"), ("first_name", "TEXT")],
            ),
            (
                "orders",
                vec![
                    ("order_id", "INTEGER"),
                    ("order_date", "TIMESTAMP"),
                    ("customer_long_id", "INTEGER"),
                    ("status", "TEXT"),
                    ("version", "INTEGER"),
                ],
            ),
            (
                "order_line",
                vec![
                    ("order_line_id", "INTEGER"),
                    ("order_id", "INTEGER"),
                    ("product_id", "INTEGER"),
                    ("num_of_units", "INTEGER"),
                ],
            ),
            ("employee", vec![("id", "INTEGER"), ("name", "TEXT")]),
            ("skill", vec![("id", "INTEGER"), ("name", "TEXT")]),
            (
                "audit_note",
                vec![
                    ("id", "INTEGER"),
                    ("note", "TEXT"),
                    ("created_on", "TIMESTAMP"),
                    ("created_by", "TEXT"),
                    ("updated_on", "TIMESTAMP"),
                    ("updated_by", "TEXT"),
                ],
            ),
        ];
        Self {
            tables: tables
                .into_iter()
                .map(|(t, cols)| {
                    (
                        t.to_string(),
                        cols.into_iter()
                            .map(|(c, ty)| (c.to_string(), ty.to_string()))
                            .collect(),
                    )
                })
                .collect(),
            responder: Box::new(|_, _| Vec::new()),
            state: Arc::new(Mutex::new(MockState {
                affected: 1,
                next_id: 1,
                ..MockState::default()
            })),
        }
    }

    pub fn respond(
        mut self,
        responder: impl Fn(&str, &[Value]) -> Vec<Row> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Box::new(responder);
        self
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn statement_count(&self) -> usize {
        self.state.lock().unwrap().statements.len()
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.state
            .lock()
            .unwrap()
            .statements
            .push((sql.to_string(), params.to_vec()));
    }
}

impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        if let Some(table) = sql
            .strip_prefix("PRAGMA table_info(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            self.state.lock().unwrap().metadata_queries += 1;
            return Ok(self
                .tables
                .get(table)
                .map(|cols| {
                    cols.iter()
                        .map(|(name, ty)| {
                            Row::new(
                                vec!["name".into(), "type".into(), "notnull".into()],
                                vec![Value::Text(name.clone()), Value::Text(ty.clone()), Value::Int(0)],
                            )
                        })
                        .collect()
                })
                .unwrap_or_default());
        }
        self.record(sql, params);
        Ok((self.responder)(sql, params))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql, params);
        Ok(self.state.lock().unwrap().affected)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.record(sql, params);
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        Ok(id)
    }
}

/// Build a row from column names and values.
pub(crate) fn row(columns: &[&str], values: Vec<Value>) -> Row {
    Row::new(columns.iter().map(|c| (*c).to_string()).collect(), values)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Customer {
    pub customer_id: Option<i64>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
}

impl Entity for Customer {
    fn describe(model: &mut EntityModel<Self>) {
        model
            .id("customerId", |c| &c.customer_id, |c| &mut c.customer_id)
            .auto_increment();
        model.property("lastName", |c| &c.last_name, |c| &mut c.last_name);
        model.property("firstName", |c| &c.first_name, |c| &mut c.first_name);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct OrderLine {
    pub order_line_id: Option<i64>,
    pub order_id: Option<i64>,
    pub product_id: Option<i32>,
    pub num_of_units: Option<i32>,
}

impl Entity for OrderLine {
    fn describe(model: &mut EntityModel<Self>) {
        model
            .id("orderLineId", |l| &l.order_line_id, |l| &mut l.order_line_id)
            .auto_increment();
        model.property("orderId", |l| &l.order_id, |l| &mut l.order_id);
        model.property("productId", |l| &l.product_id, |l| &mut l.product_id);
        model.property("numOfUnits", |l| &l.num_of_units, |l| &mut l.num_of_units);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Order {
    pub order_id: Option<i64>,
    pub order_date: Option<chrono::NaiveDateTime>,
    pub customer_id: Option<i64>,
    pub status: Option<String>,
    pub version: Option<i32>,
    pub customer: Option<Customer>,
    pub order_lines: Vec<OrderLine>,
    pub lazy_lines: Option<Vec<OrderLine>>,
}

impl Entity for Order {
    fn describe(model: &mut EntityModel<Self>) {
        model.table("orders");
        model
            .id("orderId", |o| &o.order_id, |o| &mut o.order_id)
            .auto_increment();
        model.property("orderDate", |o| &o.order_date, |o| &mut o.order_date);
        model
            .property("customerId", |o| &o.customer_id, |o| &mut o.customer_id)
            .column("customer_long_id");
        model.property("status", |o| &o.status, |o| &mut o.status);
        model
            .property("version", |o| &o.version, |o| &mut o.version)
            .version();
        model.has_one("customer", |o| &mut o.customer);
        model.has_many("orderLines", |o| &mut o.order_lines);
        model.has_many_optional("lazyLines", |o| o.lazy_lines.as_mut());
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Skill {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl Entity for Skill {
    fn describe(model: &mut EntityModel<Self>) {
        model.property("id", |s| &s.id, |s| &mut s.id);
        model.property("name", |s| &s.name, |s| &mut s.name);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Employee {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub skills: Vec<Skill>,
}

impl Entity for Employee {
    fn describe(model: &mut EntityModel<Self>) {
        model.property("id", |e| &e.id, |e| &mut e.id);
        model.property("name", |e| &e.name, |e| &mut e.name);
        model.has_many("skills", |e| &mut e.skills);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct AuditNote {
    pub id: i64,
    pub note: Option<String>,
    pub created_on: Option<chrono::DateTime<chrono::Utc>>,
    pub created_by: Option<String>,
    pub updated_on: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_by: Option<String>,
}

impl Entity for AuditNote {
    fn describe(model: &mut EntityModel<Self>) {
        model.id("id", |n| &n.id, |n| &mut n.id);
        model.property("note", |n| &n.note, |n| &mut n.note);
        model
            .property("createdOn", |n| &n.created_on, |n| &mut n.created_on)
            .created_on();
        model
            .property("createdBy", |n| &n.created_by, |n| &mut n.created_by)
            .created_by();
        model
            .property("updatedOn", |n| &n.updated_on, |n| &mut n.updated_on)
            .updated_on();
        model
            .property("updatedBy", |n| &n.updated_by, |n| &mut n.updated_by)
            .updated_by();
    }
}
