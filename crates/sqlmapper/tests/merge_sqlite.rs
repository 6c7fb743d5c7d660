use sqlmapper::prelude::*;
use sqlmapper::{ConfigErrorKind, PlanCache};
use sqlmapper_sqlite::SqliteConnection;

#[derive(Debug, Default, Clone, PartialEq)]
struct Customer {
    customer_id: Option<i64>,
    last_name: Option<String>,
    first_name: Option<String>,
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
struct OrderLine {
    order_line_id: Option<i64>,
    order_id: Option<i64>,
    product_id: Option<i64>,
    num_of_units: Option<i32>,
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
struct Order {
    order_id: Option<i64>,
    customer_id: Option<i64>,
    status: Option<String>,
    customer: Option<Customer>,
    order_lines: Vec<OrderLine>,
}

impl Entity for Order {
    fn describe(model: &mut EntityModel<Self>) {
        model.table("orders");
        model
            .id("orderId", |o| &o.order_id, |o| &mut o.order_id)
            .auto_increment();
        model.property("customerId", |o| &o.customer_id, |o| &mut o.customer_id);
        model.property("status", |o| &o.status, |o| &mut o.status);
        model.has_one("customer", |o| &mut o.customer);
        model.has_many("orderLines", |o| &mut o.order_lines);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Skill {
    id: Option<i64>,
    name: Option<String>,
}

impl Entity for Skill {
    fn describe(model: &mut EntityModel<Self>) {
        model.property("id", |s| &s.id, |s| &mut s.id);
        model.property("name", |s| &s.name, |s| &mut s.name);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Employee {
    id: Option<i64>,
    name: Option<String>,
    skills: Vec<Skill>,
}

impl Entity for Employee {
    fn describe(model: &mut EntityModel<Self>) {
        model.property("id", |e| &e.id, |e| &mut e.id);
        model.property("name", |e| &e.name, |e| &mut e.name);
        model.has_many("skills", |e| &mut e.skills);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Person {
    id: Option<i64>,
    name: Option<String>,
    friends: Vec<Person>,
}

impl Entity for Person {
    fn describe(model: &mut EntityModel<Self>) {
        model.property("id", |p| &p.id, |p| &mut p.id);
        model.property("name", |p| &p.name, |p| &mut p.name);
        model.has_many("friends", |p| &mut p.friends);
    }
}

fn seeded() -> SqliteConnection {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    conn.execute_raw(
        "CREATE TABLE customer (customer_id INTEGER PRIMARY KEY AUTOINCREMENT, last_name TEXT, first_name TEXT);
         CREATE TABLE orders (order_id INTEGER PRIMARY KEY AUTOINCREMENT, customer_id INTEGER, status TEXT);
         CREATE TABLE order_line (order_line_id INTEGER PRIMARY KEY AUTOINCREMENT, order_id INTEGER, product_id INTEGER, num_of_units INTEGER);
         CREATE TABLE employee (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE skill (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE employee_skill (employee_id INTEGER, skill_id INTEGER);
         CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE friendship (person_id INTEGER, friend_id INTEGER);

         INSERT INTO customer (customer_id, last_name, first_name) VALUES (1, 'doe', 'john'), (2, 'smith', 'jane');
         INSERT INTO orders (order_id, customer_id, status) VALUES (1, 2, 'IN PROCESS'), (2, 1, 'COMPLETE'), (3, NULL, 'NEW'), (4, 2, 'NEW');
         INSERT INTO order_line (order_line_id, order_id, product_id, num_of_units) VALUES
            (1, 1, 10, 5), (2, 1, 11, 1), (3, 2, 12, 2), (4, 4, 10, 7), (5, 1, 12, 3);
         INSERT INTO employee (id, name) VALUES (1, 'ann'), (2, 'bob'), (3, 'cid');
         INSERT INTO skill (id, name) VALUES (10, 'rust'), (11, 'sql'), (12, 'java');
         INSERT INTO employee_skill (employee_id, skill_id) VALUES (1, 10), (1, 11), (2, 10), (3, 99);
         INSERT INTO person (id, name) VALUES (1, 'ann'), (2, 'bob'), (3, 'cid');
         INSERT INTO friendship (person_id, friend_id) VALUES (1, 2), (1, 3), (2, 99);",
    )
    .expect("seed schema");
    conn
}

fn customer_spec() -> RelationshipSpec<Order, Customer> {
    RelationshipSpec::has_one()
        .join_column_owning_side("customer_id")
        .populate_property("customer")
}

fn lines_spec() -> RelationshipSpec<Order, OrderLine> {
    RelationshipSpec::has_many()
        .join_column_many_side("order_id")
        .populate_property("orderLines")
        .order_by("order_line.order_line_id desc")
}

fn skills_spec() -> RelationshipSpec<Employee, Skill> {
    RelationshipSpec::has_many_through("employee_skill", "employee_id", "skill_id")
        .populate_property("skills")
        .order_by("skill.name")
}

fn line_ids(order: &Order) -> Vec<i64> {
    order.order_lines.iter().filter_map(|l| l.order_line_id).collect()
}

#[test]
fn sqlite_has_one_merge_assigns_shared_customers() {
    let mapper = Mapper::new(seeded());
    let mut orders: Vec<Order> = mapper.find_all(Some("orderId")).unwrap();
    assert_eq!(orders.len(), 4);

    mapper.merge(&customer_spec(), &mut orders).unwrap();

    let last_names: Vec<Option<&str>> = orders
        .iter()
        .map(|o| o.customer.as_ref().and_then(|c| c.last_name.as_deref()))
        .collect();
    assert_eq!(
        last_names,
        vec![Some("smith"), Some("doe"), None, Some("smith")]
    );
    assert_eq!(orders[0].customer, orders[3].customer);
}

#[test]
fn sqlite_has_many_merge_orders_and_empties() {
    let mapper = Mapper::new(seeded());
    let mut orders: Vec<Order> = mapper.find_all(Some("orderId")).unwrap();

    mapper.merge(&lines_spec(), &mut orders).unwrap();

    assert_eq!(line_ids(&orders[0]), vec![5, 2, 1]);
    assert_eq!(line_ids(&orders[1]), vec![3]);
    assert!(orders[2].order_lines.is_empty());
    assert_eq!(line_ids(&orders[3]), vec![4]);
    assert_eq!(orders[3].order_lines[0].num_of_units, Some(7));
}

#[test]
fn sqlite_merge_is_idempotent() {
    let mapper = Mapper::new(seeded());
    let mut orders: Vec<Order> = mapper.find_all(Some("orderId")).unwrap();

    mapper.merge(&lines_spec(), &mut orders).unwrap();
    mapper.merge(&customer_spec(), &mut orders).unwrap();
    let first = orders.clone();

    mapper.merge(&lines_spec(), &mut orders).unwrap();
    mapper.merge(&customer_spec(), &mut orders).unwrap();
    assert_eq!(orders, first);
}

#[test]
fn sqlite_chunk_size_does_not_change_result() {
    let one = Mapper::with_config(seeded(), MapperConfig::default().in_clause_chunk_size(1)).unwrap();
    let hundred = Mapper::with_config(seeded(), MapperConfig::default().in_clause_chunk_size(100)).unwrap();

    let mut a: Vec<Order> = one.find_all(Some("orderId")).unwrap();
    let mut b: Vec<Order> = hundred.find_all(Some("orderId")).unwrap();
    one.merge(&lines_spec(), &mut a).unwrap();
    hundred.merge(&lines_spec(), &mut b).unwrap();

    // Ordering holds within each chunk; each owner's lines come from one chunk.
    assert_eq!(a, b);

    let mut employees_a: Vec<Employee> = one.find_all(Some("id")).unwrap();
    let mut employees_b: Vec<Employee> = hundred.find_all(Some("id")).unwrap();
    one.merge(&skills_spec(), &mut employees_a).unwrap();
    hundred.merge(&skills_spec(), &mut employees_b).unwrap();
    assert_eq!(employees_a, employees_b);
}

#[test]
fn sqlite_has_many_through_skips_dangling_links() {
    let mapper = Mapper::new(seeded());
    let mut employees: Vec<Employee> = mapper.find_all(Some("id")).unwrap();

    mapper.merge(&skills_spec(), &mut employees).unwrap();

    let names = |e: &Employee| -> Vec<String> {
        e.skills.iter().filter_map(|s| s.name.clone()).collect()
    };
    assert_eq!(names(&employees[0]), vec!["rust", "sql"]);
    assert_eq!(names(&employees[1]), vec!["rust"]);
    assert!(employees[2].skills.is_empty());
}

#[test]
fn sqlite_plans_are_cached_per_relationship() {
    let mapper = Mapper::new(seeded());
    let mut orders: Vec<Order> = mapper.find_all(None).unwrap();

    for _ in 0..3 {
        mapper.merge(&lines_spec(), &mut orders).unwrap();
        mapper.merge(&customer_spec(), &mut orders).unwrap();
    }
    let cache: &PlanCache = mapper.plan_cache();
    assert_eq!(cache.len(), 2);
}

#[test]
fn sqlite_same_table_through_keys_by_owner() {
    let mapper = Mapper::new(seeded());
    let mut people: Vec<Person> = mapper.find_all(Some("id")).unwrap();
    let spec = RelationshipSpec::<Person, Person>::has_many_through("friendship", "person_id", "friend_id")
        .populate_property("friends")
        .order_by("person.id");

    mapper.merge(&spec, &mut people).unwrap();

    let friends: Vec<(Option<i64>, Option<&str>)> = people[0]
        .friends
        .iter()
        .map(|f| (f.id, f.name.as_deref()))
        .collect();
    assert_eq!(friends, vec![(Some(2), Some("bob")), (Some(3), Some("cid"))]);
    // bob's only link points at a missing person.
    assert!(people[1].friends.is_empty());
    assert!(people[2].friends.is_empty());
}

#[test]
fn sqlite_merge_sparse_and_empty_lists() {
    let mapper = Mapper::new(seeded());
    let mut orders = vec![None, mapper.find_by_id::<Order>(2i64).unwrap(), None];
    mapper.merge_sparse(&customer_spec(), &mut orders).unwrap();
    let customer = orders[1].as_ref().and_then(|o| o.customer.as_ref());
    assert_eq!(customer.and_then(|c| c.first_name.as_deref()), Some("john"));

    let mut none: Vec<Order> = Vec::new();
    mapper.merge(&lines_spec(), &mut none).unwrap();
}

#[test]
fn sqlite_configuration_errors_surface_before_querying() {
    let mapper = Mapper::new(seeded());
    let mut orders: Vec<Order> = mapper.find_all(None).unwrap();

    let err = mapper
        .merge(
            &RelationshipSpec::<Order, OrderLine>::has_many()
                .join_column_many_side("order_no")
                .populate_property("orderLines"),
            &mut orders,
        )
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidJoinColumn));
    assert!(orders.iter().all(|o| o.order_lines.is_empty()));

    let err = mapper
        .merge(
            &RelationshipSpec::<Order, OrderLine>::has_many()
                .join_column_many_side("order_id")
                .populate_property("orderLines")
                .order_by("orders.status"),
            &mut orders,
        )
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidOrderBy));
}

#[test]
fn sqlite_aliased_select_materializes_both_sides() {
    let mapper = Mapper::new(seeded());
    let sql = format!(
        "SELECT {}, {} FROM orders o LEFT JOIN customer c ON o.customer_id = c.customer_id ORDER BY o.order_id",
        mapper.select_columns::<Order>("o").unwrap(),
        mapper.select_columns::<Customer>("c").unwrap()
    );
    let rows = mapper.connection().query(&sql, &[]).unwrap();
    let pairs: Vec<(Order, Option<Customer>)> = rows
        .iter()
        .map(|row| {
            (
                mapper.materialize::<Order>(row, "o").unwrap().unwrap(),
                mapper.materialize::<Customer>(row, "c").unwrap(),
            )
        })
        .collect();
    assert_eq!(pairs.len(), 4);
    assert_eq!(pairs[0].1.as_ref().and_then(|c| c.customer_id), Some(2));
    assert!(pairs[2].1.is_none());
}
