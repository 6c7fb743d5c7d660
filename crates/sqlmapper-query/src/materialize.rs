//! Row materialization.
//!
//! Turns one result row into a struct instance using the type's mapping.
//! Columns are looked up as `<prefix><column>` without regard to case, so
//! the same row can carry the columns of several aliased tables.

use sqlmapper_core::{ConversionService, Entity, EntityMapping, Error, Result, Row, Value};

/// Build an `E` from `row`, or `None` when the row holds no `E`.
///
/// A row holds no `E` when the prefixed id column is absent or null, when a
/// numeric id is zero or negative, or when a text id is empty. This is what
/// the right-hand side of an outer join that found no match looks like.
///
/// Properties whose column is absent keep their default value. A value the
/// property cannot accept is a type error naming struct, property and column.
pub fn materialize<E: Entity>(
    row: &Row,
    mapping: &EntityMapping<E>,
    prefix: &str,
    conversion: &ConversionService,
) -> Result<Option<E>> {
    let table = mapping.table();
    let id_column = format!("{}{}", prefix, table.id_column_name());
    match row.get_ignore_case(&id_column) {
        Some(id) if holds_row(id) => {}
        _ => return Ok(None),
    }

    let mut entity = E::default();
    for (index, prop) in table.properties().iter().enumerate() {
        let column = format!("{}{}", prefix, prop.column_name);
        let Some(raw) = row.get_ignore_case(&column) else {
            continue;
        };
        conversion
            .convert(raw, prop.host)
            .and_then(|value| mapping.set(&mut entity, index, &value))
            .map_err(|e| locate(e, table.entity_name(), &prop.property_name, &column))?;
    }
    Ok(Some(entity))
}

/// Whether an id value identifies a row.
pub fn holds_row(id: &Value) -> bool {
    match id {
        Value::Null => false,
        Value::Text(s) => !s.is_empty(),
        Value::Decimal(s) => s.trim().parse::<f64>().is_ok_and(|n| n > 0.0),
        Value::Float(f) => *f > 0.0,
        Value::Double(f) => *f > 0.0,
        other if other.is_integer() => other.as_i64().is_some_and(|n| n > 0),
        _ => true,
    }
}

fn locate(err: Error, entity: &str, property: &str, column: &str) -> Error {
    match err {
        Error::Type(mut te) => {
            te.actual = format!("{} while mapping {}.{}", te.actual, entity, property);
            te.column = Some(column.to_string());
            Error::Type(te)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::{EntityModel, PropertyMapping, SqlType, TableMapping, TypeInfo};

    #[derive(Debug, Default, PartialEq)]
    struct Customer {
        customer_id: Option<i32>,
        first_name: Option<String>,
        last_name: String,
    }

    impl Entity for Customer {
        fn describe(model: &mut EntityModel<Self>) {
            model.id("customerId", |c| &c.customer_id, |c| &mut c.customer_id);
            model.property("firstName", |c| &c.first_name, |c| &mut c.first_name);
            model.property("lastName", |c| &c.last_name, |c| &mut c.last_name);
        }
    }

    fn mapping() -> EntityMapping<Customer> {
        let table = TableMapping::new(
            "Customer",
            "customer",
            vec![
                PropertyMapping::new("customerId", "customer_id", i32::host_type(), SqlType::Integer),
                PropertyMapping::new("firstName", "first_name", String::host_type(), SqlType::Text),
                PropertyMapping::new("lastName", "last_name", String::host_type(), SqlType::Text),
            ],
            "customerId",
            true,
            &[],
        )
        .unwrap();
        EntityMapping::new(table, EntityModel::declare()).unwrap()
    }

    fn row(columns: &[&str], values: Vec<Value>) -> Row {
        Row::new(columns.iter().map(|c| (*c).to_string()).collect(), values)
    }

    #[test]
    fn test_materializes_prefixed_columns() {
        let r = row(
            &["customer_customer_id", "CUSTOMER_FIRST_NAME", "customer_last_name", "orders_id"],
            vec![
                Value::BigInt(4),
                Value::Text("Ada".into()),
                Value::Text("Lovelace".into()),
                Value::Int(9),
            ],
        );
        let customer = materialize(&r, &mapping(), "customer_", &ConversionService::new())
            .unwrap()
            .unwrap();
        assert_eq!(
            customer,
            Customer {
                customer_id: Some(4),
                first_name: Some("Ada".into()),
                last_name: "Lovelace".into(),
            }
        );
    }

    #[test]
    fn test_missing_columns_keep_defaults() {
        let r = row(&["customer_id"], vec![Value::Int(2)]);
        let customer = materialize(&r, &mapping(), "", &ConversionService::new())
            .unwrap()
            .unwrap();
        assert_eq!(customer.customer_id, Some(2));
        assert_eq!(customer.first_name, None);
        assert_eq!(customer.last_name, "");
    }

    #[test]
    fn test_no_row_ids() {
        let m = mapping();
        let service = ConversionService::new();
        for id in [Value::Null, Value::Int(0), Value::BigInt(-1)] {
            let r = row(&["c_customer_id", "c_last_name"], vec![id, Value::Text("x".into())]);
            assert!(materialize(&r, &m, "c_", &service).unwrap().is_none());
        }
        let r = row(&["c_last_name"], vec![Value::Text("x".into())]);
        assert!(materialize(&r, &m, "c_", &service).unwrap().is_none());
    }

    #[test]
    fn test_holds_row() {
        assert!(holds_row(&Value::Text("A-1".into())));
        assert!(!holds_row(&Value::Text(String::new())));
        assert!(holds_row(&Value::SmallInt(3)));
        assert!(!holds_row(&Value::Double(0.0)));
        assert!(holds_row(&Value::Bool(true)));

        assert!(holds_row(&Value::Decimal("12.50".into())));
        assert!(!holds_row(&Value::Decimal("0".into())));
        assert!(!holds_row(&Value::Decimal("0.000".into())));
        assert!(!holds_row(&Value::Decimal("-1".into())));
    }

    #[test]
    fn test_conversion_failure_names_property() {
        let r = row(
            &["customer_id", "last_name"],
            vec![Value::Int(1), Value::Bytes(vec![0xff, 0xfe])],
        );
        let err = materialize(&r, &mapping(), "", &ConversionService::new()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Customer.lastName"), "{msg}");
        assert!(msg.contains("last_name"), "{msg}");
    }
}
