//! Column lists for generated SELECT statements.
//!
//! Merge queries select the columns of a table under a table alias and
//! rename each one to `<alias>_<column>`, so that rows can carry several
//! tables side by side and the materializer can pick its own columns by
//! prefix.

use sqlmapper_core::TableMapping;

/// Column prefix used for `alias`: `alias_`.
pub fn prefix(alias: &str) -> String {
    format!("{}_", alias.to_ascii_lowercase())
}

/// `alias.col AS alias_col, ...` for every mapped column, in mapping order.
///
/// # Example
///
/// ```
/// use sqlmapper_core::{PropertyMapping, SqlType, TableMapping, TypeInfo};
/// use sqlmapper_query::select::columns_sql;
///
/// let props = vec![
///     PropertyMapping::new("id", "id", i64::host_type(), SqlType::BigInt),
///     PropertyMapping::new("name", "name", String::host_type(), SqlType::Text),
/// ];
/// let mapping = TableMapping::new("Customer", "customer", props, "id", true, &[]).unwrap();
/// assert_eq!(
///     columns_sql(&mapping, "customer"),
///     "customer.id AS customer_id, customer.name AS customer_name"
/// );
/// ```
pub fn columns_sql(mapping: &TableMapping, alias: &str) -> String {
    let alias = alias.to_ascii_lowercase();
    mapping
        .properties()
        .iter()
        .map(|p| format!("{alias}.{col} AS {alias}_{col}", col = p.column_name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `col AS col, ...` for every mapped column; used by the finders so
/// result column names come back in the mapped spelling.
pub fn find_columns_sql(mapping: &TableMapping) -> String {
    mapping
        .properties()
        .iter()
        .map(|p| format!("{col} AS {col}", col = p.column_name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Table name qualified with `schema` when one is configured.
pub fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) if !schema.trim().is_empty() => format!("{}.{}", schema.trim(), table),
        _ => table.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::{PropertyMapping, SqlType, TypeInfo};

    fn order() -> TableMapping {
        let props = vec![
            PropertyMapping::new("id", "id", i64::host_type(), SqlType::BigInt),
            PropertyMapping::new("orderDate", "order_date", String::host_type(), SqlType::Text),
            PropertyMapping::new("customerId", "customer_id", i64::host_type(), SqlType::BigInt),
        ];
        TableMapping::new("Order", "orders", props, "id", true, &[]).unwrap()
    }

    #[test]
    fn test_prefix() {
        assert_eq!(prefix("Orders"), "orders_");
    }

    #[test]
    fn test_columns_sql_uses_alias() {
        assert_eq!(
            columns_sql(&order(), "o"),
            "o.id AS o_id, o.order_date AS o_order_date, o.customer_id AS o_customer_id"
        );
    }

    #[test]
    fn test_find_columns_sql() {
        assert_eq!(
            find_columns_sql(&order()),
            "id AS id, order_date AS order_date, customer_id AS customer_id"
        );
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(qualified_table(None, "orders"), "orders");
        assert_eq!(qualified_table(Some("sales"), "orders"), "sales.orders");
        assert_eq!(qualified_table(Some(" "), "orders"), "orders");
    }
}
