//! Order-by clause validation.
//!
//! Order-by text supplied by callers is appended verbatim to generated SQL,
//! so it is restricted to a comma separated list of `alias.column` terms,
//! each optionally followed by `asc` or `desc`. Aliases are table names.

use sqlmapper_core::{ConfigErrorKind, Error, Result, TableMapping};

/// Check an order-by clause against one or two table mappings.
///
/// Every column must be written as `table.column`, where `table` is the
/// table name of `primary` (or of `related`, when given) and `column` is a
/// mapped column of that table.
pub fn validate_order_by(
    order_by: &str,
    primary: &TableMapping,
    related: Option<&TableMapping>,
) -> Result<()> {
    if order_by.trim().is_empty() {
        return Err(invalid(
            "orderBy() blank string is invalid. Don't invoke orderBy() method if no value"
                .to_string(),
        ));
    }

    for clause in order_by.split(',') {
        let clause = clause.trim().to_lowercase();
        if clause.is_empty() {
            return Err(not_prefixed());
        }
        for token in clause.split_whitespace() {
            match token.split_once('.') {
                Some((alias, column)) => {
                    if column.is_empty() || column.contains('.') || alias.is_empty() {
                        return Err(invalid(
                            "Invalid orderBy() column names should be prefixed with table alias"
                                .to_string(),
                        ));
                    }
                    let table = [Some(primary), related]
                        .into_iter()
                        .flatten()
                        .find(|t| t.table_name() == alias)
                        .ok_or_else(|| invalid(format!("orderBy() invalid table alias {}", alias)))?;
                    if table.property_by_column(column).is_none() {
                        return Err(invalid(format!(
                            "orderBy() invalid column name {} Table {} for model {} either does not have column {} or is not mapped.",
                            column,
                            table.table_name(),
                            table.entity_name(),
                            column
                        )));
                    }
                }
                None if token == "asc" || token == "desc" => {}
                None => return Err(not_prefixed()),
            }
        }
    }
    Ok(())
}

fn not_prefixed() -> Error {
    invalid(
        "Invalid orderBy(). Note that the column name should be prefixed by table alias."
            .to_string(),
    )
}

fn invalid(message: String) -> Error {
    Error::config(ConfigErrorKind::InvalidOrderBy, message)
}
