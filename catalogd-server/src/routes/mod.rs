//! Route handlers
//!
//! - health: liveness and database info
//! - sakila: DVD rental dashboard API
//! - chinook: music catalog API

pub mod chinook;
pub mod health;
pub mod sakila;

use catalogd_core::SqlValue;
use serde_json::{Map, Value};

/// Columns from `allowed` that are present in a JSON body, in `allowed`
/// order. Absent keys are left out so partial updates touch nothing else.
pub(crate) fn pick_columns(
    body: &Map<String, Value>,
    allowed: &[&'static str],
) -> Vec<(&'static str, SqlValue)> {
    allowed
        .iter()
        .filter_map(|column| body.get(*column).map(|value| (*column, sql_from_json(value))))
        .collect()
}

/// Scalar JSON to a bindable value. Arrays and objects are stored as JSON
/// text.
pub(crate) fn sql_from_json(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_only_present_allowed_keys() {
        let body = json!({"first_name": "ANN", "store_id": 2, "password": "x"});
        let picked = pick_columns(body.as_object().unwrap(), &["first_name", "last_name", "store_id"]);

        assert_eq!(
            picked,
            vec![
                ("first_name", SqlValue::Text("ANN".into())),
                ("store_id", SqlValue::Integer(2)),
            ]
        );
    }

    #[test]
    fn json_scalars_map_to_sql() {
        assert_eq!(sql_from_json(&json!(null)), SqlValue::Null);
        assert_eq!(sql_from_json(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(sql_from_json(&json!(true)), SqlValue::Integer(1));
        assert_eq!(sql_from_json(&json!([1, 2])), SqlValue::Text("[1,2]".into()));
    }
}
