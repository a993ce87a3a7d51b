//! Conversions between SQLite values and JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use catalogd_core::SqlValue;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::Row;
use serde_json::{Number, Value};

use super::{DbResult, Record};

pub(crate) fn record_from_row(row: &Row<'_>, columns: &[String]) -> DbResult<Record> {
    let mut record = Record::new();
    for (idx, name) in columns.iter().enumerate() {
        record.insert(name.clone(), json_from_sqlite(row.get_ref(idx)?));
    }
    Ok(record)
}

/// Blobs become base64 text; non-finite reals become null.
fn json_from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}

pub(crate) fn sqlite_from_param(value: &SqlValue) -> SqliteValue {
    match value {
        SqlValue::Null => SqliteValue::Null,
        SqlValue::Integer(i) => SqliteValue::Integer(*i),
        SqlValue::Real(f) => SqliteValue::Real(*f),
        SqlValue::Text(s) => SqliteValue::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_conversions() {
        assert_eq!(json_from_sqlite(ValueRef::Null), Value::Null);
        assert_eq!(json_from_sqlite(ValueRef::Integer(42)), Value::from(42));
        assert_eq!(json_from_sqlite(ValueRef::Real(4.99)), Value::from(4.99));
        assert_eq!(
            json_from_sqlite(ValueRef::Text(b"ACADEMY DINOSAUR")),
            Value::from("ACADEMY DINOSAUR")
        );
        assert_eq!(json_from_sqlite(ValueRef::Real(f64::NAN)), Value::Null);
    }

    #[test]
    fn blobs_are_base64() {
        assert_eq!(json_from_sqlite(ValueRef::Blob(&[0xde, 0xad])), Value::from("3q0="));
    }
}
