//! JSON ⇄ DataFrame bridge
//!
//! Prediction payloads arrive as a single row object, an array of row
//! objects, or a mapping of column name to value array. Columns keep the
//! order they were given in; results go back out as an ordered array of
//! record objects.

use polars::prelude::*;
use serde_json::{json, Map, Value};

use crate::error::{AdapterError, Result};

/// Convert a `"data"` payload into a row-oriented DataFrame.
pub fn frame_from_json(data: &Value) -> Result<DataFrame> {
    match data {
        Value::Array(rows) => frame_from_rows(rows),
        Value::Object(map) if !map.is_empty() && map.values().all(Value::is_array) => {
            frame_from_columns(map)
        }
        Value::Object(_) => frame_from_rows(std::slice::from_ref(data)),
        _ => Err(AdapterError::Data(
            "input must be a row object, an array of rows, or a column mapping".to_string(),
        )),
    }
}

fn frame_from_rows(rows: &[Value]) -> Result<DataFrame> {
    if rows.is_empty() {
        return Ok(DataFrame::empty());
    }

    // Column order: first-seen key order across all rows.
    let mut names: Vec<&str> = Vec::new();
    for row in rows {
        let Value::Object(map) = row else {
            return Err(AdapterError::Data("rows must be objects".to_string()));
        };
        for key in map.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key);
            }
        }
    }

    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let cell = row.get(name).unwrap_or(&Value::Null);
            values.push(any_value_from_json(cell)?);
        }
        columns.push(Series::from_any_values(name.into(), &values, false)?.into());
    }
    Ok(DataFrame::new(columns)?)
}

fn frame_from_columns(map: &Map<String, Value>) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(map.len());
    for (name, column) in map {
        let Value::Array(cells) = column else {
            unreachable!("frame_from_columns is only called with all-array values");
        };
        let mut values = Vec::with_capacity(cells.len());
        for cell in cells {
            values.push(any_value_from_json(cell)?);
        }
        columns.push(Series::from_any_values(name.as_str().into(), &values, false)?.into());
    }
    Ok(DataFrame::new(columns)?)
}

fn any_value_from_json(value: &Value) -> Result<AnyValue<'static>> {
    match value {
        Value::Null => Ok(AnyValue::Null),
        Value::Bool(b) => Ok(AnyValue::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(AnyValue::Int64(i))
            } else if let Some(u) = n.as_u64() {
                Ok(AnyValue::UInt64(u))
            } else {
                Ok(AnyValue::Float64(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        Value::String(s) => Ok(AnyValue::StringOwned(s.as_str().into())),
        Value::Array(_) | Value::Object(_) => Err(AdapterError::Data(
            "nested values are not supported in tabular input".to_string(),
        )),
    }
}

/// Convert a DataFrame into an ordered sequence of record mappings.
pub fn frame_to_records(frame: &DataFrame) -> Result<Vec<Value>> {
    let columns = frame.get_columns();
    let mut records = Vec::with_capacity(frame.height());
    for i in 0..frame.height() {
        let mut record = Map::with_capacity(columns.len());
        for col in columns {
            record.insert(col.name().to_string(), json_from_any_value(col.get(i)?));
        }
        records.push(Value::Object(record));
    }
    Ok(records)
}

fn json_from_any_value(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => json!(b),
        AnyValue::Int8(v) => json!(v),
        AnyValue::Int16(v) => json!(v),
        AnyValue::Int32(v) => json!(v),
        AnyValue::Int64(v) => json!(v),
        AnyValue::UInt8(v) => json!(v),
        AnyValue::UInt16(v) => json!(v),
        AnyValue::UInt32(v) => json!(v),
        AnyValue::UInt64(v) => json!(v),
        AnyValue::Float32(v) => json!(v),
        AnyValue::Float64(v) => json!(v),
        AnyValue::String(v) => json!(v),
        AnyValue::StringOwned(v) => json!(v.as_str()),
        other => json!(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_round_trip() {
        let data = json!([{"a": 1, "b": "x"}, {"a": 2, "b": "y"}]);
        let frame = frame_from_json(&data).unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(
            frame
                .get_column_names()
                .iter()
                .map(|n| n.as_str())
                .collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let records = frame_to_records(&frame).unwrap();
        assert_eq!(records, vec![json!({"a": 1, "b": "x"}), json!({"a": 2, "b": "y"})]);
    }

    #[test]
    fn test_single_row_object() {
        let frame = frame_from_json(&json!({"x": 1.5, "y": 2})).unwrap();
        assert_eq!(frame.height(), 1);
        assert_eq!(frame.width(), 2);
    }

    #[test]
    fn test_column_mapping() {
        let frame = frame_from_json(&json!({"x": [1, 2, 3], "y": [4.0, 5.0, 6.0]})).unwrap();
        assert_eq!(frame.height(), 3);
        assert_eq!(
            frame
                .get_column_names()
                .iter()
                .map(|n| n.as_str())
                .collect::<Vec<_>>(),
            vec!["x", "y"]
        );
    }

    #[test]
    fn test_missing_cells_become_null() {
        let frame = frame_from_json(&json!([{"a": 1, "b": 2}, {"a": 3}])).unwrap();
        let records = frame_to_records(&frame).unwrap();
        assert_eq!(records[1]["b"], Value::Null);
    }

    #[test]
    fn test_scalar_input_rejected() {
        assert!(frame_from_json(&json!(42)).is_err());
        assert!(frame_from_json(&json!("rows")).is_err());
    }

    #[test]
    fn test_nested_values_rejected() {
        assert!(frame_from_json(&json!([{"a": {"nested": 1}}])).is_err());
    }
}
