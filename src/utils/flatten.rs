use crate::models::RawDataset;
use serde_json::{Map, Value};

/// How deep nested objects are expanded into dotted columns
pub const DEFAULT_MAX_LEVEL: usize = 3;

fn flatten_into(
    prefix: &str,
    obj: &Map<String, Value>,
    level: usize,
    max_level: usize,
    out: &mut Vec<(String, Value)>,
) {
    for (key, value) in obj {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) if level < max_level => {
                flatten_into(&name, inner, level + 1, max_level, out)
            }
            other => out.push((name, other.clone())),
        }
    }
}

/// Flatten one JSON object into `(dotted column, value)` pairs.
///
/// Objects nested deeper than `max_level` and arrays are kept whole.
pub fn flatten_record(record: &Value, max_level: usize) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    if let Value::Object(obj) = record {
        flatten_into("", obj, 0, max_level, &mut out);
    }
    out
}

/// Turn a list of JSON objects into a dataset, one row per object. Columns
/// are the union of flattened keys in first-seen order.
pub fn normalize(records: &[Value], max_level: usize) -> RawDataset {
    let flat: Vec<Vec<(String, Value)>> = records
        .iter()
        .map(|r| flatten_record(r, max_level))
        .collect();

    let mut columns: Vec<String> = Vec::new();
    for rec in &flat {
        for (name, _) in rec {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
    }

    let rows = flat
        .into_iter()
        .map(|rec| {
            let mut row = vec![Value::Null; columns.len()];
            for (name, value) in rec {
                if let Some(i) = columns.iter().position(|c| *c == name) {
                    row[i] = value;
                }
            }
            row
        })
        .collect();

    RawDataset::new(columns, rows)
}

/// Rows whose `column` equals the string `value`
pub fn filter_eq(ds: &RawDataset, column: &str, value: &str) -> RawDataset {
    let Some(idx) = ds.column_index(column) else {
        return RawDataset::new(ds.columns.clone(), Vec::new());
    };
    let rows = ds
        .rows
        .iter()
        .filter(|row| row.get(idx).and_then(Value::as_str) == Some(value))
        .cloned()
        .collect();
    RawDataset::new(ds.columns.clone(), rows)
}

/// Drop every column holding at least one null
pub fn drop_null_columns(ds: &RawDataset) -> RawDataset {
    let keep: Vec<usize> = (0..ds.columns.len())
        .filter(|&i| {
            ds.rows
                .iter()
                .all(|row| !row.get(i).unwrap_or(&Value::Null).is_null())
        })
        .collect();

    RawDataset::new(
        keep.iter().map(|&i| ds.columns[i].clone()).collect(),
        ds.rows
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect(),
    )
}
