//! Generic reshaping used when no processing function is available or it fails.

use std::cmp::Ordering;

use compass_common::Row;
use serde_json::{Number, Value};

const YEAR: &str = "year";

/// Reshape raw rows into something chartable without any question-specific logic.
///
/// * `year` + a method/type/label column + a count column → one row per year with a count per
///   cleaned method name;
/// * `year` only → one row per year with summed numeric columns and `normalized_<col>`;
/// * otherwise the rows are returned unchanged.
pub fn process_dynamic_data(rows: &[Row]) -> Vec<Row> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    if first.contains_key(YEAR) {
        let method = first.keys().find(|k| is_method_key(k));
        let count = first
            .iter()
            .find(|(k, v)| {
                k.as_str() != YEAR
                    && Some(*k) != method
                    && (k.to_lowercase().contains("count") || as_number(v).is_some())
            })
            .map(|(k, _)| k);
        if let (Some(method), Some(count)) = (method, count) {
            return transform_method_data_by_year(rows, method, count);
        }
    }

    if rows.iter().any(|r| r.contains_key(YEAR)) {
        return group_by_year(rows);
    }

    rows.to_vec()
}

fn is_method_key(key: &str) -> bool {
    let key = key.to_lowercase();
    key != YEAR && (key.contains("method") || key.contains("type") || key.contains("label"))
}

/// Sum `count_field` per year and cleaned `method_field` value.
pub fn transform_method_data_by_year(rows: &[Row], method_field: &str, count_field: &str) -> Vec<Row> {
    let mut out: Vec<Row> = Vec::new();
    for row in rows {
        let Some(year) = row.get(YEAR).filter(|v| !v.is_null()) else {
            continue;
        };
        let year = year_value(year);
        let method = row.get(method_field).map(display).map(|m| clean_key(&m)).unwrap_or_default();
        if method.is_empty() {
            continue;
        }
        let count = row.get(count_field).and_then(as_number).unwrap_or(0.0);

        let idx = match out.iter().position(|r| r.get(YEAR) == Some(&year)) {
            Some(i) => i,
            None => {
                let mut r = Row::new();
                r.insert(YEAR.to_string(), year);
                out.push(r);
                out.len() - 1
            }
        };
        let bucket = &mut out[idx];
        let total = bucket.get(&method).and_then(as_number).unwrap_or(0.0) + count;
        bucket.insert(method, number(total));
    }
    out.sort_by(compare_years);
    out
}

fn group_by_year(rows: &[Row]) -> Vec<Row> {
    let mut groups: Vec<(Value, Vec<&Row>)> = Vec::new();
    for row in rows {
        let Some(year) = row.get(YEAR).filter(|v| !v.is_null()) else {
            continue;
        };
        let year = year_value(year);
        match groups.iter_mut().find(|(y, _)| *y == year) {
            Some((_, members)) => members.push(row),
            None => groups.push((year, vec![row])),
        }
    }

    let mut out: Vec<Row> = groups
        .into_iter()
        .map(|(year, members)| {
            let mut keys: Vec<&String> = Vec::new();
            for key in members.iter().flat_map(|r| r.keys()) {
                if key != YEAR && key != "paper" && !keys.contains(&key) {
                    keys.push(key);
                }
            }

            let mut r = Row::new();
            r.insert(YEAR.to_string(), year);
            for key in keys {
                let values: Vec<f64> = members.iter().filter_map(|m| m.get(key).and_then(as_number)).collect();
                if values.is_empty() {
                    continue;
                }
                let sum: f64 = values.iter().sum();
                let normalized = (sum / members.len() as f64 * 100.0 * 100.0).round() / 100.0;
                r.insert(key.clone(), number(sum));
                r.insert(format!("normalized_{key}"), number(normalized));
            }
            r
        })
        .collect();
    out.sort_by(compare_years);
    out
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        _ => None,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `"Case Study!"` → `"case_study"`.
fn clean_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn year_value(value: &Value) -> Value {
    match value {
        Value::String(s) => s.trim().parse::<i64>().map(Value::from).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn compare_years(a: &Row, b: &Row) -> Ordering {
    match (a.get(YEAR), b.get(YEAR)) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => display(x).cmp(&display(y)),
        _ => Ordering::Equal,
    }
}
