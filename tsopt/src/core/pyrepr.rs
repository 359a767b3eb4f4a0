//! Python-literal serialization for job-script values.
//!
//! Job scripts are Python files, so every structured value interpolated into a
//! template goes through [`to_python`]. The output is a pure function of the
//! input: dict keys are sorted and floats use the shortest representation
//! that round-trips, so the same inputs always render byte-identical scripts.

use std::fmt::Write as _;

use serde_json::Value;

/// Version of the value schema templates are written against.
///
/// Bump when the literal format of any rendered value changes.
pub const SCRIPT_SCHEMA_VERSION: u32 = 1;

/// Render a JSON value as a Python literal.
pub fn to_python(value: &Value) -> String {
    let mut buf = String::new();
    write_value(&mut buf, value);
    buf
}

fn write_value(buf: &mut String, value: &Value) {
    match value {
        Value::Null => buf.push_str("None"),
        Value::Bool(true) => buf.push_str("True"),
        Value::Bool(false) => buf.push_str("False"),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                let _ = write!(buf, "{i}");
            } else if let Some(u) = n.as_u64() {
                let _ = write!(buf, "{u}");
            } else {
                write_float(buf, n.as_f64().unwrap_or(f64::NAN));
            }
        }
        Value::String(s) => write_str(buf, s),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                write_value(buf, item);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            buf.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                write_str(buf, key);
                buf.push_str(": ");
                write_value(buf, item);
            }
            buf.push('}');
        }
    }
}

fn write_float(buf: &mut String, f: f64) {
    if f.is_nan() {
        buf.push_str("float('nan')");
    } else if f.is_infinite() {
        buf.push_str(if f > 0.0 { "float('inf')" } else { "-float('inf')" });
    } else {
        // Debug keeps a trailing `.0` on integral floats, like Python's repr.
        let _ = write!(buf, "{f:?}");
    }
}

fn write_str(buf: &mut String, s: &str) {
    buf.push('\'');
    for c in s.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '\'' => buf.push_str("\\'"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c => buf.push(c),
        }
    }
    buf.push('\'');
}
