use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

pub struct CliLogger {
    json: bool,
    no_color: bool,
}

impl CliLogger {
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    pub fn print_serialized<T: Serialize>(&self, value: &T) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
            return Ok(());
        }

        println!("{}", self.render(&serde_json::to_value(value)?));
        Ok(())
    }

    pub fn print_error(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "error",
                "message": msg,
            });
            println!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("error", "31;1"));
    }

    /// Plain-text view: one `key  value` row per leaf, keys aligned.
    fn render(&self, value: &Value) -> String {
        let mut rows = Vec::new();
        match value {
            Value::Array(items) => {
                for item in items {
                    flatten_into(&mut rows, String::new(), item);
                }
            }
            other => flatten_into(&mut rows, String::new(), other),
        }

        let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        rows.iter()
            .map(|(key, value)| {
                if key.is_empty() {
                    value.clone()
                } else {
                    let padded = format!("{key:<width$}");
                    format!("{}  {value}", self.style(&padded, "36"))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn style(&self, text: &str, ansi: &str) -> String {
        if self.no_color {
            return text.to_string();
        }
        format!("\x1b[{ansi}m{text}\x1b[0m")
    }
}

/// Dotted keys for objects, `[i]` for arrays of objects. Arrays of scalars
/// collapse into one comma-separated row.
fn flatten_into(rows: &mut Vec<(String, String)>, prefix: String, value: &Value) {
    match value {
        Value::Object(map) if map.is_empty() => rows.push((prefix, "{}".to_string())),
        Value::Object(map) => {
            for (key, value) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(rows, key, value);
            }
        }
        Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => {
            let joined = items.iter().map(scalar).collect::<Vec<_>>().join(", ");
            rows.push((prefix, if items.is_empty() { "[]".to_string() } else { joined }));
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(rows, format!("{prefix}[{i}]"), item);
            }
        }
        other => rows.push((prefix, scalar(other))),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(v) => v.clone(),
        other => other.to_string(),
    }
}
