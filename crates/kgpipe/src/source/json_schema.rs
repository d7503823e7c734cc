//! Structural JSON-schema inference over a sample document.
//!
//! The inferred schema travels with every columnar file (compact form, under
//! the `source_data_json_schema` metadata key) as provenance for the source
//! shape the pipeline observed.

use serde_json::{json, Map, Value};

const SCHEMA_DIALECT: &str = "http://json-schema.org/schema#";

/// Infer a JSON schema for `value`, with the draft dialect header at the
/// root.
pub fn infer_json_schema(value: &Value) -> Value {
    let mut schema = schema_for_value(value);
    if let Value::Object(obj) = &mut schema {
        obj.insert("$schema".to_string(), json!(SCHEMA_DIALECT));
    }
    schema
}

fn schema_for_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({"type": "null"}),
        Value::Bool(_) => json!({"type": "boolean"}),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({"type": "integer"}),
        Value::Number(_) => json!({"type": "number"}),
        Value::String(_) => json!({"type": "string"}),
        Value::Array(items) => {
            let mut schema = Map::new();
            schema.insert("type".to_string(), json!("array"));
            if !items.is_empty() {
                let merged = merge_schemas(items.iter().map(schema_for_value));
                schema.insert("items".to_string(), merged);
            }
            Value::Object(schema)
        }
        Value::Object(fields) => {
            let mut properties = Map::new();
            for (key, field_value) in fields {
                properties.insert(key.clone(), schema_for_value(field_value));
            }
            let mut required: Vec<&String> = fields.keys().collect();
            required.sort();
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
            })
        }
    }
}

/// Merge element schemas observed across an array: identical schemas
/// collapse to one, mixed shapes become an `anyOf`.
fn merge_schemas(schemas: impl Iterator<Item = Value>) -> Value {
    let mut distinct: Vec<Value> = Vec::new();
    for schema in schemas {
        if !distinct.contains(&schema) {
            distinct.push(schema);
        }
    }
    match distinct.len() {
        1 => distinct.pop().unwrap_or(Value::Null),
        _ => json!({"anyOf": distinct}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_object_types_are_inferred() {
        let sample = json!({
            "name": "kg",
            "version": 2,
            "ratio": 0.5,
            "active": true,
        });
        let schema = infer_json_schema(&sample);

        assert_eq!(schema["$schema"], json!(SCHEMA_DIALECT));
        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["properties"]["name"]["type"], json!("string"));
        assert_eq!(schema["properties"]["version"]["type"], json!("integer"));
        assert_eq!(schema["properties"]["ratio"]["type"], json!("number"));
        assert_eq!(schema["properties"]["active"]["type"], json!("boolean"));
        assert_eq!(
            schema["required"],
            json!(["active", "name", "ratio", "version"])
        );
    }

    #[test]
    fn homogeneous_arrays_collapse_to_one_item_schema() {
        let sample = json!({"ids": ["a", "b", "c"]});
        let schema = infer_json_schema(&sample);
        assert_eq!(schema["properties"]["ids"]["items"]["type"], json!("string"));
    }

    #[test]
    fn mixed_arrays_become_any_of() {
        let sample = json!({"values": ["a", 1]});
        let schema = infer_json_schema(&sample);
        let items = &schema["properties"]["values"]["items"];
        assert!(items.get("anyOf").is_some(), "expected anyOf: {items}");
    }

    #[test]
    fn empty_arrays_omit_items() {
        let sample = json!({"values": []});
        let schema = infer_json_schema(&sample);
        assert!(schema["properties"]["values"].get("items").is_none());
    }
}
