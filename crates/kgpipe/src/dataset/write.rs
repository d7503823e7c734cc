//! JSON record batches to parquet chunk files.
//!
//! The physical schema of a batch is inferred from its records: field order
//! is first-seen, each field's type comes from its first non-null value, and
//! every field is nullable. Values that do not fit the inferred column type
//! degrade to null (string columns instead absorb them JSON-encoded). Edge
//! batches reorder the two endpoint-reference fields to the front; the DDL
//! translator later consumes endpoint columns by position.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, ListBuilder, RecordBatch, StringArray, StringBuilder,
};
use arrow::datatypes::{DataType, Field, FieldRef, Schema};
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use serde_json::Value;
use tracing::debug;

use crate::error::{KgError, Result};
use crate::source::batches::{for_each_item_batch, Record};

/// Stream `collection` out of the source document into
/// `<dataset_dir>/<collection>/<collection>.<chunk>.parquet` files, attaching
/// `metadata` to each file. `endpoints` names the two fields to move to the
/// front of the physical schema (edge batches). Returns the rows written.
pub fn write_collection(
    json_path: &Path,
    collection: &str,
    dataset_dir: &Path,
    chunk_size: usize,
    metadata: &BTreeMap<String, String>,
    endpoints: Option<(&str, &str)>,
) -> Result<u64> {
    let out_dir = dataset_dir.join(collection);
    std::fs::create_dir_all(&out_dir)?;

    let mut chunk_index = 0usize;
    let mut rows = 0u64;
    for_each_item_batch(json_path, collection, chunk_size, 0, |records| {
        let batch = records_to_batch(&records, endpoints)?;
        let file = out_dir.join(format!("{}.{}.parquet", collection, chunk_index));
        write_batch_file(&batch, &file, metadata)?;
        rows += records.len() as u64;
        chunk_index += 1;
        Ok(())
    })?;

    debug!(collection, rows, files = chunk_index, "collection written");
    Ok(rows)
}

/// Convert one batch of records into an Arrow `RecordBatch`.
pub fn records_to_batch(
    records: &[Record],
    endpoints: Option<(&str, &str)>,
) -> Result<RecordBatch> {
    if records.is_empty() {
        return Err(KgError::Schema("cannot write an empty record batch".to_string()));
    }

    let field_order = field_order(records, endpoints)?;

    let mut fields = Vec::with_capacity(field_order.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(field_order.len());
    for name in &field_order {
        let values: Vec<&Value> = records
            .iter()
            .map(|r| r.get(name).unwrap_or(&Value::Null))
            .collect();
        let data_type = infer_field_type(&values);
        columns.push(values_to_array(&values, &data_type)?);
        fields.push(Field::new(name, data_type, true));
    }

    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, columns).map_err(KgError::from)
}

/// Write one batch to a parquet file with file-level key/value metadata.
pub fn write_batch_file(
    batch: &RecordBatch,
    path: &Path,
    metadata: &BTreeMap<String, String>,
) -> Result<()> {
    let mut props = WriterProperties::builder();
    if !metadata.is_empty() {
        let kv: Vec<KeyValue> = metadata
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        props = props.set_key_value_metadata(Some(kv));
    }

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props.build()))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// First-seen field order across the batch, endpoint fields moved to the
/// front when requested.
fn field_order(records: &[Record], endpoints: Option<(&str, &str)>) -> Result<Vec<String>> {
    let mut order: Vec<String> = Vec::new();
    for record in records {
        for name in record.keys() {
            if !order.iter().any(|n| n == name) {
                order.push(name.clone());
            }
        }
    }

    if let Some((from_field, to_field)) = endpoints {
        for endpoint in [from_field, to_field] {
            if !order.iter().any(|n| n == endpoint) {
                return Err(KgError::Schema(format!(
                    "edge batch is missing endpoint field '{}'",
                    endpoint
                )));
            }
        }
        order.retain(|n| n != from_field && n != to_field);
        order.insert(0, to_field.to_string());
        order.insert(0, from_field.to_string());
    }

    Ok(order)
}

fn infer_field_type(values: &[&Value]) -> DataType {
    for value in values {
        match value {
            Value::Null => continue,
            Value::Bool(_) => return DataType::Boolean,
            Value::Number(n) if n.is_f64() => return DataType::Float64,
            Value::Number(_) => return DataType::Int64,
            Value::String(_) => return DataType::Utf8,
            Value::Array(_) => {
                return DataType::List(Arc::new(Field::new_list_field(
                    infer_element_type(values),
                    true,
                )));
            }
            // Nested objects are carried JSON-encoded.
            Value::Object(_) => return DataType::Utf8,
        }
    }
    // All-null column.
    DataType::Utf8
}

/// Element type of a list column: the first non-null element seen across
/// the batch's arrays.
fn infer_element_type(values: &[&Value]) -> DataType {
    for value in values {
        if let Value::Array(items) = value {
            for item in items {
                match item {
                    Value::Null => continue,
                    Value::Bool(_) => return DataType::Boolean,
                    Value::Number(n) if n.is_f64() => return DataType::Float64,
                    Value::Number(_) => return DataType::Int64,
                    _ => return DataType::Utf8,
                }
            }
        }
    }
    DataType::Utf8
}

fn values_to_array(values: &[&Value], data_type: &DataType) -> Result<ArrayRef> {
    let array: ArrayRef = match data_type {
        DataType::Utf8 => {
            let arr: StringArray = values.iter().map(|v| string_repr(v)).collect();
            Arc::new(arr)
        }
        DataType::Int64 => {
            let arr: Int64Array = values.iter().map(|v| v.as_i64()).collect();
            Arc::new(arr)
        }
        DataType::Float64 => {
            let arr: Float64Array = values.iter().map(|v| v.as_f64()).collect();
            Arc::new(arr)
        }
        DataType::Boolean => {
            let arr: BooleanArray = values.iter().map(|v| v.as_bool()).collect();
            Arc::new(arr)
        }
        DataType::List(field) => list_values_to_array(values, field)?,
        other => {
            return Err(KgError::Schema(format!(
                "unsupported inferred column type {:?}",
                other
            )));
        }
    };
    Ok(array)
}

fn string_repr(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn list_values_to_array(values: &[&Value], field: &FieldRef) -> Result<ArrayRef> {
    macro_rules! build_list {
        ($builder:expr, $append:expr) => {{
            let mut builder = ListBuilder::new($builder).with_field(field.clone());
            for value in values {
                match value {
                    Value::Array(items) => {
                        for item in items {
                            ($append)(builder.values(), item);
                        }
                        builder.append(true);
                    }
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish()) as ArrayRef
        }};
    }

    let array = match field.data_type() {
        DataType::Utf8 => build_list!(StringBuilder::new(), |b: &mut StringBuilder, v: &Value| {
            b.append_option(string_repr(v))
        }),
        DataType::Int64 => build_list!(Int64Builder::new(), |b: &mut Int64Builder, v: &Value| {
            b.append_option(v.as_i64())
        }),
        DataType::Float64 => {
            build_list!(Float64Builder::new(), |b: &mut Float64Builder, v: &Value| {
                b.append_option(v.as_f64())
            })
        }
        DataType::Boolean => {
            build_list!(BooleanBuilder::new(), |b: &mut BooleanBuilder, v: &Value| {
                b.append_option(v.as_bool())
            })
        }
        other => {
            return Err(KgError::Schema(format!(
                "unsupported list element type {:?}",
                other
            )));
        }
    };
    Ok(array)
}

#[cfg(test)]
mod tests {
    use arrow::array::Array;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::dataset::{file_row_count, validate_dataset_row_count};

    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn node_records() -> Vec<Record> {
        vec![
            record(json!({
                "id": "g:1",
                "category": "biolink:Gene",
                "name": "BRCA1",
                "weight": 0.5,
                "all_names": ["BRCA1", "breast cancer 1"],
            })),
            record(json!({
                "id": "g:2",
                "category": "biolink:Gene",
                "name": "TP53",
                "weight": 1.25,
                "all_names": ["TP53"],
                "iri": "http://example.org/g2",
            })),
        ]
    }

    #[test]
    fn schema_is_inferred_in_first_seen_field_order() {
        let batch = records_to_batch(&node_records(), None).unwrap();
        let schema = batch.schema();
        let names: Vec<&str> = schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(
            names,
            vec!["id", "category", "name", "weight", "all_names", "iri"]
        );

        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(3).data_type(), &DataType::Float64);
        assert!(matches!(schema.field(4).data_type(), DataType::List(_)));

        // Field absent from the first record is null there.
        let iri = batch
            .column(5)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert!(iri.is_null(0));
        assert_eq!(iri.value(1), "http://example.org/g2");
    }

    #[test]
    fn endpoint_fields_become_the_first_two_columns() {
        let edges = vec![record(json!({
            "predicate": "biolink:affects",
            "subject": "g:1",
            "object": "g:2",
            "knowledge_level": "observed",
        }))];
        let batch = records_to_batch(&edges, Some(("subject", "object"))).unwrap();
        let schema = batch.schema();
        let names: Vec<&str> = schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(
            names,
            vec!["subject", "object", "predicate", "knowledge_level"]
        );
    }

    #[test]
    fn missing_endpoint_field_is_a_schema_error() {
        let edges = vec![record(json!({"predicate": "p", "subject": "a"}))];
        let err = records_to_batch(&edges, Some(("subject", "object"))).unwrap_err();
        assert!(matches!(err, KgError::Schema(_)), "unexpected error: {err}");
    }

    #[test]
    fn nested_objects_are_json_encoded_strings() {
        let records = vec![record(json!({"id": "x", "attrs": {"k": 1}}))];
        let batch = records_to_batch(&records, None).unwrap();
        let attrs = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(attrs.value(0), r#"{"k":1}"#);
    }

    #[test]
    fn written_file_carries_rows_and_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodes.0.parquet");
        let batch = records_to_batch(&node_records(), None).unwrap();

        let metadata =
            BTreeMap::from([("source_data_json_schema".to_string(), "{}".to_string())]);
        write_batch_file(&batch, &path, &metadata).unwrap();

        assert_eq!(file_row_count(&path).unwrap(), 2);

        let reader =
            parquet::file::reader::SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        use parquet::file::reader::FileReader;
        let kv = reader
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .expect("expected key/value metadata");
        assert!(kv
            .iter()
            .any(|entry| entry.key == "source_data_json_schema"));
    }

    #[test]
    fn row_count_validation_raises_on_mismatch() {
        let dir = TempDir::new().unwrap();
        let batch = records_to_batch(&node_records(), None).unwrap();
        write_batch_file(&batch, &dir.path().join("nodes.0.parquet"), &BTreeMap::new()).unwrap();
        write_batch_file(&batch, &dir.path().join("nodes.1.parquet"), &BTreeMap::new()).unwrap();

        validate_dataset_row_count(dir.path(), 4).unwrap();
        let err = validate_dataset_row_count(dir.path(), 5).unwrap_err();
        assert!(matches!(err, KgError::Validation(_)), "unexpected error: {err}");
    }
}
