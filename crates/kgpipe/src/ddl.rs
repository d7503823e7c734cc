//! Physical parquet schema to graph-store DDL.
//!
//! The representative file for a dataset directory is its first discovered
//! parquet file (see the dataset-uniformity precondition in
//! [`crate::dataset`]). Relationship statements skip the first two columns:
//! those are the endpoint references the writer pinned to the front, and the
//! store consumes them through the FROM/TO clauses instead.

use std::path::Path;

use arrow::datatypes::{DataType, SchemaRef};

use crate::dataset::{first_parquet_file, read_file_schema};
use crate::error::{KgError, Result};

/// Map an Arrow type to the store's type name. Unmapped physical types are
/// a [`KgError::UnmappedType`] rather than an invalid token in the emitted
/// statement.
pub fn store_type(data_type: &DataType) -> Result<String> {
    let mapped = match data_type {
        DataType::Utf8 | DataType::LargeUtf8 => "STRING".to_string(),
        DataType::Int32 => "INT32".to_string(),
        DataType::Int64 => "INT64".to_string(),
        DataType::Float32 | DataType::Float64 => "FLOAT".to_string(),
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Struct(_) => "MAP".to_string(),
        DataType::List(field) | DataType::LargeList(field) => {
            format!("{}[]", store_type(field.data_type())?)
        }
        DataType::Date32 | DataType::Date64 => "DATE".to_string(),
        DataType::Time32(_) | DataType::Time64(_) => "TIME".to_string(),
        DataType::Timestamp(_, _) => "DATETIME".to_string(),
        DataType::Null => "ANY".to_string(),
        other => return Err(KgError::UnmappedType(format!("{:?}", other))),
    };
    Ok(mapped)
}

/// `CREATE NODE TABLE` statement for the dataset at `dataset_path`, with
/// every column declared and `primary_key` as the PRIMARY KEY.
pub fn node_table_statement(
    dataset_path: &Path,
    table_name: &str,
    primary_key: &str,
) -> Result<String> {
    let schema = dataset_schema(dataset_path)?;
    if !schema.fields().iter().any(|f| f.name() == primary_key) {
        return Err(KgError::Schema(format!(
            "primary key field '{}' not present in {}",
            primary_key,
            dataset_path.display()
        )));
    }

    let columns = column_declarations(&schema, 0)?;
    Ok(format!(
        "CREATE NODE TABLE {}({}, PRIMARY KEY ({}))",
        table_name, columns, primary_key
    ))
}

/// `CREATE REL TABLE` (one endpoint-type pair) or `CREATE REL TABLE GROUP`
/// (several pairs) statement. The first two physical columns are endpoint
/// references and are not declared as payload.
pub fn rel_table_statement(
    dataset_path: &Path,
    table_name: &str,
    type_pairs: &[(String, String)],
) -> Result<String> {
    if type_pairs.is_empty() {
        return Err(KgError::Schema(format!(
            "no endpoint type pairs supplied for relationship table '{}'",
            table_name
        )));
    }

    let schema = dataset_schema(dataset_path)?;
    let columns = column_declarations(&schema, 2)?;
    let endpoints = type_pairs
        .iter()
        .map(|(subject_type, object_type)| format!("FROM {} TO {}", subject_type, object_type))
        .collect::<Vec<_>>()
        .join(", ");

    let head = if type_pairs.len() == 1 {
        format!("CREATE REL TABLE {}", table_name)
    } else {
        format!("CREATE REL TABLE GROUP {}", table_name)
    };

    if columns.is_empty() {
        Ok(format!("{} ({})", head, endpoints))
    } else {
        Ok(format!("{} ({}, {})", head, endpoints, columns))
    }
}

fn dataset_schema(path: &Path) -> Result<SchemaRef> {
    read_file_schema(&first_parquet_file(path)?)
}

fn column_declarations(schema: &SchemaRef, skip: usize) -> Result<String> {
    let declarations = schema
        .fields()
        .iter()
        .skip(skip)
        .map(|field| Ok(format!("{} {}", field.name(), store_type(field.data_type())?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(declarations.join(", "))
}
