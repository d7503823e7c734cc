//! Table creation and bulk copy over a typed dataset.
//!
//! Per table the state machine is drop -> create -> copy. All node tables
//! complete before any edge work begins: edge rows reference node primary
//! keys, so an edge copy against a half-loaded node phase would fail (or
//! worse, retry forever).

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::config::{EDGES_COLLECTION, NODES_COLLECTION, PRIMARY_KEY_FIELD};
use crate::dataset::verify_uniform_schema;
use crate::ddl::{node_table_statement, rel_table_statement};
use crate::error::{KgError, Result};

use super::retry::{drop_table_if_exists, execute_with_retry};
use super::GraphStore;

/// Create and bulk-load every table of the typed dataset under `typed_dir`.
#[instrument(skip(store), fields(typed = %typed_dir.display()))]
pub fn load_dataset(
    store: &mut dyn GraphStore,
    typed_dir: &Path,
    retry_attempts: u32,
) -> Result<()> {
    load_node_tables(store, &typed_dir.join(NODES_COLLECTION), retry_attempts)?;

    let edges_dir = typed_dir.join(EDGES_COLLECTION);
    if edges_dir.is_dir() {
        load_edge_tables(store, &edges_dir, retry_attempts)?;
    }
    Ok(())
}

fn load_node_tables(
    store: &mut dyn GraphStore,
    nodes_dir: &Path,
    retry_attempts: u32,
) -> Result<()> {
    for table_dir in sorted_subdirs(nodes_dir)? {
        let table = dir_name(&table_dir)?;
        verify_uniform_schema(&table_dir)?;

        drop_table_if_exists(store, &table)?;
        let create = node_table_statement(&table_dir, &table, PRIMARY_KEY_FIELD)?;
        execute_statement(store, &create)?;

        let copy = copy_statement(&table, &table_dir);
        execute_with_retry(store, &copy, retry_attempts)?;
        info!(table = table.as_str(), "node table loaded");
    }
    Ok(())
}

fn load_edge_tables(
    store: &mut dyn GraphStore,
    edges_dir: &Path,
    retry_attempts: u32,
) -> Result<()> {
    for table_dir in sorted_subdirs(edges_dir)? {
        let table = dir_name(&table_dir)?;
        verify_uniform_schema(&table_dir)?;

        let pair_dirs = sorted_subdirs(&table_dir)?;
        let pairs = pair_dirs
            .iter()
            .map(|dir| endpoint_pair(dir))
            .collect::<Result<Vec<_>>>()?;

        drop_table_if_exists(store, &table)?;
        let create = rel_table_statement(&table_dir, &table, &pairs)?;
        execute_statement(store, &create)?;

        for (pair_dir, (subject_type, object_type)) in pair_dirs.iter().zip(&pairs) {
            // A group member table carries the pair-qualified name.
            let target = if pairs.len() == 1 {
                table.clone()
            } else {
                format!("{}_{}_{}", table, subject_type, object_type)
            };
            let copy = copy_statement(&target, pair_dir);
            execute_with_retry(store, &copy, retry_attempts)?;
        }
        info!(table = table.as_str(), pairs = pairs.len(), "relationship table loaded");
    }
    Ok(())
}

fn copy_statement(table: &str, dataset_dir: &Path) -> String {
    format!("COPY {} FROM \"{}/*.parquet\"", table, dataset_dir.display())
}

fn execute_statement(store: &mut dyn GraphStore, statement: &str) -> Result<()> {
    store
        .execute(statement)
        .map_err(|err| KgError::Store(err.message))
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(dir: &Path) -> Result<String> {
    dir.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| {
            KgError::Schema(format!("unusable dataset directory name: {}", dir.display()))
        })
}

/// Parse a `<SubjectType>_<ObjectType>` pair directory name.
fn endpoint_pair(dir: &Path) -> Result<(String, String)> {
    let name = dir_name(dir)?;
    match name.split_once('_') {
        Some((subject_type, object_type))
            if !subject_type.is_empty() && !object_type.is_empty() =>
        {
            Ok((subject_type.to_string(), object_type.to_string()))
        }
        _ => Err(KgError::Schema(format!(
            "expected a '<SubjectType>_<ObjectType>' directory name, got '{}'",
            name
        ))),
    }
}
