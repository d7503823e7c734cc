//! Stage orchestration over one [`PipelineConfig`].
//!
//! Stages run in order: sample -> convert -> partition -> load. Dataset
//! directories are clobbered and rebuilt by their producing stage and the
//! loader drops tables before recreating them, so a rerun repeats completed
//! stages instead of resuming.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::config::{
    PipelineConfig, EDGES_COLLECTION, NODES_COLLECTION, OBJECT_FIELD, SOURCE_SCHEMA_METADATA_KEY,
    SUBJECT_FIELD,
};
use crate::dataset::partition::partition_dataset;
use crate::dataset::write::write_collection;
use crate::dataset::{dataset_row_count, validate_dataset_row_count};
use crate::error::{KgError, Result};
use crate::source::{
    collection_names, count_collection_items, infer_json_schema, read_metadata_value,
    read_sample_items,
};
use crate::store::{load_dataset, GraphStore};

/// Names and item counts of every top-level collection, in document order.
/// A zero count marks a scalar metadata collection.
pub fn inspect_document(json_path: &Path) -> Result<Vec<(String, u64)>> {
    collection_names(json_path)?
        .into_iter()
        .map(|name| {
            let count = count_collection_items(json_path, &name)?;
            Ok((name, count))
        })
        .collect()
}

/// Assemble a sample document from the head of every collection and write
/// it together with its inferred JSON schema.
#[instrument(skip(cfg))]
pub fn run_sample(cfg: &PipelineConfig) -> Result<()> {
    let json_path = cfg.extracted_json_path();
    let collections = inspect_document(&json_path)?;

    let mut sample = Map::new();
    for (name, count) in &collections {
        if *count == 0 {
            sample.insert(name.clone(), read_metadata_value(&json_path, name)?);
        } else {
            let items = read_sample_items(&json_path, name, cfg.sample_chunk_size, 1)?;
            sample.insert(
                name.clone(),
                Value::Array(items.into_iter().map(Value::Object).collect()),
            );
        }
    }
    let sample = Value::Object(sample);

    std::fs::create_dir_all(&cfg.data_dir)?;
    std::fs::write(cfg.sample_json_path(), serde_json::to_string_pretty(&sample)?)?;

    let schema = infer_json_schema(&sample);
    std::fs::write(cfg.sample_schema_path(), serde_json::to_string_pretty(&schema)?)?;

    info!(
        sample = %cfg.sample_json_path().display(),
        schema = %cfg.sample_schema_path().display(),
        "sample and inferred schema written"
    );
    Ok(())
}

/// Convert the source document into the coarse parquet dataset, attaching
/// the metadata dict to every file, then validate row counts per collection.
#[instrument(skip(cfg))]
pub fn run_convert(cfg: &PipelineConfig) -> Result<()> {
    let json_path = cfg.extracted_json_path();
    let collections = inspect_document(&json_path)?;
    let metadata = collect_metadata(cfg, &json_path, &collections)?;

    let dataset_dir = cfg.dataset_dir();
    recreate_dir(&dataset_dir)?;

    for (name, count) in &collections {
        if *count == 0 {
            continue;
        }
        let endpoints = (name == EDGES_COLLECTION).then_some((SUBJECT_FIELD, OBJECT_FIELD));
        let rows = write_collection(
            &json_path,
            name,
            &dataset_dir,
            cfg.chunk_size,
            &metadata,
            endpoints,
        )?;
        validate_dataset_row_count(&dataset_dir.join(name), *count)?;
        info!(collection = name.as_str(), rows, "collection converted");
    }
    Ok(())
}

/// Re-bucket the coarse dataset per category / predicate pair, then check
/// that no rows were lost or duplicated on either side.
#[instrument(skip(cfg))]
pub async fn run_partition(cfg: &PipelineConfig) -> Result<()> {
    let coarse_dir = cfg.dataset_dir();
    let typed_dir = cfg.typed_dataset_dir();
    recreate_dir(&typed_dir)?;

    partition_dataset(&coarse_dir, &typed_dir, cfg.chunk_size).await?;

    for name in [NODES_COLLECTION, EDGES_COLLECTION] {
        let coarse_side = coarse_dir.join(name);
        if coarse_side.is_dir() {
            validate_dataset_row_count(&typed_dir.join(name), dataset_row_count(&coarse_side)?)?;
        }
    }
    info!(typed = %typed_dir.display(), "typed dataset written");
    Ok(())
}

/// Create and bulk-load every typed table through `store`.
pub fn run_load(cfg: &PipelineConfig, store: &mut dyn GraphStore) -> Result<()> {
    load_dataset(store, &cfg.typed_dataset_dir(), cfg.retry_attempts)
}

/// Run sample, convert, partition, and load back to back.
pub async fn run_all(cfg: &PipelineConfig, store: &mut dyn GraphStore) -> Result<()> {
    run_sample(cfg)?;
    run_convert(cfg)?;
    run_partition(cfg).await?;
    run_load(cfg, store)
}

/// Scalar metadata collections plus the inferred source schema, as the
/// string map attached to every converted file.
fn collect_metadata(
    cfg: &PipelineConfig,
    json_path: &Path,
    collections: &[(String, u64)],
) -> Result<BTreeMap<String, String>> {
    let schema_path = cfg.sample_schema_path();
    if !schema_path.exists() {
        return Err(KgError::Schema(format!(
            "inferred schema not found at {}; run the sample stage first",
            schema_path.display()
        )));
    }
    let schema: Value = serde_json::from_str(&std::fs::read_to_string(&schema_path)?)?;

    let mut metadata = BTreeMap::new();
    for (name, count) in collections {
        if *count == 0 {
            let value = read_metadata_value(json_path, name)?;
            metadata.insert(name.clone(), metadata_string(&value));
        }
    }
    metadata.insert(SOURCE_SCHEMA_METADATA_KEY.to_string(), schema.to_string());
    Ok(metadata)
}

fn metadata_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}
