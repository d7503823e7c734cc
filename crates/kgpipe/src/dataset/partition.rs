//! Re-bucketing of the coarse node/edge datasets into per-type sub-tables.
//!
//! Nodes split per `category`; edges split per
//! (`predicate`, subject category, object category), with endpoint
//! categories resolved through joins against the node dataset. All queries
//! run through DataFusion over the registered parquet directories. Export
//! queries carry a deterministic ORDER BY so LIMIT/OFFSET chunking stays
//! sound across executions; within a chunk, row order is not part of the
//! contract.
//!
//! Partition jobs only read the immutable coarse datasets and write to
//! disjoint output directories, so they are independent of one another.

use std::fs::File;
use std::path::Path;

use arrow::array::{Array, Int64Array, RecordBatch, StringArray};
use datafusion::prelude::{ParquetReadOptions, SessionConfig, SessionContext};
use parquet::arrow::ArrowWriter;
use tracing::{debug, info, instrument};

use crate::config::{
    CATEGORY_FIELD, EDGES_COLLECTION, NODES_COLLECTION, OBJECT_FIELD, PREDICATE_FIELD,
    PRIMARY_KEY_FIELD, SUBJECT_FIELD,
};
use crate::error::{KgError, Result};

/// Split the coarse dataset under `coarse_dir` into typed sub-datasets under
/// `typed_dir`. The node dataset is required; the edge dataset is optional
/// but, when present, every edge endpoint must resolve to a node id.
#[instrument(skip_all, fields(coarse = %coarse_dir.display(), typed = %typed_dir.display()))]
pub async fn partition_dataset(
    coarse_dir: &Path,
    typed_dir: &Path,
    chunk_size: usize,
) -> Result<()> {
    if chunk_size == 0 {
        return Err(KgError::Schema("chunk size must be non-zero".to_string()));
    }

    let nodes_dir = coarse_dir.join(NODES_COLLECTION);
    if !nodes_dir.is_dir() {
        return Err(KgError::Partition(format!(
            "coarse node dataset not found at {}",
            nodes_dir.display()
        )));
    }

    let mut config = SessionConfig::new();
    config.options_mut().execution.parquet.schema_force_view_types = false;
    let ctx = SessionContext::new_with_config(config);
    ctx.register_parquet(
        NODES_COLLECTION,
        table_url(&nodes_dir),
        ParquetReadOptions::default(),
    )
    .await?;

    let edges_dir = coarse_dir.join(EDGES_COLLECTION);
    let has_edges = edges_dir.is_dir();
    if has_edges {
        ctx.register_parquet(
            EDGES_COLLECTION,
            table_url(&edges_dir),
            ParquetReadOptions::default(),
        )
        .await?;
        check_edge_endpoints(&ctx).await?;
    }

    partition_nodes(&ctx, typed_dir, chunk_size).await?;
    if has_edges {
        partition_edges(&ctx, typed_dir, chunk_size).await?;
    }
    Ok(())
}

/// Strip the `prefix:` portion of a compound identifier, yielding the
/// storage-safe table name.
pub fn strip_prefixed_name(compound: &str) -> Result<&str> {
    match compound.split_once(':') {
        Some((_, name)) if !name.is_empty() => Ok(name),
        _ => Err(KgError::Schema(format!(
            "expected a 'prefix:name' compound identifier, got '{}'",
            compound
        ))),
    }
}

/// Fail when any edge endpoint does not resolve to a node id. Dangling
/// references would otherwise silently drop rows from the joined exports.
async fn check_edge_endpoints(ctx: &SessionContext) -> Result<()> {
    let sql = format!(
        "SELECT COUNT(*) FROM {edges} e \
         LEFT JOIN {nodes} sn ON e.{subject} = sn.{id} \
         LEFT JOIN {nodes} tn ON e.{object} = tn.{id} \
         WHERE sn.{id} IS NULL OR tn.{id} IS NULL",
        edges = EDGES_COLLECTION,
        nodes = NODES_COLLECTION,
        subject = SUBJECT_FIELD,
        object = OBJECT_FIELD,
        id = PRIMARY_KEY_FIELD,
    );
    let dangling = scalar_count(ctx, &sql).await?;
    if dangling > 0 {
        return Err(KgError::Validation(format!(
            "{} edge(s) reference a subject or object id with no matching node",
            dangling
        )));
    }
    Ok(())
}

async fn partition_nodes(ctx: &SessionContext, typed_dir: &Path, chunk_size: usize) -> Result<()> {
    let categories = distinct_strings(
        ctx,
        &format!(
            "SELECT DISTINCT {cat} FROM {nodes} ORDER BY {cat}",
            cat = CATEGORY_FIELD,
            nodes = NODES_COLLECTION
        ),
    )
    .await?;

    for category in &categories {
        let table = strip_prefixed_name(category)?;
        let out_dir = typed_dir.join(NODES_COLLECTION).join(table);
        std::fs::create_dir_all(&out_dir)?;

        let filter = format!(
            "{cat} = '{value}'",
            cat = CATEGORY_FIELD,
            value = sql_literal(category)
        );
        let total = scalar_count(
            ctx,
            &format!(
                "SELECT COUNT(*) FROM {nodes} WHERE {filter}",
                nodes = NODES_COLLECTION
            ),
        )
        .await?;
        let base = format!(
            "SELECT * FROM {nodes} WHERE {filter} ORDER BY {id}",
            nodes = NODES_COLLECTION,
            id = PRIMARY_KEY_FIELD
        );
        export_chunks(ctx, &base, total, chunk_size, &out_dir, table).await?;
        info!(category = category.as_str(), rows = total, "node partition exported");
    }
    Ok(())
}

async fn partition_edges(ctx: &SessionContext, typed_dir: &Path, chunk_size: usize) -> Result<()> {
    let predicates = distinct_strings(
        ctx,
        &format!(
            "SELECT DISTINCT {pred} FROM {edges} ORDER BY {pred}",
            pred = PREDICATE_FIELD,
            edges = EDGES_COLLECTION
        ),
    )
    .await?;

    let joined_edges = format!(
        "{edges} e \
         JOIN {nodes} sn ON e.{subject} = sn.{id} \
         JOIN {nodes} tn ON e.{object} = tn.{id}",
        edges = EDGES_COLLECTION,
        nodes = NODES_COLLECTION,
        subject = SUBJECT_FIELD,
        object = OBJECT_FIELD,
        id = PRIMARY_KEY_FIELD,
    );

    for predicate in &predicates {
        let table = strip_prefixed_name(predicate)?;
        let predicate_filter = format!(
            "e.{pred} = '{value}'",
            pred = PREDICATE_FIELD,
            value = sql_literal(predicate)
        );

        let pairs = string_pairs(
            ctx,
            &format!(
                "SELECT DISTINCT \
                 split_part(sn.{cat}, ':', 2) AS subj_type, \
                 split_part(tn.{cat}, ':', 2) AS obj_type \
                 FROM {joined_edges} WHERE {predicate_filter} \
                 ORDER BY subj_type, obj_type",
                cat = CATEGORY_FIELD,
            ),
        )
        .await?;

        for (subj_type, obj_type) in &pairs {
            let out_dir = typed_dir
                .join(EDGES_COLLECTION)
                .join(table)
                .join(format!("{}_{}", subj_type, obj_type));
            std::fs::create_dir_all(&out_dir)?;

            let pair_filter = format!(
                "{predicate_filter} \
                 AND split_part(sn.{cat}, ':', 2) = '{subj}' \
                 AND split_part(tn.{cat}, ':', 2) = '{obj}'",
                cat = CATEGORY_FIELD,
                subj = sql_literal(subj_type),
                obj = sql_literal(obj_type),
            );
            let total = scalar_count(
                ctx,
                &format!("SELECT COUNT(*) FROM {joined_edges} WHERE {pair_filter}"),
            )
            .await?;
            let base = format!(
                "SELECT e.* FROM {joined_edges} WHERE {pair_filter} \
                 ORDER BY e.{subject}, e.{object}",
                subject = SUBJECT_FIELD,
                object = OBJECT_FIELD,
            );
            let prefix = format!("{}.{}_{}", table, subj_type, obj_type);
            export_chunks(ctx, &base, total, chunk_size, &out_dir, &prefix).await?;
            debug!(
                predicate = predicate.as_str(),
                subj_type = subj_type.as_str(),
                obj_type = obj_type.as_str(),
                rows = total,
                "edge partition exported"
            );
        }
        info!(predicate = predicate.as_str(), pairs = pairs.len(), "predicate exported");
    }
    Ok(())
}

/// Export a base query in `chunk_size`-row slices, one parquet file per
/// offset index: `<out_dir>/<prefix>.<index>.parquet`.
async fn export_chunks(
    ctx: &SessionContext,
    base_query: &str,
    total_rows: u64,
    chunk_size: usize,
    out_dir: &Path,
    prefix: &str,
) -> Result<()> {
    for (index, offset) in (0..total_rows).step_by(chunk_size).enumerate() {
        let sql = format!("{} LIMIT {} OFFSET {}", base_query, chunk_size, offset);
        let batches = ctx.sql(&sql).await?.collect().await?;
        let path = out_dir.join(format!("{}.{}.parquet", prefix, index));
        write_batches(&batches, &path)?;
    }
    Ok(())
}

fn write_batches(batches: &[RecordBatch], path: &Path) -> Result<()> {
    let Some(first) = batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(());
    };
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, first.schema(), None)?;
    for batch in batches {
        if batch.num_rows() > 0 {
            writer.write(batch)?;
        }
    }
    writer.close()?;
    Ok(())
}

// ── query helpers ───────────────────────────────────────────────────────────

fn table_url(dir: &Path) -> String {
    format!("{}/", dir.display())
}

fn sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

async fn scalar_count(ctx: &SessionContext, sql: &str) -> Result<u64> {
    let batches = ctx.sql(sql).await?.collect().await?;
    for batch in &batches {
        if batch.num_rows() == 0 {
            continue;
        }
        let counts = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| {
                KgError::Partition(format!("count query returned a non-integer column: {sql}"))
            })?;
        return Ok(counts.value(0).max(0) as u64);
    }
    Ok(0)
}

async fn distinct_strings(ctx: &SessionContext, sql: &str) -> Result<Vec<String>> {
    let batches = ctx.sql(sql).await?.collect().await?;
    let mut values = Vec::new();
    for batch in &batches {
        let column = string_column(batch, 0, sql)?;
        for row in 0..batch.num_rows() {
            if !column.is_null(row) {
                values.push(column.value(row).to_string());
            }
        }
    }
    Ok(values)
}

async fn string_pairs(ctx: &SessionContext, sql: &str) -> Result<Vec<(String, String)>> {
    let batches = ctx.sql(sql).await?.collect().await?;
    let mut pairs = Vec::new();
    for batch in &batches {
        let left = string_column(batch, 0, sql)?;
        let right = string_column(batch, 1, sql)?;
        for row in 0..batch.num_rows() {
            if left.is_null(row) || right.is_null(row) {
                continue;
            }
            pairs.push((left.value(row).to_string(), right.value(row).to_string()));
        }
    }
    Ok(pairs)
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    index: usize,
    sql: &str,
) -> Result<&'a StringArray> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| {
            KgError::Partition(format!("query returned a non-string column {index}: {sql}"))
        })
}
