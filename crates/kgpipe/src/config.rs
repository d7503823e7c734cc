use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level collection holding node records.
pub const NODES_COLLECTION: &str = "nodes";
/// Top-level collection holding edge records.
pub const EDGES_COLLECTION: &str = "edges";

/// Edge fields consumed positionally as the from/to endpoint references.
pub const SUBJECT_FIELD: &str = "subject";
pub const OBJECT_FIELD: &str = "object";

/// Node field used as the primary key.
pub const PRIMARY_KEY_FIELD: &str = "id";
/// Node field carrying the `prefix:TypeName` category identifier.
pub const CATEGORY_FIELD: &str = "category";
/// Edge field carrying the `prefix:relation_name` identifier.
pub const PREDICATE_FIELD: &str = "predicate";

/// File-level metadata key carrying the inferred source schema string.
pub const SOURCE_SCHEMA_METADATA_KEY: &str = "source_data_json_schema";

const DEFAULT_SOURCE_URL: &str =
    "https://github.com/ncats/translator-lfs-artifacts/raw/main/files/kg2c_lite_2.8.4.json.gz";
const DEFAULT_CHUNK_SIZE: usize = 50_000;
const DEFAULT_SAMPLE_CHUNK_SIZE: usize = 5;
const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// All knobs for one pipeline run, built once at startup and passed to each
/// stage. Derived locations are pure functions of `source_url` + `data_dir`,
/// so every stage agrees on the layout without shared mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// URL of the gzip-compressed source document.
    pub source_url: String,
    /// Directory holding the archive, extracted JSON, and all datasets.
    pub data_dir: PathBuf,
    /// Records per columnar chunk file.
    pub chunk_size: usize,
    /// Records sampled per item collection for schema inference.
    pub sample_chunk_size: usize,
    /// Bulk-copy retry budget for transient store conflicts.
    pub retry_attempts: u32,
}

impl PipelineConfig {
    pub fn new(source_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            source_url: source_url.into(),
            data_dir: data_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_chunk_size: DEFAULT_SAMPLE_CHUNK_SIZE,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    /// Archive file name, taken from the last segment of the source URL.
    fn archive_name(&self) -> &str {
        self.source_url
            .rsplit('/')
            .next()
            .unwrap_or(self.source_url.as_str())
    }

    /// Base name shared by every derived artifact (archive name without the
    /// trailing `.json.gz`).
    fn stem(&self) -> &str {
        let name = self.archive_name();
        name.strip_suffix(".json.gz")
            .or_else(|| name.strip_suffix(".gz"))
            .unwrap_or(name)
    }

    fn derived(&self, suffix: &str) -> PathBuf {
        self.data_dir.join(format!("{}{}", self.stem(), suffix))
    }

    /// Downloaded gzip archive.
    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(self.archive_name())
    }

    /// Extracted source document.
    pub fn extracted_json_path(&self) -> PathBuf {
        self.derived(".json")
    }

    /// Sample document assembled from the head of each collection.
    pub fn sample_json_path(&self) -> PathBuf {
        self.derived(".sample.json")
    }

    /// Inferred JSON schema of the sample document.
    pub fn sample_schema_path(&self) -> PathBuf {
        self.derived(".sample.schema.json")
    }

    /// Coarse parquet dataset (one sub-directory per item collection).
    pub fn dataset_dir(&self) -> PathBuf {
        self.derived(".full.dataset.parquet")
    }

    /// Typed parquet dataset (one sub-table per category / predicate pair).
    pub fn typed_dataset_dir(&self) -> PathBuf {
        self.derived(".full.typed.dataset.parquet")
    }

    /// Statement script emitted by the load stage.
    pub fn script_path(&self) -> PathBuf {
        self.derived(".load.cypher")
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig::new(DEFAULT_SOURCE_URL, Path::new("data"))
    }
}
