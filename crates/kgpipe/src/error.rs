use thiserror::Error;

#[derive(Debug, Error)]
pub enum KgError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("no store type mapping for physical type {0}")]
    UnmappedType(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("partition error: {0}")]
    Partition(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("retry budget exhausted after {attempts} attempt(s): {message}")]
    RetryExhausted { attempts: u32, message: String },

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KgError>;
