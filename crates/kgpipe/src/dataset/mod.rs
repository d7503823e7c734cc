//! Columnar-dataset helpers.
//!
//! A dataset is a directory of parquet files treated as one logical table.
//! Precondition carried throughout: every file in a dataset directory shares
//! one physical schema. The schema is read from the first discovered file;
//! [`verify_uniform_schema`] is the optional check of that assumption.

pub mod partition;
pub mod write;

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::{FileReader, SerializedFileReader};

use crate::error::{KgError, Result};

/// Parquet files directly inside `dir`, sorted by file name.
pub fn parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "parquet") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// All parquet files under `dir`, any depth, sorted by path.
pub fn parquet_files_recursive(dir: &Path) -> Result<Vec<PathBuf>> {
    fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, files)?;
            } else if path.extension().is_some_and(|ext| ext == "parquet") {
                files.push(path);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

/// Resolve `path` to a concrete parquet file: a file resolves to itself, a
/// directory to its first discovered file.
pub fn first_parquet_file(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    parquet_files_recursive(path)?.into_iter().next().ok_or_else(|| {
        KgError::Schema(format!("no parquet files found under {}", path.display()))
    })
}

/// Row count of one file from footer metadata only (no data scan).
pub fn file_row_count(path: &Path) -> Result<u64> {
    let reader = SerializedFileReader::new(File::open(path)?)?;
    Ok(reader.metadata().file_metadata().num_rows().max(0) as u64)
}

/// Summed row count of every file under `dir`, from footer metadata only.
pub fn dataset_row_count(dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    for file in parquet_files_recursive(dir)? {
        total += file_row_count(&file)?;
    }
    Ok(total)
}

/// Fail loudly when a dataset's summed row count disagrees with the source
/// count. This is the pipeline's end-to-end correctness check; it runs after
/// every bulk write.
pub fn validate_dataset_row_count(dir: &Path, expected: u64) -> Result<()> {
    let actual = dataset_row_count(dir)?;
    if actual != expected {
        return Err(KgError::Validation(format!(
            "row count mismatch for {}: expected {}, found {}",
            dir.display(),
            expected,
            actual
        )));
    }
    Ok(())
}

/// Arrow schema of one parquet file.
pub fn read_file_schema(path: &Path) -> Result<SchemaRef> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    Ok(builder.schema().clone())
}

/// Check that every file under `dir` carries the same column names and
/// types as the first one.
pub fn verify_uniform_schema(dir: &Path) -> Result<()> {
    let files = parquet_files_recursive(dir)?;
    let Some((first, rest)) = files.split_first() else {
        return Err(KgError::Schema(format!(
            "no parquet files found under {}",
            dir.display()
        )));
    };

    let reference = read_file_schema(first)?;
    for file in rest {
        let schema = read_file_schema(file)?;
        let matches = schema.fields().len() == reference.fields().len()
            && schema.fields().iter().zip(reference.fields()).all(|(a, b)| {
                a.name() == b.name() && a.data_type() == b.data_type()
            });
        if !matches {
            return Err(KgError::Schema(format!(
                "schema of {} differs from {} within one dataset",
                file.display(),
                first.display()
            )));
        }
    }
    Ok(())
}
