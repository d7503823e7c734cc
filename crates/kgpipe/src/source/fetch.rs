//! Source archive download and extraction.
//!
//! A plain streamed copy in both directions: HTTP body chunks to the `.gz`
//! archive, then a gzip decode to the extracted document. Network failures
//! are not retried.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use futures::StreamExt;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{KgError, Result};

/// Download the configured archive and extract it next to itself.
pub async fn fetch_archive(cfg: &PipelineConfig) -> Result<()> {
    std::fs::create_dir_all(&cfg.data_dir)?;
    let archive = cfg.archive_path();
    download(&cfg.source_url, &archive).await?;
    extract_archive(&archive, &cfg.extracted_json_path())
}

/// Stream a GET response body to `dest`.
pub async fn download(url: &str, dest: &Path) -> Result<()> {
    info!(url, dest = %dest.display(), "downloading source archive");
    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| KgError::Fetch(format!("GET {}: {}", url, e)))?;

    let mut out = BufWriter::new(File::create(dest)?);
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| KgError::Fetch(format!("GET {}: {}", url, e)))?;
        out.write_all(&chunk)?;
    }
    out.flush()?;
    Ok(())
}

/// Gzip-decode `archive` into `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    info!(archive = %archive.display(), dest = %dest.display(), "extracting archive");
    let mut decoder = GzDecoder::new(BufReader::new(File::open(archive)?));
    let mut out = BufWriter::new(File::create(dest)?);
    std::io::copy(&mut decoder, &mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn extract_round_trips_gzip_content() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("doc.json.gz");
        let extracted = dir.path().join("doc.json");

        let payload = br#"{"nodes": [], "version": "1"}"#;
        let mut encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap();

        extract_archive(&archive, &extracted).unwrap();
        assert_eq!(std::fs::read(&extracted).unwrap(), payload);
    }

    #[test]
    fn extract_rejects_non_gzip_input() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("doc.json.gz");
        std::fs::write(&archive, b"not gzip").unwrap();

        let err = extract_archive(&archive, &dir.path().join("doc.json")).unwrap_err();
        assert!(matches!(err, KgError::Io(_)), "unexpected error: {err}");
    }
}
