use std::fs::File;
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};
use serde_json::{json, Value};
use tempfile::TempDir;

use kgpipe::dataset::{dataset_row_count, parquet_files, verify_uniform_schema};
use kgpipe::pipeline::{run_all, run_convert, run_partition, run_sample};
use kgpipe::{GraphStore, KgError, PipelineConfig, ScriptStore, StoreError};

fn source_document() -> Value {
    json!({
        "build": "test-build-1",
        "biolink_version": "3.1.2",
        "nodes": [
            {"id": "g:1", "category": "biolink:Gene", "name": "BRCA1",
             "all_names": ["BRCA1", "breast cancer 1"]},
            {"id": "g:2", "category": "biolink:Gene", "name": "TP53",
             "all_names": ["TP53"]},
            {"id": "g:3", "category": "biolink:Gene", "name": "EGFR",
             "all_names": ["EGFR"]},
            {"id": "d:1", "category": "biolink:Disease", "name": "pancreatitis",
             "all_names": ["pancreatitis"]},
            {"id": "d:2", "category": "biolink:Disease", "name": "asthma",
             "all_names": ["asthma"]},
            {"id": "c:1", "category": "biolink:ChemicalEntity", "name": "aspirin",
             "all_names": ["aspirin"]}
        ],
        "edges": [
            {"subject": "g:1", "object": "d:1", "predicate": "biolink:affects",
             "knowledge_level": "observed"},
            {"subject": "g:2", "object": "d:2", "predicate": "biolink:affects",
             "knowledge_level": "observed"},
            {"subject": "c:1", "object": "d:1", "predicate": "biolink:affects",
             "knowledge_level": "predicted"},
            {"subject": "g:1", "object": "g:2", "predicate": "biolink:interacts_with",
             "knowledge_level": "observed"}
        ]
    })
}

fn test_config(data_dir: &Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::new("https://example.com/files/kg_test_0.1.json.gz", data_dir);
    cfg.chunk_size = 2;
    cfg.sample_chunk_size = 2;
    cfg
}

fn write_source(cfg: &PipelineConfig, doc: &Value) {
    std::fs::create_dir_all(&cfg.data_dir).unwrap();
    std::fs::write(cfg.extracted_json_path(), doc.to_string()).unwrap();
}

struct RecordingStore {
    statements: Vec<String>,
}

impl RecordingStore {
    fn new() -> Self {
        RecordingStore {
            statements: Vec::new(),
        }
    }
}

impl GraphStore for RecordingStore {
    fn execute(&mut self, statement: &str) -> Result<(), StoreError> {
        self.statements.push(statement.to_string());
        Ok(())
    }
}

fn file_metadata_value(path: &Path, key: &str) -> Option<String> {
    let reader = SerializedFileReader::new(File::open(path).unwrap()).unwrap();
    reader
        .metadata()
        .file_metadata()
        .key_value_metadata()?
        .iter()
        .find(|kv| kv.key == key)
        .and_then(|kv| kv.value.clone())
}

#[tokio::test]
async fn full_pipeline_produces_a_loaded_typed_dataset() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(tmp.path());
    write_source(&cfg, &source_document());

    let mut store = RecordingStore::new();
    run_all(&cfg, &mut store).await.unwrap();

    // ── coarse dataset: chunked files, metadata, row counts ─────────────
    let coarse = cfg.dataset_dir();
    let node_files = parquet_files(&coarse.join("nodes")).unwrap();
    assert_eq!(node_files.len(), 3); // 6 records, chunks of 2
    assert_eq!(dataset_row_count(&coarse.join("nodes")).unwrap(), 6);
    assert_eq!(dataset_row_count(&coarse.join("edges")).unwrap(), 4);

    assert_eq!(
        file_metadata_value(&node_files[0], "build").as_deref(),
        Some("test-build-1")
    );
    let schema_meta = file_metadata_value(&node_files[0], "source_data_json_schema")
        .expect("expected inferred schema metadata");
    let schema: Value = serde_json::from_str(&schema_meta).unwrap();
    assert_eq!(schema["properties"]["build"]["type"], json!("string"));

    // ── typed dataset: per-category and per-pair sub-tables ─────────────
    let typed = cfg.typed_dataset_dir();
    for table in ["Gene", "Disease", "ChemicalEntity"] {
        let dir = typed.join("nodes").join(table);
        assert!(dir.is_dir(), "missing node partition {table}");
        verify_uniform_schema(&dir).unwrap();
    }
    assert!(typed.join("edges/affects/Gene_Disease").is_dir());
    assert!(typed.join("edges/affects/ChemicalEntity_Disease").is_dir());
    assert!(typed.join("edges/interacts_with/Gene_Gene").is_dir());

    // partition completeness
    assert_eq!(dataset_row_count(&typed.join("nodes")).unwrap(), 6);
    assert_eq!(dataset_row_count(&typed.join("edges")).unwrap(), 4);

    // ── statement stream: content and strict node-before-edge order ─────
    let statements = &store.statements;
    assert!(statements
        .iter()
        .any(|s| s.starts_with("CREATE NODE TABLE Gene(") && s.contains("PRIMARY KEY (id)")));
    assert!(statements
        .iter()
        .any(|s| s.starts_with("CREATE REL TABLE GROUP affects (")
            && s.contains("FROM Gene TO Disease")
            && s.contains("FROM ChemicalEntity TO Disease")));
    assert!(statements
        .iter()
        .any(|s| s.starts_with("CREATE REL TABLE interacts_with (FROM Gene TO Gene")));
    assert!(statements
        .iter()
        .any(|s| s.starts_with("COPY affects_Gene_Disease FROM ")));
    assert!(statements
        .iter()
        .any(|s| s.starts_with("COPY interacts_with FROM ")));

    let node_tables = ["Gene", "Disease", "ChemicalEntity"];
    let is_edge_stmt = |s: &str| s.contains("affects") || s.contains("interacts_with");
    let is_node_stmt =
        |s: &str| !is_edge_stmt(s) && node_tables.iter().any(|t| s.contains(t));
    let last_node = statements
        .iter()
        .rposition(|s| is_node_stmt(s))
        .expect("expected node statements");
    let first_edge = statements
        .iter()
        .position(|s| is_edge_stmt(s))
        .expect("expected edge statements");
    assert!(
        last_node < first_edge,
        "node statement at {last_node} appears after edge statement at {first_edge}:\n{statements:#?}"
    );

    // endpoint columns stay positional: never declared as rel payload
    for stmt in statements.iter().filter(|s| s.contains("REL TABLE")) {
        assert!(!stmt.contains("subject STRING"), "payload leak in {stmt}");
        assert!(!stmt.contains("object STRING"), "payload leak in {stmt}");
    }
}

#[tokio::test]
async fn rerunning_stages_clobbers_and_rebuilds() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(tmp.path());
    write_source(&cfg, &source_document());

    run_sample(&cfg).unwrap();
    run_convert(&cfg).unwrap();
    run_partition(&cfg).await.unwrap();

    // second run over the same inputs succeeds and keeps counts stable
    run_convert(&cfg).unwrap();
    run_partition(&cfg).await.unwrap();

    assert_eq!(
        dataset_row_count(&cfg.typed_dataset_dir().join("nodes")).unwrap(),
        6
    );
    assert_eq!(
        dataset_row_count(&cfg.typed_dataset_dir().join("edges")).unwrap(),
        4
    );
}

#[tokio::test]
async fn dangling_edge_endpoint_stops_the_partition_stage() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(tmp.path());
    let mut doc = source_document();
    doc["edges"]
        .as_array_mut()
        .unwrap()
        .push(json!({
            "subject": "missing:1",
            "object": "d:1",
            "predicate": "biolink:affects",
            "knowledge_level": "observed"
        }));
    write_source(&cfg, &doc);

    run_sample(&cfg).unwrap();
    run_convert(&cfg).unwrap();
    let err = run_partition(&cfg).await.unwrap_err();
    assert!(matches!(err, KgError::Validation(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn script_store_captures_the_full_statement_stream() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(tmp.path());
    write_source(&cfg, &source_document());

    let script_path = cfg.script_path();
    let mut store = ScriptStore::create(&script_path).unwrap();
    run_all(&cfg, &mut store).await.unwrap();
    let statements = store.finish().unwrap();
    assert!(statements > 0);

    let script = std::fs::read_to_string(&script_path).unwrap();
    let drop_line = script.lines().position(|l| l == "DROP TABLE ChemicalEntity;");
    let copy_line = script
        .lines()
        .position(|l| l.starts_with("COPY ChemicalEntity FROM "));
    assert!(drop_line.unwrap() < copy_line.unwrap());
}
