use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

use kgpipe::pipeline::{
    inspect_document, run_convert, run_load, run_partition, run_sample,
};
use kgpipe::source::fetch::fetch_archive;
use kgpipe::{PipelineConfig, ScriptStore};

#[derive(Parser)]
#[command(
    name = "kgpipe",
    about = "kgpipe — knowledge-graph JSON to parquet to property-graph store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// URL of the gzip-compressed source document
    #[arg(long)]
    url: Option<String>,
    /// Directory for the archive, extracted JSON, and datasets
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    /// Records per columnar chunk file
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Records sampled per collection for schema inference
    #[arg(long)]
    sample_chunk_size: Option<usize>,
    /// Bulk-copy retry budget for transient store conflicts
    #[arg(long)]
    retry_attempts: Option<u32>,
}

impl ConfigArgs {
    fn into_config(self) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        if let Some(url) = self.url {
            cfg.source_url = url;
        }
        cfg.data_dir = self.data_dir;
        if let Some(chunk_size) = self.chunk_size {
            cfg.chunk_size = chunk_size;
        }
        if let Some(sample_chunk_size) = self.sample_chunk_size {
            cfg.sample_chunk_size = sample_chunk_size;
        }
        if let Some(retry_attempts) = self.retry_attempts {
            cfg.retry_attempts = retry_attempts;
        }
        cfg
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download and extract the source archive
    Fetch {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// List top-level collections and item counts of the extracted document
    Inspect {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Write a sample document and its inferred JSON schema
    Sample {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Convert the extracted document into the coarse parquet dataset
    Convert {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Split the coarse dataset per category / predicate type pair
    Partition {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Emit the DDL and COPY statement script for the typed dataset
    Script {
        #[command(flatten)]
        config: ConfigArgs,
        /// Script destination (defaults next to the datasets)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run sample, convert, partition, and script back to back
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// Script destination (defaults next to the datasets)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch { config } => cmd_fetch(config.into_config()).await,
        Commands::Inspect { config } => cmd_inspect(config.into_config()),
        Commands::Sample { config } => cmd_sample(config.into_config()),
        Commands::Convert { config } => cmd_convert(config.into_config()),
        Commands::Partition { config } => cmd_partition(config.into_config()).await,
        Commands::Script { config, out } => cmd_script(config.into_config(), out),
        Commands::Run { config, out } => cmd_run(config.into_config(), out).await,
    }?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[instrument(skip(cfg), fields(url = cfg.source_url.as_str()))]
async fn cmd_fetch(cfg: PipelineConfig) -> Result<()> {
    fetch_archive(&cfg).await?;
    println!("Extracted {}", cfg.extracted_json_path().display());
    Ok(())
}

#[instrument(skip(cfg))]
fn cmd_inspect(cfg: PipelineConfig) -> Result<()> {
    let collections = inspect_document(&cfg.extracted_json_path())?;
    println!("{:<40} {:>12} KIND", "COLLECTION", "ITEMS");
    for (name, count) in &collections {
        let kind = if *count == 0 { "metadata" } else { "items" };
        println!("{:<40} {:>12} {}", name, count, kind);
    }
    Ok(())
}

#[instrument(skip(cfg))]
fn cmd_sample(cfg: PipelineConfig) -> Result<()> {
    run_sample(&cfg)?;
    println!("Sample schema at {}", cfg.sample_schema_path().display());
    Ok(())
}

#[instrument(skip(cfg))]
fn cmd_convert(cfg: PipelineConfig) -> Result<()> {
    run_convert(&cfg)?;
    println!("Coarse dataset at {}", cfg.dataset_dir().display());
    Ok(())
}

#[instrument(skip(cfg))]
async fn cmd_partition(cfg: PipelineConfig) -> Result<()> {
    run_partition(&cfg).await?;
    println!("Typed dataset at {}", cfg.typed_dataset_dir().display());
    Ok(())
}

#[instrument(skip(cfg, out))]
fn cmd_script(cfg: PipelineConfig, out: Option<PathBuf>) -> Result<()> {
    let script_path = out.unwrap_or_else(|| cfg.script_path());
    let mut store = ScriptStore::create(&script_path)?;
    run_load(&cfg, &mut store)?;
    let statements = store.finish()?;
    info!(statements, "load script written");
    println!("Load script at {}", script_path.display());
    Ok(())
}

#[instrument(skip(cfg, out))]
async fn cmd_run(cfg: PipelineConfig, out: Option<PathBuf>) -> Result<()> {
    run_sample(&cfg)?;
    run_convert(&cfg)?;
    run_partition(&cfg).await?;
    cmd_script(cfg, out)
}
