pub mod config;
pub mod dataset;
pub mod ddl;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod store;

pub use config::PipelineConfig;
pub use error::{KgError, Result};
pub use store::{GraphStore, ScriptStore, StoreError, StoreFault};
