//! The target graph store, seen through the narrow session contract the
//! loader needs: execute one statement, report failures as text.
//!
//! The engine itself stays external. [`ScriptStore`] materializes the
//! statement stream as a script for the engine's shell; tests substitute
//! recording and fault-injecting mocks.

pub mod load;
pub mod retry;

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub use load::load_dataset;
pub use retry::{drop_table_if_exists, execute_with_retry};

/// Error surfaced by a store session. The raw message is kept verbatim so
/// [`StoreFault::classify`] can translate it.
#[derive(Debug, Clone)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        StoreError {
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StoreError {}

/// One logical session against the target store.
pub trait GraphStore {
    fn execute(&mut self, statement: &str) -> std::result::Result<(), StoreError>;
}

/// Closed classification of raw store error text. The store's client only
/// exposes stringly errors, so the substring matching lives here, in one
/// place, and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// The table already received its one-shot bulk copy.
    CopyAlreadyPerformed,
    /// A referenced primary-key value is not yet visible.
    PrimaryKeyNotFound,
    /// The table does not exist.
    TableMissing,
    Other,
}

impl StoreFault {
    pub fn classify(message: &str) -> StoreFault {
        if message.contains("COPY commands can only be executed once") {
            StoreFault::CopyAlreadyPerformed
        } else if message.contains("Unable to find primary key") {
            StoreFault::PrimaryKeyNotFound
        } else if message.contains("does not exist") {
            StoreFault::TableMissing
        } else {
            StoreFault::Other
        }
    }
}

/// Statement sink that writes the stream to a script file, one terminated
/// statement per line.
pub struct ScriptStore {
    out: BufWriter<File>,
    statements: usize,
}

impl ScriptStore {
    pub fn create(path: &Path) -> crate::error::Result<Self> {
        Ok(ScriptStore {
            out: BufWriter::new(File::create(path)?),
            statements: 0,
        })
    }

    /// Flush and return the number of statements written.
    pub fn finish(mut self) -> crate::error::Result<usize> {
        self.out.flush()?;
        Ok(self.statements)
    }
}

impl GraphStore for ScriptStore {
    fn execute(&mut self, statement: &str) -> std::result::Result<(), StoreError> {
        writeln!(self.out, "{};", statement).map_err(|e| StoreError::new(e.to_string()))?;
        self.statements += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_classification_matches_store_message_shapes() {
        assert_eq!(
            StoreFault::classify(
                "Copy exception: COPY commands can only be executed once on a table."
            ),
            StoreFault::CopyAlreadyPerformed
        );
        assert_eq!(
            StoreFault::classify("Runtime exception: Unable to find primary key value abc."),
            StoreFault::PrimaryKeyNotFound
        );
        assert_eq!(
            StoreFault::classify("Binder exception: Table Gene does not exist."),
            StoreFault::TableMissing
        );
        assert_eq!(
            StoreFault::classify("Parser exception: unexpected token"),
            StoreFault::Other
        );
    }

    #[test]
    fn script_store_writes_terminated_statements() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("load.cypher");

        let mut store = ScriptStore::create(&path).unwrap();
        store.execute("DROP TABLE Gene").unwrap();
        store.execute("CREATE NODE TABLE Gene(id STRING, PRIMARY KEY (id))").unwrap();
        let written = store.finish().unwrap();

        assert_eq!(written, 2);
        let script = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            script,
            "DROP TABLE Gene;\nCREATE NODE TABLE Gene(id STRING, PRIMARY KEY (id));\n"
        );
    }
}
