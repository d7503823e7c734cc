//! Statement execution with bounded retry on transient store conflicts.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{KgError, Result};

use super::{GraphStore, StoreFault};

/// Fixed wait between retries of a primary-key visibility conflict.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Execute `statement`, tolerating the store's one-shot copy semantics and
/// retrying primary-key visibility conflicts up to `attempts` times.
///
/// - An already-performed copy is absorbed as success without consuming the
///   retry budget.
/// - A primary-key-not-found conflict sleeps [`RETRY_DELAY`] and retries;
///   an exhausted budget surfaces [`KgError::RetryExhausted`].
/// - Every other failure propagates immediately.
pub fn execute_with_retry(
    store: &mut dyn GraphStore,
    statement: &str,
    attempts: u32,
) -> Result<()> {
    let budget = attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let Err(err) = store.execute(statement) else {
            return Ok(());
        };
        match StoreFault::classify(&err.message) {
            StoreFault::CopyAlreadyPerformed => {
                info!(statement, "copy already performed; treating as success");
                return Ok(());
            }
            StoreFault::PrimaryKeyNotFound if attempt < budget => {
                warn!(statement, attempt, "primary key not yet visible; retrying");
                thread::sleep(RETRY_DELAY);
            }
            StoreFault::PrimaryKeyNotFound => {
                return Err(KgError::RetryExhausted {
                    attempts: budget,
                    message: err.message,
                });
            }
            _ => return Err(KgError::Store(err.message)),
        }
    }
}

/// Drop a table, absorbing the already-absent case.
pub fn drop_table_if_exists(store: &mut dyn GraphStore, table_name: &str) -> Result<()> {
    let statement = format!("DROP TABLE {}", table_name);
    match store.execute(&statement) {
        Ok(()) => Ok(()),
        Err(err) if StoreFault::classify(&err.message) == StoreFault::TableMissing => {
            debug!(table_name, "table already absent");
            Ok(())
        }
        Err(err) => Err(KgError::Store(err.message)),
    }
}
