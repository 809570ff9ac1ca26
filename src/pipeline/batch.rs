//! Bounded, individually retried write batches.

use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::error::{Error, Result};

/// Write `items` in chunks of `batch_size`, retrying each chunk up to
/// `config.max_attempts` times.
///
/// A chunk that keeps failing stops the run with [`Error::BatchFailed`];
/// chunks committed before it stay committed. Returns the sum of the
/// counts reported by `write`.
pub fn write_in_batches<T, F>(
    label: &str,
    items: &[T],
    batch_size: usize,
    config: &BatchConfig,
    mut write: F,
) -> Result<usize>
where
    F: FnMut(&[T]) -> Result<usize>,
{
    if items.is_empty() {
        debug!("{}: nothing to write", label);
        return Ok(0);
    }

    let batch_size = batch_size.max(1);
    let max_attempts = config.max_attempts.max(1);
    let total_batches = items.len().div_ceil(batch_size);
    let mut written = 0;

    for (batch_no, chunk) in items.chunks(batch_size).enumerate() {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match write(chunk) {
                Ok(n) => {
                    written += n;
                    debug!(
                        "{}: batch {}/{} committed ({} rows)",
                        label,
                        batch_no + 1,
                        total_batches,
                        n
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        "{}: batch {}/{} failed (attempt {}/{}): {}",
                        label,
                        batch_no + 1,
                        total_batches,
                        attempts,
                        max_attempts,
                        e
                    );
                    if attempts >= max_attempts {
                        return Err(Error::BatchFailed {
                            label: label.to_string(),
                            batch: batch_no + 1,
                            attempts,
                            reason: e.to_string(),
                        });
                    }
                    std::thread::sleep(config.retry_delay());
                }
            }
        }
    }

    info!("{}: {} rows in {} batches", label, written, total_batches);
    Ok(written)
}
