//! Size-bounded partitioning used on both the read and write paths.
//!
//! Upstream services cap the payload of a single call, so collections are
//! split into consecutive batches. Every batch holds exactly `max` items except
//! the last, which holds between one and `max`. Concatenating the batches
//! yields the input unchanged.

use thiserror::Error;

/// Maximum number of hash entries sent or fetched per key/value call.
pub const PERSIST_BATCH_SIZE: usize = 300;

/// Maximum number of titles accepted by one image lookup request.
pub const LOOKUP_BATCH_SIZE: usize = 50;

/// A batch size of zero cannot partition anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("batch size must be at least one")]
pub struct BatchSizeError;

/// Split `items` into consecutive batches of at most `max` elements.
///
/// # Errors
///
/// Returns [`BatchSizeError`] when `max` is zero.
///
/// # Examples
///
/// ```
/// use heroes_core::partition;
///
/// let batches = partition(vec![1, 2, 3, 4, 5], 2)?;
/// assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
/// # Ok::<(), heroes_core::BatchSizeError>(())
/// ```
pub fn partition<T, I>(items: I, max: usize) -> Result<Vec<Vec<T>>, BatchSizeError>
where
    I: IntoIterator<Item = T>,
{
    if max == 0 {
        return Err(BatchSizeError);
    }
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(max);
    for item in items {
        current.push(item);
        if current.len() == max {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(max)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    Ok(batches)
}

/// Split key/value entries into batches, preserving insertion order.
///
/// This is [`partition`] specialised to mappings: the order entries are
/// yielded in is the order they appear within and across batches.
///
/// # Errors
///
/// Returns [`BatchSizeError`] when `max` is zero.
pub fn partition_entries<K, V, I>(entries: I, max: usize) -> Result<Vec<Vec<(K, V)>>, BatchSizeError>
where
    I: IntoIterator<Item = (K, V)>,
{
    partition(entries, max)
}
