//! Core building blocks for the heroes data-access layer.
//!
//! The crate holds the pieces that do not touch the network or the disk:
//! record identity, the write-once [`IndexedStore`], size-bounded batching and
//! the single-shot [`ReadinessGate`]. Adapters in `heroes-data` wire these
//! together with the remote source, enrichment and persistence backends.
//!
//! Invariants:
//! - A store freezes on its first read and never thaws.
//! - Batches never exceed their configured maximum and concatenate back into
//!   the original sequence.
//! - A gate resolves exactly once.

#![forbid(unsafe_code)]

pub mod batch;
pub mod gate;
pub mod store;

use thiserror::Error;

pub use batch::{BatchSizeError, LOOKUP_BATCH_SIZE, PERSIST_BATCH_SIZE, partition, partition_entries};
pub use gate::{GateOutcome, ReadinessGate};
pub use store::{IndexedStore, Indexing, StoreState, WriteOutcome};

/// Records identified by a numeric surrogate id.
///
/// # Examples
///
/// ```
/// use heroes_core::IdIndexed;
///
/// struct Hero {
///     id_num: u32,
/// }
///
/// impl IdIndexed for Hero {
///     fn id_num(&self) -> u32 {
///         self.id_num
///     }
/// }
///
/// assert_eq!(Hero { id_num: 7 }.id_num(), 7);
/// ```
pub trait IdIndexed {
    /// Numeric identifier of the record.
    fn id_num(&self) -> u32;
}

/// Records identified by a string natural key.
pub trait KeyIndexed {
    /// Natural key of the record.
    fn id_tag(&self) -> &str;
}

/// A raw record did not have the structure a transform expected.
///
/// Transforms are strict: a record that cannot be mapped aborts ingestion of
/// the whole collection rather than being silently misclassified.
#[derive(Debug, Error)]
#[error("unexpected record shape{}: {message}", describe_record(.record.as_deref()))]
pub struct ShapeError {
    /// Identifier of the offending record, when one could be read.
    pub record: Option<String>,
    /// Description of the mismatch.
    pub message: String,
}

impl ShapeError {
    /// Construct an error without a record identifier.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            record: None,
            message: message.into(),
        }
    }

    /// Attach the identifier of the record that failed to map.
    #[must_use]
    pub fn for_record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }
}

fn describe_record(record: Option<&str>) -> String {
    record.map_or_else(String::new, |id| format!(" in {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn shape_error_mentions_record_when_known() {
        let err = ShapeError::new("missing field `id_num`").for_record("PID_Alfonse");
        assert_eq!(
            err.to_string(),
            "unexpected record shape in PID_Alfonse: missing field `id_num`"
        );
    }

    #[rstest]
    fn shape_error_omits_record_when_unknown() {
        let err = ShapeError::new("expected an object");
        assert_eq!(err.to_string(), "unexpected record shape: expected an object");
    }
}
