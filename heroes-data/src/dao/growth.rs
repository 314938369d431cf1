//! Growth vectors: the bit patterns that decide level-up stat gains.

use std::fmt;
use std::sync::Arc;

use heroes_core::ShapeError;
use log::debug;
use serde_json::Value;

use super::{DaoError, DaoResult, RootState};
use crate::ingest::{Ingestor, SourceRoot};
use crate::persist::{PersistError, Persister};
use crate::source::HierarchicalSource;

/// Repository blob holding every growth vector.
pub const GROWTH_VECTORS_PATH: &str = "files/assets/Common/SRPG/Grow.json";

/// Key the vectors are published under.
pub const GROWTH_VECTORS_KEY: &str = "GROWTH_VECTORS";

/// One row of growth vectors.
///
/// The values exceed what JSON consumers can hold as doubles, so they are
/// kept as decimal strings.
pub type GrowthVector = Vec<String>;

fn growth_vector_from_value(value: Value) -> Result<GrowthVector, ShapeError> {
    let Value::Array(bits) = value else {
        return Err(ShapeError::new(format!("expected an array of integers, found {value}")));
    };
    bits.into_iter()
        .map(|bit| match bit {
            Value::Number(number) if number.is_u64() || number.is_i64() => Ok(number.to_string()),
            other => Err(ShapeError::new(format!("expected an integer, found {other}"))),
        })
        .collect()
}

/// Growth vector table read from [`GROWTH_VECTORS_PATH`].
pub struct GrowthVectorDao {
    source: Arc<dyn HierarchicalSource>,
    state: RootState<Vec<GrowthVector>>,
}

impl fmt::Debug for GrowthVectorDao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowthVectorDao").finish_non_exhaustive()
    }
}

impl GrowthVectorDao {
    /// Prepare the table, read from `source`.
    pub fn new(source: Arc<dyn HierarchicalSource>) -> Self {
        Self {
            source,
            state: RootState::new("growth vectors", Vec::new()),
        }
    }

    /// Load the table. Later calls wait for the first load to finish.
    ///
    /// # Errors
    ///
    /// Returns the shared error the load failed with.
    pub async fn initialise(&self) -> DaoResult<()> {
        if self.state.claim() {
            let outcome = self.load().await;
            self.state.finish(outcome);
        }
        self.state.ready().await
    }

    async fn load(&self) -> Result<(), DaoError> {
        let ingestor = Ingestor::new(self.source.as_ref(), SourceRoot::blob(GROWTH_VECTORS_PATH));
        let vectors = ingestor
            .ingest(|_: &Value| true, growth_vector_from_value)
            .await?;
        debug!("{}: loaded {} rows", self.state.label(), vectors.len());
        *self.state.data.write().await = vectors;
        Ok(())
    }

    /// Every row, in file order.
    ///
    /// # Errors
    ///
    /// Returns the shared error the load failed with.
    pub async fn get_all(&self) -> DaoResult<Vec<GrowthVector>> {
        self.initialise().await?;
        Ok(self.state.data.read().await.clone())
    }

    /// Write the table to [`GROWTH_VECTORS_KEY`].
    ///
    /// The table is stored as a JSON string holding the encoded rows, the
    /// format readers of the key expect.
    ///
    /// # Errors
    ///
    /// Fails when the table failed to load or the write fails.
    pub async fn publish(&self, persister: &Persister) -> DaoResult<()> {
        let vectors = self.get_all().await?;
        let encoded = serde_json::to_string(&vectors).map_err(|source| {
            Arc::new(DaoError::from(PersistError::Codec {
                key: GROWTH_VECTORS_KEY.to_owned(),
                source,
            }))
        })?;
        persister
            .write_value(GROWTH_VECTORS_KEY, &encoded)
            .await
            .map_err(|err| Arc::new(DaoError::from(err)))
    }
}
