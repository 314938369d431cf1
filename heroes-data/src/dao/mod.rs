//! Composition roots for the game collections.
//!
//! Each root wires an [`Ingestor`](crate::ingest::Ingestor), an
//! [`IndexedStore`](heroes_core::IndexedStore), an optional
//! [`Enricher`](crate::enrich::Enricher) and a
//! [`Persister`](crate::persist::Persister) around one domain transform.
//! Roots are built explicitly and loaded by an explicit `initialise` call;
//! every getter waits on the root's [`ReadinessGate`] first, starting the load
//! itself when nobody has.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use heroes_core::{ReadinessGate, ShapeError};
use log::error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::enrich::EnrichError;
use crate::ingest::IngestError;
use crate::persist::PersistError;

mod growth;
mod hero;
mod message;
mod skill;

pub use growth::{GROWTH_VECTORS_KEY, GROWTH_VECTORS_PATH, GrowthVector, GrowthVectorDao};
pub use hero::{HERO_HASH, HERO_PATH, HeroDao, HeroDefinition};
pub use message::{LangMessageDao, Language, Message, MessageDao};
pub use skill::{
    SKILL_BY_ID_HASH, SKILL_BY_KEY_HASH, SKILL_PATH, SkillCategory, SkillDao, SkillDefinition,
    SkillDetail, TitleNormaliser, WeaponDetail,
};

/// Errors that fail a composition root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DaoError {
    /// The collection could not be ingested.
    #[error("ingestion failed: {0}")]
    Ingest(#[from] IngestError),
    /// Image enrichment failed.
    #[error("enrichment failed: {0}")]
    Enrich(#[from] EnrichError),
    /// The collection could not be published.
    #[error("publishing failed: {0}")]
    Persist(#[from] PersistError),
    /// A root this one reads from failed to load.
    #[error("{label} failed to load: {source}")]
    Dependency {
        /// Label of the failed root.
        label: String,
        /// Error the failed root's gate resolved with.
        #[source]
        source: Arc<DaoError>,
    },
}

impl DaoError {
    pub(crate) fn dependency(label: impl Into<String>, source: Arc<Self>) -> Self {
        Self::Dependency {
            label: label.into(),
            source,
        }
    }
}

/// Result of a root operation; failures are shared between every waiter.
pub type DaoResult<T> = Result<T, Arc<DaoError>>;

/// Base statistics and growth rates as stored in the game files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Hit points.
    pub hp: i32,
    /// Attack.
    pub atk: i32,
    /// Speed.
    pub spd: i32,
    /// Defence.
    pub def: i32,
    /// Resistance.
    pub res: i32,
}

/// Loading state shared by every root: the data, its gate and a start latch.
#[derive(Debug)]
pub(crate) struct RootState<T> {
    label: String,
    pub(crate) data: RwLock<T>,
    gate: ReadinessGate<DaoError>,
    started: AtomicBool,
}

impl<T> RootState<T> {
    pub(crate) fn new(label: impl Into<String>, data: T) -> Self {
        Self {
            label: label.into(),
            data: RwLock::new(data),
            gate: ReadinessGate::new(),
            started: AtomicBool::new(false),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// Whether the caller is the first to start loading.
    pub(crate) fn claim(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn finish(&self, outcome: Result<(), DaoError>) {
        if let Err(err) = &outcome {
            error!("{}: initialisation failed: {err}", self.label);
        }
        self.gate.resolve(outcome);
    }

    pub(crate) async fn ready(&self) -> DaoResult<()> {
        self.gate.wait().await
    }
}

/// Decode a raw record into `T`, naming the record in the error when possible.
pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ShapeError> {
    let record = value
        .get("id_tag")
        .or_else(|| value.get("key"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    serde_json::from_value(value).map_err(|err| {
        let shape = ShapeError::new(err.to_string());
        match record {
            Some(id) => shape.for_record(id),
            None => shape,
        }
    })
}

/// Accept records whose `id_num` is present and non-zero.
pub(crate) fn has_real_id(value: &Value) -> bool {
    value
        .get("id_num")
        .and_then(Value::as_u64)
        .is_some_and(|id| id > 0)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Raw records shaped like the game files.

    use serde_json::{Value, json};

    pub(crate) fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build Tokio runtime")
            .block_on(future)
    }

    pub(crate) fn hero(id_num: u32, id_tag: &str) -> Value {
        json!({
            "id_num": id_num,
            "sort_value": id_num * 10,
            "id_tag": id_tag,
            "dragonflowers": { "max_count": 10 },
            "series": 1,
            "origins": 3,
            "weapon_type": 0,
            "move_type": 0,
            "refresher": false,
            "base_vector_id": 4,
            "base_stats": { "hp": 17, "atk": 8, "spd": 6, "def": 7, "res": 4 },
            "growth_rates": { "hp": 55, "atk": 50, "spd": 40, "def": 45, "res": 30 },
            "skills": [[null, "SID_鉄の剣"]],
            "legendary": null
        })
    }

    pub(crate) fn skill(id_num: u32, id_tag: &str, category: u8) -> Value {
        json!({
            "id_num": id_num,
            "sort_id": id_num,
            "id_tag": id_tag,
            "name_id": format!("M{id_tag}"),
            "desc_id": format!("M{id_tag}_H"),
            "prerequisites": [null, "SID_PREV"],
            "next_skill": null,
            "exclusive": false,
            "enemy_only": false,
            "category": category,
            "wep_equip": 1,
            "mov_equip": 15,
            "might": 0,
            "range": 0,
            "arcane_weapon": false,
            "refined": false,
            "refine_base": null,
            "refine_stats": { "hp": 0, "atk": 0, "spd": 0, "def": 0, "res": 0 },
            "cooldown_count": 0
        })
    }

    pub(crate) fn message(key: &str, value: &str) -> Value {
        json!({ "key": key, "value": value })
    }

    pub(crate) fn array(records: &[Value]) -> String {
        Value::Array(records.to_vec()).to_string()
    }
}
