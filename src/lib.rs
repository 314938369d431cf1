//! Facade crate for the heroes data-access layer.
//!
//! This crate re-exports the storage primitives and the composition roots so
//! callers can depend on a single crate.

#![forbid(unsafe_code)]

pub use heroes_core::{
    GateOutcome, IdIndexed, IndexedStore, Indexing, KeyIndexed, ReadinessGate, ShapeError,
    StoreState, WriteOutcome,
};

pub use heroes_data::dao::{
    GrowthVector, GrowthVectorDao, HeroDao, HeroDefinition, Language, Message, MessageDao,
    SkillCategory, SkillDao, SkillDefinition, TitleNormaliser,
};
pub use heroes_data::{
    Catalogue, DaoError, DaoResult, Enricher, GithubSource, HierarchicalSource, KvStore,
    LocalSource, Persister, RepositoryDetails,
};
