//! Hero definitions, indexed by id and enriched with portrait URLs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use heroes_core::{IdIndexed, IndexedStore, Indexing, ShapeError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DaoError, DaoResult, Language, MessageDao, RootState, Stats, decode, has_real_id};
use crate::enrich::file_title::{face_title, resplendent_face_title};
use crate::enrich::{Enricher, LookupPolicy};
use crate::ingest::{Ingestor, SourceRoot};
use crate::persist::Persister;
use crate::source::HierarchicalSource;

/// Repository directory holding the hero files.
pub const HERO_PATH: &str = "files/assets/Common/SRPG/Person";

/// Hash heroes are published under.
pub const HERO_HASH: &str = "HERO_BY_ID";

const PERSON_TAG: &str = "PID";
const NAME_TAG: &str = "MPID";
const EPITHET_TAG: &str = "MPID_HONOR";

/// A playable hero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroDefinition {
    /// Numeric id.
    pub id_num: u32,
    /// Position in the in-game hero list.
    pub sort_value: u32,
    /// Person tag, e.g. `PID_アルフォンス`.
    pub id_tag: String,
    /// Message key of the hero's name.
    pub name_id: String,
    /// Message key of the hero's epithet.
    pub epithet_id: String,
    /// Most dragonflowers the hero accepts.
    pub dragonflowers: Dragonflowers,
    /// Series the hero is credited to.
    pub series: u32,
    /// Bitmask of the series the hero appears in.
    pub origins: u32,
    /// Weapon type id.
    pub weapon_type: u32,
    /// Movement type id.
    pub move_type: u32,
    /// Whether the hero can dance or sing.
    pub refresher: bool,
    /// Growth vector offset used for level-up stats.
    pub base_vector_id: u32,
    /// Level 1 statistics.
    pub base_stats: Stats,
    /// Growth rates in percent.
    pub growth_rates: Stats,
    /// Known and learnable skill tags per rarity.
    pub skills: Vec<Vec<Option<String>>>,
    /// Legendary, mythic, duo and similar honours, passed through unchanged.
    pub legendary: Option<Value>,
    /// Portrait URL.
    pub image_url: Option<String>,
    /// Resplendent portrait URL, for heroes that have one.
    pub resplendent_image_url: Option<String>,
}

impl HeroDefinition {
    /// Whether the hero appears in series `series`.
    #[must_use]
    pub const fn appears_in(&self, series: u32) -> bool {
        series < u32::BITS && self.origins & (1 << series) != 0
    }
}

impl IdIndexed for HeroDefinition {
    fn id_num(&self) -> u32 {
        self.id_num
    }
}

/// Dragonflower limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dragonflowers {
    /// Most dragonflowers the hero accepts.
    pub max_count: u32,
}

#[derive(Debug, Deserialize)]
struct RawHero {
    id_num: u32,
    sort_value: u32,
    id_tag: String,
    dragonflowers: RawDragonflowers,
    series: u32,
    origins: u32,
    weapon_type: u32,
    move_type: u32,
    refresher: bool,
    base_vector_id: u32,
    base_stats: Stats,
    growth_rates: Stats,
    skills: Vec<Vec<Option<String>>>,
    #[serde(default)]
    legendary: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawDragonflowers {
    max_count: u32,
}

/// Swap the person prefix of `id_tag` for `prefix`.
fn message_key(id_tag: &str, prefix: &str) -> String {
    id_tag
        .strip_prefix(PERSON_TAG)
        .map_or_else(|| id_tag.to_owned(), |rest| format!("{prefix}{rest}"))
}

fn hero_from_value(value: Value) -> Result<HeroDefinition, ShapeError> {
    let raw: RawHero = decode(value)?;
    Ok(HeroDefinition {
        id_num: raw.id_num,
        sort_value: raw.sort_value,
        name_id: message_key(&raw.id_tag, NAME_TAG),
        epithet_id: message_key(&raw.id_tag, EPITHET_TAG),
        id_tag: raw.id_tag,
        dragonflowers: Dragonflowers {
            max_count: raw.dragonflowers.max_count,
        },
        series: raw.series,
        origins: raw.origins,
        weapon_type: raw.weapon_type,
        move_type: raw.move_type,
        refresher: raw.refresher,
        base_vector_id: raw.base_vector_id,
        base_stats: raw.base_stats,
        growth_rates: raw.growth_rates,
        skills: raw.skills,
        legendary: raw.legendary,
        image_url: None,
        resplendent_image_url: None,
    })
}

struct Portraits {
    enricher: Enricher,
    messages: Arc<MessageDao>,
}

/// Hero collection read from [`HERO_PATH`].
pub struct HeroDao {
    source: Arc<dyn HierarchicalSource>,
    portraits: Option<Portraits>,
    state: RootState<IndexedStore<HeroDefinition>>,
}

impl fmt::Debug for HeroDao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeroDao")
            .field("portraits", &self.portraits.is_some())
            .finish_non_exhaustive()
    }
}

impl HeroDao {
    /// Prepare the collection, read from `source`, without portraits.
    pub fn new(source: Arc<dyn HierarchicalSource>) -> Self {
        Self {
            source,
            portraits: None,
            state: RootState::new("heroes", IndexedStore::new("heroes", Indexing::by_id())),
        }
    }

    /// Resolve portraits through `enricher`, titled from the USEN names in
    /// `messages`.
    #[must_use]
    pub fn with_portraits(mut self, enricher: Enricher, messages: Arc<MessageDao>) -> Self {
        self.portraits = Some(Portraits { enricher, messages });
        self
    }

    /// Load the collection. Later calls wait for the first load to finish.
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
        let ingestor = Ingestor::new(self.source.as_ref(), SourceRoot::tree(HERO_PATH));
        let mut heroes = ingestor.ingest(has_real_id, hero_from_value).await?;
        if let Some(portraits) = &self.portraits {
            self.attach_portraits(portraits, &mut heroes).await?;
        }
        let mut store = self.state.data.write().await;
        let outcome = store.set_many(heroes);
        debug!("{}: {outcome:?}", self.state.label());
        Ok(())
    }

    async fn attach_portraits(
        &self,
        portraits: &Portraits,
        heroes: &mut [HeroDefinition],
    ) -> Result<(), DaoError> {
        let name_keys: Vec<&str> = heroes.iter().map(|hero| hero.name_id.as_str()).collect();
        let epithet_keys: Vec<&str> = heroes.iter().map(|hero| hero.epithet_id.as_str()).collect();
        let names = portraits
            .messages
            .get_by_message_keys(Language::Usen, &name_keys)
            .await
            .map_err(|err| DaoError::dependency("USEN messages", err))?;
        let epithets = portraits
            .messages
            .get_by_message_keys(Language::Usen, &epithet_keys)
            .await
            .map_err(|err| DaoError::dependency("USEN messages", err))?;

        let mut display: HashMap<u32, (String, String)> = HashMap::with_capacity(heroes.len());
        for ((hero, name), epithet) in heroes.iter().zip(names).zip(epithets) {
            match (name, epithet) {
                (Some(name), Some(epithet)) => {
                    display.insert(hero.id_num, (name.value, epithet.value));
                }
                _ => warn!("{}: no USEN name for {}", self.state.label(), hero.id_tag),
            }
        }

        let title = |hero: &HeroDefinition| {
            display
                .get(&hero.id_num)
                .map(|(name, epithet)| face_title(name, epithet))
        };
        portraits
            .enricher
            .enrich(&mut *heroes, title, |hero, url| hero.image_url = url, LookupPolicy::Required)
            .await?;

        let resplendent = |hero: &HeroDefinition| {
            display
                .get(&hero.id_num)
                .map(|(name, epithet)| resplendent_face_title(name, epithet))
        };
        portraits
            .enricher
            .enrich(
                &mut *heroes,
                resplendent,
                |hero, url| hero.resplendent_image_url = url,
                LookupPolicy::Optional,
            )
            .await?;
        Ok(())
    }

    /// Look up heroes by id, in the order requested.
    ///
    /// # Errors
    ///
    /// Returns the shared error the load failed with.
    pub async fn get_by_ids(&self, ids: &[u32]) -> DaoResult<Vec<Option<HeroDefinition>>> {
        self.initialise().await?;
        let store = self.state.data.read().await;
        Ok(store
            .get_many_by_ids(ids)
            .into_iter()
            .map(|hero| hero.cloned())
            .collect())
    }

    /// Every hero, in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns the shared error the load failed with.
    pub async fn get_all(&self) -> DaoResult<Vec<HeroDefinition>> {
        self.initialise().await?;
        Ok(self.state.data.read().await.get_all().to_vec())
    }

    /// Write every hero to [`HERO_HASH`], keyed by id.
    ///
    /// # Errors
    ///
    /// Fails when the collection failed to load or the write fails.
    pub async fn publish(&self, persister: &Persister) -> DaoResult<usize> {
        self.initialise().await?;
        let entries = self.state.data.read().await.entries_by_id();
        persister
            .write_hash(HERO_HASH, entries)
            .await
            .map_err(|err| Arc::new(DaoError::from(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::fixtures::{array, block_on, hero, message};
    use crate::test_support::{MemoryKvStore, StubImageLookup, StubSource};
    use rstest::{fixture, rstest};

    #[rstest]
    #[case("PID_アルフォンス", "MPID", "MPID_アルフォンス")]
    #[case("PID_アルフォンス", "MPID_HONOR", "MPID_HONOR_アルフォンス")]
    #[case("EID_ロキ", "MPID", "EID_ロキ")]
    fn derives_message_keys(#[case] tag: &str, #[case] prefix: &str, #[case] expected: &str) {
        assert_eq!(message_key(tag, prefix), expected);
    }

    #[rstest]
    fn transforms_raw_heroes() {
        let definition = hero_from_value(hero(1, "PID_アルフォンス")).expect("valid hero");
        assert_eq!(definition.name_id, "MPID_アルフォンス");
        assert_eq!(definition.epithet_id, "MPID_HONOR_アルフォンス");
        assert_eq!(definition.base_stats.hp, 17);
        assert!(definition.appears_in(0));
        assert!(definition.appears_in(1));
        assert!(!definition.appears_in(2));
        assert!(!definition.appears_in(40));
    }

    #[rstest]
    fn malformed_heroes_are_shape_errors() {
        let mut raw = hero(1, "PID_アルフォンス");
        if let Some(object) = raw.as_object_mut() {
            object.remove("base_stats");
        }
        let err = hero_from_value(raw).expect_err("missing stats");
        assert_eq!(err.record.as_deref(), Some("PID_アルフォンス"));
    }

    #[fixture]
    fn source() -> Arc<dyn HierarchicalSource> {
        let mut stub = StubSource::new().with_blob(
            &format!("{HERO_PATH}/a.json"),
            &array(&[hero(0, "PID_無し"), hero(2, "PID_シャロン"), hero(1, "PID_アルフォンス")]),
        );
        for language in Language::ALL {
            stub = stub.with_blob(
                &format!("files/assets/{}/Message/a.json", language.code()),
                &array(&[
                    message("MPID_アルフォンス", "Alfonse"),
                    message("MPID_HONOR_アルフォンス", "Prince of Askr"),
                    message("MPID_シャロン", "Sharena"),
                    message("MPID_HONOR_シャロン", "Princess of Askr"),
                ]),
            );
        }
        Arc::new(stub)
    }

    #[rstest]
    fn drops_the_null_hero_and_orders_by_id(source: Arc<dyn HierarchicalSource>) {
        let dao = HeroDao::new(source);
        let all = block_on(dao.get_all()).expect("heroes");
        let ids: Vec<u32> = all.iter().map(|hero| hero.id_num).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(all.iter().all(|hero| hero.image_url.is_none()));
    }

    #[rstest]
    fn attaches_portraits_from_usen_names(source: Arc<dyn HierarchicalSource>) {
        let lookup = Arc::new(
            StubImageLookup::new()
                .with_image("File:Alfonse Prince of Askr Face FC.webp", "https://img/alfonse.webp")
                .with_image(
                    "File:Alfonse Prince of Askr Resplendent Face FC.webp",
                    "https://img/alfonse-resplendent.webp",
                )
                .with_image("File:Sharena Princess of Askr Face FC.webp", "https://img/sharena.webp"),
        );
        let messages = Arc::new(MessageDao::new(&source));
        let dao = HeroDao::new(source).with_portraits(Enricher::new(lookup), messages);
        let heroes = block_on(dao.get_by_ids(&[2, 1, 9])).expect("heroes");
        let sharena = heroes.first().cloned().flatten().expect("Sharena");
        let alfonse = heroes.get(1).cloned().flatten().expect("Alfonse");
        assert_eq!(sharena.image_url.as_deref(), Some("https://img/sharena.webp"));
        assert_eq!(sharena.resplendent_image_url, None);
        assert_eq!(
            alfonse.resplendent_image_url.as_deref(),
            Some("https://img/alfonse-resplendent.webp")
        );
        assert_eq!(heroes.get(2).cloned().flatten(), None);
    }

    #[rstest]
    fn failed_loads_are_shared_by_every_getter() {
        let dao = HeroDao::new(Arc::new(StubSource::new()));
        let first = block_on(dao.initialise()).expect_err("no hero tree");
        let second = block_on(dao.get_all()).expect_err("same failure");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[rstest]
    fn publishes_heroes_by_id(source: Arc<dyn HierarchicalSource>) {
        let dao = HeroDao::new(source);
        let kv = Arc::new(MemoryKvStore::new());
        let written = block_on(dao.publish(&Persister::new(kv.clone()))).expect("publish");
        assert_eq!(written, 2);
        let stored = kv.field(HERO_HASH, "1").expect("hero 1 stored");
        assert!(stored.contains(r#""idTag":"PID_アルフォンス""#));
    }
}
