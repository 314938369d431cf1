//! Skill definitions, indexed by id and by tag.
//!
//! Weapons are cross-linked to their refinements before the store is read,
//! and passive skills receive icon URLs resolved from their English names.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use heroes_core::{IdIndexed, IndexedStore, Indexing, KeyIndexed, ShapeError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DaoError, DaoResult, Language, MessageDao, RootState, Stats, decode, has_real_id};
use crate::enrich::file_title::icon_title;
use crate::enrich::{Enricher, LookupPolicy};
use crate::ingest::{Ingestor, SourceRoot};
use crate::persist::Persister;
use crate::source::HierarchicalSource;

/// Repository directory holding the skill files.
pub const SKILL_PATH: &str = "files/assets/Common/SRPG/Skill";

/// Hash skills are published under, keyed by id.
pub const SKILL_BY_ID_HASH: &str = "SKILL_BY_ID";

/// Hash skills are published under, keyed by tag.
pub const SKILL_BY_KEY_HASH: &str = "SKILL_BY_KEY";

/// Maps an English skill name onto the name its icon is filed under.
pub type TitleNormaliser = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Skill slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SkillCategory {
    /// Weapon.
    Weapon,
    /// Assist.
    Assist,
    /// Special.
    Special,
    /// A passive.
    PassiveA,
    /// B passive.
    PassiveB,
    /// C passive.
    PassiveC,
    /// Sacred seal.
    PassiveS,
}

impl SkillCategory {
    /// Whether skills of this category sit in a passive slot.
    #[must_use]
    pub const fn is_passive(self) -> bool {
        matches!(
            self,
            Self::PassiveA | Self::PassiveB | Self::PassiveC | Self::PassiveS
        )
    }
}

impl From<SkillCategory> for u8 {
    fn from(category: SkillCategory) -> Self {
        match category {
            SkillCategory::Weapon => 0,
            SkillCategory::Assist => 1,
            SkillCategory::Special => 2,
            SkillCategory::PassiveA => 3,
            SkillCategory::PassiveB => 4,
            SkillCategory::PassiveC => 5,
            SkillCategory::PassiveS => 6,
        }
    }
}

impl TryFrom<u8> for SkillCategory {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Self::Weapon),
            1 => Ok(Self::Assist),
            2 => Ok(Self::Special),
            3 => Ok(Self::PassiveA),
            4 => Ok(Self::PassiveB),
            5 => Ok(Self::PassiveC),
            6 => Ok(Self::PassiveS),
            other => Err(format!("unknown skill category {other}")),
        }
    }
}

/// Weapon-only fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponDetail {
    /// Might without any refinement attack bonus.
    pub might: i32,
    /// Attack range.
    pub range: u32,
    /// Whether the weapon is an arcane weapon.
    pub arcane_weapon: bool,
    /// Whether this is a refined version.
    pub refined: bool,
    /// Tag of the unrefined weapon this refines.
    pub refine_base: Option<String>,
    /// Stat bonuses granted by the refinement.
    pub refine_stats: Stats,
    /// Tags of the refined versions of this weapon.
    pub refines: Vec<String>,
}

/// Category-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SkillDetail {
    /// Weapon fields.
    Weapon(WeaponDetail),
    /// Assist fields.
    #[serde(rename_all = "camelCase")]
    Assist {
        /// Target range.
        range: u32,
    },
    /// Special fields.
    #[serde(rename_all = "camelCase")]
    Special {
        /// Charge needed before the special fires.
        cooldown_count: u32,
    },
    /// Passive fields.
    #[serde(rename_all = "camelCase")]
    Passive {
        /// Icon URL.
        image_url: Option<String>,
    },
}

/// A skill as the game defines it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDefinition {
    /// Numeric id.
    pub id_num: u32,
    /// Position in the in-game skill list.
    pub sort_id: u32,
    /// Skill tag, e.g. `SID_ファイアボール`. Not unique across categories.
    pub id_tag: String,
    /// Message key of the name.
    pub name_id: String,
    /// Message key of the description.
    pub desc_id: String,
    /// Tags of skills that must be learnt first.
    pub prerequisites: Vec<String>,
    /// Tag of the next skill in the line.
    pub next_skill: Option<String>,
    /// Whether only specific heroes may learn the skill.
    pub exclusive: bool,
    /// Whether only enemies carry the skill.
    pub enemy_only: bool,
    /// Slot the skill occupies.
    pub category: SkillCategory,
    /// Bitmask of the weapon types that may equip the skill.
    pub wep_equip: u32,
    /// Bitmask of the movement types that may equip the skill.
    pub mov_equip: u32,
    /// Category-specific fields.
    pub detail: SkillDetail,
}

impl SkillDefinition {
    /// Weapon fields, for weapons.
    #[must_use]
    pub const fn weapon(&self) -> Option<&WeaponDetail> {
        match &self.detail {
            SkillDetail::Weapon(weapon) => Some(weapon),
            _ => None,
        }
    }

    /// Icon URL, for passives that have one.
    #[must_use]
    pub fn image_url(&self) -> Option<&str> {
        match &self.detail {
            SkillDetail::Passive { image_url } => image_url.as_deref(),
            _ => None,
        }
    }
}

impl IdIndexed for SkillDefinition {
    fn id_num(&self) -> u32 {
        self.id_num
    }
}

impl KeyIndexed for SkillDefinition {
    fn id_tag(&self) -> &str {
        &self.id_tag
    }
}

#[derive(Debug, Deserialize)]
struct RawSkill {
    id_num: u32,
    sort_id: u32,
    id_tag: String,
    name_id: String,
    desc_id: String,
    prerequisites: Vec<Option<String>>,
    next_skill: Option<String>,
    exclusive: bool,
    enemy_only: bool,
    category: SkillCategory,
    wep_equip: u32,
    mov_equip: u32,
    #[serde(default)]
    might: i32,
    #[serde(default)]
    range: u32,
    #[serde(default)]
    arcane_weapon: bool,
    #[serde(default)]
    refined: bool,
    #[serde(default)]
    refine_base: Option<String>,
    #[serde(default)]
    refine_stats: Option<Stats>,
    #[serde(default)]
    cooldown_count: u32,
}

fn accept_skill(value: &Value) -> bool {
    let known_category = value
        .get("category")
        .and_then(Value::as_u64)
        .and_then(|id| u8::try_from(id).ok())
        .is_some_and(|id| SkillCategory::try_from(id).is_ok());
    known_category && has_real_id(value)
}

fn skill_from_value(value: Value) -> Result<SkillDefinition, ShapeError> {
    let raw: RawSkill = decode(value)?;
    let detail = match raw.category {
        SkillCategory::Weapon => {
            let refine_stats = raw.refine_stats.unwrap_or_default();
            SkillDetail::Weapon(WeaponDetail {
                might: raw.might - refine_stats.atk,
                range: raw.range,
                arcane_weapon: raw.arcane_weapon,
                refined: raw.refined,
                refine_base: raw.refine_base,
                refine_stats,
                refines: Vec::new(),
            })
        }
        SkillCategory::Assist => SkillDetail::Assist { range: raw.range },
        SkillCategory::Special => SkillDetail::Special {
            cooldown_count: raw.cooldown_count,
        },
        SkillCategory::PassiveA
        | SkillCategory::PassiveB
        | SkillCategory::PassiveC
        | SkillCategory::PassiveS => SkillDetail::Passive { image_url: None },
    };
    Ok(SkillDefinition {
        id_num: raw.id_num,
        sort_id: raw.sort_id,
        id_tag: raw.id_tag,
        name_id: raw.name_id,
        desc_id: raw.desc_id,
        prerequisites: raw.prerequisites.into_iter().flatten().collect(),
        next_skill: raw.next_skill,
        exclusive: raw.exclusive,
        enemy_only: raw.enemy_only,
        category: raw.category,
        wep_equip: raw.wep_equip,
        mov_equip: raw.mov_equip,
        detail,
    })
}

/// `(base, refined)` tag pairs for every refined weapon.
fn refine_links(skills: &[SkillDefinition]) -> Vec<(String, String)> {
    skills
        .iter()
        .filter_map(|skill| {
            let base = skill.weapon()?.refine_base.clone()?;
            Some((base, skill.id_tag.clone()))
        })
        .collect()
}

fn keep(skill: &SkillDefinition, categories: Option<&[SkillCategory]>) -> bool {
    categories.is_none_or(|wanted| wanted.contains(&skill.category))
}

struct Icons {
    enricher: Enricher,
    messages: Arc<MessageDao>,
    normaliser: TitleNormaliser,
}

/// Skill collection read from [`SKILL_PATH`].
pub struct SkillDao {
    source: Arc<dyn HierarchicalSource>,
    icons: Option<Icons>,
    state: RootState<IndexedStore<SkillDefinition>>,
}

impl fmt::Debug for SkillDao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillDao")
            .field("icons", &self.icons.is_some())
            .finish_non_exhaustive()
    }
}

impl SkillDao {
    /// Prepare the collection, read from `source`, without icons.
    pub fn new(source: Arc<dyn HierarchicalSource>) -> Self {
        Self {
            source,
            icons: None,
            state: RootState::new(
                "skills",
                IndexedStore::new("skills", Indexing::by_id_and_key()),
            ),
        }
    }

    /// Resolve passive icons through `enricher`, titled from the USEN names
    /// in `messages`.
    #[must_use]
    pub fn with_icons(mut self, enricher: Enricher, messages: Arc<MessageDao>) -> Self {
        self.icons = Some(Icons {
            enricher,
            messages,
            normaliser: Arc::new(str::to_owned),
        });
        self
    }

    /// Rewrite English names before they become icon titles.
    ///
    /// Only takes effect together with [`SkillDao::with_icons`].
    #[must_use]
    pub fn with_title_normaliser(mut self, normaliser: TitleNormaliser) -> Self {
        if let Some(icons) = &mut self.icons {
            icons.normaliser = normaliser;
        }
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
        let ingestor = Ingestor::new(self.source.as_ref(), SourceRoot::tree(SKILL_PATH));
        let skills = ingestor.ingest(accept_skill, skill_from_value).await?;
        let links = refine_links(&skills);

        let mut store = self.state.data.write().await;
        let outcome = store.set_many(skills);
        debug!("{}: {outcome:?}", self.state.label());

        for (base, refined) in links {
            match store.peek_by_key_mut(&base).map(|skill| &mut skill.detail) {
                Some(SkillDetail::Weapon(weapon)) => weapon.refines.push(refined),
                _ => warn!("{}: {refined} refines unknown weapon {base}", self.state.label()),
            }
        }

        if let Some(icons) = &self.icons {
            let Some(records) = store.records_mut() else {
                return Ok(());
            };
            attach_icons(icons, records).await?;
        }
        Ok(())
    }

    /// Look up skills by id, in the order requested.
    ///
    /// With `categories`, skills of other categories come back as `None`.
    ///
    /// # Errors
    ///
    /// Returns the shared error the load failed with.
    pub async fn get_by_ids(
        &self,
        ids: &[u32],
        categories: Option<&[SkillCategory]>,
    ) -> DaoResult<Vec<Option<SkillDefinition>>> {
        self.initialise().await?;
        let store = self.state.data.read().await;
        Ok(store
            .get_many_by_ids(ids)
            .into_iter()
            .map(|skill| skill.filter(|skill| keep(skill, categories)).cloned())
            .collect())
    }

    /// Look up skills by tag, in the order requested.
    ///
    /// Tags are shared between some passives and their sacred seals; the most
    /// recently ingested skill wins.
    ///
    /// # Errors
    ///
    /// Returns the shared error the load failed with.
    pub async fn get_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
    ) -> DaoResult<Vec<Option<SkillDefinition>>> {
        self.initialise().await?;
        let store = self.state.data.read().await;
        Ok(store
            .get_many_by_keys(tags)
            .into_iter()
            .map(|skill| skill.cloned())
            .collect())
    }

    /// Every skill in ascending id order, optionally limited to `categories`.
    ///
    /// # Errors
    ///
    /// Returns the shared error the load failed with.
    pub async fn get_all(
        &self,
        categories: Option<&[SkillCategory]>,
    ) -> DaoResult<Vec<SkillDefinition>> {
        self.initialise().await?;
        let store = self.state.data.read().await;
        Ok(store
            .get_all()
            .iter()
            .filter(|skill| keep(skill, categories))
            .cloned()
            .collect())
    }

    /// Write every skill to [`SKILL_BY_ID_HASH`] and [`SKILL_BY_KEY_HASH`].
    ///
    /// # Errors
    ///
    /// Fails when the collection failed to load or a write fails.
    pub async fn publish(&self, persister: &Persister) -> DaoResult<usize> {
        self.initialise().await?;
        let (by_id, by_key) = {
            let store = self.state.data.read().await;
            (store.entries_by_id(), store.entries_by_key())
        };
        let written = persister
            .write_hash(SKILL_BY_ID_HASH, by_id)
            .await
            .map_err(|err| Arc::new(DaoError::from(err)))?;
        let keyed = persister
            .write_hash(SKILL_BY_KEY_HASH, by_key)
            .await
            .map_err(|err| Arc::new(DaoError::from(err)))?;
        Ok(written + keyed)
    }
}

async fn attach_icons(icons: &Icons, records: &mut [SkillDefinition]) -> Result<(), DaoError> {
    let name_keys: Vec<&str> = records
        .iter()
        .filter(|skill| skill.category.is_passive())
        .map(|skill| skill.name_id.as_str())
        .collect();
    let found = icons
        .messages
        .get_by_message_keys(Language::Usen, &name_keys)
        .await
        .map_err(|err| DaoError::dependency("USEN messages", err))?;
    let names: HashMap<String, String> = found
        .into_iter()
        .flatten()
        .map(|message| (message.id_tag, message.value))
        .collect();

    let title = |skill: &SkillDefinition| {
        if !skill.category.is_passive() {
            return None;
        }
        let name = names.get(&skill.name_id);
        if name.is_none() {
            warn!("skills: no USEN name for {}", skill.id_tag);
        }
        name.map(|name| icon_title(&(icons.normaliser)(name)))
    };
    let assign = |skill: &mut SkillDefinition, url: Option<String>| {
        if let SkillDetail::Passive { image_url } = &mut skill.detail {
            *image_url = url;
        }
    };
    icons
        .enricher
        .enrich(records, title, assign, LookupPolicy::Required)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::fixtures::{array, block_on, message, skill};
    use crate::test_support::{MemoryKvStore, StubImageLookup, StubSource};
    use rstest::{fixture, rstest};
    use serde_json::json;

    fn weapon(id_num: u32, id_tag: &str, might: i32, base: Option<&str>, atk: i32) -> Value {
        let mut raw = skill(id_num, id_tag, 0);
        if let Some(object) = raw.as_object_mut() {
            object.insert("might".to_owned(), json!(might));
            object.insert("range".to_owned(), json!(1));
            object.insert("refined".to_owned(), json!(base.is_some()));
            object.insert("refine_base".to_owned(), json!(base));
            object.insert(
                "refine_stats".to_owned(),
                json!({ "hp": 0, "atk": atk, "spd": 0, "def": 0, "res": 0 }),
            );
        }
        raw
    }

    #[fixture]
    fn source() -> Arc<dyn HierarchicalSource> {
        let mut stub = StubSource::new()
            .with_blob(
                &format!("{SKILL_PATH}/weapons.json"),
                &array(&[
                    skill(0, "SID_無し", 0),
                    weapon(1, "SID_銀の剣", 15, None, 0),
                    weapon(2, "SID_銀の剣_攻", 17, Some("SID_銀の剣"), 2),
                ]),
            )
            .with_blob(
                &format!("{SKILL_PATH}/passives/a.json"),
                &array(&[
                    skill(3, "SID_鬼神の一撃3", 3),
                    skill(4, "SID_攻撃速さの絆3", 3),
                    skill(5, "SID_謎", 9),
                ]),
            );
        for language in Language::ALL {
            stub = stub.with_blob(
                &format!("files/assets/{}/Message/a.json", language.code()),
                &array(&[
                    message("MSID_鬼神の一撃3", "Death Blow 3"),
                    message("MSID_攻撃速さの絆3", "Atk/Spd Bond 3"),
                ]),
            );
        }
        Arc::new(stub)
    }

    #[rstest]
    fn weapon_might_excludes_refine_attack() {
        let definition =
            skill_from_value(weapon(2, "SID_銀の剣_攻", 17, Some("SID_銀の剣"), 2)).expect("weapon");
        let detail = definition.weapon().expect("weapon detail");
        assert_eq!(detail.might, 15);
        assert_eq!(detail.refine_stats.atk, 2);
    }

    #[rstest]
    fn null_prerequisites_are_removed() {
        let definition = skill_from_value(skill(3, "SID_A", 3)).expect("passive");
        assert_eq!(definition.prerequisites, vec!["SID_PREV".to_owned()]);
    }

    #[rstest]
    #[case(skill(3, "SID_A", 6), true)]
    #[case(skill(3, "SID_A", 7), false)]
    #[case(skill(0, "SID_A", 3), false)]
    fn accepts_known_categories_with_real_ids(#[case] raw: Value, #[case] expected: bool) {
        assert_eq!(accept_skill(&raw), expected);
    }

    #[rstest]
    fn categories_serialise_as_numbers() {
        let encoded = serde_json::to_string(&SkillCategory::PassiveS).expect("encode");
        assert_eq!(encoded, "6");
        let detail = serde_json::to_value(SkillDetail::Special { cooldown_count: 3 }).expect("encode");
        assert_eq!(detail, json!({ "kind": "special", "cooldownCount": 3 }));
    }

    #[rstest]
    fn links_refined_weapons_to_their_base(source: Arc<dyn HierarchicalSource>) {
        let dao = SkillDao::new(source);
        let found = block_on(dao.get_by_tags(&["SID_銀の剣"])).expect("skills");
        let base = found.first().cloned().flatten().expect("base weapon");
        assert_eq!(
            base.weapon().map(|weapon| weapon.refines.clone()),
            Some(vec!["SID_銀の剣_攻".to_owned()])
        );
    }

    #[rstest]
    fn filters_by_category(source: Arc<dyn HierarchicalSource>) {
        let dao = SkillDao::new(source);
        let passives = block_on(dao.get_all(Some(&[SkillCategory::PassiveA]))).expect("skills");
        let ids: Vec<u32> = passives.iter().map(|skill| skill.id_num).collect();
        assert_eq!(ids, vec![3, 4]);
        let by_id = block_on(dao.get_by_ids(&[1, 3], Some(&[SkillCategory::Weapon]))).expect("skills");
        assert!(by_id.first().is_some_and(Option::is_some));
        assert!(by_id.get(1).is_some_and(Option::is_none));
    }

    #[rstest]
    fn passive_icons_use_the_normaliser(source: Arc<dyn HierarchicalSource>) {
        let lookup = Arc::new(
            StubImageLookup::new()
                .with_image("File:AtkSpd Bond 3.png", "https://img/bond.png")
                .with_image("File:Death Blow III.png", "https://img/death-blow.png"),
        );
        let messages = Arc::new(MessageDao::new(&source));
        let dao = SkillDao::new(source)
            .with_icons(Enricher::new(lookup.clone()), messages)
            .with_title_normaliser(Arc::new(|name: &str| name.replace(" 3", " III").replace("Bond III", "Bond 3")));
        let found = block_on(dao.get_by_ids(&[3, 4, 1], None)).expect("skills");
        let urls: Vec<Option<String>> = found
            .iter()
            .map(|skill| skill.as_ref().and_then(|s| s.image_url().map(str::to_owned)))
            .collect();
        assert_eq!(
            urls,
            vec![
                Some("https://img/death-blow.png".to_owned()),
                Some("https://img/bond.png".to_owned()),
                None,
            ]
        );
        assert_eq!(lookup.batch_sizes(), vec![2]);
    }

    #[rstest]
    fn publishes_both_hashes(source: Arc<dyn HierarchicalSource>) {
        let dao = SkillDao::new(source);
        let kv = Arc::new(MemoryKvStore::new());
        let written = block_on(dao.publish(&Persister::new(kv.clone()))).expect("publish");
        assert_eq!(written, 8);
        assert_eq!(kv.hash_len(SKILL_BY_ID_HASH), 4);
        assert_eq!(kv.hash_len(SKILL_BY_KEY_HASH), 4);
        assert_eq!(kv.hash_order(), vec![SKILL_BY_ID_HASH.to_owned(), SKILL_BY_KEY_HASH.to_owned()]);
    }
}
