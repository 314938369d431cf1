//! Localised message tables, one store per language.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use heroes_core::{IndexedStore, Indexing, KeyIndexed, ShapeError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DaoError, DaoResult, RootState, decode};
use crate::ingest::{Ingestor, SourceRoot};
use crate::persist::Persister;
use crate::source::HierarchicalSource;

const SKILL_PREFIX: &str = "MSID_";
const PERSON_PREFIX: &str = "MPID_";
const SKILL_EXCLUDED: &[&str] = &["SEARCH"];
const PERSON_EXCLUDED: &[&str] = &["VOICE", "ILLUST", "SEARCH"];

/// Languages the game ships message tables for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    /// German (Europe).
    Eude,
    /// English (Europe).
    Euen,
    /// Spanish (Europe).
    Eues,
    /// French (Europe).
    Eufr,
    /// Italian (Europe).
    Euit,
    /// Japanese.
    Jpja,
    /// Traditional Chinese.
    Twzh,
    /// English (Americas).
    Usen,
    /// Spanish (Americas).
    Uses,
    /// Portuguese (Americas).
    Uspt,
}

impl Language {
    /// Every supported language, in table order.
    pub const ALL: [Self; 10] = [
        Self::Eude,
        Self::Euen,
        Self::Eues,
        Self::Eufr,
        Self::Euit,
        Self::Jpja,
        Self::Twzh,
        Self::Usen,
        Self::Uses,
        Self::Uspt,
    ];

    /// Directory code used by the asset tree, e.g. `USEN`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Eude => "EUDE",
            Self::Euen => "EUEN",
            Self::Eues => "EUES",
            Self::Eufr => "EUFR",
            Self::Euit => "EUIT",
            Self::Jpja => "JPJA",
            Self::Twzh => "TWZH",
            Self::Usen => "USEN",
            Self::Uses => "USES",
            Self::Uspt => "USPT",
        }
    }

    /// Repository directory holding this language's message files.
    #[must_use]
    pub fn path(self) -> String {
        format!("files/assets/{}/Message/", self.code())
    }

    /// Hash the language's messages are published under.
    #[must_use]
    pub fn hash_name(self) -> String {
        format!("MESSAGE_BY_KEY_{}", self.code())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One localised string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message key, e.g. `MSID_ファイアボール`.
    pub id_tag: String,
    /// Localised text.
    pub value: String,
}

impl KeyIndexed for Message {
    fn id_tag(&self) -> &str {
        &self.id_tag
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    key: String,
    value: String,
}

/// Whether a message key names a skill or a hero.
///
/// Search, voice and illustrator strings are skipped.
fn is_relevant_key(key: &str) -> bool {
    let excluded = |rest: &str, prefixes: &[&str]| prefixes.iter().any(|p| rest.starts_with(p));
    if let Some(rest) = key.strip_prefix(SKILL_PREFIX) {
        return !excluded(rest, SKILL_EXCLUDED);
    }
    key.strip_prefix(PERSON_PREFIX)
        .is_some_and(|rest| !excluded(rest, PERSON_EXCLUDED))
}

fn accept_message(value: &Value) -> bool {
    value
        .get("key")
        .and_then(Value::as_str)
        .is_some_and(is_relevant_key)
}

fn message_from_value(value: Value) -> Result<Message, ShapeError> {
    let RawMessage { key, value: text } = decode(value)?;
    Ok(Message {
        id_tag: key,
        value: text,
    })
}

/// Message table of a single language.
pub struct LangMessageDao {
    language: Language,
    source: Arc<dyn HierarchicalSource>,
    state: RootState<IndexedStore<Message>>,
}

impl fmt::Debug for LangMessageDao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LangMessageDao")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl LangMessageDao {
    /// Prepare the table for `language`, read from `source`.
    pub fn new(language: Language, source: Arc<dyn HierarchicalSource>) -> Self {
        let label = format!("{language} messages");
        Self {
            language,
            source,
            state: RootState::new(label.clone(), IndexedStore::new(label, Indexing::by_key())),
        }
    }

    /// Language of this table.
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
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
        let ingestor = Ingestor::new(self.source.as_ref(), SourceRoot::tree(self.language.path()));
        let messages = ingestor.ingest(accept_message, message_from_value).await?;
        let mut store = self.state.data.write().await;
        let outcome = store.set_many(messages);
        debug!("{}: {outcome:?}", self.state.label());
        Ok(())
    }

    /// Look up messages by key, in the order requested.
    ///
    /// # Errors
    ///
    /// Returns the shared error the load failed with.
    pub async fn get_by_message_keys<S: AsRef<str>>(
        &self,
        keys: &[S],
    ) -> DaoResult<Vec<Option<Message>>> {
        self.initialise().await?;
        let store = self.state.data.read().await;
        Ok(store
            .get_many_by_keys(keys)
            .into_iter()
            .map(|message| message.cloned())
            .collect())
    }

    /// Every message in the table.
    ///
    /// # Errors
    ///
    /// Returns the shared error the load failed with.
    pub async fn get_all(&self) -> DaoResult<Vec<Message>> {
        self.initialise().await?;
        Ok(self.state.data.read().await.get_all().to_vec())
    }

    /// Write the table to its `MESSAGE_BY_KEY_*` hash.
    ///
    /// # Errors
    ///
    /// Fails when the table failed to load or the write fails.
    pub async fn publish(&self, persister: &Persister) -> DaoResult<usize> {
        self.initialise().await?;
        let entries = self.state.data.read().await.entries_by_key();
        persister
            .write_hash(&self.language.hash_name(), entries)
            .await
            .map_err(|err| Arc::new(DaoError::from(err)))
    }
}

/// Message tables for every [`Language`].
#[derive(Debug)]
pub struct MessageDao {
    tables: [LangMessageDao; 10],
}

impl MessageDao {
    /// Prepare one table per language, all read from `source`.
    pub fn new(source: &Arc<dyn HierarchicalSource>) -> Self {
        Self {
            tables: Language::ALL.map(|language| LangMessageDao::new(language, Arc::clone(source))),
        }
    }

    /// Table for `language`.
    #[must_use]
    pub fn table(&self, language: Language) -> &LangMessageDao {
        // Same order as `Language::ALL`, which built the array.
        let [eude, euen, eues, eufr, euit, jpja, twzh, usen, uses, uspt] = &self.tables;
        match language {
            Language::Eude => eude,
            Language::Euen => euen,
            Language::Eues => eues,
            Language::Eufr => eufr,
            Language::Euit => euit,
            Language::Jpja => jpja,
            Language::Twzh => twzh,
            Language::Usen => usen,
            Language::Uses => uses,
            Language::Uspt => uspt,
        }
    }

    /// Load every table concurrently.
    ///
    /// Each table resolves its own gate, so a failure in one language does
    /// not leave the others pending.
    ///
    /// # Errors
    ///
    /// Returns the first failure in language order.
    pub async fn initialise(&self) -> DaoResult<()> {
        let outcomes = join_all(self.tables.iter().map(LangMessageDao::initialise)).await;
        outcomes.into_iter().collect()
    }

    /// Look up messages of `language` by key, in the order requested.
    ///
    /// # Errors
    ///
    /// Returns the shared error the table failed to load with.
    pub async fn get_by_message_keys<S: AsRef<str>>(
        &self,
        language: Language,
        keys: &[S],
    ) -> DaoResult<Vec<Option<Message>>> {
        self.table(language).get_by_message_keys(keys).await
    }

    /// Publish every table, pausing for `pause` between languages.
    ///
    /// # Errors
    ///
    /// Stops at the first table that fails to load or write.
    pub async fn publish(&self, persister: &Persister, pause: Duration) -> DaoResult<usize> {
        let mut written = 0;
        for (index, table) in self.tables.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(pause).await;
            }
            written += table.publish(persister).await?;
        }
        info!("published messages for {} languages", self.tables.len());
        Ok(written)
    }
}
