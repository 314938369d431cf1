//! Loading and publishing every collection together.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::dao::{DaoResult, GrowthVectorDao, HeroDao, MessageDao, SkillDao, TitleNormaliser};
use crate::enrich::Enricher;
use crate::persist::Persister;
use crate::source::HierarchicalSource;

/// Pause between consecutive publishes, keeping within the store's request
/// budget.
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(3);

/// Every composition root, sharing one source and one message table.
#[derive(Debug)]
pub struct Catalogue {
    messages: Arc<MessageDao>,
    heroes: HeroDao,
    skills: SkillDao,
    growth_vectors: GrowthVectorDao,
}

impl Catalogue {
    /// Wire the roots over `source`. With an `enricher`, hero portraits and
    /// passive icons are resolved during loading.
    pub fn new(source: &Arc<dyn HierarchicalSource>, enricher: Option<Enricher>) -> Self {
        let messages = Arc::new(MessageDao::new(source));
        let mut heroes = HeroDao::new(Arc::clone(source));
        let mut skills = SkillDao::new(Arc::clone(source));
        if let Some(enricher) = enricher {
            heroes = heroes.with_portraits(enricher.clone(), Arc::clone(&messages));
            skills = skills.with_icons(enricher, Arc::clone(&messages));
        }
        Self {
            messages,
            heroes,
            skills,
            growth_vectors: GrowthVectorDao::new(Arc::clone(source)),
        }
    }

    /// Rewrite English skill names before they become icon titles.
    #[must_use]
    pub fn with_title_normaliser(mut self, normaliser: TitleNormaliser) -> Self {
        self.skills = self.skills.with_title_normaliser(normaliser);
        self
    }

    /// Message tables.
    #[must_use]
    pub fn messages(&self) -> &MessageDao {
        &self.messages
    }

    /// Hero collection.
    #[must_use]
    pub const fn heroes(&self) -> &HeroDao {
        &self.heroes
    }

    /// Skill collection.
    #[must_use]
    pub const fn skills(&self) -> &SkillDao {
        &self.skills
    }

    /// Growth vector table.
    #[must_use]
    pub const fn growth_vectors(&self) -> &GrowthVectorDao {
        &self.growth_vectors
    }

    /// Load every root concurrently.
    ///
    /// Every root runs to completion, so no gate is left pending when one
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure in the order messages, heroes, skills,
    /// growth vectors.
    pub async fn initialise_all(&self) -> DaoResult<()> {
        let (messages, heroes, skills, growth_vectors) = tokio::join!(
            self.messages.initialise(),
            self.heroes.initialise(),
            self.skills.initialise(),
            self.growth_vectors.initialise(),
        );
        messages?;
        heroes?;
        skills?;
        growth_vectors?;
        info!("all collections loaded");
        Ok(())
    }

    /// Publish heroes, growth vectors, skills and messages in that order,
    /// pausing for `pause` between each.
    ///
    /// # Errors
    ///
    /// Stops at the first root that fails to load or write. Hashes written
    /// before the failure stay in place.
    pub async fn publish_all(&self, persister: &Persister, pause: Duration) -> DaoResult<()> {
        self.initialise_all().await?;
        let heroes = self.heroes.publish(persister).await?;
        tokio::time::sleep(pause).await;
        self.growth_vectors.publish(persister).await?;
        tokio::time::sleep(pause).await;
        let skills = self.skills.publish(persister).await?;
        tokio::time::sleep(pause).await;
        let messages = self.messages.publish(persister, pause).await?;
        info!("published {heroes} hero, {skills} skill and {messages} message fields");
        Ok(())
    }
}
