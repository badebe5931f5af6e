use std::sync::Arc;

use anyhow::Context;
use tracing::warn;

use super::{
    auth::SessionKeys,
    claims::{AwardSource, UniformAward},
    config::{Config, StoreKind},
    database::RedisStore,
    store::{Store, memory::MemoryStore},
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub award: Arc<dyn AwardSource>,
    pub sessions: SessionKeys,
}

impl State {
    pub async fn new() -> anyhow::Result<Arc<Self>> {
        let config = Config::load().context("Environment misconfigured")?;

        let store: Arc<dyn Store> = match config.store {
            StoreKind::Redis => Arc::new(
                RedisStore::connect(&config.redis_url)
                    .await
                    .with_context(|| format!("Failed to connect to {}", config.redis_url))?,
            ),
            StoreKind::Memory => {
                warn!("Using the in-memory store, nothing survives a restart");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::build(config, store, Arc::new(UniformAward)))
    }

    pub fn build(
        config: Config,
        store: Arc<dyn Store>,
        award: Arc<dyn AwardSource>,
    ) -> Arc<Self> {
        let sessions = SessionKeys::new(config.session_secret.as_bytes(), config.session_ttl_secs);

        Arc::new(Self {
            config,
            store,
            award,
            sessions,
        })
    }
}
