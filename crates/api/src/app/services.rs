//! Service wiring: store, cache, token issuers, hashing and notifications.
//!
//! Built once at startup from [`AppConfig`] and shared by reference; there is
//! no other process-wide state.

use std::sync::Arc;

use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{info, warn};

use orgwarden_auth::{ActionTokenCipher, PasswordHasher, SessionConfig, SessionIssuer};
use orgwarden_infra::cache::{CacheBackend, Caches, InMemoryCache};
use orgwarden_infra::store::postgres::PoolSettings;
use orgwarden_infra::{
    AccessResolver, Directory, InMemoryStore, PostgresStore, SharedStore, StoreError,
};

use crate::app::notifier::{LogNotifier, Notifier};
use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("store initialisation failed: {0}")]
    Store(#[from] StoreError),

    #[error("cache initialisation failed: {0}")]
    Cache(String),
}

/// Which persistent backend is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    InMemory,
    Postgres,
}

#[derive(Clone)]
pub struct AppServices {
    pub store_kind: StoreKind,
    pub directory: Arc<Directory>,
    pub access: AccessResolver,
    pub sessions: Arc<SessionIssuer>,
    pub activation_tokens: ActionTokenCipher,
    pub reset_tokens: ActionTokenCipher,
    pub hasher: PasswordHasher,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("store_kind", &self.store_kind)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl AppServices {
    /// Connect to whatever the configuration names.
    pub async fn build(config: AppConfig) -> Result<Self, ServiceError> {
        let (store_kind, store): (StoreKind, SharedStore) = match &config.database_url {
            Some(url) => {
                let settings = PoolSettings {
                    max_connections: config.db_max_connections,
                    min_connections: config.db_min_connections,
                    ..PoolSettings::default()
                };
                let store = PostgresStore::connect(url.expose_secret(), settings).await?;
                info!(max_connections = settings.max_connections, "using postgres store");
                (StoreKind::Postgres, Arc::new(store) as SharedStore)
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory store (data is lost on exit)");
                (StoreKind::InMemory, Arc::new(InMemoryStore::new()) as SharedStore)
            }
        };

        let cache = if config.cache_enabled {
            Some(cache_backend(&config).await?)
        } else {
            None
        };

        Ok(Self::assemble(config, store_kind, store, cache, Arc::new(LogNotifier)))
    }

    /// In-memory store, optional in-memory cache, caller-supplied notifier.
    pub fn in_memory(config: AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        let cache = config
            .cache_enabled
            .then(|| Arc::new(InMemoryCache::new()) as Arc<dyn CacheBackend>);
        Self::assemble(
            config,
            StoreKind::InMemory,
            Arc::new(InMemoryStore::new()),
            cache,
            notifier,
        )
    }

    fn assemble(
        config: AppConfig,
        store_kind: StoreKind,
        store: SharedStore,
        cache: Option<Arc<dyn CacheBackend>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let directory = Arc::new(Directory::new(store, cache.map(Caches::new)));
        let sessions = Arc::new(SessionIssuer::new(SessionConfig {
            secret: config.jwt_secret.clone(),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            ttl: config.jwt_ttl(),
            leeway_secs: config.jwt_leeway_secs,
        }));
        let access = AccessResolver::new(directory.clone(), sessions.clone());

        Self {
            store_kind,
            directory,
            access,
            sessions,
            activation_tokens: ActionTokenCipher::new(&config.activation_secret),
            reset_tokens: ActionTokenCipher::new(&config.reset_secret),
            hasher: PasswordHasher::new(config.bcrypt_cost),
            notifier,
            config: Arc::new(config),
        }
    }
}

#[cfg(feature = "redis")]
async fn cache_backend(config: &AppConfig) -> Result<Arc<dyn CacheBackend>, ServiceError> {
    match &config.redis_url {
        Some(url) => {
            let cache = orgwarden_infra::cache::RedisCache::connect(url)
                .await
                .map_err(|e| ServiceError::Cache(e.to_string()))?;
            info!("using redis cache");
            Ok(Arc::new(cache))
        }
        None => {
            warn!("CACHE_ENABLED without REDIS_URL; using in-process cache");
            Ok(Arc::new(InMemoryCache::new()))
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn cache_backend(config: &AppConfig) -> Result<Arc<dyn CacheBackend>, ServiceError> {
    if config.redis_url.is_some() {
        warn!("REDIS_URL set but built without the `redis` feature; using in-process cache");
    }
    Ok(Arc::new(InMemoryCache::new()))
}
