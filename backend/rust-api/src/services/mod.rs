use std::sync::Arc;

use anyhow::Context;
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use crate::config::{Config, StorageBackend};
use crate::middlewares::auth::JwtService;
use crate::store::{MemoryProgressStore, MongoProgressStore, ProgressStore};

use award_observer::{AwardNotifier, RedisStreamObserver, TracingAwardObserver};
use progress_reader::ProgressReader;
use standing_service::StandingService;
use submission_service::SubmissionCoordinator;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ProgressStore>,
    pub redis: Option<ConnectionManager>,
    pub jwt: JwtService,
    pub submissions: SubmissionCoordinator,
    pub reader: ProgressReader,
    pub standings: StandingService,
}

impl AppState {
    /// Builds the store selected by `config.storage`, plus Redis when configured.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn ProgressStore> = match config.storage {
            StorageBackend::Mongo => {
                tracing::info!("Connecting to MongoDB...");
                let client = MongoClient::with_uri_str(&config.mongo_uri)
                    .await
                    .context("Failed to create MongoDB client")?;
                let store = MongoProgressStore::new(client, &config.mongo_database);
                store.ensure_indexes().await?;
                tracing::info!("MongoDB connection established");
                Arc::new(store)
            }
            StorageBackend::Memory => {
                let store = match &config.seed_path {
                    Some(path) => MemoryProgressStore::load_seed(path).await?,
                    None => MemoryProgressStore::new(),
                };
                tracing::warn!("Using in-memory progress store; data is lost on restart");
                Arc::new(store)
            }
        };

        let redis = match &config.redis_uri {
            Some(uri) => Some(connect_redis(uri).await?),
            None => {
                tracing::info!("REDIS_URI not set, award stream disabled");
                None
            }
        };

        let mut notifier = AwardNotifier::new().with_observer(Arc::new(TracingAwardObserver));
        if let Some(redis) = &redis {
            notifier = notifier.with_observer(Arc::new(RedisStreamObserver::new(
                redis.clone(),
                config.award_stream.clone(),
            )));
        }

        Ok(Self::with_store(config, store, redis, notifier))
    }

    pub fn with_store(
        config: Config,
        store: Arc<dyn ProgressStore>,
        redis: Option<ConnectionManager>,
        notifier: AwardNotifier,
    ) -> Self {
        Self {
            submissions: SubmissionCoordinator::new(store.clone(), notifier),
            reader: ProgressReader::new(store.clone()),
            standings: StandingService::new(store.clone()),
            jwt: JwtService::new(&config.jwt_secret),
            config,
            store,
            redis,
        }
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(uri).context("Invalid Redis URI")?;

    tracing::info!("Attempting to connect to Redis...");

    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}

pub mod answer_validator;
pub mod award_observer;
pub mod part_completion;
pub mod progress_reader;
pub mod standing_service;
pub mod submission_service;
