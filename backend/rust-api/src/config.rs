use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = config::ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(config::ConfigError::Message(format!(
                "Unknown storage backend '{}', expected 'mongo' or 'memory'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Award events are streamed to Redis only when set.
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub award_stream: String,
    pub storage: StorageBackend,
    /// Catalog seed for the in-memory backend.
    pub seed_path: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| {
                "mongodb://localhost:27017/?replicaSet=rs0&directConnection=true".to_string()
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "learngrove".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let award_stream = settings
            .get_string("redis.award_stream")
            .or_else(|_| env::var("AWARD_STREAM"))
            .unwrap_or_else(|_| "progress:awards".to_string());

        let storage = settings
            .get_string("storage.backend")
            .or_else(|_| env::var("STORAGE_BACKEND"))
            .map(|raw| raw.parse::<StorageBackend>())
            .unwrap_or(Ok(StorageBackend::Mongo))?;

        let seed_path = settings
            .get_string("storage.seed_path")
            .or_else(|_| env::var("SEED_PATH"))
            .ok();

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            bind_addr,
            award_stream,
            storage,
            seed_path,
        })
    }

    /// In-memory configuration for tests and local runs without MongoDB.
    pub fn for_memory(jwt_secret: impl Into<String>) -> Self {
        Config {
            mongo_uri: String::new(),
            mongo_database: "learngrove".to_string(),
            redis_uri: None,
            jwt_secret: jwt_secret.into(),
            bind_addr: "127.0.0.1:0".to_string(),
            award_stream: "progress:awards".to_string(),
            storage: StorageBackend::Memory,
            seed_path: None,
        }
    }
}
