use std::collections::HashSet;

use serde::Deserialize;

use crate::auth::config::IdentityConfig;
use crate::error::AppError;
use crate::models::schema::RecordSchema;

/// Paths served at the root that a collection may not shadow.
const RESERVED_PREFIXES: &[&str] = &["token", "stats", "health"];

/// Top-level configuration, layered from an optional file and
/// `RECORD_HUB__*` environment variables (e.g. `RECORD_HUB__MONGO__URI`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreBackend,
    #[serde(default)]
    pub mongo: MongoConfig,
    pub identity: IdentityConfig,
    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mongo,
    /// Process-local collections; data is lost on restart.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    #[serde(default = "default_mongo_uri")]
    pub uri: String,
    /// Injected into `uri` when set, so secrets can live outside the URI.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_mongo_database")]
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_mongo_uri(),
            username: None,
            password: None,
            database: default_mongo_database(),
        }
    }
}

fn default_mongo_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_mongo_database() -> String {
    "record_hub".to_string()
}

impl MongoConfig {
    /// The connection URI with `username`/`password` injected (percent-encoded).
    pub fn connection_uri(&self) -> Result<String, AppError> {
        let Some(username) = &self.username else {
            return Ok(self.uri.clone());
        };

        let mut url = url::Url::parse(&self.uri)
            .map_err(|e| AppError::Internal(format!("Invalid MongoDB URI: {e}")))?;
        url.set_username(username)
            .map_err(|_| AppError::Internal("MongoDB URI cannot carry credentials".into()))?;
        url.set_password(self.password.as_deref())
            .map_err(|_| AppError::Internal("MongoDB URI cannot carry credentials".into()))?;

        Ok(url.to_string())
    }
}

/// One record kind, served at `/{name}` and stored in the collection `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Display label; defaults to the name.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub fields: RecordSchema,
}

impl CollectionConfig {
    pub fn tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(&self.name)
    }
}

fn default_collections() -> Vec<CollectionConfig> {
    [("record_one", "Record One"), ("record_two", "Record Two")]
        .into_iter()
        .map(|(name, tag)| CollectionConfig {
            name: name.to_string(),
            tag: Some(tag.to_string()),
            fields: RecordSchema::default(),
        })
        .collect()
}

impl AppConfig {
    /// Load from `path` (required when given) or an optional `record_hub.*`
    /// file in the working directory, then apply environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(path.unwrap_or("record_hub")).required(path.is_some()),
            )
            .add_source(
                config::Environment::with_prefix("RECORD_HUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to read configuration: {e}")))?;

        Self::from_settings(settings)
    }

    pub fn from_settings(settings: config::Config) -> Result<Self, AppError> {
        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| AppError::Internal(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let IdentityConfig::Demo(demo) = &self.identity {
            if demo.secret.is_empty() {
                return Err(AppError::Internal("identity.secret must not be empty".into()));
            }
            if demo.uses_builtin_secret() && self.store != StoreBackend::Memory {
                return Err(AppError::Internal(
                    "The demo identity provider needs its own identity.secret unless store = \"memory\"".into(),
                ));
            }
        }

        if self.collections.is_empty() {
            return Err(AppError::Internal("At least one collection must be configured".into()));
        }

        let mut seen = HashSet::new();
        for collection in &self.collections {
            let name = collection.name.as_str();
            let url_safe = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !url_safe {
                return Err(AppError::Internal(format!(
                    "Collection name '{name}' must be non-empty and use only [A-Za-z0-9_-]"
                )));
            }
            if RESERVED_PREFIXES.contains(&name) {
                return Err(AppError::Internal(format!(
                    "Collection name '{name}' collides with a built-in route"
                )));
            }
            if !seen.insert(name) {
                return Err(AppError::Internal(format!(
                    "Collection '{name}' is configured twice"
                )));
            }
        }
        Ok(())
    }
}
