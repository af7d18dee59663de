use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::build_identity_provider;
use crate::auth::models::IdentityProvider;
use crate::config::{AppConfig, StoreBackend};
use crate::db::memory::InMemoryRecordStore;
use crate::db::repository::{MongoRecordStore, RecordStore};
use crate::error::AppError;
use crate::records::service::RecordService;

/// Root application state: the identity provider and one service per
/// configured record kind.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub services: Arc<Vec<Arc<RecordService>>>,
}

/// State of a router nested under `/{collection}`.
#[derive(Clone)]
pub struct RecordState {
    pub service: Arc<RecordService>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl FromRef<AppState> for Arc<dyn IdentityProvider> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

impl FromRef<RecordState> for Arc<dyn IdentityProvider> {
    fn from_ref(state: &RecordState) -> Self {
        state.identity.clone()
    }
}

impl AppState {
    pub fn new(identity: Arc<dyn IdentityProvider>, services: Vec<Arc<RecordService>>) -> Self {
        Self {
            identity,
            services: Arc::new(services),
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let identity = build_identity_provider(&config.identity).await?;

        let stores: Vec<Arc<dyn RecordStore>> = match config.store {
            StoreBackend::Mongo => {
                let client = mongodb::Client::with_uri_str(config.mongo.connection_uri()?).await?;
                let db = client.database(&config.mongo.database);

                // Startup continues without a reachable server; /health reports it.
                match db.run_command(bson::doc! { "ping": 1 }).await {
                    Ok(_) => tracing::info!(database = %config.mongo.database, "Connected to MongoDB"),
                    Err(e) => tracing::error!("MongoDB is unreachable: {}", e),
                }

                config
                    .collections
                    .iter()
                    .map(|c| Arc::new(MongoRecordStore::new(&db, &c.name)) as Arc<dyn RecordStore>)
                    .collect()
            }
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory store; records are lost on restart");
                config
                    .collections
                    .iter()
                    .map(|c| Arc::new(InMemoryRecordStore::new(&c.name)) as Arc<dyn RecordStore>)
                    .collect()
            }
        };

        let services = config
            .collections
            .iter()
            .zip(stores)
            .map(|(collection, store)| {
                Arc::new(RecordService::new(
                    &collection.name,
                    collection.tag(),
                    collection.fields.clone(),
                    store,
                ))
            })
            .collect();

        Ok(Self::new(identity, services))
    }
}

/// Build the full HTTP router.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/token", post(api::token::token_handler))
        .route("/stats", get(api::stats::stats_handler))
        .route("/health", get(api::stats::health_handler))
        .with_state(state.clone());

    for service in state.services.iter() {
        tracing::debug!(collection = %service.name(), tag = %service.tag(), "mounting records router");
        let records = api::records::router(RecordState {
            service: service.clone(),
            identity: state.identity.clone(),
        });
        router = router.nest(&format!("/{}", service.name()), records);
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
