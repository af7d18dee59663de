use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::models::IdentityProvider;
use crate::error::AppError;
use crate::records::service::RecordService;
use crate::state::AppState;

const OK: &str = "ok";
const UNAVAILABLE: &str = "unavailable";

/// Response of `GET /stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub collections: BTreeMap<String, u64>,
}

/// Response of `GET /health`. `status` is `ok` only when every component is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub identity: String,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status == OK
    }
}

pub async fn process_stats(services: &[Arc<RecordService>]) -> Result<StatsResponse, AppError> {
    let mut collections = BTreeMap::new();
    for service in services {
        collections.insert(service.name().to_string(), service.count().await?);
    }
    Ok(StatsResponse { collections })
}

async fn ping_stores(services: &[Arc<RecordService>]) -> Result<(), AppError> {
    for service in services {
        service.store().ping().await?;
    }
    Ok(())
}

fn component_status(component: &str, result: Result<(), AppError>) -> &'static str {
    match result {
        Ok(()) => OK,
        Err(e) => {
            tracing::error!(component, "Health check failed: {}", e);
            UNAVAILABLE
        }
    }
}

/// Ping every store and the identity provider.
pub async fn process_health(
    services: &[Arc<RecordService>],
    identity: &dyn IdentityProvider,
) -> HealthResponse {
    let store = component_status("store", ping_stores(services).await);
    let identity = component_status("identity", identity.ping().await);
    let status = if store == OK && identity == OK { OK } else { UNAVAILABLE };

    HealthResponse {
        status: status.to_string(),
        store: store.to_string(),
        identity: identity.to_string(),
    }
}

/// Axum handler for `GET /stats`.
pub async fn stats_handler(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, AppError> {
    let stats = process_stats(&state.services).await?;
    Ok(Json(stats))
}

/// Axum handler for `GET /health`.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = process_health(&state.services, state.identity.as_ref()).await;
    let status = if health.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}
