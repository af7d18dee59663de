pub mod config;
pub mod demo_auth;
pub mod middleware;
pub mod models;
pub mod oidc;

use std::sync::Arc;

use crate::auth::config::IdentityConfig;
use crate::auth::models::IdentityProvider;
use crate::error::AppError;

/// Build the configured identity provider.
pub async fn build_identity_provider(
    config: &IdentityConfig,
) -> Result<Arc<dyn IdentityProvider>, AppError> {
    match config {
        IdentityConfig::Oidc(oidc) => Ok(Arc::new(oidc::OidcIdentityProvider::discover(oidc).await?)),
        IdentityConfig::Demo(demo) => {
            tracing::warn!("Using the built-in demo identity provider; do not use in production");
            Ok(Arc::new(demo_auth::DemoIdentityProvider::new(demo)))
        }
    }
}
