use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Token response returned by `POST /token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

impl AccessToken {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// The external identity provider, reduced to the two questions this
/// service asks of it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange credentials for a bearer token, or reject them.
    async fn issue_token(&self, username: &str, password: &str) -> Result<AccessToken, AppError>;

    /// Resolve a bearer token to the username it was issued for, or reject it.
    async fn resolve_username(&self, token: &str) -> Result<String, AppError>;

    /// Check that the provider is reachable.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
