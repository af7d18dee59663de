use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::config::{DemoConfig, DemoUser};
use crate::auth::models::{AccessToken, IdentityProvider};
use crate::error::AppError;

const DEMO_ISSUER: &str = "record-hub-demo";

/// Claims embedded in a demo bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DemoClaims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Identity provider backed by a static user table and HS256 tokens.
///
/// Meant for local development and tests; never for production.
pub struct DemoIdentityProvider {
    users: Vec<DemoUser>,
    token_ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl DemoIdentityProvider {
    pub fn new(config: &DemoConfig) -> Self {
        Self {
            users: config.users.clone(),
            token_ttl: Duration::seconds(config.token_ttl_secs),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[DEMO_ISSUER]);
        validation
    }
}

#[async_trait]
impl IdentityProvider for DemoIdentityProvider {
    async fn issue_token(&self, username: &str, password: &str) -> Result<AccessToken, AppError> {
        let user = self
            .users
            .iter()
            .find(|u| u.username == username && u.password == password)
            .ok_or_else(|| AppError::Auth("Invalid username or password".into()))?;

        let now = Utc::now();
        let claims = DemoClaims {
            sub: user.username.clone(),
            iss: DEMO_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign demo token: {e}")))?;

        Ok(AccessToken::bearer(token))
    }

    async fn resolve_username(&self, token: &str) -> Result<String, AppError> {
        let data = decode::<DemoClaims>(token, &self.decoding_key, &Self::validation())
            .map_err(|e| AppError::Auth(format!("Invalid token: {e}")))?;

        Ok(data.claims.sub)
    }
}
