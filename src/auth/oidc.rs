use async_trait::async_trait;
use openidconnect::core::CoreProviderMetadata;
use openidconnect::IssuerUrl;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::auth::config::OidcConfig;
use crate::auth::models::{AccessToken, IdentityProvider};
use crate::error::AppError;

/// Identity provider backed by an OIDC server such as Keycloak.
///
/// Endpoints are discovered once at startup. Credentials are exchanged with
/// the resource-owner password grant; tokens are resolved through the
/// userinfo endpoint, so revocation on the provider side takes effect
/// immediately.
pub struct OidcIdentityProvider {
    http: reqwest::Client,
    discovery_url: Url,
    token_url: Url,
    userinfo_url: Url,
    client_id: String,
    client_secret: Option<String>,
    scope: String,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    preferred_username: Option<String>,
}

impl UserInfo {
    fn username(self) -> String {
        self.preferred_username
            .filter(|name| !name.is_empty())
            .unwrap_or(self.sub)
    }
}

fn discovery_url(issuer_url: &str) -> Result<Url, AppError> {
    Url::parse(&format!(
        "{}/.well-known/openid-configuration",
        issuer_url.trim_end_matches('/')
    ))
    .map_err(|e| AppError::Identity(format!("Invalid issuer URL: {e}")))
}

impl OidcIdentityProvider {
    pub async fn discover(config: &OidcConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            // Discovery must not follow redirects.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Identity(format!("Failed to build HTTP client: {e}")))?;

        let issuer = IssuerUrl::new(config.issuer_url.clone())
            .map_err(|e| AppError::Identity(format!("Invalid issuer URL: {e}")))?;
        let discovery_url = discovery_url(&config.issuer_url)?;

        let metadata = CoreProviderMetadata::discover_async(issuer, &http)
            .await
            .map_err(|e| AppError::Identity(format!("Failed to discover OIDC provider: {e}")))?;

        let token_url = metadata
            .token_endpoint()
            .ok_or_else(|| AppError::Identity("Provider exposes no token endpoint".into()))?
            .url()
            .clone();
        let userinfo_url = metadata
            .userinfo_endpoint()
            .ok_or_else(|| AppError::Identity("Provider exposes no userinfo endpoint".into()))?
            .url()
            .clone();

        tracing::info!(issuer = %config.issuer_url, "OIDC provider discovered");

        Ok(Self {
            http,
            discovery_url,
            token_url,
            userinfo_url,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scopes.join(" "),
        })
    }
}

#[async_trait]
impl IdentityProvider for OidcIdentityProvider {
    async fn issue_token(&self, username: &str, password: &str) -> Result<AccessToken, AppError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("username", username),
            ("password", password),
            ("scope", self.scope.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("Token request failed: {e}")))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                return Err(AppError::Auth("Invalid username or password".into()));
            }
            status => {
                return Err(AppError::Identity(format!(
                    "Token endpoint answered {status}"
                )));
            }
        }

        let body: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| AppError::Identity(format!("Malformed token response: {e}")))?;

        Ok(AccessToken::bearer(body.access_token))
    }

    async fn resolve_username(&self, token: &str) -> Result<String, AppError> {
        let response = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("Userinfo request failed: {e}")))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::Auth("Invalid or expired token".into()));
            }
            status => {
                return Err(AppError::Identity(format!(
                    "Userinfo endpoint answered {status}"
                )));
            }
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| AppError::Identity(format!("Malformed userinfo response: {e}")))?;

        Ok(info.username())
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.http
            .get(self.discovery_url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::Identity(format!("Provider unreachable: {e}")))?;
        Ok(())
    }
}
