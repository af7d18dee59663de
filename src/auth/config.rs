use serde::Deserialize;

/// Signing secret of the demo provider when none is configured. Anyone can
/// read it, so it is only accepted together with the in-memory store.
pub const BUILTIN_DEMO_SECRET: &str = "record-hub-demo-secret";

/// Which identity provider issues and validates bearer tokens.
///
/// There is no default: `provider` must always be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum IdentityConfig {
    Oidc(OidcConfig),
    Demo(DemoConfig),
}

/// OIDC provider settings (e.g. a Keycloak realm).
#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// The OIDC issuer URL (e.g., `https://sso.example.com/realms/records`).
    pub issuer_url: String,
    /// The OAuth2 client ID.
    pub client_id: String,
    /// The OAuth2 client secret, for confidential clients.
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string()]
}

impl OidcConfig {
    /// Build with explicit values (useful for testing).
    pub fn new(issuer_url: String, client_id: String, client_secret: Option<String>) -> Self {
        Self {
            issuer_url,
            client_id,
            client_secret,
            scopes: default_scopes(),
        }
    }
}

/// Built-in token issuer for local development and tests.
#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    /// HMAC secret used to sign demo tokens.
    #[serde(default = "default_demo_secret")]
    pub secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
    #[serde(default = "default_demo_users")]
    pub users: Vec<DemoUser>,
}

impl DemoConfig {
    pub fn uses_builtin_secret(&self) -> bool {
        self.secret == BUILTIN_DEMO_SECRET
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            secret: default_demo_secret(),
            token_ttl_secs: default_token_ttl(),
            users: default_demo_users(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoUser {
    pub username: String,
    pub password: String,
}

fn default_demo_secret() -> String {
    BUILTIN_DEMO_SECRET.to_string()
}

fn default_token_ttl() -> i64 {
    3600
}

fn default_demo_users() -> Vec<DemoUser> {
    ["alice", "bob", "carol"]
        .into_iter()
        .map(|name| DemoUser {
            username: name.to_string(),
            password: name.to_string(),
        })
        .collect()
}
