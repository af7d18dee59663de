use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::models::IdentityProvider;
use crate::error::AppError;

/// The caller's username. Rejects requests without a valid bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

/// The caller's username when a bearer token is present.
///
/// A request without an `Authorization` header is anonymous; a request
/// with a token that the identity provider rejects is still refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeUser(pub Option<String>);

/// Extract the bearer token from the `Authorization` header, if any.
pub fn bearer_token(parts: &Parts) -> Result<Option<String>, AppError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AppError::Auth("Malformed Authorization header".into()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(Some(token.trim().to_string()))
        }
        _ => Err(AppError::Auth("Expected a bearer token".into())),
    }
}

async fn resolve<S>(parts: &Parts, state: &S) -> Result<Option<String>, AppError>
where
    Arc<dyn IdentityProvider>: FromRef<S>,
{
    let Some(token) = bearer_token(parts)? else {
        return Ok(None);
    };
    let identity = Arc::<dyn IdentityProvider>::from_ref(state);
    identity.resolve_username(&token).await.map(Some)
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Arc<dyn IdentityProvider>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| AppError::Auth("Not authenticated".into()))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    Arc<dyn IdentityProvider>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve(parts, state).await?))
    }
}
