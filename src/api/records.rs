use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::middleware::{CurrentUser, MaybeUser};
use crate::db::models::RecordView;
use crate::error::AppError;
use crate::records::service::RecordService;
use crate::state::RecordState;

/// Query string accepted by the listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TitleQuery {
    #[serde(default)]
    pub title: Option<String>,
}

/// Routes of one record kind, relative to its `/{collection}` prefix.
pub fn router(state: RecordState) -> Router {
    Router::new()
        .route("/", get(list_handler).post(create_handler))
        .route("/me", get(list_mine_handler))
        .route(
            "/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .with_state(state)
}

/// Validate a create body and insert it under `owner`, refusing duplicate titles.
pub async fn process_create(
    service: &RecordService,
    body: Value,
    owner: &str,
) -> Result<RecordView, AppError> {
    let payload = service.schema().validate_new(body)?;

    if !service.title_is_unique(&payload.title).await? {
        return Err(AppError::Conflict(format!(
            "A record titled '{}' already exists in '{}'",
            payload.title,
            service.name()
        )));
    }

    let record = service.create(payload, owner).await?;
    Ok(record.into())
}

/// Axum handler for `POST /{collection}`.
pub async fn create_handler(
    State(state): State<RecordState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<RecordView>), AppError> {
    let Json(body) = body?;
    let view = process_create(&state.service, body, &user).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Axum handler for `GET /{collection}`.
pub async fn list_handler(
    State(state): State<RecordState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<TitleQuery>,
) -> Result<Json<Vec<RecordView>>, AppError> {
    let records = state
        .service
        .list(user.as_deref(), query.title.as_deref())
        .await?;
    Ok(Json(records.into_iter().map(RecordView::from).collect()))
}

/// Axum handler for `GET /{collection}/me`.
pub async fn list_mine_handler(
    State(state): State<RecordState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<TitleQuery>,
) -> Result<Json<Vec<RecordView>>, AppError> {
    let records = state
        .service
        .list_mine(&user, query.title.as_deref())
        .await?;
    Ok(Json(records.into_iter().map(RecordView::from).collect()))
}

/// Axum handler for `GET /{collection}/{id}`.
pub async fn get_handler(
    State(state): State<RecordState>,
    Path(id): Path<String>,
) -> Result<Json<RecordView>, AppError> {
    let record = state.service.get(&id).await?;
    Ok(Json(record.into()))
}

/// Axum handler for `PUT /{collection}/{id}`.
pub async fn update_handler(
    State(state): State<RecordState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RecordView>, AppError> {
    let Json(body) = body?;
    let patch = state.service.schema().validate_patch(body)?;
    let record = state.service.update(&id, patch, &user).await?;
    Ok(Json(record.into()))
}

/// Axum handler for `DELETE /{collection}/{id}`.
pub async fn delete_handler(
    State(state): State<RecordState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.service.delete(&id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
