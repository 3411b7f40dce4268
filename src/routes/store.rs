//! Path-addressed store and watch routes.

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use serde_json::Value;

use crate::{
    error::AppError,
    services::sync_service,
    state::SharedState,
    store::FieldMap,
};

#[utoipa::path(
    get,
    path = "/v1/store/{path}",
    tag = "store",
    params(("path" = String, Path, description = "Slash-separated document path")),
    responses(
        (status = 200, description = "Value at the path, null when absent"),
        (status = 400, description = "Malformed path")
    )
)]
/// Snapshot the value stored at a path.
pub async fn read_value(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, AppError> {
    let value = sync_service::read(&state, &path).await?;
    Ok(Json(value))
}

#[utoipa::path(
    put,
    path = "/v1/store/{path}",
    tag = "store",
    params(("path" = String, Path, description = "Slash-separated document path")),
    responses(
        (status = 204, description = "Subtree replaced"),
        (status = 400, description = "Malformed path")
    )
)]
/// Replace the subtree at a path with the request body.
pub async fn write_value(
    State(state): State<SharedState>,
    Path(path): Path<String>,
    Json(value): Json<Value>,
) -> Result<StatusCode, AppError> {
    sync_service::write(&state, &path, value).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/v1/store/{path}",
    tag = "store",
    params(("path" = String, Path, description = "Slash-separated document path")),
    request_body = Value,
    responses(
        (status = 204, description = "Fields merged"),
        (status = 400, description = "Malformed path or fields")
    )
)]
/// Merge the request body's fields into the object at a path.
///
/// Field keys may contain `/` to address nested entries; a `null` field
/// deletes the addressed entry.
pub async fn merge_value(
    State(state): State<SharedState>,
    Path(path): Path<String>,
    Json(fields): Json<FieldMap>,
) -> Result<StatusCode, AppError> {
    sync_service::merge(&state, &path, fields).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/store/{path}",
    tag = "store",
    params(("path" = String, Path, description = "Slash-separated document path")),
    responses(
        (status = 204, description = "Subtree removed"),
        (status = 400, description = "Malformed path")
    )
)]
/// Remove the subtree at a path.
pub async fn delete_value(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<StatusCode, AppError> {
    sync_service::delete(&state, &path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/watch/{path}",
    tag = "watch",
    params(("path" = String, Path, description = "Slash-separated document path")),
    responses(
        (status = 200, description = "SSE stream of change events", content_type = "text/event-stream", body = String),
        (status = 400, description = "Malformed path")
    )
)]
/// Stream the value at a path: the current value immediately, then every
/// affected change.
pub async fn watch_value(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>> + use<>>, AppError> {
    sync_service::watch(&state, &path).await
}

/// Configure the store routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route(
            "/v1/store/{*path}",
            get(read_value)
                .put(write_value)
                .patch(merge_value)
                .delete(delete_value),
        )
        .route("/v1/watch/{*path}", get(watch_value))
}
