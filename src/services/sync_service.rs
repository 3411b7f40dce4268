//! Store access and watch streams on behalf of gateway clients.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde_json::Value;
use tracing::info;

use crate::error::AppError;
use crate::state::SharedState;
use crate::store::{BoardStore, FieldMap};

/// Maximum number of path segments accepted from clients.
const MAX_PATH_DEPTH: usize = 8;
/// Maximum total path length accepted from clients.
const MAX_PATH_LEN: usize = 512;

/// Snapshot the value at `path`.
pub async fn read(state: &SharedState, path: &str) -> Result<Value, AppError> {
    validate_path(path)?;
    Ok(state.store().read_once(path).await?)
}

/// Replace the subtree at `path`.
pub async fn write(state: &SharedState, path: &str, value: Value) -> Result<(), AppError> {
    validate_path(path)?;
    state.store().write(path, value).await?;
    Ok(())
}

/// Merge fields into the object at `path`.
pub async fn merge(state: &SharedState, path: &str, fields: FieldMap) -> Result<(), AppError> {
    validate_path(path)?;
    for relative in fields.keys() {
        validate_path(relative).map_err(|_| {
            AppError::BadRequest(format!("invalid field path `{relative}`"))
        })?;
    }
    state.store().update(path, fields).await?;
    Ok(())
}

/// Remove the subtree at `path`.
pub async fn delete(state: &SharedState, path: &str) -> Result<(), AppError> {
    validate_path(path)?;
    state.store().remove(path).await?;
    Ok(())
}

/// Open an SSE stream delivering the current value at `path` and every
/// subsequent affected change.
pub async fn watch(
    state: &SharedState,
    path: &str,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, AppError> {
    validate_path(path)?;
    let mut receiver = state.store().subscribe(path).await?;
    info!(%path, "watch stream opened");

    let stream = async_stream::stream! {
        loop {
            let value = receiver.borrow_and_update().clone();
            yield Ok(Event::default().event("change").data(value.to_string()));
            if receiver.changed().await.is_err() {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

/// Reject paths that do not fit the document layout.
fn validate_path(path: &str) -> Result<(), AppError> {
    if path.is_empty() || path.len() > MAX_PATH_LEN {
        return Err(AppError::BadRequest("invalid path length".into()));
    }
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() > MAX_PATH_DEPTH {
        return Err(AppError::BadRequest("path is nested too deeply".into()));
    }
    for segment in segments {
        let well_formed = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(AppError::BadRequest(format!(
                "invalid path segment `{segment}`"
            )));
        }
    }
    Ok(())
}
