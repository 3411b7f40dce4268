//! HTTP route composition for the sync gateway.

use axum::Router;

use crate::state::SharedState;

/// Swagger UI and OpenAPI document routes.
pub mod docs;
/// Health check routes.
pub mod health;
/// Path-addressed store and watch routes.
pub mod store;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router().merge(store::router());
    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
