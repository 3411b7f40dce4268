//! OpenAPI documentation generation.

use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the retro board sync gateway.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::store::read_value,
        crate::routes::store::write_value,
        crate::routes::store::merge_value,
        crate::routes::store::delete_value,
        crate::routes::store::watch_value,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::model::Card,
            crate::model::CardKind,
            crate::model::Phase,
            crate::model::TimerState,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "store", description = "Path-addressed document store"),
        (name = "watch", description = "Server-sent change streams"),
    )
)]
pub struct ApiDoc;
