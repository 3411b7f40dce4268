//! Gateway-side services backing the HTTP routes.

/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Store access and watch streams on behalf of gateway clients.
pub mod sync_service;
