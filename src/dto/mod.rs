//! Request and response payloads exposed by the gateway.

/// Health check payloads.
pub mod health;
