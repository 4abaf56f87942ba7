//! HTTP route handlers grouped by resource.
//!
//! Handlers are annotated with `#[openapi]` so `rocket_okapi` can derive
//! the OpenAPI document served at `/api/v1/openapi.json`.

pub mod attribute_keys;
pub mod contacts;
pub mod health;
pub mod params;
