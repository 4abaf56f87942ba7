use crate::contacts::ContactService;
use crate::error::ApiError;
use crate::models::{AttributeKey, DataResponse};
use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_okapi::openapi;
use uuid::Uuid;

/// List the attribute keys defined in an environment
#[openapi(tag = "Attribute Keys")]
#[get("/environments/<environment_id>/attribute-keys")]
pub async fn list_attribute_keys(
    environment_id: Uuid,
    service: &State<ContactService>,
) -> Result<Json<DataResponse<Vec<AttributeKey>>>, ApiError> {
    let keys = service.list_attribute_keys(environment_id).await?;
    Ok(Json(DataResponse::new(keys)))
}
