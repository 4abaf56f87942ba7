use crate::contacts::{AttributeMap, ContactService, DuplicateAction, ImportRecord, ImportReport};
use crate::error::ApiError;
use crate::models::{Contact, DataResponse, PaginatedResponse};
use crate::routes::params::PaginationParams;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of a bulk import call.
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportContactsRequest {
    /// One object per uploaded row, keyed by column header.
    pub records: Vec<ImportRecord>,
    /// What to do with rows whose email already belongs to a contact.
    pub duplicate_action: DuplicateAction,
    /// Optional column header to attribute key renames.
    #[serde(default)]
    pub attribute_map: AttributeMap,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeletedContact {
    pub id: Uuid,
}

/// Import a batch of contact records into an environment
#[openapi(tag = "Contacts")]
#[post("/environments/<environment_id>/contacts/import", data = "<request>")]
pub async fn import_contacts(
    environment_id: Uuid,
    request: Json<ImportContactsRequest>,
    service: &State<ContactService>,
) -> Result<Json<DataResponse<ImportReport>>, ApiError> {
    service.ensure_environment(environment_id).await?;

    let ImportContactsRequest {
        records,
        duplicate_action,
        attribute_map,
    } = request.into_inner();

    let report = service
        .import(environment_id, records, duplicate_action, &attribute_map)
        .await?;

    Ok(Json(DataResponse::new(report)))
}

/// List contacts in an environment, newest first
#[openapi(tag = "Contacts")]
#[get("/environments/<environment_id>/contacts?<params..>")]
pub async fn list_contacts(
    environment_id: Uuid,
    params: Option<PaginationParams>,
    service: &State<ContactService>,
) -> Result<Json<PaginatedResponse<Contact>>, ApiError> {
    let params = params.unwrap_or_default();
    let page = params.page();
    let size = params.size();

    let contacts = service.list_contacts(environment_id, page, size).await?;

    Ok(Json(PaginatedResponse::new(contacts, page, size)))
}

/// Get a single contact with its attributes
#[openapi(tag = "Contacts")]
#[get("/contacts/<contact_id>")]
pub async fn get_contact(
    contact_id: Uuid,
    service: &State<ContactService>,
) -> Result<Json<DataResponse<Contact>>, ApiError> {
    let contact = service.get_contact(contact_id).await?;
    Ok(Json(DataResponse::new(contact)))
}

/// Delete a contact and its attribute values
#[openapi(tag = "Contacts")]
#[delete("/contacts/<contact_id>")]
pub async fn delete_contact(
    contact_id: Uuid,
    service: &State<ContactService>,
) -> Result<Json<DataResponse<DeletedContact>>, ApiError> {
    service.delete_contact(contact_id).await?;
    Ok(Json(DataResponse::new(DeletedContact { id: contact_id })))
}
