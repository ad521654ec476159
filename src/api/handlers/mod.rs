use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{DescriptionStore, HistoryStore};
use crate::error::{CatalogError, ErrorKind};
use crate::hierarchy::IntegrityReport;
use crate::models::*;
use crate::Catalog;

pub const ACTOR_HEADER: &str = "X-Actor-Id";

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Map a catalog error to a status code and message.
///
/// Storage and serialization failures are logged in full but reported to the
/// client as a generic message.
fn catalog_error(e: CatalogError) -> (StatusCode, String) {
    let status = match e.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::AuditWriteFailure | ErrorKind::Internal => {
            tracing::error!("Internal error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };
    tracing::debug!(status = %status, "Request rejected: {}", e);
    (status, e.to_string())
}

// ============================================================
// Actor
// ============================================================

/// Identity of the caller performing a mutation, from the `X-Actor-Id`
/// header. Stored verbatim in history entries.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Actor(value.to_string()))
            .ok_or((
                StatusCode::BAD_REQUEST,
                format!("missing {} header", ACTOR_HEADER),
            ))
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Components
// ============================================================

pub async fn list_components(State(catalog): State<Catalog>) -> ApiResult<Json<Vec<ComponentView>>> {
    catalog.list().map(Json).map_err(catalog_error)
}

pub async fn get_component(
    State(catalog): State<Catalog>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ComponentView>> {
    catalog.get(id).map(Json).map_err(catalog_error)
}

pub async fn create_component(
    State(catalog): State<Catalog>,
    Actor(actor): Actor,
    Json(input): Json<CreateComponentInput>,
) -> ApiResult<(StatusCode, Json<ComponentView>)> {
    catalog
        .create(input, &actor)
        .map(|c| (StatusCode::CREATED, Json(c)))
        .map_err(catalog_error)
}

pub async fn update_component(
    State(catalog): State<Catalog>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateComponentInput>,
) -> ApiResult<Json<ComponentView>> {
    catalog.update(id, input, &actor).map(Json).map_err(catalog_error)
}

pub async fn delete_component(
    State(catalog): State<Catalog>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteConfirmation>> {
    catalog.delete(id, &actor).map(Json).map_err(catalog_error)
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search_components(
    State(catalog): State<Catalog>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<ComponentView>>> {
    catalog.search(&query.q).map(Json).map_err(catalog_error)
}

pub async fn component_tree(
    State(catalog): State<Catalog>,
) -> ApiResult<Json<Vec<ComponentTreeNode>>> {
    catalog.tree().map(Json).map_err(catalog_error)
}

pub async fn component_history(
    State(catalog): State<Catalog>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    catalog.history(id).map(Json).map_err(catalog_error)
}

// ============================================================
// Subcomponents
// ============================================================

pub async fn add_subcomponent(
    State(catalog): State<Catalog>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateComponentInput>,
) -> ApiResult<(StatusCode, Json<ComponentView>)> {
    catalog
        .add_subcomponent(id, input, &actor)
        .map(|parent| (StatusCode::CREATED, Json(parent)))
        .map_err(catalog_error)
}

pub async fn associate_subcomponent(
    State(catalog): State<Catalog>,
    Actor(actor): Actor,
    Path((id, child_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ComponentView>> {
    catalog
        .associate_child(id, child_id, &actor)
        .map(Json)
        .map_err(catalog_error)
}

pub async fn disassociate_subcomponent(
    State(catalog): State<Catalog>,
    Actor(actor): Actor,
    Path((id, child_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ComponentView>> {
    catalog
        .disassociate_child(id, child_id, &actor)
        .map(Json)
        .map_err(catalog_error)
}

// ============================================================
// Descriptions
// ============================================================

pub async fn add_description(
    State(catalog): State<Catalog>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<DescriptionInput>,
) -> ApiResult<(StatusCode, Json<ComponentView>)> {
    catalog
        .add_description(id, input, &actor)
        .map(|c| (StatusCode::CREATED, Json(c)))
        .map_err(catalog_error)
}

pub async fn edit_description(
    State(catalog): State<Catalog>,
    Actor(actor): Actor,
    Path((id, description_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<DescriptionPatch>,
) -> ApiResult<Json<ComponentView>> {
    catalog
        .edit_description(id, description_id, patch, &actor)
        .map(Json)
        .map_err(catalog_error)
}

pub async fn remove_description(
    State(catalog): State<Catalog>,
    Actor(actor): Actor,
    Path((id, description_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ComponentView>> {
    catalog
        .remove_description(id, description_id, &actor)
        .map(Json)
        .map_err(catalog_error)
}

pub async fn list_descriptions(State(catalog): State<Catalog>) -> ApiResult<Json<Vec<Description>>> {
    catalog
        .store()
        .find_all_descriptions()
        .map(Json)
        .map_err(catalog_error)
}

pub async fn get_description(
    State(catalog): State<Catalog>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Description>> {
    catalog
        .store()
        .find_description(id)
        .map(Json)
        .map_err(catalog_error)
}

// ============================================================
// History
// ============================================================

pub async fn list_histories(State(catalog): State<Catalog>) -> ApiResult<Json<Vec<HistoryEntry>>> {
    catalog
        .store()
        .find_all_history()
        .map(Json)
        .map_err(catalog_error)
}

pub async fn get_history(
    State(catalog): State<Catalog>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<HistoryEntry>> {
    catalog.store().find_history(id).map(Json).map_err(catalog_error)
}

pub async fn update_history(
    State(catalog): State<Catalog>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateHistoryInput>,
) -> ApiResult<Json<HistoryEntry>> {
    catalog
        .store()
        .update_history(id, input)
        .map(Json)
        .map_err(catalog_error)
}

pub async fn delete_history(
    State(catalog): State<Catalog>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    catalog
        .store()
        .delete_history(id)
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(catalog_error)
}

// ============================================================
// Integrity
// ============================================================

pub async fn integrity(State(catalog): State<Catalog>) -> ApiResult<Json<IntegrityReport>> {
    catalog.check_integrity().map(Json).map_err(catalog_error)
}
