//! `/api/connections` handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use super::{ApiJson, ApiPath, SharedState};
use crate::{
    Connection, ConnectionUpdate, NewConnection, ProfhubError, ProfhubResult,
    validate_connection_update, validate_new_connection,
};

pub(super) async fn list(State(state): State<SharedState>) -> Json<Vec<Connection>> {
    Json(state.store.list_connections())
}

pub(super) async fn get_one(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<u64>,
) -> ProfhubResult<Json<Connection>> {
    state
        .store
        .get_connection(id)
        .map(Json)
        .ok_or(ProfhubError::NotFound { kind: "connection", id })
}

pub(super) async fn create(
    State(state): State<SharedState>,
    ApiJson(input): ApiJson<NewConnection>,
) -> ProfhubResult<(StatusCode, Json<Connection>)> {
    let draft = validate_new_connection(input)?;
    let connection = state.store.create_connection(draft);
    tracing::info!(id = connection.id, url = %connection.url, "connection created");
    Ok((StatusCode::CREATED, Json(connection)))
}

pub(super) async fn update(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<u64>,
    ApiJson(update): ApiJson<ConnectionUpdate>,
) -> ProfhubResult<Json<Connection>> {
    validate_connection_update(&update)?;
    state
        .store
        .update_connection(id, update)
        .map(Json)
        .ok_or(ProfhubError::NotFound { kind: "connection", id })
}

pub(super) async fn delete(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<u64>,
) -> ProfhubResult<StatusCode> {
    if state.store.delete_connection(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ProfhubError::NotFound { kind: "connection", id })
    }
}
