//! `/api/profiles` handlers.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::{ApiBytes, ApiJson, ApiPath, ApiQuery, SharedState};
use crate::{
    FetchRequest, NewProfile, Profile, ProfhubError, ProfhubResult, ProfileDraft, ProfileMetadata,
    ProfileSummary, ProfileType, ProfileUpdate, export_zip, fetch_remote, validate_fetch_request,
    validate_new_profile, validate_profile_update, validate_upload,
};

const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub(super) struct RecentParams {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UploadParams {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default, rename = "type")]
    profile_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

pub(super) async fn list(State(state): State<SharedState>) -> Json<Vec<ProfileSummary>> {
    Json(state.store.list_profiles())
}

pub(super) async fn recent(
    State(state): State<SharedState>,
    ApiQuery(params): ApiQuery<RecentParams>,
) -> Json<Vec<ProfileSummary>> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Json(state.store.recent_profiles(limit))
}

pub(super) async fn saved(State(state): State<SharedState>) -> Json<Vec<ProfileSummary>> {
    Json(state.store.saved_profiles())
}

pub(super) async fn get_one(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<u64>,
) -> ProfhubResult<Json<Profile>> {
    state
        .store
        .get_profile(id)
        .map(Json)
        .ok_or(ProfhubError::NotFound { kind: "profile", id })
}

pub(super) async fn create(
    State(state): State<SharedState>,
    ApiJson(input): ApiJson<NewProfile>,
) -> ProfhubResult<(StatusCode, Json<Profile>)> {
    let draft = validate_new_profile(input, state.config.max_upload_bytes)?;
    let profile = state.store.create_profile(draft);
    tracing::info!(id = profile.id, kind = %profile.profile_type, "profile created");
    Ok((StatusCode::CREATED, Json(profile)))
}

pub(super) async fn upload(
    State(state): State<SharedState>,
    ApiQuery(params): ApiQuery<UploadParams>,
    ApiBytes(body): ApiBytes,
) -> ProfhubResult<(StatusCode, Json<Profile>)> {
    let filename = params.filename.unwrap_or_default();
    let draft = validate_upload(
        &filename,
        params.profile_type.as_deref(),
        params.description,
        &body,
        state.config.max_upload_bytes,
    )?;
    let profile = state.store.create_profile(draft);
    tracing::info!(
        id = profile.id,
        kind = %profile.profile_type,
        size = profile.size,
        "profile uploaded"
    );
    Ok((StatusCode::CREATED, Json(profile)))
}

pub(super) async fn fetch(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<FetchRequest>,
) -> ProfhubResult<(StatusCode, Json<Profile>)> {
    validate_fetch_request(&request)?;
    let connection = match request.connection_id {
        Some(id) => Some(
            state
                .store
                .get_connection(id)
                .ok_or(ProfhubError::NotFound { kind: "connection", id })?,
        ),
        None => None,
    };
    let base = request
        .url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| connection.as_ref().map(|c| c.url.clone()))
        .ok_or_else(|| ProfhubError::invalid_field("url", "required when connectionId is absent"))?;

    let profile_type = request.profile_type;
    let seconds = request.seconds.unwrap_or(state.config.default_cpu_seconds);
    let timeout = state.config.fetch_timeout.as_duration();
    let max_bytes = state.config.max_upload_bytes;
    let captured = tokio::task::spawn_blocking(move || {
        fetch_remote(&base, profile_type, seconds, timeout, max_bytes)
    })
    .await
    .map_err(|e| ProfhubError::Fetch(format!("fetch task failed: {e}")))??;

    let mut draft = ProfileDraft::from_bytes(captured.original_filename, profile_type, &captured.bytes);
    draft.description = request.description;
    draft.metadata = fetched_metadata(profile_type, seconds, &captured.url);
    let profile = state.store.create_profile(draft);

    if let Some(conn) = connection {
        if state.store.touch_connection(conn.id).is_none() {
            tracing::debug!(connection = conn.id, "connection removed during fetch");
        }
    }
    tracing::info!(id = profile.id, url = %captured.url, size = profile.size, "remote profile stored");
    Ok((StatusCode::CREATED, Json(profile)))
}

fn fetched_metadata(profile_type: ProfileType, seconds: u64, url: &str) -> ProfileMetadata {
    let mut metadata = ProfileMetadata {
        duration: (profile_type == ProfileType::Cpu).then(|| format!("{seconds}s")),
        ..ProfileMetadata::default()
    };
    metadata
        .extra
        .insert("sourceUrl".to_string(), serde_json::Value::from(url));
    metadata
}

pub(super) async fn raw(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<u64>,
) -> ProfhubResult<Response> {
    let profile = state
        .store
        .get_profile(id)
        .ok_or(ProfhubError::NotFound { kind: "profile", id })?;
    let bytes = profile.decode_data()?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment_name(&profile.original_filename)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Quote-safe filename for `Content-Disposition`.
fn attachment_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() || c == '"' || c == '\\' { '_' } else { c })
        .collect()
}

pub(super) async fn update(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<u64>,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ProfhubResult<Json<Profile>> {
    validate_profile_update(&update)?;
    state
        .store
        .update_profile(id, update)
        .map(Json)
        .ok_or(ProfhubError::NotFound { kind: "profile", id })
}

pub(super) async fn delete(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<u64>,
) -> ProfhubResult<StatusCode> {
    if state.store.delete_profile(id) {
        tracing::info!(id, "profile deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ProfhubError::NotFound { kind: "profile", id })
    }
}

pub(super) async fn export(State(state): State<SharedState>) -> ProfhubResult<Response> {
    let profiles = state.store.all_profiles();
    let archive = tokio::task::spawn_blocking(move || export_zip(&profiles))
        .await
        .map_err(|e| ProfhubError::Zip(format!("export task failed: {e}")))??;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"profiles.zip\"",
            ),
        ],
        archive,
    )
        .into_response())
}
