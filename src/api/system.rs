//! Health, stats and external command handlers.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::{ApiJson, SharedState};
use crate::{ExecOutput, ExecRequest, ProfhubResult, StoreStats, run_command};

#[derive(Debug, Serialize)]
pub(super) struct Health {
    status: &'static str,
    version: &'static str,
}

pub(super) async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(super) async fn stats(State(state): State<SharedState>) -> Json<StoreStats> {
    Json(state.store.stats())
}

pub(super) async fn exec(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<ExecRequest>,
) -> ProfhubResult<Json<ExecOutput>> {
    run_command(&state.config, &request).await.map(Json)
}
