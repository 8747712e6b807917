//! Read-only admin surface over the record store.

use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::info;

use aether_core::record::{RecordQuery, TurnRecord};
use aether_dataset::{DashboardStats, export_file_name, search_turns, to_json};

use crate::{ErrorResponse, SharedState};

const DEFAULT_TURN_LIMIT: usize = 50;
const MAX_TURN_LIMIT: usize = 500;

type AdminResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

fn internal(err: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    ErrorResponse::status(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// `GET /api/admin/stats`
pub(crate) async fn stats_handler(State(state): State<SharedState>) -> AdminResult<Json<DashboardStats>> {
    let stats = aether_dataset::dashboard_stats(state.store.as_ref())
        .await
        .map_err(internal)?;
    Ok(Json(stats))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExportParams {
    session: Option<String>,
}

/// `GET /api/admin/export[?session=ID]`: the dataset as a JSON download.
pub(crate) async fn export_handler(
    State(state): State<SharedState>,
    Query(params): Query<ExportParams>,
) -> AdminResult<Response> {
    let query = match params.session {
        Some(session) => RecordQuery::session(session),
        None => RecordQuery::all(),
    };
    let examples = aether_dataset::build_dataset(state.store.as_ref(), &query)
        .await
        .map_err(internal)?;
    let json = to_json(&examples).map_err(internal)?;

    let file_name = export_file_name(chrono::Utc::now().date_naive());
    info!(examples = examples.len(), file = %file_name, "Dataset export served");
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        json,
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TurnSearchParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

/// `GET /api/admin/turns?q=&limit=`
pub(crate) async fn turns_handler(
    State(state): State<SharedState>,
    Query(params): Query<TurnSearchParams>,
) -> AdminResult<Json<Vec<TurnRecord>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TURN_LIMIT)
        .min(MAX_TURN_LIMIT);
    let turns = state
        .store
        .turns(&RecordQuery::all())
        .await
        .map_err(internal)?;
    Ok(Json(search_turns(&turns, &params.q, limit)))
}
