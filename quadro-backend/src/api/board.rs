use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use quadro_core::board::{ColumnUpdate, NewColumn};
use quadro_core::filter::TaskFilter;
use quadro_core::{ColumnId, Snapshot};
use serde::Deserialize;

use super::{api_error, ignored, insert_header_safe, move_response, ApiResult, IdentityQuery};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TitleBody {
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveColumnBody {
    #[serde(alias = "destIndex")]
    destination_index: usize,
}

/// Board in display order, as sent to clients.
fn board_json(snapshot: &Snapshot, version: u64) -> serde_json::Value {
    serde_json::json!({
        "title": snapshot.title,
        "version": version,
        "columns": snapshot.ordered_columns(),
    })
}

pub async fn get_board(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let published = state.board.subscribe().current();
    let etag = format!("\"{}\"", published.version);

    if let Some(if_none_match) = headers.get("if-none-match") {
        if let Ok(value) = if_none_match.to_str() {
            if value == etag {
                let mut headers = HeaderMap::new();
                insert_header_safe(&mut headers, "etag", &etag);
                return (StatusCode::NOT_MODIFIED, headers).into_response();
            }
        }
    }

    let mut response_headers = HeaderMap::new();
    insert_header_safe(&mut response_headers, "etag", &etag);
    (
        StatusCode::OK,
        response_headers,
        Json(board_json(&published.snapshot, published.version)),
    )
        .into_response()
}

/// Board with a task filter applied. Columns stay; non-matching tasks are
/// left out.
pub async fn query_board(State(state): State<AppState>, Json(filter): Json<TaskFilter>) -> Json<serde_json::Value> {
    let version = state.board.version();
    let filtered = state.board.filtered(&filter);
    log::debug!(
        "[quadro.api.query] {} active criteria, {} tasks match",
        filter.active_count(),
        filtered.task_count()
    );
    Json(board_json(&filtered, version))
}

pub async fn update_title(
    State(state): State<AppState>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<TitleBody>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.title"));
    }
    state
        .board
        .update_title(&session, &body.title)
        .await
        .map_err(|e| api_error("quadro.api.title", e))?;
    Ok(Json(serde_json::json!({ "success": true })).into_response())
}

pub async fn add_column(
    State(state): State<AppState>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<NewColumn>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.add_column"));
    }
    let created = state
        .board
        .add_column(&session, body)
        .await
        .map_err(|e| api_error("quadro.api.add_column", e))?;
    match created {
        Some(id) => Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response()),
        None => Ok(ignored("quadro.api.add_column")),
    }
}

pub async fn update_column(
    State(state): State<AppState>,
    Path(column_id): Path<String>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<ColumnUpdate>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.update_column"));
    }
    state
        .board
        .update_column(&session, &ColumnId::from(column_id), body)
        .await
        .map_err(|e| api_error("quadro.api.update_column", e))?;
    Ok(Json(serde_json::json!({ "success": true })).into_response())
}

pub async fn delete_column(
    State(state): State<AppState>,
    Path(column_id): Path<String>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.delete_column"));
    }
    state
        .board
        .delete_column(&session, &ColumnId::from(column_id))
        .await
        .map_err(|e| api_error("quadro.api.delete_column", e))?;
    Ok(Json(serde_json::json!({ "success": true })).into_response())
}

pub async fn move_column(
    State(state): State<AppState>,
    Path(column_id): Path<String>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<MoveColumnBody>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.move_column"));
    }
    let outcome = state
        .board
        .move_column(&session, &ColumnId::from(column_id), body.destination_index)
        .await
        .map_err(|e| api_error("quadro.api.move_column", e))?;
    Ok(Json(move_response(outcome)).into_response())
}
