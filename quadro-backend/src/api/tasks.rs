use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use quadro_core::board::NewTask;
use quadro_core::payload::TimeCategory;
use quadro_core::vote::IdentityResolver;
use quadro_core::{ColumnId, TaskId, TaskMove};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{api_error, ignored, move_response, ApiResult, IdentityQuery};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LabelBody {
    text: String,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Deserialize)]
pub struct TrackingBody {
    #[serde(default)]
    category: TimeCategory,
}

#[derive(Deserialize)]
pub struct TextBody {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyBody {
    depends_on: TaskId,
}

fn success() -> Response {
    Json(serde_json::json!({ "success": true })).into_response()
}

fn ids(column_id: String, task_id: String) -> (ColumnId, TaskId) {
    (ColumnId::from(column_id), TaskId::from(task_id))
}

// ── Task CRUD and moves ─────────────────────────────────────────────────

pub async fn add_task(
    State(state): State<AppState>,
    Path(column_id): Path<String>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<NewTask>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.add_task"));
    }
    let created = state
        .board
        .add_task(&session, &ColumnId::from(column_id), body)
        .await
        .map_err(|e| api_error("quadro.api.add_task", e))?;
    match created {
        Some(id) => Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response()),
        None => Ok(ignored("quadro.api.add_task")),
    }
}

pub async fn update_task(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<Map<String, Value>>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.update_task"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    state
        .board
        .update_task(&session, &column_id, &task_id, body)
        .await
        .map_err(|e| api_error("quadro.api.update_task", e))?;
    Ok(success())
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.delete_task"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    state
        .board
        .delete_task(&session, &column_id, &task_id)
        .await
        .map_err(|e| api_error("quadro.api.delete_task", e))?;
    Ok(success())
}

pub async fn move_task(
    State(state): State<AppState>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<TaskMove>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.move_task"));
    }
    let outcome = state
        .board
        .move_task(&session, &body)
        .await
        .map_err(|e| api_error("quadro.api.move_task", e))?;
    Ok(Json(move_response(outcome)).into_response())
}

// ── Votes ───────────────────────────────────────────────────────────────

/// Toggle the caller's vote. Visitors without a usable id get one minted
/// and returned as `visitorId` so they can send it next time.
pub async fn vote(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Json<Value>> {
    let session = identity.session();
    let (column_id, task_id) = ids(column_id, task_id);
    let outcome = state
        .board
        .vote(&session, &column_id, &task_id)
        .await
        .map_err(|e| api_error("quadro.api.vote", e))?;

    let votes = state
        .board
        .snapshot()
        .find_task(&task_id)
        .map(|(column, index)| column.tasks[index].votes)
        .unwrap_or(0);
    let mut response = serde_json::json!({ "outcome": outcome, "votes": votes });
    if identity.mints_visitor() {
        response["visitorId"] = Value::String(session.resolve_voter_id().as_str().to_string());
    }
    Ok(Json(response))
}

pub async fn has_voted(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(identity): Query<IdentityQuery>,
) -> Json<Value> {
    let session = identity.session();
    let voted = state.board.has_voted(&session, &TaskId::from(task_id));
    Json(serde_json::json!({ "voted": voted }))
}

// ── Labels ──────────────────────────────────────────────────────────────

pub async fn add_label(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<LabelBody>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.label"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    let label = state
        .board
        .add_label(&session, &column_id, &task_id, &body.text, body.color.as_deref())
        .await
        .map_err(|e| api_error("quadro.api.label", e))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "label": label }))).into_response())
}

pub async fn remove_label(
    State(state): State<AppState>,
    Path((column_id, task_id, label_id)): Path<(String, String, String)>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.label"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    state
        .board
        .remove_label(&session, &column_id, &task_id, &label_id)
        .await
        .map_err(|e| api_error("quadro.api.label", e))?;
    Ok(success())
}

// ── Time tracking ───────────────────────────────────────────────────────

pub async fn start_tracking(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
    Query(identity): Query<IdentityQuery>,
    body: Option<Json<TrackingBody>>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.tracking"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    let category = body.map(|Json(b)| b.category).unwrap_or_default();
    state
        .board
        .start_tracking(&session, &column_id, &task_id, category)
        .await
        .map_err(|e| api_error("quadro.api.tracking", e))?;
    Ok(success())
}

pub async fn stop_tracking(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.tracking"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    let duration = state
        .board
        .stop_tracking(&session, &column_id, &task_id)
        .await
        .map_err(|e| api_error("quadro.api.tracking", e))?;
    let total = state
        .board
        .tracking_summary(&column_id, &task_id)
        .map(|summary| summary.total)
        .ok();
    Ok(Json(serde_json::json!({ "duration": duration, "total": total })).into_response())
}

pub async fn tracking_summary(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let (column_id, task_id) = ids(column_id, task_id);
    let summary = state
        .board
        .tracking_summary(&column_id, &task_id)
        .map_err(|e| api_error("quadro.api.tracking", e))?;
    Ok(Json(summary).into_response())
}

pub async fn delete_time_entry(
    State(state): State<AppState>,
    Path((column_id, task_id, index)): Path<(String, String, usize)>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.tracking"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    state
        .board
        .delete_time_entry(&session, &column_id, &task_id, index)
        .await
        .map_err(|e| api_error("quadro.api.tracking", e))?;
    Ok(success())
}

// ── Comments ────────────────────────────────────────────────────────────

pub async fn add_comment(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<TextBody>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.comment"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    let comment = state
        .board
        .add_comment(&session, &column_id, &task_id, &body.text)
        .await
        .map_err(|e| api_error("quadro.api.comment", e))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "comment": comment }))).into_response())
}

pub async fn remove_comment(
    State(state): State<AppState>,
    Path((column_id, task_id, comment_id)): Path<(String, String, String)>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.comment"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    state
        .board
        .remove_comment(&session, &column_id, &task_id, &comment_id)
        .await
        .map_err(|e| api_error("quadro.api.comment", e))?;
    Ok(success())
}

// ── Subtasks ────────────────────────────────────────────────────────────

pub async fn add_subtask(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<TextBody>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.subtask"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    let subtask = state
        .board
        .add_subtask(&session, &column_id, &task_id, &body.text)
        .await
        .map_err(|e| api_error("quadro.api.subtask", e))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "subtask": subtask }))).into_response())
}

pub async fn toggle_subtask(
    State(state): State<AppState>,
    Path((column_id, task_id, subtask_id)): Path<(String, String, String)>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.subtask"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    let completed = state
        .board
        .toggle_subtask(&session, &column_id, &task_id, &subtask_id)
        .await
        .map_err(|e| api_error("quadro.api.subtask", e))?;
    Ok(Json(serde_json::json!({ "completed": completed })).into_response())
}

pub async fn remove_subtask(
    State(state): State<AppState>,
    Path((column_id, task_id, subtask_id)): Path<(String, String, String)>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.subtask"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    state
        .board
        .remove_subtask(&session, &column_id, &task_id, &subtask_id)
        .await
        .map_err(|e| api_error("quadro.api.subtask", e))?;
    Ok(success())
}

// ── Dependencies ────────────────────────────────────────────────────────

pub async fn add_dependency(
    State(state): State<AppState>,
    Path((column_id, task_id)): Path<(String, String)>,
    Query(identity): Query<IdentityQuery>,
    Json(body): Json<DependencyBody>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.dependency"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    state
        .board
        .add_dependency(&session, &column_id, &task_id, &body.depends_on)
        .await
        .map_err(|e| api_error("quadro.api.dependency", e))?;
    Ok(success())
}

pub async fn remove_dependency(
    State(state): State<AppState>,
    Path((column_id, task_id, depends_on)): Path<(String, String, String)>,
    Query(identity): Query<IdentityQuery>,
) -> ApiResult<Response> {
    let session = identity.session();
    if !session.is_authenticated() {
        return Ok(ignored("quadro.api.dependency"));
    }
    let (column_id, task_id) = ids(column_id, task_id);
    state
        .board
        .remove_dependency(&session, &column_id, &task_id, &TaskId::from(depends_on))
        .await
        .map_err(|e| api_error("quadro.api.dependency", e))?;
    Ok(success())
}
