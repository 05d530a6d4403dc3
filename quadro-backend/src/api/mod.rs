use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post, put},
    Router,
};
use quadro_core::config::UserIdentity;
use quadro_core::reorder::MoveError;
use quadro_core::timing::TrackingError;
use quadro_core::vote::{Session, VISITOR_PREFIX};
use quadro_core::{BoardError, MoveOutcome, StorageError};
use serde::{Deserialize, Serialize};

mod board;
mod events;
mod tasks;

use crate::state::AppState;

/// Axum REST API routes.
///
/// Identity comes from the query string: `?user=<id>` for a signed-in user,
/// `?visitor=<visitor_...>` for an anonymous visitor. Mutations from
/// visitors answer `204 No Content` and change nothing; voting is the one
/// exception.
///
///   GET    /board                                      -> ordered board (+ ETag)
///   POST   /board/query                                -> board with a task filter applied
///   PUT    /board/title                                -> rename board
///   POST   /columns                                    -> add column
///   PATCH  /columns/{column_id}                        -> update title / display fields
///   DELETE /columns/{column_id}                        -> delete column (orders compacted)
///   POST   /columns/{column_id}/move                   -> move column to destinationIndex
///   POST   /columns/{column_id}/tasks                  -> add task
///   PATCH  /columns/{column_id}/tasks/{task_id}        -> merge task fields
///   DELETE /columns/{column_id}/tasks/{task_id}        -> delete task
///   POST   /tasks/move                                 -> drag-and-drop task move
///   POST   /columns/{column_id}/tasks/{task_id}/vote   -> toggle vote
///   GET    /tasks/{task_id}/voted                      -> has the caller voted
///   POST   /columns/{c}/tasks/{t}/labels               -> add label
///   DELETE /columns/{c}/tasks/{t}/labels/{label_id}    -> remove label
///   GET    /columns/{c}/tasks/{t}/tracking             -> entries and totals
///   POST   /columns/{c}/tasks/{t}/tracking/start       -> start time tracking
///   POST   /columns/{c}/tasks/{t}/tracking/stop        -> stop time tracking
///   DELETE /columns/{c}/tasks/{t}/tracking/{index}     -> delete finished entry
///   POST   /columns/{c}/tasks/{t}/comments             -> add comment
///   DELETE /columns/{c}/tasks/{t}/comments/{id}        -> remove comment
///   POST   /columns/{c}/tasks/{t}/subtasks             -> add subtask
///   POST   /columns/{c}/tasks/{t}/subtasks/{id}/toggle -> toggle subtask
///   DELETE /columns/{c}/tasks/{t}/subtasks/{id}        -> remove subtask
///   POST   /columns/{c}/tasks/{t}/dependencies         -> add dependency
///   DELETE /columns/{c}/tasks/{t}/dependencies/{id}    -> remove dependency
///   GET    /events                                     -> SSE stream of board changes
///   GET    /status                                     -> health check
pub fn api_router() -> Router<AppState> {
    const TASK: &str = "/columns/{column_id}/tasks/{task_id}";

    Router::new()
        .route("/board", get(board::get_board))
        .route("/board/query", post(board::query_board))
        .route("/board/title", put(board::update_title))
        .route("/columns", post(board::add_column))
        .route(
            "/columns/{column_id}",
            patch(board::update_column).delete(board::delete_column),
        )
        .route("/columns/{column_id}/move", post(board::move_column))
        .route("/columns/{column_id}/tasks", post(tasks::add_task))
        .route(TASK, patch(tasks::update_task).delete(tasks::delete_task))
        .route("/tasks/move", post(tasks::move_task))
        .route(&format!("{TASK}/vote"), post(tasks::vote))
        .route("/tasks/{task_id}/voted", get(tasks::has_voted))
        .route(&format!("{TASK}/labels"), post(tasks::add_label))
        .route(
            &format!("{TASK}/labels/{{label_id}}"),
            axum::routing::delete(tasks::remove_label),
        )
        .route(&format!("{TASK}/tracking"), get(tasks::tracking_summary))
        .route(&format!("{TASK}/tracking/start"), post(tasks::start_tracking))
        .route(&format!("{TASK}/tracking/stop"), post(tasks::stop_tracking))
        .route(
            &format!("{TASK}/tracking/{{index}}"),
            axum::routing::delete(tasks::delete_time_entry),
        )
        .route(&format!("{TASK}/comments"), post(tasks::add_comment))
        .route(
            &format!("{TASK}/comments/{{comment_id}}"),
            axum::routing::delete(tasks::remove_comment),
        )
        .route(&format!("{TASK}/subtasks"), post(tasks::add_subtask))
        .route(
            &format!("{TASK}/subtasks/{{subtask_id}}/toggle"),
            post(tasks::toggle_subtask),
        )
        .route(
            &format!("{TASK}/subtasks/{{subtask_id}}"),
            axum::routing::delete(tasks::remove_subtask),
        )
        .route(&format!("{TASK}/dependencies"), post(tasks::add_dependency))
        .route(
            &format!("{TASK}/dependencies/{{depends_on}}"),
            axum::routing::delete(tasks::remove_dependency),
        )
        .route("/events", get(events::sse_events))
        .route("/status", get(events::status))
}

// ── Shared types and helpers used across sub-modules ────────────────────

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Who is calling, as given in the query string.
#[derive(Debug, Default, Deserialize)]
pub struct IdentityQuery {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    visitor: Option<String>,
}

impl IdentityQuery {
    /// A visitor id that does not look like one is ignored and a new id is
    /// minted, so nobody votes anonymously under a user id.
    fn session(&self) -> Session {
        if let Some(user) = self.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Session::authenticated(UserIdentity::new(user, user));
        }
        match self.visitor.as_deref().map(str::trim) {
            Some(visitor) if visitor.starts_with(VISITOR_PREFIX) => Session::visitor(visitor),
            _ => Session::anonymous(),
        }
    }

    /// True when `session()` has to mint a visitor id for this caller.
    fn mints_visitor(&self) -> bool {
        let has_user = self.user.as_deref().is_some_and(|u| !u.trim().is_empty());
        let has_visitor = self
            .visitor
            .as_deref()
            .is_some_and(|v| v.trim().starts_with(VISITOR_PREFIX));
        !has_user && !has_visitor
    }
}

/// Response for a mutation a visitor is not allowed to make.
fn ignored(target: &'static str) -> Response {
    log::debug!(target: target, "Ignoring mutation from anonymous caller");
    StatusCode::NO_CONTENT.into_response()
}

fn status_for(error: &BoardError) -> StatusCode {
    match error {
        BoardError::ColumnNotFound(_)
        | BoardError::TaskNotFound { .. }
        | BoardError::UnknownTask(_)
        | BoardError::LabelNotFound(_)
        | BoardError::SubtaskNotFound(_)
        | BoardError::CommentNotFound(_)
        | BoardError::Storage(StorageError::ColumnMissing(_))
        | BoardError::Tracking(TrackingError::EntryNotFound(_))
        | BoardError::Move(MoveError::ColumnNotFound(_))
        | BoardError::Move(MoveError::ContainerNotFound(_)) => StatusCode::NOT_FOUND,

        BoardError::Move(MoveError::TaskNotFound { .. })
        | BoardError::ColumnExists(_)
        | BoardError::Tracking(_) => StatusCode::CONFLICT,

        BoardError::Move(MoveError::InvalidIndex { .. })
        | BoardError::SelfDependency(_)
        | BoardError::InvalidInput(_)
        | BoardError::InvalidPayload(_) => StatusCode::UNPROCESSABLE_ENTITY,

        BoardError::Move(MoveError::WriteFailed(_)) | BoardError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn api_error(target: &'static str, error: BoardError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&error);
    log_api_issue(status, target, format!("{}", error));
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn move_response(outcome: MoveOutcome) -> serde_json::Value {
    match outcome {
        MoveOutcome::Noop => serde_json::json!({ "moved": false }),
        MoveOutcome::Committed { record, writes } => serde_json::json!({
            "moved": true,
            "record": record,
            "writes": writes,
        }),
    }
}

fn insert_header_safe(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match value.parse() {
        Ok(parsed) => {
            headers.insert(name, parsed);
        }
        Err(e) => {
            log::warn!("Failed to set header {}={} ({})", name, value, e);
        }
    }
}

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadro_core::storage::local::LocalStorage;
    use quadro_core::types::Column;
    use quadro_core::{BoardService, ColumnStore, Snapshot, Task};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Fixture {
        _dir: TempDir,
        state: AppState,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.json");
        let board = Snapshot::new(vec![
            Column::new("todo", "To Do", 0).with_tasks(vec![Task::new("t1", "first"), Task::new("t2", "second")]),
            Column::new("done", "Done", 1),
        ]);
        std::fs::write(&path, serde_json::to_string_pretty(&board).unwrap()).unwrap();

        let storage = Arc::new(LocalStorage::open(&path).unwrap());
        let service = BoardService::new(storage, Default::default());
        Fixture {
            _dir: dir,
            state: AppState::new(service, 0, "127.0.0.1".to_string()),
        }
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = api_router().with_state(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[test]
    fn test_identity_query() {
        let query = IdentityQuery {
            user: Some("u1".into()),
            visitor: None,
        };
        assert!(query.session().is_authenticated());

        let query = IdentityQuery {
            user: None,
            visitor: Some("u1".into()),
        };
        let session = query.session();
        assert!(!session.is_authenticated());
        use quadro_core::vote::IdentityResolver;
        assert_ne!(session.resolve_voter_id().as_str(), "u1");
    }

    #[tokio::test]
    async fn test_get_board_with_etag() {
        let fx = fixture();
        let request = Request::builder().uri("/board").body(Body::empty()).unwrap();
        let response = api_router().with_state(fx.state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let etag = response.headers().get("etag").unwrap().to_str().unwrap().to_string();

        let request = Request::builder()
            .uri("/board")
            .header("if-none-match", etag)
            .body(Body::empty())
            .unwrap();
        let response = api_router().with_state(fx.state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_anonymous_mutation_is_no_content() {
        let fx = fixture();
        let (status, _) = call(&fx.state, "POST", "/columns", Some(serde_json::json!({"title": "Review"}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(fx.state.board.snapshot().columns.len(), 2);
    }

    #[tokio::test]
    async fn test_column_lifecycle() {
        let fx = fixture();
        let (status, body) = call(
            &fx.state,
            "POST",
            "/columns?user=u1",
            Some(serde_json::json!({"title": "In Review", "emoji": "👀"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], "in-review");

        let (status, body) = call(
            &fx.state,
            "POST",
            "/columns/in-review/move?user=u1",
            Some(serde_json::json!({"destinationIndex": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["moved"], true);

        let (_, board) = call(&fx.state, "GET", "/board", None).await;
        assert_eq!(board["columns"][0]["id"], "in-review");
        assert_eq!(board["columns"][0]["order"], 0);

        let (status, _) = call(&fx.state, "DELETE", "/columns/in-review?user=u1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, board) = call(&fx.state, "GET", "/board", None).await;
        assert_eq!(board["columns"][0]["id"], "todo");
        assert_eq!(board["columns"][0]["order"], 0);
    }

    #[tokio::test]
    async fn test_task_move_errors_map_to_status() {
        let fx = fixture();
        let stale = serde_json::json!({
            "sourceColumnId": "todo",
            "destinationColumnId": "done",
            "taskId": "t2",
            "sourceIndex": 0,
            "destinationIndex": 0
        });
        let (status, _) = call(&fx.state, "POST", "/tasks/move?user=u1", Some(stale)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let missing = serde_json::json!({
            "sourceColumnId": "todo",
            "destinationColumnId": "archive",
            "taskId": "t1",
            "sourceIndex": 0,
            "destinationIndex": 0
        });
        let (status, _) = call(&fx.state, "POST", "/tasks/move?user=u1", Some(missing)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &fx.state,
            "POST",
            "/columns/todo/move?user=u1",
            Some(serde_json::json!({"destinationIndex": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_task_move_persists() {
        let fx = fixture();
        let request = serde_json::json!({
            "sourceColumnId": "todo",
            "destinationColumnId": "done",
            "taskId": "t1",
            "sourceIndex": 0,
            "destinationIndex": 0
        });
        let (status, body) = call(&fx.state, "POST", "/tasks/move?user=u1", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["entityId"], "t1");

        let on_disk = std::fs::read_to_string(fx.state.board.store().file_path()).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(snapshot.columns[1].tasks[0].id.as_str(), "t1");
        assert_eq!(snapshot.task_count(), 2);
        assert_eq!(fx.state.board.store().subscribe().snapshot().columns[1].tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_visitor_vote_mints_identity() {
        let fx = fixture();
        let (status, body) = call(&fx.state, "POST", "/columns/todo/tasks/t1/vote", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "added");
        let visitor = body["visitorId"].as_str().unwrap().to_string();
        assert!(visitor.starts_with("visitor_"));

        let uri = format!("/columns/todo/tasks/t1/vote?visitor={}", visitor);
        let (_, body) = call(&fx.state, "POST", &uri, None).await;
        assert_eq!(body["outcome"], "unchanged");
        assert_eq!(body["votes"], 1);

        let (_, body) = call(&fx.state, "GET", &format!("/tasks/t1/voted?visitor={}", visitor), None).await;
        assert_eq!(body["voted"], true);
    }

    #[tokio::test]
    async fn test_tracking_summary_reports_totals() {
        let fx = fixture();
        let uri = "/columns/todo/tasks/t1/tracking";
        let (status, body) = call(&fx.state, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert_eq!(body["totalFormatted"], "0min");

        let start = Some(serde_json::json!({"category": "testing"}));
        let (status, _) = call(&fx.state, "POST", &format!("{uri}/start?user=u1"), start).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&fx.state, "GET", uri, None).await;
        assert_eq!(body["tracking"], true);
        assert_eq!(body["byCategory"][0]["category"], "testing");
        assert_eq!(body["byCategory"][0]["label"], "Testing");

        let (status, body) = call(&fx.state, "POST", &format!("{uri}/stop?user=u1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["total"].as_i64().unwrap() >= body["duration"].as_i64().unwrap());

        let (status, _) = call(&fx.state, "GET", "/columns/done/tasks/t1/tracking", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status() {
        let fx = fixture();
        let (status, body) = call(&fx.state, "GET", "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["tasks"], 2);
    }
}
