use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use shared::{ActivityDto, ChildDto, CreateChildRequest, SessionRequest};
use tracing::info;

use crate::domain::activity_service::ActivityService;
use crate::domain::child_service::{ChildService, CreateChildCommand};
use crate::domain::models::activity::Activity;
use crate::domain::models::child::Child;
use crate::domain::session_service::SessionService;
use crate::error::CoordinatorError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub children: ChildService,
    pub activities: ActivityService,
    pub sessions: SessionService,
}

/// Build the /api router
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/children", get(list_children).post(create_child))
        .route("/children/:child_id", get(get_child).delete(delete_child))
        .route("/activities", get(list_activities))
        .route("/activities/:activity_id/start", post(start_activity))
        .route("/activities/:activity_id/stop", post(stop_activity))
        .route(
            "/activities/:activity_id/children/:child_id/report",
            get(session_report),
        )
        .with_state(state)
}

fn status_for(error: &CoordinatorError) -> StatusCode {
    match error {
        CoordinatorError::Invalid(_) => StatusCode::BAD_REQUEST,
        CoordinatorError::ChildNotFound(_)
        | CoordinatorError::ActivityNotFound(_)
        | CoordinatorError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
        CoordinatorError::IllegalTransition { .. } => StatusCode::CONFLICT,
        CoordinatorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: CoordinatorError) -> axum::response::Response {
    if matches!(error, CoordinatorError::Internal(_)) {
        tracing::error!("Request failed: {:?}", error);
    }
    (status_for(&error), error.to_string()).into_response()
}

fn child_dto(child: &Child) -> ChildDto {
    ChildDto {
        id: child.id.clone(),
        name: child.name.clone(),
        date_of_birth: child.date_of_birth.to_string(),
        gender: child.gender.to_string(),
        learning_difficulty: child.learning_difficulty.clone(),
        age: child.age(),
    }
}

fn activity_dto(activity: &Activity) -> ActivityDto {
    ActivityDto {
        id: activity.id,
        name: activity.name.clone(),
        instruction: activity.instruction.clone(),
    }
}

/// POST /api/children
async fn create_child(
    State(state): State<AppState>,
    Json(request): Json<CreateChildRequest>,
) -> impl IntoResponse {
    info!("POST /api/children - name: {}", request.name);

    let command = CreateChildCommand {
        name: request.name,
        date_of_birth: request.date_of_birth,
        gender: request.gender,
        learning_difficulty: request.learning_difficulty,
    };

    match state.children.create_child(command).await {
        Ok(child) => (StatusCode::CREATED, Json(child_dto(&child))).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/children
async fn list_children(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/children");

    match state.children.list_children().await {
        Ok(children) => {
            let dtos: Vec<ChildDto> = children.iter().map(child_dto).collect();
            (StatusCode::OK, Json(dtos)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /api/children/:child_id
async fn get_child(
    State(state): State<AppState>,
    Path(child_id): Path<String>,
) -> impl IntoResponse {
    info!("GET /api/children/{}", child_id);

    match state.children.get_child(&child_id).await {
        Ok(child) => (StatusCode::OK, Json(child_dto(&child))).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/children/:child_id
async fn delete_child(
    State(state): State<AppState>,
    Path(child_id): Path<String>,
) -> impl IntoResponse {
    info!("DELETE /api/children/{}", child_id);

    match state.children.delete_child(&child_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/activities
async fn list_activities(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/activities");

    match state.activities.list_activities().await {
        Ok(activities) => {
            let dtos: Vec<ActivityDto> = activities.iter().map(activity_dto).collect();
            (StatusCode::OK, Json(dtos)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/activities/:activity_id/start
async fn start_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<i64>,
    Json(request): Json<SessionRequest>,
) -> impl IntoResponse {
    info!("POST /api/activities/{}/start - child: {}", activity_id, request.child_id);

    match state.sessions.start_session(&request.child_id, activity_id).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/activities/:activity_id/stop
async fn stop_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<i64>,
    Json(request): Json<SessionRequest>,
) -> impl IntoResponse {
    info!("POST /api/activities/{}/stop - child: {}", activity_id, request.child_id);

    match state.sessions.stop_session(&request.child_id, activity_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/activities/:activity_id/children/:child_id/report
async fn session_report(
    State(state): State<AppState>,
    Path((activity_id, child_id)): Path<(i64, String)>,
) -> impl IntoResponse {
    info!("GET /api/activities/{}/children/{}/report", activity_id, child_id);

    match state.sessions.session_report(&child_id, activity_id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}
