// handler/gig.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::gigdtos::*,
    error::{ErrorMessage, HttpError},
    AppState,
};

pub fn gig_handler() -> Router {
    Router::new()
        .route("/", post(create_gig))
        .route("/:gig_id", get(get_gig))
        .route("/:gig_id/assign", put(assign_seeker))
        // Completion protocol
        .route("/:gig_id/initiate-completion", post(initiate_completion))
        .route("/:gig_id/confirm-completion", post(confirm_completion))
        .route("/:gig_id/completion-status", get(get_completion_status))
        // Reviews
        .route("/:gig_id/reviews", post(create_review).get(get_reviews))
}

fn parse_gig_id(raw: &str) -> Result<Uuid, HttpError> {
    Uuid::parse_str(raw).map_err(|_| HttpError::bad_request(ErrorMessage::InvalidGigId.to_string()))
}

pub async fn create_gig(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CreateGigDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let gig = app_state
        .gig_service
        .create_gig(body.poster_id, body.title, body.description, body.budget)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Gig created successfully",
            GigResponseDto::from(gig),
        )),
    ))
}

pub async fn get_gig(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(gig_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let gig_id = parse_gig_id(&gig_id)?;
    let gig = app_state.gig_service.get_gig(gig_id).await?;

    Ok(Json(ApiResponse::success(
        "Gig retrieved successfully",
        GigResponseDto::from(gig),
    )))
}

pub async fn assign_seeker(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(gig_id): Path<String>,
    Json(body): Json<AssignSeekerDto>,
) -> Result<impl IntoResponse, HttpError> {
    let gig_id = parse_gig_id(&gig_id)?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let gig = app_state
        .gig_service
        .assign_seeker(gig_id, body.poster_id, body.seeker_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Seeker assigned successfully",
        GigResponseDto::from(gig),
    )))
}

pub async fn initiate_completion(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(gig_id): Path<String>,
    Json(body): Json<CompletionActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let gig_id = parse_gig_id(&gig_id)?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .completion_service
        .initiate_completion(gig_id, body.actor_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Completion initiated, waiting for the other party to confirm",
        InitiateCompletionResponseDto {
            status: outcome.status,
        },
    )))
}

pub async fn confirm_completion(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(gig_id): Path<String>,
    Json(body): Json<CompletionActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let gig_id = parse_gig_id(&gig_id)?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .completion_service
        .confirm_completion(gig_id, body.actor_id)
        .await?;

    let message = if outcome.mutually_confirmed {
        "Gig completed by mutual confirmation"
    } else {
        "Confirmation recorded, waiting for the other party"
    };

    Ok(Json(ApiResponse::success(
        message,
        ConfirmCompletionResponseDto {
            status: outcome.status,
            mutually_confirmed: outcome.mutually_confirmed,
            escrow_released: outcome.escrow_released,
        },
    )))
}

pub async fn get_completion_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(gig_id): Path<String>,
    Query(query): Query<CompletionStatusQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let gig_id = parse_gig_id(&gig_id)?;

    let status = app_state
        .completion_service
        .get_completion_status(gig_id, query.viewer_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Completion status retrieved successfully",
        status,
    )))
}

pub async fn create_review(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(gig_id): Path<String>,
    Json(body): Json<CreateReviewDto>,
) -> Result<impl IntoResponse, HttpError> {
    let gig_id = parse_gig_id(&gig_id)?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let review = app_state
        .gig_service
        .submit_review(gig_id, body.reviewer_id, body.rating, body.comment)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Review submitted successfully", review)),
    ))
}

pub async fn get_reviews(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(gig_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let gig_id = parse_gig_id(&gig_id)?;
    let reviews = app_state.gig_service.list_reviews(gig_id).await?;

    Ok(Json(ApiResponse::success(
        "Reviews retrieved successfully",
        reviews,
    )))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::Config,
        db::{cache::StatusCache, memorydb::InMemoryGigStore},
        routes::create_router,
        service::{escrow_service::InMemoryEscrow, notification_service::CompletionEvent},
    };

    fn state() -> Arc<AppState> {
        let config = Config::from_lookup(|_| None).unwrap();
        Arc::new(AppState::new(
            config,
            Arc::new(InMemoryGigStore::new()),
            Arc::new(InMemoryEscrow::new()),
            StatusCache::local(),
        ))
    }

    fn app() -> Router {
        create_router(state())
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn assigned_gig(app: &Router) -> (String, String, String) {
        let poster = Uuid::new_v4().to_string();
        let seeker = Uuid::new_v4().to_string();

        let (status, created) = call(
            app,
            Method::POST,
            "/api/gigs",
            Some(json!({
                "poster_id": poster,
                "title": "Deliver groceries",
                "description": "Weekly shop from the market",
                "budget": 4500
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let gig_id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, assigned) = call(
            app,
            Method::PUT,
            &format!("/api/gigs/{}/assign", gig_id),
            Some(json!({ "poster_id": poster, "seeker_id": seeker })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(assigned["data"]["status"], "assigned");

        (gig_id, poster, seeker)
    }

    #[tokio::test]
    async fn full_completion_flow_over_http() {
        let app = app();
        let (gig_id, poster, seeker) = assigned_gig(&app).await;

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/gigs/{}/initiate-completion", gig_id),
            Some(json!({ "actor_id": seeker })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "pending_completion");

        let (status, body) = call(
            &app,
            Method::GET,
            &format!("/api/gigs/{}/completion-status?viewer_id={}", gig_id, poster),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["can_confirm_completion"], true);
        assert_eq!(body["data"]["confirmation"]["confirmed_by_seeker"], true);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/gigs/{}/confirm-completion", gig_id),
            Some(json!({ "actor_id": poster })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["mutually_confirmed"], true);
        assert_eq!(body["data"]["escrow_released"], true);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/gigs/{}/reviews", gig_id),
            Some(json!({ "reviewer_id": seeker, "rating": 5, "comment": "Smooth job" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["reviewee_id"], poster.as_str());
    }

    #[tokio::test]
    async fn protocol_rejections_map_to_statuses() {
        let app = app();
        let (gig_id, poster, _) = assigned_gig(&app).await;
        let initiate = format!("/api/gigs/{}/initiate-completion", gig_id);
        let confirm = format!("/api/gigs/{}/confirm-completion", gig_id);

        let (status, body) = call(
            &app,
            Method::POST,
            &initiate,
            Some(json!({ "actor_id": Uuid::new_v4() })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["status"], "fail");

        let (status, _) = call(&app, Method::POST, &confirm, Some(json!({ "actor_id": poster }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        call(&app, Method::POST, &initiate, Some(json!({ "actor_id": poster }))).await;
        let (status, _) = call(&app, Method::POST, &initiate, Some(json!({ "actor_id": poster }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::POST, &confirm, Some(json!({ "actor_id": poster }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_and_malformed_gig_ids() {
        let app = app();

        let (status, _) = call(
            &app,
            Method::GET,
            &format!("/api/gigs/{}/completion-status", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, Method::GET, "/api/gigs/not-a-uuid/completion-status", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], ErrorMessage::InvalidGigId.to_string());
    }

    #[tokio::test]
    async fn completion_over_http_reaches_subscribers() {
        let state = state();
        let mut events = state.notification_service.subscribe();
        let app = create_router(state.clone());
        let (gig_id, poster, seeker) = assigned_gig(&app).await;

        for (path, actor) in [("initiate-completion", &poster), ("confirm-completion", &seeker)] {
            let (status, _) = call(
                &app,
                Method::POST,
                &format!("/api/gigs/{}/{}", gig_id, path),
                Some(json!({ "actor_id": actor })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let mut mutual = 0;
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.gig_id().to_string(), gig_id);
            if matches!(event, CompletionEvent::MutuallyConfirmed { .. }) {
                mutual += 1;
            }
        }
        assert_eq!(mutual, 1);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
