use crate::{
    dto::interview_dto::{HrRespondPayload, ProposeInterviewPayload, TutorRespondPayload},
    error::Result,
    middleware::auth::Claims,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

#[axum::debug_handler]
pub async fn propose_interview(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(application_id): Path<Uuid>,
    Json(payload): Json<ProposeInterviewPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let request = state
        .interview_service
        .propose(application_id, &actor, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[axum::debug_handler]
pub async fn available_tutors(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(application_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let tutors = state
        .interview_service
        .available_tutors(application_id, &actor)
        .await?;
    Ok(Json(tutors))
}

#[axum::debug_handler]
pub async fn get_interview_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let request = state.interview_service.get(request_id, &actor).await?;
    Ok(Json(request))
}

#[axum::debug_handler]
pub async fn tutor_respond(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<TutorRespondPayload>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let request = state
        .interview_service
        .tutor_respond(request_id, &actor, &payload)
        .await?;
    Ok(Json(request))
}

#[axum::debug_handler]
pub async fn hr_respond(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<HrRespondPayload>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let request = state
        .interview_service
        .hr_respond(request_id, &actor, &payload)
        .await?;
    Ok(Json(request))
}

#[axum::debug_handler]
pub async fn cancel_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let request = state.interview_service.cancel(request_id, &actor).await?;
    Ok(Json(request))
}

#[axum::debug_handler]
pub async fn mark_completed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let request = state
        .interview_service
        .mark_completed(request_id, &actor)
        .await?;
    Ok(Json(request))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let request = state
        .interview_service
        .mark_no_show(request_id, &actor)
        .await?;
    Ok(Json(request))
}
