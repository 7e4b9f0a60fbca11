use crate::{
    dto::application_dto::{
        ApplicationCreatedResponse, ApplicationFilters, CreateApplicationPayload,
        SetApplicationStatusPayload,
    },
    error::{Error, Result},
    middleware::auth::Claims,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

#[axum::debug_handler]
pub async fn create_application(
    State(state): State<AppState>,
    Json(payload): Json<CreateApplicationPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let application = state.application_service.create(&payload).await?;
    let submission_count = state
        .application_service
        .submission_count(&application.candidate_email)
        .await?;
    let response = ApplicationCreatedResponse {
        id: application.id,
        status: application.status,
        company_id: application.company_id,
        submission_count,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

#[axum::debug_handler]
pub async fn get_application(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let scope = state.identity_service.company_scope(&actor)?;
    let application = state.application_service.get(id).await?;
    if !scope.covers(application.company_id) {
        return Err(Error::Unauthorized(
            "Application is outside your company scope".to_string(),
        ));
    }
    Ok(Json(application))
}

#[axum::debug_handler]
pub async fn list_applications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filters): Query<ApplicationFilters>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let scope = state.identity_service.company_scope(&actor)?;
    let applications = state.application_service.list_for_hr(scope, &filters).await?;
    Ok(Json(applications))
}

#[axum::debug_handler]
pub async fn decide_application(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetApplicationStatusPayload>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let application = state
        .application_service
        .decide(id, &actor, payload.status)
        .await?;
    Ok(Json(application))
}

#[axum::debug_handler]
pub async fn withdraw_application(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    state.application_service.withdraw(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}
