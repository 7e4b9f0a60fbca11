use std::env;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

use stagebloom_backend::{middleware::auth, models::actor::ActorRole, routes, AppState};

fn setup_env() -> bool {
    dotenvy::dotenv().ok();
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    if env::var("JWT_SECRET").is_err() {
        env::set_var("JWT_SECRET", "test_secret_key");
    }
    if env::var("DATABASE_URL").is_err() {
        eprintln!("skipping: DATABASE_URL not set");
        return false;
    }
    let _ = stagebloom_backend::config::init_config();
    true
}

fn bearer(actor_id: Uuid, role: &str) -> String {
    let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize;
    let claims = auth::Claims {
        sub: actor_id.to_string(),
        exp,
        role: Some(role.to_string()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(
            stagebloom_backend::config::get_config().jwt_secret.as_bytes(),
        ),
    )
    .expect("sign token");
    format!("Bearer {}", token)
}

fn app_router(state: AppState) -> Router {
    let public = Router::new().route(
        "/api/applications",
        post(routes::application_routes::create_application),
    );
    let hr = Router::new()
        .route(
            "/api/applications",
            get(routes::application_routes::list_applications),
        )
        .route(
            "/api/applications/:id",
            get(routes::application_routes::get_application),
        )
        .route(
            "/api/applications/:id/propose-interview",
            post(routes::interview_routes::propose_interview),
        )
        .route(
            "/api/interview-requests/:id/hr-respond",
            post(routes::interview_routes::hr_respond),
        )
        .route(
            "/api/interview-requests/:id/cancel",
            post(routes::interview_routes::cancel_request),
        )
        .route(
            "/api/interview-requests/:id/complete",
            post(routes::interview_routes::mark_completed),
        )
        .layer(from_fn(auth::require_hr_or_admin));
    let authed = Router::new()
        .route(
            "/api/interview-requests/:id",
            get(routes::interview_routes::get_interview_request),
        )
        .route(
            "/api/interview-requests/:id/tutor-respond",
            post(routes::interview_routes::tutor_respond),
        )
        .layer(from_fn(auth::require_bearer_auth));
    public.merge(hr).merge(authed).with_state(state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    auth_header: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth_header) = auth_header {
        builder = builder.header("authorization", auth_header);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");
    let response = app.clone().oneshot(request).await.expect("send request");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, json)
}

async fn seed_company(pool: &sqlx::PgPool, name: &str) -> Uuid {
    sqlx::query_scalar::<_, Uuid>(r#"INSERT INTO companies (name) VALUES ($1) RETURNING id"#)
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("seed company")
}

async fn seed_actor(
    pool: &sqlx::PgPool,
    role: ActorRole,
    company_id: Option<Uuid>,
    name: &str,
) -> Uuid {
    sqlx::query_scalar::<_, Uuid>(
        r#"INSERT INTO actors (role, company_id, display_name, email)
           VALUES ($1, $2, $3, $4) RETURNING id"#,
    )
    .bind(role)
    .bind(company_id)
    .bind(name)
    .bind(format!("{}@test.example", Uuid::new_v4()))
    .fetch_one(pool)
    .await
    .expect("seed actor")
}

async fn seed_offer(pool: &sqlx::PgPool, company_id: Uuid, title: &str) -> Uuid {
    sqlx::query_scalar::<_, Uuid>(
        r#"INSERT INTO offers (company_id, title) VALUES ($1, $2) RETURNING id"#,
    )
    .bind(company_id)
    .bind(title)
    .fetch_one(pool)
    .await
    .expect("seed offer")
}

#[tokio::test]
async fn interview_coordination_end_to_end() {
    if !setup_env() {
        return;
    }

    let pool = stagebloom_backend::database::pool::create_pool()
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let company = seed_company(&pool, "Acme Stages").await;
    let hr_id = seed_actor(&pool, ActorRole::Hr, Some(company), "Claire RH").await;
    let tutor_id = seed_actor(&pool, ActorRole::Tutor, Some(company), "Marc Tuteur").await;

    let offer = seed_offer(&pool, company, "Stage backend").await;
    let app = app_router(AppState::new(pool.clone()));

    let hr_auth = bearer(hr_id, "HR");
    let tutor_auth = bearer(tutor_id, "TUTOR");
    let candidate_email = format!("candidate-{}@test.example", Uuid::new_v4());

    // public submission, no token
    let (status, created) = send(
        &app,
        "POST",
        "/api/applications",
        None,
        Some(json!({
            "candidate_name": "Nora Candidate",
            "candidate_email": candidate_email,
            "offer_ids": [offer],
            "start_date": "2030-03-01",
            "end_date": "2030-08-31",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "PENDING");
    assert_eq!(created["company_id"], company.to_string());
    assert_eq!(created["submission_count"], 1);
    let application_id = created["id"].as_str().expect("application id").to_string();

    let (status, detail) = send(
        &app,
        "GET",
        &format!("/api/applications/{}", application_id),
        Some(&hr_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["candidate_email"], candidate_email);

    // the proposing HR sees it in the tenant listing
    let (status, listed) = send(&app, "GET", "/api/applications", Some(&hr_auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed
        .as_array()
        .expect("list")
        .iter()
        .any(|a| a["id"] == created["id"]));

    let propose_uri = format!("/api/applications/{}/propose-interview", application_id);

    // past date refused
    let (status, body) = send(
        &app,
        "POST",
        &propose_uri,
        Some(&hr_auth),
        Some(json!({
            "tutor_id": tutor_id,
            "date": "2020-01-01",
            "time": "10:00",
            "location": "Salle B12",
            "mode": "IN_PERSON",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_SCHEDULE");

    // video without a meeting link refused
    let (status, body) = send(
        &app,
        "POST",
        &propose_uri,
        Some(&hr_auth),
        Some(json!({
            "tutor_id": tutor_id,
            "date": "2030-06-01",
            "time": "10:00",
            "location": "Visio",
            "mode": "VIDEO",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_SCHEDULE");

    let (status, request) = send(
        &app,
        "POST",
        &propose_uri,
        Some(&hr_auth),
        Some(json!({
            "tutor_id": tutor_id,
            "date": "2030-06-01",
            "time": "10:00",
            "location": "Visio",
            "mode": "VIDEO",
            "meeting_link": "https://meet.example.com/abc",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["state"], "PROPOSED");
    let request_id = request["id"].as_str().expect("request id").to_string();

    // the selected tutor can read the request detail
    let (status, detail) = send(
        &app,
        "GET",
        &format!("/api/interview-requests/{}", request_id),
        Some(&tutor_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["proposed_date"], "2030-06-01");

    // the application is locked while a request is live
    let (status, body) = send(
        &app,
        "POST",
        &propose_uri,
        Some(&hr_auth),
        Some(json!({
            "tutor_id": tutor_id,
            "date": "2030-06-02",
            "time": "11:00",
            "location": "Salle A1",
            "mode": "IN_PERSON",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "APPLICATION_LOCKED");

    // HR cannot answer its own proposal
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/hr-respond", request_id),
        Some(&hr_auth),
        Some(json!({ "action": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INVALID_STATE");

    // only the selected tutor may respond
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/tutor-respond", request_id),
        Some(&hr_auth),
        Some(json!({ "action": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "UNAUTHORIZED");

    // counter-proposal needs a slot
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/tutor-respond", request_id),
        Some(&tutor_auth),
        Some(json!({ "action": "propose_new_time" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_SCHEDULE");

    let (status, request) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/tutor-respond", request_id),
        Some(&tutor_auth),
        Some(json!({
            "action": "propose_new_time",
            "suggested_date": "2030-06-03",
            "suggested_time": "14:30",
            "comment": "Indisponible le matin",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["state"], "REVISION_REQUESTED");
    assert_eq!(request["suggested_date"], "2030-06-03");

    // the ball is now in HR's court
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/tutor-respond", request_id),
        Some(&tutor_auth),
        Some(json!({ "action": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INVALID_STATE");

    // HR accepts; the counter-proposal becomes the schedule
    let (status, request) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/hr-respond", request_id),
        Some(&hr_auth),
        Some(json!({ "action": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["state"], "VALIDATED");
    assert_eq!(request["proposed_date"], "2030-06-03");
    assert!(request["suggested_date"].is_null());

    let (_, listed) = send(&app, "GET", "/api/applications", Some(&hr_auth), None).await;
    let entry = listed
        .as_array()
        .expect("list")
        .iter()
        .find(|a| a["id"].as_str() == Some(&application_id))
        .expect("application listed")
        .clone();
    assert_eq!(entry["status"], "INTERVIEW_SCHEDULED");

    // completion only after the scheduled slot has passed
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/complete", request_id),
        Some(&hr_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INVALID_STATE");

    // cancel is not part of the table once validated
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/cancel", request_id),
        Some(&hr_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INVALID_STATE");

    // rewind the schedule so the slot is in the past
    sqlx::query(
        r#"UPDATE interview_requests SET proposed_date = '2020-01-01' WHERE id = $1"#,
    )
    .bind(Uuid::parse_str(&request_id).unwrap())
    .execute(&pool)
    .await
    .expect("rewind schedule");

    let (status, request) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/complete", request_id),
        Some(&hr_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["state"], "COMPLETED");
    assert!(!request["closed_at"].is_null());

    // terminal states accept nothing
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/tutor-respond", request_id),
        Some(&tutor_auth),
        Some(json!({ "action": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INVALID_STATE");
}

#[tokio::test]
async fn tutor_rejection_releases_the_application() {
    if !setup_env() {
        return;
    }

    let pool = stagebloom_backend::database::pool::create_pool()
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let company = seed_company(&pool, "Beta Stages").await;
    let hr_id = seed_actor(&pool, ActorRole::Hr, Some(company), "Hugo RH").await;
    let tutor_id = seed_actor(&pool, ActorRole::Tutor, Some(company), "Lisa Tutrice").await;
    let offer = seed_offer(&pool, company, "Stage data").await;
    let app = app_router(AppState::new(pool.clone()));

    let hr_auth = bearer(hr_id, "HR");
    let tutor_auth = bearer(tutor_id, "TUTOR");

    let (status, created) = send(
        &app,
        "POST",
        "/api/applications",
        None,
        Some(json!({
            "candidate_name": "Sami Candidate",
            "candidate_email": format!("candidate-{}@test.example", Uuid::new_v4()),
            "offer_ids": [offer],
            "start_date": "2030-03-01",
            "end_date": "2030-08-31",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let application_id = created["id"].as_str().unwrap().to_string();
    let propose_uri = format!("/api/applications/{}/propose-interview", application_id);

    let propose_body = json!({
        "tutor_id": tutor_id,
        "date": "2030-09-10",
        "time": "09:30",
        "location": "Salle C3",
        "mode": "IN_PERSON",
    });
    let (status, request) = send(
        &app,
        "POST",
        &propose_uri,
        Some(&hr_auth),
        Some(propose_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = request["id"].as_str().unwrap().to_string();

    // rejecting without a comment is refused
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/tutor-respond", request_id),
        Some(&tutor_auth),
        Some(json!({ "action": "reject" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "BAD_REQUEST");

    let (status, request) = send(
        &app,
        "POST",
        &format!("/api/interview-requests/{}/tutor-respond", request_id),
        Some(&tutor_auth),
        Some(json!({ "action": "reject", "comment": "Je pars en mission" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["state"], "REJECTED");

    // the terminal state releases the one-live-request lock
    let (status, request) = send(
        &app,
        "POST",
        &propose_uri,
        Some(&hr_auth),
        Some(propose_body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["state"], "PROPOSED");
}
