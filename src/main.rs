use axum::{
    middleware::from_fn,
    routing::{delete, get, post},
    Router,
};
use stagebloom_backend::services::outbox_service::OutboxService;
use stagebloom_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    middleware::auth,
    routes, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    {
        let state = app_state.clone();
        tokio::spawn(async move {
            loop {
                match state.notification_service.run_once().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Event worker error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }

    {
        let state = app_state.clone();
        tokio::spawn(async move {
            let outbox = OutboxService::new(state.pool.clone());
            loop {
                match outbox.run_once().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tokio::time::sleep(Duration::from_millis(1000)).await;
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Outbox worker error");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    }

    {
        let state = app_state.clone();
        let interval = state.push_hub.heartbeat_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let reaped = state.push_hub.reap_stale();
                if reaped > 0 {
                    tracing::info!(reaped, "reaped stale push subscribers");
                }
            }
        });
    }

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let public_api = Router::new().route(
        "/api/applications",
        post(routes::application_routes::create_application),
    );

    let hr_api = Router::new()
        .route(
            "/api/applications",
            get(routes::application_routes::list_applications),
        )
        .route(
            "/api/applications/:id",
            get(routes::application_routes::get_application),
        )
        .route(
            "/api/applications/:id/status",
            post(routes::application_routes::decide_application),
        )
        .route(
            "/api/applications/:id/available-tutors",
            get(routes::interview_routes::available_tutors),
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
        .route(
            "/api/interview-requests/:id/no-show",
            post(routes::interview_routes::mark_no_show),
        )
        .layer(from_fn(auth::require_hr_or_admin));

    let admin_api = Router::new()
        .route(
            "/api/applications/:id",
            delete(routes::application_routes::withdraw_application),
        )
        .route("/api/broadcast", post(routes::notification_routes::broadcast))
        .layer(from_fn(auth::require_admin));

    let authenticated_api = Router::new()
        .route(
            "/api/interview-requests/:id",
            get(routes::interview_routes::get_interview_request),
        )
        .route(
            "/api/interview-requests/:id/tutor-respond",
            post(routes::interview_routes::tutor_respond),
        )
        .route(
            "/api/notifications",
            get(routes::notification_routes::list_notifications),
        )
        .route(
            "/api/notifications/:id/read",
            post(routes::notification_routes::mark_read),
        )
        .route(
            "/api/notifications/mark-all-read",
            post(routes::notification_routes::mark_all_read),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::notification_routes::unread_count),
        )
        .route("/api/ws", get(routes::ws::ws_upgrade))
        .layer(from_fn(auth::require_bearer_auth));

    let app = base_routes
        .merge(public_api)
        .merge(hr_api)
        .merge(admin_api)
        .merge(authenticated_api)
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
