use std::env;
use std::net::SocketAddr;

use axum::{middleware::from_fn, routing::get, Router};
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value as JsonValue};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use stagebloom_backend::{
    middleware::auth,
    models::actor::ActorRole,
    models::notification::{EventKind, NewNotificationEvent},
    routes, AppState,
};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

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

async fn drain_events(state: &AppState) {
    while state
        .notification_service
        .run_once()
        .await
        .expect("drain events")
    {}
}

/// Serves the push endpoint on an ephemeral port and returns its address.
async fn serve(state: AppState) -> SocketAddr {
    let app = Router::new()
        .route("/api/ws", get(routes::ws::ws_upgrade))
        .layer(from_fn(auth::require_bearer_auth))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn connect(addr: SocketAddr, auth_header: &str) -> WsClient {
    let mut request = format!("ws://{}/api/ws", addr)
        .into_client_request()
        .expect("ws request");
    request.headers_mut().insert(
        "authorization",
        auth_header.parse().expect("authorization header"),
    );
    let (socket, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect");
    socket
}

async fn next_frame(socket: &mut WsClient) -> JsonValue {
    loop {
        let message = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("ws error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("frame json");
        }
    }
}

async fn send_frame(socket: &mut WsClient, frame: JsonValue) {
    socket
        .send(Message::Text(frame.to_string()))
        .await
        .expect("send frame");
}

#[tokio::test]
async fn push_channel_delivers_live_and_resyncs_after_reconnect() {
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

    let company = seed_company(&pool, "Delta SAS").await;
    let tutor = seed_actor(&pool, ActorRole::Tutor, Some(company), "Tuteur Connecté").await;

    let state = AppState::new(pool.clone());
    let addr = serve(state.clone()).await;
    let tutor_auth = bearer(tutor, "TUTOR");

    let mut socket = connect(addr, &tutor_auth).await;
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "connection_established");
    assert!(frame["connection_id"].is_string());
    assert_eq!(state.push_hub.connection_count(), 1);

    send_frame(&mut socket, json!({ "type": "ping" })).await;
    assert_eq!(next_frame(&mut socket).await["type"], "pong");

    // an event processed while connected arrives as a live frame
    let event = NewNotificationEvent::new(
        EventKind::SystemBroadcast,
        json!({ "message": "Maintenance à 18h", "level": "info" }),
    )
    .targets(vec![tutor]);
    state
        .notification_service
        .submit(&event)
        .await
        .expect("submit event");
    drain_events(&state).await;

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "notification");
    assert_eq!(frame["notification"]["recipient_id"], tutor.to_string());
    assert_eq!(frame["notification"]["is_read"], false);

    // gone between events: the next one only lands in the durable table
    socket.close(None).await.expect("close socket");
    drop(socket);

    let event = NewNotificationEvent::new(
        EventKind::SystemBroadcast,
        json!({ "message": "Redémarrage terminé", "level": "info" }),
    )
    .targets(vec![tutor]);
    state
        .notification_service
        .submit(&event)
        .await
        .expect("submit event");
    drain_events(&state).await;

    // a fresh connection recovers everything missed through the protocol
    let mut socket = connect(addr, &tutor_auth).await;
    assert_eq!(next_frame(&mut socket).await["type"], "connection_established");

    send_frame(
        &mut socket,
        json!({ "type": "get_notifications", "unread_only": true }),
    )
    .await;
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "notifications_list");
    let notifications = frame["notifications"].as_array().expect("list");
    assert_eq!(notifications.len(), 2);

    // marking one read over the socket updates the unread counter
    let first = notifications[0]["id"].as_str().expect("notification id");
    send_frame(&mut socket, json!({ "type": "mark_read", "id": first })).await;
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "unread_count");
    assert_eq!(frame["count"], 1);

    send_frame(&mut socket, json!({ "type": "get_unread_count" })).await;
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "unread_count");
    assert_eq!(frame["count"], 1);
}
