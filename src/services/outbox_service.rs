use crate::error::Result;
use crate::models::outbox::OutboxMessage;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value as JsonValue;
use sha2::Sha256;
use sqlx::{PgPool, Row};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Side effects (email, PDF hand-off) are written as outbox rows in the same
/// transaction as the event that caused them and drained here; the core never
/// blocks on the gateway.
#[derive(Clone)]
pub struct OutboxService {
    pool: PgPool,
    client: Client,
    gateway_url: Option<String>,
    secret: Option<String>,
}

impl OutboxService {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        Self {
            pool,
            client: Client::new(),
            gateway_url: config.outbox_gateway_url.clone(),
            secret: config.outbox_secret.clone(),
        }
    }

    /// Appends an outbox message inside the caller's transaction.
    pub async fn enqueue_on(
        conn: &mut sqlx::PgConnection,
        kind: &str,
        payload: &JsonValue,
        target_url: Option<&str>,
    ) -> Result<Uuid> {
        let row = sqlx::query(
            r#"INSERT INTO outbox_messages (kind, payload, target_url)
               VALUES ($1, $2, $3) RETURNING id"#,
        )
        .bind(kind)
        .bind(payload)
        .bind(target_url)
        .fetch_one(conn)
        .await?;
        Ok(row.try_get("id")?)
    }

    /// Delivers one pending message. Returns false when the queue is empty.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(gateway) = &self.gateway_url else {
            // no gateway configured; leave rows pending
            return Ok(false);
        };

        // the claim and the status write share one transaction so the row
        // stays locked while the delivery is in flight; a second drain worker
        // skips it instead of sending the same message twice
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, OutboxMessage>(
            r#"
            SELECT * FROM outbox_messages
            WHERE status = 'PENDING' AND (next_retry_at IS NULL OR next_retry_at <= NOW())
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;
        let Some(message) = row else {
            return Ok(false);
        };

        let url = message.target_url.as_deref().unwrap_or(gateway);
        let body = serde_json::to_vec(&message.payload)?;
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header("X-Outbox-Signature", sign(secret, &body));
        }

        match request.body(body).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16() as i32;
                let response_body = resp.text().await.unwrap_or_default();
                sqlx::query(
                    r#"
                    UPDATE outbox_messages
                    SET http_status = $1,
                        response_body = $2,
                        attempts = attempts + 1,
                        status = CASE WHEN $1 BETWEEN 200 AND 299 THEN 'SENT'::outbox_status
                                      WHEN attempts + 1 >= max_attempts THEN 'FAILED'::outbox_status
                                      ELSE 'PENDING'::outbox_status END,
                        next_retry_at = CASE WHEN $1 BETWEEN 200 AND 299 THEN NULL
                            ELSE NOW() + make_interval(secs => LEAST(3600, 30 * power(2::float, attempts)::int)) END,
                        updated_at = NOW()
                    WHERE id = $3
                    "#,
                )
                .bind(status)
                .bind(response_body)
                .bind(message.id)
                .execute(&mut *tx)
                .await?;
            }
            Err(err) => {
                tracing::warn!(message_id = %message.id, error = %err, "outbox delivery failed");
                sqlx::query(
                    r#"
                    UPDATE outbox_messages
                    SET response_body = $1,
                        attempts = attempts + 1,
                        status = CASE WHEN attempts + 1 >= max_attempts THEN 'FAILED'::outbox_status
                                      ELSE 'PENDING'::outbox_status END,
                        next_retry_at = NOW() + make_interval(secs => LEAST(3600, 30 * power(2::float, attempts)::int)),
                        updated_at = NOW()
                    WHERE id = $2
                    "#,
                )
                .bind(err.to_string())
                .bind(message.id)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        Ok(true)
    }
}

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
