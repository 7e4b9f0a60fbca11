use crate::error::{Error, Result};
use crate::models::actor::ActorRole;
use crate::models::notification::{
    EventKind, NewNotificationEvent, Notification, NotificationEvent,
};
use crate::services::push_hub::PushHub;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashSet;
use uuid::Uuid;

/// Event bus: sole owner of `notification_events` and `notifications`.
/// Producers submit immutable events; a worker expands them into per-recipient
/// rows and signals the push hub after commit.
#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
    hub: PushHub,
}

impl NotificationService {
    pub fn new(pool: PgPool, hub: PushHub) -> Self {
        Self { pool, hub }
    }

    /// Appends an event inside the caller's transaction so that state change
    /// and event emission commit atomically.
    pub async fn submit_on(conn: &mut PgConnection, event: &NewNotificationEvent) -> Result<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO notification_events
                (kind, payload, source_actor_id, explicit_target_ids, target_roles,
                 company_id, application_id, interview_request_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(event.kind)
        .bind(&event.payload)
        .bind(event.source_actor_id)
        .bind(&event.explicit_target_ids)
        .bind(&event.target_roles)
        .bind(event.company_id)
        .bind(event.application_id)
        .bind(event.interview_request_id)
        .fetch_one(conn)
        .await?;
        Ok(row.try_get("id")?)
    }

    pub async fn submit(&self, event: &NewNotificationEvent) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await?;
        Self::submit_on(&mut conn, event).await
    }

    /// Drains one batch of unprocessed events in FIFO order. Returns true if
    /// anything was processed. Safe to replay: notification inserts are
    /// idempotent on (event_id, recipient_id).
    pub async fn run_once(&self) -> Result<bool> {
        let batch = crate::config::get_config().event_worker_batch;
        let mut tx = self.pool.begin().await?;

        let events = sqlx::query_as::<_, NotificationEvent>(
            r#"
            SELECT * FROM notification_events
            WHERE NOT processed
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $1
            "#,
        )
        .bind(batch)
        .fetch_all(&mut *tx)
        .await?;

        if events.is_empty() {
            return Ok(false);
        }

        let mut delivered: Vec<Notification> = Vec::new();
        for event in &events {
            match self.process_event(&mut tx, event).await {
                Ok(mut rows) => delivered.append(&mut rows),
                Err(err @ Error::Database(_)) => return Err(err),
                Err(err) => {
                    // poison event: mark it processed with a failure marker so
                    // the queue keeps moving
                    tracing::error!(event_id = %event.id, kind = ?event.kind, error = %err,
                        "failed to expand notification event");
                    sqlx::query(
                        r#"UPDATE notification_events
                           SET processed = TRUE, processed_at = NOW(), processing_error = $1
                           WHERE id = $2"#,
                    )
                    .bind(err.to_string())
                    .bind(event.id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;

        // signalled after commit so delivery order follows insertion order
        for notification in &delivered {
            self.hub.deliver(notification);
        }

        Ok(true)
    }

    async fn process_event(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event: &NotificationEvent,
    ) -> Result<Vec<Notification>> {
        let recipients = resolve_recipients(&mut *tx, event).await?;
        let (title_template, body_template) = self.load_template(&mut *tx, event.kind).await?;

        let title = render_template(&title_template, &event.payload);
        let body = render_template(&body_template, &event.payload);

        let mut inserted = Vec::with_capacity(recipients.len());
        for recipient_id in recipients {
            let row = sqlx::query_as::<_, Notification>(
                r#"
                INSERT INTO notifications
                    (event_id, recipient_id, kind, title, body, application_id, interview_request_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (event_id, recipient_id) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(event.id)
            .bind(recipient_id)
            .bind(event.kind)
            .bind(&title)
            .bind(&body)
            .bind(event.application_id)
            .bind(event.interview_request_id)
            .fetch_optional(&mut **tx)
            .await?;
            if let Some(notification) = row {
                inserted.push(notification);
            }
        }

        // candidate-facing outcomes also go out by email; the outbox worker
        // drains these without blocking the pipeline
        if matches!(
            event.kind,
            EventKind::ApplicationApproved
                | EventKind::ApplicationRejected
                | EventKind::InterviewValidated
        ) {
            if let Some(to) = event.payload.get("candidate_email").and_then(|v| v.as_str()) {
                crate::services::outbox_service::OutboxService::enqueue_on(
                    &mut **tx,
                    "email",
                    &serde_json::json!({
                        "to": to,
                        "subject": title,
                        "body": body,
                        "event_id": event.id.to_string(),
                    }),
                    None,
                )
                .await?;
            }
        }

        sqlx::query(
            r#"UPDATE notification_events SET processed = TRUE, processed_at = NOW() WHERE id = $1"#,
        )
        .bind(event.id)
        .execute(&mut **tx)
        .await?;

        Ok(inserted)
    }

    async fn load_template(
        &self,
        conn: &mut PgConnection,
        kind: EventKind,
    ) -> Result<(String, String)> {
        let locale = &crate::config::get_config().default_locale;
        let row = sqlx::query(
            r#"SELECT title_template, body_template FROM notification_templates
               WHERE kind = $1 AND locale = $2"#,
        )
        .bind(kind)
        .bind(locale)
        .fetch_optional(conn)
        .await?;
        match row {
            Some(row) => Ok((row.try_get("title_template")?, row.try_get("body_template")?)),
            None => {
                let (title, body) = builtin_template(kind);
                Ok((title.to_string(), body.to_string()))
            }
        }
    }

    pub async fn list_for_actor(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        limit: Option<i64>,
    ) -> Result<Vec<Notification>> {
        let limit = limit.unwrap_or(50).clamp(1, 100);
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE recipient_id = $1 AND (NOT $2 OR NOT is_read)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(recipient_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND recipient_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Notification {} not found", id)))?;
        Ok(row)
    }

    pub async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE notifications
               SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
               WHERE recipient_id = $1 AND NOT is_read"#,
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS count FROM notifications
               WHERE recipient_id = $1 AND NOT is_read"#,
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("count")?)
    }
}

/// Recipient set: explicit targets ∪ role expansion ∪ (default routing when
/// both are empty), deduplicated.
async fn resolve_recipients(
    conn: &mut PgConnection,
    event: &NotificationEvent,
) -> Result<HashSet<Uuid>> {
    let mut recipients: HashSet<Uuid> = event.explicit_target_ids.iter().copied().collect();

    for role in &event.target_roles {
        expand_role(conn, *role, event.company_id, &mut recipients).await?;
    }

    if event.explicit_target_ids.is_empty() && event.target_roles.is_empty() {
        default_route(conn, event, &mut recipients).await?;
    }

    Ok(recipients)
}

async fn default_route(
    conn: &mut PgConnection,
    event: &NotificationEvent,
    recipients: &mut HashSet<Uuid>,
) -> Result<()> {
    let payload = &event.payload;
    match event.kind {
        EventKind::ApplicationCreated => {
            expand_role(conn, ActorRole::Hr, event.company_id, recipients).await?;
        }
        EventKind::ApplicationApproved | EventKind::ApplicationRejected => {
            add_candidate(conn, payload, recipients).await?;
            add_payload_actor(payload, "hr_id", recipients)?;
        }
        EventKind::InterviewProposed => {
            add_payload_actor(payload, "tutor_id", recipients)?;
            add_candidate(conn, payload, recipients).await?;
        }
        EventKind::InterviewValidated => {
            add_payload_actor(payload, "tutor_id", recipients)?;
            add_candidate(conn, payload, recipients).await?;
            add_payload_actor(payload, "hr_id", recipients)?;
        }
        EventKind::InterviewRejected => {
            add_payload_actor(payload, "hr_id", recipients)?;
            add_candidate(conn, payload, recipients).await?;
        }
        EventKind::InterviewRevisionRequested => {
            // only the proposing HR; the candidate learns the final schedule
            // on validation
            add_payload_actor(payload, "hr_id", recipients)?;
        }
        EventKind::TutorAssigned => {
            add_payload_actor(payload, "tutor_id", recipients)?;
            add_payload_actor(payload, "intern_id", recipients)?;
            add_payload_actor(payload, "hr_id", recipients)?;
        }
        EventKind::DocumentUploaded => {
            if let Some(ids) = payload.get("participant_ids").and_then(|v| v.as_array()) {
                for raw in ids {
                    if let Some(id) = raw.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
                        recipients.insert(id);
                    }
                }
            }
            expand_role(conn, ActorRole::Hr, event.company_id, recipients).await?;
        }
        EventKind::SystemBroadcast => {
            let rows = sqlx::query(r#"SELECT id FROM actors WHERE is_active"#)
                .fetch_all(conn)
                .await?;
            for row in rows {
                recipients.insert(row.try_get("id")?);
            }
        }
    }
    Ok(())
}

/// Active actors carrying `role`, tenant-filtered when the event carries a
/// company (admins are never tenant-filtered).
async fn expand_role(
    conn: &mut PgConnection,
    role: ActorRole,
    company_id: Option<Uuid>,
    recipients: &mut HashSet<Uuid>,
) -> Result<()> {
    let rows = sqlx::query(
        r#"
        SELECT id FROM actors
        WHERE role = $1 AND is_active
          AND ($2::uuid IS NULL OR company_id = $2 OR role = 'ADMIN')
        "#,
    )
    .bind(role)
    .bind(company_id)
    .fetch_all(conn)
    .await?;
    for row in rows {
        recipients.insert(row.try_get("id")?);
    }
    Ok(())
}

async fn add_candidate(
    conn: &mut PgConnection,
    payload: &JsonValue,
    recipients: &mut HashSet<Uuid>,
) -> Result<()> {
    let Some(email) = payload.get("candidate_email").and_then(|v| v.as_str()) else {
        return Ok(());
    };
    let row = sqlx::query(
        r#"SELECT id FROM actors WHERE email = $1 AND role = 'CANDIDATE' AND is_active"#,
    )
    .bind(email)
    .fetch_optional(conn)
    .await?;
    if let Some(row) = row {
        recipients.insert(row.try_get("id")?);
    }
    Ok(())
}

fn add_payload_actor(
    payload: &JsonValue,
    key: &str,
    recipients: &mut HashSet<Uuid>,
) -> Result<()> {
    if let Some(raw) = payload.get(key).and_then(|v| v.as_str()) {
        let id = Uuid::parse_str(raw)
            .map_err(|_| Error::Internal(format!("Malformed {} in event payload", key)))?;
        recipients.insert(id);
    }
    Ok(())
}

/// Substitutes `{key}` placeholders from the event payload; unknown keys are
/// left verbatim so a misconfigured template still produces output.
pub fn render_template(template: &str, payload: &JsonValue) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find('}') {
            Some(end) => {
                let key = &tail[1..end];
                match payload.get(key) {
                    Some(JsonValue::String(s)) => out.push_str(s),
                    Some(value) => out.push_str(&value.to_string()),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Wording shipped with the binary; a `notification_templates` row for the
/// same (kind, locale) overrides it without redeployment.
pub fn builtin_template(kind: EventKind) -> (&'static str, &'static str) {
    match kind {
        EventKind::ApplicationCreated => (
            "Nouvelle candidature",
            "{candidate_name} a soumis une candidature.",
        ),
        EventKind::ApplicationApproved => (
            "Candidature acceptée",
            "La candidature de {candidate_name} a été acceptée.",
        ),
        EventKind::ApplicationRejected => (
            "Candidature refusée",
            "La candidature de {candidate_name} a été refusée.",
        ),
        EventKind::InterviewProposed => (
            "Entretien proposé",
            "Un entretien est proposé le {date} à {time} ({location}).",
        ),
        EventKind::InterviewValidated => (
            "Entretien confirmé",
            "L'entretien du {date} à {time} est confirmé.",
        ),
        EventKind::InterviewRejected => (
            "Entretien refusé",
            "La proposition d'entretien a été refusée. {comment}",
        ),
        EventKind::InterviewRevisionRequested => (
            "Nouveau créneau proposé",
            "Le tuteur propose le {suggested_date} à {suggested_time}. {comment}",
        ),
        EventKind::TutorAssigned => (
            "Tuteur assigné",
            "{tutor_name} a été assigné au stage de {intern_name}.",
        ),
        EventKind::DocumentUploaded => (
            "Document déposé",
            "Un document a été déposé : {document_name}.",
        ),
        EventKind::SystemBroadcast => ("Annonce", "{message}"),
    }
}
