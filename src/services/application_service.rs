use crate::dto::application_dto::{ApplicationFilters, CreateApplicationPayload};
use crate::error::{Error, Result};
use crate::models::actor::{ActorInfo, ActorRole, CompanyScope};
use crate::models::application::{Application, ApplicationStatus, Offer};
use crate::models::notification::{EventKind, NewNotificationEvent};
use crate::services::interview_service::InterviewService;
use crate::services::notification_service::NotificationService;
use crate::utils::time;
use chrono::NaiveDate;
use serde_json::json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Owner of `applications` and `offer_links`.
#[derive(Clone)]
pub struct ApplicationService {
    pool: PgPool,
}

impl ApplicationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, payload: &CreateApplicationPayload) -> Result<Application> {
        validate_binome(payload)?;
        let start_date = time::parse_date(&payload.start_date)?;
        let end_date = time::parse_date(&payload.end_date)?;
        validate_period(start_date, end_date)?;

        if payload.offer_ids.is_empty() || payload.offer_ids.len() > 4 {
            return Err(Error::BadRequest(
                "An application links between 1 and 4 offers".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"SELECT offer_id FROM offer_links
               WHERE candidate_email = $1 AND offer_id = ANY($2)"#,
        )
        .bind(&payload.candidate_email)
        .bind(&payload.offer_ids)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(Error::DuplicateApplication(format!(
                "{} already applied to one of these offers",
                payload.candidate_email
            )));
        }

        // fetch in payload order; the first offer decides the tenant
        let mut offers = Vec::with_capacity(payload.offer_ids.len());
        for offer_id in &payload.offer_ids {
            let offer = sqlx::query_as::<_, Offer>(r#"SELECT * FROM offers WHERE id = $1"#)
                .bind(offer_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Offer {} not found", offer_id)))?;
            offers.push(offer);
        }
        let company_id = offers[0].company_id;

        let application = sqlx::query_as::<_, Application>(
            r#"
            INSERT INTO applications
                (candidate_email, candidate_name, candidate_phone, company_id, status,
                 is_binome, binome_last_name, binome_first_name, binome_email, binome_phone,
                 start_date, end_date)
            VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&payload.candidate_email)
        .bind(&payload.candidate_name)
        .bind(&payload.candidate_phone)
        .bind(company_id)
        .bind(payload.is_binome)
        .bind(&payload.binome_last_name)
        .bind(&payload.binome_first_name)
        .bind(&payload.binome_email)
        .bind(&payload.binome_phone)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&mut *tx)
        .await?;

        for offer in &offers {
            // company snapshot taken here; reassigning the offer later must
            // not move this application
            let inserted = sqlx::query(
                r#"
                INSERT INTO offer_links (application_id, offer_id, company_id, candidate_email)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (candidate_email, offer_id) DO NOTHING
                "#,
            )
            .bind(application.id)
            .bind(offer.id)
            .bind(offer.company_id)
            .bind(&payload.candidate_email)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                return Err(Error::DuplicateApplication(format!(
                    "{} already applied to offer {}",
                    payload.candidate_email, offer.id
                )));
            }
        }

        let event = NewNotificationEvent::new(
            EventKind::ApplicationCreated,
            json!({
                "candidate_name": application.candidate_name,
                "candidate_email": application.candidate_email,
            }),
        )
        .company(company_id)
        .application(application.id);
        NotificationService::submit_on(&mut tx, &event).await?;

        tx.commit().await?;
        tracing::info!(application_id = %application.id, company_id = %company_id,
            "application created");
        Ok(application)
    }

    pub async fn list_for_hr(
        &self,
        scope: CompanyScope,
        filters: &ApplicationFilters,
    ) -> Result<Vec<Application>> {
        let company_filter = match scope {
            CompanyScope::All => None,
            CompanyScope::Only(id) => Some(id),
        };
        let pattern = filters.q.as_ref().map(|q| format!("%{}%", q));
        let rows = sqlx::query_as::<_, Application>(
            r#"
            SELECT * FROM applications
            WHERE ($1::uuid IS NULL OR company_id = $1)
              AND ($2::application_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR candidate_name ILIKE $3 OR candidate_email ILIKE $3)
            ORDER BY submitted_at DESC
            "#,
        )
        .bind(company_filter)
        .bind(filters.status)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: Uuid) -> Result<Application> {
        let app = sqlx::query_as::<_, Application>(r#"SELECT * FROM applications WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Application {} not found", id)))?;
        Ok(app)
    }

    /// Status write used by the interview state machine within its own
    /// transaction (PENDING -> INTERVIEW_SCHEDULED on validation).
    pub async fn set_status_on(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
        status: ApplicationStatus,
    ) -> Result<Application> {
        let app = sqlx::query_as::<_, Application>(
            r#"UPDATE applications SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *"#,
        )
        .bind(status)
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(app)
    }

    /// HR's final decision on an application.
    pub async fn decide(
        &self,
        id: Uuid,
        hr: &ActorInfo,
        status: ApplicationStatus,
    ) -> Result<Application> {
        if !matches!(status, ApplicationStatus::Approved | ApplicationStatus::Rejected) {
            return Err(Error::BadRequest(
                "Only APPROVED or REJECTED can be set directly".to_string(),
            ));
        }
        if !matches!(hr.role, ActorRole::Hr | ActorRole::Admin) {
            return Err(Error::Unauthorized(
                "Only HR or admin may decide an application".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let app = sqlx::query_as::<_, Application>(
            r#"SELECT * FROM applications WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Application {} not found", id)))?;

        let scope = hr
            .company_scope()
            .ok_or_else(|| Error::Unauthorized("No tenant scope".to_string()))?;
        if !scope.covers(app.company_id) {
            return Err(Error::Unauthorized(
                "Application is outside your company scope".to_string(),
            ));
        }

        let updated = Self::set_status_on(&mut tx, id, status).await?;

        let kind = match status {
            ApplicationStatus::Approved => EventKind::ApplicationApproved,
            _ => EventKind::ApplicationRejected,
        };
        let mut event = NewNotificationEvent::new(
            kind,
            json!({
                "hr_id": hr.id.to_string(),
                "candidate_name": updated.candidate_name,
                "candidate_email": updated.candidate_email,
            }),
        )
        .source(hr.id)
        .application(updated.id);
        if let Some(company_id) = updated.company_id {
            event = event.company(company_id);
        }
        NotificationService::submit_on(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Admin-only removal. Any live interview coordination is cancelled in the
    /// same transaction so nothing is left in a non-terminal state.
    pub async fn withdraw(&self, id: Uuid, actor: &ActorInfo) -> Result<()> {
        if actor.role != ActorRole::Admin {
            return Err(Error::Unauthorized(
                "Only admin may withdraw an application".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let locked = sqlx::query(r#"SELECT id FROM applications WHERE id = $1 FOR UPDATE"#)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(Error::NotFound(format!("Application {} not found", id)));
        }

        if let Some(cancelled) = InterviewService::cancel_active_on(&mut tx, id, actor.id).await? {
            tracing::info!(application_id = %id, request_id = %cancelled.id,
                "cancelled live interview request on withdrawal");
        }

        sqlx::query(r#"DELETE FROM applications WHERE id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Count of applications a candidate has submitted, derived on read
    /// instead of maintained by a racy counter.
    pub async fn submission_count(&self, candidate_email: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS count FROM applications WHERE candidate_email = $1"#,
        )
        .bind(candidate_email)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("count")?)
    }
}

fn validate_binome(payload: &CreateApplicationPayload) -> Result<()> {
    let fields = [
        ("binome_last_name", &payload.binome_last_name),
        ("binome_first_name", &payload.binome_first_name),
        ("binome_email", &payload.binome_email),
        ("binome_phone", &payload.binome_phone),
    ];
    if payload.is_binome {
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(Error::BadRequest(format!(
                "Binome applications require: {}",
                missing.join(", ")
            )));
        }
    } else {
        let stray: Vec<&str> = fields
            .iter()
            .filter(|(_, v)| v.as_deref().map_or(false, |s| !s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !stray.is_empty() {
            return Err(Error::BadRequest(format!(
                "Binome fields must be empty for a solo application: {}",
                stray.join(", ")
            )));
        }
    }
    Ok(())
}

fn validate_period(start_date: NaiveDate, end_date: NaiveDate) -> Result<()> {
    if end_date < start_date {
        return Err(Error::InvalidSchedule(
            "End date must be on or after the start date".to_string(),
        ));
    }
    if start_date < time::today() {
        return Err(Error::InvalidSchedule(
            "Start date cannot be in the past".to_string(),
        ));
    }
    Ok(())
}
