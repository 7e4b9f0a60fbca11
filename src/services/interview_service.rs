use crate::database::with_retry;
use crate::dto::interview_dto::{
    AvailableTutor, HrAction, HrRespondPayload, ProposeInterviewPayload, TutorAction,
    TutorRespondPayload,
};
use crate::error::{Error, Result};
use crate::models::actor::{ActorInfo, ActorRole};
use crate::models::application::{Application, ApplicationStatus};
use crate::models::interview::{InterviewMode, InterviewOp, InterviewRequest, InterviewState};
use crate::models::notification::{EventKind, NewNotificationEvent};
use crate::services::application_service::ApplicationService;
use crate::services::identity_service::IdentityService;
use crate::services::notification_service::NotificationService;
use crate::utils::{time, validation};
use serde_json::json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Sole mutator of `interview_requests`. Every operation locks the relevant
/// rows, re-validates preconditions against the fresh read, writes the new
/// state and appends the notification event in the same transaction.
#[derive(Clone)]
pub struct InterviewService {
    pool: PgPool,
    identity: IdentityService,
}

impl InterviewService {
    pub fn new(pool: PgPool, identity: IdentityService) -> Self {
        Self { pool, identity }
    }

    pub async fn propose(
        &self,
        application_id: Uuid,
        hr: &ActorInfo,
        payload: &ProposeInterviewPayload,
    ) -> Result<InterviewRequest> {
        with_retry(|| self.propose_once(application_id, hr, payload)).await
    }

    async fn propose_once(
        &self,
        application_id: Uuid,
        hr: &ActorInfo,
        payload: &ProposeInterviewPayload,
    ) -> Result<InterviewRequest> {
        require_hr(hr)?;

        let proposed_date = time::parse_date(&payload.date)?;
        let proposed_time = time::parse_time(&payload.time)?;
        if proposed_date < time::today() {
            return Err(Error::InvalidSchedule(
                "Interview date cannot be in the past".to_string(),
            ));
        }
        let meeting_link = match payload.mode {
            InterviewMode::Video => {
                let link = payload.meeting_link.as_deref().ok_or_else(|| {
                    Error::InvalidSchedule(
                        "A meeting link is required for video interviews".to_string(),
                    )
                })?;
                validation::require_https_url(link)?;
                Some(link.to_string())
            }
            InterviewMode::InPerson => None,
        };

        let mut tx = self.pool.begin().await?;

        // the application row is the serialisation point for racing proposes
        let app = sqlx::query_as::<_, Application>(
            r#"SELECT * FROM applications WHERE id = $1 FOR UPDATE"#,
        )
        .bind(application_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Application {} not found", application_id)))?;

        let scope = hr
            .company_scope()
            .ok_or_else(|| Error::Unauthorized("No tenant scope".to_string()))?;
        if !scope.covers(app.company_id) {
            return Err(Error::Unauthorized(
                "Application is outside your company scope".to_string(),
            ));
        }
        let company_id = app
            .company_id
            .ok_or_else(|| Error::Internal("Application has no company".to_string()))?;

        let active = sqlx::query(
            r#"SELECT id FROM interview_requests
               WHERE application_id = $1
                 AND state IN ('PROPOSED', 'VALIDATED', 'REVISION_REQUESTED')"#,
        )
        .bind(application_id)
        .fetch_optional(&mut *tx)
        .await?;
        if active.is_some() {
            return Err(Error::ApplicationLocked);
        }

        // the tutor row serialises capacity checks across applications
        let tutor = sqlx::query(
            r#"SELECT role, company_id, is_active FROM actors WHERE id = $1 FOR UPDATE"#,
        )
        .bind(payload.tutor_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Tutor {} not found", payload.tutor_id)))?;
        let tutor_role: ActorRole = tutor.try_get("role")?;
        let tutor_company: Option<Uuid> = tutor.try_get("company_id")?;
        let tutor_active: bool = tutor.try_get("is_active")?;
        if tutor_role != ActorRole::Tutor || !tutor_active {
            return Err(Error::BadRequest(format!(
                "Actor {} is not an active tutor",
                payload.tutor_id
            )));
        }
        if tutor_company != Some(company_id) {
            return Err(Error::CrossCompany);
        }

        // fresh read under the tutor lock; racing proposes serialise above
        self.check_tutor_capacity(&mut tx, payload.tutor_id).await?;

        let request = sqlx::query_as::<_, InterviewRequest>(
            r#"
            INSERT INTO interview_requests
                (application_id, tutor_id, hr_id, company_id, proposed_date, proposed_time,
                 location, mode, meeting_link, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'PROPOSED')
            RETURNING *
            "#,
        )
        .bind(application_id)
        .bind(payload.tutor_id)
        .bind(hr.id)
        .bind(company_id)
        .bind(proposed_date)
        .bind(proposed_time)
        .bind(&payload.location)
        .bind(payload.mode)
        .bind(meeting_link)
        .fetch_one(&mut *tx)
        .await?;

        let event = NewNotificationEvent::new(
            EventKind::InterviewProposed,
            json!({
                "tutor_id": request.tutor_id.to_string(),
                "hr_id": hr.id.to_string(),
                "candidate_email": app.candidate_email,
                "candidate_name": app.candidate_name,
                "date": request.proposed_date.to_string(),
                "time": request.proposed_time.format("%H:%M").to_string(),
                "location": request.location,
                "mode": request.mode,
            }),
        )
        .source(hr.id)
        .company(company_id)
        .application(application_id)
        .interview_request(request.id);
        NotificationService::submit_on(&mut tx, &event).await?;

        tx.commit().await?;
        tracing::info!(request_id = %request.id, application_id = %application_id,
            tutor_id = %request.tutor_id, "interview proposed");
        Ok(request)
    }

    /// Capacity gate for every transition that produces a VALIDATED row.
    /// Locks the tutor row first so concurrent validations for the same tutor
    /// serialise and read an up-to-date count.
    async fn check_tutor_capacity(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        tutor_id: Uuid,
    ) -> Result<()> {
        sqlx::query(r#"SELECT id FROM actors WHERE id = $1 FOR UPDATE"#)
            .bind(tutor_id)
            .fetch_optional(&mut **tx)
            .await?;
        let load = self.identity.current_tutor_load(&mut **tx, tutor_id).await?;
        let max_load = crate::config::get_config().max_tutor_load;
        if load >= max_load {
            return Err(Error::TutorOverloaded(tutor_id));
        }
        Ok(())
    }

    pub async fn tutor_respond(
        &self,
        request_id: Uuid,
        tutor: &ActorInfo,
        payload: &TutorRespondPayload,
    ) -> Result<InterviewRequest> {
        with_retry(|| self.tutor_respond_once(request_id, tutor, payload)).await
    }

    async fn tutor_respond_once(
        &self,
        request_id: Uuid,
        tutor: &ActorInfo,
        payload: &TutorRespondPayload,
    ) -> Result<InterviewRequest> {
        let mut tx = self.pool.begin().await?;
        let req = lock_request(&mut tx, request_id).await?;

        if tutor.id != req.tutor_id {
            return Err(Error::Unauthorized(
                "Only the selected tutor can respond".to_string(),
            ));
        }

        let op = match payload.action {
            TutorAction::Accept => InterviewOp::TutorAccept,
            TutorAction::Reject => InterviewOp::TutorReject,
            TutorAction::ProposeNewTime => InterviewOp::TutorProposeNewTime,
        };
        let next = req.state.apply(op).ok_or_else(|| Error::InvalidState {
            current: req.state.as_str().to_string(),
            operation: op.as_str().to_string(),
        })?;

        let updated = match payload.action {
            TutorAction::Accept => {
                // the propose-time check is stale by now; accepting is what
                // actually consumes a validated slot
                self.check_tutor_capacity(&mut tx, req.tutor_id).await?;
                let updated = sqlx::query_as::<_, InterviewRequest>(
                    r#"
                    UPDATE interview_requests
                    SET state = $1, validated_at = NOW(), tutor_comment = $2, updated_at = NOW()
                    WHERE id = $3
                    RETURNING *
                    "#,
                )
                .bind(next)
                .bind(&payload.comment)
                .bind(request_id)
                .fetch_one(&mut *tx)
                .await?;

                let app =
                    ApplicationService::set_status_on(&mut tx, req.application_id, ApplicationStatus::InterviewScheduled)
                        .await?;

                let event = NewNotificationEvent::new(
                    EventKind::InterviewValidated,
                    json!({
                        "tutor_id": updated.tutor_id.to_string(),
                        "hr_id": updated.hr_id.to_string(),
                        "candidate_email": app.candidate_email,
                        "date": updated.proposed_date.to_string(),
                        "time": updated.proposed_time.format("%H:%M").to_string(),
                        "location": updated.location,
                    }),
                )
                .source(tutor.id)
                .company(updated.company_id)
                .application(updated.application_id)
                .interview_request(updated.id);
                NotificationService::submit_on(&mut tx, &event).await?;
                updated
            }
            TutorAction::Reject => {
                let comment = payload
                    .comment
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        Error::BadRequest("A comment is required when rejecting".to_string())
                    })?;
                let updated = close_request(&mut tx, request_id, next, tutor.id, Some(comment), true)
                    .await?;

                let event = reject_event(&mut tx, &updated, tutor.id, comment).await?;
                NotificationService::submit_on(&mut tx, &event).await?;
                updated
            }
            TutorAction::ProposeNewTime => {
                let raw_date = payload.suggested_date.as_deref().ok_or_else(|| {
                    Error::InvalidSchedule("A suggested date is required".to_string())
                })?;
                let raw_time = payload.suggested_time.as_deref().ok_or_else(|| {
                    Error::InvalidSchedule("A suggested time is required".to_string())
                })?;
                let suggested_date = time::parse_date(raw_date)?;
                let suggested_time = time::parse_time(raw_time)?;
                if suggested_date < time::today() {
                    return Err(Error::InvalidSchedule(
                        "Suggested date cannot be in the past".to_string(),
                    ));
                }

                let updated = sqlx::query_as::<_, InterviewRequest>(
                    r#"
                    UPDATE interview_requests
                    SET state = $1, suggested_date = $2, suggested_time = $3,
                        tutor_comment = $4, updated_at = NOW()
                    WHERE id = $5
                    RETURNING *
                    "#,
                )
                .bind(next)
                .bind(suggested_date)
                .bind(suggested_time)
                .bind(&payload.comment)
                .bind(request_id)
                .fetch_one(&mut *tx)
                .await?;

                let event = NewNotificationEvent::new(
                    EventKind::InterviewRevisionRequested,
                    json!({
                        "tutor_id": updated.tutor_id.to_string(),
                        "hr_id": updated.hr_id.to_string(),
                        "suggested_date": suggested_date.to_string(),
                        "suggested_time": suggested_time.format("%H:%M").to_string(),
                        "comment": payload.comment.clone().unwrap_or_default(),
                    }),
                )
                .source(tutor.id)
                .company(updated.company_id)
                .application(updated.application_id)
                .interview_request(updated.id);
                NotificationService::submit_on(&mut tx, &event).await?;
                updated
            }
        };

        tx.commit().await?;
        tracing::info!(request_id = %request_id, action = ?payload.action, state = ?updated.state,
            "tutor responded to interview request");
        Ok(updated)
    }

    pub async fn hr_respond(
        &self,
        request_id: Uuid,
        hr: &ActorInfo,
        payload: &HrRespondPayload,
    ) -> Result<InterviewRequest> {
        with_retry(|| self.hr_respond_once(request_id, hr, payload)).await
    }

    async fn hr_respond_once(
        &self,
        request_id: Uuid,
        hr: &ActorInfo,
        payload: &HrRespondPayload,
    ) -> Result<InterviewRequest> {
        require_hr(hr)?;

        let mut tx = self.pool.begin().await?;
        let req = lock_request(&mut tx, request_id).await?;
        require_scope(hr, req.company_id)?;

        let op = match payload.action {
            HrAction::Accept => InterviewOp::HrAccept,
            HrAction::Reject => InterviewOp::HrReject,
        };
        let next = req.state.apply(op).ok_or_else(|| Error::InvalidState {
            current: req.state.as_str().to_string(),
            operation: op.as_str().to_string(),
        })?;

        let updated = match payload.action {
            HrAction::Accept => {
                self.check_tutor_capacity(&mut tx, req.tutor_id).await?;
                // the counter-proposal becomes the schedule
                let updated = sqlx::query_as::<_, InterviewRequest>(
                    r#"
                    UPDATE interview_requests
                    SET state = $1,
                        proposed_date = suggested_date,
                        proposed_time = suggested_time,
                        suggested_date = NULL,
                        suggested_time = NULL,
                        validated_at = NOW(),
                        hr_comment = $2,
                        updated_at = NOW()
                    WHERE id = $3
                    RETURNING *
                    "#,
                )
                .bind(next)
                .bind(&payload.comment)
                .bind(request_id)
                .fetch_one(&mut *tx)
                .await?;

                let app = ApplicationService::set_status_on(
                    &mut tx,
                    req.application_id,
                    ApplicationStatus::InterviewScheduled,
                )
                .await?;

                let event = NewNotificationEvent::new(
                    EventKind::InterviewValidated,
                    json!({
                        "tutor_id": updated.tutor_id.to_string(),
                        "hr_id": updated.hr_id.to_string(),
                        "candidate_email": app.candidate_email,
                        "date": updated.proposed_date.to_string(),
                        "time": updated.proposed_time.format("%H:%M").to_string(),
                        "location": updated.location,
                    }),
                )
                .source(hr.id)
                .company(updated.company_id)
                .application(updated.application_id)
                .interview_request(updated.id);
                NotificationService::submit_on(&mut tx, &event).await?;
                updated
            }
            HrAction::Reject => {
                let updated = close_request(
                    &mut tx,
                    request_id,
                    next,
                    hr.id,
                    payload.comment.as_deref(),
                    false,
                )
                .await?;
                let comment = payload.comment.clone().unwrap_or_default();
                let event = reject_event(&mut tx, &updated, hr.id, &comment).await?;
                NotificationService::submit_on(&mut tx, &event).await?;
                updated
            }
        };

        tx.commit().await?;
        tracing::info!(request_id = %request_id, action = ?payload.action, state = ?updated.state,
            "hr resolved counter-proposal");
        Ok(updated)
    }

    pub async fn cancel(&self, request_id: Uuid, hr: &ActorInfo) -> Result<InterviewRequest> {
        with_retry(|| self.finalise_once(request_id, hr, InterviewOp::Cancel)).await
    }

    pub async fn mark_completed(
        &self,
        request_id: Uuid,
        hr: &ActorInfo,
    ) -> Result<InterviewRequest> {
        with_retry(|| self.finalise_once(request_id, hr, InterviewOp::MarkCompleted)).await
    }

    pub async fn mark_no_show(
        &self,
        request_id: Uuid,
        hr: &ActorInfo,
    ) -> Result<InterviewRequest> {
        with_retry(|| self.finalise_once(request_id, hr, InterviewOp::MarkNoShow)).await
    }

    async fn finalise_once(
        &self,
        request_id: Uuid,
        hr: &ActorInfo,
        op: InterviewOp,
    ) -> Result<InterviewRequest> {
        require_hr(hr)?;

        let mut tx = self.pool.begin().await?;
        let req = lock_request(&mut tx, request_id).await?;
        require_scope(hr, req.company_id)?;

        let next = req.state.apply(op).ok_or_else(|| Error::InvalidState {
            current: req.state.as_str().to_string(),
            operation: op.as_str().to_string(),
        })?;

        if matches!(op, InterviewOp::MarkCompleted | InterviewOp::MarkNoShow) {
            let scheduled = req.proposed_date.and_time(req.proposed_time);
            if time::now().naive_utc() <= scheduled {
                return Err(Error::InvalidState {
                    current: req.state.as_str().to_string(),
                    operation: format!("{} before the scheduled date", op.as_str()),
                });
            }
        }

        let updated = close_request(&mut tx, request_id, next, hr.id, None, false).await?;
        tx.commit().await?;
        tracing::info!(request_id = %request_id, op = op.as_str(), state = ?updated.state,
            "interview request finalised");
        Ok(updated)
    }

    /// Cancels any non-terminal request of an application inside the caller's
    /// transaction. Used when the parent application is withdrawn so no
    /// orphaned coordination is left behind.
    pub async fn cancel_active_on(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        application_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Option<InterviewRequest>> {
        let updated = sqlx::query_as::<_, InterviewRequest>(
            r#"
            UPDATE interview_requests
            SET state = 'CANCELLED', closed_by = $1, closed_at = NOW(), updated_at = NOW()
            WHERE application_id = $2
              AND state IN ('PROPOSED', 'VALIDATED', 'REVISION_REQUESTED')
            RETURNING *
            "#,
        )
        .bind(actor_id)
        .bind(application_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(updated)
    }

    /// Detail view for the participants: the selected tutor, or HR/admin
    /// within scope.
    pub async fn get(&self, request_id: Uuid, actor: &ActorInfo) -> Result<InterviewRequest> {
        let req = sqlx::query_as::<_, InterviewRequest>(
            r#"SELECT * FROM interview_requests WHERE id = $1"#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Interview request {} not found", request_id)))?;

        if actor.id != req.tutor_id {
            require_hr(actor)?;
            require_scope(actor, req.company_id)?;
        }
        Ok(req)
    }

    /// Tutor picker for the HR proposing an interview: active tutors of the
    /// application's company with their live load.
    pub async fn available_tutors(
        &self,
        application_id: Uuid,
        hr: &ActorInfo,
    ) -> Result<Vec<AvailableTutor>> {
        require_hr(hr)?;

        let app = sqlx::query_as::<_, Application>(
            r#"SELECT * FROM applications WHERE id = $1"#,
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Application {} not found", application_id)))?;
        require_scope(hr, app.company_id.unwrap_or_default())?;

        let company_id = app
            .company_id
            .ok_or_else(|| Error::Internal("Application has no company".to_string()))?;
        let max_load = crate::config::get_config().max_tutor_load;

        let rows = sqlx::query(
            r#"
            SELECT a.id, a.display_name, a.department, COALESCE(l.load, 0) AS current_load
            FROM actors a
            LEFT JOIN (
                SELECT tutor_id, COUNT(*) AS load
                FROM interview_requests
                WHERE state = 'VALIDATED'
                GROUP BY tutor_id
            ) l ON l.tutor_id = a.id
            WHERE a.role = 'TUTOR' AND a.is_active AND a.company_id = $1
            ORDER BY a.display_name
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let current_load: i64 = row.try_get("current_load")?;
                Ok(AvailableTutor {
                    tutor_id: row.try_get("id")?,
                    display_name: row.try_get("display_name")?,
                    department: row.try_get("department")?,
                    current_load,
                    max_load,
                    available: current_load < max_load,
                })
            })
            .collect()
    }
}

fn require_hr(actor: &ActorInfo) -> Result<()> {
    if !matches!(actor.role, ActorRole::Hr | ActorRole::Admin) {
        return Err(Error::Unauthorized(
            "Only HR or admin may perform this operation".to_string(),
        ));
    }
    Ok(())
}

fn require_scope(actor: &ActorInfo, company_id: Uuid) -> Result<()> {
    let scope = actor
        .company_scope()
        .ok_or_else(|| Error::Unauthorized("No tenant scope".to_string()))?;
    if !scope.covers(Some(company_id)) {
        return Err(Error::Unauthorized(
            "Resource is outside your company scope".to_string(),
        ));
    }
    Ok(())
}

async fn lock_request(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    request_id: Uuid,
) -> Result<InterviewRequest> {
    let req = sqlx::query_as::<_, InterviewRequest>(
        r#"SELECT * FROM interview_requests WHERE id = $1 FOR UPDATE"#,
    )
    .bind(request_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Interview request {} not found", request_id)))?;
    Ok(req)
}

async fn close_request(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    request_id: Uuid,
    next: InterviewState,
    closed_by: Uuid,
    tutor_comment: Option<&str>,
    is_tutor: bool,
) -> Result<InterviewRequest> {
    let updated = sqlx::query_as::<_, InterviewRequest>(
        r#"
        UPDATE interview_requests
        SET state = $1,
            closed_by = $2,
            closed_at = NOW(),
            tutor_comment = CASE WHEN $5 THEN COALESCE($3, tutor_comment) ELSE tutor_comment END,
            hr_comment = CASE WHEN $5 THEN hr_comment ELSE COALESCE($3, hr_comment) END,
            updated_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(next)
    .bind(closed_by)
    .bind(tutor_comment)
    .bind(request_id)
    .bind(is_tutor)
    .fetch_one(&mut **tx)
    .await?;
    Ok(updated)
}

async fn reject_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    request: &InterviewRequest,
    source: Uuid,
    comment: &str,
) -> Result<NewNotificationEvent> {
    let candidate_email: String =
        sqlx::query(r#"SELECT candidate_email FROM applications WHERE id = $1"#)
            .bind(request.application_id)
            .fetch_one(&mut **tx)
            .await?
            .try_get("candidate_email")?;

    Ok(NewNotificationEvent::new(
        EventKind::InterviewRejected,
        json!({
            "hr_id": request.hr_id.to_string(),
            "candidate_email": candidate_email,
            "comment": comment,
        }),
    )
    .source(source)
    .company(request.company_id)
    .application(request.application_id)
    .interview_request(request.id))
}

