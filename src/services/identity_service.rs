use crate::error::{Error, Result};
use crate::models::actor::{ActorInfo, CompanyScope};
use crate::models::interview::InterviewState;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct IdentityService {
    pool: PgPool,
}

impl IdentityService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn resolve(&self, actor_id: Uuid) -> Result<ActorInfo> {
        let row = sqlx::query(
            r#"SELECT id, role, company_id, is_active FROM actors WHERE id = $1"#,
        )
        .bind(actor_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Unknown actor {}", actor_id)))?;

        Ok(ActorInfo {
            id: row.try_get("id")?,
            role: row.try_get("role")?,
            company_id: row.try_get("company_id")?,
            active: row.try_get("is_active")?,
        })
    }

    /// Resolves and refuses inactive actors in one step; the common path for
    /// every authenticated operation.
    pub async fn resolve_active(&self, actor_id: Uuid) -> Result<ActorInfo> {
        let info = self.resolve(actor_id).await?;
        if !info.active {
            return Err(Error::Unauthorized(format!(
                "Actor {} is deactivated",
                actor_id
            )));
        }
        Ok(info)
    }

    /// Live count of VALIDATED interviews carried by a tutor. Always computed
    /// fresh; capacity checks pass the transaction's connection so the count
    /// is read under the same lock as the decision it guards.
    pub async fn current_tutor_load<'e>(
        &self,
        exec: impl sqlx::PgExecutor<'e>,
        tutor_id: Uuid,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS load FROM interview_requests
               WHERE tutor_id = $1 AND state = $2"#,
        )
        .bind(tutor_id)
        .bind(InterviewState::Validated)
        .fetch_one(exec)
        .await?;
        Ok(row.try_get("load")?)
    }

    pub fn company_scope(&self, actor: &ActorInfo) -> Result<CompanyScope> {
        actor.company_scope().ok_or_else(|| {
            Error::Unauthorized(format!("Actor {} has no tenant scope", actor.id))
        })
    }
}
