use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "application_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    InterviewScheduled,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub id: Uuid,
    pub candidate_email: String,
    pub candidate_name: String,
    pub candidate_phone: Option<String>,
    pub company_id: Option<Uuid>,
    pub status: ApplicationStatus,
    pub is_binome: bool,
    pub binome_last_name: Option<String>,
    pub binome_first_name: Option<String>,
    pub binome_email: Option<String>,
    pub binome_phone: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
