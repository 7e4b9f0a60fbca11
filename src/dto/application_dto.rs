use crate::models::application::ApplicationStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApplicationPayload {
    #[validate(length(min = 1, max = 200))]
    pub candidate_name: String,
    #[validate(email)]
    pub candidate_email: String,
    pub candidate_phone: Option<String>,
    #[validate(length(min = 1, max = 4, message = "between 1 and 4 offers"))]
    pub offer_ids: Vec<Uuid>,
    /// YYYY-MM-DD
    pub start_date: String,
    /// YYYY-MM-DD
    pub end_date: String,
    #[serde(default)]
    pub is_binome: bool,
    pub binome_last_name: Option<String>,
    pub binome_first_name: Option<String>,
    #[validate(email)]
    pub binome_email: Option<String>,
    pub binome_phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationFilters {
    pub status: Option<ApplicationStatus>,
    /// free-text match on candidate name or email
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetApplicationStatusPayload {
    pub status: ApplicationStatus,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationCreatedResponse {
    pub id: Uuid,
    pub status: ApplicationStatus,
    pub company_id: Option<Uuid>,
    /// total applications this candidate has on the platform, counted on read
    pub submission_count: i64,
}
