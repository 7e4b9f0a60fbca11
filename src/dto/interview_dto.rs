use crate::models::interview::InterviewMode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ProposeInterviewPayload {
    pub tutor_id: Uuid,
    /// YYYY-MM-DD
    pub date: String,
    /// HH:MM
    pub time: String,
    #[validate(length(min = 1, max = 300))]
    pub location: String,
    pub mode: InterviewMode,
    pub meeting_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TutorAction {
    Accept,
    Reject,
    ProposeNewTime,
}

#[derive(Debug, Deserialize)]
pub struct TutorRespondPayload {
    pub action: TutorAction,
    pub comment: Option<String>,
    /// YYYY-MM-DD, required for propose_new_time
    pub suggested_date: Option<String>,
    /// HH:MM, required for propose_new_time
    pub suggested_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HrAction {
    Accept,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct HrRespondPayload {
    pub action: HrAction,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvailableTutor {
    pub tutor_id: Uuid,
    pub display_name: String,
    pub department: Option<String>,
    pub current_load: i64,
    pub max_load: i64,
    pub available: bool,
}
