use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "interview_state", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewState {
    Proposed,
    Validated,
    RevisionRequested,
    Rejected,
    Cancelled,
    Completed,
    NoShow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "interview_mode", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewMode {
    InPerson,
    Video,
}

/// Every mutation the state machine accepts, used to drive the transition
/// table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewOp {
    TutorAccept,
    TutorReject,
    TutorProposeNewTime,
    HrAccept,
    HrReject,
    Cancel,
    MarkCompleted,
    MarkNoShow,
}

impl InterviewOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewOp::TutorAccept => "tutor accept",
            InterviewOp::TutorReject => "tutor reject",
            InterviewOp::TutorProposeNewTime => "tutor counter-proposal",
            InterviewOp::HrAccept => "hr accept",
            InterviewOp::HrReject => "hr reject",
            InterviewOp::Cancel => "cancel",
            InterviewOp::MarkCompleted => "mark completed",
            InterviewOp::MarkNoShow => "mark no-show",
        }
    }
}

impl InterviewState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InterviewState::Rejected
                | InterviewState::Cancelled
                | InterviewState::Completed
                | InterviewState::NoShow
        )
    }

    /// Target state for `op` from `self`, or None if the transition is not in
    /// the table.
    pub fn apply(&self, op: InterviewOp) -> Option<InterviewState> {
        use InterviewOp::*;
        use InterviewState::*;
        match (self, op) {
            (Proposed, TutorAccept) => Some(Validated),
            (Proposed, TutorReject) => Some(Rejected),
            (Proposed, TutorProposeNewTime) => Some(RevisionRequested),
            (Proposed, Cancel) => Some(Cancelled),
            (RevisionRequested, HrAccept) => Some(Validated),
            (RevisionRequested, HrReject) => Some(Rejected),
            (RevisionRequested, Cancel) => Some(Cancelled),
            (Validated, MarkCompleted) => Some(Completed),
            (Validated, MarkNoShow) => Some(NoShow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewState::Proposed => "PROPOSED",
            InterviewState::Validated => "VALIDATED",
            InterviewState::RevisionRequested => "REVISION_REQUESTED",
            InterviewState::Rejected => "REJECTED",
            InterviewState::Cancelled => "CANCELLED",
            InterviewState::Completed => "COMPLETED",
            InterviewState::NoShow => "NO_SHOW",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewRequest {
    pub id: Uuid,
    pub application_id: Uuid,
    pub tutor_id: Uuid,
    pub hr_id: Uuid,
    pub company_id: Uuid,
    pub proposed_date: NaiveDate,
    pub proposed_time: NaiveTime,
    pub location: String,
    pub mode: InterviewMode,
    pub meeting_link: Option<String>,
    pub state: InterviewState,
    pub suggested_date: Option<NaiveDate>,
    pub suggested_time: Option<NaiveTime>,
    pub tutor_comment: Option<String>,
    pub hr_comment: Option<String>,
    pub closed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::InterviewOp::*;
    use super::InterviewState::*;
    use super::*;

    #[test]
    fn proposed_transitions() {
        assert_eq!(Proposed.apply(TutorAccept), Some(Validated));
        assert_eq!(Proposed.apply(TutorReject), Some(Rejected));
        assert_eq!(Proposed.apply(TutorProposeNewTime), Some(RevisionRequested));
        assert_eq!(Proposed.apply(Cancel), Some(Cancelled));
        assert_eq!(Proposed.apply(HrAccept), None);
        assert_eq!(Proposed.apply(MarkCompleted), None);
    }

    #[test]
    fn revision_requested_transitions() {
        assert_eq!(RevisionRequested.apply(HrAccept), Some(Validated));
        assert_eq!(RevisionRequested.apply(HrReject), Some(Rejected));
        assert_eq!(RevisionRequested.apply(Cancel), Some(Cancelled));
        assert_eq!(RevisionRequested.apply(TutorAccept), None);
        assert_eq!(RevisionRequested.apply(TutorProposeNewTime), None);
    }

    #[test]
    fn validated_transitions() {
        assert_eq!(Validated.apply(MarkCompleted), Some(Completed));
        assert_eq!(Validated.apply(MarkNoShow), Some(NoShow));
        assert_eq!(Validated.apply(Cancel), None);
        assert_eq!(Validated.apply(TutorAccept), None);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for state in [Rejected, Cancelled, Completed, NoShow] {
            assert!(state.is_terminal());
            for op in [
                TutorAccept,
                TutorReject,
                TutorProposeNewTime,
                HrAccept,
                HrReject,
                Cancel,
                MarkCompleted,
                MarkNoShow,
            ] {
                assert_eq!(state.apply(op), None, "{:?} should refuse {:?}", state, op);
            }
        }
    }

    #[test]
    fn state_wire_format_is_screaming_snake() {
        let json = serde_json::to_string(&RevisionRequested).unwrap();
        assert_eq!(json, "\"REVISION_REQUESTED\"");
        assert!(serde_json::from_str::<InterviewState>("\"WAITING\"").is_err());
    }
}
