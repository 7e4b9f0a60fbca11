use crate::models::actor::ActorRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ApplicationCreated,
    ApplicationApproved,
    ApplicationRejected,
    InterviewProposed,
    InterviewValidated,
    InterviewRejected,
    InterviewRevisionRequested,
    TutorAssigned,
    DocumentUploaded,
    SystemBroadcast,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub payload: JsonValue,
    pub source_actor_id: Option<Uuid>,
    pub explicit_target_ids: Vec<Uuid>,
    pub target_roles: Vec<ActorRole>,
    pub company_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub interview_request_id: Option<Uuid>,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// An event as handed to the bus by a producer, before it gets an id.
#[derive(Debug, Clone)]
pub struct NewNotificationEvent {
    pub kind: EventKind,
    pub payload: JsonValue,
    pub source_actor_id: Option<Uuid>,
    pub explicit_target_ids: Vec<Uuid>,
    pub target_roles: Vec<ActorRole>,
    pub company_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub interview_request_id: Option<Uuid>,
}

impl NewNotificationEvent {
    pub fn new(kind: EventKind, payload: JsonValue) -> Self {
        Self {
            kind,
            payload,
            source_actor_id: None,
            explicit_target_ids: Vec::new(),
            target_roles: Vec::new(),
            company_id: None,
            application_id: None,
            interview_request_id: None,
        }
    }

    pub fn source(mut self, actor_id: Uuid) -> Self {
        self.source_actor_id = Some(actor_id);
        self
    }

    pub fn company(mut self, company_id: Uuid) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn application(mut self, application_id: Uuid) -> Self {
        self.application_id = Some(application_id);
        self
    }

    pub fn interview_request(mut self, request_id: Uuid) -> Self {
        self.interview_request_id = Some(request_id);
        self
    }

    pub fn targets(mut self, ids: Vec<Uuid>) -> Self {
        self.explicit_target_ids = ids;
        self
    }

    pub fn roles(mut self, roles: Vec<ActorRole>) -> Self {
        self.target_roles = roles;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub event_id: Uuid,
    pub recipient_id: Uuid,
    pub kind: EventKind,
    pub title: String,
    pub body: String,
    pub application_id: Option<Uuid>,
    pub interview_request_id: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationTemplate {
    pub id: Uuid,
    pub kind: EventKind,
    pub locale: String,
    pub title_template: String,
    pub body_template: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
