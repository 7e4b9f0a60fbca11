use crate::models::actor::ActorRole;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BroadcastPayload {
    pub message: String,
    #[serde(default = "default_level")]
    pub level: String,
    /// restrict to specific role groups; defaults to the admin/HR broadcast
    /// group when absent
    pub roles: Option<Vec<ActorRole>>,
    /// address specific actors instead of a role group
    pub target_ids: Option<Vec<uuid::Uuid>>,
}

fn default_level() -> String {
    "info".to_string()
}
