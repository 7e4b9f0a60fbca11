pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    application_service::ApplicationService, identity_service::IdentityService,
    interview_service::InterviewService, notification_service::NotificationService,
    push_hub::PushHub,
};
use sqlx::PgPool;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub identity_service: IdentityService,
    pub application_service: ApplicationService,
    pub interview_service: InterviewService,
    pub notification_service: NotificationService,
    pub push_hub: PushHub,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let push_hub = PushHub::new(
            config.push_send_buffer,
            Duration::from_secs(config.heartbeat_interval_seconds),
        );

        let identity_service = IdentityService::new(pool.clone());
        let application_service = ApplicationService::new(pool.clone());
        let interview_service = InterviewService::new(pool.clone(), identity_service.clone());
        let notification_service = NotificationService::new(pool.clone(), push_hub.clone());

        Self {
            pool,
            identity_service,
            application_service,
            interview_service,
            notification_service,
            push_hub,
        }
    }
}
