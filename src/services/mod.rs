pub mod application_service;
pub mod identity_service;
pub mod interview_service;
pub mod notification_service;
pub mod outbox_service;
pub mod push_hub;
