pub mod application_dto;
pub mod interview_dto;
pub mod notification_dto;
