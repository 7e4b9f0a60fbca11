pub mod actor;
pub mod application;
pub mod interview;
pub mod notification;
pub mod outbox;
