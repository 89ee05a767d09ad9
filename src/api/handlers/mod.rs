pub mod academic;
pub mod admin;
pub mod attendance;
pub mod auth;
pub mod core;
pub mod finance;
pub mod grades;
pub mod hr;
pub mod notifications;
pub mod search;
pub mod uploads;
