//! Service layer: record sync, school users, AI insights, persistence.

pub mod insights;
pub mod persistence;
pub mod record;
pub mod user;
