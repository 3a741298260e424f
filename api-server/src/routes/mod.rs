//! HTTP route handlers grouped by resource.
//!
//! Every handler behind [`crate::auth::Authorized`] is covered by the
//! access-policy table; handlers only add ownership checks on top of it.

pub mod appointments;
pub mod audit_logs;
pub mod doctors;
pub mod health;
pub(crate) mod helpers;
pub mod medical_records;
pub mod patients;
pub mod prescriptions;
