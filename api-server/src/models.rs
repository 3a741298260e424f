use chrono::{DateTime, NaiveDate, Utc};
use rocket_db_pools::sqlx::FromRow;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::roles::Role;

// ===== Accounts =====

/// Stored credential record. Never serialized: the hash stays server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Public view of an account.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct UserProfile {
    #[schemars(with = "String")]
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    /// Patient record owned by this account, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub patient_id: Option<Uuid>,
    /// Doctor profile owned by this account, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub doctor_id: Option<Uuid>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
            patient_id: None,
            doctor_id: None,
        }
    }
}

// ===== Patients =====

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, FromRow, PartialEq)]
pub struct Patient {
    #[schemars(with = "String")]
    pub id: Uuid,
    #[schemars(with = "String")]
    pub user_id: Uuid,
    pub cpf: String,
    pub date_birth: NaiveDate,
    pub phone: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatientInput {
    #[schemars(with = "String")]
    pub user_id: Uuid,
    pub cpf: String,
    pub date_birth: NaiveDate,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PatientUpdate {
    pub cpf: Option<String>,
    pub date_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

// ===== Doctors =====

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, FromRow, PartialEq)]
pub struct Doctor {
    #[schemars(with = "String")]
    pub id: Uuid,
    #[schemars(with = "String")]
    pub user_id: Uuid,
    pub crm: String,
    pub specialty: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DoctorInput {
    #[schemars(with = "String")]
    pub user_id: Uuid,
    pub crm: String,
    pub specialty: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DoctorUpdate {
    pub crm: Option<String>,
    pub specialty: Option<String>,
}

// ===== Appointments =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Canceled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "completed" => Ok(AppointmentStatus::Completed),
            "canceled" => Ok(AppointmentStatus::Canceled),
            other => Err(format!("unknown appointment status '{other}'")),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Appointment {
    #[schemars(with = "String")]
    pub id: Uuid,
    #[schemars(with = "String")]
    pub patient_id: Uuid,
    #[schemars(with = "String")]
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AppointmentInput {
    #[schemars(with = "String")]
    pub patient_id: Uuid,
    #[schemars(with = "String")]
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AppointmentUpdate {
    pub appointment_date: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

// ===== Clinical documents =====

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, FromRow, PartialEq)]
pub struct MedicalRecord {
    #[schemars(with = "String")]
    pub id: Uuid,
    #[schemars(with = "String")]
    pub patient_id: Uuid,
    #[schemars(with = "String")]
    pub doctor_id: Uuid,
    pub diagnosis: String,
    pub treatment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MedicalRecordInput {
    #[schemars(with = "String")]
    pub patient_id: Uuid,
    #[schemars(with = "String")]
    pub doctor_id: Uuid,
    pub diagnosis: String,
    pub treatment: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MedicalRecordUpdate {
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, FromRow, PartialEq)]
pub struct Prescription {
    #[schemars(with = "String")]
    pub id: Uuid,
    #[schemars(with = "String")]
    pub patient_id: Uuid,
    #[schemars(with = "String")]
    pub doctor_id: Uuid,
    #[schemars(with = "String")]
    pub medical_record_id: Uuid,
    pub medication_details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PrescriptionInput {
    #[schemars(with = "String")]
    pub patient_id: Uuid,
    #[schemars(with = "String")]
    pub doctor_id: Uuid,
    #[schemars(with = "String")]
    pub medical_record_id: Uuid,
    pub medication_details: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PrescriptionUpdate {
    pub medication_details: Option<String>,
}

// ===== Audit trail =====

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, FromRow, PartialEq)]
pub struct AuditLog {
    #[schemars(with = "String")]
    pub id: Uuid,
    /// Nil UUID when no authenticated actor was known.
    #[schemars(with = "String")]
    pub user_id: Uuid,
    pub action: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuditLogInput {
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub user_id: Option<Uuid>,
    pub action: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AuditLogUpdate {
    pub action: Option<String>,
    pub description: Option<String>,
}
