//! Persistence collaborators behind trait objects, plus the [`Store`] facade
//! that bounds every call with the configured context timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rocket_db_pools::sqlx;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::models::{
    Appointment, AppointmentInput, AppointmentUpdate, AuditLog, AuditLogInput, AuditLogUpdate,
    Doctor, DoctorInput, DoctorUpdate, MedicalRecord, MedicalRecordInput, MedicalRecordUpdate,
    NewUser, Patient, PatientInput, PatientUpdate, Prescription, PrescriptionInput,
    PrescriptionUpdate, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidReference(String),
    #[error("store call exceeded {0:?}")]
    Timeout(Duration),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let constraint = db.constraint().unwrap_or("unnamed constraint").to_string();
            match db.code().as_deref() {
                Some("23505") => {
                    return StoreError::Conflict(format!("duplicate value violates {constraint}"));
                }
                Some("23503") => {
                    return StoreError::InvalidReference(format!(
                        "referenced row does not exist ({constraint})"
                    ));
                }
                _ => {}
            }
        }

        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound("row");
        }
        if matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        ) {
            return StoreError::Unavailable(err.to_string());
        }
        StoreError::Database(err)
    }
}

#[rocket::async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the e-mail is already registered.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
}

#[rocket::async_trait]
pub trait PatientRepository: Send + Sync {
    async fn create_patient(&self, input: PatientInput) -> StoreResult<Patient>;
    async fn list_patients(&self) -> StoreResult<Vec<Patient>>;
    async fn find_patient(&self, id: Uuid) -> StoreResult<Option<Patient>>;
    async fn find_patient_by_user(&self, user_id: Uuid) -> StoreResult<Option<Patient>>;
    /// Patients with at least one appointment with the doctor.
    async fn list_patients_by_doctor(&self, doctor_id: Uuid) -> StoreResult<Vec<Patient>>;
    async fn update_patient(&self, id: Uuid, update: PatientUpdate) -> StoreResult<Patient>;
    async fn delete_patient(&self, id: Uuid) -> StoreResult<()>;
}

#[rocket::async_trait]
pub trait DoctorRepository: Send + Sync {
    async fn create_doctor(&self, input: DoctorInput) -> StoreResult<Doctor>;
    async fn list_doctors(&self) -> StoreResult<Vec<Doctor>>;
    async fn find_doctor(&self, id: Uuid) -> StoreResult<Option<Doctor>>;
    async fn find_doctor_by_user(&self, user_id: Uuid) -> StoreResult<Option<Doctor>>;
    async fn update_doctor(&self, id: Uuid, update: DoctorUpdate) -> StoreResult<Doctor>;
    async fn delete_doctor(&self, id: Uuid) -> StoreResult<()>;
}

#[rocket::async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn create_appointment(&self, input: AppointmentInput) -> StoreResult<Appointment>;
    async fn list_appointments(&self) -> StoreResult<Vec<Appointment>>;
    async fn find_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>>;
    async fn list_appointments_by_patient(
        &self,
        patient_id: Uuid,
    ) -> StoreResult<Vec<Appointment>>;
    async fn list_appointments_by_doctor(&self, doctor_id: Uuid) -> StoreResult<Vec<Appointment>>;
    async fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> StoreResult<Appointment>;
    async fn delete_appointment(&self, id: Uuid) -> StoreResult<()>;
}

#[rocket::async_trait]
pub trait PrescriptionRepository: Send + Sync {
    async fn create_prescription(&self, input: PrescriptionInput) -> StoreResult<Prescription>;
    async fn list_prescriptions(&self) -> StoreResult<Vec<Prescription>>;
    async fn find_prescription(&self, id: Uuid) -> StoreResult<Option<Prescription>>;
    async fn update_prescription(
        &self,
        id: Uuid,
        update: PrescriptionUpdate,
    ) -> StoreResult<Prescription>;
    async fn delete_prescription(&self, id: Uuid) -> StoreResult<()>;
}

#[rocket::async_trait]
pub trait MedicalRecordRepository: Send + Sync {
    async fn create_medical_record(&self, input: MedicalRecordInput) -> StoreResult<MedicalRecord>;
    async fn list_medical_records(&self) -> StoreResult<Vec<MedicalRecord>>;
    async fn find_medical_record(&self, id: Uuid) -> StoreResult<Option<MedicalRecord>>;
    async fn list_medical_records_by_doctor(
        &self,
        doctor_id: Uuid,
    ) -> StoreResult<Vec<MedicalRecord>>;
    async fn update_medical_record(
        &self,
        id: Uuid,
        update: MedicalRecordUpdate,
    ) -> StoreResult<MedicalRecord>;
    async fn delete_medical_record(&self, id: Uuid) -> StoreResult<()>;
}

#[rocket::async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn create_audit_log(&self, input: AuditLogInput) -> StoreResult<AuditLog>;
    /// Newest first.
    async fn list_audit_logs(&self) -> StoreResult<Vec<AuditLog>>;
    async fn find_audit_log(&self, id: Uuid) -> StoreResult<Option<AuditLog>>;
    async fn update_audit_log(&self, id: Uuid, update: AuditLogUpdate) -> StoreResult<AuditLog>;
    async fn delete_audit_log(&self, id: Uuid) -> StoreResult<()>;
}

/// A single backend able to serve every repository.
pub trait Backend:
    UserRepository
    + PatientRepository
    + DoctorRepository
    + AppointmentRepository
    + PrescriptionRepository
    + MedicalRecordRepository
    + AuditLogRepository
    + AuditSink
    + 'static
{
}

impl<T> Backend for T where
    T: UserRepository
        + PatientRepository
        + DoctorRepository
        + AppointmentRepository
        + PrescriptionRepository
        + MedicalRecordRepository
        + AuditLogRepository
        + AuditSink
        + 'static
{
}

/// Store configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Budget for a single store call made on behalf of a request.
    pub context_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            context_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        match lookup("CONTEXT_TIMEOUT") {
            None => Ok(Self::default()),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(|secs| Self {
                    context_timeout: Duration::from_secs(secs),
                })
                .ok_or_else(|| "CONTEXT_TIMEOUT must be a positive number of seconds".to_string()),
        }
    }
}

/// Repositories shared by all handlers.
#[derive(Clone)]
pub struct Store {
    timeout: Duration,
    pub users: Arc<dyn UserRepository>,
    pub patients: Arc<dyn PatientRepository>,
    pub doctors: Arc<dyn DoctorRepository>,
    pub appointments: Arc<dyn AppointmentRepository>,
    pub prescriptions: Arc<dyn PrescriptionRepository>,
    pub medical_records: Arc<dyn MedicalRecordRepository>,
    pub audit_logs: Arc<dyn AuditLogRepository>,
    audit_sink: Arc<dyn AuditSink>,
}

impl Store {
    pub fn from_backend<B: Backend>(backend: Arc<B>, config: StoreConfig) -> Self {
        Self {
            timeout: config.context_timeout,
            users: backend.clone(),
            patients: backend.clone(),
            doctors: backend.clone(),
            appointments: backend.clone(),
            prescriptions: backend.clone(),
            medical_records: backend.clone(),
            audit_logs: backend.clone(),
            audit_sink: backend,
        }
    }

    pub fn with_users(mut self, users: Arc<dyn UserRepository>) -> Self {
        self.users = users;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        self.audit_sink.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Await a store call within the context budget. Timeouts are never retried.
    pub async fn run<T, F>(&self, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("store call exceeded {:?}", self.timeout);
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}
