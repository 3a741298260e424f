use chrono::Utc;
use rocket_db_pools::sqlx::postgres::PgRow;
use rocket_db_pools::sqlx::{self, PgPool, Row};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::auth::roles::Role;
use crate::models::{
    Appointment, AppointmentInput, AppointmentStatus, AppointmentUpdate, AuditLog, AuditLogInput,
    AuditLogUpdate, Doctor, DoctorInput, DoctorUpdate, MedicalRecord, MedicalRecordInput,
    MedicalRecordUpdate, NewUser, Patient, PatientInput, PatientUpdate, Prescription,
    PrescriptionInput, PrescriptionUpdate, User,
};
use crate::store::{
    AppointmentRepository, AuditLogRepository, DoctorRepository, MedicalRecordRepository,
    PatientRepository, PrescriptionRepository, StoreError, StoreResult, UserRepository,
};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, created_at, updated_at";
const PATIENT_COLUMNS: &str = "id, user_id, cpf, date_birth, phone, address, created_at";
const DOCTOR_COLUMNS: &str = "id, user_id, crm, specialty, created_at";
const APPOINTMENT_COLUMNS: &str =
    "id, patient_id, doctor_id, appointment_date, status, notes, created_at, updated_at";
const PRESCRIPTION_COLUMNS: &str =
    "id, patient_id, doctor_id, medical_record_id, medication_details, created_at";
const MEDICAL_RECORD_COLUMNS: &str =
    "id, patient_id, doctor_id, diagnosis, treatment, created_at";
const AUDIT_LOG_COLUMNS: &str = "id, user_id, action, description, created_at";

/// Repositories backed by the `clinic_db` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role
            .parse::<Role>()
            .map_err(|err| StoreError::Corrupt(err.to_string()))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn appointment_from_row(row: &PgRow) -> StoreResult<Appointment> {
    let status: String = row.try_get("status")?;
    Ok(Appointment {
        id: row.try_get("id")?,
        patient_id: row.try_get("patient_id")?,
        doctor_id: row.try_get("doctor_id")?,
        appointment_date: row.try_get("appointment_date")?,
        status: status
            .parse::<AppointmentStatus>()
            .map_err(StoreError::Corrupt)?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn deleted(result: sqlx::postgres::PgQueryResult, what: &'static str) -> StoreResult<()> {
    if result.rows_affected() == 0 {
        Err(StoreError::NotFound(what))
    } else {
        Ok(())
    }
}

#[rocket::async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        user_from_row(&row)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[rocket::async_trait]
impl PatientRepository for PgStore {
    async fn create_patient(&self, input: PatientInput) -> StoreResult<Patient> {
        let patient = sqlx::query_as::<_, Patient>(&format!(
            "INSERT INTO patients (id, user_id, cpf, date_birth, phone, address) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PATIENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.cpf)
        .bind(input.date_birth)
        .bind(&input.phone)
        .bind(&input.address)
        .fetch_one(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn list_patients(&self) -> StoreResult<Vec<Patient>> {
        let patients = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(patients)
    }

    async fn find_patient(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        let patient = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn find_patient_by_user(&self, user_id: Uuid) -> StoreResult<Option<Patient>> {
        let patient = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE user_id = $1 ORDER BY created_at LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn list_patients_by_doctor(&self, doctor_id: Uuid) -> StoreResult<Vec<Patient>> {
        let patients = sqlx::query_as::<_, Patient>(
            r#"SELECT p.id, p.user_id, p.cpf, p.date_birth, p.phone, p.address, p.created_at
               FROM patients p
               WHERE EXISTS (
                   SELECT 1 FROM appointments a
                   WHERE a.patient_id = p.id AND a.doctor_id = $1
               )
               ORDER BY p.created_at, p.id"#,
        )
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(patients)
    }

    async fn update_patient(&self, id: Uuid, update: PatientUpdate) -> StoreResult<Patient> {
        sqlx::query_as::<_, Patient>(&format!(
            "UPDATE patients SET \
                 cpf = COALESCE($2, cpf), \
                 date_birth = COALESCE($3, date_birth), \
                 phone = COALESCE($4, phone), \
                 address = COALESCE($5, address) \
             WHERE id = $1 RETURNING {PATIENT_COLUMNS}"
        ))
        .bind(id)
        .bind(update.cpf)
        .bind(update.date_birth)
        .bind(update.phone)
        .bind(update.address)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("patient"))
    }

    async fn delete_patient(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        deleted(result, "patient")
    }
}

#[rocket::async_trait]
impl DoctorRepository for PgStore {
    async fn create_doctor(&self, input: DoctorInput) -> StoreResult<Doctor> {
        let doctor = sqlx::query_as::<_, Doctor>(&format!(
            "INSERT INTO doctors (id, user_id, crm, specialty) \
             VALUES ($1, $2, $3, $4) RETURNING {DOCTOR_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.crm)
        .bind(&input.specialty)
        .fetch_one(&self.pool)
        .await?;
        Ok(doctor)
    }

    async fn list_doctors(&self) -> StoreResult<Vec<Doctor>> {
        let doctors = sqlx::query_as::<_, Doctor>(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(doctors)
    }

    async fn find_doctor(&self, id: Uuid) -> StoreResult<Option<Doctor>> {
        let doctor = sqlx::query_as::<_, Doctor>(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doctor)
    }

    async fn find_doctor_by_user(&self, user_id: Uuid) -> StoreResult<Option<Doctor>> {
        let doctor = sqlx::query_as::<_, Doctor>(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors WHERE user_id = $1 ORDER BY created_at LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doctor)
    }

    async fn update_doctor(&self, id: Uuid, update: DoctorUpdate) -> StoreResult<Doctor> {
        sqlx::query_as::<_, Doctor>(&format!(
            "UPDATE doctors SET crm = COALESCE($2, crm), specialty = COALESCE($3, specialty) \
             WHERE id = $1 RETURNING {DOCTOR_COLUMNS}"
        ))
        .bind(id)
        .bind(update.crm)
        .bind(update.specialty)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("doctor"))
    }

    async fn delete_doctor(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM doctors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        deleted(result, "doctor")
    }
}

#[rocket::async_trait]
impl AppointmentRepository for PgStore {
    async fn create_appointment(&self, input: AppointmentInput) -> StoreResult<Appointment> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO appointments \
                 (id, patient_id, doctor_id, appointment_date, status, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING {APPOINTMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.patient_id)
        .bind(input.doctor_id)
        .bind(input.appointment_date)
        .bind(input.status.as_str())
        .bind(&input.notes)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        appointment_from_row(&row)
    }

    async fn list_appointments(&self) -> StoreResult<Vec<Appointment>> {
        let rows = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY appointment_date, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(appointment_from_row).collect()
    }

    async fn find_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        let row = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(appointment_from_row).transpose()
    }

    async fn list_appointments_by_patient(
        &self,
        patient_id: Uuid,
    ) -> StoreResult<Vec<Appointment>> {
        let rows = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
             WHERE patient_id = $1 ORDER BY appointment_date, id"
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(appointment_from_row).collect()
    }

    async fn list_appointments_by_doctor(&self, doctor_id: Uuid) -> StoreResult<Vec<Appointment>> {
        let rows = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
             WHERE doctor_id = $1 ORDER BY appointment_date, id"
        ))
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(appointment_from_row).collect()
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> StoreResult<Appointment> {
        let row = sqlx::query(&format!(
            "UPDATE appointments SET \
                 appointment_date = COALESCE($2, appointment_date), \
                 status = COALESCE($3, status), \
                 notes = COALESCE($4, notes), \
                 updated_at = $5 \
             WHERE id = $1 RETURNING {APPOINTMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(update.appointment_date)
        .bind(update.status.map(|status| status.as_str()))
        .bind(update.notes)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("appointment"))?;
        appointment_from_row(&row)
    }

    async fn delete_appointment(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        deleted(result, "appointment")
    }
}

#[rocket::async_trait]
impl PrescriptionRepository for PgStore {
    async fn create_prescription(&self, input: PrescriptionInput) -> StoreResult<Prescription> {
        let prescription = sqlx::query_as::<_, Prescription>(&format!(
            "INSERT INTO prescriptions \
                 (id, patient_id, doctor_id, medical_record_id, medication_details) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PRESCRIPTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.patient_id)
        .bind(input.doctor_id)
        .bind(input.medical_record_id)
        .bind(&input.medication_details)
        .fetch_one(&self.pool)
        .await?;
        Ok(prescription)
    }

    async fn list_prescriptions(&self) -> StoreResult<Vec<Prescription>> {
        let prescriptions = sqlx::query_as::<_, Prescription>(&format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(prescriptions)
    }

    async fn find_prescription(&self, id: Uuid) -> StoreResult<Option<Prescription>> {
        let prescription = sqlx::query_as::<_, Prescription>(&format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(prescription)
    }

    async fn update_prescription(
        &self,
        id: Uuid,
        update: PrescriptionUpdate,
    ) -> StoreResult<Prescription> {
        sqlx::query_as::<_, Prescription>(&format!(
            "UPDATE prescriptions SET medication_details = COALESCE($2, medication_details) \
             WHERE id = $1 RETURNING {PRESCRIPTION_COLUMNS}"
        ))
        .bind(id)
        .bind(update.medication_details)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("prescription"))
    }

    async fn delete_prescription(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM prescriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        deleted(result, "prescription")
    }
}

#[rocket::async_trait]
impl MedicalRecordRepository for PgStore {
    async fn create_medical_record(&self, input: MedicalRecordInput) -> StoreResult<MedicalRecord> {
        let record = sqlx::query_as::<_, MedicalRecord>(&format!(
            "INSERT INTO medical_records (id, patient_id, doctor_id, diagnosis, treatment) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {MEDICAL_RECORD_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.patient_id)
        .bind(input.doctor_id)
        .bind(&input.diagnosis)
        .bind(&input.treatment)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_medical_records(&self) -> StoreResult<Vec<MedicalRecord>> {
        let records = sqlx::query_as::<_, MedicalRecord>(&format!(
            "SELECT {MEDICAL_RECORD_COLUMNS} FROM medical_records ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn find_medical_record(&self, id: Uuid) -> StoreResult<Option<MedicalRecord>> {
        let record = sqlx::query_as::<_, MedicalRecord>(&format!(
            "SELECT {MEDICAL_RECORD_COLUMNS} FROM medical_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_medical_records_by_doctor(
        &self,
        doctor_id: Uuid,
    ) -> StoreResult<Vec<MedicalRecord>> {
        let records = sqlx::query_as::<_, MedicalRecord>(&format!(
            "SELECT {MEDICAL_RECORD_COLUMNS} FROM medical_records \
             WHERE doctor_id = $1 ORDER BY created_at, id"
        ))
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn update_medical_record(
        &self,
        id: Uuid,
        update: MedicalRecordUpdate,
    ) -> StoreResult<MedicalRecord> {
        sqlx::query_as::<_, MedicalRecord>(&format!(
            "UPDATE medical_records SET \
                 diagnosis = COALESCE($2, diagnosis), \
                 treatment = COALESCE($3, treatment) \
             WHERE id = $1 RETURNING {MEDICAL_RECORD_COLUMNS}"
        ))
        .bind(id)
        .bind(update.diagnosis)
        .bind(update.treatment)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("medical record"))
    }

    async fn delete_medical_record(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM medical_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        deleted(result, "medical record")
    }
}

#[rocket::async_trait]
impl AuditLogRepository for PgStore {
    async fn create_audit_log(&self, input: AuditLogInput) -> StoreResult<AuditLog> {
        let log = sqlx::query_as::<_, AuditLog>(&format!(
            "INSERT INTO audit_logs (id, user_id, action, description) \
             VALUES ($1, $2, $3, $4) RETURNING {AUDIT_LOG_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.user_id.unwrap_or_else(Uuid::nil))
        .bind(&input.action)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(log)
    }

    async fn list_audit_logs(&self) -> StoreResult<Vec<AuditLog>> {
        let logs = sqlx::query_as::<_, AuditLog>(&format!(
            "SELECT {AUDIT_LOG_COLUMNS} FROM audit_logs ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    async fn find_audit_log(&self, id: Uuid) -> StoreResult<Option<AuditLog>> {
        let log = sqlx::query_as::<_, AuditLog>(&format!(
            "SELECT {AUDIT_LOG_COLUMNS} FROM audit_logs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(log)
    }

    async fn update_audit_log(&self, id: Uuid, update: AuditLogUpdate) -> StoreResult<AuditLog> {
        sqlx::query_as::<_, AuditLog>(&format!(
            "UPDATE audit_logs SET \
                 action = COALESCE($2, action), \
                 description = COALESCE($3, description) \
             WHERE id = $1 RETURNING {AUDIT_LOG_COLUMNS}"
        ))
        .bind(id)
        .bind(update.action)
        .bind(update.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("audit log"))
    }

    async fn delete_audit_log(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        deleted(result, "audit log")
    }
}

#[rocket::async_trait]
impl AuditSink for PgStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, user_id, action, description, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(event.actor)
        .bind(&event.action)
        .bind(&event.description)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
