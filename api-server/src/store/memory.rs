//! In-process backend with the same constraints as the Postgres schema:
//! unique e-mail/CPF/CRM, foreign keys checked on insert, cascading deletes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::models::{
    Appointment, AppointmentInput, AppointmentUpdate, AuditLog, AuditLogInput, AuditLogUpdate,
    Doctor, DoctorInput, DoctorUpdate, MedicalRecord, MedicalRecordInput, MedicalRecordUpdate,
    NewUser, Patient, PatientInput, PatientUpdate, Prescription, PrescriptionInput,
    PrescriptionUpdate, User,
};
use crate::store::{
    AppointmentRepository, AuditLogRepository, DoctorRepository, MedicalRecordRepository,
    PatientRepository, PrescriptionRepository, StoreError, StoreResult, UserRepository,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    patients: HashMap<Uuid, Patient>,
    doctors: HashMap<Uuid, Doctor>,
    appointments: HashMap<Uuid, Appointment>,
    prescriptions: HashMap<Uuid, Prescription>,
    medical_records: HashMap<Uuid, MedicalRecord>,
    audit_logs: HashMap<Uuid, AuditLog>,
}

impl Tables {
    fn require_user(&self, id: Uuid) -> StoreResult<()> {
        require(self.users.contains_key(&id), "user", id)
    }

    fn require_patient(&self, id: Uuid) -> StoreResult<()> {
        require(self.patients.contains_key(&id), "patient", id)
    }

    fn require_doctor(&self, id: Uuid) -> StoreResult<()> {
        require(self.doctors.contains_key(&id), "doctor", id)
    }

    fn remove_patient_cascade(&mut self, id: Uuid) {
        self.appointments.retain(|_, a| a.patient_id != id);
        self.medical_records.retain(|_, r| r.patient_id != id);
        self.prescriptions.retain(|_, p| p.patient_id != id);
    }

    fn remove_doctor_cascade(&mut self, id: Uuid) {
        self.appointments.retain(|_, a| a.doctor_id != id);
        self.medical_records.retain(|_, r| r.doctor_id != id);
        self.prescriptions.retain(|_, p| p.doctor_id != id);
    }
}

fn require(present: bool, what: &str, id: Uuid) -> StoreResult<()> {
    if present {
        Ok(())
    } else {
        Err(StoreError::InvalidReference(format!(
            "referenced {what} {id} does not exist"
        )))
    }
}

fn sorted<T>(rows: impl Iterator<Item = T>, key: impl Fn(&T) -> (i64, Uuid)) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(key);
    rows
}

/// Shared in-memory tables. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored audit trail, oldest first.
    pub fn audit_trail(&self) -> Vec<AuditLog> {
        let tables = self.tables.read();
        sorted(tables.audit_logs.values().cloned(), |l| {
            (l.created_at.timestamp_micros(), l.id)
        })
    }
}

#[rocket::async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write();
        if tables
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict("duplicate value violates users_email_lower_idx".into()));
        }
        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read();
        Ok(tables
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }
}

#[rocket::async_trait]
impl PatientRepository for MemoryStore {
    async fn create_patient(&self, input: PatientInput) -> StoreResult<Patient> {
        let mut tables = self.tables.write();
        tables.require_user(input.user_id)?;
        if tables.patients.values().any(|p| p.cpf == input.cpf) {
            return Err(StoreError::Conflict("duplicate value violates patients_cpf_key".into()));
        }
        let patient = Patient {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            cpf: input.cpf,
            date_birth: input.date_birth,
            phone: input.phone,
            address: input.address,
            created_at: Utc::now(),
        };
        tables.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn list_patients(&self) -> StoreResult<Vec<Patient>> {
        let tables = self.tables.read();
        Ok(sorted(tables.patients.values().cloned(), |p| {
            (p.created_at.timestamp_micros(), p.id)
        }))
    }

    async fn find_patient(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        Ok(self.tables.read().patients.get(&id).cloned())
    }

    async fn find_patient_by_user(&self, user_id: Uuid) -> StoreResult<Option<Patient>> {
        let tables = self.tables.read();
        Ok(tables
            .patients
            .values()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn list_patients_by_doctor(&self, doctor_id: Uuid) -> StoreResult<Vec<Patient>> {
        let tables = self.tables.read();
        let seen: Vec<Uuid> = tables
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id)
            .map(|a| a.patient_id)
            .collect();
        Ok(sorted(
            tables
                .patients
                .values()
                .filter(|p| seen.contains(&p.id))
                .cloned(),
            |p| (p.created_at.timestamp_micros(), p.id),
        ))
    }

    async fn update_patient(&self, id: Uuid, update: PatientUpdate) -> StoreResult<Patient> {
        let mut tables = self.tables.write();
        if let Some(cpf) = &update.cpf {
            if tables.patients.values().any(|p| p.id != id && &p.cpf == cpf) {
                return Err(StoreError::Conflict(
                    "duplicate value violates patients_cpf_key".into(),
                ));
            }
        }
        let patient = tables
            .patients
            .get_mut(&id)
            .ok_or(StoreError::NotFound("patient"))?;
        if let Some(cpf) = update.cpf {
            patient.cpf = cpf;
        }
        if let Some(date_birth) = update.date_birth {
            patient.date_birth = date_birth;
        }
        if let Some(phone) = update.phone {
            patient.phone = phone;
        }
        if let Some(address) = update.address {
            patient.address = address;
        }
        Ok(patient.clone())
    }

    async fn delete_patient(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write();
        tables
            .patients
            .remove(&id)
            .ok_or(StoreError::NotFound("patient"))?;
        tables.remove_patient_cascade(id);
        Ok(())
    }
}

#[rocket::async_trait]
impl DoctorRepository for MemoryStore {
    async fn create_doctor(&self, input: DoctorInput) -> StoreResult<Doctor> {
        let mut tables = self.tables.write();
        tables.require_user(input.user_id)?;
        if tables.doctors.values().any(|d| d.crm == input.crm) {
            return Err(StoreError::Conflict("duplicate value violates doctors_crm_key".into()));
        }
        let doctor = Doctor {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            crm: input.crm,
            specialty: input.specialty,
            created_at: Utc::now(),
        };
        tables.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn list_doctors(&self) -> StoreResult<Vec<Doctor>> {
        let tables = self.tables.read();
        Ok(sorted(tables.doctors.values().cloned(), |d| {
            (d.created_at.timestamp_micros(), d.id)
        }))
    }

    async fn find_doctor(&self, id: Uuid) -> StoreResult<Option<Doctor>> {
        Ok(self.tables.read().doctors.get(&id).cloned())
    }

    async fn find_doctor_by_user(&self, user_id: Uuid) -> StoreResult<Option<Doctor>> {
        let tables = self.tables.read();
        Ok(tables
            .doctors
            .values()
            .find(|d| d.user_id == user_id)
            .cloned())
    }

    async fn update_doctor(&self, id: Uuid, update: DoctorUpdate) -> StoreResult<Doctor> {
        let mut tables = self.tables.write();
        if let Some(crm) = &update.crm {
            if tables.doctors.values().any(|d| d.id != id && &d.crm == crm) {
                return Err(StoreError::Conflict("duplicate value violates doctors_crm_key".into()));
            }
        }
        let doctor = tables
            .doctors
            .get_mut(&id)
            .ok_or(StoreError::NotFound("doctor"))?;
        if let Some(crm) = update.crm {
            doctor.crm = crm;
        }
        if let Some(specialty) = update.specialty {
            doctor.specialty = specialty;
        }
        Ok(doctor.clone())
    }

    async fn delete_doctor(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write();
        tables
            .doctors
            .remove(&id)
            .ok_or(StoreError::NotFound("doctor"))?;
        tables.remove_doctor_cascade(id);
        Ok(())
    }
}

#[rocket::async_trait]
impl AppointmentRepository for MemoryStore {
    async fn create_appointment(&self, input: AppointmentInput) -> StoreResult<Appointment> {
        let mut tables = self.tables.write();
        tables.require_patient(input.patient_id)?;
        tables.require_doctor(input.doctor_id)?;
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: input.patient_id,
            doctor_id: input.doctor_id,
            appointment_date: input.appointment_date,
            status: input.status,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn list_appointments(&self) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read();
        Ok(sorted(tables.appointments.values().cloned(), |a| {
            (a.appointment_date.timestamp_micros(), a.id)
        }))
    }

    async fn find_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.read().appointments.get(&id).cloned())
    }

    async fn list_appointments_by_patient(
        &self,
        patient_id: Uuid,
    ) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read();
        Ok(sorted(
            tables
                .appointments
                .values()
                .filter(|a| a.patient_id == patient_id)
                .cloned(),
            |a| (a.appointment_date.timestamp_micros(), a.id),
        ))
    }

    async fn list_appointments_by_doctor(&self, doctor_id: Uuid) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read();
        Ok(sorted(
            tables
                .appointments
                .values()
                .filter(|a| a.doctor_id == doctor_id)
                .cloned(),
            |a| (a.appointment_date.timestamp_micros(), a.id),
        ))
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> StoreResult<Appointment> {
        let mut tables = self.tables.write();
        let appointment = tables
            .appointments
            .get_mut(&id)
            .ok_or(StoreError::NotFound("appointment"))?;
        if let Some(date) = update.appointment_date {
            appointment.appointment_date = date;
        }
        if let Some(status) = update.status {
            appointment.status = status;
        }
        if let Some(notes) = update.notes {
            appointment.notes = notes;
        }
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn delete_appointment(&self, id: Uuid) -> StoreResult<()> {
        self.tables
            .write()
            .appointments
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("appointment"))
    }
}

#[rocket::async_trait]
impl PrescriptionRepository for MemoryStore {
    async fn create_prescription(&self, input: PrescriptionInput) -> StoreResult<Prescription> {
        let mut tables = self.tables.write();
        tables.require_patient(input.patient_id)?;
        tables.require_doctor(input.doctor_id)?;
        require(
            tables.medical_records.contains_key(&input.medical_record_id),
            "medical record",
            input.medical_record_id,
        )?;
        let prescription = Prescription {
            id: Uuid::new_v4(),
            patient_id: input.patient_id,
            doctor_id: input.doctor_id,
            medical_record_id: input.medical_record_id,
            medication_details: input.medication_details,
            created_at: Utc::now(),
        };
        tables
            .prescriptions
            .insert(prescription.id, prescription.clone());
        Ok(prescription)
    }

    async fn list_prescriptions(&self) -> StoreResult<Vec<Prescription>> {
        let tables = self.tables.read();
        Ok(sorted(tables.prescriptions.values().cloned(), |p| {
            (p.created_at.timestamp_micros(), p.id)
        }))
    }

    async fn find_prescription(&self, id: Uuid) -> StoreResult<Option<Prescription>> {
        Ok(self.tables.read().prescriptions.get(&id).cloned())
    }

    async fn update_prescription(
        &self,
        id: Uuid,
        update: PrescriptionUpdate,
    ) -> StoreResult<Prescription> {
        let mut tables = self.tables.write();
        let prescription = tables
            .prescriptions
            .get_mut(&id)
            .ok_or(StoreError::NotFound("prescription"))?;
        if let Some(details) = update.medication_details {
            prescription.medication_details = details;
        }
        Ok(prescription.clone())
    }

    async fn delete_prescription(&self, id: Uuid) -> StoreResult<()> {
        self.tables
            .write()
            .prescriptions
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("prescription"))
    }
}

#[rocket::async_trait]
impl MedicalRecordRepository for MemoryStore {
    async fn create_medical_record(&self, input: MedicalRecordInput) -> StoreResult<MedicalRecord> {
        let mut tables = self.tables.write();
        tables.require_patient(input.patient_id)?;
        tables.require_doctor(input.doctor_id)?;
        let record = MedicalRecord {
            id: Uuid::new_v4(),
            patient_id: input.patient_id,
            doctor_id: input.doctor_id,
            diagnosis: input.diagnosis,
            treatment: input.treatment,
            created_at: Utc::now(),
        };
        tables.medical_records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_medical_records(&self) -> StoreResult<Vec<MedicalRecord>> {
        let tables = self.tables.read();
        Ok(sorted(tables.medical_records.values().cloned(), |r| {
            (r.created_at.timestamp_micros(), r.id)
        }))
    }

    async fn find_medical_record(&self, id: Uuid) -> StoreResult<Option<MedicalRecord>> {
        Ok(self.tables.read().medical_records.get(&id).cloned())
    }

    async fn list_medical_records_by_doctor(
        &self,
        doctor_id: Uuid,
    ) -> StoreResult<Vec<MedicalRecord>> {
        let tables = self.tables.read();
        Ok(sorted(
            tables
                .medical_records
                .values()
                .filter(|r| r.doctor_id == doctor_id)
                .cloned(),
            |r| (r.created_at.timestamp_micros(), r.id),
        ))
    }

    async fn update_medical_record(
        &self,
        id: Uuid,
        update: MedicalRecordUpdate,
    ) -> StoreResult<MedicalRecord> {
        let mut tables = self.tables.write();
        let record = tables
            .medical_records
            .get_mut(&id)
            .ok_or(StoreError::NotFound("medical record"))?;
        if let Some(diagnosis) = update.diagnosis {
            record.diagnosis = diagnosis;
        }
        if let Some(treatment) = update.treatment {
            record.treatment = treatment;
        }
        Ok(record.clone())
    }

    async fn delete_medical_record(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write();
        tables
            .medical_records
            .remove(&id)
            .ok_or(StoreError::NotFound("medical record"))?;
        tables.prescriptions.retain(|_, p| p.medical_record_id != id);
        Ok(())
    }
}

#[rocket::async_trait]
impl AuditLogRepository for MemoryStore {
    async fn create_audit_log(&self, input: AuditLogInput) -> StoreResult<AuditLog> {
        let log = AuditLog {
            id: Uuid::new_v4(),
            user_id: input.user_id.unwrap_or_else(Uuid::nil),
            action: input.action,
            description: input.description,
            created_at: Utc::now(),
        };
        self.tables.write().audit_logs.insert(log.id, log.clone());
        Ok(log)
    }

    async fn list_audit_logs(&self) -> StoreResult<Vec<AuditLog>> {
        let tables = self.tables.read();
        let mut logs = sorted(tables.audit_logs.values().cloned(), |l| {
            (l.created_at.timestamp_micros(), l.id)
        });
        logs.reverse();
        Ok(logs)
    }

    async fn find_audit_log(&self, id: Uuid) -> StoreResult<Option<AuditLog>> {
        Ok(self.tables.read().audit_logs.get(&id).cloned())
    }

    async fn update_audit_log(&self, id: Uuid, update: AuditLogUpdate) -> StoreResult<AuditLog> {
        let mut tables = self.tables.write();
        let log = tables
            .audit_logs
            .get_mut(&id)
            .ok_or(StoreError::NotFound("audit log"))?;
        if let Some(action) = update.action {
            log.action = action;
        }
        if let Some(description) = update.description {
            log.description = description;
        }
        Ok(log.clone())
    }

    async fn delete_audit_log(&self, id: Uuid) -> StoreResult<()> {
        self.tables
            .write()
            .audit_logs
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("audit log"))
    }
}

#[rocket::async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        let log = AuditLog {
            id: Uuid::new_v4(),
            user_id: event.actor,
            action: event.action.clone(),
            description: event.description.clone(),
            created_at: event.created_at,
        };
        self.tables.write().audit_logs.insert(log.id, log);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::Role;
    use chrono::NaiveDate;

    async fn seed_user(store: &MemoryStore, email: &str, role: Role) -> User {
        store
            .create_user(NewUser {
                username: email.split('@').next().unwrap_or_default().to_string(),
                email: email.to_string(),
                password_hash: "$argon2id$placeholder".to_string(),
                role,
            })
            .await
            .expect("create user")
    }

    fn patient_input(user_id: Uuid, cpf: &str) -> PatientInput {
        PatientInput {
            user_id,
            cpf: cpf.to_string(),
            date_birth: NaiveDate::from_ymd_opt(1990, 5, 17).expect("valid date"),
            phone: "+55 11 99999-0000".to_string(),
            address: "Rua das Flores, 100".to_string(),
        }
    }

    #[tokio::test]
    async fn emails_are_unique_case_insensitively() {
        let store = MemoryStore::new();
        seed_user(&store, "ana@clinic.com", Role::Patient).await;
        let duplicate = store
            .create_user(NewUser {
                username: "ana2".into(),
                email: "ANA@clinic.com".into(),
                password_hash: "x".into(),
                role: Role::Patient,
            })
            .await;
        assert!(matches!(duplicate, Err(StoreError::Conflict(_))));
        assert!(
            store
                .find_user_by_email("Ana@Clinic.com")
                .await
                .expect("lookup")
                .is_some()
        );
    }

    #[tokio::test]
    async fn missing_rows_are_explicit() {
        let store = MemoryStore::new();
        assert!(store.find_patient(Uuid::new_v4()).await.expect("lookup").is_none());
        assert!(matches!(
            store
                .update_doctor(Uuid::new_v4(), DoctorUpdate::default())
                .await,
            Err(StoreError::NotFound("doctor"))
        ));
        assert!(matches!(
            store.delete_appointment(Uuid::new_v4()).await,
            Err(StoreError::NotFound("appointment"))
        ));
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let store = MemoryStore::new();
        let result = store
            .create_patient(patient_input(Uuid::new_v4(), "52998224725"))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidReference(_))));
    }

    #[tokio::test]
    async fn patients_by_doctor_follow_appointments_and_cascade_on_delete() {
        let store = MemoryStore::new();
        let patient_user = seed_user(&store, "p@clinic.com", Role::Patient).await;
        let other_user = seed_user(&store, "q@clinic.com", Role::Patient).await;
        let doctor_user = seed_user(&store, "d@clinic.com", Role::Doctor).await;

        let patient = store
            .create_patient(patient_input(patient_user.id, "52998224725"))
            .await
            .expect("patient");
        store
            .create_patient(patient_input(other_user.id, "11144477735"))
            .await
            .expect("other patient");
        let doctor = store
            .create_doctor(DoctorInput {
                user_id: doctor_user.id,
                crm: "CRM/SP 123456".into(),
                specialty: "Cardiology".into(),
            })
            .await
            .expect("doctor");
        store
            .create_appointment(AppointmentInput {
                patient_id: patient.id,
                doctor_id: doctor.id,
                appointment_date: Utc::now(),
                status: Default::default(),
                notes: String::new(),
            })
            .await
            .expect("appointment");

        let seen = store
            .list_patients_by_doctor(doctor.id)
            .await
            .expect("patients by doctor");
        assert_eq!(seen, vec![patient.clone()]);

        store.delete_patient(patient.id).await.expect("delete");
        assert!(
            store
                .list_appointments_by_doctor(doctor.id)
                .await
                .expect("appointments")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn sink_appends_to_audit_trail() {
        let store = MemoryStore::new();
        let actor = Uuid::new_v4();
        store
            .append(&AuditEvent::new(
                Some(actor),
                crate::audit::AuditAction::UserLoginSuccess,
                "ok",
            ))
            .await
            .expect("append");
        let trail = store.audit_trail();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].user_id, actor);
        assert_eq!(trail[0].action, "USER_LOGIN_SUCCESS");
    }
}
