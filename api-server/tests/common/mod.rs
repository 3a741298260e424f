#![allow(dead_code)]

use std::time::Duration;

use chrono::NaiveDate;
use clinic_api::auth::roles::Role;
use clinic_api::auth::{AuthConfig, PasswordService};
use clinic_api::models::{
    AppointmentInput, AppointmentStatus, AuditLog, Doctor, DoctorInput, NewUser, Patient,
    PatientInput, User,
};
use clinic_api::store::{
    AppointmentRepository, DoctorRepository, MemoryStore, PatientRepository, UserRepository,
};
use clinic_api::test_support::{access_token, test_auth_config};

pub const PASSWORD: &str = "correct horse battery staple";

/// Insert a user whose password is [`PASSWORD`].
pub async fn seed_user(store: &MemoryStore, email: &str, role: Role) -> User {
    let passwords = PasswordService::new(test_auth_config().password_cost).expect("argon2 params");
    store
        .create_user(NewUser {
            username: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            password_hash: passwords.hash_password(PASSWORD).expect("hash"),
            role,
        })
        .await
        .expect("seed user")
}

pub fn token_for(user: &User) -> String {
    access_token(&test_auth_config(), user.id, user.role)
}

pub async fn seed_doctor(store: &MemoryStore, user: &User, crm: &str) -> Doctor {
    store
        .create_doctor(DoctorInput {
            user_id: user.id,
            crm: crm.to_string(),
            specialty: "Cardiology".to_string(),
        })
        .await
        .expect("seed doctor")
}

pub async fn seed_patient(store: &MemoryStore, user: &User, cpf: &str) -> Patient {
    store
        .create_patient(PatientInput {
            user_id: user.id,
            cpf: cpf.to_string(),
            date_birth: NaiveDate::from_ymd_opt(1990, 4, 12).expect("valid date"),
            phone: "+55 11 99999-0000".to_string(),
            address: "Rua das Flores, 100".to_string(),
        })
        .await
        .expect("seed patient")
}

pub async fn seed_appointment(store: &MemoryStore, patient: &Patient, doctor: &Doctor) {
    store
        .create_appointment(AppointmentInput {
            patient_id: patient.id,
            doctor_id: doctor.id,
            appointment_date: chrono::Utc::now() + chrono::Duration::days(3),
            status: AppointmentStatus::Scheduled,
            notes: String::new(),
        })
        .await
        .expect("seed appointment");
}

/// Poll the stored audit trail until `predicate` holds or about two seconds pass.
pub async fn wait_for_audit(
    store: &MemoryStore,
    predicate: impl Fn(&[AuditLog]) -> bool,
) -> Vec<AuditLog> {
    for _ in 0..100 {
        let trail = store.audit_trail();
        if predicate(&trail) {
            return trail;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    store.audit_trail()
}

pub fn config() -> AuthConfig {
    test_auth_config()
}
