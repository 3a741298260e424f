use rocket_db_pools::{Database, sqlx};

/// Pool for the `clinic_db` database configured in `Rocket.toml`.
#[derive(Database)]
#[database("clinic_db")]
pub struct ClinicDb(sqlx::PgPool);
