use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use clinic_api::auth::passwords::{HashCost, PasswordService};
use clinic_api::auth::roles::Role;
use clinic_api::models::NewUser;
use clinic_api::store::{PgStore, UserRepository};
use clinic_api::validation::{is_valid_email, normalize_email};

#[derive(Parser, Debug)]
#[command(
    name = "create_user",
    about = "Provision a clinic account of any role directly in Postgres"
)]
struct Args {
    /// Display name for the account.
    #[arg(long)]
    username: String,

    /// Email address for the account (case insensitive).
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,

    /// Role to assign (`admin`, `doctor` or `patient`).
    #[arg(long, default_value = "patient")]
    role: Role,

    /// Argon2 iteration count; defaults to PASSWORD_HASH_COST.
    #[arg(long, env = "PASSWORD_HASH_COST")]
    cost: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let email = normalize_email(&args.email);
    let username = args.username.trim().to_string();

    if !is_valid_email(&email) {
        writeln!(io::stderr(), "error: '{email}' is not a valid email address")?;
        std::process::exit(1);
    }
    if username.is_empty() || args.password.is_empty() {
        writeln!(io::stderr(), "error: username and password must not be empty")?;
        std::process::exit(1);
    }

    let cost = HashCost {
        iterations: args.cost.unwrap_or(HashCost::default().iterations),
        ..HashCost::default()
    };

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    let store = PgStore::new(pool);

    if store.find_user_by_email(&email).await?.is_some() {
        writeln!(
            io::stderr(),
            "error: a user with email '{email}' already exists."
        )?;
        std::process::exit(1);
    }

    let passwords = PasswordService::new(cost)?;
    let password_hash = passwords.hash_password(&args.password)?;

    let user = store
        .create_user(NewUser {
            username,
            email,
            password_hash,
            role: args.role,
        })
        .await?;

    println!("Created {} user '{}' with id {}", user.role, user.email, user.id);
    Ok(())
}
