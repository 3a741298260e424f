#[macro_use]
extern crate rocket;

pub mod audit;
pub mod auth;
pub mod catchers;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;
pub mod store;
pub mod validation;

use crate::audit::AuditNotifier;
use crate::auth::policy::{API_BASE, AccessPolicy};
use crate::auth::{AuthConfig, AuthState};
use crate::db::ClinicDb;
use crate::request_logger::RequestLogger;
use crate::store::{PgStore, Store, StoreConfig};
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket, Route};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Every route served under [`API_BASE`], plus the generated `openapi.json`.
pub fn api_routes() -> Vec<Route> {
    openapi_get_routes![
        routes::health::health_check,
        // Auth
        auth::routes::register,
        auth::routes::login,
        auth::routes::refresh,
        auth::routes::me,
        // Patients
        routes::patients::create_patient,
        routes::patients::list_patients,
        routes::patients::get_patient,
        routes::patients::list_patients_by_doctor,
        routes::patients::update_patient,
        routes::patients::delete_patient,
        // Doctors
        routes::doctors::create_doctor,
        routes::doctors::list_doctors,
        routes::doctors::get_doctor,
        routes::doctors::update_doctor,
        routes::doctors::delete_doctor,
        // Appointments
        routes::appointments::create_appointment,
        routes::appointments::list_appointments,
        routes::appointments::get_appointment,
        routes::appointments::list_appointments_by_patient,
        routes::appointments::list_appointments_by_doctor,
        routes::appointments::update_appointment,
        routes::appointments::delete_appointment,
        // Prescriptions
        routes::prescriptions::create_prescription,
        routes::prescriptions::list_prescriptions,
        routes::prescriptions::get_prescription,
        routes::prescriptions::update_prescription,
        routes::prescriptions::delete_prescription,
        // Medical records
        routes::medical_records::create_medical_record,
        routes::medical_records::list_medical_records,
        routes::medical_records::get_medical_record,
        routes::medical_records::list_medical_records_by_doctor,
        routes::medical_records::update_medical_record,
        routes::medical_records::delete_medical_record,
        // Audit logs
        routes::audit_logs::create_audit_log,
        routes::audit_logs::list_audit_logs,
        routes::audit_logs::get_audit_log,
        routes::audit_logs::update_audit_log,
        routes::audit_logs::delete_audit_log,
    ]
}

/// Mount the API, docs and catchers, and attach the fairings that depend on
/// managed [`AuthState`] and [`Store`].
///
/// The audit notifier and access policy are attached here so both the
/// production rocket and test rockets get identical wiring.
pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(AuditNotifier::fairing())
        .attach(AccessPolicy::fairing())
        .mount(API_BASE, api_routes())
        .mount(
            "/swagger-ui/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../api/v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Clinic API", "../api/v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
        .register("/", catchers::catchers())
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Patch, Method::Delete]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(false)
        .to_cors()
        .expect("Error creating CORS");

    let rocket = rocket::build()
        .attach(RequestLogger)
        .attach(ClinicDb::init())
        .attach(cors)
        .attach(AdHoc::try_on_ignite(
            "Auth Configuration",
            |rocket| async move {
                match AuthConfig::from_env().and_then(AuthState::from_config) {
                    Ok(state) => {
                        log::info!(
                            "auth configured: access {}h, refresh {}h, self-registration {}",
                            state.config.access_token_expiry_hours,
                            state.config.refresh_token_expiry_hours,
                            state.config.self_registration_roles
                        );
                        Ok(rocket.manage(state))
                    }
                    Err(err) => {
                        log::error!("invalid auth configuration: {}", err);
                        Err(rocket)
                    }
                }
            },
        ))
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match ClinicDb::fetch(&rocket) {
                    Some(db) => match MIGRATOR.run(&**db).await {
                        Ok(()) => {
                            log::info!("database migrations successful");
                            Ok(rocket)
                        }
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    },
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        .attach(AdHoc::try_on_ignite("Clinic Store", |rocket| async move {
            let Some(pool) = ClinicDb::fetch(&rocket).map(|db| (**db).clone()) else {
                log::error!("database pool not available for the store");
                return Err(rocket);
            };
            match StoreConfig::from_env() {
                Ok(config) => {
                    let store = Store::from_backend(Arc::new(PgStore::new(pool)), config);
                    Ok(rocket.manage(store))
                }
                Err(err) => {
                    log::error!("invalid store configuration: {}", err);
                    Err(rocket)
                }
            }
        }));

    mount_api(rocket)
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::http::Header;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use uuid::Uuid;

    use crate::audit::{AuditConfig, AuditSink};
    use crate::auth::policy::{API_BASE, AccessPolicy};
    use crate::auth::{AuthConfig, AuthState, HashCost, Role, RoleSet, TokenCodec};
    use crate::store::{MemoryStore, Store, StoreConfig, UserRepository};

    /// Fast settings: cheap Argon2 parameters and fixed secrets.
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            access_token_secret: "test-access-secret".to_string(),
            access_token_expiry_hours: 1,
            refresh_token_secret: "test-refresh-secret".to_string(),
            refresh_token_expiry_hours: 24,
            password_cost: HashCost {
                iterations: 1,
                memory_kib: 1024,
            },
            self_registration_roles: RoleSet::of(&[Role::Patient]),
        }
    }

    /// Mint an access token the way `/login` would.
    pub fn access_token(config: &AuthConfig, subject: Uuid, role: Role) -> String {
        TokenCodec::from_config(config)
            .issue_access(subject, role)
            .expect("sign test token")
            .token
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {token}"))
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    pub struct TestRocketBuilder {
        figment: Figment,
        backend: MemoryStore,
        auth_config: AuthConfig,
        store_config: StoreConfig,
        audit_config: AuditConfig,
        users: Option<Arc<dyn UserRepository>>,
        audit_sink: Option<Arc<dyn AuditSink>>,
        policy: Option<AccessPolicy>,
        extra_routes: Vec<Route>,
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                backend: MemoryStore::new(),
                auth_config: test_auth_config(),
                store_config: StoreConfig::default(),
                audit_config: AuditConfig::default(),
                users: None,
                audit_sink: None,
                policy: None,
                extra_routes: Vec::new(),
            }
        }

        /// Share an existing in-memory backend with the rocket.
        pub fn with_store(mut self, backend: MemoryStore) -> Self {
            self.backend = backend;
            self
        }

        pub fn with_auth_config(mut self, config: AuthConfig) -> Self {
            self.auth_config = config;
            self
        }

        pub fn with_store_config(mut self, config: StoreConfig) -> Self {
            self.store_config = config;
            self
        }

        pub fn with_audit_config(mut self, config: AuditConfig) -> Self {
            self.audit_config = config;
            self
        }

        /// Replace the user repository, e.g. with a deliberately slow one.
        pub fn with_users(mut self, users: Arc<dyn UserRepository>) -> Self {
            self.users = Some(users);
            self
        }

        pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
            self.audit_sink = Some(sink);
            self
        }

        pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
            self.policy = Some(policy);
            self
        }

        /// Mount additional routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.extra_routes.extend(routes);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let auth = AuthState::from_config(self.auth_config).expect("valid test auth config");

            let mut store = Store::from_backend(Arc::new(self.backend), self.store_config);
            if let Some(users) = self.users {
                store = store.with_users(users);
            }
            if let Some(sink) = self.audit_sink {
                store = store.with_audit_sink(sink);
            }

            let mut rocket = rocket::custom(self.figment)
                .manage(auth)
                .manage(store)
                .manage(self.audit_config);
            if let Some(policy) = self.policy {
                rocket = rocket.manage(policy);
            }
            if !self.extra_routes.is_empty() {
                rocket = rocket.mount(API_BASE, self.extra_routes);
            }

            crate::mount_api(rocket)
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
