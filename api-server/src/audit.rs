//! Fire-and-forget audit trail.
//!
//! Handlers enqueue events without awaiting; a single background task drains
//! the queue into an [`AuditSink`]. A full queue or a sink that keeps failing
//! drops events with a warning and never touches the request outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rocket::fairing::AdHoc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::store::{Store, StoreResult};

/// Entity kinds that appear in audit action codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Patient,
    Doctor,
    Appointment,
    Prescription,
    MedicalRecord,
    AuditLog,
}

impl Resource {
    fn code(&self) -> &'static str {
        match self {
            Resource::Patient => "PATIENT",
            Resource::Doctor => "DOCTOR",
            Resource::Appointment => "APPOINTMENT",
            Resource::Prescription => "PRESCRIPTION",
            Resource::MedicalRecord => "MEDICAL_RECORD",
            Resource::AuditLog => "AUDIT_LOG",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resource::Patient => "Patient",
            Resource::Doctor => "Doctor",
            Resource::Appointment => "Appointment",
            Resource::Prescription => "Prescription",
            Resource::MedicalRecord => "Medical record",
            Resource::AuditLog => "Audit log",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserRegister,
    UserLoginSuccess,
    UserLoginFailed,
    TokenRefresh,
    Create(Resource),
    FetchById(Resource),
    Update(Resource),
    Delete(Resource),
}

impl AuditAction {
    /// Uppercase action code, e.g. `PATIENT_CREATE`.
    pub fn code(&self) -> String {
        match self {
            AuditAction::UserRegister => "USER_REGISTER".to_string(),
            AuditAction::UserLoginSuccess => "USER_LOGIN_SUCCESS".to_string(),
            AuditAction::UserLoginFailed => "USER_LOGIN_FAILED".to_string(),
            AuditAction::TokenRefresh => "TOKEN_REFRESH".to_string(),
            AuditAction::Create(resource) => format!("{}_CREATE", resource.code()),
            AuditAction::FetchById(resource) => format!("{}_FETCH_BY_ID", resource.code()),
            AuditAction::Update(resource) => format!("{}_UPDATE", resource.code()),
            AuditAction::Delete(resource) => format!("{}_DELETE", resource.code()),
        }
    }

    /// Description for an action on a single entity.
    pub fn describe(&self, id: Uuid) -> String {
        match self {
            AuditAction::Create(resource) => format!("{} created with ID: {id}", resource.label()),
            AuditAction::FetchById(resource) => {
                format!("{} fetched with ID: {id}", resource.label())
            }
            AuditAction::Update(resource) => format!("{} updated with ID: {id}", resource.label()),
            AuditAction::Delete(resource) => format!("{} deleted with ID: {id}", resource.label()),
            other => format!("{other} for ID: {id}"),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// Nil when no verified actor was available.
    pub actor: Uuid,
    pub action: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor: Option<Uuid>, action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            actor: actor.unwrap_or_else(Uuid::nil),
            action: action.code(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// Destination for audit events.
#[rocket::async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditConfig {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub write_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_attempts: 3,
            write_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl AuditConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(raw) = lookup("AUDIT_QUEUE_CAPACITY") {
            config.queue_capacity = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or_else(|| "AUDIT_QUEUE_CAPACITY must be a positive integer".to_string())?;
        }
        if let Some(raw) = lookup("CONTEXT_TIMEOUT") {
            if let Some(secs) = raw.trim().parse::<u64>().ok().filter(|secs| *secs > 0) {
                config.write_timeout = Duration::from_secs(secs);
            }
        }
        Ok(config)
    }
}

/// Handle used by request handlers to record audit events.
#[derive(Clone)]
pub struct AuditNotifier {
    sender: mpsc::Sender<AuditEvent>,
}

impl AuditNotifier {
    /// Start the background writer. Must be called inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        tokio::spawn(drain(receiver, sink, config));
        Self { sender }
    }

    /// Enqueue an event. Never blocks and never fails the caller.
    pub fn log(&self, actor: Option<Uuid>, action: AuditAction, description: impl Into<String>) {
        let event = AuditEvent::new(actor, action, description);
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::warn!(
                    "audit queue full, dropping {} for actor {}",
                    event.action,
                    event.actor
                );
            }
            Err(TrySendError::Closed(event)) => {
                log::warn!(
                    "audit writer stopped, dropping {} for actor {}",
                    event.action,
                    event.actor
                );
            }
        }
    }

    /// Record an action on one entity with the standard description.
    pub fn record(&self, actor: Uuid, action: AuditAction, entity_id: Uuid) {
        self.log(Some(actor), action, action.describe(entity_id));
    }

    /// Spawns the writer against the managed [`Store`]'s sink.
    pub fn fairing() -> AdHoc {
        AdHoc::try_on_ignite("Audit Notifier", |rocket| async move {
            let config = match rocket.state::<AuditConfig>().copied() {
                Some(config) => config,
                None => match AuditConfig::from_env() {
                    Ok(config) => config,
                    Err(err) => {
                        log::error!("invalid audit configuration: {err}");
                        return Err(rocket);
                    }
                },
            };

            let Some(sink) = rocket.state::<Store>().map(Store::audit_sink) else {
                log::error!("audit notifier requires a managed Store");
                return Err(rocket);
            };

            Ok(rocket.manage(AuditNotifier::spawn(sink, config)))
        })
    }
}

async fn drain(
    mut receiver: mpsc::Receiver<AuditEvent>,
    sink: Arc<dyn AuditSink>,
    config: AuditConfig,
) {
    while let Some(event) = receiver.recv().await {
        deliver(sink.as_ref(), &event, &config).await;
    }
    log::debug!("audit queue closed, writer exiting");
}

async fn deliver(sink: &dyn AuditSink, event: &AuditEvent, config: &AuditConfig) -> bool {
    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        match tokio::time::timeout(config.write_timeout, sink.append(event)).await {
            Ok(Ok(())) => return true,
            Ok(Err(err)) => {
                log::warn!(
                    "audit write {} failed (attempt {attempt}/{attempts}): {err}",
                    event.action
                );
            }
            Err(_) => {
                log::warn!(
                    "audit write {} timed out after {:?} (attempt {attempt}/{attempts})",
                    event.action,
                    config.write_timeout
                );
            }
        }
        if attempt < attempts {
            tokio::time::sleep(config.retry_backoff * attempt).await;
        }
    }

    log::warn!(
        "dropping audit event {} for actor {} after {attempts} attempts",
        event.action,
        event.actor
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[rocket::async_trait]
    impl AuditSink for Recording {
        async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Failing {
        calls: AtomicU32,
    }

    #[rocket::async_trait]
    impl AuditSink for Failing {
        async fn append(&self, _event: &AuditEvent) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("sink offline".into()))
        }
    }

    struct Hanging;

    #[rocket::async_trait]
    impl AuditSink for Hanging {
        async fn append(&self, _event: &AuditEvent) -> StoreResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn fast_config() -> AuditConfig {
        AuditConfig {
            queue_capacity: 8,
            max_attempts: 3,
            write_timeout: Duration::from_millis(20),
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn action_codes_and_descriptions() {
        let id = Uuid::nil();
        assert_eq!(AuditAction::Create(Resource::Patient).code(), "PATIENT_CREATE");
        assert_eq!(
            AuditAction::FetchById(Resource::MedicalRecord).code(),
            "MEDICAL_RECORD_FETCH_BY_ID"
        );
        assert_eq!(AuditAction::UserLoginFailed.code(), "USER_LOGIN_FAILED");
        assert_eq!(
            AuditAction::Delete(Resource::Doctor).describe(id),
            format!("Doctor deleted with ID: {id}")
        );
    }

    #[test]
    fn missing_actor_maps_to_nil() {
        let event = AuditEvent::new(None, AuditAction::UserLoginFailed, "unknown email");
        assert_eq!(event.actor, Uuid::nil());
    }

    #[tokio::test]
    async fn events_reach_the_sink() {
        let sink = Arc::new(Recording::default());
        let notifier = AuditNotifier::spawn(sink.clone(), fast_config());
        let actor = Uuid::new_v4();

        notifier.record(actor, AuditAction::Create(Resource::Doctor), Uuid::new_v4());

        let mut delivered = Vec::new();
        for _ in 0..100 {
            delivered = sink.events.lock().clone();
            if !delivered.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].actor, actor);
        assert_eq!(delivered[0].action, "DOCTOR_CREATE");
    }

    #[tokio::test]
    async fn failing_sink_is_retried_a_bounded_number_of_times() {
        let sink = Failing::default();
        let delivered = deliver(
            &sink,
            &AuditEvent::new(None, AuditAction::TokenRefresh, "x"),
            &fast_config(),
        )
        .await;
        assert!(!delivered);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hanging_sink_times_out() {
        let started = std::time::Instant::now();
        let delivered = deliver(
            &Hanging,
            &AuditEvent::new(None, AuditAction::TokenRefresh, "x"),
            &fast_config(),
        )
        .await;
        assert!(!delivered);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn logging_never_blocks_when_the_queue_is_full() {
        let config = AuditConfig {
            queue_capacity: 1,
            ..fast_config()
        };
        let notifier = AuditNotifier::spawn(Arc::new(Hanging), config);

        let started = std::time::Instant::now();
        for _ in 0..100 {
            notifier.log(None, AuditAction::UserLoginFailed, "flood");
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
