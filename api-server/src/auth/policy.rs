//! Authorization gate: per-route role allow-lists declared as data.
//!
//! Every route mounted under the API base has exactly one entry in the
//! [`AccessPolicy`] table. Ignite fails when a route is missing, and a route
//! that somehow reaches [`Authorized`] without an entry is denied.

use std::collections::HashMap;

use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, Route};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use uuid::Uuid;

use crate::auth::guards::{
    AuthenticatedActor, RequestContext, authenticate, bearer_security_input, reject,
};
use crate::auth::roles::{Role, RoleSet};
use crate::auth::{AuthError, AuthResult};

/// Mount point for every policy-governed route.
pub const API_BASE: &str = "/api/v1";

/// One allow-list check. Gates on a route run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleGate {
    allowed: RoleSet,
}

impl RoleGate {
    pub fn allow(roles: &[Role]) -> Self {
        Self {
            allowed: RoleSet::of(roles),
        }
    }

    pub fn any_authenticated() -> Self {
        Self {
            allowed: RoleSet::any(),
        }
    }

    pub fn allowed(&self) -> RoleSet {
        self.allowed
    }

    /// Must only run after authentication populated the context.
    pub fn check(&self, context: &RequestContext) -> AuthResult<()> {
        let actor = context.actor().ok_or(AuthError::MissingActor)?;
        if self.allowed.contains(actor.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Gated(Vec<RoleGate>),
}

#[derive(Debug, Clone)]
pub struct PolicyEntry {
    pub method: Method,
    pub path: &'static str,
    pub access: Access,
}

impl PolicyEntry {
    pub fn public(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            access: Access::Public,
        }
    }

    pub fn allow(method: Method, path: &'static str, roles: &[Role]) -> Self {
        Self {
            method,
            path,
            access: Access::Gated(vec![RoleGate::allow(roles)]),
        }
    }

    pub fn stacked(method: Method, path: &'static str, gates: Vec<RoleGate>) -> Self {
        Self {
            method,
            path,
            access: Access::Gated(gates),
        }
    }
}

/// Route-to-policy table, built once at startup and managed as Rocket state.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    entries: HashMap<(Method, String), Access>,
}

impl AccessPolicy {
    pub fn new(entries: impl IntoIterator<Item = PolicyEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| ((entry.method, entry.path.to_string()), entry.access))
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, method: Method, path: &str) -> Option<&Access> {
        self.entries.get(&(method, path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// API routes that have no entry, rendered as `METHOD /path`.
    pub fn uncovered<'a>(&self, routes: impl Iterator<Item = &'a Route>) -> Vec<String> {
        routes
            .filter(|route| route.uri.base() == API_BASE)
            .filter_map(|route| {
                let path = route.uri.unmounted_origin.path().as_str();
                match self.lookup(route.method, path) {
                    Some(_) => None,
                    None => Some(format!("{} {}", route.method, path)),
                }
            })
            .collect()
    }

    /// Allow-lists for the clinical records API.
    pub fn clinic_default() -> Self {
        use Method::{Delete, Get, Patch, Post};
        use Role::{Admin, Doctor, Patient};

        const ADMIN: &[Role] = &[Admin];
        const STAFF: &[Role] = &[Admin, Doctor];

        Self::new([
            PolicyEntry::public(Get, "/health"),
            PolicyEntry::public(Get, "/openapi.json"),
            PolicyEntry::public(Post, "/register"),
            PolicyEntry::public(Post, "/login"),
            PolicyEntry::public(Post, "/refresh"),
            PolicyEntry::stacked(Get, "/me", vec![RoleGate::any_authenticated()]),
            // patients
            PolicyEntry::allow(Post, "/patients", STAFF),
            PolicyEntry::allow(Get, "/patients", ADMIN),
            PolicyEntry::allow(Get, "/patients/<id>", ADMIN),
            PolicyEntry::allow(Get, "/patients/doctor/<doctor_id>", STAFF),
            PolicyEntry::allow(Patch, "/patients/<id>", STAFF),
            PolicyEntry::allow(Delete, "/patients/<id>", ADMIN),
            // doctors
            PolicyEntry::allow(Post, "/doctors", ADMIN),
            PolicyEntry::allow(Get, "/doctors", ADMIN),
            PolicyEntry::allow(Get, "/doctors/<id>", ADMIN),
            PolicyEntry::allow(Patch, "/doctors/<id>", ADMIN),
            PolicyEntry::allow(Delete, "/doctors/<id>", ADMIN),
            // appointments
            PolicyEntry::allow(Post, "/appointments", &[Admin, Doctor, Patient]),
            PolicyEntry::allow(Get, "/appointments", ADMIN),
            PolicyEntry::allow(Get, "/appointments/<id>", ADMIN),
            PolicyEntry::allow(Get, "/appointments/patient/<patient_id>", &[Admin, Patient]),
            PolicyEntry::allow(Get, "/appointments/doctor/<doctor_id>", STAFF),
            PolicyEntry::allow(Patch, "/appointments/<id>", STAFF),
            PolicyEntry::allow(Delete, "/appointments/<id>", STAFF),
            // prescriptions
            PolicyEntry::allow(Post, "/prescriptions", STAFF),
            PolicyEntry::allow(Get, "/prescriptions", ADMIN),
            PolicyEntry::allow(Get, "/prescriptions/<id>", STAFF),
            PolicyEntry::allow(Patch, "/prescriptions/<id>", STAFF),
            PolicyEntry::allow(Delete, "/prescriptions/<id>", ADMIN),
            // medical records
            PolicyEntry::allow(Post, "/medical_records", STAFF),
            PolicyEntry::allow(Get, "/medical_records", ADMIN),
            PolicyEntry::allow(Get, "/medical_records/<id>", STAFF),
            PolicyEntry::allow(Get, "/medical_records/doctor/<doctor_id>", STAFF),
            PolicyEntry::allow(Patch, "/medical_records/<id>", STAFF),
            PolicyEntry::allow(Delete, "/medical_records/<id>", ADMIN),
            // audit logs: any authenticated actor passes the first gate, only admins the second
            PolicyEntry::stacked(Post, "/audit_logs", audit_gates()),
            PolicyEntry::stacked(Get, "/audit_logs", audit_gates()),
            PolicyEntry::stacked(Get, "/audit_logs/<id>", audit_gates()),
            PolicyEntry::stacked(Patch, "/audit_logs/<id>", audit_gates()),
            PolicyEntry::stacked(Delete, "/audit_logs/<id>", audit_gates()),
        ])
    }

    /// Manages the default table unless one is already managed, then refuses
    /// to launch if any API route is left without a policy.
    pub fn fairing() -> AdHoc {
        AdHoc::try_on_ignite("Access Policy", |rocket| async move {
            let rocket = if rocket.state::<AccessPolicy>().is_some() {
                rocket
            } else {
                rocket.manage(AccessPolicy::clinic_default())
            };

            let uncovered = rocket
                .state::<AccessPolicy>()
                .map(|policy| policy.uncovered(rocket.routes()));

            match uncovered {
                Some(uncovered) if uncovered.is_empty() => Ok(rocket),
                Some(uncovered) => {
                    log::error!("routes without an access policy: {}", uncovered.join(", "));
                    Err(rocket)
                }
                None => Err(rocket),
            }
        })
    }
}

fn audit_gates() -> Vec<RoleGate> {
    vec![RoleGate::any_authenticated(), RoleGate::allow(&[Role::Admin])]
}

/// Request guard combining authentication with the route's allow-lists.
///
/// Authentication failures are 401 and happen before any role check;
/// role mismatches are 403.
#[derive(Debug, Clone, Copy)]
pub struct Authorized {
    pub actor: AuthenticatedActor,
}

impl Authorized {
    pub fn id(&self) -> Uuid {
        self.actor.id
    }

    pub fn role(&self) -> Role {
        self.actor.role
    }
}

fn route_access<'r>(request: &'r Request<'_>) -> AuthResult<&'r Access> {
    let policy = request
        .rocket()
        .state::<AccessPolicy>()
        .ok_or_else(|| AuthError::Config("AccessPolicy missing from state".into()))?;
    let route = request
        .route()
        .ok_or_else(|| AuthError::UnknownRoute(request.uri().to_string()))?;
    let path = route.uri.unmounted_origin.path().as_str();
    policy
        .lookup(route.method, path)
        .ok_or_else(|| AuthError::UnknownRoute(format!("{} {}", route.method, path)))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Authorized {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let access = match route_access(request) {
            Ok(access) => access,
            Err(err) => {
                log::error!("denying {} {}: {}", request.method(), request.uri(), err);
                return reject(request, err);
            }
        };

        let actor = match authenticate(request) {
            Ok(actor) => *actor,
            Err(err) => return reject(request, err.clone()),
        };

        if let Access::Gated(gates) = access {
            let context = RequestContext::of(request);
            for gate in gates {
                if let Err(err) = gate.check(context) {
                    log::info!(
                        "{} {} denied for {} {}: requires {}",
                        request.method(),
                        request.uri(),
                        actor.role,
                        actor.id,
                        gate.allowed()
                    );
                    return reject(request, err);
                }
            }
        }

        Outcome::Success(Authorized { actor })
    }
}

impl<'a> OpenApiFromRequest<'a> for Authorized {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security_input())
    }
}
