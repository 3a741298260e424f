use std::fmt;
use std::str::FromStr;

use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of actor roles. Every account carries exactly one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Doctor, Role::Patient];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Role::Admin => 0b001,
            Role::Doctor => 0b010,
            Role::Patient => 0b100,
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Exact lowercase match; claims and stored rows never carry other spellings.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact allow-list of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(roles: &[Role]) -> Self {
        roles.iter().fold(Self::empty(), |set, role| set.with(*role))
    }

    pub fn any() -> Self {
        Self::of(&Role::ALL)
    }

    pub fn with(self, role: Role) -> Self {
        Self(self.0 | role.bit())
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> {
        let set = *self;
        Role::ALL.into_iter().filter(move |role| set.contains(*role))
    }

    /// Parse a comma separated list such as `"patient,doctor"`.
    pub fn parse_list(value: &str) -> Result<Self, UnknownRole> {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .try_fold(Self::empty(), |set, item| {
                Role::from_str(&item.to_ascii_lowercase()).map(|role| set.with(role))
            })
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|role| role.as_str()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_known_roles() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("doctor".parse::<Role>(), Ok(Role::Doctor));
        assert_eq!("patient".parse::<Role>(), Ok(Role::Patient));
        assert!("Admin".parse::<Role>().is_err());
        assert!("nurse".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn role_set_membership() {
        let set = RoleSet::of(&[Role::Admin, Role::Doctor]);
        assert!(set.contains(Role::Admin));
        assert!(set.contains(Role::Doctor));
        assert!(!set.contains(Role::Patient));
        assert_eq!(set.to_string(), "{admin, doctor}");
        assert!(RoleSet::empty().is_empty());
        assert_eq!(RoleSet::any().iter().count(), 3);
    }

    #[test]
    fn parses_role_lists_from_config() {
        let set = RoleSet::parse_list(" Patient, doctor ,").expect("valid list");
        assert_eq!(set, RoleSet::of(&[Role::Patient, Role::Doctor]));
        assert!(RoleSet::parse_list("patient,superuser").is_err());
    }
}
