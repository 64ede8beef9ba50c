//! Actors and identity.
//!
//! The session/identity provider is an external collaborator: the core only ever sees the
//! "current actor" it resolved. [`IdentityProvider`] is the seam edge adapters implement; the
//! lifecycle service itself receives the actor on every call because it is shared between
//! concurrent callers acting as different people.

use crate::error::{RegulationError, RegulationResult};
use regulacao_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role an actor plays in the referral workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Submitting primary-care unit (UBS).
    #[serde(rename = "ubs", alias = "unit")]
    Unit,
    /// Central regulation authority.
    #[serde(rename = "regulador", alias = "reviewer")]
    Reviewer,
    #[serde(rename = "admin")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unit => "ubs",
            Role::Reviewer => "regulador",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RegulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ubs" | "unit" => Ok(Role::Unit),
            "regulador" | "reviewer" => Ok(Role::Reviewer),
            "admin" => Ok(Role::Admin),
            other => Err(RegulationError::InvalidInput(format!(
                "unknown role '{other}'"
            ))),
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: NonEmptyText,
    pub name: NonEmptyText,
    pub role: Role,
    /// Affiliated unit name; required for `ubs` actors.
    pub unit: Option<NonEmptyText>,
}

impl Actor {
    /// Builds an actor, enforcing that unit-role actors carry a unit.
    pub fn new(
        id: impl AsRef<str>,
        name: impl AsRef<str>,
        role: Role,
        unit: Option<&str>,
    ) -> RegulationResult<Self> {
        let id = NonEmptyText::new(id)
            .map_err(|_| RegulationError::InvalidInput("actor id cannot be empty".into()))?;
        let name = NonEmptyText::new(name)
            .map_err(|_| RegulationError::InvalidInput("actor name cannot be empty".into()))?;
        let unit = NonEmptyText::from_optional(unit);

        if role == Role::Unit && unit.is_none() {
            return Err(RegulationError::InvalidInput(
                "unit actors must be affiliated with a unit".into(),
            ));
        }

        Ok(Self {
            id,
            name,
            role,
            unit,
        })
    }

    pub fn unit_name(&self) -> Option<&str> {
        self.unit.as_ref().map(NonEmptyText::as_str)
    }

    /// Serialisable copy recorded on requests and audit events.
    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            id: self.id.as_str().to_string(),
            name: self.name.as_str().to_string(),
            role: self.role,
            unit: self.unit.as_ref().map(|u| u.as_str().to_string()),
        }
    }
}

/// Point-in-time copy of an actor's identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSnapshot {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Source of the "current actor".
pub trait IdentityProvider: Send + Sync {
    fn current_actor(&self) -> RegulationResult<Actor>;
}

/// Identity fixed at construction, e.g. from CLI flags.
#[derive(Clone, Debug)]
pub struct StaticIdentity(Actor);

impl StaticIdentity {
    pub fn new(actor: Actor) -> Self {
        Self(actor)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_actor(&self) -> RegulationResult<Actor> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_actor_requires_unit() {
        let err = Actor::new("u1", "Ana", Role::Unit, None).unwrap_err();
        assert!(matches!(err, RegulationError::InvalidInput(_)));

        let err = Actor::new("u1", "Ana", Role::Unit, Some("  ")).unwrap_err();
        assert!(matches!(err, RegulationError::InvalidInput(_)));

        let actor = Actor::new("u1", "Ana", Role::Unit, Some("UBS Norte")).unwrap();
        assert_eq!(actor.unit_name(), Some("UBS Norte"));
    }

    #[test]
    fn reviewer_needs_no_unit() {
        let actor = Actor::new("r1", "Dr. Paulo", Role::Reviewer, None).unwrap();
        assert_eq!(actor.unit_name(), None);
        assert_eq!(actor.snapshot().role, Role::Reviewer);
    }

    #[test]
    fn role_parses_wire_names_and_aliases() {
        assert_eq!("regulador".parse::<Role>().unwrap(), Role::Reviewer);
        assert_eq!("unit".parse::<Role>().unwrap(), Role::Unit);
        assert!("coordenador".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Unit).unwrap(), "\"ubs\"");
    }

    #[test]
    fn static_identity_returns_configured_actor() {
        let actor = Actor::new("a1", "Admin", Role::Admin, None).unwrap();
        let provider = StaticIdentity::new(actor.clone());
        assert_eq!(provider.current_actor().unwrap(), actor);
    }
}
