//! Request-scoped identity.
//!
//! The session layer in front of this API authenticates people and forwards who they are in
//! `x-actor-*` headers. [`HeaderIdentity`] turns those headers into a core [`Actor`].

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use regulacao_core::{Actor, IdentityProvider, RegulationError, RegulationResult, Role};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_UNIT_HEADER: &str = "x-actor-unit";

/// Identity read from the forwarded actor headers of one HTTP request.
pub struct HeaderIdentity<'a> {
    headers: &'a HeaderMap,
}

impl<'a> HeaderIdentity<'a> {
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self { headers }
    }

    fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl IdentityProvider for HeaderIdentity<'_> {
    fn current_actor(&self) -> RegulationResult<Actor> {
        let id = self
            .header(ACTOR_ID_HEADER)
            .ok_or_else(|| RegulationError::InvalidInput(format!("missing {ACTOR_ID_HEADER}")))?;
        let role: Role = self
            .header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| RegulationError::InvalidInput(format!("missing {ACTOR_ROLE_HEADER}")))?
            .parse()?;
        let name = self.header(ACTOR_NAME_HEADER).unwrap_or(id);
        Actor::new(id, name, role, self.header(ACTOR_UNIT_HEADER))
    }
}

/// The caller of the current HTTP request. Rejects with 401 if no valid identity was forwarded.
#[derive(Clone, Debug)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        HeaderIdentity::new(&parts.headers)
            .current_actor()
            .map(CurrentActor)
            .map_err(|e| ApiError::unauthenticated(e.to_string()))
    }
}
