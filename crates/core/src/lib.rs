//! # Regulação Core
//!
//! Core business logic for the referral regulation system: primary-care units (UBS) submit
//! referral requests, the central regulation authority reviews and adjudicates them.
//!
//! This crate contains:
//! - the [`Request`] aggregate and its closed [`Status`] state machine
//! - the role-based permission guard ([`permissions`])
//! - the append-only audit trail ([`audit`])
//! - the filter engine, pagination and summaries ([`filter`])
//! - request storage behind the [`Repository`] trait (in-memory and sharded JSON files)
//! - the [`RequestLifecycleService`] orchestrating all of the above
//!
//! **No API concerns**: authentication, HTTP servers and wire DTOs belong in `api-rest` and
//! `api-shared`.

pub mod actor;
pub mod audit;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod lifecycle;
pub mod locks;
pub mod permissions;
pub mod repositories;
pub mod request;
pub mod status;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use actor::{Actor, ActorSnapshot, IdentityProvider, Role, StaticIdentity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CoreConfig, RepositoryBackend};
pub use error::{RegulationError, RegulationResult};
pub use filter::{Page, PageOf, RequestFilter, Summary};
pub use lifecycle::RequestLifecycleService;
pub use permissions::Action;
pub use regulacao_types::NonEmptyText;
pub use regulacao_uuid::RequestId;
pub use repositories::{build_repository, FileRepository, InMemoryRepository, Repository};
pub use request::{
    AuditEvent, CatalogEntry, Category, EventDetails, NewRequest, PatientData, Priority, Request,
    RequestType, RequestUpdate, TransitionDetails, TypeSpecificData,
};
pub use status::{can_transition, can_transition_str, Status};
