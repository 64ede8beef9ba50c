//! Storage of request records.
//!
//! The lifecycle service talks to storage only through [`Repository`]. Two implementations are
//! provided and chosen once, at construction, by [`build_repository`]:
//!
//! - [`InMemoryRepository`]: process-local, used by tests and the default server profile.
//! - [`FileRepository`]: one JSON document per request in a sharded directory tree.
//!
//! Records are replaced whole. Every successful write bumps [`Request::version`]; `update`
//! takes the version the caller read and fails with [`RegulationError::Conflict`] if the stored
//! record has moved on since.

mod file;
mod memory;

pub use file::FileRepository;
pub use memory::InMemoryRepository;

use crate::config::{CoreConfig, RepositoryBackend};
use crate::error::{RegulationError, RegulationResult};
use crate::request::Request;
use async_trait::async_trait;
use regulacao_uuid::RequestId;
use std::sync::Arc;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetches one record. Absence is `Ok(None)`, not an error.
    async fn get(&self, id: RequestId) -> RegulationResult<Option<Request>>;

    /// All records, in creation order.
    async fn list(&self) -> RegulationResult<Vec<Request>>;

    /// Stores a new record with version 1 and returns it.
    async fn insert(&self, request: Request) -> RegulationResult<Request>;

    /// Replaces a record if its stored version still equals `expected_version`.
    ///
    /// Returns the stored record, with version `expected_version + 1`.
    async fn update(&self, request: Request, expected_version: u64) -> RegulationResult<Request>;

    async fn delete(&self, id: RequestId) -> RegulationResult<()>;
}

/// Builds the repository selected by `config`.
pub fn build_repository(config: &CoreConfig) -> Arc<dyn Repository> {
    match config.backend() {
        RepositoryBackend::Memory => Arc::new(InMemoryRepository::new()),
        RepositoryBackend::File => Arc::new(FileRepository::new(config.data_dir())),
    }
}

pub(crate) fn version_conflict(id: RequestId, expected: u64, found: u64) -> RegulationError {
    RegulationError::Conflict(format!(
        "request {id} is at version {found}, expected {expected}"
    ))
}
