use super::{version_conflict, Repository};
use crate::error::{RegulationError, RegulationResult};
use crate::request::Request;
use async_trait::async_trait;
use regulacao_uuid::RequestId;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Records {
    order: Vec<RequestId>,
    by_id: HashMap<RequestId, Request>,
}

/// Process-local repository. Readers take a shared lock, so a listing never sees a record
/// half-written.
#[derive(Default)]
pub struct InMemoryRepository {
    records: RwLock<Records>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the repository with existing records, keeping their versions.
    pub async fn with_records(records: Vec<Request>) -> Self {
        let repo = Self::new();
        {
            let mut guard = repo.records.write().await;
            for request in records {
                guard.order.push(request.id);
                guard.by_id.insert(request.id, request);
            }
        }
        repo
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get(&self, id: RequestId) -> RegulationResult<Option<Request>> {
        Ok(self.records.read().await.by_id.get(&id).cloned())
    }

    async fn list(&self) -> RegulationResult<Vec<Request>> {
        let guard = self.records.read().await;
        Ok(guard
            .order
            .iter()
            .filter_map(|id| guard.by_id.get(id).cloned())
            .collect())
    }

    async fn insert(&self, mut request: Request) -> RegulationResult<Request> {
        let mut guard = self.records.write().await;
        if guard.by_id.contains_key(&request.id) {
            return Err(RegulationError::Conflict(format!(
                "request {} already exists",
                request.id
            )));
        }
        request.version = 1;
        guard.order.push(request.id);
        guard.by_id.insert(request.id, request.clone());
        tracing::debug!(id = %request.id, "inserted request in memory");
        Ok(request)
    }

    async fn update(&self, mut request: Request, expected_version: u64) -> RegulationResult<Request> {
        let mut guard = self.records.write().await;
        let stored = guard
            .by_id
            .get_mut(&request.id)
            .ok_or(RegulationError::NotFound(request.id))?;
        if stored.version != expected_version {
            return Err(version_conflict(request.id, expected_version, stored.version));
        }
        request.version = expected_version + 1;
        *stored = request.clone();
        tracing::debug!(id = %request.id, version = request.version, "updated request in memory");
        Ok(request)
    }

    async fn delete(&self, id: RequestId) -> RegulationResult<()> {
        let mut guard = self.records.write().await;
        if guard.by_id.remove(&id).is_none() {
            return Err(RegulationError::NotFound(id));
        }
        guard.order.retain(|existing| *existing != id);
        Ok(())
    }
}
