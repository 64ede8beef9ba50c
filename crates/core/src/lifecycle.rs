//! Request lifecycle service.
//!
//! [`RequestLifecycleService`] is the only component that mutates requests. Every mutating
//! operation runs as one unit against a single request id:
//!
//! 1. take the per-id lock (bounded wait, [`RegulationError::Conflict`] on timeout);
//! 2. fetch the current record;
//! 3. run the state machine, permission guard and field checks against it;
//! 4. build the new record, audit event included, and persist it with a single
//!    compare-and-swap write.
//!
//! Any failure before the write leaves storage untouched. Repository calls are bounded by the
//! configured timeout and surface as [`RegulationError::Cancelled`].
//!
//! The service is shared between concurrent callers acting as different people, so the acting
//! [`Actor`] is passed to every operation rather than stored.

use crate::actor::{Actor, Role};
use crate::audit;
use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::error::{RegulationError, RegulationResult};
use crate::filter::{self, Page, PageOf, RequestFilter, Summary};
use crate::locks::RequestLocks;
use crate::permissions::{authorize, check_ownership, check_role, Action};
use crate::repositories::Repository;
use crate::request::{
    catalog, AuditEvent, CatalogEntry, EventDetails, NewRequest, PatientData, Priority, Request,
    RequestUpdate, TransitionDetails,
};
use crate::status::{ensure_transition, Status};
use crate::validation::validate_patient_data;
use chrono::FixedOffset;
use regulacao_types::NonEmptyText;
use regulacao_uuid::RequestId;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct RequestLifecycleService {
    repository: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    locks: RequestLocks,
    repository_timeout: Duration,
    date_offset: FixedOffset,
    lock_timeout: Duration,
    default_page_size: usize,
}

impl RequestLifecycleService {
    pub fn new(repository: Arc<dyn Repository>, clock: Arc<dyn Clock>, config: &CoreConfig) -> Self {
        Self {
            repository,
            clock,
            locks: RequestLocks::new(),
            repository_timeout: config.repository_timeout(),
            date_offset: config.date_offset(),
            lock_timeout: config.lock_timeout(),
            default_page_size: config.default_page_size(),
        }
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Creates a request as `rascunho` or, unless `as_draft`, directly as `enviado`.
    ///
    /// For `ubs` actors the origin unit defaults to, and must match, the actor's unit.
    pub async fn create(&self, new: NewRequest, actor: &Actor) -> RegulationResult<Request> {
        check_role(actor, Action::Create)?;

        let mut patient_data = new.patient_data;
        scope_origin_unit(actor, &mut patient_data)?;
        let now = self.clock.now();
        validate_patient_data(&patient_data, now.date_naive())?;

        let status = if new.as_draft {
            Status::Draft
        } else {
            Status::Submitted
        };
        let mut request = Request {
            id: RequestId::new(),
            request_type: new.request_type,
            patient_data,
            type_specific_data: new.type_specific_data,
            status,
            priority: new.priority.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            status_changed_at: now,
            submitted_at: (status == Status::Submitted).then_some(now),
            created_by: actor.snapshot(),
            assigned_reviewer: None,
            decided_by: None,
            justification: None,
            return_reason: None,
            cancel_reason: None,
            observations: None,
            history: Vec::new(),
            version: 0,
        };
        if status == Status::Submitted {
            request = audit::append(
                request,
                now,
                "Solicitação enviada à Central de Regulação",
                Some(actor),
                EventDetails::new(),
            );
        }

        let id = request.id;
        let mut committed = request.clone();
        committed.version = 1;
        let stored = match tokio::time::timeout(
            self.repository_timeout,
            self.repository.insert(request),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                self.settle_timed_out("insert", id, |stored| {
                    stored.filter(|s| *s == committed)
                })
                .await?
            }
        };
        tracing::info!(
            id = %stored.id,
            request_type = %stored.request_type,
            status = %stored.status,
            actor = %actor.id,
            "request created"
        );
        Ok(stored)
    }

    /// Moves a request to `target`.
    ///
    /// Checks run in order: existence, the actor's visibility of the request, the transition
    /// table, the role capability for the action, then the target's mandatory fields.
    pub async fn change_status(
        &self,
        id: RequestId,
        target: Status,
        actor: &Actor,
        details: TransitionDetails,
    ) -> RegulationResult<Request> {
        let _guard = self.locks.acquire(id, self.lock_timeout).await?;
        let current = self.fetch(id).await?;
        check_ownership(actor, Action::View, current.origin_unit())?;

        let from = current.status;
        ensure_transition(from, target)?;
        let action = Action::for_transition(from, target)
            .ok_or(RegulationError::InvalidTransition { from, to: target })?;
        authorize(actor, action, current.origin_unit())?;

        let justification = NonEmptyText::from_optional(details.justification.as_deref());
        let reason = NonEmptyText::from_optional(details.reason.as_deref());
        let observations = NonEmptyText::from_optional(details.observations.as_deref());
        if target == Status::Denied && justification.is_none() {
            return Err(RegulationError::MissingJustification);
        }
        if target == Status::Returned && reason.is_none() {
            return Err(RegulationError::MissingReason);
        }

        let now = self.clock.now();
        let expected_version = current.version;
        let mut next = current;
        next.status = target;
        next.status_changed_at = now;
        if observations.is_some() {
            next.observations = observations;
        }

        let message = match target {
            Status::Submitted if from == Status::Returned => {
                next.return_reason = None;
                next.decided_by = None;
                "Solicitação reenviada após devolução".to_string()
            }
            Status::Submitted => {
                next.submitted_at.get_or_insert(now);
                "Solicitação enviada à Central de Regulação".to_string()
            }
            Status::UnderReview => {
                next.assigned_reviewer = Some(actor.snapshot());
                "Solicitação em análise".to_string()
            }
            Status::Approved => {
                next.decided_by = Some(actor.snapshot());
                "Solicitação aprovada".to_string()
            }
            Status::Denied => {
                next.decided_by = Some(actor.snapshot());
                let text = justification.as_ref().map(|j| j.to_string()).unwrap_or_default();
                next.justification = justification;
                format!("Solicitação negada: {text}")
            }
            Status::Returned => {
                next.decided_by = Some(actor.snapshot());
                let text = reason.as_ref().map(|r| r.to_string()).unwrap_or_default();
                next.return_reason = reason;
                format!("Solicitação devolvida: {text}")
            }
            Status::Cancelled => {
                next.decided_by = Some(actor.snapshot());
                let text = reason
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "Sem motivo especificado".to_string());
                next.cancel_reason = reason;
                format!("Solicitação cancelada: {text}")
            }
            // `rascunho` is never an allowed successor.
            Status::Draft => return Err(RegulationError::InvalidTransition { from, to: target }),
        };

        let mut event_details = details.to_event_details();
        event_details.insert("from".into(), from.as_str().into());
        event_details.insert("to".into(), target.as_str().into());
        let next = audit::append(next, now, message, Some(actor), event_details);

        let stored = self.persist(next, expected_version).await?;
        tracing::info!(%id, %from, to = %target, actor = %actor.id, "status changed");
        Ok(stored)
    }

    /// Changes priority without touching status. Always recorded in the history.
    pub async fn reprioritize(
        &self,
        id: RequestId,
        priority: Priority,
        actor: &Actor,
    ) -> RegulationResult<Request> {
        check_role(actor, Action::Reprioritize)?;
        let _guard = self.locks.acquire(id, self.lock_timeout).await?;
        let current = self.fetch(id).await?;

        let now = self.clock.now();
        let previous = current.priority;
        let expected_version = current.version;
        let mut next = current;
        next.priority = priority;

        let mut details = EventDetails::new();
        details.insert("from".into(), previous.as_str().into());
        details.insert("to".into(), priority.as_str().into());
        let next = audit::append(
            next,
            now,
            format!("Prioridade alterada de {previous} para {priority}"),
            Some(actor),
            details,
        );

        let stored = self.persist(next, expected_version).await?;
        tracing::info!(%id, from = %previous, to = %priority, actor = %actor.id, "priority changed");
        Ok(stored)
    }

    /// Amends the content of a `rascunho` or `devolvido` request.
    pub async fn update(
        &self,
        id: RequestId,
        update: RequestUpdate,
        actor: &Actor,
    ) -> RegulationResult<Request> {
        if update.patient_data.is_none() && update.type_specific_data.is_none() {
            return Err(RegulationError::InvalidInput("nothing to update".into()));
        }

        let _guard = self.locks.acquire(id, self.lock_timeout).await?;
        let current = self.fetch(id).await?;
        authorize(actor, Action::EditDraft, current.origin_unit())?;
        if !current.status.is_editable() {
            tracing::warn!(%id, status = %current.status, "edit rejected for non-editable request");
            return Err(RegulationError::NotEditable(current.status));
        }

        let now = self.clock.now();
        let expected_version = current.version;
        let mut next = current;
        let mut changed = Vec::new();

        if let Some(mut patient_data) = update.patient_data {
            scope_origin_unit(actor, &mut patient_data)?;
            validate_patient_data(&patient_data, now.date_naive())?;
            next.patient_data = patient_data;
            changed.push("patientData");
        }
        if let Some(data) = update.type_specific_data {
            next.type_specific_data = data;
            changed.push("typeSpecificData");
        }

        let mut details = EventDetails::new();
        details.insert("fields".into(), changed.join(","));
        let next = audit::append(next, now, "Solicitação atualizada", Some(actor), details);

        let stored = self.persist(next, expected_version).await?;
        tracing::info!(%id, actor = %actor.id, "request content updated");
        Ok(stored)
    }

    /// Assigns `reviewer` to a non-terminal request.
    pub async fn assign_reviewer(
        &self,
        id: RequestId,
        reviewer: &Actor,
        actor: &Actor,
    ) -> RegulationResult<Request> {
        check_role(actor, Action::AssignReviewer)?;
        if reviewer.role == Role::Unit {
            return Err(RegulationError::InvalidInput(
                "only reviewers or admins can be assigned to a request".into(),
            ));
        }

        let _guard = self.locks.acquire(id, self.lock_timeout).await?;
        let current = self.fetch(id).await?;
        if current.status.is_terminal() {
            return Err(RegulationError::NotEditable(current.status));
        }

        let now = self.clock.now();
        let expected_version = current.version;
        let mut next = current;
        next.assigned_reviewer = Some(reviewer.snapshot());

        let mut details = EventDetails::new();
        details.insert("reviewerId".into(), reviewer.id.to_string());
        let next = audit::append(
            next,
            now,
            format!("Solicitação atribuída a {}", reviewer.name),
            Some(actor),
            details,
        );

        let stored = self.persist(next, expected_version).await?;
        tracing::info!(%id, reviewer = %reviewer.id, actor = %actor.id, "reviewer assigned");
        Ok(stored)
    }

    /// Appends an informational event without changing anything else.
    pub async fn add_note(
        &self,
        id: RequestId,
        message: &str,
        details: EventDetails,
        actor: &Actor,
    ) -> RegulationResult<Request> {
        let message = NonEmptyText::new(message)
            .map_err(|_| RegulationError::InvalidInput("note message cannot be empty".into()))?;

        let _guard = self.locks.acquire(id, self.lock_timeout).await?;
        let current = self.fetch(id).await?;
        authorize(actor, Action::AddNote, current.origin_unit())?;

        let expected_version = current.version;
        let next = audit::append(
            current,
            self.clock.now(),
            message.into_inner(),
            Some(actor),
            details,
        );
        self.persist(next, expected_version).await
    }

    /// Removes a request that has reached a terminal status.
    pub async fn delete(&self, id: RequestId, actor: &Actor) -> RegulationResult<()> {
        check_role(actor, Action::Delete)?;
        let _guard = self.locks.acquire(id, self.lock_timeout).await?;
        let current = self.fetch(id).await?;
        if !current.status.is_terminal() {
            tracing::warn!(%id, status = %current.status, "refusing to delete non-terminal request");
            return Err(RegulationError::NotTerminal(current.status));
        }

        match tokio::time::timeout(self.repository_timeout, self.repository.delete(id)).await {
            Ok(result) => result?,
            Err(_) => {
                self.settle_timed_out("delete", id, |stored| stored.is_none().then_some(()))
                    .await?
            }
        }
        tracing::info!(%id, actor = %actor.id, "request deleted");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get(&self, id: RequestId, actor: &Actor) -> RegulationResult<Request> {
        check_role(actor, Action::View)?;
        let request = self.fetch(id).await?;
        check_ownership(actor, Action::View, request.origin_unit())?;
        Ok(request)
    }

    pub async fn history(
        &self,
        id: RequestId,
        actor: &Actor,
    ) -> RegulationResult<Vec<AuditEvent>> {
        Ok(self.get(id, actor).await?.history)
    }

    /// Filtered listing in creation order. `ubs` actors only ever see their own unit.
    pub async fn query(&self, filter: &RequestFilter, actor: &Actor) -> RegulationResult<Vec<Request>> {
        check_role(actor, Action::View)?;
        let all = self.within("list", self.repository.list()).await?;

        let scoped;
        let filter = if actor.role == Role::Unit && !filter.only_mine {
            scoped = filter.clone().only_mine();
            &scoped
        } else {
            filter
        };
        Ok(filter::apply_in(&all, filter, actor, self.date_offset))
    }

    /// One page of [`query`](Self::query). `per_page` falls back to the configured default.
    pub async fn query_page(
        &self,
        filter: &RequestFilter,
        page: usize,
        per_page: Option<usize>,
        actor: &Actor,
    ) -> RegulationResult<PageOf<Request>> {
        let items = self.query(filter, actor).await?;
        let page = Page::new(page, per_page.unwrap_or(self.default_page_size));
        Ok(filter::paginate(items, page))
    }

    pub async fn summary(&self, filter: &RequestFilter, actor: &Actor) -> RegulationResult<Summary> {
        let items = self.query(filter, actor).await?;
        Ok(filter::summarize(&items))
    }

    pub fn catalog(&self) -> Vec<CatalogEntry> {
        catalog()
    }

    // ------------------------------------------------------------------------
    // Storage helpers
    // ------------------------------------------------------------------------

    async fn fetch(&self, id: RequestId) -> RegulationResult<Request> {
        self.within("get", self.repository.get(id))
            .await?
            .ok_or(RegulationError::NotFound(id))
    }

    async fn persist(&self, request: Request, expected_version: u64) -> RegulationResult<Request> {
        let id = request.id;
        let mut committed = request.clone();
        committed.version = expected_version + 1;
        match tokio::time::timeout(
            self.repository_timeout,
            self.repository.update(request, expected_version),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.settle_timed_out("update", id, |stored| {
                    stored.filter(|s| *s == committed)
                })
                .await
            }
        }
    }

    /// Resolves a write whose call missed the deadline. The call has been dropped by now, so
    /// the stored record decides: `landed` returns the result if the write is visible there,
    /// otherwise the caller gets `Cancelled`.
    async fn settle_timed_out<T>(
        &self,
        operation: &'static str,
        id: RequestId,
        landed: impl FnOnce(Option<Request>) -> Option<T>,
    ) -> RegulationResult<T> {
        tracing::warn!(operation, %id, timeout = ?self.repository_timeout, "repository write timed out");
        let stored = self.within("get", self.repository.get(id)).await?;
        match landed(stored) {
            Some(outcome) => {
                tracing::info!(operation, %id, "timed-out write had already committed");
                Ok(outcome)
            }
            None => Err(RegulationError::Cancelled(format!(
                "repository {operation} did not complete in time"
            ))),
        }
    }

    async fn within<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = RegulationResult<T>>,
    ) -> RegulationResult<T> {
        match tokio::time::timeout(self.repository_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout = ?self.repository_timeout, "repository call timed out");
                Err(RegulationError::Cancelled(format!(
                    "repository {operation} did not complete in time"
                )))
            }
        }
    }
}

/// Trims the origin unit and, for `ubs` actors, pins it to the actor's own unit.
fn scope_origin_unit(actor: &Actor, patient_data: &mut PatientData) -> RegulationResult<()> {
    patient_data.origin_unit = patient_data.origin_unit.trim().to_string();
    let (Role::Unit, Some(unit)) = (actor.role, actor.unit_name()) else {
        return Ok(());
    };
    if patient_data.origin_unit.is_empty() {
        patient_data.origin_unit = unit.to_string();
    } else if patient_data.origin_unit != unit {
        tracing::warn!(actor = %actor.id, origin_unit = %patient_data.origin_unit, "unit actor used a foreign origin unit");
        return Err(RegulationError::PermissionDenied(
            "unit actors may only create requests for their own unit".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repositories::InMemoryRepository;
    use crate::request::RequestType;
    use crate::test_support::{admin, patient, reviewer, sample_request, t0, unit_actor};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, NaiveDate};

    struct Harness {
        service: Arc<RequestLifecycleService>,
        repository: Arc<InMemoryRepository>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        harness_with(InMemoryRepository::new())
    }

    fn harness_with(repository: InMemoryRepository) -> Harness {
        let repository = Arc::new(repository);
        let clock = Arc::new(ManualClock::new(t0()));
        let service = RequestLifecycleService::new(
            repository.clone(),
            clock.clone(),
            &CoreConfig::in_memory(),
        );
        Harness {
            service: Arc::new(service),
            repository,
            clock,
        }
    }

    fn new_request(unit: &str, as_draft: bool) -> NewRequest {
        NewRequest {
            request_type: RequestType::Ressonancia,
            patient_data: patient(unit),
            type_specific_data: Default::default(),
            priority: None,
            as_draft,
        }
    }

    async fn submitted(h: &Harness, unit: &str) -> Request {
        h.service
            .create(new_request(unit, false), &unit_actor(unit))
            .await
            .unwrap()
    }

    async fn stored(h: &Harness, id: RequestId) -> Request {
        h.repository.get(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn create_submitted_records_creator_and_first_event() {
        let h = harness();
        let actor = unit_actor("UBS Norte");
        let request = h
            .service
            .create(new_request("UBS Norte", false), &actor)
            .await
            .unwrap();

        assert_eq!(request.status, Status::Submitted);
        assert_eq!(request.priority, Priority::Medium);
        assert_eq!(request.created_by, actor.snapshot());
        assert_eq!(request.submitted_at, Some(t0()));
        assert_eq!(request.version, 1);
        assert_eq!(request.history.len(), 1);
        assert_eq!(
            request.history[0].message,
            "Solicitação enviada à Central de Regulação"
        );
    }

    #[tokio::test]
    async fn create_draft_has_empty_history() {
        let h = harness();
        let request = h
            .service
            .create(new_request("UBS Norte", true), &unit_actor("UBS Norte"))
            .await
            .unwrap();

        assert_eq!(request.status, Status::Draft);
        assert!(request.history.is_empty());
        assert_eq!(request.submitted_at, None);
    }

    #[tokio::test]
    async fn unit_origin_defaults_to_own_unit_and_cannot_be_foreign() {
        let h = harness();
        let actor = unit_actor("UBS Norte");

        let mut blank = new_request("", false);
        blank.patient_data.origin_unit = "  ".into();
        let request = h.service.create(blank, &actor).await.unwrap();
        assert_eq!(request.origin_unit(), "UBS Norte");

        let err = h
            .service
            .create(new_request("UBS Sul", false), &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::PermissionDenied(_)));
        assert!(h.repository.list().await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn reviewer_cannot_create() {
        let h = harness();
        let err = h
            .service
            .create(new_request("UBS Norte", false), &reviewer())
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn create_rejects_invalid_patient_data() {
        let h = harness();
        let mut new = new_request("UBS Norte", false);
        new.patient_data.name = "Al".into();
        new.patient_data.birth_date = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();

        let err = h
            .service
            .create(new, &unit_actor("UBS Norte"))
            .await
            .unwrap_err();
        match err {
            RegulationError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert!(h.repository.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_review_and_denial() {
        let h = harness();
        let r = submitted(&h, "UBS Norte").await;
        let reviewer = reviewer();

        h.clock.advance(ChronoDuration::minutes(10));
        let reviewing = h
            .service
            .change_status(r.id, Status::UnderReview, &reviewer, TransitionDetails::default())
            .await
            .unwrap();
        assert_eq!(reviewing.history.len(), 2);
        assert_eq!(reviewing.assigned_reviewer, Some(reviewer.snapshot()));

        h.clock.advance(ChronoDuration::minutes(10));
        let denied = h
            .service
            .change_status(
                r.id,
                Status::Denied,
                &reviewer,
                TransitionDetails::justification("incomplete exam"),
            )
            .await
            .unwrap();
        assert_eq!(denied.status, Status::Denied);
        assert_eq!(denied.history.len(), 3);
        assert_eq!(
            denied.justification.as_ref().map(NonEmptyText::as_str),
            Some("incomplete exam")
        );
        assert_eq!(denied.history[2].message, "Solicitação negada: incomplete exam");
        assert_eq!(denied.decided_by, Some(reviewer.snapshot()));
        assert_eq!(denied.created_by, r.created_by);

        let err = h
            .service
            .change_status(r.id, Status::Approved, &reviewer, TransitionDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegulationError::InvalidTransition {
                from: Status::Denied,
                to: Status::Approved
            }
        ));
        assert_eq!(stored(&h, r.id).await.history.len(), 3);
    }

    #[tokio::test]
    async fn deny_without_justification_changes_nothing() {
        let h = harness();
        let r = submitted(&h, "UBS Norte").await;
        let before = stored(&h, r.id).await;

        h.clock.advance(ChronoDuration::minutes(5));
        for details in [
            TransitionDetails::default(),
            TransitionDetails::justification("   "),
        ] {
            let err = h
                .service
                .change_status(r.id, Status::Denied, &reviewer(), details)
                .await
                .unwrap_err();
            assert!(matches!(err, RegulationError::MissingJustification));
        }

        let after = stored(&h, r.id).await;
        assert_eq!(after.status, before.status);
        assert_eq!(after.history.len(), before.history.len());
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn return_requires_reason_and_resubmission_clears_it() {
        let h = harness();
        let r = submitted(&h, "UBS Norte").await;

        let err = h
            .service
            .change_status(r.id, Status::Returned, &reviewer(), TransitionDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::MissingReason));

        let returned = h
            .service
            .change_status(
                r.id,
                Status::Returned,
                &reviewer(),
                TransitionDetails::reason("falta laudo"),
            )
            .await
            .unwrap();
        assert_eq!(
            returned.return_reason.as_ref().map(NonEmptyText::as_str),
            Some("falta laudo")
        );
        assert_eq!(
            returned.history.last().unwrap().details.get("reason").map(String::as_str),
            Some("falta laudo")
        );

        let resubmitted = h
            .service
            .change_status(
                r.id,
                Status::Submitted,
                &unit_actor("UBS Norte"),
                TransitionDetails::default(),
            )
            .await
            .unwrap();
        assert_eq!(resubmitted.status, Status::Submitted);
        assert_eq!(resubmitted.return_reason, None);
        assert_eq!(resubmitted.submitted_at, Some(t0()));
        assert_eq!(
            resubmitted.history.last().unwrap().message,
            "Solicitação reenviada após devolução"
        );
    }

    #[tokio::test]
    async fn terminal_requests_reject_every_transition() {
        let h = harness();
        let admin = admin();
        let terminal = [
            (Status::Approved, TransitionDetails::default()),
            (Status::Denied, TransitionDetails::justification("sem indicação")),
            (Status::Cancelled, TransitionDetails::reason("duplicada")),
        ];

        for (status, details) in terminal {
            let r = submitted(&h, "UBS Norte").await;
            h.service
                .change_status(r.id, status, &admin, details)
                .await
                .unwrap();
            let len = stored(&h, r.id).await.history.len();

            for target in Status::ALL {
                let err = h
                    .service
                    .change_status(r.id, target, &admin, TransitionDetails::reason("x"))
                    .await
                    .unwrap_err();
                assert!(
                    matches!(err, RegulationError::InvalidTransition { .. }),
                    "{status} -> {target}: {err:?}"
                );
            }
            assert_eq!(stored(&h, r.id).await.history.len(), len);
        }
    }

    #[tokio::test]
    async fn unit_actor_cannot_touch_another_units_request() {
        let h = harness();
        let r = submitted(&h, "UBS Sul").await;
        let norte = unit_actor("UBS Norte");

        for target in Status::ALL {
            let err = h
                .service
                .change_status(r.id, target, &norte, TransitionDetails::reason("motivo"))
                .await
                .unwrap_err();
            assert!(
                matches!(err, RegulationError::PermissionDenied(_)),
                "{target}: {err:?}"
            );
        }
        assert!(matches!(
            h.service.get(r.id, &norte).await.unwrap_err(),
            RegulationError::PermissionDenied(_)
        ));
        assert_eq!(stored(&h, r.id).await.history.len(), 1);
    }

    #[tokio::test]
    async fn unit_actor_cannot_adjudicate() {
        let h = harness();
        let r = submitted(&h, "UBS Norte").await;
        let err = h
            .service
            .change_status(
                r.id,
                Status::Approved,
                &unit_actor("UBS Norte"),
                TransitionDetails::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn history_grows_by_one_per_operation_and_never_rewrites() {
        let h = harness();
        let draft = h
            .service
            .create(new_request("UBS Norte", true), &unit_actor("UBS Norte"))
            .await
            .unwrap();
        let unit = unit_actor("UBS Norte");
        let reviewer = reviewer();

        let mut previous = stored(&h, draft.id).await.history;
        let steps: Vec<(&str, Actor)> = vec![
            ("submit", unit.clone()),
            ("prio", reviewer.clone()),
            ("review", reviewer.clone()),
            ("return", reviewer.clone()),
            ("prio", reviewer.clone()),
            ("submit", unit.clone()),
            ("approve", reviewer.clone()),
        ];

        for (step, actor) in steps {
            h.clock.advance(ChronoDuration::minutes(1));
            let updated = match step {
                "submit" => {
                    h.service
                        .change_status(draft.id, Status::Submitted, &actor, TransitionDetails::default())
                        .await
                }
                "review" => {
                    h.service
                        .change_status(draft.id, Status::UnderReview, &actor, TransitionDetails::default())
                        .await
                }
                "return" => {
                    h.service
                        .change_status(
                            draft.id,
                            Status::Returned,
                            &actor,
                            TransitionDetails::reason("incompleto"),
                        )
                        .await
                }
                "approve" => {
                    h.service
                        .change_status(draft.id, Status::Approved, &actor, TransitionDetails::default())
                        .await
                }
                _ => h.service.reprioritize(draft.id, Priority::Urgent, &actor).await,
            }
            .unwrap();

            assert_eq!(updated.history.len(), previous.len() + 1, "{step}");
            assert_eq!(updated.history[..previous.len()], previous[..], "{step}");
            previous = updated.history;
        }
        assert_eq!(previous.len(), 7);
    }

    #[tokio::test]
    async fn reprioritize_is_independent_of_status_but_not_of_role() {
        let h = harness();
        let r = submitted(&h, "UBS Norte").await;

        let err = h
            .service
            .reprioritize(r.id, Priority::High, &unit_actor("UBS Norte"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::PermissionDenied(_)));

        let updated = h
            .service
            .reprioritize(r.id, Priority::High, &reviewer())
            .await
            .unwrap();
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.status, Status::Submitted);
        assert_eq!(
            updated.history.last().unwrap().message,
            "Prioridade alterada de media para alta"
        );
    }

    #[tokio::test]
    async fn query_filters_compose_in_creation_order() {
        use Status::*;
        let statuses = [
            Draft, Submitted, Submitted, UnderReview, Approved, Denied, Returned, Cancelled,
            Submitted, Submitted,
        ];
        let records: Vec<Request> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let unit = if i % 2 == 0 { "UBS Norte" } else { "UBS Sul" };
                let mut r = sample_request(unit);
                r.status = *status;
                r.created_at = t0() + ChronoDuration::hours(i as i64);
                r.version = 1;
                r
            })
            .collect();
        let expected: Vec<RequestId> = [2usize, 8].iter().map(|i| records[*i].id).collect();

        let h = harness_with(InMemoryRepository::with_records(records).await);
        let filter = RequestFilter::default()
            .with_status(Submitted)
            .with_unit("Norte");
        let result = h.service.query(&filter, &reviewer()).await.unwrap();

        let ids: Vec<RequestId> = result.iter().map(|r| r.id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn unit_listing_is_scoped_to_own_unit() {
        let h = harness();
        submitted(&h, "UBS Norte").await;
        submitted(&h, "UBS Sul").await;
        submitted(&h, "UBS Norte").await;

        let norte = h
            .service
            .query(&RequestFilter::default(), &unit_actor("UBS Norte"))
            .await
            .unwrap();
        assert_eq!(norte.len(), 2);
        assert!(norte.iter().all(|r| r.origin_unit() == "UBS Norte"));

        let all = h
            .service
            .query(&RequestFilter::default(), &reviewer())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn pages_and_summary() {
        let h = harness();
        for _ in 0..12 {
            submitted(&h, "UBS Norte").await;
        }
        let page = h
            .service
            .query_page(&RequestFilter::default(), 2, None, &admin())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 12);
        assert_eq!(page.total_pages, 2);

        let summary = h
            .service
            .summary(&RequestFilter::default(), &admin())
            .await
            .unwrap();
        assert_eq!(summary.by_status["enviado"], 12);
        assert_eq!(summary.by_category["exame"], 12);
    }

    #[tokio::test]
    async fn update_only_while_editable() {
        let h = harness();
        let unit = unit_actor("UBS Norte");
        let draft = h
            .service
            .create(new_request("UBS Norte", true), &unit)
            .await
            .unwrap();

        let mut data = crate::request::TypeSpecificData::new();
        data.insert("exame".into(), serde_json::json!("RM de crânio"));
        let update = RequestUpdate {
            patient_data: None,
            type_specific_data: Some(data.clone()),
        };
        let updated = h.service.update(draft.id, update.clone(), &unit).await.unwrap();
        assert_eq!(updated.type_specific_data, data);
        assert_eq!(updated.status, Status::Draft);
        assert_eq!(updated.history.len(), 1);

        let err = h
            .service
            .update(draft.id, update.clone(), &unit_actor("UBS Sul"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::PermissionDenied(_)));

        h.service
            .change_status(draft.id, Status::Submitted, &unit, TransitionDetails::default())
            .await
            .unwrap();
        let err = h.service.update(draft.id, update, &unit).await.unwrap_err();
        assert!(matches!(err, RegulationError::NotEditable(Status::Submitted)));

        let err = h
            .service
            .update(draft.id, RequestUpdate::default(), &unit)
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn assign_reviewer_and_notes() {
        let h = harness();
        let r = submitted(&h, "UBS Norte").await;
        let other = Actor::new("r-2", "Dra. Lia", Role::Reviewer, None).unwrap();

        let assigned = h
            .service
            .assign_reviewer(r.id, &other, &admin())
            .await
            .unwrap();
        assert_eq!(assigned.assigned_reviewer, Some(other.snapshot()));
        assert_eq!(
            assigned.history.last().unwrap().message,
            "Solicitação atribuída a Dra. Lia"
        );

        let err = h
            .service
            .assign_reviewer(r.id, &other, &unit_actor("UBS Norte"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::PermissionDenied(_)));

        let noted = h
            .service
            .add_note(r.id, "Paciente contactado", EventDetails::new(), &unit_actor("UBS Norte"))
            .await
            .unwrap();
        assert_eq!(noted.history.len(), 3);
        assert_eq!(noted.status, Status::Submitted);

        let err = h
            .service
            .add_note(r.id, "x", EventDetails::new(), &unit_actor("UBS Sul"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::PermissionDenied(_)));

        let history = h.service.history(r.id, &reviewer()).await.unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn delete_is_admin_only_and_terminal_only() {
        let h = harness();
        let r = submitted(&h, "UBS Norte").await;

        let err = h.service.delete(r.id, &reviewer()).await.unwrap_err();
        assert!(matches!(err, RegulationError::PermissionDenied(_)));

        let err = h.service.delete(r.id, &admin()).await.unwrap_err();
        assert!(matches!(err, RegulationError::NotTerminal(Status::Submitted)));

        h.service
            .change_status(r.id, Status::Approved, &reviewer(), TransitionDetails::default())
            .await
            .unwrap();
        h.service.delete(r.id, &admin()).await.unwrap();
        assert!(matches!(
            h.service.get(r.id, &admin()).await.unwrap_err(),
            RegulationError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn missing_request_is_not_found() {
        let h = harness();
        let id = RequestId::new();
        let err = h
            .service
            .change_status(id, Status::Submitted, &admin(), TransitionDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::NotFound(missing) if missing == id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transitions_on_one_request_are_serialised() {
        let h = harness();
        let id = submitted(&h, "UBS Norte").await.id;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let service = h.service.clone();
            tasks.push(tokio::spawn(async move {
                service
                    .change_status(id, Status::UnderReview, &reviewer(), TransitionDetails::default())
                    .await
            }));
        }

        let mut ok = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(RegulationError::InvalidTransition { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(stored(&h, id).await.history.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reprioritisations_are_never_lost() {
        let h = harness();
        let id = submitted(&h, "UBS Norte").await.id;

        let mut tasks = Vec::new();
        for i in 0..16 {
            let service = h.service.clone();
            let priority = if i % 2 == 0 { Priority::High } else { Priority::Low };
            tasks.push(tokio::spawn(async move {
                service.reprioritize(id, priority, &reviewer()).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let after = stored(&h, id).await;
        assert_eq!(after.history.len(), 17);
        assert_eq!(after.version, 17);
    }

    /// Delegates to an in-memory store but stalls on writes.
    struct StallingRepository {
        inner: InMemoryRepository,
        stall: Duration,
    }

    #[async_trait]
    impl Repository for StallingRepository {
        async fn get(&self, id: RequestId) -> RegulationResult<Option<Request>> {
            self.inner.get(id).await
        }

        async fn list(&self) -> RegulationResult<Vec<Request>> {
            self.inner.list().await
        }

        async fn insert(&self, request: Request) -> RegulationResult<Request> {
            self.inner.insert(request).await
        }

        async fn update(&self, request: Request, expected_version: u64) -> RegulationResult<Request> {
            tokio::time::sleep(self.stall).await;
            self.inner.update(request, expected_version).await
        }

        async fn delete(&self, id: RequestId) -> RegulationResult<()> {
            self.inner.delete(id).await
        }
    }

    fn short_timeout_service(repository: Arc<dyn Repository>) -> RequestLifecycleService {
        let config = CoreConfig::new(
            crate::config::RepositoryBackend::Memory,
            "unused".into(),
            Duration::from_millis(50),
            Duration::from_millis(50),
            10,
        )
        .unwrap();
        RequestLifecycleService::new(repository, Arc::new(ManualClock::new(t0())), &config)
    }

    #[tokio::test]
    async fn slow_repository_write_is_cancelled_without_mutation() {
        let repository = Arc::new(StallingRepository {
            inner: InMemoryRepository::new(),
            stall: Duration::from_millis(200),
        });
        let service = short_timeout_service(repository.clone());

        let r = service
            .create(new_request("UBS Norte", false), &unit_actor("UBS Norte"))
            .await
            .unwrap();
        let err = service
            .change_status(r.id, Status::UnderReview, &reviewer(), TransitionDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegulationError::Cancelled(_)));

        // Past the stall: the abandoned write never lands.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let after = repository.get(r.id).await.unwrap().unwrap();
        assert_eq!(after, r);
    }

    /// Commits immediately but is slow to acknowledge.
    struct LateAckRepository {
        inner: InMemoryRepository,
        delay: Duration,
    }

    #[async_trait]
    impl Repository for LateAckRepository {
        async fn get(&self, id: RequestId) -> RegulationResult<Option<Request>> {
            self.inner.get(id).await
        }

        async fn list(&self) -> RegulationResult<Vec<Request>> {
            self.inner.list().await
        }

        async fn insert(&self, request: Request) -> RegulationResult<Request> {
            let stored = self.inner.insert(request).await?;
            tokio::time::sleep(self.delay).await;
            Ok(stored)
        }

        async fn update(&self, request: Request, expected_version: u64) -> RegulationResult<Request> {
            let stored = self.inner.update(request, expected_version).await?;
            tokio::time::sleep(self.delay).await;
            Ok(stored)
        }

        async fn delete(&self, id: RequestId) -> RegulationResult<()> {
            self.inner.delete(id).await?;
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn write_committed_before_timeout_is_reported_as_success() {
        let repository = Arc::new(LateAckRepository {
            inner: InMemoryRepository::new(),
            delay: Duration::from_secs(5),
        });
        let service = short_timeout_service(repository.clone());

        let r = service
            .create(new_request("UBS Norte", false), &unit_actor("UBS Norte"))
            .await
            .unwrap();
        assert_eq!(r.version, 1);

        let reviewed = service
            .change_status(r.id, Status::UnderReview, &reviewer(), TransitionDetails::default())
            .await
            .unwrap();
        assert_eq!(reviewed.status, Status::UnderReview);
        assert_eq!(reviewed.version, 2);
        assert_eq!(repository.get(r.id).await.unwrap(), Some(reviewed.clone()));

        let denied = service
            .change_status(
                r.id,
                Status::Denied,
                &reviewer(),
                TransitionDetails {
                    justification: Some("Fora do protocolo".into()),
                    ..TransitionDetails::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(denied.version, 3);
        service.delete(denied.id, &admin()).await.unwrap();
        assert_eq!(repository.get(r.id).await.unwrap(), None);
    }
}
