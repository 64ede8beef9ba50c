//! Wire types for the REST surface.
//!
//! Field names are camelCase and enum values are the stored Portuguese identifiers, so the JSON
//! seen by clients matches the persisted records. Inbound enum values arrive as strings and are
//! parsed with the core's `FromStr` implementations, which keeps error reporting in the core's
//! taxonomy (`InvalidState`, `InvalidInput`) instead of a generic deserialisation failure.

use chrono::{DateTime, NaiveDate, Utc};
use regulacao_core::{
    ActorSnapshot, AuditEvent, CatalogEntry, NewRequest, PageOf, PatientData, Priority, Request,
    RegulationResult, RequestFilter, RequestType, RequestUpdate, Status, Summary,
    TransitionDetails, TypeSpecificData,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

// ============================================================================
// Shared
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Error body for every non-2xx response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// Stable machine-readable code, e.g. `invalid_transition`.
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActorRes {
    pub id: String,
    pub name: String,
    /// `ubs`, `regulador` or `admin`.
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl From<&ActorSnapshot> for ActorRes {
    fn from(actor: &ActorSnapshot) -> Self {
        Self {
            id: actor.id.clone(),
            name: actor.name.clone(),
            role: actor.role.as_str().to_string(),
            unit: actor.unit.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientDataDto {
    pub name: String,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub health_card: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    /// Defaults to the caller's unit for `ubs` callers.
    #[serde(default)]
    pub origin_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_unit_code: Option<String>,
}

impl From<&PatientData> for PatientDataDto {
    fn from(p: &PatientData) -> Self {
        Self {
            name: p.name.clone(),
            birth_date: p.birth_date,
            health_card: p.health_card.clone(),
            cpf: p.cpf.clone(),
            address: p.address.clone(),
            phone: p.phone.clone(),
            origin_unit: p.origin_unit.clone(),
            origin_unit_code: p.origin_unit_code.clone(),
        }
    }
}

impl From<PatientDataDto> for PatientData {
    fn from(p: PatientDataDto) -> Self {
        Self {
            name: p.name,
            birth_date: p.birth_date,
            health_card: p.health_card,
            cpf: p.cpf,
            address: p.address,
            phone: p.phone,
            origin_unit: p.origin_unit,
            origin_unit_code: p.origin_unit_code,
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestReq {
    /// One of the catalog ids, e.g. `ressonancia`.
    pub request_type: String,
    pub patient_data: PatientDataDto,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub type_specific_data: TypeSpecificData,
    /// `baixa`, `media`, `alta` or `urgente`; defaults to `media`.
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub as_draft: bool,
}

impl CreateRequestReq {
    pub fn into_new_request(self) -> RegulationResult<NewRequest> {
        Ok(NewRequest {
            request_type: self.request_type.parse::<RequestType>()?,
            patient_data: self.patient_data.into(),
            type_specific_data: self.type_specific_data,
            priority: self.priority.map(|p| p.parse::<Priority>()).transpose()?,
            as_draft: self.as_draft,
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestReq {
    #[serde(default)]
    pub patient_data: Option<PatientDataDto>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub type_specific_data: Option<TypeSpecificData>,
}

impl From<UpdateRequestReq> for RequestUpdate {
    fn from(req: UpdateRequestReq) -> Self {
        Self {
            patient_data: req.patient_data.map(Into::into),
            type_specific_data: req.type_specific_data,
        }
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStatusReq {
    /// Target status identifier, e.g. `em_analise`.
    pub target_status: String,
    /// Required when denying.
    #[serde(default)]
    pub justification: Option<String>,
    /// Required when returning; optional when cancelling.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
}

impl ChangeStatusReq {
    pub fn into_parts(self) -> RegulationResult<(Status, TransitionDetails)> {
        let target = self.target_status.parse::<Status>()?;
        Ok((
            target,
            TransitionDetails {
                justification: self.justification,
                reason: self.reason,
                observations: self.observations,
            },
        ))
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ReprioritizeReq {
    pub priority: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct AddNoteReq {
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignReviewerReq {
    pub reviewer_id: String,
    pub reviewer_name: String,
    /// Defaults to `regulador`.
    #[serde(default)]
    pub reviewer_role: Option<String>,
}

/// Query parameters accepted by the listing endpoints.
#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub request_type: Option<String>,
    /// Case-insensitive substring of the origin unit.
    pub unit: Option<String>,
    /// Case-insensitive substring of the patient name.
    pub patient: Option<String>,
    pub date_from: Option<NaiveDate>,
    /// Inclusive; covers the whole day.
    pub date_to: Option<NaiveDate>,
    pub only_mine: Option<bool>,
    /// 1-based.
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl ListQuery {
    pub fn to_filter(&self) -> RegulationResult<RequestFilter> {
        Ok(RequestFilter {
            status: self
                .status
                .as_deref()
                .map(str::parse::<Status>)
                .transpose()?,
            request_type: self
                .request_type
                .as_deref()
                .map(str::parse::<RequestType>)
                .transpose()?,
            unit_substring: self.unit.clone(),
            patient_substring: self.patient.clone(),
            date_from: self.date_from,
            date_to: self.date_to,
            only_mine: self.only_mine.unwrap_or(false),
        })
    }
}

// ============================================================================
// Outbound
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct AuditEventRes {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorRes>,
    pub details: BTreeMap<String, String>,
}

impl From<&AuditEvent> for AuditEventRes {
    fn from(event: &AuditEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            message: event.message.clone(),
            actor: event.actor.as_ref().map(ActorRes::from),
            details: event.details.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestRes {
    pub id: String,
    pub request_type: String,
    pub patient_data: PatientDataDto,
    #[schema(value_type = Object)]
    pub type_specific_data: TypeSpecificData,
    pub status: String,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_by: ActorRes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_reviewer: Option<ActorRes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<ActorRes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    pub history: Vec<AuditEventRes>,
    pub version: u64,
}

impl From<&Request> for RequestRes {
    fn from(r: &Request) -> Self {
        let text = |t: &Option<regulacao_core::NonEmptyText>| t.as_ref().map(|t| t.to_string());
        Self {
            id: r.id.to_string(),
            request_type: r.request_type.as_str().to_string(),
            patient_data: PatientDataDto::from(&r.patient_data),
            type_specific_data: r.type_specific_data.clone(),
            status: r.status.as_str().to_string(),
            priority: r.priority.as_str().to_string(),
            created_at: r.created_at,
            updated_at: r.updated_at,
            status_changed_at: r.status_changed_at,
            submitted_at: r.submitted_at,
            created_by: ActorRes::from(&r.created_by),
            assigned_reviewer: r.assigned_reviewer.as_ref().map(ActorRes::from),
            decided_by: r.decided_by.as_ref().map(ActorRes::from),
            justification: text(&r.justification),
            return_reason: text(&r.return_reason),
            cancel_reason: text(&r.cancel_reason),
            observations: text(&r.observations),
            history: r.history.iter().map(AuditEventRes::from).collect(),
            version: r.version,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestPageRes {
    pub items: Vec<RequestRes>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

impl From<&PageOf<Request>> for RequestPageRes {
    fn from(page: &PageOf<Request>) -> Self {
        Self {
            items: page.items.iter().map(RequestRes::from).collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages: page.total_pages,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct HistoryRes {
    pub id: String,
    pub events: Vec<AuditEventRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRes {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Keyed by catalog id, e.g. `ressonancia`.
    pub by_type: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    /// Mean days from submission to approval, one decimal.
    pub average_review_days: f64,
}

impl From<Summary> for SummaryRes {
    fn from(s: Summary) -> Self {
        Self {
            total: s.total,
            by_status: s.by_status,
            by_type: s.by_type,
            by_category: s.by_category,
            average_review_days: s.average_review_days,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct CatalogEntryRes {
    pub id: String,
    pub name: String,
    pub category: String,
}

impl From<&CatalogEntry> for CatalogEntryRes {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            id: entry.id.as_str().to_string(),
            name: entry.name.to_string(),
            category: entry.category.as_str().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct CatalogRes {
    pub types: Vec<CatalogEntryRes>,
}
