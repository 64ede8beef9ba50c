//! The referral request aggregate and its supporting types.

use crate::actor::ActorSnapshot;
use crate::error::RegulationError;
use crate::status::Status;
use chrono::{DateTime, NaiveDate, Utc};
use regulacao_types::NonEmptyText;
use regulacao_uuid::RequestId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Type-specific form fields. Opaque to the lifecycle engine.
pub type TypeSpecificData = serde_json::Map<String, serde_json::Value>;

/// Free-form key/value details attached to an audit event.
pub type EventDetails = BTreeMap<String, String>;

// ============================================================================
// Catalog
// ============================================================================

/// Kind of care being requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Exame,
    Medicamento,
    Internacao,
    Procedimento,
    Consulta,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Exame => "exame",
            Category::Medicamento => "medicamento",
            Category::Internacao => "internacao",
            Category::Procedimento => "procedimento",
            Category::Consulta => "consulta",
        }
    }
}

/// The fixed catalog of request types. Identifiers are stored verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestType {
    /// Magnetic resonance / computed tomography.
    #[serde(rename = "ressonancia")]
    Ressonancia,
    #[serde(rename = "mamografia")]
    Mamografia,
    /// Specialised medication (LME).
    #[serde(rename = "lme")]
    Lme,
    /// Hospital admission (AIH).
    #[serde(rename = "aih")]
    Aih,
    #[serde(rename = "ambulatorial")]
    Ambulatorial,
    /// Specialist consultation.
    #[serde(rename = "especialidades")]
    Especialidades,
}

impl RequestType {
    pub const ALL: [RequestType; 6] = [
        RequestType::Ressonancia,
        RequestType::Mamografia,
        RequestType::Lme,
        RequestType::Aih,
        RequestType::Ambulatorial,
        RequestType::Especialidades,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Ressonancia => "ressonancia",
            RequestType::Mamografia => "mamografia",
            RequestType::Lme => "lme",
            RequestType::Aih => "aih",
            RequestType::Ambulatorial => "ambulatorial",
            RequestType::Especialidades => "especialidades",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequestType::Ressonancia => "Ressonância/Tomografia",
            RequestType::Mamografia => "Mamografia",
            RequestType::Lme => "Medicamento Especial (LME)",
            RequestType::Aih => "Internação (AIH)",
            RequestType::Ambulatorial => "Procedimento Ambulatorial",
            RequestType::Especialidades => "Consulta de Especialidade",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            RequestType::Ressonancia | RequestType::Mamografia => Category::Exame,
            RequestType::Lme => Category::Medicamento,
            RequestType::Aih => Category::Internacao,
            RequestType::Ambulatorial => Category::Procedimento,
            RequestType::Especialidades => Category::Consulta,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = RegulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| RegulationError::InvalidInput(format!("unknown request type '{s}'")))
    }
}

/// One entry of the published catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: RequestType,
    pub name: &'static str,
    pub category: Category,
}

pub fn catalog() -> Vec<CatalogEntry> {
    RequestType::ALL
        .into_iter()
        .map(|t| CatalogEntry {
            id: t,
            name: t.label(),
            category: t.category(),
        })
        .collect()
}

// ============================================================================
// Priority
// ============================================================================

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Priority {
    #[serde(rename = "baixa", alias = "low")]
    Low,
    #[default]
    #[serde(rename = "media", alias = "medium")]
    Medium,
    #[serde(rename = "alta", alias = "high")]
    High,
    #[serde(rename = "urgente", alias = "urgent")]
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "baixa",
            Priority::Medium => "media",
            Priority::High => "alta",
            Priority::Urgent => "urgente",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = RegulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "baixa" | "low" => Ok(Priority::Low),
            "media" | "medium" => Ok(Priority::Medium),
            "alta" | "high" => Ok(Priority::High),
            "urgente" | "urgent" => Ok(Priority::Urgent),
            other => Err(RegulationError::InvalidInput(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

// ============================================================================
// Patient snapshot
// ============================================================================

/// Patient and originating-unit snapshot captured with the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientData {
    pub name: String,
    pub birth_date: NaiveDate,
    /// National health-card number (CNS). Stored as given.
    #[serde(default)]
    pub health_card: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    /// Name of the submitting unit, e.g. "UBS Norte".
    #[serde(default)]
    pub origin_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_unit_code: Option<String>,
}

// ============================================================================
// Audit event
// ============================================================================

/// One immutable entry of a request's history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorSnapshot>,
    #[serde(default)]
    pub details: EventDetails,
}

// ============================================================================
// Request aggregate
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: RequestId,
    pub request_type: RequestType,
    pub patient_data: PatientData,
    #[serde(default)]
    pub type_specific_data: TypeSpecificData,
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_by: ActorSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_reviewer: Option<ActorSnapshot>,
    /// Who produced the current decision (approval, denial, return or cancellation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<ActorSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_reason: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<NonEmptyText>,
    #[serde(default)]
    pub history: Vec<AuditEvent>,
    /// Monotonic write counter used for compare-and-swap updates.
    #[serde(default)]
    pub version: u64,
}

impl Request {
    pub fn origin_unit(&self) -> &str {
        &self.patient_data.origin_unit
    }
}

/// Input for creating a request.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub request_type: RequestType,
    pub patient_data: PatientData,
    #[serde(default)]
    pub type_specific_data: TypeSpecificData,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub as_draft: bool,
}

/// Amendments to a draft or returned request. Absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUpdate {
    #[serde(default)]
    pub patient_data: Option<PatientData>,
    #[serde(default)]
    pub type_specific_data: Option<TypeSpecificData>,
}

/// Extra information supplied with a status change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDetails {
    /// Mandatory when denying.
    #[serde(default)]
    pub justification: Option<String>,
    /// Mandatory when returning; optional when cancelling.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
}

impl TransitionDetails {
    pub fn justification(text: impl Into<String>) -> Self {
        Self {
            justification: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn reason(text: impl Into<String>) -> Self {
        Self {
            reason: Some(text.into()),
            ..Self::default()
        }
    }

    /// Details as recorded on the audit event; blank values are omitted.
    pub fn to_event_details(&self) -> EventDetails {
        let mut details = EventDetails::new();
        let fields = [
            ("justification", &self.justification),
            ("reason", &self.reason),
            ("observations", &self.observations),
        ];
        for (key, value) in fields {
            if let Some(text) = NonEmptyText::from_optional(value.as_deref()) {
                details.insert(key.to_string(), text.into_inner());
            }
        }
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_stable() {
        let ids: Vec<&str> = catalog().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "ressonancia",
                "mamografia",
                "lme",
                "aih",
                "ambulatorial",
                "especialidades"
            ]
        );
        assert_eq!(RequestType::Mamografia.category(), Category::Exame);
        assert_eq!("aih".parse::<RequestType>().unwrap(), RequestType::Aih);
        assert!("cirurgia".parse::<RequestType>().is_err());
    }

    #[test]
    fn priority_wire_names() {
        assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), "\"urgente\"");
        let parsed: Priority = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(parsed, Priority::High);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn transition_details_skip_blank_values() {
        let details = TransitionDetails {
            justification: Some("  ".into()),
            reason: Some("faltou exame".into()),
            observations: None,
        };
        let map = details.to_event_details();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("reason").map(String::as_str), Some("faltou exame"));
    }

    #[test]
    fn patient_data_uses_camel_case() {
        let json = r#"{
            "name": "Maria Souza",
            "birthDate": "1980-05-02",
            "healthCard": "898001234567890",
            "originUnit": "UBS Norte"
        }"#;
        let patient: PatientData = serde_json::from_str(json).unwrap();
        assert_eq!(patient.origin_unit, "UBS Norte");
        assert_eq!(patient.cpf, None);
        assert_eq!(patient.phone, "");
    }
}
