//! Append-only audit trail.

use crate::actor::Actor;
use crate::request::{AuditEvent, EventDetails, Request};
use chrono::{DateTime, Utc};

/// Returns `request` with one more event at the end of its history.
///
/// Earlier entries are moved across untouched. `updatedAt` follows the event timestamp.
pub fn append(
    mut request: Request,
    timestamp: DateTime<Utc>,
    message: impl Into<String>,
    actor: Option<&Actor>,
    details: EventDetails,
) -> Request {
    request.history.push(AuditEvent {
        timestamp,
        message: message.into(),
        actor: actor.map(Actor::snapshot),
        details,
    });
    request.updated_at = timestamp;
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::request::{PatientData, Priority, RequestType};
    use crate::status::Status;
    use chrono::{NaiveDate, TimeZone};
    use regulacao_uuid::RequestId;

    fn sample(at: DateTime<Utc>) -> Request {
        let actor = Actor::new("u1", "Ana", Role::Unit, Some("UBS Norte")).unwrap();
        Request {
            id: RequestId::new(),
            request_type: RequestType::Mamografia,
            patient_data: PatientData {
                name: "Maria Souza".into(),
                birth_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
                health_card: String::new(),
                cpf: None,
                address: String::new(),
                phone: String::new(),
                origin_unit: "UBS Norte".into(),
                origin_unit_code: None,
            },
            type_specific_data: Default::default(),
            status: Status::Draft,
            priority: Priority::Medium,
            created_at: at,
            updated_at: at,
            status_changed_at: at,
            submitted_at: None,
            created_by: actor.snapshot(),
            assigned_reviewer: None,
            decided_by: None,
            justification: None,
            return_reason: None,
            cancel_reason: None,
            observations: None,
            history: Vec::new(),
            version: 0,
        }
    }

    #[test]
    fn append_adds_exactly_one_event_last() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let reviewer = Actor::new("r1", "Dr. Paulo", Role::Reviewer, None).unwrap();

        let first = append(sample(t0), t0, "primeiro", None, EventDetails::new());
        let before = first.history.clone();

        let mut details = EventDetails::new();
        details.insert("reviewer".into(), "r1".into());
        let second = append(first, t1, "segundo", Some(&reviewer), details);

        assert_eq!(second.history.len(), 2);
        assert_eq!(second.history[..1], before[..]);
        let last = second.history.last().unwrap();
        assert_eq!(last.message, "segundo");
        assert_eq!(last.actor.as_ref().map(|a| a.id.as_str()), Some("r1"));
        assert_eq!(second.updated_at, t1);
    }
}
