//! Fixtures shared by the unit tests of this crate.

use crate::actor::{Actor, Role};
use crate::request::{PatientData, Priority, Request, RequestType};
use crate::status::Status;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regulacao_uuid::RequestId;

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
}

pub(crate) fn unit_actor(unit: &str) -> Actor {
    Actor::new("u-norte", "Ana Enfermeira", Role::Unit, Some(unit)).unwrap()
}

pub(crate) fn reviewer() -> Actor {
    Actor::new("r-1", "Dr. Paulo", Role::Reviewer, None).unwrap()
}

pub(crate) fn admin() -> Actor {
    Actor::new("a-1", "Administração", Role::Admin, None).unwrap()
}

pub(crate) fn patient(unit: &str) -> PatientData {
    PatientData {
        name: "Maria Souza".into(),
        birth_date: NaiveDate::from_ymd_opt(1980, 5, 2).unwrap(),
        health_card: "898001234567890".into(),
        cpf: None,
        address: "Rua das Flores, 10".into(),
        phone: "(11) 98765-4321".into(),
        origin_unit: unit.into(),
        origin_unit_code: None,
    }
}

/// An unsaved draft originating from `unit`.
pub(crate) fn sample_request(unit: &str) -> Request {
    let at = t0();
    Request {
        id: RequestId::new(),
        request_type: RequestType::Ressonancia,
        patient_data: patient(unit),
        type_specific_data: Default::default(),
        status: Status::Draft,
        priority: Priority::Medium,
        created_at: at,
        updated_at: at,
        status_changed_at: at,
        submitted_at: None,
        created_by: unit_actor(unit).snapshot(),
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
