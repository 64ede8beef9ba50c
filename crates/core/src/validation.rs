//! Creation-time checks on the patient snapshot.
//!
//! Document checksum rules (CPF, CNS) are deliberately not applied here; see DESIGN.md.

use crate::constants::{MAX_PATIENT_AGE_YEARS, MIN_PATIENT_NAME_CHARS};
use crate::error::{RegulationError, RegulationResult};
use crate::request::PatientData;
use chrono::{Datelike, NaiveDate};
use regulacao_types::{NonEmptyText, TextError};

/// Validates the patient snapshot, collecting every problem rather than stopping at the first.
pub fn validate_patient_data(patient: &PatientData, today: NaiveDate) -> RegulationResult<()> {
    let mut errors = Vec::new();

    match NonEmptyText::with_min_chars(&patient.name, MIN_PATIENT_NAME_CHARS) {
        Ok(_) => {}
        Err(TextError::Empty) => errors.push("patient name is required".to_string()),
        Err(TextError::TooShort { min }) => {
            errors.push(format!("patient name must have at least {min} characters"))
        }
    }

    if patient.birth_date > today {
        errors.push("birth date cannot be in the future".to_string());
    } else if patient.birth_date < oldest_plausible_birth_date(today) {
        errors.push(format!(
            "birth date implies an age above {MAX_PATIENT_AGE_YEARS} years"
        ));
    }

    if patient.origin_unit.trim().is_empty() {
        errors.push("origin unit is required".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RegulationError::Validation(errors))
    }
}

fn oldest_plausible_birth_date(today: NaiveDate) -> NaiveDate {
    let year = today.year() - MAX_PATIENT_AGE_YEARS;
    // 29 February falls back to 28 February in non-leap years.
    NaiveDate::from_ymd_opt(year, today.month(), today.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, today.month(), 28))
        .unwrap_or(NaiveDate::MIN)
}
