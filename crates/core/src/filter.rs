//! Filter engine, pagination and dashboard summaries over request listings.
//!
//! Everything here is pure: inputs are borrowed, results are new collections, and the relative
//! order of the input is preserved.

use crate::actor::{Actor, Role};
use crate::request::{Category, Request, RequestType};
use crate::status::Status;
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conjunctive filter over requests. `None` / `false` means "no restriction".
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub request_type: Option<RequestType>,
    /// Case-insensitive substring of the origin unit name.
    #[serde(default)]
    pub unit_substring: Option<String>,
    /// Case-insensitive substring of the patient name.
    #[serde(default)]
    pub patient_substring: Option<String>,
    /// Inclusive lower bound on the creation date, as a calendar day in the configured offset.
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the creation date, covering the whole day.
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub only_mine: bool,
}

impl RequestFilter {
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_substring = Some(unit.into());
        self
    }

    pub fn only_mine(mut self) -> Self {
        self.only_mine = true;
        self
    }

    /// [`matches_in`](Self::matches_in) with dates read in UTC.
    pub fn matches(&self, request: &Request, actor: &Actor) -> bool {
        self.matches_in(request, actor, Utc.fix())
    }

    /// Date bounds compare the creation instant's calendar day at `offset`.
    pub fn matches_in(&self, request: &Request, actor: &Actor, offset: FixedOffset) -> bool {
        if self.status.is_some_and(|s| s != request.status) {
            return false;
        }
        if self.request_type.is_some_and(|t| t != request.request_type) {
            return false;
        }
        if !contains_ignore_case(&request.patient_data.origin_unit, self.unit_substring.as_deref())
        {
            return false;
        }
        if !contains_ignore_case(&request.patient_data.name, self.patient_substring.as_deref()) {
            return false;
        }

        let created = request.created_at.with_timezone(&offset).date_naive();
        if self.date_from.is_some_and(|from| created < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| created > to) {
            return false;
        }

        !self.only_mine || is_mine(request, actor)
    }
}

/// Returns the requests matching `filter`, in input order, with dates read in UTC.
pub fn apply(requests: &[Request], filter: &RequestFilter, actor: &Actor) -> Vec<Request> {
    apply_in(requests, filter, actor, Utc.fix())
}

pub fn apply_in(
    requests: &[Request],
    filter: &RequestFilter,
    actor: &Actor,
    offset: FixedOffset,
) -> Vec<Request> {
    requests
        .iter()
        .filter(|r| filter.matches_in(r, actor, offset))
        .cloned()
        .collect()
}

/// "Mine" depends on the role: own unit for `ubs`, assigned to me for `regulador`,
/// everything for `admin`.
pub fn is_mine(request: &Request, actor: &Actor) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Unit => actor
            .unit_name()
            .is_some_and(|unit| unit == request.patient_data.origin_unit.trim()),
        Role::Reviewer => request
            .assigned_reviewer
            .as_ref()
            .is_some_and(|r| r.id == actor.id.as_str()),
    }
}

fn contains_ignore_case(haystack: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim) {
        None | Some("") => true,
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// 1-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub per_page: usize,
}

impl Page {
    /// Page numbers below 1 are treated as the first page; a zero page size as one.
    pub fn new(number: usize, per_page: usize) -> Self {
        Self {
            number: number.max(1),
            per_page: per_page.max(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOf<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

pub fn paginate<T>(items: Vec<T>, page: Page) -> PageOf<T> {
    let total = items.len();
    let total_pages = total.div_ceil(page.per_page);
    let items = items
        .into_iter()
        .skip((page.number - 1).saturating_mul(page.per_page))
        .take(page.per_page)
        .collect();
    PageOf {
        items,
        total,
        page: page.number,
        per_page: page.per_page,
        total_pages,
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Counts over a filtered listing. Every status, type and category is present, zero or not.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    /// Mean days from submission to approval over approved requests, one decimal; 0 if none.
    pub average_review_days: f64,
}

const SECONDS_PER_DAY: f64 = 86_400.0;

pub fn summarize(requests: &[Request]) -> Summary {
    let mut by_status: BTreeMap<String, usize> = Status::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut by_category: BTreeMap<String, usize> = [
        Category::Exame,
        Category::Medicamento,
        Category::Internacao,
        Category::Procedimento,
        Category::Consulta,
    ]
    .iter()
    .map(|c| (c.as_str().to_string(), 0))
    .collect();
    let mut by_type: BTreeMap<String, usize> = RequestType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();

    let mut review_days = 0.0;
    let mut approved = 0usize;
    for request in requests {
        *by_status.entry(request.status.as_str().to_string()).or_default() += 1;
        *by_type.entry(request.request_type.as_str().to_string()).or_default() += 1;
        *by_category
            .entry(request.request_type.category().as_str().to_string())
            .or_default() += 1;

        // Records without submittedAt are skipped.
        if let (Status::Approved, Some(submitted_at)) = (request.status, request.submitted_at) {
            let elapsed = request.status_changed_at - submitted_at;
            review_days += elapsed.num_seconds() as f64 / SECONDS_PER_DAY;
            approved += 1;
        }
    }

    let average_review_days = if approved == 0 {
        0.0
    } else {
        (review_days / approved as f64 * 10.0).round() / 10.0
    };

    Summary {
        total: requests.len(),
        by_status,
        by_type,
        by_category,
        average_review_days,
    }
}
