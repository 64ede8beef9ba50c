//! Role-based permission guard.
//!
//! Capabilities are defined once, as a table from [`Role`] to the [`Action`]s it may trigger,
//! independent of any particular request. A second, request-aware rule scopes unit actors to
//! the requests originating from their own unit.

use crate::actor::{Actor, Role};
use crate::error::{RegulationError, RegulationResult};
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something an actor may attempt on a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    View,
    EditDraft,
    Submit,
    Resubmit,
    Cancel,
    StartReview,
    Approve,
    Deny,
    Return,
    Reprioritize,
    AssignReviewer,
    AddNote,
    Delete,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Action::Create,
        Action::View,
        Action::EditDraft,
        Action::Submit,
        Action::Resubmit,
        Action::Cancel,
        Action::StartReview,
        Action::Approve,
        Action::Deny,
        Action::Return,
        Action::Reprioritize,
        Action::AssignReviewer,
        Action::AddNote,
        Action::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::View => "view",
            Action::EditDraft => "edit_draft",
            Action::Submit => "submit",
            Action::Resubmit => "resubmit",
            Action::Cancel => "cancel",
            Action::StartReview => "start_review",
            Action::Approve => "approve",
            Action::Deny => "deny",
            Action::Return => "return",
            Action::Reprioritize => "reprioritize",
            Action::AssignReviewer => "assign_reviewer",
            Action::AddNote => "add_note",
            Action::Delete => "delete",
        }
    }

    /// The action that moving from `from` to `to` represents.
    ///
    /// `None` for targets no transition can produce (`rascunho`).
    pub fn for_transition(from: Status, to: Status) -> Option<Action> {
        match to {
            Status::Draft => None,
            Status::Submitted if from == Status::Returned => Some(Action::Resubmit),
            Status::Submitted => Some(Action::Submit),
            Status::UnderReview => Some(Action::StartReview),
            Status::Approved => Some(Action::Approve),
            Status::Denied => Some(Action::Deny),
            Status::Returned => Some(Action::Return),
            Status::Cancelled => Some(Action::Cancel),
        }
    }

    /// Actions a unit actor may only perform on its own unit's requests.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(
            self,
            Action::View
                | Action::EditDraft
                | Action::Submit
                | Action::Resubmit
                | Action::Cancel
                | Action::AddNote
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True if `role` may perform `action` on some request.
pub fn is_allowed(role: Role, action: Action) -> bool {
    use Action::*;
    match role {
        Role::Admin => true,
        Role::Unit => matches!(
            action,
            Create | View | EditDraft | Submit | Resubmit | Cancel | AddNote
        ),
        Role::Reviewer => matches!(
            action,
            View | StartReview | Approve | Deny | Return | Reprioritize | AssignReviewer | AddNote
        ),
    }
}

/// Checks the capability table.
pub fn check_role(actor: &Actor, action: Action) -> RegulationResult<()> {
    if is_allowed(actor.role, action) {
        return Ok(());
    }
    tracing::warn!(actor = %actor.id, role = %actor.role, %action, "action not permitted for role");
    Err(RegulationError::PermissionDenied(format!(
        "role '{}' may not {}",
        actor.role, action
    )))
}

/// Checks the ownership rule: a unit actor may only act on requests from its own unit.
///
/// Reviewers and admins are not unit-scoped.
pub fn check_ownership(actor: &Actor, action: Action, origin_unit: &str) -> RegulationResult<()> {
    if actor.role != Role::Unit || !action.is_unit_scoped() {
        return Ok(());
    }
    match actor.unit_name() {
        Some(unit) if unit == origin_unit.trim() => Ok(()),
        _ => {
            tracing::warn!(
                actor = %actor.id,
                %action,
                origin_unit,
                "unit actor attempted to act on another unit's request"
            );
            Err(RegulationError::PermissionDenied(format!(
                "unit actors may only {} requests from their own unit",
                action
            )))
        }
    }
}

/// Role check followed by the ownership check.
pub fn authorize(actor: &Actor, action: Action, origin_unit: &str) -> RegulationResult<()> {
    check_role(actor, action)?;
    check_ownership(actor, action, origin_unit)
}
