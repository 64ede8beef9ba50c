//! Request status and the lifecycle state machine.
//!
//! The state machine is a pure function over the closed [`Status`] enum: it knows nothing about
//! who is asking, only whether `to` is an allowed successor of `from`.
//!
//! | From         | Allowed to                                          |
//! |--------------|-----------------------------------------------------|
//! | `rascunho`   | `enviado`, `cancelado`                              |
//! | `enviado`    | `em_analise`, `aprovado`, `devolvido`, `negado`, `cancelado` |
//! | `em_analise` | `aprovado`, `devolvido`, `negado`                   |
//! | `devolvido`  | `enviado`, `cancelado`                              |
//! | `aprovado`, `negado`, `cancelado` | none (terminal)                |

use crate::error::{RegulationError, RegulationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a referral request.
///
/// Serialises to the Portuguese identifiers stored by the running system; the English names
/// are accepted as aliases when parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "rascunho", alias = "draft")]
    Draft,
    #[serde(rename = "enviado", alias = "submitted")]
    Submitted,
    #[serde(rename = "em_analise", alias = "under_review")]
    UnderReview,
    #[serde(rename = "aprovado", alias = "approved")]
    Approved,
    #[serde(rename = "negado", alias = "denied")]
    Denied,
    #[serde(rename = "devolvido", alias = "returned")]
    Returned,
    #[serde(rename = "cancelado", alias = "cancelled")]
    Cancelled,
}

impl Status {
    /// Every status, in lifecycle order.
    pub const ALL: [Status; 7] = [
        Status::Draft,
        Status::Submitted,
        Status::UnderReview,
        Status::Approved,
        Status::Denied,
        Status::Returned,
        Status::Cancelled,
    ];

    /// The identifier persisted and exchanged on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "rascunho",
            Status::Submitted => "enviado",
            Status::UnderReview => "em_analise",
            Status::Approved => "aprovado",
            Status::Denied => "negado",
            Status::Returned => "devolvido",
            Status::Cancelled => "cancelado",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Status::Draft => "Rascunho",
            Status::Submitted => "Enviado",
            Status::UnderReview => "Em Análise",
            Status::Approved => "Aprovado",
            Status::Denied => "Negado",
            Status::Returned => "Devolvido",
            Status::Cancelled => "Cancelado",
        }
    }

    /// Statuses reachable from `self` in one step.
    pub fn allowed_successors(&self) -> &'static [Status] {
        match self {
            Status::Draft => &[Status::Submitted, Status::Cancelled],
            Status::Submitted => &[
                Status::UnderReview,
                Status::Approved,
                Status::Returned,
                Status::Denied,
                Status::Cancelled,
            ],
            Status::UnderReview => &[Status::Approved, Status::Returned, Status::Denied],
            Status::Returned => &[Status::Submitted, Status::Cancelled],
            Status::Approved | Status::Denied | Status::Cancelled => &[],
        }
    }

    /// Terminal statuses have no successors.
    pub fn is_terminal(&self) -> bool {
        self.allowed_successors().is_empty()
    }

    /// Draft and returned requests may still have their content amended.
    pub fn is_editable(&self) -> bool {
        matches!(self, Status::Draft | Status::Returned)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = RegulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rascunho" | "draft" => Ok(Status::Draft),
            "enviado" | "submitted" => Ok(Status::Submitted),
            "em_analise" | "under_review" => Ok(Status::UnderReview),
            "aprovado" | "approved" => Ok(Status::Approved),
            "negado" | "denied" => Ok(Status::Denied),
            "devolvido" | "returned" => Ok(Status::Returned),
            "cancelado" | "cancelled" => Ok(Status::Cancelled),
            other => Err(RegulationError::InvalidState(other.to_string())),
        }
    }
}

/// True if `to` is an allowed successor of `from`.
pub fn can_transition(from: Status, to: Status) -> bool {
    from.allowed_successors().contains(&to)
}

/// String form of [`can_transition`] for callers holding raw identifiers.
///
/// # Errors
///
/// Returns [`RegulationError::InvalidState`] if either value is not a known status; unknown
/// values are never treated as allowed.
pub fn can_transition_str(from: &str, to: &str) -> RegulationResult<bool> {
    let from: Status = from.parse()?;
    let to: Status = to.parse()?;
    Ok(can_transition(from, to))
}

/// Fails with [`RegulationError::InvalidTransition`] naming both states when the step is not
/// allowed.
pub fn ensure_transition(from: Status, to: Status) -> RegulationResult<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(RegulationError::InvalidTransition { from, to })
    }
}
