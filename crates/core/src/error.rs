use crate::status::Status;
use regulacao_uuid::RequestId;

#[derive(Debug, thiserror::Error)]
pub enum RegulationError {
    #[error("request not found: {0}")]
    NotFound(RequestId),
    #[error("invalid status value: '{0}'")]
    InvalidState(String),
    #[error("invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: Status, to: Status },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("a justification is required to deny a request")]
    MissingJustification,
    #[error("a reason is required to return a request")]
    MissingReason,
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("request in status '{0}' cannot be edited")]
    NotEditable(Status),
    #[error("only terminal requests can be deleted (current status '{0}')")]
    NotTerminal(Status),
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to read request file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write request file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to remove request file: {0}")]
    FileRemove(std::io::Error),
    #[error("failed to serialize request: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize request: {0}")]
    Deserialization(serde_json::Error),
    #[error("repository error: {0}")]
    Repository(String),
}

impl RegulationError {
    /// True for failures of the underlying storage rather than of a business rule.
    pub fn is_repository(&self) -> bool {
        matches!(
            self,
            Self::StorageDirCreation(_)
                | Self::FileRead(_)
                | Self::FileWrite(_)
                | Self::FileRemove(_)
                | Self::Serialization(_)
                | Self::Deserialization(_)
                | Self::Repository(_)
        )
    }
}

impl From<regulacao_uuid::UuidError> for RegulationError {
    fn from(err: regulacao_uuid::UuidError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type RegulationResult<T> = std::result::Result<T, RegulationError>;
