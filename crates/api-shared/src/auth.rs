/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing API key")]
    Missing,
    #[error("invalid API key")]
    Invalid,
}

/// Validates the provided API key against the key configured at startup.
///
/// Returns `Ok(())` if the key matches, or an error if it is absent or different.
pub fn validate_api_key(expected: &str, provided: Option<&str>) -> Result<(), AuthError> {
    match provided {
        None => Err(AuthError::Missing),
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(AuthError::Invalid),
    }
}
