//! Request identifiers and sharded-path utilities.
//!
//! Every referral request is addressed by a UUID in *canonical* form: **32 lowercase
//! hexadecimal characters** (no hyphens), e.g. `550e8400e29b41d4a716446655440000`.
//!
//! This crate provides:
//! - [`RequestId`], a wrapper that *guarantees* the canonical format once constructed.
//! - Sharding logic used by the file-backed repository to derive a request's directory.
//!
//! ## Sharded directory layout
//! For a canonical id `u`, request documents live under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `regulacao_data/requests/55/0e/550e8400e29b41d4a716446655440000/request.json`
//!
//! This keeps the fan-out of any single directory small even with millions of requests.

mod request_id;

pub use request_id::{RequestId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
