//! # API Shared
//!
//! Shared utilities and definitions for the regulation APIs.
//!
//! Contains:
//! - Wire DTOs (`dto` module) with OpenAPI schemas, converted from the core types
//! - Shared services like `HealthService`
//! - API-key authentication
//!
//! The core crate knows nothing about the wire; everything serialised to HTTP clients goes
//! through the types here.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{validate_api_key, AuthError};
pub use dto::*;
pub use health::HealthService;
