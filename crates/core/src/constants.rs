//! Constants used throughout the regulation core crate.

/// Directory (under the data dir) holding the sharded request documents.
pub const REQUESTS_DIR_NAME: &str = "requests";

/// Filename of a persisted request document.
pub const REQUEST_JSON_FILENAME: &str = "request.json";

/// Advisory lock file next to each request document, shared by every process on the store.
pub const REQUEST_LOCK_FILENAME: &str = "request.lock";

/// Default directory for request storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "regulacao_data";

/// Default bound on a single repository call.
pub const DEFAULT_REPOSITORY_TIMEOUT_MS: u64 = 5_000;

/// Default bound on waiting for another writer of the same request.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;

/// Page size used by the request listings.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Minimum length of a patient's name once trimmed.
pub const MIN_PATIENT_NAME_CHARS: usize = 3;

/// Oldest plausible patient age, in years.
pub const MAX_PATIENT_AGE_YEARS: i32 = 120;
