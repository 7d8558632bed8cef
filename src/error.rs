//! Crate-wide error taxonomy.
//!
//! Input-validation errors (bad hostname, invalid fanout, negative peer
//! index) surface here and are rejected at construction time. Transient
//! network errors, decode failures and stale/unknown-id cases are *not*
//! represented as [`HubError`] — they are logged and absorbed at the call
//! site rather than propagated.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid peer index: {0}")]
    InvalidIndex(i64),
}

pub type HubResult<T> = Result<T, HubError>;
