use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or structurally invalid credentials/configuration.
    /// Never retried automatically; the user has to act.
    #[error("configuration error: {0}")]
    Config(String),

    /// The provider rejected the bearer secret (HTTP 401/403).
    /// Aborts the current run; surfaced distinctly so a caller can
    /// prompt for re-entry of credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Connection failure or timeout. The next scheduled run retries
    /// naturally; nothing retries within the current run.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Unexpected non-2xx from a provider API.
    #[error("provider error (HTTP {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("invalid sync frequency: {0:?} (expected hourly, daily, or weekly)")]
    InvalidFrequency(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
