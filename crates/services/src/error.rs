//! Shared error types for the services crate.

use thiserror::Error;

use flashcard_core::model::{SetError, SetId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `StateService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateError {
    #[error("flashcard set {0} not found")]
    SetNotFound(SetId),
    #[error(transparent)]
    Set(#[from] SetError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `RemoteApi` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("no remote API is configured")]
    Disabled,
    #[error("remote request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("remote rejected the request: {0}")]
    Rejected(String),
}

/// Errors emitted by `SyncService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Errors emitted while reading configuration from the environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("FLASHCARDS_DB_URL cannot be empty")]
    EmptyDbUrl,
    #[error("invalid FLASHCARDS_RECONCILE_SECS value: {raw}")]
    InvalidReconcileInterval { raw: String },
}

/// Errors emitted while bootstrapping the app context.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppContextError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
