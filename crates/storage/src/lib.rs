#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{APP_STATE_KEY, InMemoryRepository, StateRepository, Storage, StorageError};
