#![forbid(unsafe_code)]

pub mod app_context;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod remote;
pub mod set_cache;
pub mod state_service;
pub mod sync_service;

pub use flashcard_core::Clock;

pub use app_context::AppContext;
pub use config::{AppConfig, RemoteConfig};
pub use error::{AppContextError, ConfigError, RemoteError, StateError, SyncError};
pub use reconciler::{ReconcileTask, Reconciler};
pub use remote::{HttpRemoteApi, InMemoryRemote, RemoteApi, RemoteCall};
pub use set_cache::SetCache;
pub use state_service::StateService;
pub use sync_service::{SyncReport, SyncService};
