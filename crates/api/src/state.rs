use std::sync::Arc;

use pixelforge_db::store::UserStore;

use crate::config::ServerConfig;
use crate::service::JobService;
use crate::ws::LiveRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (JWT secret, limits).
    pub config: Arc<ServerConfig>,
    /// Job submission and queries.
    pub jobs: Arc<JobService>,
    /// Accounts for registration and sign-in.
    pub users: Arc<dyn UserStore>,
    /// Live connections of this process, keyed by job id.
    pub registry: Arc<LiveRegistry>,
}
