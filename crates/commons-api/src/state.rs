use std::sync::Arc;

use tracing::error;

use commons_db::Database;
use commons_gateway::SharedBus;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub bus: SharedBus,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(db: Database, bus: SharedBus, jwt_secret: impl Into<String>) -> AppState {
        Arc::new(Self {
            db,
            bus,
            jwt_secret: jwt_secret.into(),
        })
    }
}

/// Run blocking DB work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppStateInner) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
}
