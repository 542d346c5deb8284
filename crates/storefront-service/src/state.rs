//! Application state.

use std::sync::Arc;

use tokio::sync::RwLock;

use storefront_core::{User, UserId};
use storefront_store::Store;

use crate::auth::JwksCache;
use crate::config::ServiceConfig;
use crate::error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Signing keys fetched from the auth provider.
    pub(crate) jwks: Arc<RwLock<JwksCache>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set - admin key authentication disabled");
        }

        Self {
            store,
            config,
            jwks: Arc::new(RwLock::new(JwksCache::new())),
        }
    }

    /// The registered profile of `user_id`.
    pub(crate) async fn profile(&self, user_id: &UserId) -> Result<User, ApiError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User profile not registered".into()))
    }
}
