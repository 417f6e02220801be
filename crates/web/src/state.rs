//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::{BackendClient, BackendError};
use crate::config::AppConfig;
use crate::payments::{GatewayError, Gateways};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("backend client: {0}")]
    Backend(#[from] BackendError),
    #[error("payment gateways: {0}")]
    Gateway(#[from] GatewayError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the backend client, the gateway clients and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    backend: BackendClient,
    gateways: Gateways,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client fails to build.
    pub fn new(config: AppConfig) -> Result<Self, StateError> {
        let backend = BackendClient::new(&config.backend)?;
        let gateways = Gateways::new(&config.gateways)?;
        Ok(Self::from_parts(config, backend, gateways))
    }

    /// Assemble state from prebuilt clients (tests point them at local servers).
    #[must_use]
    pub fn from_parts(config: AppConfig, backend: BackendClient, gateways: Gateways) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                gateways,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get a reference to the managed backend client.
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Get a reference to the configured payment gateways.
    #[must_use]
    pub fn gateways(&self) -> &Gateways {
        &self.inner.gateways
    }
}
