//! Subcommand implementations.

pub mod admin;
pub mod seed;
pub mod shipping;

use agora_web::backend::BackendClient;
use agora_web::config::BackendConfig;

/// Build a backend client from `BACKEND_*` variables (and `.env`).
///
/// # Errors
///
/// Returns an error if configuration is missing or the client fails to build.
fn backend_from_env() -> Result<BackendClient, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = BackendConfig::from_env()?;
    tracing::info!(url = %config.url, "Connecting to backend");
    Ok(BackendClient::new(&config)?)
}
