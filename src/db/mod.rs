mod from_row;
pub mod queries;
mod schema;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::gateway::GatewayClient;
use crate::webhook::WebhookDispatcher;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool and service clients.
///
/// Constructed once in `main` and injected into handlers; no component
/// reaches for process-global storage.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Base URL for gateway callbacks (e.g., https://api.example.com)
    pub base_url: String,
    pub gateway: GatewayClient,
    pub webhooks: WebhookDispatcher,
    /// Platform's cut of each transaction fee, in minor units
    pub platform_fee: i64,
}

impl AppState {
    /// URL the gateway should push status callbacks to, carrying the shared
    /// secret when one is configured.
    pub fn gateway_callback_url(&self) -> String {
        let token = self.gateway.callback_token();
        if token.is_empty() {
            format!("{}/api/v1/internal/gateway/callback", self.base_url)
        } else {
            format!(
                "{}/api/v1/internal/gateway/callback?token={}",
                self.base_url,
                urlencoding::encode(token)
            )
        }
    }
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
