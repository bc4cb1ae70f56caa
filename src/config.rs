use std::env;

use crate::gateway::GatewayConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    /// Platform's cut of each transaction fee, in minor units.
    pub platform_fee: i64,
    /// Requests per minute allowed on the public gateway callback route,
    /// keyed by peer IP.
    pub callback_rate_limit_rpm: u32,
    /// How often the background poller re-checks stale pending transactions.
    pub poller_interval_secs: u64,
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("PAYBRIDGE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let gateway = GatewayConfig {
            base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:4000".to_string()),
            project: env::var("GATEWAY_PROJECT").unwrap_or_default(),
            api_key: env::var("GATEWAY_API_KEY").unwrap_or_default(),
            callback_token: env::var("GATEWAY_CALLBACK_TOKEN").unwrap_or_default(),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "paybridge.db".to_string()),
            base_url,
            dev_mode,
            platform_fee: env::var("PLATFORM_FEE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            callback_rate_limit_rpm: env::var("CALLBACK_RATE_LIMIT_RPM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            poller_interval_secs: env::var("POLLER_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            gateway,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
