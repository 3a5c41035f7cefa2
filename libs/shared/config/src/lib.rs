use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub clinic_store_url: String,
    pub clinic_store_api_key: String,
    pub availability_cache_ttl_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            clinic_store_url: env::var("CLINIC_STORE_URL")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_STORE_URL not set, using empty value");
                    String::new()
                }),
            clinic_store_api_key: env::var("CLINIC_STORE_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_STORE_API_KEY not set, using empty value");
                    String::new()
                }),
            availability_cache_ttl_seconds: env::var("AVAILABILITY_CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.clinic_store_url.is_empty() && !self.clinic_store_api_key.is_empty()
    }
}
