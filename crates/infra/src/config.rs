use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SdkConfig {
    pub app_env: String,
    pub log_level: String,
    pub api_key: String,
    pub backend_base_url: String,
    pub backend_timeout_ms: u64,
    pub backend_retry_max_attempts: u32,
    pub backend_retry_backoff_base_ms: u64,
    pub backend_retry_backoff_max_ms: u64,
    pub cache_dir: String,
}

impl SdkConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("log_level", "info")?
            .set_default("api_key", "")?
            .set_default("backend_base_url", "https://api.langgan.dev/v1")?
            .set_default("backend_timeout_ms", 10_000)?
            .set_default("backend_retry_max_attempts", 3)?
            .set_default("backend_retry_backoff_base_ms", 250)?
            .set_default("backend_retry_backoff_max_ms", 5_000)?
            .set_default("cache_dir", ".langgan-cache")?
            .add_source(config::Environment::with_prefix("LANGGAN").separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}
