use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub dev_relax_host_safety: bool,
    pub max_pages_hard_limit: u32,
    pub max_depth_hard_limit: u32,
    pub worker_pool_size: usize,
    pub worker_poll_interval_ms: u64,
    pub scan_rate_limit_per_minute: u32,
    pub screenshot_rate_limit_per_minute: u32,
    pub api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://sitegraph.db".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("PORT", "must be a valid u16"))?;

        let dev_relax_host_safety = env::var("DEV_RELAX_HOST_SAFETY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let max_pages_hard_limit = env::var("MAX_PAGES_HARD_LIMIT")
            .unwrap_or_else(|_| "2000".to_string())
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue("MAX_PAGES_HARD_LIMIT", "must be a valid u32")
            })?;

        let max_depth_hard_limit = env::var("MAX_DEPTH_HARD_LIMIT")
            .unwrap_or_else(|_| "20".to_string())
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue("MAX_DEPTH_HARD_LIMIT", "must be a valid u32")
            })?;

        let worker_pool_size = env::var("WORKER_POOL_SIZE")
            .unwrap_or_else(|_| "4".to_string())
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue("WORKER_POOL_SIZE", "must be a valid usize"))?;

        let worker_poll_interval_ms = env::var("WORKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("WORKER_POLL_INTERVAL_MS", "must be a valid u64")
            })?;

        let scan_rate_limit_per_minute = env::var("SCAN_RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue("SCAN_RATE_LIMIT_PER_MINUTE", "must be a valid u32")
            })?;

        let screenshot_rate_limit_per_minute = env::var("SCREENSHOT_RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "SCREENSHOT_RATE_LIMIT_PER_MINUTE",
                    "must be a valid u32",
                )
            })?;

        let api_key = env::var("API_KEY").ok();

        Ok(Config {
            database_url,
            port,
            dev_relax_host_safety,
            max_pages_hard_limit,
            max_depth_hard_limit,
            worker_pool_size,
            worker_poll_interval_ms,
            scan_rate_limit_per_minute,
            screenshot_rate_limit_per_minute,
            api_key,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, &'static str),
}
