use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;

use crate::admission::cache::CacheSettings;
use crate::admission::rate_limit::RateLimitSettings;
use crate::admission::session::SessionSettings;

pub const SUPPORTED_FORMATS: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub max_requests_per_user: usize,
    pub rate_limit_window: u64,
    pub max_file_size: u64,
    pub cache_max_size: usize,
    pub cache_ttl_seconds: u64,
    pub session_ttl_seconds: u64,
    pub max_processing_size: u32,
    pub pipeline_timeout_seconds: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            max_requests_per_user: env_usize("MAX_REQUESTS_PER_USER", 10),
            rate_limit_window: env_u64("RATE_LIMIT_WINDOW", 3600),
            max_file_size: env_u64("MAX_FILE_SIZE", 20 * 1024 * 1024),
            cache_max_size: env_usize("CACHE_MAX_SIZE", 50),
            cache_ttl_seconds: env_u64("CACHE_TTL_SECONDS", 3600),
            session_ttl_seconds: env_u64("SESSION_TTL_SECONDS", 0),
            max_processing_size: env_u32("MAX_PROCESSING_SIZE", 4096),
            pipeline_timeout_seconds: env_u64("PIPELINE_TIMEOUT_SECONDS", 120),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_requests_per_user == 0 {
            return Err(anyhow!("MAX_REQUESTS_PER_USER must be at least 1"));
        }
        if self.rate_limit_window == 0 {
            return Err(anyhow!("RATE_LIMIT_WINDOW must be at least 1 second"));
        }
        if self.cache_max_size == 0 {
            return Err(anyhow!("CACHE_MAX_SIZE must be at least 1"));
        }
        if self.max_processing_size == 0 {
            return Err(anyhow!("MAX_PROCESSING_SIZE must be at least 1"));
        }
        Ok(())
    }

    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            max_requests: self.max_requests_per_user,
            window: Duration::from_secs(self.rate_limit_window),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            max_size: self.cache_max_size,
            ttl: Duration::from_secs(self.cache_ttl_seconds),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            ttl: (self.session_ttl_seconds > 0)
                .then(|| Duration::from_secs(self.session_ttl_seconds)),
        }
    }

    pub fn pipeline_timeout(&self) -> Option<Duration> {
        (self.pipeline_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.pipeline_timeout_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            log_level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            max_requests_per_user: 10,
            rate_limit_window: 3600,
            max_file_size: 20 * 1024 * 1024,
            cache_max_size: 50,
            cache_ttl_seconds: 3600,
            session_ttl_seconds: 0,
            max_processing_size: 4096,
            pipeline_timeout_seconds: 120,
        }
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        env::set_var("IMAGEBOT_TEST_U64", "not-a-number");
        env::set_var("IMAGEBOT_TEST_USIZE", " 12 ");
        env::set_var("IMAGEBOT_TEST_U32", "-3");
        assert_eq!(env_u64("IMAGEBOT_TEST_U64", 7), 7);
        assert_eq!(env_usize("IMAGEBOT_TEST_USIZE", 1), 12);
        assert_eq!(env_u32("IMAGEBOT_TEST_U32", 4096), 4096);
        assert_eq!(env_u64("IMAGEBOT_TEST_UNSET", 3), 3);
    }

    #[test]
    fn zero_session_ttl_means_sessions_never_expire() {
        let config = base_config();
        assert!(config.session_settings().ttl.is_none());
    }

    #[test]
    fn rejects_zero_request_budget() {
        let mut config = base_config();
        config.max_requests_per_user = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn derives_store_settings_from_fields() {
        let mut config = base_config();
        config.session_ttl_seconds = 900;
        config.pipeline_timeout_seconds = 0;

        assert_eq!(config.rate_limit_settings().max_requests, 10);
        assert_eq!(
            config.cache_settings().ttl,
            Duration::from_secs(3600)
        );
        assert_eq!(
            config.session_settings().ttl,
            Some(Duration::from_secs(900))
        );
        assert!(config.pipeline_timeout().is_none());
    }
}
