use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::admission::cache::{CacheSettings, ResultCache};
use crate::admission::rate_limit::{RateLimitSettings, RateLimiter};
use crate::admission::session::{SessionSettings, SessionStore};
use crate::config::Config;
use crate::imaging::pipeline::ImagePipeline;

#[derive(Debug, Clone, Copy)]
pub struct StateSettings {
    pub rate_limit: RateLimitSettings,
    pub session: SessionSettings,
    pub cache: CacheSettings,
    pub max_file_size: u64,
    pub max_processing_size: u32,
    pub pipeline_timeout: Option<Duration>,
}

/// Per-process context handed to every handler. The stores are only touched
/// from async tasks; pixel work on the blocking pool never sees them.
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    pub sessions: Arc<Mutex<SessionStore>>,
    pub cache: Arc<Mutex<ResultCache>>,
    pub pipeline: ImagePipeline,
    pub pipeline_timeout: Option<Duration>,
    pub max_file_size: u64,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::with_settings(StateSettings {
            rate_limit: config.rate_limit_settings(),
            session: config.session_settings(),
            cache: config.cache_settings(),
            max_file_size: config.max_file_size,
            max_processing_size: config.max_processing_size,
            pipeline_timeout: config.pipeline_timeout(),
        })
    }

    pub fn with_settings(settings: StateSettings) -> Self {
        AppState {
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(settings.rate_limit))),
            sessions: Arc::new(Mutex::new(SessionStore::new(settings.session))),
            cache: Arc::new(Mutex::new(ResultCache::new(settings.cache))),
            pipeline: ImagePipeline::new(settings.max_processing_size),
            pipeline_timeout: settings.pipeline_timeout,
            max_file_size: settings.max_file_size,
        }
    }
}
