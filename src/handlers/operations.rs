use std::future::Future;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::admission::cache::CacheKey;
use crate::admission::session::{SessionLookup, SessionRecord, UploadKind};
use crate::imaging::pipeline::Operation;
use crate::imaging::PipelineError;
use crate::state::AppState;
use crate::utils::media::{format_file_size, log_user_action, validate_upload, UploadError};
use crate::utils::timing::{complete_operation_timer, log_pipeline_timing, start_operation_timer};

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("rate limit reached, try again later")]
    RateLimited { reset_at: Option<Instant> },
    #[error("no image has been uploaded yet")]
    SessionAbsent,
    #[error("the uploaded image has expired, please send it again")]
    SessionExpired,
    #[error("failed to fetch asset {asset}: {reason}")]
    Fetch { asset: String, reason: String },
    #[error("image processing failed: {0}")]
    Processing(#[from] PipelineError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl OperationError {
    fn status(&self) -> &'static str {
        match self {
            OperationError::RateLimited { .. } => "rate_limited",
            OperationError::SessionAbsent => "no_session",
            OperationError::SessionExpired => "session_expired",
            OperationError::Fetch { .. } => "fetch_failed",
            OperationError::Processing(_) => "error",
            OperationError::Upload(_) => "rejected",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub asset_reference: String,
    pub bytes: Vec<u8>,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub user_id: i64,
    pub remaining_requests: usize,
    pub reset_in_seconds: Option<u64>,
    pub asset_reference: Option<String>,
    pub upload_kind: Option<&'static str>,
    pub upload_size: Option<String>,
    pub cached_results: usize,
}

/// Validates an upload and makes it the user's current session.
pub fn record_upload(
    state: &AppState,
    user_id: i64,
    asset_reference: &str,
    mime_type: Option<&str>,
    size_bytes: u64,
    kind: UploadKind,
) -> Result<(), OperationError> {
    if let Err(err) = validate_upload(mime_type, size_bytes, state.max_file_size) {
        warn!("Rejected upload from user {user_id}: {err}");
        return Err(err.into());
    }

    state
        .sessions
        .lock()
        .put(user_id, SessionRecord::new(asset_reference, size_bytes, kind));
    log_user_action(
        user_id,
        "upload",
        &format!("{} {} ({})", kind.as_str(), asset_reference, format_file_size(size_bytes)),
    );
    Ok(())
}

/// Admission, session lookup, cache and pipeline for one operation request.
/// `fetch` turns the session's asset reference into image bytes and is only
/// called on a cache miss.
pub async fn run_operation<F, Fut>(
    state: &AppState,
    user_id: i64,
    operation: Operation,
    fetch: F,
) -> Result<OperationOutcome, OperationError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<u8>>>,
{
    let mut timer = start_operation_timer(operation.name(), user_id, None);
    let result = execute_operation(state, user_id, operation, fetch).await;
    match &result {
        Ok(outcome) => {
            let detail = format!(
                "asset={} cached={} bytes={}",
                outcome.asset_reference,
                outcome.cached,
                outcome.bytes.len()
            );
            complete_operation_timer(&mut timer, "success", Some(detail));
        }
        Err(err) => complete_operation_timer(&mut timer, err.status(), Some(err.to_string())),
    }
    result
}

async fn execute_operation<F, Fut>(
    state: &AppState,
    user_id: i64,
    operation: Operation,
    fetch: F,
) -> Result<OperationOutcome, OperationError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<u8>>>,
{
    {
        let mut limiter = state.rate_limiter.lock();
        if !limiter.check(user_id) {
            return Err(OperationError::RateLimited {
                reset_at: limiter.reset_time(user_id),
            });
        }
    }

    let lookup = state.sessions.lock().lookup_at(user_id, Instant::now());
    let record = match lookup {
        SessionLookup::Active(record) => record,
        SessionLookup::Expired => return Err(OperationError::SessionExpired),
        SessionLookup::Absent => return Err(OperationError::SessionAbsent),
    };
    log_user_action(user_id, operation.name(), &operation.params());

    let key = CacheKey::new(
        record.asset_reference.clone(),
        operation.name(),
        operation.params(),
    );
    let cached = state.cache.lock().get(&key);
    if let Some(bytes) = cached {
        info!(
            "Serving cached {} result for user {user_id}",
            operation.name()
        );
        return Ok(OperationOutcome {
            asset_reference: record.asset_reference,
            bytes,
            cached: true,
        });
    }

    let source = fetch(record.asset_reference.clone())
        .await
        .map_err(|err| OperationError::Fetch {
            asset: record.asset_reference.clone(),
            reason: err.to_string(),
        })?;

    let metadata = json!({
        "user_id": user_id,
        "asset": record.asset_reference,
        "params": operation.params(),
        "input_bytes": source.len(),
    });
    let bytes = log_pipeline_timing(operation.name(), Some(metadata), || {
        state
            .pipeline
            .process(source, operation, state.pipeline_timeout)
    })
    .await?;

    state.cache.lock().set(key, bytes.clone());
    Ok(OperationOutcome {
        asset_reference: record.asset_reference,
        bytes,
        cached: false,
    })
}

pub fn user_status(state: &AppState, user_id: i64) -> UserStatus {
    let now = Instant::now();
    let (remaining_requests, reset_at) = {
        let limiter = state.rate_limiter.lock();
        (
            limiter.remaining_at(user_id, now),
            limiter.reset_time_at(user_id, now),
        )
    };
    let session = match state.sessions.lock().lookup_at(user_id, now) {
        SessionLookup::Active(record) => Some(record),
        SessionLookup::Expired | SessionLookup::Absent => None,
    };

    UserStatus {
        user_id,
        remaining_requests,
        reset_in_seconds: reset_at.map(|at| at.saturating_duration_since(now).as_secs()),
        asset_reference: session.as_ref().map(|record| record.asset_reference.clone()),
        upload_kind: session.as_ref().map(|record| record.kind.as_str()),
        upload_size: session
            .as_ref()
            .map(|record| format_file_size(record.size_bytes)),
        cached_results: state.cache.lock().len(),
    }
}
