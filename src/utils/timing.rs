use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "imagebot.timing";

#[derive(Debug)]
pub struct OperationTimer {
    operation: String,
    user_id: i64,
    asset: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl OperationTimer {
    pub fn new(operation: &str, user_id: i64, asset: Option<&str>) -> Self {
        OperationTimer {
            operation: operation.to_string(),
            user_id,
            asset: asset.map(str::to_string),
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "cancelled".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=operation_received operation={} user_id={} asset={:?} received_at={}",
            self.operation,
            self.user_id,
            self.asset,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=operation_completed operation={} user_id={} asset={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.operation,
            self.user_id,
            self.asset,
            self.started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_operation_timer(operation: &str, user_id: i64, asset: Option<&str>) -> OperationTimer {
    let timer = OperationTimer::new(operation, user_id, asset);
    timer.log_received();
    timer
}

pub fn complete_operation_timer(timer: &mut OperationTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_pipeline_timing<T, E, F, Fut>(
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=pipeline_request operation={} started_at={} metadata={}",
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    info!(
        target: TIMING_TARGET,
        "event=pipeline_response operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        operation,
        Utc::now().to_rfc3339(),
        started_perf.elapsed().as_secs_f64(),
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipeline_timing_passes_results_through() {
        let ok: Result<u8, String> = log_pipeline_timing("wallpaper", None, || async { Ok(3) }).await;
        assert_eq!(ok, Ok(3));

        let err: Result<u8, String> = log_pipeline_timing(
            "enhance_quality",
            Some(serde_json::json!({ "quality": "4K" })),
            || async { Err("boom".to_string()) },
        )
        .await;
        assert_eq!(err, Err("boom".to_string()));
    }

    #[test]
    fn completing_twice_is_harmless() {
        let mut timer = start_operation_timer("wallpaper", 1, Some("asset"));
        complete_operation_timer(&mut timer, "error", Some("decode".to_string()));
        assert!(timer.completed);
        timer.log_completed();
        assert_eq!(timer.status, "error");
    }

    #[test]
    fn unfinished_timer_reports_cancelled() {
        let timer = OperationTimer::new("optimize", 2, None);
        assert_eq!(timer.status, "cancelled");
        assert!(!timer.completed);
    }
}
