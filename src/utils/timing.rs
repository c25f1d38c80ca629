use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "stylist.timing";

#[derive(Debug)]
pub struct RequestTimer {
    operation: String,
    owner_id: Option<i64>,
    context: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl RequestTimer {
    pub fn new(operation: &str, owner_id: Option<i64>, context: Option<&str>) -> Self {
        let context = context
            .map(|value| value.replace('\n', " "))
            .map(|value| value.chars().take(300).collect::<String>());

        RequestTimer {
            operation: operation.to_string(),
            owner_id,
            context,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=request_received operation={} owner_id={:?} received_at={} context={:?}",
            self.operation,
            self.owner_id,
            self.started_at.to_rfc3339(),
            self.context
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
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=request_completed operation={} owner_id={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.operation,
            self.owner_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }

    pub fn status(&self) -> &str {
        &self.status
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_request_timer(
    operation: &str,
    owner_id: Option<i64>,
    context: Option<&str>,
) -> RequestTimer {
    let timer = RequestTimer::new(operation, owner_id, context);
    timer.log_received();
    timer
}

pub fn complete_request_timer(timer: &mut RequestTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn timing_wrapper_returns_inner_result() {
        let ok = log_llm_timing("openai", "gpt-4o", "test", None, || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<(), _> = log_llm_timing("openai", "gpt-4o", "test", None, || async {
            Err(anyhow!("boom"))
        })
        .await;
        assert_eq!(err.unwrap_err().to_string(), "boom");
    }

    #[test]
    fn request_timer_keeps_latest_status() {
        let mut timer = start_request_timer("suggest", Some(3), Some("line one\nline two"));
        complete_request_timer(&mut timer, "error", Some("upstream".to_string()));
        assert_eq!(timer.status(), "error");
        assert_eq!(timer.context.as_deref(), Some("line one line two"));
    }
}
