//! Blocking HTTP helpers shared by the remote providers

use crate::capability::cancelled;
use crate::progress::CancellationToken;
use doodle_core::GenerationError;
use std::time::Duration;
use ureq::http::Response;
use ureq::Body;

const REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_RETRIES: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
const BACKOFF_SLICE_MS: u64 = 50;

pub(crate) fn build_agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .http_status_as_error(false)
        .build();
    config.into()
}

/// Send a request, retrying transient failures with exponential backoff.
///
/// Returns the body of the first 2xx response. Non-retryable statuses are
/// mapped onto a [`GenerationError`] kind by [`classify_status`]. No new
/// attempt starts once `cancel` is set.
pub(crate) fn send_with_retry<F>(
    provider: &str,
    cancel: &CancellationToken,
    mut send: F,
) -> Result<Vec<u8>, GenerationError>
where
    F: FnMut(&ureq::Agent) -> Result<Response<Body>, ureq::Error>,
{
    for attempt in 0..MAX_RETRIES {
        if cancel.is_cancelled() {
            return Err(cancelled(provider));
        }
        let last_attempt = attempt + 1 == MAX_RETRIES;
        let agent = build_agent();

        match send(&agent) {
            Ok(response) if response.status().is_success() => {
                let mut reader = response.into_body().into_reader();
                let mut bytes = Vec::new();
                std::io::Read::read_to_end(&mut reader, &mut bytes).map_err(|e| {
                    GenerationError::model_load(format!("Failed to read {} response: {}", provider, e))
                })?;
                return Ok(bytes);
            }
            Ok(mut response) => {
                let status = response.status().as_u16();
                let body = response.body_mut().read_to_string().unwrap_or_default();
                if !last_attempt && is_retryable_status(status) {
                    tracing::debug!(provider, status, attempt, "retrying after transient status");
                    sleep_backoff(attempt, cancel);
                    continue;
                }
                return Err(classify_status(provider, status, &body));
            }
            Err(e) => {
                if !last_attempt && is_retryable_error(&e) {
                    tracing::debug!(provider, error = %e, attempt, "retrying after transport error");
                    sleep_backoff(attempt, cancel);
                    continue;
                }
                return Err(GenerationError::model_load(format!(
                    "{} request failed: {}",
                    provider, e
                )));
            }
        }
    }

    Err(GenerationError::model_load(format!(
        "{} request failed after retries",
        provider
    )))
}

/// Map an unsuccessful HTTP status onto a capability failure
pub(crate) fn classify_status(provider: &str, status: u16, body: &str) -> GenerationError {
    let detail = error_detail(body);
    let message = format!("{} returned HTTP {}: {}", provider, status, detail);

    if status == 507 || body.to_ascii_lowercase().contains("out of memory") {
        return GenerationError::out_of_memory(message);
    }
    match status {
        400 | 422 => GenerationError::invalid_input(message),
        _ => GenerationError::model_load(message),
    }
}

/// Pull a readable message out of a JSON error body
pub(crate) fn error_detail(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().chars().take(200).collect();
    };

    json.get("detail")
        .and_then(|d| d.get("message"))
        .and_then(|m| m.as_str())
        .or_else(|| json.get("detail").and_then(|d| d.as_str()))
        .or_else(|| json.get("error").and_then(|e| e.as_str()))
        .or_else(|| json.get("message").and_then(|m| m.as_str()))
        .unwrap_or("Unknown error")
        .to_string()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(e: &ureq::Error) -> bool {
    matches!(
        e,
        ureq::Error::Timeout(_) | ureq::Error::Io(_) | ureq::Error::ConnectionFailed | ureq::Error::HostNotFound
    )
}

/// Sleep in short slices so a cancelled run does not wait out the full delay
fn sleep_backoff(attempt: usize, cancel: &CancellationToken) {
    let mut remaining = Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt));
    while !remaining.is_zero() && !cancel.is_cancelled() {
        let slice = remaining.min(Duration::from_millis(BACKOFF_SLICE_MS));
        std::thread::sleep(slice);
        remaining -= slice;
    }
}
