//! Fire-and-forget telemetry
//!
//! Video views and answer submissions are reported to the content service
//! without ever blocking navigation or rendering. A video view is attempted
//! at most `max_attempts` times with doubling backoff; an answer is posted
//! once. After that the event is dropped and a `TelemetryFailed` event is
//! emitted. Failures never reach the caller as errors.

use crate::transport::{unwrap_envelope, ContentSource, RequestContext, TransportError};
use chrono::Utc;
use mav_common::config::TelemetryConfig;
use mav_common::events::{EventBus, ViewerEvent};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Bounded retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles afterwards
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Single attempt, no waiting
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
        )
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

/// Client errors will not succeed on a second try
fn is_retryable(error: &TransportError) -> bool {
    match error {
        TransportError::Network(_) => true,
        TransportError::Status(code, _) => *code >= 500 || *code == 429,
        TransportError::Decode(_) => false,
    }
}

/// POST with bounded retries; returns the response and attempts used
async fn deliver<S>(
    source: &S,
    policy: RetryPolicy,
    path: &str,
    body: &Value,
    ctx: &RequestContext,
) -> Result<(Value, u32), (TransportError, u32)>
where
    S: ContentSource + ?Sized,
{
    let mut attempt = 1;
    loop {
        match source.post_json(path, body, ctx).await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                let wait = policy.backoff_after(attempt);
                tracing::debug!(
                    path = %path,
                    attempt,
                    error = %e,
                    "Telemetry attempt failed, retrying in {:?}",
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err((e, attempt)),
        }
    }
}

/// Kind of toast to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Warning,
}

/// Passive notification for the shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

/// Verdict of an answer submission
///
/// `ok == false` means the verdict could not be obtained; `is_correct` is
/// then false and must not be read as "wrong answer".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerVerdict {
    pub is_correct: bool,
    pub ok: bool,
}

impl AnswerVerdict {
    pub fn failed() -> Self {
        Self {
            is_correct: false,
            ok: false,
        }
    }

    pub fn toast(&self) -> Toast {
        match (self.ok, self.is_correct) {
            (true, true) => Toast {
                kind: ToastKind::Success,
                message: "Correct!".to_string(),
            },
            (true, false) => Toast {
                kind: ToastKind::Error,
                message: "Incorrect".to_string(),
            },
            (false, _) => Toast {
                kind: ToastKind::Warning,
                message: "Could not submit answer".to_string(),
            },
        }
    }
}

/// Records video views and answers
pub struct TelemetryEmitter<S: ContentSource + 'static> {
    source: Arc<S>,
    policy: RetryPolicy,
    event_bus: Option<EventBus>,
}

impl<S: ContentSource + 'static> Clone for TelemetryEmitter<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            policy: self.policy,
            event_bus: self.event_bus.clone(),
        }
    }
}

impl<S: ContentSource + 'static> TelemetryEmitter<S> {
    pub fn new(source: Arc<S>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Report a video view in the background
    ///
    /// Returns immediately. Must be called from within a Tokio runtime.
    pub fn record_video_view(&self, video_id: &str, ctx: &RequestContext) {
        let source = Arc::clone(&self.source);
        let policy = self.policy;
        let event_bus = self.event_bus.clone();
        let video_id = video_id.to_string();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let path = format!("/videos/{}/view", urlencoding::encode(&video_id));
            let event = match deliver(source.as_ref(), policy, &path, &json!({}), &ctx).await {
                Ok((_, attempts)) => {
                    tracing::debug!(video_id = %video_id, attempts, "Video view recorded");
                    ViewerEvent::VideoViewRecorded {
                        video_id,
                        attempts,
                        timestamp: Utc::now(),
                    }
                }
                Err((e, attempts)) => {
                    tracing::warn!(video_id = %video_id, attempts, error = %e, "Video view not recorded");
                    ViewerEvent::TelemetryFailed {
                        operation: "video_view".to_string(),
                        target_id: video_id,
                        attempts,
                        message: e.to_string(),
                        timestamp: Utc::now(),
                    }
                }
            };

            if let Some(bus) = event_bus {
                bus.emit_lossy(event);
            }
        });
    }

    /// Submit an answer and return the service's verdict
    ///
    /// Single attempt, whatever the policy. Never fails: transport problems
    /// yield [`AnswerVerdict::failed`].
    pub async fn record_answer(
        &self,
        question_id: &str,
        selected_index: usize,
        ctx: &RequestContext,
    ) -> AnswerVerdict {
        let path = format!("/questions/{}/answer", urlencoding::encode(question_id));
        let body = json!({ "selectedAnswer": selected_index });

        // A lost response does not mean the answer was not stored; a retry
        // could record it twice.
        let result = deliver(self.source.as_ref(), RetryPolicy::no_retry(), &path, &body, ctx)
            .await
            .and_then(|(value, attempts)| {
                unwrap_envelope(value, &["isCorrect"])
                    .get("isCorrect")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| {
                        (
                            TransportError::Decode("response without isCorrect".to_string()),
                            attempts,
                        )
                    })
            });

        match result {
            Ok(is_correct) => {
                tracing::info!(question_id = %question_id, selected_index, is_correct, "Answer recorded");
                self.emit(ViewerEvent::AnswerRecorded {
                    question_id: question_id.to_string(),
                    selected_index,
                    is_correct,
                    timestamp: Utc::now(),
                });
                AnswerVerdict {
                    is_correct,
                    ok: true,
                }
            }
            Err((e, attempts)) => {
                tracing::warn!(question_id = %question_id, attempts, error = %e, "Answer not recorded");
                self.emit(ViewerEvent::TelemetryFailed {
                    operation: "answer".to_string(),
                    target_id: question_id.to_string(),
                    attempts,
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
                AnswerVerdict::failed()
            }
        }
    }

    fn emit(&self, event: ViewerEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }
}
