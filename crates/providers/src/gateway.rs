//! Model gateway — retry, backoff, and per-call timeouts around a backend.
//!
//! Every model call in the system goes through `ModelGateway`. It wraps a
//! concrete `ModelBackend`, retries transient failures with exponential
//! backoff and jitter, enforces a timeout per attempt, and converts
//! exhausted retries into a single `ModelError::Unavailable`.

use rand::Rng;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use studykit_config::ModelConfig;
use studykit_core::error::ModelError;
use studykit_core::model::*;
use tracing::{debug, warn};

/// Retry behavior for transient model failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Build the policy from the model section of the app config.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    ///
    /// Rate-limit errors carry their own wait; everything else backs off
    /// exponentially from the base delay with up to 25% added jitter.
    pub fn delay_after(&self, attempt: u32, error: &ModelError) -> Duration {
        if let ModelError::RateLimited { retry_after_secs } = error {
            return Duration::from_secs(*retry_after_secs);
        }
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(6));
        let jitter = exp.mul_f64(rand::rng().random_range(0.0..0.25));
        exp + jitter
    }
}

/// Wraps a backend with retries, backoff, and per-attempt timeouts.
///
/// The gateway itself implements `ModelBackend`, so callers hold an
/// `Arc<dyn ModelBackend>` and never see individual attempts; a failure
/// that surfaces from the gateway is final.
pub struct ModelGateway {
    backend: Arc<dyn ModelBackend>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl ModelGateway {
    /// Wrap a backend with an explicit policy and per-attempt timeout.
    pub fn new(backend: Arc<dyn ModelBackend>, policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            backend,
            policy,
            call_timeout,
        }
    }

    /// Wrap a backend using the retry and timeout settings from config.
    pub fn from_config(backend: Arc<dyn ModelBackend>, config: &ModelConfig) -> Self {
        Self::new(
            backend,
            RetryPolicy::from_config(config),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Send a prompt and parse the reply into a typed value.
    ///
    /// If the reply is not valid JSON for `T`, the model gets exactly one
    /// corrective turn quoting the parse error; a second bad reply becomes
    /// `ModelError::MalformedOutput`.
    pub async fn complete_structured<T: DeserializeOwned>(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<T, ModelError> {
        let reply = self.complete(request.clone()).await?;

        let first_err = match parse_json_reply::<T>(&reply.text) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        warn!(
            backend = %self.backend.name(),
            error = %first_err,
            "Model reply failed schema parse, sending one corrective turn"
        );

        let mut retry_request = request;
        retry_request.messages.push(PromptMessage::assistant(&reply.text));
        retry_request.messages.push(PromptMessage::user(format!(
            "Your previous reply could not be parsed ({first_err}). \
             Respond again with only the corrected JSON object. \
             No prose, no code fences."
        )));

        let second = self.complete(retry_request).await?;
        parse_json_reply::<T>(&second.text).map_err(|e| {
            ModelError::MalformedOutput(format!("reply still invalid after corrective turn: {e}"))
        })
    }
}

#[async_trait::async_trait]
impl ModelBackend for ModelGateway {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<ModelReply, ModelError> {
        let mut last_error: Option<ModelError> = None;

        for attempt in 0..self.policy.max_attempts() {
            if let Some(err) = &last_error {
                let delay = self.policy.delay_after(attempt - 1, err);
                debug!(
                    backend = %self.backend.name(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.call_timeout, self.backend.complete(request.clone()))
                .await
            {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(e)) if e.is_transient() => {
                    warn!(
                        backend = %self.backend.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "Completion attempt failed"
                    );
                    last_error = Some(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        backend = %self.backend.name(),
                        attempt = attempt + 1,
                        timeout_secs = self.call_timeout.as_secs(),
                        "Completion attempt timed out"
                    );
                    last_error = Some(ModelError::Timeout(self.call_timeout.as_secs()));
                }
            }
        }

        Err(ModelError::Unavailable {
            attempts: self.policy.max_attempts(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".into()),
        })
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ModelError> {
        let mut last_error: Option<ModelError> = None;

        for attempt in 0..self.policy.max_attempts() {
            if let Some(err) = &last_error {
                let delay = self.policy.delay_after(attempt - 1, err);
                debug!(
                    backend = %self.backend.name(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before embedding retry"
                );
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.call_timeout, self.backend.embed(request.clone())).await
            {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) if e.is_transient() => {
                    warn!(
                        backend = %self.backend.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "Embedding attempt failed"
                    );
                    last_error = Some(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        backend = %self.backend.name(),
                        attempt = attempt + 1,
                        timeout_secs = self.call_timeout.as_secs(),
                        "Embedding attempt timed out"
                    );
                    last_error = Some(ModelError::Timeout(self.call_timeout.as_secs()));
                }
            }
        }

        Err(ModelError::Unavailable {
            attempts: self.policy.max_attempts(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".into()),
        })
    }
}

/// Parse a model reply as JSON, tolerating surrounding prose or code fences.
///
/// Tries the raw text first; on failure, retries with the outermost
/// `{`..`}` window, which covers both fenced replies and replies that
/// lead with commentary.
pub fn parse_json_reply<T: DeserializeOwned>(
    text: &str,
) -> std::result::Result<T, serde_json::Error> {
    match serde_json::from_str::<T>(text.trim()) {
        Ok(value) => Ok(value),
        Err(direct_err) => {
            let Some(start) = text.find('{') else {
                return Err(direct_err);
            };
            let Some(end) = text.rfind('}') else {
                return Err(direct_err);
            };
            if end <= start {
                return Err(direct_err);
            }
            serde_json::from_str::<T>(&text[start..=end])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A backend that replays a scripted sequence of results.
    struct ScriptedBackend {
        script: Mutex<VecDeque<std::result::Result<String, ModelError>>>,
        calls: Mutex<usize>,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<std::result::Result<String, ModelError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn last_message_count(&self) -> usize {
            self.last_request
                .lock()
                .unwrap()
                .as_ref()
                .map(|r| r.messages.len())
                .unwrap_or(0)
        }
    }

    #[async_trait::async_trait]
    impl ModelBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<ModelReply, ModelError> {
            *self.calls.lock().unwrap() += 1;
            *self.last_request.lock().unwrap() = Some(request);
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(ModelReply {
                    text,
                    model: "test-model".into(),
                    usage: None,
                }),
                Some(Err(e)) => Err(e),
                None => panic!("scripted backend ran out of replies"),
            }
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> std::result::Result<EmbeddingResponse, ModelError> {
            *self.calls.lock().unwrap() += 1;
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(_)) => Ok(EmbeddingResponse {
                    embeddings: request.inputs.iter().map(|_| vec![0.1, 0.2]).collect(),
                    model: "test-embed".into(),
                    usage: None,
                }),
                Some(Err(e)) => Err(e),
                None => panic!("scripted backend ran out of replies"),
            }
        }
    }

    /// A backend that never returns.
    struct HangingBackend;

    #[async_trait::async_trait]
    impl ModelBackend for HangingBackend {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<ModelReply, ModelError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn test_request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".into(),
            messages: vec![PromptMessage::user("hello")],
            temperature: 0.0,
            max_tokens: None,
        }
    }

    fn gateway(backend: Arc<dyn ModelBackend>) -> ModelGateway {
        ModelGateway::new(
            backend,
            RetryPolicy::new(3, Duration::from_millis(100)),
            Duration::from_secs(5),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(ModelError::Network("connection reset".into())),
            Ok("recovered".into()),
        ]));
        let gw = gateway(backend.clone());

        let reply = gw.complete(test_request()).await.unwrap();
        assert_eq!(reply.text, "recovered");
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_become_unavailable() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(ModelError::Network("down".into())),
            Err(ModelError::ApiError {
                status_code: 503,
                message: "overloaded".into(),
            }),
            Err(ModelError::Network("still down".into())),
        ]));
        let gw = gateway(backend.clone());

        let err = gw.complete(test_request()).await.unwrap_err();
        match err {
            ModelError::Unavailable {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("still down"));
            }
            other => panic!("expected Unavailable, got: {other:?}"),
        }
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failure_surfaces_at_once() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(
            ModelError::AuthenticationFailed("bad key".into()),
        )]));
        let gw = gateway(backend.clone());

        let err = gw.complete(test_request()).await.unwrap_err();
        assert!(matches!(err, ModelError::AuthenticationFailed(_)));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out_and_retries() {
        let gw = ModelGateway::new(
            Arc::new(HangingBackend),
            RetryPolicy::new(2, Duration::from_millis(10)),
            Duration::from_millis(50),
        );

        let err = gw.complete(test_request()).await.unwrap_err();
        match err {
            ModelError::Unavailable {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("expected Unavailable, got: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn embed_retries_transient_failures() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(ModelError::RateLimited { retry_after_secs: 1 }),
            Ok("ok".into()),
        ]));
        let gw = gateway(backend.clone());

        let response = gw
            .embed(EmbeddingRequest {
                model: "test-embed".into(),
                inputs: vec!["alpha".into(), "beta".into()],
            })
            .await
            .unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn rate_limit_delay_honors_retry_after() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let delay = policy.delay_after(0, &ModelError::RateLimited { retry_after_secs: 7 });
        assert_eq!(delay, Duration::from_secs(7));
    }

    #[test]
    fn backoff_grows_exponentially_with_bounded_jitter() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        let err = ModelError::Network("x".into());

        let first = policy.delay_after(0, &err);
        assert!(first >= Duration::from_millis(100));
        assert!(first < Duration::from_millis(125));

        let third = policy.delay_after(2, &err);
        assert!(third >= Duration::from_millis(400));
        assert!(third < Duration::from_millis(500));
    }

    #[test]
    fn at_least_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(100));
        assert_eq!(policy.max_attempts(), 1);
    }

    // --- Structured completion ---

    #[derive(Debug, Deserialize, PartialEq)]
    struct Score {
        points: u32,
    }

    #[tokio::test(start_paused = true)]
    async fn structured_reply_parses_directly() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(r#"{"points": 10}"#.into())]));
        let gw = gateway(backend.clone());

        let score: Score = gw.complete_structured(test_request()).await.unwrap();
        assert_eq!(score, Score { points: 10 });
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn structured_reply_tolerates_code_fences() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            "```json\n{\"points\": 3}\n```".into(),
        )]));
        let gw = gateway(backend);

        let score: Score = gw.complete_structured(test_request()).await.unwrap();
        assert_eq!(score.points, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_reply_gets_one_corrective_turn() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("here you go!".into()),
            Ok(r#"{"points": 5}"#.into()),
        ]));
        let gw = gateway(backend.clone());

        let score: Score = gw.complete_structured(test_request()).await.unwrap();
        assert_eq!(score.points, 5);
        assert_eq!(backend.calls(), 2);
        // corrective turn appends the bad reply and the instruction
        assert_eq!(backend.last_message_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn twice_malformed_reply_is_an_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("not json".into()),
            Ok("still not json".into()),
        ]));
        let gw = gateway(backend.clone());

        let err = gw
            .complete_structured::<Score>(test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MalformedOutput(_)));
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn parse_json_reply_extracts_embedded_object() {
        let raw = "Sure, here is the result:\n{\"points\": 42}\nHope that helps.";
        let score: Score = parse_json_reply(raw).unwrap();
        assert_eq!(score.points, 42);
    }

    #[test]
    fn parse_json_reply_rejects_braceless_text() {
        let err = parse_json_reply::<Score>("no json here").unwrap_err();
        assert!(err.to_string().contains("expected"));
    }
}
