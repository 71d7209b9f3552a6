// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Completion client: calls a [`ModelProvider`] with retry and cancellation.
//!
//! Retry policy: randomized exponential backoff, `min = 1s`, `max = 60s`, at
//! most 6 attempts, retried only for [`NetworkError`](crate::error::NetworkError)
//! classes (timeout, connection failure, upstream 5xx, rate limiting).
//! Everything else propagates on first occurrence.
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::aggregator::Chunk;
use crate::config::{CompletionParams, ForcedTool};
use crate::error::{NetworkError, ProviderError, ValidationError};
use crate::message::{FinishReason, Message, Role};
use crate::provider::ModelProvider;
use crate::tool::Tool;
use crate::types::{self, ResponseEvent};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: u32 = 6;

/// Error surfaced by [`CompletionClient::generate`]. `ValidationError` and
/// `ProviderError` are never retried; [`NetworkError`] is retried internally
/// and only appears here once every attempt has been exhausted.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Classification of an opaque provider-layer error, mirroring the upstream
/// exception-mapping this crate's providers are modeled on: connection
/// failures, timeouts, rate limiting, and 5xx responses are transient
/// ([`NetworkError`]); a request rejected for exceeding the model's context
/// window is a [`ValidationError::ContextLengthExceeded`]; anything else that
/// looks like an outright request rejection (auth, malformed body) is a
/// non-retried [`ProviderError`].
fn classify(err: &anyhow::Error) -> CompletionError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("maximum context length") || lower.contains("context_length_exceeded") {
        return CompletionError::Validation(ValidationError::ContextLengthExceeded);
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return CompletionError::Network(NetworkError::Timeout);
    }
    if lower.contains("rate limit") || lower.contains("429") {
        return CompletionError::Network(NetworkError::RateLimited);
    }
    if let Some(status) = extract_status(&lower) {
        if (500..600).contains(&status) {
            return CompletionError::Network(NetworkError::UpstreamStatus { status, body: msg });
        }
        if status == 401 || status == 403 {
            return CompletionError::Provider(ProviderError::Authentication(msg));
        }
        if status == 400 || status == 422 {
            return CompletionError::Provider(ProviderError::InvalidRequest(msg));
        }
    }
    if lower.contains("connection") || lower.contains("dns") || lower.contains("reset by peer") {
        return CompletionError::Network(NetworkError::Connection(msg));
    }
    CompletionError::Provider(ProviderError::InvalidRequest(msg))
}

fn extract_status(lower: &str) -> Option<u16> {
    lower
        .split(|c: char| !c.is_ascii_digit())
        .find_map(|tok| tok.parse::<u16>().ok().filter(|s| (100..600).contains(s)))
}

fn is_retryable(err: &CompletionError) -> bool {
    matches!(err, CompletionError::Network(_))
}

/// Outcome of one [`CompletionClient::generate`] call.
#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    /// The stream ran to completion (after however many retries it took).
    Completed(Vec<Chunk>),
    /// Cancellation was observed before the stream finished. Carries
    /// whatever chunks were already read off the stream, empty if
    /// cancellation landed before the network call was even dispatched.
    Cancelled(Vec<Chunk>),
}

/// Wraps a boxed [`ModelProvider`] and exposes the spec-level
/// `generate(params) -> stream, cancellable` contract.
pub struct CompletionClient {
    provider: Arc<dyn ModelProvider>,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    /// Issue one completion call, retrying transient failures with randomized
    /// exponential backoff. Returns the aggregated chunks already folded into
    /// an [`crate::aggregator::Aggregator`]-ready vector so callers can choose
    /// to stream them through the event bus or aggregate directly.
    ///
    /// On cancellation (observed between attempts, while awaiting the
    /// network call, or while reading a chunk) returns
    /// [`GenerateOutcome::Cancelled`] with whatever partial chunks were
    /// already read, rather than an error, per the spec's "abortable,
    /// returns a sentinel" contract.
    pub async fn generate(
        &self,
        params: &CompletionParams,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutcome, CompletionError> {
        let wire = to_wire_request(params);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Ok(GenerateOutcome::Cancelled(Vec::new()));
            }

            let call = self.provider.complete(wire.clone());
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(GenerateOutcome::Cancelled(Vec::new())),
                r = call => r,
            };

            let mut stream = match result {
                Ok(s) => s,
                Err(e) => {
                    let classified = classify(&e);
                    if is_retryable(&classified) && attempt < MAX_ATTEMPTS {
                        backoff_sleep(attempt, cancel).await;
                        continue;
                    }
                    return Err(classified);
                }
            };

            let mut chunks = Vec::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(GenerateOutcome::Cancelled(chunks)),
                    n = stream.next() => n,
                };
                match next {
                    None => break,
                    Some(Ok(event)) => {
                        if let Some(chunk) = event_to_chunk(event) {
                            chunks.push(chunk);
                        }
                    }
                    Some(Err(e)) => {
                        let classified = classify(&e);
                        if is_retryable(&classified) && attempt < MAX_ATTEMPTS {
                            backoff_sleep(attempt, cancel).await;
                            chunks.clear();
                            break;
                        }
                        return Err(classified);
                    }
                }
            }
            if !chunks.is_empty() || attempt >= MAX_ATTEMPTS {
                return Ok(GenerateOutcome::Completed(chunks));
            }
        }
    }
}

async fn backoff_sleep(attempt: u32, cancel: &CancellationToken) {
    let cap = MIN_BACKOFF.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
    let cap = cap.min(MAX_BACKOFF.as_secs_f64());
    let jittered = rand::thread_rng().gen_range(MIN_BACKOFF.as_secs_f64()..=cap.max(MIN_BACKOFF.as_secs_f64()));
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(Duration::from_secs_f64(jittered)) => {}
    }
}

/// Translate the spec-level request into the provider wire shape used by the
/// donor drivers: `Message`/`Tool` (component B) become `types::Message`/
/// `types::ToolSchema`. `tools` is always serialized regardless of
/// `ModelConfig.forced_tool` — only the `function_call` selector changes, per
/// the `Disallow` policy: the model still sees the schemas, it is just told
/// not to invoke any of them.
fn to_wire_request(params: &CompletionParams) -> types::CompletionRequest {
    types::CompletionRequest {
        messages: params.messages.iter().map(to_wire_message).collect(),
        tools: params.tools.iter().map(to_wire_tool).collect(),
        stream: params.config.streaming,
        function_call: match params.config.function_call_wire() {
            serde_json::Value::Null => None,
            other => Some(other),
        },
    }
}

fn to_wire_tool(t: &Tool) -> types::ToolSchema {
    types::ToolSchema {
        name: t.name.clone(),
        description: t.description.clone(),
        parameters: t.parameters_schema(),
    }
}

fn to_wire_message(m: &Message) -> types::Message {
    match m.role() {
        Role::System => types::Message::system(m.content().unwrap_or_default()),
        Role::User => types::Message::user(m.content().unwrap_or_default()),
        Role::Function => {
            if let Message::ToolResult(tr) = m {
                types::Message::tool_result(tr.name.clone(), tr.content.clone())
            } else {
                types::Message::user(m.content().unwrap_or_default())
            }
        }
        Role::Assistant => {
            if let Message::ToolUsage(tu) = m {
                types::Message {
                    role: types::Role::Assistant,
                    content: types::MessageContent::ToolCall {
                        tool_call_id: tu.id.clone(),
                        function: types::FunctionCall { name: tu.tool_name.clone(), arguments: tu.args_str.clone() },
                    },
                }
            } else {
                types::Message::assistant(m.content().unwrap_or_default())
            }
        }
    }
}

fn event_to_chunk(event: ResponseEvent) -> Option<Chunk> {
    match event {
        ResponseEvent::TextDelta(text) => Some(Chunk { content: Some(text), ..Default::default() }),
        ResponseEvent::ToolCall { name, arguments, .. } => Some(Chunk {
            tool_name: Some(name),
            args_str: Some(arguments),
            ..Default::default()
        }),
        ResponseEvent::Usage { input_tokens, output_tokens, .. } => Some(Chunk {
            reported_prompt_tokens: Some(input_tokens),
            reported_reply_tokens: Some(output_tokens),
            ..Default::default()
        }),
        ResponseEvent::Done => Some(Chunk { finish_reason: Some(FinishReason::Done), ..Default::default() }),
        ResponseEvent::Error(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::stream;

    use super::*;
    use crate::config::ModelConfig;
    use crate::mock::{MockProvider, ScriptedMockProvider};
    use crate::message::{Metadata, UserMessage};
    use chrono::Utc;

    fn params(messages: Vec<Message>) -> CompletionParams {
        CompletionParams {
            messages,
            tools: vec![],
            config: ModelConfig::new("mock", true, 1.0, 0.0, 0.0, None, ForcedTool::Any, None).unwrap(),
        }
    }

    fn user(text: &str) -> Message {
        Message::User(UserMessage {
            id: "1".into(),
            author: "bob".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: text.into(),
            created_at: Utc::now(),
        })
    }

    /// A provider whose stream yields a retryable transport error for the
    /// first `failures` calls, then a normal reply.
    struct FlakyStreamProvider {
        attempt: AtomicU32,
        failures: u32,
    }

    impl FlakyStreamProvider {
        fn new(failures: u32) -> Self {
            Self { attempt: AtomicU32::new(0), failures }
        }
    }

    #[async_trait::async_trait]
    impl ModelProvider for FlakyStreamProvider {
        fn name(&self) -> &str {
            "flaky"
        }
        fn model_name(&self) -> &str {
            "flaky-model"
        }
        async fn complete(&self, _req: types::CompletionRequest) -> anyhow::Result<crate::provider::ResponseStream> {
            let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
            let events: Vec<anyhow::Result<ResponseEvent>> = if attempt < self.failures {
                vec![Err(anyhow::anyhow!("connection reset by peer"))]
            } else {
                vec![Ok(ResponseEvent::TextDelta("ok".into())), Ok(ResponseEvent::Done)]
            };
            Ok(Box::pin(stream::iter(events)))
        }
    }

    #[tokio::test]
    async fn generate_returns_chunks_from_provider() {
        let client = CompletionClient::new(Arc::new(MockProvider));
        let cancel = CancellationToken::new();
        let outcome = client.generate(&params(vec![user("hi")]), &cancel).await.unwrap();
        let chunks = match outcome {
            GenerateOutcome::Completed(chunks) => chunks,
            GenerateOutcome::Cancelled(_) => panic!("expected a completed outcome"),
        };
        assert!(chunks.iter().any(|c| c.content.as_deref() == Some("MOCK: hi")));
    }

    #[tokio::test]
    async fn generate_propagates_reported_usage_chunk() {
        let client = CompletionClient::new(Arc::new(MockProvider));
        let cancel = CancellationToken::new();
        let outcome = client.generate(&params(vec![user("hi")]), &cancel).await.unwrap();
        let GenerateOutcome::Completed(chunks) = outcome else {
            panic!("expected a completed outcome");
        };
        assert!(chunks
            .iter()
            .any(|c| c.reported_prompt_tokens == Some(10) && c.reported_reply_tokens == Some(10)));
    }

    #[tokio::test]
    async fn generate_returns_cancelled_when_already_cancelled() {
        let client = CompletionClient::new(Arc::new(MockProvider));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = client.generate(&params(vec![user("hi")]), &cancel).await.unwrap();
        match outcome {
            GenerateOutcome::Cancelled(chunks) => assert!(chunks.is_empty()),
            GenerateOutcome::Completed(_) => panic!("expected a cancelled outcome"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn generate_retries_transient_stream_errors_then_succeeds() {
        let provider = FlakyStreamProvider::new(2);
        let client = CompletionClient::new(Arc::new(provider));
        let cancel = CancellationToken::new();
        let outcome = client.generate(&params(vec![user("hi")]), &cancel).await.unwrap();
        let GenerateOutcome::Completed(chunks) = outcome else {
            panic!("expected a completed outcome after retrying past the transient errors");
        };
        assert!(chunks.iter().any(|c| c.content.as_deref() == Some("ok")));
        assert!(chunks.iter().any(|c| c.finish_reason == Some(FinishReason::Done)));
    }

    #[tokio::test(start_paused = true)]
    async fn generate_gives_up_after_max_attempts_of_stream_errors() {
        let provider = FlakyStreamProvider::new(MAX_ATTEMPTS);
        let client = CompletionClient::new(Arc::new(provider));
        let cancel = CancellationToken::new();
        let err = client.generate(&params(vec![user("hi")]), &cancel).await.unwrap_err();
        assert!(matches!(err, CompletionError::Network(NetworkError::Connection(_))));
    }

    #[test]
    fn classify_detects_context_length() {
        let err = anyhow::anyhow!("invalid_request_error: This model's maximum context length is 4096 tokens");
        assert!(matches!(classify(&err), CompletionError::Validation(ValidationError::ContextLengthExceeded)));
    }

    #[test]
    fn classify_detects_rate_limit_as_network() {
        let err = anyhow::anyhow!("received 429 Too Many Requests");
        assert!(matches!(classify(&err), CompletionError::Network(NetworkError::RateLimited)));
    }

    #[test]
    fn classify_detects_5xx_as_network() {
        let err = anyhow::anyhow!("upstream returned 503 Service Unavailable");
        assert!(matches!(classify(&err), CompletionError::Network(NetworkError::UpstreamStatus { status: 503, .. })));
    }

    #[test]
    fn classify_detects_auth_failure_as_provider_error() {
        let err = anyhow::anyhow!("request failed with 401 Unauthorized");
        assert!(matches!(classify(&err), CompletionError::Provider(ProviderError::Authentication(_))));
    }
}
