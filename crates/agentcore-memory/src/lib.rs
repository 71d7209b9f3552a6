// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Bounded, summarizing chat memory (component D).
//!
//! Wraps a [`HistoryStore`] with a token-budget eviction policy: when the
//! stored window no longer fits the model's context window, the oldest
//! non-pinned, non-summary messages are popped as a batch and folded into a
//! single running [`SummaryMessage`] with one completion call — never one
//! call per evicted message.
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use agentcore_history::{HistoryStore, StorageError};
use agentcore_model::aggregator::Aggregator;
use agentcore_model::client::{CompletionClient, CompletionError, GenerateOutcome};
use agentcore_model::config::{CompletionParams, ForcedTool, ModelConfig, SupportedChatModel};
use agentcore_model::message::{Message, Metadata, SummaryMessage, UserMessage};

/// Headroom subtracted from the raw token budget, confirmed against the
/// donor memory module's construction of its summary buffer.
const BUDGET_HEADROOM: i64 = 8;

const SUMMARIZE_PROMPT: &str = "\
You maintain a running summary of a conversation so older turns can be \
dropped from the prompt without losing information the assistant may still \
need. Fold the messages below into the existing summary (if any). Preserve \
names, numbers, decisions, and anything the user asked to be remembered. \
Write the result as a single dense paragraph, not a list.";

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Token-budgeted view over a [`HistoryStore`], summarizing overflow on read.
pub struct ChatMemory<S: HistoryStore> {
    history: S,
    client: Arc<CompletionClient>,
    summarizer: ModelConfig,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<S: HistoryStore> ChatMemory<S> {
    /// `summarizer` is the (typically cheaper) model configuration used for
    /// the fold-in completion call; it is independent of the model the
    /// orchestrator is actually chatting with.
    pub fn new(history: S, client: Arc<CompletionClient>, summarizer: ModelConfig) -> Self {
        Self { history, client, summarizer, locks: StdMutex::new(HashMap::new()) }
    }

    fn session_lock(&self, session: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("memory lock table poisoned");
        locks.entry(session.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Append a message to the session, serialized against any concurrent
    /// eviction for the same session.
    pub async fn append(&self, session: &str, message: Message) -> Result<(), MemoryError> {
        let lock = self.session_lock(session);
        let _guard = lock.lock().await;
        self.history.append(session, message).await?;
        Ok(())
    }

    /// Build the prompt window for `session`: the current summary (if any)
    /// followed by the surviving messages, evicting and re-summarizing as
    /// needed so the total fits `model.size - reply_reservation - 8`.
    pub async fn prompt_window(
        &self,
        session: &str,
        model: &SupportedChatModel,
        reply_reservation: u32,
    ) -> Result<Vec<Message>, MemoryError> {
        let lock = self.session_lock(session);
        let _guard = lock.lock().await;

        let budget = model.size as i64 - reply_reservation as i64 - BUDGET_HEADROOM;
        let mut summary = self.history.summary(session).await?;
        let mut messages = self.history.messages(session).await?;

        let mut window = Self::build_window(&summary, &messages);
        if agentcore_model::tokenizer::messages_tokens(&window) as i64 <= budget {
            return Ok(window);
        }

        let mut pending = Vec::new();
        while agentcore_model::tokenizer::messages_tokens(&window) as i64 > budget {
            let evict_idx = messages.iter().position(|m| !m.pinned() && !m.is_summary());
            let Some(idx) = evict_idx else { break };
            pending.push(messages.remove(idx));
            window = Self::build_window(&summary, &messages);
        }

        if !pending.is_empty() {
            let last_included_id = pending.last().map(|m| m.id().to_string()).unwrap_or_default();
            let content = self.summarize(summary.as_ref(), &pending).await?;
            let new_summary = Message::Summary(SummaryMessage {
                content,
                last_included_id,
                ..SummaryMessage::new(String::new(), String::new())
            });
            self.history.set_summary(session, new_summary.clone()).await?;
            for evicted in &pending {
                self.history.delete(session, evicted.id()).await?;
            }
            summary = Some(new_summary);
            window = Self::build_window(&summary, &messages);
        }

        Ok(window)
    }

    fn build_window(summary: &Option<Message>, messages: &[Message]) -> Vec<Message> {
        let mut window = Vec::with_capacity(messages.len() + 1);
        if let Some(s) = summary {
            window.push(s.clone());
        }
        window.extend_from_slice(messages);
        window
    }

    async fn summarize(&self, previous: Option<&Message>, pending: &[Message]) -> Result<String, MemoryError> {
        let mut body = String::new();
        if let Some(prev) = previous {
            body.push_str("Previous summary:\n");
            body.push_str(prev.content().unwrap_or(""));
            body.push_str("\n\n");
        }
        body.push_str("Messages to fold in:\n");
        for m in pending {
            body.push_str(&format!("- [{}] {}\n", m.author(), m.content().unwrap_or("")));
        }

        let request = Message::User(UserMessage {
            id: "memory-fold".to_string(),
            author: "memory".to_string(),
            metadata: Metadata::default(),
            pinned: false,
            content: format!("{SUMMARIZE_PROMPT}\n\n{body}"),
            created_at: chrono::Utc::now(),
        });

        let mut config = self.summarizer.clone();
        config.forced_tool = ForcedTool::Disallow;
        let params = CompletionParams { messages: vec![request], tools: vec![], config };

        let cancel = CancellationToken::new();
        let outcome = self.client.generate(&params, &cancel).await?;
        let chunks = match outcome {
            GenerateOutcome::Completed(chunks) => chunks,
            GenerateOutcome::Cancelled(chunks) => chunks,
        };
        let mut aggregator = Aggregator::new();
        for chunk in chunks {
            aggregator.add(chunk);
        }
        Ok(aggregator
            .reply("memory", "memory-fold-reply")
            .and_then(|m| m.content().map(|s| s.to_string()))
            .unwrap_or_default())
    }

    pub fn history(&self) -> &S {
        &self.history
    }
}
