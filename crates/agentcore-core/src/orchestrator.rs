// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Generation Orchestrator: drives one chat turn from a user message to
//! a final reply, looping through tool calls along the way.
//!
//! State machine: `IDLE -> RUNNING -> (GENERATING -> [TOOL_USING -> GENERATING]*)
//! -> FINISHED / CANCELLED / ERROR`. One orchestrator instance is bound to a
//! single session and runs at most one generation at a time; different
//! sessions get independent orchestrator instances.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use agentcore_history::HistoryStore;
use agentcore_memory::ChatMemory;
use agentcore_model::aggregator::Aggregator;
use agentcore_model::client::{CompletionClient, GenerateOutcome};
use agentcore_model::config::{CompletionParams, ModelConfig, SupportedChatModel};
use agentcore_model::message::{Message, Metadata, SystemMessage};
use agentcore_model::tokenizer::{check_usage_drift, messages_tokens, model_tokens, tokens_cost, tools_tokens};
use agentcore_tools::Executor;

use crate::error::ModelError;
use crate::events::{AgentEvent, EventBus};

/// Extra tokens reserved for the reply when sizing the prompt window, passed
/// straight through to [`ChatMemory::prompt_window`].
const DEFAULT_REPLY_RESERVATION: u32 = 512;

pub struct Orchestrator<S: HistoryStore> {
    session: String,
    memory: Arc<ChatMemory<S>>,
    client: Arc<CompletionClient>,
    tools: Arc<Executor>,
    model: ModelConfig,
    chat_model: SupportedChatModel,
    reply_reservation: u32,
    running: AtomicBool,
}

impl<S: HistoryStore> Orchestrator<S> {
    pub fn new(
        session: impl Into<String>,
        memory: Arc<ChatMemory<S>>,
        client: Arc<CompletionClient>,
        tools: Arc<Executor>,
        model: ModelConfig,
        chat_model: SupportedChatModel,
    ) -> Self {
        Self {
            session: session.into(),
            memory,
            client,
            tools,
            model,
            chat_model,
            reply_reservation: DEFAULT_REPLY_RESERVATION,
            running: AtomicBool::new(false),
        }
    }

    /// Run one turn starting from `user_message`. Returns `Ok(Some(reply))`
    /// on a normal finish, `Ok(None)` if the run was cancelled before a
    /// reply was produced (partial history is retained either way), and
    /// `Err` on an unrecoverable failure.
    pub async fn run(
        &self,
        user_message: Message,
        bus: &EventBus,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>, ModelError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ModelError::AlreadyRunning);
        }
        let result = self.run_inner(user_message, bus, cancel).await;
        self.running.store(false, Ordering::SeqCst);

        match result {
            Ok(outcome) => Ok(outcome),
            Err(ModelError::Handler(msg)) => Err(ModelError::Handler(msg)),
            Err(e) => {
                let _ = bus.fire(AgentEvent::ModelError(e.to_string())).await;
                Err(ModelError::Generation(format!("failed to generate a reply: {e}")))
            }
        }
    }

    async fn run_inner(
        &self,
        user_message: Message,
        bus: &EventBus,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>, ModelError> {
        bus.fire(AgentEvent::ModelRun(user_message.clone())).await?;
        self.memory.append(&self.session, user_message).await?;

        loop {
            let window = self
                .memory
                .prompt_window(&self.session, &self.chat_model, self.reply_reservation)
                .await?;

            let mut context = Vec::with_capacity(window.len() + 1);
            if let Some(prompt) = &self.model.system_prompt {
                context.push(Message::System(SystemMessage {
                    id: "system-prompt".to_string(),
                    author: "system".to_string(),
                    metadata: Metadata::default(),
                    pinned: true,
                    content: prompt.clone(),
                    created_at: chrono::Utc::now(),
                }));
            }
            context.extend(window);

            let tool_schemas = self.tools.schemas();
            bus.fire(AgentEvent::ModelStart {
                config: self.model.clone(),
                context: context.clone(),
                tools: tool_schemas.clone(),
            })
            .await?;

            let params = CompletionParams {
                messages: context.clone(),
                tools: tool_schemas.clone(),
                config: self.model.clone(),
            };
            let (chunks, was_cancelled) = match self.client.generate(&params, cancel).await? {
                GenerateOutcome::Completed(chunks) => (chunks, false),
                GenerateOutcome::Cancelled(chunks) => (chunks, true),
            };
            if was_cancelled && chunks.is_empty() {
                bus.fire(AgentEvent::ModelInterrupt()).await?;
                return Ok(None);
            }

            let mut aggregator = Aggregator::new();
            if self.model.streaming {
                for chunk in chunks {
                    aggregator.add(chunk.clone());
                    bus.fire(AgentEvent::ModelGeneration { chunk: Some(chunk), snapshot: None }).await?;
                }
            } else {
                for chunk in chunks {
                    aggregator.add(chunk);
                }
            }
            if was_cancelled {
                aggregator.cancel();
            }

            let reply_id = Uuid::new_v4().to_string();
            let Some(reply) = aggregator.reply("assistant", reply_id) else {
                return Err(ModelError::Generation("model returned an empty reply".to_string()));
            };

            if !self.model.streaming {
                bus.fire(AgentEvent::ModelGeneration { chunk: None, snapshot: Some(reply.clone()) }).await?;
            }

            let has_tools = !tool_schemas.is_empty();
            let prompt_tokens = messages_tokens(&context) as i64;
            let toolset_tokens = tools_tokens(&tool_schemas) as i64;
            let generated_tokens = model_tokens(&reply, has_tools);
            let cost = tokens_cost(prompt_tokens + toolset_tokens, &self.chat_model, false)
                + tokens_cost(generated_tokens, &self.chat_model, true);
            let (reported_prompt, reported_reply) = aggregator.reported_usage();
            check_usage_drift("prompt_tokens", prompt_tokens.max(0) as usize, reported_prompt);
            check_usage_drift("reply_tokens", generated_tokens.max(0) as usize, reported_reply);
            let reply = with_usage(reply, prompt_tokens, generated_tokens, cost);

            bus.fire(AgentEvent::ModelEnd(reply.clone())).await?;
            self.memory.append(&self.session, reply.clone()).await?;

            if was_cancelled {
                bus.fire(AgentEvent::ModelInterrupt()).await?;
                return Ok(None);
            }

            if let Message::ToolUsage(tool_usage) = &reply {
                bus.fire(AgentEvent::ToolUse(tool_usage.clone())).await?;
                let tool_result = self.tools.execute(tool_usage).await;
                bus.fire(AgentEvent::ToolResult(tool_result.clone())).await?;
                self.memory.append(&self.session, Message::ToolResult(tool_result)).await?;
                continue;
            }

            bus.fire(AgentEvent::ModelReply(reply.clone())).await?;
            return Ok(Some(reply));
        }
    }
}

/// Stamp computed token/cost metrics onto the aggregated reply. Provider-
/// reported usage, when present on the wire, is compared against these
/// computed counts by [`check_usage_drift`] just before this call — never
/// preferred over them.
fn with_usage(reply: Message, prompt_tokens: i64, generated_tokens: i64, cost: f64) -> Message {
    let prompt_tokens = prompt_tokens.max(0) as u32;
    let reply_tokens = generated_tokens.max(0) as u32;
    match reply {
        Message::Assistant(mut m) => {
            m.usage.prompt_tokens = prompt_tokens;
            m.usage.reply_tokens = reply_tokens;
            m.usage.cost = cost;
            Message::Assistant(m)
        }
        Message::ToolUsage(mut m) => {
            m.usage.prompt_tokens = prompt_tokens;
            m.usage.reply_tokens = reply_tokens;
            m.usage.cost = cost;
            Message::ToolUsage(m)
        }
        other => other,
    }
}
