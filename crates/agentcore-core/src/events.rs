// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The event bus the Generation Orchestrator publishes its lifecycle to.
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use agentcore_model::aggregator::Chunk;
use agentcore_model::config::ModelConfig;
use agentcore_model::message::{Message, ToolResultMessage, ToolUsageMessage};
use agentcore_model::tool::Tool;

use crate::error::ModelError;

/// One step of a generation run, in the order the orchestrator fires them.
///
/// `ModelGeneration` carries either a streamed `chunk` (streaming providers,
/// fired once per chunk) or a `snapshot` of the whole reply (non-streaming
/// providers, fired once) — never both.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A user message was submitted and a run is starting.
    ModelRun(Message),
    /// The completion request is about to be sent.
    ModelStart {
        config: ModelConfig,
        context: Vec<Message>,
        tools: Vec<Tool>,
    },
    ModelGeneration {
        chunk: Option<Chunk>,
        snapshot: Option<Message>,
    },
    /// The completion call returned (or was cancelled); carries the
    /// aggregated reply before it is interpreted as text or a tool call.
    ModelEnd(Message),
    ToolUse(ToolUsageMessage),
    ToolResult(ToolResultMessage),
    /// The run finished with a final, user-facing reply.
    ModelReply(Message),
    /// The run was cancelled before a reply was produced.
    ModelInterrupt(),
    ModelError(String),
}

/// A handler subscribed to the bus. Handlers run sequentially, in
/// registration order, each awaited to completion before the next event
/// fires; an error aborts the remaining handlers for that event.
pub type EventHandler = Arc<dyn Fn(AgentEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Ordered, sequentially-dispatched pub/sub bus for one generation run.
///
/// This is deliberately not an `mpsc` channel on the publishing side: the
/// orchestrator needs to know a handler (e.g. one that persists a message)
/// has finished before moving on, which a fire-and-forget send cannot give
/// it. [`EventBus::streaming`] bridges back to the channel idiom for
/// consumers that just want to observe the run.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Vec<EventHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    /// Dispatch `event` to every handler in order, awaiting each before
    /// moving to the next. Stops at the first handler error and surfaces it
    /// as [`ModelError::Handler`].
    pub async fn fire(&self, event: AgentEvent) -> Result<(), ModelError> {
        for handler in &self.handlers {
            handler(event.clone())
                .await
                .map_err(|e| ModelError::Handler(e.to_string()))?;
        }
        Ok(())
    }

    /// Build a bus with one registered handler that forwards every event
    /// onto an `mpsc` channel, for callers that want to observe a run as a
    /// stream rather than by registering their own handler.
    pub fn streaming() -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let mut bus = Self::new();
        bus.register(Arc::new(move |event| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(event).await;
                Ok(())
            })
        }));
        (bus, rx)
    }
}
