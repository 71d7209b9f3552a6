// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Incrementally builds one assistant reply out of streamed chunks.
use chrono::Utc;

use crate::message::{AssistantMessage, FinishReason, Message, Metadata, ToolUsageMessage, Usage};

/// A single streamed chunk fed into the aggregator. Mirrors the subset of
/// [`crate::message::Message`] fields a provider can emit mid-stream.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub content: Option<String>,
    pub tool_name: Option<String>,
    pub args_str: Option<String>,
    pub finish_reason: Option<FinishReason>,
    /// Provider-reported prompt token count, carried by a `Usage` event.
    pub reported_prompt_tokens: Option<u32>,
    /// Provider-reported completion token count, carried by a `Usage` event.
    pub reported_reply_tokens: Option<u32>,
}

/// Builds one [`Message::Assistant`] or [`Message::ToolUsage`] out of a
/// stream of [`Chunk`]s.
///
/// `content`, `tool_name`, and `args_str` are string-concatenated across
/// every chunk added. The aggregated variant is `ToolUsage` iff any chunk
/// carried a tool name. `finish_reason` adopts the last non-`Undefined`
/// value seen, defaulting to `Cancelled` when [`Aggregator::cancel`] is
/// called mid-stream. `reply()` returns `None` if no chunk was ever added.
#[derive(Debug, Default)]
pub struct Aggregator {
    is_aggregating: bool,
    content: String,
    has_content: bool,
    tool_name: String,
    args_str: String,
    is_tool_use: bool,
    finish_reason: FinishReason,
    reported_prompt_tokens: Option<u32>,
    reported_reply_tokens: Option<u32>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, chunk: Chunk) {
        self.is_aggregating = true;
        if let Some(c) = chunk.content {
            self.content.push_str(&c);
            self.has_content = true;
        }
        if let Some(name) = chunk.tool_name {
            self.tool_name.push_str(&name);
            self.is_tool_use = true;
        }
        if let Some(args) = chunk.args_str {
            self.args_str.push_str(&args);
            self.is_tool_use = true;
        }
        if let Some(reason) = chunk.finish_reason {
            if reason != FinishReason::Undefined {
                self.finish_reason = reason;
            }
        }
        if chunk.reported_prompt_tokens.is_some() {
            self.reported_prompt_tokens = chunk.reported_prompt_tokens;
        }
        if chunk.reported_reply_tokens.is_some() {
            self.reported_reply_tokens = chunk.reported_reply_tokens;
        }
    }

    /// Force `CANCELLED` on mid-stream cancellation.
    pub fn cancel(&mut self) {
        self.is_aggregating = true;
        self.finish_reason = FinishReason::Cancelled;
    }

    /// Provider-reported `(prompt_tokens, reply_tokens)`, if a `Usage` event
    /// was ever folded in. Compared against this crate's own computed count
    /// by [`crate::tokenizer::check_usage_drift`], never substituted for it.
    pub fn reported_usage(&self) -> (Option<u32>, Option<u32>) {
        (self.reported_prompt_tokens, self.reported_reply_tokens)
    }

    /// Build the aggregated reply, or `None` if no chunk was ever added.
    pub fn reply(&self, author: impl Into<String>, id: impl Into<String>) -> Option<Message> {
        if !self.is_aggregating {
            return None;
        }
        let usage = Usage {
            prompt_tokens: 0,
            reply_tokens: 0,
            cost: 0.0,
            finish_reason: self.finish_reason,
        };
        let content = if self.has_content { Some(self.content.clone()) } else { None };
        if self.is_tool_use {
            Some(Message::ToolUsage(ToolUsageMessage {
                id: id.into(),
                author: author.into(),
                metadata: Metadata::default(),
                pinned: false,
                content,
                tool_name: self.tool_name.clone(),
                args_str: self.args_str.clone(),
                usage,
                created_at: Utc::now(),
            }))
        } else {
            Some(Message::Assistant(AssistantMessage {
                id: id.into(),
                author: author.into(),
                metadata: Metadata::default(),
                pinned: false,
                content,
                usage,
                created_at: Utc::now(),
            }))
        }
    }
}
