// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Exact token counting and cost accounting.
//!
//! Framing constants below are not arbitrary — they reproduce, token for
//! token, what the upstream chat-completion endpoints actually bill for.
//! Drift between this crate's count and a provider-reported `usage` block is
//! logged, never treated as an error (see [`check_usage_drift`]).
use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::config::SupportedChatModel;
use crate::message::{FinishReason, Message};
use crate::tool::Tool;

fn bpe() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| tiktoken_rs::cl100k_base().expect("bundled cl100k_base ranks must load"))
}

/// Raw token count of a string.
pub fn tokens(text: &str) -> usize {
    bpe().encode_with_special_tokens(text).len()
}

/// Per-message framing: `content` costs `tokens(content) + 3` when present;
/// `name`/`role` costs `tokens(name) + 2` when a `name` is present, else
/// `tokens(role)`; a `ToolUsage` additionally costs
/// `tokens(tool_name) + 6 + tokens(args_str)`.
pub fn message_tokens(message: &Message) -> usize {
    let mut total = 0usize;
    if let Some(content) = message.content() {
        if !content.is_empty() {
            total += tokens(content) + 3;
        }
    }
    let name = match message {
        Message::ToolResult(m) => Some(m.name.as_str()),
        _ => None,
    };
    total += match name {
        Some(n) => tokens(n) + 2,
        None => tokens(role_str(message)),
    };
    if let Message::ToolUsage(tu) = message {
        total += tokens(&tu.tool_name) + 6 + tokens(&tu.args_str);
    }
    total
}

fn role_str(message: &Message) -> &'static str {
    match message.role() {
        crate::message::Role::System => "system",
        crate::message::Role::User => "user",
        crate::message::Role::Assistant => "assistant",
        crate::message::Role::Function => "function",
    }
}

/// `2` (sequence priming) + `Σ message_tokens(m)` + `1` (reply priming).
pub fn messages_tokens(messages: &[Message]) -> usize {
    2 + messages.iter().map(message_tokens).sum::<usize>() + 1
}

/// `15` (tools framing) + name/description tokens + per-parameter value
/// tokens, summed across every tool.
pub fn tools_tokens(tools: &[Tool]) -> usize {
    if tools.is_empty() {
        return 0;
    }
    let mut total = 15usize;
    for t in tools {
        total += tokens(&t.name);
        total += tokens(&t.description);
        for p in &t.parameters {
            let values = format!(
                "['{}', '{}', {}, {}]",
                p.kind_str(),
                p.description,
                p.enum_values.join(","),
                p.optional
            );
            total += tokens(&values);
        }
    }
    total
}

impl crate::tool::ToolParameter {
    fn kind_str(&self) -> &'static str {
        match self.kind {
            crate::tool::ParameterType::String => "string",
            crate::tool::ParameterType::Number => "number",
            crate::tool::ParameterType::Integer => "integer",
            crate::tool::ParameterType::Boolean => "boolean",
            crate::tool::ParameterType::Null => "null",
            crate::tool::ParameterType::Object => "object",
            crate::tool::ParameterType::Array => "array",
        }
    }
}

/// Token cost of a single reply, as billed when tools are or aren't present.
/// `-1` when there are no tools and no content (reply priming correction);
/// `0` when tools are present. Content and tool-call framing add on top.
pub fn model_tokens(message: &Message, has_tools: bool) -> i64 {
    let mut total: i64 = if has_tools { 0 } else { -1 };
    if let Some(content) = message.content() {
        if !content.is_empty() {
            total += tokens(content) as i64 + 1;
        }
    }
    if let Message::ToolUsage(tu) = message {
        total += tokens(&tu.tool_name) as i64 + tokens(&tu.args_str) as i64 + 4;
    }
    total
}

/// `tokens / 1000 * output_cost` when `is_reply`, else `tokens / 1000 * input_cost`.
pub fn tokens_cost(token_count: i64, model: &SupportedChatModel, is_reply: bool) -> f64 {
    let rate = if is_reply { model.output_cost } else { model.input_cost };
    (token_count as f64 / 1000.0) * rate
}

/// Compare a computed token count against a provider-reported one; log a
/// mismatch at `warn` level and never fail. Returns the computed count.
pub fn check_usage_drift(label: &str, computed: usize, reported: Option<u32>) -> usize {
    if let Some(reported) = reported {
        if reported as usize != computed {
            tracing::warn!(
                label,
                computed,
                reported,
                "token count drifted from provider-reported usage"
            );
        }
    }
    computed
}

/// `true` if the aggregated reply's `finish_reason` should still be treated
/// as a tool invocation for framing purposes.
pub fn reply_has_tool_use(reason: FinishReason) -> bool {
    matches!(reason, FinishReason::ToolUse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Metadata, ToolResultMessage, ToolUsageMessage, UserMessage, Usage};
    use chrono::Utc;

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

    #[test]
    fn tokens_of_empty_string_is_zero() {
        assert_eq!(tokens(""), 0);
    }

    #[test]
    fn tokens_counts_more_than_chars_fraction() {
        assert!(tokens("hello world") > 0);
    }

    #[test]
    fn message_tokens_adds_three_for_content_framing() {
        let m = user("hi");
        let content_tokens = tokens("hi");
        let role_tokens = tokens("user");
        assert_eq!(message_tokens(&m), content_tokens + 3 + role_tokens);
    }

    #[test]
    fn message_tokens_tool_result_uses_name_not_role() {
        let m = Message::ToolResult(ToolResultMessage {
            id: "1".into(),
            author: "calculator".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: "4".into(),
            name: "calculator".into(),
            created_at: Utc::now(),
        });
        let expected = tokens("4") + 3 + tokens("calculator") + 2;
        assert_eq!(message_tokens(&m), expected);
    }

    #[test]
    fn messages_tokens_adds_sequence_and_reply_priming() {
        let msgs = vec![user("a"), user("b")];
        let sum: usize = msgs.iter().map(message_tokens).sum();
        assert_eq!(messages_tokens(&msgs), 2 + sum + 1);
    }

    #[test]
    fn tools_tokens_empty_list_is_zero() {
        assert_eq!(tools_tokens(&[]), 0);
    }

    #[test]
    fn tools_tokens_nonempty_includes_framing_constant() {
        let tool = Tool::new("calc", "a calculator", vec![]);
        assert!(tools_tokens(&[tool]) >= 15);
    }

    #[test]
    fn model_tokens_no_tools_no_content_is_negative_one() {
        let m = Message::ToolUsage(ToolUsageMessage {
            id: "1".into(),
            author: "assistant".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: None,
            tool_name: String::new(),
            args_str: String::new(),
            usage: Usage::default(),
            created_at: Utc::now(),
        });
        // no content, empty tool_name/args_str → just the has_tools=false correction
        assert_eq!(model_tokens(&m, false), -1);
    }

    #[test]
    fn tokens_cost_uses_output_rate_for_reply() {
        let model = SupportedChatModel {
            name: "gpt-4".into(),
            size: 8000,
            input_cost: 0.03,
            output_cost: 0.06,
        };
        let cost = tokens_cost(1000, &model, true);
        assert!((cost - 0.06).abs() < 1e-9);
    }

    #[test]
    fn tokens_cost_uses_input_rate_for_prompt() {
        let model = SupportedChatModel {
            name: "gpt-4".into(),
            size: 8000,
            input_cost: 0.03,
            output_cost: 0.06,
        };
        let cost = tokens_cost(2000, &model, false);
        assert!((cost - 0.06).abs() < 1e-9);
    }

    #[test]
    fn check_usage_drift_returns_computed_regardless_of_mismatch() {
        assert_eq!(check_usage_drift("prompt", 100, Some(90)), 100);
        assert_eq!(check_usage_drift("prompt", 100, None), 100);
    }
}
