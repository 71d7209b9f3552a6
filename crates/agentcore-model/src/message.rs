// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Reserved id and author used by the single per-session [`SummaryMessage`].
pub const SUMMARY_ID: &str = "SUMMARY";
pub const SUMMARY_AUTHOR: &str = "summary_of_previous_messages";

/// Literal delimiter used to embed metadata into the wire `content` string.
///
/// Write-only: nothing in this crate parses the delimiter back out of
/// `content` on ingress. It exists purely so a human or log line reading the
/// raw wire payload can see which message produced it.
pub const METADATA_DELIMITER: &str = "<|METADATA|>";

fn author_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{1,64}$").unwrap())
}

/// Validate a message author name against `^[A-Za-z0-9_]{1,64}$`.
pub fn validate_author(author: &str) -> Result<(), ValidationError> {
    if author_regex().is_match(author) {
        Ok(())
    } else {
        Err(ValidationError::BadAuthorName(author.to_string()))
    }
}

/// The wire role of a message, derived from its variant rather than stored
/// redundantly on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Wire role `"function"` for [`Message::ToolResult`].
    Function,
}

/// Terminal condition of one assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Done,
    ToolUse,
    LimitReached,
    Filtered,
    Cancelled,
    Undefined,
}

impl Default for FinishReason {
    fn default() -> Self {
        Self::Undefined
    }
}

pub type Metadata = HashMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub pinned: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMessage {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub pinned: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// At most one per session (enforced by the History Store, not by this type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMessage {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub pinned: bool,
    pub content: String,
    /// Id of the last original message folded into this summary.
    pub last_included_id: String,
    pub created_at: DateTime<Utc>,
}

impl SummaryMessage {
    pub fn new(content: impl Into<String>, last_included_id: impl Into<String>) -> Self {
        Self {
            id: SUMMARY_ID.to_string(),
            author: SUMMARY_AUTHOR.to_string(),
            metadata: Metadata::default(),
            pinned: false,
            content: content.into(),
            last_included_id: last_included_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Role `function`. `name` is mandatory and must equal the tool name of the
/// preceding `ToolUsage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub pinned: bool,
    pub content: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub reply_tokens: u32,
    pub cost: f64,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub pinned: bool,
    pub content: Option<String>,
    #[serde(flatten)]
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
}

/// An [`AssistantMessage`] whose reply is a tool invocation. `args_str` is
/// kept as raw wire JSON text; `arguments()` parses it lazily and defaults
/// to `{}` on a parse failure rather than propagating an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUsageMessage {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub pinned: bool,
    pub content: Option<String>,
    pub tool_name: String,
    pub args_str: String,
    #[serde(flatten)]
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
}

impl ToolUsageMessage {
    /// Parse `args_str` as a JSON object, defaulting to `{}` on failure.
    pub fn arguments(&self) -> Value {
        serde_json::from_str(&self.args_str).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

/// The message sum type used throughout history, memory, and the
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    System(SystemMessage),
    Summary(SummaryMessage),
    ToolResult(ToolResultMessage),
    Assistant(AssistantMessage),
    ToolUsage(ToolUsageMessage),
}

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Message::User(m) => &m.id,
            Message::System(m) => &m.id,
            Message::Summary(m) => &m.id,
            Message::ToolResult(m) => &m.id,
            Message::Assistant(m) => &m.id,
            Message::ToolUsage(m) => &m.id,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            Message::User(m) => &m.author,
            Message::System(m) => &m.author,
            Message::Summary(m) => &m.author,
            Message::ToolResult(m) => &m.author,
            Message::Assistant(m) => &m.author,
            Message::ToolUsage(m) => &m.author,
        }
    }

    pub fn pinned(&self) -> bool {
        match self {
            Message::User(m) => m.pinned,
            Message::System(m) => m.pinned,
            Message::Summary(m) => m.pinned,
            Message::ToolResult(m) => m.pinned,
            Message::Assistant(m) => m.pinned,
            Message::ToolUsage(m) => m.pinned,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Message::User(m) => &m.metadata,
            Message::System(m) => &m.metadata,
            Message::Summary(m) => &m.metadata,
            Message::ToolResult(m) => &m.metadata,
            Message::Assistant(m) => &m.metadata,
            Message::ToolUsage(m) => &m.metadata,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::User(_) => Role::User,
            Message::System(_) | Message::Summary(_) => Role::System,
            Message::ToolResult(_) => Role::Function,
            Message::Assistant(_) | Message::ToolUsage(_) => Role::Assistant,
        }
    }

    /// Plain-text content, if this variant carries one directly (a
    /// contentless `ToolUsage`/`AssistantMessage` returns `None`).
    pub fn content(&self) -> Option<&str> {
        match self {
            Message::User(m) => Some(&m.content),
            Message::System(m) => Some(&m.content),
            Message::Summary(m) => Some(&m.content),
            Message::ToolResult(m) => Some(&m.content),
            Message::Assistant(m) => m.content.as_deref(),
            Message::ToolUsage(m) => m.content.as_deref(),
        }
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, Message::Summary(_))
    }

    /// The wire dict shape: `{role, content, name?, function_call?}`.
    /// Metadata is embedded into `content` via [`METADATA_DELIMITER`].
    pub fn to_wire(&self) -> Value {
        let mut content = self.content().unwrap_or("").to_string();
        if !self.metadata().is_empty() {
            let mut tagged = self.metadata().clone();
            tagged.insert("id".to_string(), Value::String(self.id().to_string()));
            content.push_str(METADATA_DELIMITER);
            content.push_str(&serde_json::to_string(&tagged).unwrap_or_default());
        }
        let mut obj = serde_json::Map::new();
        obj.insert(
            "role".to_string(),
            Value::String(
                match self.role() {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Function => "function",
                }
                .to_string(),
            ),
        );
        obj.insert("content".to_string(), Value::String(content));
        if let Message::ToolResult(m) = self {
            obj.insert("name".to_string(), Value::String(m.name.clone()));
        }
        if let Message::ToolUsage(m) = self {
            obj.insert(
                "function_call".to_string(),
                serde_json::json!({ "name": m.tool_name, "arguments": m.args_str }),
            );
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_regex_accepts_alnum_underscore() {
        assert!(validate_author("user_123").is_ok());
    }

    #[test]
    fn author_regex_rejects_empty() {
        assert!(validate_author("").is_err());
    }

    #[test]
    fn author_regex_rejects_over_64_chars() {
        let long = "a".repeat(65);
        assert!(validate_author(&long).is_err());
    }

    #[test]
    fn author_regex_rejects_special_chars() {
        assert!(validate_author("user-name").is_err());
    }

    #[test]
    fn summary_message_uses_reserved_id_and_author() {
        let s = SummaryMessage::new("the gist", "msg-42");
        assert_eq!(s.id, SUMMARY_ID);
        assert_eq!(s.author, SUMMARY_AUTHOR);
        assert_eq!(s.last_included_id, "msg-42");
    }

    #[test]
    fn tool_usage_arguments_parses_valid_json() {
        let m = ToolUsageMessage {
            id: "1".into(),
            author: "assistant".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: None,
            tool_name: "calculator".into(),
            args_str: r#"{"x": 1}"#.into(),
            usage: Usage::default(),
            created_at: Utc::now(),
        };
        assert_eq!(m.arguments(), serde_json::json!({"x": 1}));
    }

    #[test]
    fn tool_usage_arguments_defaults_to_empty_object_on_parse_failure() {
        let m = ToolUsageMessage {
            id: "1".into(),
            author: "assistant".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: None,
            tool_name: "calculator".into(),
            args_str: "not json".into(),
            usage: Usage::default(),
            created_at: Utc::now(),
        };
        assert_eq!(m.arguments(), serde_json::json!({}));
    }

    #[test]
    fn role_derivation_matches_variant() {
        let u = Message::User(UserMessage {
            id: "1".into(),
            author: "bob".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: "hi".into(),
            created_at: Utc::now(),
        });
        assert_eq!(u.role(), Role::User);

        let tr = Message::ToolResult(ToolResultMessage {
            id: "2".into(),
            author: "calculator".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: "4".into(),
            name: "calculator".into(),
            created_at: Utc::now(),
        });
        assert_eq!(tr.role(), Role::Function);
    }

    #[test]
    fn to_wire_embeds_metadata_with_delimiter() {
        let mut metadata = Metadata::default();
        metadata.insert("chat_id".into(), serde_json::json!("c1"));
        let m = Message::User(UserMessage {
            id: "1".into(),
            author: "bob".into(),
            metadata,
            pinned: false,
            content: "hello".into(),
            created_at: Utc::now(),
        });
        let wire = m.to_wire();
        let content = wire["content"].as_str().unwrap();
        assert!(content.starts_with("hello"));
        assert!(content.contains(METADATA_DELIMITER));
        assert!(content.contains("chat_id"));
    }

    #[test]
    fn to_wire_omits_delimiter_when_no_metadata() {
        let m = Message::User(UserMessage {
            id: "1".into(),
            author: "bob".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: "hello".into(),
            created_at: Utc::now(),
        });
        let wire = m.to_wire();
        assert_eq!(wire["content"].as_str().unwrap(), "hello");
    }

    #[test]
    fn to_wire_tool_usage_includes_function_call() {
        let m = Message::ToolUsage(ToolUsageMessage {
            id: "1".into(),
            author: "assistant".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: None,
            tool_name: "calculator".into(),
            args_str: r#"{"x":1}"#.into(),
            usage: Usage::default(),
            created_at: Utc::now(),
        });
        let wire = m.to_wire();
        assert_eq!(wire["function_call"]["name"], "calculator");
    }

    #[test]
    fn message_round_trips_through_json() {
        let m = Message::Assistant(AssistantMessage {
            id: "1".into(),
            author: "assistant".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: Some("hi".into()),
            usage: Usage {
                prompt_tokens: 10,
                reply_tokens: 2,
                cost: 0.0001,
                finish_reason: FinishReason::Done,
            },
            created_at: Utc::now(),
        });
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), m.id());
        assert_eq!(back.content(), m.content());
    }
}
