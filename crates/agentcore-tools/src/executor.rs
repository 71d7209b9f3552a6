// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool Registry & Executor: adapts this crate's built-in tools onto the
//! spec-level message model ([`ToolUsageMessage`] in, [`ToolResultMessage`]
//! out).
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use agentcore_model::message::{Metadata, ToolResultMessage, ToolUsageMessage};
use agentcore_model::tool::Tool as ToolSchema;

/// One executable tool implementation. Distinct from [`agentcore_model::tool::Tool`],
/// which is only the wire-facing name/description/parameter schema; this
/// trait is the thing that actually runs.
#[async_trait]
pub trait ToolImplementation: Send + Sync {
    fn schema(&self) -> ToolSchema;

    fn name(&self) -> String {
        self.schema().name
    }

    /// Run the tool. A `Err` here is folded into an error [`ToolResultMessage`]
    /// by the executor — implementations should never panic on bad input.
    async fn call(&self, args: serde_json::Value) -> Result<String, String>;
}

/// Holds every registered tool implementation and turns a [`ToolUsageMessage`]
/// into a [`ToolResultMessage`], per the spec's `execute()` contract: unknown
/// tool, argument-parse failure, and validation failure all become an error
/// result rather than propagating, and any error returned from inside a
/// tool's `call()` is likewise folded into an error result.
#[derive(Default)]
pub struct Executor {
    tools: HashMap<String, Arc<dyn ToolImplementation>>,
}

impl Executor {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl ToolImplementation + 'static) {
        self.tools.insert(tool.name(), Arc::new(tool));
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute the tool call a [`ToolUsageMessage`] describes, producing the
    /// [`ToolResultMessage`] that follows it in history.
    pub async fn execute(&self, usage: &ToolUsageMessage) -> ToolResultMessage {
        let Some(implementation) = self.tools.get(&usage.tool_name) else {
            return error_result(usage, format!("unknown tool: {}", usage.tool_name));
        };

        let schema = implementation.schema();
        let args = usage.arguments();
        if let Err(e) = schema.validate_args(&args) {
            return error_result(usage, e.to_string());
        }

        match implementation.call(args).await {
            Ok(content) => ToolResultMessage {
                id: format!("{}-result", usage.id),
                author: usage.tool_name.clone(),
                metadata: Metadata::default(),
                pinned: false,
                content,
                name: usage.tool_name.clone(),
                created_at: Utc::now(),
            },
            Err(e) => error_result(usage, e),
        }
    }
}

fn error_result(usage: &ToolUsageMessage, message: String) -> ToolResultMessage {
    ToolResultMessage {
        id: format!("{}-result", usage.id),
        author: usage.tool_name.clone(),
        metadata: Metadata::default(),
        pinned: false,
        content: format!("error: {message}"),
        name: usage.tool_name.clone(),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_model::message::Usage;
    use agentcore_model::tool::{ParameterType, ToolParameter};

    struct EchoTool;

    #[async_trait]
    impl ToolImplementation for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new(
                "echo",
                "echoes its input",
                vec![ToolParameter::required("text", ParameterType::String, "text to echo")],
            )
        }

        async fn call(&self, args: serde_json::Value) -> Result<String, String> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolImplementation for FailingTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("boom", "always fails", vec![])
        }

        async fn call(&self, _args: serde_json::Value) -> Result<String, String> {
            Err("kaboom".to_string())
        }
    }

    fn usage(tool_name: &str, args_str: &str) -> ToolUsageMessage {
        ToolUsageMessage {
            id: "u1".into(),
            author: "assistant".into(),
            metadata: Metadata::default(),
            pinned: false,
            content: None,
            tool_name: tool_name.into(),
            args_str: args_str.into(),
            usage: Usage::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unknown_tool_produces_error_result() {
        let exec = Executor::new();
        let result = exec.execute(&usage("nope", "{}")).await;
        assert!(result.content.starts_with("error:"));
        assert!(result.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn missing_required_argument_produces_error_result() {
        let mut exec = Executor::new();
        exec.register(EchoTool);
        let result = exec.execute(&usage("echo", "{}")).await;
        assert!(result.content.starts_with("error:"));
    }

    #[tokio::test]
    async fn successful_call_produces_ok_result() {
        let mut exec = Executor::new();
        exec.register(EchoTool);
        let result = exec.execute(&usage("echo", r#"{"text":"hi"}"#)).await;
        assert_eq!(result.content, "hi");
        assert_eq!(result.name, "echo");
    }

    #[tokio::test]
    async fn implementation_error_is_folded_into_error_result_not_propagated() {
        let mut exec = Executor::new();
        exec.register(FailingTool);
        let result = exec.execute(&usage("boom", "{}")).await;
        assert!(result.content.contains("kaboom"));
    }

    #[tokio::test]
    async fn malformed_args_str_defaults_to_empty_object_and_fails_validation() {
        let mut exec = Executor::new();
        exec.register(EchoTool);
        let result = exec.execute(&usage("echo", "not json")).await;
        assert!(result.content.starts_with("error:"));
    }
}
