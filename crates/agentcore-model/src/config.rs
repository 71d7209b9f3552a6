// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::tool::Tool;

/// Forced tool selection for one completion request.
///
/// - `Any` (`None` on the wire): the model may call any registered tool.
/// - `Disallow` (`""`): tools remain serialized on the wire, but
///   `function_call` is forced to the literal `"none"`, disabling
///   model-initiated selection without removing the tool list.
/// - `Named(name)`: the model must call exactly this tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForcedTool {
    #[default]
    Any,
    Disallow,
    Named(String),
}

/// Model parameters for one completion request. Out-of-range values are
/// rejected at construction, never sent to the wire.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub chat_model: String,
    pub streaming: bool,
    pub temperature: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub max_tokens: Option<u32>,
    pub forced_tool: ForcedTool,
    pub system_prompt: Option<String>,
}

impl ModelConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat_model: impl Into<String>,
        streaming: bool,
        temperature: f32,
        presence_penalty: f32,
        frequency_penalty: f32,
        max_tokens: Option<u32>,
        forced_tool: ForcedTool,
        system_prompt: Option<String>,
    ) -> Result<Self, ValidationError> {
        check_range("temperature", temperature, 0.0, 2.0)?;
        check_range("presence_penalty", presence_penalty, -2.0, 2.0)?;
        check_range("frequency_penalty", frequency_penalty, -2.0, 2.0)?;
        Ok(Self {
            chat_model: chat_model.into(),
            streaming,
            temperature,
            presence_penalty,
            frequency_penalty,
            max_tokens,
            forced_tool,
            system_prompt,
        })
    }

    /// `function_call` field for the wire request: `None` when any tool may
    /// be called, the literal `"none"` when selection is disallowed (tools
    /// are still serialized), or `{"name": ...}` to force a specific tool.
    pub fn function_call_wire(&self) -> serde_json::Value {
        match &self.forced_tool {
            ForcedTool::Any => serde_json::Value::Null,
            ForcedTool::Disallow => serde_json::Value::String("none".to_string()),
            ForcedTool::Named(name) => serde_json::json!({ "name": name }),
        }
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ValidationError> {
    if value < min || value > max {
        Err(ValidationError::OutOfRange { field, value, min, max })
    } else {
        Ok(())
    }
}

/// Metadata for a chat model this crate knows how to price and frame a
/// prompt window against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportedChatModel {
    pub name: String,
    /// Total context window in tokens.
    pub size: u32,
    /// USD per 1000 input tokens.
    pub input_cost: f64,
    /// USD per 1000 output tokens.
    pub output_cost: f64,
}

#[derive(Debug, Deserialize)]
struct SupportedChatModelsFile {
    models: Vec<SupportedChatModel>,
}

/// Bundled reference table of known chat models and their pricing, in the
/// style of this crate's model catalog.
pub fn supported_chat_models() -> Vec<SupportedChatModel> {
    let yaml = include_str!("../supported_chat_models.yaml");
    let file: SupportedChatModelsFile =
        serde_yaml::from_str(yaml).expect("bundled supported_chat_models.yaml must be valid");
    file.models
}

/// Look up a single model by name in the bundled reference table.
pub fn supported_chat_model(name: &str) -> Option<SupportedChatModel> {
    supported_chat_models().into_iter().find(|m| m.name == name)
}

/// Request sent to a completion client for one turn.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub messages: Vec<crate::message::Message>,
    pub tools: Vec<Tool>,
    pub config: ModelConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalog_contains_gpt_4() {
        let model = supported_chat_model("gpt-4").unwrap();
        assert_eq!(model.size, 8000);
        assert_eq!(model.output_cost, 0.06);
    }

    #[test]
    fn bundled_catalog_lookup_is_none_for_unknown_model() {
        assert!(supported_chat_model("not-a-real-model").is_none());
    }

    #[test]
    fn temperature_boundaries_accepted() {
        assert!(ModelConfig::new("gpt-4", false, 0.0, 0.0, 0.0, None, ForcedTool::Any, None).is_ok());
        assert!(ModelConfig::new("gpt-4", false, 2.0, 0.0, 0.0, None, ForcedTool::Any, None).is_ok());
    }

    #[test]
    fn temperature_just_over_max_rejected() {
        let err = ModelConfig::new("gpt-4", false, 2.0001, 0.0, 0.0, None, ForcedTool::Any, None).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "temperature", .. }));
    }

    #[test]
    fn penalties_out_of_range_rejected() {
        assert!(ModelConfig::new("gpt-4", false, 1.0, -2.1, 0.0, None, ForcedTool::Any, None).is_err());
        assert!(ModelConfig::new("gpt-4", false, 1.0, 0.0, 2.1, None, ForcedTool::Any, None).is_err());
    }

    #[test]
    fn forced_tool_disallow_sends_literal_none() {
        let cfg = ModelConfig::new("gpt-4", false, 1.0, 0.0, 0.0, None, ForcedTool::Disallow, None).unwrap();
        assert_eq!(cfg.function_call_wire(), serde_json::Value::String("none".into()));
    }

    #[test]
    fn forced_tool_any_sends_null() {
        let cfg = ModelConfig::new("gpt-4", false, 1.0, 0.0, 0.0, None, ForcedTool::Any, None).unwrap();
        assert_eq!(cfg.function_call_wire(), serde_json::Value::Null);
    }

    #[test]
    fn forced_tool_named_sends_name_object() {
        let cfg = ModelConfig::new(
            "gpt-4", false, 1.0, 0.0, 0.0, None, ForcedTool::Named("calculator".into()), None,
        ).unwrap();
        assert_eq!(cfg.function_call_wire(), serde_json::json!({"name": "calculator"}));
    }
}
