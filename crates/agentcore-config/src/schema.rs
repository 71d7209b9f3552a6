// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_chat_model() -> String {
    "gpt-4".to_string()
}

fn default_summarizer_model() -> String {
    "gpt-3.5-turbo-0613".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

/// Top-level layered config. Merged from [`crate::loader::config_search_paths`]
/// plus an optional explicit override path, lowest to highest priority.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Connection settings plus chat-model knobs for the provider that drives
/// the main conversation. See `agentcore_model::config::ModelConfig` for the
/// narrower set of knobs this is turned into before being handed to the
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier. Only "openai" and "mock" are wired up; "mock"
    /// talks to no network and echoes the last user message, useful for
    /// smoke-testing a config without spending API credits.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name forwarded to the provider API and looked up in the
    /// bundled chat-model catalog for context-window sizing and cost.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Environment variable that holds the API key (read at runtime).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer `api_key_env` in config files to avoid
    /// secrets in version-controlled files.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL override, e.g. for an OpenAI-compatible local proxy.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default = "default_true")]
    pub streaming: bool,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            chat_model: default_chat_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: default_temperature(),
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            streaming: true,
            system_prompt: None,
        }
    }
}

/// The cheaper model used to fold evicted history into a running summary.
/// Kept separate from [`ModelConfig`] since it is deliberately a smaller,
/// non-streaming model and never sees tool schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_summarizer_model")]
    pub chat_model: String,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self { chat_model: default_summarizer_model(), temperature: 0.0 }
    }
}

/// Where session history is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Path to the sqlite database file. Relative paths are resolved against
    /// the current working directory.
    pub path: std::path::PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { path: default_history_path() }
    }
}

fn default_history_path() -> std::path::PathBuf {
    dirs::data_dir()
        .map(|d| d.join("agentcore").join("history.sqlite3"))
        .unwrap_or_else(|| std::path::PathBuf::from("agentcore-history.sqlite3"))
}
