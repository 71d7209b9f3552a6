// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::Read as _;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use uuid::Uuid;

use agentcore_config::Config;
use agentcore_core::{EventBus, Orchestrator};
use agentcore_history::SqliteHistoryStore;
use agentcore_memory::ChatMemory;
use agentcore_model::client::CompletionClient;
use agentcore_model::config::{self as model_config, ForcedTool};
use agentcore_model::message::{Message, Metadata, UserMessage};
use agentcore_model::{MockProvider, ModelProvider, OpenAiProvider};
use agentcore_tools::{CalculatorTool, Executor, InternetSearchTool, PythonEvaluatorTool, WikipediaLookupTool};
use tokio_util::sync::CancellationToken;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = agentcore_config::load(cli.config.as_deref()).context("loading config")?;
    let session = cli.session.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input).context("reading stdin")?;
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("no input on stdin");
    }

    let orchestrator = build_orchestrator(&config, &session)?;

    let user_message = Message::User(UserMessage {
        id: Uuid::new_v4().to_string(),
        author: "user".to_string(),
        metadata: Metadata::default(),
        pinned: false,
        content: input.to_string(),
        created_at: chrono::Utc::now(),
    });

    let (bus, mut events) = EventBus::streaming();
    let echo = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(?event, "agent event");
        }
    });

    let cancel = CancellationToken::new();
    let cancel_on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_ctrl_c.cancel();
        }
    });

    let outcome = orchestrator.run(user_message, &bus, &cancel).await;
    drop(bus);
    let _ = echo.await;

    match outcome? {
        Some(reply) => {
            if let Some(text) = reply.content() {
                println!("{text}");
            }
        }
        None => {
            eprintln!("cancelled");
        }
    }

    Ok(())
}

/// Wires a config into a runnable [`Orchestrator`]: resolves the provider,
/// opens the sqlite history store, and registers the built-in tool set.
fn build_orchestrator(
    config: &Config,
    session: &str,
) -> anyhow::Result<Orchestrator<SqliteHistoryStore>> {
    let provider = build_provider(&config.model)?;
    let client = Arc::new(CompletionClient::new(provider));

    let chat_model = model_config::ModelConfig::new(
        config.model.chat_model.clone(),
        config.model.streaming,
        config.model.temperature,
        config.model.presence_penalty,
        config.model.frequency_penalty,
        config.model.max_tokens,
        ForcedTool::Any,
        config.model.system_prompt.clone(),
    )
    .context("invalid model config")?;

    let supported = model_config::supported_chat_model(&config.model.chat_model)
        .with_context(|| format!("unknown chat model: {}", config.model.chat_model))?;

    let summarizer = model_config::ModelConfig::new(
        config.summarizer.chat_model.clone(),
        false,
        config.summarizer.temperature,
        0.0,
        0.0,
        None,
        ForcedTool::Any,
        None,
    )
    .context("invalid summarizer config")?;

    if let Some(parent) = config.history.path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let history = SqliteHistoryStore::open(&config.history.path)
        .with_context(|| format!("opening history store at {}", config.history.path.display()))?;

    let memory = Arc::new(ChatMemory::new(history, client.clone(), summarizer));

    let mut tools = Executor::new();
    tools.register(CalculatorTool);
    tools.register(InternetSearchTool::default());
    tools.register(PythonEvaluatorTool::default());
    tools.register(WikipediaLookupTool);

    Ok(Orchestrator::new(session, memory, client, Arc::new(tools), chat_model, supported))
}

fn build_provider(model: &agentcore_config::ModelConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
    match model.provider.as_str() {
        "mock" => Ok(Arc::new(MockProvider)),
        "openai" => {
            let api_key = model
                .api_key
                .clone()
                .or_else(|| model.api_key_env.as_deref().and_then(|var| std::env::var(var).ok()));
            Ok(Arc::new(OpenAiProvider::new(
                model.chat_model.clone(),
                api_key,
                model.base_url.clone(),
                model.max_tokens,
                Some(model.temperature),
            )))
        }
        other => anyhow::bail!("unsupported provider: {other}"),
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
