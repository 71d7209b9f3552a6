// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Errors surfaced by the Generation Orchestrator.
use agentcore_history::StorageError;
use agentcore_memory::MemoryError;
use agentcore_model::client::CompletionError;

/// Unrecoverable failure from one orchestrator run. Any failure not already
/// an `ModelError` (e.g. a raw completion/storage/handler error) is wrapped
/// with [`ModelError::Generation`]; a `ModelError` raised from inside an
/// event handler or from a recursive orchestrator call is re-raised
/// unwrapped, never double-wrapped.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("a generation is already running for this session")]
    AlreadyRunning,
    #[error("event handler failed: {0}")]
    Handler(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("failed to generate a reply: {0}")]
    Generation(String),
}
