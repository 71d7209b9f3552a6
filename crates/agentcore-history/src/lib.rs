// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable, append-only per-session message log (component C).
//!
//! Backed by a single SQLite file. Each session's ordinary messages live in
//! the `messages` table, keyed by `(session, seq)` with a unique index on
//! `(session, id)`; the at-most-one summary per session lives in its own
//! `summaries` table so `summary()`/`set_summary()` never have to scan past
//! ordinary rows. Every operation opens its own connection from a pool-free
//! `Mutex<Connection>` and runs on a blocking thread, since `rusqlite` is
//! synchronous — this is the crate's one suspension point per spec §5.
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use agentcore_model::message::Message;

/// Substrate failure surfaced directly to the caller — never wrapped as a
/// `ModelError` by the orchestrator (§7).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("message serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("message id {0:?} already exists in session {1:?}")]
    DuplicateId(String, String),
    #[error("append() does not accept a SummaryMessage; use set_summary()")]
    SummaryViaAppend,
    #[error("a session may have at most one summary message")]
    MultipleSummaries,
}

/// Persistent key-value log of messages per session, partitioned by session
/// id. See spec §4.C.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Atomic insert; fails if `message.id()` already exists in `session`.
    async fn append(&self, session: &str, message: Message) -> Result<(), StorageError>;

    /// Ordered (insertion order) non-summary messages for `session`.
    async fn messages(&self, session: &str) -> Result<Vec<Message>, StorageError>;

    /// The session's summary, if one has been set.
    async fn summary(&self, session: &str) -> Result<Option<Message>, StorageError>;

    /// Upsert the session's summary (at most one may exist at a time).
    async fn set_summary(&self, session: &str, summary: Message) -> Result<(), StorageError>;

    /// Remove every message and the summary for `session`.
    async fn clear(&self, session: &str) -> Result<(), StorageError>;

    /// Remove one message by id. Idempotent: deleting an absent id is not an
    /// error (required for cross-process eviction tolerance, §4.D).
    async fn delete(&self, session: &str, id: &str) -> Result<(), StorageError>;
}

/// SQLite-backed [`HistoryStore`]. Cheaply `Clone`/`Arc`-shareable; internally
/// serializes access to the single connection with a blocking mutex, mirroring
/// the spec's "writes to one session are linearized by the substrate" model
/// extended here to the whole store (SQLite itself only allows one writer).
pub struct SqliteHistoryStore {
    conn: std::sync::Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (creating if absent) a SQLite file at `path` and ensure schema.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: std::sync::Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store, primarily for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: std::sync::Arc::new(Mutex::new(conn)) })
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                session TEXT NOT NULL,
                seq     INTEGER NOT NULL,
                id      TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (session, seq)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS messages_session_id ON messages(session, id);
            CREATE INDEX IF NOT EXISTS messages_session ON messages(session);
            CREATE TABLE IF NOT EXISTS summaries (
                session TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl Clone for SqliteHistoryStore {
    fn clone(&self) -> Self {
        Self { conn: self.conn.clone() }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, session: &str, message: Message) -> Result<(), StorageError> {
        if message.is_summary() {
            return Err(StorageError::SummaryViaAppend);
        }
        let session = session.to_string();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let conn = conn.lock().expect("history connection mutex poisoned");
            let id = message.id().to_string();
            let payload = serde_json::to_string(&message)?;
            let next_seq: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE session = ?1",
                    params![session],
                    |row| row.get(0),
                )?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO messages (session, seq, id, payload) VALUES (?1, ?2, ?3, ?4)",
                params![session, next_seq, id, payload],
            )?;
            if inserted == 0 {
                return Err(StorageError::DuplicateId(id, session));
            }
            Ok(())
        })
        .await
        .expect("append blocking task panicked")
    }

    async fn messages(&self, session: &str) -> Result<Vec<Message>, StorageError> {
        let session = session.to_string();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Message>, StorageError> {
            let conn = conn.lock().expect("history connection mutex poisoned");
            let mut stmt = conn.prepare(
                "SELECT payload FROM messages WHERE session = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![session], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                let payload = row?;
                out.push(serde_json::from_str(&payload)?);
            }
            Ok(out)
        })
        .await
        .expect("messages blocking task panicked")
    }

    async fn summary(&self, session: &str) -> Result<Option<Message>, StorageError> {
        let session = session.to_string();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Message>, StorageError> {
            let conn = conn.lock().expect("history connection mutex poisoned");
            let payload: Option<String> = conn
                .query_row(
                    "SELECT payload FROM summaries WHERE session = ?1",
                    params![session],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(match payload {
                Some(p) => Some(serde_json::from_str(&p)?),
                None => None,
            })
        })
        .await
        .expect("summary blocking task panicked")
    }

    async fn set_summary(&self, session: &str, summary: Message) -> Result<(), StorageError> {
        if !summary.is_summary() {
            return Err(StorageError::MultipleSummaries);
        }
        let session = session.to_string();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let conn = conn.lock().expect("history connection mutex poisoned");
            let payload = serde_json::to_string(&summary)?;
            conn.execute(
                "INSERT INTO summaries (session, payload) VALUES (?1, ?2)
                 ON CONFLICT(session) DO UPDATE SET payload = excluded.payload",
                params![session, payload],
            )?;
            Ok(())
        })
        .await
        .expect("set_summary blocking task panicked")
    }

    async fn clear(&self, session: &str) -> Result<(), StorageError> {
        let session = session.to_string();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let conn = conn.lock().expect("history connection mutex poisoned");
            conn.execute("DELETE FROM messages WHERE session = ?1", params![session])?;
            conn.execute("DELETE FROM summaries WHERE session = ?1", params![session])?;
            Ok(())
        })
        .await
        .expect("clear blocking task panicked")
    }

    async fn delete(&self, session: &str, id: &str) -> Result<(), StorageError> {
        let session = session.to_string();
        let id = id.to_string();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let conn = conn.lock().expect("history connection mutex poisoned");
            conn.execute(
                "DELETE FROM messages WHERE session = ?1 AND id = ?2",
                params![session, id],
            )?;
            Ok(())
        })
        .await
        .expect("delete blocking task panicked")
    }
}
