// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Raised for out-of-range configuration, unknown tool names/parameters, or
/// out-of-enum values. Always raised before any network call and never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("author name {0:?} does not match ^[A-Za-z0-9_]{{1,64}}$")]
    BadAuthorName(String),
    #[error("unknown tool parameter: {0}")]
    UnknownParameter(String),
    #[error("missing required parameter: {0}")]
    MissingParameter(String),
    #[error("value {value} is not one of the allowed enum values for {field}")]
    NotInEnum { field: String, value: String },
    #[error("a session may have at most one summary message")]
    MultipleSummaries,
    #[error("request exceeds the model's maximum context length")]
    ContextLengthExceeded,
}

/// Transient upstream failure: timeout, connection failure, 5xx, or rate
/// limiting. The only error class retried by the completion client.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
    #[error("upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
}

/// Upstream rejected the request outright (auth failure, malformed request).
/// Never retried.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication error: {0}")]
    Authentication(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
