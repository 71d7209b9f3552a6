// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use agentcore_model::tool::{ParameterType, Tool as ToolSchema, ToolParameter};

use crate::executor::ToolImplementation;

/// Looks up a Wikipedia article's summary via the public REST API.
#[derive(Default)]
pub struct WikipediaLookupTool;

#[async_trait]
impl ToolImplementation for WikipediaLookupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "wikipedia_lookup",
            "Look up a Wikipedia article and return a short plain-text summary.",
            vec![ToolParameter::required("title", ParameterType::String, "article title, e.g. 'Rust (programming language)'")],
        )
    }

    async fn call(&self, args: Value) -> Result<String, String> {
        let title = args["title"].as_str().unwrap_or_default().to_string();
        debug!(title = %title, "wikipedia_lookup tool");
        wikipedia_summary(&title).await.map_err(|e| e.to_string())
    }
}

async fn wikipedia_summary(title: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("agentcore/0.1")
        .build()?;

    let url = format!(
        "https://en.wikipedia.org/api/rest_v1/page/summary/{}",
        urlencoding(title)
    );

    let resp = client.get(&url).header("Accept", "application/json").send().await?;

    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(format!("no Wikipedia article found for '{title}'"));
    }
    if !resp.status().is_success() {
        anyhow::bail!("Wikipedia API returned status {}", resp.status());
    }

    let json: Value = resp.json().await?;
    let extract = json.get("extract").and_then(|v| v.as_str()).unwrap_or("(no summary available)");
    let page_title = json.get("title").and_then(|v| v.as_str()).unwrap_or(title);
    Ok(format!("{page_title}\n\n{extract}"))
}

fn urlencoding(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            ' ' => encoded.push('_'),
            c => {
                for byte in c.to_string().as_bytes() {
                    encoded.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    encoded
}
