// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use agentcore_model::tool::{ParameterType, Tool as ToolSchema, ToolParameter};

use crate::executor::ToolImplementation;

/// Top-of-results web search over the Brave Search API. Requires
/// `BRAVE_API_KEY`.
#[derive(Default)]
pub struct InternetSearchTool {
    pub api_key: Option<String>,
}

#[async_trait]
impl ToolImplementation for InternetSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "internet_search",
            "Search the public internet and return a short plain-text summary of the top results.",
            vec![
                ToolParameter::required("query", ParameterType::String, "search text"),
                ToolParameter::optional_param("count", ParameterType::Integer, "number of results, 1-10 (default 5)"),
            ],
        )
    }

    async fn call(&self, args: Value) -> Result<String, String> {
        let query = args["query"].as_str().unwrap_or_default().to_string();
        let count = args.get("count").and_then(|v| v.as_u64()).unwrap_or(5).clamp(1, 10) as usize;
        debug!(query = %query, count, "internet_search tool");

        let api_key = self.api_key.clone().or_else(|| std::env::var("BRAVE_API_KEY").ok());
        let Some(api_key) = api_key else {
            return Err("no BRAVE_API_KEY configured".to_string());
        };

        brave_search(&query, count, &api_key).await.map_err(|e| e.to_string())
    }
}

async fn brave_search(query: &str, count: usize, api_key: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("agentcore/0.1")
        .build()?;

    let url = format!(
        "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
        urlencoding(query),
        count
    );

    let resp = client
        .get(&url)
        .header("Accept", "application/json")
        .header("Accept-Encoding", "gzip")
        .header("X-Subscription-Token", api_key)
        .send()
        .await?;

    if !resp.status().is_success() {
        anyhow::bail!("Brave API returned status {}", resp.status());
    }

    let json: Value = resp.json().await?;
    let results = json
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[]);

    if results.is_empty() {
        return Ok("(no results)".to_string());
    }

    let mut output = Vec::new();
    for (i, r) in results.iter().enumerate().take(count) {
        let title = r.get("title").and_then(|v| v.as_str()).unwrap_or("(no title)");
        let url = r.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let desc = r.get("description").and_then(|v| v.as_str()).unwrap_or("");
        output.push(format!("{}. {}\n   {}\n   {}", i + 1, title, url, desc));
    }
    Ok(output.join("\n\n"))
}

fn urlencoding(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            ' ' => encoded.push('+'),
            c => {
                for byte in c.to_string().as_bytes() {
                    encoded.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_query_only() {
        let schema = InternetSearchTool::default().schema();
        assert_eq!(schema.parameters_schema()["required"], serde_json::json!(["query"]));
    }

    #[tokio::test]
    async fn call_without_api_key_errors() {
        std::env::remove_var("BRAVE_API_KEY");
        let t = InternetSearchTool { api_key: None };
        let err = t.call(serde_json::json!({"query": "rust"})).await.unwrap_err();
        assert!(err.contains("BRAVE_API_KEY"));
    }
}
