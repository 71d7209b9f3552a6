// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use agentcore_model::tool::{ParameterType, Tool as ToolSchema, ToolParameter};

use crate::executor::ToolImplementation;

const OUTPUT_LIMIT: usize = 20_000;

/// Runs a short Python expression/script in a subprocess (`python3 -c`) and
/// returns its stdout, bounded by a wall-clock timeout.
pub struct PythonEvaluatorTool {
    pub timeout_secs: u64,
}

impl Default for PythonEvaluatorTool {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[async_trait]
impl ToolImplementation for PythonEvaluatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "python_evaluator",
            "Evaluate a short Python 3 snippet in a subprocess and return its stdout. \
             Use print() to produce output.",
            vec![ToolParameter::required("code", ParameterType::String, "python source to run")],
        )
    }

    async fn call(&self, args: Value) -> Result<String, String> {
        let code = args["code"].as_str().unwrap_or_default().to_string();
        debug!(len = code.len(), "python_evaluator tool");

        let mut cmd = Command::new("python3");
        cmd.arg("-c").arg(&code);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            cmd.output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => {
                let stdout = truncate(&String::from_utf8_lossy(&output.stdout), OUTPUT_LIMIT);
                if output.status.success() {
                    Ok(stdout)
                } else {
                    let stderr = truncate(&String::from_utf8_lossy(&output.stderr), OUTPUT_LIMIT);
                    Err(format!("exit {}: {stderr}", output.status.code().unwrap_or(-1)))
                }
            }
            Ok(Err(e)) => Err(format!("failed to spawn python3: {e}")),
            Err(_) => Err(format!("timed out after {}s", self.timeout_secs)),
        }
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        let mut boundary = limit;
        while boundary > 0 && !s.is_char_boundary(boundary) {
            boundary -= 1;
        }
        format!("{}...[truncated {} bytes]", &s[..boundary], s.len() - boundary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn evaluates_print_statement() {
        let t = PythonEvaluatorTool::default();
        let out = t.call(serde_json::json!({"code": "print(2 + 2)"})).await.unwrap();
        assert_eq!(out.trim(), "4");
    }

    #[tokio::test]
    async fn propagates_nonzero_exit_as_error() {
        let t = PythonEvaluatorTool::default();
        let err = t.call(serde_json::json!({"code": "import sys; sys.exit(1)"})).await.unwrap_err();
        assert!(err.contains("exit 1"));
    }

    #[tokio::test]
    async fn slow_script_times_out() {
        let t = PythonEvaluatorTool { timeout_secs: 1 };
        let err = t.call(serde_json::json!({"code": "import time; time.sleep(5)"})).await.unwrap_err();
        assert!(err.contains("timed out"));
    }

    #[test]
    fn truncate_does_not_split_a_multibyte_char_at_the_limit() {
        // '€' is 3 bytes (UTF-8 E2 82 AC); placed so the limit lands mid-char.
        let mut s = "a".repeat(19_999);
        s.push('€');
        let out = truncate(&s, OUTPUT_LIMIT);
        assert!(out.starts_with(&"a".repeat(19_999)));
        assert!(out.contains("truncated 3 bytes"));
    }
}
