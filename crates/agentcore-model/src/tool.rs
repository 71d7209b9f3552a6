// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON Schema primitive types accepted by a [`ToolParameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Null,
    Object,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub optional: bool,
}

impl ToolParameter {
    pub fn required(name: impl Into<String>, kind: ParameterType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            enum_values: Vec::new(),
            optional: false,
        }
    }

    pub fn optional_param(name: impl Into<String>, kind: ParameterType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            enum_values: Vec::new(),
            optional: true,
        }
    }

    pub fn with_enum(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// A tool's static definition: name, description, and an ordered parameter
/// list. Serializes to a JSON-Schema `{"type": "object", "properties": {...}}`
/// with `required` omitted entirely when no parameter is mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Vec<ToolParameter>) -> Self {
        Self { name: name.into(), description: description.into(), parameters }
    }

    /// JSON-Schema representation of `parameters`, ready for the wire
    /// `functions`/`tools` array.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            let mut prop = serde_json::Map::new();
            prop.insert("type".to_string(), serde_json::to_value(p.kind).unwrap());
            prop.insert("description".to_string(), Value::String(p.description.clone()));
            if !p.enum_values.is_empty() {
                prop.insert("enum".to_string(), Value::Array(
                    p.enum_values.iter().cloned().map(Value::String).collect(),
                ));
            }
            properties.insert(p.name.clone(), Value::Object(prop));
            if !p.optional {
                required.push(Value::String(p.name.clone()));
            }
        }
        let mut schema = serde_json::Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        Value::Object(schema)
    }

    /// Validate a call's arguments against this tool's parameter list:
    /// every required parameter must be present, no unknown parameter may
    /// appear, and enum-constrained values must be one of the declared set.
    pub fn validate_args(&self, args: &Value) -> Result<(), crate::error::ValidationError> {
        use crate::error::ValidationError;
        let obj = args.as_object().cloned().unwrap_or_default();
        let known: std::collections::HashSet<&str> =
            self.parameters.iter().map(|p| p.name.as_str()).collect();
        for key in obj.keys() {
            if !known.contains(key.as_str()) {
                return Err(ValidationError::UnknownParameter(key.clone()));
            }
        }
        for p in &self.parameters {
            match obj.get(&p.name) {
                None if !p.optional => return Err(ValidationError::MissingParameter(p.name.clone())),
                Some(v) if !p.enum_values.is_empty() => {
                    let s = v.as_str().unwrap_or_default();
                    if !p.enum_values.iter().any(|e| e == s) {
                        return Err(ValidationError::NotInEnum {
                            field: p.name.clone(),
                            value: s.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_param_tool_omits_required_and_uses_empty_properties() {
        let t = Tool::new("ping", "ping the server", vec![]);
        let schema = t.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"], serde_json::json!({}));
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn required_and_optional_parameters_split_correctly() {
        let t = Tool::new(
            "search",
            "search the web",
            vec![
                ToolParameter::required("query", ParameterType::String, "search text"),
                ToolParameter::optional_param("limit", ParameterType::Integer, "max results"),
            ],
        );
        let schema = t.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["query"]));
        assert!(schema["properties"]["limit"].is_object());
    }

    #[test]
    fn validate_args_rejects_unknown_parameter() {
        let t = Tool::new("x", "x", vec![ToolParameter::required("a", ParameterType::String, "")]);
        let err = t.validate_args(&serde_json::json!({"a": "1", "b": "2"})).unwrap_err();
        assert!(matches!(err, crate::error::ValidationError::UnknownParameter(_)));
    }

    #[test]
    fn validate_args_rejects_missing_required() {
        let t = Tool::new("x", "x", vec![ToolParameter::required("a", ParameterType::String, "")]);
        let err = t.validate_args(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, crate::error::ValidationError::MissingParameter(_)));
    }

    #[test]
    fn validate_args_enforces_enum() {
        let t = Tool::new(
            "x",
            "x",
            vec![ToolParameter::required("unit", ParameterType::String, "").with_enum(["c", "f"])],
        );
        assert!(t.validate_args(&serde_json::json!({"unit": "k"})).is_err());
        assert!(t.validate_args(&serde_json::json!({"unit": "c"})).is_ok());
    }

    #[test]
    fn validate_args_allows_missing_optional() {
        let t = Tool::new(
            "x",
            "x",
            vec![ToolParameter::optional_param("limit", ParameterType::Integer, "")],
        );
        assert!(t.validate_args(&serde_json::json!({})).is_ok());
    }
}
