//! Tool domain entities

use serde::{Deserialize, Serialize};

/// Closed set of argument value shapes a tool parameter can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Whether a JSON value has this shape. `null` never matches.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Definition of a tool the model may call
///
/// The parameter list is the explicit argument shape descriptor: arguments
/// are checked against it before any handler runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique name of the tool within a session (e.g., "encrypt_string")
    pub name: String,
    /// Human-readable description shown to the model
    pub description: String,
    /// Parameter specifications
    pub parameters: Vec<ToolParameter>,
}

/// Parameter specification for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub param_type: ParamType,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
            param_type: ParamType::String,
        }
    }

    pub fn with_type(mut self, param_type: ParamType) -> Self {
        self.param_type = param_type;
        self
    }
}

/// A backend-issued request to run a registered tool
///
/// `id` is generated by the backend and unique within the session.
/// `arguments` is untyped at the protocol boundary; it is validated against
/// the tool's [`ToolDefinition`] before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_arguments(mut self, arguments: serde_json::Value) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if !self.arguments.is_object() {
            self.arguments = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.arguments.as_object_mut() {
            map.insert(key.into(), value.into());
        }
        self
    }

    pub fn argument(&self, key: &str) -> Option<&serde_json::Value> {
        self.arguments.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_type_matches() {
        assert!(ParamType::String.matches(&serde_json::json!("x")));
        assert!(ParamType::Integer.matches(&serde_json::json!(3)));
        assert!(!ParamType::Integer.matches(&serde_json::json!(3.5)));
        assert!(ParamType::Number.matches(&serde_json::json!(3.5)));
        assert!(ParamType::Array.matches(&serde_json::json!([1])));
        assert!(!ParamType::Object.matches(&serde_json::Value::Null));
    }

    #[test]
    fn test_definition_builder() {
        let def = ToolDefinition::new("encrypt_string", "Encrypts a string")
            .with_parameter(ToolParameter::new("input", "String to encrypt", true));
        assert_eq!(def.parameters.len(), 1);
        assert_eq!(def.parameter("input").unwrap().param_type, ParamType::String);
        assert!(def.parameter("other").is_none());
    }

    #[test]
    fn test_tool_call_with_arg_on_non_object() {
        let call = ToolCall::new("tc-1", "t")
            .with_arguments(serde_json::json!("raw"))
            .with_arg("input", "Hello");
        assert_eq!(call.argument("input").unwrap(), "Hello");
    }

    #[test]
    fn test_tool_call_deserializes_camel_case() {
        let json = serde_json::json!({
            "id": "tc-1",
            "toolName": "encrypt_string",
            "arguments": {"input": "Hello"}
        });
        let call: ToolCall = serde_json::from_value(json).unwrap();
        assert_eq!(call.tool_name, "encrypt_string");
    }
}
