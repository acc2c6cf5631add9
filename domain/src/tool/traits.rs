//! Tool domain traits
//!
//! Contains pure domain logic traits for argument validation.
//! The async handler port is defined in the application layer.

use super::entities::{ToolCall, ToolDefinition};

/// Validator for tool calls
///
/// This is a pure domain trait that validates tool calls
/// against their definitions without any I/O operations.
pub trait ToolValidator {
    /// Validate a tool call against its definition
    fn validate(&self, call: &ToolCall, definition: &ToolDefinition) -> Result<(), String>;
}

/// Default implementation of ToolValidator
///
/// Arguments must be a JSON object (`null` is treated as empty), contain
/// every required parameter, contain no undeclared keys, and each declared
/// value must match its [`ParamType`](super::entities::ParamType).
#[derive(Debug, Clone, Default)]
pub struct DefaultToolValidator;

impl ToolValidator for DefaultToolValidator {
    fn validate(&self, call: &ToolCall, definition: &ToolDefinition) -> Result<(), String> {
        let empty = serde_json::Map::new();
        let arguments = match &call.arguments {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => &empty,
            other => {
                return Err(format!(
                    "Arguments for tool '{}' must be an object, got {}",
                    definition.name,
                    json_kind(other)
                ));
            }
        };

        for param in &definition.parameters {
            if param.required && !arguments.contains_key(&param.name) {
                return Err(format!(
                    "Missing required parameter '{}' for tool '{}'",
                    param.name, definition.name
                ));
            }
        }

        for (arg_name, value) in arguments {
            let Some(param) = definition.parameter(arg_name) else {
                return Err(format!(
                    "Unknown parameter '{}' for tool '{}'",
                    arg_name, definition.name
                ));
            };
            if value.is_null() && !param.required {
                continue;
            }
            if !param.param_type.matches(value) {
                return Err(format!(
                    "Parameter '{}' for tool '{}' must be {}, got {}",
                    arg_name,
                    definition.name,
                    param.param_type,
                    json_kind(value)
                ));
            }
        }

        Ok(())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::entities::{ParamType, ToolParameter};

    fn definition() -> ToolDefinition {
        ToolDefinition::new("test", "test tool")
            .with_parameter(ToolParameter::new("param1", "First param", true))
            .with_parameter(
                ToolParameter::new("count", "Second param", false).with_type(ParamType::Integer),
            )
    }

    #[test]
    fn test_validator_missing_required() {
        let call = ToolCall::new("tc-1", "test");
        let result = DefaultToolValidator.validate(&call, &definition());
        assert!(result.unwrap_err().contains("Missing required parameter"));
    }

    #[test]
    fn test_validator_unknown_param() {
        let call = ToolCall::new("tc-1", "test")
            .with_arg("param1", "x")
            .with_arg("unknown_param", "value");
        let result = DefaultToolValidator.validate(&call, &definition());
        assert!(result.unwrap_err().contains("Unknown parameter"));
    }

    #[test]
    fn test_validator_wrong_type() {
        let call = ToolCall::new("tc-1", "test")
            .with_arg("param1", "x")
            .with_arg("count", "three");
        let err = DefaultToolValidator
            .validate(&call, &definition())
            .unwrap_err();
        assert!(err.contains("must be integer"));
    }

    #[test]
    fn test_validator_non_object_arguments() {
        let call = ToolCall::new("tc-1", "test").with_arguments(serde_json::json!([1, 2]));
        let err = DefaultToolValidator
            .validate(&call, &definition())
            .unwrap_err();
        assert!(err.contains("must be an object"));
    }

    #[test]
    fn test_validator_null_arguments_for_parameterless_tool() {
        let def = ToolDefinition::new("ping", "no params");
        let call = ToolCall::new("tc-1", "ping").with_arguments(serde_json::Value::Null);
        assert!(DefaultToolValidator.validate(&call, &def).is_ok());
    }

    #[test]
    fn test_validator_valid_call() {
        let call = ToolCall::new("tc-1", "test")
            .with_arg("param1", "value1")
            .with_arg("count", 2);
        assert!(DefaultToolValidator.validate(&call, &definition()).is_ok());
    }
}
