//! Local tools registered with every chat session.

use chrono::Utc;
use harness_application::{ToolOutput, ToolRegistration};
use harness_domain::{ToolDefinition, ToolParameter};
use serde::Deserialize;

#[derive(Deserialize)]
struct EncryptArgs {
    input: String,
}

/// "Encrypts" a string by upper-casing it.
pub fn encrypt_string() -> ToolRegistration {
    ToolRegistration::typed(
        ToolDefinition::new("encrypt_string", "Encrypts a string")
            .with_parameter(ToolParameter::new("input", "String to encrypt", true)),
        |_invocation, args: EncryptArgs| async move {
            Ok(ToolOutput::text(args.input.to_uppercase()))
        },
    )
}

/// Current UTC time as RFC 3339.
pub fn current_time() -> ToolRegistration {
    ToolRegistration::from_fn(
        ToolDefinition::new("current_time", "Returns the current UTC date and time"),
        |_invocation, _args| async move { Ok(ToolOutput::text(Utc::now().to_rfc3339())) },
    )
}

pub fn all() -> Vec<ToolRegistration> {
    vec![encrypt_string(), current_time()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_application::ToolInvocation;
    use harness_domain::SessionId;

    fn invocation(tool: &str) -> ToolInvocation {
        ToolInvocation {
            session_id: SessionId::new("s1"),
            tool_call_id: "tc-1".into(),
            tool_name: tool.into(),
        }
    }

    #[tokio::test]
    async fn test_encrypt_string_uppercases() {
        let tool = encrypt_string();
        let output = tool
            .handler()
            .call(invocation("encrypt_string"), serde_json::json!({"input": "Hello"}))
            .await
            .unwrap();
        assert_eq!(tool.serialize(&output.value), "HELLO");
    }

    #[tokio::test]
    async fn test_current_time_is_rfc3339() {
        let tool = current_time();
        let output = tool
            .handler()
            .call(invocation("current_time"), serde_json::json!({}))
            .await
            .unwrap();
        let text = tool.serialize(&output.value);
        assert!(chrono::DateTime::parse_from_rfc3339(&text).is_ok());
    }

    #[test]
    fn test_tool_names_unique() {
        let tools = all();
        let mut names: Vec<_> = tools.iter().map(|t| t.name().to_string()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), tools.len());
    }
}
