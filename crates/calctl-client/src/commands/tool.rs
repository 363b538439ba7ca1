//! Tool commands: run one tool from JSON arguments, print tool definitions.

use std::io::Read;

use calctl_providers::{CalendarOperations, invoke, tool_definitions};
use serde_json::Value;

use crate::error::{ClientError, ClientResult};

/// Run `name` with `args` and print the text result or the JSON error.
pub async fn run(ops: &CalendarOperations, name: &str, args: Option<String>) -> ClientResult<()> {
    let args = parse_args(args)?;
    match invoke(ops, name, args).await {
        Ok(text) => {
            println!("{}", text.trim_end());
            Ok(())
        }
        Err(err) => {
            println!("{}", err.to_json());
            Err(ClientError::Tool(err))
        }
    }
}

/// Print the definitions of every tool.
pub fn definitions() -> ClientResult<()> {
    let json = serde_json::to_string_pretty(&tool_definitions())
        .map_err(|e| ClientError::Usage(format!("failed to serialize tool definitions: {e}")))?;
    println!("{json}");
    Ok(())
}

fn parse_args(raw: Option<String>) -> ClientResult<Value> {
    let Some(mut raw) = raw else {
        return Ok(Value::Null);
    };
    if raw == "-" {
        raw.clear();
        std::io::stdin().read_to_string(&mut raw)?;
    }
    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&raw)
        .map_err(|e| ClientError::Usage(format!("tool arguments are not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_args_are_null() {
        assert_eq!(parse_args(None).unwrap(), Value::Null);
        assert_eq!(parse_args(Some("  ".to_string())).unwrap(), Value::Null);
    }

    #[test]
    fn args_are_parsed() {
        let value = parse_args(Some(r#"{"event_query": "Standup"}"#.to_string())).unwrap();
        assert_eq!(value["event_query"], "Standup");
    }

    #[test]
    fn invalid_json_is_usage_error() {
        let err = parse_args(Some("{oops".to_string())).unwrap_err();
        assert_eq!(err.code(), "usage");
        assert!(err.needs_user_action());
    }
}
