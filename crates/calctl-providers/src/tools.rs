//! Tool surface for a tool-calling host.
//!
//! Each tool takes JSON arguments and returns plain text. Failures become a
//! [`ToolError`] whose `kind` tells the host who has to act.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{ErrorCategory, ProviderError, ProviderErrorCode, ProviderResult};
use crate::operations::{
    CalendarOperations, DEFAULT_DAYS_AHEAD, DEFAULT_MAX_RESULTS, EventDraft, EventPatch,
    ListRequest,
};

pub const LIST_EVENTS: &str = "list_events";
pub const ADD_EVENT: &str = "add_event";
pub const EDIT_EVENT: &str = "edit_event";
pub const DELETE_EVENT: &str = "delete_event";

fn default_days_ahead() -> u32 {
    DEFAULT_DAYS_AHEAD
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListEventsArgs {
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for ListEventsArgs {
    fn default() -> Self {
        Self {
            days_ahead: DEFAULT_DAYS_AHEAD,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddEventArgs {
    pub title: String,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub all_day: bool,
}

impl From<AddEventArgs> for EventDraft {
    fn from(args: AddEventArgs) -> Self {
        EventDraft {
            title: args.title,
            start_time: args.start_time,
            end_time: args.end_time,
            description: args.description,
            location: args.location,
            all_day: args.all_day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditEventArgs {
    pub event_query: String,
    #[serde(default)]
    pub new_title: Option<String>,
    #[serde(default)]
    pub new_start_time: Option<String>,
    #[serde(default)]
    pub new_end_time: Option<String>,
    #[serde(default)]
    pub new_description: Option<String>,
    #[serde(default)]
    pub new_location: Option<String>,
}

impl EditEventArgs {
    fn patch(&self) -> EventPatch {
        EventPatch {
            title: self.new_title.clone(),
            start_time: self.new_start_time.clone(),
            end_time: self.new_end_time.clone(),
            description: self.new_description.clone(),
            location: self.new_location.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteEventArgs {
    pub event_query: String,
}

pub async fn list_events(ops: &CalendarOperations, args: ListEventsArgs) -> ProviderResult<String> {
    let request = ListRequest::days_ahead(args.days_ahead).with_max_results(args.max_results);
    ops.list(&request).await
}

pub async fn add_event(ops: &CalendarOperations, args: AddEventArgs) -> ProviderResult<String> {
    let created = ops.add(&EventDraft::from(args)).await?;
    Ok(created.to_string())
}

pub async fn edit_event(ops: &CalendarOperations, args: EditEventArgs) -> ProviderResult<String> {
    let outcome = ops.edit(&args.event_query, &args.patch()).await?;
    Ok(outcome.to_string())
}

pub async fn delete_event(ops: &CalendarOperations, args: DeleteEventArgs) -> ProviderResult<String> {
    let outcome = ops.delete(&args.event_query).await?;
    Ok(outcome.to_string())
}

/// A failed tool call as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind} error ({code}): {message}")]
pub struct ToolError {
    /// Who has to act: `setup`, `consent`, `credential`, `input`, `remote` or `internal`.
    pub kind: &'static str,
    /// The precise error code.
    pub code: &'static str,
    pub message: String,
}

impl ToolError {
    fn unknown_tool(name: &str) -> Self {
        Self {
            kind: ErrorCategory::Input.as_str(),
            code: ProviderErrorCode::InvalidInput.as_str(),
            message: format!(
                "unknown tool '{name}', expected one of: {LIST_EVENTS}, {ADD_EVENT}, {EDIT_EVENT}, {DELETE_EVENT}"
            ),
        }
    }

    fn bad_arguments(tool: &str, err: serde_json::Error) -> Self {
        Self {
            kind: ErrorCategory::Input.as_str(),
            code: ProviderErrorCode::InvalidInput.as_str(),
            message: format!("invalid arguments for {tool}: {err}"),
        }
    }

    /// Renders the error as the JSON object handed to the host.
    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.kind,
            "code": self.code,
            "message": self.message,
        })
    }
}

impl From<ProviderError> for ToolError {
    fn from(err: ProviderError) -> Self {
        Self {
            kind: err.category().as_str(),
            code: err.code().as_str(),
            message: err.message().to_string(),
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::bad_arguments(tool, e))
}

/// Runs the tool `name` with JSON `args`.
pub async fn invoke(ops: &CalendarOperations, name: &str, args: Value) -> Result<String, ToolError> {
    debug!(tool = name, "invoking tool");
    let result = match name {
        LIST_EVENTS => list_events(ops, parse_args(name, args)?).await,
        ADD_EVENT => add_event(ops, parse_args(name, args)?).await,
        EDIT_EVENT => edit_event(ops, parse_args(name, args)?).await,
        DELETE_EVENT => delete_event(ops, parse_args(name, args)?).await,
        _ => return Err(ToolError::unknown_tool(name)),
    };
    result.map_err(|err| {
        warn!(tool = name, error = %err, "tool call failed");
        ToolError::from(err)
    })
}

/// Name, description and JSON schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Describes the four tools for a host that advertises them to a model.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: LIST_EVENTS,
            description: "List upcoming calendar events.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "days_ahead": {"type": "integer", "minimum": 0, "default": DEFAULT_DAYS_AHEAD},
                    "max_results": {"type": "integer", "minimum": 1, "default": DEFAULT_MAX_RESULTS}
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: ADD_EVENT,
            description: "Create a calendar event. Times accept ISO 8601 or phrases like 'tomorrow at 3pm'.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "start_time": {"type": "string"},
                    "end_time": {"type": "string", "description": "Defaults to one hour after the start, or the start date for all-day events."},
                    "description": {"type": "string"},
                    "location": {"type": "string"},
                    "all_day": {"type": "boolean", "default": false}
                },
                "required": ["title", "start_time"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: EDIT_EVENT,
            description: "Change the single event matching a search query. Nothing is changed if the query matches no event or several.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "event_query": {"type": "string"},
                    "new_title": {"type": "string"},
                    "new_start_time": {"type": "string"},
                    "new_end_time": {"type": "string"},
                    "new_description": {"type": "string"},
                    "new_location": {"type": "string"}
                },
                "required": ["event_query"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: DELETE_EVENT,
            description: "Delete the single event matching a search query. Nothing is deleted if the query matches no event or several.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "event_query": {"type": "string"}
                },
                "required": ["event_query"],
                "additionalProperties": false
            }),
        },
    ]
}
