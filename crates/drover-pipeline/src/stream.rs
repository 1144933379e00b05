//! Parser for the assistant's line-oriented, position-tagged reply stream.
//!
//! Every line is `TAG:PAYLOAD`. `f:` opens a new message part, `0:` carries a
//! JSON-encoded text chunk, `3:` an error string, and the remaining known tags
//! carry JSON objects. Objects with a `toolCallId` are folded into the tool
//! call of the current part.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::PipelineError;

static SUGGESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":suggestion\[(.*?)\]").unwrap());

/// Tags that carry a JSON payload and may hold tool call fragments.
const JSON_TAGS: &[&str] = &["2", "8", "9", "a", "b", "c", "d", "e", "g", "h", "i", "j", "k"];

/// A structured tool invocation returned by the assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    pub result: Value,
}

impl ToolCall {
    fn from_fields(fields: Map<String, Value>) -> Self {
        let text = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            tool_call_id: text("toolCallId"),
            tool_name: text("toolName"),
            args: fields.get("args").cloned().unwrap_or(Value::Null),
            result: fields.get("result").cloned().unwrap_or(Value::Null),
        }
    }

    fn invocation(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("state".into(), json!("result"));
        map.insert("toolCallId".into(), json!(self.tool_call_id));
        map.insert("toolName".into(), json!(self.tool_name));
        map.insert("args".into(), self.args.clone());
        map.insert("result".into(), self.result.clone());
        map
    }
}

/// One element of a parsed reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    Text { message_id: String, text: String },
    ToolCall { message_id: String, call: ToolCall },
}

#[derive(Default)]
struct PartBuilder {
    message_id: String,
    text: Option<String>,
    call: Option<Map<String, Value>>,
}

impl PartBuilder {
    fn finish(self, parts: &mut Vec<StreamPart>) {
        if let Some(text) = self.text {
            parts.push(StreamPart::Text {
                message_id: self.message_id.clone(),
                text,
            });
        }
        if let Some(fields) = self.call {
            parts.push(StreamPart::ToolCall {
                message_id: self.message_id,
                call: ToolCall::from_fields(fields),
            });
        }
    }
}

/// Parse a raw reply body into its ordered parts.
pub fn parse_stream(body: &str) -> Result<Vec<StreamPart>, PipelineError> {
    let mut parts = Vec::new();
    let mut current = PartBuilder::default();

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let Some((tag, payload)) = line.split_once(':') else {
            return Err(PipelineError::Protocol(format!("untagged stream line: {line}")));
        };

        match tag {
            "f" => {
                let start: Value = serde_json::from_str(payload)?;
                let message_id = start
                    .get("messageId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                std::mem::take(&mut current).finish(&mut parts);
                current.message_id = message_id;
            }
            "0" => {
                let chunk: String = serde_json::from_str(payload)?;
                current.text.get_or_insert_with(String::new).push_str(&chunk);
            }
            "3" => {
                let message: Value = serde_json::from_str(payload)?;
                return Err(PipelineError::Protocol(format!(
                    "assistant stream error: {}",
                    message.as_str().unwrap_or(payload)
                )));
            }
            tag if JSON_TAGS.contains(&tag) => {
                if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(payload)
                    && fields.contains_key("toolCallId")
                {
                    current.call.get_or_insert_with(Map::new).extend(fields);
                }
            }
            other => {
                return Err(PipelineError::Protocol(format!(
                    "unknown stream tag {other:?}"
                )));
            }
        }
    }

    current.finish(&mut parts);
    Ok(parts)
}

/// A parsed assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub parts: Vec<StreamPart>,
}

impl ChatReply {
    pub fn parse(body: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            parts: parse_stream(body)?,
        })
    }

    /// The first tool call named `name`.
    pub fn tool_call(&self, name: &str) -> Option<&ToolCall> {
        self.parts.iter().find_map(|part| match part {
            StreamPart::ToolCall { call, .. } if call.tool_name == name => Some(call),
            _ => None,
        })
    }

    /// Quick-reply buttons suggested in the last text part.
    pub fn buttons(&self) -> Vec<String> {
        let last_text = self.parts.iter().rev().find_map(|part| match part {
            StreamPart::Text { text, .. } => Some(text),
            _ => None,
        });
        last_text
            .map(|text| {
                SUGGESTION_RE
                    .captures_iter(text)
                    .map(|c| c[1].to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The first button agreeing to go ahead.
    pub fn affirmative_button(&self) -> Option<String> {
        self.buttons()
            .into_iter()
            .find(|b| b.to_lowercase().contains("yes") || b.starts_with("Proceed"))
    }

    /// This reply as the assistant turn of the conversation history.
    pub fn previous_message(&self, now: DateTime<Utc>) -> Value {
        let mut parts = Vec::new();
        let mut invocations = Vec::new();
        for (index, part) in self.parts.iter().enumerate() {
            match part {
                StreamPart::Text { text, .. } => {
                    parts.push(json!({"type": "text", "text": text}));
                }
                StreamPart::ToolCall { call, .. } => {
                    let mut step = call.invocation();
                    step.insert("step".into(), json!(index));
                    parts.push(json!({"type": "tool-invocation", "toolInvocation": step}));

                    let mut invocation = call.invocation();
                    invocation.insert("step".into(), json!(invocations.len()));
                    invocations.push(Value::Object(invocation));
                }
            }
        }

        let mut message = json!({
            "createdAt": now.to_rfc3339_opts(SecondsFormat::Millis, true),
            "role": "assistant",
            "parts": parts,
            "toolInvocations": invocations,
            "revisionId": Uuid::new_v4().to_string(),
        });
        let first_text = self.parts.iter().find_map(|part| match part {
            StreamPart::Text { message_id, text } => Some((message_id, text)),
            _ => None,
        });
        if let (Some((id, text)), Some(object)) = (first_text, message.as_object_mut()) {
            object.insert("id".into(), json!(id));
            object.insert("content".into(), json!(text));
        }
        message
    }
}

/// The payload of the first line tagged `tag`.
pub fn segment<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    body.lines()
        .find_map(|line| line.strip_prefix(tag)?.strip_prefix(':'))
}

/// The payload of the first line tagged `tag`, when it is a JSON object.
pub fn json_segment(body: &str, tag: &str) -> Result<Option<Value>, PipelineError> {
    match segment(body, tag) {
        Some(payload) if payload.starts_with('{') && payload.ends_with('}') => {
            Ok(Some(serde_json::from_str(payload)?))
        }
        _ => Ok(None),
    }
}
