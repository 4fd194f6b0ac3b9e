//! Structured actions embedded in agent replies
//!
//! The agent is asked to answer "find me X" questions with a JSON envelope
//! `{"response": ..., "action": {"type": "highlight_asset", "assetName": ...}}`.
//! Models don't always comply, so parsing is best effort: anything that
//! doesn't fit the envelope is shown as plain text and fires nothing.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentAction {
    HighlightAsset { asset_name: String },
}

/// What to show for a finished reply, and what (if anything) to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    Structured {
        response: String,
        action: Option<AgentAction>,
    },
    PlainText(String),
}

impl ParsedReply {
    pub fn display_text(&self) -> &str {
        match self {
            ParsedReply::Structured { response, .. } => response,
            ParsedReply::PlainText(text) => text,
        }
    }

    pub fn action(&self) -> Option<&AgentAction> {
        match self {
            ParsedReply::Structured { action, .. } => action.as_ref(),
            ParsedReply::PlainText(_) => None,
        }
    }

    pub fn into_parts(self) -> (String, Option<AgentAction>) {
        match self {
            ParsedReply::Structured { response, action } => (response, action),
            ParsedReply::PlainText(text) => (text, None),
        }
    }
}

fn fence_markers() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```json|```").expect("static regex"))
}

/// Parse a fully assembled agent reply. Never fails.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let cleaned = fence_markers().replace_all(raw, "");
    let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(cleaned.trim()) else {
        return ParsedReply::PlainText(raw.to_string());
    };

    let response = match envelope.get("response") {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        _ => return ParsedReply::PlainText(raw.to_string()),
    };
    let Some(Value::Object(action)) = envelope.get("action") else {
        return ParsedReply::PlainText(raw.to_string());
    };

    let action = match (action.get("type"), action.get("assetName")) {
        (Some(Value::String(kind)), Some(Value::String(name)))
            if kind == "highlight_asset" && !name.is_empty() =>
        {
            Some(AgentAction::HighlightAsset {
                asset_name: name.clone(),
            })
        }
        _ => None,
    };

    ParsedReply::Structured { response, action }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_envelope() {
        let reply = parse_reply(
            r#"{"response":"found it","action":{"type":"highlight_asset","assetName":"CODEMAKER"}}"#,
        );
        assert_eq!(reply.display_text(), "found it");
        assert_eq!(
            reply.action(),
            Some(&AgentAction::HighlightAsset {
                asset_name: "CODEMAKER".to_string()
            })
        );
    }

    #[test]
    fn test_plain_text_passes_through() {
        let reply = parse_reply("hi there");
        assert_eq!(reply, ParsedReply::PlainText("hi there".to_string()));
        assert!(reply.action().is_none());
    }

    #[test]
    fn test_fenced_envelope() {
        let raw = "```json\n{\"response\":\"here\",\"action\":{\"type\":\"highlight_asset\",\"assetName\":\"SYNC_GREEN_CL\"}}\n```";
        let (text, action) = parse_reply(raw).into_parts();
        assert_eq!(text, "here");
        assert_eq!(
            action,
            Some(AgentAction::HighlightAsset {
                asset_name: "SYNC_GREEN_CL".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_action_type_shows_response_without_firing() {
        let reply = parse_reply(r#"{"response":"ok","action":{"type":"open_wizard"}}"#);
        assert_eq!(reply.display_text(), "ok");
        assert!(reply.action().is_none());
    }

    #[test]
    fn test_missing_action_is_plain_text() {
        let raw = r#"{"response":"just words"}"#;
        assert_eq!(parse_reply(raw), ParsedReply::PlainText(raw.to_string()));
    }

    #[test]
    fn test_non_object_json_is_plain_text() {
        assert_eq!(parse_reply("42"), ParsedReply::PlainText("42".to_string()));
        assert_eq!(
            parse_reply("[1, 2]"),
            ParsedReply::PlainText("[1, 2]".to_string())
        );
    }
}
