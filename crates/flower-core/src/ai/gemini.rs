//! Gemini REST client with server-sent-event streaming

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;

use super::{split_lines, ChatBackend, ChunkStream, Role, Turn};
use crate::error::ChatError;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Environment variables checked for a key, in order
pub const KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gemini-2.5-flash".to_string(),
            "gemini-2.5-pro".to_string(),
            "gemini-2.0-flash".to_string(),
        ]
    }

    fn build_request(system_instruction: &str, turns: &[Turn]) -> GenerateContentRequest {
        let contents = turns
            .iter()
            .map(|turn| Content {
                role: Some(
                    match turn.role {
                        Role::User => "user",
                        Role::Model => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        let system_instruction = (!system_instruction.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: system_instruction.to_string(),
            }],
        });

        GenerateContentRequest {
            contents,
            system_instruction,
        }
    }
}

/// First non-blank value among `KEY_VARS`, as reported by `lookup`
pub fn key_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    KEY_VARS
        .iter()
        .find_map(|var| lookup(var).filter(|v| !v.trim().is_empty()))
}

/// Process environment lookup, the default for `key_from`
pub fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

#[async_trait]
impl ChatBackend for GeminiClient {
    async fn stream_chat(
        &self,
        system_instruction: &str,
        turns: &[Turn],
    ) -> Result<ChunkStream, ChatError> {
        let url = format!("{}/{}:streamGenerateContent?alt=sse", self.base_url, self.model);
        let request = Self::build_request(system_instruction, turns);

        tracing::debug!(model = %self.model, turns = turns.len(), "gemini stream request");
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, body));
        }

        let chunks = split_lines(response.bytes_stream())
            .filter_map(|line| async move {
                match line {
                    Ok(line) => decode_sse_line(&line).transpose(),
                    Err(err) => Some(Err(err)),
                }
            })
            .boxed();
        Ok(chunks)
    }
}

/// Text carried by one SSE line; `None` for keep-alives and non-data lines
fn decode_sse_line(line: &str) -> Result<Option<String>, ChatError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let parsed: GenerateContentResponse =
        serde_json::from_str(data).map_err(|e| ChatError::Decode(format!("{e}: {data}")))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect();

    Ok((!text.is_empty()).then_some(text))
}

fn api_error(status: StatusCode, body: String) -> ChatError {
    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .map(|wrapper| {
            let msg = wrapper.error.message.unwrap_or_else(|| body.clone());
            match wrapper.error.status {
                Some(status_text) if !status_text.is_empty() => format!("{status_text}: {msg}"),
                _ => msg,
            }
        })
        .unwrap_or_else(|_| body.clone());

    ChatError::Api {
        status: status.as_u16(),
        message,
    }
}
