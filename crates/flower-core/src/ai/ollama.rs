use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

use super::{split_lines, ChatBackend, ChunkStream, Role, Turn};
use crate::error::ChatError;

pub const DEFAULT_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "gemma3:latest";

#[derive(Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatChunk {
    message: Option<OllamaChunkMessage>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }

    fn build_request(&self, system_instruction: &str, turns: &[Turn]) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if !system_instruction.is_empty() {
            messages.push(OllamaMessage {
                role: "system",
                content: system_instruction.to_string(),
            });
        }
        messages.extend(turns.iter().map(|turn| OllamaMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Model => "assistant",
            },
            content: turn.text.clone(),
        }));

        OllamaChatRequest {
            model: self.model.clone(),
            messages,
            stream: true,
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn stream_chat(
        &self,
        system_instruction: &str,
        turns: &[Turn],
    ) -> Result<ChunkStream, ChatError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = self.build_request(system_instruction, turns);

        tracing::debug!(model = %self.model, turns = turns.len(), "ollama stream request");
        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: format!("{body}. Make sure Ollama is running with: ollama serve"),
            });
        }

        let chunks = split_lines(response.bytes_stream())
            .filter_map(|line| async move {
                match line {
                    Ok(line) => decode_ndjson_line(&line).transpose(),
                    Err(err) => Some(Err(err)),
                }
            })
            .boxed();
        Ok(chunks)
    }
}

fn decode_ndjson_line(line: &str) -> Result<Option<String>, ChatError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: OllamaChatChunk =
        serde_json::from_str(line).map_err(|e| ChatError::Decode(format!("{e}: {line}")))?;

    if let Some(error) = chunk.error {
        return Err(ChatError::Api {
            status: 500,
            message: error,
        });
    }

    // The closing chunk carries `done: true` and empty content
    let text = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}
