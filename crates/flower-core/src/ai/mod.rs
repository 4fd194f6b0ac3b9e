pub mod gemini;
pub mod ollama;
pub mod session;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use session::{run_turn, ChatSession, LazySession, StartError, TurnEvent};

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use crate::config::Config;
use crate::error::ChatError;
use crate::provider::Provider;

/// Incremental reply text, in generation order
pub type ChunkStream = BoxStream<'static, Result<String, ChatError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

/// One prior turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A hosted (or local) model that can stream a reply to a conversation
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `turns` ends with the user message being answered
    async fn stream_chat(
        &self,
        system_instruction: &str,
        turns: &[Turn],
    ) -> Result<ChunkStream, ChatError>;
}

/// Build the backend for the configured provider
pub fn connect(config: &Config) -> Result<Arc<dyn ChatBackend>, ChatError> {
    connect_with(config, gemini::env_var)
}

/// Like `connect`, reading environment variables through `env_lookup`
pub fn connect_with(
    config: &Config,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn ChatBackend>, ChatError> {
    let model = config.default_model.clone();
    match config.provider() {
        Provider::Gemini => {
            let key = config
                .gemini_api_key_with(env_lookup)
                .ok_or_else(|| ChatError::MissingCredential("GEMINI_API_KEY".to_string()))?;
            let mut client = GeminiClient::new(&key);
            if let Some(model) = model {
                client = client.with_model(&model);
            }
            Ok(Arc::new(client))
        }
        Provider::Ollama => {
            let mut client = OllamaClient::new(config.ollama_url());
            if let Some(model) = model {
                client = client.with_model(&model);
            }
            Ok(Arc::new(client))
        }
    }
}

/// Split a byte stream into text lines without the trailing newline
///
/// A final line without a newline is still yielded. After a transport error
/// the stream ends.
pub(crate) fn split_lines<S, B, E>(source: S) -> impl Stream<Item = Result<String, ChatError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ChatError> + Send,
{
    stream::unfold(
        (Box::pin(source), Vec::<u8>::new(), false),
        |(mut source, mut buf, mut done)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line)
                        .trim_end_matches(|c: char| c == '\n' || c == '\r')
                        .to_string();
                    return Some((Ok(text), (source, buf, done)));
                }
                if done {
                    if buf.is_empty() {
                        return None;
                    }
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches('\r')
                        .to_string();
                    buf.clear();
                    return Some((Ok(text), (source, buf, done)));
                }
                match source.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                    Some(Err(err)) => {
                        buf.clear();
                        return Some((Err(err.into()), (source, buf, true)));
                    }
                    None => done = true,
                }
            }
        },
    )
}
