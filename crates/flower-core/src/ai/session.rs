//! One conversation with a chat backend
//!
//! Each panel (agent chat, wizard code generation) owns its own session.
//! The REST backends are stateless, so the session keeps the turn history
//! and replays it on every send.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::sync::Mutex;

use super::{ChatBackend, ChunkStream, Turn};
use crate::error::ChatError;

#[derive(Clone)]
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    system_instruction: String,
    history: Arc<Mutex<Vec<Turn>>>,
}

struct Recording {
    inner: ChunkStream,
    reply: String,
    user_turn: Turn,
    history: Arc<Mutex<Vec<Turn>>>,
}

impl ChatSession {
    pub fn start(backend: Arc<dyn ChatBackend>, system_instruction: impl Into<String>) -> Self {
        Self {
            backend,
            system_instruction: system_instruction.into(),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.history.lock().await.clone()
    }

    /// Send a user turn and stream the reply
    ///
    /// The exchange is added to the history only once the stream has been
    /// consumed to the end without error; a failed turn leaves no trace.
    pub async fn send_message_stream(&self, message: &str) -> Result<ChunkStream, ChatError> {
        let user_turn = Turn::user(message);
        let mut turns = self.history.lock().await.clone();
        turns.push(user_turn.clone());

        let inner = self
            .backend
            .stream_chat(&self.system_instruction, &turns)
            .await?;

        let recording = Recording {
            inner,
            reply: String::new(),
            user_turn,
            history: Arc::clone(&self.history),
        };

        let chunks = stream::unfold(Some(recording), |state| async move {
            let mut rec = state?;
            match rec.inner.next().await {
                Some(Ok(chunk)) => {
                    rec.reply.push_str(&chunk);
                    Some((Ok(chunk), Some(rec)))
                }
                Some(Err(err)) => Some((Err(err), None)),
                None => {
                    let Recording {
                        reply,
                        user_turn,
                        history,
                        ..
                    } = rec;
                    let mut history = history.lock().await;
                    history.push(user_turn);
                    history.push(Turn::model(reply));
                    None
                }
            }
        });
        Ok(chunks.boxed())
    }
}

/// What a running turn reports back, one event per stream item
#[derive(Debug)]
pub enum TurnEvent {
    Chunk(String),
    Done,
    Failed(ChatError),
}

/// Send `message` and forward the reply to `sink` as it streams in
///
/// Always ends with exactly one `Done` or `Failed`.
pub async fn run_turn<F>(session: &ChatSession, message: &str, mut sink: F)
where
    F: FnMut(TurnEvent),
{
    let mut chunks = match session.send_message_stream(message).await {
        Ok(chunks) => chunks,
        Err(err) => {
            tracing::warn!(error = %err, "chat request failed");
            sink(TurnEvent::Failed(err));
            return;
        }
    };

    while let Some(item) = chunks.next().await {
        match item {
            Ok(chunk) => sink(TurnEvent::Chunk(chunk)),
            Err(err) => {
                tracing::warn!(error = %err, "chat stream failed");
                sink(TurnEvent::Failed(err));
                return;
            }
        }
    }
    sink(TurnEvent::Done);
}

/// Why a session could not be handed out
#[derive(Debug)]
pub enum StartError {
    /// First failure; the caller should surface it
    Fresh(ChatError),
    /// Already reported once; stay quiet
    AlreadyFailed,
}

/// A session that is only created on first use
///
/// A missing credential is fatal for the owning panel: it is reported once
/// and every later attempt is a quiet no-op.
#[derive(Clone, Default)]
pub enum LazySession {
    #[default]
    NotStarted,
    Ready(ChatSession),
    Unavailable,
}

impl LazySession {
    pub fn get_or_start<F>(&mut self, system_instruction: &str, connect: F) -> Result<ChatSession, StartError>
    where
        F: FnOnce() -> Result<Arc<dyn ChatBackend>, ChatError>,
    {
        match self {
            LazySession::Ready(session) => Ok(session.clone()),
            LazySession::Unavailable => Err(StartError::AlreadyFailed),
            LazySession::NotStarted => match connect() {
                Ok(backend) => {
                    let session = ChatSession::start(backend, system_instruction);
                    *self = LazySession::Ready(session.clone());
                    Ok(session)
                }
                Err(err) => {
                    tracing::error!(error = %err, "chat backend unavailable");
                    *self = LazySession::Unavailable;
                    Err(StartError::Fresh(err))
                }
            },
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, LazySession::Unavailable)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend for exercising sessions without a network

    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    pub enum Script {
        Chunks(Vec<&'static str>),
        FailAfter(Vec<&'static str>),
        Refuse,
    }

    pub struct ScriptedBackend {
        script: Script,
        pub calls: StdMutex<Vec<(String, Vec<Turn>)>>,
    }

    impl ScriptedBackend {
        pub fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: StdMutex::new(Vec::new()),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn stream_chat(
            &self,
            system_instruction: &str,
            turns: &[Turn],
        ) -> Result<ChunkStream, ChatError> {
            self.calls
                .lock()
                .unwrap()
                .push((system_instruction.to_string(), turns.to_vec()));

            let items: Vec<Result<String, ChatError>> = match &self.script {
                Script::Chunks(chunks) => chunks.iter().map(|c| Ok(c.to_string())).collect(),
                Script::FailAfter(chunks) => chunks
                    .iter()
                    .map(|c| Ok(c.to_string()))
                    .chain(std::iter::once(Err(ChatError::Decode("stream cut".to_string()))))
                    .collect(),
                Script::Refuse => {
                    return Err(ChatError::Api {
                        status: 503,
                        message: "unavailable".to_string(),
                    })
                }
            };
            Ok(stream::iter(items).boxed())
        }
    }
}
