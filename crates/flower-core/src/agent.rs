//! Agent panel: the chat transcript beside the hub
//!
//! Per send the panel moves `idle -> sending -> streaming -> settled`.
//! The panel never talks to the network itself; it hands out a
//! [`PendingTurn`] and is fed the streamed chunks back by whoever runs it.

use std::sync::Arc;

use crate::action::{parse_reply, AgentAction};
use crate::ai::{ChatBackend, ChatSession, LazySession, StartError};
use crate::catalog::Catalog;
use crate::error::ChatError;
use crate::state::ChatMessage;

pub const GREETING: &str = "Hello! How can I help you? Ask me to find a stage or workflow.";
pub const APOLOGY: &str = "Sorry, I encountered an error.";

/// System prompt for the hub assistant, listing every asset it may point at
pub fn system_instruction(catalog: &Catalog) -> String {
    format!(
        r#"You are an expert workflow assistant for the "Flower Asset Hub". The user can see a list of assets.
Available assets: {assets}.

When a user asks you to find or show them a specific asset from the list, you MUST respond with a single, valid JSON object and nothing else. This object must have a 'response' key with your text for the user, and an 'action' key to highlight the asset in the UI.

Example User Query: "show me the create buganizer issue stage"
Example JSON Response:
{{
  "response": "Of course. The 'CREATE_BUGANIZER_ISSUE' stage is used for creating new issues. I've highlighted it for you on the left.",
  "action": {{ "type": "highlight_asset", "assetName": "CREATE_BUGANIZER_ISSUE" }}
}}

For any other conversational questions, just respond with plain text."#,
        assets = catalog.name_list()
    )
}

/// A send that has been accepted and must now be run against the session
#[derive(Clone)]
pub struct PendingTurn {
    pub message_id: u64,
    pub prompt: String,
    pub session: ChatSession,
}

pub struct AgentPanel {
    messages: Vec<ChatMessage>,
    pub input: String,
    system_instruction: String,
    session: LazySession,
    next_id: u64,
}

impl AgentPanel {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            messages: vec![ChatMessage::agent(1, GREETING)],
            input: String::new(),
            system_instruction: system_instruction(catalog),
            session: LazySession::default(),
            next_id: 2,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_generating(&self) -> bool {
        self.messages.iter().any(|m| m.is_generating)
    }

    /// True once the backend failed to start; the panel stays read-only
    pub fn is_unavailable(&self) -> bool {
        self.session.is_unavailable()
    }

    /// Whether a send right now would be accepted
    pub fn can_send(&self) -> bool {
        !self.input.trim().is_empty() && !self.is_generating() && !self.is_unavailable()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Accept the current input for sending
    ///
    /// Returns `None` (and changes nothing) for blank input or while a reply
    /// is still generating. The backend is connected on first use; if that
    /// fails the reason is posted once to the transcript.
    pub fn begin_send<F>(&mut self, connect: F) -> Option<PendingTurn>
    where
        F: FnOnce() -> Result<Arc<dyn ChatBackend>, ChatError>,
    {
        if !self.can_send() {
            return None;
        }

        let session = match self.session.get_or_start(&self.system_instruction, connect) {
            Ok(session) => session,
            Err(StartError::Fresh(err)) => {
                let id = self.next_id();
                self.messages
                    .push(ChatMessage::agent(id, format!("Chat is unavailable: {err}")));
                return None;
            }
            Err(StartError::AlreadyFailed) => return None,
        };

        let prompt = std::mem::take(&mut self.input);
        let user_id = self.next_id();
        self.messages.push(ChatMessage::user(user_id, prompt.clone()));

        let message_id = self.next_id();
        self.messages.push(ChatMessage::generating(message_id));

        tracing::info!(message_id, "agent turn started");
        Some(PendingTurn {
            message_id,
            prompt,
            session,
        })
    }

    fn generating_message(&mut self, id: u64) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id && m.is_generating)
    }

    /// Append a streamed fragment; fragments for unknown or settled
    /// messages are dropped
    pub fn apply_chunk(&mut self, id: u64, chunk: &str) {
        if let Some(message) = self.generating_message(id) {
            message.text.push_str(chunk);
        }
    }

    /// Settle a completed reply and return the action it asks for, if any
    pub fn finish(&mut self, id: u64) -> Option<AgentAction> {
        let message = self.generating_message(id)?;
        let (display, action) = parse_reply(&message.text).into_parts();
        message.text = display;
        message.is_generating = false;
        tracing::info!(message_id = id, action = ?action, "agent turn settled");
        action
    }

    /// Settle a failed reply with the fixed apology
    pub fn fail(&mut self, id: u64) {
        if let Some(message) = self.generating_message(id) {
            message.text = APOLOGY.to_string();
            message.is_generating = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::session::testing::{Script, ScriptedBackend};
    use crate::ai::{run_turn, TurnEvent};
    use crate::state::Sender;

    fn scripted(script: Script) -> (Arc<ScriptedBackend>, impl Fn() -> Result<Arc<dyn ChatBackend>, ChatError>) {
        let backend = ScriptedBackend::new(script);
        let handle = backend.clone();
        (backend, move || Ok(handle.clone() as Arc<dyn ChatBackend>))
    }

    async fn collect(turn: &PendingTurn) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        run_turn(&turn.session, &turn.prompt, |e| events.push(e)).await;
        events
    }

    #[test]
    fn test_starts_with_greeting() {
        let panel = AgentPanel::new(&Catalog::builtin());
        assert_eq!(panel.messages().len(), 1);
        assert_eq!(panel.messages()[0].text, GREETING);
        assert_eq!(panel.messages()[0].sender, Sender::Agent);
    }

    #[test]
    fn test_system_instruction_lists_assets() {
        let instruction = system_instruction(&Catalog::builtin());
        assert!(instruction.contains("'CREATE_BUGANIZER_ISSUE'"));
        assert!(instruction.contains("\"type\": \"highlight_asset\""));
    }

    #[tokio::test]
    async fn test_streamed_chunks_accumulate() {
        let (_, connect) = scripted(Script::Chunks(vec!["Hel", "lo"]));
        let mut panel = AgentPanel::new(&Catalog::builtin());
        panel.input = "hi".to_string();

        let turn = panel.begin_send(&connect).unwrap();
        assert!(panel.input.is_empty());
        assert_eq!(panel.messages()[1].text, "hi");
        assert!(panel.is_generating());

        for event in collect(&turn).await {
            match event {
                TurnEvent::Chunk(chunk) => {
                    panel.apply_chunk(turn.message_id, &chunk);
                    assert!(panel.is_generating());
                }
                TurnEvent::Done => {
                    panel.finish(turn.message_id);
                }
                TurnEvent::Failed(err) => panic!("unexpected failure: {err}"),
            }
        }

        let reply = panel.messages().last().unwrap();
        assert_eq!(reply.text, "Hello");
        assert!(!reply.is_generating);
        assert!(!panel.is_generating());
    }

    #[tokio::test]
    async fn test_highlight_reply_fires_action() {
        let (_, connect) = scripted(Script::Chunks(vec![
            r#"{"response":"found it","#,
            r#""action":{"type":"highlight_asset","assetName":"CODEMAKER"}}"#,
        ]));
        let mut panel = AgentPanel::new(&Catalog::builtin());
        panel.input = "where is codemaker".to_string();
        let turn = panel.begin_send(&connect).unwrap();

        let mut action = None;
        for event in collect(&turn).await {
            match event {
                TurnEvent::Chunk(chunk) => panel.apply_chunk(turn.message_id, &chunk),
                TurnEvent::Done => action = panel.finish(turn.message_id),
                TurnEvent::Failed(_) => panel.fail(turn.message_id),
            }
        }

        assert_eq!(panel.messages().last().unwrap().text, "found it");
        assert_eq!(
            action,
            Some(AgentAction::HighlightAsset {
                asset_name: "CODEMAKER".to_string()
            })
        );
    }

    #[test]
    fn test_send_rejected_while_generating() {
        let (backend, connect) = scripted(Script::Chunks(vec!["x"]));
        let mut panel = AgentPanel::new(&Catalog::builtin());
        panel.input = "first".to_string();
        assert!(panel.begin_send(&connect).is_some());

        panel.input = "second".to_string();
        let before = panel.messages().len();
        assert!(panel.begin_send(&connect).is_none());
        assert_eq!(panel.messages().len(), before);
        assert_eq!(panel.input, "second");
        // Nothing ran the turn, and the rejected send issued no call either
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_blank_input_is_a_no_op() {
        let (_, connect) = scripted(Script::Chunks(vec![]));
        let mut panel = AgentPanel::new(&Catalog::builtin());
        panel.input = "   \n".to_string();
        assert!(panel.begin_send(&connect).is_none());
        assert_eq!(panel.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_settles_with_apology() {
        let (_, connect) = scripted(Script::FailAfter(vec!["partial"]));
        let mut panel = AgentPanel::new(&Catalog::builtin());
        panel.input = "hi".to_string();
        let turn = panel.begin_send(&connect).unwrap();

        for event in collect(&turn).await {
            match event {
                TurnEvent::Chunk(chunk) => panel.apply_chunk(turn.message_id, &chunk),
                TurnEvent::Done => {
                    panel.finish(turn.message_id);
                }
                TurnEvent::Failed(_) => panel.fail(turn.message_id),
            }
        }

        let reply = panel.messages().last().unwrap();
        assert_eq!(reply.text, APOLOGY);
        assert!(!reply.is_generating);

        // The session survives a failed turn
        panel.input = "again".to_string();
        assert!(panel.begin_send(&connect).is_some());
    }

    #[test]
    fn test_missing_credential_reported_once() {
        let mut panel = AgentPanel::new(&Catalog::builtin());
        let missing = || -> Result<Arc<dyn ChatBackend>, ChatError> {
            Err(ChatError::MissingCredential("GEMINI_API_KEY".to_string()))
        };

        panel.input = "hi".to_string();
        assert!(panel.begin_send(missing).is_none());
        assert_eq!(panel.messages().len(), 2);
        assert!(panel.messages()[1].text.contains("GEMINI_API_KEY"));
        assert!(panel.is_unavailable());

        assert!(panel.begin_send(missing).is_none());
        assert_eq!(panel.messages().len(), 2);
    }

    #[test]
    fn test_stale_chunks_are_ignored() {
        let mut panel = AgentPanel::new(&Catalog::builtin());
        panel.apply_chunk(99, "ghost");
        assert!(panel.finish(99).is_none());
        panel.fail(1);
        assert_eq!(panel.messages()[0].text, GREETING);
    }
}
