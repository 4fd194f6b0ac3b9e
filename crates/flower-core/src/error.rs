use thiserror::Error;

/// Failures at the chat completion boundary
#[derive(Debug, Error)]
pub enum ChatError {
    /// No API key in the environment or config; fatal for the session
    #[error("{0} environment variable not set")]
    MissingCredential(String),

    #[error("chat request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("chat API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not decode chat stream: {0}")]
    Decode(String),
}

// Request URLs can carry credentials, so they never reach error text
impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.without_url())
    }
}

impl ChatError {
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, ChatError::MissingCredential(_))
    }
}
