pub mod action;
pub mod agent;
pub mod ai;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hub;
pub mod provider;
pub mod selection;
pub mod state;
pub mod wizard;

// Re-export main types for convenience
pub use action::{parse_reply, AgentAction, ParsedReply};
pub use agent::{AgentPanel, PendingTurn};
pub use ai::{ChatBackend, ChatSession, ChunkStream, GeminiClient, OllamaClient};
pub use catalog::{Asset, AssetKind, Catalog, TagColor};
pub use config::Config;
pub use error::ChatError;
pub use hub::{AssetHub, HubSections, Highlight};
pub use provider::Provider;
pub use selection::Selection;
pub use state::{ChatMessage, Sender};
pub use wizard::{Wizard, WizardFormData, WizardStep};
