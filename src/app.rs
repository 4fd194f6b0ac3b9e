use std::time::Instant;

use flower_core::agent::PendingTurn;
use flower_core::ai::{self, gemini, TurnEvent};
use flower_core::hub::HubSections;
use flower_core::wizard::FieldRef;
use flower_core::{AgentAction, AgentPanel, Asset, AssetHub, Catalog, Config, Highlight, Selection, Wizard};
use ratatui::widgets::ListState;

use crate::tui::ChatTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Hub,
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: FocusPane,
    pub input_mode: InputMode,
    pub config: Config,
    /// Environment lookup used when connecting a chat backend
    pub key_lookup: fn(&str) -> Option<String>,
    /// One-line notice shown in the header until the next key
    pub status: Option<String>,

    // Hub state
    pub catalog: Catalog,
    pub hub: AssetHub,
    pub hub_cursor: usize,
    pub hub_list: ListState, // render offset only
    pub selection: Selection,
    pub highlight: Option<Highlight>,

    // Agent panel state
    pub agent: AgentPanel,
    pub agent_cursor: usize, // cursor position in agent.input
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of transcript area for scroll calculations
    pub chat_width: u16,  // Width of transcript area for wrap calculations

    // Wizard state
    pub wizard: Option<Wizard>,
    /// Bumped on every open so replies for an earlier wizard are dropped
    pub wizard_epoch: u64,
    pub wizard_field: usize,
    pub wizard_edit: Option<String>,
    pub wizard_scroll: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(config: Config) -> Self {
        Self::with_catalog(config, Catalog::builtin())
    }

    pub fn with_catalog(config: Config, catalog: Catalog) -> Self {
        let agent = AgentPanel::new(&catalog);
        Self {
            should_quit: false,
            focus: FocusPane::Hub,
            input_mode: InputMode::Normal,
            config,
            key_lookup: gemini::env_var,
            status: None,

            catalog,
            hub: AssetHub::new(),
            hub_cursor: 0,
            hub_list: ListState::default(),
            selection: Selection::new(),
            highlight: None,

            agent,
            agent_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            wizard: None,
            wizard_epoch: 0,
            wizard_field: 0,
            wizard_edit: None,
            wizard_scroll: 0,

            animation_frame: 0,
        }
    }

    // Hub helpers
    pub fn sections(&self) -> HubSections<'_> {
        self.hub.sections(&self.catalog)
    }

    pub fn cursor_asset(&self) -> Option<&Asset> {
        self.sections().get(self.hub_cursor)
    }

    pub fn hub_down(&mut self) {
        let len = self.sections().len();
        if len > 0 {
            self.hub_cursor = (self.hub_cursor + 1).min(len - 1);
        }
    }

    pub fn hub_up(&mut self) {
        self.hub_cursor = self.hub_cursor.saturating_sub(1);
    }

    pub fn hub_first(&mut self) {
        self.hub_cursor = 0;
    }

    pub fn hub_last(&mut self) {
        self.hub_cursor = self.sections().len().saturating_sub(1);
    }

    /// Keep the cursor on a visible card after the search changes
    pub fn search_changed(&mut self) {
        let len = self.sections().len();
        self.hub_cursor = self.hub_cursor.min(len.saturating_sub(1));
    }

    pub fn toggle_cursor_asset(&mut self) {
        let Some(asset) = self.cursor_asset().cloned() else {
            return;
        };
        let (asset, selected) = self
            .hub
            .toggle_request(&asset, self.selection.contains(&asset.id));
        self.selection.toggle(asset, selected);
        tracing::debug!(asset = %asset.name, selected, "selection toggled");
    }

    pub fn is_highlighted(&self, asset_id: &str, now: Instant) -> bool {
        self.highlight
            .as_ref()
            .is_some_and(|h| h.asset_id == asset_id && h.is_active(now))
    }

    pub fn apply_action(&mut self, action: AgentAction, now: Instant) {
        match action {
            AgentAction::HighlightAsset { asset_name } => {
                match Highlight::resolve(&self.catalog, &asset_name, now) {
                    Some(highlight) => {
                        let pos = self.sections().iter().position(|a| a.id == highlight.asset_id);
                        if let Some(pos) = pos {
                            self.hub_cursor = pos;
                        }
                        self.highlight = Some(highlight);
                    }
                    None => tracing::info!(asset = %asset_name, "highlight for unknown asset ignored"),
                }
            }
        }
    }

    // Agent panel
    /// Accept the typed message; the caller runs the returned turn
    pub fn send_agent_message(&mut self) -> Option<PendingTurn> {
        let (config, lookup) = (&self.config, self.key_lookup);
        let turn = self.agent.begin_send(|| ai::connect_with(config, lookup));
        self.agent_cursor = self.agent.input.chars().count();
        self.scroll_chat_to_bottom();
        turn
    }

    /// Route one item of a running turn to the panel that started it
    pub fn apply_turn_event(&mut self, target: ChatTarget, id: u64, event: TurnEvent) {
        match target {
            ChatTarget::Agent => {
                match event {
                    TurnEvent::Chunk(text) => self.agent.apply_chunk(id, &text),
                    TurnEvent::Done => {
                        if let Some(action) = self.agent.finish(id) {
                            self.apply_action(action, Instant::now());
                        }
                    }
                    TurnEvent::Failed(_) => self.agent.fail(id),
                }
                self.scroll_chat_to_bottom();
            }
            ChatTarget::Wizard(epoch) => {
                if epoch != self.wizard_epoch {
                    return;
                }
                let Some(wizard) = self.wizard.as_mut() else {
                    return;
                };
                match event {
                    TurnEvent::Chunk(text) => wizard.apply_chunk(id, &text),
                    TurnEvent::Done => wizard.finish(id),
                    TurnEvent::Failed(_) => wizard.fail(id),
                }
            }
        }
    }

    /// Tick animation frame and expire the highlight (called by Tick event)
    pub fn tick(&mut self, now: Instant) {
        let generating = self.agent.is_generating()
            || self.wizard.as_ref().is_some_and(|w| w.is_generating());
        if generating {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if self.highlight.as_ref().is_some_and(|h| !h.is_active(now)) {
            self.highlight = None;
        }
    }

    /// Scroll transcript to bottom so the newest reply is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual transcript width for wrap calculation, default to 40 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            40
        };

        let mut total_lines: u16 = 0;
        for msg in self.agent.messages() {
            total_lines = total_lines.saturating_add(1); // Sender line
            for line in msg.text.lines() {
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add((char_count / wrap_width + 1) as u16);
            }
            if msg.is_generating {
                total_lines = total_lines.saturating_add(1); // "Thinking..." indicator
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn chat_scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn chat_scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    // Wizard
    /// Open the wizard over the current selection; needs at least one asset
    pub fn open_wizard(&mut self) -> bool {
        if self.selection.is_empty() {
            self.status = Some("Select at least one asset to create a workflow".to_string());
            return false;
        }
        self.wizard = Some(Wizard::open(&self.selection));
        self.wizard_epoch += 1;
        self.wizard_field = 0;
        self.wizard_edit = None;
        self.wizard_scroll = 0;
        self.input_mode = InputMode::Normal;
        true
    }

    /// Close the wizard, discarding its form and the selection
    pub fn close_wizard(&mut self) {
        self.wizard = None;
        self.wizard_edit = None;
        self.selection.clear();
        self.input_mode = InputMode::Normal;
    }

    pub fn current_wizard_field(&self) -> Option<FieldRef> {
        self.wizard
            .as_ref()
            .and_then(|w| w.fields().into_iter().nth(self.wizard_field))
    }

    pub fn wizard_field_down(&mut self) {
        let len = self.wizard.as_ref().map_or(0, |w| w.fields().len());
        if len > 0 {
            self.wizard_field = (self.wizard_field + 1).min(len - 1);
        }
    }

    pub fn wizard_field_up(&mut self) {
        self.wizard_field = self.wizard_field.saturating_sub(1);
    }

    fn clamp_wizard_field(&mut self) {
        let len = self.wizard.as_ref().map_or(0, |w| w.fields().len());
        self.wizard_field = self.wizard_field.min(len.saturating_sub(1));
    }

    pub fn wizard_next(&mut self) {
        if let Some(wizard) = self.wizard.as_mut() {
            wizard.next();
        }
        self.wizard_field = 0;
        self.wizard_scroll = 0;
    }

    pub fn wizard_back(&mut self) {
        if let Some(wizard) = self.wizard.as_mut() {
            wizard.back();
        }
        self.wizard_field = 0;
        self.wizard_scroll = 0;
    }

    /// Enter on a field: choices cycle, text fields start editing
    pub fn activate_wizard_field(&mut self) {
        let Some(field) = self.current_wizard_field() else {
            return;
        };
        let Some(wizard) = self.wizard.as_mut() else {
            return;
        };
        if field.is_choice() {
            wizard.cycle(&field);
        } else {
            self.wizard_edit = Some(wizard.value(&field).unwrap_or_default());
            self.input_mode = InputMode::Editing;
        }
    }

    pub fn commit_wizard_edit(&mut self) {
        if let (Some(field), Some(value)) = (self.current_wizard_field(), self.wizard_edit.take()) {
            if let Some(wizard) = self.wizard.as_mut() {
                wizard.set_value(&field, &value);
            }
        }
        self.input_mode = InputMode::Normal;
    }

    pub fn cancel_wizard_edit(&mut self) {
        self.wizard_edit = None;
        self.input_mode = InputMode::Normal;
    }

    pub fn add_wizard_row(&mut self) {
        let Some(wizard) = self.wizard.as_mut() else {
            return;
        };
        if wizard.add_row().is_some() {
            // Land on the first field of the new row
            let fields = wizard.fields();
            let row_id = fields.last().and_then(|f| f.row_id().map(str::to_string));
            self.wizard_field = fields
                .iter()
                .position(|f| f.row_id() == row_id.as_deref())
                .unwrap_or(0);
        }
    }

    pub fn remove_wizard_row(&mut self) {
        if let (Some(field), Some(wizard)) = (self.current_wizard_field(), self.wizard.as_mut()) {
            wizard.remove_row(&field);
        }
        self.clamp_wizard_field();
    }

    pub fn start_generation(&mut self) -> Option<(ChatTarget, PendingTurn)> {
        let (config, lookup) = (&self.config, self.key_lookup);
        let wizard = self.wizard.as_mut()?;
        let turn = wizard.begin_generation(|| ai::connect_with(config, lookup))?;
        self.wizard_scroll = 0;
        Some((ChatTarget::Wizard(self.wizard_epoch), turn))
    }

    pub fn is_generating(&self) -> bool {
        self.agent.is_generating() || self.wizard.as_ref().is_some_and(|w| w.is_generating())
    }
}
