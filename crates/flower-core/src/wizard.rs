//! Workflow Wizard: a linear multi-step form over the current selection
//!
//! The wizard owns a [`WizardFormData`] seeded from the selection when it
//! opens. Nothing is validated; every step can be left with empty fields.
//! The last step sends the whole form to the model and streams back the
//! generated code, shown verbatim.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{PendingTurn, APOLOGY};
use crate::ai::{ChatBackend, LazySession, StartError};
use crate::error::ChatError;
use crate::selection::Selection;

pub const CODEGEN_SYSTEM_INSTRUCTION: &str = "You are an expert workflow engineer for the Flower platform. \
You will receive a JSON description of a workflow: its configuration, the stages it uses, \
its public inputs and outputs, and the connections between them. \
Generate the complete workflow definition code for it. \
Respond with a single fenced code block and nothing else: no explanation before or after it.";

/// Mock field names offered for connection endpoints
pub const FIELD_CHOICES: &[&str] = &[
    "input",
    "output",
    "issue_id",
    "cl_number",
    "status",
    "summary",
    "owner",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Configuration,
    Stages,
    PublicInputs,
    PublicOutputs,
    Connections,
    Review,
    Generate,
}

impl WizardStep {
    pub const ALL: [WizardStep; 7] = [
        WizardStep::Configuration,
        WizardStep::Stages,
        WizardStep::PublicInputs,
        WizardStep::PublicOutputs,
        WizardStep::Connections,
        WizardStep::Review,
        WizardStep::Generate,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::Configuration => "Configuration",
            WizardStep::Stages => "Stages",
            WizardStep::PublicInputs => "Public Inputs",
            WizardStep::PublicOutputs => "Public Outputs",
            WizardStep::Connections => "Connections",
            WizardStep::Review => "Review",
            WizardStep::Generate => "Generate",
        }
    }

    /// Zero-based position in [`WizardStep::ALL`]
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    pub fn is_first(&self) -> bool {
        self.index() == 0
    }

    pub fn is_last(&self) -> bool {
        self.index() == Self::ALL.len() - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fleet {
    #[default]
    NonProd,
    Prod,
    Testing,
}

impl Fleet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fleet::NonProd => "NON_PROD",
            Fleet::Prod => "PROD",
            Fleet::Testing => "TESTING",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NON_PROD" => Some(Fleet::NonProd),
            "PROD" => Some(Fleet::Prod),
            "TESTING" => Some(Fleet::Testing),
            _ => None,
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Fleet::NonProd => Fleet::Prod,
            Fleet::Prod => Fleet::Testing,
            Fleet::Testing => Fleet::NonProd,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    pub workflow_type: String,
    pub fleet: Fleet,
    pub directory: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardStage {
    pub id: String,
    /// Source asset name
    pub name: String,
    /// Alias for this workflow instance
    pub stage_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IoType {
    #[default]
    String,
    Int,
    Bool,
}

impl IoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoType::String => "String",
            IoType::Int => "Int",
            IoType::Bool => "Bool",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            IoType::String => IoType::Int,
            IoType::Int => IoType::Bool,
            IoType::Bool => IoType::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub io_type: IoType,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceType {
    #[default]
    PublicInput,
    StageOutputField,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::PublicInput => "PublicInput",
            SourceType::StageOutputField => "StageOutputField",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            SourceType::PublicInput => SourceType::StageOutputField,
            SourceType::StageOutputField => SourceType::PublicInput,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DestinationType {
    #[default]
    StageInputField,
    WorkflowInput,
    PublicOutput,
}

impl DestinationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationType::StageInputField => "StageInputField",
            DestinationType::WorkflowInput => "WorkflowInput",
            DestinationType::PublicOutput => "PublicOutput",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            DestinationType::StageInputField => DestinationType::WorkflowInput,
            DestinationType::WorkflowInput => DestinationType::PublicOutput,
            DestinationType::PublicOutput => DestinationType::StageInputField,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub source_type: SourceType,
    pub source: String,
    pub source_field: String,
    pub destination_type: DestinationType,
    pub destination: String,
    pub destination_field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardFormData {
    pub workflow_config: WorkflowConfig,
    pub stages: Vec<WizardStage>,
    pub public_inputs: Vec<PublicIo>,
    pub public_outputs: Vec<PublicIo>,
    pub connections: Vec<Connection>,
}

fn new_row_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    WorkflowType,
    Fleet,
    Directory,
    Description,
}

impl ConfigField {
    pub const ALL: [ConfigField; 4] = [
        ConfigField::WorkflowType,
        ConfigField::Fleet,
        ConfigField::Directory,
        ConfigField::Description,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConfigField::WorkflowType => "Workflow Type Name",
            ConfigField::Fleet => "Fleet",
            ConfigField::Directory => "Directory",
            ConfigField::Description => "Description",
        }
    }
}

/// Inputs or outputs; both are lists of [`PublicIo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoSide {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoField {
    Name,
    Type,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionField {
    SourceType,
    Source,
    SourceField,
    DestinationType,
    Destination,
    DestinationField,
}

impl ConnectionField {
    pub const ALL: [ConnectionField; 6] = [
        ConnectionField::SourceType,
        ConnectionField::Source,
        ConnectionField::SourceField,
        ConnectionField::DestinationType,
        ConnectionField::Destination,
        ConnectionField::DestinationField,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionField::SourceType => "source type",
            ConnectionField::Source => "source",
            ConnectionField::SourceField => "source field",
            ConnectionField::DestinationType => "destination type",
            ConnectionField::Destination => "destination",
            ConnectionField::DestinationField => "destination field",
        }
    }
}

/// Address of one editable value in the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Config(ConfigField),
    StageName { id: String },
    Io { side: IoSide, id: String, field: IoField },
    Connection { id: String, field: ConnectionField },
}

impl FieldRef {
    /// Choice fields are cycled through a fixed option set instead of typed
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            FieldRef::Config(ConfigField::Fleet)
                | FieldRef::Io {
                    field: IoField::Type,
                    ..
                }
                | FieldRef::Connection {
                    field: ConnectionField::SourceType
                        | ConnectionField::SourceField
                        | ConnectionField::DestinationType
                        | ConnectionField::DestinationField,
                    ..
                }
        )
    }

    /// Id of the row this field belongs to, if it is on a row
    pub fn row_id(&self) -> Option<&str> {
        match self {
            FieldRef::Config(_) => None,
            FieldRef::StageName { id } | FieldRef::Io { id, .. } | FieldRef::Connection { id, .. } => {
                Some(id.as_str())
            }
        }
    }
}

fn next_choice(current: &str) -> String {
    let next = FIELD_CHOICES
        .iter()
        .position(|c| *c == current)
        .map(|i| (i + 1) % FIELD_CHOICES.len())
        .unwrap_or(0);
    FIELD_CHOICES[next].to_string()
}

/// A piece of generated output, split on code fences for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Prose(String),
    Code { lang: Option<String>, body: String },
}

/// Naive fence splitting: text between ``` markers is code
///
/// An unterminated fence (mid-stream) runs to the end of the text.
pub fn split_code_blocks(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for (i, part) in text.split("```").enumerate() {
        if i % 2 == 0 {
            if !part.trim().is_empty() {
                segments.push(Segment::Prose(part.trim().to_string()));
            }
            continue;
        }
        let (first, rest) = part.split_once('\n').unwrap_or((part, ""));
        let tag = first.trim();
        let (lang, body) = if tag.is_empty() || tag.contains(char::is_whitespace) {
            (None, part.trim_start_matches('\n'))
        } else {
            (Some(tag.to_string()), rest)
        };
        segments.push(Segment::Code {
            lang,
            body: body.trim_end().to_string(),
        });
    }
    segments
}

pub struct Wizard {
    step: WizardStep,
    form: WizardFormData,
    output: String,
    generating: bool,
    generation: u64,
    session: LazySession,
}

impl Wizard {
    /// Start a fresh form from the current selection, one stage per asset
    pub fn open(selection: &Selection) -> Self {
        let stages = selection
            .assets()
            .iter()
            .map(|asset| WizardStage {
                id: new_row_id(),
                name: asset.name.clone(),
                stage_name: asset.name.clone(),
            })
            .collect();

        tracing::info!(stages = selection.len(), "wizard opened");
        Self {
            step: WizardStep::Configuration,
            form: WizardFormData {
                stages,
                ..WizardFormData::default()
            },
            output: String::new(),
            generating: false,
            generation: 0,
            session: LazySession::default(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn form(&self) -> &WizardFormData {
        &self.form
    }

    pub fn next(&mut self) {
        let i = (self.step.index() + 1).min(WizardStep::ALL.len() - 1);
        self.step = WizardStep::ALL[i];
    }

    pub fn back(&mut self) {
        let i = self.step.index().saturating_sub(1);
        self.step = WizardStep::ALL[i];
    }

    pub fn update_config(&mut self, field: ConfigField, value: &str) {
        let config = &mut self.form.workflow_config;
        match field {
            ConfigField::WorkflowType => config.workflow_type = value.to_string(),
            ConfigField::Directory => config.directory = value.to_string(),
            ConfigField::Description => config.description = value.to_string(),
            ConfigField::Fleet => {
                if let Some(fleet) = Fleet::from_str(value) {
                    config.fleet = fleet;
                }
            }
        }
    }

    pub fn set_fleet(&mut self, fleet: Fleet) {
        self.form.workflow_config.fleet = fleet;
    }

    pub fn cycle_fleet(&mut self) {
        let fleet = self.form.workflow_config.fleet.next();
        self.set_fleet(fleet);
    }

    pub fn add_stage(&mut self) -> String {
        let id = new_row_id();
        self.form.stages.push(WizardStage {
            id: id.clone(),
            name: String::new(),
            stage_name: String::new(),
        });
        id
    }

    pub fn remove_stage(&mut self, id: &str) {
        self.form.stages.retain(|s| s.id != id);
    }

    pub fn set_stage_name(&mut self, id: &str, value: &str) {
        if let Some(stage) = self.form.stages.iter_mut().find(|s| s.id == id) {
            stage.stage_name = value.to_string();
        }
    }

    fn io_list(&mut self, side: IoSide) -> &mut Vec<PublicIo> {
        match side {
            IoSide::Input => &mut self.form.public_inputs,
            IoSide::Output => &mut self.form.public_outputs,
        }
    }

    fn add_io(&mut self, side: IoSide) -> String {
        let id = new_row_id();
        self.io_list(side).push(PublicIo {
            id: id.clone(),
            name: String::new(),
            io_type: IoType::default(),
            description: String::new(),
        });
        id
    }

    pub fn add_input(&mut self) -> String {
        self.add_io(IoSide::Input)
    }

    pub fn remove_input(&mut self, id: &str) {
        self.form.public_inputs.retain(|io| io.id != id);
    }

    pub fn add_output(&mut self) -> String {
        self.add_io(IoSide::Output)
    }

    pub fn remove_output(&mut self, id: &str) {
        self.form.public_outputs.retain(|io| io.id != id);
    }

    pub fn add_connection(&mut self) -> String {
        let id = new_row_id();
        self.form.connections.push(Connection {
            id: id.clone(),
            source_type: SourceType::PublicInput,
            source: String::new(),
            source_field: String::new(),
            destination_type: DestinationType::StageInputField,
            destination: String::new(),
            destination_field: String::new(),
        });
        id
    }

    pub fn remove_connection(&mut self, id: &str) {
        self.form.connections.retain(|c| c.id != id);
    }

    /// Append an empty row to the list edited on the current step
    pub fn add_row(&mut self) -> Option<String> {
        match self.step {
            WizardStep::Stages => Some(self.add_stage()),
            WizardStep::PublicInputs => Some(self.add_input()),
            WizardStep::PublicOutputs => Some(self.add_output()),
            WizardStep::Connections => Some(self.add_connection()),
            _ => None,
        }
    }

    /// Remove the row `field` sits on
    pub fn remove_row(&mut self, field: &FieldRef) {
        match field {
            FieldRef::Config(_) => {}
            FieldRef::StageName { id } => self.remove_stage(id),
            FieldRef::Io {
                side: IoSide::Input,
                id,
                ..
            } => self.remove_input(id),
            FieldRef::Io {
                side: IoSide::Output,
                id,
                ..
            } => self.remove_output(id),
            FieldRef::Connection { id, .. } => self.remove_connection(id),
        }
    }

    /// Editable fields of the current step, row by row
    pub fn fields(&self) -> Vec<FieldRef> {
        let io_fields = |side: IoSide, list: &[PublicIo]| -> Vec<FieldRef> {
            list.iter()
                .flat_map(|io| {
                    [IoField::Name, IoField::Type, IoField::Description].map(|field| FieldRef::Io {
                        side,
                        id: io.id.clone(),
                        field,
                    })
                })
                .collect()
        };

        match self.step {
            WizardStep::Configuration => ConfigField::ALL.iter().copied().map(FieldRef::Config).collect(),
            WizardStep::Stages => self
                .form
                .stages
                .iter()
                .map(|s| FieldRef::StageName { id: s.id.clone() })
                .collect(),
            WizardStep::PublicInputs => io_fields(IoSide::Input, &self.form.public_inputs),
            WizardStep::PublicOutputs => io_fields(IoSide::Output, &self.form.public_outputs),
            WizardStep::Connections => self
                .form
                .connections
                .iter()
                .flat_map(|c| {
                    ConnectionField::ALL.map(|field| FieldRef::Connection {
                        id: c.id.clone(),
                        field,
                    })
                })
                .collect(),
            WizardStep::Review | WizardStep::Generate => Vec::new(),
        }
    }

    fn io(&self, side: IoSide, id: &str) -> Option<&PublicIo> {
        let list = match side {
            IoSide::Input => &self.form.public_inputs,
            IoSide::Output => &self.form.public_outputs,
        };
        list.iter().find(|io| io.id == id)
    }

    fn connection(&self, id: &str) -> Option<&Connection> {
        self.form.connections.iter().find(|c| c.id == id)
    }

    /// Current value of a field, or `None` when its row is gone
    pub fn value(&self, field: &FieldRef) -> Option<String> {
        let config = &self.form.workflow_config;
        match field {
            FieldRef::Config(ConfigField::WorkflowType) => Some(config.workflow_type.clone()),
            FieldRef::Config(ConfigField::Fleet) => Some(config.fleet.as_str().to_string()),
            FieldRef::Config(ConfigField::Directory) => Some(config.directory.clone()),
            FieldRef::Config(ConfigField::Description) => Some(config.description.clone()),
            FieldRef::StageName { id } => self
                .form
                .stages
                .iter()
                .find(|s| &s.id == id)
                .map(|s| s.stage_name.clone()),
            FieldRef::Io { side, id, field } => self.io(*side, id).map(|io| match field {
                IoField::Name => io.name.clone(),
                IoField::Type => io.io_type.as_str().to_string(),
                IoField::Description => io.description.clone(),
            }),
            FieldRef::Connection { id, field } => self.connection(id).map(|c| match field {
                ConnectionField::SourceType => c.source_type.as_str().to_string(),
                ConnectionField::Source => c.source.clone(),
                ConnectionField::SourceField => c.source_field.clone(),
                ConnectionField::DestinationType => c.destination_type.as_str().to_string(),
                ConnectionField::Destination => c.destination.clone(),
                ConnectionField::DestinationField => c.destination_field.clone(),
            }),
        }
    }

    /// Replace the text of a free-text field; choice fields are left alone
    pub fn set_value(&mut self, field: &FieldRef, value: &str) {
        if field.is_choice() {
            return;
        }
        match field {
            FieldRef::Config(config_field) => self.update_config(*config_field, value),
            FieldRef::StageName { id } => self.set_stage_name(id, value),
            FieldRef::Io { side, id, field } => {
                if let Some(io) = self.io_list(*side).iter_mut().find(|io| &io.id == id) {
                    match field {
                        IoField::Name => io.name = value.to_string(),
                        IoField::Description => io.description = value.to_string(),
                        IoField::Type => {}
                    }
                }
            }
            FieldRef::Connection { id, field } => {
                if let Some(c) = self.form.connections.iter_mut().find(|c| &c.id == id) {
                    match field {
                        ConnectionField::Source => c.source = value.to_string(),
                        ConnectionField::Destination => c.destination = value.to_string(),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Advance a choice field to its next option
    pub fn cycle(&mut self, field: &FieldRef) {
        match field {
            FieldRef::Config(ConfigField::Fleet) => self.cycle_fleet(),
            FieldRef::Io {
                side,
                id,
                field: IoField::Type,
            } => {
                if let Some(io) = self.io_list(*side).iter_mut().find(|io| &io.id == id) {
                    io.io_type = io.io_type.next();
                }
            }
            FieldRef::Connection { id, field } => {
                if let Some(c) = self.form.connections.iter_mut().find(|c| &c.id == id) {
                    match field {
                        ConnectionField::SourceType => c.source_type = c.source_type.next(),
                        ConnectionField::DestinationType => {
                            c.destination_type = c.destination_type.next()
                        }
                        ConnectionField::SourceField => c.source_field = next_choice(&c.source_field),
                        ConnectionField::DestinationField => {
                            c.destination_field = next_choice(&c.destination_field)
                        }
                        ConnectionField::Source | ConnectionField::Destination => {}
                    }
                }
            }
            _ => {}
        }
    }

    /// The user turn sent on the Generate step
    pub fn generation_prompt(&self) -> serde_json::Result<String> {
        let form = serde_json::to_string_pretty(&self.form)?;
        Ok(format!(
            "Generate the workflow definition for this workflow:\n\n```json\n{form}\n```"
        ))
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn is_unavailable(&self) -> bool {
        self.session.is_unavailable()
    }

    /// Start (or restart) generation from the current form
    ///
    /// Rejected while a generation is running. The returned turn's
    /// `message_id` is the generation counter; chunks tagged with an older
    /// one are ignored.
    pub fn begin_generation<F>(&mut self, connect: F) -> Option<PendingTurn>
    where
        F: FnOnce() -> Result<Arc<dyn ChatBackend>, ChatError>,
    {
        if self.generating {
            return None;
        }

        let session = match self.session.get_or_start(CODEGEN_SYSTEM_INSTRUCTION, connect) {
            Ok(session) => session,
            Err(StartError::Fresh(err)) => {
                self.output = format!("Code generation is unavailable: {err}");
                return None;
            }
            Err(StartError::AlreadyFailed) => return None,
        };

        let prompt = match self.generation_prompt() {
            Ok(prompt) => prompt,
            Err(err) => {
                tracing::error!(error = %err, "could not serialise wizard form");
                self.output = APOLOGY.to_string();
                return None;
            }
        };

        self.generation += 1;
        self.generating = true;
        self.output.clear();
        tracing::info!(generation = self.generation, "workflow generation started");

        Some(PendingTurn {
            message_id: self.generation,
            prompt,
            session,
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generating && generation == self.generation
    }

    pub fn apply_chunk(&mut self, generation: u64, chunk: &str) {
        if self.is_current(generation) {
            self.output.push_str(chunk);
        }
    }

    pub fn finish(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.generating = false;
            tracing::info!(generation, bytes = self.output.len(), "workflow generation finished");
        }
    }

    pub fn fail(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.generating = false;
            self.output = APOLOGY.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::session::testing::{Script, ScriptedBackend};
    use crate::ai::{run_turn, TurnEvent};
    use crate::catalog::Catalog;

    fn selection_of(catalog: &Catalog, ids: &[&str]) -> Selection {
        let mut selection = Selection::default();
        for id in ids {
            selection.toggle(catalog.get(id).unwrap(), true);
        }
        selection
    }

    fn stage_names(wizard: &Wizard) -> Vec<&str> {
        wizard.form().stages.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_open_seeds_one_stage_per_selected_asset() {
        let catalog = Catalog::builtin();
        let wizard = Wizard::open(&selection_of(&catalog, &["4", "1"]));
        assert_eq!(stage_names(&wizard), vec!["SYNC_GREEN_CL", "CODEMAKER"]);
        for stage in &wizard.form().stages {
            assert_eq!(stage.stage_name, stage.name);
        }
        assert_eq!(wizard.step(), WizardStep::Configuration);
    }

    #[test]
    fn test_reopen_replaces_stages() {
        let catalog = Catalog::builtin();
        let mut wizard = Wizard::open(&selection_of(&catalog, &["2", "3"]));
        wizard.add_input();
        wizard.next();

        let wizard = Wizard::open(&selection_of(&catalog, &["5"]));
        assert_eq!(wizard.form().stages.len(), 1);
        assert_eq!(wizard.form().stages[0].name, catalog.get("5").unwrap().name);
        assert!(wizard.form().public_inputs.is_empty());
        assert_eq!(wizard.step(), WizardStep::Configuration);
    }

    #[test]
    fn test_steps_clamp_at_both_ends() {
        let mut wizard = Wizard::open(&Selection::default());
        wizard.back();
        assert_eq!(wizard.step(), WizardStep::Configuration);

        for _ in 0..10 {
            wizard.next();
        }
        assert_eq!(wizard.step(), WizardStep::Generate);
        assert!(wizard.step().is_last());

        wizard.back();
        assert_eq!(wizard.step(), WizardStep::Review);
    }

    #[test]
    fn test_rows_add_and_remove_preserving_order() {
        let mut wizard = Wizard::open(&Selection::default());
        let a = wizard.add_input();
        let b = wizard.add_input();
        let c = wizard.add_input();
        assert_ne!(a, b);

        wizard.remove_input(&b);
        let ids: Vec<&str> = wizard.form().public_inputs.iter().map(|io| io.id.as_str()).collect();
        assert_eq!(ids, vec![a.as_str(), c.as_str()]);

        let io = &wizard.form().public_inputs[0];
        assert_eq!(io.io_type, IoType::String);
        assert!(io.name.is_empty());

        wizard.remove_input("missing");
        assert_eq!(wizard.form().public_inputs.len(), 2);
    }

    #[test]
    fn test_new_connection_defaults() {
        let mut wizard = Wizard::open(&Selection::default());
        wizard.add_connection();
        let connection = &wizard.form().connections[0];
        assert_eq!(connection.source_type, SourceType::PublicInput);
        assert_eq!(connection.destination_type, DestinationType::StageInputField);
        assert!(connection.source.is_empty());
    }

    #[test]
    fn test_removing_a_stage_keeps_dangling_connections() {
        let catalog = Catalog::builtin();
        let mut wizard = Wizard::open(&selection_of(&catalog, &["4"]));
        let stage_id = wizard.form().stages[0].id.clone();
        let conn = wizard.add_connection();
        wizard.set_value(
            &FieldRef::Connection {
                id: conn,
                field: ConnectionField::Destination,
            },
            "SYNC_GREEN_CL",
        );

        wizard.remove_stage(&stage_id);
        assert!(wizard.form().stages.is_empty());
        assert_eq!(wizard.form().connections[0].destination, "SYNC_GREEN_CL");
    }

    #[test]
    fn test_update_config_and_fleet() {
        let mut wizard = Wizard::open(&Selection::default());
        wizard.update_config(ConfigField::WorkflowType, "MyWorkflow");
        wizard.update_config(ConfigField::Fleet, "testing");
        assert_eq!(wizard.form().workflow_config.workflow_type, "MyWorkflow");
        assert_eq!(wizard.form().workflow_config.fleet, Fleet::Testing);

        wizard.update_config(ConfigField::Fleet, "moon");
        assert_eq!(wizard.form().workflow_config.fleet, Fleet::Testing);

        wizard.cycle_fleet();
        assert_eq!(wizard.form().workflow_config.fleet, Fleet::NonProd);
    }

    #[test]
    fn test_fields_follow_the_step() {
        let mut wizard = Wizard::open(&Selection::default());
        assert_eq!(wizard.fields().len(), 4);

        wizard.next();
        assert!(wizard.fields().is_empty());
        let id = wizard.add_row().unwrap();
        let fields = wizard.fields();
        assert_eq!(fields, vec![FieldRef::StageName { id: id.clone() }]);

        wizard.set_value(&fields[0], "alias");
        assert_eq!(wizard.value(&fields[0]).as_deref(), Some("alias"));

        wizard.remove_row(&fields[0]);
        assert!(wizard.value(&fields[0]).is_none());

        wizard.next();
        wizard.add_row();
        assert_eq!(wizard.fields().len(), 3);
    }

    #[test]
    fn test_choice_fields_cycle() {
        let mut wizard = Wizard::open(&Selection::default());
        let id = wizard.add_connection();
        let field = FieldRef::Connection {
            id,
            field: ConnectionField::SourceField,
        };
        assert!(field.is_choice());

        wizard.cycle(&field);
        assert_eq!(wizard.value(&field).as_deref(), Some(FIELD_CHOICES[0]));
        wizard.cycle(&field);
        assert_eq!(wizard.value(&field).as_deref(), Some(FIELD_CHOICES[1]));

        // Typing into a choice field does nothing
        wizard.set_value(&field, "free text");
        assert_eq!(wizard.value(&field).as_deref(), Some(FIELD_CHOICES[1]));
    }

    #[test]
    fn test_prompt_serialises_with_camel_case_names() {
        let catalog = Catalog::builtin();
        let mut wizard = Wizard::open(&selection_of(&catalog, &["4"]));
        wizard.add_input();
        let prompt = wizard.generation_prompt().unwrap();

        assert!(prompt.contains("\"workflowConfig\""));
        assert!(prompt.contains("\"stageName\": \"SYNC_GREEN_CL\""));
        assert!(prompt.contains("\"fleet\": \"NON_PROD\""));
        assert!(prompt.contains("\"publicInputs\""));
        assert!(prompt.contains("\"type\": \"String\""));
    }

    #[tokio::test]
    async fn test_generation_streams_verbatim() {
        let backend = ScriptedBackend::new(Script::Chunks(vec!["```py\n", "{\"response\":1}\n```"]));
        let connect = || Ok(backend.clone() as Arc<dyn ChatBackend>);
        let mut wizard = Wizard::open(&Selection::default());

        let turn = wizard.begin_generation(connect).unwrap();
        assert!(wizard.is_generating());
        assert!(wizard.begin_generation(|| panic!("busy")).is_none());

        let mut events = Vec::new();
        run_turn(&turn.session, &turn.prompt, |e| events.push(e)).await;
        for event in events {
            match event {
                TurnEvent::Chunk(chunk) => wizard.apply_chunk(turn.message_id, &chunk),
                TurnEvent::Done => wizard.finish(turn.message_id),
                TurnEvent::Failed(_) => wizard.fail(turn.message_id),
            }
        }

        assert!(!wizard.is_generating());
        assert_eq!(wizard.output(), "```py\n{\"response\":1}\n```");

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].0, CODEGEN_SYSTEM_INSTRUCTION);
    }

    #[test]
    fn test_stale_generation_chunks_are_ignored() {
        let backend = ScriptedBackend::new(Script::Chunks(vec![]));
        let mut wizard = Wizard::open(&Selection::default());
        let first = wizard
            .begin_generation(|| Ok(backend.clone() as Arc<dyn ChatBackend>))
            .unwrap();
        wizard.fail(first.message_id);
        assert_eq!(wizard.output(), APOLOGY);

        let second = wizard
            .begin_generation(|| panic!("session already started"))
            .unwrap();
        assert!(wizard.output().is_empty());
        wizard.apply_chunk(first.message_id, "old");
        wizard.apply_chunk(second.message_id, "new");
        assert_eq!(wizard.output(), "new");
    }

    #[test]
    fn test_missing_credential_shown_in_output() {
        let mut wizard = Wizard::open(&Selection::default());
        let missing = || -> Result<Arc<dyn ChatBackend>, ChatError> {
            Err(ChatError::MissingCredential("GEMINI_API_KEY".to_string()))
        };
        assert!(wizard.begin_generation(missing).is_none());
        assert!(wizard.output().contains("GEMINI_API_KEY"));
        assert!(wizard.is_unavailable());
        assert!(!wizard.is_generating());
    }

    #[test]
    fn test_split_code_blocks() {
        let segments = split_code_blocks("Here you go:\n```python\nprint(1)\n```\nDone.");
        assert_eq!(
            segments,
            vec![
                Segment::Prose("Here you go:".to_string()),
                Segment::Code {
                    lang: Some("python".to_string()),
                    body: "print(1)".to_string()
                },
                Segment::Prose("Done.".to_string()),
            ]
        );
    }

    #[test]
    fn test_split_unterminated_fence_is_code() {
        let segments = split_code_blocks("```\nlet x = 1;\nlet y");
        assert_eq!(
            segments,
            vec![Segment::Code {
                lang: None,
                body: "let x = 1;\nlet y".to_string()
            }]
        );
        assert!(split_code_blocks("").is_empty());
    }
}
