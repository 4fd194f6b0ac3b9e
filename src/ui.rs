use std::time::Instant;

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use flower_core::wizard::{split_code_blocks, FieldRef, IoField, Segment};
use flower_core::{Asset, AssetKind, Sender, TagColor, Wizard, WizardStep};

use crate::app::{App, FocusPane, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else {
            break;
        };
        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        if end > 0 {
            spans.push(Span::styled(
                after[..end].to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        }
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }
    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [hub_area, agent_area] = Layout::horizontal([
        Constraint::Percentage(60),
        Constraint::Percentage(40),
    ])
    .areas(body_area);

    render_hub(app, frame, hub_area);
    render_agent(app, frame, agent_area);
    render_footer(app, frame, footer_area);

    if app.wizard.is_some() {
        render_wizard(app, frame, body_area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let selected = if app.selection.is_empty() {
        String::new()
    } else {
        format!(" [{} selected]", app.selection.len())
    };

    let mut spans = vec![
        Span::styled(" Flower Asset Hub ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(selected, Style::default().fg(Color::Green)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(status) = &app.status {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Yellow)));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match (app.wizard.is_some(), app.focus) {
        (true, _) => " WIZARD ",
        (false, FocusPane::Hub) => " HUB ",
        (false, FocusPane::Agent) => " AGENT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {key} "), key_style),
            Span::styled(format!(" {label} "), label_style),
        ]
    };

    let hints: Vec<Span> = if let Some(wizard) = &app.wizard {
        match (app.input_mode, wizard.step()) {
            (InputMode::Editing, _) => [hint("Enter", "save"), hint("Esc", "cancel")].concat(),
            (InputMode::Normal, WizardStep::Generate) => [
                hint("Enter", if wizard.output().is_empty() { "generate" } else { "regenerate" }),
                hint("j/k", "scroll"),
                hint("b", "back"),
                hint("Esc", "close"),
            ]
            .concat(),
            (InputMode::Normal, WizardStep::Review) => {
                [hint("j/k", "scroll"), hint("n/b", "step"), hint("Esc", "close")].concat()
            }
            (InputMode::Normal, WizardStep::Configuration) => [
                hint("j/k", "field"),
                hint("Enter", "edit"),
                hint("n/b", "step"),
                hint("Esc", "close"),
            ]
            .concat(),
            (InputMode::Normal, _) => [
                hint("j/k", "field"),
                hint("Enter", "edit"),
                hint("a", "add"),
                hint("d", "remove"),
                hint("n/b", "step"),
                hint("Esc", "close"),
            ]
            .concat(),
        }
    } else {
        match (app.focus, app.input_mode) {
            (FocusPane::Hub, InputMode::Normal) => [
                hint("j/k", "nav"),
                hint("Space", "select"),
                hint("w", "workflow"),
                hint("c", "clear"),
                hint("/", "search"),
                hint("a", "ask"),
                hint("Tab", "focus"),
                hint("q", "quit"),
            ]
            .concat(),
            (FocusPane::Hub, InputMode::Editing) => {
                [hint("Enter", "done"), hint("Esc", "done")].concat()
            }
            (FocusPane::Agent, InputMode::Normal) => [
                hint("i", "type"),
                hint("j/k", "scroll"),
                hint("w", "workflow"),
                hint("c", "clear"),
                hint("Tab", "focus"),
                hint("q", "quit"),
            ]
            .concat(),
            (FocusPane::Agent, InputMode::Editing) => {
                [hint("Enter", "send"), hint("Esc", "stop typing")].concat()
            }
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn asset_item(app: &App, asset: &Asset, now: Instant) -> ListItem<'static> {
    let selected = app.selection.contains(&asset.id);
    let highlighted = app.is_highlighted(&asset.id, now);

    let mut title = vec![
        Span::styled(
            if selected { "[x] " } else { "[ ] " },
            Style::default().fg(if selected { Color::Green } else { Color::DarkGray }),
        ),
    ];
    if let Some(avatar) = &asset.avatar {
        title.push(Span::raw(format!("{avatar} ")));
    }
    title.push(Span::styled(asset.name.clone(), Style::default().bold()));
    if asset.pinned {
        title.push(Span::styled(" ★", Style::default().fg(Color::Yellow)));
    }
    if let Some(tag) = &asset.tag {
        let color = match asset.tag_color {
            Some(TagColor::Pink) => Color::Magenta,
            Some(TagColor::Cyan) | None => Color::Cyan,
        };
        title.push(Span::styled(format!(" {tag} "), Style::default().fg(Color::Black).bg(color)));
    }

    let kind = match asset.kind {
        AssetKind::Stage => "stage",
        AssetKind::Workflow => "workflow",
    };
    let meta = Line::from(Span::styled(
        format!("    {kind} · {} · {}", asset.category, asset.owner),
        Style::default().fg(Color::DarkGray),
    ));
    let description = Line::from(format!("    {}", asset.description));

    let item = ListItem::new(Text::from(vec![Line::from(title), description, meta]));
    if highlighted {
        item.style(Style::default().bg(Color::Yellow).fg(Color::Black))
    } else {
        item
    }
}

fn section_header(title: &'static str) -> ListItem<'static> {
    ListItem::new(Line::from(Span::styled(
        title,
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    )))
}

fn render_hub(app: &mut App, frame: &mut Frame, area: Rect) {
    let [search_area, list_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(area);

    let focused = app.focus == FocusPane::Hub && app.wizard.is_none();
    let searching = focused && app.input_mode == InputMode::Editing;

    // Search box
    let search_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if searching { Color::Yellow } else { Color::DarkGray }))
        .title(" Search ");
    let search_text = if app.hub.search.is_empty() && !searching {
        Span::styled("Search stages and workflows...", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw(app.hub.search.clone())
    };
    frame.render_widget(Paragraph::new(search_text).block(search_block), search_area);
    if searching {
        let x = search_area.x + 1 + app.hub.search.chars().count() as u16;
        frame.set_cursor_position(Position::new(x, search_area.y + 1));
    }

    // Asset sections
    let now = Instant::now();
    let sections = app.sections();
    let mut items: Vec<ListItem> = Vec::new();
    let mut cursor_row = None;
    let mut flat = 0;

    for (title, assets) in [
        ("Recently Updated", &sections.recently_updated),
        ("Most Popular", &sections.most_popular),
    ] {
        if assets.is_empty() {
            continue;
        }
        items.push(section_header(title));
        for asset in assets.iter() {
            if flat == app.hub_cursor {
                cursor_row = Some(items.len());
            }
            items.push(asset_item(app, asset, now));
            flat += 1;
        }
        items.push(ListItem::new(Line::default()));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { Color::Cyan } else { Color::DarkGray }))
        .title(format!(" Assets ({}) ", sections.len()));

    if items.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No assets match your search.",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        frame.render_widget(empty, list_area);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");

    app.hub_list.select(cursor_row);
    frame.render_stateful_widget(list, list_area, &mut app.hub_list);
}

const SELECTED_ROWS: usize = 4;

/// One row per picked asset, folding the overflow into a "+N more" row
fn selected_lines(assets: &[Asset], max_rows: usize) -> Vec<Line<'static>> {
    let shown = if assets.len() > max_rows {
        max_rows.saturating_sub(1)
    } else {
        assets.len()
    };

    let mut lines: Vec<Line<'static>> = assets[..shown]
        .iter()
        .map(|asset| {
            Line::from(vec![
                Span::styled(asset.name.clone(), Style::default().fg(Color::Green).bold()),
                Span::raw("  "),
                Span::styled(asset.description.clone(), Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();
    if shown < assets.len() {
        lines.push(Line::from(Span::styled(
            format!("+{} more", assets.len() - shown),
            Style::default().fg(Color::DarkGray).italic(),
        )));
    }
    lines
}

fn render_selected(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Selected Assets ({}) ", app.selection.len()))
        .title_bottom(Line::from(" c clear ").right_aligned());
    let lines = selected_lines(app.selection.assets(), SELECTED_ROWS);
    frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
}

fn render_agent(app: &mut App, frame: &mut Frame, area: Rect) {
    let selected_height = match app.selection.len() {
        0 => 0,
        n => n.min(SELECTED_ROWS) as u16 + 2,
    };
    let [selected_area, chat_area, input_area] = Layout::vertical([
        Constraint::Length(selected_height),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    if selected_height > 0 {
        render_selected(app, frame, selected_area);
    }

    // Store transcript dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let focused = app.focus == FocusPane::Agent && app.wizard.is_none();
    let editing = focused && app.input_mode == InputMode::Editing;

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { Color::Cyan } else { Color::DarkGray }))
        .title(format!(
            " Agent · {}: {} ",
            app.config.provider().display_name(),
            app.config.model()
        ));

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.agent.messages() {
        match msg.sender {
            Sender::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
            }
            Sender::Agent => {
                lines.push(Line::from(Span::styled(
                    "Agent:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
            }
        }
        for line in msg.text.lines() {
            lines.push(parse_markdown_line(line));
        }
        if msg.is_generating {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }
        lines.push(Line::default());
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    // Input box
    let (input_title, input_text) = if app.agent.is_unavailable() {
        (
            " Chat unavailable ",
            Span::styled("Configure an API key and restart.", Style::default().fg(Color::DarkGray)),
        )
    } else if app.agent.is_generating() {
        (" Waiting for reply ", Span::raw(app.agent.input.clone()))
    } else if app.agent.input.is_empty() && !editing {
        (
            " Message ",
            Span::styled("Ask me to find a stage...", Style::default().fg(Color::DarkGray)),
        )
    } else {
        (" Message ", Span::raw(app.agent.input.clone()))
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(input_title);
    frame.render_widget(Paragraph::new(input_text).block(input_block), input_area);

    if editing {
        let x = input_area.x + 1 + app.agent_cursor as u16;
        frame.set_cursor_position(Position::new(x.min(input_area.right().saturating_sub(2)), input_area.y + 1));
    }
}

/// Centered rect taking a percentage of `area`
fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let width = area.width * percent_x / 100;
    let height = area.height * percent_y / 100;
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn render_wizard(app: &App, frame: &mut Frame, area: Rect) {
    let Some(wizard) = app.wizard.as_ref() else {
        return;
    };

    let popup_area = centered_rect(area, 90, 90);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Create New Workflow ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let [steps_area, body_area] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Min(0),
    ])
    .areas(inner);

    // Step bar
    let current = wizard.step().index();
    let mut step_spans = Vec::new();
    for (i, step) in WizardStep::ALL.iter().enumerate() {
        let style = if i == current {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else if i < current {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let marker = if i < current { "✓".to_string() } else { (i + 1).to_string() };
        step_spans.push(Span::styled(format!(" {marker} {} ", step.title()), style));
        if i + 1 < WizardStep::ALL.len() {
            step_spans.push(Span::styled("›", Style::default().fg(Color::DarkGray)));
        }
    }
    frame.render_widget(Paragraph::new(Line::from(step_spans)), steps_area);

    let text = match wizard.step() {
        WizardStep::Review => review_text(wizard),
        WizardStep::Generate => generate_text(wizard, app.animation_frame),
        _ => fields_text(app, wizard),
    };

    let body = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .scroll((app.wizard_scroll, 0));
    frame.render_widget(body, body_area);
}

fn field_label(wizard: &Wizard, field: &FieldRef) -> String {
    match field {
        FieldRef::Config(config_field) => config_field.label().to_string(),
        FieldRef::StageName { id } => {
            let name = wizard
                .form()
                .stages
                .iter()
                .find(|s| &s.id == id)
                .map(|s| s.name.as_str())
                .filter(|name| !name.is_empty())
                .unwrap_or("(custom)");
            format!("{name} as")
        }
        FieldRef::Io { field, .. } => match field {
            IoField::Name => "name".to_string(),
            IoField::Type => "type".to_string(),
            IoField::Description => "description".to_string(),
        },
        FieldRef::Connection { field, .. } => field.label().to_string(),
    }
}

fn fields_text(app: &App, wizard: &Wizard) -> Text<'static> {
    let fields = wizard.fields();
    let mut lines = vec![
        Line::from(Span::styled(
            wizard.step().title(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::default(),
    ];

    if fields.is_empty() {
        lines.push(Line::from(Span::styled(
            "Nothing here yet. Press a to add a row.",
            Style::default().fg(Color::DarkGray),
        )));
        return Text::from(lines);
    }

    let mut last_row: Option<String> = None;
    for (i, field) in fields.iter().enumerate() {
        let row = field.row_id().map(str::to_string);
        if row.is_some() && last_row.is_some() && row != last_row {
            lines.push(Line::default());
        }
        last_row = row;

        let is_cursor = i == app.wizard_field;
        let value = match (&app.wizard_edit, is_cursor) {
            (Some(buffer), true) => format!("{buffer}▏"),
            _ => wizard.value(field).unwrap_or_default(),
        };
        let value_style = if field.is_choice() {
            Style::default().fg(Color::Magenta)
        } else {
            Style::default()
        };

        let mut spans = vec![
            Span::raw(if is_cursor { "> " } else { "  " }),
            Span::styled(
                format!("{}: ", field_label(wizard, field)),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(value, value_style),
        ];
        if field.is_choice() && is_cursor {
            spans.push(Span::styled("  (Enter to change)", Style::default().fg(Color::DarkGray)));
        }
        let line = Line::from(spans);
        lines.push(if is_cursor {
            line.style(Style::default().add_modifier(Modifier::BOLD))
        } else {
            line
        });
    }
    Text::from(lines)
}

fn review_text(wizard: &Wizard) -> Text<'static> {
    let form = wizard.form();
    let config = &form.workflow_config;
    let heading = |title: &str| {
        Line::from(Span::styled(
            title.to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
    };
    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };

    let mut lines = vec![
        heading("Configuration"),
        Line::from(format!("  Workflow type: {}", or_dash(&config.workflow_type))),
        Line::from(format!("  Fleet: {}", config.fleet.as_str())),
        Line::from(format!("  Directory: {}", or_dash(&config.directory))),
        Line::from(format!("  Description: {}", or_dash(&config.description))),
        Line::default(),
        heading(&format!("Stages ({})", form.stages.len())),
    ];
    for stage in &form.stages {
        lines.push(Line::from(format!("  {} as {}", or_dash(&stage.name), or_dash(&stage.stage_name))));
    }

    for (title, list) in [("Public Inputs", &form.public_inputs), ("Public Outputs", &form.public_outputs)] {
        lines.push(Line::default());
        lines.push(heading(&format!("{title} ({})", list.len())));
        for io in list {
            lines.push(Line::from(format!(
                "  {}: {}  {}",
                or_dash(&io.name),
                io.io_type.as_str(),
                io.description
            )));
        }
    }

    lines.push(Line::default());
    lines.push(heading(&format!("Connections ({})", form.connections.len())));
    for c in &form.connections {
        lines.push(Line::from(format!(
            "  {} {}.{} → {} {}.{}",
            c.source_type.as_str(),
            or_dash(&c.source),
            or_dash(&c.source_field),
            c.destination_type.as_str(),
            or_dash(&c.destination),
            or_dash(&c.destination_field),
        )));
    }
    Text::from(lines)
}

fn generate_text(wizard: &Wizard, animation_frame: u8) -> Text<'static> {
    let mut lines = Vec::new();

    if wizard.output().is_empty() {
        let message = if wizard.is_generating() {
            format!("Generating{}", ".".repeat(animation_frame as usize + 1))
        } else {
            "Press Enter to generate the workflow code from this form.".to_string()
        };
        lines.push(Line::from(Span::styled(
            message,
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
        return Text::from(lines);
    }

    for segment in split_code_blocks(wizard.output()) {
        match segment {
            Segment::Prose(text) => {
                for line in text.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
            Segment::Code { lang, body } => {
                lines.push(Line::from(Span::styled(
                    format!("── {} ──", lang.as_deref().unwrap_or("code")),
                    Style::default().fg(Color::DarkGray),
                )));
                for line in body.lines() {
                    lines.push(Line::from(Span::styled(
                        line.to_string(),
                        Style::default().fg(Color::Green),
                    )));
                }
            }
        }
        lines.push(Line::default());
    }

    if wizard.is_generating() {
        lines.push(Line::from(Span::styled(
            ".".repeat(animation_frame as usize + 1),
            Style::default().fg(Color::DarkGray),
        )));
    }
    Text::from(lines)
}
