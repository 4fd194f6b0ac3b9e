use std::io::Write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;

use flower_core::agent::system_instruction;
use flower_core::ai::{self, ChatSession};
use flower_core::{parse_reply, AgentAction, Catalog, Config, GeminiClient, OllamaClient, ParsedReply, Provider};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::{AppEvent, EventHandler, Tui};

#[derive(Parser)]
#[command(name = "flower")]
#[command(version, about = "Browse workflow stages, ask the agent, and assemble workflows")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the asset hub (default)
    Tui,
    /// Print the hub sections
    List {
        /// Only assets whose name or description contains this
        #[arg(short, long, default_value = "")]
        query: String,
    },
    /// Ask the agent one question and stream the reply
    Ask {
        /// Your message
        message: String,
    },
    /// List models for the configured provider
    Models,
    /// Show or change the saved settings
    Config {
        /// Chat provider: gemini or ollama
        #[arg(long)]
        provider: Option<String>,
        /// Model to use with the provider
        #[arg(long)]
        model: Option<String>,
        /// Base URL of the Ollama server
        #[arg(long)]
        ollama_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Tui);

    match &command {
        Commands::Tui => {
            logging::init_file()?;
        }
        _ => logging::init_stderr(),
    }

    let config = Config::load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not read config, using defaults");
        Config::new()
    });

    match command {
        Commands::Tui => run_tui(config).await,
        Commands::List { query } => {
            list_assets(&query);
            Ok(())
        }
        Commands::Ask { message } => ask(&config, &message).await,
        Commands::Models => list_models(&config).await,
        Commands::Config {
            provider,
            model,
            ollama_url,
        } => configure(config, provider, model, ollama_url),
    }
}

async fn run_tui(config: Config) -> Result<()> {
    tracing::info!(provider = config.provider().as_str(), model = %config.model(), "starting hub");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let tx = events.sender();
    let mut app = App::new(config);

    let result = run_loop(&mut terminal, &mut app, &mut events, &tx).await;

    tui::restore()?;
    tracing::info!("hub closed");
    result
}

async fn run_loop(
    terminal: &mut Tui,
    app: &mut App,
    events: &mut EventHandler,
    tx: &UnboundedSender<AppEvent>,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event, tx)?,
            None => break,
        }
    }
    Ok(())
}

fn list_assets(query: &str) {
    let catalog = Catalog::builtin();
    let hub = flower_core::AssetHub {
        search: query.to_string(),
    };
    let sections = hub.sections(&catalog);

    if sections.is_empty() {
        println!("No assets match \"{}\"", query);
        return;
    }

    for (title, assets) in [
        ("Recently Updated", &sections.recently_updated),
        ("Most Popular", &sections.most_popular),
    ] {
        if assets.is_empty() {
            continue;
        }
        println!("\n{}", title);
        println!("{}", "=".repeat(title.len()));
        for asset in assets {
            println!(
                "  {:<28} {:<9} {}",
                asset.name,
                asset.kind.as_str(),
                asset.description
            );
        }
    }
}

async fn ask(config: &Config, message: &str) -> Result<()> {
    let catalog = Catalog::builtin();
    let backend = ai::connect(config)?;
    let session = ChatSession::start(backend, system_instruction(&catalog));

    let mut chunks = session.send_message_stream(message).await?;
    let mut reply = String::new();
    let mut stdout = std::io::stdout();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        write!(stdout, "{}", chunk)?;
        stdout.flush()?;
        reply.push_str(&chunk);
    }
    println!();

    if let ParsedReply::Structured { response, action } = parse_reply(&reply) {
        println!("\nResponse: {}", response);
        if let Some(AgentAction::HighlightAsset { asset_name }) = action {
            match catalog.find_by_name(&asset_name) {
                Some(asset) => println!("Highlight: {} (id {})", asset.name, asset.id),
                None => println!("Highlight: {} (not in catalog)", asset_name),
            }
        }
    }
    Ok(())
}

async fn list_models(config: &Config) -> Result<()> {
    let provider = config.provider();
    println!("\n{} models", provider.display_name());
    println!("{}", "=".repeat(30));

    let models = match provider {
        Provider::Gemini => {
            match config.gemini_key_source() {
                Some(source) => println!("API key: from {}", source),
                None => println!("API key: not set (export GEMINI_API_KEY)"),
            }
            GeminiClient::list_models()
        }
        Provider::Ollama => {
            let ollama = OllamaClient::new(config.ollama_url());
            match ollama.list_models().await {
                Ok(models) => models,
                Err(e) => {
                    println!("Error connecting to Ollama: {}", e);
                    println!("Make sure Ollama is running: ollama serve");
                    return Ok(());
                }
            }
        }
    };

    if models.is_empty() {
        println!("No models found. Pull a model with: ollama pull {}", flower_core::ai::ollama::DEFAULT_MODEL);
    }
    let current = config.model();
    for model in models {
        let marker = if model == current { "*" } else { " " };
        println!("{} {}", marker, model);
    }
    Ok(())
}

fn configure(
    mut config: Config,
    provider: Option<String>,
    model: Option<String>,
    ollama_url: Option<String>,
) -> Result<()> {
    let changed = provider.is_some() || model.is_some() || ollama_url.is_some();
    if changed {
        config.update(provider.as_deref(), model.as_deref(), ollama_url.as_deref())?;
        config.save()?;
        tracing::info!(provider = config.provider().as_str(), model = %config.model(), "config saved");
    }

    println!("Config file: {}", Config::get_config_path()?.display());
    println!("Provider:    {}", config.provider().display_name());
    println!("Model:       {}", config.model());
    if config.provider() == Provider::Ollama {
        println!("Ollama URL:  {}", config.ollama_url());
    } else {
        println!("API key:     {}", config.gemini_key_source().unwrap_or("not set"));
    }
    Ok(())
}
