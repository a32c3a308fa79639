use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use qc_agents::{
    agent_system_prompt, build_react_prompt, AgentRecord, AgentStore, AgentUpdate, McpSettings,
    McpSettingsFile, NewAgent, REACT_STOP,
};
use qc_core::{
    parse, ChatMessage, CompletionRequest, Conversation, MessageStatus, ParsedMessage, Provider,
    Step, ToolDefinition,
};
use qc_render::Renderer;

mod config;
mod replay;
mod setup;
mod stream;

use config::Config;
use replay::ReplayProvider;
use stream::StreamDriver;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: every stream chunk and render
    Trace,
    /// Verbose: stream start/end, store and settings access
    Debug,
    /// Standard: high-level flow
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "qc")]
#[command(author, version, about = "quantchat: parse and render streaming agent output", long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a response into reasoning steps and the final answer
    Parse {
        /// Response file (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Print the parsed message as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render the final answer of a response to HTML
    Render {
        /// Response file (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Render the whole input as markdown without step parsing
        #[arg(long)]
        raw: bool,
    },
    /// Stream a recorded response token by token (Ctrl-C aborts)
    Replay {
        file: PathBuf,

        /// Characters per token (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Milliseconds between tokens (overrides config)
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Manage stored agents
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Show or replace the MCP server settings
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
    /// Build the request a query would send, as JSON
    Prompt {
        query: String,

        /// Use this agent's system prompt
        #[arg(short = 'A', long)]
        agent: Option<String>,

        /// JSON file with an array of tool definitions
        #[arg(long)]
        tools: Option<PathBuf>,
    },
    /// Show current configuration
    Config,
    /// Initialize configuration in ~/.config/qc
    Setup,
}

#[derive(Subcommand)]
enum AgentCommands {
    /// List agents
    List,
    /// Show one agent
    Show { name: String },
    /// Create an agent
    Add {
        name: String,

        /// System prompt
        #[arg(short, long, default_value = "")]
        prompt: String,

        /// Do not give this agent tool instructions
        #[arg(long)]
        no_tools: bool,
    },
    /// Change an agent
    Update {
        name: String,

        /// New name
        #[arg(long)]
        rename: Option<String>,

        /// New system prompt
        #[arg(short, long)]
        prompt: Option<String>,

        /// Whether the agent may use tools
        #[arg(long)]
        allow_tools: Option<bool>,
    },
    /// Delete an agent
    Remove { name: String },
}

#[derive(Subcommand)]
enum McpCommands {
    /// Print the settings document
    Show,
    /// Validate a JSON file and save it as the settings document
    Set { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve log level: --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    let filter = EnvFilter::new(log_level.as_filter());

    if let Some(log_path) = &cli.log_file {
        // Log file specified: write JSON to file
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::sync::Mutex::new(file)),
            )
            .init();
    } else {
        // stdout carries command output
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Handle setup before config is loaded
    if matches!(&cli.command, Commands::Setup) {
        return setup::run();
    }

    let config = Config::load()?;

    match cli.command {
        Commands::Parse { file, json } => parse_command(file.as_deref(), json),
        Commands::Render { file, raw } => render_command(&config, file.as_deref(), raw),
        Commands::Replay {
            file,
            chunk_size,
            delay_ms,
        } => replay_command(&config, &file, chunk_size, delay_ms).await,
        Commands::Agents { command } => agents_command(&config, command),
        Commands::Mcp { command } => mcp_command(&config, command),
        Commands::Prompt {
            query,
            agent,
            tools,
        } => prompt_command(&config, &query, agent.as_deref(), tools.as_deref()),
        Commands::Config => show_config(&config),
        Commands::Setup => unreachable!(),
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            Ok(input)
        }
    }
}

fn step_header(step: &Step) -> String {
    let mut header = step.kind.label().to_string();
    if let Some(number) = step.number {
        header.push_str(&format!(" {}", number));
    }
    if let Some(tool) = &step.tool {
        header.push_str(&format!(": {}", tool));
    }
    header
}

/// Print steps and response. `incomplete` marks a buffer that may still grow.
fn print_parsed(parsed: &ParsedMessage, incomplete: bool) {
    for step in &parsed.steps {
        println!("── {} ──", step_header(step));
        if !step.content.is_empty() {
            println!("{}", step.content);
        }
        if let Some(input) = &step.input {
            println!("Input: {}", input);
        }
        println!();
    }
    if parsed.has_steps() {
        println!("── Response ──");
    }
    println!("{}", parsed.response);
    if incomplete {
        println!("(incomplete)");
    }
}

fn progress_line(message: &ChatMessage) -> String {
    let Some(parsed) = message.parsed() else {
        return String::new();
    };
    match message.current_step() {
        Some(step) => format!("{} steps, writing {}", parsed.steps.len(), step.kind),
        None => format!(
            "{} steps, answer {} chars",
            parsed.steps.len(),
            parsed.response.chars().count()
        ),
    }
}

fn parse_command(file: Option<&Path>, json: bool) -> Result<()> {
    let input = read_input(file)?;
    let parsed = parse(&input);
    if json {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
    } else {
        print_parsed(&parsed, parsed.is_streaming);
    }
    Ok(())
}

fn render_command(config: &Config, file: Option<&Path>, raw: bool) -> Result<()> {
    let input = read_input(file)?;
    let renderer = Renderer::new(config.render.options());
    let html = if raw {
        renderer.render(&input)
    } else {
        renderer.render(&parse(&input).response)
    };
    print!("{}", html);
    Ok(())
}

async fn replay_command(
    config: &Config,
    file: &Path,
    chunk_size: Option<usize>,
    delay_ms: Option<u64>,
) -> Result<()> {
    let text = read_input(Some(file))?;
    let provider = ReplayProvider::new(
        text,
        chunk_size.unwrap_or(config.replay.chunk_size),
        Duration::from_millis(delay_ms.unwrap_or(config.replay.delay_ms)),
    );

    let mut conversation = Conversation::new(None);
    conversation.push_user(format!("replay {}", file.display()));
    let stream = provider
        .stream(CompletionRequest::new(conversation.history()))
        .await?;
    let message = conversation.begin_assistant()?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut driver = StreamDriver::new(
        Renderer::new(config.render.options()),
        config.render.throttle_interval(),
    );
    let status = driver
        .drive(message, stream, cancel, |msg| {
            eprint!("\r\x1b[2K{}", progress_line(msg));
        })
        .await;
    listener.abort();
    eprintln!();

    if let Some(parsed) = message.parsed() {
        print_parsed(parsed, !message.status().is_final());
    }
    println!("\n{}", message.rendered().unwrap_or_default());

    match status {
        MessageStatus::Aborted => eprintln!("[aborted]"),
        MessageStatus::Failed(reason) => eprintln!("[error: {}]", reason),
        MessageStatus::Complete | MessageStatus::Streaming => {}
    }
    Ok(())
}

fn open_store(config: &Config) -> Result<AgentStore> {
    let path = config.database_path()?;
    AgentStore::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}

fn find_agent(store: &AgentStore, name: &str) -> Result<AgentRecord> {
    store
        .get_agent_by_name(name)?
        .ok_or_else(|| anyhow::anyhow!("No agent named '{}'", name))
}

fn agents_command(config: &Config, command: AgentCommands) -> Result<()> {
    let store = open_store(config)?;

    match command {
        AgentCommands::List => {
            let agents = store.list_agents()?;
            if agents.is_empty() {
                println!("No agents configured.");
                return Ok(());
            }
            for agent in agents {
                let tools = if agent.allow_tools { "tools" } else { "no tools" };
                let preview: String = agent.system_prompt.chars().take(60).collect();
                println!("  {:>3}  {} ({})  {}", agent.id, agent.name, tools, preview);
            }
        }
        AgentCommands::Show { name } => {
            let agent = find_agent(&store, &name)?;
            println!("Agent: {}", agent.name);
            println!("  Id: {}", agent.id);
            println!("  Tools: {}", if agent.allow_tools { "allowed" } else { "disabled" });
            println!("  Created: {}", agent.created_at);
            println!("  Updated: {}", agent.updated_at);
            println!("\n{}", agent.system_prompt);
        }
        AgentCommands::Add {
            name,
            prompt,
            no_tools,
        } => {
            let agent = store.create_agent(
                &NewAgent::new(name)
                    .with_system_prompt(prompt)
                    .with_allow_tools(!no_tools),
            )?;
            println!("Created agent '{}' (id {})", agent.name, agent.id);
        }
        AgentCommands::Update {
            name,
            rename,
            prompt,
            allow_tools,
        } => {
            let update = AgentUpdate {
                name: rename,
                system_prompt: prompt,
                allow_tools,
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update: pass --rename, --prompt or --allow-tools");
            }
            let agent = find_agent(&store, &name)?;
            let agent = store.update_agent(agent.id, &update)?;
            println!("Updated agent '{}'", agent.name);
        }
        AgentCommands::Remove { name } => {
            let agent = find_agent(&store, &name)?;
            store.delete_agent(agent.id)?;
            println!("Removed agent '{}'", agent.name);
        }
    }
    Ok(())
}

fn mcp_command(config: &Config, command: McpCommands) -> Result<()> {
    let file = McpSettingsFile::new(config.mcp_settings_path()?);

    match command {
        McpCommands::Show => {
            let settings = file.load()?;
            println!("{}", settings.to_json_pretty()?);
            match settings.servers() {
                Ok(servers) => eprintln!("{} server(s) in {}", servers.len(), file.path().display()),
                Err(e) => eprintln!("Warning: {}", e),
            }
        }
        McpCommands::Set { file: source } => {
            let settings = McpSettings::parse(&read_input(Some(&source))?)
                .with_context(|| format!("Invalid MCP settings in {}", source.display()))?;
            let servers = settings.servers()?;
            file.save(&settings)?;
            println!(
                "Saved {} server(s) to {}",
                servers.len(),
                file.path().display()
            );
        }
    }
    Ok(())
}

fn load_tools(path: Option<&Path>) -> Result<Vec<ToolDefinition>> {
    match path {
        Some(path) => {
            let text = read_input(Some(path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Expected a JSON array of tools in {}", path.display()))
        }
        None => Ok(Vec::new()),
    }
}

fn prompt_command(
    config: &Config,
    query: &str,
    agent: Option<&str>,
    tools: Option<&Path>,
) -> Result<()> {
    let tools = load_tools(tools)?;

    let (mut conversation, uses_tools) = match agent {
        Some(name) => {
            let store = open_store(config)?;
            let agent = find_agent(&store, name)?;
            let system = agent_system_prompt(&agent, &tools);
            let uses_tools = agent.allow_tools && !tools.is_empty();
            (Conversation::new(Some(system)), uses_tools)
        }
        None => (Conversation::new(None), !tools.is_empty()),
    };

    if agent.is_none() && uses_tools {
        conversation.push_user(build_react_prompt(&tools, query));
    } else {
        conversation.push_user(query);
    }

    let mut request = CompletionRequest::new(conversation.history());
    if uses_tools {
        request = request.with_stop(REACT_STOP.iter().map(|s| s.to_string()).collect());
    }
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let path = Config::config_path()?;
    println!("Configuration:");
    println!(
        "  File: {}{}",
        path.display(),
        if path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!("  Database: {}", config.database_path()?.display());
    println!("  MCP settings: {}", config.mcp_settings_path()?.display());
    println!("\n{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_core::StepKind;

    #[test]
    fn test_step_header() {
        let step = Step::new(StepKind::Step, "rebalance").with_number(2);
        assert_eq!(step_header(&step), "Step 2");
        let step = Step::new(StepKind::Action, "get_quote").with_tool("get_quote");
        assert_eq!(step_header(&step), "Action: get_quote");
    }

    fn refreshed(text: &str) -> ChatMessage {
        let mut msg = ChatMessage::streaming_assistant(1);
        msg.append(text);
        msg.refresh_with(str::to_string);
        msg
    }

    #[test]
    fn test_progress_line() {
        let msg = refreshed("Thought: check beta");
        assert_eq!(progress_line(&msg), "1 steps, writing Thinking");
        let msg = refreshed("Thought: ok\nFinal Answer: hold");
        assert_eq!(progress_line(&msg), "1 steps, answer 4 chars");
    }

    #[test]
    fn test_progress_line_after_abort() {
        let mut msg = refreshed("Thought: check beta");
        msg.abort();
        assert_eq!(progress_line(&msg), "1 steps, answer 0 chars");
        assert_eq!(progress_line(&ChatMessage::streaming_assistant(2)), "");
    }

    #[test]
    fn test_load_tools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(
            &path,
            r#"[{"name":"get_quote","description":"Quote","inputSchema":{"type":"object"}}]"#,
        )
        .unwrap();
        let tools = load_tools(Some(&path)).unwrap();
        assert_eq!(tools[0].name, "get_quote");
        assert!(load_tools(None).unwrap().is_empty());

        std::fs::write(&path, "{}").unwrap();
        assert!(load_tools(Some(&path)).is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["qc", "replay", "resp.txt", "--chunk-size", "8"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Replay {
                chunk_size: Some(8),
                ..
            }
        ));
        let cli =
            Cli::try_parse_from(["qc", "agents", "update", "quant", "--allow-tools", "false"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Agents {
                command: AgentCommands::Update {
                    allow_tools: Some(false),
                    ..
                }
            }
        ));
    }
}
