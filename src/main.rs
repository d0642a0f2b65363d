//! The `bub` command
//!
//! Two subcommands:
//!
//! - `bub bus` - run the message bus server
//! - `bub run` - run the agent: one `handle_input` when a prompt is given,
//!   an interactive line loop otherwise
//!
//! Exit codes: 0 success, 1 runtime error, 2 configuration error.

use bub_agent::config::Settings;
use bub_agent::model::{EchoModel, ModelProvider, ScriptedModel};
use bub_agent::runtime::{Supervisor, DEFAULT_SHUTDOWN_GRACE};
use bub_agent::tape::FileTapeStore;
use bub_agent::tools::ToolRegistry;
use bub_bus::BusServer;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bub", version, about = "Agent message bus and tape-backed agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the message bus server
    Bus {
        /// Bind host (default from BUB_BUS_HOST)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (default from BUB_BUS_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the agent
    Run {
        /// Session to address (default "cli")
        #[arg(long = "session-id")]
        session_id: Option<String>,
        /// Model selector (default from BUB_AGENT_MODEL)
        #[arg(long)]
        model: Option<String>,
        /// Workspace directory; tapes live under <workspace>/.bub
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Prompt for a single non-interactive turn
        prompt: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("config error: {}", e);
            return ExitCode::from(2);
        }
    };

    init_tracing(settings.log_filter.as_deref());

    match cli.command {
        Command::Bus { host, port } => run_bus(settings, host, port).await,
        Command::Run {
            session_id,
            model,
            workspace,
            prompt,
        } => run_agent(settings, session_id, model, workspace, prompt).await,
    }
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_env("BUB_LOG_FILTER")
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_bus(settings: Settings, host: Option<String>, port: Option<u16>) -> ExitCode {
    let host = host.unwrap_or(settings.bus.host);
    let port = port.unwrap_or(settings.bus.port);
    let addr = format!("{}:{}", host, port);

    let server = match BusServer::builder().bind_str(&addr) {
        Ok(builder) => match builder.build().await {
            Ok(server) => server,
            Err(e) => {
                eprintln!("failed to bind {}: {}", addr, e);
                return ExitCode::from(1);
            }
        },
        Err(e) => {
            eprintln!("invalid bus address {}: {}", addr, e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = server.run().await {
        eprintln!("bus stopped: {}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run_agent(
    settings: Settings,
    session_id: Option<String>,
    model: Option<String>,
    workspace: Option<PathBuf>,
    prompt: Vec<String>,
) -> ExitCode {
    let model = model.unwrap_or_else(|| settings.agent.model.clone());
    let provider = match resolve_provider(&model) {
        Ok(provider) => provider,
        Err(message) => {
            eprintln!("config error: {}", message);
            return ExitCode::from(2);
        }
    };

    let tape_home = workspace
        .map(|w| w.join(".bub"))
        .unwrap_or_else(|| settings.tape.home.clone());
    let store = match FileTapeStore::open(&tape_home) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("failed to open tape store at {}: {}", tape_home.display(), e);
            return ExitCode::from(1);
        }
    };

    let supervisor = Supervisor::new(
        store,
        provider,
        Arc::new(ToolRegistry::new()),
        settings.agent.clone(),
    );
    let session_id = session_id.unwrap_or_else(|| "cli".to_string());

    let code = if prompt.is_empty() {
        interactive(&supervisor, &session_id).await
    } else {
        one_shot(&supervisor, &session_id, &prompt.join(" ")).await
    };

    supervisor.shutdown(DEFAULT_SHUTDOWN_GRACE).await;
    code
}

async fn one_shot(supervisor: &Supervisor, session_id: &str, raw: &str) -> ExitCode {
    match supervisor.handle_input(session_id, raw).await {
        Ok(result) => {
            if !result.immediate_output.is_empty() {
                println!("{}", result.immediate_output);
            }
            if !result.assistant_output.is_empty() {
                println!("{}", result.assistant_output);
            }
            match result.error {
                Some(error) => {
                    eprintln!("error: {}", error);
                    ExitCode::from(1)
                }
                None => ExitCode::SUCCESS,
            }
        }
        Err(e) => {
            eprintln!("error: {}", e.tag());
            ExitCode::from(1)
        }
    }
}

async fn interactive(supervisor: &Supervisor, session_id: &str) -> ExitCode {
    println!("bub interactive - ,help for commands, ,quit to exit");
    let mut shell_mode = false;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let symbol = if shell_mode { "," } else { ">" };
        print!("{} {} ", session_id, symbol);
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("stdin error: {}", e);
                return ExitCode::from(1);
            }
        };
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }

        // ,shell toggles between agent mode and command mode; in command
        // mode a bare line is treated as a command.
        if raw == ",shell" {
            shell_mode = !shell_mode;
            continue;
        }
        let request = if shell_mode && !raw.starts_with(',') {
            format!(", {}", raw)
        } else {
            raw.to_string()
        };

        match supervisor.handle_input(session_id, &request).await {
            Ok(result) => {
                if !result.immediate_output.is_empty() {
                    println!("{}", result.immediate_output);
                }
                if let Some(error) = &result.error {
                    eprintln!("error: {}", error);
                }
                if !result.assistant_output.is_empty() {
                    println!("{}", result.assistant_output);
                }
                if result.exit_requested {
                    break;
                }
            }
            Err(e) => eprintln!("error: {}", e.tag()),
        }
    }

    println!("bye");
    ExitCode::SUCCESS
}

fn resolve_provider(model: &str) -> Result<Arc<dyn ModelProvider>, String> {
    match model {
        "echo" => Ok(Arc::new(EchoModel::new())),
        "mock" | "scripted" => Ok(Arc::new(ScriptedModel::new())),
        other => Err(format!(
            "unknown model '{}': built-in providers are 'echo' and 'mock'; \
             concrete LLM providers are wired in by embedding applications",
            other
        )),
    }
}
