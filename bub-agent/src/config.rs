//! Environment-driven settings
//!
//! All configuration comes from `BUB_`-prefixed environment variables, with
//! a `.env` file loaded first when present:
//!
//! | Variable | Default |
//! |---|---|
//! | `BUB_BUS_HOST` | `localhost` |
//! | `BUB_BUS_PORT` | `7892` |
//! | `BUB_AGENT_MODEL` | `echo` |
//! | `BUB_AGENT_API_KEY` | unset |
//! | `BUB_AGENT_MAX_STEPS` | `20` |
//! | `BUB_AGENT_SYSTEM_PROMPT` | empty |
//! | `BUB_AGENT_MODEL_TIMEOUT_SECONDS` | `90` |
//! | `BUB_TAPE_HOME` | `~/.bub` |
//! | `BUB_LOG_FILTER` | unset |

use crate::error::{AgentError, AgentResult};
use std::path::PathBuf;
use std::time::Duration;

/// Bus connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSettings {
    /// Bus host
    pub host: String,
    /// Bus port
    pub port: u16,
}

impl BusSettings {
    /// WebSocket URL for the bus
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7892,
        }
    }
}

/// Agent and model settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    /// Model selector handed to the provider factory
    pub model: String,
    /// Provider API key
    pub api_key: Option<String>,
    /// Bound on model turns per input
    pub max_steps: u32,
    /// System prompt prepended to every projection
    pub system_prompt: String,
    /// Model invocation deadline
    pub model_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "echo".to_string(),
            api_key: None,
            max_steps: 20,
            system_prompt: String::new(),
            model_timeout: Duration::from_secs(90),
        }
    }
}

/// Tape store settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeSettings {
    /// Store root directory
    pub home: PathBuf,
}

impl Default for TapeSettings {
    fn default() -> Self {
        Self {
            home: default_tape_home(),
        }
    }
}

/// Unified process settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Bus connection
    pub bus: BusSettings,
    /// Agent and model
    pub agent: AgentSettings,
    /// Tape store
    pub tape: TapeSettings,
    /// `tracing` filter directive
    pub log_filter: Option<String>,
}

impl Settings {
    /// Load settings from the environment (and `.env` when present)
    pub fn load() -> AgentResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from a variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AgentResult<Self> {
        let get = |name: &str| -> Option<String> {
            lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };

        let mut settings = Settings::default();

        if let Some(host) = get("BUB_BUS_HOST") {
            settings.bus.host = host;
        }
        if let Some(port) = get("BUB_BUS_PORT") {
            settings.bus.port = parse(&port, "BUB_BUS_PORT")?;
        }
        if let Some(model) = get("BUB_AGENT_MODEL") {
            settings.agent.model = model;
        }
        settings.agent.api_key = get("BUB_AGENT_API_KEY");
        if let Some(max_steps) = get("BUB_AGENT_MAX_STEPS") {
            let max_steps: u32 = parse(&max_steps, "BUB_AGENT_MAX_STEPS")?;
            if max_steps == 0 {
                return Err(AgentError::Config(
                    "BUB_AGENT_MAX_STEPS must be at least 1".to_string(),
                ));
            }
            settings.agent.max_steps = max_steps;
        }
        if let Some(system_prompt) = get("BUB_AGENT_SYSTEM_PROMPT") {
            settings.agent.system_prompt = system_prompt;
        }
        if let Some(timeout) = get("BUB_AGENT_MODEL_TIMEOUT_SECONDS") {
            let seconds: u64 = parse(&timeout, "BUB_AGENT_MODEL_TIMEOUT_SECONDS")?;
            settings.agent.model_timeout = Duration::from_secs(seconds);
        }
        if let Some(home) = get("BUB_TAPE_HOME") {
            settings.tape.home = PathBuf::from(home);
        }
        settings.log_filter = get("BUB_LOG_FILTER");

        Ok(settings)
    }
}

fn parse<T: std::str::FromStr>(raw: &str, name: &str) -> AgentResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| AgentError::Config(format!("{}={}: {}", name, raw, e)))
}

fn default_tape_home() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".bub"))
        .unwrap_or_else(|| PathBuf::from(".bub"))
}
