//! CLI argument definitions for the ledgerchat binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::{Path, PathBuf};

use ledgerchat_core::config::LedgerConfig;

/// ledgerchat - answers account and platform questions for exchange users.
#[derive(Parser, Debug)]
#[command(name = "ledgerchat", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// JSON account fixture to serve instead of the demo accounts.
    #[arg(long = "fixture")]
    pub fixture: Option<PathBuf>,

    /// TOML knowledge file replacing the built-in fees and FAQ.
    #[arg(long = "knowledge")]
    pub knowledge: Option<PathBuf>,

    /// Answer one question and exit instead of serving.
    #[arg(long = "ask", requires = "token")]
    pub ask: Option<String>,

    /// Session token used with --ask.
    #[arg(long = "token")]
    pub token: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > LEDGERCHAT_CONFIG env var > ~/.ledgerchat/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("LEDGERCHAT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > LEDGERCHAT_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        std::env::var("LEDGERCHAT_PORT")
            .ok()
            .and_then(|val| val.parse::<u16>().ok())
            .unwrap_or(config_port)
    }

    /// Fold the command-line overrides into `config`.
    pub fn apply(&self, config: &mut LedgerConfig) {
        config.general.port = self.resolve_port(config.general.port);
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(ref path) = self.fixture {
            config.data.fixture_path = Some(path.to_string_lossy().to_string());
        }
        if let Some(ref path) = self.knowledge {
            config.data.knowledge_path = Some(path.to_string_lossy().to_string());
        }
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".ledgerchat").join("config.toml"),
        None => Path::new("config.toml").to_path_buf(),
    }
}
