/// `error.rs` — error taxonomy for loading and running mods
///
/// Materialization failures (`Io`, `Network`, `Fetch`) never touch the loaded
/// code. `Script` covers anything raised by the Lua interpreter, both at load time
/// and inside `tick` / `event` callbacks.
use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by the engine for a command it refused.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("engine session is not running")]
    NotRunning,
    #[error("engine session is already running")]
    AlreadyRunning,
    #[error("engine rejected `{command}`: {reason}")]
    Rejected { command: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RunnerError {
    /// Local mod file could not be read.
    #[error("cannot read mod file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Transport-level failure while fetching a remote mod.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Remote server answered with a non-2xx status.
    #[error("request for {url} failed with status code {status}")]
    Fetch { url: String, status: u16 },
    #[error("script error: {0}")]
    Script(#[from] mlua::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The session was torn down by a fault under crash-on-error.
    #[error("mod runner terminated: {0}")]
    Terminated(String),
}

impl RunnerError {
    /// HTTP status carried by a `Fetch` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            RunnerError::Fetch { status, .. } => Some(*status),
            _ => None,
        }
    }
}
