pub mod config;
pub mod engine;
pub mod error;
pub mod reload;
pub mod runner;
pub mod scripting;

pub use config::{RunnerConfig, WatchOptions};
pub use engine::{
    CustomStore, EngineCommand, EngineEvent, Entity, EntityKind, GameEngine, InMemoryEngine,
};
pub use error::{EngineError, RunnerError};
pub use reload::CodeSource;
pub use runner::{ModRunner, ReloadOutcome, RunnerStatus};
pub use scripting::{Game, ScriptLogEntry, TrustLevel};
