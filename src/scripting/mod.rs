/// `scripting/` — Lua side of the mod runner
///
/// All mods share one sandboxed Lua VM (mlua); every load runs in a fresh scope.
/// The `game` facade is the only bridge from a mod to the engine.
/// Mod errors are caught here and reported as `RunnerError::Script`.
pub mod api;
pub mod context;
pub mod sandbox;
pub mod trigger;

pub use api::{Game, ScriptLog, ScriptLogEntry};
pub use context::{ExecutionContext, ScriptExecutor};
pub use sandbox::TrustLevel;
