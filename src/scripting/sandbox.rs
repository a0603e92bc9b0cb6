/// `scripting/sandbox.rs` — Lua VM construction per trust level
///
/// The VM only ever receives the libraries listed here. Dangerous libraries
/// (os, io, package) are left out unless the runner is configured as elevated;
/// `debug` is never loaded.
use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};
use serde::{Deserialize, Serialize};

/// Controls which Lua standard libraries are available to a mod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// string, table, math, utf8, coroutine — no I/O or OS
    #[default]
    Basic,
    /// Adds io, os and package — only for mods the host fully trusts
    Elevated,
}

impl TrustLevel {
    fn libs(self) -> StdLib {
        let basic =
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE;
        match self {
            TrustLevel::Basic => basic,
            TrustLevel::Elevated => basic | StdLib::IO | StdLib::OS | StdLib::PACKAGE,
        }
    }
}

/// Creates a new Lua VM with sandbox restrictions applied.
pub fn create_sandboxed_vm(trust: TrustLevel) -> LuaResult<Lua> {
    Lua::new_with(trust.libs(), LuaOptions::default())
}
