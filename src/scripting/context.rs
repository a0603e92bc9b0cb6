/// `scripting/context.rs` — building and calling into a loaded mod
///
/// One Lua VM lives for the whole runner. Each successful load gets its own
/// environment table, which is the mod's top-level scope and also its callback
/// table (`tick`, `event`, `options`). A failed load never replaces the previous
/// environment.
use std::sync::Arc;

use mlua::{AnyUserData, Function, Lua, Table, Value};

use super::api::{json_to_lua_value, lua_value_to_json, register_output, Game, ScriptLog};
use super::sandbox::{create_sandboxed_vm, TrustLevel};
use crate::engine::GameEngine;
use crate::error::RunnerError;

/// Result of running a mod once: the scope its callbacks live in.
pub struct ExecutionContext {
    env: Table,
    game: AnyUserData,
    options: Option<serde_json::Value>,
    generation: u64,
}

impl ExecutionContext {
    /// `options` as declared by the mod at load time, if any.
    pub fn options(&self) -> Option<&serde_json::Value> {
        self.options.as_ref()
    }

    /// Increases by one with every successful load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_handler(&self, name: &str) -> bool {
        matches!(self.env.raw_get::<Value>(name), Ok(Value::Function(_)))
    }

    /// Invoke `tick(game)`; a mod without one is a no-op.
    pub fn call_tick(&self) -> mlua::Result<()> {
        match self.handler("tick")? {
            Some(tick) => tick.call::<()>(self.game.clone()),
            None => Ok(()),
        }
    }

    /// Invoke `event(evt, game)` with `payload` converted to a Lua table.
    pub fn call_event(&self, lua: &Lua, payload: &serde_json::Value) -> mlua::Result<()> {
        match self.handler("event")? {
            Some(event) => {
                let evt = json_to_lua_value(lua, payload)?;
                event.call::<()>((evt, self.game.clone()))
            }
            None => Ok(()),
        }
    }

    /// Looked up on every call so a mod may swap its handlers at runtime.
    fn handler(&self, name: &str) -> mlua::Result<Option<Function>> {
        match self.env.raw_get::<Value>(name)? {
            Value::Nil => Ok(None),
            Value::Function(f) => Ok(Some(f)),
            other => Err(mlua::Error::runtime(format!(
                "`{name}` is a {} value, not a function",
                other.type_name()
            ))),
        }
    }
}

pub struct ScriptExecutor {
    lua: Lua,
    game: Game,
    output: ScriptLog,
    generation: u64,
}

impl ScriptExecutor {
    pub fn new(
        engine: Arc<dyn GameEngine>,
        trust: TrustLevel,
        output: ScriptLog,
    ) -> Result<Self, RunnerError> {
        Ok(Self {
            lua: create_sandboxed_vm(trust)?,
            game: Game::new(engine),
            output,
            generation: 0,
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// The facade, usable before any mod has loaded.
    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn output(&self) -> &ScriptLog {
        &self.output
    }

    /// Run `text` once in a fresh scope and hand back the populated context.
    pub async fn execute(
        &mut self,
        text: &str,
        chunk_name: &str,
    ) -> Result<ExecutionContext, RunnerError> {
        let env = self.fresh_environment()?;
        let game = self.lua.create_userdata(self.game.clone())?;
        env.raw_set("game", game.clone())?;

        self.lua
            .load(text)
            .set_name(chunk_name)
            .set_environment(env.clone())
            .exec_async()
            .await?;

        let options = match env.raw_get::<Value>("options")? {
            Value::Nil => None,
            value @ Value::Table(_) => Some(lua_value_to_json(value)?),
            other => {
                return Err(RunnerError::Script(mlua::Error::runtime(format!(
                    "`options` must be a table, got {}",
                    other.type_name()
                ))))
            }
        };

        self.generation += 1;
        Ok(ExecutionContext {
            env,
            game,
            options,
            generation: self.generation,
        })
    }

    /// Scope for one load: `game`, `print` and `log` are the only names the host
    /// supplies; everything else falls through to the sandboxed globals.
    fn fresh_environment(&self) -> Result<Table, RunnerError> {
        let env = self.lua.create_table()?;
        let meta = self.lua.create_table()?;
        meta.raw_set("__index", self.lua.globals())?;
        env.set_metatable(Some(meta));
        register_output(&self.lua, &env, &self.output)?;
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCommand, InMemoryEngine};
    use serde_json::json;

    fn executor() -> (Arc<InMemoryEngine>, ScriptExecutor) {
        let engine = Arc::new(InMemoryEngine::new());
        let exec = ScriptExecutor::new(engine.clone(), TrustLevel::Basic, ScriptLog::new(50))
            .unwrap();
        (engine, exec)
    }

    #[tokio::test]
    async fn top_level_definitions_become_callbacks() {
        let (engine, mut exec) = executor();
        let ctx = exec
            .execute(
                r#"
                options = { map_size = 40, friendly_colors = 2 }
                function tick(g) g:setCustomMap("x") end
                "#,
                "=test",
            )
            .await
            .unwrap();

        assert!(ctx.has_handler("tick"));
        assert!(!ctx.has_handler("event"));
        assert_eq!(ctx.options(), Some(&json!({ "map_size": 40, "friendly_colors": 2 })));
        assert_eq!(ctx.generation(), 1);

        ctx.call_tick().unwrap();
        assert_eq!(
            engine.commands(),
            vec![EngineCommand::SetCustomMap { map: json!("x") }]
        );
    }

    #[tokio::test]
    async fn contexts_do_not_share_scope() {
        let (_, mut exec) = executor();
        let first = exec.execute("counter = 1", "=a").await.unwrap();
        let second = exec.execute("function tick() end", "=b").await.unwrap();

        assert!(!first.has_handler("tick"));
        assert!(second.has_handler("tick"));
        assert_eq!(second.generation(), 2);
        let leaked: Value = second.env.raw_get("counter").unwrap();
        assert!(leaked.is_nil());
    }

    #[tokio::test]
    async fn event_handler_receives_payload_and_game() {
        let (engine, mut exec) = executor();
        let ctx = exec
            .execute(
                "function event(evt, g) if evt.name == 'mod_started' then g:echo(evt.link) end end",
                "=test",
            )
            .await
            .unwrap();
        ctx.call_event(
            exec.lua(),
            &json!({ "name": "mod_started", "link": "https://example/#1" }),
        )
        .unwrap();
        assert_eq!(
            engine.commands(),
            vec![EngineCommand::Log {
                message: "https://example/#1".into()
            }]
        );
    }

    #[tokio::test]
    async fn runtime_errors_surface_as_script_errors() {
        let (_, mut exec) = executor();
        let err = exec.execute("error('boom')", "=broken").await.err().unwrap();
        assert!(matches!(err, RunnerError::Script(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn syntax_errors_do_not_bump_the_generation() {
        let (_, mut exec) = executor();
        assert!(exec.execute("function (", "=broken").await.is_err());
        let ctx = exec.execute("", "=ok").await.unwrap();
        assert_eq!(ctx.generation(), 1);
    }

    #[tokio::test]
    async fn non_function_handler_is_an_error() {
        let (_, mut exec) = executor();
        let ctx = exec.execute("tick = 5", "=test").await.unwrap();
        assert!(ctx.call_tick().is_err());
    }

    #[tokio::test]
    async fn host_globals_are_not_reachable() {
        let (_, mut exec) = executor();
        let ctx = exec
            .execute("has_io = io ~= nil; has_math = math ~= nil", "=test")
            .await
            .unwrap();
        assert_eq!(ctx.env.raw_get::<bool>("has_io").unwrap(), false);
        assert_eq!(ctx.env.raw_get::<bool>("has_math").unwrap(), true);
    }

    #[tokio::test]
    async fn print_goes_to_the_output_sink() {
        let (_, mut exec) = executor();
        exec.execute("print('loaded', 2)", "=test").await.unwrap();
        let lines = exec.output().tail(5);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].message, "loaded\t2");
    }
}
