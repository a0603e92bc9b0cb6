/// `runner/` — the host-facing mod lifecycle
///
/// `ModRunner` owns one engine subscription, one Lua VM and at most one watch
/// timer. All of its async methods queue behind the same lock as event dispatch.
mod dispatcher;
pub mod lifecycle;
pub mod policy;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::{RunnerConfig, WatchOptions};
use crate::engine::GameEngine;
use crate::error::RunnerError;
use crate::reload::CodeSource;
use crate::scripting::{Game, ScriptLog, ScriptLogEntry};

use lifecycle::Lifecycle;
pub use lifecycle::{ReloadOutcome, RunnerStatus};
pub use policy::{ErrorPolicy, FaultSite, Verdict};

pub struct ModRunner {
    engine: Arc<dyn GameEngine>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    dispatcher: JoinHandle<()>,
    game: Game,
    output: ScriptLog,
    terminated: watch::Receiver<Option<String>>,
}

impl ModRunner {
    /// Attach a runner to `engine`. Must be called inside a Tokio runtime:
    /// the event dispatcher is spawned immediately.
    pub fn new(engine: Arc<dyn GameEngine>, config: RunnerConfig) -> Result<Self, RunnerError> {
        let output = ScriptLog::new(config.script_log_capacity);
        let (terminated_tx, terminated) = watch::channel(None);
        let lifecycle = Lifecycle::new(Arc::clone(&engine), config, output.clone(), terminated_tx)?;
        let game = lifecycle.executor.game().clone();
        let lifecycle = Arc::new(Mutex::new(lifecycle));
        let dispatcher = dispatcher::spawn(Arc::downgrade(&lifecycle), engine.subscribe());

        Ok(Self {
            engine,
            lifecycle,
            dispatcher,
            game,
            output,
            terminated,
        })
    }

    // ── Sources ───────────────────────────────────────────────────────────

    pub async fn load_from_string(
        &self,
        text: impl Into<String>,
    ) -> Result<ReloadOutcome, RunnerError> {
        self.set_source(CodeSource::Literal(text.into()), WatchOptions::disabled())
            .await
    }

    pub async fn load_from_local_file(
        &self,
        path: impl Into<PathBuf>,
        watch: WatchOptions,
    ) -> Result<ReloadOutcome, RunnerError> {
        self.set_source(CodeSource::LocalFile(path.into()), watch).await
    }

    pub async fn load_from_remote_url(
        &self,
        url: impl Into<String>,
        watch: WatchOptions,
    ) -> Result<ReloadOutcome, RunnerError> {
        self.set_source(CodeSource::RemoteUrl(url.into()), watch).await
    }

    async fn set_source(
        &self,
        source: CodeSource,
        watch: WatchOptions,
    ) -> Result<ReloadOutcome, RunnerError> {
        let me = Arc::downgrade(&self.lifecycle);
        self.lifecycle.lock().await.set_source(source, watch, me).await
    }

    /// Re-materialize and re-run the current source even if its text is unchanged.
    pub async fn reload(&self) -> Result<ReloadOutcome, RunnerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.started {
            return Ok(ReloadOutcome::Deferred);
        }
        lifecycle.explicit_reload(true).await
    }

    // ── Watch ─────────────────────────────────────────────────────────────

    /// Poll the current file/URL source every `interval_ms`. Returns `false`
    /// for literal sources, which are never watched.
    pub async fn enable_watch(&self, interval_ms: f64) -> bool {
        let me = Arc::downgrade(&self.lifecycle);
        self.lifecycle.lock().await.enable_watch(interval_ms, me)
    }

    pub async fn disable_watch(&self) {
        self.lifecycle.lock().await.disable_watch();
    }

    // ── Session ───────────────────────────────────────────────────────────

    /// Load the mod, seed the session options from it and start the engine.
    /// Resolves with the session link.
    pub async fn start(&self) -> Result<String, RunnerError> {
        self.lifecycle.lock().await.start().await
    }

    pub async fn stop(&self) -> Result<(), RunnerError> {
        self.lifecycle.lock().await.stop().await
    }

    pub fn set_region(&self, region: &str) -> Result<(), RunnerError> {
        Ok(self.engine.set_region(region)?)
    }

    pub fn set_ecp_key(&self, key: &str) -> Result<(), RunnerError> {
        Ok(self.engine.set_ecp_key(key)?)
    }

    // ── Introspection ─────────────────────────────────────────────────────

    /// The `game` object mods receive; its commands work even before a load.
    pub fn facade(&self) -> &Game {
        &self.game
    }

    pub fn engine(&self) -> &Arc<dyn GameEngine> {
        &self.engine
    }

    /// Whether the current mod defines a callable `name` (`tick`, `event`).
    pub async fn has_handler(&self, name: &str) -> bool {
        let lifecycle = self.lifecycle.lock().await;
        lifecycle
            .context
            .as_ref()
            .is_some_and(|ctx| ctx.has_handler(name))
    }

    pub async fn status(&self) -> RunnerStatus {
        self.lifecycle.lock().await.status()
    }

    /// Last `limit` lines of mod output, oldest first.
    pub fn script_log(&self, limit: usize) -> Vec<ScriptLogEntry> {
        self.output.tail(limit)
    }

    /// Reason the session was torn down by a fault, if it was.
    pub fn termination(&self) -> Option<String> {
        self.terminated.borrow().clone()
    }

    /// Resolves once a fault tears the session down under crash-on-error.
    pub async fn terminated(&self) -> RunnerError {
        let mut rx = self.terminated.clone();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return RunnerError::Terminated(reason);
            }
            if rx.changed().await.is_err() {
                return RunnerError::Terminated("mod runner dropped".to_string());
            }
        }
    }
}

impl Drop for ModRunner {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
