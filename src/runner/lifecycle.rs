/// `runner/lifecycle.rs` — state owned by one `ModRunner`
///
/// Everything here sits behind a single async mutex. Whoever holds it (a host
/// call, the dispatcher or the watch timer) runs alone, so reloads never overlap
/// and a handler never sees a half-built context.
use std::sync::{Arc, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use super::policy::{ErrorPolicy, FaultSite, Verdict};
use crate::config::{RunnerConfig, WatchOptions};
use crate::engine::GameEngine;
use crate::error::{EngineError, RunnerError};
use crate::reload::{
    build_http_client, normalize_interval, ChangeDetector, CodeSource, ReloadScheduler,
};
use crate::scripting::{ExecutionContext, ScriptExecutor, ScriptLog};

/// Last text that executed successfully.
pub struct LoadedCode {
    pub text: String,
    pub source: String,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadOutcome {
    /// The text ran and its context is now current.
    Executed,
    /// Same text as before; nothing ran.
    Unchanged,
    /// Not started yet; the source runs on `start()`.
    Deferred,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunnerStatus {
    pub started: bool,
    pub source: String,
    pub watching: bool,
    pub watch_interval_ms: Option<u64>,
    pub generation: Option<u64>,
    /// Source the current context was loaded from; may differ from `source`
    /// after a load that failed or has not run yet.
    pub loaded_from: Option<String>,
    pub loaded_at: Option<i64>,
    pub last_error: Option<String>,
    pub terminated: Option<String>,
}

pub(crate) struct Lifecycle {
    pub(crate) engine: Arc<dyn GameEngine>,
    pub(crate) config: RunnerConfig,
    http: reqwest::Client,
    source: CodeSource,
    loaded: Option<LoadedCode>,
    pub(crate) context: Option<ExecutionContext>,
    pub(crate) executor: ScriptExecutor,
    detector: ChangeDetector,
    pub(crate) policy: ErrorPolicy,
    pub(crate) scheduler: ReloadScheduler,
    pub(crate) started: bool,
    last_error: Option<String>,
    terminated: watch::Sender<Option<String>>,
}

impl Lifecycle {
    pub(crate) fn new(
        engine: Arc<dyn GameEngine>,
        config: RunnerConfig,
        output: ScriptLog,
        terminated: watch::Sender<Option<String>>,
    ) -> Result<Self, RunnerError> {
        let executor = ScriptExecutor::new(Arc::clone(&engine), config.trust, output)?;
        Ok(Self {
            http: build_http_client(config.fetch_timeout()),
            source: CodeSource::Literal(String::new()),
            loaded: None,
            context: None,
            executor,
            detector: ChangeDetector::new(config.same_code_execution),
            policy: ErrorPolicy::new(config.crash_on_error),
            scheduler: ReloadScheduler::new(),
            started: false,
            last_error: None,
            terminated,
            engine,
            config,
        })
    }

    // ── Loading ───────────────────────────────────────────────────────────

    /// Materialize the active source and, if needed, run it into a new context.
    /// On any error the previous code and context stay current.
    async fn reload(&mut self, forced: bool) -> Result<ReloadOutcome, RunnerError> {
        let text = self.source.materialize(&self.http).await?;
        let previous = self.loaded.as_ref().map(|code| code.text.as_str());
        if !self
            .detector
            .should_execute(&text, previous, forced, self.started)
        {
            log::debug!("Mod from {} unchanged, not re-executing", self.source);
            return Ok(ReloadOutcome::Unchanged);
        }

        let context = self
            .executor
            .execute(&text, &self.source.chunk_name())
            .await?;
        log::info!(
            "Loaded mod from {} (generation {})",
            self.source,
            context.generation()
        );
        self.loaded = Some(LoadedCode {
            text,
            source: self.source.to_string(),
            loaded_at: Utc::now(),
        });
        self.context = Some(context);
        self.last_error = None;
        Ok(ReloadOutcome::Executed)
    }

    /// Reload on behalf of a host call: every error goes back to the caller,
    /// mod faults additionally follow the crash-on-error policy.
    pub(crate) async fn explicit_reload(
        &mut self,
        forced: bool,
    ) -> Result<ReloadOutcome, RunnerError> {
        match self.reload(forced).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.last_error = Some(err.to_string());
                if self.policy.judge(FaultSite::Load, &err) == Verdict::Terminate {
                    self.terminate(err.to_string()).await;
                }
                Err(err)
            }
        }
    }

    /// Watch timer entry point. Failures are logged and the cadence continues.
    pub(crate) async fn poll(&mut self) {
        if !self.started {
            return;
        }
        match self.reload(false).await {
            Ok(ReloadOutcome::Executed) => log::info!("Watched mod changed, reloaded"),
            Ok(_) => {}
            Err(err) => {
                self.last_error = Some(err.to_string());
                if self.policy.judge(FaultSite::Poll, &err) == Verdict::Terminate {
                    self.terminate(err.to_string()).await;
                }
            }
        }
    }

    pub(crate) async fn set_source(
        &mut self,
        source: CodeSource,
        watch: WatchOptions,
        me: Weak<Mutex<Lifecycle>>,
    ) -> Result<ReloadOutcome, RunnerError> {
        self.scheduler.disable();
        log::info!("Mod source set to {source}");
        self.source = source;

        let result = if self.started {
            self.explicit_reload(false).await
        } else {
            Ok(ReloadOutcome::Deferred)
        };

        let fatal = result.is_err() && self.is_terminated();
        if watch.enabled && !fatal {
            self.enable_watch(watch.interval_ms, me);
        }
        result
    }

    // ── Watch ─────────────────────────────────────────────────────────────

    pub(crate) fn enable_watch(&mut self, interval_ms: f64, me: Weak<Mutex<Lifecycle>>) -> bool {
        if !self.source.is_watchable() {
            log::warn!("Not watching {}: it cannot change on its own", self.source);
            return false;
        }
        let period = normalize_interval(interval_ms, self.config.default_watch_interval_ms);
        self.scheduler.enable(period, move || {
            let me = me.clone();
            async move {
                let Some(lifecycle) = me.upgrade() else {
                    return false;
                };
                lifecycle.lock().await.poll().await;
                true
            }
        });
        log::info!("Watching {} every {} ms", self.source, period.as_millis());
        true
    }

    pub(crate) fn disable_watch(&mut self) {
        self.scheduler.disable();
    }

    // ── Session ───────────────────────────────────────────────────────────

    pub(crate) async fn start(&mut self) -> Result<String, RunnerError> {
        if self.started {
            return Err(EngineError::AlreadyRunning.into());
        }
        if let Err(err) = self.reload(false).await {
            self.last_error = Some(err.to_string());
            log::error!("Mod failed to load, session not started: {err}");
            return Err(err);
        }

        if !self.engine.is_started() {
            self.engine
                .custom()
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        let options = self
            .context
            .as_ref()
            .and_then(|ctx| ctx.options().cloned())
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        self.engine.set_options(options)?;

        let link = self.engine.start().await?;
        self.started = true;
        self.terminated.send_replace(None);
        Ok(link)
    }

    pub(crate) async fn stop(&mut self) -> Result<(), RunnerError> {
        self.scheduler.disable();
        self.started = false;
        self.engine.stop().await?;
        Ok(())
    }

    /// Crash-on-error path: stop the engine and tell whoever waits on it.
    pub(crate) async fn terminate(&mut self, reason: String) {
        self.started = false;
        if self.engine.is_started() {
            if let Err(e) = self.engine.stop().await {
                log::warn!("Engine stop after fatal mod error failed: {e}");
            }
        }
        self.terminated.send_replace(Some(reason));
        // Last: when called from the watch timer this cancels the running task.
        self.scheduler.disable();
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.borrow().is_some()
    }

    pub(crate) fn status(&self) -> RunnerStatus {
        RunnerStatus {
            started: self.started,
            source: self.source.to_string(),
            watching: self.scheduler.is_active(),
            watch_interval_ms: self.scheduler.period().map(|p| p.as_millis() as u64),
            generation: self.context.as_ref().map(ExecutionContext::generation),
            loaded_from: self.loaded.as_ref().map(|code| code.source.clone()),
            loaded_at: self.loaded.as_ref().map(|code| code.loaded_at.timestamp()),
            last_error: self.last_error.clone(),
            terminated: self.terminated.borrow().clone(),
        }
    }
}
