/// `runner/dispatcher.rs` — feeds engine events into the current mod
///
/// One Tokio task per runner drains the engine subscription in arrival order.
/// Each event is handled under the lifecycle lock, so events that arrive while
/// a reload is running wait in the channel and reach the new context.
use std::sync::Weak;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::lifecycle::Lifecycle;
use super::policy::{FaultSite, Verdict};
use crate::engine::EngineEvent;
use crate::error::RunnerError;
use crate::scripting::trigger::{self, Route};

pub(crate) fn spawn(
    lifecycle: Weak<Mutex<Lifecycle>>,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(lifecycle) = lifecycle.upgrade() else {
                break;
            };
            lifecycle.lock().await.dispatch(event).await;
        }
        log::debug!("Event dispatcher finished");
    })
}

impl Lifecycle {
    pub(crate) async fn dispatch(&mut self, event: EngineEvent) {
        match &event {
            EngineEvent::Started { link } => log::info!("Mod started\n{link}"),
            EngineEvent::Stopped => {
                log::info!("Mod stopped");
                self.started = false;
                self.disable_watch();
            }
            _ => {}
        }

        let (site, result) = match trigger::route(&event) {
            Route::EngineLog(message) => {
                if self.config.log_engine_messages {
                    log::info!("In-game log: {message}");
                }
                return;
            }
            Route::EngineError(message) => {
                if self.config.log_engine_messages {
                    log::error!("In-game error: {message}");
                }
                return;
            }
            Route::Tick => {
                let Some(ctx) = &self.context else {
                    return;
                };
                (FaultSite::Tick, ctx.call_tick())
            }
            Route::Event(payload) => {
                let name = trigger::event_name(&event).unwrap_or("unknown");
                let Some(ctx) = &self.context else {
                    log::debug!("No mod loaded, dropping {name}");
                    return;
                };
                (
                    FaultSite::Event(name),
                    ctx.call_event(self.executor.lua(), &payload),
                )
            }
        };

        if let Err(err) = result {
            let err = RunnerError::Script(err);
            if self.policy.judge(site, &err) == Verdict::Terminate {
                self.terminate(err.to_string()).await;
            }
        }
    }
}
