/// `engine/memory.rs` — in-process `GameEngine` for dry runs and tests
///
/// Keeps entity tables in memory, records every command it receives and lets the
/// host drive the session by hand (`advance`, `emit`). Nothing leaves the process.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{CustomStore, EngineEvent, Entity, EntityKind, GameEngine};
use crate::error::EngineError;

/// A command as received by the engine, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    Add { kind: EntityKind, spec: serde_json::Value },
    SetUiComponent { component: serde_json::Value },
    SetObject { object: serde_json::Value },
    RemoveObject { id: Option<serde_json::Value> },
    SetCustomMap { map: serde_json::Value },
    SetOpen { open: bool },
    SetRegion { region: String },
    SetEcpKey { key: String },
    SetOptions { options: serde_json::Value },
    Log { message: String },
}

#[derive(Default)]
struct MemoryState {
    entities: HashMap<EntityKind, Vec<Entity>>,
    next_id: i64,
    step: u64,
    options: serde_json::Value,
    link: Option<String>,
    started: bool,
    commands: Vec<EngineCommand>,
    /// When set, every command is refused with this reason.
    reject: Option<String>,
    subscribers: Vec<mpsc::UnboundedSender<EngineEvent>>,
}

pub struct InMemoryEngine {
    state: Mutex<MemoryState>,
    custom: CustomStore,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                options: serde_json::Value::Object(Default::default()),
                ..Default::default()
            }),
            custom: Arc::new(Mutex::new(serde_json::Map::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcast an event to every live subscriber.
    pub fn emit(&self, event: EngineEvent) {
        let mut state = self.lock();
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Run one simulation step and emit its tick.
    pub fn advance(&self) -> u64 {
        let step = {
            let mut state = self.lock();
            state.step += 1;
            state.step
        };
        self.emit(EngineEvent::Tick { step });
        step
    }

    /// Place an entity as if the server had reported it.
    pub fn insert(&self, kind: EntityKind, entity: Entity) {
        let mut state = self.lock();
        state.next_id = state.next_id.max(entity.id + 1);
        state.entities.entry(kind).or_default().push(entity);
    }

    pub fn commands(&self) -> Vec<EngineCommand> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Refuse all further commands (`None` accepts them again).
    pub fn reject_commands(&self, reason: Option<&str>) {
        self.lock().reject = reason.map(str::to_string);
    }

    fn record(&self, name: &str, command: EngineCommand) -> Result<(), EngineError> {
        let mut state = self.lock();
        if let Some(reason) = &state.reject {
            return Err(EngineError::Rejected {
                command: name.to_string(),
                reason: reason.clone(),
            });
        }
        state.commands.push(command);
        Ok(())
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameEngine for InMemoryEngine {
    fn entities(&self, kind: EntityKind) -> Vec<Entity> {
        self.lock().entities.get(&kind).cloned().unwrap_or_default()
    }

    fn find(&self, kind: EntityKind, id: i64) -> Option<Entity> {
        self.lock()
            .entities
            .get(&kind)
            .and_then(|list| list.iter().find(|e| e.id == id).cloned())
    }

    fn add(&self, kind: EntityKind, spec: serde_json::Value) -> Result<(), EngineError> {
        self.record(
            "add",
            EngineCommand::Add {
                kind,
                spec: spec.clone(),
            },
        )?;
        let mut state = self.lock();
        let mut entity = Entity::new(state.next_id);
        state.next_id += 1;
        if let serde_json::Value::Object(fields) = spec {
            for (key, value) in fields {
                if !matches!(key.as_str(), "id" | "spawned" | "active") {
                    entity.attributes.insert(key, value);
                }
            }
        }
        state.entities.entry(kind).or_default().push(entity);
        Ok(())
    }

    fn set_ui_component(&self, component: serde_json::Value) -> Result<(), EngineError> {
        self.record("setUIComponent", EngineCommand::SetUiComponent { component })
    }

    fn set_object(&self, object: serde_json::Value) -> Result<(), EngineError> {
        self.record("setObject", EngineCommand::SetObject { object })
    }

    fn remove_object(&self, id: Option<serde_json::Value>) -> Result<(), EngineError> {
        self.record("removeObject", EngineCommand::RemoveObject { id })
    }

    fn set_custom_map(&self, map: serde_json::Value) -> Result<(), EngineError> {
        self.record("setCustomMap", EngineCommand::SetCustomMap { map })
    }

    fn set_open(&self, open: bool) -> Result<(), EngineError> {
        self.record("setOpen", EngineCommand::SetOpen { open })
    }

    fn set_region(&self, region: &str) -> Result<(), EngineError> {
        self.record(
            "setRegion",
            EngineCommand::SetRegion {
                region: region.to_string(),
            },
        )
    }

    fn set_ecp_key(&self, key: &str) -> Result<(), EngineError> {
        self.record(
            "setECPKey",
            EngineCommand::SetEcpKey {
                key: key.to_string(),
            },
        )
    }

    fn set_options(&self, options: serde_json::Value) -> Result<(), EngineError> {
        self.record(
            "setOptions",
            EngineCommand::SetOptions {
                options: options.clone(),
            },
        )?;
        self.lock().options = options;
        Ok(())
    }

    fn log(&self, message: &str) {
        log::info!("In-game echo: {message}");
        self.lock().commands.push(EngineCommand::Log {
            message: message.to_string(),
        });
    }

    fn step(&self) -> u64 {
        self.lock().step
    }

    fn options(&self) -> serde_json::Value {
        self.lock().options.clone()
    }

    fn link(&self) -> Option<String> {
        self.lock().link.clone()
    }

    fn custom(&self) -> CustomStore {
        Arc::clone(&self.custom)
    }

    fn is_started(&self) -> bool {
        self.lock().started
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    async fn start(&self) -> Result<String, EngineError> {
        let link = {
            let mut state = self.lock();
            if state.started {
                return Err(EngineError::AlreadyRunning);
            }
            state.started = true;
            state.step = 0;
            let link = "https://starblast.io/#local@in-memory".to_string();
            state.link = Some(link.clone());
            link
        };
        self.emit(EngineEvent::Started { link: link.clone() });
        Ok(link)
    }

    async fn stop(&self) -> Result<(), EngineError> {
        {
            let mut state = self.lock();
            if !state.started {
                return Err(EngineError::NotRunning);
            }
            state.started = false;
        }
        self.emit(EngineEvent::Stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_appends_unspawned_entity_with_fresh_id() {
        let engine = InMemoryEngine::new();
        engine.insert(EntityKind::Alien, Entity::new(10).spawned(true));
        engine
            .add(EntityKind::Alien, json!({ "code": 11, "level": 2 }))
            .unwrap();

        let aliens = engine.entities(EntityKind::Alien);
        assert_eq!(aliens.len(), 2);
        let added = aliens.last().unwrap();
        assert_eq!(added.id, 11);
        assert!(!added.spawned);
        assert_eq!(added.attributes["level"], json!(2));
    }

    #[test]
    fn rejected_commands_are_not_recorded() {
        let engine = InMemoryEngine::new();
        engine.reject_commands(Some("malformed"));
        let err = engine.set_open(false).unwrap_err();
        assert!(matches!(err, EngineError::Rejected { .. }));
        assert!(engine.commands().is_empty());
    }

    #[tokio::test]
    async fn start_and_stop_emit_lifecycle_events() {
        let engine = InMemoryEngine::new();
        let mut rx = engine.subscribe();

        let link = engine.start().await.unwrap();
        assert_eq!(engine.link().as_deref(), Some(link.as_str()));
        assert_eq!(engine.advance(), 1);
        engine.stop().await.unwrap();

        assert_eq!(rx.recv().await, Some(EngineEvent::Started { link }));
        assert_eq!(rx.recv().await, Some(EngineEvent::Tick { step: 1 }));
        assert_eq!(rx.recv().await, Some(EngineEvent::Stopped));
        assert_eq!(engine.stop().await, Err(EngineError::NotRunning));
    }
}
