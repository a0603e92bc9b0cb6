/// `engine/` — boundary to the game session a mod runs against
///
/// The runner never talks to the game server directly. Everything goes through
/// `GameEngine`: entity snapshots, fire-and-forget commands, the shared `custom`
/// store and one event subscription per dispatcher.
pub mod event;
pub mod memory;

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::EngineError;

pub use event::EngineEvent;
pub use memory::{EngineCommand, InMemoryEngine};

/// Engine-owned key/value bag exposed to scripts as `game.custom`.
/// Lives as long as the engine, so it survives every context rebuild.
pub type CustomStore = Arc<Mutex<serde_json::Map<String, serde_json::Value>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ship,
    Alien,
    Asteroid,
    Collectible,
    Team,
    Station,
}

impl EntityKind {
    /// Kinds whose collection views hide spawned-but-inactive entities.
    pub fn is_lifecycle_filtered(self) -> bool {
        matches!(
            self,
            EntityKind::Ship | EntityKind::Alien | EntityKind::Asteroid | EntityKind::Collectible
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Ship => "ship",
            EntityKind::Alien => "alien",
            EntityKind::Asteroid => "asteroid",
            EntityKind::Collectible => "collectible",
            EntityKind::Team => "team",
            EntityKind::Station => "station",
        };
        f.write_str(name)
    }
}

/// Snapshot of one game object as the engine currently knows it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: i64,
    /// The server has acknowledged the object.
    pub spawned: bool,
    /// The object is alive (not mid-destruction).
    pub active: bool,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Entity {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            spawned: false,
            active: false,
            attributes: serde_json::Map::new(),
        }
    }

    pub fn spawned(mut self, active: bool) -> Self {
        self.spawned = true;
        self.active = active;
        self
    }

    pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Inclusion rule for collection views: not yet spawned, or spawned and alive.
    pub fn is_listed(&self) -> bool {
        !self.spawned || self.active
    }
}

/// The simulation a mod is attached to.
///
/// Command methods are fire-and-forget: they queue the command and return
/// immediately, reporting only commands the engine refuses outright.
#[async_trait]
pub trait GameEngine: Send + Sync {
    /// Every known entity of `kind`, in insertion order, unfiltered.
    fn entities(&self, kind: EntityKind) -> Vec<Entity>;

    fn find(&self, kind: EntityKind, id: i64) -> Option<Entity>;

    fn add(&self, kind: EntityKind, spec: serde_json::Value) -> Result<(), EngineError>;

    fn set_ui_component(&self, component: serde_json::Value) -> Result<(), EngineError>;

    fn set_object(&self, object: serde_json::Value) -> Result<(), EngineError>;

    /// Removes one object, or all of them when `id` is `None`.
    fn remove_object(&self, id: Option<serde_json::Value>) -> Result<(), EngineError>;

    fn set_custom_map(&self, map: serde_json::Value) -> Result<(), EngineError>;

    fn set_open(&self, open: bool) -> Result<(), EngineError>;

    fn set_region(&self, region: &str) -> Result<(), EngineError>;

    fn set_ecp_key(&self, key: &str) -> Result<(), EngineError>;

    fn set_options(&self, options: serde_json::Value) -> Result<(), EngineError>;

    /// Writes to the in-game log (`game:echo`).
    fn log(&self, message: &str);

    fn step(&self) -> u64;

    fn options(&self) -> serde_json::Value;

    fn link(&self) -> Option<String>;

    fn custom(&self) -> CustomStore;

    fn is_started(&self) -> bool;

    /// Opens a new event stream. Each receiver sees every event emitted afterwards.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent>;

    /// Starts the session and resolves with its public link.
    async fn start(&self) -> Result<String, EngineError>;

    async fn stop(&self) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_rule_hides_only_spawned_inactive_entities() {
        assert!(Entity::new(1).is_listed());
        assert!(Entity::new(2).spawned(true).is_listed());
        assert!(!Entity::new(3).spawned(false).is_listed());
    }

    #[test]
    fn entity_attributes_flatten_into_json() {
        let ship = Entity::new(7)
            .spawned(true)
            .with("name", serde_json::json!("pilot"));
        let json = serde_json::to_value(&ship).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "pilot");
        assert_eq!(json["active"], true);
    }
}
