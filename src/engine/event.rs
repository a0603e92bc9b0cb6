/// `engine/event.rs` — occurrences emitted by the game session
use serde::{Deserialize, Serialize};

use super::Entity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Started { link: String },
    Stopped,
    /// One simulation step.
    Tick { step: u64 },
    ShipSpawned { ship: Entity },
    ShipRespawned { ship: Entity },
    ShipDestroyed { ship: Entity, killer: Option<Entity> },
    ShipDisconnected { ship: Entity },
    AlienCreated { alien: Entity },
    AlienDestroyed { alien: Entity, killer: Option<Entity> },
    AsteroidCreated { asteroid: Entity },
    AsteroidDestroyed { asteroid: Entity, killer: Option<Entity> },
    CollectibleCreated { collectible: Entity },
    CollectiblePicked { collectible: Entity, ship: Entity },
    StationDestroyed { station: Entity },
    StationModuleDestroyed { module: Entity },
    StationModuleRepaired { module: Entity },
    UiComponentClicked { id: String, ship: Entity },
    /// In-game log line.
    Log { message: String },
    /// In-game error, e.g. a malformed command.
    Error { message: String },
}
