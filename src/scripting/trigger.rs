/// `scripting/trigger.rs` — engine events mapped to mod callbacks
///
/// Single translation table: every `EngineEvent` either feeds `tick(game)`,
/// becomes an `event(evt, game)` payload, or is an engine log line that never
/// reaches the mod.
use serde_json::json;

use crate::engine::EngineEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum Route<'a> {
    Tick,
    Event(serde_json::Value),
    EngineLog(&'a str),
    EngineError(&'a str),
}

/// The `name` a mod sees in `evt.name`, if the event reaches `event()`.
pub fn event_name(event: &EngineEvent) -> Option<&'static str> {
    let name = match event {
        EngineEvent::Started { .. } => "mod_started",
        EngineEvent::Stopped => "mod_stopped",
        EngineEvent::ShipSpawned { .. } | EngineEvent::ShipRespawned { .. } => "ship_spawned",
        EngineEvent::ShipDestroyed { .. } => "ship_destroyed",
        EngineEvent::ShipDisconnected { .. } => "ship_disconnected",
        EngineEvent::AlienCreated { .. } => "alien_created",
        EngineEvent::AlienDestroyed { .. } => "alien_destroyed",
        EngineEvent::AsteroidCreated { .. } => "asteroid_created",
        EngineEvent::AsteroidDestroyed { .. } => "asteroid_destroyed",
        EngineEvent::CollectibleCreated { .. } => "collectible_created",
        EngineEvent::CollectiblePicked { .. } => "collectible_picked",
        EngineEvent::StationDestroyed { .. } => "station_destroyed",
        EngineEvent::StationModuleDestroyed { .. } => "station_module_destroyed",
        EngineEvent::StationModuleRepaired { .. } => "station_module_repaired",
        EngineEvent::UiComponentClicked { .. } => "ui_component_clicked",
        EngineEvent::Tick { .. } | EngineEvent::Log { .. } | EngineEvent::Error { .. } => {
            return None
        }
    };
    Some(name)
}

pub fn route(event: &EngineEvent) -> Route<'_> {
    match event {
        EngineEvent::Tick { .. } => return Route::Tick,
        EngineEvent::Log { message } => return Route::EngineLog(message),
        EngineEvent::Error { message } => return Route::EngineError(message),
        _ => {}
    }
    let name = event_name(event).unwrap_or("unknown");
    let payload = match event {
        EngineEvent::Started { link } => json!({ "name": name, "link": link }),
        EngineEvent::ShipSpawned { ship }
        | EngineEvent::ShipRespawned { ship }
        | EngineEvent::ShipDisconnected { ship } => json!({ "name": name, "ship": ship }),
        EngineEvent::ShipDestroyed { ship, killer } => {
            json!({ "name": name, "ship": ship, "killer": killer })
        }
        EngineEvent::AlienCreated { alien } => json!({ "name": name, "alien": alien }),
        EngineEvent::AlienDestroyed { alien, killer } => {
            json!({ "name": name, "alien": alien, "killer": killer })
        }
        EngineEvent::AsteroidCreated { asteroid } => json!({ "name": name, "asteroid": asteroid }),
        EngineEvent::AsteroidDestroyed { asteroid, killer } => {
            json!({ "name": name, "asteroid": asteroid, "killer": killer })
        }
        EngineEvent::CollectibleCreated { collectible } => {
            json!({ "name": name, "collectible": collectible })
        }
        EngineEvent::CollectiblePicked { collectible, ship } => {
            json!({ "name": name, "collectible": collectible, "ship": ship })
        }
        EngineEvent::StationDestroyed { station } => json!({ "name": name, "station": station }),
        EngineEvent::StationModuleDestroyed { module }
        | EngineEvent::StationModuleRepaired { module } => {
            json!({ "name": name, "module": module })
        }
        EngineEvent::UiComponentClicked { id, ship } => {
            json!({ "name": name, "id": id, "ship": ship })
        }
        _ => json!({ "name": name }),
    };
    Route::Event(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Entity;

    #[test]
    fn tick_and_log_lines_bypass_the_event_handler() {
        assert_eq!(route(&EngineEvent::Tick { step: 3 }), Route::Tick);
        assert_eq!(
            route(&EngineEvent::Error { message: "bad".into() }),
            Route::EngineError("bad")
        );
        assert_eq!(event_name(&EngineEvent::Log { message: "x".into() }), None);
    }

    #[test]
    fn respawn_is_reported_as_spawn() {
        let ship = Entity::new(1).spawned(true);
        let Route::Event(payload) = route(&EngineEvent::ShipRespawned { ship }) else {
            panic!("expected event route");
        };
        assert_eq!(payload["name"], "ship_spawned");
        assert_eq!(payload["ship"]["id"], 1);
    }

    #[test]
    fn destroy_payload_carries_killer_or_null() {
        let event = EngineEvent::AlienDestroyed {
            alien: Entity::new(8).spawned(false),
            killer: None,
        };
        let Route::Event(payload) = route(&event) else {
            panic!("expected event route");
        };
        assert_eq!(payload["name"], "alien_destroyed");
        assert!(payload["killer"].is_null());
    }

    #[test]
    fn stop_payload_only_has_a_name() {
        assert_eq!(
            route(&EngineEvent::Stopped),
            Route::Event(json!({ "name": "mod_stopped" }))
        );
    }

    #[test]
    fn ui_click_carries_component_id() {
        let event = EngineEvent::UiComponentClicked {
            id: "shop".into(),
            ship: Entity::new(2).spawned(true),
        };
        let Route::Event(payload) = route(&event) else {
            panic!("expected event route");
        };
        assert_eq!(payload["id"], "shop");
    }
}
