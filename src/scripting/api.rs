/// `scripting/api.rs` — the `game` object and output sink handed to a mod
///
/// `Game` is usable from Rust (host introspection) and from Lua (registered as
/// userdata). Collection fields are rebuilt from the engine on every access;
/// nothing is cached between reads.
use std::collections::VecDeque;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mlua::{
    Lua, MetaMethod, Result as LuaResult, Table, UserData, UserDataFields, UserDataMethods,
    Value, Variadic,
};
use serde::Serialize;

use crate::engine::{CustomStore, Entity, EntityKind, GameEngine};
use crate::error::EngineError;

// ── Output sink ───────────────────────────────────────────────────────────────

/// One line of mod output (print / log.* calls).
#[derive(Debug, Clone, Serialize)]
pub struct ScriptLogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: i64,
}

/// Bounded buffer of mod output, shared by every context of one runner.
#[derive(Clone)]
pub struct ScriptLog {
    entries: Arc<Mutex<VecDeque<ScriptLogEntry>>>,
    capacity: usize,
}

impl ScriptLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ScriptLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, level: &str, message: String) {
        match level {
            "warn" => log::warn!("[script] {message}"),
            "error" => log::error!("[script] {message}"),
            _ => log::info!("[script] {message}"),
        }
        let mut entries = self.lock();
        entries.push_back(ScriptLogEntry {
            level: level.to_string(),
            message,
            timestamp: chrono::Utc::now().timestamp(),
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Last `limit` entries, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<ScriptLogEntry> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }
}

/// Install `print` and the `log` table into a mod environment.
pub fn register_output(lua: &Lua, env: &Table, sink: &ScriptLog) -> LuaResult<()> {
    let log_tbl = lua.create_table()?;

    macro_rules! log_fn {
        ($level:literal) => {{
            let sink = sink.clone();
            lua.create_function(move |_, args: Variadic<Value>| {
                sink.push($level, render_args(&args, " ")?);
                Ok(())
            })?
        }};
    }

    log_tbl.set("info", log_fn!("info"))?;
    log_tbl.set("warn", log_fn!("warn"))?;
    log_tbl.set("error", log_fn!("error"))?;
    env.set("log", log_tbl)?;

    let sink = sink.clone();
    let print = lua.create_function(move |_, args: Variadic<Value>| {
        sink.push("info", render_args(&args, "\t")?);
        Ok(())
    })?;
    env.set("print", print)?;
    Ok(())
}

fn render_args(args: &[Value], separator: &str) -> LuaResult<String> {
    let parts = args
        .iter()
        .map(|v| v.to_string())
        .collect::<LuaResult<Vec<_>>>()?;
    Ok(parts.join(separator))
}

// ── game ──────────────────────────────────────────────────────────────────────

/// Facade over the engine: filtered entity views plus the command set.
#[derive(Clone)]
pub struct Game {
    engine: Arc<dyn GameEngine>,
}

impl Game {
    pub fn new(engine: Arc<dyn GameEngine>) -> Self {
        Self { engine }
    }

    /// Entities of `kind` as a mod sees them right now.
    pub fn entities(&self, kind: EntityKind) -> Vec<Entity> {
        let all = self.engine.entities(kind);
        if !kind.is_lifecycle_filtered() {
            return all;
        }
        all.into_iter().filter(Entity::is_listed).collect()
    }

    pub fn find(&self, kind: EntityKind, id: i64) -> Option<Entity> {
        self.engine.find(kind, id)
    }

    /// Queue an entity and return the newest one of that kind in the local view.
    pub fn add(
        &self,
        kind: EntityKind,
        spec: serde_json::Value,
    ) -> Result<Option<Entity>, EngineError> {
        self.engine.add(kind, spec)?;
        Ok(self.engine.entities(kind).pop())
    }

    pub fn set_ui_component(&self, component: serde_json::Value) -> Result<(), EngineError> {
        self.engine.set_ui_component(component)
    }

    pub fn set_object(&self, object: serde_json::Value) -> Result<(), EngineError> {
        self.engine.set_object(object)
    }

    pub fn remove_object(&self, id: Option<serde_json::Value>) -> Result<(), EngineError> {
        self.engine.remove_object(id)
    }

    pub fn set_custom_map(&self, map: serde_json::Value) -> Result<(), EngineError> {
        self.engine.set_custom_map(map)
    }

    pub fn set_open(&self, open: bool) -> Result<(), EngineError> {
        self.engine.set_open(open)
    }

    pub fn echo(&self, message: &str) {
        self.engine.log(message)
    }

    pub fn step(&self) -> u64 {
        self.engine.step()
    }

    pub fn options(&self) -> serde_json::Value {
        self.engine.options()
    }

    pub fn link(&self) -> Option<String> {
        self.engine.link()
    }

    pub fn custom(&self) -> CustomStore {
        self.engine.custom()
    }

    fn collection(&self, lua: &Lua, kind: EntityKind) -> LuaResult<Table> {
        let list = lua.create_table()?;
        for entity in self.entities(kind) {
            list.push(entity_to_lua(lua, &entity)?)?;
        }
        Ok(list)
    }
}

fn optional_entity(lua: &Lua, entity: Option<Entity>) -> LuaResult<Value> {
    match entity {
        Some(entity) => entity_to_lua(lua, &entity),
        None => Ok(Value::Nil),
    }
}

impl UserData for Game {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("ships", |lua, this| this.collection(lua, EntityKind::Ship));
        fields.add_field_method_get("aliens", |lua, this| this.collection(lua, EntityKind::Alien));
        fields.add_field_method_get("asteroids", |lua, this| {
            this.collection(lua, EntityKind::Asteroid)
        });
        fields.add_field_method_get("collectibles", |lua, this| {
            this.collection(lua, EntityKind::Collectible)
        });
        fields.add_field_method_get("teams", |lua, this| this.collection(lua, EntityKind::Team));
        fields.add_field_method_get("stations", |lua, this| {
            this.collection(lua, EntityKind::Station)
        });

        fields.add_field_method_get("step", |_, this| Ok(this.step()));
        fields.add_field_method_get("options", |lua, this| json_to_lua_value(lua, &this.options()));
        fields.add_field_method_get("link", |_, this| Ok(this.link()));

        fields.add_field_method_get("custom", |_, this| Ok(CustomSlot::root(this.custom())));
        fields.add_field_method_set("custom", |_, this, value: Value| {
            let replacement = match value {
                Value::Nil => serde_json::Map::new(),
                Value::Table(_) | Value::UserData(_) => match lua_value_to_json(value)? {
                    serde_json::Value::Object(map) => map,
                    _ => {
                        return Err(mlua::Error::runtime(
                            "game.custom must be a table with string keys",
                        ))
                    }
                },
                other => {
                    return Err(mlua::Error::runtime(format!(
                        "game.custom must be a table, got {}",
                        other.type_name()
                    )))
                }
            };
            *lock_custom(&this.custom()) = replacement;
            Ok(())
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        macro_rules! finder {
            ($name:literal, $kind:expr) => {
                methods.add_method($name, |lua, this, id: i64| {
                    optional_entity(lua, this.find($kind, id))
                });
            };
        }
        finder!("findShip", EntityKind::Ship);
        finder!("findAlien", EntityKind::Alien);
        finder!("findAsteroid", EntityKind::Asteroid);
        finder!("findCollectible", EntityKind::Collectible);
        finder!("findTeam", EntityKind::Team);
        finder!("findStation", EntityKind::Station);

        macro_rules! adder {
            ($name:literal, $kind:expr) => {
                methods.add_method($name, |lua, this, spec: Value| {
                    let added = this
                        .add($kind, lua_value_to_json(spec)?)
                        .map_err(mlua::Error::external)?;
                    optional_entity(lua, added)
                });
            };
        }
        adder!("addAlien", EntityKind::Alien);
        adder!("addAsteroid", EntityKind::Asteroid);
        adder!("addCollectible", EntityKind::Collectible);

        methods.add_method("setUIComponent", |_, this, component: Value| {
            this.set_ui_component(lua_value_to_json(component)?)
                .map_err(mlua::Error::external)
        });
        methods.add_method("setObject", |_, this, object: Value| {
            this.set_object(lua_value_to_json(object)?)
                .map_err(mlua::Error::external)
        });
        methods.add_method("removeObject", |_, this, id: Value| {
            let id = match id {
                Value::Nil => None,
                other => Some(lua_value_to_json(other)?),
            };
            this.remove_object(id).map_err(mlua::Error::external)
        });
        methods.add_method("setCustomMap", |_, this, map: Value| {
            this.set_custom_map(lua_value_to_json(map)?)
                .map_err(mlua::Error::external)
        });
        methods.add_method("setOpen", |_, this, open: bool| {
            this.set_open(open).map_err(mlua::Error::external)
        });
        methods.add_method("echo", |_, this, args: Variadic<Value>| {
            this.echo(&render_args(&args, " ")?);
            Ok(())
        });
    }
}

// ── custom ────────────────────────────────────────────────────────────────────

/// One hop from a container in the custom store to a child.
#[derive(Debug, Clone, PartialEq)]
enum PathStep {
    Key(String),
    /// Zero-based; Lua sees `index + 1`.
    Index(usize),
}

impl PathStep {
    /// Interpret a Lua key against `node`: string keys for objects,
    /// positive integers for arrays.
    fn for_node(node: &serde_json::Value, key: &Value) -> Option<Self> {
        match node {
            serde_json::Value::Object(_) => match key {
                Value::String(s) => Some(PathStep::Key(s.to_string_lossy())),
                Value::Integer(i) => Some(PathStep::Key(i.to_string())),
                Value::Number(n) => Some(PathStep::Key(n.to_string())),
                _ => None,
            },
            serde_json::Value::Array(_) => match key {
                Value::Integer(i) if *i >= 1 => Some(PathStep::Index(*i as usize - 1)),
                _ => None,
            },
            _ => None,
        }
    }

    fn get<'a>(&self, node: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        match (node, self) {
            (serde_json::Value::Object(map), PathStep::Key(key)) => map.get(key),
            (serde_json::Value::Array(list), PathStep::Index(i)) => list.get(*i),
            _ => None,
        }
    }

    fn get_mut<'a>(&self, node: &'a mut serde_json::Value) -> Option<&'a mut serde_json::Value> {
        match (node, self) {
            (serde_json::Value::Object(map), PathStep::Key(key)) => map.get_mut(key),
            (serde_json::Value::Array(list), PathStep::Index(i)) => list.get_mut(*i),
            _ => None,
        }
    }

    fn to_lua(&self, lua: &Lua) -> LuaResult<Value> {
        match self {
            PathStep::Key(key) => Ok(Value::String(lua.create_string(key)?)),
            PathStep::Index(i) => Ok(Value::Integer(*i as i64 + 1)),
        }
    }
}

/// Result of reading one key through a slot.
enum SlotRead {
    Missing,
    Nested,
    Plain(serde_json::Value),
}

/// `game.custom` and every table nested in it. A slot is a path into the
/// engine's store, so reads and writes at any depth hit the live data.
#[derive(Clone)]
pub struct CustomSlot {
    store: CustomStore,
    path: Vec<PathStep>,
}

fn lock_custom(
    store: &CustomStore,
) -> MutexGuard<'_, serde_json::Map<String, serde_json::Value>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` on the store viewed as a JSON object.
fn with_root<R>(store: &CustomStore, f: impl FnOnce(&mut serde_json::Value) -> R) -> R {
    let mut guard = lock_custom(store);
    let mut root = serde_json::Value::Object(std::mem::take(&mut *guard));
    let out = f(&mut root);
    if let serde_json::Value::Object(map) = root {
        *guard = map;
    }
    out
}

impl CustomSlot {
    pub fn root(store: CustomStore) -> Self {
        Self {
            store,
            path: Vec::new(),
        }
    }

    fn child(&self, step: PathStep) -> Self {
        let mut path = self.path.clone();
        path.push(step);
        Self {
            store: Arc::clone(&self.store),
            path,
        }
    }

    fn resolve<'a>(&self, root: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        self.path.iter().try_fold(root, |node, step| step.get(node))
    }

    fn resolve_mut<'a>(&self, root: &'a mut serde_json::Value) -> Option<&'a mut serde_json::Value> {
        self.path.iter().try_fold(root, |node, step| step.get_mut(node))
    }

    /// Copy of the value this slot points at (`null` once it is gone).
    pub fn snapshot(&self) -> serde_json::Value {
        with_root(&self.store, |root| {
            self.resolve(root).cloned().unwrap_or(serde_json::Value::Null)
        })
    }

    fn read(&self, lua: &Lua, step: Option<PathStep>) -> LuaResult<Value> {
        let Some(step) = step else {
            return Ok(Value::Nil);
        };
        let found = with_root(&self.store, |root| {
            match self.resolve(root).and_then(|node| step.get(node)) {
                None => SlotRead::Missing,
                Some(serde_json::Value::Object(_) | serde_json::Value::Array(_)) => SlotRead::Nested,
                Some(plain) => SlotRead::Plain(plain.clone()),
            }
        });
        match found {
            SlotRead::Missing => Ok(Value::Nil),
            SlotRead::Nested => Ok(Value::UserData(lua.create_userdata(self.child(step))?)),
            SlotRead::Plain(value) => json_to_lua_value(lua, &value),
        }
    }

    fn step_for(&self, key: &Value) -> Option<PathStep> {
        with_root(&self.store, |root| {
            self.resolve(root).and_then(|node| PathStep::for_node(node, key))
        })
    }

    /// Store `value` under `key`; `None` removes it.
    fn write(&self, key: &Value, value: Option<serde_json::Value>) -> LuaResult<()> {
        with_root(&self.store, |root| {
            let node = self
                .resolve_mut(root)
                .ok_or_else(|| mlua::Error::runtime("game.custom entry no longer exists"))?;
            let step = PathStep::for_node(node, key).ok_or_else(|| {
                mlua::Error::runtime(format!(
                    "cannot index game.custom with a {} key",
                    key.type_name()
                ))
            })?;
            match (node, step) {
                (serde_json::Value::Object(map), PathStep::Key(k)) => match value {
                    Some(v) => {
                        map.insert(k, v);
                    }
                    None => {
                        map.remove(&k);
                    }
                },
                (serde_json::Value::Array(list), PathStep::Index(i)) => {
                    let len = list.len();
                    match value {
                        None if i + 1 == len => {
                            list.pop();
                        }
                        None if i >= len => {}
                        Some(v) if i == len => list.push(v),
                        v if i < len => list[i] = v.unwrap_or(serde_json::Value::Null),
                        _ => {
                            return Err(mlua::Error::runtime(format!(
                                "index {} is out of range for a list of {len}",
                                i + 1
                            )))
                        }
                    }
                }
                _ => return Err(mlua::Error::runtime("mismatched game.custom key")),
            }
            Ok(())
        })
    }

    fn keys(&self) -> Vec<PathStep> {
        with_root(&self.store, |root| match self.resolve(root) {
            Some(serde_json::Value::Object(map)) => {
                map.keys().map(|k| PathStep::Key(k.clone())).collect()
            }
            Some(serde_json::Value::Array(list)) => (0..list.len()).map(PathStep::Index).collect(),
            _ => Vec::new(),
        })
    }

    fn len(&self) -> usize {
        with_root(&self.store, |root| match self.resolve(root) {
            Some(serde_json::Value::Object(map)) => map.len(),
            Some(serde_json::Value::Array(list)) => list.len(),
            _ => 0,
        })
    }
}

impl UserData for CustomSlot {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: Value| {
            this.read(lua, this.step_for(&key))
        });
        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (key, value): (Value, Value)| {
                // Convert first: the value may itself be a slot on the same store.
                let value = match value {
                    Value::Nil => None,
                    other => Some(lua_value_to_json(other)?),
                };
                this.write(&key, value)
            },
        );
        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.len()));
        methods.add_meta_method(MetaMethod::Pairs, |lua, this, ()| {
            let slot = this.clone();
            let keys = this.keys();
            let cursor = AtomicUsize::new(0);
            lua.create_function(move |lua, ()| {
                let Some(step) = keys.get(cursor.fetch_add(1, Ordering::Relaxed)) else {
                    return Ok((Value::Nil, Value::Nil));
                };
                Ok((step.to_lua(lua)?, slot.read(lua, Some(step.clone()))?))
            })
        });
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Nesting limit for Lua → JSON conversion.
const MAX_TABLE_DEPTH: usize = 64;

pub fn entity_to_lua(lua: &Lua, entity: &Entity) -> LuaResult<Value> {
    let json = serde_json::to_value(entity).map_err(mlua::Error::external)?;
    json_to_lua_value(lua, &json)
}

/// Lua value → JSON. Fails on self-referencing or overly deep tables and on
/// keys that have no JSON spelling.
pub fn lua_value_to_json(val: Value) -> LuaResult<serde_json::Value> {
    let mut open = Vec::new();
    to_json(val, &mut open)
}

fn to_json(val: Value, open: &mut Vec<*const c_void>) -> LuaResult<serde_json::Value> {
    match val {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Boolean(b) => Ok(serde_json::Value::Bool(b)),
        Value::Integer(i) => Ok(serde_json::json!(i)),
        Value::Number(n) => Ok(serde_json::json!(n)),
        Value::String(s) => Ok(serde_json::Value::String(s.to_string_lossy())),
        Value::UserData(ud) => match ud.borrow::<CustomSlot>() {
            Ok(slot) => Ok(slot.snapshot()),
            Err(_) => Ok(serde_json::Value::Null),
        },
        Value::Table(t) => {
            let ptr = t.to_pointer();
            if open.contains(&ptr) {
                return Err(mlua::Error::runtime("cannot convert recursive table"));
            }
            if open.len() >= MAX_TABLE_DEPTH {
                return Err(mlua::Error::runtime(format!(
                    "table nesting deeper than {MAX_TABLE_DEPTH} levels"
                )));
            }
            open.push(ptr);
            let out = table_to_json(&t, open);
            open.pop();
            out
        }
        _ => Ok(serde_json::Value::Null),
    }
}

fn table_to_json(t: &Table, open: &mut Vec<*const c_void>) -> LuaResult<serde_json::Value> {
    let pairs = t.pairs::<Value, Value>().collect::<LuaResult<Vec<_>>>()?;
    // A list is exactly the keys 1..=#t; empty tables become objects.
    let len = t.raw_len();
    let is_array = len > 0
        && pairs.len() == len
        && pairs
            .iter()
            .all(|(k, _)| matches!(k, Value::Integer(n) if *n >= 1 && *n as usize <= len));
    if is_array {
        let mut list = Vec::with_capacity(len);
        for i in 1..=len {
            list.push(to_json(t.raw_get::<Value>(i)?, open)?);
        }
        return Ok(serde_json::Value::Array(list));
    }

    let mut map = serde_json::Map::new();
    for (k, v) in pairs {
        let key = match k {
            Value::String(s) => s.to_string_lossy(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(mlua::Error::runtime(format!(
                    "cannot convert a table with {} keys",
                    other.type_name()
                )))
            }
        };
        map.insert(key, to_json(v, open)?);
    }
    Ok(serde_json::Value::Object(map))
}

pub fn json_to_lua_value(lua: &Lua, val: &serde_json::Value) -> LuaResult<Value> {
    match val {
        serde_json::Value::Null => Ok(Value::Nil),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else {
                Ok(Value::Number(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_json::Value::String(s) => Ok(Value::String(lua.create_string(s.as_str())?)),
        serde_json::Value::Array(arr) => {
            let t = lua.create_table()?;
            for (i, v) in arr.iter().enumerate() {
                t.set(i + 1, json_to_lua_value(lua, v)?)?;
            }
            Ok(Value::Table(t))
        }
        serde_json::Value::Object(obj) => {
            let t = lua.create_table()?;
            for (k, v) in obj {
                t.set(k.as_str(), json_to_lua_value(lua, v)?)?;
            }
            Ok(Value::Table(t))
        }
    }
}
