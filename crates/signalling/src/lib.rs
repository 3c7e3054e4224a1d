//! Path-based signalling: the reservation layer of the rail simulation.
//!
//! Trains claim a chain of track segments ahead of themselves, one atomic
//! per-segment claim at a time; no other train may enter a claimed segment.
//! The chain is never stored as an object. It lives entirely in reservation
//! flags on the rail cells and is reconstructed on demand by walking them,
//! so there is no path bookkeeping that could go stale.
//!
//! Module map:
//! - [`track`]: track/trackdir/direction value algebra
//! - [`map`]: rail cells, signals, reservation flags, positions
//! - [`nav`]: one-step successor enumeration (`TrackWalker`)
//! - [`trains`]: train registry and occupancy scans
//! - [`reservation`]: the claim/release API
//! - [`follow`]: chain walking, vehicle locating, owner lookup
//! - [`waiting`]: safe/free classification of stopping points
//! - [`notify`]: render-notification capability and station triggers
//!
//! The whole layer is synchronous and deterministic: every query is a
//! bounded walk over the finite map, and all tie-breaks resolve by lowest
//! id so lock-step peers replaying identical inputs stay bit-identical.

use bevy::prelude::*;
use std::collections::BTreeMap;

pub mod config;
pub mod follow;
pub mod map;
pub mod nav;
pub mod notify;
pub mod reservation;
pub mod track;
pub mod trains;
pub mod waiting;

#[cfg(any(test, feature = "bench"))]
pub mod test_harness;

// ---------------------------------------------------------------------------
// Saveable trait + registry for the extension map save pattern
// ---------------------------------------------------------------------------

/// Trait for resources that persist through the host's extension map.
///
/// Each resource brings its own serialization, so the host's save system
/// needs no knowledge of individual types; the plugin registers them all.
pub trait Saveable: Resource + Default + Send + Sync + 'static {
    /// Key of this resource in the save file's extension map. Must stay
    /// stable across versions.
    const SAVE_KEY: &'static str;

    /// Serialize to bytes. `None` skips saving (e.g. default state).
    fn save_to_bytes(&self) -> Option<Vec<u8>>;

    /// Restore from bytes.
    fn load_from_bytes(bytes: &[u8]) -> Self;
}

/// Decode via bitcode's serde mode, logging and falling back to the default
/// on malformed data. For use in `Saveable::load_from_bytes` impls.
pub fn decode_or_warn<T: serde::de::DeserializeOwned + Default>(key: &str, bytes: &[u8]) -> T {
    match bitcode::deserialize(bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                "Saveable {}: failed to decode {} bytes, falling back to default: {}",
                key,
                bytes.len(),
                e
            );
            T::default()
        }
    }
}

/// Type alias for the save function stored in a `SaveableEntry`.
pub type SaveFn = Box<dyn Fn(&World) -> Option<Vec<u8>> + Send + Sync>;
/// Type alias for the load function stored in a `SaveableEntry`.
pub type LoadFn = Box<dyn Fn(&mut World, &[u8]) + Send + Sync>;
/// Type alias for the reset function stored in a `SaveableEntry`.
pub type ResetFn = Box<dyn Fn(&mut World) + Send + Sync>;

/// Type-erased save/load/reset operations for one registered resource.
pub struct SaveableEntry {
    pub key: String,
    pub save_fn: SaveFn,
    pub load_fn: LoadFn,
    pub reset_fn: ResetFn,
}

/// Registry of all saveable resources, populated during plugin setup.
#[derive(Resource, Default)]
pub struct SaveableRegistry {
    pub entries: Vec<SaveableEntry>,
}

impl SaveableRegistry {
    /// Register a `Saveable` resource type.
    ///
    /// A duplicate `SAVE_KEY` would silently shadow another resource's save
    /// data, so it trips a debug assertion and is ignored in release.
    pub fn register<T: Saveable>(&mut self) {
        let key = T::SAVE_KEY.to_string();
        if self.entries.iter().any(|e| e.key == key) {
            warn!("SaveableRegistry: duplicate key '{}', ignoring second registration", key);
            debug_assert!(false, "SaveableRegistry: duplicate key '{}'", key);
            return;
        }
        self.entries.push(SaveableEntry {
            key,
            save_fn: Box::new(|world: &World| {
                world.get_resource::<T>().and_then(|r| r.save_to_bytes())
            }),
            load_fn: Box::new(|world: &mut World, bytes: &[u8]| {
                let value = T::load_from_bytes(bytes);
                world.insert_resource(value);
            }),
            reset_fn: Box::new(|world: &mut World| {
                world.insert_resource(T::default());
            }),
        });
    }

    /// Save every registered resource into an extension map.
    pub fn save_all(&self, world: &World) -> BTreeMap<String, Vec<u8>> {
        let mut extensions = BTreeMap::new();
        for entry in &self.entries {
            if let Some(bytes) = (entry.save_fn)(world) {
                extensions.insert(entry.key.clone(), bytes);
            }
        }
        extensions
    }

    /// Restore registered resources from an extension map. Resources whose
    /// key is absent keep their current value.
    pub fn load_all(&self, world: &mut World, extensions: &BTreeMap<String, Vec<u8>>) {
        for entry in &self.entries {
            if let Some(bytes) = extensions.get(&entry.key) {
                (entry.load_fn)(world, bytes);
            }
        }
    }

    /// Reset every registered resource to its default (new-game path).
    pub fn reset_all(&self, world: &mut World) {
        for entry in &self.entries {
            (entry.reset_fn)(world);
        }
    }
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

pub struct SignallingPlugin;

impl Plugin for SignallingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<map::RailMap>()
            .init_resource::<trains::TrainRegistry>()
            .init_resource::<notify::EffectQueue>()
            .init_resource::<notify::StationRng>()
            .add_systems(FixedUpdate, notify::apply_station_triggers);

        app.init_resource::<SaveableRegistry>();
        let mut registry = app.world_mut().resource_mut::<SaveableRegistry>();
        registry.register::<map::RailMap>();
        registry.register::<trains::TrainRegistry>();
        registry.register::<notify::StationRng>();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
