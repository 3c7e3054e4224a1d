//! Side-effect plumbing for reservation changes.
//!
//! The mutation API never talks to the renderer or the station content layer
//! directly; it reports through the `ReservationEffects` capability. Headless
//! callers (tests, simulation-only setups) pass `NullEffects`; a running game
//! installs the `EffectQueue` resource and drains it from the rendering and
//! station systems.

use bevy::prelude::*;
use bitcode::{Decode, Encode};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::map::{RailKind, RailMap, TileId};
use crate::Saveable;

/// Seed for the station randomization stream when none is supplied.
const STATION_RNG_SEED: u64 = 42;

// =============================================================================
// Capability
// =============================================================================

/// Sink for the side effects of reservation mutations.
pub trait ReservationEffects {
    /// A reservation bit may have changed. Only relevant to viewers that
    /// draw reservations; the sink decides whether anyone is watching.
    fn reservation_changed(&mut self, _tile: TileId) {}

    /// The tile's appearance changed regardless of any overlay (crossing
    /// gates, depot or station state some graphics depend on).
    fn tile_changed(&mut self, _tile: TileId) {}

    /// A station cell was newly claimed by a path; its randomization
    /// trigger should fire.
    fn station_reserved(&mut self, _tile: TileId) {}
}

/// Sink that swallows everything.
pub struct NullEffects;

impl ReservationEffects for NullEffects {}

// =============================================================================
// Queue resource
// =============================================================================

/// Buffering sink: collects dirty tiles for the renderer and trigger tiles
/// for the station randomization pass. Plain `Vec`s keep the order of
/// emission, so draining is deterministic.
#[derive(Resource, Default)]
pub struct EffectQueue {
    /// Whether reservations are currently drawn. Gates only
    /// `reservation_changed`; the other effects always redraw.
    pub show_reservations: bool,
    pub dirty: Vec<TileId>,
    pub station_triggers: Vec<TileId>,
}

impl EffectQueue {
    /// Hand the accumulated dirty tiles to the renderer.
    pub fn drain_dirty(&mut self) -> Vec<TileId> {
        std::mem::take(&mut self.dirty)
    }
}

impl ReservationEffects for EffectQueue {
    fn reservation_changed(&mut self, tile: TileId) {
        if self.show_reservations {
            self.dirty.push(tile);
        }
    }

    fn tile_changed(&mut self, tile: TileId) {
        self.dirty.push(tile);
    }

    fn station_reserved(&mut self, tile: TileId) {
        self.station_triggers.push(tile);
    }
}

// =============================================================================
// Station randomization
// =============================================================================

/// Deterministic RNG stream for station randomization triggers.
///
/// Identical seeds and identical trigger sequences must produce identical
/// station appearance on every peer, so this never falls back to an
/// entropy-seeded generator.
#[derive(Resource)]
pub struct StationRng(pub ChaCha8Rng);

impl Default for StationRng {
    fn default() -> Self {
        Self(ChaCha8Rng::seed_from_u64(STATION_RNG_SEED))
    }
}

impl StationRng {
    pub fn from_seed_u64(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

/// Full internal state of the RNG stream, for save round-trips.
#[derive(Encode, Decode)]
struct RngSnapshot {
    seed: [u8; 32],
    word_pos: u128,
    stream: u64,
}

impl Saveable for StationRng {
    const SAVE_KEY: &'static str = "station_rng";

    fn save_to_bytes(&self) -> Option<Vec<u8>> {
        let snapshot = RngSnapshot {
            seed: self.0.get_seed(),
            word_pos: self.0.get_word_pos(),
            stream: self.0.get_stream(),
        };
        Some(bitcode::encode(&snapshot))
    }

    fn load_from_bytes(bytes: &[u8]) -> Self {
        match bitcode::decode::<RngSnapshot>(bytes) {
            Ok(snapshot) => {
                let mut rng = ChaCha8Rng::from_seed(snapshot.seed);
                rng.set_stream(snapshot.stream);
                rng.set_word_pos(snapshot.word_pos);
                Self(rng)
            }
            Err(e) => {
                warn!(
                    "StationRng: failed to decode save data, falling back to default: {}",
                    e
                );
                Self::default()
            }
        }
    }
}

/// Re-roll the appearance bits of every station cell whose trigger fired,
/// and queue the cell for redraw. Waypoints have no randomized appearance.
pub fn reroll_station_bits(map: &mut RailMap, fx: &mut EffectQueue, rng: &mut StationRng) {
    let triggers = std::mem::take(&mut fx.station_triggers);
    for tile in triggers {
        if let Some(cell) = map.cell_mut(tile) {
            if let RailKind::Station {
                random_bits,
                waypoint: false,
                ..
            } = &mut cell.kind
            {
                *random_bits = rng.0.gen();
                fx.dirty.push(tile);
            }
        }
    }
}

/// System wrapper around `reroll_station_bits`.
pub fn apply_station_triggers(
    mut map: ResMut<RailMap>,
    mut fx: ResMut<EffectQueue>,
    mut rng: ResMut<StationRng>,
) {
    reroll_station_bits(&mut map, &mut fx, &mut rng);
}

// =============================================================================
// Tests
// =============================================================================
