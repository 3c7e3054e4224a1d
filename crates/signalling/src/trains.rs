//! Train registry: identities, occupied positions, and the tile/wormhole
//! scan capability the reservation layer builds on.
//!
//! Reservations are never tagged with the vehicle holding them; ownership is
//! recovered by scanning for a train physically sitting at an end of the
//! reserved chain. All scans resolve ties by picking the lowest train id so
//! that every peer replaying the same state reaches the same answer.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::map::{OwnerId, RailPos, RailTypes, TileId};
use crate::track::Track;
use crate::Saveable;

/// Unique, monotonically assigned train identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TrainId(pub u32);

/// A train consist. `units` holds the position of every vehicle in the
/// chain, head first; a short train occupies a single position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Train {
    pub id: TrainId,
    pub owner: OwnerId,
    /// Rail types this train can traverse.
    pub railtypes: RailTypes,
    pub units: Vec<RailPos>,
    pub crashed: bool,
}

impl Train {
    /// Position of the head vehicle.
    pub fn pos(&self) -> &RailPos {
        &self.units[0]
    }
}

/// The source of truth for all trains on the map.
#[derive(Resource, Clone, Default, Serialize, Deserialize)]
pub struct TrainRegistry {
    trains: Vec<Train>,
    next_id: u32,
}

impl TrainRegistry {
    pub fn spawn(&mut self, owner: OwnerId, railtypes: RailTypes, units: Vec<RailPos>) -> TrainId {
        assert!(!units.is_empty(), "a train occupies at least one position");
        let id = TrainId(self.next_id);
        self.next_id += 1;
        self.trains.push(Train {
            id,
            owner,
            railtypes,
            units,
            crashed: false,
        });
        id
    }

    pub fn get(&self, id: TrainId) -> Option<&Train> {
        self.trains.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TrainId) -> Option<&mut Train> {
        self.trains.iter_mut().find(|t| t.id == id)
    }

    pub fn remove(&mut self, id: TrainId) -> bool {
        let before = self.trains.len();
        self.trains.retain(|t| t.id != id);
        self.trains.len() < before
    }

    pub fn train_count(&self) -> usize {
        self.trains.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Train> {
        self.trains.iter()
    }

    /// Lowest-id non-crashed train with a unit on `tile` riding `track`,
    /// in either sense. Lowest id wins so independent observers of the same
    /// state converge on the same train.
    pub fn lowest_on_track(&self, tile: TileId, track: Track) -> Option<TrainId> {
        self.trains
            .iter()
            .filter(|t| !t.crashed)
            .filter(|t| {
                t.units.iter().any(|u| {
                    matches!(u, RailPos::Tile { tile: ut, td } if *ut == tile && td.track() == track)
                })
            })
            .map(|t| t.id)
            .min()
    }

    /// Lowest-id non-crashed train with a unit inside the wormhole whose
    /// recorded head is `head`.
    pub fn lowest_in_wormhole(&self, head: TileId) -> Option<TrainId> {
        self.trains
            .iter()
            .filter(|t| !t.crashed)
            .filter(|t| {
                t.units
                    .iter()
                    .any(|u| matches!(u, RailPos::Wormhole { head: uh, .. } if *uh == head))
            })
            .map(|t| t.id)
            .min()
    }

    /// Whether any train, crashed or not, physically occupies `tile`.
    pub fn any_unit_on_tile(&self, tile: TileId) -> bool {
        self.trains.iter().any(|t| {
            t.units
                .iter()
                .any(|u| matches!(u, RailPos::Tile { tile: ut, .. } if *ut == tile))
        })
    }
}

impl Saveable for TrainRegistry {
    const SAVE_KEY: &'static str = "train_registry";

    fn save_to_bytes(&self) -> Option<Vec<u8>> {
        if self.trains.is_empty() {
            return None;
        }
        bitcode::serialize(self).ok()
    }

    fn load_from_bytes(bytes: &[u8]) -> Self {
        crate::decode_or_warn(Self::SAVE_KEY, bytes)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::RailType;
    use crate::track::Trackdir;

    fn pos(x: usize, y: usize, td: Trackdir) -> RailPos {
        RailPos::tile(TileId(x, y), td)
    }

    #[test]
    fn test_spawn_assigns_monotonic_ids() {
        let mut reg = TrainRegistry::default();
        let a = reg.spawn(OwnerId(1), RailType::Rail.compatible(), vec![pos(1, 1, Trackdir::XNe)]);
        let b = reg.spawn(OwnerId(1), RailType::Rail.compatible(), vec![pos(2, 1, Trackdir::XNe)]);
        assert!(a < b);
        assert_eq!(reg.train_count(), 2);
    }

    #[test]
    fn test_scan_matches_track_in_either_sense() {
        let mut reg = TrainRegistry::default();
        let id = reg.spawn(
            OwnerId(1),
            RailType::Rail.compatible(),
            vec![pos(4, 2, Trackdir::XSw)],
        );
        // Same track, opposite sense of travel still matches.
        assert_eq!(reg.lowest_on_track(TileId(4, 2), Track::X), Some(id));
        assert_eq!(reg.lowest_on_track(TileId(4, 2), Track::Y), None);
        assert_eq!(reg.lowest_on_track(TileId(4, 3), Track::X), None);
    }

    #[test]
    fn test_scan_prefers_lowest_id() {
        let mut reg = TrainRegistry::default();
        let first = reg.spawn(
            OwnerId(1),
            RailType::Rail.compatible(),
            vec![pos(5, 5, Trackdir::YSe)],
        );
        reg.spawn(
            OwnerId(2),
            RailType::Rail.compatible(),
            vec![pos(5, 5, Trackdir::YNw)],
        );
        assert_eq!(reg.lowest_on_track(TileId(5, 5), Track::Y), Some(first));
    }

    #[test]
    fn test_crashed_trains_never_match() {
        let mut reg = TrainRegistry::default();
        let id = reg.spawn(
            OwnerId(1),
            RailType::Rail.compatible(),
            vec![pos(3, 3, Trackdir::XNe)],
        );
        reg.get_mut(id).unwrap().crashed = true;
        assert_eq!(reg.lowest_on_track(TileId(3, 3), Track::X), None);
        // The physical-occupation scan still sees the wreck.
        assert!(reg.any_unit_on_tile(TileId(3, 3)));
    }

    #[test]
    fn test_wormhole_scan() {
        let mut reg = TrainRegistry::default();
        let id = reg.spawn(
            OwnerId(1),
            RailType::Rail.compatible(),
            vec![RailPos::wormhole(TileId(9, 4), crate::track::DiagDirection::Sw)],
        );
        assert_eq!(reg.lowest_in_wormhole(TileId(9, 4)), Some(id));
        assert_eq!(reg.lowest_in_wormhole(TileId(9, 5)), None);
    }

    #[test]
    fn test_multi_unit_train_scans_on_every_unit() {
        let mut reg = TrainRegistry::default();
        let id = reg.spawn(
            OwnerId(1),
            RailType::Rail.compatible(),
            vec![
                pos(6, 2, Trackdir::XNe),
                pos(7, 2, Trackdir::XNe),
                pos(8, 2, Trackdir::XNe),
            ],
        );
        assert_eq!(reg.lowest_on_track(TileId(8, 2), Track::X), Some(id));
        assert_eq!(*reg.get(id).unwrap().pos(), pos(6, 2, Trackdir::XNe));
    }

    #[test]
    fn test_remove() {
        let mut reg = TrainRegistry::default();
        let id = reg.spawn(
            OwnerId(1),
            RailType::Rail.compatible(),
            vec![pos(1, 1, Trackdir::XNe)],
        );
        assert!(reg.remove(id));
        assert!(!reg.remove(id));
        assert_eq!(reg.train_count(), 0);
    }

    #[test]
    fn test_saveable_roundtrip() {
        let mut reg = TrainRegistry::default();
        reg.spawn(
            OwnerId(3),
            RailType::Electric.compatible(),
            vec![pos(2, 2, Trackdir::YSe)],
        );
        let bytes = reg.save_to_bytes().expect("non-empty registry saves");
        let back = TrainRegistry::load_from_bytes(&bytes);
        assert_eq!(back.train_count(), 1);
        assert_eq!(back.iter().next().unwrap().owner, OwnerId(3));
    }

    #[test]
    fn test_saveable_skips_empty() {
        assert!(TrainRegistry::default().save_to_bytes().is_none());
    }
}
