//! Rail tile storage: the grid of rail cells, their reservation bits, and
//! positions on the network.
//!
//! Reservations are nothing but flags on the cells below; there is no path
//! object anywhere. Each cell kind stores its flags in the shape natural to
//! it (a full `TrackBits` set for plain track, a single bool for the
//! single-track kinds), and exposes them through the same accessors so the
//! traversal code never cares which kind it is looking at.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{MAP_HEIGHT, MAP_WIDTH};
use crate::track::{Axis, DiagDirection, Track, TrackBits, Trackdir, TrackdirBits};
use crate::Saveable;

/// Unique identifier for a station; consecutive cells with the same id and
/// axis form one platform.
pub type StationId = u32;

/// Company owning a piece of infrastructure or a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u8);

/// A cell position on the map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileId(pub usize, pub usize);

// =============================================================================
// Rail types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RailType {
    Rail,
    Electric,
    Mono,
    Maglev,
}

bitflags::bitflags! {
    /// Set of rail types, used for vehicle compatibility checks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RailTypes: u8 {
        const RAIL = 1 << 0;
        const ELECTRIC = 1 << 1;
        const MONO = 1 << 2;
        const MAGLEV = 1 << 3;
    }
}

impl Serialize for RailTypes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for RailTypes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u8::deserialize(deserializer)?;
        Self::from_bits(bits).ok_or_else(|| serde::de::Error::custom("invalid rail type bits"))
    }
}

impl RailType {
    pub fn bit(self) -> RailTypes {
        match self {
            RailType::Rail => RailTypes::RAIL,
            RailType::Electric => RailTypes::ELECTRIC,
            RailType::Mono => RailTypes::MONO,
            RailType::Maglev => RailTypes::MAGLEV,
        }
    }

    /// Rail types a vehicle built for this rail type can traverse.
    /// Conventional and electric rail are mutually traversable.
    pub fn compatible(self) -> RailTypes {
        match self {
            RailType::Rail | RailType::Electric => RailTypes::RAIL | RailTypes::ELECTRIC,
            RailType::Mono => RailTypes::MONO,
            RailType::Maglev => RailTypes::MAGLEV,
        }
    }
}

// =============================================================================
// Positions
// =============================================================================

/// A point on the rail network: a tile plus the single trackdir being
/// ridden, or a spot inside a tunnel/bridge span.
///
/// The wormhole form names the head tile the vehicle is moving towards, so
/// the hidden span needs no storage of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RailPos {
    Tile { tile: TileId, td: Trackdir },
    Wormhole { head: TileId, dir: DiagDirection },
}

impl RailPos {
    pub fn tile(tile: TileId, td: Trackdir) -> Self {
        RailPos::Tile { tile, td }
    }

    pub fn wormhole(head: TileId, dir: DiagDirection) -> Self {
        RailPos::Wormhole { head, dir }
    }

    pub fn in_wormhole(&self) -> bool {
        matches!(self, RailPos::Wormhole { .. })
    }
}

// =============================================================================
// Signals
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Block,
    Entry,
    Exit,
    Combo,
    Pbs,
    PbsOneway,
}

impl SignalType {
    pub fn is_pbs(self) -> bool {
        matches!(self, SignalType::Pbs | SignalType::PbsOneway)
    }
}

/// A signal installation on one track of a plain rail tile. `dirs` holds the
/// trackdirs the signal faces (at most the two senses of `track`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSignal {
    pub track: Track,
    pub ty: SignalType,
    pub dirs: TrackdirBits,
}

// =============================================================================
// Cell kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WormholeKind {
    Tunnel,
    Bridge,
}

/// The per-kind storage for one rail cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RailKind {
    Plain {
        tracks: TrackBits,
        reserved: TrackBits,
        signal: Option<TrackSignal>,
    },
    /// Rail crossing a road. `barred` is the state of the road-side gates.
    Crossing {
        axis: Axis,
        reserved: bool,
        barred: bool,
    },
    /// Tunnel or bridge head. `dir` points into the hidden span; the
    /// reservation bit covers the head and the span approaching it.
    WormholeHead {
        kind: WormholeKind,
        dir: DiagDirection,
        other_end: TileId,
        reserved: bool,
    },
    /// Depot with its door on the `dir` edge.
    Depot { dir: DiagDirection, reserved: bool },
    Station {
        axis: Axis,
        station: StationId,
        waypoint: bool,
        reserved: bool,
        random_bits: u8,
    },
}

impl RailKind {
    /// All track elements physically present on the cell.
    pub fn trackbits(&self) -> TrackBits {
        match self {
            RailKind::Plain { tracks, .. } => *tracks,
            RailKind::Crossing { axis, .. } => axis.track().bit(),
            RailKind::WormholeHead { dir, .. } => dir.axis().track().bit(),
            RailKind::Depot { dir, .. } => dir.axis().track().bit(),
            RailKind::Station { axis, .. } => axis.track().bit(),
        }
    }

    /// Track elements currently reserved on the cell.
    pub fn reserved_trackbits(&self) -> TrackBits {
        match self {
            RailKind::Plain { reserved, .. } => *reserved,
            RailKind::Crossing { axis, reserved, .. } => {
                if *reserved {
                    axis.track().bit()
                } else {
                    TrackBits::empty()
                }
            }
            RailKind::WormholeHead { dir, reserved, .. } => {
                if *reserved {
                    dir.axis().track().bit()
                } else {
                    TrackBits::empty()
                }
            }
            RailKind::Depot { dir, reserved } => {
                if *reserved {
                    dir.axis().track().bit()
                } else {
                    TrackBits::empty()
                }
            }
            RailKind::Station { axis, reserved, .. } => {
                if *reserved {
                    axis.track().bit()
                } else {
                    TrackBits::empty()
                }
            }
        }
    }

    /// Atomically claim `track`. Returns false when the claim would conflict
    /// with an existing reservation; the cell is left untouched in that case.
    /// Claiming a crossing also bars it.
    pub fn try_reserve(&mut self, track: Track) -> bool {
        match self {
            RailKind::Plain { reserved, .. } => {
                if reserved.conflicts_with(track) {
                    return false;
                }
                *reserved |= track.bit();
                true
            }
            RailKind::Crossing {
                reserved, barred, ..
            } => {
                if *reserved {
                    return false;
                }
                *reserved = true;
                *barred = true;
                true
            }
            RailKind::WormholeHead { reserved, .. }
            | RailKind::Depot { reserved, .. }
            | RailKind::Station { reserved, .. } => {
                if *reserved {
                    return false;
                }
                *reserved = true;
                true
            }
        }
    }

    /// Drop any claim on `track`. A no-op when nothing was reserved.
    pub fn unreserve(&mut self, track: Track) {
        match self {
            RailKind::Plain { reserved, .. } => {
                *reserved &= !track.bit();
            }
            RailKind::Crossing { reserved, .. }
            | RailKind::WormholeHead { reserved, .. }
            | RailKind::Depot { reserved, .. }
            | RailKind::Station { reserved, .. } => {
                *reserved = false;
            }
        }
    }
}

/// One rail cell on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailCell {
    pub owner: OwnerId,
    pub railtype: RailType,
    pub kind: RailKind,
}

// =============================================================================
// Map resource
// =============================================================================

/// The rail layer of the map: one optional rail cell per grid cell.
#[derive(Resource, Clone, Serialize, Deserialize)]
pub struct RailMap {
    pub width: usize,
    pub height: usize,
    cells: Vec<Option<RailCell>>,
}

impl Default for RailMap {
    fn default() -> Self {
        Self::new(MAP_WIDTH, MAP_HEIGHT)
    }
}

impl RailMap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![None; width * height],
        }
    }

    #[inline]
    fn index(&self, tile: TileId) -> usize {
        tile.1 * self.width + tile.0
    }

    #[inline]
    pub fn in_bounds(&self, tile: TileId) -> bool {
        tile.0 < self.width && tile.1 < self.height
    }

    pub fn cell(&self, tile: TileId) -> Option<&RailCell> {
        if !self.in_bounds(tile) {
            return None;
        }
        self.cells[self.index(tile)].as_ref()
    }

    pub fn cell_mut(&mut self, tile: TileId) -> Option<&mut RailCell> {
        if !self.in_bounds(tile) {
            return None;
        }
        let idx = self.index(tile);
        self.cells[idx].as_mut()
    }

    pub fn place(&mut self, tile: TileId, cell: RailCell) {
        assert!(self.in_bounds(tile));
        let idx = self.index(tile);
        self.cells[idx] = Some(cell);
    }

    pub fn remove(&mut self, tile: TileId) {
        assert!(self.in_bounds(tile));
        let idx = self.index(tile);
        self.cells[idx] = None;
    }

    pub fn rail_cell_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// The adjacent tile in direction `dir`, or `None` at the map edge.
    pub fn step(&self, tile: TileId, dir: DiagDirection) -> Option<TileId> {
        let TileId(x, y) = tile;
        let next = match dir {
            DiagDirection::Ne => TileId(x.checked_sub(1)?, y),
            DiagDirection::Se => TileId(x, y + 1),
            DiagDirection::Sw => TileId(x + 1, y),
            DiagDirection::Nw => TileId(x, y.checked_sub(1)?),
        };
        self.in_bounds(next).then_some(next)
    }

    // -------------------------------------------------------------------------
    // Reservation queries
    // -------------------------------------------------------------------------

    /// Reserved track elements on a tile, regardless of cell kind. Empty for
    /// anything that is not rail.
    pub fn reserved_trackbits(&self, tile: TileId) -> TrackBits {
        self.cell(tile)
            .map_or(TrackBits::empty(), |c| c.kind.reserved_trackbits())
    }

    /// All track elements physically present on a tile.
    pub fn trackbits(&self, tile: TileId) -> TrackBits {
        self.cell(tile)
            .map_or(TrackBits::empty(), |c| c.kind.trackbits())
    }

    pub fn has_reserved_track(&self, tile: TileId, track: Track) -> bool {
        self.reserved_trackbits(tile).contains(track.bit())
    }

    /// Whether the position's track (or wormhole span) is reserved.
    pub fn is_reserved(&self, pos: &RailPos) -> bool {
        match pos {
            RailPos::Tile { tile, td } => self.has_reserved_track(*tile, td.track()),
            RailPos::Wormhole { head, .. } => matches!(
                self.cell(*head).map(|c| &c.kind),
                Some(RailKind::WormholeHead { reserved: true, .. })
            ),
        }
    }

    // -------------------------------------------------------------------------
    // Signal queries
    // -------------------------------------------------------------------------

    pub fn signal_on_track(&self, tile: TileId, track: Track) -> Option<&TrackSignal> {
        match self.cell(tile).map(|c| &c.kind) {
            Some(RailKind::Plain {
                signal: Some(sig), ..
            }) if sig.track == track => Some(sig),
            _ => None,
        }
    }

    /// Whether a signal faces a driver travelling `td` over its track.
    pub fn has_signal_on_trackdir(&self, tile: TileId, td: Trackdir) -> bool {
        self.signal_on_track(tile, td.track())
            .is_some_and(|sig| sig.dirs.contains(td.bit()))
    }

    pub fn has_signal_along(&self, pos: &RailPos) -> bool {
        match pos {
            RailPos::Tile { tile, td } => self.has_signal_on_trackdir(*tile, *td),
            RailPos::Wormhole { .. } => false,
        }
    }

    pub fn has_signal_against(&self, pos: &RailPos) -> bool {
        match pos {
            RailPos::Tile { tile, td } => self.has_signal_on_trackdir(*tile, td.reverse()),
            RailPos::Wormhole { .. } => false,
        }
    }

    /// Type of the signal installed on the position's track, facing or not.
    pub fn signal_type(&self, pos: &RailPos) -> Option<SignalType> {
        match pos {
            RailPos::Tile { tile, td } => {
                self.signal_on_track(*tile, td.track()).map(|sig| sig.ty)
            }
            RailPos::Wormhole { .. } => None,
        }
    }

    pub fn has_pbs_signal_on_trackdir(&self, tile: TileId, td: Trackdir) -> bool {
        self.signal_on_track(tile, td.track())
            .is_some_and(|sig| sig.ty.is_pbs() && sig.dirs.contains(td.bit()))
    }

    /// Whether travel along `td` runs into the back of a one-way signal.
    /// Two-way path signals are passable from behind; everything else is not.
    pub fn has_oneway_signal_blocking_trackdir(&self, tile: TileId, td: Trackdir) -> bool {
        self.signal_on_track(tile, td.track()).is_some_and(|sig| {
            sig.ty != SignalType::Pbs
                && sig.dirs.contains(td.reverse().bit())
                && !sig.dirs.contains(td.bit())
        })
    }

    pub fn has_oneway_signal_blocking(&self, pos: &RailPos) -> bool {
        match pos {
            RailPos::Tile { tile, td } => self.has_oneway_signal_blocking_trackdir(*tile, *td),
            RailPos::Wormhole { .. } => false,
        }
    }

    /// Install or clear the signal on a plain rail tile.
    pub fn set_signal(&mut self, tile: TileId, signal: Option<TrackSignal>) {
        let cell = self.cell_mut(tile).expect("signal on empty tile");
        match &mut cell.kind {
            RailKind::Plain {
                tracks,
                signal: slot,
                ..
            } => {
                if let Some(sig) = &signal {
                    assert!(tracks.contains(sig.track.bit()));
                }
                *slot = signal;
            }
            _ => panic!("signals only exist on plain rail"),
        }
    }

    // -------------------------------------------------------------------------
    // Kind queries
    // -------------------------------------------------------------------------

    pub fn is_rail_depot(&self, tile: TileId) -> bool {
        matches!(
            self.cell(tile).map(|c| &c.kind),
            Some(RailKind::Depot { .. })
        )
    }

    pub fn depot_dir(&self, tile: TileId) -> Option<DiagDirection> {
        match self.cell(tile).map(|c| &c.kind) {
            Some(RailKind::Depot { dir, .. }) => Some(*dir),
            _ => None,
        }
    }

    pub fn is_station_tile(&self, tile: TileId) -> bool {
        matches!(
            self.cell(tile).map(|c| &c.kind),
            Some(RailKind::Station { .. })
        )
    }

    /// Whether `tile` belongs to the same platform as `with`: same station,
    /// same axis, same owner and rail type.
    pub fn compatible_station(&self, tile: TileId, with: TileId) -> bool {
        let (Some(a), Some(b)) = (self.cell(tile), self.cell(with)) else {
            return false;
        };
        match (&a.kind, &b.kind) {
            (
                RailKind::Station {
                    axis: ax_a,
                    station: st_a,
                    ..
                },
                RailKind::Station {
                    axis: ax_b,
                    station: st_b,
                    ..
                },
            ) => ax_a == ax_b && st_a == st_b && a.owner == b.owner && a.railtype == b.railtype,
            _ => false,
        }
    }

    pub fn other_wormhole_end(&self, head: TileId) -> Option<TileId> {
        match self.cell(head).map(|c| &c.kind) {
            Some(RailKind::WormholeHead { other_end, .. }) => Some(*other_end),
            _ => None,
        }
    }
}

impl Saveable for RailMap {
    const SAVE_KEY: &'static str = "rail_map";

    fn save_to_bytes(&self) -> Option<Vec<u8>> {
        if self.rail_cell_count() == 0 {
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
