//! One-step successor enumeration over the rail map.
//!
//! `TrackWalker` answers "standing here, moving this way, where can the next
//! wheel land": it honors per-kind entry rules (depot doors, crossing and
//! platform axes, tunnel mouths), ownership and rail-type compatibility,
//! jumps whole platforms and tunnel spans in one step, and can optionally
//! reject 90-degree turns. It never looks at reservations or signals; those
//! judgements belong to its callers.

use crate::map::{OwnerId, RailCell, RailKind, RailMap, RailPos, RailTypes, TileId};
use crate::track::{DiagDirection, Trackdir, TrackdirBits};

/// Result of one walker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Landed on a concrete tile. `trackdirs` are the candidate trackdirs
    /// there; more than one means a branching choice. For stations, `tile`
    /// is the far end of the platform and `skipped` counts the cells jumped
    /// over to get there.
    Tile {
        tile: TileId,
        trackdirs: TrackdirBits,
        exitdir: DiagDirection,
        skipped: usize,
        station: bool,
    },
    /// Entered a tunnel/bridge span, heading for `head`.
    Wormhole { head: TileId, dir: DiagDirection },
}

/// Successor enumerator for one vehicle's point of view.
pub struct TrackWalker<'a> {
    map: &'a RailMap,
    owner: OwnerId,
    railtypes: RailTypes,
    allow_90deg: bool,
}

impl<'a> TrackWalker<'a> {
    pub fn new(map: &'a RailMap, owner: OwnerId, railtypes: RailTypes, allow_90deg: bool) -> Self {
        Self {
            map,
            owner,
            railtypes,
            allow_90deg,
        }
    }

    /// The next reachable position(s) from `pos`, or `None` at end of track.
    pub fn follow(&self, pos: &RailPos) -> Option<Step> {
        match pos {
            RailPos::Wormhole { head, dir } => self.emerge(*head, *dir),
            RailPos::Tile { tile, td } => self.advance(*tile, *td),
        }
    }

    /// Surface at the far head of a span.
    fn emerge(&self, head: TileId, dir: DiagDirection) -> Option<Step> {
        let cell = self.map.cell(head)?;
        if !self.traversable(cell) {
            return None;
        }
        Some(Step::Tile {
            tile: head,
            trackdirs: dir.diag_trackdir().bit(),
            exitdir: dir,
            skipped: 0,
            station: false,
        })
    }

    fn advance(&self, tile: TileId, td: Trackdir) -> Option<Step> {
        let exitdir = td.exitdir();

        match self.map.cell(tile).map(|c| &c.kind) {
            // A depot is left through its door only.
            Some(RailKind::Depot { dir, .. }) if *dir != exitdir => return None,
            // Moving into the mouth drops the walk into the span.
            Some(RailKind::WormholeHead { dir, other_end, .. }) if *dir == exitdir => {
                return Some(Step::Wormhole {
                    head: *other_end,
                    dir: exitdir,
                });
            }
            _ => {}
        }

        let next = self.map.step(tile, exitdir)?;
        let cell = self.map.cell(next)?;
        if !self.traversable(cell) {
            return None;
        }

        let mut trackdirs = entry_trackdirs(&cell.kind, exitdir);
        if !self.allow_90deg {
            trackdirs &= !td.crossing_trackdirs();
        }
        if trackdirs.is_empty() {
            return None;
        }

        // Platforms are traversed whole; land on the far end and remember
        // how many cells were jumped.
        if matches!(cell.kind, RailKind::Station { .. }) {
            let mut last = next;
            let mut skipped = 0;
            while let Some(further) = self.map.step(last, exitdir) {
                if !self.map.compatible_station(further, next) {
                    break;
                }
                last = further;
                skipped += 1;
            }
            return Some(Step::Tile {
                tile: last,
                trackdirs,
                exitdir,
                skipped,
                station: true,
            });
        }

        Some(Step::Tile {
            tile: next,
            trackdirs,
            exitdir,
            skipped: 0,
            station: false,
        })
    }

    fn traversable(&self, cell: &RailCell) -> bool {
        cell.owner == self.owner && self.railtypes.contains(cell.railtype.bit())
    }
}

/// Trackdirs offered by a cell when entered moving in `exitdir`.
fn entry_trackdirs(kind: &RailKind, exitdir: DiagDirection) -> TrackdirBits {
    match kind {
        RailKind::Plain { tracks, .. } => {
            tracks.to_trackdirbits() & exitdir.reachable_trackdirs()
        }
        RailKind::Crossing { axis, .. } | RailKind::Station { axis, .. } => {
            if *axis == exitdir.axis() {
                exitdir.diag_trackdir().bit()
            } else {
                TrackdirBits::empty()
            }
        }
        // A mouth is entered from behind, moving into the hole.
        RailKind::WormholeHead { dir, .. } => {
            if *dir == exitdir {
                exitdir.diag_trackdir().bit()
            } else {
                TrackdirBits::empty()
            }
        }
        // A depot is entered through its door.
        RailKind::Depot { dir, .. } => {
            if dir.opposite() == exitdir {
                exitdir.diag_trackdir().bit()
            } else {
                TrackdirBits::empty()
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
