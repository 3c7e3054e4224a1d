//! RailNet: headless world builder for tests and benches.
//!
//! Wraps a `RailMap` plus a `TrainRegistry` and offers terse builders for
//! the layouts the reservation tests need: straight runs, platforms,
//! tunnels, depots, crossings, signals, and trains. Everything is owned by
//! one company on conventional rail unless a test pokes the cells directly.

use std::ops::RangeInclusive;

use crate::map::{
    OwnerId, RailCell, RailKind, RailMap, RailPos, RailType, SignalType, StationId, TileId,
    TrackSignal, WormholeKind,
};
use crate::notify::NullEffects;
use crate::reservation::try_reserve_track;
use crate::track::{Axis, DiagDirection, Track, TrackBits, TrackdirBits};
use crate::trains::{TrainId, TrainRegistry};

pub struct RailNet {
    pub map: RailMap,
    pub trains: TrainRegistry,
}

impl RailNet {
    pub const OWNER: OwnerId = OwnerId(1);

    pub fn new() -> Self {
        Self {
            map: RailMap::default(),
            trains: TrainRegistry::default(),
        }
    }

    fn cell(kind: RailKind) -> RailCell {
        RailCell {
            owner: Self::OWNER,
            railtype: RailType::Rail,
            kind,
        }
    }

    pub fn plain(&mut self, tile: TileId, tracks: TrackBits) {
        self.map.place(
            tile,
            Self::cell(RailKind::Plain {
                tracks,
                reserved: TrackBits::empty(),
                signal: None,
            }),
        );
    }

    /// A straight NE-SW run on row `y` covering the given x range.
    pub fn x_line(&mut self, y: usize, xs: RangeInclusive<usize>) {
        for x in xs {
            self.plain(TileId(x, y), TrackBits::X);
        }
    }

    /// A platform on row `y` covering the given x range.
    pub fn station(&mut self, y: usize, xs: RangeInclusive<usize>, axis: Axis, id: StationId) {
        for x in xs {
            self.map.place(
                TileId(x, y),
                Self::cell(RailKind::Station {
                    axis,
                    station: id,
                    waypoint: false,
                    reserved: false,
                    random_bits: 0,
                }),
            );
        }
    }

    /// Like `station`, but an extended waypoint.
    pub fn waypoint(&mut self, y: usize, xs: RangeInclusive<usize>, axis: Axis, id: StationId) {
        for x in xs {
            self.map.place(
                TileId(x, y),
                Self::cell(RailKind::Station {
                    axis,
                    station: id,
                    waypoint: true,
                    reserved: false,
                    random_bits: 0,
                }),
            );
        }
    }

    pub fn crossing(&mut self, tile: TileId, axis: Axis) {
        self.map.place(
            tile,
            Self::cell(RailKind::Crossing {
                axis,
                reserved: false,
                barred: false,
            }),
        );
    }

    pub fn depot(&mut self, tile: TileId, dir: DiagDirection) {
        self.map
            .place(tile, Self::cell(RailKind::Depot { dir, reserved: false }));
    }

    /// A tunnel between two colinear head tiles; the span in between stays
    /// empty map.
    pub fn tunnel(&mut self, a: TileId, b: TileId) {
        let dir_ab = if a.1 == b.1 {
            assert!(a.0 != b.0, "tunnel needs two distinct heads");
            if a.0 < b.0 {
                DiagDirection::Sw
            } else {
                DiagDirection::Ne
            }
        } else {
            assert_eq!(a.0, b.0, "tunnel heads must share a row or column");
            if a.1 < b.1 {
                DiagDirection::Se
            } else {
                DiagDirection::Nw
            }
        };
        self.map.place(
            a,
            Self::cell(RailKind::WormholeHead {
                kind: WormholeKind::Tunnel,
                dir: dir_ab,
                other_end: b,
                reserved: false,
            }),
        );
        self.map.place(
            b,
            Self::cell(RailKind::WormholeHead {
                kind: WormholeKind::Tunnel,
                dir: dir_ab.opposite(),
                other_end: a,
                reserved: false,
            }),
        );
    }

    pub fn signal(&mut self, tile: TileId, track: Track, ty: SignalType, dirs: TrackdirBits) {
        self.map.set_signal(tile, Some(TrackSignal { track, ty, dirs }));
    }

    /// Claim one track, asserting the claim sticks.
    pub fn reserve(&mut self, tile: TileId, track: Track) {
        assert!(
            try_reserve_track(&mut self.map, tile, track, false, &mut NullEffects),
            "fixture claim failed at {tile:?}"
        );
    }

    /// Claim the X track across a run of tiles on row `y`.
    pub fn reserve_x_run(&mut self, y: usize, xs: RangeInclusive<usize>) {
        for x in xs {
            self.reserve(TileId(x, y), Track::X);
        }
    }

    pub fn spawn_train(&mut self, units: &[RailPos]) -> TrainId {
        self.trains
            .spawn(Self::OWNER, RailType::Rail.compatible(), units.to_vec())
    }
}

impl Default for RailNet {
    fn default() -> Self {
        Self::new()
    }
}
