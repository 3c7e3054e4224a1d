//! The per-segment claim and release API.
//!
//! Every claim is a single atomic test-and-set on one tile; a multi-tile
//! reservation is built by claiming segment after segment, and a caller that
//! fails halfway must release what it already holds. Release is
//! unconditional and idempotent. Platform cells are the one exception:
//! trains occupy a platform whole, so platforms are claimed and released as
//! one unit.

use crate::map::{RailKind, RailMap, RailPos, TileId};
use crate::notify::ReservationEffects;
use crate::track::{DiagDirection, Track};
use crate::trains::TrainRegistry;

/// Try to claim `track` on `tile`. Returns true iff the track was free and
/// does not cross an already reserved track.
///
/// Panics when the tile does not physically carry `track`: a caller asking
/// for that has desynchronized from the map.
pub fn try_reserve_track(
    map: &mut RailMap,
    tile: TileId,
    track: Track,
    trigger_stations: bool,
    fx: &mut dyn ReservationEffects,
) -> bool {
    assert!(
        map.trackbits(tile).contains(track.bit()),
        "reserving {track:?} on {tile:?} which does not carry it"
    );

    // Viewers drawing reservations may need a redraw whether or not the
    // claim sticks.
    fx.reservation_changed(tile);

    let Some(cell) = map.cell_mut(tile) else {
        unreachable!("tile with trackbits has a cell");
    };
    if !cell.kind.try_reserve(track) {
        return false;
    }

    match &cell.kind {
        RailKind::Plain { .. } | RailKind::WormholeHead { .. } => {}
        // The claim just dropped the gates.
        RailKind::Crossing { .. } => fx.tile_changed(tile),
        // Some depot graphics depend on the claim.
        RailKind::Depot { .. } => fx.tile_changed(tile),
        RailKind::Station { waypoint, .. } => {
            fx.tile_changed(tile);
            if trigger_stations && !*waypoint {
                fx.station_reserved(tile);
            }
        }
    }
    true
}

/// Release any claim on `track` at `tile`. Releasing a free track is a
/// no-op; this never fails.
pub fn unreserve_track(
    map: &mut RailMap,
    trains: &TrainRegistry,
    tile: TileId,
    track: Track,
    fx: &mut dyn ReservationEffects,
) {
    assert!(
        map.trackbits(tile).contains(track.bit()),
        "releasing {track:?} on {tile:?} which does not carry it"
    );

    fx.reservation_changed(tile);

    let Some(cell) = map.cell_mut(tile) else {
        unreachable!("tile with trackbits has a cell");
    };
    cell.kind.unreserve(track);

    match &cell.kind {
        RailKind::Plain { .. } | RailKind::WormholeHead { .. } => return,
        // The gates may lift now, unless a train still sits on the rail.
        RailKind::Crossing { .. } => {}
        RailKind::Depot { .. } | RailKind::Station { .. } => {
            fx.tile_changed(tile);
            return;
        }
    }
    update_level_crossing(map, trains, tile, fx);
}

/// Re-derive a crossing's gate state: closed while the rail is reserved or
/// a train physically occupies the cell.
pub fn update_level_crossing(
    map: &mut RailMap,
    trains: &TrainRegistry,
    tile: TileId,
    fx: &mut dyn ReservationEffects,
) {
    let occupied = trains.any_unit_on_tile(tile);
    if let Some(cell) = map.cell_mut(tile) {
        if let RailKind::Crossing {
            reserved, barred, ..
        } = &mut cell.kind
        {
            let should_bar = *reserved || occupied;
            if *barred != should_bar {
                *barred = should_bar;
                fx.tile_changed(tile);
            }
        }
    }
}

/// Set the reservation of the whole platform starting at `start` towards
/// `dir` to `value`, stopping at the first cell that belongs to a different
/// platform.
///
/// Panics unless `start` is a station cell aligned with `dir`.
pub fn set_platform_reservation(
    map: &mut RailMap,
    start: TileId,
    dir: DiagDirection,
    value: bool,
    fx: &mut dyn ReservationEffects,
) {
    let Some(RailKind::Station { axis, .. }) = map.cell(start).map(|c| &c.kind) else {
        panic!("platform reservation outside a station at {start:?}");
    };
    assert_eq!(*axis, dir.axis(), "platform walked across its axis");

    let mut tile = start;
    loop {
        if let Some(cell) = map.cell_mut(tile) {
            if let RailKind::Station { reserved, .. } = &mut cell.kind {
                *reserved = value;
            }
        }
        fx.tile_changed(tile);
        match map.step(tile, dir) {
            Some(next) if map.compatible_station(next, start) => tile = next,
            _ => break,
        }
    }
}

/// `set_platform_reservation` addressed by a position instead of a tile and
/// direction. The position must not be inside a wormhole.
pub fn set_platform_reservation_from(
    map: &mut RailMap,
    pos: &RailPos,
    value: bool,
    fx: &mut dyn ReservationEffects,
) {
    let RailPos::Tile { tile, td } = pos else {
        panic!("platform reservation from inside a wormhole");
    };
    set_platform_reservation(map, *tile, td.exitdir(), value, fx);
}

// =============================================================================
// Tests
// =============================================================================
