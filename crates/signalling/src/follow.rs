//! Walking reserved chains and finding who holds them.
//!
//! A reservation is only bits on tiles, so "where does this chain end" and
//! "whose chain is this" are answered by walking the bits tile to tile.
//! Walks are pure and bounded: every step either advances over the finite
//! map or stops at a terminal rule (chain end, loop, depot, classic signal).

use bevy::prelude::*;

use crate::map::{OwnerId, RailMap, RailPos, RailTypes, SignalType, TileId};
use crate::nav::{Step, TrackWalker};
use crate::track::Track;
use crate::trains::{Train, TrainId, TrainRegistry};
use crate::waiting::is_safe_waiting_position;

/// Follow the reserved chain from `pos` to its last reserved position.
///
/// `pos` must itself be reserved. 90-degree turns are always taken: the
/// setting may have changed since the chain was laid, and the bits on the
/// map are what counts.
pub fn follow_reservation(
    map: &RailMap,
    owner: OwnerId,
    railtypes: RailTypes,
    pos: RailPos,
    ignore_oneway: bool,
) -> RailPos {
    assert!(map.is_reserved(&pos), "following an unreserved position");

    let walker = TrackWalker::new(map, owner, railtypes, true);
    let mut cur = pos;
    let mut start: Option<RailPos> = None;

    loop {
        let Some(step) = walker.follow(&cur) else {
            break;
        };

        let next = match step {
            Step::Wormhole { head, dir } => {
                let span = RailPos::wormhole(head, dir);
                if !map.is_reserved(&span) {
                    break;
                }
                span
            }
            Step::Tile {
                tile,
                trackdirs,
                exitdir,
                skipped,
                station,
            } => {
                let candidates = trackdirs & map.reserved_trackbits(tile).to_trackdirbits();
                let Some(td) = candidates.first() else {
                    if station {
                        // The walker jumped the whole platform; the chain may
                        // end on one of the cells it skipped.
                        let along = exitdir.diag_trackdir();
                        let mut back = tile;
                        for _ in 0..skipped {
                            let Some(prev) = map.step(back, exitdir.opposite()) else {
                                break;
                            };
                            back = prev;
                            if map.has_reserved_track(back, along.track()) {
                                cur = RailPos::tile(back, along);
                                break;
                            }
                        }
                    }
                    break;
                };
                // One track never carries two reserved trackdirs at once.
                debug_assert!(
                    candidates.exactly_one(),
                    "reserved chain resolves to more than one trackdir at {tile:?}"
                );
                RailPos::tile(tile, td)
            }
        };

        // A one-way signal against us: the chain cannot be the caller's own,
        // this position could never have been entered that way.
        if !ignore_oneway && map.has_oneway_signal_blocking(&next) {
            break;
        }

        cur = next;

        match start {
            // The walker can jump platforms and spans, so the loop anchor is
            // the first position actually landed on, not the argument.
            None => start = Some(cur),
            Some(anchor) if anchor == cur => break,
            Some(_) => {}
        }

        // A depot swallows the train whole; nothing continues past it.
        if let RailPos::Tile { tile, .. } = cur {
            if map.is_rail_depot(tile) {
                break;
            }
        }
        // A classic signal cannot host a path continuation.
        if map.has_signal_along(&cur) && !map.signal_type(&cur).is_some_and(SignalType::is_pbs) {
            break;
        }
    }

    cur
}

/// Find the train occupying a chain's terminal position, if any.
pub fn find_train_on_path_end(
    map: &RailMap,
    trains: &TrainRegistry,
    pos: &RailPos,
) -> Option<TrainId> {
    match pos {
        RailPos::Wormhole { head, .. } => {
            if let Some(id) = trains.lowest_in_wormhole(*head) {
                return Some(id);
            }
            // A vehicle inside may be recorded against either mouth.
            let other = map.other_wormhole_end(*head)?;
            trains.lowest_in_wormhole(other)
        }
        RailPos::Tile { tile, td } => {
            let track = td.track();
            if let Some(id) = trains.lowest_on_track(*tile, track) {
                return Some(id);
            }
            // A head tile's bit covers the span behind it, so a chain ending
            // here may be held by a train still inside the span.
            if let Some(other) = map.other_wormhole_end(*tile) {
                if let Some(id) = trains.lowest_in_wormhole(*tile) {
                    return Some(id);
                }
                return trains.lowest_in_wormhole(other);
            }
            // A platform's chain ends at its far cell while the train may
            // physically stand on an earlier one.
            if map.is_station_tile(*tile) {
                let back = td.reverse().exitdir();
                let mut t = *tile;
                while let Some(prev) = map.step(t, back) {
                    if !map.compatible_station(prev, *tile) {
                        break;
                    }
                    if let Some(id) = trains.lowest_on_track(prev, track) {
                        return Some(id);
                    }
                    t = prev;
                }
            }
            None
        }
    }
}

/// Where a train's own reservation currently ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedPathEnd {
    pub pos: RailPos,
    /// Whether the end position is a legal stopping point for the train.
    pub safe: bool,
    /// A train found sitting on the end position, when one was looked for.
    pub train_on_res: Option<TrainId>,
}

/// Follow `train`'s reservation from its current position to the end and
/// classify the end as a stopping point. With `locate` set, also scan for a
/// train occupying the end position.
pub fn follow_train_reservation(
    map: &RailMap,
    trains: &TrainRegistry,
    train: &Train,
    forbid_90deg: bool,
    locate: bool,
) -> ReservedPathEnd {
    let mut pos = *train.pos();
    let mut train_on_res = None;

    // An unreserved own position happens when two trains share a tile; any
    // reservation ahead is not ours then.
    if map.is_reserved(&pos) {
        pos = follow_reservation(map, train.owner, train.railtypes, pos, false);
        if locate {
            train_on_res = find_train_on_path_end(map, trains, &pos);
        }
    }

    let safe = is_safe_waiting_position(map, train, &pos, forbid_90deg);
    ReservedPathEnd {
        pos,
        safe,
        train_on_res,
    }
}

/// Find the train holding the reservation on `(tile, track)`.
///
/// The chain runs through the tile in one of two senses and one of them is
/// necessarily against the flow, so both probes ignore one-way restrictions
/// while following. Returns `None` for a stray reservation, an expected
/// degraded condition the caller handles as an unexplained block.
pub fn train_for_reservation(
    map: &RailMap,
    trains: &TrainRegistry,
    tile: TileId,
    track: Track,
) -> Option<TrainId> {
    assert!(
        map.has_reserved_track(tile, track),
        "owner lookup on an unreserved track"
    );
    let Some(cell) = map.cell(tile) else {
        unreachable!("reserved track implies a rail cell");
    };
    let railtypes = cell.railtype.compatible();
    let owner = cell.owner;

    let mut td = track.trackdir();
    for _ in 0..2 {
        // No chain can have been laid from behind a one-way signal, unless a
        // path signal on this sense lets it originate here.
        let blocked_entry = map.has_oneway_signal_blocking_trackdir(tile, td.reverse())
            && !map.has_pbs_signal_on_trackdir(tile, td);
        if !blocked_entry {
            let end = follow_reservation(map, owner, railtypes, RailPos::tile(tile, td), true);
            if let Some(id) = find_train_on_path_end(map, trains, &end) {
                return Some(id);
            }
        }
        td = td.reverse();
    }

    warn!(
        "stray reservation with no occupying train at {:?} / {:?}",
        tile, track
    );
    None
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::RailType;
    use crate::test_harness::RailNet;
    use crate::track::{Axis, DiagDirection, TrackBits, Trackdir, TrackdirBits};

    fn rts() -> RailTypes {
        RailType::Rail.compatible()
    }

    #[test]
    fn test_follow_ends_where_the_bits_end() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.reserve_x_run(2, 2..=5);

        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(2, 2), Trackdir::XSw),
            false,
        );
        assert_eq!(end, RailPos::tile(TileId(5, 2), Trackdir::XSw));
    }

    #[test]
    fn test_follow_single_position_chain() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.reserve(TileId(4, 2), Track::X);

        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(4, 2), Trackdir::XSw),
            false,
        );
        assert_eq!(end, RailPos::tile(TileId(4, 2), Trackdir::XSw));
    }

    #[test]
    fn test_follow_stops_at_depot() {
        let mut net = RailNet::new();
        net.x_line(3, 2..=4);
        net.depot(TileId(5, 3), DiagDirection::Ne);
        net.reserve_x_run(3, 2..=4);
        net.reserve(TileId(5, 3), Track::X);

        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(2, 3), Trackdir::XSw),
            false,
        );
        // The chain enters the depot and ends there.
        assert_eq!(end, RailPos::tile(TileId(5, 3), Trackdir::XSw));
    }

    #[test]
    fn test_follow_stops_at_classic_signal() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.reserve_x_run(2, 2..=7);
        net.signal(TileId(5, 2), Track::X, SignalType::Block, TrackdirBits::X_SW);

        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(2, 2), Trackdir::XSw),
            false,
        );
        assert_eq!(end, RailPos::tile(TileId(5, 2), Trackdir::XSw));
    }

    #[test]
    fn test_follow_passes_path_signals() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.reserve_x_run(2, 2..=7);
        net.signal(TileId(5, 2), Track::X, SignalType::Pbs, TrackdirBits::X_SW);

        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(2, 2), Trackdir::XSw),
            false,
        );
        assert_eq!(end, RailPos::tile(TileId(7, 2), Trackdir::XSw));
    }

    #[test]
    fn test_follow_respects_oneway_signal_unless_told_otherwise() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.reserve_x_run(2, 2..=7);
        // One-way path signal facing NE: travelling SW runs into its back.
        net.signal(
            TileId(5, 2),
            Track::X,
            SignalType::PbsOneway,
            TrackdirBits::X_NE,
        );

        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(2, 2), Trackdir::XSw),
            false,
        );
        assert_eq!(end, RailPos::tile(TileId(4, 2), Trackdir::XSw));

        let probed = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(2, 2), Trackdir::XSw),
            true,
        );
        assert_eq!(probed, RailPos::tile(TileId(7, 2), Trackdir::XSw));
    }

    #[test]
    fn test_follow_through_a_reserved_tunnel() {
        let mut net = RailNet::new();
        net.x_line(4, 1..=1);
        net.tunnel(TileId(2, 4), TileId(6, 4));
        net.x_line(4, 7..=8);
        net.reserve(TileId(1, 4), Track::X);
        net.reserve(TileId(2, 4), Track::X);
        net.reserve(TileId(6, 4), Track::X);
        net.reserve(TileId(7, 4), Track::X);

        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(1, 4), Trackdir::XSw),
            false,
        );
        assert_eq!(end, RailPos::tile(TileId(7, 4), Trackdir::XSw));
    }

    #[test]
    fn test_follow_stops_before_an_unreserved_tunnel() {
        let mut net = RailNet::new();
        net.x_line(4, 1..=1);
        net.tunnel(TileId(2, 4), TileId(6, 4));
        net.reserve(TileId(1, 4), Track::X);
        net.reserve(TileId(2, 4), Track::X);

        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(1, 4), Trackdir::XSw),
            false,
        );
        // The far head is unreserved, so the span is not ours.
        assert_eq!(end, RailPos::tile(TileId(2, 4), Trackdir::XSw));
    }

    #[test]
    fn test_follow_finds_chain_end_inside_a_platform() {
        let mut net = RailNet::new();
        net.x_line(3, 1..=1);
        net.station(3, 2..=6, Axis::X, 1);
        net.reserve(TileId(1, 3), Track::X);
        net.reserve(TileId(2, 3), Track::X);
        net.reserve(TileId(3, 3), Track::X);
        net.reserve(TileId(4, 3), Track::X);

        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(1, 3), Trackdir::XSw),
            false,
        );
        // The walker jumps to the platform end at x=6; the chain actually
        // ends at x=4 and is found by scanning back.
        assert_eq!(end, RailPos::tile(TileId(4, 3), Trackdir::XSw));
    }

    #[test]
    fn test_follow_terminates_on_a_loop() {
        let mut net = RailNet::new();
        // A closed ring of four corner pieces around one shared corner.
        net.plain(TileId(3, 3), TrackBits::LOWER);
        net.plain(TileId(3, 4), TrackBits::LEFT);
        net.plain(TileId(4, 4), TrackBits::UPPER);
        net.plain(TileId(4, 3), TrackBits::RIGHT);
        net.reserve(TileId(3, 3), Track::Lower);
        net.reserve(TileId(3, 4), Track::Left);
        net.reserve(TileId(4, 4), Track::Upper);
        net.reserve(TileId(4, 3), Track::Right);

        // Must terminate: the walk stops when it comes back around to the
        // first position it landed on.
        let end = follow_reservation(
            &net.map,
            RailNet::OWNER,
            rts(),
            RailPos::tile(TileId(3, 3), Trackdir::LowerE),
            false,
        );
        assert_eq!(end, RailPos::tile(TileId(3, 4), Trackdir::LeftS));
    }

    #[test]
    fn test_locator_scans_platform_backward() {
        let mut net = RailNet::new();
        net.x_line(3, 1..=1);
        net.station(3, 2..=5, Axis::X, 1);

        // Train physically on the second platform cell.
        let id = net.spawn_train(&[
            RailPos::tile(TileId(3, 3), Trackdir::XSw),
            RailPos::tile(TileId(2, 3), Trackdir::XSw),
        ]);

        // Chain reported at the platform's far end.
        let found = find_train_on_path_end(
            &net.map,
            &net.trains,
            &RailPos::tile(TileId(5, 3), Trackdir::XSw),
        );
        assert_eq!(found, Some(id));
    }

    #[test]
    fn test_locator_checks_both_wormhole_mouths() {
        let mut net = RailNet::new();
        net.tunnel(TileId(2, 4), TileId(6, 4));

        let id = net.spawn_train(&[RailPos::wormhole(TileId(6, 4), DiagDirection::Sw)]);
        // Reported against the other mouth.
        let found = find_train_on_path_end(
            &net.map,
            &net.trains,
            &RailPos::wormhole(TileId(2, 4), DiagDirection::Ne),
        );
        assert_eq!(found, Some(id));
    }

    #[test]
    fn test_follow_train_reservation_unreserved_start() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        let id = net.spawn_train(&[RailPos::tile(TileId(4, 2), Trackdir::XSw)]);
        let train = net.trains.get(id).unwrap().clone();

        let end = follow_train_reservation(&net.map, &net.trains, &train, false, true);
        // No reservation under the train: its own position comes back.
        assert_eq!(end.pos, *train.pos());
        assert!(!end.safe);
        assert_eq!(end.train_on_res, None);
    }

    #[test]
    fn test_follow_train_reservation_to_safe_end() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.signal(TileId(6, 2), Track::X, SignalType::Pbs, TrackdirBits::X_SW);
        net.reserve_x_run(2, 3..=5);
        let id = net.spawn_train(&[RailPos::tile(TileId(3, 2), Trackdir::XSw)]);
        let train = net.trains.get(id).unwrap().clone();

        let end = follow_train_reservation(&net.map, &net.trains, &train, false, true);
        assert_eq!(end.pos, RailPos::tile(TileId(5, 2), Trackdir::XSw));
        // The spot right before a path signal is a legal stop.
        assert!(end.safe);
        assert_eq!(end.train_on_res, None);
    }

    #[test]
    fn test_follow_train_reservation_reports_train_on_end() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.reserve_x_run(2, 3..=5);
        let id = net.spawn_train(&[RailPos::tile(TileId(3, 2), Trackdir::XSw)]);
        let other = net.spawn_train(&[RailPos::tile(TileId(5, 2), Trackdir::XNe)]);
        let train = net.trains.get(id).unwrap().clone();

        let end = follow_train_reservation(&net.map, &net.trains, &train, false, true);
        assert_eq!(end.train_on_res, Some(other));
    }

    #[test]
    fn test_train_for_reservation_finds_owner_from_either_sense() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.reserve_x_run(2, 3..=6);
        let id = net.spawn_train(&[RailPos::tile(TileId(3, 2), Trackdir::XSw)]);

        assert_eq!(
            train_for_reservation(&net.map, &net.trains, TileId(5, 2), Track::X),
            Some(id)
        );
    }

    #[test]
    fn test_train_for_reservation_skips_direction_behind_oneway_signal() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.reserve_x_run(2, 3..=6);
        // A one-way block signal facing NE at the query tile: the chain can
        // only have been laid travelling NE, so the NE-bound probe (walking
        // away from whoever laid it) is skipped outright and the owner is
        // found by the SW-bound probe alone.
        net.signal(TileId(5, 2), Track::X, SignalType::Block, TrackdirBits::X_NE);
        let id = net.spawn_train(&[RailPos::tile(TileId(6, 2), Trackdir::XNe)]);

        assert_eq!(
            train_for_reservation(&net.map, &net.trains, TileId(5, 2), Track::X),
            Some(id)
        );
    }

    #[test]
    fn test_stray_reservation_reports_none() {
        let mut net = RailNet::new();
        net.x_line(2, 2..=8);
        net.reserve_x_run(2, 3..=6);

        assert_eq!(
            train_for_reservation(&net.map, &net.trains, TileId(5, 2), Track::X),
            None
        );
    }
}
