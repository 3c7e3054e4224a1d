//! Classification of stopping points.
//!
//! "Safe" and "free" are different questions about the same two positions
//! (the spot itself plus one step of lookahead), and callers on the hot
//! path usually need only one of them. The checking mode picks which parts
//! of the inspection actually run.

use crate::map::{RailMap, RailPos, SignalType};
use crate::nav::{Step, TrackWalker};
use crate::trains::Train;

/// Verdict about a waiting position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// A train must not stop here at all.
    Unsafe,
    /// Safe and, when freedom was checked, unoccupied.
    Free,
    /// Safe but currently claimed.
    Busy,
}

/// What `check_waiting_position` is asked to find out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Both answers: `Unsafe`, `Free` or `Busy`.
    Full,
    /// Safety only. Returns `Free` unless the position is `Unsafe`;
    /// occupancy is not inspected.
    SafeOnly,
    /// Freedom only. The caller vouches the position is already safe;
    /// behaviour on an unsafe position is unspecified.
    FreeOnly,
    /// Both, with an early exit: `Busy` is returned as soon as the position
    /// is known not to be free, without finishing the safety analysis.
    SafeAndFree,
}

/// Analyse `pos` as a stopping point for `train`.
pub fn check_waiting_position(
    map: &RailMap,
    train: &Train,
    pos: &RailPos,
    forbid_90deg: bool,
    mode: CheckMode,
) -> WaitState {
    let state = match pos {
        RailPos::Wormhole { .. } => {
            if mode != CheckMode::SafeOnly && map.is_reserved(pos) {
                // A claimed span can never be a free waiting position.
                if mode != CheckMode::Full {
                    return WaitState::Busy;
                }
                WaitState::Busy
            } else {
                WaitState::Free
            }
        }
        RailPos::Tile { tile, td } => {
            // A depot entrance is always safe and free iff unclaimed; no
            // lookahead applies, the train stops fully inside.
            if map
                .depot_dir(*tile)
                .is_some_and(|dir| *td == dir.opposite().diag_trackdir())
            {
                return if map.has_reserved_track(*tile, td.track()) {
                    WaitState::Busy
                } else {
                    WaitState::Free
                };
            }

            // For classic signals the stopping point is the signal tile
            // itself, and such positions are safe by definition.
            if map.has_signal_along(pos) && !map.signal_type(pos).is_some_and(SignalType::is_pbs)
            {
                if mode == CheckMode::SafeOnly {
                    return WaitState::Free;
                }
                return if map.has_reserved_track(*tile, td.track()) {
                    WaitState::Busy
                } else {
                    WaitState::Free
                };
            }

            if mode != CheckMode::SafeOnly
                && map.reserved_trackbits(*tile).conflicts_with(td.track())
            {
                if mode != CheckMode::Full {
                    return WaitState::Busy;
                }
                WaitState::Busy
            } else {
                WaitState::Free
            }
        }
    };

    // One step of lookahead. No successor means end of track, which is a
    // safe spot by definition.
    let walker = TrackWalker::new(map, train.owner, train.railtypes, !forbid_90deg);
    let Some(step) = walker.follow(pos) else {
        return state;
    };

    let (next, resolved) = match step {
        Step::Wormhole { head, dir } => (RailPos::wormhole(head, dir), true),
        Step::Tile {
            tile, trackdirs, ..
        } => {
            let Some(td) = trackdirs.first() else {
                return state;
            };
            (RailPos::tile(tile, td), trackdirs.exactly_one())
        }
    };
    debug_assert!(state == WaitState::Free || mode == CheckMode::Full);

    if mode != CheckMode::FreeOnly {
        // The position ahead must resolve to a single trackdir guarded the
        // right way, or stopping here could strand us against traffic.
        if !resolved {
            return WaitState::Unsafe;
        }
        if map.has_signal_along(&next) {
            if !map.signal_type(&next).is_some_and(SignalType::is_pbs) {
                return WaitState::Unsafe;
            }
        } else if map.has_signal_against(&next) {
            if map.signal_type(&next) != Some(SignalType::PbsOneway) {
                return WaitState::Unsafe;
            }
        } else {
            // No signal at all ahead.
            return WaitState::Unsafe;
        }
        if mode == CheckMode::SafeOnly {
            return WaitState::Free;
        }
        if state != WaitState::Free {
            return WaitState::Busy;
        }
    } else if let RailPos::Tile { tile, .. } = pos {
        if !map.is_station_tile(*tile) {
            // The caller vouched for safety; in debug builds, hold them to it.
            debug_assert!(resolved);
            debug_assert!(map.signal_type(&next).is_some_and(SignalType::is_pbs));
        }
    }

    debug_assert!(state == WaitState::Free);
    if map.is_reserved(&next) {
        WaitState::Busy
    } else {
        WaitState::Free
    }
}

/// Whether `pos` is a spot where `train` may legally come to a stand.
pub fn is_safe_waiting_position(
    map: &RailMap,
    train: &Train,
    pos: &RailPos,
    forbid_90deg: bool,
) -> bool {
    check_waiting_position(map, train, pos, forbid_90deg, CheckMode::SafeOnly) != WaitState::Unsafe
}

/// Whether the known-safe position `pos` is currently unclaimed.
pub fn is_waiting_position_free(
    map: &RailMap,
    train: &Train,
    pos: &RailPos,
    forbid_90deg: bool,
) -> bool {
    check_waiting_position(map, train, pos, forbid_90deg, CheckMode::FreeOnly) == WaitState::Free
}

// =============================================================================
// Tests
// =============================================================================
