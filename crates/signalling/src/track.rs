//! Track and direction algebra for the rail grid.
//!
//! A tile is a diamond with four edges (NE, SE, SW, NW) and can carry up to
//! six track elements: the two diagonals and the four corner pieces. A
//! `Trackdir` is a track element plus a sense of travel over it; every walk
//! across the network is expressed in trackdirs.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// =============================================================================
// Tracks
// =============================================================================

/// One of the six track elements a tile can carry.
///
/// `X` runs NE-SW through the middle, `Y` runs NW-SE. The corner pieces
/// connect two adjacent edges: `Upper` (NW-NE), `Lower` (SW-SE),
/// `Left` (NW-SW), `Right` (NE-SE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Track {
    X = 0,
    Y = 1,
    Upper = 2,
    Lower = 3,
    Left = 4,
    Right = 5,
}

impl Track {
    pub const ALL: [Track; 6] = [
        Track::X,
        Track::Y,
        Track::Upper,
        Track::Lower,
        Track::Left,
        Track::Right,
    ];

    pub fn bit(self) -> TrackBits {
        TrackBits::from_bits_truncate(1 << self as u8)
    }

    /// The forward-sense trackdir over this track.
    pub fn trackdir(self) -> Trackdir {
        match self {
            Track::X => Trackdir::XNe,
            Track::Y => Trackdir::YSe,
            Track::Upper => Trackdir::UpperE,
            Track::Lower => Trackdir::LowerE,
            Track::Left => Trackdir::LeftS,
            Track::Right => Trackdir::RightS,
        }
    }
}

bitflags! {
    /// Set of track elements on a tile.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TrackBits: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const UPPER = 1 << 2;
        const LOWER = 1 << 3;
        const LEFT = 1 << 4;
        const RIGHT = 1 << 5;
        /// The one two-track layout with parallel corner pieces north/south.
        const HORZ = Self::UPPER.bits() | Self::LOWER.bits();
        /// The one two-track layout with parallel corner pieces west/east.
        const VERT = Self::LEFT.bits() | Self::RIGHT.bits();
    }
}

impl Serialize for TrackBits {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for TrackBits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u8::deserialize(deserializer)?;
        Self::from_bits(bits).ok_or_else(|| serde::de::Error::custom("invalid track bits"))
    }
}

impl TrackBits {
    /// Both senses of travel over every track in the set.
    pub fn to_trackdirbits(self) -> TrackdirBits {
        let b = self.bits() as u16;
        TrackdirBits::from_bits_truncate(b | (b << 8))
    }

    /// True when the set describes physically intersecting tracks. Only the
    /// two parallel corner pairs (and single tracks) do not intersect.
    pub fn overlapping(self) -> bool {
        if self.bits().count_ones() <= 1 {
            return false;
        }
        self != TrackBits::HORZ && self != TrackBits::VERT
    }

    /// True when `track` is in the set or physically crosses a track in it.
    pub fn conflicts_with(self, track: Track) -> bool {
        self.contains(track.bit()) || (self | track.bit()).overlapping()
    }
}

// =============================================================================
// Trackdirs
// =============================================================================

/// A track element plus a sense of travel over it.
///
/// The suffix names the cardinal heading: `XNe` travels the X diagonal
/// towards the NE edge, `LeftN` travels the Left corner piece northwards.
/// Discriminants of reversed senses are the forward value plus 8, so the
/// numbering has a gap at 6 and 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Trackdir {
    XNe = 0,
    YSe = 1,
    UpperE = 2,
    LowerE = 3,
    LeftS = 4,
    RightS = 5,
    XSw = 8,
    YNw = 9,
    UpperW = 10,
    LowerW = 11,
    LeftN = 12,
    RightN = 13,
}

impl Trackdir {
    pub const ALL: [Trackdir; 12] = [
        Trackdir::XNe,
        Trackdir::YSe,
        Trackdir::UpperE,
        Trackdir::LowerE,
        Trackdir::LeftS,
        Trackdir::RightS,
        Trackdir::XSw,
        Trackdir::YNw,
        Trackdir::UpperW,
        Trackdir::LowerW,
        Trackdir::LeftN,
        Trackdir::RightN,
    ];

    pub fn from_index(i: u8) -> Option<Trackdir> {
        match i {
            0 => Some(Trackdir::XNe),
            1 => Some(Trackdir::YSe),
            2 => Some(Trackdir::UpperE),
            3 => Some(Trackdir::LowerE),
            4 => Some(Trackdir::LeftS),
            5 => Some(Trackdir::RightS),
            8 => Some(Trackdir::XSw),
            9 => Some(Trackdir::YNw),
            10 => Some(Trackdir::UpperW),
            11 => Some(Trackdir::LowerW),
            12 => Some(Trackdir::LeftN),
            13 => Some(Trackdir::RightN),
            _ => None,
        }
    }

    pub fn track(self) -> Track {
        match self {
            Trackdir::XNe | Trackdir::XSw => Track::X,
            Trackdir::YSe | Trackdir::YNw => Track::Y,
            Trackdir::UpperE | Trackdir::UpperW => Track::Upper,
            Trackdir::LowerE | Trackdir::LowerW => Track::Lower,
            Trackdir::LeftS | Trackdir::LeftN => Track::Left,
            Trackdir::RightS | Trackdir::RightN => Track::Right,
        }
    }

    pub fn reverse(self) -> Trackdir {
        match self {
            Trackdir::XNe => Trackdir::XSw,
            Trackdir::YSe => Trackdir::YNw,
            Trackdir::UpperE => Trackdir::UpperW,
            Trackdir::LowerE => Trackdir::LowerW,
            Trackdir::LeftS => Trackdir::LeftN,
            Trackdir::RightS => Trackdir::RightN,
            Trackdir::XSw => Trackdir::XNe,
            Trackdir::YNw => Trackdir::YSe,
            Trackdir::UpperW => Trackdir::UpperE,
            Trackdir::LowerW => Trackdir::LowerE,
            Trackdir::LeftN => Trackdir::LeftS,
            Trackdir::RightN => Trackdir::RightS,
        }
    }

    pub fn bit(self) -> TrackdirBits {
        TrackdirBits::from_bits_truncate(1 << self as u8)
    }

    /// The tile edge crossed when leaving the tile along this trackdir.
    pub fn exitdir(self) -> DiagDirection {
        match self {
            Trackdir::XNe => DiagDirection::Ne,
            Trackdir::YSe => DiagDirection::Se,
            Trackdir::UpperE => DiagDirection::Ne,
            Trackdir::LowerE => DiagDirection::Se,
            Trackdir::LeftS => DiagDirection::Sw,
            Trackdir::RightS => DiagDirection::Se,
            Trackdir::XSw => DiagDirection::Sw,
            Trackdir::YNw => DiagDirection::Nw,
            Trackdir::UpperW => DiagDirection::Nw,
            Trackdir::LowerW => DiagDirection::Sw,
            Trackdir::LeftN => DiagDirection::Nw,
            Trackdir::RightN => DiagDirection::Ne,
        }
    }

    /// Trackdirs in the adjacent tile that would make a 90-degree turn when
    /// taken directly after this one.
    pub fn crossing_trackdirs(self) -> TrackdirBits {
        match self.track() {
            Track::X => TrackdirBits::Y_SE | TrackdirBits::Y_NW,
            Track::Y => TrackdirBits::X_NE | TrackdirBits::X_SW,
            Track::Upper => TrackdirBits::LEFT_N | TrackdirBits::RIGHT_N,
            Track::Lower => TrackdirBits::LEFT_S | TrackdirBits::RIGHT_S,
            Track::Left => TrackdirBits::UPPER_W | TrackdirBits::LOWER_W,
            Track::Right => TrackdirBits::UPPER_E | TrackdirBits::LOWER_E,
        }
    }
}

bitflags! {
    /// Set of trackdirs. Bit positions mirror the `Trackdir` discriminants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TrackdirBits: u16 {
        const X_NE = 1 << 0;
        const Y_SE = 1 << 1;
        const UPPER_E = 1 << 2;
        const LOWER_E = 1 << 3;
        const LEFT_S = 1 << 4;
        const RIGHT_S = 1 << 5;
        const X_SW = 1 << 8;
        const Y_NW = 1 << 9;
        const UPPER_W = 1 << 10;
        const LOWER_W = 1 << 11;
        const LEFT_N = 1 << 12;
        const RIGHT_N = 1 << 13;
    }
}

impl Serialize for TrackdirBits {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for TrackdirBits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u16::deserialize(deserializer)?;
        Self::from_bits(bits).ok_or_else(|| serde::de::Error::custom("invalid trackdir bits"))
    }
}

impl TrackdirBits {
    /// The lowest-numbered trackdir in the set, or `None` when empty.
    pub fn first(self) -> Option<Trackdir> {
        Trackdir::from_index(self.bits().trailing_zeros() as u8)
    }

    pub fn exactly_one(self) -> bool {
        self.bits().count_ones() == 1
    }

    pub fn to_trackbits(self) -> TrackBits {
        TrackBits::from_bits_truncate((self.bits() | (self.bits() >> 8)) as u8)
    }
}

// =============================================================================
// Diagonal directions and axes
// =============================================================================

/// One of the four tile edges, which double as the four movement directions
/// between adjacent tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DiagDirection {
    Ne = 0,
    Se = 1,
    Sw = 2,
    Nw = 3,
}

impl DiagDirection {
    pub const ALL: [DiagDirection; 4] = [
        DiagDirection::Ne,
        DiagDirection::Se,
        DiagDirection::Sw,
        DiagDirection::Nw,
    ];

    pub fn opposite(self) -> DiagDirection {
        match self {
            DiagDirection::Ne => DiagDirection::Sw,
            DiagDirection::Se => DiagDirection::Nw,
            DiagDirection::Sw => DiagDirection::Ne,
            DiagDirection::Nw => DiagDirection::Se,
        }
    }

    pub fn axis(self) -> Axis {
        match self {
            DiagDirection::Ne | DiagDirection::Sw => Axis::X,
            DiagDirection::Se | DiagDirection::Nw => Axis::Y,
        }
    }

    /// The straight trackdir that travels in this direction.
    pub fn diag_trackdir(self) -> Trackdir {
        match self {
            DiagDirection::Ne => Trackdir::XNe,
            DiagDirection::Se => Trackdir::YSe,
            DiagDirection::Sw => Trackdir::XSw,
            DiagDirection::Nw => Trackdir::YNw,
        }
    }

    /// Trackdirs that can be ridden on a tile entered while moving in this
    /// direction, before intersecting with what the tile actually carries.
    pub fn reachable_trackdirs(self) -> TrackdirBits {
        match self {
            DiagDirection::Ne => {
                TrackdirBits::X_NE | TrackdirBits::LOWER_E | TrackdirBits::LEFT_N
            }
            DiagDirection::Se => {
                TrackdirBits::Y_SE | TrackdirBits::UPPER_E | TrackdirBits::LEFT_S
            }
            DiagDirection::Sw => {
                TrackdirBits::X_SW | TrackdirBits::UPPER_W | TrackdirBits::RIGHT_S
            }
            DiagDirection::Nw => {
                TrackdirBits::Y_NW | TrackdirBits::LOWER_W | TrackdirBits::RIGHT_N
            }
        }
    }
}

/// Orientation of a straight piece of rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// NE-SW.
    X,
    /// NW-SE.
    Y,
}

impl Axis {
    pub fn track(self) -> Track {
        match self {
            Axis::X => Track::X,
            Axis::Y => Track::Y,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trackdir_reverse_is_involution() {
        for td in Trackdir::ALL {
            assert_eq!(td.reverse().reverse(), td);
            assert_eq!(td.reverse().track(), td.track());
            assert_ne!(td.reverse(), td);
        }
    }

    #[test]
    fn test_trackdir_bit_roundtrip() {
        for td in Trackdir::ALL {
            assert_eq!(td.bit().first(), Some(td));
            assert!(td.bit().exactly_one());
        }
        assert_eq!(TrackdirBits::empty().first(), None);
    }

    #[test]
    fn test_exitdirs_of_reverse_senses_are_opposite_for_diagonals() {
        assert_eq!(Trackdir::XNe.exitdir(), DiagDirection::Ne);
        assert_eq!(Trackdir::XSw.exitdir(), DiagDirection::Sw);
        assert_eq!(Trackdir::YSe.exitdir(), DiagDirection::Se);
        assert_eq!(Trackdir::YNw.exitdir(), DiagDirection::Nw);
    }

    #[test]
    fn test_reachable_trackdirs_exit_away_from_entry_edge() {
        // A trackdir reachable when entering in direction d must not exit
        // through the edge it was entered from.
        for d in DiagDirection::ALL {
            for td in Trackdir::ALL {
                if d.reachable_trackdirs().contains(td.bit()) {
                    assert_ne!(
                        td.exitdir(),
                        d.opposite(),
                        "{td:?} entered moving {d:?} exits backwards"
                    );
                }
            }
        }
    }

    #[test]
    fn test_diag_trackdir_is_reachable_when_entering() {
        for d in DiagDirection::ALL {
            assert!(d.reachable_trackdirs().contains(d.diag_trackdir().bit()));
            assert_eq!(d.diag_trackdir().exitdir(), d);
        }
    }

    #[test]
    fn test_trackbits_to_trackdirbits_has_both_senses() {
        let tds = TrackBits::X.to_trackdirbits();
        assert!(tds.contains(TrackdirBits::X_NE));
        assert!(tds.contains(TrackdirBits::X_SW));
        assert_eq!(tds.to_trackbits(), TrackBits::X);

        let both = (TrackBits::UPPER | TrackBits::LOWER).to_trackdirbits();
        assert_eq!(both.bits().count_ones(), 4);
    }

    #[test]
    fn test_overlap_rules() {
        assert!(!TrackBits::X.overlapping());
        assert!(!TrackBits::HORZ.overlapping());
        assert!(!TrackBits::VERT.overlapping());
        assert!((TrackBits::X | TrackBits::Y).overlapping());
        assert!((TrackBits::UPPER | TrackBits::LEFT).overlapping());

        // A reserved track conflicts with itself.
        assert!(TrackBits::UPPER.conflicts_with(Track::Upper));
        // Parallel corner pieces can be reserved independently.
        assert!(!TrackBits::UPPER.conflicts_with(Track::Lower));
        assert!(TrackBits::X.conflicts_with(Track::Y));
        assert!(!TrackBits::empty().conflicts_with(Track::X));
    }

    #[test]
    fn test_crossing_trackdirs_are_90_degree_turns() {
        // On the X diagonal, the Y diagonal in the next tile is a 90 degree
        // turn in both senses.
        let cross = Trackdir::XNe.crossing_trackdirs();
        assert!(cross.contains(TrackdirBits::Y_SE));
        assert!(cross.contains(TrackdirBits::Y_NW));
        // Corner piece: heading east over Upper, a turn to north is 90 deg.
        assert!(Trackdir::UpperE
            .crossing_trackdirs()
            .contains(TrackdirBits::LEFT_N));
    }

    #[test]
    fn test_track_forward_trackdir() {
        for track in Track::ALL {
            assert_eq!(track.trackdir().track(), track);
        }
    }

    #[test]
    fn test_axis_track() {
        assert_eq!(Axis::X.track(), Track::X);
        assert_eq!(Axis::Y.track(), Track::Y);
        assert_eq!(DiagDirection::Ne.axis(), Axis::X);
        assert_eq!(DiagDirection::Nw.axis(), Axis::Y);
    }
}
