//! Screen rotation algebra
//!
//! A [`Rotation`] is one of four counter-clockwise angles optionally combined
//! with a reflection about the logical X and/or Y axis, as negotiated over
//! RandR. Composition follows the X server's convention: angles add modulo
//! 360° and reflections toggle.
//!
//! Coordinates come in two frames:
//! - **physical**: the panel's native scan order, `pw × ph` pixels;
//! - **logical**: what clients draw into, `pw × ph` or `ph × pw` depending on
//!   whether the angle swaps axes.

use embedded_graphics::prelude::{Point, Size};

/// Counter-clockwise rotation angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Angle {
    /// No rotation.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "0"))]
    Deg0,
    /// Quarter turn.
    #[cfg_attr(feature = "serde", serde(rename = "90"))]
    Deg90,
    /// Half turn.
    #[cfg_attr(feature = "serde", serde(rename = "180"))]
    Deg180,
    /// Three-quarter turn.
    #[cfg_attr(feature = "serde", serde(rename = "270"))]
    Deg270,
}

impl Angle {
    const ALL: [Self; 4] = [Self::Deg0, Self::Deg90, Self::Deg180, Self::Deg270];

    /// Number of quarter turns (0–3).
    #[must_use]
    pub const fn quarter_turns(self) -> u8 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 1,
            Self::Deg180 => 2,
            Self::Deg270 => 3,
        }
    }

    /// Angle from a quarter-turn count, modulo four.
    #[must_use]
    pub const fn from_quarter_turns(turns: u8) -> Self {
        Self::ALL[(turns % 4) as usize]
    }

    /// Angle in degrees.
    #[must_use]
    pub const fn degrees(self) -> u32 {
        self.quarter_turns() as u32 * 90
    }

    /// True for 90° and 270°.
    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

bitflags::bitflags! {
    /// RandR rotation / reflection bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RotationSet: u16 {
        /// 0°.
        const ROTATE_0 = 1;
        /// 90°.
        const ROTATE_90 = 2;
        /// 180°.
        const ROTATE_180 = 4;
        /// 270°.
        const ROTATE_270 = 8;
        /// Mirror the X axis.
        const REFLECT_X = 16;
        /// Mirror the Y axis.
        const REFLECT_Y = 32;

        /// Every angle.
        const ROTATE_ALL = Self::ROTATE_0.bits()
            | Self::ROTATE_90.bits()
            | Self::ROTATE_180.bits()
            | Self::ROTATE_270.bits();
        /// Both reflections.
        const REFLECT_ALL = Self::REFLECT_X.bits() | Self::REFLECT_Y.bits();
    }
}

/// An angle plus optional reflections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rotation {
    /// Counter-clockwise angle.
    pub angle: Angle,
    /// Mirror along the logical X axis.
    #[cfg_attr(feature = "serde", serde(default))]
    pub reflect_x: bool,
    /// Mirror along the logical Y axis.
    #[cfg_attr(feature = "serde", serde(default))]
    pub reflect_y: bool,
}

impl Rotation {
    /// No rotation, no reflection.
    pub const IDENTITY: Self = Self::new(Angle::Deg0);

    /// Pure rotation without reflection.
    #[must_use]
    pub const fn new(angle: Angle) -> Self {
        Self {
            angle,
            reflect_x: false,
            reflect_y: false,
        }
    }

    /// Same rotation with the given reflections.
    #[must_use]
    pub const fn with_reflection(self, reflect_x: bool, reflect_y: bool) -> Self {
        Self {
            angle: self.angle,
            reflect_x,
            reflect_y,
        }
    }

    /// True when neither rotated nor reflected.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        matches!(self.angle, Angle::Deg0) && !self.reflect_x && !self.reflect_y
    }

    /// True when a reflection is present.
    #[must_use]
    pub const fn is_reflected(self) -> bool {
        self.reflect_x || self.reflect_y
    }

    /// `self` followed by `other`: angles add, reflections toggle.
    #[must_use]
    pub const fn compose(self, other: Self) -> Self {
        Self {
            angle: Angle::from_quarter_turns(
                self.angle.quarter_turns() + other.angle.quarter_turns(),
            ),
            reflect_x: self.reflect_x ^ other.reflect_x,
            reflect_y: self.reflect_y ^ other.reflect_y,
        }
    }

    /// The `r` such that `other.compose(r) == self`.
    #[must_use]
    pub const fn subtract(self, other: Self) -> Self {
        self.compose(other.inverse())
    }

    /// Inverse under [`Rotation::compose`].
    #[must_use]
    pub const fn inverse(self) -> Self {
        Self {
            angle: Angle::from_quarter_turns(4 - self.angle.quarter_turns()),
            reflect_x: self.reflect_x,
            reflect_y: self.reflect_y,
        }
    }

    /// RandR bit encoding.
    #[must_use]
    pub fn to_bits(self) -> RotationSet {
        let mut bits = match self.angle {
            Angle::Deg0 => RotationSet::ROTATE_0,
            Angle::Deg90 => RotationSet::ROTATE_90,
            Angle::Deg180 => RotationSet::ROTATE_180,
            Angle::Deg270 => RotationSet::ROTATE_270,
        };
        bits.set(RotationSet::REFLECT_X, self.reflect_x);
        bits.set(RotationSet::REFLECT_Y, self.reflect_y);
        bits
    }

    /// Decode RandR bits. Exactly one angle bit must be set.
    #[must_use]
    pub fn from_bits(bits: RotationSet) -> Option<Self> {
        let angles = bits & RotationSet::ROTATE_ALL;
        let angle = if angles == RotationSet::ROTATE_0 {
            Angle::Deg0
        } else if angles == RotationSet::ROTATE_90 {
            Angle::Deg90
        } else if angles == RotationSet::ROTATE_180 {
            Angle::Deg180
        } else if angles == RotationSet::ROTATE_270 {
            Angle::Deg270
        } else {
            return None;
        };
        Some(Self {
            angle,
            reflect_x: bits.contains(RotationSet::REFLECT_X),
            reflect_y: bits.contains(RotationSet::REFLECT_Y),
        })
    }

    /// Logical size of a `physical` panel under this rotation.
    #[must_use]
    pub const fn logical_size(self, physical: Size) -> Size {
        if self.angle.swaps_axes() {
            Size::new(physical.height, physical.width)
        } else {
            physical
        }
    }

    /// Map a physical pixel to its logical position.
    ///
    /// `physical` is the panel size; the point must lie inside it.
    #[must_use]
    pub fn to_logical(self, p: Point, physical: Size) -> Point {
        PointerMatrix::new(self, physical).apply(p)
    }

    /// Map a logical pixel to its physical position.
    // Panel dimensions fit comfortably in i32.
    #[allow(clippy::cast_possible_wrap)]
    #[must_use]
    pub fn to_physical(self, p: Point, physical: Size) -> Point {
        let pw = physical.width as i32;
        let ph = physical.height as i32;
        let logical = self.logical_size(physical);
        let (lw, lh) = (logical.width as i32, logical.height as i32);

        let x = if self.reflect_x { lw - 1 - p.x } else { p.x };
        let y = if self.reflect_y { lh - 1 - p.y } else { p.y };

        match self.angle {
            Angle::Deg0 => Point::new(x, y),
            Angle::Deg90 => Point::new(pw - 1 - y, x),
            Angle::Deg180 => Point::new(pw - 1 - x, ph - 1 - y),
            Angle::Deg270 => Point::new(y, ph - 1 - x),
        }
    }
}

/// Affine map from physical pointer coordinates to logical coordinates.
///
/// `x' = m[0][0]·x + m[0][1]·y + m[0][2]`, likewise for `y'` with row 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerMatrix {
    /// Row-major 2×3 coefficients.
    pub matrix: [[i32; 3]; 2],
}

impl PointerMatrix {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        matrix: [[1, 0, 0], [0, 1, 0]],
    };

    /// Matrix for `rotation` over a panel of `physical` size.
    #[allow(clippy::cast_possible_wrap)]
    #[must_use]
    pub fn new(rotation: Rotation, physical: Size) -> Self {
        let pw = physical.width as i32;
        let ph = physical.height as i32;
        let mut matrix = match rotation.angle {
            Angle::Deg0 => [[1, 0, 0], [0, 1, 0]],
            Angle::Deg90 => [[0, 1, 0], [-1, 0, pw - 1]],
            Angle::Deg180 => [[-1, 0, pw - 1], [0, -1, ph - 1]],
            Angle::Deg270 => [[0, -1, ph - 1], [1, 0, 0]],
        };

        let logical = rotation.logical_size(physical);
        let extents = [logical.width as i32 - 1, logical.height as i32 - 1];
        let reflect = [rotation.reflect_x, rotation.reflect_y];
        for ((row, extent), flip) in matrix.iter_mut().zip(extents).zip(reflect) {
            if flip {
                row[0] = -row[0];
                row[1] = -row[1];
                row[2] = extent - row[2];
            }
        }
        Self { matrix }
    }

    /// Transform one point.
    #[must_use]
    pub fn apply(&self, p: Point) -> Point {
        let [r0, r1] = self.matrix;
        Point::new(
            r0[0] * p.x + r0[1] * p.y + r0[2],
            r1[0] * p.x + r1[1] * p.y + r1[2],
        )
    }
}

/// Sub-pixel layout reported to the render extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SubpixelOrder {
    /// Not known.
    #[default]
    Unknown,
    /// R, G, B left to right.
    HorizontalRgb,
    /// B, G, R left to right.
    HorizontalBgr,
    /// R, G, B top to bottom.
    VerticalRgb,
    /// B, G, R top to bottom.
    VerticalBgr,
    /// No sub-pixel structure.
    None,
}

impl SubpixelOrder {
    /// Stripe direction as an angle, for the four oriented orders.
    const fn direction(self) -> Option<Angle> {
        match self {
            Self::HorizontalRgb => Some(Angle::Deg0),
            Self::VerticalBgr => Some(Angle::Deg90),
            Self::HorizontalBgr => Some(Angle::Deg180),
            Self::VerticalRgb => Some(Angle::Deg270),
            Self::Unknown | Self::None => None,
        }
    }

    const fn from_direction(angle: Angle) -> Self {
        match angle {
            Angle::Deg0 => Self::HorizontalRgb,
            Angle::Deg90 => Self::VerticalBgr,
            Angle::Deg180 => Self::HorizontalBgr,
            Angle::Deg270 => Self::VerticalRgb,
        }
    }

    const fn swap_components(self) -> Self {
        match self {
            Self::HorizontalRgb => Self::HorizontalBgr,
            Self::HorizontalBgr => Self::HorizontalRgb,
            Self::VerticalRgb => Self::VerticalBgr,
            Self::VerticalBgr => Self::VerticalRgb,
            other => other,
        }
    }

    /// Order seen by clients once the panel is presented at `rotation`.
    ///
    /// The angle turns the stripe direction; an X reflection swaps the
    /// component order. Y reflections leave the order unchanged.
    #[must_use]
    pub const fn reoriented(self, rotation: Rotation) -> Self {
        let Some(dir) = self.direction() else {
            return self;
        };
        let turned = Self::from_direction(Angle::from_quarter_turns(
            dir.quarter_turns() + rotation.angle.quarter_turns(),
        ));
        if rotation.reflect_x {
            turned.swap_components()
        } else {
            turned
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANEL: Size = Size::new(800, 600);

    #[test]
    fn logical_size_swaps_for_quarter_turns() {
        assert_eq!(Rotation::IDENTITY.logical_size(PANEL), PANEL);
        assert_eq!(
            Rotation::new(Angle::Deg90).logical_size(PANEL),
            Size::new(600, 800)
        );
        assert_eq!(Rotation::new(Angle::Deg180).logical_size(PANEL), PANEL);
        assert_eq!(
            Rotation::new(Angle::Deg270).logical_size(PANEL),
            Size::new(600, 800)
        );
    }

    #[test]
    fn rot90_maps_corners() {
        let r = Rotation::new(Angle::Deg90);
        // Physical top-right lands at logical top-left.
        assert_eq!(r.to_logical(Point::new(799, 0), PANEL), Point::new(0, 0));
        assert_eq!(r.to_physical(Point::new(0, 0), PANEL), Point::new(799, 0));
        // Physical bottom-left lands at logical bottom-right.
        assert_eq!(r.to_logical(Point::new(0, 599), PANEL), Point::new(599, 799));
    }

    #[test]
    fn rot270_maps_corners() {
        let r = Rotation::new(Angle::Deg270);
        assert_eq!(r.to_logical(Point::new(0, 599), PANEL), Point::new(0, 0));
        assert_eq!(r.to_physical(Point::new(0, 0), PANEL), Point::new(0, 599));
    }

    #[test]
    fn reflection_mirrors_logical_axis() {
        let r = Rotation::IDENTITY.with_reflection(true, false);
        assert_eq!(r.to_logical(Point::new(0, 5), PANEL), Point::new(799, 5));
        let r = Rotation::IDENTITY.with_reflection(false, true);
        assert_eq!(r.to_logical(Point::new(3, 0), PANEL), Point::new(3, 599));
    }

    #[test]
    fn compose_adds_angles_and_toggles_reflections() {
        let a = Rotation::new(Angle::Deg90).with_reflection(true, false);
        let b = Rotation::new(Angle::Deg270).with_reflection(true, true);
        let c = a.compose(b);
        assert_eq!(c.angle, Angle::Deg0);
        assert!(!c.reflect_x);
        assert!(c.reflect_y);
    }

    #[test]
    fn subtract_undoes_compose() {
        let base = Rotation::new(Angle::Deg90);
        let req = Rotation::new(Angle::Deg180).with_reflection(false, true);
        assert_eq!(base.compose(req).subtract(base), req);
    }

    #[test]
    fn bits_round_trip() {
        for turns in 0..4 {
            for rx in [false, true] {
                for ry in [false, true] {
                    let r = Rotation::new(Angle::from_quarter_turns(turns)).with_reflection(rx, ry);
                    assert_eq!(Rotation::from_bits(r.to_bits()), Some(r));
                }
            }
        }
        assert_eq!(Rotation::from_bits(RotationSet::REFLECT_X), None);
        assert_eq!(
            Rotation::from_bits(RotationSet::ROTATE_0 | RotationSet::ROTATE_90),
            None
        );
    }

    #[test]
    fn subpixel_order_follows_rotation() {
        let rgb = SubpixelOrder::HorizontalRgb;
        assert_eq!(rgb.reoriented(Rotation::IDENTITY), rgb);
        assert_eq!(
            rgb.reoriented(Rotation::new(Angle::Deg90)),
            SubpixelOrder::VerticalBgr
        );
        assert_eq!(
            rgb.reoriented(Rotation::new(Angle::Deg180)),
            SubpixelOrder::HorizontalBgr
        );
        assert_eq!(
            rgb.reoriented(Rotation::IDENTITY.with_reflection(true, false)),
            SubpixelOrder::HorizontalBgr
        );
        assert_eq!(
            SubpixelOrder::Unknown.reoriented(Rotation::new(Angle::Deg90)),
            SubpixelOrder::Unknown
        );
    }
}
