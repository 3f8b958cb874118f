//! Shadow-to-framebuffer copiers
//!
//! Two traversal orders are used. Destination order walks the damaged area
//! in physical scanline order and fetches each pixel from the shadow through
//! the pointer matrix, so writes stream through the framebuffer while reads
//! jump across shadow rows. The `Yx` copiers read the shadow left to right,
//! one scanline at a time, and scatter the writes instead. Vertical reads
//! are very slow on XScale-class cores.

use platform::{Angle, Point, PointerMatrix, Rotation, Size};

use super::{FrameTarget, Region, ShadowBuffer};

/// Shadow update strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Copier {
    /// Unrotated row copy.
    Packed,
    /// 16 bpp, 90°, destination order.
    Rotate16By90,
    /// 16 bpp, 90°, shadow scanline order.
    Rotate16By90Yx,
    /// 16 bpp, 180°.
    Rotate16By180,
    /// 16 bpp, 270°, destination order.
    Rotate16By270,
    /// 16 bpp, 270°, shadow scanline order.
    Rotate16By270Yx,
    /// 16 bpp, any angle with reflection.
    Rotate16,
    /// Any byte-aligned depth, any rotation.
    RotatePacked,
}

/// Pick the copier for `rotation` at `bits_per_pixel`.
///
/// `scanline_reads` selects the variants that read the shadow in scanline
/// order for pure quarter turns at 16 bpp.
pub fn select_copier(rotation: Rotation, bits_per_pixel: u32, scanline_reads: bool) -> Copier {
    if rotation.is_identity() {
        return Copier::Packed;
    }
    if bits_per_pixel != 16 {
        return Copier::RotatePacked;
    }
    if rotation.is_reflected() {
        return Copier::Rotate16;
    }
    match (rotation.angle, scanline_reads) {
        (Angle::Deg90, false) => Copier::Rotate16By90,
        (Angle::Deg90, true) => Copier::Rotate16By90Yx,
        (Angle::Deg270, false) => Copier::Rotate16By270,
        (Angle::Deg270, true) => Copier::Rotate16By270Yx,
        // Deg0 without reflection is the identity, handled above.
        (Angle::Deg180 | Angle::Deg0, _) => Copier::Rotate16By180,
    }
}

impl Copier {
    /// True when this copier can move pixels of `bits_per_pixel`.
    pub const fn supports(self, bits_per_pixel: u32) -> bool {
        match self {
            Self::Packed | Self::RotatePacked => bits_per_pixel != 0 && bits_per_pixel % 8 == 0,
            _ => bits_per_pixel == 16,
        }
    }

    /// Copy `region` of `shadow` into `target` under `rotation`.
    ///
    /// The copier must have been selected for `rotation`. Pixels that would
    /// land outside the target are dropped.
    pub fn copy(
        self,
        rotation: Rotation,
        shadow: &ShadowBuffer,
        target: &mut FrameTarget<'_>,
        region: Region,
    ) {
        match self {
            Self::Packed => copy_rows(shadow, target, region),
            Self::Rotate16By90Yx | Self::Rotate16By270Yx => {
                by_shadow_rows::<2>(rotation, shadow, target, region);
            }
            Self::Rotate16By90 | Self::Rotate16By180 | Self::Rotate16By270 | Self::Rotate16 => {
                by_destination::<2>(rotation, shadow, target, region);
            }
            Self::RotatePacked => by_destination_dyn(rotation, shadow, target, region),
        }
    }
}

fn copy_rows(shadow: &ShadowBuffer, target: &mut FrameTarget<'_>, region: Region) {
    let bpp = shadow.bytes_per_pixel();
    let src_stride = shadow.stride() as usize;
    let start = region.x0 as usize * bpp;
    let len = (region.x1 - region.x0) as usize * bpp;
    for y in region.y0..region.y1 {
        let y = y as usize;
        let src_at = y * src_stride + start;
        let dst_at = y * target.stride + start;
        let (Some(src), Some(dst)) = (
            shadow.as_bytes().get(src_at..src_at + len),
            target.bytes.get_mut(dst_at..dst_at + len),
        ) else {
            continue;
        };
        dst.copy_from_slice(src);
    }
}

// Region bounds and panel sizes fit in i32.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn physical_bounds(rotation: Rotation, target: &FrameTarget<'_>, region: Region) -> (Point, Point) {
    let a = rotation.to_physical(Point::new(region.x0 as i32, region.y0 as i32), target.size);
    let b = rotation.to_physical(
        Point::new(region.x1 as i32 - 1, region.y1 as i32 - 1),
        target.size,
    );
    (
        Point::new(a.x.min(b.x), a.y.min(b.y)),
        Point::new(a.x.max(b.x), a.y.max(b.y)),
    )
}

#[allow(clippy::cast_sign_loss)]
fn offset(p: Point, stride: usize, bpp: usize) -> Option<usize> {
    if p.x < 0 || p.y < 0 {
        return None;
    }
    Some(p.y as usize * stride + p.x as usize * bpp)
}

fn by_destination<const N: usize>(
    rotation: Rotation,
    shadow: &ShadowBuffer,
    target: &mut FrameTarget<'_>,
    region: Region,
) {
    let matrix = PointerMatrix::new(rotation, target.size);
    let (lo, hi) = physical_bounds(rotation, target, region);
    let src_stride = shadow.stride() as usize;
    for py in lo.y..=hi.y {
        for px in lo.x..=hi.x {
            let phys = Point::new(px, py);
            let logical = matrix.apply(phys);
            let (Some(s), Some(d)) = (
                offset(logical, src_stride, N),
                offset(phys, target.stride, N),
            ) else {
                continue;
            };
            let Some(pixel) = shadow
                .as_bytes()
                .get(s..s + N)
                .and_then(|b| <[u8; N]>::try_from(b).ok())
            else {
                continue;
            };
            if let Some(dst) = target.bytes.get_mut(d..d + N) {
                dst.copy_from_slice(&pixel);
            }
        }
    }
}

fn by_destination_dyn(
    rotation: Rotation,
    shadow: &ShadowBuffer,
    target: &mut FrameTarget<'_>,
    region: Region,
) {
    let bpp = shadow.bytes_per_pixel();
    let matrix = PointerMatrix::new(rotation, target.size);
    let (lo, hi) = physical_bounds(rotation, target, region);
    let src_stride = shadow.stride() as usize;
    for py in lo.y..=hi.y {
        for px in lo.x..=hi.x {
            let phys = Point::new(px, py);
            let (Some(s), Some(d)) = (
                offset(matrix.apply(phys), src_stride, bpp),
                offset(phys, target.stride, bpp),
            ) else {
                continue;
            };
            let (Some(src), Some(dst)) =
                (shadow.as_bytes().get(s..s + bpp), target.bytes.get_mut(d..d + bpp))
            else {
                continue;
            };
            dst.copy_from_slice(src);
        }
    }
}

/// Visit the pixels of `region` in shadow scanline order, handing `visit`
/// the shadow and framebuffer byte offsets of each. Pixels that land off the
/// panel are skipped.
#[allow(clippy::cast_possible_wrap)]
fn shadow_rows(
    rotation: Rotation,
    src_stride: usize,
    panel: Size,
    dst_stride: usize,
    region: Region,
    bpp: usize,
    mut visit: impl FnMut(usize, usize),
) {
    for y in region.y0..region.y1 {
        let row = y as usize * src_stride;
        for x in region.x0..region.x1 {
            let phys = rotation.to_physical(Point::new(x as i32, y as i32), panel);
            if let Some(d) = offset(phys, dst_stride, bpp) {
                visit(row + x as usize * bpp, d);
            }
        }
    }
}

fn by_shadow_rows<const N: usize>(
    rotation: Rotation,
    shadow: &ShadowBuffer,
    target: &mut FrameTarget<'_>,
    region: Region,
) {
    let src = shadow.as_bytes();
    let (panel, dst_stride) = (target.size, target.stride);
    let dst_bytes = &mut *target.bytes;
    shadow_rows(rotation, shadow.stride() as usize, panel, dst_stride, region, N, |s, d| {
        if let (Some(pixel), Some(dst)) = (src.get(s..s + N), dst_bytes.get_mut(d..d + N)) {
            dst.copy_from_slice(pixel);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANGLES: [Angle; 4] = [Angle::Deg0, Angle::Deg90, Angle::Deg180, Angle::Deg270];

    fn all_rotations() -> Vec<Rotation> {
        let mut v = Vec::new();
        for angle in ANGLES {
            for (rx, ry) in [(false, false), (true, false), (false, true), (true, true)] {
                v.push(Rotation::new(angle).with_reflection(rx, ry));
            }
        }
        v
    }

    fn patterned(size: Size, bpp: u32) -> ShadowBuffer {
        let mut s = ShadowBuffer::alloc(size, bpp).unwrap();
        let bytes = (bpp / 8) as usize;
        for y in 0..size.height {
            for x in 0..size.width {
                let v = (y * 97 + x * 13 + 1).to_le_bytes();
                s.pixel_mut(x, y).unwrap().copy_from_slice(&v[..bytes]);
            }
        }
        s
    }

    fn reference(rotation: Rotation, shadow: &ShadowBuffer, physical: Size, stride: usize) -> Vec<u8> {
        let bpp = shadow.bytes_per_pixel();
        let mut out = vec![0u8; stride * physical.height as usize];
        let logical = shadow.size();
        for y in 0..logical.height {
            for x in 0..logical.width {
                let p = rotation.to_physical(Point::new(x as i32, y as i32), physical);
                let at = p.y as usize * stride + p.x as usize * bpp;
                out[at..at + bpp].copy_from_slice(shadow.pixel(x, y).unwrap());
            }
        }
        out
    }

    fn run(copier: Copier, rotation: Rotation, shadow: &ShadowBuffer, physical: Size, stride: usize) -> Vec<u8> {
        let mut out = vec![0u8; stride * physical.height as usize];
        let mut target = FrameTarget {
            bytes: &mut out,
            stride,
            size: physical,
        };
        let region = Region {
            x0: 0,
            y0: 0,
            x1: shadow.size().width,
            y1: shadow.size().height,
        };
        copier.copy(rotation, shadow, &mut target, region);
        out
    }

    #[test]
    fn selection_table() {
        let r90 = Rotation::new(Angle::Deg90);
        assert_eq!(select_copier(Rotation::IDENTITY, 16, true), Copier::Packed);
        assert_eq!(select_copier(r90, 16, false), Copier::Rotate16By90);
        assert_eq!(select_copier(r90, 16, true), Copier::Rotate16By90Yx);
        assert_eq!(
            select_copier(Rotation::new(Angle::Deg270), 16, true),
            Copier::Rotate16By270Yx
        );
        assert_eq!(
            select_copier(Rotation::new(Angle::Deg180), 16, true),
            Copier::Rotate16By180
        );
        assert_eq!(select_copier(r90.with_reflection(true, false), 16, true), Copier::Rotate16);
        assert_eq!(
            select_copier(Rotation::IDENTITY.with_reflection(false, true), 16, false),
            Copier::Rotate16
        );
        assert_eq!(select_copier(r90, 8, false), Copier::RotatePacked);
        assert_eq!(select_copier(r90, 32, true), Copier::RotatePacked);
    }

    #[test]
    fn sixteen_bit_copiers_refuse_other_depths() {
        assert!(Copier::Rotate16By90.supports(16));
        assert!(!Copier::Rotate16By90.supports(8));
        assert!(Copier::RotatePacked.supports(24));
        assert!(!Copier::RotatePacked.supports(4));
    }

    #[test]
    fn every_copier_matches_reference() {
        let physical = Size::new(7, 5);
        for rotation in all_rotations() {
            let logical = rotation.logical_size(physical);
            for bpp in [8, 16, 32] {
                let shadow = patterned(logical, bpp);
                let stride = physical.width as usize * (bpp / 8) as usize + 4;
                let want = reference(rotation, &shadow, physical, stride);
                let mut copiers = vec![
                    select_copier(rotation, bpp, false),
                    select_copier(rotation, bpp, true),
                    Copier::RotatePacked,
                ];
                copiers.dedup();
                for copier in copiers {
                    assert_eq!(
                        run(copier, rotation, &shadow, physical, stride),
                        want,
                        "{copier:?} at {rotation:?}, {bpp} bpp"
                    );
                }
            }
        }
    }

    #[test]
    fn partial_region_touches_only_its_pixels() {
        let physical = Size::new(6, 4);
        let rotation = Rotation::new(Angle::Deg90);
        let shadow = patterned(rotation.logical_size(physical), 16);
        let stride = 12;
        let mut out = vec![0u8; stride * 4];
        let mut target = FrameTarget {
            bytes: &mut out,
            stride,
            size: physical,
        };
        let region = Region {
            x0: 1,
            y0: 2,
            x1: 2,
            y1: 3,
        };
        Copier::Rotate16By90.copy(rotation, &shadow, &mut target, region);

        let p = rotation.to_physical(Point::new(1, 2), physical);
        let at = p.y as usize * stride + p.x as usize * 2;
        assert_eq!(&out[at..at + 2], shadow.pixel(1, 2).unwrap());
        let written = out.iter().filter(|b| **b != 0).count();
        assert!(written <= 2);
    }

    #[test]
    fn scanline_copiers_read_the_shadow_in_order() {
        let panel = Size::new(8, 6);
        for angle in [Angle::Deg90, Angle::Deg270] {
            let rotation = Rotation::new(angle);
            let logical = rotation.logical_size(panel);
            let shadow = patterned(logical, 16);
            let stride = shadow.stride() as usize;
            let region = Region {
                x0: 0,
                y0: 0,
                x1: logical.width,
                y1: logical.height,
            };
            let mut reads = Vec::new();
            shadow_rows(rotation, stride, panel, 16, region, 2, |s, _| reads.push(s));

            assert_eq!(reads.len(), (logical.width * logical.height) as usize);
            assert!(reads.windows(2).all(|w| w[0] < w[1]), "{angle:?}: {reads:?}");
            let first_row: Vec<usize> = (0..logical.width as usize).map(|x| x * 2).collect();
            assert_eq!(&reads[..first_row.len()], &first_row[..]);
        }
    }
}
