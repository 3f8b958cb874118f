//! Property-based tests for the driver's arithmetic.
//! Channel gap-filling, BitBLT address programming, colormap transfers and
//! shadow copier agreement, over randomized inputs.
#![allow(
    clippy::unwrap_used,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use platform::mocks::{MockFramebuffer, MockHost, MockRegisters, MockVideoMemory};
use platform::{Alu, Angle, ColorItem, Pixmap, Point, Rectangle, Rotation, Size};
use proptest::prelude::*;
use s1d13806::regs::{
    BltOp, BLTCTRL0, BLTCTRL0_ACTIVE, BLTDSTSTART01, BLTDSTSTART2, BLTHEIGHT, BLTOPERATION,
    BLTSRCSTART01, BLTSRCSTART2, BLTWIDTH, REGISTER_FILE_LEN,
};
use s1d13806::shadow::{self, FrameTarget};
use s1d13806::{
    select_copier, AccelState, Accelerator, BltEngine, CardState, ChannelMasks, Copier,
    EpsonAccel, ShadowBuffer,
};

fn any_rotation() -> impl Strategy<Value = Rotation> {
    (0u8..4, any::<bool>(), any::<bool>()).prop_map(|(turns, rx, ry)| {
        Rotation::new(Angle::from_quarter_turns(turns)).with_reflection(rx, ry)
    })
}

/// Three disjoint channel masks laid out low to high in a random order with
/// random holes below each.
fn disjoint_masks() -> impl Strategy<Value = ChannelMasks> {
    (
        prop::array::uniform3(0u32..=8),
        prop::array::uniform3(0u32..=2),
        Just([0usize, 1, 2]).prop_shuffle(),
    )
        .prop_map(|(lengths, gaps, order)| {
            let mut masks = [0u32; 3];
            let mut bit = 0;
            for (slot, (len, gap)) in order.into_iter().zip(lengths.into_iter().zip(gaps)) {
                bit += gap;
                masks[slot] = if len == 0 { 0 } else { ((1u32 << len) - 1) << bit };
                bit += len;
            }
            ChannelMasks {
                red: masks[0],
                green: masks[1],
                blue: masks[2],
            }
        })
}

fn contiguous(mask: u32) -> bool {
    if mask == 0 {
        return true;
    }
    let shifted = mask >> mask.trailing_zeros();
    shifted & (shifted.wrapping_add(1)) == 0
}

// ── Visual format ───────────────────────────────────────────────────────────

proptest! {
    /// Gap-filled masks stay disjoint, stay contiguous, keep their original
    /// bits and leave no holes below the top channel.
    #[test]
    fn gap_fill_invariants(m in disjoint_masks()) {
        let f = m.gap_filled();
        prop_assert_eq!(f.red & f.green, 0);
        prop_assert_eq!(f.red & f.blue, 0);
        prop_assert_eq!(f.green & f.blue, 0);
        prop_assert!(contiguous(f.red) && contiguous(f.green) && contiguous(f.blue));
        prop_assert_eq!(f.red & m.red, m.red);
        prop_assert_eq!(f.green & m.green, m.green);
        prop_assert_eq!(f.blue & m.blue, m.blue);
        let union = f.union();
        prop_assert_eq!(union & union.wrapping_add(1), 0);
        prop_assert_eq!(f.depth(), m.depth());
    }
}

// ── BitBLT programming ──────────────────────────────────────────────────────

const STRIDE: u32 = 1600;

fn rig() -> (AccelState, BltEngine<MockRegisters>, MockHost) {
    let regs =
        MockRegisters::new(REGISTER_FILE_LEN).with_busy_latch(BLTCTRL0, BLTCTRL0_ACTIVE, 2);
    (
        AccelState::new(
            STRIDE,
            16,
            Size::new(800, 600),
            Size::new(800, 600),
            0,
            0x14_0000,
            false,
        ),
        BltEngine::new(regs, Some(64)),
        MockHost::new(),
    )
}

fn pixmap(offset: u32) -> Pixmap {
    Pixmap {
        id: offset,
        depth: 16,
        bits_per_pixel: 16,
        offset,
        pitch: STRIDE,
    }
}

fn split(addr: u32) -> (u16, u8) {
    (addr as u16, (addr >> 16) as u8)
}

proptest! {
    /// Accepted copies program the corner the engine starts from, the
    /// biased extents and the direction's operation, then leave it idle.
    #[test]
    fn copy_programs_corner_addresses(
        src_off in (0u32..0x4000).prop_map(|o| o * 4),
        dst_off in (0u32..0x4000).prop_map(|o| o * 4),
        sx in 0u32..700, sy in 0u32..500,
        dx in 0u32..700, dy in 0u32..500,
        w in 1u32..100, h in 1u32..100,
        negative in any::<bool>(),
    ) {
        let (mut state, mut blt, mut host) = rig();
        let dir = if negative { -1 } else { 1 };
        let mut accel = EpsonAccel::new(&mut state, &mut blt, &mut host);
        prop_assert!(accel
            .prepare_copy(&pixmap(src_off), &pixmap(dst_off), dir, dir, Alu::Copy, 0xffff)
            .unwrap());
        accel.copy(sx, sy, dx, dy, w, h).unwrap();

        let (cx, cy) = if negative { (w - 1, h - 1) } else { (0, 0) };
        let src = src_off + (sy + cy) * STRIDE + 2 * (sx + cx);
        let dst = dst_off + (dy + cy) * STRIDE + 2 * (dx + cx);
        let regs = blt.regs();
        prop_assert_eq!(regs.last_word(BLTSRCSTART01), Some(split(src).0));
        prop_assert_eq!(regs.last_byte(BLTSRCSTART2), Some(split(src).1));
        prop_assert_eq!(regs.last_word(BLTDSTSTART01), Some(split(dst).0));
        prop_assert_eq!(regs.last_byte(BLTDSTSTART2), Some(split(dst).1));
        prop_assert_eq!(regs.last_word(BLTWIDTH), Some((w - 1) as u16));
        prop_assert_eq!(regs.last_word(BLTHEIGHT), Some((h - 1) as u16));
        let op = if negative { BltOp::MoveNegRop } else { BltOp::MovePosRop };
        prop_assert_eq!(regs.last_byte(BLTOPERATION), Some(op.code()));
        prop_assert!(!blt.is_busy());
    }

    /// A copy onto itself names the same address for source and destination.
    #[test]
    fn self_copy_is_identity(
        x in 0u32..700, y in 0u32..500, w in 1u32..100, h in 1u32..100,
        negative in any::<bool>(),
    ) {
        let (mut state, mut blt, mut host) = rig();
        let dir = if negative { -1 } else { 1 };
        let p = pixmap(0);
        let mut accel = EpsonAccel::new(&mut state, &mut blt, &mut host);
        accel.prepare_copy(&p, &p, dir, dir, Alu::Copy, 0xffff).unwrap();
        accel.copy(x, y, x, y, w, h).unwrap();
        let regs = blt.regs();
        prop_assert_eq!(regs.last_word(BLTSRCSTART01), regs.last_word(BLTDSTSTART01));
        prop_assert_eq!(regs.last_byte(BLTSRCSTART2), regs.last_byte(BLTDSTSTART2));
    }

    /// Any non-solid planemask or mixed direction is left to software
    /// without touching the engine.
    #[test]
    fn refusals_write_nothing(
        planemask in 0u32..0xffff,
        xdir in prop::sample::select(vec![-1i32, 1]),
    ) {
        let (mut state, mut blt, mut host) = rig();
        let p = pixmap(0);
        let mut accel = EpsonAccel::new(&mut state, &mut blt, &mut host);
        prop_assert!(!accel.prepare_copy(&p, &p, 1, 1, Alu::Copy, planemask).unwrap());
        prop_assert!(!accel.prepare_copy(&p, &p, xdir, -xdir, Alu::Copy, 0xffff).unwrap());
        prop_assert!(blt.regs().writes().is_empty());
    }
}

// ── Colormap ────────────────────────────────────────────────────────────────

proptest! {
    /// Whatever is put comes back, and one transfer covers exactly the
    /// touched span.
    #[test]
    fn colormap_round_trip(entries in prop::collection::btree_map(0u32..256, any::<(u16, u16, u16)>(), 1..32)) {
        let mut card = CardState::initialize(MockFramebuffer::new(320, 240, 16), || {
            Ok(MockVideoMemory::new(0x4_0000))
        })
        .unwrap();
        let items: Vec<ColorItem> = entries
            .iter()
            .map(|(p, (r, g, b))| ColorItem::new(*p, *r, *g, *b))
            .collect();
        card.put_colors(&items).unwrap();

        let lo = *entries.keys().next().unwrap();
        let hi = *entries.keys().next_back().unwrap();
        prop_assert_eq!(card.device().put_cmap_calls(), vec![(lo, hi - lo + 1)]);

        let mut read: Vec<ColorItem> = entries.keys().map(|p| ColorItem::new(*p, 0, 0, 0)).collect();
        card.get_colors(&mut read).unwrap();
        prop_assert_eq!(read, items);
    }
}

// ── Shadow copiers ──────────────────────────────────────────────────────────

fn panel_rotation_damage() -> impl Strategy<Value = (Size, Rotation, Rectangle)> {
    (1u32..24, 1u32..24, any_rotation()).prop_flat_map(|(w, h, r)| {
        let logical = r.logical_size(Size::new(w, h));
        (
            -4i32..logical.width as i32 + 4,
            -4i32..logical.height as i32 + 4,
            0u32..logical.width + 8,
            0u32..logical.height + 8,
        )
            .prop_map(move |(x, y, dw, dh)| {
                (Size::new(w, h), r, Rectangle::new(Point::new(x, y), Size::new(dw, dh)))
            })
    })
}

fn filled_shadow(size: Size, seed: u32) -> ShadowBuffer {
    let mut s = ShadowBuffer::alloc(size, 16).unwrap();
    for y in 0..size.height {
        for x in 0..size.width {
            let v = (x.wrapping_mul(31) ^ y.wrapping_mul(131) ^ seed) as u16 | 1;
            s.pixel_mut(x, y).unwrap().copy_from_slice(&v.to_le_bytes());
        }
    }
    s
}

fn push(
    copier: Copier,
    rotation: Rotation,
    shadow: &ShadowBuffer,
    panel: Size,
    damage: Rectangle,
) -> Vec<u8> {
    let stride = panel.width as usize * 2;
    let mut fb = vec![0u8; stride * panel.height as usize];
    let mut target = FrameTarget {
        bytes: &mut fb,
        stride,
        size: panel,
    };
    shadow::update(copier, rotation, shadow, &mut target, &[damage]);
    fb
}

proptest! {
    /// Every copier that can serve a rotation writes the same pixels, and
    /// only pixels inside the damaged area.
    #[test]
    fn copiers_agree((panel, rotation, damage) in panel_rotation_damage(), seed in any::<u32>()) {
        let shadow = filled_shadow(rotation.logical_size(panel), seed);
        let reference = push(Copier::RotatePacked, rotation, &shadow, panel, damage);
        for hint in [false, true] {
            let copier = select_copier(rotation, 16, hint);
            prop_assert_eq!(&push(copier, rotation, &shadow, panel, damage), &reference);
        }

        let clipped = shadow.clip(&damage);
        for py in 0..panel.height {
            for px in 0..panel.width {
                let at = (py * panel.width + px) as usize * 2;
                let written = reference[at] != 0 || reference[at + 1] != 0;
                let l = rotation.to_logical(Point::new(px as i32, py as i32), panel);
                let inside = clipped.is_some_and(|c| {
                    (c.x0 as i32..c.x1 as i32).contains(&l.x)
                        && (c.y0 as i32..c.y1 as i32).contains(&l.y)
                });
                prop_assert_eq!(written, inside);
            }
        }
    }
}
