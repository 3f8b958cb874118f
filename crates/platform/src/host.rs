//! Host X server collaborators
//!
//! The driver never owns the window system. Everything it needs from the
//! server (pixmap descriptions, EXA registration, pointer transforms, the
//! screen pixmap header) is expressed here as plain data plus the
//! [`ScreenHost`] trait.

use crate::rotation::{PointerMatrix, SubpixelOrder};

/// Standard X raster operation (`GX*`), the 16 boolean functions of source
/// and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Alu {
    /// 0
    Clear = 0x0,
    /// src AND dst
    And = 0x1,
    /// src AND NOT dst
    AndReverse = 0x2,
    /// src
    Copy = 0x3,
    /// NOT src AND dst
    AndInverted = 0x4,
    /// dst
    Noop = 0x5,
    /// src XOR dst
    Xor = 0x6,
    /// src OR dst
    Or = 0x7,
    /// NOT src AND NOT dst
    Nor = 0x8,
    /// NOT src XOR dst
    Equiv = 0x9,
    /// NOT dst
    Invert = 0xA,
    /// src OR NOT dst
    OrReverse = 0xB,
    /// NOT src
    CopyInverted = 0xC,
    /// NOT src OR dst
    OrInverted = 0xD,
    /// NOT src OR NOT dst
    Nand = 0xE,
    /// 1
    Set = 0xF,
}

impl Alu {
    /// All sixteen codes in numeric order.
    pub const ALL: [Self; 16] = [
        Self::Clear,
        Self::And,
        Self::AndReverse,
        Self::Copy,
        Self::AndInverted,
        Self::Noop,
        Self::Xor,
        Self::Or,
        Self::Nor,
        Self::Equiv,
        Self::Invert,
        Self::OrReverse,
        Self::CopyInverted,
        Self::OrInverted,
        Self::Nand,
        Self::Set,
    ];

    /// Decode a raw `GX*` value.
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(usize::from(raw)).copied()
    }

    /// Raw `GX*` value.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Mask with every bit of a `depth`-bit pixel set.
#[must_use]
pub const fn full_mask(depth: u32) -> u32 {
    if depth >= 32 {
        u32::MAX
    } else {
        (1u32 << depth) - 1
    }
}

/// True when `planemask` enables every bit of a `depth`-bit pixel.
#[must_use]
pub const fn planemask_is_solid(depth: u32, planemask: u32) -> bool {
    let full = full_mask(depth);
    planemask & full == full
}

/// A host pixmap as seen by the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixmap {
    /// Host identifier, for logging.
    pub id: u32,
    /// Significant bits per pixel.
    pub depth: u32,
    /// Storage bits per pixel.
    pub bits_per_pixel: u32,
    /// Byte offset from the accelerator's memory base.
    pub offset: u32,
    /// Bytes between scanlines.
    pub pitch: u32,
}

/// Which memory backs the screen pixmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenBuffer {
    /// The mapped framebuffer, `offset` bytes into the video mapping.
    Physical {
        /// Byte offset of the pixel origin inside the mapping.
        offset: usize,
    },
    /// The driver's shadow buffer.
    Shadow,
}

/// Parameters for the host's `ModifyPixmapHeader` on the screen pixmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixmapHeader {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Significant bits per pixel.
    pub depth: u32,
    /// Storage bits per pixel.
    pub bits_per_pixel: u32,
    /// Bytes between scanlines.
    pub byte_stride: u32,
    /// Backing memory.
    pub buffer: ScreenBuffer,
}

bitflags::bitflags! {
    /// EXA driver capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExaFlags: u32 {
        /// The driver can place pixmaps in offscreen video memory.
        const OFFSCREEN_PIXMAPS = 1 << 0;
        /// Pixmap offsets are fixed at allocation time.
        const OFFSCREEN_ALIGN_POT = 1 << 1;
        /// Copies only in "both positive" or "both negative" directions.
        const TWO_BITBLT_DIRECTIONS = 1 << 5;
    }
}

/// Pixmap migration heuristic requested from EXA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationPolicy {
    /// Let EXA decide from usage.
    #[default]
    Smart,
    /// Keep pixmaps in video memory.
    Always,
    /// Migrate eagerly.
    Greedy,
}

/// Everything EXA needs to drive an accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExaDriverInfo {
    /// EXA ABI major version.
    pub exa_major: u32,
    /// EXA ABI minor version.
    pub exa_minor: u32,
    /// Byte offset of the pixel origin inside the video mapping.
    pub memory_base: usize,
    /// Total accelerator-addressable memory.
    pub memory_size: usize,
    /// First byte past the visible image, free for pixmaps.
    pub offscreen_base: usize,
    /// Alignment of pixmap offsets.
    pub pixmap_offset_align: u32,
    /// Alignment of pixmap pitches.
    pub pixmap_pitch_align: u32,
    /// Largest X coordinate the engine accepts.
    pub max_x: u32,
    /// Largest Y coordinate the engine accepts.
    pub max_y: u32,
    /// Capability flags.
    pub flags: ExaFlags,
    /// Migration heuristic.
    pub migration: MigrationPolicy,
}

/// One colormap cell (`xColorItem`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorItem {
    /// Index into the colormap.
    pub pixel: u32,
    /// Red intensity.
    pub red: u16,
    /// Green intensity.
    pub green: u16,
    /// Blue intensity.
    pub blue: u16,
}

impl ColorItem {
    /// A cell with the given intensities.
    #[must_use]
    pub const fn new(pixel: u32, red: u16, green: u16, blue: u16) -> Self {
        Self {
            pixel,
            red,
            green,
            blue,
        }
    }
}

/// Services the X server provides to a screen driver.
pub trait ScreenHost {
    /// Register the accelerator. Returns false if EXA refuses it.
    fn exa_driver_init(&mut self, info: &ExaDriverInfo) -> bool;

    /// Tell EXA the accelerator has outstanding work to sync on.
    fn mark_sync(&mut self);

    /// Install the physical → logical pointer transform.
    fn set_pointer_matrix(&mut self, matrix: &PointerMatrix);

    /// Re-describe the screen pixmap. Returns false on refusal.
    fn modify_screen_pixmap(&mut self, header: &PixmapHeader) -> bool;

    /// Publish the sub-pixel order seen by clients.
    fn set_subpixel_order(&mut self, order: SubpixelOrder);

    /// True when at least one allowed depth carries visuals.
    fn has_visuals(&self) -> bool;
}
