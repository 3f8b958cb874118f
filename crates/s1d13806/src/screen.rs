//! Screen model
//!
//! Derives the X visual format from the kernel's channel layout and tracks
//! what backs the screen pixmap: the physical framebuffer at identity
//! rotation, or a logical-orientation shadow buffer otherwise.

use platform::{
    FixScreenInfo, PixmapHeader, Rotation, ScreenBuffer, Size, VarScreenInfo, Visual,
};

use crate::error::DriverError;
use crate::shadow::{select_copier, Copier, ShadowBuffer};

/// Vertical refresh reported to the host.
pub const REFRESH_RATE_HZ: u32 = 60;

// ---------------------------------------------------------------------------
// Visual format
// ---------------------------------------------------------------------------

/// Red, green and blue pixel masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelMasks {
    /// Red mask.
    pub red: u32,
    /// Green mask.
    pub green: u32,
    /// Blue mask.
    pub blue: u32,
}

impl ChannelMasks {
    /// Masks from the kernel's channel offsets and lengths.
    pub fn from_var(var: &VarScreenInfo) -> Self {
        Self {
            red: var.red.mask(),
            green: var.green.mask(),
            blue: var.blue.mask(),
        }
    }

    /// Grow each mask down into unused bits below it.
    ///
    /// Render needs masks without holes between channels. Red is extended
    /// first, then green against the extended red, then blue.
    #[must_use]
    pub fn gap_filled(self) -> Self {
        let red = make_contig(self.red, self.green | self.blue);
        let green = make_contig(self.green, red | self.blue);
        let blue = make_contig(self.blue, red | green);
        Self { red, green, blue }
    }

    /// Union of all three masks.
    pub fn union(self) -> u32 {
        self.red | self.green | self.blue
    }

    /// Index of the highest used bit, plus one.
    pub fn depth(self) -> u32 {
        32 - self.union().leading_zeros()
    }
}

/// Extend `mask` downwards from its lowest set bit until it would touch
/// `others` or runs out of bits.
fn make_contig(mask: u32, others: u32) -> u32 {
    let mut mask = mask;
    let mut low = (mask & mask.wrapping_neg()) >> 1;
    while low != 0 && others & low == 0 {
        mask |= low;
        low >>= 1;
    }
    mask
}

/// Pixel format published to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualFormat {
    /// Significant bits per pixel.
    pub depth: u32,
    /// Storage bits per pixel.
    pub bits_per_pixel: u32,
    /// Gap-filled channel masks.
    pub masks: ChannelMasks,
    /// Visual class offered; only TrueColor.
    pub visual: Visual,
    /// Vertical refresh in Hz.
    pub rate: u32,
}

impl VisualFormat {
    /// Format for the kernel's variable info.
    pub fn from_var(var: &VarScreenInfo) -> Self {
        let masks = ChannelMasks::from_var(var).gap_filled();
        Self {
            depth: masks.depth(),
            bits_per_pixel: var.bits_per_pixel,
            masks,
            visual: Visual::TrueColor,
            rate: REFRESH_RATE_HZ,
        }
    }
}

/// Physical size in millimetres: the kernel's figure when it has one,
/// otherwise derived from `dpi`.
pub fn mm_size(var: &VarScreenInfo, dpi: u32) -> Size {
    let from_px = |px: u32| {
        let dpi = u64::from(dpi.max(1));
        let mm = (u64::from(px) * 254 + dpi * 5) / (dpi * 10);
        u32::try_from(mm).unwrap_or(u32::MAX)
    };
    let width = if var.width != 0 && var.width != u32::MAX {
        var.width
    } else {
        from_px(var.xres)
    };
    let height = if var.height != 0 && var.height != u32::MAX {
        var.height
    } else {
        from_px(var.yres)
    };
    Size::new(width, height)
}

// ---------------------------------------------------------------------------
// Screen state
// ---------------------------------------------------------------------------

/// The observable configuration of a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenMode {
    /// Client-visible size.
    pub logical: Size,
    /// Client-visible size in millimetres.
    pub mm: Size,
    /// Effective rotation.
    pub rotation: Rotation,
    /// True when drawing goes through the shadow.
    pub shadow: bool,
    /// Copier armed for shadow updates.
    pub copier: Option<Copier>,
}

/// Per-screen state.
#[derive(Debug)]
pub struct ScreenState {
    physical: Size,
    physical_mm: Size,
    format: VisualFormat,
    rotation: Rotation,
    byte_stride: u32,
    pixel_stride: u32,
    shadow: Option<ShadowBuffer>,
    copier: Option<Copier>,
    cache_hostile: bool,
}

impl ScreenState {
    /// Screen for the card's current mode at `rotation`, not yet mapped.
    pub fn new(
        var: &VarScreenInfo,
        rotation: Rotation,
        dpi: u32,
        cache_hostile: bool,
    ) -> Self {
        let format = VisualFormat::from_var(var);
        tracing::debug!(
            depth = format.depth,
            bpp = format.bits_per_pixel,
            red = format.masks.red,
            green = format.masks.green,
            blue = format.masks.blue,
            "visual format"
        );
        Self {
            physical: Size::new(var.xres, var.yres),
            physical_mm: mm_size(var, dpi),
            format,
            rotation,
            byte_stride: 0,
            pixel_stride: 0,
            shadow: None,
            copier: None,
            cache_hostile,
        }
    }

    /// Point the screen at its backing memory for the current rotation.
    ///
    /// Identity rotation aliases the framebuffer; anything else allocates a
    /// fresh shadow in logical orientation.
    pub fn map(&mut self, fix: &FixScreenInfo) -> Result<(), DriverError> {
        if self.rotation.is_identity() {
            self.shadow = None;
            self.byte_stride = fix.line_length;
            self.pixel_stride = if self.format.bits_per_pixel == 0 {
                0
            } else {
                fix.line_length * 8 / self.format.bits_per_pixel
            };
        } else {
            let logical = self.rotation.logical_size(self.physical);
            let shadow = ShadowBuffer::alloc(logical, self.format.bits_per_pixel)?;
            self.byte_stride = shadow.stride();
            self.pixel_stride = shadow.pixel_stride();
            self.shadow = Some(shadow);
        }
        tracing::debug!(
            rotation = self.rotation.angle.degrees(),
            shadow = self.shadow.is_some(),
            byte_stride = self.byte_stride,
            "screen mapped"
        );
        Ok(())
    }

    /// Release the shadow and disarm the copier.
    pub fn unmap(&mut self) {
        self.shadow = None;
        self.copier = None;
    }

    /// Arm the copier matching the current rotation and format.
    pub fn set_shadow(&mut self) -> Result<Copier, DriverError> {
        let copier = select_copier(self.rotation, self.format.bits_per_pixel, self.cache_hostile);
        if self.shadow.is_some() && !copier.supports(self.format.bits_per_pixel) {
            return Err(DriverError::UnsupportedFormat {
                bpp: self.format.bits_per_pixel,
            });
        }
        self.copier = Some(copier);
        Ok(copier)
    }

    /// Disarm the copier, keeping the buffer.
    pub fn unset_shadow(&mut self) {
        self.copier = None;
    }

    /// Effective rotation.
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub(crate) fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Panel size in pixels.
    pub fn physical_size(&self) -> Size {
        self.physical
    }

    /// Panel size in millimetres.
    pub fn physical_mm(&self) -> Size {
        self.physical_mm
    }

    /// Client-visible size in pixels.
    pub fn logical_size(&self) -> Size {
        self.rotation.logical_size(self.physical)
    }

    /// Client-visible size in millimetres.
    pub fn logical_mm(&self) -> Size {
        self.rotation.logical_size(self.physical_mm)
    }

    /// Published pixel format.
    pub fn format(&self) -> &VisualFormat {
        &self.format
    }

    /// Bytes per scanline of the screen buffer.
    pub fn byte_stride(&self) -> u32 {
        self.byte_stride
    }

    /// Pixels per scanline of the screen buffer.
    pub fn pixel_stride(&self) -> u32 {
        self.pixel_stride
    }

    /// True when drawing goes through the shadow.
    pub fn is_shadowed(&self) -> bool {
        self.shadow.is_some()
    }

    /// The shadow buffer, when rotated.
    pub fn shadow(&self) -> Option<&ShadowBuffer> {
        self.shadow.as_ref()
    }

    /// The shadow buffer, mutable.
    pub fn shadow_mut(&mut self) -> Option<&mut ShadowBuffer> {
        self.shadow.as_mut()
    }

    /// Armed copier.
    pub fn copier(&self) -> Option<Copier> {
        self.copier
    }

    /// Snapshot of the observable configuration.
    pub fn mode(&self) -> ScreenMode {
        ScreenMode {
            logical: self.logical_size(),
            mm: self.logical_mm(),
            rotation: self.rotation,
            shadow: self.is_shadowed(),
            copier: self.copier,
        }
    }

    /// Screen pixmap description for the host.
    pub fn pixmap_header(&self, pixel_origin: usize) -> PixmapHeader {
        let logical = self.logical_size();
        PixmapHeader {
            width: logical.width,
            height: logical.height,
            depth: self.format.depth,
            bits_per_pixel: self.format.bits_per_pixel,
            byte_stride: self.byte_stride,
            buffer: if self.is_shadowed() {
                ScreenBuffer::Shadow
            } else {
                ScreenBuffer::Physical {
                    offset: pixel_origin,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::{Angle, Bitfield};

    fn var(xres: u32, yres: u32, bpp: u32, r: Bitfield, g: Bitfield, b: Bitfield) -> VarScreenInfo {
        VarScreenInfo {
            xres,
            yres,
            bits_per_pixel: bpp,
            red: r,
            green: g,
            blue: b,
            ..VarScreenInfo::default()
        }
    }

    fn var565() -> VarScreenInfo {
        var(800, 600, 16, Bitfield::new(11, 5), Bitfield::new(5, 6), Bitfield::new(0, 5))
    }

    fn fix(line_length: u32) -> FixScreenInfo {
        FixScreenInfo {
            line_length,
            ..FixScreenInfo::default()
        }
    }

    #[test]
    fn packed_565_is_unchanged() {
        let m = ChannelMasks::from_var(&var565()).gap_filled();
        assert_eq!((m.red, m.green, m.blue), (0xF800, 0x07E0, 0x001F));
        assert_eq!(m.depth(), 16);
    }

    #[test]
    fn gaps_are_absorbed_downwards() {
        // xRGB 1-5-5-5 with a hole below each channel.
        let m = ChannelMasks {
            red: 0x7C00,
            green: 0x03C0,
            blue: 0x000F,
        }
        .gap_filled();
        assert_eq!(m.red, 0x7C00);
        assert_eq!(m.green, 0x03F0);
        assert_eq!(m.blue, 0x000F);
        assert_eq!(m.depth(), 15);
    }

    #[test]
    fn lowest_channel_grows_to_bit_zero() {
        let m = ChannelMasks {
            red: 0xFF00_0000,
            green: 0x00FF_0000,
            blue: 0x0000_FF00,
        }
        .gap_filled();
        assert_eq!(m.blue, 0x0000_FFFF);
        assert_eq!(m.depth(), 32);
    }

    #[test]
    fn empty_masks_have_zero_depth() {
        assert_eq!(ChannelMasks::default().gap_filled().depth(), 0);
    }

    #[test]
    fn mm_size_prefers_kernel_figure() {
        let mut v = var565();
        v.width = 160;
        v.height = 120;
        assert_eq!(mm_size(&v, 75), Size::new(160, 120));
    }

    #[test]
    fn mm_size_from_dpi() {
        assert_eq!(mm_size(&var565(), 75), Size::new(271, 203));
    }

    #[test]
    fn identity_aliases_framebuffer() {
        let mut s = ScreenState::new(&var565(), Rotation::IDENTITY, 75, false);
        s.map(&fix(1600)).unwrap();
        s.set_shadow().unwrap();
        assert!(!s.is_shadowed());
        assert_eq!(s.byte_stride(), 1600);
        assert_eq!(s.pixel_stride(), 800);
        assert_eq!(s.logical_size(), Size::new(800, 600));
        assert_eq!(
            s.pixmap_header(0x40).buffer,
            ScreenBuffer::Physical { offset: 0x40 }
        );
    }

    #[test]
    fn quarter_turn_allocates_logical_shadow() {
        let mut s = ScreenState::new(&var565(), Rotation::new(Angle::Deg90), 75, false);
        s.map(&fix(1600)).unwrap();
        assert!(s.is_shadowed());
        assert_eq!(s.logical_size(), Size::new(600, 800));
        assert_eq!(s.byte_stride(), 1200);
        assert_eq!(s.logical_mm(), Size::new(203, 271));
        assert_eq!(s.pixmap_header(0).buffer, ScreenBuffer::Shadow);
        assert_eq!(s.set_shadow().unwrap(), Copier::Rotate16By90);
    }

    #[test]
    fn unmap_drops_shadow_and_copier() {
        let mut s = ScreenState::new(&var565(), Rotation::new(Angle::Deg180), 75, true);
        s.map(&fix(1600)).unwrap();
        s.set_shadow().unwrap();
        s.unmap();
        assert!(!s.is_shadowed());
        assert_eq!(s.copier(), None);
    }
}
