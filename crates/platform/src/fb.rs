//! Linux framebuffer device abstraction
//!
//! Mirrors `linux/include/uapi/linux/fb.h` closely enough that the structures
//! below can be handed straight to `ioctl(2)`. The [`FramebufferDevice`] trait
//! exposes the handful of requests the driver issues, by meaning rather than
//! by request number, so tests can substitute [`crate::mocks::MockFramebuffer`].

use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Request numbers
// ---------------------------------------------------------------------------

/// Get variable screen info.
pub const FBIOGET_VSCREENINFO: u32 = 0x4600;
/// Set variable screen info.
pub const FBIOPUT_VSCREENINFO: u32 = 0x4601;
/// Get fixed screen info.
pub const FBIOGET_FSCREENINFO: u32 = 0x4602;
/// Read a colormap range.
pub const FBIOGETCMAP: u32 = 0x4604;
/// Write a colormap range.
pub const FBIOPUTCMAP: u32 = 0x4605;
/// Blank / unblank the display.
pub const FBIOBLANK: u32 = 0x4611;

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// `activate`: apply the mode immediately.
pub const FB_ACTIVATE_NOW: u32 = 0;
/// `activate`: apply the mode at the next vertical blank.
pub const FB_ACTIVATE_VBL: u32 = 16;
/// `activate`: apply the colormap change at the next vertical blank.
pub const FB_CHANGE_CMAP_VBL: u32 = 32;

/// Number of entries in a hardware colormap.
pub const CMAP_SIZE: usize = 256;

/// Pixel interpretation reported by the kernel (`fix.visual`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visual {
    /// Monochrome, 1 = black.
    Mono01,
    /// Monochrome, 1 = white.
    Mono10,
    /// Decomposed channels, fixed ramps.
    TrueColor,
    /// Writable indexed.
    PseudoColor,
    /// Decomposed channels with writable per-channel ramps.
    DirectColor,
    /// Read-only indexed.
    StaticPseudoColor,
    /// Anything newer than this driver.
    Other(u32),
}

impl Visual {
    /// Decode a kernel `FB_VISUAL_*` value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Mono01,
            1 => Self::Mono10,
            2 => Self::TrueColor,
            3 => Self::PseudoColor,
            4 => Self::DirectColor,
            5 => Self::StaticPseudoColor,
            other => Self::Other(other),
        }
    }

    /// Encode back to the kernel value.
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Mono01 => 0,
            Self::Mono10 => 1,
            Self::TrueColor => 2,
            Self::PseudoColor => 3,
            Self::DirectColor => 4,
            Self::StaticPseudoColor => 5,
            Self::Other(raw) => raw,
        }
    }
}

// ---------------------------------------------------------------------------
// Kernel structures
// ---------------------------------------------------------------------------

/// One colour channel inside a pixel (`struct fb_bitfield`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bitfield {
    /// Bit offset from the least significant bit.
    pub offset: u32,
    /// Channel width in bits.
    pub length: u32,
    /// Non-zero when the most significant bit is on the right.
    pub msb_right: u32,
}

impl Bitfield {
    /// Channel at `offset` spanning `length` bits.
    #[must_use]
    pub const fn new(offset: u32, length: u32) -> Self {
        Self {
            offset,
            length,
            msb_right: 0,
        }
    }

    /// Pixel mask covered by this channel.
    #[must_use]
    pub fn mask(&self) -> u32 {
        let ones = match self.length {
            0 => 0,
            l if l >= 32 => u32::MAX,
            l => (1u32 << l) - 1,
        };
        ones.checked_shl(self.offset).unwrap_or(0)
    }
}

/// Fixed screen information (`struct fb_fix_screeninfo`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixScreenInfo {
    /// Driver identification string.
    pub id: [u8; 16],
    /// Physical start of the framebuffer.
    pub smem_start: libc::c_ulong,
    /// Length of the framebuffer memory.
    pub smem_len: u32,
    /// `FB_TYPE_*`.
    pub type_: u32,
    /// Interleave for interleaved planes.
    pub type_aux: u32,
    /// `FB_VISUAL_*`.
    pub visual: u32,
    /// Hardware panning step, 0 if none.
    pub xpanstep: u16,
    /// Hardware panning step, 0 if none.
    pub ypanstep: u16,
    /// Hardware ywrap step, 0 if none.
    pub ywrapstep: u16,
    /// Bytes per scanline.
    pub line_length: u32,
    /// Physical start of the MMIO window.
    pub mmio_start: libc::c_ulong,
    /// Length of the MMIO window.
    pub mmio_len: u32,
    /// Accelerator identification.
    pub accel: u32,
    /// `FB_CAP_*`.
    pub capabilities: u16,
    /// Reserved.
    pub reserved: [u16; 2],
}

impl Default for FixScreenInfo {
    fn default() -> Self {
        Self {
            id: [0; 16],
            smem_start: 0,
            smem_len: 0,
            type_: 0,
            type_aux: 0,
            visual: Visual::TrueColor.to_raw(),
            xpanstep: 0,
            ypanstep: 0,
            ywrapstep: 0,
            line_length: 0,
            mmio_start: 0,
            mmio_len: 0,
            accel: 0,
            capabilities: 0,
            reserved: [0; 2],
        }
    }
}

impl FixScreenInfo {
    /// Decoded visual class.
    #[must_use]
    pub const fn visual(&self) -> Visual {
        Visual::from_raw(self.visual)
    }

    /// Driver identification, trimmed at the first NUL.
    #[must_use]
    pub fn id_str(&self) -> String {
        let end = self.id.iter().position(|&b| b == 0).unwrap_or(self.id.len());
        String::from_utf8_lossy(self.id.get(..end).unwrap_or_default()).into_owned()
    }
}

/// Variable screen information (`struct fb_var_screeninfo`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarScreenInfo {
    /// Visible horizontal resolution.
    pub xres: u32,
    /// Visible vertical resolution.
    pub yres: u32,
    /// Virtual horizontal resolution.
    pub xres_virtual: u32,
    /// Virtual vertical resolution.
    pub yres_virtual: u32,
    /// Offset from virtual to visible.
    pub xoffset: u32,
    /// Offset from virtual to visible.
    pub yoffset: u32,
    /// Bits per pixel.
    pub bits_per_pixel: u32,
    /// Non-zero for grayscale.
    pub grayscale: u32,
    /// Red channel.
    pub red: Bitfield,
    /// Green channel.
    pub green: Bitfield,
    /// Blue channel.
    pub blue: Bitfield,
    /// Transparency channel.
    pub transp: Bitfield,
    /// Non-standard pixel format.
    pub nonstd: u32,
    /// `FB_ACTIVATE_*` flags.
    pub activate: u32,
    /// Picture height in millimetres.
    pub height: u32,
    /// Picture width in millimetres.
    pub width: u32,
    /// Obsolete acceleration flags.
    pub accel_flags: u32,
    /// Pixel clock in picoseconds.
    pub pixclock: u32,
    /// Time from sync to picture.
    pub left_margin: u32,
    /// Time from picture to sync.
    pub right_margin: u32,
    /// Time from sync to picture.
    pub upper_margin: u32,
    /// Time from picture to sync.
    pub lower_margin: u32,
    /// Horizontal sync length.
    pub hsync_len: u32,
    /// Vertical sync length.
    pub vsync_len: u32,
    /// `FB_SYNC_*`.
    pub sync: u32,
    /// `FB_VMODE_*`.
    pub vmode: u32,
    /// Angle rotated counter-clockwise by the kernel.
    pub rotate: u32,
    /// Colourspace for FOURCC modes.
    pub colorspace: u32,
    /// Reserved.
    pub reserved: [u32; 4],
}

// ---------------------------------------------------------------------------
// Device trait
// ---------------------------------------------------------------------------

/// Errors reported by a framebuffer device.
#[derive(Debug, thiserror::Error)]
pub enum FbError {
    /// The device node could not be opened.
    #[error("error opening {}: {source}", path.display())]
    Open {
        /// Node that was opened.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// An ioctl returned failure.
    #[error("ioctl {request} failed: {source}")]
    Ioctl {
        /// Symbolic request name.
        request: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The device does not implement this request.
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),
    /// A colormap range fell outside the 256-entry table.
    #[error("colormap range {start}+{len} exceeds {CMAP_SIZE} entries")]
    CmapRange {
        /// First index.
        start: u32,
        /// Number of entries.
        len: u32,
    },
}

/// The kernel framebuffer requests used by the driver.
///
/// Colormap transfers take three equally long channel slices starting at
/// index `start`.
pub trait FramebufferDevice {
    /// `FBIOGET_FSCREENINFO`.
    fn fixed_info(&mut self) -> Result<FixScreenInfo, FbError>;

    /// `FBIOGET_VSCREENINFO`.
    fn var_info(&mut self) -> Result<VarScreenInfo, FbError>;

    /// `FBIOPUT_VSCREENINFO`. The kernel may adjust `var` in place.
    fn put_var_info(&mut self, var: &mut VarScreenInfo) -> Result<(), FbError>;

    /// `FBIOGETCMAP` over `start .. start + red.len()`.
    fn get_cmap(
        &mut self,
        start: u32,
        red: &mut [u16],
        green: &mut [u16],
        blue: &mut [u16],
    ) -> Result<(), FbError>;

    /// `FBIOPUTCMAP` over `start .. start + red.len()`.
    fn put_cmap(
        &mut self,
        start: u32,
        red: &[u16],
        green: &[u16],
        blue: &[u16],
    ) -> Result<(), FbError>;

    /// Power-mode request, where the kernel offers one.
    fn put_powermode(&mut self, mode: i32) -> Result<(), FbError> {
        let _ = mode;
        Err(FbError::Unsupported("FBIOPUT_POWERMODE"))
    }

    /// `FBIOBLANK`.
    fn blank(&mut self, level: i32) -> Result<(), FbError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitfield_mask_565() {
        assert_eq!(Bitfield::new(11, 5).mask(), 0xF800);
        assert_eq!(Bitfield::new(5, 6).mask(), 0x07E0);
        assert_eq!(Bitfield::new(0, 5).mask(), 0x001F);
    }

    #[test]
    fn bitfield_mask_degenerate() {
        assert_eq!(Bitfield::new(3, 0).mask(), 0);
        assert_eq!(Bitfield::new(0, 32).mask(), u32::MAX);
        assert_eq!(Bitfield::new(40, 4).mask(), 0);
    }

    #[test]
    fn visual_raw_round_trip() {
        for raw in 0..8 {
            assert_eq!(Visual::from_raw(raw).to_raw(), raw);
        }
        assert_eq!(Visual::from_raw(4), Visual::DirectColor);
        assert_eq!(Visual::from_raw(5), Visual::StaticPseudoColor);
    }

    #[test]
    fn fix_id_trims_nul() {
        let mut fix = FixScreenInfo::default();
        fix.id[..8].copy_from_slice(b"S1D13806");
        assert_eq!(fix.id_str(), "S1D13806");
    }
}
