//! Mock implementations for testing
//!
//! In-process stand-ins for every platform seam, for use in unit and
//! integration tests. Each mock records what the driver did to it so tests
//! can assert on the exact ioctl, register and host traffic.

#![cfg(any(test, feature = "mocks"))]
#![allow(clippy::missing_panics_doc)]

use core::cell::Cell;

use crate::fb::{FbError, FixScreenInfo, FramebufferDevice, VarScreenInfo, Visual, CMAP_SIZE};
use crate::host::{ExaDriverInfo, PixmapHeader, ScreenHost};
use crate::memory::VideoMemory;
use crate::registers::{RegOffset, RegisterIo};
use crate::rotation::{PointerMatrix, SubpixelOrder};
use crate::Bitfield;

// ── Framebuffer device ──────────────────────────────────────────────────────

/// One ioctl issued against a [`MockFramebuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FbCall {
    /// `FBIOGET_FSCREENINFO`
    FixedInfo,
    /// `FBIOGET_VSCREENINFO`
    VarInfo,
    /// `FBIOPUT_VSCREENINFO` with the activate flags passed.
    PutVarInfo {
        /// `var.activate` at call time.
        activate: u32,
    },
    /// `FBIOGETCMAP`
    GetCmap {
        /// First index.
        start: u32,
        /// Entry count.
        len: u32,
    },
    /// `FBIOPUTCMAP`
    PutCmap {
        /// First index.
        start: u32,
        /// Entry count.
        len: u32,
    },
    /// Power-mode request.
    PowerMode(i32),
    /// `FBIOBLANK`
    Blank(i32),
}

/// Mock kernel framebuffer with an in-memory colormap.
#[derive(Debug, Clone)]
pub struct MockFramebuffer {
    /// Fixed info returned by `FBIOGET_FSCREENINFO`.
    pub fix: FixScreenInfo,
    /// Variable info returned by `FBIOGET_VSCREENINFO`.
    pub var: VarScreenInfo,
    /// Hardware LUT, one array per channel.
    pub cmap: [[u16; CMAP_SIZE]; 3],
    /// Every ioctl in order.
    pub calls: Vec<FbCall>,
    /// Fail `FBIOGET_FSCREENINFO` / `FBIOGET_VSCREENINFO`.
    pub fail_info: bool,
    /// Fail `FBIOPUT_VSCREENINFO`.
    pub fail_put_var: bool,
    /// Fail `FBIOGETCMAP`.
    pub fail_get_cmap: bool,
    /// Fail `FBIOBLANK`.
    pub fail_blank: bool,
    /// Accept the power-mode request.
    pub powermode_supported: bool,
}

fn mock_ioctl_error(request: &'static str) -> FbError {
    FbError::Ioctl {
        request,
        source: std::io::Error::from_raw_os_error(libc::EINVAL),
    }
}

impl MockFramebuffer {
    /// A panel of `xres`×`yres` at `bpp`, packed RGB channels, 1 MiB of
    /// video memory at the S1D13806's default aperture.
    pub fn new(xres: u32, yres: u32, bpp: u32) -> Self {
        let (red, green, blue) = match bpp {
            16 => (
                Bitfield::new(11, 5),
                Bitfield::new(5, 6),
                Bitfield::new(0, 5),
            ),
            15 => (
                Bitfield::new(10, 5),
                Bitfield::new(5, 5),
                Bitfield::new(0, 5),
            ),
            24 | 32 => (
                Bitfield::new(16, 8),
                Bitfield::new(8, 8),
                Bitfield::new(0, 8),
            ),
            _ => (
                Bitfield::new(0, bpp),
                Bitfield::new(0, bpp),
                Bitfield::new(0, bpp),
            ),
        };
        let bytes_pp = bpp.div_ceil(8);
        let fix = FixScreenInfo {
            smem_start: 0x1420_0000,
            smem_len: 0x14_0000,
            visual: Visual::TrueColor.to_raw(),
            line_length: xres * bytes_pp,
            ..FixScreenInfo::default()
        };
        let var = VarScreenInfo {
            xres,
            yres,
            xres_virtual: xres,
            yres_virtual: yres,
            bits_per_pixel: bpp,
            red,
            green,
            blue,
            ..VarScreenInfo::default()
        };
        Self {
            fix,
            var,
            cmap: [[0; CMAP_SIZE]; 3],
            calls: Vec::new(),
            fail_info: false,
            fail_put_var: false,
            fail_get_cmap: false,
            fail_blank: false,
            powermode_supported: false,
        }
    }

    /// Report a different visual class.
    #[must_use]
    pub fn with_visual(mut self, visual: Visual) -> Self {
        self.fix.visual = visual.to_raw();
        self
    }

    /// Report a physical size in millimetres.
    #[must_use]
    pub fn with_mm_size(mut self, width: u32, height: u32) -> Self {
        self.var.width = width;
        self.var.height = height;
        self
    }

    /// `FBIOPUTCMAP` calls as `(start, len)`.
    pub fn put_cmap_calls(&self) -> Vec<(u32, u32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                FbCall::PutCmap { start, len } => Some((*start, *len)),
                _ => None,
            })
            .collect()
    }

    /// `FBIOBLANK` levels in order.
    pub fn blank_levels(&self) -> Vec<i32> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                FbCall::Blank(level) => Some(*level),
                _ => None,
            })
            .collect()
    }

    fn cmap_range(start: u32, len: usize) -> Result<core::ops::Range<usize>, FbError> {
        let begin = start as usize;
        let end = begin.checked_add(len).filter(|end| *end <= CMAP_SIZE);
        match end {
            Some(end) => Ok(begin..end),
            None => Err(FbError::CmapRange {
                start,
                len: u32::try_from(len).unwrap_or(u32::MAX),
            }),
        }
    }
}

impl FramebufferDevice for MockFramebuffer {
    fn fixed_info(&mut self) -> Result<FixScreenInfo, FbError> {
        self.calls.push(FbCall::FixedInfo);
        if self.fail_info {
            return Err(mock_ioctl_error("FBIOGET_FSCREENINFO"));
        }
        Ok(self.fix)
    }

    fn var_info(&mut self) -> Result<VarScreenInfo, FbError> {
        self.calls.push(FbCall::VarInfo);
        if self.fail_info {
            return Err(mock_ioctl_error("FBIOGET_VSCREENINFO"));
        }
        Ok(self.var)
    }

    fn put_var_info(&mut self, var: &mut VarScreenInfo) -> Result<(), FbError> {
        self.calls.push(FbCall::PutVarInfo {
            activate: var.activate,
        });
        if self.fail_put_var {
            return Err(mock_ioctl_error("FBIOPUT_VSCREENINFO"));
        }
        self.var = *var;
        Ok(())
    }

    fn get_cmap(
        &mut self,
        start: u32,
        red: &mut [u16],
        green: &mut [u16],
        blue: &mut [u16],
    ) -> Result<(), FbError> {
        let range = Self::cmap_range(start, red.len())?;
        self.calls.push(FbCall::GetCmap {
            start,
            len: u32::try_from(range.len()).unwrap_or(u32::MAX),
        });
        if self.fail_get_cmap {
            return Err(mock_ioctl_error("FBIOGETCMAP"));
        }
        red.copy_from_slice(&self.cmap[0][range.clone()]);
        green.copy_from_slice(&self.cmap[1][range.clone()]);
        blue.copy_from_slice(&self.cmap[2][range]);
        Ok(())
    }

    fn put_cmap(
        &mut self,
        start: u32,
        red: &[u16],
        green: &[u16],
        blue: &[u16],
    ) -> Result<(), FbError> {
        let range = Self::cmap_range(start, red.len())?;
        self.calls.push(FbCall::PutCmap {
            start,
            len: u32::try_from(range.len()).unwrap_or(u32::MAX),
        });
        self.cmap[0][range.clone()].copy_from_slice(red);
        self.cmap[1][range.clone()].copy_from_slice(green);
        self.cmap[2][range].copy_from_slice(blue);
        Ok(())
    }

    fn put_powermode(&mut self, mode: i32) -> Result<(), FbError> {
        self.calls.push(FbCall::PowerMode(mode));
        if self.powermode_supported {
            Ok(())
        } else {
            Err(FbError::Unsupported("FBIOPUT_POWERMODE"))
        }
    }

    fn blank(&mut self, level: i32) -> Result<(), FbError> {
        self.calls.push(FbCall::Blank(level));
        if self.fail_blank {
            return Err(mock_ioctl_error("FBIOBLANK"));
        }
        Ok(())
    }
}

// ── Video memory ────────────────────────────────────────────────────────────

/// Heap-backed video memory.
#[derive(Debug, Clone)]
pub struct MockVideoMemory {
    bytes: Vec<u8>,
    page_size: usize,
}

impl MockVideoMemory {
    /// `len` zeroed bytes with 4 KiB pages.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
            page_size: 4096,
        }
    }

    /// Override the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl VideoMemory for MockVideoMemory {
    fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

// ── Register file ───────────────────────────────────────────────────────────

/// One register write recorded by [`MockRegisters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegWrite {
    /// 8-bit write.
    Byte(RegOffset, u8),
    /// 16-bit write.
    Word(RegOffset, u16),
}

impl RegWrite {
    /// Offset written.
    pub const fn offset(self) -> RegOffset {
        match self {
            Self::Byte(off, _) | Self::Word(off, _) => off,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BusyLatch {
    offset: RegOffset,
    bit: u8,
    polls: u32,
}

/// In-memory register file.
///
/// Optionally simulates a busy latch: writing `bit` at `offset` sets it, and
/// it reads back set for `polls` reads before clearing, like an engine that
/// finishes after a few status polls.
#[derive(Debug, Clone)]
pub struct MockRegisters {
    file: Vec<u8>,
    writes: Vec<RegWrite>,
    latch: Option<BusyLatch>,
    remaining: Cell<u32>,
    reads: Cell<usize>,
}

impl MockRegisters {
    /// A zeroed register file of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            file: vec![0; len],
            writes: Vec::new(),
            latch: None,
            remaining: Cell::new(0),
            reads: Cell::new(0),
        }
    }

    /// Simulate a busy bit that clears after `polls` reads.
    #[must_use]
    pub fn with_busy_latch(mut self, offset: RegOffset, bit: u8, polls: u32) -> Self {
        self.latch = Some(BusyLatch { offset, bit, polls });
        self
    }

    /// Writes since construction or the last [`clear_log`](Self::clear_log).
    pub fn writes(&self) -> &[RegWrite] {
        &self.writes
    }

    /// Forget recorded writes and the read counter.
    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.reads.set(0);
    }

    /// Number of reads performed.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    /// Current byte value, without counting as a poll.
    pub fn peek8(&self, offset: RegOffset) -> u8 {
        let raw = self.file.get(offset.index()).copied().unwrap_or(0);
        match self.latch {
            Some(l) if l.offset == offset && self.remaining.get() == 0 => raw & !l.bit,
            _ => raw,
        }
    }

    /// Current little-endian word value, without counting as a poll.
    pub fn peek16(&self, offset: RegOffset) -> u16 {
        let lo = self.peek8(offset);
        let hi = self.peek8(RegOffset::new(offset.get().wrapping_add(1)));
        u16::from_le_bytes([lo, hi])
    }

    /// Last byte written to `offset`, if any.
    pub fn last_byte(&self, offset: RegOffset) -> Option<u8> {
        self.writes.iter().rev().find_map(|w| match *w {
            RegWrite::Byte(off, v) if off == offset => Some(v),
            _ => None,
        })
    }

    /// Last word written to `offset`, if any.
    pub fn last_word(&self, offset: RegOffset) -> Option<u16> {
        self.writes.iter().rev().find_map(|w| match *w {
            RegWrite::Word(off, v) if off == offset => Some(v),
            _ => None,
        })
    }

    fn store(&mut self, offset: RegOffset, value: u8) {
        if let Some(slot) = self.file.get_mut(offset.index()) {
            *slot = value;
        }
        if let Some(l) = self.latch {
            if l.offset == offset {
                self.remaining
                    .set(if value & l.bit != 0 { l.polls.max(1) } else { 0 });
            }
        }
    }
}

impl RegisterIo for MockRegisters {
    fn read8(&self, offset: RegOffset) -> u8 {
        self.reads.set(self.reads.get() + 1);
        let value = self.peek8(offset);
        if let Some(l) = self.latch {
            if l.offset == offset {
                let left = self.remaining.get();
                if left > 0 {
                    self.remaining.set(left - 1);
                    return value | l.bit;
                }
            }
        }
        value
    }

    fn write8(&mut self, offset: RegOffset, value: u8) {
        self.writes.push(RegWrite::Byte(offset, value));
        self.store(offset, value);
    }

    fn read16(&self, offset: RegOffset) -> u16 {
        self.reads.set(self.reads.get() + 1);
        self.peek16(offset)
    }

    fn write16(&mut self, offset: RegOffset, value: u16) {
        self.writes.push(RegWrite::Word(offset, value));
        let [lo, hi] = value.to_le_bytes();
        self.store(offset, lo);
        self.store(RegOffset::new(offset.get().wrapping_add(1)), hi);
    }
}

// ── Host ────────────────────────────────────────────────────────────────────

/// Recording [`ScreenHost`].
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    /// Last accelerator registration.
    pub exa: Option<ExaDriverInfo>,
    /// Refuse accelerator registration.
    pub refuse_exa: bool,
    /// Number of `mark_sync` calls.
    pub sync_marks: u32,
    /// Every pointer matrix installed.
    pub pointer_matrices: Vec<PointerMatrix>,
    /// Every accepted screen pixmap header.
    pub headers: Vec<PixmapHeader>,
    /// Refuse the next `modify_screen_pixmap`, then accept again.
    pub refuse_next_header: bool,
    /// Every subpixel order published.
    pub subpixel_orders: Vec<SubpixelOrder>,
    /// Report no usable visuals.
    pub no_visuals: bool,
}

impl MockHost {
    /// A host that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent accepted screen pixmap header.
    pub fn last_header(&self) -> Option<&PixmapHeader> {
        self.headers.last()
    }
}

impl ScreenHost for MockHost {
    fn exa_driver_init(&mut self, info: &ExaDriverInfo) -> bool {
        if self.refuse_exa {
            return false;
        }
        self.exa = Some(*info);
        true
    }

    fn mark_sync(&mut self) {
        self.sync_marks += 1;
    }

    fn set_pointer_matrix(&mut self, matrix: &PointerMatrix) {
        self.pointer_matrices.push(*matrix);
    }

    fn modify_screen_pixmap(&mut self, header: &PixmapHeader) -> bool {
        if self.refuse_next_header {
            self.refuse_next_header = false;
            return false;
        }
        self.headers.push(*header);
        true
    }

    fn set_subpixel_order(&mut self, order: SubpixelOrder) {
        self.subpixel_orders.push(order);
    }

    fn has_visuals(&self) -> bool {
        !self.no_visuals
    }
}
