//! EXA accelerator adapter
//!
//! Binds the BitBLT engine to the host's 2D acceleration hooks. Solid fills
//! stay in software unless enabled by configuration; copies are accelerated
//! when source and destination share the onscreen pixel format and pitch
//! and walk both axes the same way.
//!
//! Every accelerated operation waits for the engine before returning, so
//! [`Accelerator::wait_marker`] never has more than one blit to wait for.

use platform::host::planemask_is_solid;
use platform::{
    Alu, ExaDriverInfo, ExaFlags, MigrationPolicy, Pixmap, RegisterIo, ScreenHost, Size,
};

use crate::blt::{BltAddr, BltDirection, BltEngine};
use crate::error::DriverError;
use crate::regs::BltOp;

/// EXA interface version implemented.
pub const EXA_VERSION: (u32, u32) = (2, 0);

/// Pixmap offset and pitch alignment in bytes.
pub const PIXMAP_ALIGN: u32 = 4;

/// Marker handed to the host for later [`Accelerator::wait_marker`] calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SyncToken(u32);

impl SyncToken {
    /// Marker value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default)]
struct SyncState {
    marker: u32,
    needs_sync: bool,
}

impl SyncState {
    fn mark(&mut self) -> SyncToken {
        self.marker = self.marker.wrapping_add(1);
        self.needs_sync = true;
        SyncToken(self.marker)
    }
}

/// Copy in progress between `prepare_copy` and `done_copy`.
#[derive(Debug, Clone, Copy)]
struct PendingCopy {
    src: Pixmap,
    dst: Pixmap,
    direction: BltDirection,
}

/// Accelerator bookkeeping for one screen.
#[derive(Debug)]
pub struct AccelState {
    byte_stride: u32,
    bytes_per_pixel: u32,
    physical: Size,
    logical: Size,
    memory_base: usize,
    memory_size: usize,
    solid_enabled: bool,
    copy: Option<PendingCopy>,
    solid: Option<Pixmap>,
    sync: SyncState,
}

impl AccelState {
    /// State for a framebuffer of `byte_stride` × `physical` at
    /// `bits_per_pixel`, with `memory_size` bytes of display memory starting
    /// at `memory_base` in the mapping.
    pub fn new(
        byte_stride: u32,
        bits_per_pixel: u32,
        physical: Size,
        logical: Size,
        memory_base: usize,
        memory_size: usize,
        solid_enabled: bool,
    ) -> Self {
        Self {
            byte_stride,
            bytes_per_pixel: bits_per_pixel / 8,
            physical,
            logical,
            memory_base,
            memory_size,
            solid_enabled,
            copy: None,
            solid: None,
            sync: SyncState::default(),
        }
    }

    /// Byte stride of the onscreen surface.
    pub fn byte_stride(&self) -> u32 {
        self.byte_stride
    }

    /// Bytes per pixel of the onscreen surface.
    pub fn bytes_per_pixel(&self) -> u32 {
        self.bytes_per_pixel
    }

    /// First byte past the onscreen surface.
    pub fn offscreen_base(&self) -> usize {
        self.byte_stride as usize * self.physical.height as usize
    }

    /// True between a marker being handed out and the matching wait.
    pub fn needs_sync(&self) -> bool {
        self.sync.needs_sync
    }

    /// Last marker handed out.
    pub fn last_marker(&self) -> SyncToken {
        SyncToken(self.sync.marker)
    }

    /// Registration record for the host.
    pub fn driver_info(&self) -> ExaDriverInfo {
        ExaDriverInfo {
            exa_major: EXA_VERSION.0,
            exa_minor: EXA_VERSION.1,
            memory_base: self.memory_base,
            memory_size: self.memory_size,
            offscreen_base: self.offscreen_base(),
            pixmap_offset_align: PIXMAP_ALIGN,
            pixmap_pitch_align: PIXMAP_ALIGN,
            max_x: self.logical.width.saturating_sub(1),
            max_y: self.logical.height.saturating_sub(1),
            flags: ExaFlags::OFFSCREEN_PIXMAPS | ExaFlags::TWO_BITBLT_DIRECTIONS,
            migration: MigrationPolicy::Smart,
        }
    }

    /// True when `pixmap` starts inside display memory.
    fn holds(&self, pixmap: &Pixmap) -> bool {
        (pixmap.offset as usize) < self.memory_size
    }

    /// Engine address of `(x, y)` inside a surface at `base`, after checking
    /// that the `width`×`height` block starting there stays in display
    /// memory.
    fn addr(
        &self,
        base: u32,
        (x, y): (u32, u32),
        (width, height): (u32, u32),
    ) -> Result<BltAddr, DriverError> {
        let at = |x: u64, y: u64| {
            u64::from(base) + y * u64::from(self.byte_stride) + x * u64::from(self.bytes_per_pixel)
        };
        let (x, y) = (u64::from(x), u64::from(y));
        let last = at(x + u64::from(width) - 1, y + u64::from(height) - 1);
        let end = last + u64::from(self.bytes_per_pixel);
        if end > self.memory_size as u64 {
            tracing::warn!(base, x, y, width, height, end, "blit outside display memory");
            return Err(DriverError::BltRange {
                end,
                limit: self.memory_size,
            });
        }
        // Below memory_size, which the 21-bit memory bus keeps far under u32.
        #[allow(clippy::cast_possible_truncation)]
        Ok(BltAddr::new(at(x, y) as u32))
    }
}

/// The host's 2D acceleration hooks.
pub trait Accelerator {
    /// Set up solid fills into `pixmap`. `false` leaves them to software.
    fn prepare_solid(
        &mut self,
        pixmap: &Pixmap,
        alu: Alu,
        planemask: u32,
        fg: u32,
    ) -> Result<bool, DriverError>;

    /// Fill the half-open rectangle `(x1, y1)..(x2, y2)`.
    fn solid(&mut self, x1: u32, y1: u32, x2: u32, y2: u32) -> Result<(), DriverError>;

    /// End a run of solid fills.
    fn done_solid(&mut self);

    /// Set up copies from `src` to `dst`. `false` leaves them to software.
    fn prepare_copy(
        &mut self,
        src: &Pixmap,
        dst: &Pixmap,
        xdir: i32,
        ydir: i32,
        alu: Alu,
        planemask: u32,
    ) -> Result<bool, DriverError>;

    /// Copy `width`×`height` pixels from `(src_x, src_y)` to `(dst_x, dst_y)`.
    fn copy(
        &mut self,
        src_x: u32,
        src_y: u32,
        dst_x: u32,
        dst_y: u32,
        width: u32,
        height: u32,
    ) -> Result<(), DriverError>;

    /// End a run of copies.
    fn done_copy(&mut self);

    /// Block until everything up to `marker` has completed.
    fn wait_marker(&mut self, marker: SyncToken) -> Result<(), DriverError>;
}

/// The accelerator of a live screen: its state, the engine and the host,
/// borrowed together for the duration of a drawing call.
#[derive(Debug)]
pub struct EpsonAccel<'a, R, H> {
    state: &'a mut AccelState,
    blt: &'a mut BltEngine<R>,
    host: &'a mut H,
}

impl<'a, R: RegisterIo, H: ScreenHost> EpsonAccel<'a, R, H> {
    /// Bundle the pieces.
    pub fn new(state: &'a mut AccelState, blt: &'a mut BltEngine<R>, host: &'a mut H) -> Self {
        Self { state, blt, host }
    }

    /// Accelerator state.
    pub fn state(&self) -> &AccelState {
        self.state
    }

    /// Engine bring-up and onscreen clear, before registering with the host.
    pub fn init_engine(&mut self) -> Result<(), DriverError> {
        self.blt.configure(self.state.byte_stride);
        let Size { width, height } = self.state.physical;
        self.blt.fill(BltAddr::new(0), width, height, 0)
    }

    /// Offer the accelerator to the host.
    pub fn register(&mut self) -> Result<(), DriverError> {
        let info = self.state.driver_info();
        tracing::debug!(
            memory_base = info.memory_base,
            memory_size = info.memory_size,
            offscreen_base = info.offscreen_base,
            "registering EXA"
        );
        if self.host.exa_driver_init(&info) {
            Ok(())
        } else {
            tracing::error!("failed to initialize EXA");
            Err(DriverError::ExaRefused)
        }
    }

    /// Drawing resumes: drain the engine and hand the host a fresh marker.
    pub fn draw_enable(&mut self) -> Result<(), DriverError> {
        self.blt.wait_idle()?;
        self.mark_sync();
        Ok(())
    }

    /// Drawing suspends. The engine is already idle.
    pub fn draw_disable(&mut self) {
        tracing::trace!("draw disable");
    }

    /// The screen is going away. The engine keeps no state to release.
    pub fn draw_fini(&mut self) {
        tracing::trace!("draw fini");
    }

    fn mark_sync(&mut self) -> SyncToken {
        let token = self.state.sync.mark();
        self.host.mark_sync();
        token
    }
}

impl<R: RegisterIo, H: ScreenHost> Accelerator for EpsonAccel<'_, R, H> {
    fn prepare_solid(
        &mut self,
        pixmap: &Pixmap,
        alu: Alu,
        planemask: u32,
        fg: u32,
    ) -> Result<bool, DriverError> {
        if !self.state.solid_enabled {
            tracing::trace!("solid fill left to software");
            return Ok(false);
        }
        if !planemask_is_solid(pixmap.depth, planemask) {
            tracing::trace!(planemask, depth = pixmap.depth, "solid: partial planemask");
            return Ok(false);
        }
        if !self.state.holds(pixmap) {
            tracing::debug!(offset = pixmap.offset, "solid: pixmap outside display memory");
            return Ok(false);
        }

        #[allow(clippy::cast_possible_truncation)] // engine colours are 16-bit
        let fg = (fg & 0xffff) as u16;
        self.blt.set_colors(fg, fg);
        self.blt.wait_idle()?;
        self.blt.set_rop(alu);
        self.blt.set_operation(if alu == Alu::Noop {
            BltOp::PatFillRop
        } else {
            BltOp::SolidFill
        });
        self.state.solid = Some(*pixmap);
        tracing::trace!(?alu, fg, "prepare solid");
        Ok(true)
    }

    fn solid(&mut self, x1: u32, y1: u32, x2: u32, y2: u32) -> Result<(), DriverError> {
        let width = x2.saturating_sub(x1);
        let height = y2.saturating_sub(y1);
        if width == 0 || height == 0 {
            return Ok(());
        }
        let Some(pixmap) = self.state.solid else {
            tracing::warn!("solid without prepare_solid");
            return Err(DriverError::NotPrepared { op: "solid" });
        };
        let dst = self.state.addr(pixmap.offset, (x1, y1), (width, height))?;
        self.blt.solid(dst, width, height)
    }

    fn done_solid(&mut self) {
        self.state.solid = None;
        self.mark_sync();
        tracing::trace!("done solid");
    }

    fn prepare_copy(
        &mut self,
        src: &Pixmap,
        dst: &Pixmap,
        xdir: i32,
        ydir: i32,
        alu: Alu,
        planemask: u32,
    ) -> Result<bool, DriverError> {
        let bpp = self.state.bytes_per_pixel * 8;
        if self.state.bytes_per_pixel != 2 || src.bits_per_pixel != bpp || dst.bits_per_pixel != bpp {
            tracing::trace!(
                src = src.bits_per_pixel,
                dst = dst.bits_per_pixel,
                bpp,
                "copy: pixel format"
            );
            return Ok(false);
        }
        if !planemask_is_solid(dst.depth, planemask) {
            tracing::trace!(planemask, depth = dst.depth, "copy: partial planemask");
            return Ok(false);
        }
        if src.pitch != dst.pitch {
            tracing::trace!(src = src.pitch, dst = dst.pitch, "copy: pitch mismatch");
            return Ok(false);
        }
        if !self.state.holds(src) || !self.state.holds(dst) {
            tracing::debug!(
                src = src.offset,
                dst = dst.offset,
                "copy: pixmap outside display memory"
            );
            return Ok(false);
        }
        let Some(direction) = BltDirection::from_signs(xdir, ydir) else {
            tracing::debug!(xdir, ydir, "unsupported copy direction");
            return Ok(false);
        };

        self.blt.wait_idle()?;
        self.blt.set_rop(alu);
        self.state.copy = Some(PendingCopy {
            src: *src,
            dst: *dst,
            direction,
        });
        tracing::trace!(xdir, ydir, ?alu, "prepare copy");
        Ok(true)
    }

    fn copy(
        &mut self,
        src_x: u32,
        src_y: u32,
        dst_x: u32,
        dst_y: u32,
        width: u32,
        height: u32,
    ) -> Result<(), DriverError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        let Some(pending) = self.state.copy else {
            tracing::warn!("copy without prepare_copy");
            return Err(DriverError::NotPrepared { op: "copy" });
        };

        let extent = (width, height);
        let src_top_left = self.state.addr(pending.src.offset, (src_x, src_y), extent)?;
        let dst_top_left = self.state.addr(pending.dst.offset, (dst_x, dst_y), extent)?;
        let (src, dst) = match pending.direction {
            BltDirection::Positive => (src_top_left, dst_top_left),
            BltDirection::Negative => {
                let (dx, dy) = (width - 1, height - 1);
                (
                    self.state
                        .addr(pending.src.offset, (src_x + dx, src_y + dy), (1, 1))?,
                    self.state
                        .addr(pending.dst.offset, (dst_x + dx, dst_y + dy), (1, 1))?,
                )
            }
        };
        tracing::trace!(width, height, src_x, src_y, dst_x, dst_y, "copy");
        self.blt.set_stride(self.state.byte_stride);
        self.blt.copy(src, dst, width, height, pending.direction)
    }

    fn done_copy(&mut self) {
        self.state.copy = None;
        self.mark_sync();
        tracing::trace!("done copy");
    }

    fn wait_marker(&mut self, marker: SyncToken) -> Result<(), DriverError> {
        tracing::trace!(marker = marker.get(), "wait marker");
        self.blt.wait_idle()?;
        self.state.sync.needs_sync = false;
        Ok(())
    }
}
