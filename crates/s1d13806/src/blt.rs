//! BitBLT engine wrapper
//!
//! Serializes operations onto the register window. Every public operation
//! that starts the engine returns only once BLTCTRL0 reads idle again, so
//! blits complete in strict program order.

use platform::{Alu, RegisterIo};

use crate::error::DriverError;
use crate::regs::{
    rop, BltOp, BLTBGCOLOR, BLTCTRL0, BLTCTRL0_ACTIVE, BLTCTRL1, BLTCTRL1_16BPP, BLTDSTSTART01,
    BLTDSTSTART2, BLTFGCOLOR, BLTHEIGHT, BLTOPERATION, BLTROP, BLTSRCSTART01, BLTSRCSTART2,
    BLTSTRIDE, BLTWIDTH,
};

/// Copy direction. The engine walks either both axes forwards or both
/// backwards; mixed directions have no encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BltDirection {
    /// Top-left to bottom-right.
    Positive,
    /// Bottom-right to top-left.
    Negative,
}

impl BltDirection {
    /// Direction for an EXA `(xdir, ydir)` pair, if the engine supports it.
    pub const fn from_signs(xdir: i32, ydir: i32) -> Option<Self> {
        if xdir > 0 && ydir > 0 {
            Some(Self::Positive)
        } else if xdir < 0 && ydir < 0 {
            Some(Self::Negative)
        } else {
            None
        }
    }

    const fn op(self) -> BltOp {
        match self {
            Self::Positive => BltOp::MovePosRop,
            Self::Negative => BltOp::MoveNegRop,
        }
    }
}

/// A display-memory byte address as the engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BltAddr(u32);

impl BltAddr {
    /// Wrap a byte offset from the start of display memory.
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Raw byte offset.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Register split: bits 15:0 and bits 23:16.
    #[allow(clippy::cast_possible_truncation)] // intentional register split
    pub const fn split(self) -> (u16, u8) {
        (self.0 as u16, (self.0 >> 16) as u8)
    }
}

/// Register-level BitBLT programming.
#[derive(Debug)]
pub struct BltEngine<R> {
    regs: R,
    spin_limit: Option<u32>,
}

impl<R: RegisterIo> BltEngine<R> {
    /// Wrap a register window. `spin_limit` bounds [`wait_idle`](Self::wait_idle).
    pub fn new(regs: R, spin_limit: Option<u32>) -> Self {
        Self { regs, spin_limit }
    }

    /// Underlying register window.
    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Underlying register window, mutable.
    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// True while an operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.regs.read8(BLTCTRL0) & BLTCTRL0_ACTIVE != 0
    }

    /// Spin until BLTCTRL0.ACTIVE clears.
    ///
    /// Unbounded unless a spin limit was configured.
    pub fn wait_idle(&self) -> Result<(), DriverError> {
        let mut polls: u32 = 0;
        while self.is_busy() {
            polls = polls.saturating_add(1);
            if let Some(limit) = self.spin_limit {
                if polls >= limit {
                    tracing::error!(polls, "BitBLT engine hang");
                    return Err(DriverError::EngineHang { polls });
                }
            }
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Bring-up: engine stopped, 16 bpp, memory offset from `stride`.
    pub fn configure(&mut self, stride: u32) {
        self.regs.write8(BLTCTRL0, 0x00);
        self.regs.write8(BLTCTRL1, BLTCTRL1_16BPP);
        self.set_stride(stride);
    }

    /// Program the memory offset from a byte stride.
    #[allow(clippy::cast_possible_truncation)] // register holds 16-bit words
    pub fn set_stride(&mut self, stride: u32) {
        self.regs.write16(BLTSTRIDE, (stride >> 1) as u16);
    }

    /// Program the raster operation for `alu`.
    pub fn set_rop(&mut self, alu: Alu) {
        self.regs.write8(BLTROP, rop(alu));
    }

    /// Program foreground and background colours.
    pub fn set_colors(&mut self, fg: u16, bg: u16) {
        self.regs.write16(BLTFGCOLOR, fg);
        self.regs.write16(BLTBGCOLOR, bg);
    }

    /// Select the operation the next start performs.
    pub fn set_operation(&mut self, op: BltOp) {
        self.regs.write8(BLTOPERATION, op.code());
    }

    fn set_src(&mut self, addr: BltAddr) {
        let (lo, hi) = addr.split();
        self.regs.write16(BLTSRCSTART01, lo);
        self.regs.write8(BLTSRCSTART2, hi);
    }

    fn set_dst(&mut self, addr: BltAddr) {
        let (lo, hi) = addr.split();
        self.regs.write16(BLTDSTSTART01, lo);
        self.regs.write8(BLTDSTSTART2, hi);
    }

    #[allow(clippy::cast_possible_truncation)] // engine extents are 10-bit
    fn set_extent(&mut self, width: u32, height: u32) {
        self.regs.write16(BLTWIDTH, width.saturating_sub(1) as u16);
        self.regs.write16(BLTHEIGHT, height.saturating_sub(1) as u16);
    }

    fn start(&mut self) -> Result<(), DriverError> {
        self.regs.write8(BLTCTRL0, BLTCTRL0_ACTIVE);
        self.wait_idle()
    }

    /// Fill `width`×`height` pixels at `dst` with `color`.
    pub fn fill(&mut self, dst: BltAddr, width: u32, height: u32, color: u16) -> Result<(), DriverError> {
        tracing::trace!(dst = dst.get(), width, height, color, "blt fill");
        self.set_dst(dst);
        self.regs.write16(BLTFGCOLOR, color);
        self.set_operation(BltOp::SolidFill);
        self.set_extent(width, height);
        self.start()
    }

    /// Move `width`×`height` pixels from `src` to `dst` with the current ROP.
    ///
    /// For [`BltDirection::Negative`] both addresses name the bottom-right
    /// pixel.
    pub fn copy(
        &mut self,
        src: BltAddr,
        dst: BltAddr,
        width: u32,
        height: u32,
        direction: BltDirection,
    ) -> Result<(), DriverError> {
        tracing::trace!(src = src.get(), dst = dst.get(), width, height, ?direction, "blt copy");
        self.set_src(src);
        self.set_dst(dst);
        self.set_extent(width, height);
        self.set_operation(direction.op());
        self.start()
    }

    /// Run the previously selected fill operation over `width`×`height` at `dst`.
    pub fn solid(&mut self, dst: BltAddr, width: u32, height: u32) -> Result<(), DriverError> {
        tracing::trace!(dst = dst.get(), width, height, "blt solid");
        self.set_dst(dst);
        self.set_extent(width, height);
        self.start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::REGISTER_FILE_LEN;
    use platform::mocks::{MockRegisters, RegWrite};

    fn engine(polls: u32, limit: Option<u32>) -> BltEngine<MockRegisters> {
        let regs =
            MockRegisters::new(REGISTER_FILE_LEN).with_busy_latch(BLTCTRL0, BLTCTRL0_ACTIVE, polls);
        BltEngine::new(regs, limit)
    }

    #[test]
    fn direction_from_signs() {
        assert_eq!(BltDirection::from_signs(1, 1), Some(BltDirection::Positive));
        assert_eq!(BltDirection::from_signs(-1, -1), Some(BltDirection::Negative));
        assert_eq!(BltDirection::from_signs(-1, 1), None);
        assert_eq!(BltDirection::from_signs(1, -1), None);
        assert_eq!(BltDirection::from_signs(0, 1), None);
    }

    #[test]
    fn address_split() {
        assert_eq!(BltAddr::new(0x12_3456).split(), (0x3456, 0x12));
        assert_eq!(BltAddr::new(0).split(), (0, 0));
    }

    #[test]
    fn configure_writes_bring_up_sequence() {
        let mut blt = engine(1, None);
        blt.configure(1600);
        assert_eq!(
            blt.regs().writes(),
            &[
                RegWrite::Byte(BLTCTRL0, 0x00),
                RegWrite::Byte(BLTCTRL1, 0x01),
                RegWrite::Word(BLTSTRIDE, 800),
            ]
        );
    }

    #[test]
    fn fill_programs_extent_minus_one_and_waits() {
        let mut blt = engine(4, None);
        blt.fill(BltAddr::new(0x1_0002), 800, 600, 0xF800).unwrap();
        assert_eq!(
            blt.regs().writes(),
            &[
                RegWrite::Word(BLTDSTSTART01, 0x0002),
                RegWrite::Byte(BLTDSTSTART2, 0x01),
                RegWrite::Word(BLTFGCOLOR, 0xF800),
                RegWrite::Byte(BLTOPERATION, BltOp::SolidFill.code()),
                RegWrite::Word(BLTWIDTH, 799),
                RegWrite::Word(BLTHEIGHT, 599),
                RegWrite::Byte(BLTCTRL0, BLTCTRL0_ACTIVE),
            ]
        );
        assert!(!blt.is_busy());
        assert_eq!(blt.regs().reads(), 6);
    }

    #[test]
    fn negative_copy_selects_movenegrop() {
        let mut blt = engine(1, None);
        blt.copy(BltAddr::new(10), BltAddr::new(20), 1, 1, BltDirection::Negative)
            .unwrap();
        assert_eq!(
            blt.regs().last_byte(BLTOPERATION),
            Some(BltOp::MoveNegRop.code())
        );
        assert_eq!(blt.regs().last_word(BLTWIDTH), Some(0));
        assert_eq!(blt.regs().last_word(BLTHEIGHT), Some(0));
    }

    #[test]
    fn spin_limit_reports_hang() {
        let mut blt = engine(u32::MAX, Some(16));
        let err = blt
            .copy(BltAddr::new(0), BltAddr::new(0), 8, 8, BltDirection::Positive)
            .unwrap_err();
        assert!(matches!(err, DriverError::EngineHang { polls: 16 }));
    }

    #[test]
    fn wait_idle_on_idle_engine_reads_once() {
        let blt = engine(3, None);
        blt.wait_idle().unwrap();
        assert_eq!(blt.regs().reads(), 1);
    }

    #[test]
    fn set_rop_uses_table() {
        let mut blt = engine(1, None);
        blt.set_rop(Alu::Copy);
        assert_eq!(blt.regs().last_byte(BLTROP), Some(0xC));
    }
}
