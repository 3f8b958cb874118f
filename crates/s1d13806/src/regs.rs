//! S1D13806 BitBLT register map
//!
//! Source: Epson S1D13806 Hardware Functional Specification, section 8
//! (BitBLT registers, REG[0100h] – REG[0119h]).
//!
//! # BitBLT addressing
//!
//! Source and destination start addresses are 21-bit byte offsets into the
//! display memory, split over a 16-bit register pair (bits 15:0) and an 8-bit
//! register (bits 20:16). Width and height are programmed as `n - 1`. The
//! memory offset (stride) is programmed in 16-bit words.
//!
//! ## ACTIVE latch
//! Writing BLTCTRL0 with [`BLTCTRL0_ACTIVE`] set starts the programmed
//! operation. The bit reads back set until the engine has finished, so the
//! same bit is both the start strobe and the completion flag.

use platform::{Alu, RegOffset};

// ---------------------------------------------------------------------------
// Register addresses
// ---------------------------------------------------------------------------

/// BitBLT control 0: start strobe and busy flag.
pub const BLTCTRL0: RegOffset = RegOffset::new(0x100);

/// BitBLT control 1: colour format and address mode.
pub const BLTCTRL1: RegOffset = RegOffset::new(0x101);

/// BitBLT raster operation code.
pub const BLTROP: RegOffset = RegOffset::new(0x102);

/// BitBLT operation select.
pub const BLTOPERATION: RegOffset = RegOffset::new(0x103);

/// Source start address bits 15:0.
pub const BLTSRCSTART01: RegOffset = RegOffset::new(0x104);

/// Source start address bits 20:16.
pub const BLTSRCSTART2: RegOffset = RegOffset::new(0x106);

/// Destination start address bits 15:0.
pub const BLTDSTSTART01: RegOffset = RegOffset::new(0x108);

/// Destination start address bits 20:16.
pub const BLTDSTSTART2: RegOffset = RegOffset::new(0x10A);

/// Memory address offset, in 16-bit words.
pub const BLTSTRIDE: RegOffset = RegOffset::new(0x10C);

/// Width in pixels, minus one.
pub const BLTWIDTH: RegOffset = RegOffset::new(0x110);

/// Height in lines, minus one.
pub const BLTHEIGHT: RegOffset = RegOffset::new(0x112);

/// Background colour.
pub const BLTBGCOLOR: RegOffset = RegOffset::new(0x114);

/// Foreground colour.
pub const BLTFGCOLOR: RegOffset = RegOffset::new(0x118);

/// Bytes covered by the register aperture.
pub const REGISTER_FILE_LEN: usize = 0x2000;

// ---------------------------------------------------------------------------
// Bit fields
// ---------------------------------------------------------------------------

/// BLTCTRL0: operation in progress.
pub const BLTCTRL0_ACTIVE: u8 = 1 << 7;

/// BLTCTRL1: 16 bits per pixel, linear destination.
pub const BLTCTRL1_16BPP: u8 = 0x01;

/// Operation codes for BLTOPERATION.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BltOp {
    /// Move with ROP, addresses increasing.
    MovePosRop = 0x02,
    /// Move with ROP, addresses decreasing.
    MoveNegRop = 0x03,
    /// Pattern fill with ROP.
    PatFillRop = 0x06,
    /// Solid fill with the foreground colour.
    SolidFill = 0x0C,
}

impl BltOp {
    /// Register encoding.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// Raster operations
// ---------------------------------------------------------------------------

/// Controller ROP code for each X alu, indexed by `GX*` value.
///
/// The controller orders its two operand bits opposite to X, so every code
/// is the bit-reversed nibble of the alu.
pub const ROP_TABLE: [u8; 16] = [
    0x0, // clear
    0x8, // and
    0x4, // andReverse
    0xC, // copy
    0x2, // andInverted
    0xA, // noop
    0x6, // xor
    0xE, // or
    0x1, // nor
    0x9, // equiv
    0x5, // invert
    0xD, // orReverse
    0x3, // copyInverted
    0xB, // orInverted
    0x7, // nand
    0xF, // set
];

/// Controller ROP code for `alu`.
pub const fn rop(alu: Alu) -> u8 {
    ROP_TABLE[alu.code() as usize]
}
