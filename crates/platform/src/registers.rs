//! Memory-mapped register access
//!
//! Controller registers are addressed by a byte offset from the start of the
//! register aperture. [`RegOffset`] keeps those offsets apart from pixel
//! memory addresses so one cannot be passed where the other is expected.

/// Byte offset of a register inside the controller's register aperture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RegOffset(u16);

impl RegOffset {
    /// Wrap a raw register offset.
    #[must_use]
    pub const fn new(offset: u16) -> Self {
        Self(offset)
    }

    /// Raw offset in bytes.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Offset as a `usize` index into a mapped aperture.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for RegOffset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

/// Register-level I/O over a mapped controller aperture.
///
/// Accesses are uncached and observed by the device in program order.
/// Implementations are the `/dev/mem` mapping on hardware
/// ([`crate::linux::MmioRegisters`]) and an in-memory register file in tests
/// ([`crate::mocks::MockRegisters`]).
pub trait RegisterIo {
    /// Read an 8-bit register.
    fn read8(&self, offset: RegOffset) -> u8;

    /// Write an 8-bit register.
    fn write8(&mut self, offset: RegOffset, value: u8);

    /// Read a 16-bit little-endian register pair.
    fn read16(&self, offset: RegOffset) -> u16;

    /// Write a 16-bit little-endian register pair.
    fn write16(&mut self, offset: RegOffset, value: u16);
}

impl<T: RegisterIo + ?Sized> RegisterIo for &mut T {
    fn read8(&self, offset: RegOffset) -> u8 {
        (**self).read8(offset)
    }

    fn write8(&mut self, offset: RegOffset, value: u8) {
        (**self).write8(offset, value);
    }

    fn read16(&self, offset: RegOffset) -> u16 {
        (**self).read16(offset)
    }

    fn write16(&mut self, offset: RegOffset, value: u16) {
        (**self).write16(offset, value);
    }
}
