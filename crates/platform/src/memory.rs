//! Physical apertures and mapped video memory
//!
//! The S1D13806 exposes its register file and its display buffer as two
//! fixed physical windows. The board description supplies their address and
//! size; the process maps them through `/dev/mem`.
//!
//! ```text
//! phys base ──┬───────────────┐
//!             │ page slack    │  smem_start % page_size
//! pixel origin├───────────────┤
//!             │ onscreen      │  line_length × yres
//! offscreen   ├───────────────┤
//!             │ pixmaps       │
//!             └───────────────┘  smem_len
//! ```

/// A physical address window described by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysAperture {
    /// Physical start address.
    pub addr: u64,
    /// Window length in bytes.
    pub size: usize,
}

impl PhysAperture {
    /// Construct an aperture.
    #[must_use]
    pub const fn new(addr: u64, size: usize) -> Self {
        Self { addr, size }
    }
}

/// Errors from mapping a physical aperture.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The physical memory device could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Device path that was opened.
        path: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// `mmap` refused the window.
    #[error("failed to map {size:#x} bytes at {addr:#x}: {source}")]
    Map {
        /// Physical address requested.
        addr: u64,
        /// Length requested.
        size: usize,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// Zero-sized window.
    #[error("aperture at {0:#x} has zero length")]
    Empty(u64),
}

/// A mapped, byte-addressable video memory window.
///
/// The mapping stays valid for the lifetime of the implementor and is
/// released on drop.
pub trait VideoMemory {
    /// Entire mapping, starting at the mapped base.
    fn as_slice(&self) -> &[u8];

    /// Entire mapping, mutable.
    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Page size used to compute the pixel origin inside the mapping.
    fn page_size(&self) -> usize;

    /// Length of the mapping in bytes.
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True when the mapping is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
