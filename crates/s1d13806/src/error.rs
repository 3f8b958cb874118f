//! Driver error type

use platform::{FbError, MapError};

use crate::lifecycle::ScreenPhase;

/// Errors surfaced by the driver to the host.
///
/// Requests the engine cannot accelerate are not errors; the accelerator
/// answers `false` and the host renders in software.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Framebuffer device failure (open or ioctl).
    #[error(transparent)]
    Fb(#[from] FbError),

    /// `/dev/mem` mapping failure.
    #[error(transparent)]
    Map(#[from] MapError),

    /// BLTCTRL0 still reported ACTIVE after the configured poll limit.
    #[error("BitBLT engine still active after {polls} polls")]
    EngineHang {
        /// Status reads performed.
        polls: u32,
    },

    /// The shadow buffer could not be allocated.
    #[error("cannot allocate {bytes} byte shadow buffer")]
    ShadowAlloc {
        /// Requested size.
        bytes: usize,
    },

    /// Pixel format the driver cannot present.
    #[error("unsupported pixel format: {bpp} bits per pixel")]
    UnsupportedFormat {
        /// Bits per pixel reported by the kernel.
        bpp: u32,
    },

    /// The mapped video memory cannot hold the visible screen.
    #[error("video memory too small: need {needed:#x} bytes, mapping has {available:#x}")]
    VideoMemory {
        /// Bytes needed from the mapping base.
        needed: usize,
        /// Bytes mapped.
        available: usize,
    },

    /// EXA refused the accelerator.
    #[error("failed to initialize EXA")]
    ExaRefused,

    /// The host refused the new screen pixmap description.
    #[error("host rejected the screen pixmap header")]
    PixmapHeader,

    /// No allowed depth carries visuals.
    #[error("screen has no visuals")]
    NoVisuals,

    /// A colormap index outside the 256-entry table.
    #[error("colormap index {0} out of range")]
    ColormapIndex(u32),

    /// A blit would reach past the end of display memory.
    #[error("blit reaches {end:#x}, display memory ends at {limit:#x}")]
    BltRange {
        /// One past the last byte the blit would touch.
        end: u64,
        /// Display memory size.
        limit: usize,
    },

    /// A blit was issued without the matching prepare call.
    #[error("{op} without a matching prepare")]
    NotPrepared {
        /// Attempted operation.
        op: &'static str,
    },

    /// Operation not valid in the current screen phase.
    #[error("{op} is not valid while the screen is {phase}")]
    Phase {
        /// Attempted operation.
        op: &'static str,
        /// Phase at the time.
        phase: ScreenPhase,
    },

    /// Neither the power-mode request nor blanking succeeded.
    #[error("DPMS mode {mode} rejected: {source}")]
    Dpms {
        /// Requested DPMS level.
        mode: i32,
        /// Blanking failure.
        #[source]
        source: FbError,
    },
}
