//! Linux implementations of the platform traits
//!
//! - [`FbDev`]: [`crate::FramebufferDevice`] over `/dev/fbN`
//! - [`DevMem`]: [`crate::VideoMemory`] over a `/dev/mem` window
//! - [`MmioRegisters`]: [`crate::RegisterIo`] over a `/dev/mem` window

mod devmem;
mod fbdev;

pub use devmem::{page_size, DevMem, MmioRegisters};
pub use fbdev::{FbDev, DEFAULT_FB_DEVICE};
