//! Platform layer for the Epson S1D13806 kdrive driver
//!
//! This crate provides the trait-based seams between the driver and
//! everything it does not own: the kernel framebuffer device, the physical
//! memory windows, the controller's register file and the host X server.
//! Tests run the driver against [`mocks`] without hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Host X server (kdrive, EXA, RandR)
//!         ↓            ↑ ScreenHost
//! Driver (s1d13806 crate)
//!         ↓
//! Platform (this crate - traits + kernel structures)
//!         ↓
//! Linux (/dev/fbN ioctls, /dev/mem mmap)
//! ```
//!
//! # Seams
//!
//! - [`FramebufferDevice`] - fixed/variable info, colormap and power ioctls
//! - [`VideoMemory`] - the mapped display buffer
//! - [`RegisterIo`] - 8/16-bit controller register access
//! - [`ScreenHost`] - EXA registration, screen pixmap, pointer transform
//!
//! # Features
//!
//! - `serde`: derive serde traits on configuration-facing types (default)
//! - `mocks`: expose [`mocks`] to other crates' tests
//!
//! # Example
//!
//! ```no_run
//! use platform::linux::FbDev;
//! use platform::FramebufferDevice;
//!
//! let mut fb = FbDev::open("/dev/fb0")?;
//! let var = fb.var_info()?;
//! println!("{}x{}@{}", var.xres, var.yres, var.bits_per_pixel);
//! # Ok::<(), platform::FbError>(())
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing over println! in lib code
// Pedantic lints suppressed for this kernel-interface crate:
#![allow(clippy::doc_markdown)] // ioctl and register names in doc comments
#![allow(clippy::must_use_candidate)] // register accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod fb;
pub mod host;
pub mod memory;
pub mod registers;
pub mod rotation;

#[cfg(target_os = "linux")]
pub mod linux;

pub mod mocks;

pub use fb::{
    Bitfield, FbError, FixScreenInfo, FramebufferDevice, VarScreenInfo, Visual, CMAP_SIZE,
};
pub use host::{
    Alu, ColorItem, ExaDriverInfo, ExaFlags, MigrationPolicy, Pixmap, PixmapHeader, ScreenBuffer,
    ScreenHost,
};
pub use memory::{MapError, PhysAperture, VideoMemory};
pub use registers::{RegOffset, RegisterIo};
pub use rotation::{Angle, PointerMatrix, Rotation, RotationSet, SubpixelOrder};

// Geometry primitives used across the driver API
pub use embedded_graphics::geometry::{Point, Size};
pub use embedded_graphics::primitives::Rectangle;
