//! Epson S1D13806 graphics core for kdrive
//!
//! Drives the S1D13806 LCD/CRT controller underneath a kdrive-style X server:
//! the kernel framebuffer provides the mode and the pixel memory, the
//! controller's BitBLT engine accelerates copies, and a CPU-side shadow
//! presents rotated screens on the unrotated panel.
//!
//! # Architecture
//!
//! ```text
//! Controller (lifecycle: init → enable ⇄ disable → fini, RandR, DPMS)
//!   ├── CardState     fbdev handle, fixed/var info, video mapping, LUT
//!   ├── ScreenState   visual format, rotation, shadow + copier
//!   ├── AccelState    EXA memory layout, cached pixmaps, sync token
//!   └── BltEngine     register-level BitBLT programming
//! ```
//!
//! The host X server is reached only through [`platform::ScreenHost`]; the
//! kernel and hardware only through [`platform::FramebufferDevice`],
//! [`platform::VideoMemory`] and [`platform::RegisterIo`].
//!
//! # Example
//!
//! ```no_run
//! use platform::mocks::MockHost;
//! use s1d13806::{Controller, DriverConfig};
//!
//! let config = DriverConfig::default();
//! let mut ctl = Controller::open(config, MockHost::new())?;
//! ctl.screen_init()?;
//! ctl.init_screen();
//! ctl.finish_init_screen();
//! ctl.create_resources()?;
//! ctl.draw_init()?;
//! ctl.enable()?;
//! # Ok::<(), s1d13806::DriverError>(())
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
#![deny(unsafe_code)] // all unsafe lives in platform::linux
// Pedantic lints suppressed for this register-level driver:
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod accel;
pub mod blt;
pub mod card;
pub mod colormap;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod regs;
pub mod screen;
pub mod shadow;

#[cfg(target_os = "linux")]
pub mod window;

pub use accel::{AccelState, Accelerator, EpsonAccel, SyncToken};
pub use blt::{BltAddr, BltDirection, BltEngine};
pub use card::CardState;
pub use colormap::{Colormap, ColormapInit};
pub use config::{ConfigError, DriverConfig};
pub use error::DriverError;
pub use lifecycle::{Controller, RandrInfo, RandrSize, ScreenPhase};
pub use screen::{ChannelMasks, ScreenMode, ScreenState, VisualFormat};
pub use shadow::{select_copier, Copier, ShadowBuffer};
