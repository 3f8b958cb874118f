//! Driver configuration
//!
//! Every field has a default matching the reference board, so an empty JSON
//! object (or no file at all) yields a working configuration:
//!
//! ```json
//! {
//!   "device": "/dev/fb1",
//!   "rotation": { "angle": "90" },
//!   "subpixel_order": "horizontal-rgb"
//! }
//! ```

use std::path::{Path, PathBuf};

use platform::{PhysAperture, Rotation, SubpixelOrder};
use serde::{Deserialize, Serialize};

/// Physical base of the controller's register aperture.
pub const REGISTER_APERTURE_ADDR: u64 = 0x1400_0000;
/// Size of the register aperture.
pub const REGISTER_APERTURE_SIZE: usize = 0x2000;
/// Physical base of the controller's display memory.
pub const VIDEO_APERTURE_ADDR: u64 = 0x1420_0000;
/// Size of the display memory.
pub const VIDEO_APERTURE_SIZE: usize = 0x14_0000;

/// Default screen resolution used for millimetre sizes.
pub const DEFAULT_DPI: u32 = 75;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration JSON.
    #[error("invalid driver configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Board and driver options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Framebuffer node.
    pub device: PathBuf,
    /// Register aperture of the controller.
    pub register_aperture: PhysAperture,
    /// Display memory aperture of the controller.
    pub video_aperture: PhysAperture,
    /// Base RandR rotation; requested rotations compose onto it.
    pub rotation: Rotation,
    /// Force the scanline-order shadow copiers on or off. Unset picks them on
    /// ARM, where reading vertical strips of the shadow thrashes the cache.
    pub cache_hostile_strips: Option<bool>,
    /// Accelerate solid fills through the BitBLT engine.
    pub solid_fill: bool,
    /// Give up on a busy engine after this many status polls.
    pub blt_spin_limit: Option<u32>,
    /// Resolution used when the kernel reports no physical size.
    pub dpi: u32,
    /// Sub-pixel layout of the unrotated panel.
    pub subpixel_order: SubpixelOrder,
    /// Request number of the kernel's power-mode ioctl, where one exists.
    pub powermode_request: Option<u32>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/fb0"),
            register_aperture: PhysAperture::new(REGISTER_APERTURE_ADDR, REGISTER_APERTURE_SIZE),
            video_aperture: PhysAperture::new(VIDEO_APERTURE_ADDR, VIDEO_APERTURE_SIZE),
            rotation: Rotation::IDENTITY,
            cache_hostile_strips: None,
            solid_fill: false,
            blt_spin_limit: None,
            dpi: DEFAULT_DPI,
            subpixel_order: SubpixelOrder::Unknown,
            powermode_request: None,
        }
    }
}

impl DriverConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Whether to use the copiers that read the shadow in scanline order.
    pub fn cache_hostile(&self) -> bool {
        self.cache_hostile_strips
            .unwrap_or(cfg!(target_arch = "arm"))
    }

    /// Configured DPI, never zero.
    pub fn effective_dpi(&self) -> u32 {
        if self.dpi == 0 {
            DEFAULT_DPI
        } else {
            self.dpi
        }
    }
}
