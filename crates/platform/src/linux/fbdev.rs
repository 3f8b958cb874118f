//! `/dev/fbN` character device
//!
//! Thin ioctl wrappers over an owned file descriptor. Closing the device is
//! the `File` drop.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use crate::fb::{
    FbError, FixScreenInfo, FramebufferDevice, VarScreenInfo, CMAP_SIZE, FBIOBLANK, FBIOGETCMAP,
    FBIOGET_FSCREENINFO, FBIOGET_VSCREENINFO, FBIOPUTCMAP, FBIOPUT_VSCREENINFO,
};

/// Canonical framebuffer node.
pub const DEFAULT_FB_DEVICE: &str = "/dev/fb0";

/// `struct fb_cmap`.
#[repr(C)]
struct RawCmap {
    start: u32,
    len: u32,
    red: *mut u16,
    green: *mut u16,
    blue: *mut u16,
    transp: *mut u16,
}

/// An open kernel framebuffer device.
#[derive(Debug)]
pub struct FbDev {
    file: File,
    path: PathBuf,
    powermode_request: Option<u32>,
}

impl FbDev {
    /// Open `path` read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FbError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| FbError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            file,
            path,
            powermode_request: None,
        })
    }

    /// Enable the power-mode request with the given request number.
    ///
    /// Only some vendor kernels implement one; without it DPMS falls back to
    /// `FBIOBLANK`.
    #[must_use]
    pub fn with_powermode_request(mut self, request: Option<u32>) -> Self {
        self.powermode_request = request;
        self
    }

    /// Node this device was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl_ptr<T>(&self, request: u32, name: &'static str, arg: *mut T) -> Result<(), FbError> {
        // SAFETY: `arg` points to a live, correctly laid out kernel structure
        // for `request`; the fd is owned by `self.file` and open.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg) };
        if rc < 0 {
            Err(FbError::Ioctl {
                request: name,
                source: io::Error::last_os_error(),
            })
        } else {
            Ok(())
        }
    }
}

fn check_cmap_range(start: u32, len: usize) -> Result<u32, FbError> {
    let len = u32::try_from(len).map_err(|_| FbError::CmapRange {
        start,
        len: u32::MAX,
    })?;
    match start.checked_add(len) {
        Some(end) if end as usize <= CMAP_SIZE => Ok(len),
        _ => Err(FbError::CmapRange { start, len }),
    }
}

impl FramebufferDevice for FbDev {
    fn fixed_info(&mut self) -> Result<FixScreenInfo, FbError> {
        let mut fix = FixScreenInfo::default();
        self.ioctl_ptr(FBIOGET_FSCREENINFO, "FBIOGET_FSCREENINFO", &mut fix)?;
        Ok(fix)
    }

    fn var_info(&mut self) -> Result<VarScreenInfo, FbError> {
        let mut var = VarScreenInfo::default();
        self.ioctl_ptr(FBIOGET_VSCREENINFO, "FBIOGET_VSCREENINFO", &mut var)?;
        Ok(var)
    }

    fn put_var_info(&mut self, var: &mut VarScreenInfo) -> Result<(), FbError> {
        self.ioctl_ptr(FBIOPUT_VSCREENINFO, "FBIOPUT_VSCREENINFO", var)
    }

    fn get_cmap(
        &mut self,
        start: u32,
        red: &mut [u16],
        green: &mut [u16],
        blue: &mut [u16],
    ) -> Result<(), FbError> {
        let len = check_cmap_range(start, red.len())?;
        if green.len() != red.len() || blue.len() != red.len() {
            return Err(FbError::CmapRange { start, len });
        }
        let mut cmap = RawCmap {
            start,
            len,
            red: red.as_mut_ptr(),
            green: green.as_mut_ptr(),
            blue: blue.as_mut_ptr(),
            transp: core::ptr::null_mut(),
        };
        self.ioctl_ptr(FBIOGETCMAP, "FBIOGETCMAP", &mut cmap)
    }

    fn put_cmap(
        &mut self,
        start: u32,
        red: &[u16],
        green: &[u16],
        blue: &[u16],
    ) -> Result<(), FbError> {
        let len = check_cmap_range(start, red.len())?;
        if green.len() != red.len() || blue.len() != red.len() {
            return Err(FbError::CmapRange { start, len });
        }
        // The kernel only reads through these pointers for FBIOPUTCMAP.
        let mut cmap = RawCmap {
            start,
            len,
            red: red.as_ptr().cast_mut(),
            green: green.as_ptr().cast_mut(),
            blue: blue.as_ptr().cast_mut(),
            transp: core::ptr::null_mut(),
        };
        self.ioctl_ptr(FBIOPUTCMAP, "FBIOPUTCMAP", &mut cmap)
    }

    fn put_powermode(&mut self, mode: i32) -> Result<(), FbError> {
        let Some(request) = self.powermode_request else {
            return Err(FbError::Unsupported("FBIOPUT_POWERMODE"));
        };
        let mut mode = mode;
        self.ioctl_ptr(request, "FBIOPUT_POWERMODE", &mut mode)
    }

    fn blank(&mut self, level: i32) -> Result<(), FbError> {
        // SAFETY: FBIOBLANK takes its argument by value; the fd is open.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                FBIOBLANK as _,
                libc::c_long::from(level),
            )
        };
        if rc < 0 {
            Err(FbError::Ioctl {
                request: "FBIOBLANK",
                source: io::Error::last_os_error(),
            })
        } else {
            Ok(())
        }
    }
}
