//! Physical memory windows through `/dev/mem`
//!
//! [`DevMem`] owns one `mmap` of a physical aperture and unmaps it on drop.
//! The file descriptor is closed as soon as the mapping exists; the kernel
//! keeps the mapping alive on its own.
//!
//! On ARM the device is opened `O_SYNC` so the mapping is uncached and
//! strongly ordered, which the register window depends on.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::ptr::NonNull;

use crate::memory::{MapError, PhysAperture, VideoMemory};
use crate::registers::{RegOffset, RegisterIo};

const DEV_MEM: &str = "/dev/mem";

/// System page size.
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).unwrap_or(4096)
}

/// A mapped physical aperture.
#[derive(Debug)]
pub struct DevMem {
    base: NonNull<u8>,
    len: usize,
    aperture: PhysAperture,
}

// SAFETY: the mapping is plain device memory with no thread affinity; all
// access goes through `&self`/`&mut self` and volatile operations.
unsafe impl Send for DevMem {}
// SAFETY: see above; shared access only performs volatile reads.
unsafe impl Sync for DevMem {}

impl DevMem {
    /// Map `aperture` read-write and shared.
    pub fn map(aperture: PhysAperture) -> Result<Self, MapError> {
        if aperture.size == 0 {
            return Err(MapError::Empty(aperture.addr));
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if cfg!(target_arch = "arm") {
            options.custom_flags(libc::O_SYNC);
        }
        let file = options.open(DEV_MEM).map_err(|source| MapError::Open {
            path: DEV_MEM,
            source,
        })?;

        let offset = libc::off_t::try_from(aperture.addr).map_err(|_| MapError::Map {
            addr: aperture.addr,
            size: aperture.size,
            source: io::Error::from(io::ErrorKind::InvalidInput),
        })?;

        // SAFETY: a fresh shared mapping is requested at a kernel-chosen
        // address; the fd is valid for the duration of the call.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                aperture.size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset,
            )
        };
        drop(file);

        if ptr == libc::MAP_FAILED {
            return Err(MapError::Map {
                addr: aperture.addr,
                size: aperture.size,
                source: io::Error::last_os_error(),
            });
        }
        let base = NonNull::new(ptr.cast::<u8>()).ok_or(MapError::Map {
            addr: aperture.addr,
            size: aperture.size,
            source: io::Error::from(io::ErrorKind::AddrNotAvailable),
        })?;

        Ok(Self {
            base,
            len: aperture.size,
            aperture,
        })
    }

    /// The aperture this mapping covers.
    pub fn aperture(&self) -> PhysAperture {
        self.aperture
    }
}

impl Drop for DevMem {
    fn drop(&mut self) {
        // SAFETY: `base`/`len` describe exactly the mapping created in `map`.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.len);
        }
    }
}

impl VideoMemory for DevMem {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is `len` bytes, readable, and lives as long as `self`.
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    fn page_size(&self) -> usize {
        page_size()
    }
}

/// Volatile register accessors over a shared `/dev/mem` mapping.
#[derive(Debug, Clone, Copy)]
pub struct MmioRegisters {
    map: &'static DevMem,
}

impl MmioRegisters {
    /// Accessors over a mapping that outlives the process's use of it.
    pub fn new(map: &'static DevMem) -> Self {
        Self { map }
    }

    fn ptr(&self, offset: RegOffset, width: usize) -> Option<*mut u8> {
        let end = offset.index().checked_add(width)?;
        if end > self.map.len {
            return None;
        }
        // SAFETY: `offset + width <= len`, so the result stays inside the mapping.
        Some(unsafe { self.map.base.as_ptr().add(offset.index()) })
    }
}

impl RegisterIo for MmioRegisters {
    fn read8(&self, offset: RegOffset) -> u8 {
        match self.ptr(offset, 1) {
            // SAFETY: in-bounds pointer into live device memory.
            Some(p) => unsafe { p.read_volatile() },
            None => 0,
        }
    }

    fn write8(&mut self, offset: RegOffset, value: u8) {
        if let Some(p) = self.ptr(offset, 1) {
            // SAFETY: in-bounds pointer into live device memory.
            unsafe { p.write_volatile(value) }
        }
    }

    fn read16(&self, offset: RegOffset) -> u16 {
        match self.ptr(offset, 2) {
            // SAFETY: in-bounds, and register pairs sit on even offsets.
            Some(p) => u16::from_le(unsafe { p.cast::<u16>().read_volatile() }),
            None => 0,
        }
    }

    fn write16(&mut self, offset: RegOffset, value: u16) {
        if let Some(p) = self.ptr(offset, 2) {
            // SAFETY: in-bounds, and register pairs sit on even offsets.
            unsafe { p.cast::<u16>().write_volatile(value.to_le()) }
        }
    }
}
