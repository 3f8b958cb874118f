//! Process-wide register window
//!
//! The controller's register aperture is mapped once per process and never
//! released; every card shares the same accessors.

use std::sync::OnceLock;

use platform::linux::{DevMem, MmioRegisters};
use platform::{MapError, PhysAperture};

static WINDOW: OnceLock<DevMem> = OnceLock::new();

/// Register accessors for `aperture`, mapping it on first use.
///
/// Later calls return the existing mapping; a different aperture than the
/// one first mapped is ignored with a warning.
pub fn register_window(aperture: PhysAperture) -> Result<MmioRegisters, MapError> {
    if let Some(map) = WINDOW.get() {
        if map.aperture() != aperture {
            tracing::warn!(
                mapped = map.aperture().addr,
                requested = aperture.addr,
                "register window already mapped at a different address"
            );
        }
        return Ok(MmioRegisters::new(map));
    }

    let mapped = DevMem::map(aperture).map_err(|e| {
        tracing::error!(addr = aperture.addr, size = aperture.size, error = %e, "register mapping failed");
        e
    })?;
    tracing::debug!(addr = aperture.addr, size = aperture.size, "register window mapped");
    Ok(MmioRegisters::new(WINDOW.get_or_init(|| mapped)))
}

/// True once the register window has been mapped.
pub fn is_mapped() -> bool {
    WINDOW.get().is_some()
}
