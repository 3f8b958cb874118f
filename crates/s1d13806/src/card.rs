//! Card state: the framebuffer device and its video memory
//!
//! One [`CardState`] exists per controller. It owns the open framebuffer
//! device, snapshots of the kernel's fixed and variable screen info, the
//! mapped display memory and the cached colormap. Dropping it unmaps the
//! memory and closes the device.

use platform::fb::{FB_ACTIVATE_NOW, FB_CHANGE_CMAP_VBL};
use platform::{FixScreenInfo, FramebufferDevice, MapError, VarScreenInfo, VideoMemory, Visual};

use crate::colormap::Colormap;
use crate::error::DriverError;

/// Framebuffer device, mapped video memory and colormap cache.
#[derive(Debug)]
pub struct CardState<F, V> {
    pub(crate) device: F,
    fix: FixScreenInfo,
    var: VarScreenInfo,
    video: V,
    origin: usize,
    pub(crate) cmap: Colormap,
}

impl<F: FramebufferDevice, V: VideoMemory> CardState<F, V> {
    /// Read the device's screen info, then map the display memory.
    ///
    /// On any failure everything acquired so far is released.
    pub fn initialize<M>(mut device: F, map_video: M) -> Result<Self, DriverError>
    where
        M: FnOnce() -> Result<V, MapError>,
    {
        let fix = device.fixed_info().map_err(|e| {
            tracing::error!(error = %e, "cannot read fixed screen info");
            e
        })?;
        let var = device.var_info().map_err(|e| {
            tracing::error!(error = %e, "cannot read variable screen info");
            e
        })?;

        let video = map_video().map_err(|e| {
            tracing::error!(error = %e, "failed to map framebuffer");
            e
        })?;

        let origin = pixel_origin(&fix, video.page_size());
        let visible = (fix.line_length as usize).saturating_mul(var.yres as usize);
        let needed = origin.saturating_add(visible);
        if needed > video.len() {
            tracing::error!(needed, available = video.len(), "video memory smaller than the screen");
            return Err(DriverError::VideoMemory {
                needed,
                available: video.len(),
            });
        }

        tracing::debug!(
            id = %fix.id_str(),
            xres = var.xres,
            yres = var.yres,
            bpp = var.bits_per_pixel,
            line_length = fix.line_length,
            smem_len = fix.smem_len,
            origin,
            "card initialized"
        );

        Ok(Self {
            device,
            fix,
            var,
            video,
            origin,
            cmap: Colormap::new(),
        })
    }

    /// Fixed screen info captured at init.
    pub fn fix(&self) -> &FixScreenInfo {
        &self.fix
    }

    /// Variable screen info as last read or pushed.
    pub fn var(&self) -> &VarScreenInfo {
        &self.var
    }

    /// Visual class reported by the kernel.
    pub fn visual(&self) -> Visual {
        self.fix.visual()
    }

    /// Byte offset of the first pixel inside the video mapping.
    pub fn pixel_origin(&self) -> usize {
        self.origin
    }

    /// Display memory starting at the pixel origin.
    pub fn framebuffer(&self) -> &[u8] {
        self.video.as_slice().get(self.origin..).unwrap_or_default()
    }

    /// Display memory starting at the pixel origin, mutable.
    pub fn framebuffer_mut(&mut self) -> &mut [u8] {
        let origin = self.origin;
        self.video
            .as_mut_slice()
            .get_mut(origin..)
            .unwrap_or_default()
    }

    /// The framebuffer device.
    pub fn device(&self) -> &F {
        &self.device
    }

    /// The framebuffer device, mutable.
    pub fn device_mut(&mut self) -> &mut F {
        &mut self.device
    }

    /// Cached colormap.
    pub fn colormap(&self) -> &Colormap {
        &self.cmap
    }

    /// Display the current variable info, activating immediately and
    /// loading the colormap at the next vertical blank.
    pub fn put_var_info(&mut self) -> Result<(), DriverError> {
        self.var.activate = FB_ACTIVATE_NOW | FB_CHANGE_CMAP_VBL;
        self.device.put_var_info(&mut self.var).map_err(|e| {
            tracing::error!(error = %e, "FBIOPUT_VSCREENINFO failed");
            DriverError::from(e)
        })
    }
}

/// Pixel origin inside a mapping that starts on the page holding `smem_start`.
fn pixel_origin(fix: &FixScreenInfo, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    // Only the remainder matters; it is below page_size.
    #[allow(clippy::cast_possible_truncation)]
    let off = (u64::from(fix.smem_start) % page_size as u64) as usize;
    off
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::mocks::{FbCall, MockFramebuffer, MockVideoMemory};

    fn card(fb: MockFramebuffer) -> Result<CardState<MockFramebuffer, MockVideoMemory>, DriverError> {
        CardState::initialize(fb, || Ok(MockVideoMemory::new(0x14_0000)))
    }

    #[test]
    fn origin_is_start_modulo_page() {
        let mut fb = MockFramebuffer::new(320, 240, 16);
        fb.fix.smem_start = 0x1420_0840;
        let card = card(fb).unwrap();
        assert_eq!(card.pixel_origin(), 0x840);
        assert_eq!(card.framebuffer().len(), 0x14_0000 - 0x840);
    }

    #[test]
    fn info_failure_aborts_before_mapping() {
        let mut fb = MockFramebuffer::new(800, 600, 16);
        fb.fail_info = true;
        let mut mapped = false;
        let err = CardState::<_, MockVideoMemory>::initialize(fb, || {
            mapped = true;
            Ok(MockVideoMemory::new(16))
        })
        .unwrap_err();
        assert!(matches!(err, DriverError::Fb(_)));
        assert!(!mapped);
    }

    #[test]
    fn map_failure_is_reported() {
        let fb = MockFramebuffer::new(800, 600, 16);
        let err = CardState::<_, MockVideoMemory>::initialize(fb, || Err(MapError::Empty(0)))
            .unwrap_err();
        assert!(matches!(err, DriverError::Map(MapError::Empty(0))));
    }

    #[test]
    fn undersized_mapping_is_rejected() {
        let fb = MockFramebuffer::new(800, 600, 16);
        let err = CardState::initialize(fb, || Ok(MockVideoMemory::new(0x1000))).unwrap_err();
        assert!(matches!(err, DriverError::VideoMemory { needed: 960_000, .. }));
    }

    #[test]
    fn put_var_info_sets_activation_flags() {
        let mut card = card(MockFramebuffer::new(800, 600, 16)).unwrap();
        card.put_var_info().unwrap();
        assert_eq!(
            card.device().calls.last(),
            Some(&FbCall::PutVarInfo {
                activate: FB_ACTIVATE_NOW | FB_CHANGE_CMAP_VBL
            })
        );
    }

    #[test]
    fn put_var_info_failure_surfaces() {
        let mut card = card(MockFramebuffer::new(800, 600, 16)).unwrap();
        card.device_mut().fail_put_var = true;
        assert!(matches!(card.put_var_info(), Err(DriverError::Fb(_))));
    }
}
