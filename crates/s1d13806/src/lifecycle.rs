//! Screen lifecycle controller
//!
//! Owns the card, the engine, the screen and its accelerator, and walks them
//! through the host's callbacks:
//!
//! ```text
//! card_init ─► screen_init ─► init_screen ─► finish_init_screen
//!          ─► create_resources ─► draw_init ─► enable ⇄ disable
//!          ─► screen_fini ─► card_fini
//! ```
//!
//! RandR reconfiguration runs between `disable` and `enable` and rolls the
//! screen back to its previous rotation if any step fails.

use core::fmt;
use core::ops::{Deref, DerefMut};

use platform::{
    FramebufferDevice, MapError, PointerMatrix, Rectangle, RegisterIo, Rotation, RotationSet,
    ScreenHost, VideoMemory, Visual,
};

use crate::accel::{AccelState, EpsonAccel};
use crate::blt::BltEngine;
use crate::card::CardState;
use crate::colormap::ColormapInit;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::screen::{ScreenMode, ScreenState};
use crate::shadow::{self, FrameTarget};

/// Where a screen is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenPhase {
    /// Card initialized, no screen yet.
    Unborn,
    /// Screen built, not yet displaying.
    Constructed,
    /// Displaying.
    Enabled,
    /// Switched away; no access to display memory.
    Disabled,
    /// RandR change in progress.
    Reconfiguring,
    /// Screen torn down.
    Destroyed,
}

impl fmt::Display for ScreenPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unborn => "unborn",
            Self::Constructed => "constructed",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Reconfiguring => "reconfiguring",
            Self::Destroyed => "destroyed",
        })
    }
}

/// The one screen size offered to RandR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandrSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Width in millimetres.
    pub mm_width: u32,
    /// Height in millimetres.
    pub mm_height: u32,
}

/// Answer to a RandR query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandrInfo {
    /// Every rotation and reflection the screen can take.
    pub rotations: RotationSet,
    /// The single supported size.
    pub size: RandrSize,
    /// Current rotation relative to the configured base.
    pub current: Rotation,
}

/// Driver for one S1D13806 card and its screen.
#[derive(Debug)]
pub struct Controller<F, V, R, H> {
    config: DriverConfig,
    card: CardState<F, V>,
    blt: BltEngine<R>,
    host: H,
    screen: Option<ScreenState>,
    accel: Option<AccelState>,
    phase: ScreenPhase,
    colormap_active: bool,
    randr_live: bool,
    dpms_mode: Option<i32>,
}

#[cfg(target_os = "linux")]
impl<H: ScreenHost>
    Controller<
        platform::linux::FbDev,
        platform::linux::DevMem,
        platform::linux::MmioRegisters,
        H,
    >
{
    /// Open the configured framebuffer and map the controller.
    pub fn open(config: DriverConfig, host: H) -> Result<Self, DriverError> {
        let device = platform::linux::FbDev::open(&config.device)
            .map_err(|e| {
                tracing::error!(device = %config.device.display(), error = %e, "cannot open framebuffer");
                e
            })?
            .with_powermode_request(config.powermode_request);
        let video = config.video_aperture;
        let regs = config.register_aperture;
        Self::card_init(
            config,
            device,
            || platform::linux::DevMem::map(video),
            || crate::window::register_window(regs),
            host,
        )
    }
}

impl<F, V, R, H> Controller<F, V, R, H>
where
    F: FramebufferDevice,
    V: VideoMemory,
    R: RegisterIo,
    H: ScreenHost,
{
    /// Bring up the card: device info, video memory, then registers.
    pub fn card_init<MV, MR>(
        config: DriverConfig,
        device: F,
        map_video: MV,
        map_regs: MR,
        host: H,
    ) -> Result<Self, DriverError>
    where
        MV: FnOnce() -> Result<V, MapError>,
        MR: FnOnce() -> Result<R, MapError>,
    {
        let card = CardState::initialize(device, map_video)?;
        let regs = map_regs().map_err(|e| {
            tracing::error!(error = %e, "cannot map controller registers");
            e
        })?;
        tracing::debug!(device = %config.device.display(), "card initialized");
        Ok(Self {
            blt: BltEngine::new(regs, config.blt_spin_limit),
            config,
            card,
            host,
            screen: None,
            accel: None,
            phase: ScreenPhase::Unborn,
            colormap_active: false,
            randr_live: false,
            dpms_mode: None,
        })
    }

    /// Save hardware state before the server takes over. Nothing to save.
    pub fn preserve(&mut self) {
        tracing::debug!("preserve");
    }

    /// Restore hardware state on exit. Nothing was saved.
    pub fn restore(&mut self) {
        tracing::debug!("restore");
    }

    fn expect_phase(&self, op: &'static str, allowed: &[ScreenPhase]) -> Result<(), DriverError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            tracing::warn!(op, phase = %self.phase, "called in wrong phase");
            Err(DriverError::Phase {
                op,
                phase: self.phase,
            })
        }
    }

    fn set_phase(&mut self, phase: ScreenPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "screen phase");
        self.phase = phase;
    }

    fn screen_ref(&self, op: &'static str) -> Result<&ScreenState, DriverError> {
        self.screen.as_ref().ok_or(DriverError::Phase {
            op,
            phase: self.phase,
        })
    }

    fn screen_state(&mut self, op: &'static str) -> Result<&mut ScreenState, DriverError> {
        let phase = self.phase;
        self.screen
            .as_mut()
            .ok_or(DriverError::Phase { op, phase })
    }

    /// Build the screen at the configured base rotation and map it.
    pub fn screen_init(&mut self) -> Result<(), DriverError> {
        self.expect_phase("screen_init", &[ScreenPhase::Unborn, ScreenPhase::Destroyed])?;
        let mut screen = ScreenState::new(
            self.card.var(),
            self.config.rotation,
            self.config.effective_dpi(),
            self.config.cache_hostile(),
        );
        screen.map(self.card.fix())?;
        self.host
            .set_pointer_matrix(&PointerMatrix::new(screen.rotation(), screen.physical_size()));
        self.screen = Some(screen);
        self.set_phase(ScreenPhase::Constructed);
        Ok(())
    }

    /// Hook up the colormap adapter.
    pub fn init_screen(&mut self) {
        self.colormap_active = true;
        tracing::debug!("colormap handler installed");
    }

    /// Shadow setup and RandR registration.
    pub fn finish_init_screen(&mut self) {
        self.randr_live = true;
        if let Some(screen) = &self.screen {
            self.host
                .set_subpixel_order(self.config.subpixel_order.reoriented(screen.rotation()));
        }
        tracing::debug!("RandR registered");
    }

    /// Arm the shadow copier and publish the screen pixmap.
    pub fn create_resources(&mut self) -> Result<(), DriverError> {
        let origin = self.card.pixel_origin();
        let screen = self.screen_state("create_resources")?;
        let copier = screen.set_shadow()?;
        let header = screen.pixmap_header(origin);
        if !self.host.modify_screen_pixmap(&header) {
            tracing::error!("screen pixmap header refused");
            return Err(DriverError::PixmapHeader);
        }
        tracing::debug!(?copier, "resources created");
        Ok(())
    }

    /// Accelerator init: engine bring-up, screen clear, EXA registration.
    pub fn draw_init(&mut self) -> Result<(), DriverError> {
        let logical = self.screen_ref("draw_init")?.logical_size();
        let var = self.card.var();
        let mut state = AccelState::new(
            self.card.fix().line_length,
            var.bits_per_pixel,
            platform::Size::new(var.xres, var.yres),
            logical,
            self.card.pixel_origin(),
            self.card.fix().smem_len as usize,
            self.config.solid_fill,
        );
        let mut accel = EpsonAccel::new(&mut state, &mut self.blt, &mut self.host);
        accel.init_engine()?;
        accel.register()?;
        self.accel = Some(state);
        Ok(())
    }

    /// Display: push the mode, load the DirectColor ramp, resume drawing.
    pub fn enable(&mut self) -> Result<(), DriverError> {
        self.expect_phase(
            "enable",
            &[ScreenPhase::Constructed, ScreenPhase::Disabled],
        )?;
        self.card.put_var_info()?;
        if self.card.visual() == Visual::DirectColor {
            self.card.load_direct_ramp()?;
        }
        if let Some(mut accel) = self.accel() {
            accel.draw_enable()?;
        }
        self.set_phase(ScreenPhase::Enabled);
        Ok(())
    }

    /// Stop displaying. The hardware is left as is.
    pub fn disable(&mut self) {
        if self.phase != ScreenPhase::Enabled {
            return;
        }
        if let Some(mut accel) = self.accel() {
            accel.draw_disable();
        }
        self.set_phase(ScreenPhase::Disabled);
    }

    /// Rotations offered, the single size and the current rotation.
    pub fn randr_get_info(&self) -> Result<RandrInfo, DriverError> {
        if !self.host.has_visuals() {
            tracing::warn!("RandR query with no visuals");
            return Err(DriverError::NoVisuals);
        }
        let screen = self.screen_ref("randr_get_info")?;
        let physical = screen.physical_size();
        let mm = screen.physical_mm();
        Ok(RandrInfo {
            rotations: RotationSet::ROTATE_ALL | RotationSet::REFLECT_ALL,
            size: RandrSize {
                width: physical.width,
                height: physical.height,
                mm_width: mm.width,
                mm_height: mm.height,
            },
            current: screen.rotation().subtract(self.config.rotation),
        })
    }

    /// Rotate the screen to `requested`, relative to the configured base.
    ///
    /// On failure the previous rotation is restored. Either way the screen
    /// is re-enabled if it was enabled on entry.
    pub fn randr_set_config(&mut self, requested: Rotation) -> Result<(), DriverError> {
        self.expect_phase(
            "randr_set_config",
            &[ScreenPhase::Constructed, ScreenPhase::Enabled, ScreenPhase::Disabled],
        )?;
        let entry = self.phase;
        let was_enabled = entry == ScreenPhase::Enabled;
        self.disable();
        self.set_phase(ScreenPhase::Reconfiguring);

        let result = self.reconfigure(requested);

        self.set_phase(if entry == ScreenPhase::Constructed {
            ScreenPhase::Constructed
        } else {
            ScreenPhase::Disabled
        });
        if was_enabled {
            match (&result, self.enable()) {
                (Ok(()), Err(e)) => return Err(e),
                (Err(_), Err(e)) => tracing::error!(error = %e, "re-enable after rollback failed"),
                _ => {}
            }
        }
        result
    }

    fn reconfigure(&mut self, requested: Rotation) -> Result<(), DriverError> {
        let mut tx = Rollback::begin(self, "randr_set_config")?;
        let rotation = tx.config.rotation.compose(requested);
        tracing::debug!(
            degrees = rotation.angle.degrees(),
            reflect_x = rotation.reflect_x,
            reflect_y = rotation.reflect_y,
            "RandR set"
        );
        tx.apply_rotation(rotation)?;
        tx.commit();
        Ok(())
    }

    /// Map the screen at `rotation`, rearm the copier and republish.
    fn apply_rotation(&mut self, rotation: Rotation) -> Result<(), DriverError> {
        let origin = self.card.pixel_origin();
        let fix = *self.card.fix();
        let screen = self.screen_state("randr_set_config")?;
        screen.unmap();
        screen.set_rotation(rotation);
        screen.map(&fix)?;
        screen.unset_shadow();
        screen.set_shadow()?;
        let matrix = PointerMatrix::new(rotation, screen.physical_size());
        let header = screen.pixmap_header(origin);

        self.host.set_pointer_matrix(&matrix);
        if !self.host.modify_screen_pixmap(&header) {
            tracing::error!("screen pixmap header refused");
            return Err(DriverError::PixmapHeader);
        }
        self.host
            .set_subpixel_order(self.config.subpixel_order.reoriented(rotation));
        Ok(())
    }

    /// Set a DPMS level. Repeating the current level does nothing.
    pub fn dpms(&mut self, mode: i32) -> Result<(), DriverError> {
        if self.dpms_mode == Some(mode) {
            return Ok(());
        }
        let device = self.card.device_mut();
        if let Err(e) = device.put_powermode(mode) {
            tracing::debug!(mode, error = %e, "power-mode request failed, blanking");
            let level = if mode == 0 { 0 } else { mode + 1 };
            device.blank(level).map_err(|source| {
                tracing::error!(mode, level, error = %source, "DPMS failed");
                DriverError::Dpms { mode, source }
            })?;
        }
        self.dpms_mode = Some(mode);
        Ok(())
    }

    /// Copy damaged logical rectangles from the shadow to the panel.
    ///
    /// Returns the number of rectangles copied. Nothing is copied unless the
    /// screen is enabled and shadowed.
    pub fn update_shadow(&mut self, damage: &[Rectangle]) -> usize {
        if self.phase != ScreenPhase::Enabled {
            tracing::trace!(phase = %self.phase, "shadow update skipped");
            return 0;
        }
        let Some(screen) = &self.screen else {
            return 0;
        };
        let (Some(shadow), Some(copier)) = (screen.shadow(), screen.copier()) else {
            return 0;
        };
        let stride = self.card.fix().line_length as usize;
        let mut target = FrameTarget {
            bytes: self.card.framebuffer_mut(),
            stride,
            size: screen.physical_size(),
        };
        shadow::update(copier, screen.rotation(), shadow, &mut target, damage)
    }

    /// Fill `items` from the hardware colormap.
    pub fn get_colors(&mut self, items: &mut [platform::ColorItem]) -> Result<(), DriverError> {
        self.card.get_colors(items)
    }

    /// Store `items` into the hardware colormap.
    pub fn put_colors(&mut self, items: &[platform::ColorItem]) -> Result<(), DriverError> {
        self.card.put_colors(items)
    }

    /// Seed a new colormap.
    pub fn create_colormap(&mut self, entries: usize) -> Result<ColormapInit, DriverError> {
        self.card.create_colormap(entries)
    }

    /// The accelerator, once `draw_init` has run.
    pub fn accel(&mut self) -> Option<EpsonAccel<'_, R, H>> {
        self.accel
            .as_mut()
            .map(|state| EpsonAccel::new(state, &mut self.blt, &mut self.host))
    }

    /// Tear down the screen: accelerator, shadow and screen state.
    pub fn screen_fini(&mut self) {
        self.disable();
        if let Some(mut accel) = self.accel() {
            accel.draw_fini();
        }
        self.accel = None;
        if let Some(mut screen) = self.screen.take() {
            screen.unmap();
        }
        self.colormap_active = false;
        self.randr_live = false;
        self.set_phase(ScreenPhase::Destroyed);
    }

    /// Release the card, returning the host.
    pub fn card_fini(mut self) -> H {
        if self.screen.is_some() {
            self.screen_fini();
        }
        tracing::debug!("card released");
        self.host
    }

    /// Current phase.
    pub fn phase(&self) -> ScreenPhase {
        self.phase
    }

    /// Observable screen configuration.
    pub fn mode(&self) -> Option<ScreenMode> {
        self.screen.as_ref().map(ScreenState::mode)
    }

    /// Screen state, once built.
    pub fn screen(&self) -> Option<&ScreenState> {
        self.screen.as_ref()
    }

    /// Screen state, mutable. Drawing into the shadow goes through here.
    pub fn screen_mut(&mut self) -> Option<&mut ScreenState> {
        self.screen.as_mut()
    }

    /// Card state.
    pub fn card(&self) -> &CardState<F, V> {
        &self.card
    }

    /// Card state, mutable.
    pub fn card_mut(&mut self) -> &mut CardState<F, V> {
        &mut self.card
    }

    /// The BitBLT engine.
    pub fn blt(&self) -> &BltEngine<R> {
        &self.blt
    }

    /// The BitBLT engine, mutable.
    pub fn blt_mut(&mut self) -> &mut BltEngine<R> {
        &mut self.blt
    }

    /// The host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host, mutable.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Active configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// True once the colormap handler is installed.
    pub fn colormap_active(&self) -> bool {
        self.colormap_active
    }

    /// True once RandR is registered.
    pub fn randr_live(&self) -> bool {
        self.randr_live
    }
}

// ---------------------------------------------------------------------------
// RandR rollback
// ---------------------------------------------------------------------------

/// Reconfiguration in progress. Dropped without [`commit`](Self::commit), it
/// maps the screen back at the rotation it had on entry.
struct Rollback<'c, F, V, R, H>
where
    F: FramebufferDevice,
    V: VideoMemory,
    R: RegisterIo,
    H: ScreenHost,
{
    ctl: &'c mut Controller<F, V, R, H>,
    rotation: Rotation,
    armed: bool,
}

impl<'c, F, V, R, H> Rollback<'c, F, V, R, H>
where
    F: FramebufferDevice,
    V: VideoMemory,
    R: RegisterIo,
    H: ScreenHost,
{
    fn begin(ctl: &'c mut Controller<F, V, R, H>, op: &'static str) -> Result<Self, DriverError> {
        let rotation = ctl.screen_ref(op)?.rotation();
        Ok(Self {
            ctl,
            rotation,
            armed: true,
        })
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl<F, V, R, H> Deref for Rollback<'_, F, V, R, H>
where
    F: FramebufferDevice,
    V: VideoMemory,
    R: RegisterIo,
    H: ScreenHost,
{
    type Target = Controller<F, V, R, H>;

    fn deref(&self) -> &Self::Target {
        self.ctl
    }
}

impl<F, V, R, H> DerefMut for Rollback<'_, F, V, R, H>
where
    F: FramebufferDevice,
    V: VideoMemory,
    R: RegisterIo,
    H: ScreenHost,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctl
    }
}

impl<F, V, R, H> Drop for Rollback<'_, F, V, R, H>
where
    F: FramebufferDevice,
    V: VideoMemory,
    R: RegisterIo,
    H: ScreenHost,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let rotation = self.rotation;
        tracing::warn!(
            degrees = rotation.angle.degrees(),
            "RandR change failed, restoring previous rotation"
        );
        if let Err(e) = self.ctl.apply_rotation(rotation) {
            tracing::error!(error = %e, "rollback incomplete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{BLTCTRL0, BLTCTRL0_ACTIVE, REGISTER_FILE_LEN};
    use platform::mocks::{FbCall, MockFramebuffer, MockHost, MockRegisters, MockVideoMemory};
    use platform::{Angle, ScreenBuffer, Size};

    type Ctl = Controller<MockFramebuffer, MockVideoMemory, MockRegisters, MockHost>;

    fn controller(config: DriverConfig, fb: MockFramebuffer) -> Ctl {
        Controller::card_init(
            config,
            fb,
            || Ok(MockVideoMemory::new(0x14_0000)),
            || {
                Ok(MockRegisters::new(REGISTER_FILE_LEN).with_busy_latch(
                    BLTCTRL0,
                    BLTCTRL0_ACTIVE,
                    2,
                ))
            },
            MockHost::new(),
        )
        .unwrap()
    }

    fn bring_up(ctl: &mut Ctl) {
        ctl.screen_init().unwrap();
        ctl.init_screen();
        ctl.finish_init_screen();
        ctl.create_resources().unwrap();
        ctl.draw_init().unwrap();
        ctl.enable().unwrap();
    }

    #[test]
    fn register_mapping_failure_aborts_init() {
        let err = Ctl::card_init(
            DriverConfig::default(),
            MockFramebuffer::new(800, 600, 16),
            || Ok(MockVideoMemory::new(0x14_0000)),
            || Err(MapError::Empty(0x1400_0000)),
            MockHost::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Map(_)));
    }

    #[test]
    fn phases_follow_lifecycle() {
        let mut ctl = controller(DriverConfig::default(), MockFramebuffer::new(800, 600, 16));
        assert_eq!(ctl.phase(), ScreenPhase::Unborn);
        assert!(matches!(ctl.enable(), Err(DriverError::Phase { op: "enable", .. })));
        bring_up(&mut ctl);
        assert_eq!(ctl.phase(), ScreenPhase::Enabled);
        assert!(ctl.colormap_active() && ctl.randr_live());
        ctl.disable();
        assert_eq!(ctl.phase(), ScreenPhase::Disabled);
        ctl.enable().unwrap();
        ctl.screen_fini();
        assert_eq!(ctl.phase(), ScreenPhase::Destroyed);
        assert!(ctl.screen().is_none());
        assert!(ctl.accel().is_none());
    }

    #[test]
    fn enable_failure_leaves_screen_disabled() {
        let mut ctl = controller(DriverConfig::default(), MockFramebuffer::new(800, 600, 16));
        bring_up(&mut ctl);
        ctl.disable();
        ctl.card_mut().device_mut().fail_put_var = true;
        assert!(ctl.enable().is_err());
        assert_eq!(ctl.phase(), ScreenPhase::Disabled);
    }

    #[test]
    fn draw_init_registers_memory_layout() {
        let mut fb = MockFramebuffer::new(800, 600, 16);
        fb.fix.smem_start = 0x1420_0000;
        let mut ctl = controller(DriverConfig::default(), fb);
        bring_up(&mut ctl);
        let exa = ctl.host().exa.unwrap();
        assert_eq!(exa.memory_base, 0);
        assert_eq!(exa.memory_size, 0x14_0000);
        assert_eq!(exa.offscreen_base, 1600 * 600);
        assert_eq!(ctl.host().sync_marks, 1);
    }

    #[test]
    fn updates_skipped_while_disabled() {
        let config = DriverConfig {
            rotation: Rotation::new(Angle::Deg90),
            ..DriverConfig::default()
        };
        let mut ctl = controller(config, MockFramebuffer::new(8, 4, 16));
        bring_up(&mut ctl);
        let all = Rectangle::new(platform::Point::zero(), Size::new(4, 8));
        assert_eq!(ctl.update_shadow(&[all]), 1);
        ctl.disable();
        assert_eq!(ctl.update_shadow(&[all]), 0);
    }

    #[test]
    fn base_rotation_is_subtracted_in_randr_info() {
        let config = DriverConfig {
            rotation: Rotation::new(Angle::Deg90),
            ..DriverConfig::default()
        };
        let mut ctl = controller(config, MockFramebuffer::new(800, 600, 16));
        bring_up(&mut ctl);
        let info = ctl.randr_get_info().unwrap();
        assert_eq!(info.current, Rotation::IDENTITY);
        assert_eq!((info.size.width, info.size.height), (800, 600));
        assert!(ctl.mode().unwrap().shadow);
        assert_eq!(ctl.host().last_header().unwrap().buffer, ScreenBuffer::Shadow);
    }

    #[test]
    fn dpms_uses_blank_fallback_and_caches() {
        let mut ctl = controller(DriverConfig::default(), MockFramebuffer::new(800, 600, 16));
        ctl.dpms(3).unwrap();
        ctl.dpms(3).unwrap();
        ctl.dpms(0).unwrap();
        let calls = &ctl.card().device().calls;
        let dpms: Vec<_> = calls
            .iter()
            .filter(|c| matches!(c, FbCall::PowerMode(_) | FbCall::Blank(_)))
            .cloned()
            .collect();
        assert_eq!(
            dpms,
            vec![
                FbCall::PowerMode(3),
                FbCall::Blank(4),
                FbCall::PowerMode(0),
                FbCall::Blank(0),
            ]
        );
    }
}
