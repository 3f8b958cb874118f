//! Colormap adapter
//!
//! The card keeps a 256-entry LUT triple mirroring the kernel's colormap.
//! Reads refresh the touched range from the kernel before answering from
//! the cache; writes merge into the cache and push only the touched range.

use platform::{ColorItem, FramebufferDevice, VarScreenInfo, VideoMemory, Visual, CMAP_SIZE};

use crate::card::CardState;
use crate::error::DriverError;

/// Cached colormap, one array per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Colormap {
    /// Red intensities.
    pub red: [u16; CMAP_SIZE],
    /// Green intensities.
    pub green: [u16; CMAP_SIZE],
    /// Blue intensities.
    pub blue: [u16; CMAP_SIZE],
}

impl Default for Colormap {
    fn default() -> Self {
        Self::new()
    }
}

impl Colormap {
    /// All-black colormap.
    pub const fn new() -> Self {
        Self {
            red: [0; CMAP_SIZE],
            green: [0; CMAP_SIZE],
            blue: [0; CMAP_SIZE],
        }
    }

    /// Entry `pixel` as a colour item.
    pub fn get(&self, pixel: u32) -> Option<ColorItem> {
        let i = pixel as usize;
        Some(ColorItem::new(
            pixel,
            *self.red.get(i)?,
            *self.green.get(i)?,
            *self.blue.get(i)?,
        ))
    }

    /// Overwrite the entry named by `item.pixel`.
    pub fn set(&mut self, item: &ColorItem) -> Result<(), DriverError> {
        let i = checked_index(item.pixel)?;
        self.red[i] = item.red;
        self.green[i] = item.green;
        self.blue[i] = item.blue;
        Ok(())
    }

    /// Linear DirectColor ramp for the variable info's channel widths.
    ///
    /// Entry `i` of a `bits`-wide channel is `i × 65535 / (2^bits − 1)`,
    /// saturating for entries past the channel's own size. Returns the number
    /// of entries covered, which is the size of the widest channel.
    pub fn fill_direct_ramp(&mut self, var: &VarScreenInfo) -> usize {
        let entries = [var.red.length, var.green.length, var.blue.length]
            .into_iter()
            .map(channel_entries)
            .max()
            .unwrap_or(0);
        fill_channel(&mut self.red[..entries], var.red.length);
        fill_channel(&mut self.green[..entries], var.green.length);
        fill_channel(&mut self.blue[..entries], var.blue.length);
        entries
    }
}

fn channel_entries(bits: u32) -> usize {
    if bits >= 8 {
        CMAP_SIZE
    } else {
        1usize << bits
    }
}

#[allow(clippy::cast_possible_truncation)] // clamped to u16::MAX first
fn fill_channel(lut: &mut [u16], bits: u32) {
    let max = if bits == 0 {
        0
    } else {
        (1u32 << bits.min(16)) - 1
    };
    for (i, slot) in (0u32..).zip(lut.iter_mut()) {
        *slot = if max == 0 {
            0
        } else {
            (i * 65535 / max).min(65535) as u16
        };
    }
}

fn checked_index(pixel: u32) -> Result<usize, DriverError> {
    let i = pixel as usize;
    if i < CMAP_SIZE {
        Ok(i)
    } else {
        Err(DriverError::ColormapIndex(pixel))
    }
}

/// Inclusive index span of a set of colour items, or `None` when empty.
fn touched_range(items: &[ColorItem]) -> Result<Option<(usize, usize)>, DriverError> {
    let mut span: Option<(usize, usize)> = None;
    for item in items {
        let i = checked_index(item.pixel)?;
        span = Some(match span {
            None => (i, i),
            Some((lo, hi)) => (lo.min(i), hi.max(i)),
        });
    }
    Ok(span)
}

/// How the host should seed a new colormap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColormapInit {
    /// Entries read back from the hardware LUT.
    Seeded(Vec<ColorItem>),
    /// Use the host's generic initializer.
    HostDefault,
}

impl<F: FramebufferDevice, V: VideoMemory> CardState<F, V> {
    /// Fill in the intensities of `items` from the hardware colormap.
    ///
    /// The kernel is asked once for the span covering every requested index.
    /// If that fails the request is skipped and `items` left untouched.
    pub fn get_colors(&mut self, items: &mut [ColorItem]) -> Result<(), DriverError> {
        let Some((lo, hi)) = touched_range(items)? else {
            return Ok(());
        };
        #[allow(clippy::cast_possible_truncation)] // lo < 256
        let start = lo as u32;
        let Colormap { red, green, blue } = &mut self.cmap;
        let r = self.device.get_cmap(
            start,
            &mut red[lo..=hi],
            &mut green[lo..=hi],
            &mut blue[lo..=hi],
        );
        if let Err(e) = r {
            tracing::error!(error = %e, start = lo, len = hi - lo + 1, "can't get colormap");
            return Err(e.into());
        }
        for item in items.iter_mut() {
            if let Some(cached) = self.cmap.get(item.pixel) {
                *item = cached;
            }
        }
        Ok(())
    }

    /// Merge `items` into the cache and push the touched span to the kernel.
    pub fn put_colors(&mut self, items: &[ColorItem]) -> Result<(), DriverError> {
        let Some((lo, hi)) = touched_range(items)? else {
            return Ok(());
        };
        for item in items {
            self.cmap.set(item)?;
        }
        self.push_colormap(lo, hi - lo + 1)
    }

    /// Push `len` cached entries starting at `start`.
    pub fn push_colormap(&mut self, start: usize, len: usize) -> Result<(), DriverError> {
        let end = start.saturating_add(len).min(CMAP_SIZE);
        if start >= end {
            return Ok(());
        }
        #[allow(clippy::cast_possible_truncation)] // start < 256
        let first = start as u32;
        tracing::trace!(start, len = end - start, "FBIOPUTCMAP");
        let Colormap { red, green, blue } = &self.cmap;
        self.device
            .put_cmap(first, &red[start..end], &green[start..end], &blue[start..end])
            .map_err(|e| {
                tracing::error!(error = %e, "FBIOPUTCMAP failed");
                DriverError::from(e)
            })
    }

    /// Seed a colormap of `entries` cells for the card's visual.
    ///
    /// Static pseudo-colour hardware has a fixed LUT that must be read back;
    /// every other visual uses the host's default initialization.
    pub fn create_colormap(&mut self, entries: usize) -> Result<ColormapInit, DriverError> {
        match self.visual() {
            Visual::StaticPseudoColor => {
                let n = entries.min(CMAP_SIZE);
                let mut items: Vec<ColorItem> = (0u32..)
                    .take(n)
                    .map(|pixel| ColorItem::new(pixel, 0, 0, 0))
                    .collect();
                self.get_colors(&mut items)?;
                Ok(ColormapInit::Seeded(items))
            }
            _ => Ok(ColormapInit::HostDefault),
        }
    }

    /// Load a linear ramp into a DirectColor LUT and push it.
    pub fn load_direct_ramp(&mut self) -> Result<(), DriverError> {
        let var = *self.var();
        let entries = self.cmap.fill_direct_ramp(&var);
        tracing::debug!(entries, "DirectColor ramp");
        self.push_colormap(0, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::mocks::{FbCall, MockFramebuffer, MockVideoMemory};
    use platform::Bitfield;

    fn card(fb: MockFramebuffer) -> CardState<MockFramebuffer, MockVideoMemory> {
        CardState::initialize(fb, || Ok(MockVideoMemory::new(0x14_0000))).unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut card = card(MockFramebuffer::new(800, 600, 16));
        let set = [
            ColorItem::new(5, 0x1111, 0x2222, 0x3333),
            ColorItem::new(200, 0xAAAA, 0xBBBB, 0xCCCC),
        ];
        card.put_colors(&set).unwrap();
        assert_eq!(card.device().put_cmap_calls(), vec![(5, 196)]);

        let mut read = [ColorItem::new(200, 0, 0, 0), ColorItem::new(5, 0, 0, 0)];
        card.get_colors(&mut read).unwrap();
        assert_eq!(read, [set[1], set[0]]);
    }

    #[test]
    fn get_reads_kernel_before_cache() {
        let mut fb = MockFramebuffer::new(800, 600, 16);
        fb.cmap[0][7] = 0x7777;
        let mut card = card(fb);
        let mut item = [ColorItem::new(7, 0, 0, 0)];
        card.get_colors(&mut item).unwrap();
        assert_eq!(item[0].red, 0x7777);
        assert_eq!(
            card.device().calls.last(),
            Some(&FbCall::GetCmap { start: 7, len: 1 })
        );
    }

    #[test]
    fn failed_read_leaves_items_untouched() {
        let mut card = card(MockFramebuffer::new(800, 600, 16));
        card.device_mut().fail_get_cmap = true;
        let mut item = [ColorItem::new(3, 9, 9, 9)];
        assert!(card.get_colors(&mut item).is_err());
        assert_eq!(item[0], ColorItem::new(3, 9, 9, 9));
    }

    #[test]
    fn out_of_range_pixel_is_rejected_without_ioctl() {
        let mut card = card(MockFramebuffer::new(800, 600, 16));
        let before = card.device().calls.len();
        let err = card
            .put_colors(&[ColorItem::new(256, 0, 0, 0)])
            .unwrap_err();
        assert!(matches!(err, DriverError::ColormapIndex(256)));
        assert_eq!(card.device().calls.len(), before);
    }

    #[test]
    fn empty_requests_are_no_ops() {
        let mut card = card(MockFramebuffer::new(800, 600, 16));
        let before = card.device().calls.len();
        card.put_colors(&[]).unwrap();
        card.get_colors(&mut []).unwrap();
        assert_eq!(card.device().calls.len(), before);
    }

    #[test]
    fn ramp_for_565() {
        let mut var = VarScreenInfo::default();
        var.red = Bitfield::new(11, 5);
        var.green = Bitfield::new(5, 6);
        var.blue = Bitfield::new(0, 5);
        let mut cmap = Colormap::new();
        assert_eq!(cmap.fill_direct_ramp(&var), 64);
        assert_eq!(cmap.red[0], 0);
        assert_eq!(cmap.red[31], 65535);
        assert_eq!(cmap.red[32], 65535);
        assert_eq!(cmap.green[63], 65535);
        assert_eq!(cmap.green[1], 65535 / 63);
        assert_eq!(u32::from(cmap.blue[16]), 16 * 65535 / 31);
    }

    #[test]
    fn ramp_with_missing_channel_is_zero() {
        let mut var = VarScreenInfo::default();
        var.green = Bitfield::new(0, 8);
        let mut cmap = Colormap::new();
        assert_eq!(cmap.fill_direct_ramp(&var), 256);
        assert!(cmap.red.iter().all(|v| *v == 0));
        assert_eq!(cmap.green[255], 65535);
    }

    #[test]
    fn static_pseudocolor_seeds_from_hardware() {
        let mut fb = MockFramebuffer::new(640, 480, 8).with_visual(Visual::StaticPseudoColor);
        fb.cmap[2][15] = 0xFFFF;
        let mut card = card(fb);
        let ColormapInit::Seeded(items) = card.create_colormap(16).unwrap() else {
            panic!("expected seeded colormap");
        };
        assert_eq!(items.len(), 16);
        assert_eq!(items[15], ColorItem::new(15, 0, 0, 0xFFFF));
        assert_eq!(
            card.device().calls.last(),
            Some(&FbCall::GetCmap { start: 0, len: 16 })
        );
    }

    #[test]
    fn other_visuals_defer_to_host() {
        let mut card = card(MockFramebuffer::new(800, 600, 16));
        assert_eq!(card.create_colormap(256).unwrap(), ColormapInit::HostDefault);
    }
}
