//! Shadow framebuffer
//!
//! When the screen is rotated, clients draw into a CPU-side buffer laid out
//! in logical orientation. Damaged rectangles are copied into the physical
//! framebuffer by a [`Copier`] that applies the rotation on the way.

mod copier;

pub use copier::{select_copier, Copier};

use platform::{Rectangle, Rotation, Size};

use crate::error::DriverError;

/// Logical-orientation pixel buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct ShadowBuffer {
    data: Vec<u8>,
    size: Size,
    bits_per_pixel: u32,
    stride: u32,
}

impl core::fmt::Debug for ShadowBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShadowBuffer")
            .field("size", &self.size)
            .field("bits_per_pixel", &self.bits_per_pixel)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

impl ShadowBuffer {
    /// Zeroed buffer for `size` pixels of `bits_per_pixel`.
    ///
    /// Rows are padded to a 32-bit boundary. Only byte-aligned pixel sizes
    /// can be shadowed.
    pub fn alloc(size: Size, bits_per_pixel: u32) -> Result<Self, DriverError> {
        if bits_per_pixel == 0 || bits_per_pixel % 8 != 0 {
            return Err(DriverError::UnsupportedFormat {
                bpp: bits_per_pixel,
            });
        }
        let row_bits = u64::from(size.width) * u64::from(bits_per_pixel);
        let stride = (row_bits + 31) / 32 * 4;
        let total = stride * u64::from(size.height);
        let (Ok(stride), Ok(bytes)) = (u32::try_from(stride), usize::try_from(total)) else {
            return Err(DriverError::ShadowAlloc {
                bytes: usize::MAX,
            });
        };

        let mut data = Vec::new();
        data.try_reserve_exact(bytes).map_err(|_| {
            tracing::error!(bytes, "shadow allocation failed");
            DriverError::ShadowAlloc { bytes }
        })?;
        data.resize(bytes, 0);

        tracing::debug!(
            width = size.width,
            height = size.height,
            bits_per_pixel,
            stride,
            "shadow allocated"
        );
        Ok(Self {
            data,
            size,
            bits_per_pixel,
            stride,
        })
    }

    /// Logical size in pixels.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Bits per pixel.
    pub fn bits_per_pixel(&self) -> u32 {
        self.bits_per_pixel
    }

    /// Bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel / 8) as usize
    }

    /// Bytes per row.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Pixels per row, including padding.
    pub fn pixel_stride(&self) -> u32 {
        self.stride * 8 / self.bits_per_pixel
    }

    /// Raw pixel bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw pixel bytes, mutable. This is what clients draw into.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let bpp = self.bytes_per_pixel();
        let at = y as usize * self.stride as usize + x as usize * bpp;
        self.data.get(at..at + bpp)
    }

    /// Bytes of the pixel at `(x, y)`, mutable.
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut [u8]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let bpp = self.bytes_per_pixel();
        let at = y as usize * self.stride as usize + x as usize * bpp;
        self.data.get_mut(at..at + bpp)
    }

    /// Clip `rect` to the buffer. `None` when nothing remains.
    pub fn clip(&self, rect: &Rectangle) -> Option<Region> {
        let x0 = i64::from(rect.top_left.x).max(0);
        let y0 = i64::from(rect.top_left.y).max(0);
        let x1 = (i64::from(rect.top_left.x) + i64::from(rect.size.width))
            .min(i64::from(self.size.width));
        let y1 = (i64::from(rect.top_left.y) + i64::from(rect.size.height))
            .min(i64::from(self.size.height));
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        // All four are within 0..=size, which fits u32.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(Region {
            x0: x0 as u32,
            y0: y0 as u32,
            x1: x1 as u32,
            y1: y1 as u32,
        })
    }
}

/// A clipped, non-empty span of logical pixels: `x0..x1` × `y0..y1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// First column.
    pub x0: u32,
    /// First row.
    pub y0: u32,
    /// One past the last column.
    pub x1: u32,
    /// One past the last row.
    pub y1: u32,
}

/// The physical framebuffer as a copy destination.
#[derive(Debug)]
pub struct FrameTarget<'a> {
    /// Pixel bytes starting at the first visible pixel.
    pub bytes: &'a mut [u8],
    /// Bytes per scanline.
    pub stride: usize,
    /// Panel size in pixels.
    pub size: Size,
}

/// Copy each damaged rectangle of `shadow` into `target`.
///
/// Rectangles are in logical coordinates and clipped to the shadow; empty
/// ones are ignored. Returns the number of rectangles copied.
pub fn update(
    copier: Copier,
    rotation: Rotation,
    shadow: &ShadowBuffer,
    target: &mut FrameTarget<'_>,
    damage: &[Rectangle],
) -> usize {
    let mut copied = 0;
    for rect in damage {
        let Some(region) = shadow.clip(rect) else {
            continue;
        };
        copier.copy(rotation, shadow, target, region);
        copied += 1;
    }
    tracing::trace!(rects = damage.len(), copied, ?copier, "shadow update");
    copied
}
