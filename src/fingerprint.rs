//! Mean-luminance perceptual fingerprinting.
//!
//! An image is reduced to an 8x8 luminance grid; each cell brighter than the
//! grid's mean contributes a `1` bit, row-major from the top-left. The
//! resulting 64-bit fingerprint is invariant to fine detail and resolution
//! but tracks gross visual structure, trading precision for speed and
//! size-independence.

use image::DynamicImage;
use image::imageops::FilterType;

use crate::error::EngineError;

/// Side length of the luminance grid.
pub const GRID_SIZE: u32 = 8;

/// Bits in a fingerprint. Fixed by the grid, so any two fingerprints have
/// equal length by construction.
pub const FINGERPRINT_BITS: u32 = GRID_SIZE * GRID_SIZE;

/// A 64-bit perceptual fingerprint, one bit per grid cell.
///
/// Derived purely from pixel data and immutable once computed; the engine
/// never caches fingerprints across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageFingerprint(u64);

impl ImageFingerprint {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Number of bit positions that differ from `other`.
    pub fn distance(self, other: ImageFingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

/// Computes fingerprints from raw image bytes.
#[derive(Debug, Default)]
pub struct PerceptualHasher;

impl PerceptualHasher {
    pub fn new() -> Self {
        Self
    }

    /// Decode `bytes` and reduce them to a fingerprint.
    ///
    /// Fails with `EngineError::Decode` when the bytes are not a decodable
    /// raster image. That outcome means "cannot compute a hash", not "is
    /// forged"; the fusion layer decides what to do with it.
    pub fn hash(&self, bytes: &[u8]) -> Result<ImageFingerprint, EngineError> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.hash_image(&img))
    }

    /// Fingerprint an already-decoded image.
    pub fn hash_image(&self, img: &DynamicImage) -> ImageFingerprint {
        let grid = img
            .resize_exact(GRID_SIZE, GRID_SIZE, FilterType::Triangle)
            .to_luma8();

        let cells: Vec<u8> = grid.pixels().map(|p| p.0[0]).collect();
        let mean = cells.iter().map(|&c| f64::from(c)).sum::<f64>() / cells.len() as f64;

        // Row-major, most significant bit first.
        let mut bits = 0u64;
        for (index, &cell) in cells.iter().enumerate() {
            if f64::from(cell) > mean {
                bits |= 1 << (FINGERPRINT_BITS as usize - 1 - index);
            }
        }

        ImageFingerprint(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use std::io::Cursor;

    fn luma_image(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> DynamicImage {
        let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, y| Luma([f(x, y)]));
        DynamicImage::ImageLuma8(buffer)
    }

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_flat_image_has_empty_fingerprint() {
        // No cell exceeds the mean when every cell equals it.
        let img = luma_image(100, 100, |_, _| 128);
        let fp = PerceptualHasher::new().hash_image(&img);
        assert_eq!(fp.bits(), 0);
    }

    #[test]
    fn test_half_bright_image_sets_half_the_bits() {
        let img = luma_image(64, 64, |x, _| if x < 32 { 0 } else { 255 });
        let fp = PerceptualHasher::new().hash_image(&img);
        assert_eq!(fp.bits().count_ones(), 32);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let img = luma_image(120, 80, |x, y| ((x * 3 + y * 7) % 256) as u8);
        let hasher = PerceptualHasher::new();
        assert_eq!(hasher.hash_image(&img), hasher.hash_image(&img));
    }

    #[test]
    fn test_fingerprint_survives_resize() {
        let hasher = PerceptualHasher::new();
        let large = luma_image(200, 200, |x, _| if x < 100 { 0 } else { 255 });
        let small = luma_image(40, 40, |x, _| if x < 20 { 0 } else { 255 });
        assert_eq!(hasher.hash_image(&large), hasher.hash_image(&small));
    }

    #[test]
    fn test_distinct_structures_differ() {
        let hasher = PerceptualHasher::new();
        let left_bright = hasher.hash_image(&luma_image(64, 64, |x, _| {
            if x < 32 { 255 } else { 0 }
        }));
        let top_bright = hasher.hash_image(&luma_image(64, 64, |_, y| {
            if y < 32 { 255 } else { 0 }
        }));
        assert!(left_bright.distance(top_bright) > 0);
    }

    #[test]
    fn test_hash_decodes_png_bytes() {
        let img = luma_image(64, 64, |x, y| ((x + y) * 2 % 256) as u8);
        let hasher = PerceptualHasher::new();
        let from_bytes = hasher.hash(&png_bytes(&img)).unwrap();
        assert_eq!(from_bytes, hasher.hash_image(&img));
    }

    #[test]
    fn test_undecodable_bytes_fail_with_decode_error() {
        let result = PerceptualHasher::new().hash(b"definitely not an image");
        assert!(matches!(result, Err(EngineError::Decode(_))));
    }

    #[test]
    fn test_self_distance_is_zero() {
        let fp = ImageFingerprint::from_bits(0xDEAD_BEEF_0BAD_F00D);
        assert_eq!(fp.distance(fp), 0);
    }

    #[test]
    fn test_hex_rendering() {
        assert_eq!(
            ImageFingerprint::from_bits(0x00FF).to_hex(),
            "00000000000000ff"
        );
    }
}
