use crate::all::*;

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

const DESCRIPTOR_BITS: usize = 256;
// Patch half-size for descriptor sampling. Pattern offsets are drawn inside
// a square small enough that rotated samples stay within this radius.
const PATCH_RADIUS: i32 = 15;
const PATTERN_SPREAD: i32 = 9;
const ORIENTATION_RADIUS: i32 = 7;

// 256-bit binary descriptor, computed once at detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
  pub fn zeros() -> Descriptor {
    Descriptor([0; 4])
  }

  // Number of differing bits, 0..=256.
  pub fn hamming_distance(&self, other: &Descriptor) -> u32 {
    self.0.iter().zip(other.0.iter())
      .map(|(a, b)| (a ^ b).count_ones())
      .sum()
  }
}

// Computes intensity-centroid orientations and rotated BRIEF-style binary
// descriptors. The point-pair sampling pattern is fixed: it is drawn once
// from a seeded generator so every extractor produces identical
// descriptors.
pub struct DescriptorExtractor {
  pattern: Vec<[i8; 4]>,
}

impl DescriptorExtractor {
  pub fn new() -> DescriptorExtractor {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
    let pattern = (0..DESCRIPTOR_BITS)
      .map(|_| {
        [
          rng.gen_range(-PATTERN_SPREAD..=PATTERN_SPREAD) as i8,
          rng.gen_range(-PATTERN_SPREAD..=PATTERN_SPREAD) as i8,
          rng.gen_range(-PATTERN_SPREAD..=PATTERN_SPREAD) as i8,
          rng.gen_range(-PATTERN_SPREAD..=PATTERN_SPREAD) as i8,
        ]
      })
      .collect();
    DescriptorExtractor { pattern }
  }

  // Orientation of the intensity centroid around `pos`, in radians.
  pub fn orientation(&self, image: &Image, pos: Vector2f) -> f32 {
    let cx = pos[0].round() as i32;
    let cy = pos[1].round() as i32;
    let mut m10 = 0.0f32;
    let mut m01 = 0.0f32;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
      for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS { continue }
        let x = cx + dx;
        let y = cy + dy;
        if x < 0 || y < 0 || x >= image.width as i32 || y >= image.height as i32 { continue }
        let v = image.value_i32(x, y) as f32;
        m10 += dx as f32 * v;
        m01 += dy as f32 * v;
      }
    }
    m01.atan2(m10)
  }

  // Rotated binary descriptor at `pos`. None too close to the border.
  pub fn compute(&self, image: &Image, pos: Vector2f) -> Option<Descriptor> {
    let margin = (PATCH_RADIUS + 1) as f32;
    if !image.is_in_bounds(pos, margin) { return None }

    let angle = self.orientation(image, pos);
    let (sin, cos) = angle.sin_cos();
    let mut bits = [0u64; 4];
    for (i, pair) in self.pattern.iter().enumerate() {
      let rotate = |x: f32, y: f32| {
        pos + Vector2f::new(x * cos - y * sin, x * sin + y * cos)
      };
      let a = bilinear(image, rotate(pair[0] as f32, pair[1] as f32));
      let b = bilinear(image, rotate(pair[2] as f32, pair[3] as f32));
      if a > b {
        bits[i / 64] |= 1 << (i % 64);
      }
    }
    Some(Descriptor(bits))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hamming_distance() {
    let a = Descriptor([0, 0, 0, 0]);
    let b = Descriptor([u64::MAX; 4]);
    assert_eq!(a.hamming_distance(&a), 0);
    assert_eq!(a.hamming_distance(&b), 256);
    let c = Descriptor([0b1011, 0, 0, 0]);
    assert_eq!(a.hamming_distance(&c), 3);
  }

  #[test]
  fn test_pattern_is_reproducible() {
    let a = DescriptorExtractor::new();
    let b = DescriptorExtractor::new();
    assert_eq!(a.pattern, b.pattern);
    assert_eq!(a.pattern.len(), 256);
  }

  #[test]
  fn test_orientation_follows_gradient() {
    // Intensity increasing to the right pulls the centroid to +x.
    let mut image = Image {
      data: vec![0; 40 * 40],
      width: 40,
      height: 40,
    };
    for y in 0..40 {
      for x in 0..40 {
        image.set_value(x, y, (100 * x) as u16);
      }
    }
    let extractor = DescriptorExtractor::new();
    let angle = extractor.orientation(&image, Vector2f::new(20., 20.));
    assert!(angle.abs() < 1e-3, "angle {}", angle);
  }

  #[test]
  fn test_descriptor_near_border_is_none() {
    let image = Image::blob_field(64, 64, 16, Vector2f::zeros());
    let extractor = DescriptorExtractor::new();
    assert!(extractor.compute(&image, Vector2f::new(8., 32.)).is_none());
    assert!(extractor.compute(&image, Vector2f::new(32., 32.)).is_some());
  }

  #[test]
  fn test_descriptor_nonzero_on_texture() {
    let image = Image::blob_field(64, 64, 16, Vector2f::zeros());
    let extractor = DescriptorExtractor::new();
    let d = extractor.compute(&image, Vector2f::new(32., 32.)).unwrap();
    assert_ne!(d, Descriptor::zeros());
    assert_ne!(d, Descriptor([u64::MAX; 4]));
  }

  #[test]
  fn test_descriptor_stable_under_translation_of_scene() {
    // The same local texture at a different image position gives the same
    // descriptor bits.
    let image0 = Image::blob_field(96, 96, 32, Vector2f::zeros());
    let image1 = Image::blob_field(96, 96, 32, Vector2f::new(3., 0.));
    let extractor = DescriptorExtractor::new();
    // Slightly off blob center, where the orientation is well defined.
    let d0 = extractor.compute(&image0, Vector2f::new(36., 34.)).unwrap();
    let d1 = extractor.compute(&image1, Vector2f::new(39., 34.)).unwrap();
    assert!(d0.hamming_distance(&d1) < 20, "distance {}", d0.hamming_distance(&d1));
  }
}
