use crate::all::*;

// Gaussian-decimated image pyramid. `levels[0]` is a copy of the input and
// `levels[k]` is `levels[k - 1]` downscaled by two, so a pyramid built with
// `level_count` L holds L + 1 images. A pixel at (x, y) in level 0 maps to
// (x / 2^k, y / 2^k) in level k.
//
// The decimation filter is a 2x2 box average with the right and bottom
// columns clamped on odd-sized parents. Chosen for reproducibility; the
// exact kernel only needs to be stable across runs because reference
// patches and tracked images always come from pyramids built the same way.
pub struct Pyramid {
  pub levels: Vec<Image>,
}

impl Pyramid {
  // Moves buffers out of a retired pyramid to avoid reallocation, in the
  // same way frames recycle their image buffers.
  pub fn new(
    image: &Image,
    level_count: usize,
    unused_pyramid: Option<Pyramid>,
  ) -> Pyramid {
    let mut levels = unused_pyramid
      .map(|x| x.levels)
      .unwrap_or_default();
    levels.resize(level_count + 1, Image::empty());

    levels[0].clear();
    levels[0].width = image.width;
    levels[0].height = image.height;
    levels[0].data.extend(image.data.iter());

    for level_ind in 1..=level_count {
      let (parents, children) = levels.split_at_mut(level_ind);
      downscale(&parents[level_ind - 1], &mut children[0]);
    }
    Pyramid { levels }
  }

  #[inline(always)]
  pub fn level(&self, level: usize) -> &Image {
    &self.levels[level]
  }
}

fn downscale(parent: &Image, child: &mut Image) {
  child.clear();
  child.width = (parent.width + 1) / 2;
  child.height = (parent.height + 1) / 2;
  child.data.reserve(child.width * child.height);
  for y in 0..child.height {
    let y0 = 2 * y;
    let y1 = (2 * y + 1).min(parent.height - 1);
    for x in 0..child.width {
      let x0 = 2 * x;
      let x1 = (2 * x + 1).min(parent.width - 1);
      let sum = parent.value(x0, y0) as u32
        + parent.value(x1, y0) as u32
        + parent.value(x0, y1) as u32
        + parent.value(x1, y1) as u32;
      child.data.push(((sum + 2) / 4) as u16);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_level_sizes() {
    let image = Image {
      data: vec![0; 13 * 10],
      width: 13,
      height: 10,
    };
    let pyramid = Pyramid::new(&image, 3, None);
    assert_eq!(pyramid.levels.len(), 4);
    assert_eq!((pyramid.level(0).width, pyramid.level(0).height), (13, 10));
    assert_eq!((pyramid.level(1).width, pyramid.level(1).height), (7, 5));
    assert_eq!((pyramid.level(2).width, pyramid.level(2).height), (4, 3));
    assert_eq!((pyramid.level(3).width, pyramid.level(3).height), (2, 2));
  }

  #[test]
  fn test_constant_image() {
    let image = Image {
      data: vec![1234; 16 * 16],
      width: 16,
      height: 16,
    };
    let pyramid = Pyramid::new(&image, 2, None);
    for level in &pyramid.levels {
      assert!(level.data.iter().all(|&v| v == 1234));
    }
  }

  // A pattern sampled at (x / 2^k, y / 2^k) in level k agrees with level 0
  // up to the decimation filter; exact for a horizontal ramp because the box
  // average of a linear function is the value at the block center.
  #[test]
  fn test_level_scaling_on_ramp() {
    let mut image = Image {
      data: vec![0; 32 * 32],
      width: 32,
      height: 32,
    };
    for y in 0..32 {
      for x in 0..32 {
        image.set_value(x, y, (100 * x) as u16);
      }
    }
    let pyramid = Pyramid::new(&image, 2, None);
    for (x, y) in [(8.0f32, 8.0f32), (12., 20.), (20., 9.)] {
      let v0 = bilinear(pyramid.level(0), Vector2f::new(x, y));
      for k in 1..=2usize {
        let s = (1 << k) as f32;
        let vk = bilinear(pyramid.level(k), Vector2f::new(x / s, y / s));
        // Level k pixel centers sit at (2^k x + (2^k - 1) / 2) of level 0,
        // shifting a ramp by half a pixel per level.
        let expected = v0 + 100. * (s - 1.) / 2.;
        assert!((vk - expected).abs() < 1., "level {} at ({}, {})", k, x, y);
      }
    }
  }

  #[test]
  fn test_buffer_recycling() {
    let image = Image {
      data: vec![7; 8 * 8],
      width: 8,
      height: 8,
    };
    let first = Pyramid::new(&image, 2, None);
    let second = Pyramid::new(&image, 2, Some(first));
    assert_eq!(second.levels.len(), 3);
    assert!(second.level(1).data.iter().all(|&v| v == 7));
  }
}
