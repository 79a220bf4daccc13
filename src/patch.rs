use crate::all::*;

// Sample offsets of the reference patch: the 49 integer positions inside a
// disc of radius 4 around the keypoint, listed column by column.
pub const PATTERN_SIZE: usize = 49;
pub const PATTERN: [[f32; 2]; PATTERN_SIZE] = [
  [-4., 0.],
  [-3., -2.], [-3., -1.], [-3., 0.], [-3., 1.], [-3., 2.],
  [-2., -3.], [-2., -2.], [-2., -1.], [-2., 0.], [-2., 1.], [-2., 2.], [-2., 3.],
  [-1., -3.], [-1., -2.], [-1., -1.], [-1., 0.], [-1., 1.], [-1., 2.], [-1., 3.],
  [0., -4.], [0., -3.], [0., -2.], [0., -1.], [0., 0.], [0., 1.], [0., 2.], [0., 3.], [0., 4.],
  [1., -3.], [1., -2.], [1., -1.], [1., 0.], [1., 1.], [1., 2.], [1., 3.],
  [2., -3.], [2., -2.], [2., -1.], [2., 0.], [2., 1.], [2., 2.], [2., 3.],
  [3., -2.], [3., -1.], [3., 0.], [3., 1.], [3., 2.],
  [4., 0.],
];

pub type PatternVector = nalgebra::SVector::<f32, PATTERN_SIZE>;
type Matrix3P = nalgebra::SMatrix::<f32, 3, PATTERN_SIZE>;
type MatrixP3 = nalgebra::SMatrix::<f32, PATTERN_SIZE, 3>;

// Reference patch for one pyramid level, sampled once from the frame where
// the keypoint was born and never rewritten. Intensities are stored divided
// by their mean, which makes the residual invariant to global gain changes,
// and the SE(2) Jacobian is folded into (J'J)^-1 J' so that each
// inverse-compositional iteration is a single matrix-vector product.
#[derive(Clone)]
pub struct Patch {
  pub data: PatternVector,
  pub h_inv_j_t: Matrix3P,
  pub valid: bool,
}

impl Patch {
  fn invalid() -> Patch {
    Patch {
      data: PatternVector::zeros(),
      h_inv_j_t: Matrix3P::zeros(),
      valid: false,
    }
  }

  pub fn new(image: &Image, pos: Vector2f) -> Patch {
    let mut intensities = PatternVector::zeros();
    let mut gradients = [Vector2f::zeros(); PATTERN_SIZE];
    for (i, offset) in PATTERN.iter().enumerate() {
      let p = pos + Vector2f::new(offset[0], offset[1]);
      // Margin 2 keeps the central-difference stencil inside the image.
      if !image.is_in_bounds(p, 2.) { return Patch::invalid() }
      intensities[i] = bilinear(image, p);
      gradients[i] = gradient(image, p);
    }

    let mean = intensities.mean();
    if mean <= f32::EPSILON { return Patch::invalid() }
    let data = intensities / mean;

    // Jacobian of the mean-normalized intensities with respect to an SE(2)
    // increment at the reference location. Differentiating I_i / mu gives
    // (g_i - (I_i / mu) g_mean) / mu where g_mean is the average gradient
    // row; dropping the second term would bias the increments whenever the
    // patch straddles an intensity edge.
    let mut j = MatrixP3::zeros();
    let mut g_mean = Vector3f::zeros();
    let mut g_se2 = [Vector3f::zeros(); PATTERN_SIZE];
    for i in 0..PATTERN_SIZE {
      let g = gradients[i];
      g_se2[i] = Vector3f::new(
        g[0],
        g[1],
        PATTERN[i][0] * g[1] - PATTERN[i][1] * g[0],
      );
      g_mean += g_se2[i];
    }
    g_mean /= PATTERN_SIZE as f32;
    for i in 0..PATTERN_SIZE {
      j.set_row(i, &((g_se2[i] - data[i] * g_mean) / mean).transpose());
    }

    let h = j.transpose() * j;
    match h.try_inverse() {
      Some(h_inv) => Patch {
        data,
        h_inv_j_t: h_inv * j.transpose(),
        valid: true,
      },
      // Textureless patch, the normal equations are singular.
      None => Patch::invalid(),
    }
  }

  // Mean-normalized residual of the warped pattern against the reference.
  // None when any sample falls outside the image.
  pub fn residual(&self, image: &Image, warp: &Warp) -> Option<PatternVector> {
    let mut sampled = PatternVector::zeros();
    for (i, offset) in PATTERN.iter().enumerate() {
      let p = warp.apply(Vector2f::new(offset[0], offset[1]));
      if !image.is_in_bounds(p, 0.) { return None }
      sampled[i] = bilinear(image, p);
    }
    let mean = sampled.mean();
    if mean <= f32::EPSILON { return None }
    Some(sampled / mean - self.data)
  }
}

// One reference patch per pyramid level, position rescaled per level.
// Callers should reject stacks with any invalid level at creation instead
// of finding out during tracking.
pub fn patch_stack(pyramid: &Pyramid, pos: Vector2f, levels: usize) -> Vec<Patch> {
  (0..=levels)
    .map(|level| {
      let scale = (1 << level) as f32;
      Patch::new(pyramid.level(level), pos / scale)
    })
    .collect()
}

pub fn stack_valid(stack: &[Patch]) -> bool {
  !stack.is_empty() && stack.iter().all(|p| p.valid)
}
