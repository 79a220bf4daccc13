use crate::all::*;

// Affine pose of a keypoint in image space: a 2x2 linear part applied to the
// patch pattern plus a pixel translation. Newly detected keypoints start
// with an identity linear part at the corner position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Warp {
  pub linear: Matrix2f,
  pub translation: Vector2f,
}

impl Warp {
  pub fn identity_at(translation: Vector2f) -> Warp {
    Warp {
      linear: Matrix2f::identity(),
      translation,
    }
  }

  #[inline(always)]
  pub fn apply(&self, p: Vector2f) -> Vector2f {
    self.linear * p + self.translation
  }

  // Right-composition with an SE(2) increment, `warp <- warp * exp(xi)`.
  pub fn compose_se2(&mut self, xi: Vector3f) {
    let (rotation, t) = exp_se2(xi);
    self.translation += self.linear * t;
    self.linear *= rotation;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_identity_composition() {
    let mut warp = Warp::identity_at(Vector2f::new(10., 20.));
    warp.compose_se2(Vector3f::zeros());
    assert!((warp.translation - Vector2f::new(10., 20.)).norm() < 1e-6);
    assert!((warp.linear - Matrix2f::identity()).norm() < 1e-6);
  }

  #[test]
  fn test_translation_composition() {
    let mut warp = Warp::identity_at(Vector2f::new(1., 2.));
    warp.compose_se2(Vector3f::new(3., -1., 0.));
    assert!((warp.translation - Vector2f::new(4., 1.)).norm() < 1e-6);
  }

  #[test]
  fn test_composition_uses_current_linear_part() {
    // With a rotated linear part, a translation increment moves the point
    // along the rotated axes.
    let theta = std::f32::consts::FRAC_PI_2;
    let mut warp = Warp::identity_at(Vector2f::zeros());
    warp.compose_se2(Vector3f::new(0., 0., theta));
    warp.compose_se2(Vector3f::new(1., 0., 0.));
    assert!((warp.translation - Vector2f::new(0., 1.)).norm() < 1e-5);
  }

  #[test]
  fn test_apply() {
    let mut warp = Warp::identity_at(Vector2f::new(5., 5.));
    warp.compose_se2(Vector3f::new(0., 0., std::f32::consts::PI));
    let p = warp.apply(Vector2f::new(1., 0.));
    assert!((p - Vector2f::new(4., 5.)).norm() < 1e-5);
  }
}
