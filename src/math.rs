use crate::all::*;

// Closed-form SE(2) exponential. `xi` is ordered (x, y, theta); returns the
// rotation matrix and the translation V * rho where V couples translation
// and rotation. Below this angle the V entries switch to Taylor expansions
// to avoid catastrophic cancellation in (1 - cos) / theta.
const SMALL_ANGLE: f32 = 1e-8;

pub fn exp_se2(xi: Vector3f) -> (Matrix2f, Vector2f) {
  let theta = xi[2];
  let (sin, cos) = theta.sin_cos();
  let rotation = Matrix2f::new(
    cos, -sin,
    sin, cos,
  );
  let (a, b) = if theta.abs() < SMALL_ANGLE {
    (1. - theta * theta / 6., theta / 2.)
  }
  else {
    (sin / theta, (1. - cos) / theta)
  };
  let v = Matrix2f::new(
    a, -b,
    b, a,
  );
  (rotation, v * Vector2f::new(xi[0], xi[1]))
}

pub fn skew(v: Vector3d) -> Matrix3d {
  Matrix3d::new(
    0., -v[2], v[1],
    v[2], 0., -v[0],
    -v[1], v[0], 0.,
  )
}

// Essential matrix E = [t]x R for the rigid transform T = (R, t) taking
// camera-1 coordinates to camera-0 coordinates, so that bearing vectors of
// one observed point satisfy f0' E f1 = 0. The translation is normalized;
// the epipolar residual is scale free.
pub fn essential_from_transform(transform: &Matrix4d) -> Matrix3d {
  let rotation = transform.fixed_view::<3, 3>(0, 0).clone_owned();
  let mut t = transform.fixed_view::<3, 1>(0, 3).clone_owned();
  let norm = t.norm();
  if norm > 0. {
    t /= norm;
  }
  skew(t) * rotation
}

pub fn transform_3d(transform: &Matrix4d, x: &Vector3d) -> Vector3d {
  transform.fixed_view::<3, 3>(0, 0) * x + transform.fixed_view::<3, 1>(0, 3)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exp_se2_pure_translation() {
    let (r, t) = exp_se2(Vector3f::new(1.5, -2.0, 0.));
    assert!((r - Matrix2f::identity()).norm() < 1e-6);
    assert!((t - Vector2f::new(1.5, -2.0)).norm() < 1e-6);
  }

  #[test]
  fn test_exp_se2_quarter_turn() {
    let theta = std::f32::consts::FRAC_PI_2;
    let (r, t) = exp_se2(Vector3f::new(1., 0., theta));
    assert!((r * Vector2f::new(1., 0.) - Vector2f::new(0., 1.)).norm() < 1e-5);
    // V for a quarter turn: a = 2 / pi, b = 2 / pi.
    let ab = 2. / std::f32::consts::PI;
    assert!((t - Vector2f::new(ab, ab)).norm() < 1e-5);
  }

  #[test]
  fn test_exp_se2_small_angle_continuity() {
    // The Taylor branch must agree with the closed form near the switch.
    for theta in [1e-7f32, 1e-8, 1e-9] {
      let (_, t_small) = exp_se2(Vector3f::new(1., 1., theta));
      let (_, t_exact) = exp_se2(Vector3f::new(1., 1., 2. * SMALL_ANGLE));
      assert!((t_small - t_exact).norm() < 1e-5, "theta {}", theta);
    }
  }

  #[test]
  fn test_essential_annihilates_correspondences() {
    // Rig: camera 1 displaced and slightly rotated relative to camera 0.
    let angle = 0.1f64;
    let mut t_c0_c1 = Matrix4d::identity();
    t_c0_c1[(0, 0)] = angle.cos();
    t_c0_c1[(0, 2)] = angle.sin();
    t_c0_c1[(2, 0)] = -angle.sin();
    t_c0_c1[(2, 2)] = angle.cos();
    t_c0_c1[(0, 3)] = 0.1;
    t_c0_c1[(1, 3)] = 0.02;

    let e = essential_from_transform(&t_c0_c1);
    let t_c1_c0 = t_c0_c1.try_inverse().unwrap();
    for p in [
      Vector3d::new(0.3, -0.2, 2.0),
      Vector3d::new(-1.0, 0.5, 4.0),
      Vector3d::new(0.0, 0.0, 1.0),
    ] {
      let f0 = p.normalize();
      let f1 = transform_3d(&t_c1_c0, &p).normalize();
      let residual = (f0.transpose() * e * f1)[(0, 0)].abs();
      assert!(residual < 1e-12, "residual {}", residual);
    }
  }
}
