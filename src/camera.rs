use crate::all::*;

pub trait CameraModel: Send + Sync {
  // Unit bearing vector for a pixel, None outside the model's domain.
  fn pixel_to_ray(&self, pixel: Vector2d) -> Option<Vector3d>;

  // Pixel coordinates for a camera-frame ray, None behind the camera.
  fn ray_to_pixel(&self, ray: Vector3d) -> Option<Vector2d>;
}

const UNDISTORT_MAX_ITERATIONS: usize = 20;
const UNDISTORT_CONVERGENCE_THRESHOLD: f64 = 1e-5;

// Pinhole model with the radial components of the OpenCV distortion model.
pub struct PinholeModel {
  pub camera_matrix: Matrix3d,
  pub distortion_coefficients: Vec<f64>,
}

impl PinholeModel {
  pub fn new(
    camera_matrix: Matrix3d,
    distortion_coefficients: Vec<f64>,
  ) -> PinholeModel {
    PinholeModel {
      camera_matrix,
      distortion_coefficients,
    }
  }

  fn distort(&self, p: Vector2d, compute_derivative: bool) -> (Vector2d, Option<Matrix2d>) {
    if self.distortion_coefficients.is_empty() {
      return (p, if compute_derivative { Some(Matrix2d::identity()) } else { None });
    }
    let c = &self.distortion_coefficients;
    assert_eq!(c.len(), 3);
    let x = p[0];
    let y = p[1];
    let r2 = x * x + y * y;
    let theta = 1. + r2 * (c[0] + r2 * (c[1] + r2 * c[2]));
    let dtheta = c[0] + r2 * (c[1] * 2. + r2 * c[2] * 3.);
    let dp = if compute_derivative {
      Some(Matrix2d::new(
        theta + x * dtheta * 2. * x, x * dtheta * 2. * y,
        y * dtheta * 2. * x, theta + y * dtheta * 2. * y
      ))
    }
    else {
      None
    };
    (Vector2d::new(x * theta, y * theta), dp)
  }

  fn undistort(&self, dist: Vector2d) -> Option<Vector2d> {
    if self.distortion_coefficients.is_empty() { return Some(dist) }
    let mut point = dist;
    for _ in 0..UNDISTORT_MAX_ITERATIONS {
      let (p, dp) = self.distort(point, true);
      let delta = dp.unwrap().try_inverse()? * (dist - p);
      point += delta;
      if delta.norm() < UNDISTORT_CONVERGENCE_THRESHOLD { break }
    }
    Some(point)
  }
}

impl CameraModel for PinholeModel {
  fn pixel_to_ray(&self, pixel: Vector2d) -> Option<Vector3d> {
    let dist = Vector2d::new(
      (pixel[0] - self.camera_matrix[(0, 2)]) / self.camera_matrix[(0, 0)],
      (pixel[1] - self.camera_matrix[(1, 2)]) / self.camera_matrix[(1, 1)],
    );
    let p = self.undistort(dist)?;
    Some(Vector3d::new(p[0], p[1], 1.).normalize())
  }

  fn ray_to_pixel(&self, ray: Vector3d) -> Option<Vector2d> {
    if ray[2] <= 0. { return None }
    let iz = 1. / ray[2];
    let (dist, _) = self.distort(iz * Vector2d::new(ray[0], ray[1]), false);
    let p = Vector3d::new(dist[0], dist[1], 1.);
    let pixel = self.camera_matrix * p;
    Some(Vector2d::new(pixel[0], pixel[1]))
  }
}

// Intrinsic and extrinsic parameters of one rig camera. `imu_to_camera`
// takes IMU-frame coordinates to this camera's frame.
pub struct RigCamera {
  pub model: Box<dyn CameraModel>,
  pub imu_to_camera: Matrix4d,
}

// Calibrated rig, injected into the tracker. Pairwise camera transforms and
// the essential matrix of the (0, 1) pair are cached at construction so the
// per-keypoint matching loop never inverts extrinsics; see
// `essential_from_transform` for the sign convention.
pub struct Calibration {
  pub cameras: Vec<RigCamera>,
  // camera_from_camera[dst][src] = T_dst_src.
  camera_from_camera: Vec<Vec<Matrix4d>>,
  essential: Option<Matrix3d>,
}

impl Calibration {
  pub fn new(cameras: Vec<RigCamera>) -> Result<Calibration> {
    if cameras.is_empty() {
      bail!("Calibration needs at least one camera.");
    }
    let camera_to_imu = cameras.iter().enumerate()
      .map(|(i, c)| {
        c.imu_to_camera.try_inverse()
          .ok_or(anyhow!("Camera {} extrinsic matrix is singular.", i))
      })
      .collect::<Result<Vec<_>>>()?;
    let camera_from_camera: Vec<Vec<Matrix4d>> = cameras.iter()
      .map(|dst| camera_to_imu.iter().map(|src| dst.imu_to_camera * src).collect())
      .collect();
    let essential = if cameras.len() > 1 {
      Some(essential_from_transform(&camera_from_camera[0][1]))
    }
    else {
      None
    };
    Ok(Calibration { cameras, camera_from_camera, essential })
  }

  pub fn camera_count(&self) -> usize {
    self.cameras.len()
  }

  pub fn essential(&self) -> Option<&Matrix3d> {
    self.essential.as_ref()
  }

  pub fn pixel_to_ray(&self, camera: usize, pixel: Vector2f) -> Option<Vector3d> {
    self.cameras[camera].model.pixel_to_ray(pixel.cast())
  }

  // First-order pixel displacement between two cameras for the image point
  // `p` assumed at distance `depth` along its bearing. Subtracting the
  // offset from `p` gives the predicted position in the other camera. Falls
  // back to zero offset (same pixel) when the point cannot be reprojected.
  pub fn view_offset(&self, p: Vector2f, depth: f64, src: usize, dst: usize) -> Vector2f {
    let offset = || -> Option<Vector2f> {
      let ray = self.cameras[src].model.pixel_to_ray(p.cast())?;
      let p_dst = transform_3d(&self.camera_from_camera[dst][src], &(ray * depth));
      let pixel = self.cameras[dst].model.ray_to_pixel(p_dst)?;
      Some(p - Vector2f::new(pixel[0] as f32, pixel[1] as f32))
    };
    offset().unwrap_or_else(Vector2f::zeros)
  }
}

// EuRoC-like stereo rig with camera 1 displaced `baseline` meters along +x,
// shared by the synthetic tests of several modules.
#[cfg(test)]
pub fn stereo_rig(baseline: f64) -> Calibration {
  #[allow(non_snake_case)]
  let K = Matrix3d::new(
    458., 0., 320.,
    0., 458., 240.,
    0., 0., 1.,
  );
  let mut t_c1_i = Matrix4d::identity();
  t_c1_i[(0, 3)] = -baseline;
  Calibration::new(vec![
    RigCamera {
      model: Box::new(PinholeModel::new(K, vec![])),
      imu_to_camera: Matrix4d::identity(),
    },
    RigCamera {
      model: Box::new(PinholeModel::new(K, vec![])),
      imu_to_camera: t_c1_i,
    },
  ]).unwrap()
}
