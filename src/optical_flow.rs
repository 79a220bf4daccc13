// Patch-based optical flow tracker. Each keypoint carries reference patches
// sampled at every pyramid level from the frame where it was born, and is
// re-aligned to a target pyramid by inverse-compositional Gauss-Newton on
// SE(2); see "Lucas-Kanade 20 Years On" by Baker & Matthews for the scheme.
// The same primitive serves temporal (previous to current frame) and
// cross-camera tracking.

use crate::all::*;

use rayon::prelude::*;

// Early exit when the squared increment norm falls below this.
const TERMINATION_EPS2: f32 = 1e-8;
// Increments at or beyond this magnitude mean the solve diverged.
const DIVERGENCE_GUARD: f32 = 1e6;
// Pixels the warp translation must keep from the image border per level.
const BORDER_MARGIN: f32 = 2.;

pub struct OpticalFlow {
  levels: usize,
  max_iterations: usize,
  max_recovered_dist2: f32,
}

impl OpticalFlow {
  pub fn new() -> Result<OpticalFlow> {
    let (levels, max_iterations, max_recovered_dist2) = {
      let p = PARAMETER_SET.lock().unwrap();
      (
        p.optical_flow_levels,
        p.optical_flow_max_iterations,
        p.optical_flow_max_recovered_dist2,
      )
    };
    OpticalFlow::new_custom(levels, max_iterations, max_recovered_dist2)
  }

  pub fn new_custom(
    levels: usize,
    max_iterations: usize,
    max_recovered_dist2: f32,
  ) -> Result<OpticalFlow> {
    if max_iterations == 0 {
      bail!("Optical flow needs at least one iteration per level.");
    }
    if max_recovered_dist2 <= 0. {
      bail!("Forward-backward tolerance must be positive.");
    }
    Ok(OpticalFlow {
      levels,
      max_iterations,
      max_recovered_dist2,
    })
  }

  // Tracks every keypoint of `keypoints_src` from the source pyramid into
  // the target pyramid and keeps the ones that survive the round trip back.
  // With `cam_src == cam_dst` this is temporal tracking and the pose from
  // the previous frame is the initial guess; across cameras the guess is
  // offset by reprojecting at `depth` (None starts from the same pixel).
  //
  // The keypoints are independent, so the loop runs data-parallel and each
  // iteration emits at most one id-keyed record.
  pub fn track_points(
    &self,
    pyramid_src: &Pyramid,
    pyramid_dst: &Pyramid,
    store: &PatchStore,
    keypoints_src: &KeypointMap,
    calibration: &Calibration,
    cam_src: usize,
    cam_dst: usize,
    depth: Option<f64>,
  ) -> KeypointMap {
    let mut ids = Vec::with_capacity(keypoints_src.len());
    let mut inits = Vec::with_capacity(keypoints_src.len());
    for (id, keypoint) in keypoints_src {
      ids.push(*id);
      inits.push(keypoint.clone());
    }

    let level0 = pyramid_dst.level(0);
    let matching = cam_src != cam_dst;

    (0..ids.len())
      .into_par_iter()
      .filter_map(|r| {
        let id = ids[r];
        let init = &inits[r];
        let stack = store.get(id)?;
        if stack.len() <= self.levels { return None }

        let off = match (matching, depth) {
          (true, Some(depth)) => {
            calibration.view_offset(init.pose.translation, depth, cam_src, cam_dst)
          },
          _ => Vector2f::zeros(),
        };

        let mut warp = init.pose;
        warp.translation -= off;
        let t = warp.translation;
        if t[0] < 0. || t[1] < 0.
          || t[0] >= level0.width as f32 || t[1] >= level0.height as f32 {
          return None;
        }

        if !self.track_point(pyramid_dst, stack, &mut warp) { return None }

        let mut warp_back = warp;
        warp_back.translation += off;
        if !self.track_point(pyramid_src, stack, &mut warp_back) { return None }

        let dist2 = (init.pose.translation - warp_back.translation).norm_squared();
        if dist2 >= self.max_recovered_dist2 { return None }

        Some((id, Keypoint {
          pose: warp,
          descriptor: init.descriptor,
          detected_by_opt_flow: true,
        }))
      })
      .collect()
  }

  // Refines `warp` against the target pyramid coarse to fine. Only the
  // translation is rescaled between levels; the linear part is carried
  // across unchanged.
  pub fn track_point(&self, pyramid: &Pyramid, stack: &[Patch], warp: &mut Warp) -> bool {
    if stack.len() <= self.levels { return false }
    let mut patch_valid = true;
    for level in (0..=self.levels).rev() {
      if !patch_valid { break }
      let scale = (1 << level) as f32;
      warp.translation /= scale;

      let patch = &stack[level];
      patch_valid &= patch.valid;
      if patch_valid {
        patch_valid &= self.track_at_level(pyramid.level(level), patch, warp);
      }

      warp.translation *= scale;
    }
    patch_valid
  }

  // Gauss-Newton at one level. The patch's (J'J)^-1 J' was computed at
  // creation, so each iteration is a residual evaluation and one
  // matrix-vector product composed onto the warp.
  fn track_at_level(&self, image: &Image, patch: &Patch, warp: &mut Warp) -> bool {
    for _ in 0..self.max_iterations {
      let residual = match patch.residual(image, warp) {
        Some(r) => r,
        None => return false,
      };
      let increment = -(patch.h_inv_j_t * residual);

      // A non-finite increment would crash the SE(2) exponential.
      if !increment.iter().all(|v| v.is_finite()) { return false }
      if increment.amax() >= DIVERGENCE_GUARD { return false }

      warp.compose_se2(increment);
      if !image.is_in_bounds(warp.translation, BORDER_MARGIN) { return false }
      if increment.norm_squared() < TERMINATION_EPS2 { break }
    }
    true
  }
}
