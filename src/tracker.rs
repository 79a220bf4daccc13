use crate::all::*;

// Per-frame orchestration of the tracker front-end. For every frame the
// worker first tracks the surviving keypoints of each camera from the
// previous pyramid into the new one, then seeds new keypoints in empty
// detection cells of camera 0, stereo-matches only those new points into
// the remaining cameras, and finally drops cross-camera matches that
// violate the rig's epipolar geometry. Keeping this order matters: a
// freshly re-detected keypoint must not collide with a still-tracked one
// in the second camera.
pub struct Tracker {
  calibration: Calibration,
  optical_flow: OpticalFlow,
  detector: Detector,
  extractor: DescriptorExtractor,
  store: PatchStore,
  levels: usize,
  guess_type: MatchingGuessType,
  default_depth: f64,
  epipolar_error: f64,
  last_keypoint_id: u64,
  frame_number: usize,
  keypoints: Vec<KeypointMap>,
  pyramids: Option<Vec<Pyramid>>,
  // Pyramids from two frames back, kept only so their buffers can be
  // reused.
  retired: Vec<Pyramid>,
}

impl Tracker {
  pub fn new(calibration: Calibration) -> Result<Tracker> {
    let parameters = PARAMETER_SET.lock().unwrap().clone();
    Tracker::with_parameters(calibration, &parameters)
  }

  pub fn with_parameters(calibration: Calibration, p: &ParameterSet) -> Result<Tracker> {
    let camera_count = calibration.camera_count();
    Ok(Tracker {
      optical_flow: OpticalFlow::new_custom(
        p.optical_flow_levels,
        p.optical_flow_max_iterations,
        p.optical_flow_max_recovered_dist2,
      )?,
      detector: Detector::new_custom(
        p.optical_flow_detection_grid_size,
        p.optical_flow_detection_num_points_cell,
        p.optical_flow_detection_min_threshold,
        p.optical_flow_detection_max_threshold,
      ),
      extractor: DescriptorExtractor::new(),
      store: PatchStore::new(p.patch_retention_frames),
      levels: p.optical_flow_levels,
      guess_type: p.optical_flow_matching_guess_type,
      default_depth: p.optical_flow_matching_default_depth,
      epipolar_error: p.optical_flow_epipolar_error,
      last_keypoint_id: 0,
      frame_number: 0,
      keypoints: vec![KeypointMap::new(); camera_count],
      pyramids: None,
      retired: vec![],
      calibration,
    })
  }

  // Runs the tracker on one synchronized frame bundle. None when any camera
  // image is missing; the frame is then skipped without touching the
  // tracking state.
  pub fn process_frame(&mut self, input: &Arc<FrameInput>, depth_guess: f64) -> Option<FrameResult> {
    let camera_count = self.calibration.camera_count();
    if input.images.len() != camera_count {
      warn!(
        "Frame {} has {} images for a {}-camera rig, skipping.",
        input.t_ns, input.images.len(), camera_count,
      );
      return None;
    }
    if input.images.iter().any(|c| c.image.is_none()) {
      debug!("Frame {} is missing a camera image, skipping.", input.t_ns);
      return None;
    }

    let previous = self.pyramids.take();
    let mut retired = std::mem::take(&mut self.retired);
    let current: Vec<Pyramid> = input.images.iter()
      .map(|c| Pyramid::new(c.image.as_ref().unwrap(), self.levels, retired.pop()))
      .collect();

    match previous {
      None => {
        // Bootstrap: no previous frame to track from.
        self.pyramids = Some(current);
      },
      Some(previous) => {
        let mut new_keypoints = Vec::with_capacity(camera_count);
        for camera in 0..camera_count {
          new_keypoints.push(self.optical_flow.track_points(
            &previous[camera],
            &current[camera],
            &self.store,
            &self.keypoints[camera],
            &self.calibration,
            camera,
            camera,
            None,
          ));
        }
        self.keypoints = new_keypoints;
        self.pyramids = Some(current);
        self.retired = previous;
      },
    }

    self.add_points(input, depth_guess);
    self.filter_points();

    let mut live = HashSet::new();
    for keypoints in &self.keypoints {
      live.extend(keypoints.keys().copied());
    }
    self.store.retire_absent(&live, self.frame_number);
    self.frame_number += 1;

    Some(FrameResult {
      t_ns: input.t_ns,
      keypoints: self.keypoints.clone(),
      input_images: input.clone(),
      depth_guess,
    })
  }

  // Seeds new keypoints in empty detection cells of camera 0 and matches
  // only those into the other cameras. A keypoint is created only when its
  // descriptor and its whole reference patch stack are valid, so tracking
  // never meets a half-built stack later.
  fn add_points(&mut self, input: &FrameInput, depth_guess: f64) {
    let pyramids = self.pyramids.as_ref().unwrap();
    let level0 = pyramids[0].level(0);

    let existing: Vec<Vector2f> = self.keypoints[0].values()
      .map(|k| k.pose.translation)
      .collect();
    let no_masks = vec![];
    let masks = input.masks.first().unwrap_or(&no_masks);
    let corners = self.detector.process(level0, masks, &existing);

    let mut new_kpts0 = KeypointMap::new();
    for corner in corners {
      let Some(descriptor) = self.extractor.compute(level0, corner) else { continue };
      let stack = patch_stack(&pyramids[0], corner, self.levels);
      if !stack_valid(&stack) { continue }

      let id = KeypointId(self.last_keypoint_id);
      self.last_keypoint_id += 1;
      self.store.insert(id, stack, self.frame_number);

      let keypoint = Keypoint {
        pose: Warp::identity_at(corner),
        descriptor,
        detected_by_opt_flow: false,
      };
      self.keypoints[0].insert(id, keypoint.clone());
      new_kpts0.insert(id, keypoint);
    }

    let depth = match self.guess_type {
      MatchingGuessType::SamePixel => None,
      MatchingGuessType::ReprojFixDepth => Some(self.default_depth),
      MatchingGuessType::ReprojAvgDepth => Some(depth_guess),
    };
    for camera in 1..self.calibration.camera_count() {
      let matched = self.optical_flow.track_points(
        &pyramids[0],
        &pyramids[camera],
        &self.store,
        &new_kpts0,
        &self.calibration,
        0,
        camera,
        depth,
      );
      for (id, keypoint) in matched {
        self.keypoints[camera].insert(id, keypoint);
      }
    }
  }

  // Drops keypoints from camera 1 whose bearing vectors are inconsistent
  // with the rig's essential matrix. Camera 0 keeps its observation.
  fn filter_points(&mut self) {
    if self.calibration.camera_count() < 2 { return }
    let essential = match self.calibration.essential() {
      Some(e) => *e,
      None => return,
    };

    let mut to_remove = vec![];
    for (id, keypoint1) in &self.keypoints[1] {
      let Some(keypoint0) = self.keypoints[0].get(id) else { continue };
      let f0 = self.calibration.pixel_to_ray(0, keypoint0.pose.translation);
      let f1 = self.calibration.pixel_to_ray(1, keypoint1.pose.translation);
      match (f0, f1) {
        (Some(f0), Some(f1)) => {
          let residual = (f0.transpose() * essential * f1)[(0, 0)].abs();
          if residual > self.epipolar_error {
            to_remove.push(*id);
          }
        },
        _ => to_remove.push(*id),
      }
    }
    for id in &to_remove {
      self.keypoints[1].remove(id);
    }
  }
}
