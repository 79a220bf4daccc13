use crate::all::*;

// One camera's payload within an input bundle. A missing image marks the
// whole frame as unusable; the exposure tag is carried through for
// downstream consumers.
pub struct CameraImage {
  pub image: Option<Image>,
  pub exposure_s: f64,
}

// Axis-aligned exclusion rectangle in level-0 pixel coordinates.
#[derive(Clone, Copy, Debug)]
pub struct MaskRect {
  pub x: usize,
  pub y: usize,
  pub width: usize,
  pub height: usize,
}

impl MaskRect {
  pub fn contains(&self, p: Vector2f) -> bool {
    p[0] >= self.x as f32 && p[0] < (self.x + self.width) as f32
      && p[1] >= self.y as f32 && p[1] < (self.y + self.height) as f32
  }
}

// Synchronized multi-camera frame bundle consumed by the tracker.
pub struct FrameInput {
  pub t_ns: i64,
  pub images: Vec<CameraImage>,
  // Per-camera exclusion rectangles for detection.
  pub masks: Vec<Vec<MaskRect>>,
}

impl FrameInput {
  pub fn new(t_ns: i64, images: Vec<Image>) -> FrameInput {
    let camera_count = images.len();
    FrameInput {
      t_ns,
      images: images.into_iter()
        .map(|image| CameraImage { image: Some(image), exposure_s: 0. })
        .collect(),
      masks: vec![vec![]; camera_count],
    }
  }
}

// State of one keypoint in one camera at one timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct Keypoint {
  pub pose: Warp,
  pub descriptor: Descriptor,
  // True when this observation came from tracking, false straight out of
  // the detector.
  pub detected_by_opt_flow: bool,
}

pub type KeypointMap = HashMap<KeypointId, Keypoint>;

// Per-timestamp tracker output: keypoint maps per camera plus provenance.
pub struct FrameResult {
  pub t_ns: i64,
  pub keypoints: Vec<KeypointMap>,
  pub input_images: Arc<FrameInput>,
  // Depth guess the frame was matched with, for telemetry.
  pub depth_guess: f64,
}
