use crate::all::*;

use clap::Parser;

lazy_static! {
  pub static ref PARAMETER_SET: Mutex<ParameterSet> = Mutex::new(ParameterSet::default());
}

// How the initial warp translation is guessed when matching a point from one
// camera to another. Temporal tracking within a single camera always starts
// from the previous pose and ignores this setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(clap::ValueEnum)]
pub enum MatchingGuessType {
  // Start from the same pixel coordinates in the other camera.
  SamePixel,
  // Reproject assuming a fixed configured scene depth.
  ReprojFixDepth,
  // Reproject using the running average depth supplied by the back-end.
  ReprojAvgDepth,
}

#[derive(Clone, Debug)]
#[derive(clap::Parser)]
pub struct ParameterSet {
  // Patch-based optical flow.
  #[clap(long, default_value = "3")]
  pub optical_flow_levels: usize,
  #[clap(long, default_value = "5")]
  pub optical_flow_max_iterations: usize,
  // Squared pixels.
  #[clap(long, default_value = "0.04")]
  pub optical_flow_max_recovered_dist2: f32,
  #[clap(long, default_value = "0.005")]
  pub optical_flow_epipolar_error: f64,
  #[clap(long, default_value = "1")]
  pub optical_flow_skip_frames: usize,

  // Keypoint detection.
  #[clap(long, default_value = "50")]
  pub optical_flow_detection_grid_size: usize,
  #[clap(long, default_value = "1")]
  pub optical_flow_detection_num_points_cell: usize,
  #[clap(long, default_value = "5")]
  pub optical_flow_detection_min_threshold: i32,
  #[clap(long, default_value = "40")]
  pub optical_flow_detection_max_threshold: i32,

  // Cross-camera matching.
  #[clap(long, value_enum, default_value = "same-pixel")]
  pub optical_flow_matching_guess_type: MatchingGuessType,
  // Meters.
  #[clap(long, default_value = "2.0")]
  pub optical_flow_matching_default_depth: f64,

  // Reference patches of keypoints absent from every camera for this many
  // consecutive frames are dropped from the patch store.
  #[clap(long, default_value = "30")]
  pub patch_retention_frames: usize,
}

impl Default for ParameterSet {
  fn default() -> ParameterSet {
    // Defaults come from the clap attributes.
    ParameterSet::parse_from(["lilac"])
  }
}
