use crate::all::*;

// Values 9 and 12 are popular, allowing quick rejection logic.
const FAST_VARIANT_N: usize = 12;

// A Bresenham circle.
const CIRCLE_RADIUS: usize = 3;
const CIRCLE: [[i32; 2]; 16] = [
  [ 0, -3], [ 1, -3], [ 2, -2], [ 3, -1], [ 3,  0], [ 3,  1], [ 2,  2], [ 1,  3],
  [ 0,  3], [-1,  3], [-2,  2], [-3,  1], [-3,  0], [-3, -1], [-2, -2], [-1, -3],
];

// Grid-based corner detector. The image is tiled into square cells; cells
// covered by a mask or already holding a live keypoint are skipped, and the
// rest are seeded with the strongest FAST corners found between the two
// configured thresholds.
pub struct Detector {
  grid_size: usize,
  points_per_cell: usize,
  min_threshold: i32,
  max_threshold: i32,
}

impl Detector {
  pub fn new() -> Detector {
    let p = PARAMETER_SET.lock().unwrap();
    Detector::new_custom(
      p.optical_flow_detection_grid_size,
      p.optical_flow_detection_num_points_cell,
      p.optical_flow_detection_min_threshold,
      p.optical_flow_detection_max_threshold,
    )
  }

  pub fn new_custom(
    grid_size: usize,
    points_per_cell: usize,
    min_threshold: i32,
    max_threshold: i32,
  ) -> Detector {
    Detector {
      grid_size: grid_size.max(1),
      points_per_cell: points_per_cell.max(1),
      min_threshold: min_threshold.max(1),
      max_threshold: max_threshold.max(min_threshold.max(1)),
    }
  }

  pub fn process(
    &self,
    image: &Image,
    masks: &[MaskRect],
    existing: &[Vector2f],
  ) -> Vec<Vector2f> {
    let mut occupied = HashSet::new();
    for p in existing {
      if p[0] >= 0. && p[1] >= 0. {
        occupied.insert((p[0] as usize / self.grid_size, p[1] as usize / self.grid_size));
      }
    }

    let mut corners = vec![];
    let mut y0 = 0;
    while y0 < image.height {
      let mut x0 = 0;
      while x0 < image.width {
        let cell = (x0 / self.grid_size, y0 / self.grid_size);
        let cell_w = self.grid_size.min(image.width - x0);
        let cell_h = self.grid_size.min(image.height - y0);
        let center = Vector2f::new(
          x0 as f32 + cell_w as f32 / 2.,
          y0 as f32 + cell_h as f32 / 2.,
        );
        if !occupied.contains(&cell) && !masks.iter().any(|m| m.contains(center)) {
          self.process_cell(image, x0, y0, cell_w, cell_h, &mut corners);
        }
        x0 += self.grid_size;
      }
      y0 += self.grid_size;
    }
    corners
  }

  // Detects at the strictest threshold first and relaxes towards
  // `min_threshold` until the cell has enough corners. Within one threshold
  // pass the strongest non-adjacent corners win.
  fn process_cell(
    &self,
    image: &Image,
    x0: usize,
    y0: usize,
    cell_w: usize,
    cell_h: usize,
    corners: &mut Vec<Vector2f>,
  ) {
    let x_begin = x0.max(CIRCLE_RADIUS);
    let y_begin = y0.max(CIRCLE_RADIUS);
    let x_end = (x0 + cell_w).min(image.width.saturating_sub(CIRCLE_RADIUS));
    let y_end = (y0 + cell_h).min(image.height.saturating_sub(CIRCLE_RADIUS));
    if x_begin >= x_end || y_begin >= y_end { return }

    let mut threshold = self.max_threshold;
    let mut selected: Vec<[i32; 2]> = vec![];
    loop {
      let mut candidates = vec![];
      for y in y_begin..y_end {
        for x in x_begin..x_end {
          let (x, y) = (x as i32, y as i32);
          if !detect_at_pixel(image, x, y, threshold) { continue }
          candidates.push((corner_score(image, x, y, threshold), [x, y]));
        }
      }
      // Strongest first; ties broken by position to keep runs reproducible.
      candidates.sort_by_key(|&(score, p)| (-score, p[1], p[0]));

      selected.clear();
      for &(_, p) in &candidates {
        let adjacent = selected.iter()
          .any(|s| (s[0] - p[0]).abs() <= 1 && (s[1] - p[1]).abs() <= 1);
        if adjacent { continue }
        selected.push(p);
        if selected.len() >= self.points_per_cell { break }
      }

      if selected.len() >= self.points_per_cell || threshold <= self.min_threshold { break }
      threshold = (threshold / 2).max(self.min_threshold);
    }

    for p in &selected {
      corners.push(Vector2f::new(p[0] as f32, p[1] as f32));
    }
  }
}

fn detect_at_pixel(image: &Image, x: i32, y: i32, threshold: i32) -> bool {
  let center_value = image.value_i32(x, y) as i32;
  if continuous(image, x, y, |v| v < center_value - threshold) { return true }
  if continuous(image, x, y, |v| v > center_value + threshold) { return true }
  false
}

fn continuous<F: Fn(i32) -> bool>(image: &Image, x: i32, y: i32, f: F) -> bool {
  // Quick rejection for 9 and 12 variants.
  if !f(image.value_i32(x + 3, y) as i32) && !f(image.value_i32(x - 3, y) as i32) {
    return false;
  }

  // Two passes around the circle so arcs crossing the seam count too.
  let mut n = 0;
  for i in 0..2 * CIRCLE.len() {
    let p = CIRCLE[i % CIRCLE.len()];
    if f(image.value_i32(x + p[0], y + p[1]) as i32) {
      n += 1;
      if n >= FAST_VARIANT_N { return true }
    }
    else {
      n = 0;
    }
  }
  false
}

// Sum of absolute circle differences beyond the threshold. Only used to
// rank corners within a cell.
fn corner_score(image: &Image, x: i32, y: i32, threshold: i32) -> i32 {
  let center_value = image.value_i32(x, y) as i32;
  CIRCLE.iter()
    .map(|p| ((image.value_i32(x + p[0], y + p[1]) as i32 - center_value).abs() - threshold).max(0))
    .sum()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detector() -> Detector {
    Detector::new_custom(16, 1, 5, 40)
  }

  #[test]
  fn test_detects_blob_corners() {
    let image = Image::blob_field(96, 96, 16, Vector2f::zeros());
    let corners = detector().process(&image, &[], &[]);
    assert!(corners.len() >= 10, "found {}", corners.len());
    // One corner per cell at most.
    let mut cells = HashSet::new();
    for c in &corners {
      assert!(cells.insert((c[0] as usize / 16, c[1] as usize / 16)));
    }
  }

  #[test]
  fn test_flat_image_has_no_corners() {
    let image = Image {
      data: vec![900; 64 * 64],
      width: 64,
      height: 64,
    };
    assert!(detector().process(&image, &[], &[]).is_empty());
  }

  #[test]
  fn test_masked_cells_are_skipped() {
    let image = Image::blob_field(96, 96, 16, Vector2f::zeros());
    let mask = MaskRect { x: 0, y: 0, width: 48, height: 96 };
    let corners = detector().process(&image, &[mask], &[]);
    assert!(!corners.is_empty());
    for c in &corners {
      assert!(c[0] >= 44., "corner {} inside masked half", c[0]);
    }
  }

  #[test]
  fn test_occupied_cells_are_skipped() {
    let image = Image::blob_field(96, 96, 16, Vector2f::zeros());
    let unmasked = detector().process(&image, &[], &[]);
    let corners = detector().process(&image, &[], &unmasked);
    // Every cell that produced a corner is now occupied.
    assert!(corners.is_empty(), "re-detected {} corners", corners.len());
  }

  #[test]
  fn test_threshold_ramp_finds_weak_corners() {
    let mut image = Image {
      data: vec![1000; 64 * 64],
      width: 64,
      height: 64,
    };
    // A corner only 12 levels above background, below max_threshold.
    for y in 20..32 {
      for x in 20..32 {
        image.set_value(x, y, 1012);
      }
    }
    let corners = Detector::new_custom(64, 4, 5, 40).process(&image, &[], &[]);
    assert!(!corners.is_empty());
  }
}
