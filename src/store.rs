use crate::all::*;

// Reference patch stacks by keypoint id. Stacks are written once at
// detection and only read afterwards; tracking borrows them concurrently
// from the parallel per-keypoint loop.
//
// Without eviction the store would grow for as long as the session runs, so
// stacks whose keypoint has been absent from every camera for
// `retention_frames` consecutive frames are dropped. A dropped id can never
// come back: ids are monotonic and a re-detected corner gets a fresh one.
pub struct PatchStore {
  stacks: HashMap<KeypointId, Vec<Patch>>,
  last_seen: HashMap<KeypointId, usize>,
  retention_frames: usize,
}

impl PatchStore {
  pub fn new(retention_frames: usize) -> PatchStore {
    PatchStore {
      stacks: HashMap::new(),
      last_seen: HashMap::new(),
      retention_frames,
    }
  }

  pub fn insert(&mut self, id: KeypointId, stack: Vec<Patch>, frame_number: usize) {
    assert!(!self.stacks.contains_key(&id));
    self.stacks.insert(id, stack);
    self.last_seen.insert(id, frame_number);
  }

  #[inline(always)]
  pub fn get(&self, id: KeypointId) -> Option<&Vec<Patch>> {
    self.stacks.get(&id)
  }

  pub fn len(&self) -> usize {
    self.stacks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.stacks.is_empty()
  }

  // Called once per processed frame with the ids still present in at least
  // one camera. Evicts everything not seen within the retention window.
  pub fn retire_absent(&mut self, live: &HashSet<KeypointId>, frame_number: usize) {
    for id in live {
      if let Some(seen) = self.last_seen.get_mut(id) {
        *seen = frame_number;
      }
    }
    let retention = self.retention_frames;
    let last_seen = &mut self.last_seen;
    self.stacks.retain(|id, _| {
      let keep = frame_number - last_seen[id] <= retention;
      if !keep {
        last_seen.remove(id);
      }
      keep
    });
  }
}
