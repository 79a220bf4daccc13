// NOTE This kind of import-all file isn't a common Rust idiom.

pub use crate::{
  camera::*,
  descriptor::*,
  detector::*,
  frame::*,
  image::*,
  math::*,
  optical_flow::*,
  parameters::*,
  patch::*,
  pipeline::*,
  pyramid::*,
  store::*,
  tracker::*,
  types::*,
  warp::*,
};

pub use {
  std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
  },
  log::{debug, info, warn},
  anyhow::{anyhow, bail, Context as AnyhowContext, Result},
};
