#[macro_use] extern crate lazy_static;

pub mod all;
pub mod camera;
pub mod descriptor;
pub mod detector;
pub mod frame;
pub mod image;
pub mod math;
pub mod optical_flow;
pub mod parameters;
pub mod patch;
pub mod pipeline;
pub mod pyramid;
pub mod store;
pub mod tracker;
pub mod types;
pub mod warp;
