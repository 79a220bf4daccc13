// Eigen-like aliases. The tracking kernel runs in f32, the rig geometry
// (bearing vectors, essential matrix) in f64.
pub type Vector2f = nalgebra::Vector2::<f32>;
pub type Vector3f = nalgebra::Vector3::<f32>;
pub type Matrix2f = nalgebra::Matrix2::<f32>;
pub type Matrix2d = nalgebra::Matrix2::<f64>;
pub type Vector2d = nalgebra::Vector2::<f64>;
pub type Vector3d = nalgebra::Vector3::<f64>;
pub type Matrix3d = nalgebra::Matrix3::<f64>;
pub type Matrix4d = nalgebra::Matrix4::<f64>;

// Identifier of a tracked keypoint. Ids are handed out in increasing order
// and never reused within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeypointId(pub u64);
