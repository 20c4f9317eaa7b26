pub mod frame;
pub mod normalize;
pub mod topology;

pub use frame::{Frame, PlaneAxes};
pub use normalize::{select_axes, AxisMode, Normalize};
pub use topology::{Body38Joint, BvhJoint, Landmarks, Topology};
