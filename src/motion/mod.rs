pub mod angles;
pub mod energy;
pub mod history;

pub use angles::{AngleCalculator, AngleKind, AngleSpec};
pub use energy::{energy_by_name, frame_energy};
pub use history::{JointHistory, TrackedJoints, DEFAULT_HISTORY_LEN};
