pub mod applier;
pub mod snapshot;

pub use applier::PoseApplier;
pub use snapshot::{JointSample, PoseSnapshot};
