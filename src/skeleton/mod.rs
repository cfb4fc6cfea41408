pub mod hierarchy;
pub mod joint;
pub mod model;

pub use hierarchy::JointHierarchy;
pub use joint::{Joint, UnknownJoint};
pub use model::{RestPose, SkeletonModel, SkeletonProportions};
