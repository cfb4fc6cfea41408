pub mod bvh;
pub mod capture;
pub mod stream;

pub use bvh::{format_value, MotionLayout, RotationOrder};
pub use capture::CaptureClock;
pub use stream::{MotionRecorder, RecordingSummary, DEFAULT_QUEUE_CAPACITY};
