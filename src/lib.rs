pub mod config;
pub mod dispatch;
pub mod imu;
pub mod math;
pub mod pose;
pub mod recorder;
pub mod session;
pub mod skeleton;
