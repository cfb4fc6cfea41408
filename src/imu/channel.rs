use nalgebra::UnitQuaternion;

use crate::math::{from_euler_zxy, to_euler_zxy};

/// Which side of the body segment the sensor faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountYaw {
    Front,
    Left,
    Back,
    Right,
}

impl MountYaw {
    pub fn degrees(self) -> f32 {
        match self {
            MountYaw::Front => 0.0,
            MountYaw::Left => 90.0,
            MountYaw::Back => 180.0,
            MountYaw::Right => 270.0,
        }
    }
}

/// The three corrections applied to a raw sensor orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationOffset {
    /// Fixed physical mounting (roll then yaw).
    pub mount: UnitQuaternion<f32>,
    /// Cancels residual pitch/roll tilt measured at calibration.
    pub mounting_error: UnitQuaternion<f32>,
    /// Maps the calibration-time pose to identity.
    pub calibration: UnitQuaternion<f32>,
}

impl OrientationOffset {
    pub fn new(yaw: MountYaw, roll_deg: f32) -> Self {
        let roll = from_euler_zxy(0.0, 0.0, roll_deg);
        let yaw = from_euler_zxy(0.0, yaw.degrees(), 0.0);
        Self {
            mount: roll * yaw,
            mounting_error: UnitQuaternion::identity(),
            calibration: UnitQuaternion::identity(),
        }
    }
}

/// Live orientation state of one sensor-bearing joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuChannel {
    pub raw: UnitQuaternion<f32>,
    pub corrected: UnitQuaternion<f32>,
    pub offset: OrientationOffset,
    pub calibrated: bool,
}

impl ImuChannel {
    pub fn new(yaw: MountYaw, roll_deg: f32) -> Self {
        Self {
            raw: UnitQuaternion::identity(),
            corrected: UnitQuaternion::identity(),
            offset: OrientationOffset::new(yaw, roll_deg),
            calibrated: false,
        }
    }

    fn body(&self) -> UnitQuaternion<f32> {
        self.raw * self.offset.mount
    }

    pub fn update(&mut self, raw: UnitQuaternion<f32>) {
        self.raw = raw;
        self.corrected = self.body() * self.offset.mounting_error;
    }

    /// Takes the current raw reading as the rest orientation.
    pub fn calibrate(&mut self) {
        let body = self.body();
        let euler = to_euler_zxy(&body);
        self.offset.mounting_error = from_euler_zxy(euler.x, 0.0, euler.z).inverse();
        let leveled = body * self.offset.mounting_error;
        self.offset.calibration = leveled.inverse();
        self.corrected = leveled;
        self.calibrated = true;
    }

    pub fn final_rotation(&self) -> UnitQuaternion<f32> {
        self.offset.calibration * self.corrected
    }
}
