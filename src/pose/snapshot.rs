use nalgebra::{UnitQuaternion, Vector3};

use crate::skeleton::{Joint, JointHierarchy};

/// Transform of a single joint at capture time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointSample {
    pub local_rotation: UnitQuaternion<f32>,
    pub local_position: Vector3<f32>,
    pub world_position: Vector3<f32>,
}

impl Default for JointSample {
    fn default() -> Self {
        Self {
            local_rotation: UnitQuaternion::identity(),
            local_position: Vector3::zeros(),
            world_position: Vector3::zeros(),
        }
    }
}

/// One captured frame. Every joint has a slot; unset ones read as identity.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSnapshot {
    samples: [JointSample; Joint::COUNT],
}

impl Default for PoseSnapshot {
    fn default() -> Self {
        Self {
            samples: [JointSample::default(); Joint::COUNT],
        }
    }
}

impl PoseSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, joint: Joint, sample: JointSample) {
        self.samples[joint as usize] = sample;
    }

    pub fn get(&self, joint: Joint) -> &JointSample {
        &self.samples[joint as usize]
    }

    /// Samples laid out in the hierarchy's depth-first order.
    pub fn ordered<'a>(
        &'a self,
        hierarchy: &'a JointHierarchy,
    ) -> impl Iterator<Item = (Joint, &'a JointSample)> + 'a {
        hierarchy.order().iter().map(move |&j| (j, self.get(j)))
    }
}
