use std::collections::BTreeMap;

use nalgebra::{UnitQuaternion, Vector3};

use super::snapshot::{JointSample, PoseSnapshot};
use crate::skeleton::{Joint, JointHierarchy, SkeletonModel};

/// Live skeleton pose, driven by world-space sensor orientations.
///
/// Rotations are stored parent-relative (as exported), world transforms are
/// re-derived top-down after every update.
pub struct PoseApplier {
    model: SkeletonModel,
    origin: Vector3<f32>,
    local_rotation: [UnitQuaternion<f32>; Joint::COUNT],
    world_rotation: [UnitQuaternion<f32>; Joint::COUNT],
    world_position: [Vector3<f32>; Joint::COUNT],
}

impl PoseApplier {
    pub fn new(model: SkeletonModel) -> Self {
        let origin = model.rest.ground_origin(&model.hierarchy);
        let mut applier = Self {
            model,
            origin,
            local_rotation: [UnitQuaternion::identity(); Joint::COUNT],
            world_rotation: [UnitQuaternion::identity(); Joint::COUNT],
            world_position: [Vector3::zeros(); Joint::COUNT],
        };
        applier.apply_rotations(&BTreeMap::new());
        applier
    }

    pub fn model(&self) -> &SkeletonModel {
        &self.model
    }

    pub fn hierarchy(&self) -> &JointHierarchy {
        &self.model.hierarchy
    }

    /// Applies world orientations for the joints present in `rotations`.
    /// Absent joints keep their local rotation and follow their parent.
    pub fn apply_rotations(&mut self, rotations: &BTreeMap<Joint, UnitQuaternion<f32>>) {
        for &joint in self.model.hierarchy.order() {
            let i = joint as usize;
            let (parent_rot, parent_pos) = match self.model.hierarchy.parent(joint) {
                Some(p) => (self.world_rotation[p as usize], self.world_position[p as usize]),
                None => (UnitQuaternion::identity(), self.origin),
            };

            if let Some(world) = rotations.get(&joint) {
                self.local_rotation[i] = parent_rot.inverse() * world;
            }
            self.world_rotation[i] = parent_rot * self.local_rotation[i];
            self.world_position[i] = if self.model.hierarchy.parent(joint).is_some() {
                parent_pos + parent_rot * self.model.rest.offset(joint)
            } else {
                parent_pos
            };
        }
    }

    pub fn local_rotation(&self, joint: Joint) -> UnitQuaternion<f32> {
        self.local_rotation[joint as usize]
    }

    pub fn world_rotation(&self, joint: Joint) -> UnitQuaternion<f32> {
        self.world_rotation[joint as usize]
    }

    pub fn world_position(&self, joint: Joint) -> Vector3<f32> {
        self.world_position[joint as usize]
    }

    fn local_position(&self, joint: Joint) -> Vector3<f32> {
        match self.model.hierarchy.parent(joint) {
            Some(_) => self.model.rest.offset(joint),
            None => self.origin,
        }
    }

    pub fn snapshot(&self) -> PoseSnapshot {
        let mut snap = PoseSnapshot::new();
        for &joint in self.model.hierarchy.order() {
            snap.set(
                joint,
                JointSample {
                    local_rotation: self.local_rotation(joint),
                    local_position: self.local_position(joint),
                    world_position: self.world_position(joint),
                },
            );
        }
        snap
    }

    /// Bone segments as (parent world position, child world position).
    pub fn bones(&self) -> Vec<(Vector3<f32>, Vector3<f32>)> {
        let h = &self.model.hierarchy;
        h.order()
            .iter()
            .filter_map(|&j| {
                h.parent(j)
                    .map(|p| (self.world_position(p), self.world_position(j)))
            })
            .collect()
    }
}
