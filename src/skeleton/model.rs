use nalgebra::Vector3;

use super::hierarchy::JointHierarchy;
use super::joint::Joint;

/// Bone lengths in metres, all proportional to body height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkeletonProportions {
    pub height_m: f32,
    // Spine
    pub hip_to_waist: f32,
    pub waist_to_chest: f32,
    pub chest_to_upper_chest: f32,
    pub upper_chest_to_neck: f32,
    pub neck: f32,
    pub head: f32,
    // Arms
    pub shoulder_width: f32,
    pub upper_arm: f32,
    pub lower_arm: f32,
    pub hand: f32,
    // Legs
    pub hip_offset: f32, // lateral, from hip centre
    pub upper_leg: f32,
    pub lower_leg: f32,
    pub foot: f32,
}

impl SkeletonProportions {
    pub fn from_height(height_m: f32) -> Self {
        Self {
            height_m,
            hip_to_waist: height_m * 0.097,
            waist_to_chest: height_m * 0.097,
            chest_to_upper_chest: height_m * 0.048,
            upper_chest_to_neck: height_m * 0.048,
            neck: height_m * 0.030,
            head: height_m * 0.130,
            shoulder_width: height_m * 0.240,
            upper_arm: height_m * 0.186,
            lower_arm: height_m * 0.146,
            hand: height_m * 0.108,
            hip_offset: height_m * 0.100,
            upper_leg: height_m * 0.245,
            lower_leg: height_m * 0.246,
            foot: height_m * 0.152,
        }
    }
}

/// Parent-relative rest translation of every joint (metres, Y-up).
/// Left side is +X, feet point toward -Z. The root offset is always zero.
#[derive(Debug, Clone, PartialEq)]
pub struct RestPose {
    offsets: [Vector3<f32>; Joint::COUNT],
}

impl RestPose {
    fn from_proportions(p: &SkeletonProportions, hierarchy: &JointHierarchy) -> Self {
        let up = Vector3::y();
        let left = Vector3::x();
        let back = -Vector3::z();

        let offsets = std::array::from_fn(|i| {
            let joint = Joint::ALL[i];
            if hierarchy.parent(joint).is_none() {
                return Vector3::zeros();
            }
            match joint {
                Joint::Hip => Vector3::zeros(),
                Joint::Waist => up * p.hip_to_waist,
                Joint::Chest => up * p.waist_to_chest,
                Joint::UpperChest => up * p.chest_to_upper_chest,
                Joint::Neck => up * p.upper_chest_to_neck,
                Joint::Head => up * (p.neck + p.head * 0.5),
                Joint::LeftShoulder => left * (p.shoulder_width * 0.5),
                Joint::RightShoulder => -left * (p.shoulder_width * 0.5),
                Joint::LeftElbow | Joint::RightElbow => -up * p.upper_arm,
                Joint::LeftWrist | Joint::RightWrist => -up * p.lower_arm,
                Joint::LeftHand | Joint::RightHand => -up * (p.hand * 0.5),
                Joint::LeftHip => left * p.hip_offset,
                Joint::RightHip => -left * p.hip_offset,
                Joint::LeftKnee | Joint::RightKnee => -up * p.upper_leg,
                Joint::LeftAnkle | Joint::RightAnkle => -up * p.lower_leg,
                Joint::LeftFoot | Joint::RightFoot => back * (p.foot * 0.5),
            }
        });
        Self { offsets }
    }

    pub fn offset(&self, joint: Joint) -> Vector3<f32> {
        self.offsets[joint as usize]
    }

    /// Rest position relative to the root, summed along the parent chain.
    pub fn absolute(&self, hierarchy: &JointHierarchy, joint: Joint) -> Vector3<f32> {
        let mut pos = self.offset(joint);
        let mut current = joint;
        while let Some(parent) = hierarchy.parent(current) {
            pos += self.offset(parent);
            current = parent;
        }
        pos
    }

    /// Root placement that puts the lowest rest-pose joint on y = 0.
    pub fn ground_origin(&self, hierarchy: &JointHierarchy) -> Vector3<f32> {
        let lowest = hierarchy
            .order()
            .iter()
            .map(|&j| self.absolute(hierarchy, j).y)
            .fold(0.0_f32, f32::min);
        Vector3::new(0.0, -lowest, 0.0)
    }
}

/// Hierarchy plus rest pose for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonModel {
    pub hierarchy: JointHierarchy,
    pub proportions: SkeletonProportions,
    pub rest: RestPose,
}

impl SkeletonModel {
    /// Pure: the same height always yields bit-identical offsets.
    pub fn build(height_m: f32) -> Self {
        let hierarchy = JointHierarchy::standard();
        let proportions = SkeletonProportions::from_height(height_m);
        let rest = RestPose::from_proportions(&proportions, &hierarchy);
        Self {
            hierarchy,
            proportions,
            rest,
        }
    }

    pub fn height_m(&self) -> f32 {
        self.proportions.height_m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_build_is_bit_identical() {
        for &h in &[0.5_f32, 1.62, 1.75, 2.1] {
            let a = SkeletonModel::build(h);
            let _ = SkeletonModel::build(h * 2.0);
            let b = SkeletonModel::build(h);
            for joint in Joint::ALL {
                let (oa, ob) = (a.rest.offset(joint), b.rest.offset(joint));
                for k in 0..3 {
                    assert_eq!(oa[k].to_bits(), ob[k].to_bits(), "{joint} at h={h}");
                }
            }
        }
    }

    #[test]
    fn test_root_offset_is_zero() {
        let model = SkeletonModel::build(1.8);
        assert_eq!(model.rest.offset(Joint::Hip), Vector3::zeros());
    }

    #[test]
    fn test_sides_and_feet() {
        let model = SkeletonModel::build(1.75);
        let h = &model.hierarchy;
        assert!(model.rest.absolute(h, Joint::LeftShoulder).x > 0.0);
        assert!(model.rest.absolute(h, Joint::RightShoulder).x < 0.0);
        assert!(model.rest.absolute(h, Joint::LeftFoot).x > 0.0);
        assert!(model.rest.offset(Joint::LeftFoot).z < 0.0);
        assert!(model.rest.offset(Joint::RightFoot).z < 0.0);
    }

    #[test]
    fn test_head_and_hand_offsets() {
        let model = SkeletonModel::build(2.0);
        let p = model.proportions;
        assert!(approx(model.rest.offset(Joint::Head).y, p.neck + p.head / 2.0));
        assert!(approx(model.rest.offset(Joint::LeftHand).y, -p.hand / 2.0));
        assert!(approx(model.rest.offset(Joint::RightFoot).z, -p.foot / 2.0));
    }

    #[test]
    fn test_ground_origin_places_feet_on_floor() {
        let model = SkeletonModel::build(1.75);
        let h = &model.hierarchy;
        let origin = model.rest.ground_origin(h);
        let p = model.proportions;
        assert!(approx(origin.y, p.upper_leg + p.lower_leg));
        let foot_y = origin.y + model.rest.absolute(h, Joint::RightFoot).y;
        assert!(approx(foot_y, 0.0));
    }
}
