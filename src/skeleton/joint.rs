use std::fmt;
use std::str::FromStr;

/// Skeletal landmarks carried by the suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum Joint {
    // Spine
    Hip = 0,
    Waist = 1,
    Chest = 2,
    UpperChest = 3,
    Neck = 4,
    Head = 5,
    // Left arm
    LeftShoulder = 6,
    LeftElbow = 7,
    LeftWrist = 8,
    LeftHand = 9,
    // Right arm
    RightShoulder = 10,
    RightElbow = 11,
    RightWrist = 12,
    RightHand = 13,
    // Left leg
    LeftHip = 14,
    LeftKnee = 15,
    LeftAnkle = 16,
    LeftFoot = 17,
    // Right leg
    RightHip = 18,
    RightKnee = 19,
    RightAnkle = 20,
    RightFoot = 21,
}

impl Joint {
    pub const COUNT: usize = 22;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Hip,
        Joint::Waist,
        Joint::Chest,
        Joint::UpperChest,
        Joint::Neck,
        Joint::Head,
        Joint::LeftShoulder,
        Joint::LeftElbow,
        Joint::LeftWrist,
        Joint::LeftHand,
        Joint::RightShoulder,
        Joint::RightElbow,
        Joint::RightWrist,
        Joint::RightHand,
        Joint::LeftHip,
        Joint::LeftKnee,
        Joint::LeftAnkle,
        Joint::LeftFoot,
        Joint::RightHip,
        Joint::RightKnee,
        Joint::RightAnkle,
        Joint::RightFoot,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Name used on the wire and in the motion file.
    pub fn name(self) -> &'static str {
        match self {
            Joint::Hip => "HIP",
            Joint::Waist => "WAIST",
            Joint::Chest => "CHEST",
            Joint::UpperChest => "UPPER_CHEST",
            Joint::Neck => "NECK",
            Joint::Head => "HEAD",
            Joint::LeftShoulder => "LEFT_SHOULDER",
            Joint::LeftElbow => "LEFT_ELBOW",
            Joint::LeftWrist => "LEFT_WRIST",
            Joint::LeftHand => "LEFT_HAND",
            Joint::RightShoulder => "RIGHT_SHOULDER",
            Joint::RightElbow => "RIGHT_ELBOW",
            Joint::RightWrist => "RIGHT_WRIST",
            Joint::RightHand => "RIGHT_HAND",
            Joint::LeftHip => "LEFT_HIP",
            Joint::LeftKnee => "LEFT_KNEE",
            Joint::LeftAnkle => "LEFT_ANKLE",
            Joint::LeftFoot => "LEFT_FOOT",
            Joint::RightHip => "RIGHT_HIP",
            Joint::RightKnee => "RIGHT_KNEE",
            Joint::RightAnkle => "RIGHT_ANKLE",
            Joint::RightFoot => "RIGHT_FOOT",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown joint name: {0:?}")]
pub struct UnknownJoint(pub String);

impl FromStr for Joint {
    type Err = UnknownJoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Joint::ALL
            .iter()
            .copied()
            .find(|j| j.name() == s)
            .ok_or_else(|| UnknownJoint(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_index_matches_discriminant() {
        for (i, joint) in Joint::ALL.iter().enumerate() {
            assert_eq!(*joint as usize, i);
            assert_eq!(Joint::from_index(i), Some(*joint));
        }
        assert_eq!(Joint::from_index(Joint::COUNT), None);
    }

    #[test]
    fn test_joint_name_roundtrip() {
        for joint in Joint::ALL {
            assert_eq!(joint.name().parse::<Joint>(), Ok(joint));
        }
    }

    #[test]
    fn test_joint_parse_rejects_other_case() {
        assert!("hip".parse::<Joint>().is_err());
        assert!("LEFT_TOE".parse::<Joint>().is_err());
    }
}
