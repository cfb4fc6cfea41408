use super::joint::Joint;

/// Parent links of the suit skeleton plus its canonical depth-first order.
///
/// Every per-frame value vector (motion file channels, snapshots) is laid out
/// in `order()`. A parent always comes before its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointHierarchy {
    order: Vec<Joint>,
    parents: [Option<Joint>; Joint::COUNT],
}

const DEPTH_FIRST: [Joint; Joint::COUNT] = [
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

fn standard_parent(joint: Joint) -> Option<Joint> {
    use Joint::*;
    match joint {
        Hip => None,
        Waist => Some(Hip),
        Chest => Some(Waist),
        UpperChest => Some(Chest),
        Neck => Some(UpperChest),
        Head => Some(Neck),
        LeftShoulder | RightShoulder => Some(UpperChest),
        LeftElbow => Some(LeftShoulder),
        LeftWrist => Some(LeftElbow),
        LeftHand => Some(LeftWrist),
        RightElbow => Some(RightShoulder),
        RightWrist => Some(RightElbow),
        RightHand => Some(RightWrist),
        LeftHip | RightHip => Some(Hip),
        LeftKnee => Some(LeftHip),
        LeftAnkle => Some(LeftKnee),
        LeftFoot => Some(LeftAnkle),
        RightKnee => Some(RightHip),
        RightAnkle => Some(RightKnee),
        RightFoot => Some(RightAnkle),
    }
}

impl JointHierarchy {
    /// The full 22-joint suit hierarchy rooted at the hip.
    pub fn standard() -> Self {
        let mut parents = [None; Joint::COUNT];
        for joint in Joint::ALL {
            parents[joint as usize] = standard_parent(joint);
        }
        Self {
            order: DEPTH_FIRST.to_vec(),
            parents,
        }
    }

    pub fn root(&self) -> Joint {
        self.order[0]
    }

    pub fn order(&self) -> &[Joint] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn parent(&self, joint: Joint) -> Option<Joint> {
        self.parents[joint as usize]
    }

    pub fn contains(&self, joint: Joint) -> bool {
        self.order.contains(&joint)
    }

    /// Children of `joint`, in depth-first order.
    pub fn children(&self, joint: Joint) -> impl Iterator<Item = Joint> + '_ {
        self.order
            .iter()
            .copied()
            .filter(move |&c| self.parent(c) == Some(joint))
    }

    pub fn is_leaf(&self, joint: Joint) -> bool {
        self.children(joint).next().is_none()
    }

    /// Nesting depth below the root (root = 0).
    pub fn depth(&self, joint: Joint) -> usize {
        let mut depth = 0;
        let mut current = joint;
        while let Some(p) = self.parent(current) {
            depth += 1;
            current = p;
        }
        depth
    }
}

impl Default for JointHierarchy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_root() {
        let h = JointHierarchy::standard();
        let roots: Vec<_> = h.order().iter().filter(|j| h.parent(**j).is_none()).collect();
        assert_eq!(roots, vec![&Joint::Hip]);
        assert_eq!(h.root(), Joint::Hip);
    }

    #[test]
    fn test_order_is_topological() {
        let h = JointHierarchy::standard();
        for (i, joint) in h.order().iter().enumerate() {
            if let Some(parent) = h.parent(*joint) {
                let pi = h.order().iter().position(|j| *j == parent).unwrap();
                assert!(pi < i, "{} appears before its parent {}", joint, parent);
            }
        }
    }

    #[test]
    fn test_order_covers_every_joint_once() {
        let h = JointHierarchy::standard();
        assert_eq!(h.len(), Joint::COUNT);
        for joint in Joint::ALL {
            assert_eq!(h.order().iter().filter(|j| **j == joint).count(), 1);
        }
    }

    #[test]
    fn test_order_is_depth_first() {
        // each joint's subtree forms a contiguous run directly after it
        let h = JointHierarchy::standard();
        let order = h.order();
        for (i, &joint) in order.iter().enumerate() {
            let d = h.depth(joint);
            let end = order[i + 1..]
                .iter()
                .position(|&j| h.depth(j) <= d)
                .map_or(order.len(), |p| i + 1 + p);
            for &inner in &order[i + 1..end] {
                let mut cur = inner;
                while let Some(p) = h.parent(cur) {
                    if p == joint {
                        break;
                    }
                    cur = p;
                }
                assert_eq!(h.parent(cur), Some(joint), "{} not under {}", inner, joint);
            }
        }
    }

    #[test]
    fn test_leaves() {
        let h = JointHierarchy::standard();
        let leaves: Vec<_> = h.order().iter().copied().filter(|j| h.is_leaf(*j)).collect();
        assert_eq!(
            leaves,
            vec![Joint::Head, Joint::LeftHand, Joint::RightHand, Joint::LeftFoot, Joint::RightFoot]
        );
    }

    #[test]
    fn test_upper_chest_children() {
        let h = JointHierarchy::standard();
        let children: Vec<_> = h.children(Joint::UpperChest).collect();
        assert_eq!(children, vec![Joint::Neck, Joint::LeftShoulder, Joint::RightShoulder]);
    }
}
