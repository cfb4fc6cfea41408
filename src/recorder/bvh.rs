//! BVH text layout: hierarchy block, motion preamble and frame lines.

use crate::math::to_euler_zxy;
use crate::pose::PoseSnapshot;
use crate::skeleton::{Joint, JointHierarchy, RestPose};
use nalgebra::Vector3;

/// Metres → centimetres.
pub const UNITS_SCALE: f32 = 100.0;

/// Width of the patchable frame-count field after `Frames:`.
pub const FRAMES_FIELD_WIDTH: usize = 10;

const END_SITE_OFFSET: &str = "OFFSET 0 2 0";

/// Rotation channel order. Declared in the hierarchy and used for every
/// frame line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationOrder {
    #[default]
    Zxy,
}

impl RotationOrder {
    pub fn channel_names(self) -> &'static str {
        match self {
            RotationOrder::Zxy => "Zrotation Xrotation Yrotation",
        }
    }

    /// Picks the (x, y, z) Euler components in channel order.
    pub fn components(self, euler: Vector3<f32>) -> [f32; 3] {
        match self {
            RotationOrder::Zxy => [euler.z, euler.x, euler.y],
        }
    }
}

/// Up to 6 decimals, trailing zeros trimmed, never `-0`.
pub fn format_value(v: f32) -> String {
    let mut s = format!("{:.6}", v);
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

/// Static part of a motion file.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionLayout {
    pub hierarchy: JointHierarchy,
    pub rest: RestPose,
    pub frame_time: f32,
    pub rotation_order: RotationOrder,
}

impl MotionLayout {
    pub fn new(hierarchy: JointHierarchy, rest: RestPose, fps: f32) -> Self {
        Self {
            hierarchy,
            rest,
            frame_time: 1.0 / fps.max(1.0),
            rotation_order: RotationOrder::Zxy,
        }
    }

    /// Header text and the byte offset of the frame-count field in it.
    pub fn header(&self) -> (String, usize) {
        let mut out = String::from("HIERARCHY\n");
        self.write_joint(&mut out, self.hierarchy.root(), 0);
        out.push_str("MOTION\n");
        out.push_str("Frames:");
        let frames_field = out.len();
        out.push_str(&" ".repeat(FRAMES_FIELD_WIDTH));
        out.push('\n');
        out.push_str(&format!("Frame Time: {:.6}\n", self.frame_time));
        (out, frames_field)
    }

    fn write_joint(&self, out: &mut String, joint: Joint, depth: usize) {
        let tabs = "\t".repeat(depth);
        let is_root = self.hierarchy.parent(joint).is_none();
        if is_root {
            out.push_str(&format!("ROOT {}\n", joint));
        } else {
            out.push_str(&format!("{tabs}JOINT {}\n", joint));
        }
        out.push_str(&format!("{tabs}{{\n"));

        let offset = if is_root {
            Vector3::zeros()
        } else {
            self.rest.offset(joint) * UNITS_SCALE
        };
        out.push_str(&format!(
            "{tabs}\tOFFSET {} {} {}\n",
            format_value(offset.x),
            format_value(offset.y),
            format_value(offset.z)
        ));

        let rotations = self.rotation_order.channel_names();
        if is_root {
            out.push_str(&format!(
                "{tabs}\tCHANNELS 6 Xposition Yposition Zposition {rotations}\n"
            ));
        } else {
            out.push_str(&format!("{tabs}\tCHANNELS 3 {rotations}\n"));
        }

        for child in self.hierarchy.children(joint) {
            self.write_joint(out, child, depth + 1);
        }
        if self.hierarchy.is_leaf(joint) {
            out.push_str(&format!("{tabs}\tEnd Site\n"));
            out.push_str(&format!("{tabs}\t{{\n"));
            out.push_str(&format!("{tabs}\t\t{END_SITE_OFFSET}\n"));
            out.push_str(&format!("{tabs}\t}}\n"));
        }
        out.push_str(&format!("{tabs}}}\n"));
    }

    /// One newline-terminated frame line: root translation (always zero)
    /// followed by every joint's local rotation.
    pub fn frame_line(&self, snapshot: &PoseSnapshot) -> String {
        let mut values: Vec<String> = Vec::with_capacity(3 + 3 * self.hierarchy.len());
        for (joint, sample) in snapshot.ordered(&self.hierarchy) {
            if self.hierarchy.parent(joint).is_none() {
                values.extend(std::iter::repeat("0".to_string()).take(3));
            }
            let euler = to_euler_zxy(&sample.local_rotation);
            values.extend(
                self.rotation_order
                    .components(euler)
                    .iter()
                    .map(|v| format_value(*v)),
            );
        }
        let mut line = values.join(" ");
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::from_euler_zxy;
    use crate::pose::JointSample;
    use crate::skeleton::SkeletonModel;

    fn layout() -> MotionLayout {
        let model = SkeletonModel::build(1.75);
        MotionLayout::new(model.hierarchy, model.rest, 30.0)
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(-0.0), "0");
        assert_eq!(format_value(-0.0000001), "0");
        assert_eq!(format_value(17.5), "17.5");
        assert_eq!(format_value(-90.0), "-90");
        assert_eq!(format_value(1.234_567_8), "1.234568");
        assert_eq!(format_value(100.0), "100");
    }

    #[test]
    fn test_header_structure() {
        let layout = layout();
        let (header, field) = layout.header();
        let lines: Vec<&str> = header.lines().collect();
        assert_eq!(lines[0], "HIERARCHY");
        assert_eq!(lines[1], "ROOT HIP");
        assert_eq!(lines[2], "{");
        assert_eq!(lines[3], "\tOFFSET 0 0 0");
        assert_eq!(
            lines[4],
            "\tCHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation"
        );
        assert_eq!(lines[5], "\tJOINT WAIST");
        assert!(header.contains("\t\tCHANNELS 3 Zrotation Xrotation Yrotation\n"));
        assert_eq!(header.matches("End Site").count(), 5);
        assert_eq!(header.matches("JOINT ").count(), Joint::COUNT - 1);
        assert_eq!(header.matches('{').count(), header.matches('}').count());

        assert_eq!(&header[field - 7..field], "Frames:");
        assert_eq!(&header[field..field + FRAMES_FIELD_WIDTH], "          ");
        assert!(header.ends_with("Frame Time: 0.033333\n"));
    }

    #[test]
    fn test_offsets_in_centimetres() {
        let layout = layout();
        let (header, _) = layout.header();
        let waist_cm = layout.rest.offset(Joint::Waist).y * UNITS_SCALE;
        let expected = format!("\t\tOFFSET 0 {} 0\n", format_value(waist_cm));
        assert!(header.contains(&expected), "missing {expected:?}");
    }

    #[test]
    fn test_frame_line_token_count() {
        let layout = layout();
        let line = layout.frame_line(&PoseSnapshot::new());
        assert!(line.ends_with('\n'));
        let tokens: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(tokens.len(), 3 + 3 * layout.hierarchy.len());
        assert!(tokens.iter().all(|t| *t == "0"));
    }

    #[test]
    fn test_frame_line_channel_order() {
        let layout = layout();
        let mut snap = PoseSnapshot::new();
        snap.set(
            Joint::Waist,
            JointSample {
                local_rotation: from_euler_zxy(10.0, 20.0, 30.0),
                ..Default::default()
            },
        );
        let line = layout.frame_line(&snap);
        let values: Vec<f32> = line
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        // WAIST is the second joint: after 3 translations + 3 root rotations
        let (z, x, y) = (values[6], values[7], values[8]);
        assert!((z - 30.0).abs() < 1e-2, "z={z}");
        assert!((x - 10.0).abs() < 1e-2, "x={x}");
        assert!((y - 20.0).abs() < 1e-2, "y={y}");
    }
}
