//! IMU datagram text format: `<JOINT>:<x>,<y>,<z>,<w>`.

use nalgebra::UnitQuaternion;
use thiserror::Error;

use crate::math::unit_from_xyzw;
use crate::skeleton::Joint;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatagramError {
    #[error("datagram is not valid UTF-8")]
    InvalidUtf8,
    #[error("missing joint prefix in {0:?}")]
    MissingSeparator(String),
    #[error("unknown joint {0:?}")]
    UnknownJoint(String),
    #[error("expected 4 quaternion components, got {0}")]
    FieldCount(usize),
    #[error("invalid quaternion component {0:?}")]
    BadNumber(String),
    #[error("zero-length or non-finite quaternion")]
    Degenerate,
    #[error("joint {0} is not registered")]
    Unregistered(Joint),
}

pub fn parse_datagram(text: &str) -> Result<(Joint, UnitQuaternion<f32>), DatagramError> {
    let (name, payload) = text
        .split_once(':')
        .ok_or_else(|| DatagramError::MissingSeparator(text.trim().to_string()))?;

    let name = name.trim();
    let joint: Joint = name
        .parse()
        .map_err(|_| DatagramError::UnknownJoint(name.to_string()))?;

    let fields: Vec<&str> = payload.trim().split(',').collect();
    if fields.len() != 4 {
        return Err(DatagramError::FieldCount(fields.len()));
    }
    let mut xyzw = [0.0_f32; 4];
    for (slot, field) in xyzw.iter_mut().zip(&fields) {
        let field = field.trim();
        *slot = field
            .parse()
            .map_err(|_| DatagramError::BadNumber(field.to_string()))?;
    }

    let q = unit_from_xyzw(xyzw[0], xyzw[1], xyzw[2], xyzw[3]).ok_or(DatagramError::Degenerate)?;
    Ok((joint, q))
}

pub fn parse_datagram_bytes(bytes: &[u8]) -> Result<(Joint, UnitQuaternion<f32>), DatagramError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DatagramError::InvalidUtf8)?;
    parse_datagram(text)
}

pub fn format_datagram(joint: Joint, q: &UnitQuaternion<f32>) -> String {
    format!("{}:{},{},{},{}", joint, q.i, q.j, q.k, q.w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let (joint, q) = parse_datagram("LEFT_KNEE:0,0,0,1").unwrap();
        assert_eq!(joint, Joint::LeftKnee);
        assert!((q.w - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_normalizes() {
        let (joint, q) = parse_datagram(" HIP : 0 , 0 , 0 , 2 \n").unwrap();
        assert_eq!(joint, Joint::Hip);
        assert!((q.w - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_datagram("HIP 0,0,0,1"),
            Err(DatagramError::MissingSeparator("HIP 0,0,0,1".into()))
        );
        assert_eq!(
            parse_datagram("ELBOW:0,0,0,1"),
            Err(DatagramError::UnknownJoint("ELBOW".into()))
        );
        assert_eq!(parse_datagram("HIP:0,0,1"), Err(DatagramError::FieldCount(3)));
        assert_eq!(
            parse_datagram("HIP:0,x,0,1"),
            Err(DatagramError::BadNumber("x".into()))
        );
        assert_eq!(parse_datagram("HIP:0,0,0,0"), Err(DatagramError::Degenerate));
        assert_eq!(parse_datagram("HIP:0,0,NaN,1"), Err(DatagramError::Degenerate));
        assert_eq!(parse_datagram_bytes(&[0xff, 0xfe]), Err(DatagramError::InvalidUtf8));
    }

    #[test]
    fn test_format_is_parseable() {
        let q = UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1);
        let text = format_datagram(Joint::RightFoot, &q);
        let (joint, back) = parse_datagram(&text).unwrap();
        assert_eq!(joint, Joint::RightFoot);
        assert!(back.angle_to(&q) < 1e-5);
    }
}
