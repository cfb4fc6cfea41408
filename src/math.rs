//! Rotation helpers shared by calibration and the BVH writer.
//!
//! Euler angles here always use the Z-then-X-then-Y composition
//! (`R = Ry * Rx * Rz`), which is both the mount convention of the suit
//! firmware and the channel order declared in the motion file.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Rotation from Euler angles in degrees, applied Z first, then X, then Y.
pub fn from_euler_zxy(x_deg: f32, y_deg: f32, z_deg: f32) -> UnitQuaternion<f32> {
    let qx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), x_deg.to_radians());
    let qy = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), y_deg.to_radians());
    let qz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), z_deg.to_radians());
    qy * qx * qz
}

/// Decomposes a rotation into (x, y, z) Euler degrees such that
/// `from_euler_zxy(x, y, z)` reproduces it. Each angle is in (-180, 180].
pub fn to_euler_zxy(q: &UnitQuaternion<f32>) -> Vector3<f32> {
    let m = q.to_rotation_matrix();
    let m = m.matrix();
    let sin_x = (-m[(1, 2)]).clamp(-1.0, 1.0);
    let x = sin_x.asin();

    let (y, z) = if sin_x.abs() < 0.999_999 {
        (m[(0, 2)].atan2(m[(2, 2)]), m[(1, 0)].atan2(m[(1, 1)]))
    } else {
        // gimbal lock: fold the roll into yaw
        ((-m[(2, 0)]).atan2(m[(0, 0)]), 0.0)
    };

    Vector3::new(
        normalize_degrees(x.to_degrees()),
        normalize_degrees(y.to_degrees()),
        normalize_degrees(z.to_degrees()),
    )
}

/// Wraps an angle into (-180, 180].
pub fn normalize_degrees(angle: f32) -> f32 {
    let mut a = angle % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a <= -180.0 {
        a += 360.0;
    }
    a
}

/// Builds a unit quaternion from wire-order components, rejecting
/// zero-length or non-finite input.
pub fn unit_from_xyzw(x: f32, y: f32, z: f32, w: f32) -> Option<UnitQuaternion<f32>> {
    let q = Quaternion::new(w, x, y, z);
    if !q.coords.iter().all(|c| c.is_finite()) {
        return None;
    }
    UnitQuaternion::try_new(q, 1e-6)
}

/// Angle in radians between two rotations.
pub fn angle_between(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>) -> f32 {
    a.angle_to(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_euler_roundtrip_general_angles() {
        for &(x, y, z) in &[(10.0, 20.0, 30.0), (-45.0, 170.0, -90.0), (80.0, -120.0, 5.0)] {
            let q = from_euler_zxy(x, y, z);
            let e = to_euler_zxy(&q);
            let back = from_euler_zxy(e.x, e.y, e.z);
            assert!(angle_between(&q, &back) < 1e-3, "({x},{y},{z}) -> {:?}", e);
        }
    }

    #[test]
    fn test_euler_axis_components() {
        let e = to_euler_zxy(&from_euler_zxy(0.0, 90.0, 0.0));
        assert!(approx(e.y, 90.0, 1e-3), "yaw={}", e.y);
        assert!(approx(e.x, 0.0, 1e-3));
        assert!(approx(e.z, 0.0, 1e-3));

        let e = to_euler_zxy(&from_euler_zxy(0.0, 0.0, -30.0));
        assert!(approx(e.z, -30.0, 1e-3), "roll={}", e.z);
    }

    #[test]
    fn test_euler_gimbal_lock_still_reconstructs() {
        let q = from_euler_zxy(90.0, 30.0, 0.0);
        let e = to_euler_zxy(&q);
        let back = from_euler_zxy(e.x, e.y, e.z);
        assert!(angle_between(&q, &back) < 1e-2);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(270.0), -90.0);
        assert_eq!(normalize_degrees(-180.0), 180.0);
        assert_eq!(normalize_degrees(180.0), 180.0);
        assert_eq!(normalize_degrees(725.0), 5.0);
    }

    #[test]
    fn test_unit_from_xyzw_rejects_degenerate() {
        assert!(unit_from_xyzw(0.0, 0.0, 0.0, 0.0).is_none());
        assert!(unit_from_xyzw(f32::NAN, 0.0, 0.0, 1.0).is_none());
        let q = unit_from_xyzw(0.0, 0.0, 0.0, 2.0).unwrap();
        assert!(approx(q.w, 1.0, 1e-6));
    }
}
