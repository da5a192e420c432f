//! Rotation matrix to quaternion conversion for trajectory export.

use cgmath::prelude::*;
use cgmath::{Matrix3, Quaternion};

/// Convert an orthonormal rotation matrix into a unit quaternion `(w, x, y, z)`.
///
/// The component with the largest magnitude is recovered first through a square root and the
/// other three are derived from it. Picking the branch from the largest of `trace`, `R00`,
/// `R11`, `R22` keeps the square root argument away from zero, so rotations close to 180
/// degrees are as accurate as small ones.
pub fn rotation_to_quaternion(rotation: &Matrix3<f64>) -> Quaternion<f64> {
    // cgmath matrices are column major, m[col][row]
    let r = |row: usize, col: usize| rotation[col][row];
    let trace = r(0, 0) + r(1, 1) + r(2, 2);

    let q = if trace >= r(0, 0) && trace >= r(1, 1) && trace >= r(2, 2) {
        let s = (1.0 + trace).sqrt() * 2.0; // 4w
        Quaternion::new(
            0.25 * s,
            (r(2, 1) - r(1, 2)) / s,
            (r(0, 2) - r(2, 0)) / s,
            (r(1, 0) - r(0, 1)) / s,
        )
    } else if r(0, 0) >= r(1, 1) && r(0, 0) >= r(2, 2) {
        let s = (1.0 + r(0, 0) - r(1, 1) - r(2, 2)).sqrt() * 2.0; // 4x
        Quaternion::new(
            (r(2, 1) - r(1, 2)) / s,
            0.25 * s,
            (r(0, 1) + r(1, 0)) / s,
            (r(0, 2) + r(2, 0)) / s,
        )
    } else if r(1, 1) >= r(2, 2) {
        let s = (1.0 + r(1, 1) - r(0, 0) - r(2, 2)).sqrt() * 2.0; // 4y
        Quaternion::new(
            (r(0, 2) - r(2, 0)) / s,
            (r(0, 1) + r(1, 0)) / s,
            0.25 * s,
            (r(1, 2) + r(2, 1)) / s,
        )
    } else {
        let s = (1.0 + r(2, 2) - r(0, 0) - r(1, 1)).sqrt() * 2.0; // 4z
        Quaternion::new(
            (r(1, 0) - r(0, 1)) / s,
            (r(0, 2) + r(2, 0)) / s,
            (r(1, 2) + r(2, 1)) / s,
            0.25 * s,
        )
    };

    q.normalize()
}

/// Rotation matrix of a unit quaternion.
pub fn quaternion_to_rotation(q: &Quaternion<f64>) -> Matrix3<f64> {
    Matrix3::from(*q)
}

#[cfg(test)]
fn assert_round_trip(rotation: Matrix3<f64>) {
    use cgmath::AbsDiffEq;
    let q = rotation_to_quaternion(&rotation);
    assert!(
        (q.magnitude() - 1.0).abs() < 1e-9,
        "quaternion {:?} is not unit length",
        q
    );
    let back = quaternion_to_rotation(&q);
    assert!(
        back.abs_diff_eq(&rotation, 1e-9),
        "{:?} round tripped to {:?}",
        rotation,
        back
    );
}

#[test]
fn test_identity() {
    let q = rotation_to_quaternion(&Matrix3::identity());
    assert_eq!(q, Quaternion::new(1.0, 0.0, 0.0, 0.0));
}

#[test]
fn test_half_turns() {
    // 180 degrees about x, y, z. The trace is -1 so the w branch would lose all precision.
    let x = rotation_to_quaternion(&Matrix3::from_diagonal(cgmath::Vector3::new(1., -1., -1.)));
    assert!((x.v.x.abs() - 1.0).abs() < 1e-12);
    assert!(x.s.abs() < 1e-12);
    assert_round_trip(Matrix3::from_diagonal(cgmath::Vector3::new(1., -1., -1.)));
    assert_round_trip(Matrix3::from_diagonal(cgmath::Vector3::new(-1., 1., -1.)));
    assert_round_trip(Matrix3::from_diagonal(cgmath::Vector3::new(-1., -1., 1.)));
}

#[test]
fn test_quarter_turn_z() {
    let q = rotation_to_quaternion(&Matrix3::from_angle_z(cgmath::Deg(90.0)));
    let h = std::f64::consts::FRAC_1_SQRT_2;
    assert!((q.s - h).abs() < 1e-12);
    assert!((q.v.z - h).abs() < 1e-12);
    assert!(q.v.x.abs() < 1e-12 && q.v.y.abs() < 1e-12);
}

#[test]
fn test_near_half_turn() {
    let axis = cgmath::Vector3::new(1.0, 2.0, -0.5).normalize();
    for eps in [1e-3, 1e-6, 1e-9, 0.0].iter() {
        assert_round_trip(Matrix3::from_axis_angle(
            axis,
            cgmath::Rad(std::f64::consts::PI - eps),
        ));
    }
}

#[test]
fn test_random_rotations() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..1000 {
        let axis = cgmath::Vector3::new(
            rng.gen_range(-1.0, 1.0),
            rng.gen_range(-1.0, 1.0),
            rng.gen_range(-1.0, 1.0),
        );
        if axis.magnitude() < 1e-3 {
            continue;
        }
        let angle = rng.gen_range(0.0, std::f64::consts::PI);
        assert_round_trip(Matrix3::from_axis_angle(axis.normalize(), cgmath::Rad(angle)));
    }
}
