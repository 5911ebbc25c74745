//! Reached-within-tolerance predicate.
//!
//! A goal counts as reached when the end effector is within `distance_m` of
//! the goal position and the orientation quaternions satisfy
//! `|q_goal · q_actual| ≥ cos(angle_rad)`.  The absolute value makes `q` and
//! `-q` (the same rotation) compare equal.

use hemi_types::Pose;

/// Acceptance thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Maximum Euclidean distance between goal and actual position, metres.
    pub distance_m: f64,
    /// Maximum angular divergence, radians.
    pub angle_rad: f64,
}

impl Default for Tolerance {
    /// 1 cm and 5°.
    fn default() -> Self {
        Self {
            distance_m: 0.01,
            angle_rad: 5f64.to_radians(),
        }
    }
}

/// Result of comparing a goal with the pose actually reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceCheck {
    pub within: bool,
    /// Euclidean position error, metres.
    pub delta_d: f64,
    /// `|q_goal · q_actual|`; 1.0 means identical orientation.
    pub cos_phi: f64,
}

impl ToleranceCheck {
    /// Angle corresponding to [`cos_phi`][Self::cos_phi], radians.
    pub fn angle_rad(&self) -> f64 {
        self.cos_phi.clamp(-1.0, 1.0).acos()
    }
}

/// Compare `goal` and `actual` against `tolerance`.
pub fn all_close(goal: &Pose, actual: &Pose, tolerance: Tolerance) -> ToleranceCheck {
    let delta_d = goal.position.distance(actual.position);
    let cos_phi = goal.orientation.dot(actual.orientation).abs();
    ToleranceCheck {
        within: delta_d <= tolerance.distance_m && cos_phi >= tolerance.angle_rad.cos(),
        delta_d,
        cos_phi,
    }
}

/// Element-wise comparison of two flat value lists, e.g. joint vectors.
///
/// Lists of different length never match.
pub fn values_close(goal: &[f64], actual: &[f64], tolerance: f64) -> bool {
    goal.len() == actual.len()
        && goal
            .iter()
            .zip(actual)
            .all(|(g, a)| (a - g).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemi_types::{Point, Quaternion};

    fn pose(x: f64, y: f64, z: f64, q: Quaternion) -> Pose {
        Pose::new(Point::new(x, y, z), q)
    }

    fn about_z(deg: f64) -> Quaternion {
        Quaternion::from_axis_angle(Point::new(0.0, 0.0, 1.0), deg.to_radians())
    }

    #[test]
    fn identical_poses_are_within() {
        let p = pose(0.4, 0.1, 0.3, about_z(30.0));
        let check = all_close(&p, &p, Tolerance::default());
        assert!(check.within);
        assert_eq!(check.delta_d, 0.0);
        assert!((check.cos_phi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn position_error_is_compared_to_distance_tolerance() {
        let goal = pose(0.0, 0.0, 0.0, Quaternion::identity());

        let near = pose(0.003, 0.004, 0.0, Quaternion::identity());
        let check = all_close(&goal, &near, Tolerance::default());
        assert!(check.within);
        assert!((check.delta_d - 0.005).abs() < 1e-12);

        let far = pose(0.0, 0.0, 0.02, Quaternion::identity());
        let check = all_close(&goal, &far, Tolerance::default());
        assert!(!check.within);
        assert!((check.delta_d - 0.02).abs() < 1e-12);
    }

    #[test]
    fn orientation_is_compared_through_quaternion_dot_product() {
        let goal = pose(0.0, 0.0, 0.0, Quaternion::identity());

        // A rotation by θ gives |q·q'| = cos(θ/2): 8° stays inside 5°, 12° does not.
        let small = pose(0.0, 0.0, 0.0, about_z(8.0));
        let check = all_close(&goal, &small, Tolerance::default());
        assert!(check.within);
        assert!((check.cos_phi - 4f64.to_radians().cos()).abs() < 1e-12);

        let large = pose(0.0, 0.0, 0.0, about_z(12.0));
        assert!(!all_close(&goal, &large, Tolerance::default()).within);
    }

    #[test]
    fn negated_quaternion_is_the_same_orientation() {
        let q = about_z(40.0);
        let neg = Quaternion::new(-q.x, -q.y, -q.z, -q.w);
        let check = all_close(
            &pose(0.0, 0.0, 0.0, q),
            &pose(0.0, 0.0, 0.0, neg),
            Tolerance::default(),
        );
        assert!(check.within);
        assert!(check.angle_rad() < 1e-6);
    }

    #[test]
    fn both_conditions_are_required() {
        let tolerance = Tolerance {
            distance_m: 0.05,
            angle_rad: 10f64.to_radians(),
        };
        let goal = pose(0.0, 0.0, 0.0, Quaternion::identity());
        let good_pos_bad_rot = pose(0.01, 0.0, 0.0, about_z(90.0));
        let bad_pos_good_rot = pose(0.1, 0.0, 0.0, Quaternion::identity());
        assert!(!all_close(&goal, &good_pos_bad_rot, tolerance).within);
        assert!(!all_close(&goal, &bad_pos_good_rot, tolerance).within);
    }

    #[test]
    fn distance_exactly_at_tolerance_is_within() {
        let goal = pose(0.0, 0.0, 0.0, Quaternion::identity());
        let actual = pose(0.01, 0.0, 0.0, Quaternion::identity());
        let d = goal.position.distance(actual.position);

        let at_limit = Tolerance {
            distance_m: d,
            angle_rad: 0.0,
        };
        let check = all_close(&goal, &actual, at_limit);
        assert_eq!(check.delta_d, d);
        assert!(check.within);

        let just_below = Tolerance {
            distance_m: d * (1.0 - 1e-12),
            angle_rad: 0.0,
        };
        assert!(!all_close(&goal, &actual, just_below).within);
    }

    #[test]
    fn cosine_exactly_at_threshold_is_within() {
        // Identity against itself gives |q·q'| = 1.0 = cos(0) exactly.
        let goal = pose(0.0, 0.0, 0.0, Quaternion::identity());
        let exact = Tolerance {
            distance_m: 0.0,
            angle_rad: 0.0,
        };
        let check = all_close(&goal, &goal, exact);
        assert_eq!(check.cos_phi, exact.angle_rad.cos());
        assert!(check.within);

        let rotated = pose(0.0, 0.0, 0.0, about_z(30.0));
        let c = all_close(&goal, &rotated, exact).cos_phi;
        let just_tighter = Tolerance {
            distance_m: 0.0,
            angle_rad: c.acos() * (1.0 - 1e-9),
        };
        assert!(!all_close(&goal, &rotated, just_tighter).within);
    }

    #[test]
    fn values_close_compares_element_wise() {
        assert!(values_close(&[0.0, 1.0, 2.0], &[0.005, 0.995, 2.0], 0.01));
        assert!(!values_close(&[0.0, 1.0], &[0.0, 1.1], 0.01));
        assert!(!values_close(&[0.0, 1.0], &[0.0], 0.01));
        assert!(values_close(&[], &[], 0.01));
    }
}
