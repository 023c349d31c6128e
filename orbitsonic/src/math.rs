//! Math types and the polar position model for OrbitSonic
//!
//! Sounds orbit the listener on a horizontal circle: `angle` sweeps around the
//! vertical axis, `radius` is the circle's size and `height` lifts the circle
//! along +Y. Positions produced here are listener-relative offsets.

use std::f32::consts::{PI, TAU};

pub use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Wraps an angle in radians into `(-PI, PI]`.
///
/// Non-finite input has no meaningful direction and maps to `0.0`.
pub fn normalize_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }

    // rem_euclid lands in [0, TAU]; the upper edge can appear through rounding
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Converts an orbit position into a listener-relative Cartesian offset.
///
/// `x = radius * cos(angle)`, `y = height`, `z = radius * sin(angle)`.
pub fn polar_to_cartesian(angle: f32, radius: f32, height: f32) -> Vec3 {
    let angle = normalize_angle(angle);
    Vec3::new(radius * angle.cos(), height, radius * angle.sin())
}

/// Inverse of [`polar_to_cartesian`], returning `(angle, radius, height)`.
pub fn cartesian_to_polar(position: Vec3) -> (f32, f32, f32) {
    let radius = position.x.hypot(position.z);
    let angle = if radius > 0.0 {
        normalize_angle(position.z.atan2(position.x))
    } else {
        0.0
    };
    (angle, radius, position.y)
}

/// Angles of the left and right voices of a stereo sound centered on `center`.
pub fn stereo_angles(center: f32, separation: f32) -> (f32, f32) {
    let half = separation / 2.0;
    (normalize_angle(center - half), normalize_angle(center + half))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn angular_distance(a: f32, b: f32) -> f32 {
        normalize_angle(a - b).abs()
    }

    #[test]
    fn normalize_angle_stays_in_half_open_range() {
        for step in -40..=40 {
            let angle = step as f32 * 0.7;
            let wrapped = normalize_angle(angle);
            assert!(wrapped > -PI - EPS && wrapped <= PI + EPS, "{angle} -> {wrapped}");
            assert!((wrapped.cos() - angle.cos()).abs() < 1e-3);
            assert!((wrapped.sin() - angle.sin()).abs() < 1e-3);
        }
    }

    #[test]
    fn normalize_angle_boundaries() {
        assert!((normalize_angle(PI) - PI).abs() < EPS);
        assert!((normalize_angle(-PI) - PI).abs() < EPS);
        assert!((normalize_angle(3.0 * PI).abs() - PI).abs() < 1e-3);
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(f32::NAN), 0.0);
        assert_eq!(normalize_angle(f32::INFINITY), 0.0);
    }

    #[test]
    fn zero_angle_unit_radius_points_along_x() {
        let position = polar_to_cartesian(0.0, 1.0, 0.0);
        assert!((position - Vec3::new(1.0, 0.0, 0.0)).length() < EPS);
    }

    #[test]
    fn height_is_the_vertical_axis() {
        let position = polar_to_cartesian(PI / 2.0, 2.0, 0.5);
        assert!((position - Vec3::new(0.0, 0.5, 2.0)).length() < EPS);
    }

    #[test]
    fn cartesian_round_trips_through_polar() {
        let original = Vec3::new(-1.5, 0.25, 2.0);
        let (angle, radius, height) = cartesian_to_polar(original);
        assert!((polar_to_cartesian(angle, radius, height) - original).length() < EPS);
        assert_eq!(cartesian_to_polar(Vec3::new(0.0, 3.0, 0.0)), (0.0, 0.0, 3.0));
    }

    #[test]
    fn stereo_angles_are_symmetric_about_center() {
        for center_step in -12..=12 {
            let center = center_step as f32 * 0.55;
            for separation in [0.1_f32, PI / 6.0, 1.0, PI / 2.0, 2.5] {
                let (left, right) = stereo_angles(center, separation);
                assert!((angular_distance(center, left) - separation / 2.0).abs() < 1e-3);
                assert!((angular_distance(right, center) - separation / 2.0).abs() < 1e-3);
                assert!((angular_distance(right, left) - separation).abs() < 1e-3);
            }
        }
    }
}
