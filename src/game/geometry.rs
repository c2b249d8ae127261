//! Geometry helpers shared by hit detection, projectiles and the arena bound
//!
//! The world is y-up; "2D" always means the x/z ground plane.

use glam::{Vec2, Vec3};

/// Below this squared length a segment is treated as a point
const DEGENERATE_SEGMENT_SQ: f32 = 1e-8;

/// Project a position onto the ground plane
#[inline]
pub fn ground(v: Vec3) -> Vec2 {
    Vec2::new(v.x, v.z)
}

/// Euclidean distance ignoring the vertical axis
#[inline]
pub fn distance_2d(a: Vec3, b: Vec3) -> f32 {
    ground(a).distance(ground(b))
}

/// Distance of a position from the arena centre (the origin)
#[inline]
pub fn distance_from_center(p: Vec3) -> f32 {
    ground(p).length()
}

/// Unit forward vector on the ground plane for a facing angle (radians).
/// Angle 0 faces +z, positive angles turn toward +x.
#[inline]
pub fn facing_vector(angle: f32) -> Vec3 {
    Vec3::new(angle.sin(), 0.0, angle.cos())
}

/// Horizontal unit direction from `from` toward `to`, or None when they overlap
pub fn direction_2d(from: Vec3, to: Vec3) -> Option<Vec3> {
    Vec3::new(to.x - from.x, 0.0, to.z - from.z).try_normalize()
}

/// Whether the closest point of segment `[start, end]` lies within `radius` of `center`.
///
/// The centre-relative vector is projected onto the segment, the parameter is
/// clamped to `[0, 1]` and the closest point compared against `radius²`. A
/// zero-length segment degenerates to a point test.
pub fn segment_intersects_sphere(start: Vec3, end: Vec3, center: Vec3, radius: f32) -> bool {
    let seg = end - start;
    let len_sq = seg.length_squared();
    let closest = if len_sq <= DEGENERATE_SEGMENT_SQ {
        start
    } else {
        let t = ((center - start).dot(seg) / len_sq).clamp(0.0, 1.0);
        start + seg * t
    };
    closest.distance_squared(center) <= radius * radius
}

/// Shortest signed angular difference `to - from`, wrapped to `(-π, π]`
pub fn angle_delta(from: f32, to: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let d = (to - from).rem_euclid(TAU);
    if d > PI {
        d - TAU
    } else {
        d
    }
}

/// Interpolate an angle along the shortest arc
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    from + angle_delta(from, to) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    const EPS: f32 = 1e-5;

    #[test]
    fn distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 50.0, 4.0);
        assert!((distance_2d(a, b) - 5.0).abs() < EPS);
    }

    #[test]
    fn facing_zero_points_down_positive_z() {
        let f = facing_vector(0.0);
        assert!((f - Vec3::Z).length() < EPS);
        let f = facing_vector(FRAC_PI_2);
        assert!((f - Vec3::X).length() < EPS);
    }

    #[test]
    fn zero_length_segment_is_point_test() {
        let p = Vec3::new(1.0, 1.0, 1.0);
        assert!(segment_intersects_sphere(p, p, Vec3::new(1.0, 1.0, 1.5), 0.5));
        assert!(!segment_intersects_sphere(p, p, Vec3::new(1.0, 1.0, 1.6), 0.5));
    }

    #[test]
    fn perpendicular_segment_through_sphere() {
        // Segment crosses the x axis at the sphere centre's x
        let start = Vec3::new(2.0, 0.0, -3.0);
        let end = Vec3::new(2.0, 0.0, 3.0);
        assert!(segment_intersects_sphere(start, end, Vec3::new(2.4, 0.0, 0.0), 0.5));
        assert!(!segment_intersects_sphere(start, end, Vec3::new(2.6, 0.0, 0.0), 0.5));
    }

    #[test]
    fn parallel_segment_uses_clamped_endpoint() {
        // Sphere sits on the segment's line but beyond its end
        let start = Vec3::new(0.0, 0.0, 0.0);
        let end = Vec3::new(1.0, 0.0, 0.0);
        assert!(segment_intersects_sphere(start, end, Vec3::new(1.4, 0.0, 0.0), 0.5));
        assert!(!segment_intersects_sphere(start, end, Vec3::new(1.6, 0.0, 0.0), 0.5));
        assert!(!segment_intersects_sphere(start, end, Vec3::new(-0.6, 0.0, 0.0), 0.5));
        // Parallel offset alongside the segment
        assert!(segment_intersects_sphere(start, end, Vec3::new(0.5, 0.5, 0.0), 0.5));
        assert!(!segment_intersects_sphere(start, end, Vec3::new(0.5, 0.51, 0.0), 0.5));
    }

    #[test]
    fn angle_delta_takes_short_way_round() {
        assert!((angle_delta(0.1, -0.1) + 0.2).abs() < EPS);
        assert!((angle_delta(PI - 0.1, -PI + 0.1) - 0.2).abs() < 1e-4);
        let mid = lerp_angle(PI - 0.1, -PI + 0.1, 0.5);
        assert!((mid.rem_euclid(2.0 * PI) - PI).abs() < 1e-4);
    }

    #[test]
    fn direction_of_coincident_points_is_none() {
        let p = Vec3::new(1.0, 0.0, 1.0);
        assert!(direction_2d(p, p + Vec3::Y).is_none());
        assert!(direction_2d(p, Vec3::new(2.0, 0.0, 1.0)).is_some());
    }
}
