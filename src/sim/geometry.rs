//! World-space shapes shared by the physics adapter, reactions and views

use glam::Vec2;

/// A shape placed in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldShape {
    Circle { center: Vec2, radius: f32 },
    /// Capsule around the segment `a`-`b`
    Segment { a: Vec2, b: Vec2, radius: f32 },
}

/// Closest point on segment `a`-`b` to `p`
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let line = b - a;
    let len_sq = line.length_squared();
    if len_sq < 1e-8 {
        return a; // Degenerate segment
    }
    let t = ((p - a).dot(line) / len_sq).clamp(0.0, 1.0);
    a + line * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_point_clamps_to_ends() {
        let a = Vec2::ZERO;
        let b = Vec2::new(1.0, 0.0);
        assert_eq!(closest_point_on_segment(Vec2::new(-3.0, 1.0), a, b), a);
        assert_eq!(closest_point_on_segment(Vec2::new(4.0, 1.0), a, b), b);
        assert_eq!(
            closest_point_on_segment(Vec2::new(0.5, 1.0), a, b),
            Vec2::new(0.5, 0.0)
        );
    }

    #[test]
    fn test_degenerate_segment() {
        let a = Vec2::new(2.0, 2.0);
        assert_eq!(closest_point_on_segment(Vec2::ZERO, a, a), a);
    }
}
