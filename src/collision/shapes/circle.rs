//! Solid circle shape.

use glam::Vec2;

use crate::collision::aabb::Aabb;
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::Transform;

use super::{MassData, RayCastInput, RayCastOutput};

/// A solid circle centered at `position` in body-local space.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleShape {
    pub position: Vec2,
    pub radius: f32,
}

impl CircleShape {
    /// Create a circle at the body origin.
    pub fn new(radius: f32) -> PhysicsResult<Self> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(PhysicsError::InvalidRadius(radius));
        }
        Ok(Self {
            position: Vec2::ZERO,
            radius,
        })
    }

    /// Offset the circle from the body origin.
    #[must_use]
    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let p = xf.transform_point(self.position);
        let r = Vec2::splat(self.radius);
        Aabb::new(p - r, p + r)
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        let mass = density * std::f32::consts::PI * self.radius * self.radius;
        MassData {
            mass,
            center: self.position,
            // Inertia about the body origin.
            inertia: mass * (0.5 * self.radius * self.radius + self.position.length_squared()),
        }
    }

    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let center = xf.transform_point(self.position);
        (p - center).length_squared() <= self.radius * self.radius
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let position = xf.transform_point(self.position);
        let s = input.p1 - position;
        let b = s.length_squared() - self.radius * self.radius;

        // Solve quadratic equation.
        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.length_squared();
        let sigma = c * c - rr * b;

        if sigma < 0.0 || rr < f32::EPSILON {
            return None;
        }

        // Find the point of intersection of the line with the circle.
        let a = -(c + sigma.sqrt());
        if (0.0..=input.max_fraction * rr).contains(&a) {
            let fraction = a / rr;
            Some(RayCastOutput {
                normal: (s + r * fraction).normalize_or_zero(),
                fraction,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_radius() {
        assert_eq!(
            CircleShape::new(0.0),
            Err(PhysicsError::InvalidRadius(0.0))
        );
        assert!(CircleShape::new(-1.0).is_err());
        assert!(CircleShape::new(f32::NAN).is_err());
        assert!(CircleShape::new(0.5).is_ok());
    }

    #[test]
    fn test_circle_mass() {
        let circle = CircleShape::new(2.0).unwrap();
        let md = circle.compute_mass(1.0);
        let expected = std::f32::consts::PI * 4.0;
        assert!((md.mass - expected).abs() < 1e-4);
        assert!((md.inertia - expected * 2.0).abs() < 1e-3);
        assert_eq!(md.center, Vec2::ZERO);
    }

    #[test]
    fn test_circle_ray_cast() {
        let circle = CircleShape::new(1.0).unwrap();
        let xf = Transform::from_translation(Vec2::new(5.0, 0.0));
        let input = RayCastInput {
            p1: Vec2::ZERO,
            p2: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = circle.ray_cast(&input, &xf).unwrap();
        assert!((hit.fraction - 0.4).abs() < 1e-5);
        assert!((hit.normal - Vec2::new(-1.0, 0.0)).length() < 1e-5);

        let miss = RayCastInput {
            p1: Vec2::new(0.0, 2.0),
            p2: Vec2::new(10.0, 2.0),
            max_fraction: 1.0,
        };
        assert!(circle.ray_cast(&miss, &xf).is_none());
    }
}
