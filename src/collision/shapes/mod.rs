//! Collision shapes in body-local space.
//!
//! Shapes are a closed set, so they are dispatched with a `match` over
//! [`Shape`] rather than through trait objects. Chains are the only shape
//! with more than one child; every other shape has exactly one.

pub mod chain;
pub mod circle;
pub mod edge;
pub mod polygon;

use glam::Vec2;

use crate::collision::aabb::Aabb;
use crate::math::Transform;

pub use chain::ChainShape;
pub use circle::CircleShape;
pub use edge::EdgeShape;
pub use polygon::PolygonShape;

/// Mass properties computed from a shape and a density.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassData {
    pub mass: f32,
    /// Center of mass in body-local coordinates.
    pub center: Vec2,
    /// Rotational inertia about the body origin.
    pub inertia: f32,
}

/// Ray from `p1` to `p1 + max_fraction * (p2 - p1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

/// Hit normal and fraction along the ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}

/// Discriminant of [`Shape`], used for narrowphase dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Circle,
    Polygon,
    Edge,
    Chain,
}

/// Collision geometry attached to a body through a fixture.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle(CircleShape),
    Polygon(PolygonShape),
    Edge(EdgeShape),
    Chain(ChainShape),
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Number of child primitives.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(chain) => chain.child_count(),
            _ => 1,
        }
    }

    /// Skin radius.
    pub fn radius(&self) -> f32 {
        match self {
            Shape::Circle(s) => s.radius,
            Shape::Polygon(s) => s.radius,
            Shape::Edge(s) => s.radius,
            Shape::Chain(s) => s.radius,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child: usize) -> Aabb {
        match self {
            Shape::Circle(s) => s.compute_aabb(xf),
            Shape::Polygon(s) => s.compute_aabb(xf),
            Shape::Edge(s) => s.compute_aabb(xf),
            Shape::Chain(s) => s.compute_aabb(xf, child),
        }
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Shape::Circle(s) => s.compute_mass(density),
            Shape::Polygon(s) => s.compute_mass(density),
            Shape::Edge(s) => s.compute_mass(density),
            Shape::Chain(s) => s.compute_mass(density),
        }
    }

    /// Point containment. Edges and chains contain nothing.
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        match self {
            Shape::Circle(s) => s.test_point(xf, p),
            Shape::Polygon(s) => s.test_point(xf, p),
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(s) => s.ray_cast(input, xf),
            Shape::Polygon(s) => s.ray_cast(input, xf),
            Shape::Edge(s) => s.ray_cast(input, xf),
            Shape::Chain(s) => s.ray_cast(input, xf, child),
        }
    }
}

impl From<CircleShape> for Shape {
    fn from(s: CircleShape) -> Self {
        Shape::Circle(s)
    }
}

impl From<PolygonShape> for Shape {
    fn from(s: PolygonShape) -> Self {
        Shape::Polygon(s)
    }
}

impl From<EdgeShape> for Shape {
    fn from(s: EdgeShape) -> Self {
        Shape::Edge(s)
    }
}

impl From<ChainShape> for Shape {
    fn from(s: ChainShape) -> Self {
        Shape::Chain(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_dispatch() {
        let circle: Shape = CircleShape::new(0.5).unwrap().into();
        assert_eq!(circle.shape_type(), ShapeType::Circle);
        assert_eq!(circle.child_count(), 1);
        assert!(circle.test_point(&Transform::IDENTITY, Vec2::new(0.2, 0.2)));

        let chain: Shape = ChainShape::new_chain(&[Vec2::ZERO, Vec2::X, Vec2::new(2.0, 1.0)])
            .unwrap()
            .into();
        assert_eq!(chain.child_count(), 2);
        assert!(!chain.test_point(&Transform::IDENTITY, Vec2::X));
        let aabb = chain.compute_aabb(&Transform::IDENTITY, 1);
        assert!(aabb.min.x < 1.0 && aabb.max.y > 1.0);
    }
}
