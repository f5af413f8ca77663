//! Collision detection: shapes, closest points, contact manifolds and time
//! of impact.
//!
//! # Pipeline
//!
//! 1. Broadphase pairs fat AABBs ([`broadphase`])
//! 2. Narrowphase builds manifolds per shape pair ([`collide_circle`],
//!    [`collide_polygon`], [`collide_edge`])
//! 3. Fast bodies are swept with [`time_of_impact`], which is built on the
//!    GJK [`distance`] query

pub mod aabb;
pub mod broadphase;
pub mod collide_circle;
pub mod collide_edge;
pub mod collide_polygon;
pub mod distance;
pub mod manifold;
pub mod shapes;
pub mod time_of_impact;

pub use aabb::Aabb;
pub use broadphase::{BroadPhase, ProxyId};
pub use collide_circle::{collide_circles, collide_polygon_and_circle};
pub use collide_edge::{collide_edge_and_circle, collide_edge_and_polygon};
pub use collide_polygon::collide_polygons;
pub use distance::{distance, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};
pub use manifold::{
    point_states, ContactFeature, FeatureType, Manifold, ManifoldPoint, ManifoldType, PointState,
    WorldManifold,
};
pub use shapes::{
    ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, RayCastInput, RayCastOutput,
    Shape, ShapeType,
};
pub use time_of_impact::{time_of_impact, ToiInput, ToiOutput, ToiOutputState};

use crate::math::Transform;

/// Whether two shape children overlap, including their skin radii.
pub fn test_overlap(
    shape_a: &Shape,
    child_a: usize,
    xf_a: &Transform,
    shape_b: &Shape,
    child_b: usize,
    xf_b: &Transform,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::new(shape_a, child_a),
        proxy_b: DistanceProxy::new(shape_b, child_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let output = distance(&mut SimplexCache::default(), &input);
    output.distance < 10.0 * f32::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_overlap_includes_radius() {
        let circle = Shape::Circle(CircleShape::new(0.5).unwrap());
        let block = Shape::Polygon(PolygonShape::new_box(0.5, 0.5).unwrap());

        let touching = Transform::from_translation(Vec2::new(0.95, 0.0));
        assert!(test_overlap(&circle, 0, &Transform::IDENTITY, &block, 0, &touching));

        let apart = Transform::from_translation(Vec2::new(1.2, 0.0));
        assert!(!test_overlap(&circle, 0, &Transform::IDENTITY, &block, 0, &apart));
    }
}
