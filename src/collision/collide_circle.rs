//! Circle versus circle and polygon versus circle.

use crate::collision::manifold::{Manifold, ManifoldType};
use crate::collision::shapes::{CircleShape, PolygonShape};
use crate::math::Transform;

/// Manifold between two circles.
pub fn collide_circles(
    circle_a: &CircleShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.transform_point(circle_a.position);
    let p_b = xf_b.transform_point(circle_b.position);

    let dist_sq = p_a.distance_squared(p_b);
    let radius = circle_a.radius + circle_b.radius;
    if dist_sq > radius * radius {
        return manifold;
    }

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = circle_a.position;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.position;
    manifold
}

/// Manifold between a polygon (A) and a circle (B).
pub fn collide_polygon_and_circle(
    polygon_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle position in the frame of the polygon.
    let c = xf_b.transform_point(circle_b.position);
    let c_local = xf_a.inv_transform_point(c);

    // Find the min separating edge.
    let radius = polygon_a.radius + circle_b.radius;
    let mut normal_index = 0;
    let mut separation = f32::MIN;
    for (i, (v, n)) in polygon_a
        .vertices
        .iter()
        .zip(&polygon_a.normals)
        .enumerate()
    {
        let s = n.dot(c_local - *v);
        if s > radius {
            // Early out.
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let count = polygon_a.count();
    let v1 = polygon_a.vertices[normal_index];
    let v2 = polygon_a.vertices[if normal_index + 1 < count {
        normal_index + 1
    } else {
        0
    }];

    manifold.kind = ManifoldType::FaceA;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.position;

    // Center is inside the polygon.
    if separation < f32::EPSILON {
        manifold.local_normal = polygon_a.normals[normal_index];
        manifold.local_point = 0.5 * (v1 + v2);
        return manifold;
    }

    // Compute barycentric coordinates.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v1).normalize_or_zero();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v2).normalize_or_zero();
        manifold.local_point = v2;
    } else {
        let face_center = 0.5 * (v1 + v2);
        let s = (c_local - face_center).dot(polygon_a.normals[normal_index]);
        if s > radius {
            return Manifold::default();
        }
        manifold.local_normal = polygon_a.normals[normal_index];
        manifold.local_point = face_center;
    }

    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::WorldManifold;
    use glam::Vec2;

    #[test]
    fn test_overlapping_circles_single_point() {
        let circle = CircleShape::new(1.0).unwrap();
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::from_translation(Vec2::new(1.5, 0.0));

        let manifold = collide_circles(&circle, &xf_a, &circle, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.kind, ManifoldType::Circles);

        let wm = WorldManifold::new(&manifold, &xf_a, 1.0, &xf_b, 1.0);
        assert!((wm.normal - Vec2::new(1.0, 0.0)).length() < 1e-6);
        // Penetration depth 0.5.
        assert!((wm.separations[0] + 0.5).abs() < 1e-6);
        assert!((wm.points[0] - Vec2::new(0.75, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_separated_circles_no_points() {
        let circle = CircleShape::new(1.0).unwrap();
        let manifold = collide_circles(
            &circle,
            &Transform::IDENTITY,
            &circle,
            &Transform::from_translation(Vec2::new(2.5, 0.0)),
        );
        assert_eq!(manifold.point_count, 0);
    }

    #[test]
    fn test_circle_on_box_face() {
        let ground = PolygonShape::new_box(5.0, 0.5).unwrap();
        let ball = CircleShape::new(0.5).unwrap();
        let xf_b = Transform::from_translation(Vec2::new(1.0, 0.9));

        let manifold = collide_polygon_and_circle(&ground, &Transform::IDENTITY, &ball, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.kind, ManifoldType::FaceA);
        assert!((manifold.local_normal - Vec2::Y).length() < 1e-6);

        let wm = WorldManifold::new(
            &manifold,
            &Transform::IDENTITY,
            ground.radius,
            &xf_b,
            ball.radius,
        );
        let expected = 0.9 - 0.5 - 0.5 - ground.radius;
        assert!((wm.separations[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_circle_near_box_corner() {
        let block = PolygonShape::new_box(1.0, 1.0).unwrap();
        let ball = CircleShape::new(0.5).unwrap();

        let near = Transform::from_translation(Vec2::new(1.3, 1.3));
        let manifold = collide_polygon_and_circle(&block, &Transform::IDENTITY, &ball, &near);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.local_point, Vec2::new(1.0, 1.0));
        let diagonal = Vec2::new(1.0, 1.0).normalize();
        assert!((manifold.local_normal - diagonal).length() < 1e-5);

        let far = Transform::from_translation(Vec2::new(1.5, 1.5));
        let manifold = collide_polygon_and_circle(&block, &Transform::IDENTITY, &ball, &far);
        assert_eq!(manifold.point_count, 0);
    }
}
