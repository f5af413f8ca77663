//! Polygon versus polygon by reference-face clipping.
//!
//! Find the edge normal of max separation on A and on B. Pick the
//! reference face from the larger separation, preferring A unless B is
//! better by a small tolerance, so the choice does not flip between frames.
//! Find the incident edge on the other polygon and clip it against the side
//! planes of the reference face.

use crate::collision::manifold::{
    clip_segment_to_line, ClipVertex, ContactFeature, FeatureType, Manifold, ManifoldType,
};
use crate::collision::shapes::PolygonShape;
use crate::math::{cross_vs, Transform};
use crate::settings::LINEAR_SLOP;

/// Separation of `poly2` along the best edge normal of `poly1`.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (usize, f32) {
    // Work in the frame of poly2.
    let xf = xf2.mul_t(xf1);

    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for (i, (v1, n1)) in poly1.vertices.iter().zip(&poly1.normals).enumerate() {
        let n = xf.q.apply(*n1);
        let v1 = xf.transform_point(*v1);

        // Deepest point of poly2 against this edge.
        let si = poly2
            .vertices
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }

    (best_index, max_separation)
}

/// The edge of `poly2` most anti-parallel to reference edge `edge1`.
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    // Reference normal in the frame of poly2.
    let normal1 = xf2.q.apply_inv(xf1.q.apply(poly1.normals[edge1]));

    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n2) in poly2.normals.iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = if i1 + 1 < poly2.count() { i1 + 1 } else { 0 };

    let feature = |index_b: usize| ContactFeature {
        index_a: edge1 as u8,
        index_b: index_b as u8,
        type_a: FeatureType::Face,
        type_b: FeatureType::Vertex,
    };

    [
        ClipVertex {
            v: xf2.transform_point(poly2.vertices[i1]),
            id: feature(i1),
        },
        ClipVertex {
            v: xf2.transform_point(poly2.vertices[i2]),
            id: feature(i2),
        },
    ]
}

/// Manifold between two convex polygons.
pub fn collide_polygons(
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    const K_TOL: f32 = 0.1 * LINEAR_SLOP;

    let (poly1, xf1, poly2, xf2, edge1, flip) = if separation_b > separation_a + K_TOL {
        manifold.kind = ManifoldType::FaceB;
        (poly_b, xf_b, poly_a, xf_a, edge_b, true)
    } else {
        manifold.kind = ManifoldType::FaceA;
        (poly_a, xf_a, poly_b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let iv1 = edge1;
    let iv2 = if edge1 + 1 < poly1.count() { edge1 + 1 } else { 0 };

    let v11 = poly1.vertices[iv1];
    let v12 = poly1.vertices[iv2];

    let local_tangent = (v12 - v11).normalize_or_zero();
    if local_tangent == glam::Vec2::ZERO {
        return Manifold::default();
    }
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = xf1.q.apply(local_tangent);
    let normal = cross_vs(tangent, 1.0);

    let v11 = xf1.transform_point(v11);
    let v12 = xf1.transform_point(v12);

    // Face offset.
    let front_offset = normal.dot(v11);

    // Side offsets, extended by the polygon skins.
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    // Clip incident edge against the extruded reference edge side planes.
    let (clip_points1, count) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if count < 2 {
        return Manifold::default();
    }

    let (clip_points2, count) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2);
    if count < 2 {
        return Manifold::default();
    }

    // Incident points inside the reference face become contacts.
    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for cv in &clip_points2 {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= total_radius {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.inv_transform_point(cv.v);
            cp.id = if flip { cv.id.flipped() } else { cv.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;

    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::WorldManifold;
    use glam::Vec2;

    #[test]
    fn test_stacked_boxes_two_points() {
        let ground = PolygonShape::new_box(5.0, 0.5).unwrap();
        let block = PolygonShape::new_box(0.5, 0.5).unwrap();
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::from_translation(Vec2::new(0.0, 0.98));

        let manifold = collide_polygons(&ground, &xf_a, &block, &xf_b);
        assert_eq!(manifold.point_count, 2);
        assert_eq!(manifold.kind, ManifoldType::FaceA);
        assert!((manifold.local_normal - Vec2::Y).length() < 1e-6);

        let wm = WorldManifold::new(&manifold, &xf_a, ground.radius, &xf_b, block.radius);
        for s in &wm.separations[..2] {
            assert!((*s - (-0.02 - 2.0 * ground.radius)).abs() < 1e-5);
        }
    }

    #[test]
    fn test_equal_separation_prefers_face_a() {
        // Identical boxes face to face: both separations are equal.
        let block = PolygonShape::new_box(1.0, 1.0).unwrap();
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::from_translation(Vec2::new(0.0, 1.99));

        let manifold = collide_polygons(&block, &xf_a, &block, &xf_b);
        assert_eq!(manifold.kind, ManifoldType::FaceA);
        assert_eq!(manifold.point_count, 2);
        assert!((manifold.local_normal - Vec2::Y).length() < 1e-6);

        // Swapping the pair keeps A as the reference.
        let swapped = collide_polygons(&block, &xf_b, &block, &xf_a);
        assert_eq!(swapped.kind, ManifoldType::FaceA);
        assert!((swapped.local_normal + Vec2::Y).length() < 1e-6);
    }

    #[test]
    fn test_feature_ids_stable_under_small_motion() {
        let ground = PolygonShape::new_box(5.0, 0.5).unwrap();
        let block = PolygonShape::new_box(0.5, 0.5).unwrap();
        let xf_a = Transform::IDENTITY;

        let m1 = collide_polygons(
            &ground,
            &xf_a,
            &block,
            &Transform::from_translation(Vec2::new(0.0, 0.99)),
        );
        let m2 = collide_polygons(
            &ground,
            &xf_a,
            &block,
            &Transform::new(Vec2::new(0.01, 0.985), 0.01),
        );
        assert_eq!(m1.point_count, 2);
        assert_eq!(m2.point_count, 2);
        for (p1, p2) in m1.points().iter().zip(m2.points()) {
            assert_eq!(p1.id.key(), p2.id.key());
        }
    }

    #[test]
    fn test_reference_face_on_b_flips_ids() {
        // A small box pokes into the bottom face of a large box: B's face
        // separates better, so B is the reference.
        let small = PolygonShape::new_oriented_box(0.5, 0.5, Vec2::ZERO, 0.2).unwrap();
        let large = PolygonShape::new_box(5.0, 0.5).unwrap();
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::from_translation(Vec2::new(0.0, 1.1));

        let manifold = collide_polygons(&small, &xf_a, &large, &xf_b);
        assert_eq!(manifold.kind, ManifoldType::FaceB);
        assert!(manifold.point_count >= 1);
        assert!((manifold.local_normal + Vec2::Y).length() < 1e-6);
        for p in manifold.points() {
            assert_eq!(p.id.type_b, FeatureType::Face);
        }

        let wm = WorldManifold::new(&manifold, &xf_a, small.radius, &xf_b, large.radius);
        assert!((wm.normal - Vec2::Y).length() < 1e-5);
    }

    #[test]
    fn test_separated_polygons_no_points() {
        let block = PolygonShape::new_box(1.0, 1.0).unwrap();
        let manifold = collide_polygons(
            &block,
            &Transform::IDENTITY,
            &block,
            &Transform::from_translation(Vec2::new(2.5, 0.0)),
        );
        assert_eq!(manifold.point_count, 0);
    }
}
