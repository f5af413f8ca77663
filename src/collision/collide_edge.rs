//! Edge versus circle and edge versus polygon.
//!
//! Edges that are part of a connected surface know their neighbour
//! vertices. Those are used to reject collisions a neighbouring edge will
//! report more accurately, and to restrict the collision normal to the cone
//! between adjacent edge normals so bodies do not catch on internal
//! vertices.

use glam::Vec2;

use crate::collision::manifold::{
    clip_segment_to_line, ClipVertex, ContactFeature, FeatureType, Manifold, ManifoldType,
};
use crate::collision::shapes::{CircleShape, EdgeShape, PolygonShape};
use crate::math::{cross, Transform};
use crate::settings::{ANGULAR_SLOP, MAX_POLYGON_VERTICES};

/// Manifold between an edge (A) and a circle (B).
///
/// A vertex shared with a neighbouring edge belongs to the edge that ends
/// at it. An edge whose `vertex0` is shared therefore never reports a
/// contact at its start vertex, and a circle resting exactly on a shared
/// vertex yields a single contact. A ghost `vertex0` only suppresses the
/// contact when the circle lies over the ghost edge.
pub fn collide_edge_and_circle(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle in the frame of the edge.
    let q = xf_a.inv_transform_point(xf_b.transform_point(circle_b.position));

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;
    if e.length_squared() <= f32::EPSILON * f32::EPSILON {
        return manifold;
    }

    // Barycentric coordinates.
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;

    let mut cf = ContactFeature {
        index_b: 0,
        type_b: FeatureType::Vertex,
        ..Default::default()
    };

    // Region A
    if v <= 0.0 {
        if q.distance_squared(a) > radius * radius {
            return manifold;
        }

        if let Some(a1) = edge_a.vertex0 {
            // The previous edge owns this vertex.
            if edge_a.vertex0_shared {
                return manifold;
            }

            // Is the circle in region AB of the ghost edge?
            let e1 = a - a1;
            let u1 = e1.dot(a - q);
            if u1 > 0.0 {
                return manifold;
            }
        }

        cf.index_a = 0;
        cf.type_a = FeatureType::Vertex;
        manifold.point_count = 1;
        manifold.kind = ManifoldType::Circles;
        manifold.local_point = a;
        manifold.points[0].id = cf;
        manifold.points[0].local_point = circle_b.position;
        return manifold;
    }

    // Region B
    if u <= 0.0 {
        if q.distance_squared(b) > radius * radius {
            return manifold;
        }

        // Is there an edge connected to B?
        if let Some(b2) = edge_a.vertex3 {
            let e2 = b2 - b;
            let v2 = e2.dot(q - b);

            // Is the circle in region AB of the next edge?
            if v2 > 0.0 {
                return manifold;
            }
        }

        cf.index_a = 1;
        cf.type_a = FeatureType::Vertex;
        manifold.point_count = 1;
        manifold.kind = ManifoldType::Circles;
        manifold.local_point = b;
        manifold.points[0].id = cf;
        manifold.points[0].local_point = circle_b.position;
        return manifold;
    }

    // Region AB
    let den = e.length_squared();
    let p = (a * u + b * v) / den;
    if q.distance_squared(p) > radius * radius {
        return manifold;
    }

    let mut n = Vec2::new(-e.y, e.x);
    if n.dot(q - a) < 0.0 {
        n = -n;
    }
    let n = n.normalize();

    cf.index_a = 0;
    cf.type_a = FeatureType::Face;
    manifold.point_count = 1;
    manifold.kind = ManifoldType::FaceA;
    manifold.local_normal = n;
    manifold.local_point = a;
    manifold.points[0].id = cf;
    manifold.points[0].local_point = circle_b.position;
    manifold
}

const MAX_CLIP_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisKind {
    Unknown,
    EdgeA,
    EdgeB,
}

/// Separating axis candidate.
#[derive(Debug, Clone, Copy)]
struct EpAxis {
    kind: AxisKind,
    index: usize,
    separation: f32,
}

/// Polygon B expressed in the frame of edge A.
struct TempPolygon {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
}

/// Reference face used for clipping.
struct ReferenceFace {
    i1: usize,
    i2: usize,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    side_normal1: Vec2,
    side_offset1: f32,
    side_normal2: Vec2,
    side_offset2: f32,
}

/// Edge/polygon collision state for one query.
struct EpCollider {
    polygon_b: TempPolygon,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    lower_limit: Vec2,
    upper_limit: Vec2,
    radius: f32,
    front: bool,
}

/// Manifold between an edge (A) and a polygon (B).
pub fn collide_edge_and_polygon(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    polygon_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let xf = xf_a.mul_t(xf_b);
    let centroid_b = xf.transform_point(polygon_b.centroid);

    let v0 = edge_a.vertex0;
    let v1 = edge_a.vertex1;
    let v2 = edge_a.vertex2;
    let v3 = edge_a.vertex3;

    let edge1 = (v2 - v1).normalize_or_zero();
    if edge1 == Vec2::ZERO {
        return Manifold::default();
    }
    let normal1 = Vec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    // Neighbour edges: normal, offset of B's centroid, convexity.
    let prev = v0.and_then(|v0| {
        let edge0 = (v1 - v0).normalize_or_zero();
        (edge0 != Vec2::ZERO).then(|| {
            let normal0 = Vec2::new(edge0.y, -edge0.x);
            (normal0, normal0.dot(centroid_b - v0), cross(edge0, edge1) >= 0.0)
        })
    });
    let next = v3.and_then(|v3| {
        let edge2 = (v3 - v2).normalize_or_zero();
        (edge2 != Vec2::ZERO).then(|| {
            let normal2 = Vec2::new(edge2.y, -edge2.x);
            (normal2, normal2.dot(centroid_b - v2), cross(edge1, edge2) > 0.0)
        })
    });

    // Determine front or back collision and the normal limits.
    let (front, normal, lower_limit, upper_limit) = match (prev, next) {
        (Some((normal0, offset0, convex1)), Some((normal2, offset2, convex2))) => {
            if convex1 && convex2 {
                let front = offset0 >= 0.0 || offset1 >= 0.0 || offset2 >= 0.0;
                if front {
                    (true, normal1, normal0, normal2)
                } else {
                    (false, -normal1, -normal1, -normal1)
                }
            } else if convex1 {
                let front = offset0 >= 0.0 || (offset1 >= 0.0 && offset2 >= 0.0);
                if front {
                    (true, normal1, normal0, normal1)
                } else {
                    (false, -normal1, -normal2, -normal1)
                }
            } else if convex2 {
                let front = offset2 >= 0.0 || (offset0 >= 0.0 && offset1 >= 0.0);
                if front {
                    (true, normal1, normal1, normal2)
                } else {
                    (false, -normal1, -normal1, -normal0)
                }
            } else {
                let front = offset0 >= 0.0 && offset1 >= 0.0 && offset2 >= 0.0;
                if front {
                    (true, normal1, normal1, normal1)
                } else {
                    (false, -normal1, -normal2, -normal0)
                }
            }
        }
        (Some((normal0, offset0, convex1)), None) => {
            if convex1 {
                let front = offset0 >= 0.0 || offset1 >= 0.0;
                if front {
                    (true, normal1, normal0, -normal1)
                } else {
                    (false, -normal1, normal1, -normal1)
                }
            } else {
                let front = offset0 >= 0.0 && offset1 >= 0.0;
                if front {
                    (true, normal1, normal1, -normal1)
                } else {
                    (false, -normal1, normal1, -normal0)
                }
            }
        }
        (None, Some((normal2, offset2, convex2))) => {
            if convex2 {
                let front = offset1 >= 0.0 || offset2 >= 0.0;
                if front {
                    (true, normal1, -normal1, normal2)
                } else {
                    (false, -normal1, -normal1, normal1)
                }
            } else {
                let front = offset1 >= 0.0 && offset2 >= 0.0;
                if front {
                    (true, normal1, -normal1, normal1)
                } else {
                    (false, -normal1, -normal2, normal1)
                }
            }
        }
        (None, None) => {
            if offset1 >= 0.0 {
                (true, normal1, -normal1, -normal1)
            } else {
                (false, -normal1, normal1, normal1)
            }
        }
    };

    // Polygon B in the frame of A.
    let mut temp = TempPolygon {
        vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        count: polygon_b.count().min(MAX_POLYGON_VERTICES),
    };
    for i in 0..temp.count {
        temp.vertices[i] = xf.transform_point(polygon_b.vertices[i]);
        temp.normals[i] = xf.q.apply(polygon_b.normals[i]);
    }

    let collider = EpCollider {
        polygon_b: temp,
        v1,
        v2,
        normal,
        lower_limit,
        upper_limit,
        radius: polygon_b.radius + edge_a.radius,
        front,
    };

    collider.collide(&xf, polygon_b)
}

impl EpCollider {
    fn collide(&self, xf: &Transform, polygon_b: &PolygonShape) -> Manifold {
        let mut manifold = Manifold::default();

        let edge_axis = self.compute_edge_separation();

        // No valid normal: this edge should not collide.
        if edge_axis.kind == AxisKind::Unknown || edge_axis.separation > self.radius {
            return manifold;
        }

        let polygon_axis = self.compute_polygon_separation();
        if polygon_axis.kind != AxisKind::Unknown && polygon_axis.separation > self.radius {
            return manifold;
        }

        // Hysteresis for jitter reduction.
        const K_RELATIVE_TOL: f32 = 0.98;
        const K_ABSOLUTE_TOL: f32 = 0.001;

        let primary_axis = if polygon_axis.kind == AxisKind::Unknown {
            edge_axis
        } else if polygon_axis.separation > K_RELATIVE_TOL * edge_axis.separation + K_ABSOLUTE_TOL
        {
            polygon_axis
        } else {
            edge_axis
        };

        let pb = &self.polygon_b;
        let next = |i: usize| if i + 1 < pb.count { i + 1 } else { 0 };

        let (incident_edge, rf) = if primary_axis.kind == AxisKind::EdgeA {
            manifold.kind = ManifoldType::FaceA;

            // Polygon normal most anti-parallel to the edge normal.
            let mut best_index = 0;
            let mut best_value = self.normal.dot(pb.normals[0]);
            for i in 1..pb.count {
                let value = self.normal.dot(pb.normals[i]);
                if value < best_value {
                    best_value = value;
                    best_index = i;
                }
            }

            let i1 = best_index;
            let i2 = next(i1);
            let feature = |index_b: usize| ContactFeature {
                index_a: 0,
                index_b: index_b as u8,
                type_a: FeatureType::Face,
                type_b: FeatureType::Vertex,
            };
            let incident = [
                ClipVertex {
                    v: pb.vertices[i1],
                    id: feature(i1),
                },
                ClipVertex {
                    v: pb.vertices[i2],
                    id: feature(i2),
                },
            ];

            let rf = if self.front {
                ReferenceFace::new(0, 1, self.v1, self.v2, self.normal)
            } else {
                ReferenceFace::new(1, 0, self.v2, self.v1, self.normal)
            };
            (incident, rf)
        } else {
            manifold.kind = ManifoldType::FaceB;

            let feature = ContactFeature {
                index_a: 0,
                index_b: primary_axis.index as u8,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            };
            let incident = [
                ClipVertex {
                    v: self.v1,
                    id: feature,
                },
                ClipVertex {
                    v: self.v2,
                    id: feature,
                },
            ];

            let i1 = primary_axis.index;
            let i2 = next(i1);
            let rf = ReferenceFace::new(i1, i2, pb.vertices[i1], pb.vertices[i2], pb.normals[i1]);
            (incident, rf)
        };

        // Clip incident edge against the reference face side planes.
        let (clip_points1, count) =
            clip_segment_to_line(&incident_edge, rf.side_normal1, rf.side_offset1, rf.i1);
        if count < MAX_CLIP_POINTS {
            return Manifold::default();
        }

        let (clip_points2, count) =
            clip_segment_to_line(&clip_points1, rf.side_normal2, rf.side_offset2, rf.i2);
        if count < MAX_CLIP_POINTS {
            return Manifold::default();
        }

        // Local geometry of the reference face.
        if primary_axis.kind == AxisKind::EdgeA {
            manifold.local_normal = rf.normal;
            manifold.local_point = rf.v1;
        } else {
            manifold.local_normal = polygon_b.normals[rf.i1];
            manifold.local_point = polygon_b.vertices[rf.i1];
        }

        let mut point_count = 0;
        for cv in &clip_points2 {
            let separation = rf.normal.dot(cv.v - rf.v1);
            if separation <= self.radius {
                let cp = &mut manifold.points[point_count];
                if primary_axis.kind == AxisKind::EdgeA {
                    cp.local_point = xf.inv_transform_point(cv.v);
                    cp.id = cv.id;
                } else {
                    cp.local_point = cv.v;
                    cp.id = cv.id.flipped();
                }
                point_count += 1;
            }
        }
        manifold.point_count = point_count;

        manifold
    }

    fn compute_edge_separation(&self) -> EpAxis {
        let pb = &self.polygon_b;
        let separation = pb.vertices[..pb.count]
            .iter()
            .map(|v| self.normal.dot(*v - self.v1))
            .fold(f32::MAX, f32::min);

        EpAxis {
            kind: AxisKind::EdgeA,
            index: if self.front { 0 } else { 1 },
            separation,
        }
    }

    fn compute_polygon_separation(&self) -> EpAxis {
        let mut axis = EpAxis {
            kind: AxisKind::Unknown,
            index: 0,
            separation: f32::MIN,
        };

        let perp = Vec2::new(-self.normal.y, self.normal.x);
        let pb = &self.polygon_b;

        for i in 0..pb.count {
            let n = -pb.normals[i];

            let s1 = n.dot(pb.vertices[i] - self.v1);
            let s2 = n.dot(pb.vertices[i] - self.v2);
            let s = s1.min(s2);

            if s > self.radius {
                // No collision.
                return EpAxis {
                    kind: AxisKind::EdgeB,
                    index: i,
                    separation: s,
                };
            }

            // Adjacency: skip normals outside the admissible cone.
            if n.dot(perp) >= 0.0 {
                if (n - self.upper_limit).dot(self.normal) < -ANGULAR_SLOP {
                    continue;
                }
            } else if (n - self.lower_limit).dot(self.normal) < -ANGULAR_SLOP {
                continue;
            }

            if s > axis.separation {
                axis = EpAxis {
                    kind: AxisKind::EdgeB,
                    index: i,
                    separation: s,
                };
            }
        }

        axis
    }
}

impl ReferenceFace {
    fn new(i1: usize, i2: usize, v1: Vec2, v2: Vec2, normal: Vec2) -> Self {
        let side_normal1 = Vec2::new(normal.y, -normal.x);
        let side_normal2 = -side_normal1;
        Self {
            i1,
            i2,
            v1,
            v2,
            normal,
            side_normal1,
            side_offset1: side_normal1.dot(v1),
            side_normal2,
            side_offset2: side_normal2.dot(v2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::WorldManifold;
    use crate::collision::shapes::ChainShape;

    #[test]
    fn test_circle_on_edge_face() {
        let edge = EdgeShape::new(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0));
        let ball = CircleShape::new(0.5).unwrap();
        let xf_b = Transform::from_translation(Vec2::new(0.5, 0.45));

        let manifold = collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &xf_b);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.kind, ManifoldType::FaceA);
        assert!((manifold.local_normal - Vec2::Y).length() < 1e-6);
    }

    #[test]
    fn test_circle_at_shared_vertex_single_contact() {
        // Two connected edges meeting at the origin.
        let chain = ChainShape::new_chain(&[
            Vec2::new(-2.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
        ])
        .unwrap();
        let ball = CircleShape::new(0.5).unwrap();

        for y in [0.0, 0.3, 0.45] {
            let xf_b = Transform::from_translation(Vec2::new(0.0, y));
            let total: usize = (0..chain.child_count())
                .map(|i| {
                    collide_edge_and_circle(&chain.child_edge(i), &Transform::IDENTITY, &ball, &xf_b)
                        .point_count
                })
                .sum();
            assert_eq!(total, 1, "circle at height {y}");
        }
    }

    #[test]
    fn test_circle_near_shared_vertex_below_corner() {
        // A convex corner: the circle sits beyond the shared vertex.
        let chain = ChainShape::new_chain(&[
            Vec2::new(-2.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, -2.0),
        ])
        .unwrap();
        let ball = CircleShape::new(0.5).unwrap();
        let xf_b = Transform::from_translation(Vec2::new(0.3, 0.3));

        let manifolds: Vec<Manifold> = (0..chain.child_count())
            .map(|i| collide_edge_and_circle(&chain.child_edge(i), &Transform::IDENTITY, &ball, &xf_b))
            .collect();
        let total: usize = manifolds.iter().map(|m| m.point_count).sum();
        assert_eq!(total, 1);
        let m = manifolds.iter().find(|m| m.point_count == 1).unwrap();
        assert_eq!(m.kind, ManifoldType::Circles);
        assert_eq!(m.local_point, Vec2::ZERO);
    }

    #[test]
    fn test_ghost_start_vertex_still_collides() {
        let chain = ChainShape::new_chain(&[Vec2::ZERO, Vec2::new(4.0, 0.0)])
            .unwrap()
            .with_prev_vertex(Vec2::new(-1.0, -1.0));
        let edge = chain.child_edge(0);
        let ball = CircleShape::new(0.5).unwrap();

        for p in [Vec2::new(-0.2, 0.3), Vec2::new(0.0, 0.4)] {
            let xf_b = Transform::from_translation(p);
            let m = collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &xf_b);
            assert_eq!(m.point_count, 1, "circle at {p}");
            assert_eq!(m.kind, ManifoldType::Circles);
            assert_eq!(m.local_point, Vec2::ZERO);
        }
    }

    #[test]
    fn test_ghost_start_vertex_defers_to_ghost_edge() {
        // The ghost edge continues the surface to the left; a circle over it
        // is handled by whatever shape lies there.
        let edge = EdgeShape::new(Vec2::ZERO, Vec2::new(4.0, 0.0))
            .with_adjacency(Some(Vec2::new(-2.0, 0.0)), None);
        let ball = CircleShape::new(0.5).unwrap();
        let xf_b = Transform::from_translation(Vec2::new(-0.2, 0.3));
        let m = collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &xf_b);
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_free_edge_reports_both_ends() {
        let edge = EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let ball = CircleShape::new(0.5).unwrap();

        let left = Transform::from_translation(Vec2::new(-1.3, 0.1));
        let m = collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &left);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.points[0].id.index_a, 0);

        let right = Transform::from_translation(Vec2::new(1.3, 0.1));
        let m = collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &right);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.points[0].id.index_a, 1);
    }

    #[test]
    fn test_box_resting_on_edge() {
        let edge = EdgeShape::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let block = PolygonShape::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::from_translation(Vec2::new(0.0, 0.49));

        let manifold = collide_edge_and_polygon(&edge, &Transform::IDENTITY, &block, &xf_b);
        assert_eq!(manifold.point_count, 2);
        assert_eq!(manifold.kind, ManifoldType::FaceA);
        assert!((manifold.local_normal - Vec2::Y).length() < 1e-6);

        let wm = WorldManifold::new(
            &manifold,
            &Transform::IDENTITY,
            edge.radius,
            &xf_b,
            block.radius,
        );
        for s in &wm.separations[..2] {
            assert!((*s - (-0.01 - edge.radius - block.radius)).abs() < 1e-5);
        }
    }

    #[test]
    fn test_box_below_one_sided_surface_sees_back_face() {
        let edge = EdgeShape::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let block = PolygonShape::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::from_translation(Vec2::new(0.0, -0.49));

        let manifold = collide_edge_and_polygon(&edge, &Transform::IDENTITY, &block, &xf_b);
        assert_eq!(manifold.point_count, 2);
        let wm = WorldManifold::new(
            &manifold,
            &Transform::IDENTITY,
            edge.radius,
            &xf_b,
            block.radius,
        );
        assert!((wm.normal + Vec2::Y).length() < 1e-5);
    }

    #[test]
    fn test_box_crossing_chain_seam_keeps_up_normal() {
        // Flat ground made of two edges; the box straddles the seam and sinks
        // a little into both.
        let chain = ChainShape::new_chain(&[
            Vec2::new(-4.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
        ])
        .unwrap();
        let block = PolygonShape::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::from_translation(Vec2::new(0.2, 0.49));

        for i in 0..chain.child_count() {
            let manifold =
                collide_edge_and_polygon(&chain.child_edge(i), &Transform::IDENTITY, &block, &xf_b);
            assert!(manifold.point_count > 0, "child {i}");
            let wm = WorldManifold::new(
                &manifold,
                &Transform::IDENTITY,
                chain.radius,
                &xf_b,
                block.radius,
            );
            assert!((wm.normal - Vec2::Y).length() < 1e-5, "child {i}: {:?}", wm.normal);
        }
    }
}
