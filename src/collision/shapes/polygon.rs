//! Convex polygon shape.

use glam::Vec2;

use crate::collision::aabb::Aabb;
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::{cross, cross_vs, Rot, Transform};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};

use super::{MassData, RayCastInput, RayCastOutput};

/// A solid convex polygon with counter-clockwise winding.
///
/// The skin radius rounds the corners slightly so resting stacks keep a
/// small gap and the position solver has something to push against.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonShape {
    pub centroid: Vec2,
    pub vertices: Vec<Vec2>,
    /// Outward unit normal of the edge from `vertices[i]` to `vertices[i + 1]`.
    pub normals: Vec<Vec2>,
    pub radius: f32,
}

impl PolygonShape {
    /// Build the convex hull of `points`.
    ///
    /// Points closer than half the linear slop are welded. Fails when fewer
    /// than three hull vertices remain or too many points are supplied.
    pub fn new(points: &[Vec2]) -> PhysicsResult<Self> {
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::TooManyVertices {
                count: points.len(),
                max: MAX_POLYGON_VERTICES,
            });
        }

        let weld_tolerance = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
        let mut ps: Vec<Vec2> = Vec::with_capacity(points.len());
        for &v in points {
            if ps.iter().all(|p| v.distance_squared(*p) >= weld_tolerance) {
                ps.push(v);
            }
        }

        if ps.len() < 3 {
            tracing::warn!(count = ps.len(), "polygon rejected: too few distinct points");
            return Err(PhysicsError::DegeneratePolygon { count: ps.len() });
        }

        let hull = gift_wrap(&ps);
        if hull.len() < 3 {
            tracing::warn!(count = hull.len(), "polygon rejected: collinear points");
            return Err(PhysicsError::DegeneratePolygon { count: hull.len() });
        }

        let vertices: Vec<Vec2> = hull.iter().map(|&i| ps[i]).collect();
        let mut normals = Vec::with_capacity(vertices.len());
        for i in 0..vertices.len() {
            let next = if i + 1 < vertices.len() { i + 1 } else { 0 };
            let edge = vertices[next] - vertices[i];
            if edge.length_squared() <= f32::EPSILON * f32::EPSILON {
                return Err(PhysicsError::DegeneratePolygon {
                    count: vertices.len(),
                });
            }
            normals.push(cross_vs(edge, 1.0).normalize());
        }

        let centroid = compute_centroid(&vertices);
        Ok(Self {
            centroid,
            vertices,
            normals,
            radius: POLYGON_RADIUS,
        })
    }

    /// Axis-aligned box centered on the body origin. Both half-extents must
    /// be positive and finite.
    pub fn new_box(half_width: f32, half_height: f32) -> PhysicsResult<Self> {
        let valid = |h: f32| h.is_finite() && h > 0.0;
        if !valid(half_width) || !valid(half_height) {
            tracing::warn!(half_width, half_height, "box rejected: invalid half-extents");
            return Err(PhysicsError::InvalidHalfExtents {
                half_width,
                half_height,
            });
        }

        Ok(Self {
            centroid: Vec2::ZERO,
            vertices: vec![
                Vec2::new(-half_width, -half_height),
                Vec2::new(half_width, -half_height),
                Vec2::new(half_width, half_height),
                Vec2::new(-half_width, half_height),
            ],
            normals: vec![
                Vec2::new(0.0, -1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(-1.0, 0.0),
            ],
            radius: POLYGON_RADIUS,
        })
    }

    /// Box with its center at `center` and rotated by `angle` in body space.
    pub fn new_oriented_box(
        half_width: f32,
        half_height: f32,
        center: Vec2,
        angle: f32,
    ) -> PhysicsResult<Self> {
        let mut polygon = Self::new_box(half_width, half_height)?;
        let xf = Transform::new(center, angle);
        for v in &mut polygon.vertices {
            *v = xf.transform_point(*v);
        }
        for n in &mut polygon.normals {
            *n = xf.q.apply(*n);
        }
        polygon.centroid = center;
        Ok(polygon)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.vertices.len()
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let mut lower = xf.transform_point(self.vertices[0]);
        let mut upper = lower;
        for &v in &self.vertices[1..] {
            let p = xf.transform_point(v);
            lower = lower.min(p);
            upper = upper.max(p);
        }
        Aabb::new(lower, upper).expanded(self.radius)
    }

    /// Mass, centroid and rotational inertia about the body origin.
    ///
    /// The polygon is split into triangles fanned from its first vertex,
    /// which keeps round-off low for shapes far from the origin.
    pub fn compute_mass(&self, density: f32) -> MassData {
        const INV3: f32 = 1.0 / 3.0;

        let s = self.vertices[0];
        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        for i in 0..self.count() {
            let e1 = self.vertices[i] - s;
            let e2 = if i + 1 < self.count() {
                self.vertices[i + 1] - s
            } else {
                self.vertices[0] - s
            };

            let d = cross(e1, e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += (e1 + e2) * (triangle_area * INV3);

            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (int_x2 + int_y2);
        }

        let mass = density * area;
        if area > f32::EPSILON {
            center /= area;
        }
        let world_center = center + s;
        // Shift from the reference vertex to the body origin.
        let inertia = density * inertia
            + mass * (world_center.length_squared() - center.length_squared());

        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }

    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let local = xf.inv_transform_point(p);
        self.vertices
            .iter()
            .zip(&self.normals)
            .all(|(v, n)| n.dot(local - *v) <= 0.0)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let mut lower = 0.0f32;
        let mut upper = input.max_fraction;
        let mut index = None;

        for (i, (v, n)) in self.vertices.iter().zip(&self.normals).enumerate() {
            // p = p1 + t * d
            // dot(normal, p - v) = 0
            let numerator = n.dot(*v - p1);
            let denominator = n.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // The segment enters this half-space.
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // The segment exits this half-space.
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            normal: xf.q.apply(self.normals[i]),
            fraction: lower,
        })
    }

    /// Rotate the polygon in place about the body origin.
    pub fn rotate(&mut self, q: Rot) {
        for v in &mut self.vertices {
            *v = q.apply(*v);
        }
        for n in &mut self.normals {
            *n = q.apply(*n);
        }
        self.centroid = q.apply(self.centroid);
    }
}

/// Gift-wrapping hull. Returns indices into `ps` in counter-clockwise order.
fn gift_wrap(ps: &[Vec2]) -> Vec<usize> {
    // Start from the rightmost point, lowest on ties.
    let mut i0 = 0;
    let mut x0 = ps[0].x;
    for (i, p) in ps.iter().enumerate().skip(1) {
        if p.x > x0 || (p.x == x0 && p.y < ps[i0].y) {
            i0 = i;
            x0 = p.x;
        }
    }

    let mut hull = Vec::with_capacity(ps.len());
    let mut ih = i0;
    loop {
        if hull.len() > ps.len() {
            // Numerical trouble; bail out rather than loop forever.
            return Vec::new();
        }
        hull.push(ih);

        let mut ie = 0;
        for j in 1..ps.len() {
            if ie == ih {
                ie = j;
                continue;
            }
            let r = ps[ie] - ps[ih];
            let v = ps[j] - ps[ih];
            let c = cross(r, v);
            if c < 0.0 {
                ie = j;
            }
            // Collinear: take the farthest point.
            if c == 0.0 && v.length_squared() > r.length_squared() {
                ie = j;
            }
        }

        ih = ie;
        if ie == i0 {
            break;
        }
    }
    hull
}

fn compute_centroid(vertices: &[Vec2]) -> Vec2 {
    const INV3: f32 = 1.0 / 3.0;

    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    let p_ref = vertices[0];

    for i in 0..vertices.len() {
        let p2 = vertices[i];
        let p3 = if i + 1 < vertices.len() {
            vertices[i + 1]
        } else {
            vertices[0]
        };
        let e1 = p2 - p_ref;
        let e2 = p3 - p_ref;
        let triangle_area = 0.5 * cross(e1, e2);
        area += triangle_area;
        c += (p_ref + p2 + p3) * (triangle_area * INV3);
    }

    if area > f32::EPSILON {
        c / area
    } else {
        p_ref
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_mass() {
        let polygon = PolygonShape::new_box(1.0, 0.5).unwrap();
        let md = polygon.compute_mass(2.0);
        // 2 x 1 box at density 2
        assert!((md.mass - 4.0).abs() < 1e-5);
        assert!(md.center.length() < 1e-6);
        // I = m (w^2 + h^2) / 12
        let expected = 4.0 * (4.0 + 1.0) / 12.0;
        assert!((md.inertia - expected).abs() < 1e-4);
    }

    #[test]
    fn test_hull_orders_ccw_and_drops_interior() {
        let points = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(-1.0, 1.0),
        ];
        let polygon = PolygonShape::new(&points).unwrap();
        assert_eq!(polygon.count(), 4);
        for i in 0..polygon.count() {
            let j = (i + 1) % polygon.count();
            let k = (i + 2) % polygon.count();
            let turn = cross(
                polygon.vertices[j] - polygon.vertices[i],
                polygon.vertices[k] - polygon.vertices[j],
            );
            assert!(turn > 0.0, "hull must be counter-clockwise");
        }
        assert!(polygon.centroid.length() < 1e-5);
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let collinear = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
        ];
        assert!(matches!(
            PolygonShape::new(&collinear),
            Err(PhysicsError::DegeneratePolygon { .. })
        ));

        let welded = [Vec2::ZERO, Vec2::splat(1e-4), Vec2::new(1.0, 0.0)];
        assert!(PolygonShape::new(&welded).is_err());

        let many = [Vec2::ZERO; MAX_POLYGON_VERTICES + 1];
        assert!(matches!(
            PolygonShape::new(&many),
            Err(PhysicsError::TooManyVertices { .. })
        ));
    }

    #[test]
    fn test_box_rejects_invalid_half_extents() {
        for (w, h) in [(-0.5, -0.5), (0.0, 1.0), (1.0, -1e-3), (f32::NAN, 1.0), (1.0, f32::INFINITY)] {
            assert!(
                matches!(PolygonShape::new_box(w, h), Err(PhysicsError::InvalidHalfExtents { .. })),
                "{w} x {h} should be rejected"
            );
        }
        assert!(matches!(
            PolygonShape::new_oriented_box(-1.0, 1.0, Vec2::ZERO, 0.0),
            Err(PhysicsError::InvalidHalfExtents { .. })
        ));
        assert!(PolygonShape::new_box(1e-3, 1e-3).is_ok());
    }

    #[test]
    fn test_oriented_box_normals_follow_rotation() {
        let polygon =
            PolygonShape::new_oriented_box(1.0, 1.0, Vec2::new(2.0, 0.0), std::f32::consts::FRAC_PI_2).unwrap();
        assert!((polygon.centroid - Vec2::new(2.0, 0.0)).length() < 1e-6);
        assert!((polygon.normals[0] - Vec2::new(1.0, 0.0)).length() < 1e-5);
        assert!(polygon.test_point(&Transform::IDENTITY, Vec2::new(2.5, 0.5)));
        assert!(!polygon.test_point(&Transform::IDENTITY, Vec2::ZERO));
    }

    #[test]
    fn test_polygon_ray_cast() {
        let polygon = PolygonShape::new_box(1.0, 1.0).unwrap();
        let xf = Transform::IDENTITY;
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 0.0),
            p2: Vec2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = polygon.ray_cast(&input, &xf).unwrap();
        assert!((hit.fraction - 2.0 / 6.0).abs() < 1e-5);
        assert!((hit.normal - Vec2::new(-1.0, 0.0)).length() < 1e-5);
    }
}
