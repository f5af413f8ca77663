//! Line segment shape with optional adjacency.

use glam::Vec2;

use crate::collision::aabb::Aabb;
use crate::math::{cross, Transform};
use crate::settings::POLYGON_RADIUS;

use super::{MassData, RayCastInput, RayCastOutput};

/// A line segment from `vertex1` to `vertex2`.
///
/// `vertex0` and `vertex3` are the neighbouring vertices when the edge is
/// part of a connected surface. The narrowphase uses them to suppress
/// collisions that a neighbouring edge reports more accurately.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeShape {
    pub vertex1: Vec2,
    pub vertex2: Vec2,
    pub vertex0: Option<Vec2>,
    pub vertex3: Option<Vec2>,
    /// `vertex0` starts a neighbouring edge that collides too, so that edge
    /// owns `vertex1`. False for ghost vertices.
    pub vertex0_shared: bool,
    pub radius: f32,
}

impl EdgeShape {
    /// A free-standing edge with no neighbours.
    pub fn new(v1: Vec2, v2: Vec2) -> Self {
        Self {
            vertex1: v1,
            vertex2: v2,
            vertex0: None,
            vertex3: None,
            vertex0_shared: false,
            radius: POLYGON_RADIUS,
        }
    }

    /// Attach ghost neighbour vertices for smooth collision along a
    /// surface. Ghost vertices shape the collision normal but own no
    /// contacts.
    #[must_use]
    pub fn with_adjacency(mut self, v0: Option<Vec2>, v3: Option<Vec2>) -> Self {
        self.vertex0 = v0;
        self.vertex3 = v3;
        self.vertex0_shared = false;
        self
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let v1 = xf.transform_point(self.vertex1);
        let v2 = xf.transform_point(self.vertex2);
        Aabb::new(v1.min(v2), v1.max(v2)).expanded(self.radius)
    }

    /// Edges have no area and therefore no mass.
    pub fn compute_mass(&self, _density: f32) -> MassData {
        MassData {
            mass: 0.0,
            center: 0.5 * (self.vertex1 + self.vertex2),
            inertia: 0.0,
        }
    }

    /// Two-sided segment ray cast.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Put the ray into the edge's frame of reference.
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let v1 = self.vertex1;
        let v2 = self.vertex2;
        let e = v2 - v1;
        let normal = Vec2::new(e.y, -e.x).normalize_or_zero();
        if normal == Vec2::ZERO {
            return None;
        }

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        let numerator = normal.dot(v1 - p1);
        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + d * t;

        // q = v1 + s * r
        // s = dot(q - v1, r) / dot(r, r)
        let rr = e.length_squared();
        if rr == 0.0 {
            return None;
        }
        let s = (q - v1).dot(e) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let normal = if numerator > 0.0 { -normal } else { normal };
        Some(RayCastOutput {
            normal: xf.q.apply(normal),
            fraction: t,
        })
    }

    /// Signed side of `p` relative to the edge in local space. Positive is
    /// to the right of `vertex1 -> vertex2`.
    #[inline]
    pub fn side(&self, p: Vec2) -> f32 {
        cross(p - self.vertex1, self.vertex2 - self.vertex1)
    }
}
