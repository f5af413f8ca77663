//! GJK closest points between convex proxies.
//!
//! The simplex from one query is written into a [`SimplexCache`] so the next
//! query on the same pair (the next TOI iteration, the next step) starts
//! close to the answer.

use glam::Vec2;

use crate::collision::shapes::Shape;
use crate::math::{cross, cross_sv, cross_vs, Transform};
use crate::settings::MAX_POLYGON_VERTICES;

const MAX_ITERATIONS: usize = 20;

/// A convex shape reduced to a vertex list plus a rounding radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f32,
}

impl DistanceProxy {
    /// Build a proxy from a shape child.
    pub fn new(shape: &Shape, child: usize) -> Self {
        match shape {
            Shape::Circle(circle) => Self::from_points(&[circle.position], circle.radius),
            Shape::Polygon(polygon) => Self::from_points(&polygon.vertices, polygon.radius),
            Shape::Edge(edge) => Self::from_points(&[edge.vertex1, edge.vertex2], edge.radius),
            Shape::Chain(chain) => Self::from_points(
                &[chain.vertices[child], chain.vertices[child + 1]],
                chain.radius,
            ),
        }
    }

    /// Build a proxy from raw points. Extra points past the proxy capacity
    /// are ignored.
    pub fn from_points(points: &[Vec2], radius: f32) -> Self {
        let count = points.len().min(MAX_POLYGON_VERTICES);
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..count].copy_from_slice(&points[..count]);
        Self {
            vertices,
            count,
            radius,
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn vertex(&self, index: usize) -> Vec2 {
        debug_assert!(index < self.count);
        self.vertices[index]
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    /// Index of the vertex furthest along `d`.
    pub fn support(&self, d: Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(d);
        for i in 1..self.count {
            let value = self.vertices[i].dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }
}

/// Warm-start state carried between distance queries on the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimplexCache {
    /// Length or area of the cached simplex.
    pub metric: f32,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    /// Shrink the distance by both radii and move the witness points onto
    /// the rounded surfaces.
    pub use_radii: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceOutput {
    /// Closest point on A.
    pub point_a: Vec2,
    /// Closest point on B.
    pub point_b: Vec2,
    pub distance: f32,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point in proxy A, world space.
    w_a: Vec2,
    /// Support point in proxy B, world space.
    w_b: Vec2,
    /// `w_b - w_a`.
    w: Vec2,
    /// Barycentric coordinate of the closest point.
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        transform_a: &Transform,
        proxy_b: &DistanceProxy,
        transform_b: &Transform,
    ) -> Self {
        let mut simplex = Simplex {
            count: cache.count.min(3),
            ..Default::default()
        };

        for i in 0..simplex.count {
            let v = &mut simplex.v[i];
            v.index_a = cache.index_a[i];
            v.index_b = cache.index_b[i];
            if v.index_a >= proxy_a.count() || v.index_b >= proxy_b.count() {
                simplex.count = 0;
                break;
            }
            v.w_a = transform_a.transform_point(proxy_a.vertex(v.index_a));
            v.w_b = transform_b.transform_point(proxy_b.vertex(v.index_b));
            v.w = v.w_b - v.w_a;
            v.a = 0.0;
        }

        // Flush the cache if the simplex changed shape a lot.
        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f32::EPSILON {
                simplex.count = 0;
            }
        }

        if simplex.count == 0 {
            let v = &mut simplex.v[0];
            v.index_a = 0;
            v.index_b = 0;
            v.w_a = transform_a.transform_point(proxy_a.vertex(0));
            v.w_b = transform_b.transform_point(proxy_b.vertex(0));
            v.w = v.w_b - v.w_a;
            v.a = 1.0;
            simplex.count = 1;
        }

        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a;
            cache.index_b[i] = self.v[i].index_b;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    cross_sv(1.0, e12)
                } else {
                    cross_vs(e12, 1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        let [v1, v2, v3] = &self.v;
        match self.count {
            1 => (v1.w_a, v1.w_b),
            2 => (
                v1.w_a * v1.a + v2.w_a * v2.a,
                v1.w_b * v1.a + v2.w_b * v2.a,
            ),
            3 => {
                let p = v1.w_a * v1.a + v2.w_a * v2.a + v3.w_a * v3.a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn metric(&self) -> f32 {
        match self.count {
            2 => self.v[0].w.distance(self.v[1].w),
            3 => cross(self.v[1].w - self.v[0].w, self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    /// Closest point on a segment to the origin, by barycentric coordinates.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // Must be in e12 region.
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest feature of a triangle to the origin: a vertex, an edge or
    /// the interior.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        // Triangle123
        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Must be in triangle123
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// Closest points between two convex proxies.
///
/// On first use pass a default cache. The distance is zero when the core
/// shapes overlap.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let transform_a = &input.transform_a;
    let transform_b = &input.transform_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, transform_a, proxy_b, transform_b);

    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iter = 0;
    while iter < MAX_ITERATIONS {
        // Remember the current vertices to detect cycling.
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // The origin is inside the triangle: overlap.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();

        // The origin is probably on the simplex; can't tell which side.
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            break;
        }

        let index_a = proxy_a.support(transform_a.q.apply_inv(-d));
        let index_b = proxy_b.support(transform_b.q.apply_inv(d));
        let w_a = transform_a.transform_point(proxy_a.vertex(index_a));
        let w_b = transform_b.transform_point(proxy_b.vertex(index_b));

        iter += 1;

        // No progress: the new support point is already in the simplex.
        let duplicate = (0..save_count).any(|i| index_a == save_a[i] && index_b == save_b[i]);
        if duplicate {
            break;
        }

        simplex.v[simplex.count] = SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        };
        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = point_a.distance(point_b);
    simplex.write_cache(cache);

    if input.use_radii {
        let r_a = proxy_a.radius;
        let r_b = proxy_b.radius;

        if dist > r_a + r_b && dist > f32::EPSILON {
            // Shapes are still separated; move the witness points to the
            // outer surfaces.
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalize();
            point_a += normal * r_a;
            point_b -= normal * r_b;
        } else {
            // Overlapping: put both witness points at the middle.
            let p = 0.5 * (point_a + point_b);
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations: iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, PolygonShape};

    fn box_proxy(h: f32) -> DistanceProxy {
        DistanceProxy::new(&Shape::Polygon(PolygonShape::new_box(h, h).unwrap()), 0)
    }

    #[test]
    fn test_circle_distance_with_radii() {
        let circle = Shape::Circle(CircleShape::new(1.0).unwrap());
        let input = DistanceInput {
            proxy_a: DistanceProxy::new(&circle, 0),
            proxy_b: DistanceProxy::new(&circle, 0),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::from_translation(Vec2::new(5.0, 0.0)),
            use_radii: true,
        };
        let mut cache = SimplexCache::default();
        let output = distance(&mut cache, &input);
        assert!((output.distance - 3.0).abs() < 1e-5);
        assert!((output.point_a - Vec2::new(1.0, 0.0)).length() < 1e-5);
        assert!((output.point_b - Vec2::new(4.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_box_distance_and_cache_reuse() {
        let input = DistanceInput {
            proxy_a: box_proxy(1.0),
            proxy_b: box_proxy(1.0),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::from_translation(Vec2::new(3.0, 0.5)),
            use_radii: false,
        };
        let mut cache = SimplexCache::default();
        let first = distance(&mut cache, &input);
        assert!((first.distance - 1.0).abs() < 1e-5);
        assert!(cache.count >= 1);

        // A warm cache converges at least as fast.
        let second = distance(&mut cache, &input);
        assert!((second.distance - 1.0).abs() < 1e-5);
        assert!(second.iterations <= first.iterations);
    }

    #[test]
    fn test_overlapping_cores_report_zero() {
        let input = DistanceInput {
            proxy_a: box_proxy(1.0),
            proxy_b: box_proxy(1.0),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(0.5, 0.2), 0.3),
            use_radii: false,
        };
        let output = distance(&mut SimplexCache::default(), &input);
        assert!(output.distance < 1e-5);
    }

    #[test]
    fn test_support_picks_extreme_vertex() {
        let proxy = box_proxy(1.0);
        let i = proxy.support(Vec2::new(1.0, 1.0));
        assert_eq!(proxy.vertex(i), Vec2::new(1.0, 1.0));
    }
}
