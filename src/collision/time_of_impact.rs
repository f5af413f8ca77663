//! Conservative-advancement time of impact.
//!
//! Finds the earliest fraction of a step at which two swept proxies come
//! within `target` of each other. The result is a safe bound rather than an
//! exact contact time: callers advance bodies to `t` and let the regular
//! solver take it from there.

use glam::Vec2;

use crate::collision::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::math::{cross_vs, Sweep};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES};

const MAX_ITERATIONS: usize = 20;
const MAX_ROOT_ITERATIONS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Upper bound of the search interval, in `[0, 1]`.
    pub t_max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiOutputState {
    Unknown,
    /// Root finding ran out of iterations; `t` is the last safe time.
    Failed,
    /// The shapes already overlap at the start of the interval.
    Overlapped,
    Touching,
    /// No contact before `t_max`.
    Separated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToiOutput {
    pub state: ToiOutputState,
    pub t: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

/// Separating axis derived from the GJK simplex, tracked as the bodies move.
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    /// Build the function from the simplex of a non-overlapping pair at `t1`.
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f32,
    ) -> Self {
        debug_assert!(0 < cache.count && cache.count < 3);

        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let local_point_a = proxy_a.vertex(cache.index_a[0]);
            let local_point_b = proxy_b.vertex(cache.index_b[0]);
            let point_a = xf_a.transform_point(local_point_a);
            let point_b = xf_b.transform_point(local_point_b);
            f.axis = (point_b - point_a).normalize_or_zero();
            return f;
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A.
            f.kind = SeparationKind::FaceB;
            let local_point_b1 = proxy_b.vertex(cache.index_b[0]);
            let local_point_b2 = proxy_b.vertex(cache.index_b[1]);

            f.axis = cross_vs(local_point_b2 - local_point_b1, 1.0).normalize_or_zero();
            let normal = xf_b.q.apply(f.axis);

            f.local_point = 0.5 * (local_point_b1 + local_point_b2);
            let point_b = xf_b.transform_point(f.local_point);

            let local_point_a = proxy_a.vertex(cache.index_a[0]);
            let point_a = xf_a.transform_point(local_point_a);

            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
            f
        } else {
            // Two points on A and one or two points on B.
            f.kind = SeparationKind::FaceA;
            let local_point_a1 = proxy_a.vertex(cache.index_a[0]);
            let local_point_a2 = proxy_a.vertex(cache.index_a[1]);

            f.axis = cross_vs(local_point_a2 - local_point_a1, 1.0).normalize_or_zero();
            let normal = xf_a.q.apply(f.axis);

            f.local_point = 0.5 * (local_point_a1 + local_point_a2);
            let point_a = xf_a.transform_point(f.local_point);

            let local_point_b = proxy_b.vertex(cache.index_b[0]);
            let point_b = xf_b.transform_point(local_point_b);

            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
            f
        }
    }

    /// Deepest points along the axis at time `t`, with their separation.
    fn find_min_separation(&self, t: f32) -> (usize, usize, f32) {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let axis_a = xf_a.q.apply_inv(self.axis);
                let axis_b = xf_b.q.apply_inv(-self.axis);

                let index_a = self.proxy_a.support(axis_a);
                let index_b = self.proxy_b.support(axis_b);

                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));

                (index_a, index_b, (point_b - point_a).dot(self.axis))
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.transform_point(self.local_point);

                let axis_b = xf_b.q.apply_inv(-normal);
                let index_b = self.proxy_b.support(axis_b);
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));

                (0, index_b, (point_b - point_a).dot(normal))
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.transform_point(self.local_point);

                let axis_a = xf_a.q.apply_inv(-normal);
                let index_a = self.proxy_a.support(axis_a);
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));

                (index_a, 0, (point_a - point_b).dot(normal))
            }
        }
    }

    /// Separation of a fixed pair of support points at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.transform_point(self.local_point);
                let point_b = xf_b.transform_point(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.transform_point(self.local_point);
                let point_a = xf_a.transform_point(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Compute the upper bound on time before two shapes penetrate.
///
/// Time is a fraction of the sweep interval in `[0, t_max]`. The returned
/// `t` never exceeds `t_max`. Shapes that already overlap, or are already
/// inside the target separation at the start, report
/// [`ToiOutputState::Overlapped`] with `t = 0`.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    time_of_impact_within(input, MAX_ITERATIONS)
}

/// [`time_of_impact`] with an explicit cap on separating-axis iterations.
fn time_of_impact_within(input: &ToiInput, max_iterations: usize) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiOutputState::Unknown,
        t: input.t_max,
    };

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;

    // Large rotations can make the root finder fail, so normalize the
    // sweep angles.
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0f32;
    let mut iter = 0;

    // Prepare the distance query; the simplex cache carries across
    // iterations.
    let mut cache = SimplexCache::default();
    let mut distance_input = DistanceInput {
        proxy_a: *proxy_a,
        proxy_b: *proxy_b,
        transform_a: sweep_a.transform_at(t1),
        transform_b: sweep_b.transform_at(t1),
        use_radii: false,
    };

    // The outer loop progressively attempts to compute new separating axes.
    // This loop terminates when an axis is repeated (no progress is made).
    loop {
        distance_input.transform_a = sweep_a.transform_at(t1);
        distance_input.transform_b = sweep_b.transform_at(t1);

        // Get the distance between the core shapes at t1.
        let distance_output = distance(&mut cache, &distance_input);

        // Core shapes overlapping, or starting inside the target band.
        if distance_output.distance <= 0.0
            || (t1 == 0.0 && distance_output.distance < target - tolerance)
        {
            output.state = ToiOutputState::Overlapped;
            output.t = 0.0;
            break;
        }

        if distance_output.distance < target + tolerance {
            output.state = ToiOutputState::Touching;
            output.t = t1;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point along the separating axis. Each new
        // deepest pair is pushed back at most once per vertex.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iter = 0;
        loop {
            let (index_a, index_b, mut s2) = fcn.find_min_separation(t2);

            // Is the final configuration separated?
            if s2 > target + tolerance {
                output.state = ToiOutputState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            // Has the separation reached tolerance?
            if s2 > target - tolerance {
                // Advance the sweeps.
                t1 = t2;
                break;
            }

            // Compute the initial separation of the witness points.
            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // Initial overlap: the root finder cannot make progress.
            if s1 < target - tolerance {
                output.state = ToiOutputState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            // Initial configuration is close enough to touching.
            if s1 <= target + tolerance {
                output.state = ToiOutputState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // 1D root of f(t) - target = 0, mixing secant and bisection.
            let mut root_iter = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                let t = if root_iter & 1 == 1 {
                    // Secant rule improves convergence.
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    // Bisection guarantees progress.
                    0.5 * (a1 + a2)
                };
                debug_assert!(t.is_finite(), "time of impact root finder produced NaN");
                root_iter += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    // t2 holds a tentative value for t1.
                    t2 = t;
                    break;
                }

                // Keep the root bracketed.
                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iter == MAX_ROOT_ITERATIONS {
                    break;
                }
            }

            push_back_iter += 1;
            if push_back_iter == MAX_POLYGON_VERTICES {
                break;
            }
        }

        iter += 1;

        if done {
            break;
        }

        if iter == max_iterations {
            // Root finder got stuck. Semi-victory.
            output.state = ToiOutputState::Failed;
            output.t = t1;
            break;
        }
    }

    if output.state == ToiOutputState::Failed {
        tracing::debug!(t = output.t, iterations = iter, "time of impact failed to converge");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, PolygonShape, Shape};
    use proptest::prelude::*;

    fn circle_proxy(r: f32) -> DistanceProxy {
        DistanceProxy::new(&Shape::Circle(CircleShape::new(r).unwrap()), 0)
    }

    fn box_proxy(h: f32) -> DistanceProxy {
        DistanceProxy::new(&Shape::Polygon(PolygonShape::new_box(h, h).unwrap()), 0)
    }

    fn linear_sweep(from: Vec2, to: Vec2, a0: f32, a: f32) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0,
            a,
            alpha0: 0.0,
        }
    }

    #[test]
    fn test_fast_circle_hits_wall() {
        // A bullet crosses a thin box in one step.
        let input = ToiInput {
            proxy_a: circle_proxy(0.25),
            proxy_b: DistanceProxy::new(&Shape::Polygon(PolygonShape::new_box(0.1, 2.0).unwrap()), 0),
            sweep_a: linear_sweep(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0), 0.0, 0.0),
            sweep_b: linear_sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiOutputState::Touching);

        // The core distance settles on the target separation.
        let xf = input.sweep_a.transform_at(output.t);
        let core_distance = -0.1 - xf.p.x;
        let target = 0.25 + crate::settings::POLYGON_RADIUS - 3.0 * LINEAR_SLOP;
        assert!(
            (core_distance - target).abs() < 0.25 * LINEAR_SLOP + 1e-4,
            "core distance = {core_distance}"
        );
    }

    #[test]
    fn test_overlapping_circles_report_overlapped_at_zero() {
        let input = ToiInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            sweep_a: linear_sweep(Vec2::ZERO, Vec2::new(1.0, 0.0), 0.0, 0.0),
            sweep_b: linear_sweep(Vec2::new(1.5, 0.0), Vec2::new(1.5, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiOutputState::Overlapped);
        assert_eq!(output.t, 0.0);
    }

    #[test]
    fn test_overlapping_boxes_report_overlapped_at_zero() {
        let input = ToiInput {
            proxy_a: box_proxy(1.0),
            proxy_b: box_proxy(1.0),
            sweep_a: linear_sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: linear_sweep(Vec2::new(0.5, 0.0), Vec2::new(3.0, 0.0), 0.0, 1.0),
            t_max: 1.0,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiOutputState::Overlapped);
        assert_eq!(output.t, 0.0);
    }

    #[test]
    fn test_separated_sweeps_report_t_max() {
        let input = ToiInput {
            proxy_a: box_proxy(0.5),
            proxy_b: box_proxy(0.5),
            sweep_a: linear_sweep(Vec2::ZERO, Vec2::new(0.0, 1.0), 0.0, 0.0),
            sweep_b: linear_sweep(Vec2::new(5.0, 0.0), Vec2::new(5.0, 1.0), 0.0, 0.0),
            t_max: 0.8,
        };
        let output = time_of_impact(&input);
        assert_eq!(output.state, ToiOutputState::Separated);
        assert_eq!(output.t, 0.8);
    }

    #[test]
    fn test_exhausted_iterations_report_failed_at_safe_time() {
        let input = ToiInput {
            proxy_a: circle_proxy(0.25),
            proxy_b: DistanceProxy::new(&Shape::Polygon(PolygonShape::new_box(0.1, 2.0).unwrap()), 0),
            sweep_a: linear_sweep(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0), 0.0, 0.0),
            sweep_b: linear_sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            t_max: 1.0,
        };
        let converged = time_of_impact(&input);
        assert_eq!(converged.state, ToiOutputState::Touching);

        // One axis iteration advances t1 but cannot confirm the contact.
        let output = time_of_impact_within(&input, 1);
        assert_eq!(output.state, ToiOutputState::Failed);
        assert!(output.t > 0.0 && output.t < 1.0);
        assert!(output.t <= converged.t + 1e-6, "t = {}, converged = {}", output.t, converged.t);

        // The reported time is still free of penetration.
        let xf = input.sweep_a.transform_at(output.t);
        assert!(-0.1 - xf.p.x > 0.0);
    }

    proptest! {
        #[test]
        fn test_toi_never_exceeds_t_max(
            start_x in -8.0f32..-3.0,
            start_y in -2.0f32..2.0,
            end_x in -2.0f32..8.0,
            end_y in -2.0f32..2.0,
            spin in -3.0f32..3.0,
            t_max in 0.05f32..1.0,
        ) {
            let input = ToiInput {
                proxy_a: box_proxy(0.5),
                proxy_b: box_proxy(1.0),
                sweep_a: linear_sweep(Vec2::new(start_x, start_y), Vec2::new(end_x, end_y), 0.0, spin),
                sweep_b: linear_sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
                t_max,
            };
            let output = time_of_impact(&input);
            prop_assert!(output.t >= 0.0);
            prop_assert!(output.t <= t_max);
            prop_assert!(output.state != ToiOutputState::Unknown);
        }
    }
}
