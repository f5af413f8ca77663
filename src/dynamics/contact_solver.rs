//! Sequential impulse contact solver.
//!
//! Contacts become velocity constraints (non-penetration plus friction) and
//! position constraints (overlap correction). Impulses accumulate across
//! iterations and are clamped on the accumulated value, not the increment,
//! so the solver converges to the right answer even when individual passes
//! overshoot.
//!
//! Two-point manifolds are solved as a 2x2 block (a tiny LCP enumerated
//! case by case) unless the effective mass matrix is ill-conditioned.

use glam::{Mat2, Vec2};

use crate::collision::manifold::{Manifold, ManifoldType, WorldManifold};
use crate::math::{cross, cross_sv, cross_vs, inverse22, Rot, Transform};
use crate::settings::{
    BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, TOI_BAUMGARTE,
    VELOCITY_THRESHOLD,
};

use super::body::Body;
use super::contact::{Contact, ContactId};
use super::time_step::{Position, TimeStep, Velocity};

/// Condition number above which the block solver falls back to one point.
const MAX_CONDITION_NUMBER: f32 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug, Clone, Copy)]
struct ContactVelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    normal_mass: Mat2,
    k: Mat2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    point_count: usize,
    contact: ContactId,
}

#[derive(Debug, Clone, Copy)]
struct ContactPositionConstraint {
    manifold: Manifold,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_i_a: f32,
    inv_i_b: f32,
    radius_a: f32,
    radius_b: f32,
}

/// Contact constraints for one island.
pub struct ContactSolver {
    step: TimeStep,
    velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

/// Normal, point and separation of one manifold point at the current
/// solver positions.
fn position_solver_manifold(
    pc: &ContactPositionConstraint,
    xf_a: &Transform,
    xf_b: &Transform,
    index: usize,
) -> (Vec2, Vec2, f32) {
    let m = &pc.manifold;
    match m.kind {
        ManifoldType::Circles => {
            let point_a = xf_a.transform_point(m.local_point);
            let point_b = xf_b.transform_point(m.points[0].local_point);
            let normal = (point_b - point_a).try_normalize().unwrap_or(Vec2::X);
            let point = 0.5 * (point_a + point_b);
            let separation = (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldType::FaceA => {
            let normal = xf_a.q.apply(m.local_normal);
            let plane_point = xf_a.transform_point(m.local_point);
            let clip_point = xf_b.transform_point(m.points[index].local_point);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldType::FaceB => {
            let normal = xf_b.q.apply(m.local_normal);
            let plane_point = xf_b.transform_point(m.local_point);
            let clip_point = xf_a.transform_point(m.points[index].local_point);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // Ensure the normal points from A to B.
            (-normal, clip_point, separation)
        }
    }
}

fn body_transform(c: Vec2, a: f32, local_center: Vec2) -> Transform {
    let q = Rot::from_angle(a);
    Transform {
        p: c - q.apply(local_center),
        q,
    }
}

impl ContactSolver {
    /// Build constraints for `ids`, copying warm-start impulses (scaled by
    /// the step ratio) from each manifold.
    pub fn new(
        step: TimeStep,
        contacts: &[Option<Contact>],
        ids: &[ContactId],
        bodies: &[Option<Body>],
    ) -> Self {
        let mut velocity_constraints = Vec::with_capacity(ids.len());
        let mut position_constraints = Vec::with_capacity(ids.len());

        for &id in ids {
            let Some(contact) = contacts.get(id.0).and_then(Option::as_ref) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (
                bodies.get(contact.body_a.0).and_then(Option::as_ref),
                bodies.get(contact.body_b.0).and_then(Option::as_ref),
            ) else {
                continue;
            };

            let manifold = contact.manifold;
            debug_assert!(manifold.point_count > 0);

            let mut vc = ContactVelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: Vec2::ZERO,
                normal_mass: Mat2::ZERO,
                k: Mat2::ZERO,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_i,
                inv_i_b: body_b.inv_i,
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
                point_count: manifold.point_count,
                contact: id,
            };

            for (vcp, mp) in vc.points.iter_mut().zip(manifold.points()) {
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }
            }

            velocity_constraints.push(vc);
            position_constraints.push(ContactPositionConstraint {
                manifold,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                inv_i_a: body_a.inv_i,
                inv_i_b: body_b.inv_i,
                radius_a: contact.radius_a,
                radius_b: contact.radius_b,
            });
        }

        Self {
            step,
            velocity_constraints,
            position_constraints,
        }
    }

    /// Compute anchors, effective masses and restitution bias at the
    /// current positions.
    pub fn initialize_velocity_constraints(
        &mut self,
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        for (vc, pc) in self
            .velocity_constraints
            .iter_mut()
            .zip(&self.position_constraints)
        {
            let (ia, ib) = (vc.index_a, vc.index_b);
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);

            let xf_a = body_transform(positions[ia].c, positions[ia].a, pc.local_center_a);
            let xf_b = body_transform(positions[ib].c, positions[ib].a, pc.local_center_b);
            let (c_a, c_b) = (positions[ia].c, positions[ib].c);
            let (v_a, w_a) = (velocities[ia].v, velocities[ia].w);
            let (v_b, w_b) = (velocities[ib].v, velocities[ib].w);

            let wm = WorldManifold::new(&pc.manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);
            vc.normal = wm.normal;
            let tangent = cross_vs(vc.normal, 1.0);

            for (j, vcp) in vc.points[..vc.point_count].iter_mut().enumerate() {
                vcp.r_a = wm.points[j] - c_a;
                vcp.r_b = wm.points[j] - c_b;

                let rn_a = cross(vcp.r_a, vc.normal);
                let rn_b = cross(vcp.r_b, vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(vcp.r_a, tangent);
                let rt_b = cross(vcp.r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Velocity bias for restitution.
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a),
                );
                if v_rel < -VELOCITY_THRESHOLD {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            // Prepare the block solver.
            if vc.point_count == 2 {
                let (p1, p2) = (&vc.points[0], &vc.points[1]);
                let rn1_a = cross(p1.r_a, vc.normal);
                let rn1_b = cross(p1.r_b, vc.normal);
                let rn2_a = cross(p2.r_a, vc.normal);
                let rn2_b = cross(p2.r_b, vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    // K is safe to invert.
                    vc.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = inverse22(&vc.k);
                } else {
                    // The constraints are redundant, just use one.
                    vc.point_count = 1;
                }
            }
        }
    }

    /// Apply last step's impulses.
    pub fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let (ia, ib) = (vc.index_a, vc.index_b);
            let mut v_a = velocities[ia].v;
            let mut w_a = velocities[ia].w;
            let mut v_b = velocities[ib].v;
            let mut w_b = velocities[ib].w;

            let tangent = cross_vs(vc.normal, 1.0);

            for vcp in &vc.points[..vc.point_count] {
                let p = vcp.normal_impulse * vc.normal + vcp.tangent_impulse * tangent;
                w_a -= vc.inv_i_a * cross(vcp.r_a, p);
                v_a -= vc.inv_mass_a * p;
                w_b += vc.inv_i_b * cross(vcp.r_b, p);
                v_b += vc.inv_mass_b * p;
            }

            velocities[ia].v = v_a;
            velocities[ia].w = w_a;
            velocities[ib].v = v_b;
            velocities[ib].w = w_b;
        }
    }

    /// One pass of friction then non-penetration over all contacts.
    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let (ia, ib) = (vc.index_a, vc.index_b);
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);

            let mut v_a = velocities[ia].v;
            let mut w_a = velocities[ia].w;
            let mut v_b = velocities[ib].v;
            let mut w_b = velocities[ib].w;

            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);
            let friction = vc.friction;

            // Solve tangent constraints first because non-penetration is
            // more important than friction.
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);

                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * (-vt);

                // Clamp the accumulated force to the friction cone.
                let max_friction = friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                v_a -= m_a * p;
                w_a -= i_a * cross(vcp.r_a, p);
                v_b += m_b * p;
                w_b += i_b * cross(vcp.r_b, p);
            }

            if vc.point_count == 1 {
                let vcp = &mut vc.points[0];

                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);
                let vn = dv.dot(normal);
                let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                // Clamp the accumulated impulse.
                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;

                let p = lambda * normal;
                v_a -= m_a * p;
                w_a -= i_a * cross(vcp.r_a, p);
                v_b += m_b * p;
                w_b += i_b * cross(vcp.r_b, p);
            } else {
                // Block solver: find x with
                //   vn = A * x + b, vn >= 0, x >= 0, vn_i * x_i = 0
                // where b includes the accumulated impulse a, so x is the
                // new total impulse and d = x - a is applied.
                let (cp1, cp2) = (vc.points[0], vc.points[1]);
                let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
                debug_assert!(a.x >= 0.0 && a.y >= 0.0);

                let dv1 = v_b + cross_sv(w_b, cp1.r_b) - v_a - cross_sv(w_a, cp1.r_a);
                let dv2 = v_b + cross_sv(w_b, cp2.r_b) - v_a - cross_sv(w_a, cp2.r_a);

                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let mut b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias);
                b -= vc.k * a;

                let mut apply = |x: Vec2| {
                    let d = x - a;
                    let p1 = d.x * normal;
                    let p2 = d.y * normal;
                    v_a -= m_a * (p1 + p2);
                    w_a -= i_a * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
                    v_b += m_b * (p1 + p2);
                    w_b += i_b * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));
                    x
                };

                let solved = 'block: {
                    // Case 1: both points stay in contact.
                    let x = -(vc.normal_mass * b);
                    if x.x >= 0.0 && x.y >= 0.0 {
                        break 'block Some(apply(x));
                    }

                    // Case 2: only the first point pushes, vn2 >= 0.
                    let x = Vec2::new(-cp1.normal_mass * b.x, 0.0);
                    let vn2 = vc.k.x_axis.y * x.x + b.y;
                    if x.x >= 0.0 && vn2 >= 0.0 {
                        break 'block Some(apply(x));
                    }

                    // Case 3: only the second point pushes, vn1 >= 0.
                    let x = Vec2::new(0.0, -cp2.normal_mass * b.y);
                    let vn1 = vc.k.y_axis.x * x.y + b.x;
                    if x.y >= 0.0 && vn1 >= 0.0 {
                        break 'block Some(apply(x));
                    }

                    // Case 4: both separate.
                    if b.x >= 0.0 && b.y >= 0.0 {
                        break 'block Some(apply(Vec2::ZERO));
                    }

                    // No solution; keep the accumulated impulses.
                    None
                };

                if let Some(x) = solved {
                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                }
            }

            velocities[ia].v = v_a;
            velocities[ia].w = w_a;
            velocities[ib].v = v_b;
            velocities[ib].w = w_b;
        }
    }

    /// Copy accumulated impulses back to the manifolds for the next step.
    pub fn store_impulses(&self, contacts: &mut [Option<Contact>]) {
        for vc in &self.velocity_constraints {
            let Some(contact) = contacts.get_mut(vc.contact.0).and_then(Option::as_mut) else {
                continue;
            };
            let count = contact.manifold.point_count;
            for (mp, vcp) in contact.manifold.points[..count].iter_mut().zip(&vc.points) {
                mp.normal_impulse = vcp.normal_impulse;
                mp.tangent_impulse = vcp.tangent_impulse;
            }
        }
    }

    /// One Baumgarte pass over all contacts. Returns true when every
    /// separation is within `-3 * LINEAR_SLOP`.
    pub fn solve_position_constraints(&self, positions: &mut [Position]) -> bool {
        let mut min_separation = 0.0f32;

        for pc in &self.position_constraints {
            min_separation = min_separation.min(solve_position_constraint(
                pc,
                positions,
                BAUMGARTE,
                (pc.inv_mass_a, pc.inv_i_a),
                (pc.inv_mass_b, pc.inv_i_b),
            ));
        }

        // We can't expect min_separation >= -LINEAR_SLOP because we don't
        // push the separation above -LINEAR_SLOP.
        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Position pass for a TOI sub-step: only the two bodies of the impact
    /// move. Returns true when every separation is within
    /// `-1.5 * LINEAR_SLOP`.
    pub fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let mut min_separation = 0.0f32;

        for pc in &self.position_constraints {
            let movable = |index: usize, inv_mass: f32, inv_i: f32| {
                if index == toi_index_a || index == toi_index_b {
                    (inv_mass, inv_i)
                } else {
                    (0.0, 0.0)
                }
            };
            let mass_a = movable(pc.index_a, pc.inv_mass_a, pc.inv_i_a);
            let mass_b = movable(pc.index_b, pc.inv_mass_b, pc.inv_i_b);

            min_separation = min_separation.min(solve_position_constraint(
                pc,
                positions,
                TOI_BAUMGARTE,
                mass_a,
                mass_b,
            ));
        }

        min_separation >= -1.5 * LINEAR_SLOP
    }

    pub fn count(&self) -> usize {
        self.velocity_constraints.len()
    }
}

/// Push one contact's bodies apart. Returns the smallest separation seen.
fn solve_position_constraint(
    pc: &ContactPositionConstraint,
    positions: &mut [Position],
    baumgarte: f32,
    (m_a, i_a): (f32, f32),
    (m_b, i_b): (f32, f32),
) -> f32 {
    let (ia, ib) = (pc.index_a, pc.index_b);
    let mut c_a = positions[ia].c;
    let mut a_a = positions[ia].a;
    let mut c_b = positions[ib].c;
    let mut a_b = positions[ib].a;

    let mut min_separation = 0.0f32;

    // Solve normal constraints.
    for j in 0..pc.manifold.point_count {
        let xf_a = body_transform(c_a, a_a, pc.local_center_a);
        let xf_b = body_transform(c_b, a_b, pc.local_center_b);

        let (normal, point, separation) = position_solver_manifold(pc, &xf_a, &xf_b, j);

        let r_a = point - c_a;
        let r_b = point - c_b;

        // Track max constraint error.
        min_separation = min_separation.min(separation);

        // Prevent large corrections and allow slop.
        let c = (baumgarte * (separation + LINEAR_SLOP)).clamp(-MAX_LINEAR_CORRECTION, 0.0);

        // Compute the effective mass.
        let rn_a = cross(r_a, normal);
        let rn_b = cross(r_b, normal);
        let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

        // Compute normal impulse.
        let impulse = if k > 0.0 { -c / k } else { 0.0 };
        let p = impulse * normal;

        c_a -= m_a * p;
        a_a -= i_a * cross(r_a, p);
        c_b += m_b * p;
        a_b += i_b * cross(r_b, p);
    }

    positions[ia].c = c_a;
    positions[ia].a = a_a;
    positions[ib].c = c_b;
    positions[ib].a = a_b;

    min_separation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, PolygonShape};
    use crate::dynamics::body::{BodyDef, BodyHandle};
    use crate::dynamics::fixture::{Fixture, FixtureDef, FixtureHandle};

    /// Ground box and a unit box resting on it at `y`, falling at `vy`.
    struct Scene {
        bodies: Vec<Option<Body>>,
        contacts: Vec<Option<Contact>>,
        positions: Vec<Position>,
        velocities: Vec<Velocity>,
    }

    fn scene(y: f32, vy: f32, restitution: f32) -> Scene {
        let mut ground = Body::new(&BodyDef::new_static(Vec2::ZERO));
        let mut block = Body::new(&BodyDef::new_dynamic(Vec2::new(0.0, y)));
        let fa = Fixture::new(BodyHandle(0), FixtureDef::new(PolygonShape::new_box(5.0, 0.5).unwrap()));
        let fb = Fixture::new(
            BodyHandle(1),
            FixtureDef::new(PolygonShape::new_box(0.5, 0.5).unwrap())
                .with_density(1.0)
                .with_restitution(restitution),
        );
        block.fixtures.push(FixtureHandle(1));
        let fixtures = vec![Some(fa), Some(fb)];
        block.reset_mass_data(&fixtures);
        ground.island_index = 0;
        block.island_index = 1;
        block.linear_velocity = Vec2::new(0.0, vy);

        let mut bodies = vec![Some(ground), Some(block)];
        let mut contact = Contact::new(
            FixtureHandle(0),
            0,
            fixtures[0].as_ref().unwrap(),
            FixtureHandle(1),
            0,
            fixtures[1].as_ref().unwrap(),
        );
        contact.update(&fixtures, &mut bodies, &mut Vec::new());
        assert_eq!(contact.manifold.point_count, 2);

        let positions = bodies
            .iter()
            .flatten()
            .map(|b| Position {
                c: b.sweep.c,
                a: b.sweep.a,
            })
            .collect();
        let velocities = bodies
            .iter()
            .flatten()
            .map(|b| Velocity {
                v: b.linear_velocity,
                w: b.angular_velocity,
            })
            .collect();

        Scene {
            bodies,
            contacts: vec![Some(contact)],
            positions,
            velocities,
        }
    }

    #[test]
    fn test_inelastic_contact_stops_approach() {
        let mut s = scene(0.99, -2.0, 0.0);
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let mut solver = ContactSolver::new(step, &s.contacts, &[ContactId(0)], &s.bodies);
        solver.initialize_velocity_constraints(&s.positions, &s.velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut s.velocities);
        }
        assert!(s.velocities[1].v.y.abs() < 1e-4, "vy = {}", s.velocities[1].v.y);
        assert!(s.velocities[1].w.abs() < 1e-4);
        // Ground never moves.
        assert_eq!(s.velocities[0].v, Vec2::ZERO);

        solver.store_impulses(&mut s.contacts);
        let stored = s.contacts[0].as_ref().unwrap().manifold;
        let total: f32 = stored.points().iter().map(|p| p.normal_impulse).sum();
        // Impulse equals the momentum removed: m * |v|.
        assert!((total - 2.0).abs() < 1e-3, "total = {total}");
    }

    #[test]
    fn test_restitution_above_threshold_bounces() {
        let mut s = scene(0.99, -4.0, 0.5);
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let mut solver = ContactSolver::new(step, &s.contacts, &[ContactId(0)], &s.bodies);
        solver.initialize_velocity_constraints(&s.positions, &s.velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut s.velocities);
        }
        assert!((s.velocities[1].v.y - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_restitution_ignored_below_threshold() {
        let mut s = scene(0.99, -0.5, 0.5);
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let mut solver = ContactSolver::new(step, &s.contacts, &[ContactId(0)], &s.bodies);
        solver.initialize_velocity_constraints(&s.positions, &s.velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut s.velocities);
        }
        assert!(s.velocities[1].v.y.abs() < 1e-4);
    }

    #[test]
    fn test_warm_start_applies_stored_impulse() {
        let mut s = scene(0.99, 0.0, 0.0);
        {
            let c = s.contacts[0].as_mut().unwrap();
            for p in c.manifold.points.iter_mut() {
                p.normal_impulse = 0.25;
            }
        }
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let mut solver = ContactSolver::new(step, &s.contacts, &[ContactId(0)], &s.bodies);
        solver.initialize_velocity_constraints(&s.positions, &s.velocities);
        solver.warm_start(&mut s.velocities);
        // Two points of 0.25 each on a unit mass.
        assert!((s.velocities[1].v.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_position_solver_converges_monotonically() {
        // Start 0.1 deep into the ground.
        let mut s = scene(0.9, 0.0, 0.0);
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let solver = ContactSolver::new(step, &s.contacts, &[ContactId(0)], &s.bodies);

        let ground_top = 0.5 + 0.5 + 2.0 * crate::settings::POLYGON_RADIUS;
        let mut last_depth = ground_top - s.positions[1].c.y;
        let mut solved = false;
        for _ in 0..50 {
            solved = solver.solve_position_constraints(&mut s.positions);
            let depth = ground_top - s.positions[1].c.y;
            assert!(depth <= last_depth + 1e-6, "{depth} > {last_depth}");
            last_depth = depth;
            if solved {
                break;
            }
        }
        assert!(solved);
        assert!(last_depth < 0.03, "depth = {last_depth}");
        assert_eq!(s.positions[0].c, Vec2::ZERO);
    }

    #[test]
    fn test_toi_position_solver_moves_only_toi_bodies() {
        let mut s = scene(0.9, 0.0, 0.0);
        let step = TimeStep::new(1.0 / 60.0, 8, 20);
        let solver = ContactSolver::new(step, &s.contacts, &[ContactId(0)], &s.bodies);

        // The block is not one of the TOI bodies: nothing moves.
        let before = s.positions.clone();
        assert!(!solver.solve_toi_position_constraints(&mut s.positions, 0, 2));
        assert_eq!(s.positions, before);

        let mut solved = false;
        for _ in 0..20 {
            if solver.solve_toi_position_constraints(&mut s.positions, 0, 1) {
                solved = true;
                break;
            }
        }
        assert!(solved);
        assert!(s.positions[1].c.y > before[1].c.y);
    }

    #[test]
    fn test_circle_on_ground_single_point() {
        let ground = Body::new(&BodyDef::new_static(Vec2::ZERO));
        let mut ball = Body::new(&BodyDef::new_dynamic(Vec2::new(0.0, 0.99)));
        let fa = Fixture::new(BodyHandle(0), FixtureDef::new(PolygonShape::new_box(5.0, 0.5).unwrap()));
        let fb = Fixture::new(
            BodyHandle(1),
            FixtureDef::new(CircleShape::new(0.5).unwrap()).with_density(1.0),
        );
        ball.fixtures.push(FixtureHandle(1));
        let fixtures = vec![Some(fa), Some(fb)];
        ball.reset_mass_data(&fixtures);
        ball.island_index = 1;
        ball.linear_velocity = Vec2::new(1.0, -1.0);
        let mut bodies = vec![Some(ground), Some(ball)];

        let mut contact = Contact::new(
            FixtureHandle(0),
            0,
            fixtures[0].as_ref().unwrap(),
            FixtureHandle(1),
            0,
            fixtures[1].as_ref().unwrap(),
        );
        contact.update(&fixtures, &mut bodies, &mut Vec::new());
        let contacts = vec![Some(contact)];

        let positions = vec![
            Position::default(),
            Position {
                c: Vec2::new(0.0, 0.99),
                a: 0.0,
            },
        ];
        let mut velocities = vec![
            Velocity::default(),
            Velocity {
                v: Vec2::new(1.0, -1.0),
                w: 0.0,
            },
        ];

        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let mut solver = ContactSolver::new(step, &contacts, &[ContactId(0)], &bodies);
        solver.initialize_velocity_constraints(&positions, &velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }
        assert!(velocities[1].v.y.abs() < 1e-4);
        // Friction slows the slide but the cone limits it.
        assert!(velocities[1].v.x < 1.0);
        assert!(velocities[1].v.x > 0.0);
    }
}
