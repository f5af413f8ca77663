//! Distance joint: keeps two anchor points a fixed distance apart, either
//! rigidly or as a damped spring.
//!
//! ```text
//! C = norm(p2 - p1) - L
//! u = (p2 - p1) / norm(p2 - p1)
//! Cdot = dot(u, v2 + cross(w2, r2) - v1 - cross(w1, r1))
//! J = [-u -cross(r1, u) u cross(r2, u)]
//! K = invMass1 + invI1 * cross(r1, u)^2 + invMass2 + invI2 * cross(r2, u)^2
//! ```

use std::f32::consts::PI;

use glam::Vec2;

use crate::dynamics::body::Body;
use crate::dynamics::time_step::SolverData;
use crate::math::{cross, cross_sv, Rot};
use crate::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};

use super::SolverBody;

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Rest length.
    pub length: f32,
    /// Spring frequency; zero makes the joint rigid.
    pub frequency_hz: f32,
    /// 0 is undamped, 1 is critically damped.
    pub damping_ratio: f32,
}

impl Default for DistanceJointDef {
    fn default() -> Self {
        Self {
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 1.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }
}

impl DistanceJointDef {
    /// Connect two world anchors; the rest length is their current distance.
    pub fn initialize(body_a: &Body, body_b: &Body, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        Self {
            local_anchor_a: body_a.local_point(anchor_a),
            local_anchor_b: body_b.local_point(anchor_b),
            length: (anchor_b - anchor_a).length(),
            ..Default::default()
        }
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    length: f32,
    frequency_hz: f32,
    damping_ratio: f32,
    impulse: f32,
    gamma: f32,
    bias: f32,

    // Solver temporaries.
    a: SolverBody,
    b: SolverBody,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            a: SolverBody::default(),
            b: SolverBody::default(),
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz
    }

    pub fn set_frequency(&mut self, hz: f32) {
        self.frequency_hz = hz;
    }

    pub fn damping_ratio(&self) -> f32 {
        self.damping_ratio
    }

    pub fn set_damping_ratio(&mut self, ratio: f32) {
        self.damping_ratio = ratio;
    }

    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        (inv_dt * self.impulse) * self.u
    }

    pub fn reaction_torque(&self, _inv_dt: f32) -> f32 {
        0.0
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData,
        a: SolverBody,
        b: SolverBody,
    ) {
        self.a = a;
        self.b = b;

        let c_a = data.positions[a.index].c;
        let a_a = data.positions[a.index].a;
        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;
        let c_b = data.positions[b.index].c;
        let a_b = data.positions[b.index].a;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        let q_a = Rot::from_angle(a_a);
        let q_b = Rot::from_angle(a_b);

        self.r_a = q_a.apply(self.local_anchor_a - a.local_center);
        self.r_b = q_b.apply(self.local_anchor_b - b.local_center);
        self.u = c_b + self.r_b - c_a - self.r_a;

        // Handle singularity.
        let length = self.u.length();
        if length > LINEAR_SLOP {
            self.u *= 1.0 / length;
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_au = cross(self.r_a, self.u);
        let cr_bu = cross(self.r_b, self.u);
        let mut inv_mass =
            a.inv_mass + a.inv_i * cr_au * cr_au + b.inv_mass + b.inv_i * cr_bu * cr_bu;

        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = length - self.length;

            let omega = 2.0 * PI * self.frequency_hz;
            // Damping coefficient and spring stiffness.
            let d = 2.0 * self.mass * self.damping_ratio * omega;
            let k = self.mass * omega * omega;

            // Magic formulas.
            let h = data.step.dt;
            self.gamma = h * (d + h * k);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * k * self.gamma;

            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = self.impulse * self.u;
            v_a -= a.inv_mass * p;
            w_a -= a.inv_i * cross(self.r_a, p);
            v_b += b.inv_mass * p;
            w_b += b.inv_i * cross(self.r_b, p);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (ia, ib) = (self.a.index, self.b.index);
        let mut v_a = data.velocities[ia].v;
        let mut w_a = data.velocities[ia].w;
        let mut v_b = data.velocities[ib].v;
        let mut w_b = data.velocities[ib].w;

        let vp_a = v_a + cross_sv(w_a, self.r_a);
        let vp_b = v_b + cross_sv(w_b, self.r_b);
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = impulse * self.u;
        v_a -= self.a.inv_mass * p;
        w_a -= self.a.inv_i * cross(self.r_a, p);
        v_b += self.b.inv_mass * p;
        w_b += self.b.inv_i * cross(self.r_b, p);

        data.velocities[ia].v = v_a;
        data.velocities[ia].w = w_a;
        data.velocities[ib].v = v_b;
        data.velocities[ib].w = w_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        if self.frequency_hz > 0.0 {
            // Springs have no position correction.
            return true;
        }

        let (ia, ib) = (self.a.index, self.b.index);
        let mut c_a = data.positions[ia].c;
        let mut a_a = data.positions[ia].a;
        let mut c_b = data.positions[ib].c;
        let mut a_b = data.positions[ib].a;

        let q_a = Rot::from_angle(a_a);
        let q_b = Rot::from_angle(a_b);

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let d = c_b + r_b - c_a - r_a;

        let length = d.length();
        let u = if length > f32::EPSILON { d / length } else { Vec2::ZERO };
        let c = (length - self.length).clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = impulse * u;

        c_a -= self.a.inv_mass * p;
        a_a -= self.a.inv_i * cross(r_a, p);
        c_b += self.b.inv_mass * p;
        a_b += self.b.inv_i * cross(r_b, p);

        data.positions[ia].c = c_a;
        data.positions[ia].a = a_a;
        data.positions[ib].c = c_b;
        data.positions[ib].a = a_b;

        c.abs() < LINEAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::time_step::{Position, TimeStep, Velocity};

    #[test]
    fn test_initialize_measures_length() {
        let a = Body::new(&BodyDef::new_static(Vec2::ZERO));
        let b = Body::new(&BodyDef::new_dynamic(Vec2::new(3.0, 4.0)));
        let def = DistanceJointDef::initialize(&a, &b, Vec2::ZERO, Vec2::new(3.0, 4.0));
        assert!((def.length - 5.0).abs() < 1e-6);
        assert_eq!(def.local_anchor_b, Vec2::ZERO);
    }

    #[test]
    fn test_rod_removes_stretching_velocity() {
        let mut joint = DistanceJoint::new(&DistanceJointDef {
            length: 2.0,
            ..Default::default()
        });
        let mut positions = [
            Position::default(),
            Position {
                c: Vec2::new(2.0, 0.0),
                a: 0.0,
            },
        ];
        let mut velocities = [
            Velocity::default(),
            Velocity {
                v: Vec2::new(3.0, 1.0),
                w: 0.0,
            },
        ];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0, 8, 3),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let ground = SolverBody::default();
        let bob = SolverBody {
            index: 1,
            local_center: Vec2::ZERO,
            inv_mass: 1.0,
            inv_i: 0.0,
        };
        joint.init_velocity_constraints(&mut data, ground, bob);
        joint.solve_velocity_constraints(&mut data);

        // Radial velocity is gone, tangential velocity untouched.
        assert!(data.velocities[1].v.x.abs() < 1e-5);
        assert!((data.velocities[1].v.y - 1.0).abs() < 1e-5);
        assert!((joint.reaction_force(60.0).x + 180.0).abs() < 1e-2);
    }
}
