//! Gear joint: couples the coordinates of two revolute or prismatic joints.
//!
//! ```text
//! C0 = (coordinate1 + ratio * coordinate2)_initial
//! C = (coordinate1 + ratio * coordinate2) - C0 = 0
//! J = [J1 ratio * J2]
//! K = J * invM * JT
//!   = J1 * invM1 * J1T + ratio * ratio * J2 * invM2 * J2T
//! ```
//! Revolute: `coordinate = rotation`, `J = [0 0 1 0 0 -1]`.
//! Prismatic: `coordinate = dot(p - pg, ug)`,
//! `J = [ug cross(r, ug) -ug -cross(rg, ug)]`.
//!
//! Body A and C belong to the first joint (C is its reference body), B and
//! D to the second. The joints must outlive the gear.

use glam::Vec2;

use crate::dynamics::body::{Body, BodyHandle};
use crate::dynamics::time_step::SolverData;
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::{cross, Rot};

use super::{Joint, JointHandle, JointKind, SolverBody};

#[derive(Debug, Clone, PartialEq)]
pub struct GearJointDef {
    /// A revolute or prismatic joint.
    pub joint1: JointHandle,
    /// A revolute or prismatic joint.
    pub joint2: JointHandle,
    pub ratio: f32,
}

impl GearJointDef {
    pub fn new(joint1: JointHandle, joint2: JointHandle, ratio: f32) -> Self {
        Self {
            joint1,
            joint2,
            ratio,
        }
    }
}

/// Kind of joint driving one side of the gear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GearInput {
    Revolute,
    Prismatic,
}

/// Anchors and axis read from one input joint.
struct InputFrame {
    input: GearInput,
    /// Reference body (the input joint's A).
    reference: BodyHandle,
    /// Driven body (the input joint's B).
    driven: BodyHandle,
    local_anchor_ref: Vec2,
    local_anchor_driven: Vec2,
    reference_angle: f32,
    local_axis: Vec2,
}

impl InputFrame {
    fn read(joint: &Joint) -> PhysicsResult<Self> {
        let (input, anchor_ref, anchor_driven, reference_angle, axis) = match &joint.kind {
            JointKind::Revolute(r) => (
                GearInput::Revolute,
                r.local_anchor_a,
                r.local_anchor_b,
                r.reference_angle,
                Vec2::ZERO,
            ),
            JointKind::Prismatic(p) => (
                GearInput::Prismatic,
                p.local_anchor_a,
                p.local_anchor_b,
                p.reference_angle,
                p.local_x_axis_a,
            ),
            _ => return Err(PhysicsError::InvalidGearInput),
        };
        Ok(Self {
            input,
            reference: joint.body_a,
            driven: joint.body_b,
            local_anchor_ref: anchor_ref,
            local_anchor_driven: anchor_driven,
            reference_angle,
            local_axis: axis,
        })
    }

    /// Current coordinate of the input joint.
    fn coordinate(&self, bodies: &[Option<Body>]) -> PhysicsResult<f32> {
        let lookup = |h: BodyHandle| {
            bodies
                .get(h.0)
                .and_then(Option::as_ref)
                .ok_or(PhysicsError::InvalidBodyHandle(h.0))
        };
        let driven = lookup(self.driven)?;
        let reference = lookup(self.reference)?;

        Ok(match self.input {
            GearInput::Revolute => driven.sweep.a - reference.sweep.a - self.reference_angle,
            GearInput::Prismatic => {
                let (xf_d, xf_r) = (driven.xf, reference.xf);
                let p_r = self.local_anchor_ref;
                let p_d = xf_r
                    .q
                    .apply_inv(xf_d.q.apply(self.local_anchor_driven) + (xf_d.p - xf_r.p));
                (p_d - p_r).dot(self.local_axis)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GearJoint {
    pub(crate) joint1: JointHandle,
    pub(crate) joint2: JointHandle,
    type_a: GearInput,
    type_b: GearInput,

    pub(crate) body_c: BodyHandle,
    pub(crate) body_d: BodyHandle,

    // Solver shared.
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    local_anchor_c: Vec2,
    local_anchor_d: Vec2,

    local_axis_c: Vec2,
    local_axis_d: Vec2,

    reference_angle_a: f32,
    reference_angle_b: f32,

    constant: f32,
    ratio: f32,

    impulse: f32,

    // Solver temporaries.
    a: SolverBody,
    b: SolverBody,
    c: SolverBody,
    d: SolverBody,
    jv_ac: Vec2,
    jv_bd: Vec2,
    jw_a: f32,
    jw_b: f32,
    jw_c: f32,
    jw_d: f32,
    mass: f32,
}

impl GearJoint {
    /// Build a gear from two existing joints, reading their current
    /// coordinates. Returns the gear with its driven bodies A and B.
    pub(crate) fn new(
        def: &GearJointDef,
        joint1: &Joint,
        joint2: &Joint,
        bodies: &[Option<Body>],
    ) -> PhysicsResult<(Self, BodyHandle, BodyHandle)> {
        let first = InputFrame::read(joint1)?;
        let second = InputFrame::read(joint2)?;

        let coordinate_a = first.coordinate(bodies)?;
        let coordinate_b = second.coordinate(bodies)?;

        let gear = Self {
            joint1: def.joint1,
            joint2: def.joint2,
            type_a: first.input,
            type_b: second.input,
            body_c: first.reference,
            body_d: second.reference,
            local_anchor_a: first.local_anchor_driven,
            local_anchor_b: second.local_anchor_driven,
            local_anchor_c: first.local_anchor_ref,
            local_anchor_d: second.local_anchor_ref,
            local_axis_c: first.local_axis,
            local_axis_d: second.local_axis,
            reference_angle_a: first.reference_angle,
            reference_angle_b: second.reference_angle,
            constant: coordinate_a + def.ratio * coordinate_b,
            ratio: def.ratio,
            impulse: 0.0,
            a: SolverBody::default(),
            b: SolverBody::default(),
            c: SolverBody::default(),
            d: SolverBody::default(),
            jv_ac: Vec2::ZERO,
            jv_bd: Vec2::ZERO,
            jw_a: 0.0,
            jw_b: 0.0,
            jw_c: 0.0,
            jw_d: 0.0,
            mass: 0.0,
        };
        Ok((gear, first.driven, second.driven))
    }

    pub fn joint1(&self) -> JointHandle {
        self.joint1
    }

    pub fn joint2(&self) -> JointHandle {
        self.joint2
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        debug_assert!(ratio.is_finite());
        self.ratio = ratio;
    }

    pub fn body_c(&self) -> BodyHandle {
        self.body_c
    }

    pub fn body_d(&self) -> BodyHandle {
        self.body_d
    }

    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        (inv_dt * self.impulse) * self.jv_ac
    }

    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse * self.jw_a
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData,
        a: SolverBody,
        b: SolverBody,
        c: SolverBody,
        d: SolverBody,
    ) {
        self.a = a;
        self.b = b;
        self.c = c;
        self.d = d;

        let a_a = data.positions[a.index].a;
        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;
        let a_b = data.positions[b.index].a;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;
        let a_c = data.positions[c.index].a;
        let mut v_c = data.velocities[c.index].v;
        let mut w_c = data.velocities[c.index].w;
        let a_d = data.positions[d.index].a;
        let mut v_d = data.velocities[d.index].v;
        let mut w_d = data.velocities[d.index].w;

        let q_a = Rot::from_angle(a_a);
        let q_b = Rot::from_angle(a_b);
        let q_c = Rot::from_angle(a_c);
        let q_d = Rot::from_angle(a_d);

        self.mass = 0.0;

        match self.type_a {
            GearInput::Revolute => {
                self.jv_ac = Vec2::ZERO;
                self.jw_a = 1.0;
                self.jw_c = 1.0;
                self.mass += a.inv_i + c.inv_i;
            }
            GearInput::Prismatic => {
                let u = q_c.apply(self.local_axis_c);
                let r_c = q_c.apply(self.local_anchor_c - c.local_center);
                let r_a = q_a.apply(self.local_anchor_a - a.local_center);
                self.jv_ac = u;
                self.jw_c = cross(r_c, u);
                self.jw_a = cross(r_a, u);
                self.mass += c.inv_mass
                    + a.inv_mass
                    + c.inv_i * self.jw_c * self.jw_c
                    + a.inv_i * self.jw_a * self.jw_a;
            }
        }

        match self.type_b {
            GearInput::Revolute => {
                self.jv_bd = Vec2::ZERO;
                self.jw_b = self.ratio;
                self.jw_d = self.ratio;
                self.mass += self.ratio * self.ratio * (b.inv_i + d.inv_i);
            }
            GearInput::Prismatic => {
                let u = q_d.apply(self.local_axis_d);
                let r_d = q_d.apply(self.local_anchor_d - d.local_center);
                let r_b = q_b.apply(self.local_anchor_b - b.local_center);
                self.jv_bd = self.ratio * u;
                self.jw_d = self.ratio * cross(r_d, u);
                self.jw_b = self.ratio * cross(r_b, u);
                self.mass += self.ratio * self.ratio * (d.inv_mass + b.inv_mass)
                    + d.inv_i * self.jw_d * self.jw_d
                    + b.inv_i * self.jw_b * self.jw_b;
            }
        }

        // Compute effective mass.
        self.mass = if self.mass > 0.0 { 1.0 / self.mass } else { 0.0 };

        if data.step.warm_starting {
            let impulse = self.impulse;
            v_a += (a.inv_mass * impulse) * self.jv_ac;
            w_a += a.inv_i * impulse * self.jw_a;
            v_b += (b.inv_mass * impulse) * self.jv_bd;
            w_b += b.inv_i * impulse * self.jw_b;
            v_c -= (c.inv_mass * impulse) * self.jv_ac;
            w_c -= c.inv_i * impulse * self.jw_c;
            v_d -= (d.inv_mass * impulse) * self.jv_bd;
            w_d -= d.inv_i * impulse * self.jw_d;
        } else {
            self.impulse = 0.0;
        }

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
        data.velocities[c.index].v = v_c;
        data.velocities[c.index].w = w_c;
        data.velocities[d.index].v = v_d;
        data.velocities[d.index].w = w_d;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (a, b, c, d) = (self.a, self.b, self.c, self.d);
        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;
        let mut v_c = data.velocities[c.index].v;
        let mut w_c = data.velocities[c.index].w;
        let mut v_d = data.velocities[d.index].v;
        let mut w_d = data.velocities[d.index].w;

        let mut cdot = self.jv_ac.dot(v_a - v_c) + self.jv_bd.dot(v_b - v_d);
        cdot += (self.jw_a * w_a - self.jw_c * w_c) + (self.jw_b * w_b - self.jw_d * w_d);

        let impulse = -self.mass * cdot;
        self.impulse += impulse;

        v_a += (a.inv_mass * impulse) * self.jv_ac;
        w_a += a.inv_i * impulse * self.jw_a;
        v_b += (b.inv_mass * impulse) * self.jv_bd;
        w_b += b.inv_i * impulse * self.jw_b;
        v_c -= (c.inv_mass * impulse) * self.jv_ac;
        w_c -= c.inv_i * impulse * self.jw_c;
        v_d -= (d.inv_mass * impulse) * self.jv_bd;
        w_d -= d.inv_i * impulse * self.jw_d;

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
        data.velocities[c.index].v = v_c;
        data.velocities[c.index].w = w_c;
        data.velocities[d.index].v = v_d;
        data.velocities[d.index].w = w_d;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let (a, b, c, d) = (self.a, self.b, self.c, self.d);
        let mut c_a = data.positions[a.index].c;
        let mut a_a = data.positions[a.index].a;
        let mut c_b = data.positions[b.index].c;
        let mut a_b = data.positions[b.index].a;
        let mut c_c = data.positions[c.index].c;
        let mut a_c = data.positions[c.index].a;
        let mut c_d = data.positions[d.index].c;
        let mut a_d = data.positions[d.index].a;

        let q_a = Rot::from_angle(a_a);
        let q_b = Rot::from_angle(a_b);
        let q_c = Rot::from_angle(a_c);
        let q_d = Rot::from_angle(a_d);

        let (jv_ac, jw_a, jw_c, coordinate_a, mass_a) = match self.type_a {
            GearInput::Revolute => (
                Vec2::ZERO,
                1.0,
                1.0,
                a_a - a_c - self.reference_angle_a,
                a.inv_i + c.inv_i,
            ),
            GearInput::Prismatic => {
                let u = q_c.apply(self.local_axis_c);
                let r_c = q_c.apply(self.local_anchor_c - c.local_center);
                let r_a = q_a.apply(self.local_anchor_a - a.local_center);
                let jw_c = cross(r_c, u);
                let jw_a = cross(r_a, u);
                let mass = c.inv_mass + a.inv_mass + c.inv_i * jw_c * jw_c + a.inv_i * jw_a * jw_a;

                let p_c = self.local_anchor_c - c.local_center;
                let p_a = q_c.apply_inv(r_a + (c_a - c_c));
                (u, jw_a, jw_c, (p_a - p_c).dot(self.local_axis_c), mass)
            }
        };

        let (jv_bd, jw_b, jw_d, coordinate_b, mass_b) = match self.type_b {
            GearInput::Revolute => (
                Vec2::ZERO,
                self.ratio,
                self.ratio,
                a_b - a_d - self.reference_angle_b,
                self.ratio * self.ratio * (b.inv_i + d.inv_i),
            ),
            GearInput::Prismatic => {
                let u = q_d.apply(self.local_axis_d);
                let r_d = q_d.apply(self.local_anchor_d - d.local_center);
                let r_b = q_b.apply(self.local_anchor_b - b.local_center);
                let jw_d = self.ratio * cross(r_d, u);
                let jw_b = self.ratio * cross(r_b, u);
                let mass = self.ratio * self.ratio * (d.inv_mass + b.inv_mass)
                    + d.inv_i * jw_d * jw_d
                    + b.inv_i * jw_b * jw_b;

                let p_d = self.local_anchor_d - d.local_center;
                let p_b = q_d.apply_inv(r_b + (c_b - c_d));
                (
                    self.ratio * u,
                    jw_b,
                    jw_d,
                    (p_b - p_d).dot(self.local_axis_d),
                    mass,
                )
            }
        };

        let mass = mass_a + mass_b;
        let error = (coordinate_a + self.ratio * coordinate_b) - self.constant;

        let impulse = if mass > 0.0 { -error / mass } else { 0.0 };

        c_a += a.inv_mass * impulse * jv_ac;
        a_a += a.inv_i * impulse * jw_a;
        c_b += b.inv_mass * impulse * jv_bd;
        a_b += b.inv_i * impulse * jw_b;
        c_c -= c.inv_mass * impulse * jv_ac;
        a_c -= c.inv_i * impulse * jw_c;
        c_d -= d.inv_mass * impulse * jv_bd;
        a_d -= d.inv_i * impulse * jw_d;

        data.positions[a.index].c = c_a;
        data.positions[a.index].a = a_a;
        data.positions[b.index].c = c_b;
        data.positions[b.index].a = a_b;
        data.positions[c.index].c = c_c;
        data.positions[c.index].a = a_c;
        data.positions[d.index].c = c_d;
        data.positions[d.index].a = a_d;

        // No linear error is tracked for gears.
        true
    }
}
