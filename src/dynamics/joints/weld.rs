//! Weld joint: glues two bodies together, optionally with a soft angular
//! spring.
//!
//! Point-to-point
//! ```text
//! C = p2 - p1
//! J = [-I -r1_skew I r2_skew]
//! ```
//! Angle
//! ```text
//! C = angle2 - angle1 - referenceAngle
//! J = [0 0 -1 0 0 1]
//! ```

use std::f32::consts::PI;

use glam::{Mat3, Vec2, Vec3};

use crate::dynamics::body::Body;
use crate::dynamics::time_step::SolverData;
use crate::math::{
    cross, cross_sv, inverse22_of33, mul22_of33, solve22_of33, solve33, sym_inverse33, Rot,
};
use crate::settings::{ANGULAR_SLOP, LINEAR_SLOP};

use super::SolverBody;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeldJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f32,
    /// Angular spring frequency; zero makes the weld rigid.
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl WeldJointDef {
    pub fn initialize(body_a: &Body, body_b: &Body, anchor: Vec2) -> Self {
        Self {
            local_anchor_a: body_a.local_point(anchor),
            local_anchor_b: body_b.local_point(anchor),
            reference_angle: body_b.angle() - body_a.angle(),
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
pub struct WeldJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    reference_angle: f32,
    frequency_hz: f32,
    damping_ratio: f32,
    bias: f32,
    gamma: f32,
    impulse: Vec3,

    // Solver temporaries.
    a: SolverBody,
    b: SolverBody,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat3,
}

/// Effective mass of the point and angle rows.
fn weld_mass(r_a: Vec2, r_b: Vec2, a: &SolverBody, b: &SolverBody) -> Mat3 {
    let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
    Mat3::from_cols(
        Vec3::new(
            m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
            -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
            -r_a.y * i_a - r_b.y * i_b,
        ),
        Vec3::new(
            -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
            m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b,
            r_a.x * i_a + r_b.x * i_b,
        ),
        Vec3::new(
            -r_a.y * i_a - r_b.y * i_b,
            r_a.x * i_a + r_b.x * i_b,
            i_a + i_b,
        ),
    )
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            bias: 0.0,
            gamma: 0.0,
            impulse: Vec3::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat3::ZERO,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
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
        inv_dt * Vec2::new(self.impulse.x, self.impulse.y)
    }

    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse.z
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData,
        a: SolverBody,
        b: SolverBody,
    ) {
        self.a = a;
        self.b = b;

        let a_a = data.positions[a.index].a;
        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;
        let a_b = data.positions[b.index].a;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        let q_a = Rot::from_angle(a_a);
        let q_b = Rot::from_angle(a_b);

        self.r_a = q_a.apply(self.local_anchor_a - a.local_center);
        self.r_b = q_b.apply(self.local_anchor_b - b.local_center);

        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let k = weld_mass(self.r_a, self.r_b, &a, &b);

        if self.frequency_hz > 0.0 {
            self.mass = inverse22_of33(&k);

            let mut inv_m = i_a + i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };

            let c = a_b - a_a - self.reference_angle;

            let omega = 2.0 * PI * self.frequency_hz;
            let d = 2.0 * m * self.damping_ratio * omega;
            let stiffness = m * omega * omega;

            let h = data.step.dt;
            self.gamma = h * (d + h * stiffness);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * stiffness * self.gamma;

            inv_m += self.gamma;
            self.mass.z_axis.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else if k.z_axis.z == 0.0 {
            self.mass = inverse22_of33(&k);
            self.gamma = 0.0;
            self.bias = 0.0;
        } else {
            self.mass = sym_inverse33(&k);
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = Vec2::new(self.impulse.x, self.impulse.y);
            v_a -= m_a * p;
            w_a -= i_a * (cross(self.r_a, p) + self.impulse.z);
            v_b += m_b * p;
            w_b += i_b * (cross(self.r_b, p) + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
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

        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let (r_a, r_b) = (self.r_a, self.r_b);

        if self.frequency_hz > 0.0 {
            let cdot2 = w_b - w_a;

            let impulse2 = -self.mass.z_axis.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;

            w_a -= i_a * impulse2;
            w_b += i_b * impulse2;

            let cdot1 = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);

            let impulse1 = -mul22_of33(&self.mass, cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            let p = impulse1;

            v_a -= m_a * p;
            w_a -= i_a * cross(r_a, p);
            v_b += m_b * p;
            w_b += i_b * cross(r_b, p);
        } else {
            let cdot1 = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let cdot2 = w_b - w_a;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let impulse = -(self.mass * cdot);
            self.impulse += impulse;

            let p = Vec2::new(impulse.x, impulse.y);

            v_a -= m_a * p;
            w_a -= i_a * (cross(r_a, p) + impulse.z);
            v_b += m_b * p;
            w_b += i_b * (cross(r_b, p) + impulse.z);
        }

        data.velocities[ia].v = v_a;
        data.velocities[ia].w = w_a;
        data.velocities[ib].v = v_b;
        data.velocities[ib].w = w_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let (ia, ib) = (self.a.index, self.b.index);
        let mut c_a = data.positions[ia].c;
        let mut a_a = data.positions[ia].a;
        let mut c_b = data.positions[ib].c;
        let mut a_b = data.positions[ib].a;

        let q_a = Rot::from_angle(a_a);
        let q_b = Rot::from_angle(a_b);

        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);

        let k = weld_mass(r_a, r_b, &self.a, &self.b);
        let c1 = c_b + r_b - c_a - r_a;
        let position_error = c1.length();
        let angular_error;

        if self.frequency_hz > 0.0 {
            angular_error = 0.0;

            let p = -solve22_of33(&k, c1);

            c_a -= m_a * p;
            a_a -= i_a * cross(r_a, p);
            c_b += m_b * p;
            a_b += i_b * cross(r_b, p);
        } else {
            let c2 = a_b - a_a - self.reference_angle;
            angular_error = c2.abs();

            let impulse = if k.z_axis.z > 0.0 {
                -solve33(&k, Vec3::new(c1.x, c1.y, c2))
            } else {
                (-solve22_of33(&k, c1)).extend(0.0)
            };

            let p = Vec2::new(impulse.x, impulse.y);

            c_a -= m_a * p;
            a_a -= i_a * (cross(r_a, p) + impulse.z);
            c_b += m_b * p;
            a_b += i_b * (cross(r_b, p) + impulse.z);
        }

        data.positions[ia].c = c_a;
        data.positions[ia].a = a_a;
        data.positions[ib].c = c_b;
        data.positions[ib].a = a_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}
