//! Joints constrain the relative motion of two bodies.
//!
//! Every joint shares a header (bodies, collision and breakage settings)
//! and a [`JointKind`] holding the type-specific state. The island solver
//! drives each kind through the same three phases:
//!
//! 1. `init_velocity_constraints`: cache masses and anchors, warm start
//! 2. `solve_velocity_constraints`: apply impulses, run every iteration
//! 3. `solve_position_constraints`: push positions back, report success

pub mod distance;
pub mod gear;
pub mod prismatic;
pub mod revolute;
pub mod weld;

use glam::Vec2;

use super::body::{Body, BodyHandle};
use super::time_step::SolverData;

pub use distance::{DistanceJoint, DistanceJointDef};
pub use gear::{GearJoint, GearJointDef};
pub use prismatic::{PrismaticJoint, PrismaticJointDef};
pub use revolute::{RevoluteJoint, RevoluteJointDef};
pub use weld::{WeldJoint, WeldJointDef};

/// Handle to a joint stored in a [`PhysicsWorld`](super::PhysicsWorld).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle(pub(crate) usize);

impl JointHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which side of a limit is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    /// Lower and upper limits coincide.
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    Revolute,
    Prismatic,
    Distance,
    Weld,
    Gear,
}

/// Per-step mass data of a body as seen by a joint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct SolverBody {
    /// Index into the island position/velocity arrays.
    pub index: usize,
    pub local_center: Vec2,
    pub inv_mass: f32,
    pub inv_i: f32,
}

impl SolverBody {
    pub fn of(bodies: &[Option<Body>], handle: BodyHandle) -> Self {
        bodies
            .get(handle.0)
            .and_then(Option::as_ref)
            .map(|b| Self {
                index: b.island_index,
                local_center: b.sweep.local_center,
                inv_mass: b.inv_mass,
                inv_i: b.inv_i,
            })
            .unwrap_or_default()
    }
}

/// Type-specific joint parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum JointDefKind {
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Distance(DistanceJointDef),
    Weld(WeldJointDef),
    Gear(GearJointDef),
}

/// Construction parameters for a joint.
#[derive(Debug, Clone, PartialEq)]
pub struct JointDef {
    /// For gear joints this is replaced by the driven body of `joint1`.
    pub body_a: BodyHandle,
    /// For gear joints this is replaced by the driven body of `joint2`.
    pub body_b: BodyHandle,
    /// Whether the connected bodies still collide with each other.
    pub collide_connected: bool,
    /// Reaction force above which the joint breaks. Infinite by default.
    pub break_force: f32,
    /// Reaction torque above which the joint breaks. Infinite by default.
    pub break_torque: f32,
    pub kind: JointDefKind,
}

impl JointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, kind: impl Into<JointDefKind>) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            break_force: f32::INFINITY,
            break_torque: f32::INFINITY,
            kind: kind.into(),
        }
    }

    pub fn with_collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }

    pub fn with_break_force(mut self, force: f32) -> Self {
        self.break_force = force;
        self
    }

    pub fn with_break_torque(mut self, torque: f32) -> Self {
        self.break_torque = torque;
        self
    }
}

macro_rules! impl_def_from {
    ($($def:ident => $variant:ident),* $(,)?) => {
        $(impl From<$def> for JointDefKind {
            fn from(def: $def) -> Self {
                JointDefKind::$variant(def)
            }
        })*
    };
}

impl_def_from!(
    RevoluteJointDef => Revolute,
    PrismaticJointDef => Prismatic,
    DistanceJointDef => Distance,
    WeldJointDef => Weld,
    GearJointDef => Gear,
);

/// Type-specific joint state.
#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Distance(DistanceJoint),
    Weld(WeldJoint),
    Gear(GearJoint),
}

/// A joint between two bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) collide_connected: bool,
    pub(crate) enabled: bool,
    pub(crate) break_force: f32,
    pub(crate) break_torque: f32,
    pub(crate) island_flag: bool,
    pub(crate) kind: JointKind,
}

impl Joint {
    pub(crate) fn new(def: &JointDef, kind: JointKind) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            enabled: true,
            break_force: def.break_force,
            break_torque: def.break_torque,
            island_flag: false,
            kind,
        }
    }

    pub fn joint_type(&self) -> JointType {
        match self.kind {
            JointKind::Revolute(_) => JointType::Revolute,
            JointKind::Prismatic(_) => JointType::Prismatic,
            JointKind::Distance(_) => JointType::Distance,
            JointKind::Weld(_) => JointType::Weld,
            JointKind::Gear(_) => JointType::Gear,
        }
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    /// Every body the joint moves: A and B, plus the two reference bodies
    /// of a gear.
    pub fn bodies(&self) -> impl Iterator<Item = BodyHandle> {
        let (c, d) = match &self.kind {
            JointKind::Gear(g) => (Some(g.body_c), Some(g.body_d)),
            _ => (None, None),
        };
        [Some(self.body_a), Some(self.body_b), c, d]
            .into_iter()
            .flatten()
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn break_force(&self) -> f32 {
        self.break_force
    }

    pub fn break_torque(&self) -> f32 {
        self.break_torque
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Mutable access to motor and limit settings. Wake the bodies after
    /// changing them if they may be asleep.
    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// Whether either threshold is finite.
    pub fn is_breakable(&self) -> bool {
        self.break_force.is_finite() || self.break_torque.is_finite()
    }

    /// Reaction force on body B at the anchor, from the last step's impulses.
    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        match &self.kind {
            JointKind::Revolute(j) => j.reaction_force(inv_dt),
            JointKind::Prismatic(j) => j.reaction_force(inv_dt),
            JointKind::Distance(j) => j.reaction_force(inv_dt),
            JointKind::Weld(j) => j.reaction_force(inv_dt),
            JointKind::Gear(j) => j.reaction_force(inv_dt),
        }
    }

    /// Reaction torque on body B, from the last step's impulses.
    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        match &self.kind {
            JointKind::Revolute(j) => j.reaction_torque(inv_dt),
            JointKind::Prismatic(j) => j.reaction_torque(inv_dt),
            JointKind::Distance(j) => j.reaction_torque(inv_dt),
            JointKind::Weld(j) => j.reaction_torque(inv_dt),
            JointKind::Gear(j) => j.reaction_torque(inv_dt),
        }
    }

    /// Compare the reaction against the break thresholds. Returns the
    /// measured force and torque when the joint is overloaded.
    pub(crate) fn check_overload(&self, inv_dt: f32) -> Option<(f32, f32)> {
        if !self.is_breakable() {
            return None;
        }
        let force = self.reaction_force(inv_dt).length();
        let torque = self.reaction_torque(inv_dt).abs();
        (force > self.break_force || torque > self.break_torque).then_some((force, torque))
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData,
        bodies: &[Option<Body>],
    ) {
        let (a, b) = (
            SolverBody::of(bodies, self.body_a),
            SolverBody::of(bodies, self.body_b),
        );
        match &mut self.kind {
            JointKind::Revolute(j) => j.init_velocity_constraints(data, a, b),
            JointKind::Prismatic(j) => j.init_velocity_constraints(data, a, b),
            JointKind::Distance(j) => j.init_velocity_constraints(data, a, b),
            JointKind::Weld(j) => j.init_velocity_constraints(data, a, b),
            JointKind::Gear(j) => {
                let (c, d) = (
                    SolverBody::of(bodies, j.body_c),
                    SolverBody::of(bodies, j.body_d),
                );
                j.init_velocity_constraints(data, a, b, c, d)
            }
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        match &mut self.kind {
            JointKind::Revolute(j) => j.solve_velocity_constraints(data),
            JointKind::Prismatic(j) => j.solve_velocity_constraints(data),
            JointKind::Distance(j) => j.solve_velocity_constraints(data),
            JointKind::Weld(j) => j.solve_velocity_constraints(data),
            JointKind::Gear(j) => j.solve_velocity_constraints(data),
        }
    }

    /// Returns true when the position error is within tolerance.
    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        match &mut self.kind {
            JointKind::Revolute(j) => j.solve_position_constraints(data),
            JointKind::Prismatic(j) => j.solve_position_constraints(data),
            JointKind::Distance(j) => j.solve_position_constraints(data),
            JointKind::Weld(j) => j.solve_position_constraints(data),
            JointKind::Gear(j) => j.solve_position_constraints(data),
        }
    }
}
