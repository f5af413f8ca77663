//! Rigid body dynamics: bodies, fixtures, contacts, joints and the world
//! that steps them.
//!
//! # Architecture
//!
//! [`PhysicsWorld::step`] runs a fixed timestep loop. Each fixed step:
//!
//! 1. Create contacts for new broadphase pairs
//! 2. Update contact manifolds (narrowphase), destroy stale contacts
//! 3. Build islands by depth-first search over awake bodies
//! 4. Per island: integrate velocities, solve joint and contact velocity
//!    constraints, check joint breakage, integrate positions, solve position
//!    constraints, update sleep timers
//! 5. Synchronize broadphase proxies
//! 6. Time of impact sub-steps for fast bodies
//! 7. Clear force accumulators

pub mod body;
pub mod contact;
pub(crate) mod contact_manager;
pub mod contact_solver;
pub mod event;
pub mod fixture;
pub mod island;
pub mod joints;
pub mod time_step;
pub mod world;

use glam::Vec2;

pub use body::{Body, BodyDef, BodyHandle, BodyType};
pub use contact::{mix_friction, mix_restitution, Contact, ContactId};
pub use event::PhysicsEvent;
pub use fixture::{Filter, Fixture, FixtureDef, FixtureHandle};
pub use joints::{
    DistanceJoint, DistanceJointDef, GearJoint, GearJointDef, Joint, JointDef, JointDefKind,
    JointHandle, JointKind, JointType, LimitState, PrismaticJoint, PrismaticJointDef,
    RevoluteJoint, RevoluteJointDef, WeldJoint, WeldJointDef,
};
pub use time_step::TimeStep;
pub use world::{PhysicsWorld, RayCastHit};

/// Configuration for the physics simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsConfig {
    /// Gravity vector. Default: (0, -10).
    pub gravity: Vec2,
    /// Fixed timestep for physics updates in seconds. Default: 1/60.
    pub fixed_timestep: f64,
    /// Maximum number of fixed steps per [`PhysicsWorld::step`] call. Default: 4.
    pub max_substeps: u32,
    /// Velocity solver iterations per step. Default: 8.
    pub velocity_iterations: u32,
    /// Position solver iterations per step. Default: 3.
    pub position_iterations: u32,
    /// Seed the solver with last step's impulses. Default: true.
    pub warm_starting: bool,
    /// Run time of impact sub-steps to stop fast bodies tunneling.
    /// Default: true.
    pub continuous_physics: bool,
    /// Resolve a single TOI event per fixed step and finish the rest on the
    /// next one. Useful for debugging. Default: false.
    pub sub_stepping: bool,
    /// Let bodies at rest fall asleep. Default: true.
    pub allow_sleep: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 4,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            allow_sleep: true,
        }
    }
}
