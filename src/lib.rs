//! Rein 2D Physics
//!
//! A 2D rigid body physics core: shapes, collision detection, continuous
//! collision and an island based sequential impulse solver with joints.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **math** - Rotations, transforms, sweeps and small matrix solves
//! 2. **settings** - Global tolerances shared by every layer
//! 3. **collision** - Shapes, AABB broadphase, manifolds, GJK distance and
//!    time of impact
//! 4. **dynamics** - Bodies, fixtures, contacts, joints, the island solver
//!    and [`PhysicsWorld`]
//!
//! # Example
//!
//! ```
//! use rein2d::{BodyDef, FixtureDef, PhysicsWorld, PolygonShape};
//! use glam::Vec2;
//!
//! let mut world = PhysicsWorld::default();
//! let ground = world.create_body(&BodyDef::new_static(Vec2::ZERO));
//! world
//!     .create_fixture(ground, FixtureDef::new(PolygonShape::new_box(10.0, 0.5).unwrap()))
//!     .unwrap();
//!
//! let crate_box = world.create_body(&BodyDef::new_dynamic(Vec2::new(0.0, 4.0)));
//! world
//!     .create_fixture(
//!         crate_box,
//!         FixtureDef::new(PolygonShape::new_box(0.5, 0.5).unwrap()).with_density(1.0),
//!     )
//!     .unwrap();
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0).unwrap();
//! }
//! assert!(world.body(crate_box).unwrap().position().y < 4.0);
//! ```

pub mod collision;
pub mod dynamics;
pub mod error;
pub mod math;
pub mod settings;

// Re-export commonly used types
pub use collision::{
    Aabb, ChainShape, CircleShape, EdgeShape, Manifold, MassData, PolygonShape, Shape, ShapeType,
};

pub use dynamics::{
    Body, BodyDef, BodyHandle, BodyType, Contact, ContactId, DistanceJointDef, Filter, Fixture,
    FixtureDef, FixtureHandle, GearJointDef, Joint, JointDef, JointHandle, JointKind, JointType,
    PhysicsConfig, PhysicsEvent, PhysicsWorld, PrismaticJointDef, RayCastHit, RevoluteJointDef,
    WeldJointDef,
};

pub use error::{PhysicsError, PhysicsResult};
pub use math::{Rot, Sweep, Transform};

// Re-export glam for convenience
pub use glam;
