//! Global tuning constants.
//!
//! Lengths are in meters and assume objects between 0.1 and 10 meters.

use std::f32::consts::PI;

/// Maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Fattening applied to broadphase AABBs so small motions don't churn pairs.
pub const AABB_EXTENSION: f32 = 0.1;

/// Collision and constraint tolerance.
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular collision and constraint tolerance.
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * PI;

/// Skin radius of polygons, edges and chains.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Maximum number of sub-steps per contact in continuous physics.
pub const MAX_SUB_STEPS: u32 = 8;

/// Maximum number of contacts handled in one TOI island.
pub const MAX_TOI_CONTACTS: usize = 32;

/// Relative approach speed below which collisions are inelastic.
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Maximum linear position correction per position iteration.
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Maximum angular position correction per position iteration.
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * PI;

/// Maximum translation of a body per step.
pub const MAX_TRANSLATION: f32 = 2.0;
pub const MAX_TRANSLATION_SQUARED: f32 = MAX_TRANSLATION * MAX_TRANSLATION;

/// Maximum rotation of a body per step.
pub const MAX_ROTATION: f32 = 0.5 * PI;
pub const MAX_ROTATION_SQUARED: f32 = MAX_ROTATION * MAX_ROTATION;

/// Fraction of overlap resolved per position iteration.
pub const BAUMGARTE: f32 = 0.2;
pub const TOI_BAUMGARTE: f32 = 0.75;

/// Time a body must be still before it sleeps.
pub const TIME_TO_SLEEP: f32 = 0.5;

/// Linear speed below which a body is considered still.
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// Angular speed below which a body is considered still.
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * PI;
