//! Error types for physics construction and world operations.
//!
//! Only invalid construction arguments surface as errors. Geometric
//! degeneracy produces empty manifolds, time-of-impact exhaustion is reported
//! through [`ToiOutputState::Failed`](crate::collision::ToiOutputState), and
//! overloaded joints break through the event queue.

use thiserror::Error;

/// Errors returned by fallible constructors and world mutations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// A circle or rounding radius was zero, negative or not finite.
    #[error("invalid radius: {0} (must be positive and finite)")]
    InvalidRadius(f32),

    /// A polygon collapsed to fewer than three hull vertices.
    #[error("degenerate polygon: {count} usable vertices (need at least 3)")]
    DegeneratePolygon {
        /// Number of vertices left after welding and hull construction.
        count: usize,
    },

    /// Box half-extents were zero, negative or not finite.
    #[error("invalid box half-extents: {half_width} x {half_height} (must be positive and finite)")]
    InvalidHalfExtents {
        half_width: f32,
        half_height: f32,
    },

    /// A polygon was given more vertices than a proxy can hold.
    #[error("polygon has {count} vertices, maximum is {max}")]
    TooManyVertices {
        /// Number of vertices supplied.
        count: usize,
        /// Maximum supported vertex count.
        max: usize,
    },

    /// A chain shape could not be built from the given vertices.
    #[error("invalid chain: {reason}")]
    InvalidChain {
        /// What was wrong with the vertex list.
        reason: String,
    },

    /// Fixture density was negative or not finite.
    #[error("invalid density: {0} (must be non-negative and finite)")]
    InvalidDensity(f32),

    /// A joint was asked to connect a body to itself.
    #[error("a joint cannot connect a body to itself")]
    SelfJoint,

    /// A body handle does not refer to a live body.
    #[error("invalid body handle: {0}")]
    InvalidBodyHandle(usize),

    /// A fixture handle does not refer to a live fixture.
    #[error("invalid fixture handle: {0}")]
    InvalidFixtureHandle(usize),

    /// A joint handle does not refer to a live joint.
    #[error("invalid joint handle: {0}")]
    InvalidJointHandle(usize),

    /// Gear joints only compose revolute and prismatic joints.
    #[error("gear joints require two revolute or prismatic joints")]
    InvalidGearInput,

    /// The timestep passed to the world was negative or not finite.
    #[error("invalid timestep: {0} (must be non-negative and finite)")]
    InvalidTimestep(f64),
}

/// Convenience alias for `Result<T, PhysicsError>`.
pub type PhysicsResult<T> = Result<T, PhysicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PhysicsError::InvalidRadius(-1.0);
        assert!(format!("{err}").contains("-1"));

        let err = PhysicsError::DegeneratePolygon { count: 2 };
        assert_eq!(
            format!("{err}"),
            "degenerate polygon: 2 usable vertices (need at least 3)"
        );

        let err = PhysicsError::InvalidHalfExtents {
            half_width: 0.0,
            half_height: 1.0,
        };
        assert!(format!("{err}").starts_with("invalid box half-extents: 0 x 1"));

        let err = PhysicsError::SelfJoint;
        assert_eq!(format!("{err}"), "a joint cannot connect a body to itself");
    }
}
