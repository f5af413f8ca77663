//! Events queued during a step and drained by the caller.

use super::fixture::FixtureHandle;
use super::joints::JointHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhysicsEvent {
    /// Two fixtures started touching.
    ContactBegin {
        fixture_a: FixtureHandle,
        fixture_b: FixtureHandle,
    },
    /// Two fixtures stopped touching, or their contact was destroyed while
    /// touching.
    ContactEnd {
        fixture_a: FixtureHandle,
        fixture_b: FixtureHandle,
    },
    /// A joint exceeded its break force or torque and was disabled.
    JointBreak {
        joint: JointHandle,
        force: f32,
        torque: f32,
    },
}
