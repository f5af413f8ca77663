//! Islands: groups of bodies connected by touching contacts or joints that
//! are solved together and fall asleep together.
//!
//! Position and velocity are copied out of the bodies into flat arrays for
//! the duration of a solve so that joints and the contact solver index them
//! by island index instead of going through the body arena.

use glam::Vec2;
use tracing::debug;

use crate::settings::{
    ANGULAR_SLEEP_TOLERANCE, LINEAR_SLEEP_TOLERANCE, MAX_ROTATION, MAX_ROTATION_SQUARED,
    MAX_TRANSLATION, MAX_TRANSLATION_SQUARED, TIME_TO_SLEEP,
};

use super::body::{Body, BodyHandle, BodyType};
use super::contact::{Contact, ContactId};
use super::contact_solver::ContactSolver;
use super::event::PhysicsEvent;
use super::joints::{Joint, JointHandle};
use super::time_step::{Position, SolverData, TimeStep, Velocity};

#[derive(Debug, Default)]
pub struct Island {
    pub(crate) bodies: Vec<BodyHandle>,
    pub(crate) contacts: Vec<ContactId>,
    pub(crate) joints: Vec<JointHandle>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
}

/// Clamp one step of motion and integrate.
fn integrate_position(h: f32, position: &mut Position, velocity: &mut Velocity) {
    let translation = h * velocity.v;
    if translation.length_squared() > MAX_TRANSLATION_SQUARED {
        velocity.v *= MAX_TRANSLATION / translation.length();
    }

    let rotation = h * velocity.w;
    if rotation * rotation > MAX_ROTATION_SQUARED {
        velocity.w *= MAX_ROTATION / rotation.abs();
    }

    position.c += h * velocity.v;
    position.a += h * velocity.w;
}

impl Island {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Add a body and assign its island index.
    pub(crate) fn add_body(&mut self, handle: BodyHandle, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(handle);
    }

    pub(crate) fn add_contact(&mut self, id: ContactId) {
        self.contacts.push(id);
    }

    pub(crate) fn add_joint(&mut self, handle: JointHandle) {
        self.joints.push(handle);
    }

    /// Copy sweep state and velocities out of the bodies.
    fn load(&mut self, bodies: &[Option<Body>]) {
        self.positions.clear();
        self.velocities.clear();
        for handle in &self.bodies {
            let (position, velocity) = bodies
                .get(handle.0)
                .and_then(Option::as_ref)
                .map(|b| {
                    (
                        Position {
                            c: b.sweep.c,
                            a: b.sweep.a,
                        },
                        Velocity {
                            v: b.linear_velocity,
                            w: b.angular_velocity,
                        },
                    )
                })
                .unwrap_or_default();
            self.positions.push(position);
            self.velocities.push(velocity);
        }
    }

    /// Copy solved state back into the bodies.
    fn store(&self, bodies: &mut [Option<Body>]) {
        for (i, handle) in self.bodies.iter().enumerate() {
            let Some(body) = bodies.get_mut(handle.0).and_then(Option::as_mut) else {
                continue;
            };
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }
    }

    /// Solve one full step for this island.
    ///
    /// Overloaded joints are disabled and reported through `events`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn solve(
        &mut self,
        step: &TimeStep,
        gravity: Vec2,
        allow_sleep: bool,
        bodies: &mut [Option<Body>],
        contacts: &mut [Option<Contact>],
        joints: &mut [Option<Joint>],
        events: &mut Vec<PhysicsEvent>,
    ) {
        let h = step.dt;

        // Integrate velocities and apply damping.
        for handle in &self.bodies {
            let Some(b) = bodies.get_mut(handle.0).and_then(Option::as_mut) else {
                continue;
            };

            // Store positions for continuous collision.
            b.sweep.c0 = b.sweep.c;
            b.sweep.a0 = b.sweep.a;

            if b.body_type == BodyType::Dynamic {
                b.linear_velocity += h * (b.gravity_scale * gravity + b.inv_mass * b.force);
                b.angular_velocity += h * b.inv_i * b.torque;

                // Pade approximation of exp(-h * damping), stable for large
                // damping values.
                b.linear_velocity *= 1.0 / (1.0 + h * b.linear_damping);
                b.angular_velocity *= 1.0 / (1.0 + h * b.angular_damping);
            }
        }
        self.load(bodies);

        let mut contact_solver = ContactSolver::new(*step, contacts, &self.contacts, bodies);
        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        if step.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        let mut data = SolverData {
            step: *step,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };

        for handle in &self.joints {
            if let Some(joint) = joints.get_mut(handle.0).and_then(Option::as_mut) {
                joint.init_velocity_constraints(&mut data, bodies);
            }
        }

        for _ in 0..step.velocity_iterations {
            for handle in &self.joints {
                if let Some(joint) = joints.get_mut(handle.0).and_then(Option::as_mut) {
                    joint.solve_velocity_constraints(&mut data);
                }
            }
            contact_solver.solve_velocity_constraints(data.velocities);
        }

        contact_solver.store_impulses(contacts);

        for &handle in &self.joints {
            let Some(joint) = joints.get_mut(handle.0).and_then(Option::as_mut) else {
                continue;
            };
            if let Some((force, torque)) = joint.check_overload(step.inv_dt) {
                joint.enabled = false;
                debug!(joint = handle.0, force, torque, "joint broke");
                events.push(PhysicsEvent::JointBreak {
                    joint: handle,
                    force,
                    torque,
                });
            }
        }

        for (position, velocity) in data.positions.iter_mut().zip(data.velocities.iter_mut()) {
            integrate_position(h, position, velocity);
        }

        // Iterate over constraints.
        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = contact_solver.solve_position_constraints(data.positions);

            let mut joints_okay = true;
            for handle in &self.joints {
                if let Some(joint) = joints.get_mut(handle.0).and_then(Option::as_mut) {
                    if !joint.enabled {
                        continue;
                    }
                    joints_okay &= joint.solve_position_constraints(&mut data);
                }
            }

            if contacts_okay && joints_okay {
                // Exit early if the position errors are small.
                position_solved = true;
                break;
            }
        }

        self.store(bodies);

        if !allow_sleep {
            return;
        }

        let mut min_sleep_time = f32::MAX;
        let lin_tol_sqr = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
        let ang_tol_sqr = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;

        for handle in &self.bodies {
            let Some(b) = bodies.get_mut(handle.0).and_then(Option::as_mut) else {
                continue;
            };
            if b.body_type == BodyType::Static {
                continue;
            }

            if !b.auto_sleep
                || b.angular_velocity * b.angular_velocity > ang_tol_sqr
                || b.linear_velocity.length_squared() > lin_tol_sqr
            {
                b.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                b.sleep_time += h;
                min_sleep_time = min_sleep_time.min(b.sleep_time);
            }
        }

        if min_sleep_time >= TIME_TO_SLEEP && position_solved {
            for handle in &self.bodies {
                if let Some(b) = bodies.get_mut(handle.0).and_then(Option::as_mut) {
                    b.set_awake(false);
                }
            }
        }
    }

    /// Resolve the overlap left by a time of impact event between the bodies
    /// at island indices `toi_index_a` and `toi_index_b`, then advance the
    /// island through the rest of the step.
    pub(crate) fn solve_toi(
        &mut self,
        sub_step: &TimeStep,
        toi_index_a: usize,
        toi_index_b: usize,
        bodies: &mut [Option<Body>],
        contacts: &mut [Option<Contact>],
    ) {
        self.load(bodies);

        let mut contact_solver = ContactSolver::new(*sub_step, contacts, &self.contacts, bodies);

        // Solve position constraints.
        for _ in 0..sub_step.position_iterations {
            if contact_solver.solve_toi_position_constraints(
                &mut self.positions,
                toi_index_a,
                toi_index_b,
            ) {
                break;
            }
        }

        // The TOI bodies start the sub-step from the resolved state.
        for index in [toi_index_a, toi_index_b] {
            let handle = self.bodies[index];
            if let Some(b) = bodies.get_mut(handle.0).and_then(Option::as_mut) {
                b.sweep.c0 = self.positions[index].c;
                b.sweep.a0 = self.positions[index].a;
            }
        }

        // No warm starting, and TOI impulses are not stored because they can
        // be large.
        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        for _ in 0..sub_step.velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        let h = sub_step.dt;
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            integrate_position(h, position, velocity);
        }

        self.store(bodies);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::joints::{DistanceJoint, DistanceJointDef, JointDef, JointKind};

    fn single(body: Body) -> (Island, Vec<Option<Body>>) {
        let mut bodies = vec![Some(body)];
        let mut island = Island::new();
        if let Some(b) = bodies[0].as_mut() {
            island.add_body(BodyHandle(0), b);
        }
        (island, bodies)
    }

    #[test]
    fn test_gravity_integration() {
        let (mut island, mut bodies) = single(Body::new(&BodyDef::new_dynamic(Vec2::ZERO)));
        let step = TimeStep::new(0.1, 8, 3);
        island.solve(
            &step,
            Vec2::new(0.0, -10.0),
            true,
            &mut bodies,
            &mut [],
            &mut [],
            &mut Vec::new(),
        );

        let b = bodies[0].as_ref().unwrap();
        // Symplectic Euler: velocity first, then position.
        assert!((b.linear_velocity().y + 1.0).abs() < 1e-6);
        assert!((b.position().y + 0.1).abs() < 1e-6);
        assert_eq!(b.sweep.c0, Vec2::ZERO);
    }

    #[test]
    fn test_damping_and_gravity_scale() {
        let def = BodyDef::new_dynamic(Vec2::ZERO)
            .with_linear_velocity(Vec2::new(2.0, 0.0))
            .with_damping(1.0, 0.0)
            .with_gravity_scale(0.0);
        let (mut island, mut bodies) = single(Body::new(&def));
        let step = TimeStep::new(0.5, 8, 3);
        island.solve(
            &step,
            Vec2::new(0.0, -10.0),
            true,
            &mut bodies,
            &mut [],
            &mut [],
            &mut Vec::new(),
        );
        let v = bodies[0].as_ref().unwrap().linear_velocity();
        assert!((v.x - 2.0 / 1.5).abs() < 1e-6);
        assert_eq!(v.y, 0.0);
    }

    #[test]
    fn test_translation_is_clamped() {
        let def = BodyDef::new_dynamic(Vec2::ZERO).with_linear_velocity(Vec2::new(1000.0, 0.0));
        let (mut island, mut bodies) = single(Body::new(&def));
        let step = TimeStep::new(0.1, 8, 3);
        island.solve(&step, Vec2::ZERO, true, &mut bodies, &mut [], &mut [], &mut Vec::new());
        let b = bodies[0].as_ref().unwrap();
        assert!((b.position().x - MAX_TRANSLATION).abs() < 1e-4);
        assert!((b.linear_velocity().x - MAX_TRANSLATION / 0.1).abs() < 1e-2);
    }

    #[test]
    fn test_resting_body_falls_asleep() {
        let (mut island, mut bodies) = single(Body::new(&BodyDef::new_dynamic(Vec2::ZERO)));
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let mut steps = 0;
        while bodies[0].as_ref().unwrap().is_awake() {
            island.solve(&step, Vec2::ZERO, true, &mut bodies, &mut [], &mut [], &mut Vec::new());
            steps += 1;
            assert!(steps <= 40, "body never slept");
        }
        // 0.5 s of rest at 60 Hz.
        assert!(steps >= 29);
    }

    #[test]
    fn test_sleep_disallowed_keeps_body_awake() {
        let (mut island, mut bodies) = single(Body::new(&BodyDef::new_dynamic(Vec2::ZERO)));
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        for _ in 0..120 {
            island.solve(&step, Vec2::ZERO, false, &mut bodies, &mut [], &mut [], &mut Vec::new());
        }
        assert!(bodies[0].as_ref().unwrap().is_awake());
    }

    #[test]
    fn test_overloaded_joint_breaks_with_event() {
        let ground = Body::new(&BodyDef::new_static(Vec2::ZERO));
        let bob = Body::new(&BodyDef::new_dynamic(Vec2::new(0.0, -1.0)));
        let mut bodies = vec![Some(ground), Some(bob)];

        // Unit rod between the two origins.
        let rod_def = DistanceJointDef::default();
        let def = JointDef::new(BodyHandle(0), BodyHandle(1), rod_def.clone()).with_break_force(5.0);
        let rod = DistanceJoint::new(&rod_def);
        let mut joints = vec![Some(Joint::new(&def, JointKind::Distance(rod)))];

        let mut island = Island::new();
        for (i, b) in bodies.iter_mut().enumerate() {
            if let Some(b) = b.as_mut() {
                island.add_body(BodyHandle(i), b);
            }
        }
        island.add_joint(JointHandle(0));

        let mut events = Vec::new();
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        island.solve(
            &step,
            Vec2::new(0.0, -10.0),
            true,
            &mut bodies,
            &mut [],
            &mut joints,
            &mut events,
        );

        // Holding a unit mass against gravity takes 10 N.
        assert_eq!(events.len(), 1);
        match events[0] {
            PhysicsEvent::JointBreak { joint, force, .. } => {
                assert_eq!(joint, JointHandle(0));
                assert!((force - 10.0).abs() < 0.1, "force = {force}");
            }
            ref other => panic!("unexpected event {other:?}"),
        }
        assert!(!joints[0].as_ref().unwrap().is_enabled());
    }
}
