//! The physics world: owns every body, fixture, joint and contact and
//! advances them with a fixed timestep.
//!
//! Bodies, fixtures and joints live in slot arenas addressed by handles.
//! Freed slots are reused, so a handle is only valid until the object it
//! names is destroyed.

use glam::Vec2;
use tracing::trace;

use crate::collision::broadphase::BroadPhase;
use crate::collision::distance::DistanceProxy;
use crate::collision::shapes::RayCastInput;
use crate::collision::time_of_impact::{time_of_impact, ToiInput, ToiOutputState};
use crate::collision::Aabb;
use crate::error::{PhysicsError, PhysicsResult};
use crate::settings::{MAX_SUB_STEPS, MAX_TOI_CONTACTS};

use super::body::{Body, BodyDef, BodyHandle, BodyType};
use super::contact::{Contact, ContactId};
use super::contact_manager::ContactManager;
use super::event::PhysicsEvent;
use super::fixture::{Filter, Fixture, FixtureChild, FixtureDef, FixtureHandle};
use super::island::Island;
use super::joints::{
    DistanceJoint, GearJoint, Joint, JointDef, JointDefKind, JointHandle, JointKind,
    PrismaticJoint, RevoluteJoint, WeldJoint,
};
use super::time_step::TimeStep;
use super::PhysicsConfig;

/// Position iterations for a time of impact sub-step.
const TOI_POSITION_ITERATIONS: u32 = 20;

/// Closest fixture hit by [`PhysicsWorld::ray_cast`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastHit {
    pub fixture: FixtureHandle,
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction along the ray from `p1` to `p2`.
    pub fraction: f32,
}

/// Store `value` in a free slot, or append one.
fn insert<T>(slots: &mut Vec<Option<T>>, free: &mut Vec<usize>, value: T) -> usize {
    match free.pop() {
        Some(index) => {
            slots[index] = Some(value);
            index
        }
        None => {
            slots.push(Some(value));
            slots.len() - 1
        }
    }
}

/// Two distinct live slots, mutably.
fn pair_mut<T>(slots: &mut [Option<T>], a: usize, b: usize) -> Option<(&mut T, &mut T)> {
    if a == b || a >= slots.len() || b >= slots.len() {
        return None;
    }
    let (lo, hi) = (a.min(b), a.max(b));
    let (left, right) = slots.split_at_mut(hi);
    let (low, high) = (left[lo].as_mut()?, right[0].as_mut()?);
    Some(if a < b { (low, high) } else { (high, low) })
}

/// Move a body's proxies to cover its motion over the last step.
fn synchronize_fixtures(
    body: &Body,
    fixtures: &mut [Option<Fixture>],
    broadphase: &mut BroadPhase<FixtureChild>,
) {
    let xf1 = body.start_transform();
    for handle in &body.fixtures {
        if let Some(fixture) = fixtures.get_mut(handle.0).and_then(Option::as_mut) {
            fixture.synchronize(broadphase, &xf1, &body.xf);
        }
    }
}

/// The main physics world managing simulation state.
#[derive(Debug)]
pub struct PhysicsWorld {
    config: PhysicsConfig,
    accumulator: f64,

    bodies: Vec<Option<Body>>,
    free_bodies: Vec<usize>,
    fixtures: Vec<Option<Fixture>>,
    free_fixtures: Vec<usize>,
    joints: Vec<Option<Joint>>,
    free_joints: Vec<usize>,
    contact_manager: ContactManager,
    events: Vec<PhysicsEvent>,
    island: Island,

    /// Inverse of the previous fixed step, for warm start scaling.
    inv_dt0: f32,
    /// False while TOI sub-stepping has unresolved events.
    step_complete: bool,
    /// A fixture was added since the last step; look for new pairs.
    new_fixture: bool,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl PhysicsWorld {
    /// Create a new physics world with the given configuration.
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            accumulator: 0.0,
            bodies: Vec::new(),
            free_bodies: Vec::new(),
            fixtures: Vec::new(),
            free_fixtures: Vec::new(),
            joints: Vec::new(),
            free_joints: Vec::new(),
            contact_manager: ContactManager::new(),
            events: Vec::new(),
            island: Island::new(),
            inv_dt0: 0.0,
            step_complete: true,
            new_fixture: false,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PhysicsConfig {
        &mut self.config
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    // Bodies

    pub fn create_body(&mut self, def: &BodyDef) -> BodyHandle {
        BodyHandle(insert(
            &mut self.bodies,
            &mut self.free_bodies,
            Body::new(def),
        ))
    }

    /// Destroy a body with its joints, contacts and fixtures.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        let body = self
            .body(handle)
            .ok_or(PhysicsError::InvalidBodyHandle(handle.0))?;
        let joints = body.joints.clone();
        let contacts = body.contacts.clone();
        let fixtures = body.fixtures.clone();

        for joint in joints {
            self.destroy_joint(joint)?;
        }

        for id in contacts {
            self.contact_manager
                .destroy(id, &mut self.bodies, &mut self.events);
        }

        for fixture_handle in fixtures {
            if let Some(mut fixture) = self
                .fixtures
                .get_mut(fixture_handle.0)
                .and_then(Option::take)
            {
                fixture.destroy_proxies(&mut self.contact_manager.broadphase);
                self.free_fixtures.push(fixture_handle.0);
            }
        }

        self.bodies[handle.0] = None;
        self.free_bodies.push(handle.0);
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.0).and_then(Option::as_ref)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// Live bodies in handle order.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (BodyHandle(i), b)))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len() - self.free_bodies.len()
    }

    /// Teleport a body. Contacts are updated on the next step.
    pub fn set_transform(
        &mut self,
        handle: BodyHandle,
        position: Vec2,
        angle: f32,
    ) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::InvalidBodyHandle(handle.0))?;
        body.set_transform_raw(position, angle);

        let xf = body.xf;
        for fixture_handle in &body.fixtures {
            if let Some(fixture) = self
                .fixtures
                .get_mut(fixture_handle.0)
                .and_then(Option::as_mut)
            {
                fixture.synchronize(&mut self.contact_manager.broadphase, &xf, &xf);
            }
        }

        self.contact_manager
            .find_new_contacts(&self.fixtures, &mut self.bodies, &self.joints);
        Ok(())
    }

    /// Change a body between static, kinematic and dynamic. Its contacts
    /// are destroyed and rebuilt on the next step.
    pub fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::InvalidBodyHandle(handle.0))?;
        if body.body_type == body_type {
            return Ok(());
        }

        body.body_type = body_type;
        body.reset_mass_data(&self.fixtures);

        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broadphase);
        }

        body.set_awake(body_type != BodyType::Static);
        body.force = Vec2::ZERO;
        body.torque = 0.0;

        let contacts = std::mem::take(&mut body.contacts);
        for id in contacts {
            self.contact_manager
                .destroy(id, &mut self.bodies, &mut self.events);
        }

        self.touch_proxies(handle);
        Ok(())
    }

    /// Lock or unlock rotation. Resets the angular velocity.
    pub fn set_fixed_rotation(&mut self, handle: BodyHandle, flag: bool) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::InvalidBodyHandle(handle.0))?;
        if body.fixed_rotation == flag {
            return Ok(());
        }
        body.fixed_rotation = flag;
        body.angular_velocity = 0.0;
        body.reset_mass_data(&self.fixtures);
        Ok(())
    }

    /// Add or remove a body from the simulation without destroying it.
    /// An inactive body has no proxies and no contacts.
    pub fn set_active(&mut self, handle: BodyHandle, flag: bool) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::InvalidBodyHandle(handle.0))?;
        if body.active == flag {
            return Ok(());
        }
        body.active = flag;

        if flag {
            let xf = body.xf;
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self
                    .fixtures
                    .get_mut(fixture_handle.0)
                    .and_then(Option::as_mut)
                {
                    fixture.create_proxies(&mut self.contact_manager.broadphase, &xf, fixture_handle);
                }
            }
            // Contacts are created on the next step.
            self.new_fixture = true;
        } else {
            for fixture_handle in &body.fixtures {
                if let Some(fixture) = self
                    .fixtures
                    .get_mut(fixture_handle.0)
                    .and_then(Option::as_mut)
                {
                    fixture.destroy_proxies(&mut self.contact_manager.broadphase);
                }
            }
            let contacts = std::mem::take(&mut body.contacts);
            for id in contacts {
                self.contact_manager
                    .destroy(id, &mut self.bodies, &mut self.events);
            }
        }
        Ok(())
    }

    /// Wake a non-static body.
    fn wake(&mut self, handle: BodyHandle) {
        if let Some(body) = self.body_mut(handle) {
            if body.body_type != BodyType::Static {
                body.set_awake(true);
            }
        }
    }

    /// Make the broadphase report every pair of a body again.
    fn touch_proxies(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle.0).and_then(Option::as_ref) else {
            return;
        };
        for fixture_handle in &body.fixtures {
            if let Some(fixture) = self.fixtures.get(fixture_handle.0).and_then(Option::as_ref) {
                fixture.touch_proxies(&mut self.contact_manager.broadphase);
            }
        }
    }

    // Fixtures

    /// Attach a shape to a body and update the body's mass.
    pub fn create_fixture(
        &mut self,
        body: BodyHandle,
        def: FixtureDef,
    ) -> PhysicsResult<FixtureHandle> {
        if !def.density.is_finite() || def.density < 0.0 {
            return Err(PhysicsError::InvalidDensity(def.density));
        }
        let owner = self
            .bodies
            .get_mut(body.0)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::InvalidBodyHandle(body.0))?;

        let handle = FixtureHandle(insert(
            &mut self.fixtures,
            &mut self.free_fixtures,
            Fixture::new(body, def),
        ));

        if owner.active {
            if let Some(fixture) = self.fixtures[handle.0].as_mut() {
                fixture.create_proxies(&mut self.contact_manager.broadphase, &owner.xf, handle);
            }
        }

        owner.fixtures.push(handle);
        owner.reset_mass_data(&self.fixtures);

        // Let the world know we have a new fixture. This will cause new
        // contacts to be created at the beginning of the next step.
        self.new_fixture = true;
        Ok(handle)
    }

    /// Detach and destroy a fixture, its contacts and proxies.
    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> PhysicsResult<()> {
        let body_handle = self
            .fixture(handle)
            .map(|f| f.body)
            .ok_or(PhysicsError::InvalidFixtureHandle(handle.0))?;

        let contacts = self
            .body(body_handle)
            .map(|b| b.contacts.clone())
            .unwrap_or_default();
        for id in contacts {
            let involved = self
                .contact_manager
                .get(id)
                .is_some_and(|c| c.fixture_a == handle || c.fixture_b == handle);
            if involved {
                self.contact_manager
                    .destroy(id, &mut self.bodies, &mut self.events);
            }
        }

        if let Some(mut fixture) = self.fixtures[handle.0].take() {
            fixture.destroy_proxies(&mut self.contact_manager.broadphase);
        }
        self.free_fixtures.push(handle.0);

        if let Some(body) = self.bodies.get_mut(body_handle.0).and_then(Option::as_mut) {
            body.fixtures.retain(|&f| f != handle);
            body.reset_mass_data(&self.fixtures);
        }
        Ok(())
    }

    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Fixture> {
        self.fixtures.get(handle.0).and_then(Option::as_ref)
    }

    /// Friction and restitution edits apply to contacts created afterwards.
    pub fn fixture_mut(&mut self, handle: FixtureHandle) -> Option<&mut Fixture> {
        self.fixtures.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// Replace a fixture's collision filter. Existing contacts are
    /// re-filtered on the next step.
    pub fn set_filter(&mut self, handle: FixtureHandle, filter: Filter) -> PhysicsResult<()> {
        let fixture = self
            .fixtures
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::InvalidFixtureHandle(handle.0))?;
        fixture.filter = filter;

        if let Some(body) = self.bodies.get(fixture.body.0).and_then(Option::as_ref) {
            for id in &body.contacts {
                if let Some(contact) = self.contact_manager.get_mut(*id) {
                    if contact.fixture_a == handle || contact.fixture_b == handle {
                        contact.filter_flag = true;
                    }
                }
            }
        }

        fixture.touch_proxies(&mut self.contact_manager.broadphase);
        Ok(())
    }

    // Joints

    /// Create a joint.
    ///
    /// For gear joints the body handles of `def` are ignored; the gear
    /// drives the B bodies of its two input joints.
    pub fn create_joint(&mut self, def: JointDef) -> PhysicsResult<JointHandle> {
        let mut def = def;
        let kind = match &def.kind {
            JointDefKind::Revolute(d) => JointKind::Revolute(RevoluteJoint::new(d)),
            JointDefKind::Prismatic(d) => JointKind::Prismatic(PrismaticJoint::new(d)),
            JointDefKind::Distance(d) => JointKind::Distance(DistanceJoint::new(d)),
            JointDefKind::Weld(d) => JointKind::Weld(WeldJoint::new(d)),
            JointDefKind::Gear(d) => {
                let joint1 = self
                    .joint(d.joint1)
                    .ok_or(PhysicsError::InvalidJointHandle(d.joint1.0))?;
                let joint2 = self
                    .joint(d.joint2)
                    .ok_or(PhysicsError::InvalidJointHandle(d.joint2.0))?;
                let (gear, driven_a, driven_b) = GearJoint::new(d, joint1, joint2, &self.bodies)?;
                def.body_a = driven_a;
                def.body_b = driven_b;
                JointKind::Gear(gear)
            }
        };

        if def.body_a == def.body_b {
            return Err(PhysicsError::SelfJoint);
        }
        for handle in [def.body_a, def.body_b] {
            if self.body(handle).is_none() {
                return Err(PhysicsError::InvalidBodyHandle(handle.0));
            }
        }

        let handle = JointHandle(insert(
            &mut self.joints,
            &mut self.free_joints,
            Joint::new(&def, kind),
        ));

        if let Some(joint) = self.joints[handle.0].as_ref() {
            for body_handle in joint.bodies() {
                if let Some(body) = self.bodies.get_mut(body_handle.0).and_then(Option::as_mut) {
                    if !body.joints.contains(&handle) {
                        body.joints.push(handle);
                    }
                }
            }
        }

        // If the joint prevents collisions, then flag any contacts for
        // filtering.
        if !def.collide_connected {
            if let Some(body) = self.bodies.get(def.body_b.0).and_then(Option::as_ref) {
                self.contact_manager.flag_for_filtering(body);
            }
        }

        Ok(handle)
    }

    /// Destroy a joint and wake its bodies. Gear joints built on it must be
    /// destroyed first.
    pub fn destroy_joint(&mut self, handle: JointHandle) -> PhysicsResult<()> {
        let joint = self
            .joints
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or(PhysicsError::InvalidJointHandle(handle.0))?;
        self.free_joints.push(handle.0);

        for body_handle in joint.bodies() {
            if let Some(body) = self.body_mut(body_handle) {
                body.joints.retain(|&j| j != handle);
            }
        }

        self.wake(joint.body_a);
        self.wake(joint.body_b);

        // Pairs the joint kept apart may collide now.
        if !joint.collide_connected {
            self.touch_proxies(joint.body_a);
            self.touch_proxies(joint.body_b);
        }
        Ok(())
    }

    /// Enable or disable a joint. Broken joints stay disabled until
    /// re-enabled here.
    pub fn set_joint_enabled(&mut self, handle: JointHandle, flag: bool) -> PhysicsResult<()> {
        let joint = self
            .joints
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(PhysicsError::InvalidJointHandle(handle.0))?;
        if joint.enabled == flag {
            return Ok(());
        }
        joint.enabled = flag;

        let (body_a, body_b) = (joint.body_a, joint.body_b);
        let collide_connected = joint.collide_connected;
        let moved: Vec<BodyHandle> = joint.bodies().collect();
        for body_handle in moved {
            self.wake(body_handle);
        }

        if !collide_connected {
            if flag {
                if let Some(body) = self.bodies.get(body_b.0).and_then(Option::as_ref) {
                    self.contact_manager.flag_for_filtering(body);
                }
            } else {
                self.touch_proxies(body_a);
                self.touch_proxies(body_b);
            }
        }
        Ok(())
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle.0).and_then(Option::as_ref)
    }

    /// Motor and limit edits do not wake the bodies.
    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        self.joints.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// Live joints in handle order.
    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.as_ref().map(|j| (JointHandle(i), j)))
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len() - self.free_joints.len()
    }

    // Contacts and events

    /// Live contacts in id order, touching or not.
    pub fn contacts(&self) -> impl Iterator<Item = (ContactId, &Contact)> {
        self.contact_manager.iter()
    }

    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contact_manager.get(id)
    }

    /// Contact overrides (enabled, friction, tangent speed) last one step.
    pub fn contact_mut(&mut self, id: ContactId) -> Option<&mut Contact> {
        self.contact_manager.get_mut(id)
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    /// Take every event queued since the last call.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, PhysicsEvent> {
        self.events.drain(..)
    }

    // Queries

    /// Fixtures whose bounds overlap `aabb`, in handle order.
    pub fn query_aabb(&self, aabb: &Aabb) -> Vec<FixtureHandle> {
        let mut found: Vec<FixtureHandle> = self
            .contact_manager
            .broadphase
            .query(aabb)
            .into_iter()
            .filter(|proxy| {
                self.fixture(proxy.fixture)
                    .and_then(|f| f.aabb(proxy.child))
                    .is_some_and(|bounds| bounds.overlaps(aabb))
            })
            .map(|proxy| proxy.fixture)
            .collect();
        found.sort();
        found.dedup();
        found
    }

    /// Closest fixture along the segment from `p1` to `p2`.
    pub fn ray_cast(&self, p1: Vec2, p2: Vec2) -> Option<RayCastHit> {
        let bounds = Aabb::new(p1.min(p2), p1.max(p2));
        let mut closest: Option<RayCastHit> = None;

        for proxy in self.contact_manager.broadphase.query(&bounds) {
            let Some(fixture) = self.fixture(proxy.fixture) else {
                continue;
            };
            let Some(body) = self.body(fixture.body) else {
                continue;
            };

            let max_fraction = closest.map_or(1.0, |hit| hit.fraction);
            let input = RayCastInput {
                p1,
                p2,
                max_fraction,
            };
            if let Some(output) = fixture.ray_cast(&input, &body.xf, proxy.child) {
                if output.fraction < max_fraction || closest.is_none() {
                    closest = Some(RayCastHit {
                        fixture: proxy.fixture,
                        point: p1 + output.fraction * (p2 - p1),
                        normal: output.normal,
                        fraction: output.fraction,
                    });
                }
            }
        }

        closest
    }

    // Stepping

    /// Step the physics simulation forward by `delta_time` seconds.
    ///
    /// Uses a fixed timestep accumulator to ensure deterministic simulation.
    pub fn step(&mut self, delta_time: f64) -> PhysicsResult<()> {
        if !delta_time.is_finite() || delta_time < 0.0 {
            return Err(PhysicsError::InvalidTimestep(delta_time));
        }

        self.accumulator += delta_time;

        let mut substeps = 0u32;
        while self.accumulator >= self.config.fixed_timestep && substeps < self.config.max_substeps
        {
            self.fixed_step(self.config.fixed_timestep as f32);
            self.accumulator -= self.config.fixed_timestep;
            substeps += 1;
        }

        // Clamp accumulator to avoid spiral of death
        if self.accumulator > self.config.fixed_timestep * self.config.max_substeps as f64 {
            self.accumulator = 0.0;
        }
        Ok(())
    }

    /// Advance exactly `dt` seconds: collide, solve islands, then resolve
    /// time of impact events.
    pub fn fixed_step(&mut self, dt: f32) {
        // If new fixtures were added, we need to find the new contacts.
        if self.new_fixture {
            self.contact_manager
                .find_new_contacts(&self.fixtures, &mut self.bodies, &self.joints);
            self.new_fixture = false;
        }

        let mut step = TimeStep::new(
            dt,
            self.config.velocity_iterations,
            self.config.position_iterations,
        );
        step.dt_ratio = self.inv_dt0 * dt;
        step.warm_starting = self.config.warm_starting;

        // Update contacts. This is where some contacts are destroyed.
        self.contact_manager.collide(
            &self.fixtures,
            &mut self.bodies,
            &self.joints,
            &mut self.events,
        );

        // Integrate velocities, solve velocity constraints, and integrate
        // positions.
        if self.step_complete && step.dt > 0.0 {
            self.solve(&step);
        }

        // Handle TOI events.
        if self.config.continuous_physics && step.dt > 0.0 {
            self.solve_toi(&step);
        }

        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        for body in self.bodies.iter_mut().flatten() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    /// Build islands over awake bodies and solve each one.
    fn solve(&mut self, step: &TimeStep) {
        // Clear all the island flags.
        for body in self.bodies.iter_mut().flatten() {
            body.island_flag = false;
        }
        for contact in self.contact_manager.contacts.iter_mut().flatten() {
            contact.island_flag = false;
        }
        for joint in self.joints.iter_mut().flatten() {
            joint.island_flag = false;
        }

        let events_before = self.events.len();
        let mut island_count = 0usize;
        let mut stack: Vec<BodyHandle> = Vec::new();
        let mut body_contacts: Vec<ContactId> = Vec::new();
        let mut body_joints: Vec<JointHandle> = Vec::new();

        for seed in 0..self.bodies.len() {
            let Some(body) = self.bodies[seed].as_mut() else {
                continue;
            };
            if body.island_flag
                || !body.awake
                || !body.active
                || body.body_type == BodyType::Static
            {
                continue;
            }

            // Depth first search over the constraint graph.
            self.island.clear();
            stack.clear();
            stack.push(BodyHandle(seed));
            body.island_flag = true;

            while let Some(handle) = stack.pop() {
                let Some(body) = self.bodies[handle.0].as_mut() else {
                    continue;
                };
                debug_assert!(body.active);
                self.island.add_body(handle, body);

                // Make sure the body is awake without resetting its timer.
                if !body.awake {
                    body.set_awake(true);
                }

                // Don't propagate islands across static bodies.
                if body.body_type == BodyType::Static {
                    continue;
                }

                body_contacts.clear();
                body_contacts.extend_from_slice(&body.contacts);
                body_joints.clear();
                body_joints.extend_from_slice(&body.joints);

                for &id in &body_contacts {
                    let Some(contact) = self.contact_manager.get_mut(id) else {
                        continue;
                    };
                    // Skip contacts already in an island, and contacts that
                    // are disabled, not touching or sensors.
                    if contact.island_flag
                        || !contact.enabled
                        || !contact.touching
                        || contact.sensor
                    {
                        continue;
                    }
                    contact.island_flag = true;
                    self.island.add_contact(id);

                    let other = contact.other_body(handle);
                    let Some(other_body) = self.bodies.get_mut(other.0).and_then(Option::as_mut)
                    else {
                        continue;
                    };
                    if other_body.island_flag {
                        continue;
                    }
                    other_body.island_flag = true;
                    stack.push(other);
                }

                for &joint_handle in &body_joints {
                    let Some(joint) = self.joints.get_mut(joint_handle.0).and_then(Option::as_mut)
                    else {
                        continue;
                    };
                    if joint.island_flag || !joint.enabled {
                        continue;
                    }

                    // Don't simulate joints connected to inactive bodies.
                    let bodies = &self.bodies;
                    let all_active = joint.bodies().all(|h| {
                        bodies
                            .get(h.0)
                            .and_then(Option::as_ref)
                            .is_some_and(|b| b.active)
                    });
                    if !all_active {
                        continue;
                    }

                    joint.island_flag = true;
                    self.island.add_joint(joint_handle);

                    for other in joint.bodies() {
                        let Some(other_body) =
                            self.bodies.get_mut(other.0).and_then(Option::as_mut)
                        else {
                            continue;
                        };
                        if other_body.island_flag {
                            continue;
                        }
                        other_body.island_flag = true;
                        stack.push(other);
                    }
                }
            }

            self.island.solve(
                step,
                self.config.gravity,
                self.config.allow_sleep,
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
                &mut self.events,
            );
            island_count += 1;

            // Allow static bodies to participate in other islands.
            for handle in &self.island.bodies {
                if let Some(body) = self.bodies.get_mut(handle.0).and_then(Option::as_mut) {
                    if body.body_type == BodyType::Static {
                        body.island_flag = false;
                    }
                }
            }
        }

        trace!(islands = island_count, "solved islands");

        // Synchronize fixtures of every body that was simulated.
        for body in self.bodies.iter().flatten() {
            if !body.island_flag || body.body_type == BodyType::Static {
                continue;
            }
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broadphase);
        }

        // Bodies held apart by a joint that just broke may collide now.
        let broken: Vec<(BodyHandle, BodyHandle)> = self.events[events_before..]
            .iter()
            .filter_map(|event| match event {
                PhysicsEvent::JointBreak { joint, .. } => self.joint(*joint),
                _ => None,
            })
            .filter(|joint| !joint.collide_connected)
            .map(|joint| (joint.body_a, joint.body_b))
            .collect();
        for (body_a, body_b) in broken {
            self.touch_proxies(body_a);
            self.touch_proxies(body_b);
        }

        // Look for new contacts.
        self.contact_manager
            .find_new_contacts(&self.fixtures, &mut self.bodies, &self.joints);
    }

    /// Earliest time of impact over all eligible contacts, computing and
    /// caching the ones not yet known this step.
    fn find_min_toi(&mut self) -> Option<(ContactId, f32)> {
        let mut min_contact = None;
        let mut min_alpha = 1.0f32;

        for index in 0..self.contact_manager.contacts.len() {
            let Some(contact) = self.contact_manager.contacts[index].as_mut() else {
                continue;
            };

            // Is this contact disabled?
            if !contact.enabled {
                continue;
            }

            // Prevent excessive sub-stepping.
            if contact.toi_count > MAX_SUB_STEPS {
                continue;
            }

            let alpha = if contact.toi_flag {
                // This contact has a valid cached TOI.
                contact.toi
            } else {
                if contact.sensor {
                    continue;
                }
                let (Some(fixture_a), Some(fixture_b)) = (
                    self.fixtures.get(contact.fixture_a.0).and_then(Option::as_ref),
                    self.fixtures.get(contact.fixture_b.0).and_then(Option::as_ref),
                ) else {
                    continue;
                };
                let Some((body_a, body_b)) =
                    pair_mut(&mut self.bodies, contact.body_a.0, contact.body_b.0)
                else {
                    continue;
                };

                let active_a = body_a.awake && body_a.body_type != BodyType::Static;
                let active_b = body_b.awake && body_b.body_type != BodyType::Static;

                // Is at least one body active (awake and dynamic or kinematic)?
                if !active_a && !active_b {
                    continue;
                }

                let collide_a = body_a.bullet || body_a.body_type != BodyType::Dynamic;
                let collide_b = body_b.bullet || body_b.body_type != BodyType::Dynamic;

                // Are these two non-bullet dynamic bodies?
                if !collide_a && !collide_b {
                    continue;
                }

                // Put the sweeps onto the same time interval.
                let mut alpha0 = body_a.sweep.alpha0;
                if body_a.sweep.alpha0 < body_b.sweep.alpha0 {
                    alpha0 = body_b.sweep.alpha0;
                    body_a.sweep.advance(alpha0);
                } else if body_b.sweep.alpha0 < body_a.sweep.alpha0 {
                    alpha0 = body_a.sweep.alpha0;
                    body_b.sweep.advance(alpha0);
                }
                debug_assert!(alpha0 < 1.0);

                let input = ToiInput {
                    proxy_a: DistanceProxy::new(&fixture_a.shape, contact.child_a),
                    proxy_b: DistanceProxy::new(&fixture_b.shape, contact.child_b),
                    sweep_a: body_a.sweep,
                    sweep_b: body_b.sweep,
                    t_max: 1.0,
                };
                let output = time_of_impact(&input);

                // Beta is the fraction of the remaining portion of the step.
                let alpha = if output.state == ToiOutputState::Touching {
                    (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
                } else {
                    1.0
                };

                contact.toi = alpha;
                contact.toi_flag = true;
                alpha
            };

            if alpha < min_alpha {
                // This is the minimum TOI found so far.
                min_contact = Some(ContactId(index));
                min_alpha = alpha;
            }
        }

        min_contact
            .filter(|_| min_alpha < 1.0 - 10.0 * f32::EPSILON)
            .map(|id| (id, min_alpha))
    }

    /// Sub-step fast bodies through their earliest impacts so they cannot
    /// tunnel.
    fn solve_toi(&mut self, step: &TimeStep) {
        if self.step_complete {
            for body in self.bodies.iter_mut().flatten() {
                body.island_flag = false;
                body.sweep.alpha0 = 0.0;
            }
            for contact in self.contact_manager.contacts.iter_mut().flatten() {
                // Invalidate TOI.
                contact.toi_flag = false;
                contact.island_flag = false;
                contact.toi_count = 0;
                contact.toi = 1.0;
            }
        }

        let mut body_contacts: Vec<ContactId> = Vec::new();

        // Find TOI events and solve them.
        loop {
            let Some((min_id, min_alpha)) = self.find_min_toi() else {
                // No more TOI events. Done!
                self.step_complete = true;
                break;
            };

            // Advance the bodies to the TOI.
            let Some((handle_a, handle_b)) = self.contact(min_id).map(|c| (c.body_a, c.body_b))
            else {
                self.step_complete = true;
                break;
            };
            let Some((body_a, body_b)) = pair_mut(&mut self.bodies, handle_a.0, handle_b.0) else {
                self.step_complete = true;
                break;
            };
            let backup_a = body_a.sweep;
            let backup_b = body_b.sweep;
            body_a.advance(min_alpha);
            body_b.advance(min_alpha);

            // The TOI contact likely has some new contact points.
            let Some(contact) = self.contact_manager.get_mut(min_id) else {
                continue;
            };
            contact.update(&self.fixtures, &mut self.bodies, &mut self.events);
            contact.toi_flag = false;
            contact.toi_count += 1;

            // Is the contact solid?
            if !contact.enabled || !contact.touching {
                // Restore the sweeps.
                contact.enabled = false;
                if let Some((body_a, body_b)) = pair_mut(&mut self.bodies, handle_a.0, handle_b.0)
                {
                    body_a.sweep = backup_a;
                    body_b.sweep = backup_b;
                    body_a.synchronize_transform();
                    body_b.synchronize_transform();
                }
                continue;
            }
            contact.island_flag = true;

            // Build the island.
            self.island.clear();
            for handle in [handle_a, handle_b] {
                if let Some(body) = self.bodies.get_mut(handle.0).and_then(Option::as_mut) {
                    if !body.awake {
                        body.set_awake(true);
                    }
                    body.island_flag = true;
                    self.island.add_body(handle, body);
                }
            }
            self.island.add_contact(min_id);

            // Get contacts on body A and body B.
            for handle in [handle_a, handle_b] {
                let Some(body) = self.body(handle) else {
                    continue;
                };
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                let bullet = body.bullet;
                body_contacts.clear();
                body_contacts.extend_from_slice(&body.contacts);

                for &id in &body_contacts {
                    if self.island.body_count() == 2 * MAX_TOI_CONTACTS
                        || self.island.contact_count() == MAX_TOI_CONTACTS
                    {
                        break;
                    }

                    let Some(contact) = self.contact_manager.get_mut(id) else {
                        continue;
                    };

                    // Has this contact already been added to the island?
                    if contact.island_flag || contact.sensor {
                        continue;
                    }

                    let other = contact.other_body(handle);
                    let Some(other_body) = self.bodies.get_mut(other.0).and_then(Option::as_mut)
                    else {
                        continue;
                    };

                    // Only add static, kinematic, or bullet bodies.
                    if other_body.body_type == BodyType::Dynamic && !bullet && !other_body.bullet
                    {
                        continue;
                    }

                    // Tentatively advance the body to the TOI.
                    let backup = other_body.sweep;
                    if !other_body.island_flag {
                        other_body.advance(min_alpha);
                    }

                    // Update the contact points.
                    contact.update(&self.fixtures, &mut self.bodies, &mut self.events);

                    // Was the contact disabled by the user, or are there no
                    // contact points?
                    if !contact.enabled || !contact.touching {
                        if let Some(other_body) =
                            self.bodies.get_mut(other.0).and_then(Option::as_mut)
                        {
                            other_body.sweep = backup;
                            other_body.synchronize_transform();
                        }
                        continue;
                    }

                    // Add the contact to the island.
                    contact.island_flag = true;
                    self.island.add_contact(id);

                    let Some(other_body) = self.bodies.get_mut(other.0).and_then(Option::as_mut)
                    else {
                        continue;
                    };

                    // Has the other body already been added to the island?
                    if other_body.island_flag {
                        continue;
                    }

                    other_body.island_flag = true;
                    if other_body.body_type != BodyType::Static && !other_body.awake {
                        other_body.set_awake(true);
                    }
                    self.island.add_body(other, other_body);
                }
            }

            let dt = (1.0 - min_alpha) * step.dt;
            let sub_step = TimeStep {
                dt,
                inv_dt: 1.0 / dt,
                dt_ratio: 1.0,
                velocity_iterations: step.velocity_iterations,
                position_iterations: TOI_POSITION_ITERATIONS,
                warm_starting: false,
            };
            let toi_index_a = self.body(handle_a).map_or(0, |b| b.island_index);
            let toi_index_b = self.body(handle_b).map_or(1, |b| b.island_index);
            self.island.solve_toi(
                &sub_step,
                toi_index_a,
                toi_index_b,
                &mut self.bodies,
                &mut self.contact_manager.contacts,
            );

            // Reset island flags and synchronize broadphase proxies.
            for handle in &self.island.bodies {
                let Some(body) = self.bodies.get_mut(handle.0).and_then(Option::as_mut) else {
                    continue;
                };
                body.island_flag = false;

                if body.body_type != BodyType::Dynamic {
                    continue;
                }

                synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broadphase);

                // Invalidate all contact TOIs on this displaced body.
                for id in &body.contacts {
                    if let Some(contact) = self.contact_manager.get_mut(*id) {
                        contact.toi_flag = false;
                        contact.island_flag = false;
                    }
                }
            }

            // Commit fixture proxy movements to the broadphase so that new
            // contacts are created.
            self.contact_manager
                .find_new_contacts(&self.fixtures, &mut self.bodies, &self.joints);

            if self.config.sub_stepping {
                self.step_complete = false;
                break;
            }
        }
    }
}
