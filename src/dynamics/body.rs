//! Rigid bodies: pose, velocity, mass and sleep state.

use glam::Vec2;

use crate::math::{cross, cross_sv, Rot, Sweep, Transform};

use super::contact::ContactId;
use super::fixture::{Fixture, FixtureHandle};
use super::joints::JointHandle;

/// Handle to a body stored in a [`PhysicsWorld`](super::PhysicsWorld).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub(crate) usize);

impl BodyHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Rigid body simulation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// Zero mass, never moves.
    #[default]
    Static,
    /// Zero mass, moved by its velocity only.
    Kinematic,
    /// Positive mass, moved by forces and contacts.
    Dynamic,
}

/// Construction parameters for a body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin.
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Whether the body may fall asleep.
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Bullets get continuous collision against other dynamic bodies.
    pub bullet: bool,
    /// Inactive bodies are not simulated and have no contacts.
    pub active: bool,
    pub gravity_scale: f32,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            active: true,
            gravity_scale: 1.0,
        }
    }
}

impl BodyDef {
    pub fn new_dynamic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position,
            ..Default::default()
        }
    }

    pub fn new_static(position: Vec2) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn new_kinematic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Kinematic,
            position,
            ..Default::default()
        }
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_linear_velocity(mut self, v: Vec2) -> Self {
        self.linear_velocity = v;
        self
    }

    pub fn with_angular_velocity(mut self, w: f32) -> Self {
        self.angular_velocity = w;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn as_bullet(mut self) -> Self {
        self.bullet = true;
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn asleep(mut self) -> Self {
        self.awake = false;
        self
    }
}

/// A rigid body.
///
/// Bodies are owned by the world and addressed by [`BodyHandle`]. The world
/// keeps the transform and broadphase in sync; mutate pose through
/// [`PhysicsWorld::set_transform`](super::PhysicsWorld::set_transform).
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,

    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_i: f32,

    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,

    pub(crate) sleep_time: f32,

    pub(crate) awake: bool,
    pub(crate) auto_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) active: bool,
    pub(crate) island_flag: bool,

    pub(crate) island_index: usize,

    pub(crate) fixtures: Vec<FixtureHandle>,
    pub(crate) joints: Vec<JointHandle>,
    pub(crate) contacts: Vec<ContactId>,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.p,
            c: xf.p,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = match def.body_type {
            BodyType::Dynamic => (1.0, 1.0),
            _ => (0.0, 0.0),
        };

        Self {
            body_type: def.body_type,
            xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_i: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            awake: def.awake && def.body_type != BodyType::Static,
            auto_sleep: def.allow_sleep,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            active: def.active,
            island_flag: false,
            island_index: 0,
            fixtures: Vec::new(),
            joints: Vec::new(),
            contacts: Vec::new(),
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn transform(&self) -> &Transform {
        &self.xf
    }

    /// World position of the body origin.
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.dot(v) > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, w: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Apply a force at a world point. Off-center forces also produce torque.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        // Sleeping bodies ignore forces they were not asked to wake for.
        if self.awake {
            self.force += force;
            self.torque += cross(point - self.sweep.c, force);
        }
    }

    pub fn apply_force_to_center(&mut self, force: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.force += force;
        }
    }

    pub fn apply_torque(&mut self, torque: f32, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.torque += torque;
        }
    }

    /// Apply an impulse at a world point, changing velocity immediately.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.linear_velocity += self.inv_mass * impulse;
            self.angular_velocity += self.inv_i * cross(point - self.sweep.c, impulse);
        }
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.angular_velocity += self.inv_i * impulse;
        }
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f32 {
        self.inertia + self.mass * self.sweep.local_center.dot(self.sweep.local_center)
    }

    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.transform_point(local_point)
    }

    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.q.apply(local_vector)
    }

    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.inv_transform_point(world_point)
    }

    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.q.apply_inv(world_vector)
    }

    /// Velocity of the material point currently at `world_point`.
    pub fn linear_velocity_from_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + cross_sv(self.angular_velocity, world_point - self.sweep.c)
    }

    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping;
    }

    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping;
    }

    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Waking resets the sleep timer; sleeping also zeroes velocity and
    /// pending forces.
    pub fn set_awake(&mut self, flag: bool) {
        if flag {
            self.awake = true;
            self.sleep_time = 0.0;
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.auto_sleep
    }

    pub fn set_sleeping_allowed(&mut self, flag: bool) {
        self.auto_sleep = flag;
        if !flag {
            self.set_awake(true);
        }
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn set_bullet(&mut self, flag: bool) {
        self.bullet = flag;
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    pub fn joints(&self) -> &[JointHandle] {
        &self.joints
    }

    pub fn contacts(&self) -> &[ContactId] {
        &self.contacts
    }

    /// Recompute mass, center of mass and inertia from the attached fixtures.
    ///
    /// Static and kinematic bodies get zero mass. A dynamic body whose
    /// fixtures have no density gets unit mass so it still responds to
    /// gravity.
    pub(crate) fn reset_mass_data(&mut self, fixtures: &[Option<Fixture>]) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_i = 0.0;
        self.sweep.local_center = Vec2::ZERO;

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        // Accumulate mass over all fixtures.
        let mut local_center = Vec2::ZERO;
        for fixture in self
            .fixtures
            .iter()
            .filter_map(|h| fixtures.get(h.0).and_then(Option::as_ref))
        {
            if fixture.density == 0.0 {
                continue;
            }
            let md = fixture.shape.compute_mass(fixture.density);
            self.mass += md.mass;
            local_center += md.mass * md.center;
            self.inertia += md.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if self.inertia > 0.0 && !self.fixed_rotation {
            // Shift inertia to the center of mass.
            self.inertia -= self.mass * local_center.dot(local_center);
            debug_assert!(self.inertia > 0.0);
            self.inv_i = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_i = 0.0;
        }

        // Keep the origin fixed; the center moves with the new mass.
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.transform_point(local_center);
        self.sweep.c0 = self.sweep.c;

        self.linear_velocity += cross_sv(self.angular_velocity, self.sweep.c - old_center);
    }

    /// Place the body origin, resetting the sweep.
    pub(crate) fn set_transform_raw(&mut self, position: Vec2, angle: f32) {
        self.xf = Transform::new(position, angle);
        self.sweep.c = self.xf.transform_point(self.sweep.local_center);
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }

    /// Rebuild the transform from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q = Rot::from_angle(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    /// Move the body to `alpha` within the current step and freeze it there.
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Transform at the start of the step.
    pub(crate) fn start_transform(&self) -> Transform {
        let q = Rot::from_angle(self.sweep.a0);
        Transform {
            p: self.sweep.c0 - q.apply(self.sweep.local_center),
            q,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, PolygonShape, Shape};
    use crate::dynamics::fixture::{FixtureDef, Filter};

    fn fixture(body: usize, shape: Shape, density: f32) -> Option<Fixture> {
        Some(Fixture {
            body: BodyHandle(body),
            shape,
            density,
            friction: 0.2,
            restitution: 0.0,
            is_sensor: false,
            filter: Filter::default(),
            proxies: Vec::new(),
        })
    }

    #[test]
    fn test_body_def_constructors() {
        let d = Body::new(&BodyDef::new_dynamic(Vec2::new(1.0, 2.0)));
        assert_eq!(d.body_type(), BodyType::Dynamic);
        assert_eq!(d.mass(), 1.0);
        assert!(d.is_awake());

        let s = Body::new(&BodyDef::new_static(Vec2::ZERO));
        assert_eq!(s.mass(), 0.0);
        assert!(!s.is_awake());

        let k = Body::new(&BodyDef::new_kinematic(Vec2::ZERO));
        assert_eq!(k.inv_mass, 0.0);
    }

    #[test]
    fn test_reset_mass_data_offset_box() {
        let mut body = Body::new(&BodyDef::new_dynamic(Vec2::new(3.0, 0.0)));
        body.fixtures.push(FixtureHandle(0));
        let shape = Shape::Polygon(
            PolygonShape::new_oriented_box(0.5, 0.5, Vec2::new(1.0, 0.0), 0.0).unwrap(),
        );
        let fixtures = vec![fixture(0, shape, 2.0)];
        body.reset_mass_data(&fixtures);

        assert!((body.mass() - 2.0).abs() < 1e-5);
        assert!((body.local_center() - Vec2::new(1.0, 0.0)).length() < 1e-5);
        assert!((body.world_center() - Vec2::new(4.0, 0.0)).length() < 1e-5);
        // Box inertia about its own center: m (w² + h²) / 12.
        let expected = 2.0 * (1.0 + 1.0) / 12.0;
        assert!((body.inertia - expected).abs() < 1e-4);
        assert!((body.inertia() - (expected + 2.0)).abs() < 1e-4);
    }

    #[test]
    fn test_zero_density_dynamic_gets_unit_mass() {
        let mut body = Body::new(&BodyDef::new_dynamic(Vec2::ZERO));
        body.fixtures.push(FixtureHandle(0));
        let circle = Shape::Circle(CircleShape::new(0.5).unwrap());
        body.reset_mass_data(&[fixture(0, circle, 0.0)]);
        assert_eq!(body.mass(), 1.0);
        assert_eq!(body.inv_i, 0.0);
    }

    #[test]
    fn test_fixed_rotation_has_no_inverse_inertia() {
        let mut body = Body::new(&BodyDef::new_dynamic(Vec2::ZERO).with_fixed_rotation(true));
        body.fixtures.push(FixtureHandle(0));
        let def = FixtureDef::new(PolygonShape::new_box(1.0, 1.0).unwrap()).with_density(1.0);
        body.reset_mass_data(&[fixture(0, def.shape, def.density)]);
        assert!((body.mass() - 4.0).abs() < 1e-5);
        assert_eq!(body.inv_i, 0.0);
    }

    #[test]
    fn test_impulse_at_offset_spins_body() {
        let mut body = Body::new(&BodyDef::new_dynamic(Vec2::ZERO));
        body.fixtures.push(FixtureHandle(0));
        let circle = Shape::Circle(CircleShape::new(1.0).unwrap());
        body.reset_mass_data(&[fixture(0, circle, 1.0)]);

        body.apply_linear_impulse(Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0), true);
        assert!(body.linear_velocity().y > 0.0);
        assert!(body.angular_velocity() > 0.0);
    }

    #[test]
    fn test_sleep_clears_motion() {
        let mut body = Body::new(&BodyDef::new_dynamic(Vec2::ZERO));
        body.set_linear_velocity(Vec2::new(1.0, 0.0));
        body.apply_force_to_center(Vec2::new(0.0, 5.0), true);
        body.set_awake(false);
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.force, Vec2::ZERO);

        // Forces without wake are dropped while asleep.
        body.apply_force_to_center(Vec2::new(0.0, 5.0), false);
        assert_eq!(body.force, Vec2::ZERO);
        assert!(!body.is_awake());
    }

    #[test]
    fn test_advance_freezes_at_alpha() {
        let mut body = Body::new(&BodyDef::new_dynamic(Vec2::ZERO));
        body.sweep.c = Vec2::new(2.0, 0.0);
        body.advance(0.5);
        assert!((body.position() - Vec2::new(1.0, 0.0)).length() < 1e-6);
        assert_eq!(body.sweep.c, body.sweep.c0);
        assert_eq!(body.sweep.alpha0, 0.5);
    }

    #[test]
    fn test_world_local_round_trip() {
        let body = Body::new(&BodyDef::new_static(Vec2::new(1.0, 1.0)).with_angle(0.5));
        let p = Vec2::new(0.3, -2.0);
        assert!((body.local_point(body.world_point(p)) - p).length() < 1e-5);
    }
}
