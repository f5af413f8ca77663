//! Fixtures attach a shape to a body with material and filtering data.

use glam::Vec2;

use crate::collision::broadphase::{BroadPhase, ProxyId};
use crate::collision::shapes::{RayCastInput, RayCastOutput, Shape};
use crate::collision::Aabb;
use crate::math::Transform;

use super::body::BodyHandle;

/// Handle to a fixture stored in a [`PhysicsWorld`](super::PhysicsWorld).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureHandle(pub(crate) usize);

impl FixtureHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Collision filtering bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    /// Categories this fixture belongs to.
    pub category_bits: u16,
    /// Categories this fixture accepts collisions with.
    pub mask_bits: u16,
    /// Fixtures sharing a non-zero group always collide (positive) or
    /// never collide (negative), overriding the bits.
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

/// Construction parameters for a fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureDef {
    pub shape: Shape,
    /// Mass per unit area, kg/m².
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    /// Sensors report overlap but produce no collision response.
    pub is_sensor: bool,
    pub filter: Filter,
}

impl FixtureDef {
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            density: 0.0,
            friction: 0.2,
            restitution: 0.0,
            is_sensor: false,
            filter: Filter::default(),
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn as_sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

/// Broadphase payload: one shape child of one fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureChild {
    pub fixture: FixtureHandle,
    pub child: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FixtureProxy {
    /// Tight AABB at the last synchronization.
    pub aabb: Aabb,
    pub proxy_id: ProxyId,
}

/// A shape attached to a body.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) density: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    /// One proxy per shape child while the body is active.
    pub(crate) proxies: Vec<FixtureProxy>,
}

impl Fixture {
    pub(crate) fn new(body: BodyHandle, def: FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape,
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::new(),
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Existing contacts keep the mixed value they were created with.
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Tight AABB of a child as of the last broadphase synchronization.
    pub fn aabb(&self, child: usize) -> Option<&Aabb> {
        self.proxies.get(child).map(|p| &p.aabb)
    }

    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        self.shape.test_point(xf, p)
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child: usize,
    ) -> Option<RayCastOutput> {
        self.shape.ray_cast(input, xf, child)
    }

    pub(crate) fn create_proxies(
        &mut self,
        broadphase: &mut BroadPhase<FixtureChild>,
        xf: &Transform,
        handle: FixtureHandle,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child);
            let proxy_id = broadphase.create_proxy(
                &aabb,
                FixtureChild {
                    fixture: handle,
                    child,
                },
            );
            self.proxies.push(FixtureProxy { aabb, proxy_id });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broadphase: &mut BroadPhase<FixtureChild>) {
        for proxy in self.proxies.drain(..) {
            broadphase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Cover the swept motion from `xf1` to `xf2` in the broadphase.
    pub(crate) fn synchronize(
        &mut self,
        broadphase: &mut BroadPhase<FixtureChild>,
        xf1: &Transform,
        xf2: &Transform,
    ) {
        for (child, proxy) in self.proxies.iter_mut().enumerate() {
            let aabb1 = self.shape.compute_aabb(xf1, child);
            let aabb2 = self.shape.compute_aabb(xf2, child);
            proxy.aabb = aabb1.union(&aabb2);
            let displacement = xf2.p - xf1.p;
            broadphase.move_proxy(proxy.proxy_id, &proxy.aabb, displacement);
        }
    }

    pub(crate) fn touch_proxies(&self, broadphase: &mut BroadPhase<FixtureChild>) {
        for proxy in &self.proxies {
            broadphase.touch_proxy(proxy.proxy_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_default_collides() {
        assert!(Filter::default().should_collide(&Filter::default()));
    }

    #[test]
    fn test_filter_mask_excludes_category() {
        let player = Filter {
            category_bits: 0x0002,
            mask_bits: 0xFFFF & !0x0002,
            group_index: 0,
        };
        assert!(!player.should_collide(&player));
        assert!(player.should_collide(&Filter::default()));
    }

    #[test]
    fn test_filter_group_overrides_bits() {
        let never = Filter {
            group_index: -3,
            ..Default::default()
        };
        assert!(!never.should_collide(&never));

        let always = Filter {
            category_bits: 0x0004,
            mask_bits: 0,
            group_index: 2,
        };
        assert!(always.should_collide(&always));
    }
}
