//! Contacts between pairs of fixture children.
//!
//! A contact exists while the fat AABBs of its two proxies overlap. It owns
//! the manifold of the pair and carries the impulses of each point from one
//! step to the next, matched by feature key.

use crate::collision::collide_circle::{collide_circles, collide_polygon_and_circle};
use crate::collision::collide_edge::{collide_edge_and_circle, collide_edge_and_polygon};
use crate::collision::collide_polygon::collide_polygons;
use crate::collision::manifold::Manifold;
use crate::collision::shapes::{Shape, ShapeType};
use crate::collision::test_overlap;
use crate::math::Transform;

use super::body::{Body, BodyHandle, BodyType};
use super::event::PhysicsEvent;
use super::fixture::{Fixture, FixtureHandle};

/// Stable identifier of a contact in the contact manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactId(pub(crate) usize);

impl ContactId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Friction mixing: the geometric mean, so either surface can zero it.
pub fn mix_friction(friction_a: f32, friction_b: f32) -> f32 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing: the bouncier surface wins.
pub fn mix_restitution(restitution_a: f32, restitution_b: f32) -> f32 {
    restitution_a.max(restitution_b)
}

/// Whether a manifold routine exists with shape A of type `a`.
fn has_routine(a: ShapeType, b: ShapeType) -> bool {
    use ShapeType::*;
    matches!(
        (a, b),
        (Circle, Circle)
            | (Polygon, Circle)
            | (Polygon, Polygon)
            | (Edge, Circle)
            | (Edge, Polygon)
            | (Chain, Circle)
            | (Chain, Polygon)
    )
}

/// How a pair must be ordered to collide: `Some(false)` as given,
/// `Some(true)` swapped, `None` when the pair never collides (edge or chain
/// against edge or chain).
pub(crate) fn pair_order(a: ShapeType, b: ShapeType) -> Option<bool> {
    if has_routine(a, b) {
        Some(false)
    } else if has_routine(b, a) {
        Some(true)
    } else {
        None
    }
}

/// Build the manifold of two shape children. Unsupported orderings produce
/// an empty manifold.
pub fn evaluate(
    shape_a: &Shape,
    child_a: usize,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(a, xf_a, b, xf_b),
        (Shape::Chain(a), Shape::Circle(b)) => {
            collide_edge_and_circle(&a.child_edge(child_a), xf_a, b, xf_b)
        }
        (Shape::Chain(a), Shape::Polygon(b)) => {
            collide_edge_and_polygon(&a.child_edge(child_a), xf_a, b, xf_b)
        }
        _ => Manifold::default(),
    }
}

/// A potential collision between two fixture children.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) child_a: usize,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,

    pub(crate) manifold: Manifold,

    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    /// Surface speed along the tangent, for conveyor belts.
    pub(crate) tangent_speed: f32,
    pub(crate) radius_a: f32,
    pub(crate) radius_b: f32,

    pub(crate) touching: bool,
    pub(crate) enabled: bool,
    /// Filtering must be re-run before the next collide.
    pub(crate) filter_flag: bool,
    pub(crate) island_flag: bool,
    /// `toi` holds a valid impact time for this step.
    pub(crate) toi_flag: bool,
    pub(crate) sensor: bool,

    pub(crate) toi_count: u32,
    pub(crate) toi: f32,
}

impl Contact {
    /// Create a contact; the fixtures must already be in collision order.
    pub(crate) fn new(
        fixture_a: FixtureHandle,
        child_a: usize,
        fa: &Fixture,
        fixture_b: FixtureHandle,
        child_b: usize,
        fb: &Fixture,
    ) -> Self {
        Self {
            fixture_a,
            child_a,
            fixture_b,
            child_b,
            body_a: fa.body,
            body_b: fb.body,
            manifold: Manifold::default(),
            friction: mix_friction(fa.friction, fb.friction),
            restitution: mix_restitution(fa.restitution, fb.restitution),
            tangent_speed: 0.0,
            radius_a: fa.shape.radius(),
            radius_b: fb.shape.radius(),
            touching: false,
            enabled: true,
            filter_flag: false,
            island_flag: false,
            toi_flag: false,
            sensor: fa.is_sensor || fb.is_sensor,
            toi_count: 0,
            toi: 1.0,
        }
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    pub fn child_a(&self) -> usize {
        self.child_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    pub fn child_b(&self) -> usize {
        self.child_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    /// The body across the contact from `body`.
    pub fn other_body(&self, body: BodyHandle) -> BodyHandle {
        if self.body_a == body {
            self.body_b
        } else {
            self.body_a
        }
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disable the contact for the current step only; it is re-enabled by
    /// the next update.
    pub fn set_enabled(&mut self, flag: bool) {
        self.enabled = flag;
    }

    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    pub fn set_tangent_speed(&mut self, speed: f32) {
        self.tangent_speed = speed;
    }

    /// Re-run the narrowphase at the current body transforms.
    ///
    /// Impulses of points whose feature key survives are carried over,
    /// the rest start at zero. Both bodies are woken when the touching state
    /// changes, and begin/end events are queued.
    pub(crate) fn update(
        &mut self,
        fixtures: &[Option<Fixture>],
        bodies: &mut [Option<Body>],
        events: &mut Vec<PhysicsEvent>,
    ) {
        let (Some(fa), Some(fb)) = (
            fixtures.get(self.fixture_a.0).and_then(Option::as_ref),
            fixtures.get(self.fixture_b.0).and_then(Option::as_ref),
        ) else {
            return;
        };
        let (Some(xf_a), Some(xf_b)) = (
            bodies.get(self.body_a.0).and_then(Option::as_ref).map(|b| b.xf),
            bodies.get(self.body_b.0).and_then(Option::as_ref).map(|b| b.xf),
        ) else {
            return;
        };

        let old_manifold = self.manifold;

        // Re-enable on every update; callers may disable per step.
        self.enabled = true;

        let was_touching = self.touching;
        let touching;

        if self.sensor {
            touching = test_overlap(
                &fa.shape,
                self.child_a,
                &xf_a,
                &fb.shape,
                self.child_b,
                &xf_b,
            );
            // Sensors don't generate manifolds.
            self.manifold.point_count = 0;
        } else {
            self.manifold = evaluate(&fa.shape, self.child_a, &xf_a, &fb.shape, &xf_b);
            touching = self.manifold.point_count > 0;

            // Match new points to old ones by feature key to warm start.
            let count = self.manifold.point_count;
            for mp2 in &mut self.manifold.points[..count] {
                mp2.normal_impulse = 0.0;
                mp2.tangent_impulse = 0.0;
                let key = mp2.id.key();
                if let Some(mp1) = old_manifold.points().iter().find(|p| p.id.key() == key) {
                    mp2.normal_impulse = mp1.normal_impulse;
                    mp2.tangent_impulse = mp1.tangent_impulse;
                }
            }

            if touching != was_touching {
                for handle in [self.body_a, self.body_b] {
                    if let Some(body) = bodies.get_mut(handle.0).and_then(Option::as_mut) {
                        if body.body_type != BodyType::Static {
                            body.set_awake(true);
                        }
                    }
                }
            }
        }

        self.touching = touching;

        if !was_touching && touching {
            events.push(PhysicsEvent::ContactBegin {
                fixture_a: self.fixture_a,
                fixture_b: self.fixture_b,
            });
        } else if was_touching && !touching {
            events.push(PhysicsEvent::ContactEnd {
                fixture_a: self.fixture_a,
                fixture_b: self.fixture_b,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, EdgeShape, PolygonShape};
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::fixture::FixtureDef;
    use glam::Vec2;

    struct Scene {
        bodies: Vec<Option<Body>>,
        fixtures: Vec<Option<Fixture>>,
    }

    fn scene(shape_b_y: f32) -> Scene {
        let ground = Body::new(&BodyDef::new_static(Vec2::ZERO));
        let ball = Body::new(&BodyDef::new_dynamic(Vec2::new(0.0, shape_b_y)));
        let fa = Fixture::new(
            BodyHandle(0),
            FixtureDef::new(PolygonShape::new_box(5.0, 0.5).unwrap()).with_friction(0.4),
        );
        let fb = Fixture::new(
            BodyHandle(1),
            FixtureDef::new(PolygonShape::new_box(0.5, 0.5).unwrap())
                .with_friction(0.9)
                .with_restitution(0.3),
        );
        Scene {
            bodies: vec![Some(ground), Some(ball)],
            fixtures: vec![Some(fa), Some(fb)],
        }
    }

    fn contact(scene: &Scene) -> Contact {
        let fa = scene.fixtures[0].as_ref().unwrap();
        let fb = scene.fixtures[1].as_ref().unwrap();
        Contact::new(FixtureHandle(0), 0, fa, FixtureHandle(1), 0, fb)
    }

    #[test]
    fn test_mixing_rules() {
        assert!((mix_friction(0.4, 0.9) - 0.6).abs() < 1e-6);
        assert_eq!(mix_friction(0.0, 0.9), 0.0);
        assert_eq!(mix_restitution(0.3, 0.0), 0.3);
    }

    #[test]
    fn test_pair_order() {
        use ShapeType::*;
        assert_eq!(pair_order(Polygon, Circle), Some(false));
        assert_eq!(pair_order(Circle, Polygon), Some(true));
        assert_eq!(pair_order(Circle, Chain), Some(true));
        assert_eq!(pair_order(Edge, Edge), None);
        assert_eq!(pair_order(Chain, Edge), None);
    }

    #[test]
    fn test_update_begin_and_end_events() {
        let mut s = scene(0.99);
        let mut c = contact(&s);
        assert!((c.friction() - 0.6).abs() < 1e-6);
        assert_eq!(c.restitution(), 0.3);

        let mut events = Vec::new();
        c.update(&s.fixtures, &mut s.bodies, &mut events);
        assert!(c.is_touching());
        assert_eq!(c.manifold().point_count, 2);
        assert!(matches!(events[..], [PhysicsEvent::ContactBegin { .. }]));

        // Staying in contact raises nothing new.
        events.clear();
        c.update(&s.fixtures, &mut s.bodies, &mut events);
        assert!(events.is_empty());

        s.bodies[1].as_mut().unwrap().set_transform_raw(Vec2::new(0.0, 3.0), 0.0);
        c.update(&s.fixtures, &mut s.bodies, &mut events);
        assert!(!c.is_touching());
        assert!(matches!(events[..], [PhysicsEvent::ContactEnd { .. }]));
    }

    #[test]
    fn test_update_carries_impulses_by_feature() {
        let mut s = scene(0.99);
        let mut c = contact(&s);
        let mut events = Vec::new();
        c.update(&s.fixtures, &mut s.bodies, &mut events);
        for (i, p) in c.manifold.points.iter_mut().enumerate() {
            p.normal_impulse = 1.0 + i as f32;
            p.tangent_impulse = 0.5;
        }

        // A small slide keeps the same features.
        s.bodies[1].as_mut().unwrap().set_transform_raw(Vec2::new(0.02, 0.985), 0.0);
        c.update(&s.fixtures, &mut s.bodies, &mut events);
        assert_eq!(c.manifold.point_count, 2);
        let mut impulses: Vec<f32> = c.manifold.points().iter().map(|p| p.normal_impulse).collect();
        impulses.sort_by(f32::total_cmp);
        assert_eq!(impulses, vec![1.0, 2.0]);
        assert!(c.manifold.points().iter().all(|p| p.tangent_impulse == 0.5));
    }

    #[test]
    fn test_touch_change_wakes_bodies() {
        let mut s = scene(0.99);
        s.bodies[1].as_mut().unwrap().set_awake(false);
        let mut c = contact(&s);
        c.update(&s.fixtures, &mut s.bodies, &mut Vec::new());
        assert!(s.bodies[1].as_ref().unwrap().is_awake());
    }

    #[test]
    fn test_sensor_reports_overlap_without_points() {
        let ground = Body::new(&BodyDef::new_static(Vec2::ZERO));
        let ball = Body::new(&BodyDef::new_dynamic(Vec2::new(0.0, 0.3)));
        let edge = Fixture::new(
            BodyHandle(0),
            FixtureDef::new(EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0))),
        );
        let sensor = Fixture::new(
            BodyHandle(1),
            FixtureDef::new(CircleShape::new(0.5).unwrap()).as_sensor(),
        );
        let mut bodies = vec![Some(ground), Some(ball)];
        let fixtures = vec![Some(edge), Some(sensor)];

        let mut c = Contact::new(
            FixtureHandle(0),
            0,
            fixtures[0].as_ref().unwrap(),
            FixtureHandle(1),
            0,
            fixtures[1].as_ref().unwrap(),
        );
        assert!(c.is_sensor());
        let mut events = Vec::new();
        c.update(&fixtures, &mut bodies, &mut events);
        assert!(c.is_touching());
        assert_eq!(c.manifold().point_count, 0);
        assert_eq!(events.len(), 1);
    }
}
