//! Contact lifetime: creation from broadphase pairs, narrowphase updates,
//! and destruction when fat AABBs separate or filtering rejects the pair.

use std::collections::HashMap;

use crate::collision::broadphase::BroadPhase;

use super::body::{Body, BodyHandle, BodyType};
use super::contact::{pair_order, Contact, ContactId};
use super::event::PhysicsEvent;
use super::fixture::{Fixture, FixtureChild};
use super::joints::Joint;

type PairKey = (FixtureChild, FixtureChild);

/// Canonical pair key (smaller child first).
fn pair_key(a: FixtureChild, b: FixtureChild) -> PairKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Body-level filter: at least one body must be dynamic, and no enabled
/// joint between them may forbid collision.
pub(crate) fn bodies_should_collide(
    bodies: &[Option<Body>],
    joints: &[Option<Joint>],
    handle_a: BodyHandle,
    handle_b: BodyHandle,
) -> bool {
    let (Some(a), Some(b)) = (
        bodies.get(handle_a.0).and_then(Option::as_ref),
        bodies.get(handle_b.0).and_then(Option::as_ref),
    ) else {
        return false;
    };

    if a.body_type != BodyType::Dynamic && b.body_type != BodyType::Dynamic {
        return false;
    }

    !b.joints
        .iter()
        .filter_map(|h| joints.get(h.0).and_then(Option::as_ref))
        .any(|j| {
            j.enabled
                && !j.collide_connected
                && ((j.body_a == handle_a && j.body_b == handle_b)
                    || (j.body_a == handle_b && j.body_b == handle_a))
        })
}

/// Owns the broadphase and every live contact.
#[derive(Debug, Default)]
pub(crate) struct ContactManager {
    pub broadphase: BroadPhase<FixtureChild>,
    pub contacts: Vec<Option<Contact>>,
    free: Vec<usize>,
    pairs: HashMap<PairKey, ContactId>,
}

impl ContactManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contact_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn get(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ContactId) -> Option<&mut Contact> {
        self.contacts.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Live contacts in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ContactId, &Contact)> {
        self.contacts
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (ContactId(i), c)))
    }

    /// Create a contact for a new broadphase pair unless one exists or the
    /// pair is filtered out.
    pub fn add_pair(
        &mut self,
        proxy_a: FixtureChild,
        proxy_b: FixtureChild,
        fixtures: &[Option<Fixture>],
        bodies: &mut [Option<Body>],
        joints: &[Option<Joint>],
    ) {
        let (Some(fa), Some(fb)) = (
            fixtures.get(proxy_a.fixture.0).and_then(Option::as_ref),
            fixtures.get(proxy_b.fixture.0).and_then(Option::as_ref),
        ) else {
            return;
        };

        // Fixtures on the same body never collide.
        if fa.body == fb.body {
            return;
        }

        let key = pair_key(proxy_a, proxy_b);
        if self.pairs.contains_key(&key) {
            return;
        }

        if !bodies_should_collide(bodies, joints, fa.body, fb.body) {
            return;
        }
        if !fa.filter.should_collide(&fb.filter) {
            return;
        }

        let Some(swap) = pair_order(fa.shape.shape_type(), fb.shape.shape_type()) else {
            return;
        };
        let contact = if swap {
            Contact::new(proxy_b.fixture, proxy_b.child, fb, proxy_a.fixture, proxy_a.child, fa)
        } else {
            Contact::new(proxy_a.fixture, proxy_a.child, fa, proxy_b.fixture, proxy_b.child, fb)
        };
        let (body_a, body_b, sensor) = (contact.body_a, contact.body_b, contact.sensor);

        let id = match self.free.pop() {
            Some(index) => {
                self.contacts[index] = Some(contact);
                ContactId(index)
            }
            None => {
                self.contacts.push(Some(contact));
                ContactId(self.contacts.len() - 1)
            }
        };
        self.pairs.insert(key, id);

        for handle in [body_a, body_b] {
            if let Some(body) = bodies.get_mut(handle.0).and_then(Option::as_mut) {
                body.contacts.push(id);
                if !sensor && body.body_type != BodyType::Static {
                    body.set_awake(true);
                }
            }
        }
    }

    /// Turn new broadphase overlaps into contacts.
    pub fn find_new_contacts(
        &mut self,
        fixtures: &[Option<Fixture>],
        bodies: &mut [Option<Body>],
        joints: &[Option<Joint>],
    ) {
        for (a, b) in self.broadphase.update_pairs() {
            self.add_pair(a, b, fixtures, bodies, joints);
        }
    }

    /// Remove a contact and unlink it from its bodies. A touching contact
    /// reports its end.
    pub fn destroy(
        &mut self,
        id: ContactId,
        bodies: &mut [Option<Body>],
        events: &mut Vec<PhysicsEvent>,
    ) {
        let Some(contact) = self.contacts.get_mut(id.0).and_then(Option::take) else {
            return;
        };

        if contact.touching {
            events.push(PhysicsEvent::ContactEnd {
                fixture_a: contact.fixture_a,
                fixture_b: contact.fixture_b,
            });
        }

        for handle in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(handle.0).and_then(Option::as_mut) {
                body.contacts.retain(|&c| c != id);
            }
        }

        self.pairs.remove(&pair_key(
            FixtureChild {
                fixture: contact.fixture_a,
                child: contact.child_a,
            },
            FixtureChild {
                fixture: contact.fixture_b,
                child: contact.child_b,
            },
        ));
        self.free.push(id.0);
    }

    /// Narrowphase pass over every contact.
    ///
    /// Contacts flagged for filtering are re-checked, contacts whose fat
    /// AABBs no longer overlap are destroyed, and the rest are updated
    /// unless both bodies are asleep or static.
    pub fn collide(
        &mut self,
        fixtures: &[Option<Fixture>],
        bodies: &mut [Option<Body>],
        joints: &[Option<Joint>],
        events: &mut Vec<PhysicsEvent>,
    ) {
        for index in 0..self.contacts.len() {
            let id = ContactId(index);
            let Some(contact) = self.contacts[index].as_mut() else {
                continue;
            };
            let (Some(fa), Some(fb)) = (
                fixtures.get(contact.fixture_a.0).and_then(Option::as_ref),
                fixtures.get(contact.fixture_b.0).and_then(Option::as_ref),
            ) else {
                continue;
            };

            if contact.filter_flag {
                if !bodies_should_collide(bodies, joints, contact.body_a, contact.body_b)
                    || !fa.filter.should_collide(&fb.filter)
                {
                    self.destroy(id, bodies, events);
                    continue;
                }
                contact.filter_flag = false;
            }

            let is_active = |h: BodyHandle| {
                bodies
                    .get(h.0)
                    .and_then(Option::as_ref)
                    .is_some_and(|b| b.awake && b.body_type != BodyType::Static)
            };
            if !is_active(contact.body_a) && !is_active(contact.body_b) {
                continue;
            }

            let overlap = match (fa.proxies.get(contact.child_a), fb.proxies.get(contact.child_b)) {
                (Some(pa), Some(pb)) => self.broadphase.test_overlap(pa.proxy_id, pb.proxy_id),
                _ => false,
            };
            if !overlap {
                self.destroy(id, bodies, events);
                continue;
            }

            contact.update(fixtures, bodies, events);
        }
    }

    /// Queue every contact of a body for re-filtering.
    pub fn flag_for_filtering(&mut self, body: &Body) {
        for id in &body.contacts {
            if let Some(c) = self.contacts.get_mut(id.0).and_then(Option::as_mut) {
                c.filter_flag = true;
            }
        }
    }
}
