//! Broadphase collision detection using fat AABBs and sort-and-sweep.
//!
//! Each proxy stores an AABB enlarged by [`AABB_EXTENSION`] so small motions
//! don't force a re-pair every step. Only proxies whose fat AABB had to be
//! rebuilt (or that were just created) are considered when new pairs are
//! gathered; existing pairs are tracked by the contact manager.

use glam::Vec2;

use crate::settings::AABB_EXTENSION;

use super::aabb::Aabb;

/// Predictive enlargement applied along a proxy's displacement.
const AABB_MULTIPLIER: f32 = 2.0;

/// Stable identifier of a broadphase proxy.
pub type ProxyId = usize;

#[derive(Debug, Clone)]
struct Proxy<T> {
    aabb: Aabb,
    data: T,
    moved: bool,
}

/// Sort-and-sweep broadphase over fat AABBs.
#[derive(Debug, Clone)]
pub struct BroadPhase<T> {
    proxies: Vec<Option<Proxy<T>>>,
    free: Vec<ProxyId>,
    move_count: usize,
}

impl<T> Default for BroadPhase<T> {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            free: Vec::new(),
            move_count: 0,
        }
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live proxies.
    pub fn proxy_count(&self) -> usize {
        self.proxies.len() - self.free.len()
    }

    /// Insert a proxy for a tight AABB. It takes part in the next pair update.
    pub fn create_proxy(&mut self, aabb: &Aabb, data: T) -> ProxyId {
        let proxy = Proxy {
            aabb: aabb.expanded(AABB_EXTENSION),
            data,
            moved: true,
        };
        self.move_count += 1;
        match self.free.pop() {
            Some(id) => {
                self.proxies[id] = Some(proxy);
                id
            }
            None => {
                self.proxies.push(Some(proxy));
                self.proxies.len() - 1
            }
        }
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        if let Some(proxy) = self.proxies.get_mut(id).and_then(Option::take) {
            if proxy.moved {
                self.move_count -= 1;
            }
            self.free.push(id);
        }
    }

    /// Update a proxy for a new tight AABB. The fat AABB is only rebuilt
    /// when the tight one escapes it. Returns whether it was rebuilt.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: &Aabb, displacement: Vec2) -> bool {
        let Some(proxy) = self.proxies.get_mut(id).and_then(Option::as_mut) else {
            return false;
        };

        if proxy.aabb.contains(aabb) {
            return false;
        }

        // Extend the AABB in the direction of motion.
        let mut fat = aabb.expanded(AABB_EXTENSION);
        let d = displacement * AABB_MULTIPLIER;
        if d.x < 0.0 {
            fat.min.x += d.x;
        } else {
            fat.max.x += d.x;
        }
        if d.y < 0.0 {
            fat.min.y += d.y;
        } else {
            fat.max.y += d.y;
        }
        proxy.aabb = fat;

        if !proxy.moved {
            proxy.moved = true;
            self.move_count += 1;
        }
        true
    }

    /// Force a proxy to be re-paired on the next update.
    pub fn touch_proxy(&mut self, id: ProxyId) {
        if let Some(proxy) = self.proxies.get_mut(id).and_then(Option::as_mut) {
            if !proxy.moved {
                proxy.moved = true;
                self.move_count += 1;
            }
        }
    }

    pub fn fat_aabb(&self, id: ProxyId) -> Option<&Aabb> {
        self.proxies
            .get(id)
            .and_then(Option::as_ref)
            .map(|p| &p.aabb)
    }

    pub fn user_data(&self, id: ProxyId) -> Option<T> {
        self.proxies.get(id).and_then(Option::as_ref).map(|p| p.data)
    }

    /// Whether the fat AABBs of two proxies overlap.
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        match (self.fat_aabb(a), self.fat_aabb(b)) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => false,
        }
    }

    /// Gather overlapping pairs involving at least one moved proxy, then
    /// clear the move flags.
    ///
    /// Pairs are reported once each, lower proxy id first, in ascending
    /// order so the result is deterministic.
    pub fn update_pairs(&mut self) -> Vec<(T, T)> {
        if self.move_count == 0 {
            return Vec::new();
        }

        // Sort live proxies on the x axis.
        let mut order: Vec<ProxyId> = self
            .proxies
            .iter()
            .enumerate()
            .filter_map(|(id, p)| p.as_ref().map(|_| id))
            .collect();
        order.sort_by(|&a, &b| {
            let ax = self.proxies[a].as_ref().map_or(0.0, |p| p.aabb.min.x);
            let bx = self.proxies[b].as_ref().map_or(0.0, |p| p.aabb.min.x);
            ax.total_cmp(&bx).then(a.cmp(&b))
        });

        let mut pair_ids = Vec::new();
        for (i, &id_a) in order.iter().enumerate() {
            let Some(a) = self.proxies[id_a].as_ref() else {
                continue;
            };
            for &id_b in &order[i + 1..] {
                let Some(b) = self.proxies[id_b].as_ref() else {
                    continue;
                };
                // Sweep: everything further right starts past a.
                if b.aabb.min.x > a.aabb.max.x {
                    break;
                }
                if !(a.moved || b.moved) {
                    continue;
                }
                if a.aabb.overlaps(&b.aabb) {
                    pair_ids.push((id_a.min(id_b), id_a.max(id_b)));
                }
            }
        }
        pair_ids.sort_unstable();

        for proxy in self.proxies.iter_mut().flatten() {
            proxy.moved = false;
        }
        self.move_count = 0;

        pair_ids
            .into_iter()
            .filter_map(|(a, b)| Some((self.user_data(a)?, self.user_data(b)?)))
            .collect()
    }

    /// Proxies whose fat AABB overlaps `aabb`, in id order.
    pub fn query(&self, aabb: &Aabb) -> Vec<T> {
        self.proxies
            .iter()
            .flatten()
            .filter(|p| p.aabb.overlaps(aabb))
            .map(|p| p.data)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(center: Vec2, half: f32) -> Aabb {
        Aabb::new(center - Vec2::splat(half), center + Vec2::splat(half))
    }

    #[test]
    fn test_broadphase_overlapping() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(&square(Vec2::ZERO, 1.0), 'a');
        bp.create_proxy(&square(Vec2::new(1.0, 0.0), 1.0), 'b');
        let pairs = bp.update_pairs();
        assert_eq!(pairs, vec![('a', 'b')]);

        // Nothing moved since.
        assert!(bp.update_pairs().is_empty());
    }

    #[test]
    fn test_broadphase_no_overlap() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(&square(Vec2::ZERO, 0.5), 0);
        bp.create_proxy(&square(Vec2::new(10.0, 0.0), 0.5), 1);
        bp.create_proxy(&square(Vec2::new(0.0, 10.0), 0.5), 2);
        assert!(bp.update_pairs().is_empty());
        assert_eq!(bp.proxy_count(), 3);
    }

    #[test]
    fn test_small_motion_keeps_fat_aabb() {
        let mut bp = BroadPhase::new();
        let id = bp.create_proxy(&square(Vec2::ZERO, 0.5), 0);
        bp.update_pairs();

        let nudged = square(Vec2::new(0.05, 0.0), 0.5);
        assert!(!bp.move_proxy(id, &nudged, Vec2::new(0.05, 0.0)));

        let moved = square(Vec2::new(1.0, 0.0), 0.5);
        assert!(bp.move_proxy(id, &moved, Vec2::new(1.0, 0.0)));
        let fat = bp.fat_aabb(id).unwrap();
        assert!(fat.contains(&moved));
        // Predictive extension along +x.
        assert!(fat.max.x > moved.max.x + AABB_EXTENSION);
    }

    #[test]
    fn test_destroyed_proxy_slot_is_reused() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&square(Vec2::ZERO, 0.5), 'a');
        let _b = bp.create_proxy(&square(Vec2::new(5.0, 0.0), 0.5), 'b');
        bp.destroy_proxy(a);
        assert_eq!(bp.user_data(a), None);
        let c = bp.create_proxy(&square(Vec2::new(5.2, 0.0), 0.5), 'c');
        assert_eq!(c, a);
        assert_eq!(bp.update_pairs(), vec![('c', 'b')]);
        assert_eq!(bp.query(&square(Vec2::new(5.0, 0.0), 0.1)).len(), 2);
    }
}
