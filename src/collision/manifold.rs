//! Contact manifolds and the helpers the narrowphase shares.
//!
//! A manifold stores its geometry in body-local space so it stays valid
//! while the bodies move during position correction. The meaning of
//! `local_point` and `local_normal` depends on [`ManifoldType`]:
//!
//! - `Circles`: `local_point` is the center of circle A, points hold the
//!   center of circle B, the normal is unused.
//! - `FaceA`: the reference face lies on A; `local_point` is a point on it,
//!   `local_normal` its normal, and each point is an incident vertex of B.
//! - `FaceB`: as `FaceA` with the roles of A and B swapped.

use glam::Vec2;

use crate::math::Transform;
use crate::settings::MAX_MANIFOLD_POINTS;

/// Whether a contact feature is a vertex or a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FeatureType {
    #[default]
    Vertex = 0,
    Face = 1,
}

/// The features that intersect to form a contact point. Used to match
/// points across steps for warm starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContactFeature {
    /// Feature index on shape A.
    pub index_a: u8,
    /// Feature index on shape B.
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactFeature {
    /// All four fields packed into one comparable value.
    #[inline]
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | u32::from(self.index_b) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    /// Swap the A and B sides, used when the reference face is on B.
    #[inline]
    pub fn flipped(&self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// A contact point with its persisted impulses.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    /// Body-local point; which body depends on the manifold type.
    pub local_point: Vec2,
    /// Non-penetration impulse from the last step.
    pub normal_impulse: f32,
    /// Friction impulse from the last step.
    pub tangent_impulse: f32,
    pub id: ContactFeature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Contact geometry between two shapes: up to two points sharing one normal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Unused for `Circles`.
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub kind: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }
}

/// A manifold resolved into world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldManifold {
    /// World normal pointing from A to B.
    pub normal: Vec2,
    /// Midpoints between the two surfaces.
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping.
    pub separations: [f32; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f32,
        xf_b: &Transform,
        radius_b: f32,
    ) -> Self {
        let mut wm = WorldManifold::default();
        if manifold.point_count == 0 {
            return wm;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                wm.normal = Vec2::X;
                let point_a = xf_a.transform_point(manifold.local_point);
                let point_b = xf_b.transform_point(manifold.points[0].local_point);
                if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    wm.normal = (point_b - point_a).normalize();
                }

                let c_a = point_a + wm.normal * radius_a;
                let c_b = point_b - wm.normal * radius_b;
                wm.points[0] = 0.5 * (c_a + c_b);
                wm.separations[0] = (c_b - c_a).dot(wm.normal);
            }
            ManifoldType::FaceA => {
                wm.normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.transform_point(manifold.local_point);

                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_b.transform_point(mp.local_point);
                    let c_a = clip_point
                        + wm.normal * (radius_a - (clip_point - plane_point).dot(wm.normal));
                    let c_b = clip_point - wm.normal * radius_b;
                    wm.points[i] = 0.5 * (c_a + c_b);
                    wm.separations[i] = (c_b - c_a).dot(wm.normal);
                }
            }
            ManifoldType::FaceB => {
                wm.normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.transform_point(manifold.local_point);

                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = xf_a.transform_point(mp.local_point);
                    let c_b = clip_point
                        + wm.normal * (radius_b - (clip_point - plane_point).dot(wm.normal));
                    let c_a = clip_point - wm.normal * radius_a;
                    wm.points[i] = 0.5 * (c_a + c_b);
                    wm.separations[i] = (c_a - c_b).dot(wm.normal);
                }

                // Keep the normal pointing from A to B.
                wm.normal = -wm.normal;
            }
        }

        wm
    }
}

/// How a contact point changed between two manifolds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointState {
    /// Point does not exist.
    #[default]
    Null,
    /// Point was added in the update.
    Add,
    /// Point persisted across the update.
    Persist,
    /// Point was removed in the update.
    Remove,
}

/// Classify the points of `manifold1` (old) and `manifold2` (new) by
/// matching feature ids.
pub fn point_states(
    manifold1: &Manifold,
    manifold2: &Manifold,
) -> ([PointState; MAX_MANIFOLD_POINTS], [PointState; MAX_MANIFOLD_POINTS]) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p1) in manifold1.points().iter().enumerate() {
        let key = p1.id.key();
        state1[i] = if manifold2.points().iter().any(|p2| p2.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }

    for (i, p2) in manifold2.points().iter().enumerate() {
        let key = p2.id.key();
        state2[i] = if manifold1.points().iter().any(|p1| p1.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }

    (state1, state2)
}

/// A vertex of an incident edge during clipping.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipVertex {
    pub v: Vec2,
    pub id: ContactFeature,
}

/// Clip a segment against the half-plane `dot(normal, x) <= offset`.
///
/// Returns the surviving vertices and how many there are. A vertex created
/// by the clip takes `vertex_index_a` as its A-side feature.
pub fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    // Distances of the end points to the line.
    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    // Points behind the plane survive.
    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // The points straddle the plane.
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + (v_in[1].v - v_in[0].v) * interp,
            id: ContactFeature {
                index_a: vertex_index_a as u8,
                index_b: v_in[0].id.index_b,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            },
        };
        count += 1;
    }

    (v_out, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_with_key(index_a: u8, index_b: u8) -> ManifoldPoint {
        ManifoldPoint {
            id: ContactFeature {
                index_a,
                index_b,
                type_a: FeatureType::Face,
                type_b: FeatureType::Vertex,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_feature_key_is_unique_per_field() {
        let base = ContactFeature::default();
        let a = ContactFeature { index_a: 1, ..base };
        let b = ContactFeature { index_b: 1, ..base };
        let t = ContactFeature {
            type_a: FeatureType::Face,
            ..base
        };
        let keys = [base.key(), a.key(), b.key(), t.key()];
        for i in 0..keys.len() {
            for j in i + 1..keys.len() {
                assert_ne!(keys[i], keys[j]);
            }
        }
        assert_eq!(a.flipped(), b);
    }

    #[test]
    fn test_point_states() {
        let mut old = Manifold::default();
        old.points[0] = point_with_key(0, 1);
        old.points[1] = point_with_key(0, 2);
        old.point_count = 2;

        let mut new = Manifold::default();
        new.points[0] = point_with_key(0, 2);
        new.points[1] = point_with_key(0, 3);
        new.point_count = 2;

        let (s1, s2) = point_states(&old, &new);
        assert_eq!(s1, [PointState::Remove, PointState::Persist]);
        assert_eq!(s2, [PointState::Persist, PointState::Add]);
    }

    #[test]
    fn test_clip_segment_to_line() {
        let v_in = [
            ClipVertex {
                v: Vec2::new(-1.0, 0.0),
                id: ContactFeature::default(),
            },
            ClipVertex {
                v: Vec2::new(1.0, 0.0),
                id: ContactFeature::default(),
            },
        ];
        // Keep x <= 0.5.
        let (out, count) = clip_segment_to_line(&v_in, Vec2::X, 0.5, 3);
        assert_eq!(count, 2);
        assert_eq!(out[0].v, Vec2::new(-1.0, 0.0));
        assert!((out[1].v - Vec2::new(0.5, 0.0)).length() < 1e-6);
        assert_eq!(out[1].id.index_a, 3);
        assert_eq!(out[1].id.type_b, FeatureType::Face);

        // Entirely outside.
        let (_, count) = clip_segment_to_line(&v_in, Vec2::X, -2.0, 0);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_world_manifold_face_a() {
        let mut manifold = Manifold {
            kind: ManifoldType::FaceA,
            local_normal: Vec2::Y,
            local_point: Vec2::ZERO,
            point_count: 1,
            ..Default::default()
        };
        manifold.points[0].local_point = Vec2::new(0.0, -0.1);

        let xf_b = Transform::from_translation(Vec2::new(0.0, 0.0));
        let wm = WorldManifold::new(&manifold, &Transform::IDENTITY, 0.0, &xf_b, 0.0);
        assert!((wm.normal - Vec2::Y).length() < 1e-6);
        assert!((wm.separations[0] + 0.1).abs() < 1e-6);
        assert!((wm.points[0] - Vec2::new(0.0, -0.05)).length() < 1e-6);
    }
}
