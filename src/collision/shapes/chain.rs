//! Chains of connected edges.

use glam::Vec2;

use crate::collision::aabb::Aabb;
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::Transform;
use crate::settings::{LINEAR_SLOP, POLYGON_RADIUS};

use super::edge::EdgeShape;
use super::{MassData, RayCastInput, RayCastOutput};

/// A polyline of edges sharing vertices. Each segment is a child shape that
/// collides as an [`EdgeShape`] with its neighbours filled in, so bodies
/// slide across the joints without catching on internal corners.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainShape {
    /// For loops the first vertex is repeated at the end.
    pub vertices: Vec<Vec2>,
    pub prev_vertex: Option<Vec2>,
    pub next_vertex: Option<Vec2>,
    pub radius: f32,
}

impl ChainShape {
    /// A closed loop. Needs at least three vertices.
    pub fn new_loop(vertices: &[Vec2]) -> PhysicsResult<Self> {
        if vertices.len() < 3 {
            return Err(reject("a loop needs at least 3 vertices"));
        }
        validate_spacing(vertices)?;

        let mut vs = vertices.to_vec();
        vs.push(vertices[0]);
        Ok(Self {
            prev_vertex: Some(vs[vs.len() - 2]),
            next_vertex: Some(vs[1]),
            vertices: vs,
            radius: POLYGON_RADIUS,
        })
    }

    /// An open chain. Needs at least two vertices.
    pub fn new_chain(vertices: &[Vec2]) -> PhysicsResult<Self> {
        if vertices.len() < 2 {
            return Err(reject("a chain needs at least 2 vertices"));
        }
        validate_spacing(vertices)?;

        Ok(Self {
            vertices: vertices.to_vec(),
            prev_vertex: None,
            next_vertex: None,
            radius: POLYGON_RADIUS,
        })
    }

    /// Ghost vertex before the first vertex of an open chain.
    #[must_use]
    pub fn with_prev_vertex(mut self, v: Vec2) -> Self {
        self.prev_vertex = Some(v);
        self
    }

    /// Ghost vertex after the last vertex of an open chain.
    #[must_use]
    pub fn with_next_vertex(mut self, v: Vec2) -> Self {
        self.next_vertex = Some(v);
        self
    }

    /// Loops repeat their first vertex at the end.
    pub fn is_loop(&self) -> bool {
        self.vertices.len() > 3 && self.vertices.first() == self.vertices.last()
    }

    /// Number of edges.
    #[inline]
    pub fn child_count(&self) -> usize {
        self.vertices.len() - 1
    }

    /// The edge for child `index`, with its neighbour vertices.
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        debug_assert!(index < self.child_count());
        let vertex0 = if index > 0 {
            Some(self.vertices[index - 1])
        } else {
            self.prev_vertex
        };
        // Only the first edge of an open chain can see a ghost vertex.
        let vertex0_shared = vertex0.is_some() && (index > 0 || self.is_loop());
        let vertex3 = if index + 2 < self.vertices.len() {
            Some(self.vertices[index + 2])
        } else {
            self.next_vertex
        };
        EdgeShape {
            vertex1: self.vertices[index],
            vertex2: self.vertices[index + 1],
            vertex0,
            vertex3,
            vertex0_shared,
            radius: self.radius,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child: usize) -> Aabb {
        let v1 = xf.transform_point(self.vertices[child]);
        let v2 = xf.transform_point(self.vertices[child + 1]);
        Aabb::new(v1.min(v2), v1.max(v2)).expanded(self.radius)
    }

    /// Chains have no area and therefore no mass.
    pub fn compute_mass(&self, _density: f32) -> MassData {
        MassData::default()
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child: usize,
    ) -> Option<RayCastOutput> {
        EdgeShape::new(self.vertices[child], self.vertices[child + 1]).ray_cast(input, xf)
    }
}

fn reject(reason: &str) -> PhysicsError {
    tracing::warn!(reason, "chain rejected");
    PhysicsError::InvalidChain {
        reason: reason.to_string(),
    }
}

fn validate_spacing(vertices: &[Vec2]) -> PhysicsResult<()> {
    let min_sq = LINEAR_SLOP * LINEAR_SLOP;
    if vertices
        .windows(2)
        .any(|w| w[0].distance_squared(w[1]) <= min_sq)
    {
        return Err(reject("adjacent vertices are too close together"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_children_wrap_around() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let chain = ChainShape::new_loop(&square).unwrap();
        assert_eq!(chain.child_count(), 4);

        assert!(chain.is_loop());
        let first = chain.child_edge(0);
        assert_eq!(first.vertex0, Some(Vec2::new(0.0, 1.0)));
        assert!(first.vertex0_shared);
        assert_eq!(first.vertex3, Some(Vec2::new(1.0, 1.0)));

        let last = chain.child_edge(3);
        assert_eq!(last.vertex1, Vec2::new(0.0, 1.0));
        assert_eq!(last.vertex2, Vec2::new(0.0, 0.0));
        assert_eq!(last.vertex3, Some(Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn test_open_chain_ends() {
        let chain = ChainShape::new_chain(&[Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0)])
            .unwrap()
            .with_prev_vertex(Vec2::new(-1.0, 1.0));
        assert_eq!(chain.child_count(), 2);
        assert_eq!(chain.child_edge(0).vertex0, Some(Vec2::new(-1.0, 1.0)));
        assert!(!chain.child_edge(0).vertex0_shared);
        assert!(chain.child_edge(1).vertex0_shared);
        assert_eq!(chain.child_edge(1).vertex3, None);
        assert!(!chain.is_loop());
    }

    #[test]
    fn test_chain_rejects_bad_input() {
        assert!(ChainShape::new_chain(&[Vec2::ZERO]).is_err());
        assert!(ChainShape::new_loop(&[Vec2::ZERO, Vec2::X]).is_err());
        assert!(matches!(
            ChainShape::new_chain(&[Vec2::ZERO, Vec2::splat(1e-4), Vec2::X]),
            Err(PhysicsError::InvalidChain { .. })
        ));
    }
}
