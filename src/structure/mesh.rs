/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use std::collections::BTreeMap;

use crate::TopologyError;

/// A stable vertex identifier, preserved across sorting and migration.
///
/// Tags are resolved into site indices through a `SiteMap`; nothing in the
/// topology itself assumes they are dense.
pub type VertexTag = usize;

/// A triangle of the mesh, by vertex tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MeshTriangle(pub [VertexTag; 3]);

/// An interior edge record: its endpoints and the two triangles that flank it.
///
/// An edge whose two flanking-triangle indices are equal has no well-defined
/// dihedral and is skipped by every consumer.  This is the representation for
/// boundary edges, not an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MeshEdge {
    pub tags: (VertexTag, VertexTag),
    pub triangles: (usize, usize),
    pub type_id: usize,
}

/// The connectivity of a triangulated surface mesh.
///
/// Construction resolves, for every non-skipped edge, the vertex of each
/// flanking triangle which is not an endpoint of the edge.  Meshes for which
/// this lookup fails (degenerate triangles, edges naming the wrong triangles)
/// are rejected eagerly rather than during force evaluation.
///
/// Topology is immutable; remeshing means building a new value.
#[derive(Debug, Clone)]
pub struct MeshTopology {
    triangles: Vec<MeshTriangle>,
    edges: Vec<MeshEdge>,
    // parallel to `edges`; `None` for skipped edges
    opposite_tags: Vec<Option<(VertexTag, VertexTag)>>,
}

impl MeshTopology {
    /// Build a topology from explicit triangle and edge records.
    pub fn new(
        triangles: Vec<MeshTriangle>,
        edges: Vec<MeshEdge>,
    ) -> Result<Self, TopologyError> {
        let opposite_tags = {
            edges.iter().map(|edge| {
                let (t1, t2) = edge.triangles;
                if t1 == t2 {
                    return Ok(None);
                }
                let c = opposite_vertex(&triangles, t1, edge.tags)?;
                let d = opposite_vertex(&triangles, t2, edge.tags)?;
                Ok(Some((c, d)))
            }).collect::<Result<Vec<_>, TopologyError>>()?
        };
        Ok(MeshTopology { triangles, edges, opposite_tags })
    }

    /// Build a topology from triangles alone, deriving the edge records.
    ///
    /// Every edge shared by two triangles becomes an interior edge of the
    /// given type; edges owned by a single triangle become skipped boundary
    /// edges.  An edge shared by three or more triangles is rejected.
    pub fn from_triangles(
        triangles: Vec<MeshTriangle>,
        type_id: usize,
    ) -> Result<Self, TopologyError> {
        let mut flanks: BTreeMap<(VertexTag, VertexTag), Vec<usize>> = BTreeMap::new();
        for (t, &MeshTriangle([i, j, k])) in triangles.iter().enumerate() {
            for &(p, q) in &[(i, j), (j, k), (k, i)] {
                flanks.entry((p.min(q), p.max(q))).or_insert_with(Vec::new).push(t);
            }
        }

        let edges = {
            flanks.into_iter().map(|((a, b), ts)| {
                let triangles = match ts[..] {
                    [t] => (t, t),
                    [t1, t2] => (t1, t2),
                    _ => throw!(TopologyError::NonManifoldEdge { a, b, count: ts.len() }),
                };
                Ok(MeshEdge { tags: (a, b), triangles, type_id })
            }).collect::<Result<Vec<_>, TopologyError>>()?
        };
        MeshTopology::new(triangles, edges)
    }

    pub fn triangles(&self) -> &[MeshTriangle]
    { &self.triangles }

    pub fn edges(&self) -> &[MeshEdge]
    { &self.edges }

    /// The precomputed opposite-vertex pair for an edge, in the same order
    /// as `edge.triangles`.  `None` for skipped edges.
    pub fn opposite_tags(&self, edge_index: usize) -> Option<(VertexTag, VertexTag)>
    { self.opposite_tags[edge_index] }
}

fn opposite_vertex(
    triangles: &[MeshTriangle],
    t: usize,
    (a, b): (VertexTag, VertexTag),
) -> Result<VertexTag, TopologyError> {
    let &MeshTriangle(vertices) = match triangles.get(t) {
        Some(tri) => tri,
        None => throw!(TopologyError::NoSuchTriangle { triangle: t }),
    };
    match vertices.iter().cloned().find(|&v| v != a && v != b) {
        Some(v) => Ok(v),
        None => throw!(TopologyError::MissingOppositeVertex { triangle: t, a, b }),
    }
}
