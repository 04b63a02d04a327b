/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! Geometry-free structural data for membrane simulations: the periodic box,
//! the triangle-mesh topology, and the mapping from stable vertex tags to
//! locally resolved site indices.

#[macro_use] extern crate failure;
#[cfg(test)] #[macro_use] extern crate rsmem_assert_close;

macro_rules! throw {
    ($e:expr) => {
        return Err(::std::convert::Into::into($e))
    }
}

/// Fatal problems with mesh input.
///
/// All of these indicate that the mesh definition itself is unusable, as
/// opposed to a merely unfortunate geometry; callers are expected to abort
/// the evaluation that encountered them.
#[derive(Debug, Fail)]
pub enum TopologyError {
    #[fail(display = "triangle {} provides no vertex opposite to edge ({}, {})", triangle, a, b)]
    MissingOppositeVertex { triangle: usize, a: VertexTag, b: VertexTag },

    #[fail(display = "zero-length displacement between sites {} and {}", a, b)]
    ZeroLengthEdge { a: usize, b: usize },

    #[fail(display = "vertex tag {} does not resolve to any site", tag)]
    UnknownTag { tag: VertexTag },

    #[fail(display = "no such edge type: {} (there are {} types)", type_id, num_types)]
    InvalidType { type_id: usize, num_types: usize },

    #[fail(display = "edge refers to nonexistent triangle {}", triangle)]
    NoSuchTriangle { triangle: usize },

    #[fail(display = "edge ({}, {}) is shared by {} triangles", a, b, count)]
    NonManifoldEdge { a: VertexTag, b: VertexTag, count: usize },
}

mod bounds;
mod mesh;
mod sites;

//---------------------------
// public reexports; API

pub use crate::bounds::PeriodicBox;
pub use crate::mesh::{MeshEdge, MeshTopology, MeshTriangle, VertexTag};
pub use crate::sites::SiteMap;
