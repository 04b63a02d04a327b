/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use std::collections::HashMap;

use failure::Error;

use crate::{TopologyError, VertexTag};

/// Resolution of stable vertex tags into local site indices, with the
/// owned/ghost split.
///
/// Sites are indexed `0..num_sites`; indices below `num_owned` are owned by
/// this rank, the rest are ghost copies.  Ghost sites participate in geometry
/// but never receive force, energy, or virial writes.
#[derive(Debug, Clone)]
pub struct SiteMap {
    index_by_tag: HashMap<VertexTag, usize>,
    num_owned: usize,
    num_sites: usize,
}

impl SiteMap {
    pub fn new(index_by_tag: HashMap<VertexTag, usize>, num_owned: usize) -> Result<Self, Error> {
        let num_sites = index_by_tag.values().map(|&i| i + 1).max().unwrap_or(0);
        ensure!(
            num_owned <= num_sites,
            "num_owned ({}) exceeds the number of mapped sites ({})", num_owned, num_sites,
        );
        Ok(SiteMap { index_by_tag, num_owned, num_sites })
    }

    /// A map where tags are the site indices and every site is owned.
    pub fn identity(num_sites: usize) -> Self
    { SiteMap::identity_with_ghosts(num_sites, num_sites) }

    /// A tag-is-index map where sites at `num_owned..num_sites` are ghosts.
    pub fn identity_with_ghosts(num_owned: usize, num_sites: usize) -> Self {
        assert!(num_owned <= num_sites);
        SiteMap {
            index_by_tag: (0..num_sites).map(|i| (i, i)).collect(),
            num_owned,
            num_sites,
        }
    }

    pub fn resolve(&self, tag: VertexTag) -> Result<usize, TopologyError> {
        match self.index_by_tag.get(&tag) {
            Some(&index) => Ok(index),
            None => Err(TopologyError::UnknownTag { tag }),
        }
    }

    #[inline]
    pub fn is_owned(&self, index: usize) -> bool
    { index < self.num_owned }

    pub fn num_owned(&self) -> usize
    { self.num_owned }

    pub fn num_sites(&self) -> usize
    { self.num_sites }
}
