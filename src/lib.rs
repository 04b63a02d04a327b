/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! Helfrich bending forces for triangulated membrane meshes.
//!
//! This crate just re-exports the workspace members; the interesting code
//! lives in `rsmem_potentials::helfrich` and `rsmem_structure`.

pub use rsmem_array_types as array_types;
pub use rsmem_assert_close as assert_close;
pub use rsmem_potentials as potentials;
pub use rsmem_structure as structure;
