/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! A 3-vector of `f64` and the handful of linear-algebra operations that
//! geometry code actually needs.
//!
//! The type is deliberately concrete; everything downstream works in
//! double-precision cartesian space and nothing here has ever needed to be
//! generic.

#[cfg(feature = "serde")]
#[macro_use] extern crate serde;
#[cfg(test)] extern crate rand;
#[cfg(test)] #[macro_use] extern crate rsmem_assert_close;

mod types;
mod methods;
mod ops;

pub use crate::types::V3;
pub use crate::methods::dot;
