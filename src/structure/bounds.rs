/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use failure::Error;
use rsmem_array_types::V3;

/// An orthorhombic simulation cell with per-axis periodic flags.
///
/// Skewed cells are not supported; every supported operation here is
/// axis-separable.
#[derive(Debug, Clone)]
pub struct PeriodicBox {
    lengths: V3,
    periodic: [bool; 3],
}

impl PeriodicBox {
    pub fn new(lengths: V3, periodic: [bool; 3]) -> Result<Self, Error> {
        ensure!(
            lengths.iter().all(|&l| l > 0.0),
            "box lengths must be positive: {:?}", lengths,
        );
        Ok(PeriodicBox { lengths, periodic })
    }

    /// A box that is periodic along all three axes.
    pub fn diagonal(lengths: V3) -> Result<Self, Error>
    { PeriodicBox::new(lengths, [true; 3]) }

    /// A box with no periodic images at all; `min_image` is the identity.
    pub fn non_periodic() -> Self
    { PeriodicBox { lengths: V3([1.0; 3]), periodic: [false; 3] } }

    pub fn lengths(&self) -> V3
    { self.lengths }

    pub fn periodic(&self) -> [bool; 3]
    { self.periodic }

    /// Reduce a displacement vector to its minimum image.
    ///
    /// Each periodic component is mapped into `[-L/2, L/2]`.  The input must
    /// already be within half a box length of some image, which is always
    /// true of differences of in-cell positions.
    #[inline]
    pub fn min_image(&self, d: V3) -> V3 {
        V3::from_fn(|k| {
            if self.periodic[k] {
                let l = self.lengths[k];
                d[k] - l * (d[k] / l).round()
            } else {
                d[k]
            }
        })
    }
}
