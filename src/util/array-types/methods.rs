/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::types::V3;

impl V3 {
    /// Get a zero vector.
    #[inline(always)]
    pub fn zero() -> Self
    { V3([0.0; 3]) }

    /// Construct a vector from a function on indices.
    #[inline(always)]
    pub fn from_fn(mut f: impl FnMut(usize) -> f64) -> Self
    { V3([f(0), f(1), f(2)]) }

    /// Get the inner product of two vectors.
    ///
    /// It is recommended you write this as `V3::dot(a, b)`, rather than
    /// `a.dot(b)`.
    #[inline(always)]
    pub fn dot(&self, other: &Self) -> f64
    { self[0] * other[0] + self[1] * other[1] + self[2] * other[2] }

    /// Get the vector's squared magnitude.
    #[inline(always)]
    pub fn sqnorm(&self) -> f64
    { V3::dot(self, self) }

    /// Get the vector's magnitude.
    #[inline(always)]
    pub fn norm(&self) -> f64
    { self.sqnorm().sqrt() }

    /// Normalize the vector.
    #[inline(always)]
    pub fn unit(&self) -> Self
    { self / self.norm() }

    /// Get a basis vector.
    #[inline]
    pub fn axis_unit(i: usize) -> Self
    {
        let mut v = V3::zero();
        match v.get_mut(i) {
            Some(x) => *x = 1.0,
            None => panic!("Invalid axis for 3d vector: {}", i),
        }
        v
    }

    /// Cross-product.
    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        V3([
            self[1] * other[2] - self[2] * other[1],
            self[2] * other[0] - self[0] * other[2],
            self[0] * other[1] - self[1] * other[0],
        ])
    }

    /// Get the shortest angle (as a value in `[0, pi]`) between this vector
    /// and another.
    #[inline]
    pub fn angle_to(&self, other: &Self) -> f64 {
        let arg = dot(self, other) / f64::sqrt(self.sqnorm() * other.sqnorm());
        arg.min(1.0).max(-1.0).acos()
    }

    /// Apply a function to each element.
    #[inline]
    pub fn map(self, mut f: impl FnMut(f64) -> f64) -> Self
    { V3([f(self[0]), f(self[1]), f(self[2])]) }
}

/// Inner product of vectors.
///
/// This is `V3::dot` as a free function, because everyone loves symmetry.
#[inline(always)]
pub fn dot(a: &V3, b: &V3) -> f64
{ V3::dot(a, b) }

impl std::iter::Sum for V3 {
    fn sum<I: Iterator<Item = V3>>(iter: I) -> V3
    { iter.fold(V3::zero(), |acc, v| acc + v) }
}

impl<'a> std::iter::Sum<&'a V3> for V3 {
    fn sum<I: Iterator<Item = &'a V3>>(iter: I) -> V3
    { iter.fold(V3::zero(), |acc, v| acc + v) }
}

// ---------------------------------------------------------------------------
