/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::types::V3;

// Operator impls are generated for every combination of value/reference
// operands, because geometry code is miserable to write without that.

macro_rules! impl_v_binop {
    ($Op:ident::$op:ident, |$a:ident, $b:ident, $k:ident| $body:expr) => {
        impl_v_binop!{@one [ ] [ ] $Op::$op, |$a, $b, $k| $body}
        impl_v_binop!{@one ['a] [ ] $Op::$op, |$a, $b, $k| $body}
        impl_v_binop!{@one [ ] ['b] $Op::$op, |$a, $b, $k| $body}
        impl_v_binop!{@one ['a] ['b] $Op::$op, |$a, $b, $k| $body}
    };
    (@one [$($la:tt)*] [$($lb:tt)*] $Op:ident::$op:ident, |$a:ident, $b:ident, $k:ident| $body:expr) => {
        impl<$($la,)* $($lb)*> $Op<$(&$lb)* V3> for $(&$la)* V3 {
            type Output = V3;

            #[inline]
            fn $op(self, other: $(&$lb)* V3) -> V3 {
                let $a = self;
                let $b = other;
                V3::from_fn(|$k| $body)
            }
        }
    };
}

impl_v_binop!{Add::add, |a, b, k| a[k] + b[k]}
impl_v_binop!{Sub::sub, |a, b, k| a[k] - b[k]}

macro_rules! impl_v_unop {
    ($Op:ident::$op:ident, |$a:ident, $k:ident| $body:expr) => {
        impl_v_unop!{@one [ ] $Op::$op, |$a, $k| $body}
        impl_v_unop!{@one ['a] $Op::$op, |$a, $k| $body}
    };
    (@one [$($la:tt)*] $Op:ident::$op:ident, |$a:ident, $k:ident| $body:expr) => {
        impl<$($la)*> $Op for $(&$la)* V3 {
            type Output = V3;

            #[inline]
            fn $op(self) -> V3 {
                let $a = self;
                V3::from_fn(|$k| $body)
            }
        }
    };
}

impl_v_unop!{Neg::neg, |a, k| -a[k]}

macro_rules! impl_v_scalar_op {
    ($Op:ident::$op:ident, |$a:ident, $s:ident, $k:ident| $body:expr) => {
        impl_v_scalar_op!{@one [ ] $Op::$op, |$a, $s, $k| $body}
        impl_v_scalar_op!{@one ['a] $Op::$op, |$a, $s, $k| $body}
    };
    (@one [$($la:tt)*] $Op:ident::$op:ident, |$a:ident, $s:ident, $k:ident| $body:expr) => {
        impl<$($la)*> $Op<f64> for $(&$la)* V3 {
            type Output = V3;

            #[inline]
            fn $op(self, scalar: f64) -> V3 {
                let $a = self;
                let $s = scalar;
                V3::from_fn(|$k| $body)
            }
        }
    };
}

impl_v_scalar_op!{Mul::mul, |a, s, k| a[k] * s}
impl_v_scalar_op!{Div::div, |a, s, k| a[k] / s}

// scalar * vector
impl Mul<V3> for f64 {
    type Output = V3;

    #[inline(always)]
    fn mul(self, vector: V3) -> V3
    { vector * self }
}

impl<'a> Mul<&'a V3> for f64 {
    type Output = V3;

    #[inline(always)]
    fn mul(self, vector: &'a V3) -> V3
    { vector * self }
}

impl AddAssign<V3> for V3 {
    #[inline]
    fn add_assign(&mut self, other: V3)
    { *self = *self + other }
}

impl<'a> AddAssign<&'a V3> for V3 {
    #[inline]
    fn add_assign(&mut self, other: &'a V3)
    { *self = *self + other }
}

impl SubAssign<V3> for V3 {
    #[inline]
    fn sub_assign(&mut self, other: V3)
    { *self = *self - other }
}

impl<'a> SubAssign<&'a V3> for V3 {
    #[inline]
    fn sub_assign(&mut self, other: &'a V3)
    { *self = *self - other }
}

impl MulAssign<f64> for V3 {
    #[inline]
    fn mul_assign(&mut self, scalar: f64)
    { *self = *self * scalar }
}

impl DivAssign<f64> for V3 {
    #[inline]
    fn div_assign(&mut self, scalar: f64)
    { *self = *self / scalar }
}

// ---------------------------------------------------------------------------
