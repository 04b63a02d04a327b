/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! Helpers shared by the test modules.

use rsmem_array_types::V3;

pub(crate) fn uniform(a: f64, b: f64) -> f64 { rand::random::<f64>() * (b - a) + a }

/// A rotation matrix (as rows) about a random axis, by a random angle that
/// stays well away from 0 and 2π.
pub(crate) fn random_rotation() -> [V3; 3] {
    let axis = loop {
        let v = V3([uniform(-1.0, 1.0), uniform(-1.0, 1.0), uniform(-1.0, 1.0)]);
        if v.norm() > 0.1 {
            break v.unit();
        }
    };
    let angle = uniform(0.5, 5.5);
    rotation_about(&axis, angle)
}

/// Rodrigues' formula: `R = cos θ·I + sin θ·[axis]× + (1 − cos θ)·axis axisᵀ`.
pub(crate) fn rotation_about(axis: &V3, angle: f64) -> [V3; 3] {
    let (sin, cos) = angle.sin_cos();
    let V3([x, y, z]) = *axis;
    let skew = [
        V3([0.0, -z, y]),
        V3([z, 0.0, -x]),
        V3([-y, x, 0.0]),
    ];
    let mut rows = [V3::zero(); 3];
    for i in 0..3 {
        rows[i] = cos * V3::axis_unit(i) + sin * skew[i] + (1.0 - cos) * axis[i] * axis;
    }
    rows
}

pub(crate) fn rotate(rows: &[V3; 3], v: &V3) -> V3 {
    V3([
        V3::dot(&rows[0], v),
        V3::dot(&rows[1], v),
        V3::dot(&rows[2], v),
    ])
}

#[test]
fn rotation_preserves_lengths_and_angles() {
    for _ in 0..10 {
        let rot = random_rotation();
        let a = V3([uniform(-1.0, 1.0), uniform(-1.0, 1.0), uniform(-1.0, 1.0)]);
        let b = V3([uniform(-1.0, 1.0), uniform(-1.0, 1.0), uniform(-1.0, 1.0)]);
        let ra = rotate(&rot, &a);
        let rb = rotate(&rot, &b);
        assert_close!(abs=1e-12, a.norm(), ra.norm());
        assert_close!(abs=1e-12, V3::dot(&a, &b), V3::dot(&ra, &rb));
    }
}
