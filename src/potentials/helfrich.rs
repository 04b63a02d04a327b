/* ************************************************************************ **
** This file is part of rsmem, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! Helfrich bending energy on a triangulated membrane mesh.
//!
//! The discrete bending energy at a vertex `v` is
//!
//! ```text
//!     E_v = K/2 · |sigma_dash_v|² / sigma_v
//! ```
//!
//! where `sigma_v` is a cotangent-weighted mixed-area estimate and
//! `sigma_dash_v` is the corresponding curvature-normal estimator, both
//! accumulated from the edges incident on `v`.  Evaluation is two passes
//! over the interior edges: `compute_sigmas` accumulates the per-site
//! estimators, then `compute` differentiates the energy with respect to each
//! edge vector and assembles forces, per-site energies, and virials.  The
//! pass order matters; force terms read the *fully accumulated* estimators
//! of all four stencil sites.
//!
//! Everything here is stateless per evaluation.  Nothing is carried between
//! timesteps except the output buffers of `HelfrichForceCompute`.

use rayon_cond::CondIterator;

use rsmem_array_types::V3;
use rsmem_structure::{MeshTopology, PeriodicBox, SiteMap, TopologyError};

use crate::{FailOk, FailResult};

/// Lower clamp for `sin` in the cotangent weights.
///
/// As a flanking triangle degenerates, its cotangent diverges; clamping the
/// sine at this floor saturates the weight at ±1/SMALL instead, trading
/// accuracy on garbage geometry for finite output.
pub const SMALL: f64 = 1e-3;

//=================================================================
// Parameters

/// Per-edge-type bending stiffness.
#[derive(Debug, Clone)]
pub struct BendingParams {
    k: Vec<f64>,
    names: Vec<String>,
}

impl BendingParams {
    /// Parameters for `num_types` edge types, all with `K = 0` until set.
    ///
    /// Type names default to the decimal type ids.
    pub fn new(num_types: usize) -> Self {
        BendingParams {
            k: vec![0.0; num_types],
            names: (0..num_types).map(|i| i.to_string()).collect(),
        }
    }

    /// Parameters with one type per name.
    pub fn from_names<S: Into<String>>(names: Vec<S>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        BendingParams { k: vec![0.0; names.len()], names }
    }

    pub fn num_types(&self) -> usize
    { self.k.len() }

    /// Set the stiffness of an edge type.
    ///
    /// `K <= 0` is accepted (the membrane simply does not resist bending)
    /// but warned about once per type, since it is nearly always a mistake.
    pub fn set_k(&mut self, type_id: usize, k: f64) -> FailResult<()> {
        self.check_type(type_id)?;
        if k <= 0.0 {
            nonpositive_k_warnings::log(type_id, k);
        }
        self.k[type_id] = k;
        Ok(())
    }

    pub fn k(&self, type_id: usize) -> FailResult<f64> {
        self.check_type(type_id)?;
        Ok(self.k[type_id])
    }

    pub fn set_k_by_name(&mut self, name: &str, k: f64) -> FailResult<()> {
        let type_id = self.type_by_name(name)?;
        self.set_k(type_id, k)
    }

    pub fn k_by_name(&self, name: &str) -> FailResult<f64> {
        let type_id = self.type_by_name(name)?;
        self.k(type_id)
    }

    pub fn type_by_name(&self, name: &str) -> FailResult<usize> {
        match self.names.iter().position(|n| n == name) {
            Some(type_id) => Ok(type_id),
            None => bail!("no edge type named {:?}", name),
        }
    }

    fn check_type(&self, type_id: usize) -> FailResult<()> {
        if type_id >= self.k.len() {
            throw!(TopologyError::InvalidType { type_id, num_types: self.k.len() });
        }
        Ok(())
    }
}

mod nonpositive_k_warnings {
    use std::collections::HashSet;
    use std::sync::RwLock;

    lazy_static! {
        static ref SEEN: RwLock<HashSet<usize>> = RwLock::new(HashSet::new());
    }

    pub(super) fn log(type_id: usize, k: f64) {
        if SEEN.write().unwrap().insert(type_id) {
            warn!(
                "helfrich: K <= 0 specified for edge type {} (K = {}); \
                 the membrane will not resist bending", type_id, k,
            );
        }
    }
}

//=================================================================
// Resolved stencils

/// The four resolved sites around one interior edge.
///
/// `a, b` are the edge endpoints; `c, d` are the opposite vertices of the
/// two flanking triangles.
#[derive(Debug, Copy, Clone)]
pub struct EdgeStencil {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub d: usize,
    pub type_id: usize,
}

/// Every interior edge of a topology, resolved into site indices.
///
/// Resolution happens once per ownership epoch, so that evaluation never
/// touches tags.  Edges whose two flanking triangles coincide are dropped
/// here; they contribute nothing to the energy.
#[derive(Debug, Clone)]
pub struct EdgeStencils {
    edges: Vec<EdgeStencil>,
    num_sites: usize,
    num_owned: usize,
}

impl EdgeStencils {
    pub fn resolve(topology: &MeshTopology, sites: &SiteMap) -> FailResult<Self> {
        let mut edges = Vec::with_capacity(topology.edges().len());
        for (index, edge) in topology.edges().iter().enumerate() {
            let (c_tag, d_tag) = match topology.opposite_tags(index) {
                Some(pair) => pair,
                None => continue,
            };
            let (a_tag, b_tag) = edge.tags;
            edges.push(EdgeStencil {
                a: sites.resolve(a_tag)?,
                b: sites.resolve(b_tag)?,
                c: sites.resolve(c_tag)?,
                d: sites.resolve(d_tag)?,
                type_id: edge.type_id,
            });
        }
        Ok(EdgeStencils {
            edges,
            num_sites: sites.num_sites(),
            num_owned: sites.num_owned(),
        })
    }

    pub fn edges(&self) -> &[EdgeStencil]
    { &self.edges }

    pub fn num_sites(&self) -> usize
    { self.num_sites }

    pub fn num_owned(&self) -> usize
    { self.num_owned }
}

//=================================================================
// Geometry around one edge

// Minimum-imaged displacements between the stencil sites.
//
// All derivatives below are taken with respect to `dab` while the other
// four vectors are held fixed; that decomposition is what makes the
// per-edge force terms sum to the total gradient.
#[derive(Debug, Copy, Clone)]
struct EdgeVectors {
    dab: V3,
    dac: V3,
    dad: V3,
    dbc: V3,
    dbd: V3,
}

fn edge_vectors(
    bounds: &PeriodicBox,
    positions: &[V3],
    st: &EdgeStencil,
) -> FailResult<EdgeVectors> {
    let pair = |i: usize, j: usize| -> FailResult<V3> {
        let d = bounds.min_image(positions[i] - positions[j]);
        if d.sqnorm() == 0.0 {
            throw!(TopologyError::ZeroLengthEdge { a: i, b: j });
        }
        Ok(d)
    };
    Ok(EdgeVectors {
        dab: pair(st.a, st.b)?,
        dac: pair(st.a, st.c)?,
        dad: pair(st.a, st.d)?,
        dbc: pair(st.b, st.c)?,
        dbd: pair(st.b, st.d)?,
    })
}

#[inline(always)]
fn clamped(cos: f64) -> f64
{ cos.min(1.0).max(-1.0) }

#[inline(always)]
fn inv_sin(cos: f64) -> f64
{ 1.0 / f64::max((1.0 - cos * cos).sqrt(), SMALL) }

// cotangent edge weight: (cot(acb) + cot(adb)) / 2
fn edge_weight(v: &EdgeVectors) -> f64 {
    let nac = v.dac.unit();
    let nad = v.dad.unit();
    let nbc = v.dbc.unit();
    let nbd = v.dbd.unit();

    let cos_accb = clamped(V3::dot(&nac, &nbc));
    let cos_addb = clamped(V3::dot(&nad, &nbd));
    (cos_accb * inv_sin(cos_accb) + cos_addb * inv_sin(cos_addb)) / 2.0
}

//=================================================================
// Pass 1: accumulation

/// Per-site output of the accumulation pass.
///
/// Rebuilt from zero on every evaluation; ghost sites accumulate too, since
/// their estimators feed the force terms of nearby owned sites.
#[derive(Debug, Clone)]
pub struct Sigmas {
    pub sigma: Vec<f64>,
    pub sigma_dash: Vec<V3>,
}

pub fn compute_sigmas(
    stencils: &EdgeStencils,
    bounds: &PeriodicBox,
    positions: &[V3],
    use_rayon: bool,
) -> FailResult<Sigmas> {
    ensure!(
        positions.len() == stencils.num_sites(),
        "wrong number of positions: {} (expected {})",
        positions.len(), stencils.num_sites(),
    );

    let terms = {
        CondIterator::new(stencils.edges(), use_rayon).map(|st| {
            let v = edge_vectors(bounds, positions, st)?;
            FailOk((st.a, st.b, v.dab, edge_weight(&v)))
        }).collect::<FailResult<Vec<_>>>()?
    };

    let mut sigma = vec![0.0; stencils.num_sites()];
    let mut sigma_dash = vec![V3::zero(); stencils.num_sites()];
    for (a, b, dab, sigma_hat) in terms {
        let area_term = sigma_hat * dab.sqnorm() / 4.0;
        sigma[a] += area_term;
        sigma[b] += area_term;
        sigma_dash[a] += sigma_hat * dab;
        sigma_dash[b] -= sigma_hat * dab;
    }
    Ok(Sigmas { sigma, sigma_dash })
}

//=================================================================
// Pass 2: forces

/// One edge's contribution to the forces.
///
/// The force applied at `plus_site` is `-grad`; at `minus_site`, `+grad`.
#[derive(Debug, Clone)]
pub struct EdgeGrad {
    pub plus_site: usize,
    pub minus_site: usize,
    /// Minimum-imaged vector from `minus_site` to `plus_site`.
    pub cart_vector: V3,
    /// Derivative of the total energy with respect to `cart_vector`.
    pub grad: V3,
}

pub fn compute_by_edge(
    params: &BendingParams,
    stencils: &EdgeStencils,
    sigmas: &Sigmas,
    bounds: &PeriodicBox,
    positions: &[V3],
    use_rayon: bool,
) -> FailResult<Vec<EdgeGrad>> {
    ensure!(
        positions.len() == stencils.num_sites(),
        "wrong number of positions: {} (expected {})",
        positions.len(), stencils.num_sites(),
    );
    ensure!(sigmas.sigma.len() == stencils.num_sites(), "stale sigmas");

    CondIterator::new(stencils.edges(), use_rayon).map(|st| {
        let k = params.k(st.type_id)?;
        let v = edge_vectors(bounds, positions, st)?;
        let grad = k * energy_d_dab(&v, sigmas, st);
        FailOk(EdgeGrad {
            plus_site: st.a,
            minus_site: st.b,
            cart_vector: v.dab,
            grad,
        })
    }).collect()
}

// Derivative of the total energy (for unit K) with respect to the edge
// vector dab, all other displacement vectors held fixed.
//
// Only the four stencil sites depend on dab.  For each of them the chain
// rule needs the derivative of the site's weight sigma and of its estimator
// sigma_dash; the latter enters through every incident edge weight that
// involves an endpoint angle at a or b.
fn energy_d_dab(v: &EdgeVectors, sigmas: &Sigmas, st: &EdgeStencil) -> V3 {
    let EdgeVectors { dab, dac, dad, dbc, dbd } = *v;

    let rab = dab.norm();
    let rac = dac.norm();
    let rad = dad.norm();
    let rbc = dbc.norm();
    let rbd = dbd.norm();

    let nab = dab / rab;
    let nac = dac / rac;
    let nad = dad / rad;
    let nbc = dbc / rbc;
    let nbd = dbd / rbd;

    // angles at the far vertices (the weight itself)...
    let cos_accb = clamped(V3::dot(&nac, &nbc));
    let cos_addb = clamped(V3::dot(&nad, &nbd));
    let sigma_hat = (cos_accb * inv_sin(cos_accb) + cos_addb * inv_sin(cos_addb)) / 2.0;

    // ...and at the endpoints (the only angles that vary with dab)
    let cos_abbc = clamped(-V3::dot(&nab, &nbc));
    let cos_abbd = clamped(-V3::dot(&nab, &nbd));
    let cos_baac = clamped(V3::dot(&nab, &nac));
    let cos_baad = clamped(V3::dot(&nab, &nad));

    let cos_abbc_d_dab = (-nbc - cos_abbc * nab) / rab;
    let cos_abbd_d_dab = (-nbd - cos_abbd * nab) / rab;
    let cos_baac_d_dab = (nac - cos_baac * nab) / rab;
    let cos_baad_d_dab = (nad - cos_baad * nab) / rab;

    // d(cot θ)/d(cos θ) = 1/sin³θ, with the same saturation as the weight
    let cube = |x: f64| x * x * x;
    let sigma_hat_ac_d_dab = cos_abbc_d_dab * (cube(inv_sin(cos_abbc)) / 2.0);
    let sigma_hat_ad_d_dab = cos_abbd_d_dab * (cube(inv_sin(cos_abbd)) / 2.0);
    let sigma_hat_bc_d_dab = cos_baac_d_dab * (cube(inv_sin(cos_baac)) / 2.0);
    let sigma_hat_bd_d_dab = cos_baad_d_dab * (cube(inv_sin(cos_baad)) / 2.0);

    // mixed-area weights of the four stencil sites
    let sigma_a_d_dab = {
        (sigma_hat_ac_d_dab * (rac * rac) + sigma_hat_ad_d_dab * (rad * rad)
            + 2.0 * sigma_hat * dab) / 4.0
    };
    let sigma_b_d_dab = {
        (sigma_hat_bc_d_dab * (rbc * rbc) + sigma_hat_bd_d_dab * (rbd * rbd)
            + 2.0 * sigma_hat * dab) / 4.0
    };
    let sigma_c_d_dab = {
        (sigma_hat_ac_d_dab * (rac * rac) + sigma_hat_bc_d_dab * (rbc * rbc)) / 4.0
    };
    let sigma_d_d_dab = {
        (sigma_hat_ad_d_dab * (rad * rad) + sigma_hat_bd_d_dab * (rbd * rbd)) / 4.0
    };

    let sigma = &sigmas.sigma;
    let sigma_dash = &sigmas.sigma_dash;

    // chain rule per site:  d/d(dab) [ |σ'|²/(2σ) ]
    //                     = (σ'·dσ'/d(dab))/σ − |σ'|²/(2σ²)·dσ/d(dab)
    // a site whose incident edges were all skipped accumulates nothing; its
    // estimator is identically zero and its true contribution is zero, not
    // the 0/0 the expressions below would produce
    let mut grad = V3::zero();
    if sigma[st.a] != 0.0 {
        // site a:  σ'_a = Σ_e σ̂_e d_e over edges e at a; the dab term is
        // direct, the dac/dad terms enter through their weights
        let inv = 1.0 / sigma[st.a];
        let sd = sigma_dash[st.a];
        grad += inv * (sigma_hat * sd
            + V3::dot(&sd, &dac) * sigma_hat_ac_d_dab
            + V3::dot(&sd, &dad) * sigma_hat_ad_d_dab);
        grad -= (0.5 * sd.sqnorm() * inv * inv) * sigma_a_d_dab;
    }
    if sigma[st.b] != 0.0 {
        // site b: the direct term flips sign (σ'_b accumulates −σ̂_ab·dab)
        let inv = 1.0 / sigma[st.b];
        let sd = sigma_dash[st.b];
        grad += inv * (-sigma_hat * sd
            + V3::dot(&sd, &dbc) * sigma_hat_bc_d_dab
            + V3::dot(&sd, &dbd) * sigma_hat_bd_d_dab);
        grad -= (0.5 * sd.sqnorm() * inv * inv) * sigma_b_d_dab;
    }
    if sigma[st.c] != 0.0 {
        // site c: its estimator holds −σ̂_ac·dac − σ̂_bc·dbc
        let inv = 1.0 / sigma[st.c];
        let sd = sigma_dash[st.c];
        grad += inv * (-V3::dot(&sd, &dac) * sigma_hat_ac_d_dab
            - V3::dot(&sd, &dbc) * sigma_hat_bc_d_dab);
        grad -= (0.5 * sd.sqnorm() * inv * inv) * sigma_c_d_dab;
    }
    if sigma[st.d] != 0.0 {
        let inv = 1.0 / sigma[st.d];
        let sd = sigma_dash[st.d];
        grad += inv * (-V3::dot(&sd, &dad) * sigma_hat_ad_d_dab
            - V3::dot(&sd, &dbd) * sigma_hat_bd_d_dab);
        grad -= (0.5 * sd.sqnorm() * inv * inv) * sigma_d_d_dab;
    }
    grad
}

//=================================================================
// Assembly

/// Per-owned-site outputs of one evaluation.
#[derive(Debug, Clone)]
pub struct Output {
    pub forces: Vec<V3>,
    /// Per-site potential energy.  Sums to the total bending energy.
    pub energies: Vec<f64>,
    /// Upper-triangle virial components, ordered
    /// `[xx, xy, xz, yy, yz, zz]`.  Present when requested.
    pub virials: Option<Vec<[f64; 6]>>,
}

/// Run both passes and assemble per-site outputs.
///
/// Ghost sites (indices at or above the site map's `num_owned`) participate
/// in the geometry but never appear in the outputs; the owning rank computes
/// its own copy of their contributions.
pub fn compute(
    params: &BendingParams,
    stencils: &EdgeStencils,
    bounds: &PeriodicBox,
    positions: &[V3],
    use_rayon: bool,
    with_virial: bool,
) -> FailResult<Output> {
    let sigmas = compute_sigmas(stencils, bounds, positions, use_rayon)?;
    let terms = compute_by_edge(params, stencils, &sigmas, bounds, positions, use_rayon)?;

    let num_owned = stencils.num_owned();
    let mut forces = vec![V3::zero(); num_owned];
    let mut energies = vec![0.0; num_owned];
    let mut virials = match with_virial {
        true => Some(vec![[0.0; 6]; num_owned]),
        false => None,
    };

    for term in &terms {
        let force = -term.grad;
        if term.plus_site < num_owned {
            forces[term.plus_site] += force;
        }
        if term.minus_site < num_owned {
            forces[term.minus_site] -= force;
        }
        if let Some(virials) = &mut virials {
            // half the pair virial to each endpoint, computed from the
            // force applied at plus_site
            let d = term.cart_vector;
            let w = [
                0.5 * d[0] * force[0],
                0.5 * d[1] * force[0],
                0.5 * d[2] * force[0],
                0.5 * d[1] * force[1],
                0.5 * d[2] * force[1],
                0.5 * d[2] * force[2],
            ];
            for &site in &[term.plus_site, term.minus_site] {
                if site < num_owned {
                    for i in 0..6 {
                        virials[site][i] += w[i];
                    }
                }
            }
        }
    }

    // Per-site energies are overwritten rather than accumulated; with the
    // estimators fully accumulated, every incident edge writes the same
    // value apart from its type's K (the last edge wins on that).
    for st in stencils.edges() {
        let k = params.k(st.type_id)?;
        for &site in &[st.a, st.b] {
            if site < num_owned {
                energies[site] = {
                    k * 0.5 * sigmas.sigma_dash[site].sqnorm() / sigmas.sigma[site]
                };
            }
        }
    }

    Ok(Output { forces, energies, virials })
}

//=================================================================
// Driver

/// A force computation driven by timestep, with buffered outputs.
pub trait MeshForceCompute {
    /// Recompute outputs for a timestep.  Calling this twice with the same
    /// timestep does not recompute.
    fn compute_forces(&mut self, timestep: u64, positions: &[V3]) -> FailResult<()>;

    fn forces(&self) -> &[V3];
    fn energies(&self) -> &[f64];
    fn virials(&self) -> Option<&[[f64; 6]]>;

    /// Total potential energy of the owned sites.
    fn energy(&self) -> f64
    { self.energies().iter().sum() }
}

/// The buffered Helfrich bending force.
///
/// Output buffers hold zeros until the first successful evaluation and keep
/// their previous contents when an evaluation fails.
pub struct HelfrichForceCompute {
    params: BendingParams,
    stencils: EdgeStencils,
    bounds: PeriodicBox,
    use_rayon: bool,
    with_virial: bool,
    last_timestep: Option<u64>,
    forces: Vec<V3>,
    energies: Vec<f64>,
    virials: Option<Vec<[f64; 6]>>,
}

impl HelfrichForceCompute {
    /// Resolve a topology against a site map and set up zeroed buffers.
    ///
    /// Unknown tags and malformed edges are caught here, not at evaluation
    /// time.
    pub fn new(
        params: BendingParams,
        topology: &MeshTopology,
        sites: &SiteMap,
        bounds: PeriodicBox,
    ) -> FailResult<Self> {
        let stencils = EdgeStencils::resolve(topology, sites)?;
        let num_owned = sites.num_owned();
        Ok(HelfrichForceCompute {
            params, stencils, bounds,
            use_rayon: false,
            with_virial: false,
            last_timestep: None,
            forces: vec![V3::zero(); num_owned],
            energies: vec![0.0; num_owned],
            virials: None,
        })
    }

    pub fn use_rayon(mut self, use_rayon: bool) -> Self {
        self.use_rayon = use_rayon;
        self
    }

    pub fn with_virial(mut self, with_virial: bool) -> Self {
        self.with_virial = with_virial;
        if !with_virial {
            self.virials = None;
        }
        self
    }

    pub fn params(&self) -> &BendingParams
    { &self.params }

    /// Mutable access to the parameters.  Invalidates the timestep cache.
    pub fn params_mut(&mut self) -> &mut BendingParams {
        self.last_timestep = None;
        &mut self.params
    }
}

impl MeshForceCompute for HelfrichForceCompute {
    fn compute_forces(&mut self, timestep: u64, positions: &[V3]) -> FailResult<()> {
        if self.last_timestep == Some(timestep) {
            return Ok(());
        }
        let out = compute(
            &self.params, &self.stencils, &self.bounds, positions,
            self.use_rayon, self.with_virial,
        )?;

        self.forces = out.forces;
        self.energies = out.energies;
        self.virials = out.virials;
        self.last_timestep = Some(timestep);
        Ok(())
    }

    fn forces(&self) -> &[V3]
    { &self.forces }

    fn energies(&self) -> &[f64]
    { &self.energies }

    fn virials(&self) -> Option<&[[f64; 6]]>
    { self.virials.as_ref().map(|v| &v[..]) }
}

//=================================================================

#[cfg(test)]
#[derive(Deserialize)]
struct ForceFile {
    value: f64,
    energies: Vec<f64>,
    forces: Vec<[f64; 3]>,
    virials: Vec<[f64; 6]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use slice_of_array::prelude::*;

    use rsmem_structure::MeshTriangle;

    use crate::numerical;
    use crate::util::{random_rotation, rotate, uniform};

    const ICOSAHEDRON_TRIANGLES: [[usize; 3]; 20] = [
        [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
        [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
        [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
        [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
    ];

    pub(crate) fn icosahedron() -> (MeshTopology, Vec<V3>) {
        let phi = (1.0 + 5f64.sqrt()) / 2.0;
        let raw = [
            [-1.0, phi, 0.0], [1.0, phi, 0.0], [-1.0, -phi, 0.0], [1.0, -phi, 0.0],
            [0.0, -1.0, phi], [0.0, 1.0, phi], [0.0, -1.0, -phi], [0.0, 1.0, -phi],
            [phi, 0.0, -1.0], [phi, 0.0, 1.0], [-phi, 0.0, -1.0], [-phi, 0.0, 1.0],
        ];
        let norm = (1.0 + phi * phi).sqrt();
        let positions = raw.iter().map(|&p| V3(p) / norm).collect();
        let triangles = ICOSAHEDRON_TRIANGLES.iter().map(|&t| MeshTriangle(t)).collect();
        let topology = MeshTopology::from_triangles(triangles, 0).unwrap();
        (topology, positions)
    }

    // a deterministic, reproducible perturbation that breaks every symmetry
    pub(crate) fn perturbed(positions: &[V3]) -> Vec<V3> {
        positions.iter().enumerate().map(|(i, p)| {
            V3::from_fn(|k| p[k] + 0.03 * (((i * 7 + k * 3) % 5) as f64 - 2.0) / 10.0)
        }).collect()
    }

    pub(crate) fn unit_params() -> BendingParams {
        let mut params = BendingParams::new(1);
        params.set_k(0, 1.0).unwrap();
        params
    }

    pub(crate) fn resolve_all(topology: &MeshTopology, num_sites: usize) -> EdgeStencils {
        EdgeStencils::resolve(topology, &SiteMap::identity(num_sites)).unwrap()
    }

    pub(crate) fn total_energy(
        params: &BendingParams,
        stencils: &EdgeStencils,
        bounds: &PeriodicBox,
        positions: &[V3],
    ) -> FailResult<f64> {
        let out = compute(params, stencils, bounds, positions, false, false)?;
        Ok(out.energies.iter().sum())
    }

    #[test]
    fn icosahedron_has_thirty_interior_edges() {
        let (topology, positions) = icosahedron();
        let stencils = resolve_all(&topology, positions.len());
        assert_eq!(stencils.edges().len(), 30);
    }

    #[test]
    fn energy_is_invariant_under_rigid_motion() -> FailResult<()> {
        let ref bounds = PeriodicBox::non_periodic();
        let (topology, positions) = icosahedron();
        let positions = perturbed(&positions);
        let ref params = unit_params();
        let ref stencils = resolve_all(&topology, positions.len());

        let value = total_energy(params, stencils, bounds, &positions)?;
        for _ in 0..5 {
            let rot = random_rotation();
            let shift = V3([
                uniform(-3.0, 3.0), uniform(-3.0, 3.0), uniform(-3.0, 3.0),
            ]);
            let moved: Vec<V3> = {
                positions.iter().map(|p| rotate(&rot, p) + shift).collect()
            };
            let moved_value = total_energy(params, stencils, bounds, &moved)?;
            assert_close!(rel=1e-8, value, moved_value);
        }
        Ok(())
    }

    #[test]
    fn net_force_vanishes_on_closed_mesh() -> FailResult<()> {
        let ref bounds = PeriodicBox::non_periodic();
        let (topology, positions) = icosahedron();
        let positions = perturbed(&positions);
        let ref params = unit_params();
        let ref stencils = resolve_all(&topology, positions.len());

        let out = compute(params, stencils, bounds, &positions, false, false)?;
        let total: V3 = out.forces.iter().sum();
        assert_close!(abs=1e-12, total.0, [0.0; 3]);
        Ok(())
    }

    #[test]
    fn force_matches_numerical_gradient() -> FailResult<()> {
        let ref bounds = PeriodicBox::non_periodic();
        let (topology, positions) = icosahedron();
        let positions = perturbed(&positions);
        let ref params = unit_params();
        let ref stencils = resolve_all(&topology, positions.len());

        let out = compute(params, stencils, bounds, &positions, false, false)?;
        let grad = numerical::try_gradient(1e-4, None, positions.flat(), |flat| {
            total_energy(params, stencils, bounds, flat.nest())
        })?;

        for (&force, &slope) in out.forces.flat().iter().zip(&grad) {
            assert_close!(abs=1e-8, rel=1e-4, force, -slope);
        }
        Ok(())
    }

    #[test]
    fn flat_patch_interior_vertex_feels_no_force() -> FailResult<()> {
        // center vertex plus two full rings of an equilateral triangular
        // lattice; every estimator the center's force terms touch is zero
        let mut index = HashMap::new();
        let mut positions = vec![];
        for q in -2..=2i32 {
            for r in -2..=2i32 {
                if q.abs().max(r.abs()).max((q + r).abs()) <= 2 {
                    index.insert((q, r), positions.len());
                    positions.push(V3([
                        q as f64 + 0.5 * r as f64,
                        r as f64 * 3f64.sqrt() / 2.0,
                        0.0,
                    ]));
                }
            }
        }
        let mut triangles = vec![];
        for (&(q, r), &i) in &index {
            if let (Some(&j), Some(&k)) = (index.get(&(q + 1, r)), index.get(&(q, r + 1))) {
                triangles.push(MeshTriangle([i, j, k]));
            }
            if let (Some(&j), Some(&k)) = (index.get(&(q + 1, r)), index.get(&(q + 1, r - 1))) {
                triangles.push(MeshTriangle([i, j, k]));
            }
        }
        let topology = MeshTopology::from_triangles(triangles, 0)?;
        let ref stencils = resolve_all(&topology, positions.len());
        let ref params = unit_params();

        let out = compute(params, stencils, &PeriodicBox::non_periodic(), &positions, false, false)?;
        let center = index[&(0, 0)];
        assert_close!(abs=1e-12, out.forces[center].0, [0.0; 3]);
        assert_close!(abs=1e-12, out.energies[center], 0.0);
        Ok(())
    }

    #[test]
    fn saturated_cotangent_stays_finite() -> FailResult<()> {
        // vertex 2 sits almost on the segment (0, 1); its cotangent
        // saturates at 1/SMALL instead of diverging
        let topology = MeshTopology::from_triangles(vec![
            MeshTriangle([0, 1, 2]),
            MeshTriangle([0, 3, 1]),
        ], 0)?;
        let positions = vec![
            V3([0.0, 0.0, 0.0]),
            V3([1.0, 0.0, 0.0]),
            V3([0.5, 1e-9, 0.0]),
            V3([0.5, -0.8, 0.1]),
        ];
        let ref stencils = resolve_all(&topology, positions.len());
        let ref params = unit_params();

        let out = compute(params, stencils, &PeriodicBox::non_periodic(), &positions, false, true)?;
        for force in &out.forces {
            assert!(force.iter().all(|x| x.is_finite()), "{:?}", force);
        }
        assert!(out.energies.iter().all(|x| x.is_finite()), "{:?}", out.energies);
        for virial in out.virials.as_ref().unwrap() {
            assert!(virial.iter().all(|x| x.is_finite()), "{:?}", virial);
        }
        Ok(())
    }

    #[test]
    fn boundary_only_stencil_sites_are_inert() -> FailResult<()> {
        // a two-triangle flap hangs off vertex 3 of a closed tetrahedron.
        // vertex 6 flanks the flap's lone interior edge (4, 5) but every
        // edge incident on it is a boundary edge, so it accumulates no
        // estimators at all
        let ref bounds = PeriodicBox::non_periodic();
        let ref params = unit_params();
        let tetrahedron = vec![
            MeshTriangle([0, 1, 2]),
            MeshTriangle([0, 3, 1]),
            MeshTriangle([0, 2, 3]),
            MeshTriangle([1, 3, 2]),
        ];
        let closed = vec![
            V3([0.0, 0.0, 0.0]),
            V3([1.0, 0.1, 0.0]),
            V3([0.4, 1.0, 0.1]),
            V3([0.5, 0.3, 0.9]),
        ];

        let alone = {
            let topology = MeshTopology::from_triangles(tetrahedron.clone(), 0)?;
            let ref stencils = resolve_all(&topology, closed.len());
            compute(params, stencils, bounds, &closed, false, false)?
        };

        let mut triangles = tetrahedron;
        triangles.push(MeshTriangle([3, 4, 5]));
        triangles.push(MeshTriangle([4, 6, 5]));
        let mut positions = closed;
        positions.extend_from_slice(&[
            V3([0.6, 0.2, 1.8]),
            V3([1.2, 0.5, 1.6]),
            V3([1.0, -0.3, 2.2]),
        ]);
        let topology = MeshTopology::from_triangles(triangles, 0)?;
        let ref stencils = resolve_all(&topology, positions.len());
        let out = compute(params, stencils, bounds, &positions, false, true)?;

        assert!(out.forces.flat().iter().all(|x| x.is_finite()), "{:?}", out.forces);
        for virial in out.virials.as_ref().unwrap() {
            assert!(virial.iter().all(|x| x.is_finite()), "{:?}", virial);
        }

        // the flap touches the closed part only through skipped edges, so
        // the tetrahedron's outputs are untouched
        assert_eq!(out.forces[..4], alone.forces[..]);
        assert_eq!(out.energies[..4], alone.energies[..]);

        // and nothing ever writes to the boundary-only vertex
        assert_eq!(out.forces[6], V3::zero());
        assert_eq!(out.energies[6], 0.0);
        Ok(())
    }

    #[test]
    fn zero_length_edge_is_fatal() {
        let (topology, mut positions) = icosahedron();
        positions[3] = positions[2];
        let ref stencils = resolve_all(&topology, positions.len());
        let ref params = unit_params();

        let err = {
            compute(params, stencils, &PeriodicBox::non_periodic(), &positions, false, false)
                .unwrap_err()
        };
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::ZeroLengthEdge { .. }) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn virial_halves_match_edge_terms() -> FailResult<()> {
        let ref bounds = PeriodicBox::non_periodic();
        let (topology, positions) = icosahedron();
        let positions = perturbed(&positions);
        let ref params = unit_params();
        let ref stencils = resolve_all(&topology, positions.len());

        let out = compute(params, stencils, bounds, &positions, false, true)?;

        let sigmas = compute_sigmas(stencils, bounds, &positions, false)?;
        let terms = compute_by_edge(params, stencils, &sigmas, bounds, &positions, false)?;
        let mut expected = vec![[0.0; 6]; positions.len()];
        for term in terms {
            let d = term.cart_vector;
            let f = -term.grad;
            let w = [
                0.5 * d[0] * f[0], 0.5 * d[1] * f[0], 0.5 * d[2] * f[0],
                0.5 * d[1] * f[1], 0.5 * d[2] * f[1], 0.5 * d[2] * f[2],
            ];
            for &site in &[term.plus_site, term.minus_site] {
                for i in 0..6 {
                    expected[site][i] += w[i];
                }
            }
        }
        assert_close!(abs=1e-13, out.virials.unwrap(), expected);
        Ok(())
    }

    #[test]
    fn ghost_sites_receive_no_writes() -> FailResult<()> {
        let ref bounds = PeriodicBox::non_periodic();
        let (topology, positions) = icosahedron();
        let positions = perturbed(&positions);
        let ref params = unit_params();

        let full = {
            let ref stencils = resolve_all(&topology, positions.len());
            compute(params, stencils, bounds, &positions, false, false)?
        };
        let split = {
            let sites = SiteMap::identity_with_ghosts(8, positions.len());
            let ref stencils = EdgeStencils::resolve(&topology, &sites)?;
            compute(params, stencils, bounds, &positions, false, false)?
        };

        // owned sites see every incident edge either way, so their outputs
        // agree exactly; ghosts simply vanish from the output
        assert_eq!(split.forces.len(), 8);
        assert_eq!(split.forces[..], full.forces[..8]);
        assert_eq!(split.energies[..], full.energies[..8]);
        Ok(())
    }

    #[test]
    fn parallel_evaluation_agrees() -> FailResult<()> {
        let ref bounds = PeriodicBox::non_periodic();
        let (topology, positions) = icosahedron();
        let positions = perturbed(&positions);
        let ref params = unit_params();
        let ref stencils = resolve_all(&topology, positions.len());

        let serial = compute(params, stencils, bounds, &positions, false, true)?;
        let parallel = compute(params, stencils, bounds, &positions, true, true)?;
        assert_eq!(serial.forces[..], parallel.forces[..]);
        assert_eq!(serial.energies[..], parallel.energies[..]);
        assert_eq!(serial.virials, parallel.virials);
        Ok(())
    }

    #[test]
    fn params_access_by_name() -> FailResult<()> {
        let mut params = BendingParams::from_names(vec!["membrane", "scaffold"]);
        params.set_k_by_name("scaffold", 2.5)?;
        assert_eq!(params.k_by_name("scaffold")?, 2.5);
        assert_eq!(params.k(1)?, 2.5);
        assert!(params.k_by_name("nope").is_err());
        Ok(())
    }

    #[test]
    fn params_reject_bad_type_ids() {
        let mut params = BendingParams::new(2);
        let err = params.set_k(2, 1.0).unwrap_err();
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::InvalidType { type_id: 2, num_types: 2 }) => {},
            other => panic!("unexpected: {:?}", other),
        }
        assert!(params.k(5).is_err());
    }

    #[test]
    fn nonpositive_k_is_allowed() -> FailResult<()> {
        let mut params = BendingParams::new(1);
        params.set_k(0, -1.0)?;
        assert_eq!(params.k(0)?, -1.0);
        Ok(())
    }

    #[test]
    fn driver_caches_by_timestep() -> FailResult<()> {
        let (topology, positions) = icosahedron();
        let positions = perturbed(&positions);
        let sites = SiteMap::identity(12);
        let mut fc = {
            HelfrichForceCompute::new(
                unit_params(), &topology, &sites, PeriodicBox::non_periodic(),
            )?.with_virial(true)
        };

        assert_eq!(fc.energy(), 0.0);
        fc.compute_forces(10, &positions)?;
        let value = fc.energy();
        assert!(value != 0.0);
        assert_eq!(fc.virials().unwrap().len(), 12);

        // same timestep: no recompute, even with different positions
        let (_, symmetric) = icosahedron();
        fc.compute_forces(10, &symmetric)?;
        assert_eq!(fc.energy(), value);

        // new timestep: recompute
        fc.compute_forces(11, &symmetric)?;
        assert!(fc.energy() != value);
        Ok(())
    }

    #[test]
    fn driver_keeps_outputs_on_failure() -> FailResult<()> {
        let (topology, positions) = icosahedron();
        let sites = SiteMap::identity(12);
        let mut fc = {
            HelfrichForceCompute::new(
                unit_params(), &topology, &sites, PeriodicBox::non_periodic(),
            )?
        };

        fc.compute_forces(0, &positions)?;
        let value = fc.energy();
        let forces = fc.forces().to_vec();

        let truncated = vec![V3::zero(); 5];
        assert!(fc.compute_forces(1, &truncated).is_err());
        assert_eq!(fc.energy(), value);
        assert_eq!(fc.forces(), &forces[..]);

        // and the failed timestep was not marked as computed
        fc.compute_forces(1, &positions)?;
        assert_close!(rel=1e-12, fc.energy(), value);
        Ok(())
    }

    #[test]
    fn driver_rejects_unknown_tags() {
        let (topology, _) = icosahedron();
        // map fewer sites than the mesh names
        let sites = SiteMap::identity(7);
        let err = {
            HelfrichForceCompute::new(
                unit_params(), &topology, &sites, PeriodicBox::non_periodic(),
            ).map(|_| ()).unwrap_err()
        };
        match err.downcast_ref::<TopologyError>() {
            Some(TopologyError::UnknownTag { .. }) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn min_image_sees_through_the_boundary() -> FailResult<()> {
        // the same mesh, with one copy wrapped across a periodic boundary,
        // must produce identical outputs
        let ref bounds = PeriodicBox::diagonal(V3([20.0, 20.0, 20.0]))?;
        let (topology, positions) = icosahedron();
        let positions = perturbed(&positions);
        let wrapped: Vec<V3> = {
            positions.iter().map(|&p| {
                // shift into a corner so some edges cross the boundary
                let shifted = p + V3([19.5, 19.5, 0.0]);
                V3::from_fn(|k| shifted[k] % 20.0)
            }).collect()
        };
        let ref params = unit_params();
        let ref stencils = resolve_all(&topology, positions.len());

        let plain = compute(params, stencils, bounds, &positions, false, false)?;
        let moved = compute(params, stencils, bounds, &wrapped, false, false)?;
        assert_close!(abs=1e-10, plain.forces.flat(), moved.forces.flat());
        assert_close!(
            rel=1e-10,
            plain.energies.iter().sum::<f64>(),
            moved.energies.iter().sum::<f64>(),
        );
        Ok(())
    }
}
