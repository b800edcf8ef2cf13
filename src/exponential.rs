//! Evaluation of the characteristic attenuation factor `1 - exp(-tau / sin(theta_p))`
//!
//! The factor is needed once per segment, polar angle and group in the innermost sweep loop.
//! It is either evaluated directly with the platform math library or interpolated from a
//! precomputed value/slope table. The table is read-only after setup and shared between the
//! sweep threads without synchronization.

use numeric_literals::replace_float_literals;

use crate::aligned::AlignedVec;
use crate::track::PolarQuadrature;
use crate::Real;

/// Relative accuracy target of the interpolated mode
const TABLE_ACCURACY: f64 = 1.0e-5;

/// How the attenuation factor is evaluated
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExponentialMode {
    /// Evaluate the exponential with the platform math library
    Direct,
    /// Linearly interpolate a precomputed table
    Interpolated,
}

/// Evaluator of the attenuation factor for all polar angles of a quadrature
#[derive(Clone, Debug)]
pub struct ExpEvaluator<R: Real> {
    inv_sin_thetas: Vec<R>,
    table: Option<ExpTable<R>>,
}

/// Value/slope interpolation table, laid out as `[entry][polar](value, slope)`
#[derive(Clone, Debug)]
struct ExpTable<R: Real> {
    data: AlignedVec<R>,
    spacing: R,
    inv_spacing: R,
    num_entries: usize,
    num_polar: usize,
}

impl<R: Real> ExpEvaluator<R> {
    /// Sets up an evaluator for the given quadrature
    ///
    /// `max_tau` is the largest optical length any segment of the problem can produce; the
    /// interpolation table covers at least this range.
    pub fn new(mode: ExponentialMode, quadrature: &PolarQuadrature<R>, max_tau: R) -> Self {
        let inv_sin_thetas = quadrature
            .sin_thetas()
            .iter()
            .map(|&sin| R::one() / sin)
            .collect();
        let table = match mode {
            ExponentialMode::Direct => None,
            ExponentialMode::Interpolated => Some(build_table(quadrature, max_tau)),
        };
        Self {
            inv_sin_thetas,
            table,
        }
    }

    /// Returns the number of polar angles the evaluator was built for
    pub fn num_polar(&self) -> usize {
        self.inv_sin_thetas.len()
    }

    /// Evaluates `1 - exp(-tau / sin(theta_p))` for the polar angle with index `polar`
    #[inline(always)]
    pub fn eval(&self, tau: R, polar: usize) -> R {
        match &self.table {
            None => R::one() - (-tau * self.inv_sin_thetas[polar]).exp(),
            Some(table) => {
                match (tau * table.inv_spacing).floor().to_usize() {
                    Some(entry) if entry < table.num_entries => {
                        let base = (entry * table.num_polar + polar) * 2;
                        let data = table.data.as_slice();
                        let offset = tau - R::from_usize(entry).unwrap() * table.spacing;
                        data[base] + offset * data[base + 1]
                    }
                    // Beyond the table the factor saturates at full attenuation
                    _ => R::one(),
                }
            }
        }
    }
}

/// Builds the value/slope table with a spacing that keeps the interpolation error below the
/// accuracy target for the shallowest polar angle
#[replace_float_literals(R::from_f64(literal).unwrap())]
fn build_table<R: Real>(quadrature: &PolarQuadrature<R>, max_tau: R) -> ExpTable<R> {
    let num_polar = quadrature.num_polar();
    let sin_min = quadrature
        .sin_thetas()
        .iter()
        .fold(R::one(), |min, &sin| min.min(sin));

    // Secant interpolation error is bounded by spacing^2 / (8 sin_min^2)
    let spacing = sin_min * (8.0 * R::from_f64(TABLE_ACCURACY).unwrap()).sqrt();
    // Past this optical length the factor is 1 within the accuracy target for every angle
    let tau_cutoff = -R::from_f64(TABLE_ACCURACY).unwrap().ln();
    let covered = max_tau.max(tau_cutoff);
    let num_entries = (covered / spacing).ceil().to_usize().unwrap() + 1;

    let mut data = AlignedVec::zeros(num_entries * num_polar * 2);
    {
        let data = data.as_mut_slice();
        for entry in 0..num_entries {
            let tau = R::from_usize(entry).unwrap() * spacing;
            for (polar, &sin) in quadrature.sin_thetas().iter().enumerate() {
                let value = 1.0 - (-tau / sin).exp();
                let next = 1.0 - (-(tau + spacing) / sin).exp();
                let base = (entry * num_polar + polar) * 2;
                data[base] = value;
                data[base + 1] = (next - value) / spacing;
            }
        }
    }

    ExpTable {
        data,
        spacing,
        inv_spacing: R::one() / spacing,
        num_entries,
        num_polar,
    }
}
