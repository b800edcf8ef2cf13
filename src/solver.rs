//! The transport solver: power iteration over vectorized characteristic sweeps
//!
//! One outer iteration normalizes the fluxes to unit fission production, rebuilds the flat
//! sources, sweeps every track in both directions and updates the scalar flux and k_eff. The
//! sweep is parallel over the tracks of one azimuthal half-space at a time, so a reflective
//! outgoing endpoint can never collide with a concurrent update of the same endpoint. Scalar
//! flux contributions are collected per segment in a thread-local buffer and flushed under a
//! per-FSR lock.

use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::aligned::AlignedVec;
use crate::exponential::ExpEvaluator;
use crate::geometry::{FlatSourceRegions, FsrId};
use crate::material::Material;
use crate::track::{BoundaryCondition, PolarQuadrature, Segment, Track, TrackDirection, TrackSet};
use crate::workspace::{LocalSweepWorkspace, SweepWorkspace};
use crate::{Parameters, Real, TransportError, TransportSolution, FOUR_PI, ONE_OVER_FOUR_PI};

/// Sources below this magnitude are excluded from the residual
const RESIDUAL_CUTOFF: f64 = 1.0e-10;

/// Boundary angular flux and leakage tally of one track
#[derive(Clone, Debug)]
pub(crate) struct BoundaryFluxData<R: Real> {
    forward: AlignedVec<R>,
    backward: AlignedVec<R>,
    leakage: R,
}

impl<R: Real> BoundaryFluxData<R> {
    fn new(angular_len: usize) -> Self {
        Self {
            forward: AlignedVec::zeros(angular_len),
            backward: AlignedVec::zeros(angular_len),
            leakage: R::zero(),
        }
    }

    /// Returns the angular flux entering the track in the given direction
    pub(crate) fn flux(&self, direction: TrackDirection) -> &AlignedVec<R> {
        match direction {
            TrackDirection::Forward => &self.forward,
            TrackDirection::Backward => &self.backward,
        }
    }

    fn flux_mut(&mut self, direction: TrackDirection) -> &mut AlignedVec<R> {
        match direction {
            TrackDirection::Forward => &mut self.forward,
            TrackDirection::Backward => &mut self.backward,
        }
    }
}

/// Everything the sweep of a single track needs to see
struct SweepContext<'a, R: Real> {
    flux: &'a [Mutex<AlignedVec<R>>],
    boundary: &'a [Mutex<BoundaryFluxData<R>>],
    ratios: &'a [AlignedVec<R>],
    materials: &'a [Material<R>],
    exp: &'a ExpEvaluator<R>,
    polar_weights: &'a [R],
    workspace: &'a SweepWorkspace<R>,
    num_groups: usize,
    padded_groups: usize,
    angular_len: usize,
}

/// Runs the power iteration until the source residual converges or the iteration cap is hit
pub(crate) fn power_iteration<R: Real>(
    regions: &FlatSourceRegions,
    materials: &[Material<R>],
    tracks: &TrackSet<R>,
    quadrature: &PolarQuadrature<R>,
    parameters: &Parameters<R>,
    output: &mut TransportSolution<R>,
) -> Result<(), TransportError> {
    let num_fsrs = regions.num_fsrs();
    let num_groups = check_inputs(regions, materials, tracks, parameters)?;
    let padded_groups = parameters.vector_length.pad(num_groups);
    let num_polar = quadrature.num_polar();
    let angular_len = num_polar * padded_groups;
    let par = parameters.enable_multi_threading;

    let volumes = tally_volumes(regions, tracks);
    let orphaned = volumes.iter().filter(|&&v| v == R::zero()).count();
    if orphaned > 0 {
        warn!(
            "{} of {} flat source regions are crossed by no track, their flux follows the source alone",
            orphaned, num_fsrs
        );
    }

    let exp = ExpEvaluator::new(
        parameters.exponential_mode,
        quadrature,
        max_optical_length(materials, tracks),
    );
    let polar_weights = quadrature.weights().to_vec();
    let halves = tracks.azimuthal_halves();

    // Reuse the output allocations when the problem dimensions are unchanged
    let reusable = output.scalar_flux.len() == num_fsrs
        && output.padded_groups == padded_groups
        && output.boundary_flux.len() == tracks.tracks.len()
        && output
            .boundary_flux
            .first()
            .map_or(true, |b| b.forward.len() == angular_len);
    if !reusable {
        output.scalar_flux = (0..num_fsrs).map(|_| AlignedVec::zeros(padded_groups)).collect();
        output.boundary_flux = (0..tracks.tracks.len())
            .map(|_| BoundaryFluxData::new(angular_len))
            .collect();
        output.workspace.clear();
    }
    output.num_groups = num_groups;
    output.padded_groups = padded_groups;

    // Move the flux arrays behind their locks for the duration of the iteration
    let flux: Vec<Mutex<AlignedVec<R>>> = std::mem::take(&mut output.scalar_flux)
        .into_iter()
        .map(Mutex::new)
        .collect();
    let boundary: Vec<Mutex<BoundaryFluxData<R>>> = std::mem::take(&mut output.boundary_flux)
        .into_iter()
        .map(Mutex::new)
        .collect();

    let mut sources: Vec<AlignedVec<R>> =
        (0..num_fsrs).map(|_| AlignedVec::zeros(padded_groups)).collect();
    let mut old_sources: Vec<AlignedVec<R>> =
        (0..num_fsrs).map(|_| AlignedVec::zeros(padded_groups)).collect();
    let mut ratios: Vec<AlignedVec<R>> =
        (0..num_fsrs).map(|_| AlignedVec::zeros(padded_groups)).collect();

    // Flat initial state: unit scalar and angular flux, unit old source, unit k_eff
    for slot in &flux {
        fill_real_lanes(&mut slot.lock(), num_groups, padded_groups);
    }
    for slot in &boundary {
        let mut entry = slot.lock();
        fill_real_lanes(&mut entry.forward, num_groups, padded_groups);
        fill_real_lanes(&mut entry.backward, num_groups, padded_groups);
        entry.leakage = R::zero();
    }
    for old in &mut old_sources {
        old.fill(R::one());
    }
    let mut k_eff = R::one();
    let mut residual = R::zero();
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 1..=parameters.max_iterations {
        profile!("transport iteration");
        iterations = iteration;

        // 1. Normalize to unit total fission production
        let total_fission = weighted_flux_sum(
            &flux,
            &volumes,
            regions,
            materials,
            num_groups,
            par,
            |material| material.nu_sigma_f(),
        );
        if !(total_fission > R::zero()) || !total_fission.is_finite() {
            return Err(TransportError::ZeroFissionSource { iteration });
        }
        let norm = R::one() / total_fission;
        let normalize = |slot: &Mutex<AlignedVec<R>>| slot.lock().scale(norm);
        let normalize_boundary = |slot: &Mutex<BoundaryFluxData<R>>| {
            let mut entry = slot.lock();
            entry.forward.scale(norm);
            entry.backward.scale(norm);
        };
        if par {
            flux.par_iter().for_each(&normalize);
            boundary.par_iter().for_each(&normalize_boundary);
        } else {
            flux.iter().for_each(&normalize);
            boundary.iter().for_each(&normalize_boundary);
        }

        // 2. Rebuild the flat sources and the source-to-total ratios
        build_sources(
            &mut sources,
            &mut ratios,
            &flux,
            regions,
            materials,
            num_groups,
            k_eff,
            par,
        );
        residual = source_residual(&sources, &old_sources, num_groups, par);
        if par {
            old_sources
                .par_iter_mut()
                .zip(sources.par_iter())
                .for_each(|(old, source)| old.copy_from(source));
        } else {
            old_sources
                .iter_mut()
                .zip(sources.iter())
                .for_each(|(old, source)| old.copy_from(source));
        }

        // 3. Transport sweep over both azimuthal half-spaces
        let reset_flux = |slot: &Mutex<AlignedVec<R>>| slot.lock().fill(R::zero());
        let reset_leakage = |slot: &Mutex<BoundaryFluxData<R>>| slot.lock().leakage = R::zero();
        if par {
            flux.par_iter().for_each(&reset_flux);
            boundary.par_iter().for_each(&reset_leakage);
        } else {
            flux.iter().for_each(&reset_flux);
            boundary.iter().for_each(&reset_leakage);
        }
        let context = SweepContext {
            flux: &flux,
            boundary: &boundary,
            ratios: &ratios,
            materials,
            exp: &exp,
            polar_weights: &polar_weights,
            workspace: &output.workspace,
            num_groups,
            padded_groups,
            angular_len,
        };
        for half in &halves {
            profile!("sweep half-space");
            let sweep = |&index: &usize| sweep_track(&context, &tracks.tracks[index]);
            if par {
                half.par_iter().for_each(&sweep);
            } else {
                half.iter().for_each(&sweep);
            }
        }

        // 4. Turn the swept increments into the new scalar flux
        update_scalar_flux(
            &flux,
            &ratios,
            &volumes,
            regions,
            materials,
            num_groups,
            par,
        );

        // 5. Update k_eff from the fission, absorption and leakage balance
        let fission = weighted_flux_sum(&flux, &volumes, regions, materials, num_groups, par, |m| {
            m.nu_sigma_f()
        });
        let absorption =
            weighted_flux_sum(&flux, &volumes, regions, materials, num_groups, par, |m| {
                m.sigma_a()
            });
        let half = R::from_f64(0.5).unwrap();
        let leakage = boundary
            .iter()
            .fold(R::zero(), |sum, slot| sum + slot.lock().leakage)
            * half;
        k_eff = fission / (absorption + leakage);
        output.leakage = leakage;

        info!(
            "Iteration {:>4}: k_eff = {:.6?}, residual = {:?}",
            iteration, k_eff, residual
        );

        // 6. Convergence test on the source residual
        if residual < parameters.source_tolerance {
            converged = true;
            break;
        }
    }

    if !converged {
        debug!(
            "Source residual {:?} did not reach the tolerance within {} iterations",
            residual, parameters.max_iterations
        );
    }

    output.scalar_flux = flux.into_iter().map(Mutex::into_inner).collect();
    output.boundary_flux = boundary.into_iter().map(Mutex::into_inner).collect();
    output.k_eff = k_eff;
    output.residual = residual;
    output.converged = converged;
    output.iterations = iterations;
    Ok(())
}

/// Validates the solver inputs against each other and returns the common group count
fn check_inputs<R: Real>(
    regions: &FlatSourceRegions,
    materials: &[Material<R>],
    tracks: &TrackSet<R>,
    parameters: &Parameters<R>,
) -> Result<usize, TransportError> {
    if regions.num_fsrs() == 0 {
        return Err(TransportError::InconsistentInput(
            "there are no flat source regions".into(),
        ));
    }
    if tracks.tracks.is_empty() {
        return Err(TransportError::InconsistentInput("the track set is empty".into()));
    }
    let num_groups = match materials.first() {
        Some(material) => material.num_groups(),
        None => {
            return Err(TransportError::InconsistentInput(
                "there are no materials".into(),
            ))
        }
    };
    let padded_groups = parameters.vector_length.pad(num_groups);
    for material in materials {
        if material.num_groups() != num_groups {
            return Err(TransportError::InconsistentInput(format!(
                "material `{}` has {} groups, expected {}",
                material.name(),
                material.num_groups(),
                num_groups
            )));
        }
        if material.padded_groups() != padded_groups {
            return Err(TransportError::InconsistentInput(format!(
                "material `{}` was padded for a different vector length",
                material.name()
            )));
        }
    }
    for (fsr, material) in regions.materials().iter().enumerate() {
        if material.index() >= materials.len() {
            return Err(TransportError::InconsistentInput(format!(
                "flat source region {} references material {} out of range",
                fsr, material.0
            )));
        }
    }
    Ok(num_groups)
}

/// Accumulates the track-length volume estimate of every flat source region
fn tally_volumes<R: Real>(regions: &FlatSourceRegions, tracks: &TrackSet<R>) -> Vec<R> {
    let mut volumes = vec![R::zero(); regions.num_fsrs()];
    for track in &tracks.tracks {
        for segment in &track.segments {
            volumes[segment.fsr.index()] += segment.length * track.weight;
        }
    }
    volumes
}

/// The largest optical length any segment of the problem can produce
fn max_optical_length<R: Real>(materials: &[Material<R>], tracks: &TrackSet<R>) -> R {
    let max_sigma_t: Vec<R> = materials
        .iter()
        .map(|material| {
            material.sigma_t()[..material.num_groups()]
                .iter()
                .fold(R::zero(), |max, &sigma| max.max(sigma))
        })
        .collect();
    let mut max_tau = R::zero();
    for track in &tracks.tracks {
        for segment in &track.segments {
            max_tau = max_tau.max(segment.length * max_sigma_t[segment.material.index()]);
        }
    }
    max_tau
}

/// Sets the real group lanes of every polar block to one, leaving the padding at zero
fn fill_real_lanes<R: Real>(vec: &mut AlignedVec<R>, num_groups: usize, padded_groups: usize) {
    vec.fill(R::zero());
    let data = vec.as_mut_slice();
    for block in data.chunks_mut(padded_groups) {
        block[..num_groups].fill(R::one());
    }
}

/// Sums `xs[g] * flux[r][g] * volume[r]` over all regions and groups
fn weighted_flux_sum<R: Real>(
    flux: &[Mutex<AlignedVec<R>>],
    volumes: &[R],
    regions: &FlatSourceRegions,
    materials: &[Material<R>],
    num_groups: usize,
    par: bool,
    select: impl Fn(&Material<R>) -> &[R] + Sync,
) -> R {
    let body = |r: usize| -> R {
        let flux = flux[r].lock();
        let flux = flux.as_slice();
        let xs = select(&materials[regions.material(FsrId(r as u32)).index()]);
        let mut sum = R::zero();
        for g in 0..num_groups {
            sum += xs[g] * flux[g];
        }
        sum * volumes[r]
    };
    if par {
        (0..flux.len())
            .into_par_iter()
            .map(&body)
            .reduce(R::zero, |a, b| a + b)
    } else {
        (0..flux.len()).map(&body).fold(R::zero(), |a, b| a + b)
    }
}

/// Rebuilds the flat source and the source-to-total ratio of every region
#[allow(clippy::too_many_arguments)]
fn build_sources<R: Real>(
    sources: &mut [AlignedVec<R>],
    ratios: &mut [AlignedVec<R>],
    flux: &[Mutex<AlignedVec<R>>],
    regions: &FlatSourceRegions,
    materials: &[Material<R>],
    num_groups: usize,
    k_eff: R,
    par: bool,
) {
    let inv_k = R::one() / k_eff;
    if par {
        sources
            .par_iter_mut()
            .zip(ratios.par_iter_mut())
            .enumerate()
            .for_each(|(r, (source, ratio))| {
                build_region_source(r, source, ratio, flux, regions, materials, num_groups, inv_k)
            });
    } else {
        sources
            .iter_mut()
            .zip(ratios.iter_mut())
            .enumerate()
            .for_each(|(r, (source, ratio))| {
                build_region_source(r, source, ratio, flux, regions, materials, num_groups, inv_k)
            });
    }
}

/// Rebuilds the source and ratio vectors of a single region
#[allow(clippy::too_many_arguments)]
fn build_region_source<R: Real>(
    r: usize,
    source: &mut AlignedVec<R>,
    ratio: &mut AlignedVec<R>,
    flux: &[Mutex<AlignedVec<R>>],
    regions: &FlatSourceRegions,
    materials: &[Material<R>],
    num_groups: usize,
    inv_k: R,
) {
    let one_over_four_pi = R::from_f64(ONE_OVER_FOUR_PI).unwrap();
    let flux = flux[r].lock();
    let flux = flux.as_slice();
    let material = &materials[regions.material(FsrId(r as u32)).index()];

    let mut fission = R::zero();
    let nu_sigma_f = material.nu_sigma_f();
    for g in 0..num_groups {
        fission += nu_sigma_f[g] * flux[g];
    }

    let sigma_t = material.sigma_t();
    let chi = material.chi();
    let source = source.as_mut_slice();
    let ratio = ratio.as_mut_slice();
    for g_to in 0..num_groups {
        let mut scatter = R::zero();
        let row = material.scatter_row(g_to);
        for g_from in 0..num_groups {
            scatter += row[g_from] * flux[g_from];
        }
        let q = (fission * chi[g_to] * inv_k + scatter) * one_over_four_pi;
        source[g_to] = q;
        ratio[g_to] = if sigma_t[g_to] > R::zero() {
            q / sigma_t[g_to]
        } else {
            R::zero()
        };
    }
}

/// RMS of the relative source change over all regions and groups with a significant source
fn source_residual<R: Real>(
    sources: &[AlignedVec<R>],
    old_sources: &[AlignedVec<R>],
    num_groups: usize,
    par: bool,
) -> R {
    let cutoff = R::from_f64(RESIDUAL_CUTOFF).unwrap();
    let body = |r: usize| -> R {
        let source = sources[r].as_slice();
        let old = old_sources[r].as_slice();
        let mut sum = R::zero();
        for g in 0..num_groups {
            if source[g].abs() > cutoff {
                let rel = (source[g] - old[g]) / source[g];
                sum += rel * rel;
            }
        }
        sum
    };
    let sum = if par {
        (0..sources.len())
            .into_par_iter()
            .map(&body)
            .reduce(R::zero, |a, b| a + b)
    } else {
        (0..sources.len()).map(&body).fold(R::zero(), |a, b| a + b)
    };
    (sum / R::from_usize(sources.len()).unwrap()).sqrt()
}

/// Converts the swept increments into the new scalar flux
fn update_scalar_flux<R: Real>(
    flux: &[Mutex<AlignedVec<R>>],
    ratios: &[AlignedVec<R>],
    volumes: &[R],
    regions: &FlatSourceRegions,
    materials: &[Material<R>],
    num_groups: usize,
    par: bool,
) {
    let four_pi = R::from_f64(FOUR_PI).unwrap();
    let half = R::from_f64(0.5).unwrap();
    let body = |r: usize| {
        let mut flux = flux[r].lock();
        let flux = flux.as_mut_slice();
        let ratio = ratios[r].as_slice();
        let sigma_t = materials[regions.material(FsrId(r as u32)).index()].sigma_t();
        let volume = volumes[r];
        for g in 0..num_groups {
            flux[g] = if volume > R::zero() && sigma_t[g] > R::zero() {
                four_pi * ratio[g] + (flux[g] * half) / (sigma_t[g] * volume)
            } else {
                four_pi * ratio[g]
            };
        }
    };
    if par {
        (0..flux.len()).into_par_iter().for_each(&body);
    } else {
        (0..flux.len()).for_each(&body);
    }
}

/// Sweeps one track in both directions
fn sweep_track<R: Real>(context: &SweepContext<'_, R>, track: &Track<R>) {
    let workspace_cell = context
        .workspace
        .get_local_with_size(context.angular_len, context.padded_groups);
    let mut workspace = workspace_cell.borrow_mut();
    sweep_direction(context, track, TrackDirection::Forward, &mut workspace);
    sweep_direction(context, track, TrackDirection::Backward, &mut workspace);
}

/// Sweeps one direction of a track and transfers the outgoing flux to the partner endpoint
fn sweep_direction<R: Real>(
    context: &SweepContext<'_, R>,
    track: &Track<R>,
    direction: TrackDirection,
    workspace: &mut LocalSweepWorkspace<R>,
) {
    {
        let entry = context.boundary[track.uid.index()].lock();
        workspace.track_flux.copy_from(entry.flux(direction));
    }

    match direction {
        TrackDirection::Forward => {
            for segment in track.segments.iter() {
                sweep_segment(context, track, segment, workspace);
            }
        }
        TrackDirection::Backward => {
            for segment in track.segments.iter().rev() {
                sweep_segment(context, track, segment, workspace);
            }
        }
    }

    let (partner, into_forward, bc) = match direction {
        TrackDirection::Forward => (track.track_out, track.refl_out, track.bc_out),
        TrackDirection::Backward => (track.track_in, track.refl_in, track.bc_in),
    };

    // Vacuum endpoints route the outgoing flux to the leakage tally instead of the partner
    if bc == BoundaryCondition::Vacuum {
        let track_flux = workspace.track_flux.as_slice();
        let mut leak = R::zero();
        for (polar, &polar_weight) in context.polar_weights.iter().enumerate() {
            let base = polar * context.padded_groups;
            let mut sum = R::zero();
            for g in 0..context.num_groups {
                sum += track_flux[base + g];
            }
            leak += sum * polar_weight;
        }
        context.boundary[track.uid.index()].lock().leakage += leak * track.weight;
    }

    let factor: R = bc.factor();
    let destination = if into_forward {
        TrackDirection::Forward
    } else {
        TrackDirection::Backward
    };
    let mut entry = context.boundary[partner.index()].lock();
    let outgoing = workspace.track_flux.as_slice();
    let incoming = entry.flux_mut(destination).as_mut_slice();
    for (dest, &psi) in incoming.iter_mut().zip(outgoing.iter()) {
        *dest = psi * factor;
    }
}

/// Attenuates the angular flux across one segment and tallies the scalar flux increments
#[inline(always)]
fn sweep_segment<R: Real>(
    context: &SweepContext<'_, R>,
    track: &Track<R>,
    segment: &Segment<R>,
    workspace: &mut LocalSweepWorkspace<R>,
) {
    let LocalSweepWorkspace {
        track_flux,
        fsr_flux,
    } = workspace;
    let track_flux = track_flux.as_mut_slice();
    fsr_flux.fill(R::zero());
    let fsr_flux = fsr_flux.as_mut_slice();

    let sigma_t = context.materials[segment.material.index()].sigma_t();
    let ratio = context.ratios[segment.fsr.index()].as_slice();

    for (polar, &polar_weight) in context.polar_weights.iter().enumerate() {
        let weight = track.weight * polar_weight;
        let base = polar * context.padded_groups;
        for g in 0..context.padded_groups {
            let tau = sigma_t[g] * segment.length;
            let attenuation = context.exp.eval(tau, polar);
            let delta = (track_flux[base + g] - ratio[g]) * attenuation;
            fsr_flux[g] += delta * weight;
            track_flux[base + g] -= delta;
        }
    }

    let mut flux = context.flux[segment.fsr.index()].lock();
    for (total, &increment) in flux.as_mut_slice().iter_mut().zip(fsr_flux.iter()) {
        *total += increment;
    }
}
