//!
//! Library for 2-D deterministic neutron transport using the method of characteristics (MOC).
//! Entry point is the [solve_transport] function.
//!

/// Re-export the version of coarse_prof used by this crate, if profiling is enabled
#[cfg(feature = "profiling")]
pub use coarse_prof;
/// Re-export the version of nalgebra used by this crate
pub use nalgebra;

#[cfg(feature = "profiling")]
/// Invokes coarse_prof::profile! with the given expression
macro_rules! profile {
    ($body:expr) => {
        coarse_prof::profile!($body);
    };
}

#[cfg(not(feature = "profiling"))]
/// No-op macro if profiling is disabled
macro_rules! profile {
    ($body:expr) => {
        $body
    };
}

mod aabb;
/// Aligned and padded storage for the per-group arrays consumed by the transport sweep
pub mod aligned;
/// Cells bounded by signed halfspaces of analytic surfaces
pub mod cell;
/// Evaluation of the characteristic attenuation factor, direct or table-interpolated
pub mod exponential;
/// Arena of surfaces, cells and universes plus the flat source region registry
pub mod geometry;
/// Multi-group material cross-section data
pub mod material;
mod numeric_types;
mod solver;
mod subdivide;
/// Analytic boundary primitives (planes and circles)
pub mod surface;
/// Tracks, segments and the polar quadrature delivered by the track generator
pub mod track;
/// Universes and lattices composing the geometry hierarchy
pub mod universe;
/// Internal helper functions and types
mod utils;
/// Workspace for reusing thread-local sweep memory between iterations and solves
pub(crate) mod workspace;

use log::info;
use thiserror::Error as ThisError;

use crate::aligned::AlignedVec;
use crate::solver::BoundaryFluxData;
use crate::workspace::SweepWorkspace;

pub use aabb::AxisAlignedBoundingBox2d;
pub use aligned::VectorLength;
pub use exponential::{ExpEvaluator, ExponentialMode};
pub use geometry::{FlatSourceRegions, FsrId, Geometry, GeometryError, LocalCoords};
pub use material::{Material, MaterialDataError, MaterialId};
pub use numeric_types::{Real, ThreadSafe};
pub use surface::{BoundaryType, Surface, SurfaceId, SurfaceKind};
pub use track::{
    PolarQuadrature, Segment, Track, TrackDirection, TrackId, TrackSet, TrackSetError,
};

// TODO: Add a fixed-source solve next to the eigenvalue iteration
// TODO: Make the FSR registry freezable so that late point lookups fail loudly

pub(crate) type HashState = fxhash::FxBuildHasher;
pub(crate) type MapType<K, V> = std::collections::HashMap<K, V, HashState>;
pub(crate) fn new_map<K, V>() -> MapType<K, V> {
    MapType::with_hasher(HashState::default())
}

pub(crate) type ParallelMapType<K, V> = dashmap::DashMap<K, V, HashState>;

/// The solid angle of the full sphere
pub const FOUR_PI: f64 = 4.0 * std::f64::consts::PI;
/// Reciprocal of the full sphere solid angle
pub const ONE_OVER_FOUR_PI: f64 = 1.0 / FOUR_PI;
/// Tolerance below which a signed surface evaluation counts as "on the surface"
pub const ON_SURFACE_THRESH: f64 = 1.0e-12;

/// Parameters for the transport solve
#[derive(Clone, Debug)]
pub struct Parameters<R: Real> {
    /// Number of lanes the per-group arrays are padded to, also the alignment unit of all flux arrays
    pub vector_length: VectorLength,
    /// Whether the attenuation factor is evaluated directly or interpolated from a table
    pub exponential_mode: ExponentialMode,
    /// Cap on the number of outer power iterations
    pub max_iterations: usize,
    /// Convergence threshold on the relative source residual
    pub source_tolerance: R,
    /// Whether to allow multi threading within the transport sweep and the source updates
    pub enable_multi_threading: bool,
}

impl<R: Real> Default for Parameters<R> {
    fn default() -> Self {
        Self {
            vector_length: VectorLength::default(),
            exponential_mode: ExponentialMode::Interpolated,
            max_iterations: 1000,
            source_tolerance: R::from_f64(1.0e-5).unwrap(),
            enable_multi_threading: true,
        }
    }
}

impl<R: Real> Parameters<R> {
    /// Tries to convert the parameters from one [Real] type to another [Real] type, returns None if conversion fails
    pub fn try_convert<T: Real>(&self) -> Option<Parameters<T>> {
        Some(Parameters {
            vector_length: self.vector_length,
            exponential_mode: self.exponential_mode,
            max_iterations: self.max_iterations,
            source_tolerance: self.source_tolerance.try_convert()?,
            enable_multi_threading: self.enable_multi_threading,
        })
    }
}

/// Result data returned when the transport solve ran to completion
///
/// Holds the converged (or last) iterate together with the workspace memory, so that passing the
/// same value into [solve_transport_inplace] again reuses all allocations.
pub struct TransportSolution<R: Real> {
    /// Effective multiplication factor of the last iterate
    pub(crate) k_eff: R,
    /// Number of outer iterations that were performed
    pub(crate) iterations: usize,
    /// Whether the source residual dropped below the tolerance
    pub(crate) converged: bool,
    /// Relative source residual of the last iterate
    pub(crate) residual: R,
    /// Total leakage through vacuum boundaries
    pub(crate) leakage: R,
    /// Number of energy groups of the materials
    pub(crate) num_groups: usize,
    /// Group count after padding to the vector length
    pub(crate) padded_groups: usize,
    /// Per-FSR scalar flux, one padded group vector per region
    pub(crate) scalar_flux: Vec<AlignedVec<R>>,
    /// Per-track boundary angular flux and leakage tally
    pub(crate) boundary_flux: Vec<BoundaryFluxData<R>>,
    /// Thread-local sweep buffers kept alive for subsequent solves
    pub(crate) workspace: SweepWorkspace<R>,
}

impl<R: Real> Default for TransportSolution<R> {
    /// Returns an empty [TransportSolution] to pass into the inplace transport solve
    fn default() -> Self {
        Self {
            k_eff: R::one(),
            iterations: 0,
            converged: false,
            residual: R::zero(),
            leakage: R::zero(),
            num_groups: 0,
            padded_groups: 0,
            scalar_flux: Vec::new(),
            boundary_flux: Vec::new(),
            workspace: SweepWorkspace::default(),
        }
    }
}

impl<R: Real> TransportSolution<R> {
    /// Returns the effective multiplication factor of the last iterate
    pub fn k_eff(&self) -> R {
        self.k_eff
    }

    /// Returns the number of outer iterations that were performed
    pub fn num_iterations(&self) -> usize {
        self.iterations
    }

    /// Returns whether the source residual dropped below the tolerance before the iteration cap
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Returns the relative source residual of the last iterate
    pub fn source_residual(&self) -> R {
        self.residual
    }

    /// Returns the total leakage through vacuum boundaries of the last iterate
    pub fn leakage(&self) -> R {
        self.leakage
    }

    /// Returns the number of flat source regions of the solve
    pub fn num_fsrs(&self) -> usize {
        self.scalar_flux.len()
    }

    /// Returns the number of energy groups (before padding)
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Returns the stride between polar angles in the angular flux slices (the padded group count)
    pub fn group_stride(&self) -> usize {
        self.padded_groups
    }

    /// Returns the scalar flux of the given flat source region, one entry per energy group
    pub fn scalar_flux(&self, fsr: FsrId) -> &[R] {
        &self.scalar_flux[fsr.index()].as_slice()[..self.num_groups]
    }

    /// Returns the boundary angular flux of the given track endpoint, laid out as one
    /// [group_stride](Self::group_stride)-sized block per polar angle
    pub fn angular_flux(&self, track: TrackId, direction: TrackDirection) -> &[R] {
        self.boundary_flux[track.index()].flux(direction).as_slice()
    }
}

/// Error type returned when the transport solve fails
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum TransportError {
    /// Errors raised while building or querying the constructive geometry
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),
    /// Errors raised while validating material cross-section data
    #[error("material data error: {0}")]
    MaterialData(#[from] MaterialDataError),
    /// Errors raised while validating the track set delivered by the track generator
    #[error("track data error: {0}")]
    TrackData(#[from] TrackSetError),
    /// Solver inputs that are individually valid but disagree with each other
    #[error("inconsistent solver input: {0}")]
    InconsistentInput(String),
    /// The flux normalization found a vanishing or non-finite total fission source
    #[error("total fission source is zero or not finite in iteration {iteration}")]
    ZeroFissionSource { iteration: usize },
    /// Any error that is not represented by some other explicit variant
    #[error("unknown error")]
    Unknown(#[from] anyhow::Error),
}

/// Initializes the global thread pool used by this library with the given parameters.
///
/// Initialization of the global thread pool happens exactly once.
/// Therefore, if you call `initialize_thread_pool` a second time, it will return an error.
/// An `Ok` result indicates that this is the first initialization of the thread pool.
pub fn initialize_thread_pool(num_threads: usize) -> Result<(), anyhow::Error> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;
    Ok(())
}

/// Runs the power iteration for the given regions, materials and tracks until the fission
/// source converges or the iteration cap is reached
#[inline(never)]
pub fn solve_transport<R: Real>(
    regions: &FlatSourceRegions,
    materials: &[Material<R>],
    tracks: &TrackSet<R>,
    quadrature: &PolarQuadrature<R>,
    parameters: &Parameters<R>,
) -> Result<TransportSolution<R>, TransportError> {
    profile!("solve_transport");
    let mut solution = TransportSolution::default();
    solve_transport_inplace(regions, materials, tracks, quadrature, parameters, &mut solution)?;
    Ok(solution)
}

/// Runs the power iteration, reusing the allocations of a previously returned solution
pub fn solve_transport_inplace<R: Real>(
    regions: &FlatSourceRegions,
    materials: &[Material<R>],
    tracks: &TrackSet<R>,
    quadrature: &PolarQuadrature<R>,
    parameters: &Parameters<R>,
    output: &mut TransportSolution<R>,
) -> Result<(), TransportError> {
    profile!("solve_transport_inplace");

    tracks.validate(regions, materials)?;
    quadrature.validate()?;
    solver::power_iteration(regions, materials, tracks, quadrature, parameters, output)?;

    info!(
        "Transport solve finished after {} iterations: k_eff = {:.6?}, residual = {:?}",
        output.iterations, output.k_eff, output.residual
    );
    Ok(())
}
