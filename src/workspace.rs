//! Workspace for reusing thread-local sweep memory between iterations and solves

use std::cell::RefCell;
use std::fmt;
use std::fmt::Debug;

use thread_local::ThreadLocal;

use crate::aligned::AlignedVec;
use crate::Real;

/// Collection of all thread local workspaces used to reduce allocations during transport sweeps
#[derive(Default)]
pub(crate) struct SweepWorkspace<R: Real> {
    local_workspaces: ThreadLocal<RefCell<LocalSweepWorkspace<R>>>,
}

impl<R: Real> SweepWorkspace<R> {
    /// Returns a reference to a thread local workspace, initializes it with the given buffer
    /// sizes if not already initialized
    pub(crate) fn get_local_with_size(
        &self,
        angular_len: usize,
        group_len: usize,
    ) -> &RefCell<LocalSweepWorkspace<R>> {
        self.local_workspaces
            .get_or(|| RefCell::new(LocalSweepWorkspace::with_size(angular_len, group_len)))
    }

    /// Drops all thread local buffers, e.g. when the problem dimensions changed
    pub(crate) fn clear(&mut self) {
        self.local_workspaces.clear();
    }
}

impl<R: Real> Clone for SweepWorkspace<R> {
    /// Returns a new default workspace without any allocated memory
    fn clone(&self) -> Self {
        SweepWorkspace::default()
    }
}

impl<R: Real> Debug for SweepWorkspace<R> {
    /// Only print the name of type to the formatter
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepWorkspace").finish()
    }
}

/// Scratch buffers of one sweep thread
pub(crate) struct LocalSweepWorkspace<R: Real> {
    /// Running angular flux of the current track pass, one padded group block per polar angle
    pub track_flux: AlignedVec<R>,
    /// Scalar flux increments of the current segment, flushed under the per-FSR lock
    pub fsr_flux: AlignedVec<R>,
}

impl<R: Real> LocalSweepWorkspace<R> {
    /// Constructs a workspace with buffers of the given sizes
    pub(crate) fn with_size(angular_len: usize, group_len: usize) -> Self {
        Self {
            track_flux: AlignedVec::zeros(angular_len),
            fsr_flux: AlignedVec::zeros(group_len),
        }
    }
}
