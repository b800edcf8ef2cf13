//! Tracks, segments and the polar quadrature delivered by the track generator
//!
//! The track generator is an external collaborator: it cuts parallel chords through the frozen
//! geometry and delivers them as [Track] records whose segments reference flat source regions
//! and materials by handle. Azimuthal indices cover `[0, pi)`; indices below `num_azim / 2`
//! form the first azimuthal half-space. Reflective partners of a track always lie in the other
//! half, which is what makes the half-at-a-time sweep race-free.

use numeric_literals::replace_float_literals;
use thiserror::Error as ThisError;

use crate::geometry::{FlatSourceRegions, FsrId};
use crate::material::{Material, MaterialId};
use crate::Real;

/// Dense handle of a track inside its [TrackSet]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TrackId(pub u32);

impl TrackId {
    /// Returns the handle as an array index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The two travel directions along a track
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrackDirection {
    /// From the "in" endpoint towards the "out" endpoint
    Forward,
    /// From the "out" endpoint towards the "in" endpoint
    Backward,
}

impl TrackDirection {
    /// Returns the opposite direction
    pub fn opposite(self) -> Self {
        match self {
            TrackDirection::Forward => TrackDirection::Backward,
            TrackDirection::Backward => TrackDirection::Forward,
        }
    }
}

/// Boundary condition at a track endpoint
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoundaryCondition {
    /// Outgoing flux leaves the problem and is tallied as leakage
    Vacuum,
    /// Outgoing flux re-enters through the partner endpoint
    Reflective,
}

impl BoundaryCondition {
    /// The transfer factor applied to the outgoing flux: 0 for vacuum, 1 for reflective
    pub fn factor<R: Real>(self) -> R {
        match self {
            BoundaryCondition::Vacuum => R::zero(),
            BoundaryCondition::Reflective => R::one(),
        }
    }
}

/// One piece of a track crossing a single flat source region
#[derive(Clone, Copy, Debug)]
pub struct Segment<R: Real> {
    /// Chord length of the crossing
    pub length: R,
    /// Flat source region the segment crosses
    pub fsr: FsrId,
    /// Material filling that region
    pub material: MaterialId,
}

/// A parallel chord through the geometry, segmented at every region boundary
#[derive(Clone, Debug)]
pub struct Track<R: Real> {
    /// Dense id, equal to the track's position in the [TrackSet]
    pub uid: TrackId,
    /// Azimuthal angle index in `[0, num_azim)`
    pub azim_index: usize,
    /// Azimuthal quadrature weight with the track spacing folded in
    pub weight: R,
    /// Ordered segments from the "in" endpoint to the "out" endpoint
    pub segments: Vec<Segment<R>>,
    /// Track receiving the flux that leaves through the "out" endpoint
    pub track_out: TrackId,
    /// Whether that flux continues in the partner's forward direction
    pub refl_out: bool,
    /// Boundary condition at the "out" endpoint
    pub bc_out: BoundaryCondition,
    /// Track receiving the flux that leaves through the "in" endpoint
    pub track_in: TrackId,
    /// Whether that flux continues in the partner's forward direction
    pub refl_in: bool,
    /// Boundary condition at the "in" endpoint
    pub bc_in: BoundaryCondition,
}

/// Error type returned when a track set or polar quadrature is rejected
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum TrackSetError {
    /// Track uids must equal the position in the track array
    #[error("track at position {index} has uid {uid}, expected dense uids")]
    NonDenseUid { index: usize, uid: u32 },
    /// The number of azimuthal angles must be even to split into two half-spaces
    #[error("number of azimuthal angles must be even, got {num_azim}")]
    OddAzimuthalCount { num_azim: usize },
    /// A track's azimuthal index exceeds the declared angle count
    #[error("track {uid}: azimuthal index {azim} is out of range (num_azim = {num_azim})")]
    AzimuthalIndexOutOfRange {
        uid: u32,
        azim: usize,
        num_azim: usize,
    },
    /// A boundary partner handle does not exist
    #[error("track {uid}: partner track {partner} is out of range")]
    PartnerOutOfRange { uid: u32, partner: u32 },
    /// A segment references a flat source region that does not exist
    #[error("track {uid}: segment {segment} references flat source region {fsr} out of range")]
    SegmentFsrOutOfRange { uid: u32, segment: usize, fsr: u32 },
    /// A segment references a material that does not exist
    #[error("track {uid}: segment {segment} references material {material} out of range")]
    SegmentMaterialOutOfRange {
        uid: u32,
        segment: usize,
        material: u32,
    },
    /// Segment lengths must be positive
    #[error("track {uid}: segment {segment} has a non-positive length")]
    NonPositiveSegmentLength { uid: u32, segment: usize },
    /// The polar quadrature has no angles
    #[error("the polar quadrature is empty")]
    EmptyQuadrature,
    /// Polar sines must lie in (0, 1] and weights must be positive
    #[error("polar angle {index} has an invalid sine or weight")]
    InvalidPolarAngle { index: usize },
}

/// The tracks delivered by the track generator for one geometry
#[derive(Clone, Debug)]
pub struct TrackSet<R: Real> {
    /// Number of azimuthal angles covering `[0, pi)`
    pub num_azim: usize,
    /// All tracks, indexed by their uid
    pub tracks: Vec<Track<R>>,
}

impl<R: Real> TrackSet<R> {
    /// Bundles tracks with their azimuthal angle count
    pub fn new(num_azim: usize, tracks: Vec<Track<R>>) -> Self {
        Self { num_azim, tracks }
    }

    /// Returns the track indices of the two azimuthal half-spaces
    pub(crate) fn azimuthal_halves(&self) -> [Vec<usize>; 2] {
        let split = self.num_azim / 2;
        let mut halves = [Vec::new(), Vec::new()];
        for (index, track) in self.tracks.iter().enumerate() {
            halves[usize::from(track.azim_index >= split)].push(index);
        }
        halves
    }

    /// Checks uid density, endpoint wiring and all segment references
    pub(crate) fn validate(
        &self,
        regions: &FlatSourceRegions,
        materials: &[Material<R>],
    ) -> Result<(), TrackSetError> {
        if self.num_azim % 2 != 0 {
            return Err(TrackSetError::OddAzimuthalCount {
                num_azim: self.num_azim,
            });
        }
        for (index, track) in self.tracks.iter().enumerate() {
            let uid = track.uid.0;
            if track.uid.index() != index {
                return Err(TrackSetError::NonDenseUid { index, uid });
            }
            if track.azim_index >= self.num_azim {
                return Err(TrackSetError::AzimuthalIndexOutOfRange {
                    uid,
                    azim: track.azim_index,
                    num_azim: self.num_azim,
                });
            }
            for partner in [track.track_out, track.track_in] {
                if partner.index() >= self.tracks.len() {
                    return Err(TrackSetError::PartnerOutOfRange {
                        uid,
                        partner: partner.0,
                    });
                }
            }
            for (segment_index, segment) in track.segments.iter().enumerate() {
                if segment.length <= R::zero() {
                    return Err(TrackSetError::NonPositiveSegmentLength {
                        uid,
                        segment: segment_index,
                    });
                }
                if segment.fsr.index() >= regions.num_fsrs() {
                    return Err(TrackSetError::SegmentFsrOutOfRange {
                        uid,
                        segment: segment_index,
                        fsr: segment.fsr.0,
                    });
                }
                if segment.material.index() >= materials.len() {
                    return Err(TrackSetError::SegmentMaterialOutOfRange {
                        uid,
                        segment: segment_index,
                        material: segment.material.0,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Polar quadrature over the angles out of the 2-D plane
#[derive(Clone, Debug)]
pub struct PolarQuadrature<R: Real> {
    sin_thetas: Vec<R>,
    weights: Vec<R>,
}

impl<R: Real> PolarQuadrature<R> {
    /// Bundles polar angle sines with their quadrature weights
    pub fn new(sin_thetas: Vec<R>, weights: Vec<R>) -> Self {
        Self {
            sin_thetas,
            weights,
        }
    }

    /// The Tabuchi-Yamamoto quadrature with 1, 2 or 3 polar angles
    #[replace_float_literals(R::from_f64(literal).unwrap())]
    pub fn tabuchi_yamamoto(num_polar: usize) -> Option<Self> {
        let (sin_thetas, weights) = match num_polar {
            1 => (vec![0.798184], vec![1.0]),
            2 => (vec![0.363900, 0.899900], vec![0.212854, 0.787146]),
            3 => (
                vec![0.166648, 0.537707, 0.932954],
                vec![0.046233, 0.283619, 0.670148],
            ),
            _ => return None,
        };
        Some(Self::new(sin_thetas, weights))
    }

    /// Returns the number of polar angles
    pub fn num_polar(&self) -> usize {
        self.sin_thetas.len()
    }

    /// Returns the sines of the polar angles
    pub fn sin_thetas(&self) -> &[R] {
        &self.sin_thetas
    }

    /// Returns the quadrature weights
    pub fn weights(&self) -> &[R] {
        &self.weights
    }

    /// Checks that the quadrature is non-empty with sines in (0, 1] and positive weights
    pub(crate) fn validate(&self) -> Result<(), TrackSetError> {
        if self.sin_thetas.is_empty() || self.sin_thetas.len() != self.weights.len() {
            return Err(TrackSetError::EmptyQuadrature);
        }
        for (index, (&sin, &weight)) in self.sin_thetas.iter().zip(self.weights.iter()).enumerate()
        {
            if sin <= R::zero() || sin > R::one() || weight <= R::zero() {
                return Err(TrackSetError::InvalidPolarAngle { index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligned::VectorLength;

    fn one_group_material() -> Material<f64> {
        Material::new(
            "m",
            &[1.0],
            &[1.0],
            &[0.0],
            &[1.0],
            &[0.0],
            VectorLength::Two,
        )
        .unwrap()
    }

    fn simple_track(uid: u32, azim_index: usize) -> Track<f64> {
        Track {
            uid: TrackId(uid),
            azim_index,
            weight: 1.0,
            segments: vec![Segment {
                length: 1.0,
                fsr: FsrId(0),
                material: MaterialId(0),
            }],
            track_out: TrackId(uid),
            refl_out: false,
            bc_out: BoundaryCondition::Reflective,
            track_in: TrackId(uid),
            refl_in: true,
            bc_in: BoundaryCondition::Reflective,
        }
    }

    #[test]
    fn halves_split_at_half_the_azimuthal_count() {
        let set = TrackSet::new(
            4,
            vec![
                simple_track(0, 0),
                simple_track(1, 1),
                simple_track(2, 2),
                simple_track(3, 3),
            ],
        );
        let [first, second] = set.azimuthal_halves();
        assert_eq!(first, vec![0, 1]);
        assert_eq!(second, vec![2, 3]);
    }

    #[test]
    fn validation_catches_bad_references() {
        let regions = FlatSourceRegions::new(vec![MaterialId(0)]);
        let materials = vec![one_group_material()];

        let set = TrackSet::new(2, vec![simple_track(0, 0)]);
        assert!(set.validate(&regions, &materials).is_ok());

        let mut bad = simple_track(0, 0);
        bad.segments[0].fsr = FsrId(3);
        let set = TrackSet::new(2, vec![bad]);
        assert!(matches!(
            set.validate(&regions, &materials),
            Err(TrackSetError::SegmentFsrOutOfRange { fsr: 3, .. })
        ));

        let mut bad = simple_track(0, 0);
        bad.track_out = TrackId(5);
        let set = TrackSet::new(2, vec![bad]);
        assert!(matches!(
            set.validate(&regions, &materials),
            Err(TrackSetError::PartnerOutOfRange { partner: 5, .. })
        ));

        let set = TrackSet::new(3, vec![simple_track(0, 0)]);
        assert!(matches!(
            set.validate(&regions, &materials),
            Err(TrackSetError::OddAzimuthalCount { num_azim: 3 })
        ));
    }

    #[test]
    fn tabuchi_yamamoto_weights_are_normalized() {
        for num_polar in 1..=3 {
            let quadrature = PolarQuadrature::<f64>::tabuchi_yamamoto(num_polar).unwrap();
            assert!(quadrature.validate().is_ok());
            let total: f64 = quadrature.weights().iter().sum();
            assert!((total - 1.0).abs() < 1.0e-5);
        }
        assert!(PolarQuadrature::<f64>::tabuchi_yamamoto(4).is_none());
    }
}
