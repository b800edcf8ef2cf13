//! Universes and lattices composing the geometry hierarchy

use nalgebra::{Point2, Vector2};

use crate::cell::CellId;
use crate::Real;

/// Dense handle of a universe inside its owning [Geometry](crate::geometry::Geometry)
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UniverseId(pub u32);

impl UniverseId {
    /// Returns the handle as an array index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A keyed collection of cells or a regular grid of sub-universes
#[derive(Clone, Debug)]
pub struct Universe<R: Real> {
    pub(crate) id: UniverseId,
    pub(crate) kind: UniverseKind<R>,
}

/// The two flavors of universes
#[derive(Clone, Debug)]
pub enum UniverseKind<R: Real> {
    /// Cells located by a linear containment scan
    Simple { cells: Vec<CellId> },
    /// Regular grid located by coordinate arithmetic
    Lattice(Lattice<R>),
}

impl<R: Real> Universe<R> {
    pub(crate) fn simple(id: UniverseId) -> Self {
        Self {
            id,
            kind: UniverseKind::Simple { cells: Vec::new() },
        }
    }

    pub(crate) fn lattice(id: UniverseId, lattice: Lattice<R>) -> Self {
        Self {
            id,
            kind: UniverseKind::Lattice(lattice),
        }
    }

    /// Returns the dense handle of this universe
    pub fn id(&self) -> UniverseId {
        self.id
    }

    /// Returns the kind of this universe
    pub fn kind(&self) -> &UniverseKind<R> {
        &self.kind
    }

    /// Returns the cells of a simple universe, empty for lattices
    pub fn cells(&self) -> &[CellId] {
        match &self.kind {
            UniverseKind::Simple { cells } => cells,
            UniverseKind::Lattice(_) => &[],
        }
    }
}

/// A regular rectangular grid of sub-universes
#[derive(Clone, Debug)]
pub struct Lattice<R: Real> {
    /// Lower-left corner of the grid
    pub origin: Point2<R>,
    /// Pitch of the lattice cells in x and y
    pub pitch: Vector2<R>,
    /// Number of lattice cells in x
    pub nx: usize,
    /// Number of lattice cells in y
    pub ny: usize,
    /// Universe filling each lattice cell, row-major from the lower-left corner
    pub universes: Vec<UniverseId>,
}

impl<R: Real> Lattice<R> {
    /// Locates the lattice cell containing the given point
    ///
    /// Returns the cell indices and the point recentered on the lattice cell, or `None` when the
    /// point is outside of the grid.
    pub(crate) fn locate(&self, point: &Point2<R>) -> Option<(usize, usize, Point2<R>)> {
        let fx = (point.x - self.origin.x) / self.pitch.x;
        let fy = (point.y - self.origin.y) / self.pitch.y;
        if fx < R::zero() || fy < R::zero() {
            return None;
        }
        let ix = fx.floor().to_usize()?;
        let iy = fy.floor().to_usize()?;
        if ix >= self.nx || iy >= self.ny {
            return None;
        }

        let half = R::from_f64(0.5).unwrap();
        let center_x = self.origin.x + (R::from_usize(ix).unwrap() + half) * self.pitch.x;
        let center_y = self.origin.y + (R::from_usize(iy).unwrap() + half) * self.pitch.y;
        Some((ix, iy, Point2::new(point.x - center_x, point.y - center_y)))
    }

    /// Returns the universe filling the lattice cell at the given indices
    pub(crate) fn universe_at(&self, ix: usize, iy: usize) -> UniverseId {
        self.universes[iy * self.nx + ix]
    }

    /// Distance from a cell-local point to the walls of its lattice cell along the given angle
    pub(crate) fn distance_to_walls(&self, local: &Point2<R>, theta: R) -> R {
        let half = R::from_f64(0.5).unwrap();
        let half_x = half * self.pitch.x;
        let half_y = half * self.pitch.y;
        let dir_x = theta.cos();
        let dir_y = theta.sin();

        let dist_x = if dir_x > R::zero() {
            (half_x - local.x) / dir_x
        } else if dir_x < R::zero() {
            (-half_x - local.x) / dir_x
        } else {
            R::infinity()
        };
        let dist_y = if dir_y > R::zero() {
            (half_y - local.y) / dir_y
        } else if dir_y < R::zero() {
            (-half_y - local.y) / dir_y
        } else {
            R::infinity()
        };

        dist_x.min(dist_y).max(R::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn lattice_2x2() -> Lattice<f64> {
        Lattice {
            origin: Point2::new(-1.0, -1.0),
            pitch: Vector2::new(1.0, 1.0),
            nx: 2,
            ny: 2,
            universes: vec![UniverseId(1), UniverseId(2), UniverseId(3), UniverseId(4)],
        }
    }

    #[test]
    fn locate_recenters_on_the_lattice_cell() {
        let lattice = lattice_2x2();
        let (ix, iy, local) = lattice.locate(&Point2::new(0.75, -0.25)).unwrap();
        assert_eq!((ix, iy), (1, 0));
        assert!((local.x - 0.25).abs() < 1.0e-12);
        assert!((local.y - 0.25).abs() < 1.0e-12);
        assert_eq!(lattice.universe_at(ix, iy), UniverseId(2));
    }

    #[test]
    fn locate_rejects_points_outside_the_grid() {
        let lattice = lattice_2x2();
        assert!(lattice.locate(&Point2::new(1.5, 0.0)).is_none());
        assert!(lattice.locate(&Point2::new(0.0, -1.5)).is_none());
    }

    #[test]
    fn wall_distances() {
        let lattice = lattice_2x2();
        let local = Point2::new(0.25, 0.0);
        // Straight up hits the top wall
        assert!((lattice.distance_to_walls(&local, FRAC_PI_2) - 0.5).abs() < 1.0e-12);
        // Leftwards hits the left wall
        assert!((lattice.distance_to_walls(&local, PI) - 0.75).abs() < 1.0e-12);
    }
}
