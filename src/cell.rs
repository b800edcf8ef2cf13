//! Cells bounded by signed halfspaces of analytic surfaces
//!
//! A cell is the intersection of halfspaces: for every bound surface the signed implicit form
//! must match the stored halfspace sign. Points within the on-surface tolerance of a bound count
//! as inside. Cells reference surfaces by handle; the surfaces themselves are shared and live in
//! the [Geometry](crate::geometry::Geometry) arena.

use nalgebra::Point2;

use crate::geometry::GeometryError;
use crate::material::MaterialId;
use crate::surface::{Surface, SurfaceId};
use crate::universe::UniverseId;
use crate::{new_map, MapType, Real, ON_SURFACE_THRESH};

/// Dense handle of a cell inside its owning [Geometry](crate::geometry::Geometry)
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CellId(pub u32);

impl CellId {
    /// Returns the handle as an array index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a cell is filled with
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CellFill {
    /// Leaf cell filled with a material, optionally subdivided into rings and sectors
    Material {
        /// Handle of the filling material
        material: MaterialId,
        /// Number of equal-volume rings the cell is subdivided into (0 or 1 = none)
        num_rings: u32,
        /// Number of equal-angle sectors the cell is subdivided into (0 = none)
        num_sectors: u32,
    },
    /// Cell filled with another universe
    Universe(UniverseId),
}

/// A surface handle together with the halfspace sign selecting one of its sides
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HalfspaceBound {
    /// Handle of the bounding surface
    pub surface: SurfaceId,
    /// Halfspace sign, `+1` or `-1`
    pub halfspace: i8,
}

/// A region defined as the intersection of surface halfspaces
#[derive(Clone, Debug)]
pub struct Cell {
    pub(crate) id: CellId,
    pub(crate) user_id: u32,
    pub(crate) universe: UniverseId,
    pub(crate) fill: CellFill,
    /// Bounds keyed by the user id of their surface; adding a surface twice replaces its bound
    pub(crate) bounds: MapType<u32, HalfspaceBound>,
}

impl Cell {
    pub(crate) fn new(id: CellId, user_id: u32, universe: UniverseId, fill: CellFill) -> Self {
        Self {
            id,
            user_id,
            universe,
            fill,
            bounds: new_map(),
        }
    }

    /// Returns the dense handle of this cell
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Returns the user-facing id of this cell
    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    /// Returns the universe this cell belongs to
    pub fn universe(&self) -> UniverseId {
        self.universe
    }

    /// Returns what this cell is filled with
    pub fn fill(&self) -> &CellFill {
        &self.fill
    }

    /// Returns the material handle for material-filled cells
    pub fn material(&self) -> Option<MaterialId> {
        match self.fill {
            CellFill::Material { material, .. } => Some(material),
            CellFill::Universe(_) => None,
        }
    }

    /// Returns the number of rings this cell is subdivided into (0 for fill cells)
    pub fn num_rings(&self) -> u32 {
        match self.fill {
            CellFill::Material { num_rings, .. } => num_rings,
            CellFill::Universe(_) => 0,
        }
    }

    /// Returns the number of sectors this cell is subdivided into (0 for fill cells)
    pub fn num_sectors(&self) -> u32 {
        match self.fill {
            CellFill::Material { num_sectors, .. } => num_sectors,
            CellFill::Universe(_) => 0,
        }
    }

    pub(crate) fn set_num_rings(&mut self, rings: u32) {
        if let CellFill::Material { num_rings, .. } = &mut self.fill {
            *num_rings = rings;
        }
    }

    /// A sector count of 1 is stored as 0, both mean "no sectorization"
    pub(crate) fn set_num_sectors(&mut self, sectors: u32) {
        let sectors = if sectors == 1 { 0 } else { sectors };
        if let CellFill::Material { num_sectors, .. } = &mut self.fill {
            *num_sectors = sectors;
        }
    }

    /// Adds a bounding surface on the given halfspace side of this cell
    pub(crate) fn add_bound<R: Real>(
        &mut self,
        halfspace: i8,
        surface: &Surface<R>,
    ) -> Result<(), GeometryError> {
        if halfspace != 1 && halfspace != -1 {
            return Err(GeometryError::InvalidHalfspace {
                cell: self.user_id,
                halfspace,
            });
        }
        self.bounds.insert(
            surface.user_id(),
            HalfspaceBound {
                surface: surface.id(),
                halfspace,
            },
        );
        Ok(())
    }

    /// Iterates over the halfspace bounds of this cell
    pub fn bounds(&self) -> impl Iterator<Item = &HalfspaceBound> {
        self.bounds.values()
    }

    /// Returns the number of bounding surfaces
    pub fn num_bounds(&self) -> usize {
        self.bounds.len()
    }

    /// Returns whether the given point is inside of this cell
    ///
    /// A point is inside iff the signed implicit form of every bound surface matches the stored
    /// halfspace; points within the on-surface tolerance of a bound count as inside.
    pub fn contains<R: Real>(&self, point: &Point2<R>, surfaces: &[Surface<R>]) -> bool {
        let eps = R::from_f64(ON_SURFACE_THRESH).unwrap();
        self.bounds.values().all(|bound| {
            let value = surfaces[bound.surface.index()].evaluate(point);
            let signed = if bound.halfspace > 0 { value } else { -value };
            signed >= -eps
        })
    }

    /// Returns the nearest forward intersection with any bound surface along the ray from
    /// `point` at angle `theta`, `None` when every bound is missed
    pub fn min_surface_distance<R: Real>(
        &self,
        point: &Point2<R>,
        theta: R,
        surfaces: &[Surface<R>],
    ) -> Option<(R, Point2<R>)> {
        let mut nearest: Option<(R, Point2<R>)> = None;
        for bound in self.bounds.values() {
            if let Some((dist, hit)) = surfaces[bound.surface.index()].min_distance(point, theta) {
                if nearest.map_or(true, |(d, _)| dist < d) {
                    nearest = Some((dist, hit));
                }
            }
        }
        nearest
    }

    /// Deep-copies this cell under a new id, sharing the bound surfaces by handle
    pub(crate) fn clone_with(&self, id: CellId, user_id: u32) -> Cell {
        Cell {
            id,
            user_id,
            universe: self.universe,
            fill: self.fill,
            bounds: self.bounds.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{BoundaryType, SurfaceKind};
    use std::f64::consts::FRAC_PI_4;

    fn quarter_disk() -> (Cell, Vec<Surface<f64>>) {
        let surfaces = vec![
            Surface::new(SurfaceId(0), 1, BoundaryType::None, SurfaceKind::XPlane { x: 0.0 }),
            Surface::new(SurfaceId(1), 2, BoundaryType::None, SurfaceKind::YPlane { y: 0.0 }),
            Surface::new(
                SurfaceId(2),
                3,
                BoundaryType::None,
                SurfaceKind::Circle {
                    x0: 0.0,
                    y0: 0.0,
                    radius: 1.0,
                },
            ),
        ];
        let mut cell = Cell::new(
            CellId(0),
            1,
            UniverseId(0),
            CellFill::Material {
                material: MaterialId(0),
                num_rings: 0,
                num_sectors: 0,
            },
        );
        cell.add_bound(1, &surfaces[0]).unwrap();
        cell.add_bound(1, &surfaces[1]).unwrap();
        cell.add_bound(-1, &surfaces[2]).unwrap();
        (cell, surfaces)
    }

    #[test]
    fn containment_in_quarter_disk() {
        let (cell, surfaces) = quarter_disk();
        assert!(cell.contains(&Point2::new(0.5, 0.5), &surfaces));
        assert!(!cell.contains(&Point2::new(-0.1, 0.5), &surfaces));
        assert!(!cell.contains(&Point2::new(0.8, 0.8), &surfaces));
        // Points on a bound count as inside
        assert!(cell.contains(&Point2::new(0.0, 0.5), &surfaces));
    }

    #[test]
    fn invalid_halfspace_is_rejected() {
        let (mut cell, surfaces) = quarter_disk();
        assert!(matches!(
            cell.add_bound(0, &surfaces[0]),
            Err(GeometryError::InvalidHalfspace { halfspace: 0, .. })
        ));
        assert!(matches!(
            cell.add_bound(2, &surfaces[0]),
            Err(GeometryError::InvalidHalfspace { halfspace: 2, .. })
        ));
    }

    #[test]
    fn nearest_bound_along_diagonal() {
        let (cell, surfaces) = quarter_disk();
        let (dist, hit) = cell
            .min_surface_distance(&Point2::new(0.5, 0.5), FRAC_PI_4, &surfaces)
            .unwrap();
        // Both axis planes are behind the ray, so the circle is the nearest bound
        assert!((dist - (1.0 - 0.5 * 2.0f64.sqrt())).abs() < 1.0e-12);
        assert!(surfaces[2].on_surface(&hit));
    }

    #[test]
    fn clone_shares_surfaces_and_fill() {
        let (cell, _) = quarter_disk();
        let clone = cell.clone_with(CellId(7), 10001);
        assert_eq!(clone.id(), CellId(7));
        assert_eq!(clone.user_id(), 10001);
        assert_eq!(clone.num_bounds(), cell.num_bounds());
        assert_eq!(clone.material(), cell.material());
    }
}
