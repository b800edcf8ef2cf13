//! Ring and sector subdivision of annular material cells
//!
//! Sectorization clones a cell once per sector and bounds each clone by planes through the
//! origin. Ringification requires one or two concentric circle bounds and splits the annulus
//! into rings of equal area. Sectorization runs first, so the final leaf cells are the sector
//! by ring product. Degenerate configurations leave the cell undivided with a warning;
//! structurally invalid ones are errors.

use itertools::iproduct;
use log::warn;
use nalgebra::Point2;

use crate::cell::CellId;
use crate::geometry::{Geometry, GeometryError};
use crate::surface::SurfaceKind;
use crate::universe::UniverseId;
use crate::utils::reserve_total;
use crate::{Real, ON_SURFACE_THRESH};

/// Subdivides every material cell that carries ring or sector counts
pub(crate) fn subdivide_geometry<R: Real>(geometry: &mut Geometry<R>) -> Result<(), GeometryError> {
    profile!("subdivide_geometry");

    let mut candidates: Vec<(UniverseId, CellId, u32, u32)> = Vec::new();
    for universe in geometry.universes() {
        for &cell_id in universe.cells() {
            let cell = geometry.cell(cell_id);
            if cell.num_rings() >= 2 || cell.num_sectors() >= 2 {
                candidates.push((universe.id(), cell_id, cell.num_rings(), cell.num_sectors()));
            }
        }
    }

    for (universe, cell, num_rings, num_sectors) in candidates {
        if let Some(leaves) = subdivide_cell(geometry, cell, num_rings, num_sectors)? {
            geometry.replace_universe_cells(universe, cell, &leaves);
        }
    }
    Ok(())
}

/// Result of validating the circle bounds of a cell before ringification
enum RingAnalysis<R: Real> {
    /// Common center and the ring radii from the outer radius inwards (`num_rings` entries)
    Rings { center: Point2<R>, radii: Vec<R> },
    /// Non-fatal configuration, the cell stays undivided
    Degenerate(&'static str),
}

/// Subdivides one cell, returning the replacement leaf cells or `None` when it stays undivided
fn subdivide_cell<R: Real>(
    geometry: &mut Geometry<R>,
    cell: CellId,
    num_rings: u32,
    num_sectors: u32,
) -> Result<Option<Vec<CellId>>, GeometryError> {
    // Validate the ring configuration before cloning anything, so that degenerate cells are
    // left exactly as they were
    let rings = if num_rings >= 2 {
        match analyze_rings(geometry, cell, num_rings)? {
            RingAnalysis::Rings { center, radii } => Some((center, radii)),
            RingAnalysis::Degenerate(reason) => {
                warn!(
                    "Cell {}: {}, leaving the cell undivided",
                    geometry.cell(cell).user_id(),
                    reason
                );
                return Ok(None);
            }
        }
    } else {
        None
    };

    // Sector stage: clones bounded by planes through the origin at i * 2pi / n
    let bases = if num_sectors >= 2 {
        let n = num_sectors as usize;
        let planes: Vec<_> = (0..n)
            .map(|i| {
                let angle = R::two_pi() * R::from_usize(i).unwrap() / R::from_usize(n).unwrap();
                geometry.add_auto_surface(SurfaceKind::Plane {
                    a: angle.cos(),
                    b: angle.sin(),
                    c: R::zero(),
                })
            })
            .collect();

        let mut sectors = Vec::with_capacity(n);
        for i in 0..n {
            let sector = clone_leaf(geometry, cell)?;
            geometry.cell_add_surface(sector, 1, planes[i])?;
            if n != 2 {
                geometry.cell_add_surface(sector, -1, planes[(i + 1) % n])?;
            }
            sectors.push(sector);
        }
        sectors
    } else {
        vec![cell]
    };

    // Ring stage: clone every base once per ring; the innermost ring keeps the original inner
    // bound instead of a synthesized circle
    let leaves = if let Some((center, radii)) = rings {
        let n = radii.len();
        let circles: Vec<_> = radii
            .iter()
            .map(|&radius| {
                geometry.add_auto_surface(SurfaceKind::Circle {
                    x0: center.x,
                    y0: center.y,
                    radius,
                })
            })
            .collect();

        let mut leaves = Vec::new();
        reserve_total(&mut leaves, n * bases.len());
        for (ring, &base) in iproduct!(0..n, &bases) {
            let leaf = clone_leaf(geometry, base)?;
            geometry.cell_add_surface(leaf, -1, circles[ring])?;
            if ring + 1 < n {
                geometry.cell_add_surface(leaf, 1, circles[ring + 1])?;
            }
            leaves.push(leaf);
        }
        leaves
    } else {
        bases
    };

    Ok(Some(leaves))
}

/// Clones a material cell and resets the ring/sector counts of the clone
fn clone_leaf<R: Real>(geometry: &mut Geometry<R>, cell: CellId) -> Result<CellId, GeometryError> {
    let clone = geometry.clone_material_cell(cell)?;
    let cell = geometry.cell_mut(clone);
    cell.set_num_rings(0);
    cell.set_num_sectors(0);
    Ok(clone)
}

/// Collects and validates the circle bounds of a cell and computes the equal-area ring radii
fn analyze_rings<R: Real>(
    geometry: &Geometry<R>,
    cell: CellId,
    num_rings: u32,
) -> Result<RingAnalysis<R>, GeometryError> {
    let cell = geometry.cell(cell);
    let mut circles: Vec<(i8, Point2<R>, R)> = Vec::new();
    for bound in cell.bounds() {
        if let SurfaceKind::Circle { x0, y0, radius } = *geometry.surface(bound.surface).kind() {
            circles.push((bound.halfspace, Point2::new(x0, y0), radius));
        }
    }

    if circles.is_empty() {
        return Err(GeometryError::RingWithoutCircle {
            cell: cell.user_id(),
        });
    }
    if circles.len() > 2 {
        return Ok(RingAnalysis::Degenerate(
            "more than two bounding circles for ring subdivision",
        ));
    }

    let outer = circles.iter().find(|(halfspace, _, _)| *halfspace < 0);
    let inner = circles.iter().find(|(halfspace, _, _)| *halfspace > 0);
    let (_, center, outer_radius) = match outer {
        Some(outer) => *outer,
        None => {
            return Err(GeometryError::RingWithoutOuterCircle {
                cell: cell.user_id(),
            })
        }
    };
    if circles.len() == 2 && inner.is_none() {
        return Ok(RingAnalysis::Degenerate(
            "two outer circles for ring subdivision",
        ));
    }

    let inner_radius = match inner {
        Some(&(_, inner_center, inner_radius)) => {
            let eps = R::from_f64(ON_SURFACE_THRESH).unwrap();
            if (inner_center.x - center.x).abs() > eps || (inner_center.y - center.y).abs() > eps {
                return Err(GeometryError::MismatchedRingCenters {
                    cell: cell.user_id(),
                });
            }
            inner_radius
        }
        None => R::zero(),
    };

    if outer_radius <= inner_radius {
        return Ok(RingAnalysis::Degenerate(
            "outer radius does not exceed the inner radius",
        ));
    }

    // Equal ring areas: every ring spans the same difference of squared radii
    let step = (outer_radius * outer_radius - inner_radius * inner_radius)
        / R::from_u32(num_rings).unwrap();
    let mut radii = Vec::with_capacity(num_rings as usize);
    let mut current = outer_radius;
    for _ in 0..num_rings {
        radii.push(current);
        current = (current * current - step).max(R::zero()).sqrt();
    }

    Ok(RingAnalysis::Rings { center, radii })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialId;
    use crate::surface::BoundaryType;
    use nalgebra::Point2;

    /// Geometry with a single universe holding one cell bounded inside a unit circle
    fn disk_geometry(num_rings: u32, num_sectors: u32) -> (Geometry<f64>, UniverseId, CellId) {
        let mut geometry = Geometry::new();
        let universe = geometry.add_universe();
        let circle = geometry
            .add_surface(
                1,
                BoundaryType::None,
                SurfaceKind::Circle {
                    x0: 0.0,
                    y0: 0.0,
                    radius: 1.0,
                },
            )
            .unwrap();
        let cell = geometry
            .add_material_cell(universe, 0, MaterialId(0), num_rings, num_sectors)
            .unwrap();
        geometry.cell_add_surface(cell, -1, circle).unwrap();
        (geometry, universe, cell)
    }

    fn circle_radii(geometry: &Geometry<f64>) -> Vec<f64> {
        geometry
            .surfaces()
            .iter()
            .filter_map(|s| match *s.kind() {
                SurfaceKind::Circle { radius, .. } => Some(radius),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn ringify_unit_disk_into_four_equal_areas() {
        let (mut geometry, universe, _) = disk_geometry(4, 0);
        geometry.subdivide().unwrap();

        let leaves = geometry.universe(universe).cells().to_vec();
        assert_eq!(leaves.len(), 4);
        for &leaf in &leaves {
            assert_eq!(geometry.cell(leaf).num_rings(), 0);
            assert_eq!(geometry.cell(leaf).num_sectors(), 0);
        }

        // The synthesized ring radii follow the equal-area recurrence
        let radii: Vec<f64> = circle_radii(&geometry)[1..].to_vec();
        let expected = [1.0, 0.75f64.sqrt(), 0.5f64.sqrt(), 0.25f64.sqrt()];
        assert_eq!(radii.len(), 4);
        for (radius, expected) in radii.iter().zip(expected.iter()) {
            assert!((radius - expected).abs() < 1.0e-12);
        }

        // Equal ring areas, the innermost ring being the remaining disk
        let mut squares: Vec<f64> = radii.iter().map(|r| r * r).collect();
        squares.push(0.0);
        for pair in squares.windows(2) {
            assert!((pair[0] - pair[1] - 0.25).abs() < 1.0e-12);
        }

        // A point at mid radius lies in exactly one leaf
        let point = Point2::new(0.6, 0.0);
        let containing = leaves
            .iter()
            .filter(|&&leaf| geometry.cell(leaf).contains(&point, geometry.surfaces()))
            .count();
        assert_eq!(containing, 1);
    }

    #[test]
    fn sectorize_into_four_quadrant_planes() {
        let (mut geometry, universe, _) = disk_geometry(0, 4);
        geometry.subdivide().unwrap();

        let leaves = geometry.universe(universe).cells().to_vec();
        assert_eq!(leaves.len(), 4);

        let planes: Vec<(f64, f64)> = geometry
            .surfaces()
            .iter()
            .filter_map(|s| match *s.kind() {
                SurfaceKind::Plane { a, b, .. } => Some((a, b)),
                _ => None,
            })
            .collect();
        let expected = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
        assert_eq!(planes.len(), 4);
        for ((a, b), (ea, eb)) in planes.iter().zip(expected.iter()) {
            assert!((a - ea).abs() < 1.0e-12);
            assert!((b - eb).abs() < 1.0e-12);
        }

        // The sectors partition the disk
        for point in [
            Point2::new(0.3, 0.4),
            Point2::new(-0.5, 0.2),
            Point2::new(0.2, -0.7),
        ] {
            let containing = leaves
                .iter()
                .filter(|&&leaf| geometry.cell(leaf).contains(&point, geometry.surfaces()))
                .count();
            assert_eq!(containing, 1);
        }
    }

    #[test]
    fn two_sectors_use_a_single_bound_each() {
        let (mut geometry, universe, _) = disk_geometry(0, 2);
        geometry.subdivide().unwrap();

        let leaves = geometry.universe(universe).cells().to_vec();
        assert_eq!(leaves.len(), 2);
        for &leaf in &leaves {
            // Original circle plus one sector plane
            assert_eq!(geometry.cell(leaf).num_bounds(), 2);
        }
    }

    #[test]
    fn subdivision_is_the_sector_ring_product() {
        let (mut geometry, universe, _) = disk_geometry(3, 2);
        geometry.subdivide().unwrap();
        assert_eq!(geometry.universe(universe).cells().len(), 6);
    }

    #[test]
    fn annulus_keeps_the_original_inner_bound() {
        let mut geometry = Geometry::new();
        let universe = geometry.add_universe();
        let outer = geometry
            .add_auto_surface(SurfaceKind::Circle {
                x0: 0.0,
                y0: 0.0,
                radius: 1.0,
            });
        let inner = geometry
            .add_auto_surface(SurfaceKind::Circle {
                x0: 0.0,
                y0: 0.0,
                radius: 0.5,
            });
        let cell = geometry
            .add_material_cell(universe, 0, MaterialId(0), 2, 0)
            .unwrap();
        geometry.cell_add_surface(cell, -1, outer).unwrap();
        geometry.cell_add_surface(cell, 1, inner).unwrap();
        geometry.subdivide().unwrap();

        let leaves = geometry.universe(universe).cells().to_vec();
        assert_eq!(leaves.len(), 2);
        // No leaf contains a point inside the original inner circle
        let point = Point2::new(0.2, 0.0);
        assert!(leaves
            .iter()
            .all(|&leaf| !geometry.cell(leaf).contains(&point, geometry.surfaces())));
        // The mid annulus point is covered exactly once
        let point = Point2::new(0.8, 0.0);
        let containing = leaves
            .iter()
            .filter(|&&leaf| geometry.cell(leaf).contains(&point, geometry.surfaces()))
            .count();
        assert_eq!(containing, 1);
    }

    #[test]
    fn degenerate_ring_configurations_stay_undivided() {
        // Outer radius below the inner radius
        let mut geometry = Geometry::new();
        let universe = geometry.add_universe();
        let outer = geometry.add_auto_surface(SurfaceKind::Circle {
            x0: 0.0,
            y0: 0.0,
            radius: 0.5,
        });
        let inner = geometry.add_auto_surface(SurfaceKind::Circle {
            x0: 0.0,
            y0: 0.0,
            radius: 0.8,
        });
        let cell = geometry
            .add_material_cell(universe, 0, MaterialId(0), 2, 0)
            .unwrap();
        geometry.cell_add_surface(cell, -1, outer).unwrap();
        geometry.cell_add_surface(cell, 1, inner).unwrap();
        geometry.subdivide().unwrap();
        assert_eq!(geometry.universe(universe).cells(), &[cell]);

        // More than two circles
        let mut geometry = Geometry::new();
        let universe = geometry.add_universe();
        let cell = geometry
            .add_material_cell(universe, 0, MaterialId(0), 2, 0)
            .unwrap();
        for radius in [1.0, 0.6, 0.3] {
            let circle = geometry.add_auto_surface(SurfaceKind::Circle {
                x0: 0.0,
                y0: 0.0,
                radius,
            });
            geometry.cell_add_surface(cell, -1, circle).unwrap();
        }
        geometry.subdivide().unwrap();
        assert_eq!(geometry.universe(universe).cells(), &[cell]);
    }

    #[test]
    fn invalid_ring_configurations_are_errors() {
        // No circle at all
        let mut geometry = Geometry::<f64>::new();
        let universe = geometry.add_universe();
        let plane = geometry.add_auto_surface(SurfaceKind::XPlane { x: 0.0 });
        let cell = geometry
            .add_material_cell(universe, 0, MaterialId(0), 2, 0)
            .unwrap();
        geometry.cell_add_surface(cell, 1, plane).unwrap();
        assert!(matches!(
            geometry.subdivide(),
            Err(GeometryError::RingWithoutCircle { .. })
        ));

        // Only an inner circle
        let mut geometry = Geometry::<f64>::new();
        let universe = geometry.add_universe();
        let circle = geometry.add_auto_surface(SurfaceKind::Circle {
            x0: 0.0,
            y0: 0.0,
            radius: 0.5,
        });
        let cell = geometry
            .add_material_cell(universe, 0, MaterialId(0), 2, 0)
            .unwrap();
        geometry.cell_add_surface(cell, 1, circle).unwrap();
        assert!(matches!(
            geometry.subdivide(),
            Err(GeometryError::RingWithoutOuterCircle { .. })
        ));

        // Centers disagree
        let mut geometry = Geometry::<f64>::new();
        let universe = geometry.add_universe();
        let outer = geometry.add_auto_surface(SurfaceKind::Circle {
            x0: 0.0,
            y0: 0.0,
            radius: 1.0,
        });
        let inner = geometry.add_auto_surface(SurfaceKind::Circle {
            x0: 0.1,
            y0: 0.0,
            radius: 0.5,
        });
        let cell = geometry
            .add_material_cell(universe, 0, MaterialId(0), 2, 0)
            .unwrap();
        geometry.cell_add_surface(cell, -1, outer).unwrap();
        geometry.cell_add_surface(cell, 1, inner).unwrap();
        assert!(matches!(
            geometry.subdivide(),
            Err(GeometryError::MismatchedRingCenters { .. })
        ));
    }
}
