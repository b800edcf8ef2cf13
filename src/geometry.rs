//! Arena of surfaces, cells and universes plus the flat source region registry
//!
//! The [Geometry] value owns three flat containers keyed by dense integer handles. Auto-assigned
//! user ids come from per-family counters owned by the geometry itself, so several geometries can
//! coexist in one process. Point location walks the universe hierarchy and records the descent in
//! a [LocalCoords] chain; each distinct chain is a flat source region (FSR) and receives a dense
//! id on first encounter.

use std::sync::atomic::{AtomicU32, Ordering};

use log::{info, warn};
use nalgebra::Point2;
use smallvec::SmallVec;
use thiserror::Error as ThisError;

use crate::cell::{Cell, CellFill, CellId};
use crate::material::MaterialId;
use crate::subdivide;
use crate::surface::{BoundaryType, Surface, SurfaceId, SurfaceKind};
use crate::universe::{Lattice, Universe, UniverseId, UniverseKind};
use crate::{new_map, MapType, ParallelMapType, Real};

/// First id handed out by the per-family auto id counters; user ids must stay below it
pub const AUTO_ID_START: u32 = 10000;

/// Depth cap of the universe descent, exceeded only by cyclic fills
const MAX_NESTING_DEPTH: usize = 64;

/// Dense id of a flat source region
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FsrId(pub u32);

impl FsrId {
    /// Returns the id as an array index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Error type returned when building or querying the geometry fails
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum GeometryError {
    /// A halfspace sign other than +1 or -1 was supplied
    #[error("halfspace {halfspace} of cell {cell} is neither +1 nor -1")]
    InvalidHalfspace { cell: u32, halfspace: i8 },
    /// A user id was supplied twice within one family
    #[error("{family} user id {user_id} is already taken")]
    DuplicateUserId { family: &'static str, user_id: u32 },
    /// A user id in the reserved auto-assignment range was supplied
    #[error("{family} user id {user_id} lies in the reserved range (>= 10000)")]
    ReservedUserId { family: &'static str, user_id: u32 },
    /// A dense handle does not refer to an existing entity
    #[error("unknown {family} handle {handle}")]
    UnknownHandle { family: &'static str, handle: u32 },
    /// Ring subdivision was requested for a cell without a bounding circle
    #[error("cell {cell}: ring subdivision requires a bounding circle")]
    RingWithoutCircle { cell: u32 },
    /// Ring subdivision was requested for a cell with only an inner (+1) circle
    #[error("cell {cell}: ring subdivision requires an outer circle on the -1 halfspace")]
    RingWithoutOuterCircle { cell: u32 },
    /// The circles bounding a ringified cell are not concentric
    #[error("cell {cell}: the bounding circles are not concentric")]
    MismatchedRingCenters { cell: u32 },
    /// A material-cell operation was applied to a universe-filled cell
    #[error("cell {cell} is not filled with a material")]
    NotAMaterialCell { cell: u32 },
    /// The coordinate chain does not descend to a material cell
    #[error("the coordinate chain does not end in a material cell")]
    NotALeafChain,
    /// A lattice was declared with the wrong number of fill universes
    #[error("lattice of {nx}x{ny} cells must be filled by {expected} universes, got {got}")]
    MismatchedLatticeFill {
        nx: usize,
        ny: usize,
        expected: usize,
        got: usize,
    },
    /// Cells were added directly to a lattice universe
    #[error("universe {universe} is a lattice and cannot contain cells directly")]
    CellsInLattice { universe: u32 },
    /// A query was made before a root universe was set
    #[error("the geometry has no root universe")]
    MissingRootUniverse,
}

/// One level of the descent through the universe hierarchy
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoordStep {
    /// Containment in a cell of a simple universe
    Cell { universe: UniverseId, cell: CellId },
    /// Entry into a lattice cell
    Lattice {
        universe: UniverseId,
        ix: usize,
        iy: usize,
    },
}

/// The chain of (universe, cell) levels through which a global point descends
///
/// The chain head is the root universe, the tail is the innermost material cell. Each level
/// stores the point expressed in the local frame of that level.
#[derive(Clone, Debug)]
pub struct LocalCoords<R: Real> {
    steps: SmallVec<[(CoordStep, Point2<R>); 4]>,
}

impl<R: Real> LocalCoords<R> {
    fn new() -> Self {
        Self {
            steps: SmallVec::new(),
        }
    }

    fn push(&mut self, step: CoordStep, point: Point2<R>) {
        self.steps.push((step, point));
    }

    /// Returns the descent levels from the root downwards
    pub fn levels(&self) -> &[(CoordStep, Point2<R>)] {
        &self.steps
    }

    /// Returns the innermost cell of the chain
    pub fn leaf_cell(&self) -> Option<CellId> {
        self.steps.iter().rev().find_map(|(step, _)| match step {
            CoordStep::Cell { cell, .. } => Some(*cell),
            CoordStep::Lattice { .. } => None,
        })
    }

    /// Packs the chain into the hash key identifying its flat source region
    pub(crate) fn key(&self) -> FsrKey {
        FsrKey(
            self.steps
                .iter()
                .map(|(step, _)| match *step {
                    CoordStep::Cell { cell, .. } => cell.0 as u64,
                    CoordStep::Lattice { universe, ix, iy } => {
                        (1 << 63) | ((universe.0 as u64) << 40) | ((ix as u64) << 20) | iy as u64
                    }
                })
                .collect(),
        )
    }
}

/// Packed descent chain used as the identity of a flat source region
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct FsrKey(SmallVec<[u64; 6]>);

/// Concurrent registry handing out dense FSR ids for descent chains
struct FsrRegistry {
    ids: ParallelMapType<FsrKey, (FsrId, MaterialId)>,
    counter: AtomicU32,
}

impl Default for FsrRegistry {
    fn default() -> Self {
        Self {
            ids: ParallelMapType::default(),
            counter: AtomicU32::new(0),
        }
    }
}

impl FsrRegistry {
    fn get_or_insert(&self, key: FsrKey, material: MaterialId) -> FsrId {
        let entry = self.ids.entry(key).or_insert_with(|| {
            let id = FsrId(self.counter.fetch_add(1, Ordering::Relaxed));
            (id, material)
        });
        entry.value().0
    }

    fn len(&self) -> usize {
        self.counter.load(Ordering::Relaxed) as usize
    }

    fn flatten(&self) -> FlatSourceRegions {
        let mut materials = vec![MaterialId(0); self.len()];
        for entry in self.ids.iter() {
            let (id, material) = *entry.value();
            materials[id.index()] = material;
        }
        FlatSourceRegions::new(materials)
    }
}

/// The frozen FSR-to-material map consumed by the solver
#[derive(Clone, Debug)]
pub struct FlatSourceRegions {
    materials: Vec<MaterialId>,
}

impl FlatSourceRegions {
    /// Constructs the map from one material handle per flat source region
    pub fn new(materials: Vec<MaterialId>) -> Self {
        Self { materials }
    }

    /// Returns the number of flat source regions
    pub fn num_fsrs(&self) -> usize {
        self.materials.len()
    }

    /// Returns the material filling the given flat source region
    pub fn material(&self, fsr: FsrId) -> MaterialId {
        self.materials[fsr.index()]
    }

    /// Returns the material handles of all flat source regions
    pub fn materials(&self) -> &[MaterialId] {
        &self.materials
    }
}

/// The constructive geometry: arenas of surfaces, cells and universes plus the FSR registry
pub struct Geometry<R: Real> {
    surfaces: Vec<Surface<R>>,
    cells: Vec<Cell>,
    universes: Vec<Universe<R>>,
    surface_user_ids: MapType<u32, SurfaceId>,
    cell_user_ids: MapType<u32, CellId>,
    next_auto_surface_user_id: u32,
    next_auto_cell_user_id: u32,
    root: Option<UniverseId>,
    fsrs: FsrRegistry,
}

impl<R: Real> Default for Geometry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Real> Geometry<R> {
    /// Constructs an empty geometry with fresh auto id counters
    pub fn new() -> Self {
        Self {
            surfaces: Vec::new(),
            cells: Vec::new(),
            universes: Vec::new(),
            surface_user_ids: new_map(),
            cell_user_ids: new_map(),
            next_auto_surface_user_id: AUTO_ID_START,
            next_auto_cell_user_id: AUTO_ID_START,
            root: None,
            fsrs: FsrRegistry::default(),
        }
    }

    /// Adds a surface with the given user id (0 = auto-assign) and boundary condition
    pub fn add_surface(
        &mut self,
        user_id: u32,
        boundary: BoundaryType,
        kind: SurfaceKind<R>,
    ) -> Result<SurfaceId, GeometryError> {
        let user_id = claim_user_id(
            &self.surface_user_ids,
            &mut self.next_auto_surface_user_id,
            user_id,
            "surface",
        )?;
        let id = SurfaceId(self.surfaces.len() as u32);
        self.surfaces.push(Surface::new(id, user_id, boundary, kind));
        self.surface_user_ids.insert(user_id, id);
        Ok(id)
    }

    /// Adds an interior surface with an auto-assigned user id
    pub(crate) fn add_auto_surface(&mut self, kind: SurfaceKind<R>) -> SurfaceId {
        self.add_surface(0, BoundaryType::None, kind)
            .expect("auto ids cannot collide")
    }

    /// Returns the surface behind the given handle
    pub fn surface(&self, id: SurfaceId) -> &Surface<R> {
        &self.surfaces[id.index()]
    }

    /// Returns all surfaces of the geometry
    pub fn surfaces(&self) -> &[Surface<R>] {
        &self.surfaces
    }

    /// Looks up a surface handle by its user id
    pub fn surface_by_user_id(&self, user_id: u32) -> Option<SurfaceId> {
        self.surface_user_ids.get(&user_id).copied()
    }

    /// Adds an empty simple universe
    pub fn add_universe(&mut self) -> UniverseId {
        let id = UniverseId(self.universes.len() as u32);
        self.universes.push(Universe::simple(id));
        id
    }

    /// Adds a lattice universe after validating its fill
    pub fn add_lattice(&mut self, lattice: Lattice<R>) -> Result<UniverseId, GeometryError> {
        let expected = lattice.nx * lattice.ny;
        if lattice.universes.len() != expected {
            return Err(GeometryError::MismatchedLatticeFill {
                nx: lattice.nx,
                ny: lattice.ny,
                expected,
                got: lattice.universes.len(),
            });
        }
        for universe in &lattice.universes {
            self.check_universe(*universe)?;
        }
        let id = UniverseId(self.universes.len() as u32);
        self.universes.push(Universe::lattice(id, lattice));
        Ok(id)
    }

    /// Returns the universe behind the given handle
    pub fn universe(&self, id: UniverseId) -> &Universe<R> {
        &self.universes[id.index()]
    }

    /// Returns all universes of the geometry
    pub fn universes(&self) -> &[Universe<R>] {
        &self.universes
    }

    /// Declares the universe at the top of the hierarchy
    pub fn set_root_universe(&mut self, universe: UniverseId) -> Result<(), GeometryError> {
        self.check_universe(universe)?;
        self.root = Some(universe);
        Ok(())
    }

    /// Returns the root universe, if one was set
    pub fn root_universe(&self) -> Option<UniverseId> {
        self.root
    }

    /// Adds a material-filled cell to a simple universe
    ///
    /// A sector count of 1 is stored as 0; both mean "no sectorization".
    pub fn add_material_cell(
        &mut self,
        universe: UniverseId,
        user_id: u32,
        material: MaterialId,
        num_rings: u32,
        num_sectors: u32,
    ) -> Result<CellId, GeometryError> {
        let id = self.add_cell(
            universe,
            user_id,
            CellFill::Material {
                material,
                num_rings: 0,
                num_sectors: 0,
            },
        )?;
        let cell = &mut self.cells[id.index()];
        cell.set_num_rings(num_rings);
        cell.set_num_sectors(num_sectors);
        Ok(id)
    }

    /// Adds a cell filled with another universe to a simple universe
    pub fn add_fill_cell(
        &mut self,
        universe: UniverseId,
        user_id: u32,
        fill: UniverseId,
    ) -> Result<CellId, GeometryError> {
        self.check_universe(fill)?;
        self.add_cell(universe, user_id, CellFill::Universe(fill))
    }

    fn add_cell(
        &mut self,
        universe: UniverseId,
        user_id: u32,
        fill: CellFill,
    ) -> Result<CellId, GeometryError> {
        if matches!(
            self.check_universe(universe)?.kind(),
            UniverseKind::Lattice(_)
        ) {
            return Err(GeometryError::CellsInLattice {
                universe: universe.0,
            });
        }
        let user_id = claim_user_id(
            &self.cell_user_ids,
            &mut self.next_auto_cell_user_id,
            user_id,
            "cell",
        )?;
        let id = CellId(self.cells.len() as u32);
        self.cells.push(Cell::new(id, user_id, universe, fill));
        self.cell_user_ids.insert(user_id, id);
        if let UniverseKind::Simple { cells } = &mut self.universes[universe.index()].kind {
            cells.push(id);
        }
        Ok(id)
    }

    /// Clones a material cell under a fresh dense id and auto-assigned user id
    pub(crate) fn clone_material_cell(&mut self, cell: CellId) -> Result<CellId, GeometryError> {
        let original = self.check_cell(cell)?;
        if original.material().is_none() {
            return Err(GeometryError::NotAMaterialCell {
                cell: original.user_id(),
            });
        }
        let user_id = claim_user_id(
            &self.cell_user_ids,
            &mut self.next_auto_cell_user_id,
            0,
            "cell",
        )?;
        let id = CellId(self.cells.len() as u32);
        let clone = self.cells[cell.index()].clone_with(id, user_id);
        self.cells.push(clone);
        self.cell_user_ids.insert(user_id, id);
        Ok(id)
    }

    /// Returns the cell behind the given handle
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.index()]
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        &mut self.cells[id.index()]
    }

    /// Returns all cells of the geometry
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Adds a bounding surface to a cell on the given halfspace side
    pub fn cell_add_surface(
        &mut self,
        cell: CellId,
        halfspace: i8,
        surface: SurfaceId,
    ) -> Result<(), GeometryError> {
        let surface = self
            .surfaces
            .get(surface.index())
            .ok_or(GeometryError::UnknownHandle {
                family: "surface",
                handle: surface.0,
            })?;
        let cell = self
            .cells
            .get_mut(cell.index())
            .ok_or(GeometryError::UnknownHandle {
                family: "cell",
                handle: cell.0,
            })?;
        cell.add_bound(halfspace, surface)
    }

    /// Sets the ring and sector counts of a material cell
    ///
    /// A sector count of 1 is stored as 0; both mean "no sectorization".
    pub fn set_ring_sector_counts(
        &mut self,
        cell: CellId,
        num_rings: u32,
        num_sectors: u32,
    ) -> Result<(), GeometryError> {
        let cell = self
            .cells
            .get_mut(cell.index())
            .ok_or(GeometryError::UnknownHandle {
                family: "cell",
                handle: cell.0,
            })?;
        if cell.material().is_none() {
            return Err(GeometryError::NotAMaterialCell {
                cell: cell.user_id(),
            });
        }
        cell.set_num_rings(num_rings);
        cell.set_num_sectors(num_sectors);
        Ok(())
    }

    pub(crate) fn replace_universe_cells(
        &mut self,
        universe: UniverseId,
        original: CellId,
        replacements: &[CellId],
    ) {
        if let UniverseKind::Simple { cells } = &mut self.universes[universe.index()].kind {
            cells.retain(|&c| c != original);
            cells.extend_from_slice(replacements);
        }
    }

    /// Subdivides all material cells with ring or sector counts into their leaf cells
    pub fn subdivide(&mut self) -> Result<(), GeometryError> {
        subdivide::subdivide_geometry(self)
    }

    /// Locates the cell chain containing the given global point
    ///
    /// Returns `None` when the point is outside of the root universe or a fill universe does not
    /// cover it.
    pub fn find_cell(&self, point: &Point2<R>) -> Option<LocalCoords<R>> {
        let root = self.root?;
        let mut coords = LocalCoords::new();
        let mut universe = root;
        let mut local = *point;

        for _ in 0..MAX_NESTING_DEPTH {
            match self.universes.get(universe.index())?.kind() {
                UniverseKind::Simple { cells } => {
                    let cell_id = cells
                        .iter()
                        .copied()
                        .find(|&c| self.cells[c.index()].contains(&local, &self.surfaces))?;
                    coords.push(
                        CoordStep::Cell {
                            universe,
                            cell: cell_id,
                        },
                        local,
                    );
                    match self.cells[cell_id.index()].fill {
                        CellFill::Material { .. } => return Some(coords),
                        CellFill::Universe(next) => universe = next,
                    }
                }
                UniverseKind::Lattice(lattice) => {
                    let (ix, iy, recentered) = lattice.locate(&local)?;
                    coords.push(CoordStep::Lattice { universe, ix, iy }, recentered);
                    universe = lattice.universe_at(ix, iy);
                    local = recentered;
                }
            }
        }

        warn!(
            "Geometry descent exceeded {} levels, assuming a cyclic fill",
            MAX_NESTING_DEPTH
        );
        None
    }

    /// Distance from the chain's point to the nearest bound of any chain level along `theta`
    pub fn distance_to_boundary(&self, coords: &LocalCoords<R>, theta: R) -> R {
        let mut min = R::infinity();
        for (step, point) in coords.levels() {
            let dist = match step {
                CoordStep::Cell { cell, .. } => self.cells[cell.index()]
                    .min_surface_distance(point, theta, &self.surfaces)
                    .map_or(R::infinity(), |(d, _)| d),
                CoordStep::Lattice { universe, .. } => {
                    match self.universes[universe.index()].kind() {
                        UniverseKind::Lattice(lattice) => lattice.distance_to_walls(point, theta),
                        UniverseKind::Simple { .. } => R::infinity(),
                    }
                }
            };
            min = min.min(dist);
        }
        min
    }

    /// Returns the dense id of the flat source region identified by the given chain
    ///
    /// The first call for a chain allocates a fresh id; subsequent calls (from any thread) reuse
    /// it.
    pub fn fsr_id(&self, coords: &LocalCoords<R>) -> Result<FsrId, GeometryError> {
        let cell_id = coords.leaf_cell().ok_or(GeometryError::NotALeafChain)?;
        let material = self
            .cells
            .get(cell_id.index())
            .and_then(|cell| cell.material())
            .ok_or(GeometryError::NotALeafChain)?;
        Ok(self.fsrs.get_or_insert(coords.key(), material))
    }

    /// Returns the number of flat source regions discovered so far
    pub fn num_fsrs(&self) -> usize {
        self.fsrs.len()
    }

    /// Snapshots the FSR-to-material map for the solver
    pub fn flat_source_regions(&self) -> FlatSourceRegions {
        self.fsrs.flatten()
    }

    /// Logs a summary of the geometry
    pub fn log_summary(&self) {
        info!(
            "Geometry contains {} surfaces, {} cells, {} universes and {} flat source regions",
            self.surfaces.len(),
            self.cells.len(),
            self.universes.len(),
            self.fsrs.len()
        );
    }

    fn check_universe(&self, id: UniverseId) -> Result<&Universe<R>, GeometryError> {
        self.universes
            .get(id.index())
            .ok_or(GeometryError::UnknownHandle {
                family: "universe",
                handle: id.0,
            })
    }

    fn check_cell(&self, id: CellId) -> Result<&Cell, GeometryError> {
        self.cells.get(id.index()).ok_or(GeometryError::UnknownHandle {
            family: "cell",
            handle: id.0,
        })
    }
}

fn claim_user_id<T>(
    used: &MapType<u32, T>,
    next_auto: &mut u32,
    requested: u32,
    family: &'static str,
) -> Result<u32, GeometryError> {
    if requested == 0 {
        let id = *next_auto;
        *next_auto += 1;
        Ok(id)
    } else if requested >= AUTO_ID_START {
        Err(GeometryError::ReservedUserId {
            family,
            user_id: requested,
        })
    } else if used.contains_key(&requested) {
        Err(GeometryError::DuplicateUserId {
            family,
            user_id: requested,
        })
    } else {
        Ok(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;
    use std::f64::consts::FRAC_PI_4;

    /// Square pin cell universe: a fuel circle inside a moderator box
    fn pin_universe(geometry: &mut Geometry<f64>, half_width: f64) -> UniverseId {
        let universe = geometry.add_universe();
        let circle = geometry.add_auto_surface(SurfaceKind::Circle {
            x0: 0.0,
            y0: 0.0,
            radius: 0.5,
        });
        let xmin = geometry.add_auto_surface(SurfaceKind::XPlane { x: -half_width });
        let xmax = geometry.add_auto_surface(SurfaceKind::XPlane { x: half_width });
        let ymin = geometry.add_auto_surface(SurfaceKind::YPlane { y: -half_width });
        let ymax = geometry.add_auto_surface(SurfaceKind::YPlane { y: half_width });

        let fuel = geometry
            .add_material_cell(universe, 0, MaterialId(0), 0, 0)
            .unwrap();
        geometry.cell_add_surface(fuel, -1, circle).unwrap();

        let moderator = geometry
            .add_material_cell(universe, 0, MaterialId(1), 0, 0)
            .unwrap();
        geometry.cell_add_surface(moderator, 1, circle).unwrap();
        geometry.cell_add_surface(moderator, 1, xmin).unwrap();
        geometry.cell_add_surface(moderator, -1, xmax).unwrap();
        geometry.cell_add_surface(moderator, 1, ymin).unwrap();
        geometry.cell_add_surface(moderator, -1, ymax).unwrap();

        universe
    }

    #[test]
    fn user_id_rules() {
        let mut geometry = Geometry::<f64>::new();
        let kind = SurfaceKind::XPlane { x: 0.0 };
        let first = geometry.add_surface(7, BoundaryType::None, kind).unwrap();
        assert_eq!(geometry.surface(first).user_id(), 7);
        assert!(matches!(
            geometry.add_surface(7, BoundaryType::None, kind),
            Err(GeometryError::DuplicateUserId { user_id: 7, .. })
        ));
        assert!(matches!(
            geometry.add_surface(10000, BoundaryType::None, kind),
            Err(GeometryError::ReservedUserId { user_id: 10000, .. })
        ));
        let auto_a = geometry.add_surface(0, BoundaryType::None, kind).unwrap();
        let auto_b = geometry.add_surface(0, BoundaryType::None, kind).unwrap();
        assert_eq!(geometry.surface(auto_a).user_id(), AUTO_ID_START);
        assert_eq!(geometry.surface(auto_b).user_id(), AUTO_ID_START + 1);
    }

    #[test]
    fn find_cell_in_pin_universe() {
        let mut geometry = Geometry::<f64>::new();
        let universe = pin_universe(&mut geometry, 1.0);
        geometry.set_root_universe(universe).unwrap();

        let fuel_coords = geometry.find_cell(&Point2::new(0.1, 0.1)).unwrap();
        assert_eq!(fuel_coords.levels().len(), 1);
        let moderator_coords = geometry.find_cell(&Point2::new(0.9, 0.9)).unwrap();
        assert_ne!(fuel_coords.leaf_cell(), moderator_coords.leaf_cell());
        assert!(geometry.find_cell(&Point2::new(1.5, 0.0)).is_none());
    }

    #[test]
    fn fsr_ids_are_dense_and_stable() {
        let mut geometry = Geometry::<f64>::new();
        let universe = pin_universe(&mut geometry, 1.0);
        geometry.set_root_universe(universe).unwrap();

        let fuel = geometry.find_cell(&Point2::new(0.0, 0.0)).unwrap();
        let moderator = geometry.find_cell(&Point2::new(0.9, 0.0)).unwrap();
        let fuel_id = geometry.fsr_id(&fuel).unwrap();
        let moderator_id = geometry.fsr_id(&moderator).unwrap();
        assert_ne!(fuel_id, moderator_id);
        assert_eq!(geometry.num_fsrs(), 2);

        // Another point in the fuel maps to the same region
        let fuel_again = geometry.find_cell(&Point2::new(-0.2, 0.1)).unwrap();
        assert_eq!(geometry.fsr_id(&fuel_again).unwrap(), fuel_id);
        assert_eq!(geometry.num_fsrs(), 2);

        let regions = geometry.flat_source_regions();
        assert_eq!(regions.num_fsrs(), 2);
        assert_eq!(regions.material(fuel_id), MaterialId(0));
        assert_eq!(regions.material(moderator_id), MaterialId(1));
    }

    #[test]
    fn lattice_descent_and_distances() {
        let mut geometry = Geometry::<f64>::new();
        let pin = pin_universe(&mut geometry, 1.0);
        let lattice = geometry
            .add_lattice(Lattice {
                origin: Point2::new(-2.0, -2.0),
                pitch: Vector2::new(2.0, 2.0),
                nx: 2,
                ny: 2,
                universes: vec![pin; 4],
            })
            .unwrap();
        geometry.set_root_universe(lattice).unwrap();

        // Point in the fuel of the upper-right pin
        let coords = geometry.find_cell(&Point2::new(1.1, 0.9)).unwrap();
        assert_eq!(coords.levels().len(), 2);
        assert!(matches!(
            coords.levels()[0].0,
            CoordStep::Lattice { ix: 1, iy: 1, .. }
        ));
        let fsr = geometry.fsr_id(&coords).unwrap();

        // The same local position in another lattice cell is a different region
        let other = geometry.find_cell(&Point2::new(-0.9, -1.1)).unwrap();
        assert_ne!(geometry.fsr_id(&other).unwrap(), fsr);

        // From the center of the fuel the circle is the nearest boundary
        let center = geometry.find_cell(&Point2::new(1.0, 1.0)).unwrap();
        let dist = geometry.distance_to_boundary(&center, FRAC_PI_4);
        assert!((dist - 0.5).abs() < 1.0e-12);
    }

    #[test]
    fn lattice_fill_is_validated() {
        let mut geometry = Geometry::<f64>::new();
        let pin = pin_universe(&mut geometry, 1.0);
        assert!(matches!(
            geometry.add_lattice(Lattice {
                origin: Point2::new(0.0, 0.0),
                pitch: Vector2::new(1.0, 1.0),
                nx: 2,
                ny: 2,
                universes: vec![pin; 3],
            }),
            Err(GeometryError::MismatchedLatticeFill { expected: 4, got: 3, .. })
        ));
    }

    #[test]
    fn sector_count_of_one_is_normalized() {
        let mut geometry = Geometry::<f64>::new();
        let universe = geometry.add_universe();
        let cell = geometry
            .add_material_cell(universe, 0, MaterialId(0), 3, 1)
            .unwrap();
        assert_eq!(geometry.cell(cell).num_rings(), 3);
        assert_eq!(geometry.cell(cell).num_sectors(), 0);
    }
}
