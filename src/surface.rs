//! Analytic boundary primitives (planes and circles)
//!
//! A [Surface] is immutable after construction and is shared between all cells that are bounded
//! by it. The signed implicit form is positive on the `+1` halfspace side, negative on the `-1`
//! side. Ray queries filter candidates behind the ray with the y-monotonicity rule: a candidate
//! is in front of the ray iff its y coordinate grows for azimuthal angles below pi and shrinks
//! for angles above pi. Exactly vertical rays are handled in a dedicated branch.

use arrayvec::ArrayVec;
use nalgebra::Point2;

use crate::aabb::AxisAlignedBoundingBox2d;
use crate::{Real, ON_SURFACE_THRESH};

/// Rays closer than this to the vertical take the dedicated vertical intersection branch
const VERTICAL_RAY_THRESH: f64 = 1.0e-10;
/// Slope difference below which a ray counts as parallel to a plane
const PARALLEL_THRESH: f64 = 1.0e-11;

/// Dense handle of a surface inside its owning [Geometry](crate::geometry::Geometry)
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SurfaceId(pub u32);

impl SurfaceId {
    /// Returns the handle as an array index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Boundary condition attached to a surface
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoundaryType {
    /// Interior surface without a boundary condition
    None,
    /// Incoming flux mirrors the outgoing flux
    Reflective,
    /// Outgoing flux leaves the problem and is tallied as leakage
    Vacuum,
}

/// The analytic form of a surface
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SurfaceKind<R: Real> {
    /// General plane `A*x + B*y + C = 0`
    Plane { a: R, b: R, c: R },
    /// Plane perpendicular to the x axis at `x`
    XPlane { x: R },
    /// Plane perpendicular to the y axis at `y`
    YPlane { y: R },
    /// Axial plane at `z`, never intersected by the in-plane tracks
    ZPlane { z: R },
    /// Circle with center `(x0, y0)` and the given radius
    Circle { x0: R, y0: R, radius: R },
}

impl<R: Real> SurfaceKind<R> {
    /// The plane coefficients `(A, B, C)` for the plane-like kinds, `None` for circles
    fn plane_coefficients(&self) -> Option<(R, R, R)> {
        match *self {
            SurfaceKind::Plane { a, b, c } => Some((a, b, c)),
            SurfaceKind::XPlane { x } => Some((R::one(), R::zero(), -x)),
            SurfaceKind::YPlane { y } => Some((R::zero(), R::one(), -y)),
            SurfaceKind::ZPlane { .. } | SurfaceKind::Circle { .. } => None,
        }
    }
}

/// An analytic boundary surface of the geometry
#[derive(Clone, Debug)]
pub struct Surface<R: Real> {
    pub(crate) id: SurfaceId,
    pub(crate) user_id: u32,
    pub(crate) boundary: BoundaryType,
    pub(crate) kind: SurfaceKind<R>,
}

impl<R: Real> Surface<R> {
    pub(crate) fn new(id: SurfaceId, user_id: u32, boundary: BoundaryType, kind: SurfaceKind<R>) -> Self {
        Self {
            id,
            user_id,
            boundary,
            kind,
        }
    }

    /// Returns the dense handle of this surface
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Returns the user-facing id of this surface
    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    /// Returns the boundary condition attached to this surface
    pub fn boundary_type(&self) -> BoundaryType {
        self.boundary
    }

    /// Returns the analytic form of this surface
    pub fn kind(&self) -> &SurfaceKind<R> {
        &self.kind
    }

    /// Evaluates the signed implicit form at the given point
    ///
    /// Positive on the `+1` halfspace side, negative on the `-1` side. Points in the plane of the
    /// 2-D geometry sit at `z = 0`, so an axial plane evaluates to `-z`.
    pub fn evaluate(&self, point: &Point2<R>) -> R {
        match self.kind {
            SurfaceKind::Plane { a, b, c } => a * point.x + b * point.y + c,
            SurfaceKind::XPlane { x } => point.x - x,
            SurfaceKind::YPlane { y } => point.y - y,
            SurfaceKind::ZPlane { z } => -z,
            SurfaceKind::Circle { x0, y0, radius } => {
                let dx = point.x - x0;
                let dy = point.y - y0;
                dx * dx + dy * dy - radius * radius
            }
        }
    }

    /// Returns whether the given point lies on the surface within the on-surface tolerance
    pub fn on_surface(&self, point: &Point2<R>) -> bool {
        self.evaluate(point).abs() < R::from_f64(ON_SURFACE_THRESH).unwrap()
    }

    /// Computes the forward intersections of the ray from `point` at azimuthal angle `theta`
    ///
    /// Returns zero, one or two points, each satisfying the implicit form within the on-surface
    /// tolerance and lying in front of the ray.
    pub fn intersection(&self, point: &Point2<R>, theta: R) -> ArrayVec<Point2<R>, 2> {
        let mut hits = ArrayVec::new();
        match self.kind {
            SurfaceKind::ZPlane { .. } => {}
            SurfaceKind::Circle { x0, y0, radius } => {
                circle_intersection(point, theta, x0, y0, radius, &mut hits)
            }
            _ => {
                let (a, b, c) = self.kind.plane_coefficients().unwrap();
                plane_intersection(point, theta, a, b, c, &mut hits)
            }
        }
        hits
    }

    /// Returns the nearest forward intersection of the ray and its Euclidean distance, `None`
    /// when the ray misses the surface
    pub fn min_distance(&self, point: &Point2<R>, theta: R) -> Option<(R, Point2<R>)> {
        let mut nearest: Option<(R, Point2<R>)> = None;
        for hit in self.intersection(point, theta) {
            let dist = (hit - point).norm();
            if nearest.map_or(true, |(d, _)| dist < d) {
                nearest = Some((dist, hit));
            }
        }
        nearest
    }

    /// Returns the axis-aligned extent of the surface, infinite for unbounded kinds
    pub fn extent(&self) -> AxisAlignedBoundingBox2d<R> {
        match self.kind {
            SurfaceKind::XPlane { x } => AxisAlignedBoundingBox2d::new(
                Point2::new(x, -R::infinity()),
                Point2::new(x, R::infinity()),
            ),
            SurfaceKind::YPlane { y } => AxisAlignedBoundingBox2d::new(
                Point2::new(-R::infinity(), y),
                Point2::new(R::infinity(), y),
            ),
            SurfaceKind::Circle { x0, y0, radius } => AxisAlignedBoundingBox2d::new(
                Point2::new(x0 - radius, y0 - radius),
                Point2::new(x0 + radius, y0 + radius),
            ),
            SurfaceKind::Plane { .. } | SurfaceKind::ZPlane { .. } => {
                AxisAlignedBoundingBox2d::unbounded()
            }
        }
    }

    /// Returns the smallest x coordinate covered by the surface
    pub fn xmin(&self) -> R {
        self.extent().min().x
    }

    /// Returns the largest x coordinate covered by the surface
    pub fn xmax(&self) -> R {
        self.extent().max().x
    }

    /// Returns the smallest y coordinate covered by the surface
    pub fn ymin(&self) -> R {
        self.extent().min().y
    }

    /// Returns the largest y coordinate covered by the surface
    pub fn ymax(&self) -> R {
        self.extent().max().y
    }
}

/// Whether the ray at angle `theta` takes the dedicated vertical branch
fn is_vertical_ray<R: Real>(theta: R) -> bool {
    let thresh = R::from_f64(VERTICAL_RAY_THRESH).unwrap();
    (theta - R::frac_pi_2()).abs() < thresh
        || (theta - (R::pi() + R::frac_pi_2())).abs() < thresh
}

/// The y-monotonicity forward filter: candidates behind the ray are dropped
fn travels_forward<R: Real>(origin: &Point2<R>, theta: R, candidate: &Point2<R>) -> bool {
    (theta < R::pi() && candidate.y > origin.y) || (theta > R::pi() && candidate.y < origin.y)
}

fn push_forward<R: Real>(
    origin: &Point2<R>,
    theta: R,
    candidate: Point2<R>,
    hits: &mut ArrayVec<Point2<R>, 2>,
) {
    if travels_forward(origin, theta, &candidate) {
        hits.push(candidate);
    }
}

fn plane_intersection<R: Real>(
    origin: &Point2<R>,
    theta: R,
    a: R,
    b: R,
    c: R,
    hits: &mut ArrayVec<Point2<R>, 2>,
) {
    if is_vertical_ray(theta) {
        // A vertical ray misses a vertical plane; otherwise solve at the fixed x
        if b != R::zero() {
            let y = (-a * origin.x - c) / b;
            push_forward(origin, theta, Point2::new(origin.x, y), hits);
        }
        return;
    }

    let m = theta.tan();
    if b != R::zero() && ((-a / b) - m).abs() < R::from_f64(PARALLEL_THRESH).unwrap() {
        return;
    }

    let denom = a + b * m;
    if denom == R::zero() {
        return;
    }
    let x = (b * (m * origin.x - origin.y) - c) / denom;
    let y = origin.y + m * (x - origin.x);
    push_forward(origin, theta, Point2::new(x, y), hits);
}

fn circle_intersection<R: Real>(
    origin: &Point2<R>,
    theta: R,
    x0: R,
    y0: R,
    radius: R,
    hits: &mut ArrayVec<Point2<R>, 2>,
) {
    let two = R::from_f64(2.0).unwrap();
    let four = R::from_f64(4.0).unwrap();

    if is_vertical_ray(theta) {
        // Quadratic in y at the fixed x of the ray
        let dx = origin.x - x0;
        let qb = -two * y0;
        let qc = y0 * y0 + dx * dx - radius * radius;
        let disc = qb * qb - four * qc;
        if disc < R::zero() {
            return;
        }
        let root = disc.sqrt();
        push_forward(origin, theta, Point2::new(origin.x, (-qb + root) / two), hits);
        if disc > R::zero() {
            push_forward(origin, theta, Point2::new(origin.x, (-qb - root) / two), hits);
        }
        return;
    }

    let m = theta.tan();
    let k = origin.y - m * origin.x - y0;
    let qa = R::one() + m * m;
    let qb = two * (m * k - x0);
    let qc = x0 * x0 + k * k - radius * radius;
    let disc = qb * qb - four * qa * qc;
    if disc < R::zero() {
        return;
    }
    let root = disc.sqrt();
    let x1 = (-qb + root) / (two * qa);
    push_forward(
        origin,
        theta,
        Point2::new(x1, origin.y + m * (x1 - origin.x)),
        hits,
    );
    if disc > R::zero() {
        let x2 = (-qb - root) / (two * qa);
        push_forward(
            origin,
            theta,
            Point2::new(x2, origin.y + m * (x2 - origin.x)),
            hits,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn surface(kind: SurfaceKind<f64>) -> Surface<f64> {
        Surface::new(SurfaceId(0), 1, BoundaryType::None, kind)
    }

    #[test]
    fn plane_evaluate_signs() {
        let s = surface(SurfaceKind::XPlane { x: 2.0 });
        assert!(s.evaluate(&Point2::new(3.0, 0.0)) > 0.0);
        assert!(s.evaluate(&Point2::new(1.0, 0.0)) < 0.0);
        assert!(s.on_surface(&Point2::new(2.0, 5.0)));
    }

    #[test]
    fn circle_evaluate_signs() {
        let s = surface(SurfaceKind::Circle {
            x0: 0.0,
            y0: 0.0,
            radius: 1.0,
        });
        assert!(s.evaluate(&Point2::new(0.0, 0.0)) < 0.0);
        assert!(s.evaluate(&Point2::new(2.0, 0.0)) > 0.0);
        assert!(s.on_surface(&Point2::new(1.0, 0.0)));
    }

    #[test]
    fn diagonal_ray_hits_vertical_plane() {
        let s = surface(SurfaceKind::Plane {
            a: 1.0,
            b: 0.0,
            c: -2.0,
        });
        let (dist, hit) = s.min_distance(&Point2::new(0.0, 0.0), FRAC_PI_4).unwrap();
        assert!((hit.x - 2.0).abs() < 1.0e-12);
        assert!((hit.y - 2.0).abs() < 1.0e-12);
        assert!((dist - 2.0 * 2.0f64.sqrt()).abs() < 1.0e-12);
    }

    #[test]
    fn backward_candidates_are_filtered() {
        let s = surface(SurfaceKind::Plane {
            a: 1.0,
            b: 0.0,
            c: -2.0,
        });
        // Same plane, but the ray points away from it
        assert!(s.intersection(&Point2::new(0.0, 0.0), 5.0 * PI / 4.0).is_empty());
    }

    #[test]
    fn parallel_ray_misses_plane() {
        let s = surface(SurfaceKind::YPlane { y: 1.0 });
        // Slope of the ray differs from the plane slope by less than the parallel threshold
        assert!(s.intersection(&Point2::new(0.0, 0.0), 1.0e-13).is_empty());
    }

    #[test]
    fn vertical_ray_through_circle() {
        let s = surface(SurfaceKind::Circle {
            x0: 0.0,
            y0: 0.0,
            radius: 1.0,
        });
        // From below the circle both intersections are ahead
        let hits = s.intersection(&Point2::new(0.0, -2.0), FRAC_PI_2);
        assert_eq!(hits.len(), 2);
        for hit in &hits {
            assert!(s.on_surface(hit));
        }
        let (dist, hit) = s.min_distance(&Point2::new(0.0, -2.0), FRAC_PI_2).unwrap();
        assert!((dist - 1.0).abs() < 1.0e-12);
        assert!((hit.y + 1.0).abs() < 1.0e-12);

        // From the center only the upper intersection is ahead
        let hits = s.intersection(&Point2::new(0.0, 0.0), FRAC_PI_2);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].y - 1.0).abs() < 1.0e-12);

        // Downward ray from above sees both
        let hits = s.intersection(&Point2::new(0.0, 2.0), PI + FRAC_PI_2);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn vertical_ray_misses_offset_circle() {
        let s = surface(SurfaceKind::Circle {
            x0: 0.0,
            y0: 0.0,
            radius: 1.0,
        });
        assert!(s.intersection(&Point2::new(5.0, -2.0), FRAC_PI_2).is_empty());
        assert!(s.min_distance(&Point2::new(5.0, -2.0), FRAC_PI_2).is_none());
    }

    #[test]
    fn oblique_ray_through_circle() {
        let s = surface(SurfaceKind::Circle {
            x0: 1.0,
            y0: 1.0,
            radius: 0.5,
        });
        let hits = s.intersection(&Point2::new(0.0, 0.0), FRAC_PI_4);
        assert_eq!(hits.len(), 2);
        for hit in &hits {
            assert!(s.on_surface(hit));
            assert!(hit.y > 0.0);
        }
    }

    #[test]
    fn axial_plane_is_never_intersected() {
        let s = surface(SurfaceKind::ZPlane { z: 1.0 });
        assert!(s.intersection(&Point2::new(0.0, 0.0), FRAC_PI_4).is_empty());
        assert_eq!(s.evaluate(&Point2::new(0.0, 0.0)), -1.0);
    }

    #[test]
    fn extents() {
        let s = surface(SurfaceKind::Circle {
            x0: 1.0,
            y0: -1.0,
            radius: 2.0,
        });
        assert_eq!(s.xmin(), -1.0);
        assert_eq!(s.xmax(), 3.0);
        assert_eq!(s.ymin(), -3.0);
        assert_eq!(s.ymax(), 1.0);

        let s = surface(SurfaceKind::XPlane { x: 2.0 });
        assert_eq!(s.xmin(), 2.0);
        assert_eq!(s.xmax(), 2.0);
        assert_eq!(s.ymin(), -f64::INFINITY);
        assert_eq!(s.ymax(), f64::INFINITY);
    }
}
