//! Axis-aligned bounding boxes for the two-dimensional geometry

use nalgebra::Point2;

use crate::Real;

/// A two-dimensional axis-aligned bounding box, possibly with infinite extents
#[derive(Clone, Debug, PartialEq)]
pub struct AxisAlignedBoundingBox2d<R: Real> {
    min: Point2<R>,
    max: Point2<R>,
}

impl<R: Real> AxisAlignedBoundingBox2d<R> {
    /// Constructs a bounding box with the given min and max corners
    pub fn new(min: Point2<R>, max: Point2<R>) -> Self {
        Self { min, max }
    }

    /// Constructs the bounding box of the whole plane
    pub fn unbounded() -> Self {
        Self {
            min: Point2::new(-R::infinity(), -R::infinity()),
            max: Point2::new(R::infinity(), R::infinity()),
        }
    }

    /// Returns the smallest box enclosing all given points, `None` for an empty slice
    pub fn from_points(points: &[Point2<R>]) -> Option<Self> {
        let first = points.first()?;
        let mut aabb = Self::new(*first, *first);
        for point in &points[1..] {
            aabb.join_point(point);
        }
        Some(aabb)
    }

    /// Returns the min corner
    pub fn min(&self) -> &Point2<R> {
        &self.min
    }

    /// Returns the max corner
    pub fn max(&self) -> &Point2<R> {
        &self.max
    }

    /// Returns whether the given point is inside of the box (inclusive bounds)
    pub fn contains_point(&self, point: &Point2<R>) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Grows the box in every direction by the given margin
    pub fn grow_uniformly(&mut self, margin: R) {
        self.min.x -= margin;
        self.min.y -= margin;
        self.max.x += margin;
        self.max.y += margin;
    }

    /// Enlarges the box to cover the given point
    pub fn join_point(&mut self, point: &Point2<R>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    /// Enlarges the box to cover the other box
    pub fn join(&mut self, other: &Self) {
        self.join_point(&other.min);
        self.join_point(&other.max);
    }
}
