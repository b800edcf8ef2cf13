//! Helper types for abstracting over the floating point precision of the solver

use std::fmt::Debug;

use bytemuck::Pod;
use nalgebra::RealField;
use num::{FromPrimitive, NumCast, ToPrimitive};

/// Trait that has to be implemented by types that are shared or sent between threads
pub trait ThreadSafe: Sync + Send {}
impl<T> ThreadSafe for T where T: Sync + Send {}

/// Trait for the scalar type used in all geometry and transport computations
pub trait Real:
    RealField + Copy + FromPrimitive + ToPrimitive + NumCast + Debug + Default + Pod + ThreadSafe
{
    /// Tries to convert this value to another [Real] type, returns None if it cannot be represented
    fn try_convert<T: Real>(self) -> Option<T> {
        T::from_f64(self.to_f64()?)
    }

    /// The positive infinity of this type
    fn infinity() -> Self;
}

impl Real for f32 {
    fn infinity() -> Self {
        f32::INFINITY
    }
}

impl Real for f64 {
    fn infinity() -> Self {
        f64::INFINITY
    }
}
