use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FromPrimitive};

/// Marker trait for the base floating-point types (`f32`, `f64`).
///
/// Bundles the numeric and utility bounds required throughout gradfn.
/// Slot buffers, expression graphs and derivative functions are all
/// generic over this trait; only primitive float types implement it.
pub trait Float:
    NumFloat + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
}

impl Float for f32 {}
impl Float for f64 {}
