//! Terrain analysis algorithms
//!
//! - Slope: rate of change of elevation

mod slope;

pub use slope::{slope, Slope, SlopeMethod, SlopeParams, SlopeUnits};
