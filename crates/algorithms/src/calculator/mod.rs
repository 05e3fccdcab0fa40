//! Raster calculator: formula parsing and per-cell evaluation

mod formula;
mod raster_calculator;

pub use formula::Formula;
pub use raster_calculator::{raster_calculator, CalculatorParams};
