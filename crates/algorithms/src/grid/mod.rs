//! Grid system operations: sampling kernels, target grids, resampling and mosaicking

mod fit;
mod interpolation;
mod mosaic;
mod resample;

pub use fit::{GridFit, TargetGrid};
pub use interpolation::Interpolation;
pub use mosaic::{mosaic, MatchMode, MosaicParams, OverlapMode};
pub use resample::{resample, ResampleParams};
