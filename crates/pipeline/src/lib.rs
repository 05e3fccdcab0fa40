//! # slopeclass pipeline
//!
//! Turns a set of overlapping DEM tiles into slope-class polygons:
//!
//! 1. mosaic the tiles at their original grain
//! 2. resample to the desired grain (skipped when the grains are equal)
//! 3. percent slope
//! 4. classify slope into bands 0-6
//! 5. vectorize the bands
//!
//! The orchestrator only sequences the steps. Each step is delegated to a
//! [`Geoprocessor`]; [`NativeProcessor`] runs them with
//! `slopeclass-algorithms`. Progress and cancellation go through a
//! [`Feedback`] object and are handled between steps.

mod error;
mod feedback;
mod native;
mod orchestrator;
mod params;
mod processor;

pub use error::{PipelineError, Result};
pub use feedback::{Feedback, LogFeedback};
pub use native::NativeProcessor;
pub use orchestrator::{run_pipeline, PipelineResult, Stage, BLEND_DISTANCE, CLASSIFICATION_FORMULA};
pub use params::{OutputPaths, PipelineParams};
pub use processor::{
    CalculatorRequest, Geoprocessor, MosaicRequest, PolygonizeRequest, ResampleRequest,
    SlopeRequest,
};
