//! Stage sequencing for a slope classification run

use crate::error::{PipelineError, Result};
use crate::feedback::Feedback;
use crate::params::PipelineParams;
use crate::processor::{
    CalculatorRequest, Geoprocessor, MosaicRequest, PolygonizeRequest, ResampleRequest,
    SlopeRequest,
};
use serde::Serialize;
use slopeclass_algorithms::grid::{GridFit, Interpolation, MatchMode, OverlapMode};
use slopeclass_core::raster::DataType;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Slope bands: every threshold (0, 5, 10, 15, 20, 30 percent) reached adds one
pub const CLASSIFICATION_FORMULA: &str = "(or(gt(a,0),eq(a,0)))+(or(gt(a,5),eq(a,5)))+(or(gt(a,10),eq(a,10)))+(or(gt(a,15),eq(a,15)))+(or(gt(a,20),eq(a,20)))+(or(gt(a,30),eq(a,30)))";

/// Feathering distance passed to the mosaic step (cells)
pub const BLEND_DISTANCE: f64 = 8.0;

/// Steps of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Mosaic,
    Resample,
    Slope,
    Classify,
    Vectorize,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Mosaic,
        Stage::Resample,
        Stage::Slope,
        Stage::Classify,
        Stage::Vectorize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Mosaic => "mosaic",
            Stage::Resample => "resample",
            Stage::Slope => "slope",
            Stage::Classify => "classify",
            Stage::Vectorize => "vectorize",
        }
    }

    /// Key of the stage's artifact in [`PipelineResult`]
    pub fn result_key(&self) -> &'static str {
        match self {
            Stage::Mosaic => "MOSAICKED",
            Stage::Resample => "RESAMPLED",
            Stage::Slope => "SLOPE",
            Stage::Classify => "CLASSEDSLOPE",
            Stage::Vectorize => "VECTORSLOPE",
        }
    }

    /// Reported once the stage has completed
    pub fn progress_text(&self) -> &'static str {
        match self {
            Stage::Mosaic => "Mosaicking finished",
            Stage::Resample => "Resampling finished",
            Stage::Slope => "Slope calculated",
            Stage::Classify => "Slope classified",
            Stage::Vectorize => "Slope vectorized",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Artifact paths of a completed run, keyed by `MOSAICKED`, `RESAMPLED`,
/// `SLOPE`, `CLASSEDSLOPE` and `VECTORSLOPE`.
///
/// Empty when the run was canceled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PipelineResult {
    outputs: BTreeMap<String, PathBuf>,
}

impl PipelineResult {
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn get(&self, key: &str) -> Option<&Path> {
        self.outputs.get(key).map(PathBuf::as_path)
    }

    /// Artifact of a stage
    pub fn artifact(&self, stage: Stage) -> Option<&Path> {
        self.get(stage.result_key())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    fn insert(&mut self, stage: Stage, path: PathBuf) {
        self.outputs.insert(stage.result_key().to_string(), path);
    }
}

/// Run a stage, tagging a failure with the stage it came from
fn run_stage<F>(stage: Stage, op: F) -> Result<PathBuf>
where
    F: FnOnce() -> slopeclass_core::Result<PathBuf>,
{
    info!("Running {} stage", stage);
    let path = op().map_err(|source| PipelineError::Stage { stage, source })?;
    debug!("{} stage wrote {}", stage, path.display());
    Ok(path)
}

/// Stop after `stage` if canceled, otherwise report its progress text
fn checkpoint<B: Feedback + ?Sized>(stage: Stage, feedback: &B) -> bool {
    if feedback.is_canceled() {
        info!("Canceled after {} stage", stage);
        return true;
    }
    feedback.set_progress_text(stage.progress_text());
    false
}

/// Mosaic, resample, slope, classify and vectorize.
///
/// Each stage's output feeds the next. Cancellation is checked before the
/// first stage and after every stage; a canceled run returns an empty
/// result and leaves already written artifacts on disk. The first failing
/// stage aborts the run.
pub fn run_pipeline<P, B>(params: &PipelineParams, processor: &P, feedback: &B) -> Result<PipelineResult>
where
    P: Geoprocessor + ?Sized,
    B: Feedback + ?Sized,
{
    params.validate()?;
    let outputs = &params.outputs;
    let mut result = PipelineResult::default();

    if feedback.is_canceled() {
        info!("Canceled before the first stage");
        return Ok(PipelineResult::default());
    }

    // 1. Mosaic the tiles at their own grain
    let request = MosaicRequest {
        grids: params.inputs.clone(),
        data_type: DataType::Float32,
        resampling: Interpolation::Bilinear,
        overlap: OverlapMode::Mean,
        blend_distance: BLEND_DISTANCE,
        matching: MatchMode::None,
        cell_size: params.original_grain,
        fit: GridFit::Cells,
        output: outputs.mosaicked.clone(),
    };
    debug!("{:?}", request);
    let mosaicked = run_stage(Stage::Mosaic, || processor.mosaic(&request))?;
    result.insert(Stage::Mosaic, mosaicked.clone());
    if checkpoint(Stage::Mosaic, feedback) {
        return Ok(PipelineResult::default());
    }

    // 2. Resample only when the grains differ
    let resampled = if params.needs_resampling() {
        let request = ResampleRequest {
            input: mosaicked,
            keep_type: true,
            scale_up: Interpolation::BSpline,
            scale_down: Interpolation::BSpline,
            cell_size: params.desired_grain,
            fit: GridFit::Cells,
            output: outputs.resampled.clone(),
        };
        debug!("{:?}", request);
        run_stage(Stage::Resample, || processor.resample(&request))?
    } else {
        warn!(
            "Original and desired grain are both {}; skipping resampling, {} stands in for {}",
            params.desired_grain,
            mosaicked.display(),
            outputs.resampled.display()
        );
        mosaicked
    };
    result.insert(Stage::Resample, resampled.clone());
    if checkpoint(Stage::Resample, feedback) {
        return Ok(PipelineResult::default());
    }

    // 3. Percent slope
    let request = SlopeRequest {
        input: resampled,
        band: 1,
        scale: 1.0,
        as_percent: true,
        compute_edges: false,
        zevenbergen: false,
        output: outputs.slope.clone(),
    };
    debug!("{:?}", request);
    let slope = run_stage(Stage::Slope, || processor.slope(&request))?;
    result.insert(Stage::Slope, slope.clone());
    if checkpoint(Stage::Slope, feedback) {
        return Ok(PipelineResult::default());
    }

    // 4. Slope bands
    let request = CalculatorRequest {
        grids: vec![slope],
        formula: CLASSIFICATION_FORMULA.to_string(),
        interpolation: Interpolation::BSpline,
        use_nodata: false,
        data_type: DataType::Float32,
        output: outputs.classed_slope.clone(),
    };
    debug!("{:?}", request);
    let classes = run_stage(Stage::Classify, || processor.raster_calculator(&request))?;
    result.insert(Stage::Classify, classes.clone());
    if checkpoint(Stage::Classify, feedback) {
        return Ok(PipelineResult::default());
    }

    // 5. Polygons of equal band
    let request = PolygonizeRequest {
        input: classes,
        band: 1,
        field: "class".to_string(),
        eight_connectedness: false,
        output: outputs.vector_slope.clone(),
    };
    debug!("{:?}", request);
    let polygons = run_stage(Stage::Vectorize, || processor.polygonize(&request))?;
    result.insert(Stage::Vectorize, polygons);
    if checkpoint(Stage::Vectorize, feedback) {
        return Ok(PipelineResult::default());
    }

    info!("Pipeline finished: {} artifact(s)", result.len());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_keys_and_texts() {
        let keys: Vec<_> = Stage::ALL.iter().map(Stage::result_key).collect();
        assert_eq!(
            keys,
            ["MOSAICKED", "RESAMPLED", "SLOPE", "CLASSEDSLOPE", "VECTORSLOPE"]
        );
        assert_eq!(Stage::Classify.progress_text(), "Slope classified");
        assert_eq!(Stage::Vectorize.to_string(), "vectorize");
    }

    #[test]
    fn test_result_serializes_as_map() {
        let mut result = PipelineResult::default();
        result.insert(Stage::Mosaic, PathBuf::from("m.tif"));
        result.insert(Stage::Slope, PathBuf::from("s.tif"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["MOSAICKED"], "m.tif");
        assert_eq!(json["SLOPE"], "s.tif");
        assert_eq!(result.artifact(Stage::Slope), Some(Path::new("s.tif")));
        assert!(result.get("RESAMPLED").is_none());
    }

    #[test]
    fn test_formula_parses() {
        let formula = slopeclass_algorithms::calculator::Formula::parse(CLASSIFICATION_FORMULA).unwrap();
        assert_eq!(formula.grid_count(), 1);
        assert_eq!(formula.evaluate(&[12.0]), 3.0);
    }
}
