//! Integration tests for the pipeline orchestrator.
//!
//! Sequencing and cancellation are checked against a recording processor;
//! the end-to-end runs use `NativeProcessor` on synthetic GeoTIFF tiles in a
//! temporary directory.

use slopeclass_core::io::{read_geotiff, write_geotiff, GeoTiffOptions};
use slopeclass_core::raster::{DataType, GeoTransform, Raster};
use slopeclass_core::{Error, CRS};
use slopeclass_pipeline::{
    run_pipeline, CalculatorRequest, Feedback, Geoprocessor, LogFeedback, MosaicRequest,
    NativeProcessor, OutputPaths, PipelineError, PipelineParams, PolygonizeRequest,
    ResampleRequest, SlopeRequest, Stage, CLASSIFICATION_FORMULA,
};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Records every call and echoes the requested output path
#[derive(Default)]
struct RecordingProcessor {
    calls: RefCell<Vec<(Stage, PathBuf)>>,
    fail_at: Option<Stage>,
}

impl RecordingProcessor {
    fn failing_at(stage: Stage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Default::default()
        }
    }

    fn record(&self, stage: Stage, input: &Path, output: &Path) -> slopeclass_core::Result<PathBuf> {
        self.calls.borrow_mut().push((stage, input.to_path_buf()));
        if self.fail_at == Some(stage) {
            return Err(Error::Algorithm(format!("{} exploded", stage)));
        }
        Ok(output.to_path_buf())
    }

    fn stages(&self) -> Vec<Stage> {
        self.calls.borrow().iter().map(|(s, _)| *s).collect()
    }

    fn input_of(&self, stage: Stage) -> Option<PathBuf> {
        self.calls
            .borrow()
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, p)| p.clone())
    }
}

impl Geoprocessor for RecordingProcessor {
    fn mosaic(&self, request: &MosaicRequest) -> slopeclass_core::Result<PathBuf> {
        assert_eq!(request.blend_distance, 8.0);
        assert_eq!(request.data_type, DataType::Float32);
        self.record(Stage::Mosaic, &request.grids[0], &request.output)
    }

    fn resample(&self, request: &ResampleRequest) -> slopeclass_core::Result<PathBuf> {
        assert!(request.keep_type);
        self.record(Stage::Resample, &request.input, &request.output)
    }

    fn slope(&self, request: &SlopeRequest) -> slopeclass_core::Result<PathBuf> {
        assert!(request.as_percent && !request.compute_edges && !request.zevenbergen);
        assert_eq!((request.band, request.scale), (1, 1.0));
        self.record(Stage::Slope, &request.input, &request.output)
    }

    fn raster_calculator(&self, request: &CalculatorRequest) -> slopeclass_core::Result<PathBuf> {
        assert_eq!(request.formula, CLASSIFICATION_FORMULA);
        assert!(!request.use_nodata);
        self.record(Stage::Classify, &request.grids[0], &request.output)
    }

    fn polygonize(&self, request: &PolygonizeRequest) -> slopeclass_core::Result<PathBuf> {
        assert_eq!(request.field, "class");
        assert!(!request.eight_connectedness);
        self.record(Stage::Vectorize, &request.input, &request.output)
    }
}

/// Reports cancellation from the `cancel_at`-th poll on (poll 0 precedes the
/// first stage, poll k follows stage k)
struct ScriptedFeedback {
    cancel_at: Option<usize>,
    polls: Cell<usize>,
    texts: RefCell<Vec<String>>,
}

impl ScriptedFeedback {
    fn new(cancel_at: Option<usize>) -> Self {
        Self {
            cancel_at,
            polls: Cell::new(0),
            texts: RefCell::new(Vec::new()),
        }
    }

    fn never() -> Self {
        Self::new(None)
    }

    fn cancel_at(poll: usize) -> Self {
        Self::new(Some(poll))
    }

    fn texts(&self) -> Vec<String> {
        self.texts.borrow().clone()
    }
}

impl Feedback for ScriptedFeedback {
    fn set_progress_text(&self, text: &str) {
        self.texts.borrow_mut().push(text.to_string());
    }

    fn is_canceled(&self) -> bool {
        let poll = self.polls.get();
        self.polls.set(poll + 1);
        self.cancel_at.is_some_and(|k| poll >= k)
    }
}

fn params(dir: &Path, original: f64, desired: f64) -> PipelineParams {
    let mut params = PipelineParams::new(
        vec![dir.join("west.tif"), dir.join("east.tif")],
        OutputPaths::in_dir(dir),
    );
    params.original_grain = original;
    params.desired_grain = desired;
    params
}

// ---------------------------------------------------------------------------
// Sequencing
// ---------------------------------------------------------------------------

#[test]
fn all_stages_run_in_order() {
    let processor = RecordingProcessor::default();
    let feedback = ScriptedFeedback::never();
    let p = params(Path::new("work"), 1.0, 2.0);

    let result = run_pipeline(&p, &processor, &feedback).unwrap();

    assert_eq!(processor.stages(), Stage::ALL.to_vec());
    assert_eq!(result.len(), 5);
    assert_eq!(result.get("MOSAICKED"), Some(p.outputs.mosaicked.as_path()));
    assert_eq!(result.get("RESAMPLED"), Some(p.outputs.resampled.as_path()));
    assert_eq!(result.get("VECTORSLOPE"), Some(p.outputs.vector_slope.as_path()));
    assert_eq!(
        feedback.texts(),
        [
            "Mosaicking finished",
            "Resampling finished",
            "Slope calculated",
            "Slope classified",
            "Slope vectorized"
        ]
    );

    // Each output feeds the next stage
    assert_eq!(processor.input_of(Stage::Resample), Some(p.outputs.mosaicked.clone()));
    assert_eq!(processor.input_of(Stage::Slope), Some(p.outputs.resampled.clone()));
    assert_eq!(processor.input_of(Stage::Classify), Some(p.outputs.slope.clone()));
    assert_eq!(processor.input_of(Stage::Vectorize), Some(p.outputs.classed_slope.clone()));
}

#[test]
fn equal_grains_skip_resampling() {
    let processor = RecordingProcessor::default();
    let feedback = ScriptedFeedback::never();
    let p = params(Path::new("work"), 2.0, 2.0);

    let result = run_pipeline(&p, &processor, &feedback).unwrap();

    assert!(!processor.stages().contains(&Stage::Resample));
    assert_eq!(result.get("RESAMPLED"), result.get("MOSAICKED"));
    assert_eq!(processor.input_of(Stage::Slope), Some(p.outputs.mosaicked.clone()));
    // Progress is still reported for the skipped stage
    assert_eq!(feedback.texts().len(), 5);
}

#[test]
fn canceled_before_first_stage() {
    let processor = RecordingProcessor::default();
    let feedback = ScriptedFeedback::cancel_at(0);

    let result = run_pipeline(&params(Path::new("work"), 1.0, 2.0), &processor, &feedback).unwrap();

    assert!(result.is_empty());
    assert!(processor.stages().is_empty());
    assert!(feedback.texts().is_empty());
}

#[test]
fn canceled_between_stages() {
    for k in 1..=5 {
        let processor = RecordingProcessor::default();
        let feedback = ScriptedFeedback::cancel_at(k);

        let result = run_pipeline(&params(Path::new("work"), 1.0, 2.0), &processor, &feedback).unwrap();

        assert!(result.is_empty(), "canceled after stage {}", k);
        assert_eq!(processor.stages(), Stage::ALL[..k].to_vec());
        assert_eq!(feedback.texts().len(), k - 1);
    }
}

#[test]
fn stage_failure_aborts() {
    let processor = RecordingProcessor::failing_at(Stage::Slope);
    let feedback = ScriptedFeedback::never();

    let err = run_pipeline(&params(Path::new("work"), 1.0, 2.0), &processor, &feedback).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Slope));
    assert!(err.to_string().contains("slope exploded"), "{}", err);
    assert_eq!(processor.stages(), vec![Stage::Mosaic, Stage::Resample, Stage::Slope]);
    assert_eq!(feedback.texts(), ["Mosaicking finished", "Resampling finished"]);
}

#[test]
fn invalid_params_run_nothing() {
    let processor = RecordingProcessor::default();
    let feedback = ScriptedFeedback::never();
    let mut p = params(Path::new("work"), 1.0, 2.0);
    p.inputs.clear();

    let err = run_pipeline(&p, &processor, &feedback).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidParameter { name: "inputs", .. }));
    assert!(processor.stages().is_empty());
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

/// Hillside rising 0.12 per unit eastwards and 0.03 per unit northwards
fn write_tile(path: &Path, min_x: f64, cols: usize) {
    let rows = 30;
    let mut dem = Raster::new(rows, cols);
    dem.set_transform(GeoTransform::north_up(min_x, 30.0, 1.0));
    dem.set_crs(Some(CRS::from_epsg(25830)));
    for r in 0..rows {
        for c in 0..cols {
            let (x, y) = dem.pixel_to_geo(c, r);
            dem.set(r, c, 800.0 + 0.12 * x + 0.03 * y).unwrap();
        }
    }
    write_geotiff(&dem, path, Some(GeoTiffOptions::with_data_type(DataType::Float32))).unwrap();
}

fn write_tiles(dir: &Path) {
    write_tile(&dir.join("west.tif"), 0.0, 24);
    write_tile(&dir.join("east.tif"), 20.0, 20);
}

#[test]
fn end_to_end_with_native_processor() {
    let dir = tempfile::tempdir().unwrap();
    write_tiles(dir.path());
    let p = params(dir.path(), 1.0, 2.0);

    let result = run_pipeline(&p, &NativeProcessor, &LogFeedback::new()).unwrap();
    assert_eq!(result.len(), 5);
    for (key, path) in result.iter() {
        assert!(path.exists(), "{} missing at {}", key, path.display());
    }

    let mosaicked: Raster<f64> = read_geotiff(&p.outputs.mosaicked, None).unwrap();
    assert_eq!(mosaicked.shape(), (30, 40));

    let resampled: Raster<f64> = read_geotiff(&p.outputs.resampled, None).unwrap();
    assert_eq!(resampled.shape(), (15, 20));
    assert_eq!(resampled.cell_size(), 2.0);

    // gradient sqrt(0.12^2 + 0.03^2) = 12.37%
    let slope: Raster<f64> = read_geotiff(&p.outputs.slope, None).unwrap();
    let interior = slope.get(7, 10).unwrap();
    assert!((interior - 12.37).abs() < 0.1, "slope {}", interior);

    let classes: Raster<f64> = read_geotiff(&p.outputs.classed_slope, None).unwrap();
    assert_eq!(classes.get(7, 10).unwrap(), 3.0);
    for &v in classes.data().iter().filter(|v| !v.is_nan()) {
        assert!((0.0..=6.0).contains(&v), "class {}", v);
    }

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&p.outputs.vector_slope).unwrap()).unwrap();
    let features = doc["features"].as_array().unwrap();
    assert!(!features.is_empty());
    for feature in features {
        let class = feature["properties"]["class"].as_i64().unwrap();
        assert!((0..=6).contains(&class), "class {}", class);
    }
}

#[test]
fn end_to_end_equal_grains_writes_no_resampled_file() {
    let dir = tempfile::tempdir().unwrap();
    write_tiles(dir.path());
    let p = params(dir.path(), 1.0, 1.0);

    let result = run_pipeline(&p, &NativeProcessor, &LogFeedback::new()).unwrap();

    assert_eq!(result.get("RESAMPLED"), Some(p.outputs.mosaicked.as_path()));
    assert!(!p.outputs.resampled.exists());
    assert!(p.outputs.vector_slope.exists());
}

#[test]
fn end_to_end_cancellation_keeps_finished_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_tiles(dir.path());
    let p = params(dir.path(), 1.0, 2.0);

    let before = run_pipeline(&p, &NativeProcessor, &ScriptedFeedback::cancel_at(0)).unwrap();
    assert!(before.is_empty());
    assert!(!p.outputs.mosaicked.exists());

    let after_resample = run_pipeline(&p, &NativeProcessor, &ScriptedFeedback::cancel_at(2)).unwrap();
    assert!(after_resample.is_empty());
    assert!(p.outputs.mosaicked.exists());
    assert!(p.outputs.resampled.exists());
    assert!(!p.outputs.slope.exists());
    assert!(!p.outputs.vector_slope.exists());
}

#[test]
fn end_to_end_disjoint_tiles_fail_in_mosaic() {
    let dir = tempfile::tempdir().unwrap();
    write_tile(&dir.path().join("west.tif"), 0.0, 10);
    write_tile(&dir.path().join("east.tif"), 50.0, 10);
    let p = params(dir.path(), 1.0, 2.0);

    let err = run_pipeline(&p, &NativeProcessor, &LogFeedback::new()).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Mosaic));
    assert!(matches!(
        err,
        PipelineError::Stage {
            source: Error::NoOverlap { .. },
            ..
        }
    ));
}
