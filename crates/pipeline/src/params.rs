//! Pipeline parameters

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameters of one pipeline run.
///
/// Loaded once and never modified by the run. Field names also accept the
/// upper-case keys of the original processing model (`INPUT`,
/// `ORIGINALGRAIN`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    /// DEM tiles to mosaic
    #[serde(alias = "INPUT")]
    pub inputs: Vec<PathBuf>,

    pub outputs: OutputPaths,

    /// Cell size of the input tiles, in map units
    #[serde(default = "default_original_grain", alias = "ORIGINALGRAIN")]
    pub original_grain: f64,

    /// Cell size of the slope analysis, in map units
    #[serde(default = "default_desired_grain", alias = "DESIREDGRAIN")]
    pub desired_grain: f64,
}

fn default_original_grain() -> f64 {
    1.0
}

fn default_desired_grain() -> f64 {
    2.0
}

/// Destination of every artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPaths {
    #[serde(alias = "MOSAICKED")]
    pub mosaicked: PathBuf,
    /// Not written when no resampling is needed
    #[serde(alias = "RESAMPLED")]
    pub resampled: PathBuf,
    #[serde(alias = "SLOPE")]
    pub slope: PathBuf,
    #[serde(alias = "CLASSEDSLOPE")]
    pub classed_slope: PathBuf,
    #[serde(alias = "VECTORSLOPE")]
    pub vector_slope: PathBuf,
}

impl OutputPaths {
    /// Conventional file names inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            mosaicked: dir.join("mosaicked.tif"),
            resampled: dir.join("resampled.tif"),
            slope: dir.join("slope.tif"),
            classed_slope: dir.join("classed_slope.tif"),
            vector_slope: dir.join("slope_classes.geojson"),
        }
    }
}

impl PipelineParams {
    pub fn new(inputs: Vec<PathBuf>, outputs: OutputPaths) -> Self {
        Self {
            inputs,
            outputs,
            original_grain: default_original_grain(),
            desired_grain: default_desired_grain(),
        }
    }

    /// Load parameters from a YAML or JSON file.
    /// Format is detected from the extension (.yaml, .yml or .json).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_error = |reason: String| PipelineError::Config {
            path: path.display().to_string(),
            reason,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let params = match ext.as_str() {
            "json" => Self::from_json(&contents),
            // YAML is a superset of JSON
            _ => Self::from_yaml(&contents),
        };
        params.map_err(|e| match e {
            PipelineError::Config { reason, .. } => config_error(reason),
            other => other,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| PipelineError::Config {
            path: "<yaml>".into(),
            reason: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PipelineError::Config {
            path: "<json>".into(),
            reason: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| PipelineError::Config {
            path: "<yaml>".into(),
            reason: e.to_string(),
        })
    }

    /// Resampling runs only when the grains differ
    pub fn needs_resampling(&self) -> bool {
        self.original_grain != self.desired_grain
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(PipelineError::InvalidParameter {
                name: "inputs",
                reason: "at least one input raster is required".into(),
            });
        }
        for (name, grain) in [
            ("original_grain", self.original_grain),
            ("desired_grain", self.desired_grain),
        ] {
            if !(grain.is_finite() && grain > 0.0) {
                return Err(PipelineError::InvalidParameter {
                    name,
                    reason: format!("must be a positive number, got {}", grain),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
inputs:
  - tiles/n40w004.tif
  - tiles/n40w003.tif
outputs:
  mosaicked: out/mosaic.tif
  resampled: out/resampled.tif
  slope: out/slope.tif
  classed_slope: out/classes.tif
  vector_slope: out/classes.geojson
original_grain: 5
"#;

    #[test]
    fn test_yaml_with_defaults() {
        let params = PipelineParams::from_yaml(YAML).unwrap();
        assert_eq!(params.inputs.len(), 2);
        assert_eq!(params.original_grain, 5.0);
        assert_eq!(params.desired_grain, 2.0);
        assert_eq!(params.outputs.slope, PathBuf::from("out/slope.tif"));
        assert!(params.needs_resampling());
        params.validate().unwrap();
    }

    #[test]
    fn test_json_with_upper_case_keys() {
        let json = r#"{
            "INPUT": ["a.tif"],
            "ORIGINALGRAIN": 2.0,
            "DESIREDGRAIN": 2.0,
            "outputs": {
                "MOSAICKED": "m.tif",
                "RESAMPLED": "r.tif",
                "SLOPE": "s.tif",
                "CLASSEDSLOPE": "c.tif",
                "VECTORSLOPE": "v.geojson"
            }
        }"#;
        let params = PipelineParams::from_json(json).unwrap();
        assert_eq!(params.inputs, vec![PathBuf::from("a.tif")]);
        assert!(!params.needs_resampling());
        assert_eq!(params.outputs.vector_slope, PathBuf::from("v.geojson"));
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let params = PipelineParams::from_yaml(YAML).unwrap();

        let yaml_path = dir.path().join("params.yml");
        std::fs::write(&yaml_path, params.to_yaml().unwrap()).unwrap();
        assert_eq!(PipelineParams::from_file(&yaml_path).unwrap(), params);

        let json_path = dir.path().join("params.json");
        std::fs::write(&json_path, serde_json::to_string(&params).unwrap()).unwrap();
        assert_eq!(PipelineParams::from_file(&json_path).unwrap(), params);

        let missing = PipelineParams::from_file(dir.path().join("absent.yaml"));
        assert!(matches!(missing, Err(PipelineError::Config { .. })));
    }

    #[test]
    fn test_validation() {
        let mut params = PipelineParams::new(vec![], OutputPaths::in_dir("out"));
        assert!(matches!(
            params.validate(),
            Err(PipelineError::InvalidParameter { name: "inputs", .. })
        ));

        params.inputs.push("dem.tif".into());
        params.validate().unwrap();

        params.desired_grain = 0.0;
        assert!(matches!(
            params.validate(),
            Err(PipelineError::InvalidParameter { name: "desired_grain", .. })
        ));

        params.desired_grain = 2.0;
        params.original_grain = f64::NAN;
        assert!(params.validate().is_err());
    }
}
