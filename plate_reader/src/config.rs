use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PlateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Cells whose plate probability exceeds this become candidates.
    pub confidence_threshold: f32,
    /// Overlap above which a lower-confidence candidate is dropped.
    pub nms_iou_threshold: f64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_iou_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Upper bound for the network-side length of the smaller image side.
    pub max_dimension: i32,
    /// Baseline for the smaller image side, scaled up by the aspect ratio.
    pub min_dimension: i32,
    #[serde(flatten)]
    pub reconstruction: ReconstructionConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_dimension: 608,
            min_dimension: 256,
            reconstruction: ReconstructionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Gaussian kernel side, must be odd.
    pub blur_kernel: i32,
    pub dilation_kernel: i32,
    /// Accepted height/width range of a character box.
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Minimum character height as a fraction of the plate height.
    pub min_height_fraction: f64,
    pub glyph_width: i32,
    pub glyph_height: i32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 7,
            dilation_kernel: 3,
            min_aspect: 1.0,
            max_aspect: 3.5,
            min_height_fraction: 0.5,
            glyph_width: 30,
            glyph_height: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub detection: DetectionConfig,
    pub segmentation: SegmentationConfig,
}

impl ReaderConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: ReaderConfig = serde_json::from_str(&contents).map_err(|e| {
            PlateError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        self.segmentation.validate()
    }
}

impl ReconstructionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PlateError::Config(format!(
                "confidence_threshold must lie in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.nms_iou_threshold) {
            return Err(PlateError::Config(format!(
                "nms_iou_threshold must lie in [0, 1], got {}",
                self.nms_iou_threshold
            )));
        }
        Ok(())
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_dimension <= 0 || self.max_dimension <= 0 {
            return Err(PlateError::Config(format!(
                "dimensions must be positive, got min {} max {}",
                self.min_dimension, self.max_dimension
            )));
        }
        if self.min_dimension > self.max_dimension {
            return Err(PlateError::Config(format!(
                "min_dimension {} exceeds max_dimension {}",
                self.min_dimension, self.max_dimension
            )));
        }
        self.reconstruction.validate()
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.blur_kernel <= 0 || self.blur_kernel % 2 == 0 {
            return Err(PlateError::Config(format!(
                "blur_kernel must be positive and odd, got {}",
                self.blur_kernel
            )));
        }
        if self.dilation_kernel <= 0 {
            return Err(PlateError::Config(format!(
                "dilation_kernel must be positive, got {}",
                self.dilation_kernel
            )));
        }
        if self.min_aspect > self.max_aspect {
            return Err(PlateError::Config(format!(
                "min_aspect {} exceeds max_aspect {}",
                self.min_aspect, self.max_aspect
            )));
        }
        if self.glyph_width <= 0 || self.glyph_height <= 0 {
            return Err(PlateError::Config(format!(
                "glyph size must be positive, got {}x{}",
                self.glyph_width, self.glyph_height
            )));
        }
        Ok(())
    }
}
