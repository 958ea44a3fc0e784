use thiserror::Error;

/// Everything that can go wrong while turning an image into plate crops.
#[derive(Debug, Error)]
pub enum PlateError {
    /// Nothing above the confidence threshold survived decoding.
    #[error("no license plate found")]
    NoPlateFound,

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// The external predictor returned a tensor we cannot decode.
    #[error("predictor output shape mismatch: expected {expected}, got {actual}")]
    PredictorShapeMismatch { expected: String, actual: String },

    #[error("input image is empty")]
    EmptyImage,

    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlateError {
    pub fn is_no_plate(&self) -> bool {
        matches!(self, PlateError::NoPlateFound)
    }
}

pub type Result<T> = std::result::Result<T, PlateError>;
