pub mod config;
pub mod error;
pub mod plate_detection;

pub use config::ReaderConfig;
pub use error::{PlateError, Result};
pub use plate_detection::detector::{detect_plates, DnnPlatePredictor, PlatePredictor};
pub use plate_detection::recognition::{
    CharacterClassifier, DnnCharacterClassifier, PlateReader, PlateReading,
};
pub use plate_detection::segmentation::{segment_characters, Glyph};
pub use plate_detection::{PlateCrop, PlateLayout};
