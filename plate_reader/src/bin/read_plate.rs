use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use opencv::core::Vector;
use opencv::imgcodecs::{imread, imwrite, IMREAD_COLOR};
use opencv::prelude::*;
use plate_reader::plate_detection::recognition::classify_glyphs;
use plate_reader::{
    detect_plates, segment_characters, DnnCharacterClassifier, DnnPlatePredictor, PlateError,
    ReaderConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Finds the license plates in a single image and reads their characters.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to read.
    #[arg(long)]
    image: PathBuf,

    /// ONNX export of the plate detection network.
    #[arg(long)]
    detector: PathBuf,

    /// ONNX export of the character classifier. Without it only the glyph
    /// boxes are reported.
    #[arg(long, requires = "labels")]
    classifier: Option<PathBuf>,

    /// Class labels of the classifier, one per line.
    #[arg(long, requires = "classifier")]
    labels: Option<PathBuf>,

    /// JSON file overriding the default thresholds.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the rectified plates are written to.
    #[arg(long)]
    save_crops: Option<PathBuf>,

    #[arg(long)]
    gpu: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ReaderConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReaderConfig::default(),
    };

    let image_path = args.image.to_string_lossy();
    let image = imread(&image_path, IMREAD_COLOR)?;
    if image.empty() {
        bail!("could not read image {image_path}");
    }

    let mut predictor = DnnPlatePredictor::from_onnx(&args.detector, args.gpu)?;
    let mut classifier = match (&args.classifier, &args.labels) {
        (Some(model), Some(labels)) => Some(DnnCharacterClassifier::from_files(
            model, labels, args.gpu,
        )?),
        _ => None,
    };

    let crops = match detect_plates(&mut predictor, &image, &config.detection) {
        Ok(crops) => crops,
        Err(PlateError::NoPlateFound) => {
            warn!("no plate found in {image_path}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(dir) = &args.save_crops {
        std::fs::create_dir_all(dir)?;
    }

    for (idx, crop) in crops.iter().enumerate() {
        let glyphs = segment_characters(&crop.image, &config.segmentation)?;
        let corners: Vec<String> = crop
            .corners
            .iter()
            .map(|c| format!("({:.1}, {:.1})", c.x, c.y))
            .collect();

        match classifier.as_mut() {
            Some(classifier) => {
                let text = classify_glyphs(classifier, &glyphs)?;
                println!(
                    "plate {idx}: {text} [{:?}, confidence {:.3}, corners {}]",
                    crop.layout,
                    crop.confidence,
                    corners.join(" ")
                );
            }
            None => println!(
                "plate {idx}: {} glyphs [{:?}, confidence {:.3}, corners {}]",
                glyphs.len(),
                crop.layout,
                crop.confidence,
                corners.join(" ")
            ),
        }

        if let Some(dir) = &args.save_crops {
            let path = dir.join(format!("plate_{idx}.png"));
            imwrite(&path.to_string_lossy(), &crop.image, &Vector::new())?;
            info!("saved {}", path.display());
        }
    }

    Ok(())
}
