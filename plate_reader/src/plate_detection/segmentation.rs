use opencv::core::{
    convert_scale_abs, Mat, Point, Rect, Size, Vector, BORDER_CONSTANT, BORDER_DEFAULT, CV_8U,
};
use opencv::imgproc;
use opencv::imgproc::{
    CHAIN_APPROX_SIMPLE, COLOR_BGR2GRAY, COLOR_BGRA2GRAY, INTER_LINEAR, MORPH_RECT, RETR_EXTERNAL,
    THRESH_BINARY, THRESH_BINARY_INV, THRESH_OTSU,
};
use opencv::prelude::*;
use tracing::debug;

use crate::config::SegmentationConfig;
use crate::error::Result;

/// One character cut out of a plate, binarized at a fixed size.
#[derive(Debug, Clone)]
pub struct Glyph {
    pub image: Mat,
    /// Where the character sits in the plate crop.
    pub bounds: Rect,
    /// Position in the left-to-right reading order, starting at 0.
    pub rank: usize,
}

fn to_8bit(plate: &Mat) -> Result<Mat> {
    if plate.depth() == CV_8U {
        return Ok(plate.try_clone()?);
    }
    // Float crops hold intensities in [0, 1].
    let mut scaled = Mat::default();
    convert_scale_abs(plate, &mut scaled, 255.0, 0.0)?;
    Ok(scaled)
}

fn to_gray(plate: &Mat) -> Result<Mat> {
    let code = match plate.channels() {
        1 => return Ok(plate.try_clone()?),
        4 => COLOR_BGRA2GRAY,
        _ => COLOR_BGR2GRAY,
    };
    let mut gray = Mat::default();
    imgproc::cvt_color(plate, &mut gray, code, 0)?;
    Ok(gray)
}

/// Inverse Otsu binarization (characters white), returned together with a
/// dilated copy that closes broken strokes.
fn binarize(plate: &Mat, config: &SegmentationConfig) -> Result<(Mat, Mat)> {
    let gray = to_gray(&to_8bit(plate)?)?;

    let mut blurred = Mat::default();
    imgproc::gaussian_blur(
        &gray,
        &mut blurred,
        Size::new(config.blur_kernel, config.blur_kernel),
        0.0,
        0.0,
        BORDER_DEFAULT,
    )?;

    let mut binary = Mat::default();
    imgproc::threshold(
        &blurred,
        &mut binary,
        180.0,
        255.0,
        THRESH_BINARY_INV | THRESH_OTSU,
    )?;

    let kernel = imgproc::get_structuring_element(
        MORPH_RECT,
        Size::new(config.dilation_kernel, config.dilation_kernel),
        Point::new(-1, -1),
    )?;
    let mut dilated = Mat::default();
    imgproc::dilate(
        &binary,
        &mut dilated,
        &kernel,
        Point::new(-1, -1),
        1,
        BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    Ok((binary, dilated))
}

fn is_character_box(rect: Rect, plate_height: f64, config: &SegmentationConfig) -> bool {
    if rect.width <= 0 {
        return false;
    }
    let ratio = f64::from(rect.height) / f64::from(rect.width);
    (config.min_aspect..=config.max_aspect).contains(&ratio)
        && f64::from(rect.height) / plate_height >= config.min_height_fraction
}

fn extract_glyph(
    binary: &Mat,
    bounds: Rect,
    rank: usize,
    config: &SegmentationConfig,
) -> Result<Glyph> {
    let roi = Mat::roi(binary, bounds)?;
    let mut resized = Mat::default();
    imgproc::resize(
        &roi,
        &mut resized,
        Size::new(config.glyph_width, config.glyph_height),
        0.0,
        0.0,
        INTER_LINEAR,
    )?;
    let mut image = Mat::default();
    imgproc::threshold(&resized, &mut image, 220.0, 255.0, THRESH_BINARY | THRESH_OTSU)?;
    Ok(Glyph {
        image,
        bounds,
        rank,
    })
}

/// Cuts a rectified plate into character images in reading order.
///
/// Candidate boxes come from the external contours of the binarized plate
/// and are kept when their height/width ratio and relative height look like
/// a character. Glyphs are cut from the dilated image. An empty result means
/// nothing legible, not a failure.
pub fn segment_characters(plate: &Mat, config: &SegmentationConfig) -> Result<Vec<Glyph>> {
    if plate.empty() {
        return Ok(Vec::new());
    }
    let (binary, dilated) = binarize(plate, config)?;

    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours(
        &binary,
        &mut contours,
        RETR_EXTERNAL,
        CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    let plate_height = f64::from(plate.rows());
    let mut boxes = Vec::with_capacity(contours.len());
    for contour in contours.iter() {
        let rect = imgproc::bounding_rect(&contour)?;
        if is_character_box(rect, plate_height, config) {
            boxes.push(rect);
        }
    }
    // Stable, so boxes sharing an x keep contour order.
    boxes.sort_by_key(|rect| rect.x);
    debug!(
        "{} of {} contours look like characters",
        boxes.len(),
        contours.len()
    );

    boxes
        .into_iter()
        .enumerate()
        .map(|(rank, bounds)| extract_glyph(&dilated, bounds, rank, config))
        .collect()
}
