pub mod detector;
pub mod homography;
pub mod nms;
pub mod output_tensor;
pub mod reconstruction;
pub mod recognition;
pub mod region;
pub mod segmentation;

use opencv::core::{Mat, Point2d, Size};

/// Row layout of a plate, picked from the aspect ratio of its frontal box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlateLayout {
    OneLine,
    TwoLines,
}

impl PlateLayout {
    /// Width over height below which a plate is read as two stacked rows.
    pub const TWO_LINES_MAX_ASPECT: f64 = 1.7;

    pub fn size(self) -> Size {
        match self {
            PlateLayout::OneLine => Size::new(470, 110),
            PlateLayout::TwoLines => Size::new(280, 200),
        }
    }
}

/// A rectified plate image and where it came from.
#[derive(Debug, Clone)]
pub struct PlateCrop {
    pub image: Mat,
    /// Source quad in original image pixels: top-left, top-right,
    /// bottom-right, bottom-left.
    pub corners: [Point2d; 4],
    pub layout: PlateLayout,
    pub confidence: f32,
}
