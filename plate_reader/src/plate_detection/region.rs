use std::fmt;

use opencv::core::Point2d;

/// A labelled area of an image: an axis-aligned box, optionally carrying the
/// four corners of the oriented quadrilateral it was computed from.
///
/// Corners are always ordered top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    class_id: i32,
    tl: Point2d,
    br: Point2d,
    corners: Option<[Point2d; 4]>,
    confidence: Option<f32>,
}

impl Region {
    pub const UNKNOWN_CLASS: i32 = -1;

    /// # Panics
    /// When `br` lies above or left of `tl`.
    pub fn new(class_id: i32, tl: Point2d, br: Point2d, confidence: Option<f32>) -> Self {
        assert!(
            br.x >= tl.x && br.y >= tl.y,
            "malformed region: top left ({}, {}) bottom right ({}, {})",
            tl.x,
            tl.y,
            br.x,
            br.y
        );
        Self {
            class_id,
            tl,
            br,
            corners: None,
            confidence,
        }
    }

    pub fn from_corners(class_id: i32, corners: [Point2d; 4], confidence: Option<f32>) -> Self {
        let mut tl = corners[0];
        let mut br = corners[0];
        for p in &corners[1..] {
            tl.x = tl.x.min(p.x);
            tl.y = tl.y.min(p.y);
            br.x = br.x.max(p.x);
            br.y = br.y.max(p.y);
        }
        Self {
            corners: Some(corners),
            ..Self::new(class_id, tl, br, confidence)
        }
    }

    pub fn class_id(&self) -> i32 {
        self.class_id
    }

    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    pub fn tl(&self) -> Point2d {
        self.tl
    }

    pub fn br(&self) -> Point2d {
        self.br
    }

    pub fn tr(&self) -> Point2d {
        Point2d::new(self.br.x, self.tl.y)
    }

    pub fn bl(&self) -> Point2d {
        Point2d::new(self.tl.x, self.br.y)
    }

    pub fn wh(&self) -> Point2d {
        Point2d::new(self.br.x - self.tl.x, self.br.y - self.tl.y)
    }

    pub fn center(&self) -> Point2d {
        let wh = self.wh();
        Point2d::new(self.tl.x + wh.x / 2.0, self.tl.y + wh.y / 2.0)
    }

    pub fn area(&self) -> f64 {
        let wh = self.wh();
        wh.x * wh.y
    }

    pub fn corners(&self) -> [Point2d; 4] {
        self.corners
            .unwrap_or_else(|| [self.tl, self.tr(), self.br, self.bl()])
    }

    pub fn is_oriented(&self) -> bool {
        self.corners.is_some()
    }

    pub fn with_class(self, class_id: i32) -> Self {
        Self { class_id, ..self }
    }

    pub fn with_confidence(self, confidence: f32) -> Self {
        Self {
            confidence: Some(confidence),
            ..self
        }
    }

    pub fn with_size(self, wh: Point2d) -> Self {
        let cc = self.center();
        let tl = Point2d::new(cc.x - 0.5 * wh.x, cc.y - 0.5 * wh.y);
        let br = Point2d::new(cc.x + 0.5 * wh.x, cc.y + 0.5 * wh.y);
        Self::new(self.class_id, tl, br, self.confidence)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Class: {}, top left(x: {:.6}, y: {:.6}), bottom right(x: {:.6}, y: {:.6})",
            self.class_id, self.tl.x, self.tl.y, self.br.x, self.br.y
        )
    }
}
