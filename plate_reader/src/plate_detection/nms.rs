use std::cmp::Ordering;

use opencv::core::Point2d;

use super::region::Region;

/// Intersection over union of two axis-aligned boxes.
///
/// # Panics
/// When either box has a negative side.
pub fn iou(tl1: Point2d, br1: Point2d, tl2: Point2d, br2: Point2d) -> f64 {
    let wh1 = Point2d::new(br1.x - tl1.x, br1.y - tl1.y);
    let wh2 = Point2d::new(br2.x - tl2.x, br2.y - tl2.y);
    assert!(
        wh1.x >= 0.0 && wh1.y >= 0.0 && wh2.x >= 0.0 && wh2.y >= 0.0,
        "iou of boxes with negative size"
    );

    let inter_w = (br1.x.min(br2.x) - tl1.x.max(tl2.x)).max(0.0);
    let inter_h = (br1.y.min(br2.y) - tl1.y.max(tl2.y)).max(0.0);
    let intersection = inter_w * inter_h;
    let union = wh1.x * wh1.y + wh2.x * wh2.y - intersection;
    intersection / union
}

pub fn intersection_over_union(a: &Region, b: &Region) -> f64 {
    iou(a.tl(), a.br(), b.tl(), b.br())
}

fn by_descending_confidence(a: &Region, b: &Region) -> Ordering {
    let a = a.confidence().unwrap_or(f32::NEG_INFINITY);
    let b = b.confidence().unwrap_or(f32::NEG_INFINITY);
    b.total_cmp(&a)
}

/// Greedy non-maximum suppression.
///
/// Regions are visited from the most to the least confident (equal
/// confidences keep their input order) and kept unless they overlap an
/// already kept region by more than `iou_threshold`.
pub fn non_max_suppression(mut regions: Vec<Region>, iou_threshold: f64) -> Vec<Region> {
    regions.sort_by(by_descending_confidence);

    let mut selected: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        let overlaps = selected
            .iter()
            .any(|kept| intersection_over_union(&region, kept) > iou_threshold);
        if !overlaps {
            selected.push(region);
        }
    }
    selected
}
