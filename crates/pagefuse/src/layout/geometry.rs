//! Bounding boxes in page space.
//!
//! Coordinates use a top-left origin: `x0` is the left edge, `y0` the top
//! edge, `x1` the right edge and `y1` the bottom edge. Units are whatever the
//! producing extractor used (PDF points for native text, pixels for images);
//! the engine never mixes the two within one comparison.

use crate::types::Word;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box with top-left origin.
///
/// Invariant: `x0 <= x1` and `y0 <= y1`. [`BoundingBox::new`] normalizes
/// swapped corners so the invariant always holds for constructed values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Top edge, the reading-order sort key.
    pub fn top(&self) -> f64 {
        self.y0
    }

    pub fn left(&self) -> f64 {
        self.x0
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// True when the box encloses no area (a point or a line segment).
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Inclusive point containment.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Overlapping area of two boxes, `None` when they do not intersect.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        if x0 < x1 && y0 < y1 {
            Some(BoundingBox { x0, y0, x1, y1 })
        } else {
            None
        }
    }

    /// Intersection area divided by the smaller of the two areas.
    ///
    /// Returns 0.0 when either box is degenerate.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f64 {
        let smaller = self.area().min(other.area());
        if smaller <= 0.0 {
            return 0.0;
        }
        self.intersection(other).map(|i| i.area() / smaller).unwrap_or(0.0)
    }

    /// Vertical gap between two boxes; 0.0 when they overlap vertically.
    pub fn vertical_distance(&self, other: &BoundingBox) -> f64 {
        if self.y1 < other.y0 {
            other.y0 - self.y1
        } else if other.y1 < self.y0 {
            self.y0 - other.y1
        } else {
            0.0
        }
    }

    /// Multiply every coordinate by `factor`.
    pub fn scale(&self, factor: f64) -> BoundingBox {
        BoundingBox::new(self.x0 * factor, self.y0 * factor, self.x1 * factor, self.y1 * factor)
    }

    /// Clamp to `[0, width] x [0, height]`.
    ///
    /// Returns `None` when nothing of the box remains inside the bounds, or
    /// when the remainder has zero area. Non-finite coordinates are rejected.
    pub fn clamp_to(&self, width: f64, height: f64) -> Option<BoundingBox> {
        if ![self.x0, self.y0, self.x1, self.y1].iter().all(|v| v.is_finite()) {
            return None;
        }
        let clamped = BoundingBox {
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        };
        if clamped.is_degenerate() { None } else { Some(clamped) }
    }

    /// Integer pixel rectangle `(x, y, width, height)` for cropping.
    ///
    /// The box is clamped to the image first; edges are floored/ceiled so the
    /// rectangle always covers the box.
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamped = self.clamp_to(image_width as f64, image_height as f64)?;
        let x = clamped.x0.floor() as u32;
        let y = clamped.y0.floor() as u32;
        let right = (clamped.x1.ceil() as u32).min(image_width);
        let bottom = (clamped.y1.ceil() as u32).min(image_height);
        if right <= x || bottom <= y {
            return None;
        }
        Some((x, y, right - x, bottom - y))
    }
}

/// True iff the center of `word` lies inside `region` (inclusive bounds).
pub fn is_inside(word: &Word, region: &BoundingBox) -> bool {
    let (cx, cy) = word.bbox.center();
    region.contains_point(cx, cy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Word {
        Word::new(text, BoundingBox::new(x0, y0, x1, y1))
    }

    #[test]
    fn test_new_normalizes_swapped_corners() {
        let bbox = BoundingBox::new(30.0, 40.0, 10.0, 20.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 20.0, 30.0, 40.0));
        assert!(bbox.x0 <= bbox.x1 && bbox.y0 <= bbox.y1);
    }

    #[test]
    fn test_dimensions_and_center() {
        let bbox = BoundingBox::new(10.0, 20.0, 50.0, 60.0);
        assert_eq!(bbox.width(), 40.0);
        assert_eq!(bbox.height(), 40.0);
        assert_eq!(bbox.area(), 1600.0);
        assert_eq!(bbox.center(), (30.0, 40.0));
    }

    #[test]
    fn test_union() {
        let a = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        let b = BoundingBox::new(5.0, 25.0, 35.0, 45.0);
        assert_eq!(a.union(&b), BoundingBox::new(5.0, 20.0, 35.0, 45.0));
    }

    #[test]
    fn test_intersection_and_overlap_ratio() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        assert_eq!(a.intersection(&b), Some(BoundingBox::new(5.0, 5.0, 10.0, 10.0)));
        assert!((a.overlap_ratio(&b) - 0.25).abs() < 1e-9);

        let far = BoundingBox::new(100.0, 100.0, 110.0, 110.0);
        assert_eq!(a.intersection(&far), None);
        assert_eq!(a.overlap_ratio(&far), 0.0);
    }

    #[test]
    fn test_overlap_ratio_degenerate_box() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let line = BoundingBox::new(2.0, 2.0, 2.0, 8.0);
        assert!(line.is_degenerate());
        assert_eq!(a.overlap_ratio(&line), 0.0);
    }

    #[test]
    fn test_vertical_distance() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let below = BoundingBox::new(0.0, 15.0, 10.0, 20.0);
        assert_eq!(a.vertical_distance(&below), 5.0);
        assert_eq!(below.vertical_distance(&a), 5.0);
        assert_eq!(a.vertical_distance(&BoundingBox::new(0.0, 5.0, 1.0, 12.0)), 0.0);
    }

    #[test]
    fn test_clamp_to_bounds() {
        let bbox = BoundingBox::new(-10.0, -5.0, 120.0, 50.0);
        assert_eq!(bbox.clamp_to(100.0, 40.0), Some(BoundingBox::new(0.0, 0.0, 100.0, 40.0)));
    }

    #[test]
    fn test_clamp_outside_or_zero_area_is_none() {
        assert_eq!(BoundingBox::new(200.0, 200.0, 300.0, 300.0).clamp_to(100.0, 100.0), None);
        assert_eq!(BoundingBox::new(10.0, 10.0, 10.0, 20.0).clamp_to(100.0, 100.0), None);
        assert_eq!(BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0).clamp_to(100.0, 100.0), None);
    }

    #[test]
    fn test_to_pixel_rect_covers_fractional_box() {
        let bbox = BoundingBox::new(1.5, 2.2, 10.1, 20.9);
        assert_eq!(bbox.to_pixel_rect(100, 100), Some((1, 2, 10, 19)));
        assert_eq!(BoundingBox::new(95.0, 95.0, 120.0, 130.0).to_pixel_rect(100, 100), Some((95, 95, 5, 5)));
    }

    #[test]
    fn test_scale() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(bbox.scale(2.0), BoundingBox::new(20.0, 40.0, 60.0, 80.0));
    }

    #[test]
    fn test_is_inside_uses_center_point() {
        let table = BoundingBox::new(0.0, 0.0, 100.0, 50.0);
        assert!(is_inside(&word("Total", 10.0, 10.0, 30.0, 20.0), &table));
        // Straddles the right edge but the center stays inside.
        assert!(is_inside(&word("Wide", 90.0, 10.0, 108.0, 20.0), &table));
        // Center falls outside even though the box overlaps.
        assert!(!is_inside(&word("Edge", 95.0, 10.0, 125.0, 20.0), &table));
    }

    #[test]
    fn test_is_inside_is_inclusive() {
        let table = BoundingBox::new(0.0, 0.0, 100.0, 50.0);
        // Center exactly on the bottom-right corner.
        assert!(is_inside(&word("x", 90.0, 40.0, 110.0, 60.0), &table));
    }
}
