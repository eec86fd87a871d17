//! Axis-aligned boxes in source-image pixel coordinates.
//!
//! Every preprocessing variant keeps the source dimensions, so boxes coming
//! from different variants and engines share one coordinate frame and can be
//! compared directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Build from a top-left corner and a size
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width.max(0.0), y + height.max(0.0))
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) * 0.5
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn intersection_area(&self, other: &Self) -> f32 {
        let w = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let h = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0);
        w * h
    }

    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Fraction of the shorter box's height shared with the other box
    pub fn vertical_overlap(&self, other: &Self) -> f32 {
        let overlap = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0);
        let min_height = self.height().min(other.height());
        if min_height <= 0.0 {
            0.0
        } else {
            overlap / min_height
        }
    }

    /// Horizontal distance from this box's right edge to `other`'s left edge.
    /// Negative when the boxes overlap horizontally.
    pub fn horizontal_gap_to(&self, other: &Self) -> f32 {
        other.x0 - self.x1
    }

    /// Whether the two boxes sit on the same approximate text line
    pub fn same_line(&self, other: &Self) -> bool {
        self.vertical_overlap(other) >= 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_of_partial_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 15.0, 15.0);
        assert_eq!(a.iou(&b), 25.0 / 175.0);
    }

    #[test]
    fn test_iou_of_disjoint_boxes_is_zero() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 0.0, 30.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_degenerate_boxes_do_not_divide_by_zero() {
        let a = Rect::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(a.iou(&a), 0.0);
        assert_eq!(a.vertical_overlap(&a), 0.0);
    }

    #[test]
    fn test_new_normalizes_corner_order() {
        let r = Rect::new(10.0, 8.0, 2.0, 4.0);
        assert_eq!(r, Rect::new(2.0, 4.0, 10.0, 8.0));
    }

    #[test]
    fn test_same_line_and_gap() {
        let left = Rect::from_xywh(10.0, 100.0, 40.0, 20.0);
        let right = Rect::from_xywh(55.0, 102.0, 30.0, 20.0);
        assert!(left.same_line(&right));
        assert_eq!(left.horizontal_gap_to(&right), 5.0);

        let below = Rect::from_xywh(55.0, 140.0, 30.0, 20.0);
        assert!(!left.same_line(&below));
    }
}
