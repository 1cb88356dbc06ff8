//! Page-fraction geometry for chunk groundings.
//!
//! Boxes arrive from the extraction service as fractions of the page
//! width/height. Anything that does not survive [`NormalizedBox::normalize`]
//! is treated as absent: it is never drawn and never hit-tested.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unvalidated box as read from a payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// A box with every edge in [0, 1], `right > left` and `bottom > top`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// A point expressed as fractions of the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePoint {
    pub x: f64,
    pub y: f64,
}

/// Rendered size of a page in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Box placed on a rendered page, in pixels relative to the page origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Lenient numeric read: numbers and numeric strings, anything else is NaN.
fn lenient_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

impl RawBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    /// Read `{left, top, right, bottom}` from a JSON object. Non-objects yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            left: lenient_number(obj.get("left")),
            top: lenient_number(obj.get("top")),
            right: lenient_number(obj.get("right")),
            bottom: lenient_number(obj.get("bottom")),
        })
    }
}

impl NormalizedBox {
    /// Clamp each edge into [0, 1] and reject boxes with no area.
    pub fn normalize(raw: RawBox) -> Option<Self> {
        let left = clamp_unit(raw.left);
        let top = clamp_unit(raw.top);
        let right = clamp_unit(raw.right);
        let bottom = clamp_unit(raw.bottom);

        if right - left <= 0.0 || bottom - top <= 0.0 {
            return None;
        }

        Some(Self { left, top, right, bottom })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        RawBox::from_value(value).and_then(Self::normalize)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Edges are inclusive so a click on the border still counts.
    pub fn contains(&self, point: PagePoint) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.top && point.y <= self.bottom
    }

    pub fn to_pixels(&self, page: PageSize) -> PixelRect {
        PixelRect {
            x: (self.left * page.width as f64) as f32,
            y: (self.top * page.height as f64) as f32,
            width: (self.width() * page.width as f64) as f32,
            height: (self.height() * page.height as f64) as f32,
        }
    }
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Convert a pixel position on the rendered page into page fractions.
    /// A page that has not been laid out yet has no meaningful mapping.
    pub fn to_page_point(&self, x: f32, y: f32) -> Option<PagePoint> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }
        Some(PagePoint {
            x: (x / self.width) as f64,
            y: (y / self.height) as f64,
        })
    }
}

impl PixelRect {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_degenerate_boxes_are_rejected() {
        assert!(NormalizedBox::normalize(RawBox::new(0.5, 0.1, 0.5, 0.2)).is_none());
        assert!(NormalizedBox::normalize(RawBox::new(0.6, 0.1, 0.4, 0.2)).is_none());
        assert!(NormalizedBox::normalize(RawBox::new(0.1, 0.3, 0.2, 0.3)).is_none());
        // Degenerate only after clamping
        assert!(NormalizedBox::normalize(RawBox::new(1.2, 0.1, 1.5, 0.2)).is_none());
        assert!(NormalizedBox::normalize(RawBox::new(0.1, -0.4, 0.2, -0.1)).is_none());
    }

    #[test]
    fn test_clamping_into_unit_range() {
        let b = NormalizedBox::normalize(RawBox::new(-0.2, 0.1, 1.7, 0.9)).unwrap();
        assert_eq!(b.left, 0.0);
        assert_eq!(b.right, 1.0);
        for v in [b.left, b.top, b.right, b.bottom] {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_non_finite_clamps_to_zero() {
        let b = NormalizedBox::normalize(RawBox::new(f64::NAN, f64::NEG_INFINITY, 0.5, 0.5)).unwrap();
        assert_eq!(b.left, 0.0);
        assert_eq!(b.top, 0.0);

        // +inf also clamps to 0, which leaves no width
        assert!(NormalizedBox::normalize(RawBox::new(0.1, 0.1, f64::INFINITY, 0.5)).is_none());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = NormalizedBox::normalize(RawBox::new(0.1, 0.2, 0.3, 0.4)).unwrap();
        let twice =
            NormalizedBox::normalize(RawBox::new(once.left, once.top, once.right, once.bottom)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_lenient_json_read() {
        let b = NormalizedBox::from_value(&json!({"left": "0.1", "top": 0.2, "right": 0.5, "bottom": "0.6"}))
            .unwrap();
        assert_eq!(b.left, 0.1);
        assert_eq!(b.bottom, 0.6);

        assert!(NormalizedBox::from_value(&json!([0.1, 0.2, 0.3, 0.4])).is_none());
        // Missing right edge reads as 0 and the box collapses
        assert!(NormalizedBox::from_value(&json!({"left": 0.1, "top": 0.2, "bottom": 0.4})).is_none());
    }

    #[test]
    fn test_pixel_mapping_and_contains() {
        let b = NormalizedBox::normalize(RawBox::new(0.25, 0.5, 0.75, 1.0)).unwrap();
        let rect = b.to_pixels(PageSize::new(800.0, 1000.0));
        assert_eq!(rect, PixelRect { x: 200.0, y: 500.0, width: 400.0, height: 500.0 });

        let page = PageSize::new(800.0, 1000.0);
        assert!(b.contains(page.to_page_point(200.0, 500.0).unwrap()));
        assert!(!b.contains(page.to_page_point(100.0, 500.0).unwrap()));
        assert!(PageSize::new(0.0, 10.0).to_page_point(1.0, 1.0).is_none());
    }
}
