//! Planar geometry primitives shared by filter, matcher and aggregator.

use serde::{Deserialize, Serialize};

/// 平面坐标点（管道统一单位：米）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance
    #[inline]
    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// 设备以 (0,0) 表示"无定位"
    #[inline]
    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Axis-aligned bounding box, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Square of half-width `half_width` centered on `center`
    pub fn around(center: Point, half_width: f64) -> Self {
        Self {
            min_x: center.x - half_width,
            max_x: center.x + half_width,
            min_y: center.y - half_width,
            max_y: center.y + half_width,
        }
    }

    /// Smallest box covering all points, `None` for an empty set
    pub fn covering<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point>,
    {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self {
                    min_x: p.x,
                    max_x: p.x,
                    min_y: p.y,
                    max_y: p.y,
                },
                Some(b) => Self {
                    min_x: b.min_x.min(p.x),
                    max_x: b.max_x.max(p.x),
                    min_y: b.min_y.min(p.y),
                    max_y: b.max_y.max(p.y),
                },
            })
        })
    }

    /// Grow every side by `tolerance`
    pub fn expanded(&self, tolerance: f64) -> Self {
        Self {
            min_x: self.min_x - tolerance,
            max_x: self.max_x + tolerance,
            min_y: self.min_y - tolerance,
            max_y: self.max_y + tolerance,
        }
    }

    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_covering_and_expand() {
        let bbox = BoundingBox::covering([
            Point::new(1.0, 5.0),
            Point::new(-2.0, 3.0),
            Point::new(4.0, 8.0),
        ])
        .unwrap();
        assert_eq!(bbox.min_x, -2.0);
        assert_eq!(bbox.max_x, 4.0);
        assert_eq!(bbox.min_y, 3.0);
        assert_eq!(bbox.max_y, 8.0);

        let grown = bbox.expanded(10.0);
        assert!(grown.contains(Point::new(14.0, -7.0)));
        assert!(!grown.contains(Point::new(14.1, 0.0)));
    }

    #[test]
    fn test_covering_empty() {
        assert!(BoundingBox::covering(std::iter::empty()).is_none());
    }

    #[test]
    fn test_around_is_inclusive() {
        let bbox = BoundingBox::around(Point::new(10.0, 10.0), 50.0);
        assert!(bbox.contains(Point::new(60.0, -40.0)));
        assert!(!bbox.contains(Point::new(60.5, 10.0)));
    }
}
