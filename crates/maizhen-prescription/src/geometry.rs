//! 标注框几何
//!
//! 所有坐标都是相对图片显示区域的百分比（0~100），与分辨率无关。

use maizhen_core::EntryId;
use serde::{Deserialize, Serialize};

/// 百分比上限
pub const FULL: f64 = 100.0;

/// 百分比坐标点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 图片在屏幕上的显示区域（像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceRect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    /// 把屏幕坐标换算为图片百分比坐标，结果限制在 [0, 100]
    ///
    /// 显示区域尚未布局（宽或高为0）时返回 `None`。
    pub fn to_percent(&self, client_x: f64, client_y: f64) -> Option<Point> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }
        let x = (client_x - self.left) / self.width * FULL;
        let y = (client_y - self.top) / self.height * FULL;
        Some(Point::new(x.clamp(0.0, FULL), y.clamp(0.0, FULL)))
    }
}

/// 矩形，(x, y) 为左上角
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// 由两个角点构造，无论拖动方向如何都规范为左上角加宽高
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            w: (a.x - b.x).abs(),
            h: (a.y - b.y).abs(),
        }
    }

    /// 宽高都严格大于阈值
    pub fn exceeds(&self, min_size: f64) -> bool {
        self.w > min_size && self.h > min_size
    }

    /// 点是否落在矩形内（含边界）
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.w
            && point.y >= self.y
            && point.y <= self.y + self.h
    }

    /// 移动左上角到 (x, y)，并保证整个矩形不越出图片边界
    pub fn moved_to(&self, x: f64, y: f64) -> Self {
        Self {
            x: x.clamp(0.0, (FULL - self.w).max(0.0)),
            y: y.clamp(0.0, (FULL - self.h).max(0.0)),
            ..*self
        }
    }
}

/// 标注框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationBox {
    pub id: EntryId,
    #[serde(flatten)]
    pub rect: Rect,
}

impl AnnotationBox {
    pub fn new(rect: Rect) -> Self {
        Self {
            id: EntryId::new(),
            rect,
        }
    }
}

/// 命中测试：从最新创建的框往回找，返回第一个包含该点的框的下标
pub fn hit_test(boxes: &[AnnotationBox], point: Point) -> Option<usize> {
    boxes.iter().rposition(|b| b.rect.contains(point))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_percent() {
        let surface = SurfaceRect::new(100.0, 50.0, 400.0, 200.0);
        assert_eq!(surface.to_percent(300.0, 150.0), Some(Point::new(50.0, 50.0)));
        assert_eq!(surface.to_percent(100.0, 50.0), Some(Point::new(0.0, 0.0)));
        // 超出区域时夹紧
        assert_eq!(surface.to_percent(900.0, 0.0), Some(Point::new(100.0, 0.0)));

        let collapsed = SurfaceRect::new(0.0, 0.0, 0.0, 100.0);
        assert_eq!(collapsed.to_percent(10.0, 10.0), None);
    }

    #[test]
    fn test_from_corners_normalizes() {
        let rect = Rect::from_corners(Point::new(15.0, 16.0), Point::new(10.0, 10.0));
        assert_eq!(rect, Rect::new(10.0, 10.0, 5.0, 6.0));
        assert!(rect.exceeds(1.5));

        let tiny = Rect::from_corners(Point::new(10.0, 10.0), Point::new(11.0, 11.0));
        assert!(!tiny.exceeds(1.5));

        // 只有一边够大也不算
        let thin = Rect::from_corners(Point::new(10.0, 10.0), Point::new(30.0, 11.0));
        assert!(!thin.exceeds(1.5));
    }

    #[test]
    fn test_moved_to_clamps() {
        let rect = Rect::new(10.0, 10.0, 20.0, 30.0);
        assert_eq!(rect.moved_to(95.0, 5.0).x, 80.0);
        assert_eq!(rect.moved_to(-4.0, 90.0), Rect::new(0.0, 70.0, 20.0, 30.0));
        assert_eq!(rect.moved_to(40.0, 40.0), Rect::new(40.0, 40.0, 20.0, 30.0));
    }

    #[test]
    fn test_hit_test_prefers_newest() {
        let older = AnnotationBox::new(Rect::new(0.0, 0.0, 50.0, 50.0));
        let newer = AnnotationBox::new(Rect::new(40.0, 40.0, 20.0, 20.0));
        let boxes = [older, newer];

        assert_eq!(hit_test(&boxes, Point::new(45.0, 45.0)), Some(1));
        assert_eq!(hit_test(&boxes, Point::new(10.0, 10.0)), Some(0));
        // 边界命中
        assert_eq!(hit_test(&boxes, Point::new(60.0, 60.0)), Some(1));
        assert_eq!(hit_test(&boxes, Point::new(90.0, 90.0)), None);
    }
}
