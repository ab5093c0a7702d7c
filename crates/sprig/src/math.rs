//! Math types and glam re-exports.
//!
//! Transforms are [`Affine2`]: a 2×2 linear part plus a translation, which is
//! exactly what a quad needs (`m00 m01 m10 m11 tx ty`). The rectangle types
//! here are display-space ([`Rect`]) and integer pixel-space ([`IRect`], used
//! for scissor boxes).

pub use glam::{Affine2, Mat2, Vec2};

/// A rectangle in display units: origin at top-left, `w`/`h` extents.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    /// True if the two rectangles overlap with positive area.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Axis-aligned bounds of this rectangle after applying `xf`.
    pub fn transformed_bounds(&self, xf: &Affine2) -> Rect {
        let corners = [
            xf.transform_point2(Vec2::new(self.x, self.y)),
            xf.transform_point2(Vec2::new(self.right(), self.y)),
            xf.transform_point2(Vec2::new(self.x, self.bottom())),
            xf.transform_point2(Vec2::new(self.right(), self.bottom())),
        ];
        let mut min = corners[0];
        let mut max = corners[0];
        for c in &corners[1..] {
            min = min.min(*c);
            max = max.max(*c);
        }
        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }
}

/// An integer rectangle in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl IRect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// The overlap of `self` and `other`. Extents clamp at zero, so the
    /// result is always contained in both inputs.
    pub fn intersection(&self, other: &IRect) -> IRect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        IRect::new(x, y, extent(x, right), extent(y, bottom))
    }

    pub fn contains(&self, other: &IRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    // Edges are widened so that huge extents cannot overflow.
    fn right(&self) -> i64 {
        self.x as i64 + self.w as i64
    }

    fn bottom(&self) -> i64 {
        self.y as i64 + self.h as i64
    }
}

fn extent(start: i32, end: i64) -> i32 {
    (end - start as i64).clamp(0, i32::MAX as i64) as i32
}
