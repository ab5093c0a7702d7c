//! Display-unit to pixel scale factor.

use std::fmt;

/// A HiDPI scale factor: `pixels = display_units * factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    factor: f32,
}

impl Scale {
    pub const ONE: Self = Self { factor: 1.0 };

    /// Panics if `factor` is not positive.
    pub fn new(factor: f32) -> Self {
        assert!(factor > 0.0, "Scale factor must be > 0, got {factor}");
        Self { factor }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn scaled(&self, length: f32) -> f32 {
        self.factor * length
    }

    pub fn scaled_ceil(&self, length: f32) -> i32 {
        self.scaled(length).ceil() as i32
    }

    pub fn scaled_floor(&self, length: f32) -> i32 {
        self.scaled(length).floor() as i32
    }

    pub fn inv_scaled(&self, length: f32) -> f32 {
        length / self.factor
    }

    pub fn inv_scaled_ceil(&self, length: f32) -> i32 {
        self.inv_scaled(length).ceil() as i32
    }

    pub fn inv_scaled_floor(&self, length: f32) -> i32 {
        self.inv_scaled(length).floor() as i32
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.factor)
    }
}
