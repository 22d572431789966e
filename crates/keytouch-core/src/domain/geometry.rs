//! Small geometry value types shared by every layer.

use serde::{Deserialize, Serialize};

/// A 2-D point, used both for pixel positions and normalized positions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The center of normalized space.
    pub const CENTER: PointF = PointF::new(0.5, 0.5);

    /// `|x| + |y|`.
    pub fn manhattan_length(&self) -> f64 {
        self.x.abs() + self.y.abs()
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Clamps both axes into `[min, max]`.
    pub fn clamped(&self, min: f64, max: f64) -> PointF {
        PointF::new(self.x.clamp(min, max), self.y.clamp(min, max))
    }

    /// `true` when both axes lie in `[min, max]`.
    pub fn within(&self, min: f64, max: f64) -> bool {
        (min..=max).contains(&self.x) && (min..=max).contains(&self.y)
    }

    /// Rounds both axes to four decimal places, the precision exposed to scripts.
    pub fn rounded4(&self) -> PointF {
        PointF::new(round4(self.x), round4(self.y))
    }
}

impl std::ops::Add for PointF {
    type Output = PointF;

    fn add(self, rhs: PointF) -> PointF {
        PointF::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for PointF {
    type Output = PointF;

    fn sub(self, rhs: PointF) -> PointF {
        PointF::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::AddAssign for PointF {
    fn add_assign(&mut self, rhs: PointF) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Mul<f64> for PointF {
    type Output = PointF;

    fn mul(self, rhs: f64) -> PointF {
        PointF::new(self.x * rhs, self.y * rhs)
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SizeF {
    pub width: f64,
    pub height: f64,
}

impl SizeF {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// A size is usable as a divisor only when both sides are positive.
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn center(&self) -> PointF {
        PointF::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn transposed(&self) -> SizeF {
        SizeF::new(self.height, self.width)
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Converts a pixel position to normalized space.  `None` for invalid sizes.
    pub fn normalize(&self, pixel: PointF) -> Option<PointF> {
        if !self.is_valid() {
            return None;
        }
        Some(PointF::new(pixel.x / self.width, pixel.y / self.height))
    }

    /// Converts a normalized position to pixels.
    pub fn denormalize(&self, normalized: PointF) -> PointF {
        PointF::new(normalized.x * self.width, normalized.y * self.height)
    }
}

/// A normalized rectangle given by two corners.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectF {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl RectF {
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Returns the rectangle with corners ordered so `x0 <= x1` and `y0 <= y1`.
    pub fn normalized(&self) -> RectF {
        RectF::new(
            self.x0.min(self.x1),
            self.y0.min(self.y1),
            self.x0.max(self.x1),
            self.y0.max(self.y1),
        )
    }
}

/// Rounds to four decimal places.
pub fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
