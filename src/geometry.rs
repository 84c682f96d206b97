//! Geometry primitives: extents, padding and stride.
//!
//! These are pure value types shared by every layer. The output-size
//! arithmetic lives here; validation of concrete configurations is the
//! responsibility of the layer constructors.

use std::fmt;

/// Height and width of a 2-D matrix, kernel or feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub height: usize,
    pub width: usize,
}

impl Extent {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Number of elements in a matrix of this extent.
    pub fn flat_len(&self) -> usize {
        self.height * self.width
    }

    /// Extent after adding the given margins.
    pub fn padded(&self, padding: Padding) -> Extent {
        Extent {
            height: self.height + padding.top + padding.bottom,
            width: self.width + padding.left + padding.right,
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Four independent non-negative margins around a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
    pub left: usize,
}

impl Padding {
    pub fn new(top: usize, right: usize, bottom: usize, left: usize) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// No padding on any side.
    pub fn none() -> Self {
        Self::default()
    }

    /// The same margin on all four sides.
    pub fn uniform(margin: usize) -> Self {
        Self::new(margin, margin, margin, margin)
    }

    pub fn vertical(&self) -> usize {
        self.top + self.bottom
    }

    pub fn horizontal(&self) -> usize {
        self.left + self.right
    }
}

/// Window step sizes, both at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stride {
    pub vertical: usize,
    pub horizontal: usize,
}

impl Stride {
    pub fn new(vertical: usize, horizontal: usize) -> Self {
        Self {
            vertical,
            horizontal,
        }
    }

    pub fn unit() -> Self {
        Self::new(1, 1)
    }
}

/// Output extent of a windowed operation.
///
/// `out = (in - kernel + padTop + padBottom) / strideV + 1`, and the
/// symmetric form horizontally.
pub fn output_extent(input: Extent, kernel: Extent, padding: Padding, stride: Stride) -> Extent {
    Extent {
        height: (input.height + padding.vertical() - kernel.height) / stride.vertical + 1,
        width: (input.width + padding.horizontal() - kernel.width) / stride.horizontal + 1,
    }
}
