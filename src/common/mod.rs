// This file is part of flandmark-rs, a facial landmark detector implementing the method described in the following paper:
//
//      Detector of Facial Landmarks Learned by the Structured Output SVM,
//      Michal Uricar, Vojtech Franc, Vaclav Hlavac.
//      In VISAPP 2012.
//
// flandmark-rs is distributed under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

mod image;

use std::time::Duration;

pub use self::image::{crop_resize_image, resize_image, rotate_image, ImageBuffer, ImageData};

/// Axis-aligned face box with inclusive corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

impl BoundingBox {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Box given by its top-left corner and size, e.g. as reported by a face detector.
    ///
    /// Corners past `i32::MAX` are clamped to it.
    pub fn from_origin_and_size(x: i32, y: i32, width: u32, height: u32) -> Self {
        BoundingBox::new(
            x,
            y,
            x.saturating_add_unsigned(width),
            y.saturating_add_unsigned(height),
        )
    }

    pub fn min_x(&self) -> i32 {
        self.min_x
    }

    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    pub fn max_x(&self) -> i32 {
        self.max_x
    }

    pub fn max_y(&self) -> i32 {
        self.max_y
    }

    pub fn is_valid(&self) -> bool {
        self.max_x > self.min_x && self.max_y > self.min_y
    }
}

/// Face box with an in-plane rotation, given by its corners in clockwise order starting at
/// the top-left one: top-left, top-right, bottom-right, bottom-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneralBoundingBox {
    corners: [Point; 4],
}

impl GeneralBoundingBox {
    pub fn new(corners: [Point; 4]) -> Self {
        GeneralBoundingBox { corners }
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    /// Midpoint of the top-left and bottom-right corners.
    pub fn center(&self) -> Point {
        Point::new(
            (self.corners[0].x + self.corners[2].x) / 2.0,
            (self.corners[0].y + self.corners[2].y) / 2.0,
        )
    }

    /// In-plane rotation angle in radians, measured on the top edge.
    ///
    /// Positive when the top-right corner is higher (smaller y) than the top-left one.
    pub fn angle(&self) -> f64 {
        let [top_left, top_right, _, _] = self.corners;
        let length = top_left.distance(&top_right);
        if length == 0.0 {
            return 0.0;
        }
        let sine = ((top_left.y - top_right.y).abs() / length).min(1.0);
        let angle = sine.asin();
        if top_right.y > top_left.y {
            -angle
        } else {
            angle
        }
    }
}

/// Continuous image coordinates of a landmark.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// `(y, x)` pair, the order in which landmarks are usually reported for images.
    pub fn yx(&self) -> (f64, f64) {
        (self.y, self.x)
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Rotates the point by `angle` radians around `center`.
    pub fn rotate_around(&self, center: &Point, angle: f64) -> Point {
        let (sa, ca) = angle.sin_cos();
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        Point::new(
            dx * ca - dy * sa + center.x,
            dx * sa + dy * ca + center.y,
        )
    }
}

/// Discrete pixel position in the normalized frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }
}

/// Stage durations of the last detection.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timings {
    pub overall: Duration,
    pub normalized_frame: Duration,
    pub features: Duration,
    pub maxsum: Duration,
}
