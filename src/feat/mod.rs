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

mod appearance;
mod hog_featmap;
mod lbp_featmap;

pub use self::appearance::{AppearanceKind, AppearanceModel};
pub use self::hog_featmap::HogFeatureMap;
pub use self::lbp_featmap::SparseLbpFeatureMap;

use crate::common::{ImageData, Position};
use crate::error::{Error, Result};
use crate::math;

/// Largest side, in pixels, of a feature window and of the normalized frame.
pub(crate) const MAX_WINDOW_SIZE: u32 = 4096;

/// Largest feature dimension of an appearance model.
pub(crate) const MAX_FEATURE_DIMENSION: usize = 1 << 24;

/// Largest number of values a precomputed feature table may hold.
const MAX_TABLE_LEN: usize = 1 << 28;

/// Size of a table holding `row` values for each of `length` candidates.
pub(crate) fn table_len(length: usize, row: usize) -> Result<usize> {
    length
        .checked_mul(row)
        .filter(|&len| len <= MAX_TABLE_LEN)
        .ok_or_else(|| {
            Error::InvalidModel(format!(
                "Feature table of {} candidates with {} values each is too large",
                length, row
            ))
        })
}

/// Per-candidate feature extractor of an appearance model.
///
/// Candidates are addressed by their flat index in the owning search space.
pub trait FeatureMap {
    /// Recomputes the features of every candidate window; `windows` holds the top-left
    /// corners of the windows, one per candidate.
    fn compute(&mut self, image: &ImageData, windows: &[Position]);

    fn dimension(&self) -> usize;

    /// Writes the dense feature vector of the candidate `index` into `feature_vector`.
    fn feature_at(&self, index: usize, feature_vector: &mut [f64]);

    /// `q[i] = w . feature(i)` for every candidate.
    fn dot_product_with_wq(&self, w: &[f64], q: &mut [f64]);

    fn q_value(&self, index: usize, w: &[f64]) -> f64;
}

/// Inclusive rectangle of candidate positions of a landmark in the normalized frame.
///
/// Candidates are enumerated column by column: the flat index `i` corresponds to
/// `x = i / height + min_x` and `y = i % height + min_y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchSpace {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

impl SearchSpace {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Result<Self> {
        if max_x < min_x || max_y < min_y {
            return Err(Error::InvalidModel(format!(
                "Empty search space: ({}, {}, {}, {})",
                min_x, min_y, max_x, max_y
            )));
        }
        let width = max_x.checked_sub(min_x).and_then(|d| d.checked_add(1));
        let height = max_y.checked_sub(min_y).and_then(|d| d.checked_add(1));
        if width.is_none() || height.is_none() {
            return Err(Error::InvalidModel(format!(
                "Search space ({}, {}, {}, {}) is too large",
                min_x, min_y, max_x, max_y
            )));
        }
        Ok(SearchSpace {
            min_x,
            min_y,
            max_x,
            max_y,
        })
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

    #[inline]
    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x + 1) as u32
    }

    #[inline]
    pub fn height(&self) -> u32 {
        (self.max_y - self.min_y + 1) as u32
    }

    /// Number of candidate positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offset(&self) -> Position {
        Position::new(self.min_x, self.min_y)
    }

    #[inline]
    pub fn position_of(&self, index: usize) -> Position {
        let height = self.height() as usize;
        Position::new(
            (index / height) as i32 + self.min_x,
            (index % height) as i32 + self.min_y,
        )
    }

    pub fn index_of(&self, position: Position) -> Option<usize> {
        if !self.contains(position) {
            return None;
        }
        let x = (position.x - self.min_x) as usize;
        let y = (position.y - self.min_y) as usize;
        Some(x * self.height() as usize + y)
    }

    pub fn contains(&self, position: Position) -> bool {
        position.x >= self.min_x
            && position.x <= self.max_x
            && position.y >= self.min_y
            && position.y <= self.max_y
    }

    /// Candidate positions in flat index order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.len()).map(move |i| self.position_of(i))
    }
}

/// Dense `[length][dimension]` feature table with one contiguous row per candidate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DenseFeatureTable {
    dimension: usize,
    values: Vec<f64>,
}

impl DenseFeatureTable {
    pub fn new(length: usize, dimension: usize) -> Result<Self> {
        Ok(DenseFeatureTable {
            dimension,
            values: vec![0.0; table_len(length, dimension)?],
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.values.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn row(&self, index: usize) -> &[f64] {
        let start = index * self.dimension;
        &self.values[start..start + self.dimension]
    }

    #[inline]
    pub fn row_mut(&mut self, index: usize) -> &mut [f64] {
        let start = index * self.dimension;
        &mut self.values[start..start + self.dimension]
    }

    pub fn feature_at(&self, index: usize, feature_vector: &mut [f64]) {
        feature_vector[..self.dimension].copy_from_slice(self.row(index));
    }

    pub fn dot_product_with_wq(&self, w: &[f64], q: &mut [f64]) {
        if self.dimension == 0 {
            q.iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        for (q_value, row) in q.iter_mut().zip(self.values.chunks_exact(self.dimension)) {
            *q_value = math::vector_inner_product(w, row);
        }
    }

    #[inline]
    pub fn q_value(&self, index: usize, w: &[f64]) -> f64 {
        math::vector_inner_product(w, self.row(index))
    }
}

/// Copies the `width` x `height` window at `top_left` column by column into `window`.
///
/// Pixels outside of the image read as zero.
pub(crate) fn copy_window(
    image: &ImageData,
    top_left: Position,
    width: u32,
    height: u32,
    window: &mut [i32],
) {
    let height = height as usize;
    for x in 0..width as usize {
        for y in 0..height {
            window[x * height + y] = i32::from(
                image
                    .get(top_left.x + x as i32, top_left.y + y as i32)
                    .unwrap_or(0),
            );
        }
    }
}
