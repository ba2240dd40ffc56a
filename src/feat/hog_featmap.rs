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

use std::f64::consts::PI;

use crate::common::{ImageData, Position};
use crate::error::{Error, Result};
use crate::feat::{
    copy_window, DenseFeatureTable, FeatureMap, MAX_FEATURE_DIMENSION, MAX_WINDOW_SIZE,
};

/// Histograms of oriented gradients over square cells, grouped into half-overlapping
/// square blocks that are L2-normalized one by one.
#[derive(Clone, Debug)]
pub struct HogFeatureMap {
    n_bins: usize,
    cell_size: usize,
    block_size: usize,
    window_width: usize,
    window_height: usize,
    cells_w: usize,
    cells_h: usize,
    features: DenseFeatureTable,
    window: Vec<i32>,
    angles: Vec<f64>,
    magnitudes: Vec<f64>,
    hist: Vec<f64>,
}

impl FeatureMap for HogFeatureMap {
    fn compute(&mut self, image: &ImageData, windows: &[Position]) {
        for (index, &top_left) in windows.iter().enumerate() {
            copy_window(
                image,
                top_left,
                self.window_width as u32,
                self.window_height as u32,
                &mut self.window,
            );
            self.compute_gradients();
            self.compute_histogram();
            self.write_blocks(index);
        }
    }

    fn dimension(&self) -> usize {
        self.features.dimension()
    }

    fn feature_at(&self, index: usize, feature_vector: &mut [f64]) {
        self.features.feature_at(index, feature_vector);
    }

    fn dot_product_with_wq(&self, w: &[f64], q: &mut [f64]) {
        self.features.dot_product_with_wq(w, q);
    }

    fn q_value(&self, index: usize, w: &[f64]) -> f64 {
        self.features.q_value(index, w)
    }
}

impl HogFeatureMap {
    /// Feature map of `length` candidate windows of `window_width` x `window_height` pixels.
    pub fn new(
        window_width: u32,
        window_height: u32,
        n_bins: u32,
        cell_size: u32,
        block_size: u32,
        length: usize,
    ) -> Result<Self> {
        let dimension =
            HogFeatureMap::dimension_for(window_width, window_height, n_bins, cell_size, block_size)?;

        let window_width = window_width as usize;
        let window_height = window_height as usize;
        let cell_size = cell_size as usize;
        let n_bins = n_bins as usize;
        let inner = (window_width - 2) * (window_height - 2);
        let cells_w = div_ceil(window_width - 2, cell_size);
        let cells_h = div_ceil(window_height - 2, cell_size);

        Ok(HogFeatureMap {
            n_bins,
            cell_size,
            block_size: block_size as usize,
            window_width,
            window_height,
            cells_w,
            cells_h,
            features: DenseFeatureTable::new(length, dimension)?,
            window: vec![0; window_width * window_height],
            angles: vec![0.0; inner],
            magnitudes: vec![0.0; inner],
            hist: vec![0.0; cells_w * cells_h * n_bins],
        })
    }

    /// Length of the feature vector for the given window and descriptor parameters.
    pub fn dimension_for(
        window_width: u32,
        window_height: u32,
        n_bins: u32,
        cell_size: u32,
        block_size: u32,
    ) -> Result<usize> {
        if window_width < 3 || window_height < 3 {
            return Err(Error::InvalidModel(format!(
                "HOG window must be at least 3x3, got {}x{}",
                window_width, window_height
            )));
        }
        if window_width > MAX_WINDOW_SIZE || window_height > MAX_WINDOW_SIZE {
            return Err(Error::InvalidModel(format!(
                "HOG window {}x{} is larger than {} pixels",
                window_width, window_height, MAX_WINDOW_SIZE
            )));
        }
        if n_bins == 0 || cell_size == 0 || block_size < 2 {
            return Err(Error::InvalidModel(format!(
                "Illegal HOG parameters: bins ({}), cell size ({}), block size ({})",
                n_bins, cell_size, block_size
            )));
        }

        let cells_w = div_ceil(window_width as usize - 2, cell_size as usize);
        let cells_h = div_ceil(window_height as usize - 2, cell_size as usize);
        let block_size = block_size as usize;

        // blocks are clipped to the cell grid, so the count separates per axis
        let cells = block_cells(cells_w, block_size).checked_mul(block_cells(cells_h, block_size));
        let dimension = cells
            .and_then(|cells| cells.checked_mul(n_bins as usize))
            .filter(|&dimension| dimension <= MAX_FEATURE_DIMENSION)
            .ok_or_else(|| {
                Error::InvalidModel(format!(
                    "HOG dimension of a {}x{} window with {} bins of {} pixel cells is too large",
                    window_width, window_height, n_bins, cell_size
                ))
            })?;
        if dimension == 0 {
            return Err(Error::InvalidModel(format!(
                "HOG window {}x{} holds no complete block of {} cells of {} pixels",
                window_width, window_height, block_size, cell_size
            )));
        }
        Ok(dimension)
    }

    pub fn n_bins(&self) -> u32 {
        self.n_bins as u32
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size as u32
    }

    pub fn block_size(&self) -> u32 {
        self.block_size as u32
    }

    fn compute_gradients(&mut self) {
        let h = self.window_height;
        let inner_h = h - 2;
        let n_bins = self.n_bins as f64;

        for x in 1..self.window_width - 1 {
            for y in 1..h - 1 {
                let dx = f64::from(self.window[(x + 1) * h + y] - self.window[(x - 1) * h + y]);
                let dy = f64::from(self.window[x * h + y + 1] - self.window[x * h + y - 1]);
                let theta = if dx == 0.0 { 0.0 } else { (dy / dx).atan() };

                let i = (x - 1) * inner_h + y - 1;
                self.angles[i] = (theta / PI + 0.5) * n_bins;
                self.magnitudes[i] = dx.hypot(dy);
            }
        }
    }

    fn compute_histogram(&mut self) {
        let inner_w = self.window_width - 2;
        let inner_h = self.window_height - 2;
        let cell_dim = self.cells_w * self.cells_h;

        self.hist.iter_mut().for_each(|v| *v = 0.0);

        for x in 0..inner_w {
            for y in 0..inner_h {
                let i = x * inner_h + y;
                let angle = self.angles[i];
                let magnitude = self.magnitudes[i];

                let lower = angle.floor();
                let weight = 1.0 - (angle - lower);
                let lhid = lower as usize % self.n_bins;
                let uhid = (lhid + 1) % self.n_bins;

                let cid = (x / self.cell_size) * self.cells_h + y / self.cell_size;
                self.hist[cid + lhid * cell_dim] += weight * magnitude;
                self.hist[cid + uhid * cell_dim] += (1.0 - weight) * magnitude;
            }
        }
    }

    fn write_blocks(&mut self, index: usize) {
        let cell_dim = self.cells_w * self.cells_h;
        let row = self.features.row_mut(index);

        let mut k = 0;
        for bi in block_origins(self.cells_w, self.block_size) {
            for bj in block_origins(self.cells_h, self.block_size) {
                let start = k;
                let mut energy = 0.0;

                for x in bi..bi + self.block_size {
                    for y in bj..bj + self.block_size {
                        if y >= self.cells_h || x >= self.cells_w {
                            continue;
                        }
                        for lhid in 0..self.n_bins {
                            let v = self.hist[lhid * cell_dim + x * self.cells_h + y];
                            row[k] = v;
                            energy += v * v;
                            k += 1;
                        }
                    }
                }

                let block = &mut row[start..k];
                if energy == 0.0 {
                    let c = 1.0 / (block.len() as f64).sqrt();
                    block.iter_mut().for_each(|v| *v = c);
                } else {
                    let norm = energy.sqrt();
                    block.iter_mut().for_each(|v| *v /= norm);
                }
            }
        }
    }
}

#[inline]
fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// First cell of every block along one axis; blocks advance by half their size.
fn block_origins(cells: usize, block_size: usize) -> impl Iterator<Item = usize> {
    let step = block_size / 2;
    (0..cells.saturating_sub(step)).step_by(step)
}

/// Cells covered by all blocks along one axis, counting overlaps.
fn block_cells(cells: usize, block_size: usize) -> usize {
    block_origins(cells, block_size)
        .map(|origin| block_size.min(cells - origin))
        .sum()
}
