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

use crate::common::{ImageData, Position};
use crate::error::{Error, Result};
use crate::feat::{
    copy_window, table_len, FeatureMap, MAX_FEATURE_DIMENSION, MAX_WINDOW_SIZE,
};
use crate::math;

const PATTERNS: u32 = 256;

/// Local binary patterns over a pyramid of the window, one-hot encoded.
///
/// Every inner pixel of every pyramid level owns a block of 256 feature slots, and exactly
/// one slot per block is set. Only the indices of the set slots are stored.
#[derive(Clone, Debug)]
pub struct SparseLbpFeatureMap {
    height_of_pyramid: u32,
    window_width: usize,
    window_height: usize,
    dimension: usize,
    sparse_dimension: usize,
    features: Vec<u32>,
    window: Vec<i32>,
}

impl FeatureMap for SparseLbpFeatureMap {
    fn compute(&mut self, image: &ImageData, windows: &[Position]) {
        for (index, &top_left) in windows.iter().enumerate() {
            // the window is consumed by the pyramid, so it is copied for every candidate
            copy_window(
                image,
                top_left,
                self.window_width as u32,
                self.window_height as u32,
                &mut self.window,
            );
            self.compute_patterns(index);
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn feature_at(&self, index: usize, feature_vector: &mut [f64]) {
        feature_vector[..self.dimension]
            .iter_mut()
            .for_each(|v| *v = 0.0);
        for &i in self.indices(index) {
            feature_vector[i as usize] = 1.0;
        }
    }

    fn dot_product_with_wq(&self, w: &[f64], q: &mut [f64]) {
        for (i, q_value) in q.iter_mut().enumerate() {
            *q_value = math::sparse_gather_sum(w, self.indices(i));
        }
    }

    fn q_value(&self, index: usize, w: &[f64]) -> f64 {
        math::sparse_gather_sum(w, self.indices(index))
    }
}

impl SparseLbpFeatureMap {
    pub fn new(
        window_width: u32,
        window_height: u32,
        height_of_pyramid: u32,
        length: usize,
    ) -> Result<Self> {
        let dimension =
            SparseLbpFeatureMap::dimension_for(window_width, window_height, height_of_pyramid)?;
        if dimension == 0 {
            return Err(Error::InvalidModel(format!(
                "LBP window {}x{} with {} pyramid levels has no features",
                window_width, window_height, height_of_pyramid
            )));
        }
        let sparse_dimension = dimension / PATTERNS as usize;

        Ok(SparseLbpFeatureMap {
            height_of_pyramid,
            window_width: window_width as usize,
            window_height: window_height as usize,
            dimension,
            sparse_dimension,
            features: vec![0; table_len(length, sparse_dimension)?],
            window: vec![0; window_width as usize * window_height as usize],
        })
    }

    /// Dense dimension: 256 slots for each inner pixel of each pyramid level.
    pub fn dimension_for(
        window_width: u32,
        window_height: u32,
        height_of_pyramid: u32,
    ) -> Result<usize> {
        if window_width > MAX_WINDOW_SIZE || window_height > MAX_WINDOW_SIZE {
            return Err(Error::InvalidModel(format!(
                "LBP window {}x{} is larger than {} pixels",
                window_width, window_height, MAX_WINDOW_SIZE
            )));
        }
        let overflow = || {
            Error::InvalidModel(format!(
                "LBP dimension of a {}x{} window with {} pyramid levels is too large",
                window_width, window_height, height_of_pyramid
            ))
        };

        let mut w = window_width as usize;
        let mut h = window_height as usize;
        let mut positions: usize = 0;

        for _ in 0..height_of_pyramid {
            if w.min(h) < 3 {
                break;
            }
            positions = (w - 2)
                .checked_mul(h - 2)
                .and_then(|level| positions.checked_add(level))
                .ok_or_else(overflow)?;
            w >>= 1;
            h >>= 1;
        }

        positions
            .checked_mul(PATTERNS as usize)
            .filter(|&dimension| dimension <= MAX_FEATURE_DIMENSION)
            .ok_or_else(overflow)
    }

    pub fn height_of_pyramid(&self) -> u32 {
        self.height_of_pyramid
    }

    /// Number of stored indices per candidate.
    pub fn sparse_dimension(&self) -> usize {
        self.sparse_dimension
    }

    /// Indices of the nonzero features of the candidate `index`.
    #[inline]
    pub fn indices(&self, index: usize) -> &[u32] {
        let start = index * self.sparse_dimension;
        &self.features[start..start + self.sparse_dimension]
    }

    fn compute_patterns(&mut self, index: usize) {
        let stride = self.window_height;
        let sparse_dimension = self.sparse_dimension;
        let window = &mut self.window;
        let vec = &mut self.features[index * sparse_dimension..(index + 1) * sparse_dimension];

        let mut ww = self.window_width;
        let mut hh = self.window_height;
        let mut idx = 0;
        let mut offset = 0;

        loop {
            for x in 1..ww.saturating_sub(1) {
                for y in 1..hh.saturating_sub(1) {
                    let at = |dx: usize, dy: usize| window[(x + dx - 1) * stride + y + dy - 1];
                    let center = at(1, 1);

                    let mut pattern = 0u32;
                    if at(0, 0) < center {
                        pattern |= 0x01;
                    }
                    if at(1, 0) < center {
                        pattern |= 0x02;
                    }
                    if at(2, 0) < center {
                        pattern |= 0x04;
                    }
                    if at(0, 1) < center {
                        pattern |= 0x08;
                    }
                    if at(2, 1) < center {
                        pattern |= 0x10;
                    }
                    if at(0, 2) < center {
                        pattern |= 0x20;
                    }
                    if at(1, 2) < center {
                        pattern |= 0x40;
                    }
                    if at(2, 2) < center {
                        pattern |= 0x80;
                    }

                    vec[idx] = offset + pattern;
                    idx += 1;
                    offset += PATTERNS;
                }
            }

            if idx >= sparse_dimension {
                return;
            }

            // next level: sum pixel pairs, first along x, then along y
            ww &= !1;
            hh &= !1;

            ww >>= 1;
            for x in 0..ww {
                for y in 0..hh {
                    window[x * stride + y] = window[2 * x * stride + y] + window[(2 * x + 1) * stride + y];
                }
            }

            hh >>= 1;
            for y in 0..hh {
                for x in 0..ww {
                    window[x * stride + y] = window[x * stride + 2 * y] + window[x * stride + 2 * y + 1];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension() {
        // 4x4 inner pixels, then a 3x3 level with a single inner pixel
        assert_eq!((16 + 1) * 256, SparseLbpFeatureMap::dimension_for(6, 6, 4).unwrap());
        assert_eq!(16 * 256, SparseLbpFeatureMap::dimension_for(6, 6, 1).unwrap());
        assert_eq!(0, SparseLbpFeatureMap::dimension_for(2, 6, 4).unwrap());
        assert!(SparseLbpFeatureMap::dimension_for(u32::MAX, u32::MAX, 32).is_err());
        assert!(SparseLbpFeatureMap::dimension_for(MAX_WINDOW_SIZE + 1, 6, 1).is_err());
        assert!(SparseLbpFeatureMap::dimension_for(MAX_WINDOW_SIZE, MAX_WINDOW_SIZE, 1).is_err());
        assert!(SparseLbpFeatureMap::new(2, 6, 4, 1).is_err());
    }

    #[test]
    fn test_flat_window_has_zero_patterns() {
        let data = vec![50u8; 20 * 20];
        let image = ImageData::new(&data, 20, 20);
        let mut map = SparseLbpFeatureMap::new(12, 10, 3, 1).unwrap();
        map.compute(&image, &[Position::new(4, 4)]);

        for (i, &index) in map.indices(0).iter().enumerate() {
            assert_eq!(256 * i as u32, index);
        }
    }

    #[test]
    fn test_indices_are_in_range() {
        let data: Vec<u8> = (0..24 * 24).map(|i| ((i * 7919) % 256) as u8).collect();
        let image = ImageData::new(&data, 24, 24);
        let windows = [Position::new(0, 0), Position::new(5, 2), Position::new(11, 13)];
        let mut map = SparseLbpFeatureMap::new(13, 11, 4, windows.len()).unwrap();
        map.compute(&image, &windows);

        let base_level = 11 * 9;
        for c in 0..windows.len() {
            let indices = map.indices(c);
            assert_eq!(map.sparse_dimension(), indices.len());
            for (i, &index) in indices.iter().enumerate() {
                let pattern = index - 256 * i as u32;
                assert!(pattern < 256);
                assert!((index as usize) < map.dimension());
                if i < base_level {
                    assert!(index < 256 * base_level as u32);
                }
            }
        }
    }

    #[test]
    fn test_pattern_bits() {
        // 3x3 window with a bright center: every neighbour is darker
        let bright = [10u8, 10, 10, 10, 200, 10, 10, 10, 10];
        let image = ImageData::new(&bright, 3, 3);
        let mut map = SparseLbpFeatureMap::new(3, 3, 1, 1).unwrap();
        map.compute(&image, &[Position::new(0, 0)]);
        assert_eq!(&[0xff], map.indices(0));

        // only the top-left and the right neighbours are darker
        let mixed = [1u8, 90, 90, 90, 50, 20, 90, 90, 90];
        let image = ImageData::new(&mixed, 3, 3);
        map.compute(&image, &[Position::new(0, 0)]);
        assert_eq!(&[0x01 | 0x10], map.indices(0));
    }

    #[test]
    fn test_dot_product_and_dense_feature_agree() {
        let data: Vec<u8> = (0..16 * 16).map(|i| ((i * 31) % 253) as u8).collect();
        let image = ImageData::new(&data, 16, 16);
        let windows = [Position::new(1, 1), Position::new(4, 6)];
        let mut map = SparseLbpFeatureMap::new(8, 8, 2, windows.len()).unwrap();
        map.compute(&image, &windows);

        let w: Vec<f64> = (0..map.dimension()).map(|i| (i % 13) as f64 - 6.0).collect();
        let mut q = vec![0.0; windows.len()];
        map.dot_product_with_wq(&w, &mut q);

        let mut feature = vec![0.0; map.dimension()];
        for c in 0..windows.len() {
            map.feature_at(c, &mut feature);
            assert_eq!(map.sparse_dimension() as f64, feature.iter().sum::<f64>());
            assert_eq!(math::vector_inner_product(&w, &feature), q[c]);
            assert_eq!(q[c], map.q_value(c, &w));
        }
    }
}
