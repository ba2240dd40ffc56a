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
use crate::error::Result;
use crate::feat::{FeatureMap, HogFeatureMap, SearchSpace, SparseLbpFeatureMap};
use crate::loss::Loss;

/// Descriptor of an appearance model together with its hyper-parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppearanceKind {
    SparseLbp {
        height_of_pyramid: u32,
    },
    Hog {
        n_bins: u32,
        cell_size: u32,
        block_size: u32,
    },
}

impl AppearanceKind {
    /// Type tag used by the model file.
    pub fn id(&self) -> i32 {
        match self {
            AppearanceKind::SparseLbp { .. } => 1,
            AppearanceKind::Hog { .. } => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AppearanceKind::SparseLbp { .. } => "SPARSE_LBP",
            AppearanceKind::Hog { .. } => "HOG",
        }
    }

    /// Feature dimension for windows of `window_width` x `window_height` pixels.
    pub fn dimension(&self, window_width: u32, window_height: u32) -> Result<usize> {
        match *self {
            AppearanceKind::SparseLbp { height_of_pyramid } => {
                SparseLbpFeatureMap::dimension_for(window_width, window_height, height_of_pyramid)
            }
            AppearanceKind::Hog {
                n_bins,
                cell_size,
                block_size,
            } => HogFeatureMap::dimension_for(
                window_width,
                window_height,
                n_bins,
                cell_size,
                block_size,
            ),
        }
    }
}

#[derive(Clone, Debug)]
enum Features {
    SparseLbp(SparseLbpFeatureMap),
    Hog(HogFeatureMap),
}

impl Features {
    fn as_feature_map(&self) -> &dyn FeatureMap {
        match self {
            Features::SparseLbp(map) => map,
            Features::Hog(map) => map,
        }
    }

    fn as_feature_map_mut(&mut self) -> &mut dyn FeatureMap {
        match self {
            Features::SparseLbp(map) => map,
            Features::Hog(map) => map,
        }
    }
}

/// Unary scoring of the candidate positions of one landmark.
#[derive(Clone, Debug)]
pub struct AppearanceModel {
    node_id: usize,
    search_space: SearchSpace,
    window_width: u32,
    window_height: u32,
    window_positions: Vec<Position>,
    kind: AppearanceKind,
    features: Features,
    loss: Option<Loss>,
}

impl AppearanceModel {
    /// Creates the model of node `node_id`; the feature window of a candidate is centered
    /// at the candidate position.
    pub fn new(
        node_id: usize,
        search_space: SearchSpace,
        window_width: u32,
        window_height: u32,
        kind: AppearanceKind,
        loss: Option<Loss>,
    ) -> Result<Self> {
        let length = search_space.len();
        let features = match kind {
            AppearanceKind::SparseLbp { height_of_pyramid } => Features::SparseLbp(
                SparseLbpFeatureMap::new(window_width, window_height, height_of_pyramid, length)?,
            ),
            AppearanceKind::Hog {
                n_bins,
                cell_size,
                block_size,
            } => Features::Hog(HogFeatureMap::new(
                window_width,
                window_height,
                n_bins,
                cell_size,
                block_size,
                length,
            )?),
        };

        let half_w = (window_width / 2) as i32;
        let half_h = (window_height / 2) as i32;
        let window_positions = search_space
            .positions()
            .map(|p| Position::new(p.x - half_w, p.y - half_h))
            .collect();

        Ok(AppearanceModel {
            node_id,
            search_space,
            window_width,
            window_height,
            window_positions,
            kind,
            features,
            loss,
        })
    }

    pub fn node_id(&self) -> usize {
        self.node_id
    }

    pub fn search_space(&self) -> &SearchSpace {
        &self.search_space
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    /// Top-left corners of the feature windows, one per candidate.
    pub fn window_positions(&self) -> &[Position] {
        &self.window_positions
    }

    pub fn kind(&self) -> &AppearanceKind {
        &self.kind
    }

    pub fn loss(&self) -> Option<&Loss> {
        self.loss.as_ref()
    }

    pub fn set_loss_normalization_factor(&mut self, factor: f64) {
        if let Some(loss) = self.loss.as_mut() {
            loss.set_normalization_factor(factor);
        }
    }

    /// Number of candidate positions.
    #[inline]
    pub fn length(&self) -> usize {
        self.search_space.len()
    }

    #[inline]
    pub fn feature_dimension(&self) -> usize {
        self.features.as_feature_map().dimension()
    }

    /// Recomputes the features on the normalized frame `image` and writes the unary score
    /// of every candidate into `q`.
    ///
    /// With `ground_truth` the loss of each candidate is added to its score.
    pub fn update(
        &mut self,
        image: &ImageData,
        w: &[f64],
        q: &mut [f64],
        ground_truth: Option<Position>,
    ) {
        debug_assert_eq!(w.len(), self.feature_dimension());
        debug_assert_eq!(q.len(), self.length());

        let feature_map = self.features.as_feature_map_mut();
        feature_map.compute(image, &self.window_positions);
        feature_map.dot_product_with_wq(w, q);

        if let (Some(loss), Some(gt)) = (self.loss.as_ref(), ground_truth) {
            for (i, q_value) in q.iter_mut().enumerate() {
                *q_value += if loss.is_table() {
                    loss.loss_at(i)
                } else {
                    loss.compute_loss(gt, self.search_space.position_of(i))
                };
            }
        }
    }

    pub fn feature_at(&self, index: usize, feature_vector: &mut [f64]) {
        self.features.as_feature_map().feature_at(index, feature_vector);
    }

    /// Unary score of the candidate at `position`, `None` outside of the search space.
    pub fn q_value(&self, position: Position, w: &[f64]) -> Option<f64> {
        let index = self.search_space.index_of(position)?;
        Some(self.features.as_feature_map().q_value(index, w))
    }
}
