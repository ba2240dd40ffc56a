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

//! Facial landmark detection with a tree-structured deformable part model.
//!
//! Every landmark is scored by an appearance model (HOG or sparse LBP features) over a
//! rectangular search space of a fixed-size normalized frame, every edge of the tree by a
//! quadratic displacement cost, and the best configuration is found with max-sum dynamic
//! programming.

mod common;
mod deform;
mod detector;
mod error;
mod feat;
mod loss;
mod math;
pub mod model;
mod solver;

pub use crate::common::{
    BoundingBox, GeneralBoundingBox, ImageBuffer, ImageData, Point, Position, Timings,
};
pub use crate::deform::DisplacementDeformationCost;
pub use crate::detector::Flandmark;
pub use crate::error::{Error, Result};
pub use crate::feat::{
    AppearanceKind, AppearanceModel, FeatureMap, HogFeatureMap, SearchSpace, SparseLbpFeatureMap,
};
pub use crate::loss::{Loss, LossKind};
pub use crate::model::{load_model, read_model, save_model, write_model, Model};
pub use crate::solver::{EdgeScores, GraphKind, MaxSumSolver, NodeScores, TreeMaxSumSolver};

use std::path::Path;

/// Create a landmark detector, based on a file with model description.
pub fn create_detector<P: AsRef<Path>>(path_to_model: P) -> Result<Box<dyn Detector>> {
    let model = load_model(path_to_model)?;
    create_detector_with_model(model)
}

/// Create a landmark detector, based on the provided model.
pub fn create_detector_with_model(model: Model) -> Result<Box<dyn Detector>> {
    Ok(Box::new(Flandmark::new(model)?))
}

/// Facial landmark detector.
///
/// # Examples
///
/// ```no_run
/// use flandmark::{BoundingBox, Detector, ImageData};
///
/// let mut detector = flandmark::create_detector("/path/to/model").unwrap();
/// detector.set_normalization_factor(1.0);
///
/// let bytes = vec![0u8; 640 * 480];
/// let image = ImageData::new(&bytes, 640, 480);
/// let face = BoundingBox::new(220, 140, 420, 340);
/// for landmark in detector.detect(&image, &face).unwrap() {
///     println!("found landmark: {:?}", landmark);
/// }
/// ```
pub trait Detector: Send {
    /// Detect landmarks of the face in `bbox`.
    ///
    /// The input image should be gray-scale, i.e. `num_channels` set to 1. Landmarks are
    /// returned in image coordinates, in the order of the model's nodes.
    fn detect(&mut self, image: &ImageData, bbox: &BoundingBox) -> Result<Vec<Point>>;

    /// Detect landmarks on the horizontally flipped face and map them back to the image.
    ///
    /// Models trained on one half of a symmetric face can be applied to the other half this way.
    fn detect_mirrored(&mut self, image: &ImageData, bbox: &BoundingBox) -> Result<Vec<Point>>;

    /// Detect landmarks of an in-plane rotated face.
    fn detect_general_bbox(
        &mut self,
        image: &ImageData,
        bbox: &GeneralBoundingBox,
    ) -> Result<Vec<Point>>;

    /// Rotated and mirrored variant, see [`detect_mirrored`](Detector::detect_mirrored).
    fn detect_general_bbox_mirrored(
        &mut self,
        image: &ImageData,
        bbox: &GeneralBoundingBox,
    ) -> Result<Vec<Point>>;

    /// Set the factor applied to every loss of the model.
    ///
    /// # Panics
    ///
    /// Panics if `factor` is not a positive finite number.
    fn set_normalization_factor(&mut self, factor: f64);

    /// Reject face regions that leave the image instead of padding them with zeros.
    fn set_strict_bounds(&mut self, strict: bool);

    /// Solve edges with concave quadratic weights by a distance transform instead of
    /// exhaustive search.
    fn set_distance_transform(&mut self, enabled: bool);

    /// Number of landmarks reported by every detection.
    fn landmarks_count(&self) -> usize;

    /// Stage durations of the last detection.
    fn timings(&self) -> &Timings;
}
