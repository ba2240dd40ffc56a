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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Unsupported appearance model type: {0}")]
    UnsupportedAppearanceModel(i32),

    #[error("Unsupported graph type: {0}")]
    UnsupportedGraph(i32),

    #[error("Unsupported loss type: {0}")]
    UnsupportedLoss(i32),

    #[error("Unsupported deformation cost type: {0}")]
    UnsupportedDeformationCost(i32),

    #[error("Dimension mismatch for {what}: {actual} elements, expected {expected}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Edges do not form a tree: {0}")]
    NotATree(String),

    #[error("Illegal image: {0}")]
    IllegalImage(String),

    #[error("Illegal bounding box: {0}")]
    IllegalBoundingBox(String),

    #[error("Crop region ({x}, {y}, {width}x{height}) leaves the {image_width}x{image_height} image")]
    CropOutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Landmark {landmark} at ({x}, {y}) lies outside of its search space")]
    PositionOutOfSearchSpace { landmark: usize, x: i32, y: i32 },

    #[error("Illegal ground truth: {0}")]
    IllegalGroundTruth(String),

    #[error("Ground truth has {actual} landmarks, expected {expected}")]
    GroundTruthLength { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
