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

use std::mem;
use std::time::Instant;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::common::{
    crop_resize_image, resize_image, rotate_image, BoundingBox, GeneralBoundingBox, ImageBuffer,
    ImageData, Point, Position, Timings,
};
use crate::deform::DisplacementDeformationCost;
use crate::error::{Error, Result};
use crate::feat::AppearanceModel;
use crate::loss::Loss;
use crate::math;
use crate::model::{AppearanceSpec, EdgeSpec, Model, NodeSpec};
use crate::solver::{EdgeScores, MaxSumSolver, NodeScores, TreeMaxSumSolver};
use crate::Detector;

impl Detector for Flandmark {
    fn detect(&mut self, image: &ImageData, bbox: &BoundingBox) -> Result<Vec<Point>> {
        self.detect_impl(image, Face::Aligned(bbox), false)
    }

    fn detect_mirrored(&mut self, image: &ImageData, bbox: &BoundingBox) -> Result<Vec<Point>> {
        self.detect_impl(image, Face::Aligned(bbox), true)
    }

    fn detect_general_bbox(
        &mut self,
        image: &ImageData,
        bbox: &GeneralBoundingBox,
    ) -> Result<Vec<Point>> {
        self.detect_impl(image, Face::General(bbox), false)
    }

    fn detect_general_bbox_mirrored(
        &mut self,
        image: &ImageData,
        bbox: &GeneralBoundingBox,
    ) -> Result<Vec<Point>> {
        self.detect_impl(image, Face::General(bbox), true)
    }

    fn set_normalization_factor(&mut self, factor: f64) {
        if !(factor > 0.0 && factor.is_finite()) {
            panic!("Illegal normalization factor: {}", factor);
        }
        self.normalization_factor = factor;
    }

    #[inline]
    fn set_strict_bounds(&mut self, strict: bool) {
        self.strict_bounds = strict;
    }

    #[inline]
    fn set_distance_transform(&mut self, enabled: bool) {
        self.solver.set_distance_transform(enabled);
    }

    fn landmarks_count(&self) -> usize {
        self.vertices.len()
    }

    fn timings(&self) -> &Timings {
        &self.timings
    }
}

#[inline]
fn is_legal_image(image: &ImageData) -> bool {
    image.num_channels() == 1
        && image.width() > 0
        && image.height() > 0
        && image.data().len() >= image.width() as usize * image.height() as usize
}

#[derive(Clone, Copy)]
enum Face<'a> {
    Aligned(&'a BoundingBox),
    General(&'a GeneralBoundingBox),
}

#[derive(Clone, Debug)]
struct Vertex {
    name: String,
    appearances: Vec<AppearanceModel>,
    w: Vec<Vec<f64>>,
    q: Vec<Vec<f64>>,
    best: usize,
}

#[derive(Clone, Debug)]
struct Edge {
    parent: usize,
    child: usize,
    cost: DisplacementDeformationCost,
    w: Vec<f64>,
}

/// Landmark detector over a tree of landmarks.
///
/// All working buffers are owned by the detector and reused between calls, so one instance
/// serves one thread at a time; clone it to detect on several threads.
#[derive(Clone, Debug)]
pub struct Flandmark {
    name: String,
    base_window: (u32, u32),
    margins: (f64, f64),
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    solver: TreeMaxSumSolver,
    ground_truth: Option<Vec<Point>>,
    ground_truth_nf: Vec<Position>,
    landmarks: Vec<Point>,
    landmarks_nf: Vec<Position>,
    q_values: Vec<f64>,
    g_values: Vec<f64>,
    score: f64,
    region: [f64; 4],
    scale_factor: (f64, f64),
    offset: (f64, f64),
    rotated: ImageBuffer,
    normalized: ImageBuffer,
    timings: Timings,
    normalization_factor: f64,
    strict_bounds: bool,
}

impl Flandmark {
    pub fn new(model: Model) -> Result<Self> {
        let (bw, bh) = model.base_window();

        let mut vertices = Vec::with_capacity(model.nodes().len());
        for (i, node) in model.nodes().iter().enumerate() {
            let mut appearances = Vec::with_capacity(node.appearances.len());
            for spec in &node.appearances {
                let appearance = AppearanceModel::new(
                    i,
                    node.search_space,
                    node.window_size.0,
                    node.window_size.1,
                    spec.kind,
                    spec.loss.clone().map(Loss::new),
                )?;
                appearances.push(appearance);
            }

            vertices.push(Vertex {
                name: node.name.clone(),
                q: appearances.iter().map(|a| vec![0.0; a.length()]).collect(),
                w: node.appearances.iter().map(|spec| spec.w.clone()).collect(),
                appearances,
                best: 0,
            });
        }

        let edges = model
            .edges()
            .iter()
            .map(|spec| {
                let cost = DisplacementDeformationCost::new(
                    model.nodes()[spec.parent].search_space,
                    model.nodes()[spec.child].search_space,
                    spec.dimension,
                    spec.loss.clone().map(Loss::new),
                )?;
                Ok(Edge {
                    parent: spec.parent,
                    child: spec.child,
                    cost,
                    w: spec.w.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pairs: Vec<(usize, usize)> = edges.iter().map(|e| (e.parent, e.child)).collect();
        let solver = TreeMaxSumSolver::new(vertices.len(), &pairs)?;

        let num_nodes = vertices.len();
        let num_edges = edges.len();

        Ok(Flandmark {
            name: model.name().to_string(),
            base_window: (bw, bh),
            margins: model.margins(),
            vertices,
            edges,
            solver,
            ground_truth: None,
            ground_truth_nf: Vec::with_capacity(num_nodes),
            landmarks: vec![Point::default(); num_nodes],
            landmarks_nf: vec![Position::default(); num_nodes],
            q_values: vec![0.0; num_nodes],
            g_values: vec![0.0; num_edges],
            score: 0.0,
            region: [0.0; 4],
            scale_factor: (1.0, 1.0),
            offset: (0.0, 0.0),
            rotated: ImageBuffer::default(),
            normalized: ImageBuffer::new(bw, bh),
            timings: Timings::default(),
            normalization_factor: 1.0,
            strict_bounds: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the normalized frame.
    pub fn base_window(&self) -> (u32, u32) {
        self.base_window
    }

    pub fn landmark_names(&self) -> Vec<&str> {
        self.vertices.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn normalization_factor(&self) -> f64 {
        self.normalization_factor
    }

    /// Ground truth in image coordinates used by the following image-level detections to
    /// add the node losses to the unary scores; `None` turns loss-augmented detection off.
    pub fn set_ground_truth(&mut self, ground_truth: Option<&[Point]>) -> Result<()> {
        if let Some(gt) = ground_truth {
            self.check_ground_truth_len(gt.len())?;
            if let Some((i, point)) = gt
                .iter()
                .enumerate()
                .find(|(_, p)| !(p.x.is_finite() && p.y.is_finite()))
            {
                return Err(Error::IllegalGroundTruth(format!(
                    "Landmark {} at {:?} is not a finite point",
                    i, point
                )));
            }
        }
        self.ground_truth = ground_truth.map(|gt| gt.to_vec());
        Ok(())
    }

    fn check_ground_truth_len(&self, len: usize) -> Result<()> {
        if len != self.vertices.len() {
            return Err(Error::GroundTruthLength {
                expected: self.vertices.len(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Landmarks of the last detection in image coordinates.
    pub fn landmarks(&self) -> &[Point] {
        &self.landmarks
    }

    /// Landmarks of the last detection in the (unmirrored) normalized frame.
    pub fn landmarks_nf(&self) -> &[Position] {
        &self.landmarks_nf
    }

    /// Unary score of every landmark at its detected position.
    pub fn q_values(&self) -> &[f64] {
        &self.q_values
    }

    /// Pairwise score of every edge at the detected positions.
    pub fn g_values(&self) -> &[f64] {
        &self.g_values
    }

    /// Total score of the last detection.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Normalized frame of the last detection, mirrored for the mirrored variants.
    pub fn normalized_frame(&self) -> &ImageBuffer {
        &self.normalized
    }

    /// Enlarged face region `[x, y, width, height]` of the last detection.
    pub fn region(&self) -> [f64; 4] {
        self.region
    }

    pub fn scale_factor(&self) -> (f64, f64) {
        self.scale_factor
    }

    /// Index of the appearance model each landmark was scored with.
    pub fn best_appearances(&self) -> Vec<usize> {
        self.vertices.iter().map(|v| v.best).collect()
    }

    /// Nearest normalized frame position of `point`, `None` when it is not representable.
    pub fn image_to_nf(&self, point: Point) -> Option<Position> {
        Some(Position::new(
            math::round_half_up((point.x - self.offset.0) / self.scale_factor.0)?,
            math::round_half_up((point.y - self.offset.1) / self.scale_factor.1)?,
        ))
    }

    pub fn nf_to_image(&self, position: Position) -> Point {
        Point::new(
            f64::from(position.x) * self.scale_factor.0 + self.offset.0,
            f64::from(position.y) * self.scale_factor.1 + self.offset.1,
        )
    }

    fn update_scale_factor(&mut self, bbox: &BoundingBox) {
        let (min_x, min_y) = (f64::from(bbox.min_x()), f64::from(bbox.min_y()));
        let (max_x, max_y) = (f64::from(bbox.max_x()), f64::from(bbox.max_y()));

        let width = (max_x - min_x + 1.0) * self.margins.0;
        let height = (max_y - min_y + 1.0) * self.margins.1;
        let x = (max_x + min_x) / 2.0 - width / 2.0;
        let y = (max_y + min_y) / 2.0 - height / 2.0;

        self.region = [x, y, width, height];
        self.scale_factor = (
            width / f64::from(self.base_window.0),
            height / f64::from(self.base_window.1),
        );
        self.offset = (x, y);
    }

    fn normalize(&mut self, source: &ImageData, bbox: &BoundingBox) -> Result<()> {
        if !bbox.is_valid() {
            return Err(Error::IllegalBoundingBox(format!("{:?}", bbox)));
        }
        self.update_scale_factor(bbox);

        let (x, y, width, height) = self.crop_rectangle().ok_or_else(|| {
            Error::IllegalBoundingBox(format!(
                "Face region {:?} of {:?} does not fit into integer pixel coordinates",
                self.region, bbox
            ))
        })?;

        let (bw, bh) = self.base_window;
        let padded = crop_resize_image(source, &mut self.normalized, x, y, width, height, bw, bh);
        if padded > 0 {
            if self.strict_bounds {
                return Err(Error::CropOutOfBounds {
                    x,
                    y,
                    width,
                    height,
                    image_width: source.width(),
                    image_height: source.height(),
                });
            }
            log::warn!(
                "Face region ({}, {}, {}x{}) leaves the {}x{} image, {} pixels padded with zeros",
                x,
                y,
                width,
                height,
                source.width(),
                source.height(),
                padded
            );
        }

        Ok(())
    }

    /// Inclusive pixel rectangle covering the current region: origin and size, with the
    /// right and bottom edges representable as well.
    fn crop_rectangle(&self) -> Option<(i32, i32, u32, u32)> {
        let x = math::round_half_up(self.region[0])?;
        let y = math::round_half_up(self.region[1])?;
        let width = math::round_half_up(self.region[2])?.checked_add(1)?;
        let height = math::round_half_up(self.region[3])?.checked_add(1)?;
        if width <= 0 || height <= 0 {
            return None;
        }
        x.checked_add(width)?;
        y.checked_add(height)?;
        Some((x, y, width as u32, height as u32))
    }

    /// Rotates `image` so that `bbox` becomes axis-aligned and normalizes the result.
    ///
    /// Returns the rotation angle and center.
    fn normalize_general(
        &mut self,
        image: &ImageData,
        bbox: &GeneralBoundingBox,
    ) -> Result<(f64, Point)> {
        let angle = bbox.angle();
        let center = bbox.center();

        let mut rotated = mem::take(&mut self.rotated);
        rotate_image(image, &mut rotated, angle, center.x, center.y);

        let corners = bbox.corners();
        let top_left = corners[0].rotate_around(&center, angle);
        let bottom_right = corners[2].rotate_around(&center, angle);
        let aligned = match (
            math::round_half_up(top_left.x),
            math::round_half_up(top_left.y),
            math::round_half_up(bottom_right.x),
            math::round_half_up(bottom_right.y),
        ) {
            (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
                Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
            }
            _ => Err(Error::IllegalBoundingBox(format!(
                "Corners of {:?} do not fit into integer pixel coordinates",
                bbox
            ))),
        };

        let result = aligned.and_then(|aligned| self.normalize(&rotated.as_image_data(), &aligned));
        self.rotated = rotated;
        result.map(|_| (angle, center))
    }

    /// Moves the stored ground truth into the normalized frame; returns whether there is any.
    fn update_ground_truth_nf(
        &mut self,
        rotation: Option<(f64, Point)>,
        mirrored: bool,
    ) -> Result<bool> {
        let ground_truth = match self.ground_truth.as_ref() {
            Some(gt) => gt,
            None => return Ok(false),
        };

        let last_x = self.base_window.0 as i32 - 1;
        let positions = ground_truth
            .iter()
            .enumerate()
            .map(|(i, point)| {
                let rotated = match rotation {
                    Some((angle, center)) => point.rotate_around(&center, angle),
                    None => *point,
                };
                let mut position = self.image_to_nf(rotated);
                if mirrored {
                    position = position
                        .and_then(|p| last_x.checked_sub(p.x).map(|x| Position::new(x, p.y)));
                }
                position.ok_or_else(|| {
                    Error::IllegalGroundTruth(format!(
                        "Landmark {} at {:?} lies too far from the face region",
                        i, point
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.ground_truth_nf = positions;
        Ok(true)
    }

    fn apply_normalization_factor(&mut self) {
        let factor = self.normalization_factor;
        for vertex in self.vertices.iter_mut() {
            for appearance in vertex.appearances.iter_mut() {
                appearance.set_loss_normalization_factor(factor);
            }
        }
        for edge in self.edges.iter_mut() {
            edge.cost.set_loss_normalization_factor(factor);
        }
    }

    /// Scores every appearance model of every landmark on the normalized frame and picks
    /// the best one per landmark.
    fn compute_q(&mut self, use_ground_truth: bool) {
        let frame = self.normalized.as_image_data();
        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            let gt = if use_ground_truth {
                self.ground_truth_nf.get(i).copied()
            } else {
                None
            };

            let mut best = 0;
            let mut maximum = f64::NEG_INFINITY;
            for (j, appearance) in vertex.appearances.iter_mut().enumerate() {
                appearance.update(&frame, &vertex.w[j], &mut vertex.q[j], gt);
                let sum: f64 = vertex.q[j].iter().sum();
                if sum > maximum {
                    maximum = sum;
                    best = j;
                }
            }
            vertex.best = best;
            log::trace!("Landmark {} ({}): appearance model {}", i, vertex.name, best);
        }
    }

    fn solve(&mut self) {
        let nodes: Vec<NodeScores> = self
            .vertices
            .iter()
            .map(|v| NodeScores {
                q: &v.q[v.best],
                search_space: v.appearances[v.best].search_space(),
            })
            .collect();
        let edges: Vec<EdgeScores> = self
            .edges
            .iter()
            .map(|e| EdgeScores {
                w: &e.w,
                cost: &e.cost,
            })
            .collect();

        self.score = self.solver.solve(&nodes, &edges, &mut self.landmarks_nf);

        for (i, vertex) in self.vertices.iter().enumerate() {
            self.q_values[i] = vertex.appearances[vertex.best]
                .q_value(self.landmarks_nf[i], &vertex.w[vertex.best])
                .unwrap_or(f64::NEG_INFINITY);
        }
        for (i, edge) in self.edges.iter().enumerate() {
            self.g_values[i] = edge.cost.g_value(
                self.landmarks_nf[edge.parent],
                self.landmarks_nf[edge.child],
                &edge.w,
            );
        }
    }

    fn detect_impl(&mut self, image: &ImageData, face: Face, mirrored: bool) -> Result<Vec<Point>> {
        if !is_legal_image(image) {
            return Err(Error::IllegalImage(format!(
                "{}x{} image with {} channels and {} bytes",
                image.width(),
                image.height(),
                image.num_channels(),
                image.data().len()
            )));
        }

        let overall = Instant::now();
        let part = Instant::now();

        let rotation = match face {
            Face::Aligned(bbox) => {
                self.normalize(image, bbox)?;
                None
            }
            Face::General(bbox) => Some(self.normalize_general(image, bbox)?),
        };
        if mirrored {
            self.normalized.mirror_x();
        }
        self.timings.normalized_frame = part.elapsed();

        let use_ground_truth = self.update_ground_truth_nf(rotation, mirrored)?;
        self.apply_normalization_factor();

        let part = Instant::now();
        self.compute_q(use_ground_truth);
        self.timings.features = part.elapsed();

        let part = Instant::now();
        self.solve();
        self.timings.maxsum = part.elapsed();

        let last_x = self.base_window.0 as i32 - 1;
        for i in 0..self.landmarks_nf.len() {
            if mirrored {
                self.landmarks_nf[i].x = last_x - self.landmarks_nf[i].x;
            }
            let point = self.nf_to_image(self.landmarks_nf[i]);
            self.landmarks[i] = match rotation {
                Some((angle, center)) => point.rotate_around(&center, -angle),
                None => point,
            };
        }

        self.timings.overall = overall.elapsed();
        log::debug!("Detected {} landmarks: {:?}", self.landmarks.len(), self.timings);

        Ok(self.landmarks.clone())
    }

    fn load_normalized_frame(&mut self, frame: &ImageData) -> Result<()> {
        let (bw, bh) = self.base_window;
        if !is_legal_image(frame) || frame.width() != bw || frame.height() != bh {
            return Err(Error::IllegalImage(format!(
                "Normalized frame must be a {}x{} gray-scale image, got {}x{} with {} channels",
                bw,
                bh,
                frame.width(),
                frame.height(),
                frame.num_channels()
            )));
        }
        resize_image(frame, &mut self.normalized, bw, bh);
        Ok(())
    }

    fn set_ground_truth_nf(&mut self, ground_truth: Option<&[Position]>) -> Result<bool> {
        match ground_truth {
            Some(gt) => {
                self.check_ground_truth_len(gt.len())?;
                self.ground_truth_nf.clear();
                self.ground_truth_nf.extend_from_slice(gt);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Detects the landmarks on an already normalized frame; positions are reported in the
    /// normalized frame only.
    pub fn detect_base(
        &mut self,
        frame: &ImageData,
        ground_truth: Option<&[Position]>,
    ) -> Result<&[Position]> {
        let overall = Instant::now();
        self.load_normalized_frame(frame)?;
        let use_ground_truth = self.set_ground_truth_nf(ground_truth)?;
        self.apply_normalization_factor();
        self.timings.normalized_frame = Default::default();

        let part = Instant::now();
        self.compute_q(use_ground_truth);
        self.timings.features = part.elapsed();

        let part = Instant::now();
        self.solve();
        self.timings.maxsum = part.elapsed();
        self.timings.overall = overall.elapsed();

        Ok(&self.landmarks_nf)
    }

    /// Places every landmark at the maximum of its loss-augmented unary score, ignoring
    /// the edges.
    pub fn nodemax_base(
        &mut self,
        frame: &ImageData,
        ground_truth: &[Position],
    ) -> Result<&[Position]> {
        self.load_normalized_frame(frame)?;
        self.set_ground_truth_nf(Some(ground_truth))?;
        self.apply_normalization_factor();
        self.compute_q(true);

        for (i, vertex) in self.vertices.iter().enumerate() {
            let index = math::argmax(&vertex.q[vertex.best])
                .map(|(index, _)| index)
                .unwrap_or(0);
            self.landmarks_nf[i] = vertex.appearances[vertex.best]
                .search_space()
                .position_of(index);
        }

        Ok(&self.landmarks_nf)
    }

    /// Joint feature vector of `configuration` on the current normalized frame: the feature
    /// vectors of the landmarks followed by the deformation costs of the edges.
    pub fn psi(&self, configuration: &[Position]) -> Result<Vec<f64>> {
        if configuration.len() != self.vertices.len() {
            return Err(Error::DimensionMismatch {
                what: "configuration".to_string(),
                expected: self.vertices.len(),
                actual: configuration.len(),
            });
        }

        let mut psi = vec![0.0; self.w_dimension()];
        let mut start = 0;

        for (i, vertex) in self.vertices.iter().enumerate() {
            let appearance = &vertex.appearances[vertex.best];
            let position = configuration[i];
            let index = appearance.search_space().index_of(position).ok_or(
                Error::PositionOutOfSearchSpace {
                    landmark: i,
                    x: position.x,
                    y: position.y,
                },
            )?;
            let end = start + appearance.feature_dimension();
            appearance.feature_at(index, &mut psi[start..end]);
            start = end;
        }

        let mut cost = [0; 5];
        for edge in &self.edges {
            let dimension = edge.cost.dimension();
            edge.cost.deformation_cost_at(
                configuration[edge.parent],
                configuration[edge.child],
                &mut cost,
            );
            for (dest, &c) in psi[start..start + dimension].iter_mut().zip(cost.iter()) {
                *dest = f64::from(c);
            }
            start += dimension;
        }

        Ok(psi)
    }

    /// Normalizes the face in `bbox` and returns the joint feature vector of `configuration`.
    pub fn features(
        &mut self,
        image: &ImageData,
        bbox: &BoundingBox,
        configuration: &[Position],
    ) -> Result<Vec<f64>> {
        if !is_legal_image(image) {
            return Err(Error::IllegalImage(format!(
                "{}x{} image with {} channels",
                image.width(),
                image.height(),
                image.num_channels()
            )));
        }
        self.normalize(image, bbox)?;
        self.compute_q(false);
        self.psi(configuration)
    }

    /// Joint feature vector of `configuration` on an already normalized frame.
    pub fn features_base(
        &mut self,
        frame: &ImageData,
        configuration: &[Position],
    ) -> Result<Vec<f64>> {
        self.load_normalized_frame(frame)?;
        self.compute_q(false);
        self.psi(configuration)
    }

    /// Length of the joint feature vector and of the flat weight vector.
    pub fn w_dimension(&self) -> usize {
        self.psi_nodes_dimension() + self.edges.iter().map(|e| e.cost.dimension()).sum::<usize>()
    }

    pub fn psi_nodes_dimension(&self) -> usize {
        self.nodes_dimensions().iter().sum()
    }

    /// Feature dimension of the best appearance model of every landmark.
    pub fn nodes_dimensions(&self) -> Vec<usize> {
        self.vertices
            .iter()
            .map(|v| v.appearances[v.best].feature_dimension())
            .collect()
    }

    /// `(parent, child)` pair of every edge.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.edges.iter().map(|e| (e.parent, e.child)).collect()
    }

    /// Flat weight vector laid out like [`psi`](Self::psi).
    pub fn w(&self) -> Vec<f64> {
        let mut w = Vec::with_capacity(self.w_dimension());
        for vertex in &self.vertices {
            w.extend_from_slice(&vertex.w[vertex.best]);
        }
        for edge in &self.edges {
            w.extend_from_slice(&edge.w);
        }
        w
    }

    /// Replaces the weights of the best appearance models and of the edges.
    pub fn set_w(&mut self, w: &[f64]) -> Result<()> {
        if w.len() != self.w_dimension() {
            return Err(Error::DimensionMismatch {
                what: "joint weight vector".to_string(),
                expected: self.w_dimension(),
                actual: w.len(),
            });
        }
        let start = self.copy_nodes_w(w);
        let mut start = start;
        for edge in self.edges.iter_mut() {
            let end = start + edge.w.len();
            edge.w.copy_from_slice(&w[start..end]);
            start = end;
        }
        Ok(())
    }

    /// Replaces the weights of the best appearance models only.
    pub fn set_nodes_w(&mut self, w: &[f64]) -> Result<()> {
        if w.len() != self.psi_nodes_dimension() {
            return Err(Error::DimensionMismatch {
                what: "landmark weight vector".to_string(),
                expected: self.psi_nodes_dimension(),
                actual: w.len(),
            });
        }
        self.copy_nodes_w(w);
        Ok(())
    }

    fn copy_nodes_w(&mut self, w: &[f64]) -> usize {
        let mut start = 0;
        for vertex in self.vertices.iter_mut() {
            let best = &mut vertex.w[vertex.best];
            let end = start + best.len();
            best.copy_from_slice(&w[start..end]);
            start = end;
        }
        start
    }

    /// Model with the current weights, e.g. to save it after [`set_w`](Self::set_w).
    pub fn to_model(&self) -> Result<Model> {
        let nodes = self
            .vertices
            .iter()
            .map(|vertex| {
                let first = &vertex.appearances[0];
                NodeSpec {
                    name: vertex.name.clone(),
                    search_space: *first.search_space(),
                    window_size: first.window_size(),
                    appearances: vertex
                        .appearances
                        .iter()
                        .zip(vertex.w.iter())
                        .map(|(appearance, w)| AppearanceSpec {
                            kind: *appearance.kind(),
                            loss: appearance.loss().map(|loss| loss.kind().clone()),
                            w: w.clone(),
                        })
                        .collect(),
                }
            })
            .collect();
        let edges = self
            .edges
            .iter()
            .map(|edge| EdgeSpec {
                parent: edge.parent,
                child: edge.child,
                dimension: edge.cost.dimension(),
                loss: edge.cost.loss().map(|loss| loss.kind().clone()),
                w: edge.w.clone(),
            })
            .collect();

        Model::new(&self.name, self.base_window, self.margins, nodes, edges)
    }

    /// Detects the landmarks of several faces of one image, each box independently.
    ///
    /// With the `rayon` feature the boxes are processed in parallel, every worker on its
    /// own copy of the detector.
    pub fn detect_batch(
        &self,
        image: &ImageData,
        boxes: &[BoundingBox],
    ) -> Vec<Result<Vec<Point>>> {
        #[cfg(feature = "rayon")]
        let results = boxes
            .par_iter()
            .map_init(|| self.clone(), |detector, bbox| detector.detect(image, bbox))
            .collect();

        #[cfg(not(feature = "rayon"))]
        let results = {
            let mut detector = self.clone();
            boxes
                .iter()
                .map(|bbox| detector.detect(image, bbox))
                .collect()
        };

        results
    }
}
