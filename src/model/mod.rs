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

mod reader;
mod writer;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::feat::{AppearanceKind, SearchSpace, MAX_WINDOW_SIZE};
use crate::loss::LossKind;

use self::reader::ModelReader;
use self::writer::ModelWriter;

pub(crate) const MAGIC: &[u8; 4] = b"FLMK";
pub(crate) const VERSION: u32 = 1;

/// Persisted description of a landmark detector: the graph, its hyper-parameters and
/// the learned weights.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    name: String,
    base_window: (u32, u32),
    margins: (f64, f64),
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
}

/// One landmark of the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub search_space: SearchSpace,
    pub window_size: (u32, u32),
    pub appearances: Vec<AppearanceSpec>,
}

/// One alternative appearance model of a landmark together with its weights.
#[derive(Clone, Debug, PartialEq)]
pub struct AppearanceSpec {
    pub kind: AppearanceKind,
    pub loss: Option<LossKind>,
    pub w: Vec<f64>,
}

/// Displacement deformation cost between a parent and a child landmark.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeSpec {
    pub parent: usize,
    pub child: usize,
    pub dimension: usize,
    pub loss: Option<LossKind>,
    pub w: Vec<f64>,
}

impl Model {
    /// Assembles a model and checks that its parts are consistent.
    ///
    /// `base_window` is the size of the normalized frame and `margins` the factors by which
    /// a face box is enlarged along x and y before it is normalized.
    pub fn new(
        name: &str,
        base_window: (u32, u32),
        margins: (f64, f64),
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    ) -> Result<Self> {
        let model = Model {
            name: name.to_string(),
            base_window,
            margins,
            nodes,
            edges,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_window(&self) -> (u32, u32) {
        self.base_window
    }

    pub fn margins(&self) -> (f64, f64) {
        self.margins
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeSpec] {
        &self.edges
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [NodeSpec] {
        &mut self.nodes
    }

    pub(crate) fn edges_mut(&mut self) -> &mut [EdgeSpec] {
        &mut self.edges
    }

    fn validate(&self) -> Result<()> {
        let (width, height) = self.base_window;
        if width == 0 || height == 0 || width > MAX_WINDOW_SIZE || height > MAX_WINDOW_SIZE {
            return Err(Error::InvalidModel(format!(
                "Illegal base window: {}x{}",
                width, height
            )));
        }
        if !(self.margins.0 > 0.0 && self.margins.1 > 0.0) {
            return Err(Error::InvalidModel(format!(
                "Illegal margins: {:?}",
                self.margins
            )));
        }
        if self.nodes.is_empty() {
            return Err(Error::InvalidModel("Model has no landmarks".to_string()));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.appearances.is_empty() {
                return Err(Error::InvalidModel(format!(
                    "Landmark {} ({}) has no appearance model",
                    i, node.name
                )));
            }
            if !windows_within(node, width, height) {
                return Err(Error::InvalidModel(format!(
                    "Feature windows of landmark {} ({}) leave the {}x{} normalized frame",
                    i, node.name, width, height
                )));
            }
            for appearance in &node.appearances {
                let (w, h) = node.window_size;
                let dimension = appearance.kind.dimension(w, h)?;
                check_dimension(&format!("appearance model of landmark {}", i), dimension, &appearance.w)?;
                if let Some(LossKind::Table { values, .. }) = &appearance.loss {
                    check_table(i, node.search_space.len(), values.len())?;
                }
            }
        }

        for (i, edge) in self.edges.iter().enumerate() {
            if edge.parent >= self.nodes.len() || edge.child >= self.nodes.len() {
                return Err(Error::InvalidModel(format!(
                    "Edge {} ({} -> {}) refers to a missing landmark",
                    i, edge.parent, edge.child
                )));
            }
            if edge.dimension != 4 && edge.dimension != 5 {
                return Err(Error::InvalidModel(format!(
                    "Edge {} has {} dimensions, expected 4 or 5",
                    i, edge.dimension
                )));
            }
            check_dimension(&format!("edge {}", i), edge.dimension, &edge.w)?;
        }

        Ok(())
    }
}

/// Whether the window around every candidate of `node` lies inside the normalized frame.
fn windows_within(node: &NodeSpec, width: u32, height: u32) -> bool {
    let ss = &node.search_space;
    let (w, h) = (i64::from(node.window_size.0), i64::from(node.window_size.1));
    i64::from(ss.min_x()) - w / 2 >= 0
        && i64::from(ss.min_y()) - h / 2 >= 0
        && i64::from(ss.max_x()) - w / 2 + w <= i64::from(width)
        && i64::from(ss.max_y()) - h / 2 + h <= i64::from(height)
}

fn check_dimension(what: &str, expected: usize, w: &[f64]) -> Result<()> {
    if w.len() != expected {
        return Err(Error::DimensionMismatch {
            what: what.to_string(),
            expected,
            actual: w.len(),
        });
    }
    Ok(())
}

fn check_table(node: usize, expected: usize, actual: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::InvalidModel(format!(
            "Table loss of landmark {} has {} values, expected {}",
            node, actual, expected
        )));
    }
    Ok(())
}

/// Loads a model from a file.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Model> {
    let mut buf = vec![];
    File::open(path)?.read_to_end(&mut buf)?;
    read_model(buf)
}

/// Reads a model from its binary representation.
pub fn read_model(buf: Vec<u8>) -> Result<Model> {
    ModelReader::new(buf).read()
}

/// Saves `model` to a file; without `write_w` the weights are left out.
pub fn save_model<P: AsRef<Path>>(model: &Model, path: P, write_w: bool) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_model(model, &mut writer, write_w)?;
    writer.flush()?;
    Ok(())
}

/// Writes the binary representation of `model`; without `write_w` the weights are left out.
pub fn write_model<W: Write>(model: &Model, writer: &mut W, write_w: bool) -> Result<()> {
    ModelWriter::new(writer, write_w).write(model)
}
