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

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::feat::{AppearanceKind, SearchSpace, MAX_WINDOW_SIZE};
use crate::loss::LossKind;
use crate::model::{AppearanceSpec, EdgeSpec, Model, NodeSpec, MAGIC, VERSION};
use crate::solver::GraphKind;

// Smallest encodings of the repeated records, used to bound counts by the bytes left.
const NODE_MIN_BYTES: u64 = 36;
const EDGE_MIN_BYTES: u64 = 24;
const APPEARANCE_MIN_BYTES: u64 = 16;
const F64_BYTES: u64 = 8;

/// Weights a file may leave out in total; they are filled with zeros.
const MAX_UNSTORED_WEIGHTS: usize = 1 << 26;

pub(crate) struct ModelReader {
    reader: Cursor<Vec<u8>>,
    unstored_weights: usize,
}

impl ModelReader {
    pub(crate) fn new(buf: Vec<u8>) -> Self {
        ModelReader {
            reader: Cursor::new(buf),
            unstored_weights: 0,
        }
    }

    pub(crate) fn read(mut self) -> Result<Model> {
        let mut magic = [0u8; 4];
        self.reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::InvalidModel(format!("Unexpected magic: {:?}", magic)));
        }
        let version = self.reader.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::InvalidModel(format!("Unsupported version: {}", version)));
        }

        let name = self.read_string()?;
        let num_nodes = self.read_count()?;
        let num_edges = self.read_count()?;
        self.ensure_remaining(num_nodes, NODE_MIN_BYTES, "landmarks")?;

        let graph_kind_id = self.read_i32()?;
        match GraphKind::from(graph_kind_id) {
            Some(GraphKind::Tree) => {}
            _ => return Err(Error::UnsupportedGraph(graph_kind_id)),
        }

        let base_window = (self.read_size()?, self.read_size()?);
        if base_window.0 > MAX_WINDOW_SIZE || base_window.1 > MAX_WINDOW_SIZE {
            return Err(Error::InvalidModel(format!(
                "Base window {}x{} is larger than {} pixels",
                base_window.0, base_window.1, MAX_WINDOW_SIZE
            )));
        }
        let margins = (self.read_f64()?, self.read_f64()?);

        let mut nodes = Vec::with_capacity(num_nodes);
        for i in 0..num_nodes {
            nodes.push(self.read_node(i)?);
        }

        self.ensure_remaining(num_edges, EDGE_MIN_BYTES, "edges")?;
        let mut edges = Vec::with_capacity(num_edges);
        for _ in 0..num_edges {
            edges.push(self.read_edge(&nodes)?);
        }

        log::debug!(
            "Read model '{}': {} landmarks, {} edges, base window {:?}",
            name,
            nodes.len(),
            edges.len(),
            base_window
        );

        Model::new(&name, base_window, margins, nodes, edges)
    }

    fn read_node(&mut self, index: usize) -> Result<NodeSpec> {
        let id = self.read_i32()?;
        if id != index as i32 {
            return Err(Error::InvalidModel(format!(
                "Landmark {} is stored with id {}",
                index, id
            )));
        }
        let name = self.read_string()?;
        let search_space =
            SearchSpace::new(self.read_i32()?, self.read_i32()?, self.read_i32()?, self.read_i32()?)?;
        let window_size = (self.read_size()?, self.read_size()?);

        let num_appearances = self.read_count()?;
        self.ensure_remaining(num_appearances, APPEARANCE_MIN_BYTES, "appearance models")?;
        let mut appearances = Vec::with_capacity(num_appearances);
        for _ in 0..num_appearances {
            let kind = self.read_appearance_kind()?;
            let loss = self.read_loss(search_space.height())?;
            let dimension = kind.dimension(window_size.0, window_size.1)?;
            let w = self.read_weights(dimension, &format!("appearance model of landmark {}", index))?;
            appearances.push(AppearanceSpec { kind, loss, w });
        }

        Ok(NodeSpec {
            name,
            search_space,
            window_size,
            appearances,
        })
    }

    fn read_appearance_kind(&mut self) -> Result<AppearanceKind> {
        let id = self.read_i32()?;
        match id {
            1 => Ok(AppearanceKind::SparseLbp {
                height_of_pyramid: self.read_size()?,
            }),
            3 => Ok(AppearanceKind::Hog {
                n_bins: self.read_size()?,
                cell_size: self.read_size()?,
                block_size: self.read_size()?,
            }),
            _ => Err(Error::UnsupportedAppearanceModel(id)),
        }
    }

    fn read_edge(&mut self, nodes: &[NodeSpec]) -> Result<EdgeSpec> {
        let parent = self.read_count()?;
        let child = self.read_count()?;
        let kind = self.read_i32()?;
        if kind != 1 {
            return Err(Error::UnsupportedDeformationCost(kind));
        }
        let dimension = self.read_count()?;
        if dimension != 4 && dimension != 5 {
            return Err(Error::InvalidModel(format!(
                "Edge {} -> {} has {} dimensions, expected 4 or 5",
                parent, child, dimension
            )));
        }
        let size_h = nodes
            .get(child)
            .map(|node| node.search_space.height())
            .unwrap_or(1);
        let loss = self.read_loss(size_h)?;
        let w = self.read_weights(dimension, &format!("edge {} -> {}", parent, child))?;

        Ok(EdgeSpec {
            parent,
            child,
            dimension,
            loss,
            w,
        })
    }

    fn read_loss(&mut self, size_h: u32) -> Result<Option<LossKind>> {
        let id = self.read_i32()?;
        match id {
            0 => Ok(None),
            1 => Ok(Some(LossKind::Zero)),
            2 => Ok(Some(LossKind::NormalizedEuclidean)),
            3 => {
                let len = self.read_count()?;
                self.ensure_remaining(len, F64_BYTES, "table loss values")?;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(self.read_f64()?);
                }
                Ok(Some(LossKind::Table { values, size_h }))
            }
            _ => Err(Error::UnsupportedLoss(id)),
        }
    }

    fn read_weights(&mut self, dimension: usize, what: &str) -> Result<Vec<f64>> {
        let count = self.read_count()?;
        if count == 0 {
            self.unstored_weights = self
                .unstored_weights
                .checked_add(dimension)
                .filter(|&total| total <= MAX_UNSTORED_WEIGHTS)
                .ok_or_else(|| {
                    Error::InvalidModel(format!(
                        "Too many weights left out of the model at {}",
                        what
                    ))
                })?;
            log::warn!("Model has no weights for {}, using zeros", what);
            return Ok(vec![0.0; dimension]);
        }
        if count != dimension {
            return Err(Error::DimensionMismatch {
                what: what.to_string(),
                expected: dimension,
                actual: count,
            });
        }
        self.ensure_remaining(count, F64_BYTES, &format!("weights of {}", what))?;

        let mut w = vec![0.0; count];
        self.reader.read_f64_into::<LittleEndian>(&mut w)?;
        Ok(w)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.reader.read_u32::<LittleEndian>()? as usize;
        self.ensure_remaining(len, 1, "name bytes")?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::InvalidModel(format!("Illegal name: {}", e)))
    }

    /// Rejects `count` records of at least `min_bytes` each that cannot fit in the rest of
    /// the buffer.
    fn ensure_remaining(&self, count: usize, min_bytes: u64, what: &str) -> Result<()> {
        let remaining = (self.reader.get_ref().len() as u64).saturating_sub(self.reader.position());
        let needed = (count as u64).saturating_mul(min_bytes);
        if needed > remaining {
            return Err(Error::InvalidModel(format!(
                "{} {} need at least {} bytes, only {} left",
                count, what, needed, remaining
            )));
        }
        Ok(())
    }

    fn read_count(&mut self) -> Result<usize> {
        let value = self.read_i32()?;
        if value < 0 {
            return Err(Error::InvalidModel(format!("Negative count: {}", value)));
        }
        Ok(value as usize)
    }

    fn read_size(&mut self) -> Result<u32> {
        self.read_count().map(|v| v as u32)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.reader.read_i32::<LittleEndian>()?)
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(self.reader.read_f64::<LittleEndian>()?)
    }
}
