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

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::Result;
use crate::feat::AppearanceKind;
use crate::loss::LossKind;
use crate::model::{EdgeSpec, Model, NodeSpec, MAGIC, VERSION};
use crate::solver::GraphKind;

pub(crate) struct ModelWriter<'a, W: Write> {
    writer: &'a mut W,
    write_w: bool,
}

impl<'a, W: Write> ModelWriter<'a, W> {
    pub(crate) fn new(writer: &'a mut W, write_w: bool) -> Self {
        ModelWriter { writer, write_w }
    }

    pub(crate) fn write(mut self, model: &Model) -> Result<()> {
        self.writer.write_all(MAGIC)?;
        self.writer.write_u32::<LittleEndian>(VERSION)?;
        self.write_string(model.name())?;
        self.write_i32(model.nodes().len() as i32)?;
        self.write_i32(model.edges().len() as i32)?;
        self.write_i32(GraphKind::Tree.id())?;

        let (width, height) = model.base_window();
        self.write_i32(width as i32)?;
        self.write_i32(height as i32)?;
        let (margin_x, margin_y) = model.margins();
        self.write_f64(margin_x)?;
        self.write_f64(margin_y)?;

        for (i, node) in model.nodes().iter().enumerate() {
            self.write_node(i, node)?;
        }
        for edge in model.edges() {
            self.write_edge(edge)?;
        }
        Ok(())
    }

    fn write_node(&mut self, index: usize, node: &NodeSpec) -> Result<()> {
        self.write_i32(index as i32)?;
        self.write_string(&node.name)?;
        let ss = &node.search_space;
        for v in [ss.min_x(), ss.min_y(), ss.max_x(), ss.max_y()] {
            self.write_i32(v)?;
        }
        self.write_i32(node.window_size.0 as i32)?;
        self.write_i32(node.window_size.1 as i32)?;

        self.write_i32(node.appearances.len() as i32)?;
        for appearance in &node.appearances {
            self.write_i32(appearance.kind.id())?;
            match appearance.kind {
                AppearanceKind::SparseLbp { height_of_pyramid } => {
                    self.write_i32(height_of_pyramid as i32)?;
                }
                AppearanceKind::Hog {
                    n_bins,
                    cell_size,
                    block_size,
                } => {
                    self.write_i32(n_bins as i32)?;
                    self.write_i32(cell_size as i32)?;
                    self.write_i32(block_size as i32)?;
                }
            }
            self.write_loss(appearance.loss.as_ref())?;
            self.write_weights(&appearance.w)?;
        }
        Ok(())
    }

    fn write_edge(&mut self, edge: &EdgeSpec) -> Result<()> {
        self.write_i32(edge.parent as i32)?;
        self.write_i32(edge.child as i32)?;
        // displacement
        self.write_i32(1)?;
        self.write_i32(edge.dimension as i32)?;
        self.write_loss(edge.loss.as_ref())?;
        self.write_weights(&edge.w)
    }

    fn write_loss(&mut self, loss: Option<&LossKind>) -> Result<()> {
        match loss {
            None => self.write_i32(0),
            Some(kind) => {
                self.write_i32(kind.id())?;
                if let LossKind::Table { values, .. } = kind {
                    self.write_i32(values.len() as i32)?;
                    for &v in values {
                        self.write_f64(v)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn write_weights(&mut self, w: &[f64]) -> Result<()> {
        if !self.write_w {
            return self.write_i32(0);
        }
        self.write_i32(w.len() as i32)?;
        for &v in w {
            self.write_f64(v)?;
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(s.len() as u32)?;
        self.writer.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        Ok(self.writer.write_i32::<LittleEndian>(v)?)
    }

    fn write_f64(&mut self, v: f64) -> Result<()> {
        Ok(self.writer.write_f64::<LittleEndian>(v)?)
    }
}
