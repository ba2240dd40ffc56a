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

use crate::common::Position;

#[derive(Debug, Clone, PartialEq)]
pub enum LossKind {
    Zero,
    NormalizedEuclidean,
    /// One value per candidate of the owning search space, indexed like the candidates.
    Table { values: Vec<f64>, size_h: u32 },
}

impl LossKind {
    #[inline]
    pub fn id(&self) -> i32 {
        match self {
            LossKind::Zero => 1,
            LossKind::NormalizedEuclidean => 2,
            LossKind::Table { .. } => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LossKind::Zero => "ZERO_LOSS",
            LossKind::NormalizedEuclidean => "NORMALIZED_EUCLIDEAN",
            LossKind::Table { .. } => "TABLE_LOSS",
        }
    }
}

/// Loss added to the unary scores during loss-augmented inference.
#[derive(Debug, Clone, PartialEq)]
pub struct Loss {
    kind: LossKind,
    normalization_factor: f64,
}

impl Loss {
    pub fn new(kind: LossKind) -> Self {
        Loss {
            kind,
            normalization_factor: 1.0,
        }
    }

    pub fn kind(&self) -> &LossKind {
        &self.kind
    }

    pub fn normalization_factor(&self) -> f64 {
        self.normalization_factor
    }

    pub fn set_normalization_factor(&mut self, factor: f64) {
        self.normalization_factor = factor;
    }

    /// Loss of placing a landmark at `estimate` when it belongs to `ground_truth`.
    ///
    /// For the table loss `estimate` is taken relative to the search space origin.
    pub fn compute_loss(&self, ground_truth: Position, estimate: Position) -> f64 {
        match &self.kind {
            LossKind::Zero => 0.0,
            LossKind::NormalizedEuclidean => {
                let dx = f64::from(ground_truth.x) - f64::from(estimate.x);
                let dy = f64::from(ground_truth.y) - f64::from(estimate.y);
                dx.hypot(dy) * self.normalization_factor
            }
            LossKind::Table { values, size_h } => {
                if estimate.x < 0 || estimate.y < 0 || estimate.y >= *size_h as i32 {
                    return 0.0;
                }
                let index = estimate.x as usize * *size_h as usize + estimate.y as usize;
                values.get(index).copied().unwrap_or(0.0)
            }
        }
    }

    /// Precomputed loss of the candidate with flat index `position`.
    pub fn loss_at(&self, position: usize) -> f64 {
        match &self.kind {
            LossKind::Table { values, .. } => values.get(position).copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self.kind, LossKind::Table { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_loss() {
        let loss = Loss::new(LossKind::Zero);
        assert_eq!(0.0, loss.compute_loss(Position::new(0, 0), Position::new(30, 40)));
        assert_eq!(0.0, loss.loss_at(3));
    }

    #[test]
    fn test_normalized_euclidean_loss() {
        let mut loss = Loss::new(LossKind::NormalizedEuclidean);
        assert_eq!(5.0, loss.compute_loss(Position::new(1, 1), Position::new(4, 5)));
        loss.set_normalization_factor(0.5);
        assert_eq!(2.5, loss.compute_loss(Position::new(1, 1), Position::new(4, 5)));
        assert_eq!(0.0, loss.compute_loss(Position::new(4, 5), Position::new(4, 5)));
    }

    #[test]
    fn test_table_loss() {
        let loss = Loss::new(LossKind::Table {
            values: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            size_h: 2,
        });
        assert_eq!(4.0, loss.loss_at(4));
        // x = 2, y = 1 relative to the search space
        assert_eq!(5.0, loss.compute_loss(Position::new(0, 0), Position::new(2, 1)));
        assert_eq!(0.0, loss.compute_loss(Position::new(0, 0), Position::new(9, 1)));
        assert_eq!(3, loss.kind().id());
    }
}
