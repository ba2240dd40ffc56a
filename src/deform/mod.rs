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
use crate::error::{Error, Result};
use crate::feat::SearchSpace;
use crate::loss::Loss;
use crate::math;

/// Pairwise cost of an edge built from the displacement of the child landmark relative to
/// its parent: `[dx, dy, dx^2, dy^2]`, optionally followed by a constant `1`.
#[derive(Clone, Debug)]
pub struct DisplacementDeformationCost {
    parent_space: SearchSpace,
    child_space: SearchSpace,
    dimension: usize,
    costs: Vec<i32>,
    loss: Option<Loss>,
}

impl DisplacementDeformationCost {
    pub fn new(
        parent_space: SearchSpace,
        child_space: SearchSpace,
        dimension: usize,
        loss: Option<Loss>,
    ) -> Result<Self> {
        if dimension != 4 && dimension != 5 {
            return Err(Error::InvalidModel(format!(
                "Displacement cost must have 4 or 5 dimensions, got {}",
                dimension
            )));
        }

        let mut cost = DisplacementDeformationCost {
            parent_space,
            child_space,
            dimension,
            costs: vec![0; parent_space.len() * child_space.len() * dimension],
            loss,
        };
        cost.compute_deformation_costs();
        Ok(cost)
    }

    /// Type tag used by the model file.
    pub fn id(&self) -> i32 {
        1
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn parent_space(&self) -> &SearchSpace {
        &self.parent_space
    }

    pub fn child_space(&self) -> &SearchSpace {
        &self.child_space
    }

    pub fn parent_length(&self) -> usize {
        self.parent_space.len()
    }

    pub fn child_length(&self) -> usize {
        self.child_space.len()
    }

    pub fn loss(&self) -> Option<&Loss> {
        self.loss.as_ref()
    }

    pub fn set_loss_normalization_factor(&mut self, factor: f64) {
        if let Some(loss) = self.loss.as_mut() {
            loss.set_normalization_factor(factor);
        }
    }

    fn compute_deformation_costs(&mut self) {
        let dim = self.dimension;
        let row_len = self.child_length() * dim;
        let parent_space = self.parent_space;
        let child_space = self.child_space;

        for (i, row) in self.costs.chunks_exact_mut(row_len).enumerate() {
            let parent = parent_space.position_of(i);
            for (j, cost) in row.chunks_exact_mut(dim).enumerate() {
                displacement(parent, child_space.position_of(j), cost);
            }
        }
    }

    /// Cost vector of placing the child at `child` when the parent sits at `parent`.
    pub fn deformation_cost_at(&self, parent: Position, child: Position, cost: &mut [i32]) {
        displacement(parent, child, &mut cost[..self.dimension]);
    }

    /// Precomputed cost vectors of all child candidates for the parent candidate
    /// `parent_index`, `dimension` values per child candidate.
    #[inline]
    pub fn costs_row(&self, parent_index: usize) -> &[i32] {
        let row_len = self.child_length() * self.dimension;
        &self.costs[parent_index * row_len..(parent_index + 1) * row_len]
    }

    /// `g[c] = w . cost(parent_index, c)` for every child candidate `c`.
    pub fn dot_product_with_wg(&self, w: &[f64], g: &mut [f64], parent_index: usize) {
        let w = &w[..self.dimension];
        for (g_value, cost) in g
            .iter_mut()
            .zip(self.costs_row(parent_index).chunks_exact(self.dimension))
        {
            *g_value = math::mixed_inner_product(w, cost);
        }
    }

    /// Pairwise score of one specific placement, computed without the table.
    pub fn g_value(&self, parent: Position, child: Position, w: &[f64]) -> f64 {
        let mut cost = [0; 5];
        self.deformation_cost_at(parent, child, &mut cost);
        math::mixed_inner_product(&w[..self.dimension], &cost[..self.dimension])
    }

    /// Whether `w` makes the pairwise score a concave quadratic in both displacements,
    /// the case handled by [`distance_transform`](Self::distance_transform).
    pub fn supports_distance_transform(&self, w: &[f64]) -> bool {
        w.len() >= self.dimension && w[2] < 0.0 && w[3] < 0.0
    }

    /// Computes `best[x] = max_c belief[c] + w . cost(x, c)` for every parent candidate `x`
    /// along with the maximizing child candidate, in time linear in the number of candidates.
    ///
    /// Returns `false` without touching the outputs when `w` is not supported.
    pub fn distance_transform(
        &self,
        w: &[f64],
        belief: &[f64],
        best: &mut [f64],
        arg: &mut [usize],
    ) -> bool {
        if !self.supports_distance_transform(w) {
            return false;
        }
        debug_assert_eq!(belief.len(), self.child_length());

        let child_w = self.child_space.width() as usize;
        let child_h = self.child_space.height() as usize;
        let parent_w = self.parent_space.width() as usize;
        let parent_h = self.parent_space.height() as usize;
        let bias = if self.dimension == 5 { w[4] } else { 0.0 };

        let mut transform = Transform1D::default();

        // along y: every child column against every parent row
        let mut column_best = vec![0.0; child_w * parent_h];
        let mut column_arg = vec![0; child_w * parent_h];
        for cx in 0..child_w {
            let range = cx * parent_h..(cx + 1) * parent_h;
            transform.run(
                &belief[cx * child_h..(cx + 1) * child_h],
                self.child_space.min_y(),
                w[1],
                w[3],
                self.parent_space.min_y(),
                &mut column_best[range.clone()],
                &mut column_arg[range],
            );
        }

        // along x: every parent row against every parent column
        let mut samples = vec![0.0; child_w];
        let mut row_best = vec![0.0; parent_w];
        let mut row_arg = vec![0; parent_w];
        for py in 0..parent_h {
            for (cx, sample) in samples.iter_mut().enumerate() {
                *sample = column_best[cx * parent_h + py];
            }
            transform.run(
                &samples,
                self.child_space.min_x(),
                w[0],
                w[2],
                self.parent_space.min_x(),
                &mut row_best,
                &mut row_arg,
            );
            for px in 0..parent_w {
                let cx = row_arg[px];
                let cy = column_arg[cx * parent_h + py];
                best[px * parent_h + py] = row_best[px] + bias;
                arg[px * parent_h + py] = cx * child_h + cy;
            }
        }

        true
    }
}

#[inline]
fn displacement(parent: Position, child: Position, cost: &mut [i32]) {
    let dx = child.x - parent.x;
    let dy = child.y - parent.y;
    cost[0] = dx;
    cost[1] = dy;
    cost[2] = dx * dx;
    cost[3] = dy * dy;
    if cost.len() == 5 {
        cost[4] = 1;
    }
}

/// One-dimensional max-convolution with a concave quadratic:
/// `out[t] = max_i f[i] + a * d + b * d^2` where `d = s_i - t`, `s_i = origin + i`.
///
/// Each sample is a line in `t` once the terms that do not depend on `i` are dropped,
/// so the maximum is read off the upper envelope of those lines.
#[derive(Default)]
struct Transform1D {
    hull: Vec<usize>,
}

impl Transform1D {
    #[allow(clippy::too_many_arguments)]
    fn run(
        &mut self,
        f: &[f64],
        origin: i32,
        a: f64,
        b: f64,
        query_origin: i32,
        out: &mut [f64],
        arg: &mut [usize],
    ) {
        debug_assert!(b < 0.0);
        let position = |i: usize| f64::from(origin) + i as f64;
        // slope and intercept of the line of sample i
        let line = |i: usize| {
            let s = position(i);
            (-2.0 * b * s, f[i] + a * s + b * s * s)
        };
        let score = |i: usize, t: f64| {
            let d = position(i) - t;
            f[i] + a * d + b * d * d
        };

        // slopes grow with i since b < 0
        self.hull.clear();
        for i in 0..f.len() {
            let (m3, c3) = line(i);
            while self.hull.len() >= 2 {
                let (m1, c1) = line(self.hull[self.hull.len() - 2]);
                let (m2, c2) = line(self.hull[self.hull.len() - 1]);
                // the middle line never wins if the outer two cross before it shows up
                if (c1 - c3) * (m2 - m1) <= (c1 - c2) * (m3 - m1) {
                    self.hull.pop();
                } else {
                    break;
                }
            }
            self.hull.push(i);
        }

        let mut k = 0;
        for (j, (out_value, out_arg)) in out.iter_mut().zip(arg.iter_mut()).enumerate() {
            let t = f64::from(query_origin) + j as f64;
            while k + 1 < self.hull.len() && score(self.hull[k + 1], t) > score(self.hull[k], t) {
                k += 1;
            }
            *out_value = score(self.hull[k], t);
            *out_arg = self.hull[k];
        }
    }
}
