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

mod tree;

pub use self::tree::TreeMaxSumSolver;

use crate::common::Position;
use crate::deform::DisplacementDeformationCost;
use crate::feat::SearchSpace;

/// Unary scores of one node, indexed like the candidates of its search space.
#[derive(Clone, Copy, Debug)]
pub struct NodeScores<'a> {
    pub q: &'a [f64],
    pub search_space: &'a SearchSpace,
}

/// Pairwise scoring of one edge.
#[derive(Clone, Copy, Debug)]
pub struct EdgeScores<'a> {
    pub w: &'a [f64],
    pub cost: &'a DisplacementDeformationCost,
}

/// Graph kind tag used by the model file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphKind {
    Tree,
    SimpleNet,
    General,
}

impl GraphKind {
    #[inline]
    pub fn from(id: i32) -> Option<Self> {
        match id {
            1 => Some(GraphKind::Tree),
            2 => Some(GraphKind::SimpleNet),
            3 => Some(GraphKind::General),
            _ => None,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            GraphKind::Tree => 1,
            GraphKind::SimpleNet => 2,
            GraphKind::General => 3,
        }
    }
}

/// Exact maximization of the sum of unary and pairwise scores over one candidate per node.
pub trait MaxSumSolver {
    /// Writes the best position of every node into `output` and returns the best total score.
    ///
    /// `nodes` and `edges` are indexed like the graph the solver was built for.
    fn solve(
        &mut self,
        nodes: &[NodeScores<'_>],
        edges: &[EdgeScores<'_>],
        output: &mut [Position],
    ) -> f64;
}
