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

use std::collections::VecDeque;
use std::mem;

use crate::common::Position;
use crate::error::{Error, Result};
use crate::math;
use crate::solver::{EdgeScores, MaxSumSolver, NodeScores};

/// Max-sum dynamic programming over a tree: beliefs are passed from the leaves to the root,
/// and the maximizing assignment is traced back from the root to the leaves.
#[derive(Clone, Debug)]
pub struct TreeMaxSumSolver {
    num_nodes: usize,
    // (child, edge) pairs of every node
    children: Vec<Vec<(usize, usize)>>,
    order: Vec<usize>,
    distance_transform: bool,
    beliefs: Vec<Vec<f64>>,
    // argmax of a child, indexed by the candidate of its parent
    arg_tables: Vec<Vec<usize>>,
    argmax: Vec<usize>,
    g: Vec<Vec<f64>>,
    best: Vec<f64>,
}

impl TreeMaxSumSolver {
    /// Builds the solver for `num_nodes` nodes connected by `(parent, child)` edges.
    ///
    /// Fails unless the edges form a single rooted tree spanning every node.
    pub fn new(num_nodes: usize, edges: &[(usize, usize)]) -> Result<Self> {
        if num_nodes == 0 {
            return Err(Error::NotATree("graph has no nodes".to_string()));
        }
        if edges.len() != num_nodes - 1 {
            return Err(Error::NotATree(format!(
                "{} nodes need {} edges, got {}",
                num_nodes,
                num_nodes - 1,
                edges.len()
            )));
        }

        let mut children = vec![Vec::new(); num_nodes];
        let mut parents = vec![None; num_nodes];
        let mut in_degrees = vec![0; num_nodes];

        for (edge, &(parent, child)) in edges.iter().enumerate() {
            if parent >= num_nodes || child >= num_nodes {
                return Err(Error::NotATree(format!(
                    "edge {} ({} -> {}) refers to a missing node",
                    edge, parent, child
                )));
            }
            if parent == child {
                return Err(Error::NotATree(format!("edge {} is a loop on node {}", edge, parent)));
            }
            if let Some(other) = parents[child] {
                return Err(Error::NotATree(format!(
                    "node {} has two parents: {} and {}",
                    child, other, parent
                )));
            }
            parents[child] = Some(parent);
            children[parent].push((child, edge));
            in_degrees[parent] += 1;
        }

        // Kahn's algorithm on the reversed edges: leaves first, the root last
        let mut queue: VecDeque<usize> = (0..num_nodes).filter(|&i| in_degrees[i] == 0).collect();
        let mut order = Vec::with_capacity(num_nodes);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            if let Some(parent) = parents[node] {
                in_degrees[parent] -= 1;
                if in_degrees[parent] == 0 {
                    queue.push_back(parent);
                }
            }
        }

        if order.len() != num_nodes {
            return Err(Error::NotATree(format!(
                "only {} of {} nodes can be ordered, the edges contain a cycle",
                order.len(),
                num_nodes
            )));
        }
        log::debug!("Tree solver order: {:?}", order);

        Ok(TreeMaxSumSolver {
            num_nodes,
            children,
            order,
            distance_transform: false,
            beliefs: vec![Vec::new(); num_nodes],
            arg_tables: vec![Vec::new(); num_nodes],
            argmax: vec![0; num_nodes],
            g: vec![Vec::new(); edges.len()],
            best: Vec::new(),
        })
    }

    /// Nodes in processing order; the last one is the root.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn root(&self) -> usize {
        self.order[self.order.len() - 1]
    }

    pub fn set_distance_transform(&mut self, enabled: bool) {
        self.distance_transform = enabled;
    }

    pub fn distance_transform(&self) -> bool {
        self.distance_transform
    }

    /// Pairwise scores of `edge` from the last solve, one row of child candidates per
    /// parent candidate. Empty when the edge was solved by the distance transform, which
    /// never builds the table.
    pub fn g_table(&self, edge: usize) -> &[f64] {
        &self.g[edge]
    }

    /// Flat candidate indices chosen by the last solve.
    pub fn argmax_indices(&self) -> &[usize] {
        &self.argmax
    }

    fn collect_child(
        &mut self,
        parent_belief: &mut [f64],
        child: usize,
        edge: usize,
        scores: &EdgeScores,
    ) {
        let parent_length = parent_belief.len();
        let child_length = self.beliefs[child].len();
        self.arg_tables[child].resize(parent_length, 0);

        if self.distance_transform {
            self.best.resize(parent_length, 0.0);
            if scores.cost.distance_transform(
                scores.w,
                &self.beliefs[child],
                &mut self.best,
                &mut self.arg_tables[child],
            ) {
                for (belief, &best) in parent_belief.iter_mut().zip(self.best.iter()) {
                    *belief += best;
                }
                self.g[edge].clear();
                return;
            }
            log::warn!(
                "Distance transform is not applicable to edge {}, falling back to brute force",
                edge
            );
        }

        let g = &mut self.g[edge];
        g.resize(parent_length * child_length, 0.0);
        let child_belief = &self.beliefs[child];

        for (x, row) in g.chunks_exact_mut(child_length).enumerate() {
            scores.cost.dot_product_with_wg(scores.w, row, x);

            let mut maximum = f64::NEG_INFINITY;
            let mut index = 0;
            for (c, (&b, &g_value)) in child_belief.iter().zip(row.iter()).enumerate() {
                let sum = b + g_value;
                if sum > maximum {
                    maximum = sum;
                    index = c;
                }
            }

            parent_belief[x] += maximum;
            self.arg_tables[child][x] = index;
        }
    }
}

impl MaxSumSolver for TreeMaxSumSolver {
    fn solve(
        &mut self,
        nodes: &[NodeScores<'_>],
        edges: &[EdgeScores<'_>],
        output: &mut [Position],
    ) -> f64 {
        debug_assert_eq!(nodes.len(), self.num_nodes);
        debug_assert_eq!(edges.len(), self.g.len());

        for k in 0..self.order.len() {
            let node = self.order[k];

            let mut belief = mem::take(&mut self.beliefs[node]);
            belief.clear();
            belief.extend_from_slice(nodes[node].q);

            for c in 0..self.children[node].len() {
                let (child, edge) = self.children[node][c];
                self.collect_child(&mut belief, child, edge, &edges[edge]);
            }

            self.beliefs[node] = belief;
        }

        let root = self.root();
        let (root_index, maximum) =
            math::argmax(&self.beliefs[root]).unwrap_or((0, f64::NEG_INFINITY));
        self.argmax[root] = root_index;

        for &node in self.order.iter().rev() {
            for &(child, _) in &self.children[node] {
                self.argmax[child] = self.arg_tables[child][self.argmax[node]];
            }
        }

        for (node, position) in output.iter_mut().enumerate().take(self.num_nodes) {
            *position = nodes[node].search_space.position_of(self.argmax[node]);
        }

        maximum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deform::DisplacementDeformationCost;
    use crate::feat::SearchSpace;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_order_puts_leaves_first_and_root_last() {
        // 0 -> 1, 0 -> 2, 2 -> 3
        let solver = TreeMaxSumSolver::new(4, &[(0, 1), (0, 2), (2, 3)]).unwrap();
        assert_eq!(&[1, 3, 2, 0], solver.order());
        assert_eq!(0, solver.root());

        let star = TreeMaxSumSolver::new(5, &[(0, 1), (0, 2), (0, 3), (0, 4)]).unwrap();
        assert_eq!(&[1, 2, 3, 4, 0], star.order());
    }

    #[test]
    fn test_non_trees_are_rejected() {
        // cycle plus an isolated node
        assert!(matches!(
            TreeMaxSumSolver::new(4, &[(0, 1), (1, 2), (2, 0)]),
            Err(Error::NotATree(_))
        ));
        // two components
        assert!(TreeMaxSumSolver::new(4, &[(0, 1), (2, 3)]).is_err());
        // two parents
        assert!(TreeMaxSumSolver::new(3, &[(0, 2), (1, 2)]).is_err());
        assert!(TreeMaxSumSolver::new(2, &[(0, 0)]).is_err());
        assert!(TreeMaxSumSolver::new(2, &[(0, 5)]).is_err());
        assert!(TreeMaxSumSolver::new(0, &[]).is_err());
    }

    #[test]
    fn test_single_node_is_argmax() {
        let ss = SearchSpace::new(3, 4, 5, 5).unwrap();
        let q = [0.5, 2.0, -1.0, 2.0, 1.5, 0.0];
        let mut solver = TreeMaxSumSolver::new(1, &[]).unwrap();
        let mut output = [Position::default()];
        let score = solver.solve(
            &[NodeScores {
                q: &q,
                search_space: &ss,
            }],
            &[],
            &mut output,
        );
        assert_eq!(2.0, score);
        // first maximum wins: candidate 1 = (3, 5)
        assert_eq!(Position::new(3, 5), output[0]);
    }

    fn random_space(rng: &mut StdRng) -> SearchSpace {
        let x = rng.gen_range(0..20);
        let y = rng.gen_range(0..20);
        SearchSpace::new(x, y, x + rng.gen_range(0..4), y + rng.gen_range(0..4)).unwrap()
    }

    #[test]
    fn test_chain_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let parent = random_space(&mut rng);
            let child = random_space(&mut rng);
            let cost = DisplacementDeformationCost::new(parent, child, 4, None).unwrap();
            let w: Vec<f64> = (0..4).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let q_parent: Vec<f64> = (0..parent.len()).map(|_| rng.gen_range(-10.0..10.0)).collect();
            let q_child: Vec<f64> = (0..child.len()).map(|_| rng.gen_range(-10.0..10.0)).collect();

            let mut expected = f64::NEG_INFINITY;
            let mut expected_positions = [Position::default(); 2];
            for x in 0..parent.len() {
                for y in 0..child.len() {
                    let (p, c) = (parent.position_of(x), child.position_of(y));
                    let score = q_parent[x] + q_child[y] + cost.g_value(p, c, &w);
                    if score > expected {
                        expected = score;
                        expected_positions = [p, c];
                    }
                }
            }

            let mut solver = TreeMaxSumSolver::new(2, &[(0, 1)]).unwrap();
            let mut output = [Position::default(); 2];
            let score = solver.solve(
                &[
                    NodeScores {
                        q: &q_parent,
                        search_space: &parent,
                    },
                    NodeScores {
                        q: &q_child,
                        search_space: &child,
                    },
                ],
                &[EdgeScores { w: &w, cost: &cost }],
                &mut output,
            );

            assert!((expected - score).abs() < 1e-9);
            assert_eq!(expected_positions, output);
        }
    }

    #[test]
    fn test_distance_transform_matches_brute_force_on_a_tree() {
        let mut rng = StdRng::seed_from_u64(11);
        let edges = [(0, 1), (0, 2), (2, 3)];
        for _ in 0..20 {
            let spaces: Vec<SearchSpace> = (0..4).map(|_| random_space(&mut rng)).collect();
            let costs: Vec<DisplacementDeformationCost> = edges
                .iter()
                .map(|&(p, c)| DisplacementDeformationCost::new(spaces[p], spaces[c], 5, None).unwrap())
                .collect();
            let weights: Vec<Vec<f64>> = edges
                .iter()
                .map(|_| {
                    vec![
                        rng.gen_range(-1.0..1.0),
                        rng.gen_range(-1.0..1.0),
                        rng.gen_range(-1.0..-0.05),
                        rng.gen_range(-1.0..-0.05),
                        rng.gen_range(-1.0..1.0),
                    ]
                })
                .collect();
            let qs: Vec<Vec<f64>> = spaces
                .iter()
                .map(|ss| (0..ss.len()).map(|_| rng.gen_range(-10.0..10.0)).collect())
                .collect();

            let nodes: Vec<NodeScores> = qs
                .iter()
                .zip(spaces.iter())
                .map(|(q, ss)| NodeScores { q, search_space: ss })
                .collect();
            let edge_scores: Vec<EdgeScores> = weights
                .iter()
                .zip(costs.iter())
                .map(|(w, cost)| EdgeScores { w, cost })
                .collect();

            let mut solver = TreeMaxSumSolver::new(4, &edges).unwrap();
            let mut brute = [Position::default(); 4];
            let expected = solver.solve(&nodes, &edge_scores, &mut brute);

            solver.set_distance_transform(true);
            let mut fast = [Position::default(); 4];
            let score = solver.solve(&nodes, &edge_scores, &mut fast);
            assert!((expected - score).abs() < 1e-9);

            // the assignment found by the fast path scores the maximum
            let mut total: f64 = (0..4)
                .map(|i| qs[i][spaces[i].index_of(fast[i]).unwrap()])
                .sum();
            for (e, &(p, c)) in edges.iter().enumerate() {
                total += costs[e].g_value(fast[p], fast[c], &weights[e]);
            }
            assert!((expected - total).abs() < 1e-9);
        }
    }

    #[test]
    fn test_g_table_holds_only_brute_force_scores() {
        let parent = SearchSpace::new(0, 0, 1, 1).unwrap();
        let child = SearchSpace::new(2, 0, 3, 2).unwrap();
        let cost = DisplacementDeformationCost::new(parent, child, 4, None).unwrap();
        let w = [0.5, 0.0, -0.25, -0.25];
        let q_parent = vec![0.0; parent.len()];
        let q_child = vec![0.0; child.len()];
        let nodes = [
            NodeScores {
                q: &q_parent,
                search_space: &parent,
            },
            NodeScores {
                q: &q_child,
                search_space: &child,
            },
        ];
        let edges = [EdgeScores { w: &w, cost: &cost }];

        let mut solver = TreeMaxSumSolver::new(2, &[(0, 1)]).unwrap();
        let mut output = [Position::default(); 2];
        solver.solve(&nodes, &edges, &mut output);
        assert_eq!(parent.len() * child.len(), solver.g_table(0).len());
        assert_eq!(
            cost.g_value(parent.position_of(1), child.position_of(4), &w),
            solver.g_table(0)[child.len() + 4]
        );

        solver.set_distance_transform(true);
        solver.solve(&nodes, &edges, &mut output);
        assert!(solver.g_table(0).is_empty());
    }
}
