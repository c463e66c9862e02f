//! CART regression tree builder
//!
//! Exact-greedy construction: at each node every feature is sorted and every
//! boundary between distinct consecutive values is tried. The split minimising
//! the summed squared error of both children wins; among equal scores the first
//! one found (lowest feature index, then lowest threshold) is kept. Thresholds
//! are midpoints between the two neighbouring values.

use aircast_core::{Node, Tree};

/// Growth limits for a single tree
#[derive(Clone, Debug, PartialEq)]
pub struct TreeConfig {
    /// `None` grows until another limit stops it.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    score: f64,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// A node still to be grown: rows `start..end` of the working index buffer.
#[derive(Debug)]
struct PendingNode {
    start: usize,
    end: usize,
    depth: usize,
    parent: Option<(usize, Side)>,
}

/// Builds one regression tree over a row-major feature matrix
pub struct CartBuilder<'a> {
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    config: &'a TreeConfig,
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    pub fn new(features: &'a [Vec<f64>], targets: &'a [f64], config: &'a TreeConfig) -> Self {
        let feature_count = features.first().map_or(0, Vec::len);
        Self {
            features,
            targets,
            config,
            feature_count,
        }
    }

    /// Build a tree from the given sample indices. Repeated indices (a bootstrap
    /// sample) count once per occurrence.
    ///
    /// Nodes are laid out in pre-order. Growth uses an explicit work stack, so
    /// an unlimited-depth tree over a long chain of rows needs no call stack.
    pub fn build(&self, sample: &[usize]) -> Tree {
        let mut nodes = Vec::new();
        if sample.is_empty() {
            nodes.push(Node::leaf(0, 0.0));
            return Tree::new(nodes);
        }

        let mut indices = sample.to_vec();
        let mut pending = vec![PendingNode {
            start: 0,
            end: indices.len(),
            depth: 0,
            parent: None,
        }];

        while let Some(task) = pending.pop() {
            let current = nodes.len();
            if let Some((parent, side)) = task.parent {
                let parent: &mut Node = &mut nodes[parent];
                match side {
                    Side::Left => parent.left = current as i32,
                    Side::Right => parent.right = current as i32,
                }
            }

            let rows = &mut indices[task.start..task.end];
            let (mean, sse) = self.mean_and_sse(rows);
            let n = rows.len();

            let depth_reached = self.config.max_depth.map_or(false, |d| task.depth >= d);
            let pure = sse <= f64::EPSILON * n as f64;
            if depth_reached
                || pure
                || n < self.config.min_samples_split
                || n < 2 * self.config.min_samples_leaf
            {
                nodes.push(Node::leaf(current as i32, mean));
                continue;
            }

            let Some(split) = self.find_best_split(rows) else {
                nodes.push(Node::leaf(current as i32, mean));
                continue;
            };

            let boundary =
                partition(rows, |i| self.features[i][split.feature_idx] <= split.threshold);
            nodes.push(Node::internal(
                current as i32,
                split.feature_idx as i32,
                split.threshold,
                -1,
                -1,
            ));

            let mid = task.start + boundary;
            // Right is pushed first so the left subtree is laid out first.
            pending.push(PendingNode {
                start: mid,
                end: task.end,
                depth: task.depth + 1,
                parent: Some((current, Side::Right)),
            });
            pending.push(PendingNode {
                start: task.start,
                end: mid,
                depth: task.depth + 1,
                parent: Some((current, Side::Left)),
            });
        }

        Tree::new(nodes)
    }

    fn mean_and_sse(&self, indices: &[usize]) -> (f64, f64) {
        let n = indices.len() as f64;
        let sum: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let mean = sum / n;
        let sse = indices
            .iter()
            .map(|&i| {
                let d = self.targets[i] - mean;
                d * d
            })
            .sum();
        (mean, sse)
    }

    fn find_best_split(&self, indices: &[usize]) -> Option<SplitCandidate> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;
        let mut order: Vec<usize> = indices.to_vec();

        for feature_idx in 0..self.feature_count {
            let value = |i: usize| self.features[i][feature_idx];
            order.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

            let total_sum: f64 = order.iter().map(|&i| self.targets[i]).sum();
            let total_sq: f64 = order.iter().map(|&i| self.targets[i] * self.targets[i]).sum();

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 1..n {
                let y = self.targets[order[pos - 1]];
                left_sum += y;
                left_sq += y * y;

                let (lo, hi) = (value(order[pos - 1]), value(order[pos]));
                if lo == hi || pos < min_leaf || n - pos < min_leaf {
                    continue;
                }

                let n_left = pos as f64;
                let n_right = (n - pos) as f64;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let score = (left_sq - left_sum * left_sum / n_left).max(0.0)
                    + (right_sq - right_sum * right_sum / n_right).max(0.0);

                if best.map_or(true, |b| score < b.score) {
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold,
                        score,
                    });
                }
            }
        }

        best
    }
}

/// Stable in-place partition; returns the number of elements matching `pred`.
fn partition(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let (matching, rest): (Vec<usize>, Vec<usize>) = indices.iter().copied().partition(|&i| pred(i));
    let boundary = matching.len();
    for (slot, value) in indices.iter_mut().zip(matching.into_iter().chain(rest)) {
        *slot = value;
    }
    boundary
}
