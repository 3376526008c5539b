//! TreeSHAP for a single regression tree.
//!
//! Exact path-dependent Shapley values in polynomial time, following
//! Lundberg et al. (2020), "From local explanations to global understanding
//! with explainable AI for trees" (Algorithm 2). Node covers stand in for
//! the training distribution when a feature is outside the coalition.

use super::tree::RegressionTree;
use crate::features::FEATURE_COUNT;

/// One feature on the current root-to-node path
#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// -1 for the root placeholder
    feature: i32,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

/// Unique-feature path with the permutation weights of Algorithm 2
#[derive(Debug, Clone, Default)]
pub(crate) struct PathState {
    elements: Vec<PathElement>,
}

impl PathState {
    fn with_capacity(depth: usize) -> Self {
        Self {
            elements: Vec::with_capacity(depth + 1),
        }
    }

    fn depth(&self) -> usize {
        self.elements.len()
    }

    fn extend(&mut self, feature: i32, zero_fraction: f64, one_fraction: f64) {
        let l = self.elements.len();
        self.elements.push(PathElement {
            feature,
            zero_fraction,
            one_fraction,
            weight: if l == 0 { 1.0 } else { 0.0 },
        });

        let denom = (l + 1) as f64;
        for i in (0..l).rev() {
            let w = self.elements[i].weight;
            self.elements[i + 1].weight += one_fraction * w * (i + 1) as f64 / denom;
            self.elements[i].weight = zero_fraction * w * (l - i) as f64 / denom;
        }
    }

    /// Remove element `index`, undoing its effect on the weights
    fn unwind(&mut self, index: usize) {
        let l = self.elements.len() - 1;
        let one_fraction = self.elements[index].one_fraction;
        let zero_fraction = self.elements[index].zero_fraction;
        let mut next_one_portion = self.elements[l].weight;
        let denom = (l + 1) as f64;

        for j in (0..l).rev() {
            if one_fraction != 0.0 {
                let tmp = self.elements[j].weight;
                self.elements[j].weight = next_one_portion * denom / ((j + 1) as f64 * one_fraction);
                next_one_portion =
                    tmp - self.elements[j].weight * zero_fraction * (l - j) as f64 / denom;
            } else {
                self.elements[j].weight =
                    self.elements[j].weight * denom / (zero_fraction * (l - j) as f64);
            }
        }

        for j in index..l {
            self.elements[j].feature = self.elements[j + 1].feature;
            self.elements[j].zero_fraction = self.elements[j + 1].zero_fraction;
            self.elements[j].one_fraction = self.elements[j + 1].one_fraction;
        }
        self.elements.pop();
    }

    /// Total permutation weight if element `index` were unwound
    fn unwound_sum(&self, index: usize) -> f64 {
        let l = self.elements.len() - 1;
        let one_fraction = self.elements[index].one_fraction;
        let zero_fraction = self.elements[index].zero_fraction;
        let mut next_one_portion = self.elements[l].weight;
        let denom = (l + 1) as f64;
        let mut total = 0.0;

        for j in (0..l).rev() {
            if one_fraction != 0.0 {
                let tmp = next_one_portion * denom / ((j + 1) as f64 * one_fraction);
                total += tmp;
                next_one_portion =
                    self.elements[j].weight - tmp * zero_fraction * (l - j) as f64 / denom;
            } else if zero_fraction != 0.0 {
                total += (self.elements[j].weight / zero_fraction) / ((l - j) as f64 / denom);
            }
        }

        total
    }

    fn position(&self, feature: i32) -> Option<usize> {
        self.elements.iter().position(|e| e.feature == feature)
    }
}

/// Add this tree's contributions (scaled by `scale`) into `phi`
pub(crate) fn tree_shap(
    tree: &RegressionTree,
    row: &[f64; FEATURE_COUNT],
    scale: f64,
    phi: &mut [f64; FEATURE_COUNT],
) {
    let path = PathState::with_capacity(tree.depth());
    recurse(tree, row, scale, phi, 0, path, 1.0, 1.0, -1);
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &RegressionTree,
    row: &[f64; FEATURE_COUNT],
    scale: f64,
    phi: &mut [f64; FEATURE_COUNT],
    node: usize,
    mut path: PathState,
    zero_fraction: f64,
    one_fraction: f64,
    feature: i32,
) {
    path.extend(feature, zero_fraction, one_fraction);

    let current = tree.node(node);
    if current.is_leaf() {
        for i in 1..path.depth() {
            let element = path.elements[i];
            let w = path.unwound_sum(i);
            phi[element.feature as usize] +=
                w * (element.one_fraction - element.zero_fraction) * current.value * scale;
        }
        return;
    }

    let (hot, cold) = if tree.goes_left(node, row) {
        (current.left as usize, current.right as usize)
    } else {
        (current.right as usize, current.left as usize)
    };

    let cover = tree.cover(node);
    let hot_zero_fraction = tree.cover(hot) / cover;
    let cold_zero_fraction = tree.cover(cold) / cover;

    let split_feature = current.feature as i32;
    let mut incoming_zero = 1.0;
    let mut incoming_one = 1.0;

    // A feature seen higher up the path is merged rather than repeated
    if let Some(index) = path.position(split_feature) {
        incoming_zero = path.elements[index].zero_fraction;
        incoming_one = path.elements[index].one_fraction;
        path.unwind(index);
    }

    recurse(
        tree,
        row,
        scale,
        phi,
        hot,
        path.clone(),
        hot_zero_fraction * incoming_zero,
        incoming_one,
        split_feature,
    );
    recurse(
        tree,
        row,
        scale,
        phi,
        cold,
        path,
        cold_zero_fraction * incoming_zero,
        0.0,
        split_feature,
    );
}
