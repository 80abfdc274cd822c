//! Seeded random forest classifier
//!
//! Bootstrap-sampled CART trees with Gini splits and `sqrt(n_features)`
//! candidate features per node, combined by majority vote. Every random
//! choice is drawn from a `StdRng` derived from the configured seed, so the
//! same data and seed always produce the same forest.

use crate::core::PipelineError;
use crate::model::Classifier;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> usize {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { class } => return *class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    classes: Vec<String>,
    trees: Vec<Node>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            n_features: 0,
            classes: Vec::new(),
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

/// Training data viewed as class indices
struct Samples<'a> {
    features: &'a [Vec<f64>],
    targets: Vec<usize>,
    n_classes: usize,
}

struct TreeBuilder<'a> {
    samples: &'a Samples<'a>,
    params: ForestParams,
    n_candidates: usize,
    rng: StdRng,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: &[usize], depth: usize) -> Node {
        let counts = self.class_counts(indices);
        let majority = argmax(&counts);

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if pure || depth_reached || indices.len() < self.params.min_samples_split {
            return Node::Leaf { class: majority };
        }

        match self.best_split(indices) {
            Some((feature, threshold)) => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| self.samples.features[i][feature] <= threshold);
                Node::Split {
                    feature,
                    threshold,
                    left: Box::new(self.build(&left, depth + 1)),
                    right: Box::new(self.build(&right, depth + 1)),
                }
            }
            None => Node::Leaf { class: majority },
        }
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.samples.n_classes];
        for &i in indices {
            counts[self.samples.targets[i]] += 1;
        }
        counts
    }

    /// Lowest weighted Gini impurity over a random subset of features
    fn best_split(&mut self, indices: &[usize]) -> Option<(usize, f64)> {
        let n_features = self.samples.features[0].len();
        let candidates = index::sample(&mut self.rng, n_features, self.n_candidates).into_vec();

        let mut best: Option<(f64, usize, f64)> = None;
        for feature in candidates {
            let mut values: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (self.samples.features[i][feature], self.samples.targets[i]))
                .collect();
            values.sort_by(|a, b| a.0.total_cmp(&b.0));

            let total = values.len();
            let mut left = vec![0usize; self.samples.n_classes];
            let mut right = vec![0usize; self.samples.n_classes];
            for &(_, class) in &values {
                right[class] += 1;
            }

            for split in 1..total {
                let (prev_value, prev_class) = values[split - 1];
                left[prev_class] += 1;
                right[prev_class] -= 1;

                let value = values[split].0;
                if value <= prev_value {
                    continue;
                }

                let impurity = (split as f64 * gini(&left, split)
                    + (total - split) as f64 * gini(&right, total - split))
                    / total as f64;
                let threshold = prev_value + (value - prev_value) / 2.0;

                if best.map_or(true, |(b, _, _)| impurity < b) {
                    best = Some((impurity, feature, threshold));
                }
            }
        }

        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Index of the largest count; ties go to the lowest index
fn argmax(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

impl Classifier for RandomForest {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[String]) -> Result<(), PipelineError> {
        if features.is_empty() {
            return Err(PipelineError::InvalidData("cannot fit on an empty dataset".to_string()));
        }
        if features.len() != labels.len() {
            return Err(PipelineError::InvalidData(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        let n_features = features[0].len();
        if n_features == 0 || features.iter().any(|r| r.len() != n_features) {
            return Err(PipelineError::InvalidData(
                "feature rows must be non-empty and equally sized".to_string(),
            ));
        }

        let classes: Vec<String> = labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let targets = labels
            .iter()
            .map(|l| classes.binary_search(l).unwrap_or(0))
            .collect();
        let samples = Samples {
            features,
            targets,
            n_classes: classes.len(),
        };

        let n_candidates = ((n_features as f64).sqrt() as usize).clamp(1, n_features);
        let mut master = StdRng::seed_from_u64(self.params.seed);
        let n = features.len();

        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for _ in 0..self.params.n_estimators {
            let mut rng = StdRng::seed_from_u64(master.random::<u64>());
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
            let mut builder = TreeBuilder {
                samples: &samples,
                params: self.params,
                n_candidates,
                rng,
            };
            trees.push(builder.build(&bootstrap, 0));
        }

        self.n_features = n_features;
        self.classes = classes;
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<String>, PipelineError> {
        if !self.is_fitted() {
            return Err(PipelineError::InvalidData("model has not been fitted".to_string()));
        }

        let mut predictions = Vec::with_capacity(features.len());
        for (i, row) in features.iter().enumerate() {
            if row.len() != self.n_features {
                return Err(PipelineError::InvalidData(format!(
                    "row {} has {} features, model expects {}",
                    i + 1,
                    row.len(),
                    self.n_features
                )));
            }
            let mut votes = vec![0usize; self.classes.len()];
            for tree in &self.trees {
                let class = tree.predict(row);
                if let Some(v) = votes.get_mut(class) {
                    *v += 1;
                }
            }
            predictions.push(self.classes[argmax(&votes)].clone());
        }
        Ok(predictions)
    }
}
