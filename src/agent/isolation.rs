//! Isolation forest outlier model.
//!
//! Points that are isolated by few random axis-aligned splits are outliers.
//! Scores follow the usual convention: `decision_function` is the negated
//! anomaly score shifted by the contamination percentile of the training
//! scores, so negative values are outliers and lower means more anomalous.

use crate::config::AnomalyConfig;
use crate::error::{AgentError, AgentResult};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Number of features per sample.
pub const FEATURES: usize = 3;

pub type Sample = [f64; FEATURES];

const MAX_SAMPLES: usize = 256;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
    offset: f64,
}

impl IsolationForest {
    /// Fit the forest on `samples`.
    pub fn fit(samples: &[Sample], config: &AnomalyConfig) -> AgentResult<Self> {
        if samples.len() < 2 {
            return Err(AgentError::InsufficientSamples {
                required: 2,
                available: samples.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let sample_size = samples.len().min(MAX_SAMPLES);
        let height_limit = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..config.n_trees.max(1))
            .map(|_| {
                let picked = index::sample(&mut rng, samples.len(), sample_size).into_vec();
                build(samples, picked, 0, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            offset: 0.0,
        };

        let mut training_scores: Vec<f64> = samples.iter().map(|s| forest.score_sample(s)).collect();
        forest.offset = percentile(&mut training_scores, config.contamination * 100.0);

        Ok(forest)
    }

    /// Raw score in `[-1, 0]`; lower is more anomalous.
    pub fn score_sample(&self, sample: &Sample) -> f64 {
        let mean_depth = self
            .trees
            .iter()
            .map(|tree| path_length(tree, sample, 0))
            .sum::<f64>()
            / self.trees.len() as f64;

        -(2f64.powf(-mean_depth / average_path_length(self.sample_size)))
    }

    /// Score shifted by the contamination offset. Negative means outlier.
    pub fn decision_function(&self, sample: &Sample) -> f64 {
        self.score_sample(sample) - self.offset
    }

    #[cfg(test)]
    pub fn is_outlier(&self, sample: &Sample) -> bool {
        self.decision_function(sample) < 0.0
    }
}

fn build(samples: &[Sample], rows: Vec<usize>, depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    if depth >= limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let ranges: Vec<(usize, f64, f64)> = (0..FEATURES)
        .filter_map(|feature| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(samples[r][feature]), hi.max(samples[r][feature]))
            });
            (hi > lo).then_some((feature, lo, hi))
        })
        .collect();

    // every feature is constant: nothing left to isolate
    if ranges.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
    let threshold = rng.gen_range(lo..hi);

    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| samples[r][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build(samples, left, depth + 1, limit, rng)),
        right: Box::new(build(samples, right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, sample: &Sample, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if sample[*feature] <= *threshold {
                path_length(left, sample, depth + 1)
            } else {
                path_length(right, sample, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree
/// of `n` nodes.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile, `q` in `[0, 100]`.
fn percentile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (rank - lo as f64)
}
