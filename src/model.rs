//! Inference engine
//!
//! The trained model ships as a read-only artifact bundle (class list,
//! fitted preprocessing parameters, forest structure) produced by the
//! offline training pipeline and loaded once at process start. Inference
//! walks every tree per row and soft-votes the leaf class distributions.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ndarray::ArrayView1;
use parking_lot::RwLock;
use serde::Deserialize;

use crate::features::ConnectionRecord;
use crate::preprocess::Preprocessor;
use crate::{ArtifactError, PredictError};

/// One classified connection: predicted label plus per-class probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted class label.
    pub label: String,
    /// Per-class probabilities, summing to ~1.0.
    pub probabilities: BTreeMap<String, f64>,
}

/// The inference engine contract the scheduler dispatches against.
///
/// Implementations must be deterministic for identical inputs and must
/// return exactly one prediction per record, in record order.
pub trait Classifier: Send + Sync {
    /// Classify a batch of records, one prediction per record.
    fn classify(&self, records: &[ConnectionRecord]) -> Result<Vec<Prediction>, PredictError>;
}

/// One decision tree in flattened array form (parallel arrays per node).
///
/// `feature[i] < 0` marks node `i` as a leaf; `value[i]` holds the class
/// histogram observed at that node during training.
#[derive(Debug, Clone, Deserialize)]
struct Tree {
    feature: Vec<i32>,
    threshold: Vec<f64>,
    left: Vec<i32>,
    right: Vec<i32>,
    value: Vec<Vec<f64>>,
}

impl Tree {
    fn check(&self, n_features: usize, n_classes: usize) -> Result<(), ArtifactError> {
        let nodes = self.feature.len();
        if nodes == 0 {
            return Err(ArtifactError::Shape("tree has no nodes".into()));
        }
        if self.threshold.len() != nodes
            || self.left.len() != nodes
            || self.right.len() != nodes
            || self.value.len() != nodes
        {
            return Err(ArtifactError::Shape("tree arrays differ in length".into()));
        }
        for i in 0..nodes {
            if self.feature[i] >= 0 {
                if self.feature[i] as usize >= n_features {
                    return Err(ArtifactError::Shape(format!(
                        "node {i} splits on feature {} of {n_features}",
                        self.feature[i]
                    )));
                }
                let (l, r) = (self.left[i], self.right[i]);
                if l < 0 || r < 0 || l as usize >= nodes || r as usize >= nodes {
                    return Err(ArtifactError::Shape(format!(
                        "node {i} has out-of-range children"
                    )));
                }
            } else if self.value[i].len() != n_classes {
                return Err(ArtifactError::Shape(format!(
                    "leaf {i} has {} class weights for {n_classes} classes",
                    self.value[i].len()
                )));
            }
        }
        Ok(())
    }

    /// Normalize leaf histograms into probability distributions.
    fn normalize_leaves(&mut self) -> Result<(), ArtifactError> {
        for i in 0..self.feature.len() {
            if self.feature[i] < 0 {
                let total: f64 = self.value[i].iter().sum();
                if total <= 0.0 || !total.is_finite() {
                    return Err(ArtifactError::Shape(format!("leaf {i} has no class mass")));
                }
                for weight in &mut self.value[i] {
                    *weight /= total;
                }
            }
        }
        Ok(())
    }

    fn leaf_distribution(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut node = 0usize;
        while self.feature[node] >= 0 {
            let feat = self.feature[node] as usize;
            node = if row[feat] <= self.threshold[node] {
                self.left[node] as usize
            } else {
                self.right[node] as usize
            };
        }
        &self.value[node]
    }
}

/// On-disk artifact bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactBundle {
    /// Human-readable model name, reported by /health.
    pub model_name: String,
    /// Class labels in probability-vector order.
    pub classes: Vec<String>,
    /// Fitted preprocessing parameters.
    pub preprocessor: Preprocessor,
    trees: Vec<Tree>,
}

/// Random-forest classifier backed by a loaded artifact bundle.
///
/// Purely deterministic; no internal state mutates per call beyond the
/// inference counters.
pub struct ForestModel {
    name: String,
    classes: Vec<String>,
    preprocessor: Preprocessor,
    trees: Vec<Tree>,
    stats: Arc<RwLock<InferenceStats>>,
}

impl ForestModel {
    /// Load and validate an artifact bundle from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let raw = fs::read_to_string(path)?;
        let bundle: ArtifactBundle = serde_json::from_str(&raw)?;
        Self::from_bundle(bundle)
    }

    /// Build a model from an already-deserialized bundle.
    pub fn from_bundle(bundle: ArtifactBundle) -> Result<Self, ArtifactError> {
        bundle.preprocessor.check()?;
        // Probe the pipeline once so a bundle whose columns do not exist
        // in the connection schema fails at startup, not per request.
        bundle
            .preprocessor
            .normalize_batch(&[ConnectionRecord::default()])
            .map_err(|e| ArtifactError::Shape(e.to_string()))?;
        if bundle.classes.is_empty() {
            return Err(ArtifactError::Shape("bundle lists no classes".into()));
        }
        if bundle.trees.is_empty() {
            return Err(ArtifactError::Shape("bundle contains no trees".into()));
        }
        let n_features = bundle.preprocessor.columns().len();
        let mut trees = bundle.trees;
        for tree in &mut trees {
            tree.check(n_features, bundle.classes.len())?;
            tree.normalize_leaves()?;
        }
        Ok(Self {
            name: bundle.model_name,
            classes: bundle.classes,
            preprocessor: bundle.preprocessor,
            trees,
            stats: Arc::new(RwLock::new(InferenceStats::default())),
        })
    }

    /// Model name, as reported by /health.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class labels in probability-vector order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Snapshot of the inference counters.
    pub fn stats(&self) -> InferenceStats {
        self.stats.read().clone()
    }
}

impl Classifier for ForestModel {
    fn classify(&self, records: &[ConnectionRecord]) -> Result<Vec<Prediction>, PredictError> {
        let start = Instant::now();
        let matrix = self.preprocessor.normalize_batch(records)?;

        let inv_trees = 1.0 / self.trees.len() as f64;
        let mut predictions = Vec::with_capacity(records.len());
        for row in matrix.rows() {
            let mut probs = vec![0.0; self.classes.len()];
            for tree in &self.trees {
                for (p, d) in probs.iter_mut().zip(tree.leaf_distribution(row)) {
                    *p += d;
                }
            }
            for p in &mut probs {
                *p *= inv_trees;
            }

            let best = probs
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .ok_or_else(|| PredictError::Inference("empty probability vector".into()))?;

            let probabilities = self
                .classes
                .iter()
                .cloned()
                .zip(probs.iter().copied())
                .collect();
            predictions.push(Prediction {
                label: self.classes[best].clone(),
                probabilities,
            });
        }

        let elapsed = start.elapsed();
        let mut stats = self.stats.write();
        stats.total_inferences += predictions.len() as u64;
        stats.total_batches += 1;
        stats.total_latency_us += elapsed.as_micros() as u64;

        Ok(predictions)
    }
}

/// Inference counters.
#[derive(Debug, Clone, Default)]
pub struct InferenceStats {
    /// Records classified since start.
    pub total_inferences: u64,
    /// Batches dispatched to the engine since start.
    pub total_batches: u64,
    /// Cumulative engine wall-clock in microseconds.
    pub total_latency_us: u64,
}

impl InferenceStats {
    /// Average engine latency per batch in microseconds.
    pub fn avg_latency_us(&self) -> f64 {
        if self.total_batches == 0 {
            0.0
        } else {
            self.total_latency_us as f64 / self.total_batches as f64
        }
    }

    /// Average records per dispatched batch.
    pub fn avg_batch_size(&self) -> f64 {
        if self.total_batches == 0 {
            0.0
        } else {
            self.total_inferences as f64 / self.total_batches as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_bundle() -> ArtifactBundle {
        // Two columns, one stump: serror_rate <= 0.5 -> benign, else dos.
        serde_json::from_value(serde_json::json!({
            "model_name": "RandomForest",
            "classes": ["dos", "normal"],
            "preprocessor": {
                "columns": ["protocol_type", "serror_rate"],
                "encoders": { "protocol_type": ["icmp", "tcp", "udp"] },
                "means": [0.0, 0.0],
                "scales": [1.0, 1.0]
            },
            "trees": [{
                "feature": [1, -1, -1],
                "threshold": [0.5, 0.0, 0.0],
                "left": [1, -1, -1],
                "right": [2, -1, -1],
                "value": [[0.0, 0.0], [1.0, 9.0], [8.0, 2.0]]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn classifies_by_leaf_distribution() {
        let model = ForestModel::from_bundle(tiny_bundle()).unwrap();
        let benign = ConnectionRecord::default();
        let noisy = ConnectionRecord {
            serror_rate: 0.9,
            ..Default::default()
        };

        let out = model.classify(&[benign, noisy]).unwrap();
        assert_eq!(out[0].label, "normal");
        assert_eq!(out[1].label, "dos");
        assert!((out[0].probabilities["normal"] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let model = ForestModel::from_bundle(tiny_bundle()).unwrap();
        let out = model.classify(&[ConnectionRecord::default()]).unwrap();
        let total: f64 = out[0].probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identical_input_yields_identical_output() {
        let model = ForestModel::from_bundle(tiny_bundle()).unwrap();
        let record = ConnectionRecord {
            src_bytes: 215,
            ..Default::default()
        };
        let a = model.classify(std::slice::from_ref(&record)).unwrap();
        let b = model.classify(std::slice::from_ref(&record)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stats_track_batches_and_rows() {
        let model = ForestModel::from_bundle(tiny_bundle()).unwrap();
        model
            .classify(&[ConnectionRecord::default(), ConnectionRecord::default()])
            .unwrap();
        model.classify(&[ConnectionRecord::default()]).unwrap();
        let stats = model.stats();
        assert_eq!(stats.total_batches, 2);
        assert_eq!(stats.total_inferences, 3);
        assert!((stats.avg_batch_size() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_leaf_with_wrong_class_width() {
        let mut bundle = tiny_bundle();
        bundle.trees[0].value[1] = vec![1.0];
        assert!(matches!(
            ForestModel::from_bundle(bundle),
            Err(ArtifactError::Shape(_))
        ));
    }

    #[test]
    fn rejects_bundle_with_unknown_column() {
        let bundle: ArtifactBundle = serde_json::from_value(serde_json::json!({
            "model_name": "RandomForest",
            "classes": ["dos", "normal"],
            "preprocessor": {
                "columns": ["serror_rate", "label"],
                "encoders": {},
                "means": [0.0, 0.0],
                "scales": [1.0, 1.0]
            },
            "trees": [{
                "feature": [-1],
                "threshold": [0.0],
                "left": [-1],
                "right": [-1],
                "value": [[1.0, 3.0]]
            }]
        }))
        .unwrap();
        assert!(matches!(
            ForestModel::from_bundle(bundle),
            Err(ArtifactError::Shape(_))
        ));
    }

    #[test]
    fn rejects_empty_forest() {
        let mut bundle = tiny_bundle();
        bundle.trees.clear();
        assert!(ForestModel::from_bundle(bundle).is_err());
    }

    #[test]
    fn shipped_bundle_classifies_the_baseline_as_normal() {
        let model = ForestModel::load("artifacts/model.json").unwrap();
        let record = ConnectionRecord {
            src_bytes: 215,
            dst_bytes: 45076,
            logged_in: 1,
            ..Default::default()
        };
        let out = model.classify(std::slice::from_ref(&record)).unwrap();
        assert_eq!(out[0].label, "normal");
        let total: f64 = out[0].probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }
}
