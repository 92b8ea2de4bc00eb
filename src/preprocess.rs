//! Preprocessing pipeline
//!
//! Applies the fitted preprocessing artifacts to raw connection records:
//! categorical label encoding (unseen values fall back to the first fitted
//! category), fixed feature column order, then standard scaling. The
//! pipeline is immutable after load and safe to share across workers.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::Deserialize;

use crate::features::{ConnectionRecord, FieldValue};
use crate::{ArtifactError, PredictError};

/// Fitted preprocessing parameters, deserialized from the artifact bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct Preprocessor {
    /// Feature columns in model input order.
    columns: Vec<String>,
    /// Fitted category lists per categorical column, in encoded order.
    encoders: BTreeMap<String, Vec<String>>,
    /// Per-column means for standard scaling.
    means: Vec<f64>,
    /// Per-column scales for standard scaling.
    scales: Vec<f64>,
}

impl Preprocessor {
    /// Feature columns in model input order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Shape-check the fitted parameters after deserialization.
    pub fn check(&self) -> Result<(), ArtifactError> {
        if self.columns.is_empty() {
            return Err(ArtifactError::Shape("no feature columns".into()));
        }
        if self.means.len() != self.columns.len() || self.scales.len() != self.columns.len() {
            return Err(ArtifactError::Shape(format!(
                "scaler has {} means and {} scales for {} columns",
                self.means.len(),
                self.scales.len(),
                self.columns.len()
            )));
        }
        if self.scales.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(ArtifactError::Shape("scaler contains a zero scale".into()));
        }
        for column in self.encoders.keys() {
            if !self.columns.contains(column) {
                return Err(ArtifactError::Shape(format!(
                    "encoder for `{column}` has no matching feature column"
                )));
            }
        }
        Ok(())
    }

    /// Encode and scale a batch of records into the model's input matrix.
    ///
    /// Row order equals record order. Fails only on structural problems
    /// (a column the record cannot supply), never on out-of-range values.
    pub fn normalize_batch(
        &self,
        records: &[ConnectionRecord],
    ) -> Result<Array2<f64>, PredictError> {
        let width = self.columns.len();
        let mut data = Vec::with_capacity(records.len() * width);

        for record in records {
            for (idx, column) in self.columns.iter().enumerate() {
                let raw = match (record.field(column), self.encoders.get(column)) {
                    (Some(FieldValue::Categorical(value)), Some(classes)) => {
                        // Unseen categories map to the first fitted class.
                        classes.iter().position(|c| c == value).unwrap_or(0) as f64
                    }
                    (Some(FieldValue::Numeric(value)), None) => value,
                    (Some(_), _) => {
                        return Err(PredictError::Preprocess(format!(
                            "column `{column}` does not match its fitted type"
                        )))
                    }
                    (None, _) => {
                        return Err(PredictError::Preprocess(format!(
                            "record has no feature column `{column}`"
                        )))
                    }
                };
                data.push((raw - self.means[idx]) / self.scales[idx]);
            }
        }

        Array2::from_shape_vec((records.len(), width), data)
            .map_err(|e| PredictError::Preprocess(e.to_string()))
    }
}
