// fraudwatch/src/model.rs
//
// Decision Function — opaque scoring artifact.
//
// The artifact is a JSON file exported by the offline training pipeline:
//
//   {
//     "model_version": "corina-1.2",
//     "feature_order": ["amt", "hour_of_day", ...],
//     "weights": [...],               // one per feature
//     "intercept": -5.1,
//     "threshold": 0.9
//   }
//
// The pipeline treats scoring as a black box: vector in, probability in
// [0,1] out. Any failure mode — file absent, corrupt JSON, feature order or
// weight count diverging from the frozen serving contract — degrades to the
// safe default (probability 0.0, every transaction legitimate) with a single
// warning, never an error that stalls the pipeline.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::events::Decision;
use crate::features::{FeatureVector, FIELD_NAMES};

pub const DEFAULT_THRESHOLD: f64 = 0.9;

#[derive(Debug, Deserialize)]
struct Artifact {
    model_version: String,
    feature_order: Vec<String>,
    weights: Vec<f64>,
    intercept: f64,
    #[serde(default)]
    threshold: Option<f64>,
}

#[derive(Debug)]
enum Inner {
    Loaded {
        version: String,
        weights: Vec<f64>,
        intercept: f64,
    },
    /// No usable artifact — score everything 0.0.
    Absent,
}

#[derive(Debug)]
pub struct ScoringModel {
    inner: Inner,
    threshold: f64,
}

impl ScoringModel {
    /// Load the artifact, validating it against the serving feature contract.
    /// Never fails; degraded models classify everything legitimate.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                warn!(
                    "scoring artifact not loaded from {} ({e}) — defaulting every \
                     transaction to legitimate",
                    path.display()
                );
                return Self::absent();
            }
        };

        let artifact: Artifact = match serde_json::from_slice(&bytes) {
            Ok(a) => a,
            Err(e) => {
                warn!("scoring artifact unreadable: {e} — defaulting to legitimate");
                return Self::absent();
            }
        };

        let order_ok = artifact.feature_order.len() == FIELD_NAMES.len()
            && artifact
                .feature_order
                .iter()
                .zip(FIELD_NAMES.iter())
                .all(|(a, &b)| a.as_str() == b);
        if !order_ok {
            warn!(
                version = %artifact.model_version,
                "artifact feature order diverges from the serving contract — \
                 scoring disabled to prevent train/serve skew"
            );
            return Self::absent();
        }
        if artifact.weights.len() != FIELD_NAMES.len() {
            warn!(
                version = %artifact.model_version,
                "artifact declares {} weights for {} features — scoring disabled",
                artifact.weights.len(),
                FIELD_NAMES.len()
            );
            return Self::absent();
        }

        let threshold = artifact.threshold.unwrap_or(DEFAULT_THRESHOLD);
        info!(
            version = %artifact.model_version,
            threshold,
            "scoring artifact loaded"
        );
        Self {
            inner: Inner::Loaded {
                version: artifact.model_version,
                weights: artifact.weights,
                intercept: artifact.intercept,
            },
            threshold,
        }
    }

    pub fn absent() -> Self {
        Self {
            inner: Inner::Absent,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Test fixture: a loaded model with explicit weights.
    pub fn from_parts(weights: Vec<f64>, intercept: f64, threshold: f64) -> Self {
        Self {
            inner: Inner::Loaded {
                version: "test".into(),
                weights,
                intercept,
            },
            threshold,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.inner, Inner::Loaded { .. })
    }

    pub fn version(&self) -> Option<&str> {
        match &self.inner {
            Inner::Loaded { version, .. } => Some(version),
            Inner::Absent => None,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `score(vector) -> probability in [0,1]`.
    pub fn score(&self, features: &FeatureVector) -> f64 {
        match &self.inner {
            Inner::Absent => 0.0,
            Inner::Loaded {
                weights, intercept, ..
            } => {
                let z: f64 = features
                    .values
                    .iter()
                    .zip(weights)
                    .map(|(x, w)| x * w)
                    .sum::<f64>()
                    + intercept;
                let p = 1.0 / (1.0 + (-z).exp());
                if p.is_finite() {
                    p.clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
        }
    }

    pub fn classify(&self, probability: f64) -> Decision {
        classify(probability, self.threshold)
    }
}

/// Thresholding is a pure function; exceeding the threshold flags fraud.
pub fn classify(probability: f64, threshold: f64) -> Decision {
    if probability > threshold {
        Decision::Fraudulent
    } else {
        Decision::Legitimate
    }
}
