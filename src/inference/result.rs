//! Prediction results
//!
//! [`ResultFormatter`] pairs every registry label with its probability. The
//! full distribution is always returned; ranking helpers such as
//! [`PredictionResult::top_k`] exist for presentation code.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classes::{ClassLabel, ClassRegistry};
use crate::utils::error::InferenceError;

/// One label with its probability
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassProbability {
    #[serde(flatten)]
    pub label: ClassLabel,
    pub probability: f64,
}

/// Full distribution over the registry plus the measured latency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// One entry per registry label, in registry order
    pub labels: Vec<ClassProbability>,
    /// Seconds spent in preprocessing and inference, rounded to 5 places
    pub latency_secs: f64,
}

impl PredictionResult {
    pub fn new(labels: Vec<ClassProbability>, latency_secs: f64) -> Self {
        Self {
            labels,
            latency_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Probability assigned to a label name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.labels
            .iter()
            .find(|entry| entry.label.name == name)
            .map(|entry| entry.probability)
    }

    /// Most probable label
    pub fn best(&self) -> Option<ClassProbability> {
        self.top_k(1).into_iter().next()
    }

    /// The `k` most probable labels, highest first
    ///
    /// Equal probabilities keep registry order, so the result is stable
    /// across calls.
    pub fn top_k(&self, k: usize) -> Vec<ClassProbability> {
        let mut ranked = self.labels.clone();
        ranked.sort_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then(a.label.index.cmp(&b.label.index))
        });
        ranked.truncate(k);
        ranked
    }

    /// Label name to probability
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        self.labels
            .iter()
            .map(|entry| (entry.label.name, entry.probability))
            .collect()
    }

    /// Sum of all probabilities (1 up to rounding)
    pub fn total(&self) -> f64 {
        self.labels.iter().map(|entry| entry.probability).sum()
    }

    /// Shannon entropy of the distribution, in nats
    pub fn entropy(&self) -> f64 {
        self.labels
            .iter()
            .map(|entry| entry.probability)
            .filter(|&p| p > 0.0)
            .map(|p| -p * p.ln())
            .sum()
    }
}

/// Zips probabilities with registry labels
pub struct ResultFormatter;

impl ResultFormatter {
    pub fn format(
        probabilities: &[f64],
        registry: &ClassRegistry,
    ) -> Result<Vec<ClassProbability>, InferenceError> {
        if probabilities.len() != registry.len() {
            return Err(InferenceError::OutputShape {
                expected: registry.len(),
                found: probabilities.len(),
            });
        }

        Ok(registry
            .labels()
            .zip(probabilities)
            .map(|(label, &probability)| ClassProbability { label, probability })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::NUM_CLASSES;

    fn result_from(probabilities: &[f64]) -> PredictionResult {
        let labels = ResultFormatter::format(probabilities, &ClassRegistry::default()).unwrap();
        PredictionResult::new(labels, 0.01234)
    }

    #[test]
    fn test_format_keeps_every_label_in_order() {
        let probs = vec![1.0 / NUM_CLASSES as f64; NUM_CLASSES];
        let result = result_from(&probs);

        assert_eq!(result.len(), NUM_CLASSES);
        for (i, entry) in result.labels.iter().enumerate() {
            assert_eq!(entry.label.index, i);
        }
        assert!((result.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_length_mismatch() {
        let result = ResultFormatter::format(&[0.5, 0.5], &ClassRegistry::default());
        assert!(matches!(
            result,
            Err(InferenceError::OutputShape {
                expected: 38,
                found: 2
            })
        ));
    }

    #[test]
    fn test_top_k_descending() {
        let mut probs = vec![0.0; NUM_CLASSES];
        probs[5] = 0.6;
        probs[10] = 0.3;
        probs[3] = 0.1;
        let result = result_from(&probs);

        let top = result.top_k(3);
        let indices: Vec<usize> = top.iter().map(|e| e.label.index).collect();
        assert_eq!(indices, vec![5, 10, 3]);
        assert_eq!(result.best().map(|e| e.label.index), Some(5));
    }

    #[test]
    fn test_top_k_ties_use_registry_order() {
        let mut probs = vec![0.0; NUM_CLASSES];
        probs[20] = 0.25;
        probs[2] = 0.25;
        probs[7] = 0.25;
        probs[30] = 0.25;
        let result = result_from(&probs);

        let indices: Vec<usize> = result.top_k(3).iter().map(|e| e.label.index).collect();
        assert_eq!(indices, vec![2, 7, 20]);
    }

    #[test]
    fn test_top_k_larger_than_registry() {
        let probs = vec![1.0 / NUM_CLASSES as f64; NUM_CLASSES];
        assert_eq!(result_from(&probs).top_k(100).len(), NUM_CLASSES);
        assert!(result_from(&probs).top_k(0).is_empty());
    }

    #[test]
    fn test_lookup_and_map() {
        let mut probs = vec![0.0; NUM_CLASSES];
        probs[0] = 1.0;
        let result = result_from(&probs);

        assert_eq!(result.get("Apple___Apple_scab"), Some(1.0));
        assert_eq!(result.get("Not_a_class"), None);

        let map = result.to_map();
        assert_eq!(map.len(), NUM_CLASSES);
        assert_eq!(map["Tomato___healthy"], 0.0);
    }

    #[test]
    fn test_entropy() {
        let uniform = result_from(&vec![1.0 / NUM_CLASSES as f64; NUM_CLASSES]);

        let mut peaked = vec![0.0; NUM_CLASSES];
        peaked[1] = 1.0;
        let confident = result_from(&peaked);

        assert!((uniform.entropy() - (NUM_CLASSES as f64).ln()).abs() < 1e-9);
        assert_eq!(confident.entropy(), 0.0);
    }

    #[test]
    fn test_serialize() {
        let mut probs = vec![0.0; NUM_CLASSES];
        probs[0] = 1.0;
        let json = serde_json::to_value(result_from(&probs)).unwrap();

        assert_eq!(json["latency_secs"], 0.01234);
        assert_eq!(json["labels"][0]["name"], "Apple___Apple_scab");
        assert_eq!(json["labels"][0]["index"], 0);
        assert_eq!(json["labels"][0]["probability"], 1.0);
    }
}
