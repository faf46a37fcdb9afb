//! Distance metrics supported by the neighborhood index.
//!
//! Every metric returns a non-negative dissimilarity where smaller means closer.
//! Cosine distance is `1 - cosine_similarity`, with a zero-norm vector treated as
//! having similarity 0 to everything.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Epsilon below which a vector norm is treated as zero.
const EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Manhattan,
    Chebyshev,
}

impl DistanceMetric {
    /// All supported metrics in their canonical order.
    pub const ALL: [DistanceMetric; 4] = [
        DistanceMetric::Cosine,
        DistanceMetric::Euclidean,
        DistanceMetric::Manhattan,
        DistanceMetric::Chebyshev,
    ];

    /// Name used in configuration and as the output map key.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::Manhattan => "manhattan",
            Self::Chebyshev => "chebyshev",
        }
    }

    /// Comma-separated list of supported names, for error messages.
    #[must_use]
    pub fn supported_names() -> String {
        Self::ALL
            .iter()
            .map(|metric| metric.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Distance between two equal-length vectors.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

        match self {
            Self::Cosine => cosine_distance_with_norms(a, b, l2_norm(a), l2_norm(b)),
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            Self::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            Self::Chebyshev => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f64::max),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "manhattan" | "l1" | "cityblock" => Ok(Self::Manhattan),
            "chebyshev" => Ok(Self::Chebyshev),
            _ => Err(PipelineError::UnsupportedMetric {
                name: s.to_string(),
                supported: Self::supported_names(),
            }),
        }
    }
}

/// Euclidean length of a vector.
pub fn l2_norm(vector: &[f64]) -> f64 {
    vector.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Cosine distance using precomputed norms, clamped to `[0, 2]`.
///
/// NaN when either norm overflowed; callers reject non-finite distances.
pub fn cosine_distance_with_norms(a: &[f64], b: &[f64], norm_a: f64, norm_b: f64) -> f64 {
    if !norm_a.is_finite() || !norm_b.is_finite() {
        return f64::NAN;
    }
    if norm_a < EPSILON || norm_b < EPSILON {
        return 1.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance() {
        let metric = DistanceMetric::Cosine;

        // Identical direction
        assert!(metric.distance(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).abs() < 1e-12);

        // Orthogonal
        assert!((metric.distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);

        // Opposite
        assert!((metric.distance(&[1.0, 2.0], &[-1.0, -2.0]) - 2.0).abs() < 1e-12);

        // Zero vector
        assert_eq!(metric.distance(&[1.0, 2.0], &[0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_overflowing_vectors_give_non_finite_distances() {
        let big = [1e200, 1e200];
        let small = [0.0, 1.0];
        assert!(DistanceMetric::Cosine.distance(&big, &small).is_nan());
        assert!(DistanceMetric::Cosine.distance(&big, &[-1e200, 0.0]).is_nan());
        assert!(DistanceMetric::Euclidean.distance(&big, &[-1e200, 0.0]).is_infinite());
        assert!(DistanceMetric::Manhattan.distance(&[f64::MAX], &[-f64::MAX]).is_infinite());
    }

    #[test]
    fn test_minkowski_family() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_eq!(DistanceMetric::Euclidean.distance(&a, &b), 5.0);
        assert_eq!(DistanceMetric::Manhattan.distance(&a, &b), 7.0);
        assert_eq!(DistanceMetric::Chebyshev.distance(&a, &b), 4.0);
    }

    #[test]
    fn test_euclidean_is_symmetric() {
        let a = [0.3, -1.7, 2.25, 9.0];
        let b = [-4.1, 0.05, 2.0, -3.5];
        let metric = DistanceMetric::Euclidean;
        assert_eq!(metric.distance(&a, &b), metric.distance(&b, &a));
    }

    #[test]
    fn test_parse_metric_names() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!(
            " Euclidean ".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Euclidean
        );
        assert_eq!("l1".parse::<DistanceMetric>().unwrap(), DistanceMetric::Manhattan);

        let err = "hamming".parse::<DistanceMetric>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedMetric { .. }));
        assert!(err.to_string().contains("cosine, euclidean"));
    }
}
