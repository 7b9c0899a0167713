use crate::error::{ClusterError, Result};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Guards the norm in cosine similarity against zero vectors.
const NORM_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    Manhattan,
    Cosine,
}

impl Metric {
    pub fn distance(&self, a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
        match self {
            Metric::Euclidean => euclidean(a, b),
            Metric::Manhattan => manhattan(a, b),
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

impl FromStr for Metric {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            "manhattan" | "l1" | "cityblock" => Ok(Metric::Manhattan),
            "cosine" => Ok(Metric::Cosine),
            _ => Err(ClusterError::config(format!(
                "invalid metric: {}. Must be 'euclidean', 'manhattan' or 'cosine'",
                s
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
            Metric::Cosine => "cosine",
        };
        write!(f, "{}", name)
    }
}

pub fn squared_euclidean(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
}

pub fn euclidean(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    squared_euclidean(a, b).sqrt()
}

pub fn manhattan(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .sum::<f64>()
}

pub fn cosine_similarity(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    let dot = a.dot(b);
    let norm_a = a.dot(a).sqrt() + NORM_EPS;
    let norm_b = b.dot(b).sqrt() + NORM_EPS;
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_distances() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];

        assert!((euclidean(&a.view(), &b.view()) - 5.0).abs() < 1e-12);
        assert!((squared_euclidean(&a.view(), &b.view()) - 25.0).abs() < 1e-12);
        assert!((manhattan(&a.view(), &b.view()) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = array![1.0, 0.0];
        let b = array![2.0, 0.0];
        let c = array![0.0, 5.0];

        assert!((cosine_similarity(&a.view(), &b.view()) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&a.view(), &c.view()).abs() < 1e-9);
        assert!((Metric::Cosine.distance(&a.view(), &c.view()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let zero = array![0.0, 0.0];
        let a = array![1.0, 1.0];
        assert_eq!(cosine_similarity(&zero.view(), &a.view()), 0.0);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("Euclidean".parse::<Metric>().unwrap(), Metric::Euclidean);
        assert_eq!("cityblock".parse::<Metric>().unwrap(), Metric::Manhattan);
        assert_eq!("cosine".parse::<Metric>().unwrap(), Metric::Cosine);
        assert!("chebyshev".parse::<Metric>().is_err());
    }
}
