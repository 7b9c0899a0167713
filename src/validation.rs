use crate::cluster::distinct_clusters;
use crate::error::{ClusterError, MetricUnavailable, Result};
use crate::metrics::{self, CALINSKI_HARABASZ, DAVIES_BOULDIN, SILHOUETTE};
use crate::{Labels, Matrix};
use log::{debug, warn};
use ndarray::Axis;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// A score, or the reason it could not be computed.
pub type MetricValue = std::result::Result<f64, MetricUnavailable>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub silhouette: MetricValue,
    pub calinski_harabasz: MetricValue,
    pub davies_bouldin: MetricValue,
    /// Rows actually scored, after noise filtering and subsampling.
    pub n_samples: usize,
    pub n_clusters: usize,
    pub note: Option<String>,
}

impl EvaluationReport {
    pub fn is_complete(&self) -> bool {
        self.silhouette.is_ok() && self.calinski_harabasz.is_ok() && self.davies_bouldin.is_ok()
    }
}

/// Scores a labeling of `x`.
///
/// Rows labeled `noise_label` are dropped first. When `sample_size` is smaller
/// than the remaining rows, a seeded uniform subset is scored instead; the
/// labeling itself is untouched. Fewer than two remaining rows is an error,
/// fewer than two clusters yields a report with every metric unavailable.
pub fn evaluate(
    x: &Matrix,
    labels: &Labels,
    noise_label: i64,
    sample_size: Option<usize>,
    seed: u64,
) -> Result<EvaluationReport> {
    if x.nrows() != labels.len() {
        return Err(ClusterError::ShapeMismatch {
            expected: x.nrows(),
            got: labels.len(),
        });
    }

    let mut keep: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| **l != noise_label)
        .map(|(i, _)| i)
        .collect();

    if keep.len() < 2 {
        return Err(ClusterError::insufficient(format!(
            "too few samples after filtering noise: {}",
            keep.len()
        )));
    }

    if let Some(size) = sample_size {
        if size < 2 {
            return Err(ClusterError::config(format!(
                "sample_size must be >= 2, got {}",
                size
            )));
        }
        if keep.len() > size {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut picked = rand::seq::index::sample(&mut rng, keep.len(), size).into_vec();
            picked.sort_unstable();
            debug!("subsampling {} of {} rows for validation", size, keep.len());
            keep = picked.into_iter().map(|i| keep[i]).collect();
        }
    }

    let sub_x = x.select(Axis(0), &keep);
    let sub_labels = labels.select(Axis(0), &keep);
    let n_samples = keep.len();
    let n_clusters = distinct_clusters(&sub_labels, noise_label);

    if n_clusters < 2 {
        let note = format!(
            "{} cluster(s) across {} samples, validity scores are undefined",
            n_clusters, n_samples
        );
        warn!("{}", note);
        let reason = "need at least two clusters";
        return Ok(EvaluationReport {
            silhouette: Err(MetricUnavailable::new(SILHOUETTE, reason)),
            calinski_harabasz: Err(MetricUnavailable::new(CALINSKI_HARABASZ, reason)),
            davies_bouldin: Err(MetricUnavailable::new(DAVIES_BOULDIN, reason)),
            n_samples,
            n_clusters,
            note: Some(note),
        });
    }

    let [silhouette, calinski_harabasz, davies_bouldin] = metrics::all_scores(&sub_x, &sub_labels)?;

    for failure in [&silhouette, &calinski_harabasz, &davies_bouldin]
        .into_iter()
        .filter_map(|m| m.as_ref().err())
    {
        warn!("{}", failure);
    }

    Ok(EvaluationReport {
        silhouette,
        calinski_harabasz,
        davies_bouldin,
        n_samples,
        n_clusters,
        note: None,
    })
}
