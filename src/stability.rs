//! Bootstrap stability of a centroid partition.
//!
//! Each run resamples N rows with replacement, refits k-means at the same K and
//! rebuilds a full-length labeling: drawn rows take their resample label, rows
//! never drawn go to the center with the highest cosine similarity. Agreement
//! between runs is the pairwise adjusted Rand index, which ignores label ids.

use crate::cluster::{fit_spec, Centers, ClusterSpec, KMeansParams};
use crate::distance::cosine_similarity;
use crate::error::{ClusterError, Result};
use crate::metrics::adjusted_rand_score;
use crate::progress::{Progress, Silent};
use crate::{Labels, Matrix, NOISE};
use log::{debug, info, warn};
use ndarray::Axis;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityReport {
    pub runs: usize,
    /// Runs excluded because the resample produced fewer than K clusters.
    pub degenerate_runs: usize,
    pub comparisons: usize,
    pub ari_mean: Option<f64>,
    pub ari_min: Option<f64>,
    pub ari_max: Option<f64>,
}

impl StabilityReport {
    /// False when fewer than two usable runs were available to compare.
    pub fn is_sufficient(&self) -> bool {
        self.comparisons > 0
    }
}

pub fn estimate(x: &Matrix, k: usize, runs: usize, seed: u64) -> Result<StabilityReport> {
    estimate_with(x, k, runs, seed, &Silent)
}

pub fn estimate_with(
    x: &Matrix,
    k: usize,
    runs: usize,
    seed: u64,
    progress: &dyn Progress,
) -> Result<StabilityReport> {
    let n_samples = x.nrows();
    if k < 2 {
        return Err(ClusterError::config(format!("k must be >= 2, got {}", k)));
    }
    if k >= n_samples {
        return Err(ClusterError::insufficient(format!(
            "k={} must be below the sample count {}",
            k, n_samples
        )));
    }

    info!("bootstrap stability: k={} runs={} n_samples={}", k, runs, n_samples);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let draw = Uniform::new(0, n_samples);
    let spec = ClusterSpec::Centroid(KMeansParams::with_k(k));
    let mut label_runs: Vec<Labels> = Vec::with_capacity(runs);
    let mut degenerate_runs = 0;

    for run in 0..runs {
        let idx = ndarray::Array1::random_using(n_samples, &draw, &mut rng).to_vec();
        let resample = x.select(Axis(0), &idx);
        let fitted = fit_spec(&resample, &spec, seed.wrapping_add(run as u64))?;

        if fitted.n_clusters < k {
            warn!(
                "bootstrap run {} produced {} of {} clusters, excluded",
                run, fitted.n_clusters, k
            );
            degenerate_runs += 1;
        } else {
            label_runs.push(reconcile(x, &idx, &fitted.labels, &fitted.centers));
        }

        progress.report(run + 1, runs, &format!("bootstrap run {}/{}", run + 1, runs));
    }

    let mut aris = Vec::new();
    for i in 0..label_runs.len() {
        for j in i + 1..label_runs.len() {
            aris.push(adjusted_rand_score(&label_runs[i], &label_runs[j])?);
        }
    }

    let report = if aris.is_empty() {
        warn!(
            "only {} usable bootstrap run(s), stability is undefined",
            label_runs.len()
        );
        StabilityReport {
            runs,
            degenerate_runs,
            comparisons: 0,
            ari_mean: None,
            ari_min: None,
            ari_max: None,
        }
    } else {
        let mean = aris.iter().sum::<f64>() / aris.len() as f64;
        let min = aris.iter().copied().fold(f64::INFINITY, f64::min);
        let max = aris.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        debug!("pairwise ari: {:?}", aris);
        StabilityReport {
            runs,
            degenerate_runs,
            comparisons: aris.len(),
            // Summation error can nudge the mean just outside [min, max].
            ari_mean: Some(mean.clamp(min, max)),
            ari_min: Some(min),
            ari_max: Some(max),
        }
    };

    Ok(report)
}

/// Full-length labels for one bootstrap run.
fn reconcile(x: &Matrix, idx: &[usize], resample_labels: &Labels, centers: &Centers) -> Labels {
    let mut labels = Labels::from_elem(x.nrows(), NOISE);
    for (&row, &label) in idx.iter().zip(resample_labels.iter()) {
        labels[row] = label;
    }

    let (ids, center_rows) = centers.to_matrix();
    let mut filled = 0;
    for (row, label) in labels.iter_mut().enumerate() {
        if *label != NOISE {
            continue;
        }
        let point = x.row(row);
        let mut best = (f64::NEG_INFINITY, NOISE);
        for (&id, center) in ids.iter().zip(center_rows.outer_iter()) {
            let similarity = cosine_similarity(&point, &center);
            if similarity > best.0 {
                best = (similarity, id);
            }
        }
        *label = best.1;
        filled += 1;
    }
    debug!("reassigned {} undrawn rows by cosine similarity", filled);

    labels
}
