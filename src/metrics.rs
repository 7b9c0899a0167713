//! Internal clustering-quality scores and label agreement.
//!
//! The three validity scores expect labels without noise and return
//! [`MetricUnavailable`] instead of a placeholder when the score is undefined.

use crate::distance::{euclidean, squared_euclidean};
use crate::error::{ClusterError, MetricUnavailable, Result};
use crate::{Labels, Matrix, Vector};
use std::collections::{BTreeMap, BTreeSet};

pub const SILHOUETTE: &str = "silhouette";
pub const CALINSKI_HARABASZ: &str = "calinski_harabasz";
pub const DAVIES_BOULDIN: &str = "davies_bouldin";

/// Maps arbitrary label values to `0..n_clusters` in ascending label order.
fn encode(labels: &Labels) -> (Vec<usize>, usize) {
    let distinct: BTreeSet<i64> = labels.iter().copied().collect();
    let ids: BTreeMap<i64, usize> = distinct
        .into_iter()
        .enumerate()
        .map(|(dense, label)| (label, dense))
        .collect();
    let encoded = labels.iter().map(|label| ids[label]).collect();
    (encoded, ids.len())
}

fn centroids(x: &Matrix, encoded: &[usize], n_clusters: usize) -> (Matrix, Vec<usize>) {
    let mut sums = Matrix::zeros((n_clusters, x.ncols()));
    let mut counts = vec![0usize; n_clusters];

    for (row, &c) in x.outer_iter().zip(encoded.iter()) {
        let mut sum = sums.row_mut(c);
        sum += &row;
        counts[c] += 1;
    }
    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            let mut sum = sums.row_mut(c);
            sum /= count as f64;
        }
    }

    (sums, counts)
}

fn length_guard(
    metric: &'static str,
    x: &Matrix,
    labels: &Labels,
) -> std::result::Result<(), MetricUnavailable> {
    if x.nrows() != labels.len() {
        return Err(MetricUnavailable::new(
            metric,
            format!("{} labels for {} rows", labels.len(), x.nrows()),
        ));
    }
    Ok(())
}

fn check_shape(x: &Matrix, labels: &Labels) -> Result<()> {
    if x.nrows() != labels.len() {
        return Err(ClusterError::ShapeMismatch {
            expected: x.nrows(),
            got: labels.len(),
        });
    }
    Ok(())
}

/// Mean silhouette coefficient with Euclidean distances.
///
/// Points in singleton clusters score 0. O(n²) distance evaluations.
pub fn silhouette_score(
    x: &Matrix,
    labels: &Labels,
) -> std::result::Result<f64, MetricUnavailable> {
    let n_samples = x.nrows();
    length_guard(SILHOUETTE, x, labels)?;
    let (encoded, n_clusters) = encode(labels);

    if n_clusters < 2 || n_clusters >= n_samples {
        return Err(MetricUnavailable::new(
            SILHOUETTE,
            format!(
                "number of clusters is {}, valid values are 2 to n_samples - 1 ({})",
                n_clusters,
                n_samples.saturating_sub(1)
            ),
        ));
    }

    let mut counts = vec![0usize; n_clusters];
    for &c in &encoded {
        counts[c] += 1;
    }

    // Row i, column c: summed distance from point i to all points of cluster c.
    let mut sums = Matrix::zeros((n_samples, n_clusters));
    for i in 0..n_samples {
        for j in (i + 1)..n_samples {
            let d = euclidean(&x.row(i), &x.row(j));
            sums[[i, encoded[j]]] += d;
            sums[[j, encoded[i]]] += d;
        }
    }

    let mut total = 0.0;
    for i in 0..n_samples {
        let own = encoded[i];
        if counts[own] < 2 {
            continue;
        }
        let a = sums[[i, own]] / (counts[own] - 1) as f64;
        let b = (0..n_clusters)
            .filter(|&c| c != own && counts[c] > 0)
            .map(|c| sums[[i, c]] / counts[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    let score = total / n_samples as f64;
    if !score.is_finite() {
        return Err(MetricUnavailable::new(SILHOUETTE, "score is not finite"));
    }
    Ok(score)
}

/// Variance ratio criterion: between-cluster over within-cluster dispersion.
pub fn calinski_harabasz_score(
    x: &Matrix,
    labels: &Labels,
) -> std::result::Result<f64, MetricUnavailable> {
    let n_samples = x.nrows();
    length_guard(CALINSKI_HARABASZ, x, labels)?;
    let (encoded, n_clusters) = encode(labels);

    if n_clusters < 2 || n_samples <= n_clusters {
        return Err(MetricUnavailable::new(
            CALINSKI_HARABASZ,
            format!(
                "needs 2 <= n_clusters < n_samples, got {} clusters for {} samples",
                n_clusters, n_samples
            ),
        ));
    }

    let overall: Vector = x
        .mean_axis(ndarray::Axis(0))
        .ok_or_else(|| MetricUnavailable::new(CALINSKI_HARABASZ, "empty input"))?;
    let (means, counts) = centroids(x, &encoded, n_clusters);

    let mut extra = 0.0;
    for (c, mean) in means.outer_iter().enumerate() {
        extra += counts[c] as f64 * squared_euclidean(&mean, &overall.view());
    }

    let mut intra = 0.0;
    for (row, &c) in x.outer_iter().zip(encoded.iter()) {
        intra += squared_euclidean(&row, &means.row(c));
    }

    if intra <= 0.0 {
        return Err(MetricUnavailable::new(
            CALINSKI_HARABASZ,
            "within-cluster dispersion is zero",
        ));
    }

    let score = extra * (n_samples - n_clusters) as f64 / (intra * (n_clusters - 1) as f64);
    if !score.is_finite() {
        return Err(MetricUnavailable::new(CALINSKI_HARABASZ, "score is not finite"));
    }
    Ok(score)
}

/// Average over clusters of the worst (largest) similarity to any other cluster.
pub fn davies_bouldin_score(
    x: &Matrix,
    labels: &Labels,
) -> std::result::Result<f64, MetricUnavailable> {
    length_guard(DAVIES_BOULDIN, x, labels)?;
    let (encoded, n_clusters) = encode(labels);

    if n_clusters < 2 {
        return Err(MetricUnavailable::new(
            DAVIES_BOULDIN,
            format!("needs at least 2 clusters, got {}", n_clusters),
        ));
    }

    let (means, counts) = centroids(x, &encoded, n_clusters);

    let mut scatter = vec![0.0; n_clusters];
    for (row, &c) in x.outer_iter().zip(encoded.iter()) {
        scatter[c] += euclidean(&row, &means.row(c));
    }
    for (c, s) in scatter.iter_mut().enumerate() {
        *s /= counts[c] as f64;
    }

    let mut separation = Matrix::zeros((n_clusters, n_clusters));
    for i in 0..n_clusters {
        for j in (i + 1)..n_clusters {
            let d = euclidean(&means.row(i), &means.row(j));
            separation[[i, j]] = d;
            separation[[j, i]] = d;
        }
    }

    if separation.iter().all(|&d| d <= 0.0) {
        return Err(MetricUnavailable::new(DAVIES_BOULDIN, "all cluster centroids coincide"));
    }
    if scatter.iter().all(|&s| s <= 0.0) {
        return Ok(0.0);
    }

    let mut total = 0.0;
    for i in 0..n_clusters {
        let worst = (0..n_clusters)
            .filter(|&j| j != i && separation[[i, j]] > 0.0)
            .map(|j| (scatter[i] + scatter[j]) / separation[[i, j]])
            .fold(0.0, f64::max);
        total += worst;
    }

    let score = total / n_clusters as f64;
    if !score.is_finite() {
        return Err(MetricUnavailable::new(DAVIES_BOULDIN, "score is not finite"));
    }
    Ok(score)
}

fn comb2(n: usize) -> f64 {
    let n = n as f64;
    n * (n - 1.0) / 2.0
}

/// Chance-corrected agreement of two labelings of the same points.
///
/// Invariant to permutations of label values. Identical trivial partitions
/// (all one cluster, or all singletons) score 1.0.
pub fn adjusted_rand_score(a: &Labels, b: &Labels) -> Result<f64> {
    if a.len() != b.len() {
        return Err(ClusterError::ShapeMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let n_samples = a.len();
    if n_samples < 2 {
        return Ok(1.0);
    }

    let mut contingency: BTreeMap<(i64, i64), usize> = BTreeMap::new();
    let mut rows: BTreeMap<i64, usize> = BTreeMap::new();
    let mut cols: BTreeMap<i64, usize> = BTreeMap::new();

    for (&la, &lb) in a.iter().zip(b.iter()) {
        *contingency.entry((la, lb)).or_insert(0) += 1;
        *rows.entry(la).or_insert(0) += 1;
        *cols.entry(lb).or_insert(0) += 1;
    }

    let index: f64 = contingency.values().map(|&n| comb2(n)).sum();
    let sum_rows: f64 = rows.values().map(|&n| comb2(n)).sum();
    let sum_cols: f64 = cols.values().map(|&n| comb2(n)).sum();

    let expected = sum_rows * sum_cols / comb2(n_samples);
    let max_index = (sum_rows + sum_cols) / 2.0;

    if (max_index - expected).abs() < 1e-12 {
        return Ok(1.0);
    }

    Ok((index - expected) / (max_index - expected))
}

/// Shape-checked wrapper used by the evaluation pipeline.
pub(crate) fn all_scores(
    x: &Matrix,
    labels: &Labels,
) -> Result<[std::result::Result<f64, MetricUnavailable>; 3]> {
    check_shape(x, labels)?;
    Ok([
        silhouette_score(x, labels),
        calinski_harabasz_score(x, labels),
        davies_bouldin_score(x, labels),
    ])
}
