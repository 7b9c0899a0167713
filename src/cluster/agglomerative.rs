use crate::distance::{squared_euclidean, Metric};
use crate::error::{ClusterError, Result};
use crate::{Labels, Matrix};
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Minimum increase of within-cluster variance; Euclidean only.
    #[default]
    Ward,
    Complete,
    Average,
    Single,
}

impl FromStr for Linkage {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ward" => Ok(Linkage::Ward),
            "complete" | "maximum" => Ok(Linkage::Complete),
            "average" => Ok(Linkage::Average),
            "single" => Ok(Linkage::Single),
            _ => Err(ClusterError::config(format!(
                "invalid linkage: {}. Must be one of: ward, complete, average, single",
                s
            ))),
        }
    }
}

/// Bottom-up hierarchical clustering cut at `n_clusters`.
///
/// Merges use Lance-Williams updates on a dense distance matrix, so memory is
/// O(n²) and time O(n³). Labels are numbered by the smallest row index in each
/// cluster, which makes them stable across runs.
#[derive(Clone, Debug)]
pub struct AgglomerativeClustering {
    pub labels: Option<Labels>,
    n_clusters: usize,
    linkage: Linkage,
    metric: Metric,
}

impl AgglomerativeClustering {
    pub fn new(n_clusters: usize, linkage: Linkage) -> Self {
        Self {
            labels: None,
            n_clusters,
            linkage,
            metric: Metric::Euclidean,
        }
    }

    /// Ignored for ward linkage, which is only defined for Euclidean distances.
    pub fn metric(mut self, metric: Metric) -> Self {
        if self.linkage == Linkage::Ward && metric != Metric::Euclidean {
            warn!("ward linkage requires euclidean distances, ignoring metric={}", metric);
        } else {
            self.metric = metric;
        }
        self
    }

    pub fn effective_metric(&self) -> Metric {
        match self.linkage {
            Linkage::Ward => Metric::Euclidean,
            _ => self.metric,
        }
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 || x.ncols() == 0 {
            return Err(ClusterError::insufficient(
                "input matrix must have at least one sample and one feature",
            ));
        }
        if self.n_clusters == 0 {
            return Err(ClusterError::config("n_clusters must be > 0"));
        }
        if n_samples < self.n_clusters {
            return Err(ClusterError::insufficient(format!(
                "n_samples={} should be >= n_clusters={}",
                n_samples, self.n_clusters
            )));
        }

        let mut distances = self.pairwise(x);
        let mut sizes = vec![1usize; n_samples];
        let mut active = vec![true; n_samples];
        // Union-find style parent pointers; every merged row points at its survivor.
        let mut parent: Vec<usize> = (0..n_samples).collect();

        for _ in 0..(n_samples - self.n_clusters) {
            let (a, b) = closest_pair(&distances, &active);

            for k in 0..n_samples {
                if !active[k] || k == a || k == b {
                    continue;
                }
                let updated = self.lance_williams(
                    distances[[k, a]],
                    distances[[k, b]],
                    distances[[a, b]],
                    sizes[a],
                    sizes[b],
                    sizes[k],
                );
                distances[[k, a]] = updated;
                distances[[a, k]] = updated;
            }

            sizes[a] += sizes[b];
            active[b] = false;
            parent[b] = a;
        }

        let mut labels = Labels::zeros(n_samples);
        let mut root_label: Vec<Option<i64>> = vec![None; n_samples];
        let mut next_label = 0;

        for i in 0..n_samples {
            let root = find_root(&parent, i);
            let label = *root_label[root].get_or_insert_with(|| {
                next_label += 1;
                next_label - 1
            });
            labels[i] = label;
        }

        self.labels = Some(labels);
        Ok(())
    }

    pub fn fit_predict(&mut self, x: &Matrix) -> Result<Labels> {
        self.fit(x)?;
        self.labels
            .clone()
            .ok_or(ClusterError::NotFitted("AgglomerativeClustering"))
    }

    fn pairwise(&self, x: &Matrix) -> Matrix {
        let n_samples = x.nrows();
        let metric = self.effective_metric();
        let mut distances = Matrix::zeros((n_samples, n_samples));

        for i in 0..n_samples {
            for j in (i + 1)..n_samples {
                // Ward's update formula works on squared Euclidean distances.
                let d = match self.linkage {
                    Linkage::Ward => squared_euclidean(&x.row(i), &x.row(j)),
                    _ => metric.distance(&x.row(i), &x.row(j)),
                };
                distances[[i, j]] = d;
                distances[[j, i]] = d;
            }
        }

        distances
    }

    fn lance_williams(
        &self,
        d_ka: f64,
        d_kb: f64,
        d_ab: f64,
        n_a: usize,
        n_b: usize,
        n_k: usize,
    ) -> f64 {
        let (n_a, n_b, n_k) = (n_a as f64, n_b as f64, n_k as f64);
        match self.linkage {
            Linkage::Single => d_ka.min(d_kb),
            Linkage::Complete => d_ka.max(d_kb),
            Linkage::Average => (n_a * d_ka + n_b * d_kb) / (n_a + n_b),
            Linkage::Ward => {
                ((n_a + n_k) * d_ka + (n_b + n_k) * d_kb - n_k * d_ab) / (n_a + n_b + n_k)
            }
        }
    }
}

/// Lowest-distance active pair `(a, b)` with `a < b`; ties resolve to the first in row order.
fn closest_pair(distances: &Matrix, active: &[bool]) -> (usize, usize) {
    let n = active.len();
    let mut best = (0, 0);
    let mut best_distance = f64::INFINITY;

    for i in 0..n {
        if !active[i] {
            continue;
        }
        for j in (i + 1)..n {
            if active[j] && distances[[i, j]] < best_distance {
                best_distance = distances[[i, j]];
                best = (i, j);
            }
        }
    }

    best
}

fn find_root(parent: &[usize], mut i: usize) -> usize {
    while parent[i] != i {
        i = parent[i];
    }
    i
}
