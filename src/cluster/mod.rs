//! Clustering algorithms behind one fitting contract.
//!
//! This module provides:
//! - `KMeans`: centroid-based partitioning with seeded k-means++ restarts
//! - `DBSCAN`: density-based clustering that labels unreachable points as noise
//! - `AgglomerativeClustering`: hierarchical linkage (ward, complete, average, single)
//!
//! [`fit`] resolves a method name plus a flat [`ClusterParams`] set into a typed
//! [`ClusterSpec`], runs it, and returns a [`ClusteringResult`] whose centers are
//! always present: native for k-means, member means for the other two.
//!
//! # Examples
//!
//! ```rust
//! use clusterscope::cluster::{fit, ClusterParams};
//! use ndarray::array;
//!
//! let x = array![
//!     [1.0, 1.0],
//!     [1.2, 1.1],
//!     [1.1, 1.2],
//!     [8.0, 8.0],
//!     [8.1, 8.1],
//!     [8.2, 7.9],
//!     [15.0, 1.0]
//! ];
//!
//! let params = ClusterParams {
//!     eps: Some(1.0),
//!     min_samples: Some(2),
//!     ..Default::default()
//! };
//! let result = fit(&x, "dbscan", &params, 42).unwrap();
//!
//! assert_eq!(result.n_clusters, 2);
//! assert_eq!(result.noise_count, 1);
//! assert!(result.centers.get(0).is_some());
//! ```

mod agglomerative;
mod dbscan;
mod kmeans;

pub use agglomerative::{AgglomerativeClustering, Linkage};
pub use dbscan::DBSCAN;
pub use kmeans::{Init, KMeans};

use crate::distance::Metric;
use crate::error::{ClusterError, Result};
use crate::{Labels, Matrix, Vector, NOISE};
use log::{debug, warn};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    Centroid,
    Density,
    Hierarchical,
}

impl FromStr for MethodKind {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "centroid" | "kmeans" | "k-means" => Ok(MethodKind::Centroid),
            "density" | "dbscan" => Ok(MethodKind::Density),
            "hierarchical" | "agglomerative" => Ok(MethodKind::Hierarchical),
            _ => Err(ClusterError::config(format!(
                "unknown clustering method: {}. Must be one of: kmeans, dbscan, agglomerative",
                s
            ))),
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MethodKind::Centroid => "centroid",
            MethodKind::Density => "density",
            MethodKind::Hierarchical => "hierarchical",
        };
        write!(f, "{}", name)
    }
}

/// Caller-facing parameter set; unused fields are ignored by a given method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    pub n_clusters: Option<usize>,
    pub init: Option<String>,
    pub max_iter: Option<usize>,
    pub tol: Option<f64>,
    pub n_init: Option<usize>,
    pub eps: Option<f64>,
    pub min_samples: Option<usize>,
    pub metric: Option<String>,
    pub linkage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub init: Init,
    pub max_iter: usize,
    pub tol: f64,
    pub n_init: usize,
}

impl KMeansParams {
    /// Defaults used by the K scan and the stability bootstrap.
    pub fn with_k(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            init: Init::KMeansPlusPlus,
            max_iter: 500,
            tol: 1e-4,
            n_init: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbscanParams {
    pub eps: f64,
    pub min_samples: usize,
    pub metric: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgglomerativeParams {
    pub n_clusters: usize,
    pub linkage: Linkage,
    pub metric: Metric,
}

/// Fully resolved clustering request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ClusterSpec {
    Centroid(KMeansParams),
    Density(DbscanParams),
    Hierarchical(AgglomerativeParams),
}

impl ClusterSpec {
    pub fn resolve(method: &str, params: &ClusterParams) -> Result<Self> {
        let kind: MethodKind = method.parse()?;

        let metric = match params.metric.as_deref() {
            Some(name) => name.parse()?,
            None => Metric::Euclidean,
        };

        let spec = match kind {
            MethodKind::Centroid => {
                let n_clusters = params
                    .n_clusters
                    .ok_or_else(|| ClusterError::config("kmeans requires n_clusters"))?;
                let defaults = KMeansParams::with_k(n_clusters);
                ClusterSpec::Centroid(KMeansParams {
                    n_clusters,
                    init: match params.init.as_deref() {
                        Some(name) => name.parse()?,
                        None => defaults.init,
                    },
                    max_iter: params.max_iter.unwrap_or(defaults.max_iter),
                    tol: params.tol.unwrap_or(defaults.tol),
                    n_init: params.n_init.unwrap_or(defaults.n_init),
                })
            }
            MethodKind::Density => ClusterSpec::Density(DbscanParams {
                eps: params
                    .eps
                    .ok_or_else(|| ClusterError::config("dbscan requires eps"))?,
                min_samples: params
                    .min_samples
                    .ok_or_else(|| ClusterError::config("dbscan requires min_samples"))?,
                metric,
            }),
            MethodKind::Hierarchical => {
                let linkage = match params.linkage.as_deref() {
                    Some(name) => name.parse()?,
                    None => Linkage::Ward,
                };
                let metric = if linkage == Linkage::Ward && metric != Metric::Euclidean {
                    warn!("ward linkage requires euclidean distances, ignoring metric={}", metric);
                    Metric::Euclidean
                } else {
                    metric
                };
                ClusterSpec::Hierarchical(AgglomerativeParams {
                    n_clusters: params
                        .n_clusters
                        .ok_or_else(|| ClusterError::config("agglomerative requires n_clusters"))?,
                    linkage,
                    metric,
                })
            }
        };

        Ok(spec)
    }

    pub fn kind(&self) -> MethodKind {
        match self {
            ClusterSpec::Centroid(_) => MethodKind::Centroid,
            ClusterSpec::Density(_) => MethodKind::Density,
            ClusterSpec::Hierarchical(_) => MethodKind::Hierarchical,
        }
    }
}

/// Cluster centers, resolved once at the fitter boundary.
///
/// `Dense` rows are indexed by cluster id (k-means). `Sparse` maps arbitrary,
/// possibly non-contiguous, ids to member means and never holds [`NOISE`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Centers {
    Dense(Matrix),
    Sparse(BTreeMap<i64, Vector>),
}

impl Centers {
    pub fn get(&self, cluster_id: i64) -> Option<ArrayView1<'_, f64>> {
        match self {
            Centers::Dense(matrix) => usize::try_from(cluster_id)
                .ok()
                .filter(|&idx| idx < matrix.nrows())
                .map(|idx| matrix.row(idx)),
            Centers::Sparse(map) => map.get(&cluster_id).map(|center| center.view()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Centers::Dense(matrix) => matrix.nrows(),
            Centers::Sparse(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<i64> {
        match self {
            Centers::Dense(matrix) => (0..matrix.nrows() as i64).collect(),
            Centers::Sparse(map) => map.keys().copied().collect(),
        }
    }

    /// Centers stacked row-wise in id order, alongside their ids.
    pub fn to_matrix(&self) -> (Vec<i64>, Matrix) {
        match self {
            Centers::Dense(matrix) => (self.ids(), matrix.clone()),
            Centers::Sparse(map) => {
                let dim = map.values().next().map_or(0, |c| c.len());
                let mut matrix = Matrix::zeros((map.len(), dim));
                for (row, center) in map.values().enumerate() {
                    matrix.row_mut(row).assign(center);
                }
                (self.ids(), matrix)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusteringResult {
    pub labels: Labels,
    pub centers: Centers,
    pub method: MethodKind,
    pub params: ClusterSpec,
    pub runtime: Duration,
    /// Distinct non-noise labels.
    pub n_clusters: usize,
    pub noise_count: usize,
    pub noise_ratio: f64,
    /// Within-cluster sum of squares; only k-means reports it.
    pub inertia: Option<f64>,
}

impl ClusteringResult {
    /// True when the fit collapsed to fewer than two clusters.
    pub fn is_degenerate(&self) -> bool {
        self.n_clusters < 2
    }
}

/// Fits `method` with a flat parameter set. Unknown names are configuration errors.
pub fn fit(
    x: &Matrix,
    method: &str,
    params: &ClusterParams,
    seed: u64,
) -> Result<ClusteringResult> {
    let spec = ClusterSpec::resolve(method, params)?;
    fit_spec(x, &spec, seed)
}

pub fn fit_spec(x: &Matrix, spec: &ClusterSpec, seed: u64) -> Result<ClusteringResult> {
    let started = Instant::now();

    let (labels, centers, inertia) = match spec {
        ClusterSpec::Centroid(p) => {
            let mut kmeans = KMeans::new(p.n_clusters)
                .init(p.init)
                .max_iter(p.max_iter)
                .tolerance(p.tol)
                .n_init(p.n_init)
                .random_state(seed);
            kmeans.fit(x)?;
            let labels = kmeans.labels.ok_or(ClusterError::NotFitted("KMeans"))?;
            let centers = kmeans
                .cluster_centers
                .ok_or(ClusterError::NotFitted("KMeans"))?;
            (labels, Centers::Dense(centers), kmeans.inertia)
        }
        ClusterSpec::Density(p) => {
            let labels = DBSCAN::new(p.eps, p.min_samples)
                .metric(p.metric)
                .fit_predict(x)?;
            let centers = member_means(x, &labels, NOISE);
            (labels, Centers::Sparse(centers), None)
        }
        ClusterSpec::Hierarchical(p) => {
            let labels = AgglomerativeClustering::new(p.n_clusters, p.linkage)
                .metric(p.metric)
                .fit_predict(x)?;
            let centers = member_means(x, &labels, NOISE);
            (labels, Centers::Sparse(centers), None)
        }
    };

    let noise_count = labels.iter().filter(|&&l| l == NOISE).count();
    let noise_ratio = noise_count as f64 / labels.len() as f64;
    let n_clusters = distinct_clusters(&labels, NOISE);

    let result = ClusteringResult {
        labels,
        centers,
        method: spec.kind(),
        params: spec.clone(),
        runtime: started.elapsed(),
        n_clusters,
        noise_count,
        noise_ratio,
        inertia,
    };

    if result.is_degenerate() {
        warn!(
            "{} fit produced {} effective cluster(s), noise_ratio={:.3}",
            result.method, result.n_clusters, result.noise_ratio
        );
    }
    debug!(
        "{} fit: n_samples={} n_clusters={} noise={} in {:?}",
        result.method,
        x.nrows(),
        result.n_clusters,
        result.noise_count,
        result.runtime
    );

    Ok(result)
}

/// Arithmetic mean of member rows per non-noise label. Labels without members are skipped.
pub fn member_means(x: &Matrix, labels: &Labels, noise_label: i64) -> BTreeMap<i64, Vector> {
    let mut sums: BTreeMap<i64, (Vector, usize)> = BTreeMap::new();

    for (row, &label) in x.outer_iter().zip(labels.iter()) {
        if label == noise_label {
            continue;
        }
        let entry = sums
            .entry(label)
            .or_insert_with(|| (Vector::zeros(x.ncols()), 0));
        entry.0 += &row;
        entry.1 += 1;
    }

    let mut centers = BTreeMap::new();
    for (label, (sum, count)) in sums {
        if count == 0 {
            debug!("skipping empty cluster {}", label);
            continue;
        }
        centers.insert(label, sum / count as f64);
    }
    centers
}

pub fn distinct_clusters(labels: &Labels, noise_label: i64) -> usize {
    let mut seen: Vec<i64> = labels.iter().copied().filter(|&l| l != noise_label).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}
