use crate::cluster::{fit_spec, ClusterSpec, KMeansParams};
use crate::error::{ClusterError, Result};
use crate::progress::{Progress, Silent};
use crate::validation::evaluate;
use crate::{Matrix, NOISE};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

pub const SILHOUETTE_SENTINEL: f64 = -1.0;
pub const CALINSKI_HARABASZ_SENTINEL: f64 = -1.0;
pub const DAVIES_BOULDIN_SENTINEL: f64 = f64::INFINITY;

/// Per-K metrics from a centroid sweep. All four maps share the scanned key set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KScanResult {
    pub k_to_inertia: BTreeMap<usize, f64>,
    pub k_to_silhouette: BTreeMap<usize, f64>,
    pub k_to_calinski_harabasz: BTreeMap<usize, f64>,
    pub k_to_davies_bouldin: BTreeMap<usize, f64>,
    /// K values whose fit collapsed to one effective cluster and carry sentinels.
    pub degenerate: Vec<usize>,
}

impl KScanResult {
    pub fn ks(&self) -> Vec<usize> {
        self.k_to_inertia.keys().copied().collect()
    }
}

#[derive(Clone, Debug)]
pub struct KScanner {
    k_min: usize,
    k_max: usize,
    random_state: u64,
    sample_size: Option<usize>,
    kmeans: KMeansParams,
}

impl KScanner {
    pub fn new(k_min: usize, k_max: usize) -> Self {
        Self {
            k_min,
            k_max,
            random_state: 42,
            sample_size: Some(2000),
            kmeans: KMeansParams::with_k(k_min),
        }
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    /// Caps the rows scored per K; `None` scores every row.
    pub fn sample_size(mut self, sample_size: Option<usize>) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Fit settings applied at every K; `n_clusters` is overwritten per step.
    pub fn kmeans(mut self, kmeans: KMeansParams) -> Self {
        self.kmeans = kmeans;
        self
    }

    fn validate(&self, n_samples: usize) -> Result<()> {
        if self.k_min < 2 {
            return Err(ClusterError::config(format!(
                "k_min must be >= 2, got {}",
                self.k_min
            )));
        }
        if self.k_min > self.k_max {
            return Err(ClusterError::config(format!(
                "k_min={} must not exceed k_max={}",
                self.k_min, self.k_max
            )));
        }
        if self.k_max >= n_samples {
            return Err(ClusterError::insufficient(format!(
                "k_max={} must be below the sample count {}",
                self.k_max, n_samples
            )));
        }
        Ok(())
    }

    pub fn scan(&self, x: &Matrix, progress: &dyn Progress) -> Result<KScanResult> {
        self.validate(x.nrows())?;
        info!(
            "scanning k={}..={} over {} samples",
            self.k_min,
            self.k_max,
            x.nrows()
        );

        let total = self.k_max - self.k_min + 1;
        let mut result = KScanResult {
            k_to_inertia: BTreeMap::new(),
            k_to_silhouette: BTreeMap::new(),
            k_to_calinski_harabasz: BTreeMap::new(),
            k_to_davies_bouldin: BTreeMap::new(),
            degenerate: Vec::new(),
        };

        for (step, k) in (self.k_min..=self.k_max).enumerate() {
            let spec = ClusterSpec::Centroid(KMeansParams {
                n_clusters: k,
                ..self.kmeans.clone()
            });
            let fitted = fit_spec(x, &spec, self.random_state)?;
            let inertia = fitted.inertia.ok_or(ClusterError::NotFitted("KMeans"))?;
            result.k_to_inertia.insert(k, inertia);

            let (silhouette, ch, db) = if fitted.is_degenerate() {
                warn!("k={} collapsed to {} cluster(s)", k, fitted.n_clusters);
                result.degenerate.push(k);
                (
                    SILHOUETTE_SENTINEL,
                    CALINSKI_HARABASZ_SENTINEL,
                    DAVIES_BOULDIN_SENTINEL,
                )
            } else {
                let report = evaluate(
                    x,
                    &fitted.labels,
                    NOISE,
                    self.sample_size,
                    self.random_state,
                )?;
                (
                    report.silhouette.unwrap_or(SILHOUETTE_SENTINEL),
                    report.calinski_harabasz.unwrap_or(CALINSKI_HARABASZ_SENTINEL),
                    report.davies_bouldin.unwrap_or(DAVIES_BOULDIN_SENTINEL),
                )
            };

            debug!(
                "k={} inertia={:.4} silhouette={:.4} ch={:.4} db={:.4}",
                k, inertia, silhouette, ch, db
            );
            result.k_to_silhouette.insert(k, silhouette);
            result.k_to_calinski_harabasz.insert(k, ch);
            result.k_to_davies_bouldin.insert(k, db);

            progress.report(step + 1, total, &format!("k={} scanned", k));
        }

        Ok(result)
    }
}

/// Sweeps k-means over `k_min..=k_max` with default fit and sampling settings.
pub fn scan(x: &Matrix, k_min: usize, k_max: usize, seed: u64) -> Result<KScanResult> {
    KScanner::new(k_min, k_max).random_state(seed).scan(x, &Silent)
}
