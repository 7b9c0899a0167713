use crate::distance::{euclidean, squared_euclidean};
use crate::error::{ClusterError, Result};
use crate::{Labels, Matrix};
use log::debug;
use ndarray::ArrayView1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Init {
    #[default]
    #[serde(rename = "k-means++")]
    KMeansPlusPlus,
    #[serde(rename = "random")]
    Random,
}

impl FromStr for Init {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "k-means++" | "kmeans++" => Ok(Init::KMeansPlusPlus),
            "random" => Ok(Init::Random),
            _ => Err(ClusterError::config(format!(
                "invalid init method: {}. Must be 'k-means++' or 'random'",
                s
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct KMeans {
    pub cluster_centers: Option<Matrix>,
    pub labels: Option<Labels>,
    pub inertia: Option<f64>,
    pub n_iter: Option<usize>,
    n_clusters: usize,
    max_iter: usize,
    tolerance: f64,
    n_init: usize,
    random_state: u64,
    init: Init,
}

/// One Lloyd run from a single initialization.
struct Run {
    centroids: Matrix,
    labels: Labels,
    inertia: f64,
    n_iter: usize,
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            cluster_centers: None,
            labels: None,
            inertia: None,
            n_iter: None,
            n_clusters,
            max_iter: 300,
            tolerance: 1e-4,
            n_init: 1,
            random_state: 42,
            init: Init::KMeansPlusPlus,
        }
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Number of independent initializations; the run with the lowest inertia wins.
    pub fn n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ClusterError::insufficient(
                "input matrix must have at least one sample and one feature",
            ));
        }
        if self.n_clusters == 0 {
            return Err(ClusterError::config("n_clusters must be > 0"));
        }
        if x.nrows() < self.n_clusters {
            return Err(ClusterError::insufficient(format!(
                "n_samples={} should be >= n_clusters={}",
                x.nrows(),
                self.n_clusters
            )));
        }
        if self.max_iter == 0 || self.n_init == 0 {
            return Err(ClusterError::config("max_iter and n_init must be > 0"));
        }
        if !(self.tolerance >= 0.0) {
            return Err(ClusterError::config(format!(
                "tolerance must be >= 0, got {}",
                self.tolerance
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut best: Option<Run> = None;

        for restart in 0..self.n_init {
            let run = self.lloyd(x, &mut rng);
            debug!(
                "kmeans k={} restart={} inertia={:.4} n_iter={}",
                self.n_clusters, restart, run.inertia, run.n_iter
            );
            // Strict comparison keeps the earliest run on ties.
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        let Some(best) = best else {
            return Err(ClusterError::config("n_init must be > 0"));
        };

        self.cluster_centers = Some(best.centroids);
        self.labels = Some(best.labels);
        self.inertia = Some(best.inertia);
        self.n_iter = Some(best.n_iter);

        Ok(())
    }

    pub fn predict(&self, x: &Matrix) -> Result<Labels> {
        let centroids = self.fitted_centers(x)?;
        let mut labels = Labels::zeros(x.nrows());
        assign(x, centroids, &mut labels);
        Ok(labels)
    }

    pub fn fit_predict(&mut self, x: &Matrix) -> Result<Labels> {
        self.fit(x)?;
        self.labels.clone().ok_or(ClusterError::NotFitted("KMeans"))
    }

    /// Euclidean distance from every row to every center.
    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let centroids = self.fitted_centers(x)?;
        let mut distances = Matrix::zeros((x.nrows(), centroids.nrows()));

        for (i, row) in x.outer_iter().enumerate() {
            for (k, center) in centroids.outer_iter().enumerate() {
                distances[[i, k]] = euclidean(&row, &center);
            }
        }

        Ok(distances)
    }

    fn fitted_centers(&self, x: &Matrix) -> Result<&Matrix> {
        let centroids = self
            .cluster_centers
            .as_ref()
            .ok_or(ClusterError::NotFitted("KMeans"))?;

        if x.ncols() != centroids.ncols() {
            return Err(ClusterError::DimensionMismatch {
                expected: centroids.ncols(),
                got: x.ncols(),
            });
        }
        Ok(centroids)
    }

    fn lloyd(&self, x: &Matrix, rng: &mut ChaCha8Rng) -> Run {
        let mut centroids = self.initialize_centroids(x, rng);
        let mut labels = Labels::zeros(x.nrows());
        let mut n_iter = 0;

        for iteration in 0..self.max_iter {
            n_iter = iteration + 1;
            let old_centroids = centroids.clone();

            assign(x, &centroids, &mut labels);
            update_centroids(x, &labels, &mut centroids);

            if max_centroid_shift(&old_centroids, &centroids) <= self.tolerance {
                break;
            }
        }

        // Final assignment so labels and inertia agree with the returned centers.
        let inertia = assign(x, &centroids, &mut labels);

        Run {
            centroids,
            labels,
            inertia,
            n_iter,
        }
    }

    fn initialize_centroids(&self, x: &Matrix, rng: &mut ChaCha8Rng) -> Matrix {
        let n_samples = x.nrows();
        let mut centroids = Matrix::zeros((self.n_clusters, x.ncols()));

        match self.init {
            Init::Random => {
                let picked = rand::seq::index::sample(rng, n_samples, self.n_clusters);
                for (k, idx) in picked.iter().enumerate() {
                    centroids.row_mut(k).assign(&x.row(idx));
                }
            }
            Init::KMeansPlusPlus => {
                let first_idx = rng.gen_range(0..n_samples);
                centroids.row_mut(0).assign(&x.row(first_idx));

                // Squared distance from each point to its nearest chosen center
                let mut closest: Vec<f64> = x
                    .outer_iter()
                    .map(|row| squared_euclidean(&row, &x.row(first_idx)))
                    .collect();

                for k in 1..self.n_clusters {
                    let total: f64 = closest.iter().sum();
                    let next_idx = if total > 0.0 {
                        sample_weighted(&closest, total, rng)
                    } else {
                        // Every point coincides with a center already.
                        rng.gen_range(0..n_samples)
                    };

                    centroids.row_mut(k).assign(&x.row(next_idx));
                    for (i, row) in x.outer_iter().enumerate() {
                        let dist = squared_euclidean(&row, &x.row(next_idx));
                        if dist < closest[i] {
                            closest[i] = dist;
                        }
                    }
                }
            }
        }

        centroids
    }
}

fn sample_weighted(weights: &[f64], total: f64, rng: &mut ChaCha8Rng) -> usize {
    let target = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    let mut last_positive = 0;

    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        cumulative += w;
        last_positive = i;
        if cumulative > target {
            return i;
        }
    }

    last_positive
}

/// Index and squared distance of the nearest center; ties go to the lowest index.
pub(crate) fn nearest_center(point: &ArrayView1<f64>, centroids: &Matrix) -> (usize, f64) {
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = 0;

    for (k, center) in centroids.outer_iter().enumerate() {
        let distance = squared_euclidean(point, &center);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = k;
        }
    }

    (closest_cluster, min_distance)
}

/// Assigns every row to its nearest center and returns the inertia.
fn assign(x: &Matrix, centroids: &Matrix, labels: &mut Labels) -> f64 {
    let mut inertia = 0.0;
    for (i, row) in x.outer_iter().enumerate() {
        let (cluster, distance) = nearest_center(&row, centroids);
        labels[i] = cluster as i64;
        inertia += distance;
    }
    inertia
}

fn update_centroids(x: &Matrix, labels: &Labels, centroids: &mut Matrix) {
    let n_clusters = centroids.nrows();
    let mut sums = Matrix::zeros((n_clusters, x.ncols()));
    let mut counts = vec![0usize; n_clusters];

    for (row, &label) in x.outer_iter().zip(labels.iter()) {
        let k = label as usize;
        let mut sum = sums.row_mut(k);
        sum += &row;
        counts[k] += 1;
    }

    let mut empty = Vec::new();
    for k in 0..n_clusters {
        if counts[k] > 0 {
            let mean = &sums.row(k) / counts[k] as f64;
            centroids.row_mut(k).assign(&mean);
        } else {
            empty.push(k);
        }
    }

    if empty.is_empty() {
        return;
    }

    // Empty clusters take over the points farthest from their current centers.
    let mut far: Vec<(usize, f64)> = x
        .outer_iter()
        .zip(labels.iter())
        .enumerate()
        .map(|(i, (row, &label))| {
            (i, squared_euclidean(&row, &centroids.row(label as usize)))
        })
        .collect();
    far.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    for (k, &(idx, _)) in empty.iter().zip(far.iter()) {
        centroids.row_mut(*k).assign(&x.row(idx));
    }
}

fn max_centroid_shift(old_centroids: &Matrix, new_centroids: &Matrix) -> f64 {
    old_centroids
        .outer_iter()
        .zip(new_centroids.outer_iter())
        .map(|(old, new)| euclidean(&old, &new))
        .fold(0.0, f64::max)
}
