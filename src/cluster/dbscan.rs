use crate::distance::Metric;
use crate::error::{ClusterError, Result};
use crate::{Labels, Matrix, NOISE};
use std::collections::{BTreeSet, VecDeque};

/// Density-based clustering. Deterministic: points are visited in row order.
#[derive(Clone, Debug)]
pub struct DBSCAN {
    pub labels: Option<Labels>,
    pub core_sample_indices: Option<Vec<usize>>,
    eps: f64,
    min_samples: usize,
    metric: Metric,
}

impl DBSCAN {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self {
            labels: None,
            core_sample_indices: None,
            eps,
            min_samples,
            metric: Metric::Euclidean,
        }
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ClusterError::insufficient(
                "input matrix must have at least one sample and one feature",
            ));
        }
        if !(self.eps > 0.0) {
            return Err(ClusterError::config(format!("eps must be > 0, got {}", self.eps)));
        }
        if self.min_samples == 0 {
            return Err(ClusterError::config("min_samples must be > 0"));
        }

        let n_samples = x.nrows();
        let neighborhoods: Vec<Vec<usize>> =
            (0..n_samples).map(|i| self.region_query(x, i)).collect();
        // A point's neighborhood includes the point itself.
        let is_core: Vec<bool> = neighborhoods
            .iter()
            .map(|neighbors| neighbors.len() >= self.min_samples)
            .collect();

        let mut labels = Labels::from_elem(n_samples, NOISE);
        let mut current_cluster: i64 = 0;

        for seed in 0..n_samples {
            if !is_core[seed] || labels[seed] != NOISE {
                continue;
            }

            labels[seed] = current_cluster;
            let mut queue: VecDeque<usize> = neighborhoods[seed].iter().copied().collect();

            // Expand cluster using BFS; only core points propagate.
            while let Some(neighbor_idx) = queue.pop_front() {
                if labels[neighbor_idx] != NOISE {
                    continue;
                }
                labels[neighbor_idx] = current_cluster;

                if is_core[neighbor_idx] {
                    queue.extend(
                        neighborhoods[neighbor_idx]
                            .iter()
                            .copied()
                            .filter(|&nn| labels[nn] == NOISE),
                    );
                }
            }

            current_cluster += 1;
        }

        let core_samples = (0..n_samples).filter(|&i| is_core[i]).collect();

        self.labels = Some(labels);
        self.core_sample_indices = Some(core_samples);

        Ok(())
    }

    pub fn fit_predict(&mut self, x: &Matrix) -> Result<Labels> {
        self.fit(x)?;
        self.labels.clone().ok_or(ClusterError::NotFitted("DBSCAN"))
    }

    fn region_query(&self, x: &Matrix, point_idx: usize) -> Vec<usize> {
        let point = x.row(point_idx);
        x.outer_iter()
            .enumerate()
            .filter(|(_, other)| self.metric.distance(&point, other) <= self.eps)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn get_n_clusters(&self) -> Option<usize> {
        self.labels.as_ref().map(|labels| {
            let unique_clusters: BTreeSet<i64> =
                labels.iter().copied().filter(|&x| x != NOISE).collect();
            unique_clusters.len()
        })
    }

    pub fn get_n_noise_points(&self) -> Option<usize> {
        self.labels
            .as_ref()
            .map(|labels| labels.iter().filter(|&&x| x == NOISE).count())
    }

    pub fn is_core_sample(&self, sample_idx: usize) -> Option<bool> {
        self.core_sample_indices
            .as_ref()
            .map(|core_indices| core_indices.binary_search(&sample_idx).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dbscan_basic() {
        let x = array![
            [1.0, 1.0],
            [1.2, 1.1],
            [1.1, 1.2],
            [8.0, 8.0],
            [8.1, 8.1],
            [8.2, 7.9],
            [15.0, 1.0] // Outlier
        ];

        let mut dbscan = DBSCAN::new(1.0, 2);
        let labels = dbscan.fit_predict(&x).unwrap();

        assert_eq!(labels.len(), x.nrows());
        assert_eq!(dbscan.get_n_clusters(), Some(2));
        assert_eq!(labels[6], NOISE);
        assert_eq!(labels[0], 0);
        assert_eq!(labels[3], 1);
        assert!(!dbscan.core_sample_indices.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_dbscan_noise_detection() {
        let x = array![[0.0, 0.0], [10.0, 10.0], [20.0, 20.0], [30.0, 30.0]];

        let mut dbscan = DBSCAN::new(1.0, 2);
        dbscan.fit(&x).unwrap();

        assert_eq!(dbscan.get_n_noise_points(), Some(x.nrows()));
        assert_eq!(dbscan.get_n_clusters(), Some(0));
    }

    #[test]
    fn test_dbscan_single_cluster() {
        let x = array![
            [1.0, 1.0],
            [1.1, 1.0],
            [1.0, 1.1],
            [1.1, 1.1],
            [1.2, 1.0],
            [1.0, 1.2]
        ];

        let mut dbscan = DBSCAN::new(0.5, 2);
        let labels = dbscan.fit_predict(&x).unwrap();

        assert_eq!(dbscan.get_n_clusters(), Some(1));
        for &label in labels.iter() {
            assert_eq!(label, 0);
        }
    }

    #[test]
    fn test_dbscan_border_point() {
        // Point 3 is reachable from core point 2 but is not itself core.
        let x = array![[0.0], [0.5], [1.0], [1.9]];

        let mut dbscan = DBSCAN::new(1.0, 3);
        let labels = dbscan.fit_predict(&x).unwrap();

        assert_eq!(dbscan.is_core_sample(1), Some(true));
        assert_eq!(dbscan.is_core_sample(3), Some(false));
        assert_eq!(labels, array![0, 0, 0, 0]);
    }

    #[test]
    fn test_dbscan_manhattan_metric() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

        let mut dbscan = DBSCAN::new(1.5, 2).metric(Metric::Manhattan);
        dbscan.fit(&x).unwrap();

        assert_eq!(dbscan.get_n_clusters(), Some(1));
    }

    #[test]
    fn test_dbscan_invalid_params() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];

        assert!(DBSCAN::new(-1.0, 2).fit(&x).is_err());
        assert!(DBSCAN::new(0.0, 2).fit(&x).is_err());
        assert!(DBSCAN::new(1.0, 0).fit(&x).is_err());
    }

    #[test]
    fn test_dbscan_core_sample_check() {
        let x = array![[1.0, 1.0], [1.1, 1.0], [1.2, 1.0], [10.0, 10.0]];

        let mut dbscan = DBSCAN::new(0.5, 2);
        dbscan.fit(&x).unwrap();

        assert_eq!(dbscan.is_core_sample(0), Some(true));
        assert_eq!(dbscan.is_core_sample(1), Some(true));
        assert_eq!(dbscan.is_core_sample(3), Some(false));
    }
}
