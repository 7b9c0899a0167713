//! Clustering decision engine for review embeddings.
//!
//! Given an N×D embedding matrix, `clusterscope` scans candidate cluster counts,
//! scores each with silhouette, Calinski-Harabasz and Davies-Bouldin, recommends
//! one K, fits it, and estimates how stable that partition is under bootstrap
//! resampling. [`analysis::analyze`] runs the whole chain.
//!
//! ```rust,no_run
//! use clusterscope::{analysis::analyze, config::AnalysisConfig, progress::Silent, Matrix};
//!
//! # fn load_embeddings() -> Matrix { Matrix::zeros((100, 8)) }
//! let embeddings = load_embeddings();
//! let analysis = analyze(&embeddings, &AnalysisConfig::default(), &Silent)?;
//! println!("k={} via {}", analysis.recommendation.best_k, analysis.recommendation.method);
//! # Ok::<(), clusterscope::ClusterError>(())
//! ```

pub use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

pub mod analysis;
pub mod cluster;
pub mod config;
pub mod distance;
pub mod error;
pub mod insights;
pub mod metrics;
pub mod progress;
pub mod recommend;
pub mod representatives;
pub mod scan;
pub mod stability;
pub mod validation;

#[cfg(test)]
mod testing;

pub use error::{ClusterError, MetricUnavailable, Result};

pub type Vector = Array1<f64>;
pub type Matrix = Array2<f64>;
/// Cluster ids per row; [`NOISE`] marks unassigned rows.
pub type Labels = Array1<i64>;

/// Label of rows a density fit could not assign.
pub const NOISE: i64 = -1;
