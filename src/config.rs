use crate::error::{ClusterError, Result};
use crate::recommend::WeightedParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Vote,
    Weighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    pub strategy: Strategy,
    pub weight: f64,
    pub penalty_threshold: usize,
    pub penalty_strength: f64,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        let weighted = WeightedParams::default();
        Self {
            strategy: Strategy::default(),
            weight: weighted.weight,
            penalty_threshold: weighted.penalty_threshold,
            penalty_strength: weighted.penalty_strength,
        }
    }
}

impl RecommendConfig {
    pub fn weighted_params(&self) -> WeightedParams {
        WeightedParams {
            weight: self.weight,
            penalty_threshold: self.penalty_threshold,
            penalty_strength: self.penalty_strength,
        }
    }
}

/// Settings for one end-to-end [`analyze`](crate::analysis::analyze) run.
///
/// Every field has a default, so partial documents deserialize:
///
/// ```rust
/// use clusterscope::config::AnalysisConfig;
///
/// let config: AnalysisConfig = serde_json::from_str(r#"{"k_max": 8}"#).unwrap();
/// assert_eq!(config.k_min, 3);
/// assert_eq!(config.k_max, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub k_min: usize,
    pub k_max: usize,
    pub random_state: u64,
    pub top_representatives: usize,
    pub bootstrap_runs: usize,
    /// Rows scored per K during the scan; `None` scores all of them.
    pub metric_sample_size: Option<usize>,
    /// Smallest embedding set worth clustering.
    pub min_rows: usize,
    pub recommend: RecommendConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            k_min: 3,
            k_max: 12,
            random_state: 42,
            top_representatives: 5,
            bootstrap_runs: 5,
            metric_sample_size: Some(2000),
            min_rows: 30,
            recommend: RecommendConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
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
        if let Some(size) = self.metric_sample_size {
            if size < 2 {
                return Err(ClusterError::config(format!(
                    "metric_sample_size must be >= 2, got {}",
                    size
                )));
            }
        }
        self.recommend.weighted_params().validate()
    }
}
