use crate::cluster::{fit_spec, ClusterSpec, ClusteringResult, KMeansParams};
use crate::config::{AnalysisConfig, Strategy};
use crate::error::{ClusterError, Result};
use crate::progress::Progress;
use crate::recommend::KRecommendation;
use crate::scan::{KScanResult, KScanner};
use crate::stability::{self, StabilityReport};
use crate::validation::{evaluate, EvaluationReport};
use crate::{representatives, Matrix, NOISE};
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;

/// Stages that report one unit each: recommend, final fit, representatives.
const SINGLE_UNIT_STAGES: usize = 3;

/// Shifts a sub-stage's own counter onto the pipeline-wide one.
struct Offset<'a> {
    inner: &'a dyn Progress,
    done_before: usize,
    total: usize,
}

impl Progress for Offset<'_> {
    fn report(&self, completed: usize, _total: usize, message: &str) {
        self.inner.report(self.done_before + completed, self.total, message)
    }
}

/// Everything one analysis run decides about an embedding set.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub scan: KScanResult,
    pub recommendation: KRecommendation,
    pub clustering: ClusteringResult,
    pub evaluation: EvaluationReport,
    pub stability: StabilityReport,
    /// Row indices per cluster, closest to the center first.
    pub representatives: BTreeMap<i64, Vec<usize>>,
}

/// Scans K, picks one, fits it, then measures how far to trust the result.
///
/// `progress` counts one unit per scanned K, one per bootstrap run and one for
/// each remaining stage, all against a single total.
pub fn analyze(x: &Matrix, config: &AnalysisConfig, progress: &dyn Progress) -> Result<Analysis> {
    config.validate()?;
    if x.nrows() < config.min_rows {
        return Err(ClusterError::insufficient(format!(
            "{} rows is below the minimum of {}",
            x.nrows(),
            config.min_rows
        )));
    }

    info!(
        "analyzing {} embeddings of dimension {}",
        x.nrows(),
        x.ncols()
    );

    let n_ks = config.k_max - config.k_min + 1;
    let total = n_ks + config.bootstrap_runs + SINGLE_UNIT_STAGES;
    let mut done = 0;

    let scan = KScanner::new(config.k_min, config.k_max)
        .random_state(config.random_state)
        .sample_size(config.metric_sample_size)
        .scan(
            x,
            &Offset {
                inner: progress,
                done_before: done,
                total,
            },
        )?;
    done += n_ks;

    let recommendation = match config.recommend.strategy {
        Strategy::Vote => scan.recommend()?,
        Strategy::Weighted => scan.recommend_weighted(&config.recommend.weighted_params())?,
    };
    done += 1;
    progress.report(done, total, &format!("recommended k={}", recommendation.best_k));

    let spec = ClusterSpec::Centroid(KMeansParams::with_k(recommendation.best_k));
    let clustering = fit_spec(x, &spec, config.random_state)?;
    let evaluation = evaluate(
        x,
        &clustering.labels,
        NOISE,
        config.metric_sample_size,
        config.random_state,
    )?;
    done += 1;
    progress.report(done, total, "final clustering fitted");

    let stability = stability::estimate_with(
        x,
        recommendation.best_k,
        config.bootstrap_runs,
        config.random_state,
        &Offset {
            inner: progress,
            done_before: done,
            total,
        },
    )?;
    done += config.bootstrap_runs;

    let representatives = representatives::select(
        x,
        &clustering.labels,
        &clustering.centers,
        config.top_representatives,
        NOISE,
    )?;
    done += 1;
    progress.report(done, total, "representatives selected");

    info!(
        "analysis done: k={} ({}), ari_mean={:?}",
        recommendation.best_k, recommendation.method, stability.ari_mean
    );

    Ok(Analysis {
        scan,
        recommendation,
        clustering,
        evaluation,
        stability,
        representatives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Silent;
    use crate::testing::{axis_blobs, blobs};
    use std::cell::RefCell;

    #[test]
    fn test_analyze_three_blobs() {
        let x = axis_blobs(3, 150, 8, 5.0, 0.5, 42);
        let config = AnalysisConfig {
            k_min: 2,
            k_max: 6,
            bootstrap_runs: 3,
            ..Default::default()
        };
        let stages = RefCell::new(Vec::new());
        let sink = |done: usize, total: usize, _msg: &str| stages.borrow_mut().push((done, total));

        let analysis = analyze(&x, &config, &sink).unwrap();

        assert_eq!(analysis.recommendation.best_k, 3);
        assert_eq!(analysis.clustering.n_clusters, 3);
        assert!(analysis.evaluation.silhouette.clone().unwrap() > 0.5);
        assert!(analysis.stability.ari_mean.unwrap() > 0.95);
        assert_eq!(analysis.representatives.len(), 3);
        for (&cluster_id, rows) in &analysis.representatives {
            assert_eq!(rows.len(), 5);
            assert!(rows.iter().all(|&row| analysis.clustering.labels[row] == cluster_id));
        }
        // 5 scanned K + 3 bootstrap runs + recommend, final fit, representatives.
        assert_eq!(stages.into_inner(), (1..=11).map(|i| (i, 11)).collect::<Vec<_>>());
    }

    #[test]
    fn test_analyze_weighted_strategy() {
        let x = blobs(&[0.0, 3.0, -3.0], 60, 8, 0.5, 4);
        let mut config = AnalysisConfig {
            k_min: 2,
            k_max: 6,
            bootstrap_runs: 2,
            ..Default::default()
        };
        config.recommend.strategy = Strategy::Weighted;

        let analysis = analyze(&x, &config, &Silent).unwrap();

        assert_eq!(analysis.recommendation.best_k, 3);
        assert_eq!(analysis.recommendation.method, "weighted");
    }

    #[test]
    fn test_analyze_too_few_rows() {
        let x = blobs(&[0.0, 3.0], 10, 4, 0.5, 0);
        assert!(matches!(
            analyze(&x, &AnalysisConfig::default(), &Silent),
            Err(ClusterError::DataInsufficiency(_))
        ));
    }

    #[test]
    fn test_analyze_rejects_bad_config() {
        let x = blobs(&[0.0, 3.0], 30, 4, 0.5, 0);
        let config = AnalysisConfig {
            k_min: 5,
            k_max: 3,
            ..Default::default()
        };
        assert!(matches!(
            analyze(&x, &config, &Silent),
            Err(ClusterError::Configuration(_))
        ));
    }
}
