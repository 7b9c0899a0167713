//! Turns a per-K metric table into one recommended K.
//!
//! Two strategies:
//! - [`recommend_by_vote`]: silhouette-max, Calinski-Harabasz-max, Davies-Bouldin-min
//!   and the log-inertia elbow each nominate a K; most votes wins, ties go to the
//!   best normalized composite.
//! - [`recommend_weighted`]: `weight · silhouette + (1 − weight) · inverted inertia`,
//!   minus a linear penalty once K passes a threshold.
//!
//! Both work on the intersection of the K ranges they are given. [`recommend`]
//! picks between them from the maps the caller has.

use crate::error::{ClusterError, Result};
use crate::scan::KScanResult;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Floor applied before taking the log of inertia.
const INERTIA_FLOOR: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KRecommendation {
    pub best_k: usize,
    /// Which signal(s) produced the choice, e.g. `vote:elbow_curvature,silhouette_max`.
    pub method: String,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedParams {
    /// Share of the silhouette term, clamped to [0, 1].
    pub weight: f64,
    pub penalty_threshold: usize,
    pub penalty_strength: f64,
}

impl Default for WeightedParams {
    fn default() -> Self {
        Self {
            weight: 0.7,
            penalty_threshold: 8,
            penalty_strength: 0.05,
        }
    }
}

impl WeightedParams {
    pub fn penalty(&self, k: usize) -> f64 {
        k.saturating_sub(self.penalty_threshold) as f64 * self.penalty_strength
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.weight.is_finite() {
            return Err(ClusterError::config(format!(
                "weight must be a finite number, got {}",
                self.weight
            )));
        }
        if !self.penalty_strength.is_finite() || self.penalty_strength < 0.0 {
            return Err(ClusterError::config(format!(
                "penalty_strength must be finite and >= 0, got {}",
                self.penalty_strength
            )));
        }
        Ok(())
    }
}

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// Linear min-max scaling of the finite values to [0, 1].
///
/// Non-finite entries map to 0; when every finite value is equal they all map to 0.5.
pub fn normalize(scores: &BTreeMap<usize, f64>, higher_better: bool) -> BTreeMap<usize, f64> {
    let finite: Vec<f64> = scores.values().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return scores.keys().map(|&k| (k, 0.0)).collect();
    }

    let v_min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let v_max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let flat = is_close(v_min, v_max);

    scores
        .iter()
        .map(|(&k, &v)| {
            let norm = if !v.is_finite() {
                0.0
            } else if flat {
                0.5
            } else {
                let scaled = (v - v_min) / (v_max - v_min);
                if higher_better { scaled } else { 1.0 - scaled }
            };
            (k, norm)
        })
        .collect()
}

/// K with the sharpest bend in log-inertia, judged by the absolute discrete second
/// derivative at interior points. Fewer than three K's yields the smallest K.
pub fn elbow_k(k_to_inertia: &BTreeMap<usize, f64>) -> Option<usize> {
    let ks: Vec<usize> = k_to_inertia.keys().copied().collect();
    if ks.len() < 3 {
        return ks.first().copied();
    }

    let log_inertia: Vec<f64> = k_to_inertia
        .values()
        .map(|&v| v.max(INERTIA_FLOOR).ln())
        .collect();

    let mut best_idx = 1;
    let mut best_curvature = f64::NEG_INFINITY;
    for i in 1..ks.len() - 1 {
        let curvature = (log_inertia[i - 1] - 2.0 * log_inertia[i] + log_inertia[i + 1]).abs();
        if curvature > best_curvature {
            best_curvature = curvature;
            best_idx = i;
        }
    }

    Some(ks[best_idx])
}

/// First K holding the best finite-comparable value; NaN never wins.
fn arg_best(scores: &BTreeMap<usize, f64>, higher_better: bool) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (&k, &v) in scores {
        if v.is_nan() {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, b)) if higher_better => v > b,
            Some((_, b)) => v < b,
        };
        if better {
            best = Some((k, v));
        }
    }
    best.map(|(k, _)| k)
}

fn restrict(scores: &BTreeMap<usize, f64>, keys: &BTreeSet<usize>) -> BTreeMap<usize, f64> {
    scores
        .iter()
        .filter(|(k, _)| keys.contains(k))
        .map(|(&k, &v)| (k, v))
        .collect()
}

/// Intersection of the key sets of the non-empty maps.
fn common_keys(maps: &[&BTreeMap<usize, f64>]) -> Option<BTreeSet<usize>> {
    let mut non_empty = maps.iter().filter(|m| !m.is_empty());
    let first: BTreeSet<usize> = non_empty.next()?.keys().copied().collect();
    Some(non_empty.fold(first, |acc, m| {
        acc.into_iter().filter(|k| m.contains_key(k)).collect()
    }))
}

/// Majority vote among the per-metric nominees, composite tie-break.
pub fn recommend_by_vote(
    k_to_inertia: &BTreeMap<usize, f64>,
    k_to_silhouette: &BTreeMap<usize, f64>,
    k_to_calinski_harabasz: &BTreeMap<usize, f64>,
    k_to_davies_bouldin: &BTreeMap<usize, f64>,
) -> Result<KRecommendation> {
    let keys = common_keys(&[
        k_to_inertia,
        k_to_silhouette,
        k_to_calinski_harabasz,
        k_to_davies_bouldin,
    ])
    .ok_or_else(|| ClusterError::insufficient("no scanned K values to recommend from"))?;
    if keys.is_empty() {
        return Err(ClusterError::insufficient("metric maps share no K value"));
    }

    let inertia = restrict(k_to_inertia, &keys);
    let silhouette = restrict(k_to_silhouette, &keys);
    let ch = restrict(k_to_calinski_harabasz, &keys);
    let db = restrict(k_to_davies_bouldin, &keys);

    let mut candidates: Vec<(&'static str, usize)> = Vec::new();
    if let Some(k) = arg_best(&silhouette, true) {
        candidates.push(("silhouette_max", k));
    }
    if let Some(k) = arg_best(&ch, true) {
        candidates.push(("calinski_harabasz_max", k));
    }
    if let Some(k) = arg_best(&db, false) {
        candidates.push(("davies_bouldin_min", k));
    }
    if let Some(k) = elbow_k(&inertia) {
        candidates.push(("elbow_curvature", k));
    }

    if candidates.is_empty() {
        return Err(ClusterError::insufficient("no metric produced a candidate K"));
    }

    let mut votes: BTreeMap<usize, usize> = BTreeMap::new();
    for &(_, k) in &candidates {
        *votes.entry(k).or_insert(0) += 1;
    }

    let sil_norm = normalize(&silhouette, true);
    let ch_norm = normalize(&ch, true);
    let db_norm = normalize(&db, false);
    let composite = |k: usize| {
        sil_norm.get(&k).copied().unwrap_or(0.0)
            + ch_norm.get(&k).copied().unwrap_or(0.0)
            + db_norm.get(&k).copied().unwrap_or(0.0)
    };

    let max_votes = votes.values().copied().max().unwrap_or(0);
    let mut best: Option<(usize, f64)> = None;
    for (&k, &n) in &votes {
        if n != max_votes {
            continue;
        }
        let score = composite(k);
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((k, score));
        }
    }

    let Some((best_k, score)) = best else {
        return Err(ClusterError::insufficient("no metric produced a candidate K"));
    };

    let mut nominators: Vec<&str> = candidates
        .iter()
        .filter(|(_, k)| *k == best_k)
        .map(|(name, _)| *name)
        .collect();
    nominators.sort_unstable();

    let recommendation = KRecommendation {
        best_k,
        method: format!("vote:{}", nominators.join(",")),
        score: Some(score),
    };
    debug!("votes={:?} candidates={:?}", votes, candidates);
    info!(
        "recommended k={} ({}), composite={:.4}",
        recommendation.best_k, recommendation.method, score
    );

    Ok(recommendation)
}

/// Weighted silhouette/inertia composite with a large-K penalty.
pub fn recommend_weighted(
    k_to_inertia: &BTreeMap<usize, f64>,
    k_to_silhouette: &BTreeMap<usize, f64>,
    params: &WeightedParams,
) -> Result<KRecommendation> {
    params.validate()?;
    let weight = params.weight.clamp(0.0, 1.0);

    let keys = common_keys(&[k_to_inertia, k_to_silhouette])
        .ok_or_else(|| ClusterError::insufficient("no scanned K values to recommend from"))?;
    if keys.is_empty() {
        return Err(ClusterError::insufficient("metric maps share no K value"));
    }

    let sil_norm = normalize(&restrict(k_to_silhouette, &keys), true);
    let inertia_norm = normalize(&restrict(k_to_inertia, &keys), false);

    let both = (sil_norm.is_empty(), inertia_norm.is_empty());
    let (method, sil_weight, inertia_weight) = match both {
        (false, false) => ("weighted", weight, 1.0 - weight),
        (true, _) => ("inertia_min", 0.0, 1.0),
        (false, true) => ("silhouette_only", 1.0, 0.0),
    };

    let mut best: Option<(usize, f64)> = None;
    for &k in &keys {
        let score = sil_weight * sil_norm.get(&k).copied().unwrap_or(0.0)
            + inertia_weight * inertia_norm.get(&k).copied().unwrap_or(0.0)
            - params.penalty(k);
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((k, score));
        }
    }

    let Some((best_k, score)) = best else {
        return Err(ClusterError::insufficient("no scanned K values to recommend from"));
    };

    info!(
        "recommended k={} ({}, weight={:.2}), composite={:.4}",
        best_k, method, weight, score
    );

    Ok(KRecommendation {
        best_k,
        method: method.to_string(),
        score: Some(score),
    })
}

/// Picks the strategy from what the caller has: vote when Calinski-Harabasz and
/// Davies-Bouldin maps are supplied, the weighted composite otherwise.
pub fn recommend(
    k_to_inertia: &BTreeMap<usize, f64>,
    k_to_silhouette: &BTreeMap<usize, f64>,
    ch_db: Option<(&BTreeMap<usize, f64>, &BTreeMap<usize, f64>)>,
    params: &WeightedParams,
) -> Result<KRecommendation> {
    match ch_db {
        Some((ch, db)) if !(ch.is_empty() && db.is_empty()) => {
            recommend_by_vote(k_to_inertia, k_to_silhouette, ch, db)
        }
        _ => recommend_weighted(k_to_inertia, k_to_silhouette, params),
    }
}

impl KScanResult {
    pub fn recommend(&self) -> Result<KRecommendation> {
        recommend_by_vote(
            &self.k_to_inertia,
            &self.k_to_silhouette,
            &self.k_to_calinski_harabasz,
            &self.k_to_davies_bouldin,
        )
    }

    pub fn recommend_weighted(&self, params: &WeightedParams) -> Result<KRecommendation> {
        recommend_weighted(&self.k_to_inertia, &self.k_to_silhouette, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan;
    use crate::testing::blobs;

    fn map(pairs: &[(usize, f64)]) -> BTreeMap<usize, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_normalize() {
        let scores = map(&[(2, 1.0), (3, 3.0), (4, 2.0), (5, f64::INFINITY)]);

        let up = normalize(&scores, true);
        assert_eq!(up[&2], 0.0);
        assert_eq!(up[&3], 1.0);
        assert_eq!(up[&4], 0.5);
        assert_eq!(up[&5], 0.0);

        let down = normalize(&scores, false);
        assert_eq!(down[&2], 1.0);
        assert_eq!(down[&3], 0.0);
        assert_eq!(down[&5], 0.0);
    }

    #[test]
    fn test_normalize_flat_and_empty() {
        let flat = normalize(&map(&[(2, 0.4), (3, 0.4), (4, f64::NAN)]), true);
        assert_eq!(flat[&2], 0.5);
        assert_eq!(flat[&3], 0.5);
        assert_eq!(flat[&4], 0.0);

        let none = normalize(&map(&[(2, f64::INFINITY)]), true);
        assert_eq!(none[&2], 0.0);
    }

    #[test]
    fn test_elbow() {
        let inertia = map(&[(2, 1000.0), (3, 100.0), (4, 90.0), (5, 85.0)]);
        assert_eq!(elbow_k(&inertia), Some(3));

        assert_eq!(elbow_k(&map(&[(4, 10.0), (5, 9.0)])), Some(4));
        assert_eq!(elbow_k(&BTreeMap::new()), None);
    }

    #[test]
    fn test_vote_majority() {
        let inertia = map(&[(2, 1000.0), (3, 100.0), (4, 90.0), (5, 85.0)]);
        let sil = map(&[(2, 0.5), (3, 0.7), (4, 0.4), (5, 0.3)]);
        let ch = map(&[(2, 200.0), (3, 500.0), (4, 450.0), (5, 400.0)]);
        let db = map(&[(2, 0.9), (3, 0.8), (4, 0.4), (5, 1.0)]);

        let rec = recommend_by_vote(&inertia, &sil, &ch, &db).unwrap();
        assert_eq!(rec.best_k, 3);
        assert_eq!(rec.method, "vote:calinski_harabasz_max,elbow_curvature,silhouette_max");
    }

    #[test]
    fn test_vote_tie_broken_by_composite() {
        // silhouette + elbow nominate 3, CH + DB nominate 4.
        let inertia = map(&[(2, 1000.0), (3, 100.0), (4, 90.0), (5, 85.0)]);
        let sil = map(&[(2, 0.1), (3, 0.6), (4, 0.59), (5, 0.2)]);
        let ch = map(&[(2, 100.0), (3, 110.0), (4, 900.0), (5, 120.0)]);
        let db = map(&[(2, 2.0), (3, 1.9), (4, 0.3), (5, 1.8)]);

        let rec = recommend_by_vote(&inertia, &sil, &ch, &db).unwrap();
        assert_eq!(rec.best_k, 4);
        assert_eq!(rec.method, "vote:calinski_harabasz_max,davies_bouldin_min");
        assert!(rec.score.unwrap() > 2.5);
    }

    #[test]
    fn test_vote_is_idempotent() {
        let inertia = map(&[(2, 50.0), (3, 40.0), (4, 39.0)]);
        let sil = map(&[(2, 0.2), (3, 0.25), (4, 0.1)]);
        let ch = map(&[(2, 10.0), (3, 12.0), (4, 11.0)]);
        let db = map(&[(2, 1.5), (3, 1.2), (4, 1.4)]);

        let a = recommend_by_vote(&inertia, &sil, &ch, &db).unwrap();
        let b = recommend_by_vote(&inertia, &sil, &ch, &db).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_vote_without_silhouette() {
        let inertia = map(&[(2, 1000.0), (3, 100.0), (4, 90.0)]);
        let ch = map(&[(2, 10.0), (3, 30.0), (4, 20.0)]);

        let rec = recommend_by_vote(&inertia, &BTreeMap::new(), &ch, &BTreeMap::new()).unwrap();
        assert_eq!(rec.best_k, 3);
    }

    #[test]
    fn test_vote_uses_range_intersection() {
        let inertia = map(&[(2, 1000.0), (3, 100.0), (4, 90.0), (5, 85.0), (6, 80.0)]);
        let sil = map(&[(3, 0.2), (4, 0.3), (5, 0.9), (6, 0.95)]);
        let ch = map(&[(2, 1.0), (3, 2.0), (4, 3.0), (5, 2.5)]);
        let db = map(&[(3, 0.5), (4, 0.4), (5, 0.45)]);

        // Only K in 3..=5 is scored everywhere; silhouette's K=6 peak is out.
        let rec = recommend_by_vote(&inertia, &sil, &ch, &db).unwrap();
        assert_eq!(rec.best_k, 4);
        assert_eq!(
            rec.method,
            "vote:calinski_harabasz_max,davies_bouldin_min,elbow_curvature"
        );
    }

    #[test]
    fn test_vote_rejects_empty_or_disjoint() {
        let empty = BTreeMap::new();
        assert!(recommend_by_vote(&empty, &empty, &empty, &empty).is_err());

        let a = map(&[(2, 1.0)]);
        let b = map(&[(3, 1.0)]);
        assert!(recommend_by_vote(&a, &b, &empty, &empty).is_err());
    }

    #[test]
    fn test_weighted_extremes() {
        // Silhouette peaks at 3, inertia keeps falling to 6.
        let inertia = map(&[(2, 900.0), (3, 500.0), (4, 300.0), (5, 200.0), (6, 100.0)]);
        let sil = map(&[(2, 0.3), (3, 0.8), (4, 0.5), (5, 0.4), (6, 0.2)]);
        let no_penalty = |weight| WeightedParams {
            weight,
            penalty_threshold: 0,
            penalty_strength: 0.0,
        };

        let pure_sil = recommend_weighted(&inertia, &sil, &no_penalty(1.0)).unwrap();
        assert_eq!(pure_sil.best_k, 3);

        let pure_inertia = recommend_weighted(&inertia, &sil, &no_penalty(0.0)).unwrap();
        assert_eq!(pure_inertia.best_k, 6);

        // Out-of-range weights are clamped rather than rejected.
        let clamped = recommend_weighted(&inertia, &sil, &no_penalty(3.0)).unwrap();
        assert_eq!(clamped.best_k, 3);
    }

    #[test]
    fn test_weighted_uses_range_intersection() {
        let inertia = map(&[(2, 900.0), (3, 500.0), (4, 300.0), (5, 200.0), (6, 100.0)]);
        let sil = map(&[(4, 0.3), (5, 0.9), (6, 0.5), (7, 0.95)]);
        let params = WeightedParams {
            weight: 1.0,
            penalty_threshold: 0,
            penalty_strength: 0.0,
        };

        // K=7 has the best silhouette but no inertia, so it never competes.
        let rec = recommend_weighted(&inertia, &sil, &params).unwrap();
        assert_eq!(rec.best_k, 5);
        assert_eq!(rec.method, "weighted");
    }

    #[test]
    fn test_weighted_penalty_discourages_large_k() {
        let inertia = map(&[(2, 900.0), (3, 500.0), (4, 300.0), (5, 200.0), (6, 100.0)]);
        let sil = map(&[(2, 0.3), (3, 0.5), (4, 0.5), (5, 0.5), (6, 0.52)]);

        let params = WeightedParams {
            weight: 0.5,
            penalty_threshold: 3,
            penalty_strength: 0.5,
        };
        assert_eq!(params.penalty(3), 0.0);
        assert_eq!(params.penalty(5), 1.0);

        let rec = recommend_weighted(&inertia, &sil, &params).unwrap();
        assert_eq!(rec.best_k, 3);
    }

    #[test]
    fn test_weighted_fallbacks() {
        let inertia = map(&[(2, 900.0), (3, 500.0), (4, 300.0)]);
        let sil = map(&[(2, 0.3), (3, 0.8), (4, 0.5)]);
        let params = WeightedParams {
            penalty_strength: 0.0,
            ..Default::default()
        };

        let rec = recommend_weighted(&inertia, &BTreeMap::new(), &params).unwrap();
        assert_eq!(rec.best_k, 4);
        assert_eq!(rec.method, "inertia_min");

        let rec = recommend_weighted(&BTreeMap::new(), &sil, &params).unwrap();
        assert_eq!(rec.best_k, 3);
        assert_eq!(rec.method, "silhouette_only");
    }

    #[test]
    fn test_weighted_rejects_invalid_knobs() {
        let inertia = map(&[(2, 900.0), (3, 500.0)]);
        let sil = map(&[(2, 0.3), (3, 0.8)]);

        let nan_weight = WeightedParams {
            weight: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            recommend_weighted(&inertia, &sil, &nan_weight),
            Err(ClusterError::Configuration(_))
        ));

        let negative = WeightedParams {
            penalty_strength: -1.0,
            ..Default::default()
        };
        assert!(recommend_weighted(&inertia, &sil, &negative).is_err());
    }

    #[test]
    fn test_recommend_dispatch() {
        let inertia = map(&[(2, 900.0), (3, 500.0), (4, 300.0), (5, 200.0)]);
        let sil = map(&[(2, 0.3), (3, 0.8), (4, 0.5), (5, 0.4)]);
        let ch = map(&[(2, 10.0), (3, 40.0), (4, 30.0), (5, 20.0)]);
        let db = map(&[(2, 1.0), (3, 0.5), (4, 0.7), (5, 0.9)]);
        let params = WeightedParams::default();

        let voted = recommend(&inertia, &sil, Some((&ch, &db)), &params).unwrap();
        assert!(voted.method.starts_with("vote:"));
        assert_eq!(voted.best_k, 3);

        let weighted = recommend(&inertia, &sil, None, &params).unwrap();
        assert_eq!(weighted.method, "weighted");

        let empty = BTreeMap::new();
        let weighted = recommend(&inertia, &sil, Some((&empty, &empty)), &params).unwrap();
        assert_eq!(weighted.method, "weighted");
    }

    #[test]
    fn test_three_blobs_recommend_three() {
        let x = blobs(&[0.0, 3.0, -3.0], 150, 8, 0.5, 42);
        let result = scan(&x, 2, 6, 42).unwrap();

        assert_eq!(result.recommend().unwrap().best_k, 3);
        assert_eq!(
            result.recommend_weighted(&WeightedParams::default()).unwrap().best_k,
            3
        );
    }

    #[test]
    fn test_single_blob_recommend_does_not_fail() {
        let x = blobs(&[0.0], 200, 8, 1.0, 17);
        let result = scan(&x, 2, 6, 42).unwrap();

        let rec = result.recommend().unwrap();
        assert!((2..=6).contains(&rec.best_k));
        let rec = result.recommend_weighted(&WeightedParams::default()).unwrap();
        assert!((2..=6).contains(&rec.best_k));
    }
}
