//! Report-side aggregates over a final labeling.
//!
//! Every label value, noise included, is treated as its own group here.

use crate::error::{ClusterError, Result};
use crate::Labels;
use serde::Serialize;
use std::collections::BTreeMap;

/// Highest possible star rating; severity is the distance below it.
pub const MAX_STAR: f64 = 5.0;

pub fn cluster_sizes(labels: &Labels) -> BTreeMap<i64, usize> {
    let mut sizes = BTreeMap::new();
    for &label in labels {
        *sizes.entry(label).or_insert(0) += 1;
    }
    sizes
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterPriority {
    pub cluster_id: i64,
    pub cluster_size: usize,
    /// Share of all rows, in [0, 1].
    pub ratio: f64,
    pub mean_star: f64,
    pub severity: f64,
    /// `ratio * severity`: large clusters of unhappy reviews rank first.
    pub priority_score: f64,
}

/// Ranks clusters by `ratio × (5 − mean star)`, highest first, cluster id breaking ties.
pub fn cluster_priority(labels: &Labels, stars: &[f64]) -> Result<Vec<ClusterPriority>> {
    if labels.len() != stars.len() {
        return Err(ClusterError::ShapeMismatch {
            expected: labels.len(),
            got: stars.len(),
        });
    }
    if labels.is_empty() {
        return Ok(Vec::new());
    }

    let mut totals: BTreeMap<i64, (usize, f64)> = BTreeMap::new();
    for (&label, &star) in labels.iter().zip(stars) {
        let entry = totals.entry(label).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += star;
    }

    let total = labels.len() as f64;
    let mut priorities: Vec<ClusterPriority> = totals
        .into_iter()
        .map(|(cluster_id, (size, star_sum))| {
            let ratio = size as f64 / total;
            let mean_star = star_sum / size as f64;
            let severity = MAX_STAR - mean_star;
            ClusterPriority {
                cluster_id,
                cluster_size: size,
                ratio,
                mean_star,
                severity,
                priority_score: ratio * severity,
            }
        })
        .collect();

    priorities.sort_by(|a, b| {
        b.priority_score
            .total_cmp(&a.priority_score)
            .then(a.cluster_id.cmp(&b.cluster_id))
    });

    Ok(priorities)
}

/// Row-normalised crosstab: for each group, the percentage of its rows in each cluster.
///
/// Every group row carries every cluster id seen anywhere, with 0.0 where absent.
pub fn group_cluster_share<G: Ord + Clone>(
    groups: &[G],
    labels: &Labels,
) -> Result<BTreeMap<G, BTreeMap<i64, f64>>> {
    if groups.len() != labels.len() {
        return Err(ClusterError::ShapeMismatch {
            expected: labels.len(),
            got: groups.len(),
        });
    }

    let clusters = cluster_sizes(labels);
    let mut counts: BTreeMap<G, BTreeMap<i64, usize>> = BTreeMap::new();
    for (group, &label) in groups.iter().zip(labels) {
        *counts
            .entry(group.clone())
            .or_default()
            .entry(label)
            .or_insert(0) += 1;
    }

    let shares = counts
        .into_iter()
        .map(|(group, per_cluster)| {
            let group_total: usize = per_cluster.values().sum();
            let row: BTreeMap<i64, f64> = clusters
                .keys()
                .map(|&cluster_id| {
                    let n = per_cluster.get(&cluster_id).copied().unwrap_or(0);
                    (cluster_id, 100.0 * n as f64 / group_total as f64)
                })
                .collect();
            (group, row)
        })
        .collect();

    Ok(shares)
}
