use crate::cluster::Centers;
use crate::distance::cosine_similarity;
use crate::error::{ClusterError, Result};
use crate::{Labels, Matrix};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Row indices closest to each cluster's center, by cosine similarity.
///
/// Every non-noise label gets an entry, holding at most `top_n` member rows in
/// descending similarity (lower row index first on ties). A label without a
/// center maps to an empty list.
pub fn select(
    x: &Matrix,
    labels: &Labels,
    centers: &Centers,
    top_n: usize,
    noise_label: i64,
) -> Result<BTreeMap<i64, Vec<usize>>> {
    if x.nrows() != labels.len() {
        return Err(ClusterError::ShapeMismatch {
            expected: x.nrows(),
            got: labels.len(),
        });
    }

    let mut members: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        if label != noise_label {
            members.entry(label).or_default().push(row);
        }
    }

    let mut representatives = BTreeMap::new();
    for (cluster_id, rows) in members {
        let Some(center) = centers.get(cluster_id) else {
            warn!("no center for cluster {}, skipping representatives", cluster_id);
            representatives.insert(cluster_id, Vec::new());
            continue;
        };

        let mut scored: Vec<(usize, f64)> = rows
            .into_iter()
            .map(|row| (row, cosine_similarity(&x.row(row), &center)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_n);

        debug!("cluster {}: {} representative(s)", cluster_id, scored.len());
        representatives.insert(cluster_id, scored.into_iter().map(|(row, _)| row).collect());
    }

    Ok(representatives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NOISE;
    use ndarray::array;

    fn fixture() -> (Matrix, Labels) {
        let x = array![
            [1.0, 0.0],
            [1.0, 0.3],
            [1.0, 0.1],
            [0.0, 1.0],
            [0.2, 1.0],
            [5.0, 5.0],
        ];
        (x, array![0, 0, 0, 1, 1, NOISE])
    }

    #[test]
    fn test_select_orders_by_similarity() {
        let (x, labels) = fixture();
        let centers = Centers::Dense(array![[1.0, 0.0], [0.0, 1.0]]);

        let reps = select(&x, &labels, &centers, 2, NOISE).unwrap();

        assert_eq!(reps[&0], vec![0, 2]);
        assert_eq!(reps[&1], vec![3, 4]);
        assert!(!reps.contains_key(&NOISE));
    }

    #[test]
    fn test_select_members_only() {
        let (x, labels) = fixture();
        let centers = Centers::Dense(array![[1.0, 0.0], [0.0, 1.0]]);

        let reps = select(&x, &labels, &centers, 10, NOISE).unwrap();

        assert_eq!(reps[&0].len(), 3);
        assert_eq!(reps[&1].len(), 2);
        for (&cluster_id, rows) in &reps {
            assert!(rows.iter().all(|&row| labels[row] == cluster_id));
        }
    }

    #[test]
    fn test_select_missing_center_is_empty() {
        let (x, _) = fixture();
        let labels = array![4, 4, 4, 7, 7, NOISE];
        let mut map = BTreeMap::new();
        map.insert(4, array![1.0, 0.1]);
        let centers = Centers::Sparse(map);

        let reps = select(&x, &labels, &centers, 5, NOISE).unwrap();

        assert_eq!(reps[&4], vec![2, 0, 1]);
        assert_eq!(reps[&7], Vec::<usize>::new());
    }

    #[test]
    fn test_select_ties_keep_row_order() {
        let x = array![[1.0, 1.0], [0.0, 5.0], [1.0, 1.0]];
        let labels = array![0, 0, 0];
        let centers = Centers::Dense(array![[1.0, 1.0]]);

        let reps = select(&x, &labels, &centers, 3, NOISE).unwrap();
        assert_eq!(reps[&0], vec![0, 2, 1]);
    }

    #[test]
    fn test_select_shape_mismatch() {
        let (x, _) = fixture();
        let centers = Centers::Dense(array![[1.0, 0.0]]);
        assert!(select(&x, &array![0, 0], &centers, 1, NOISE).is_err());
    }
}
