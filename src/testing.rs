//! Seeded fixtures shared by unit tests.

use crate::Matrix;
use ndarray::{Array1, Axis, concatenate};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Normal;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Gaussian blobs: `per_blob` rows around each center value, repeated across all `dim` axes.
pub(crate) fn blobs(centers: &[f64], per_blob: usize, dim: usize, sigma: f64, seed: u64) -> Matrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).unwrap();

    let parts: Vec<Matrix> = centers
        .iter()
        .map(|&c| Matrix::random_using((per_blob, dim), noise, &mut rng) + c)
        .collect();
    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();

    concatenate(Axis(0), &views).unwrap()
}

/// Gaussian blobs around `scale · e_i`, one axis per blob, so each blob owns its own direction.
pub(crate) fn axis_blobs(
    n_blobs: usize,
    per_blob: usize,
    dim: usize,
    scale: f64,
    sigma: f64,
    seed: u64,
) -> Matrix {
    let mut x = blobs(&vec![0.0; n_blobs], per_blob, dim, sigma, seed);
    for (i, mut row) in x.outer_iter_mut().enumerate() {
        row[i / per_blob] += scale;
    }
    x
}

/// Ground-truth labels matching [`blobs`] and [`axis_blobs`].
pub(crate) fn blob_labels(n_blobs: usize, per_blob: usize) -> Array1<i64> {
    (0..n_blobs * per_blob)
        .map(|i| (i / per_blob) as i64)
        .collect()
}
