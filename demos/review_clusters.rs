use clusterscope::analysis::analyze;
use clusterscope::cluster::{fit, ClusterParams};
use clusterscope::config::AnalysisConfig;
use clusterscope::insights::{cluster_priority, group_cluster_share};
use clusterscope::Matrix;
use ndarray::{concatenate, Axis};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

type Reviews = (Matrix, Vec<f64>, Vec<&'static str>);

/// Stand-in for sentence embeddings: four topics, each a Gaussian around its own direction.
fn synthetic_embeddings(rng: &mut ChaCha8Rng) -> Result<Reviews, Box<dyn std::error::Error>> {
    let topics = [
        (0.0, 80, 4.2, "B00A"),
        (2.5, 60, 1.6, "B00B"),
        (-2.5, 50, 2.4, "B00A"),
        (5.0, 30, 3.8, "B00C"),
    ];
    let dim = 16;
    let noise = Normal::new(0.0, 0.6)?;

    let mut parts = Vec::new();
    let mut stars = Vec::new();
    let mut asins = Vec::new();
    for &(center, count, mean_star, asin) in &topics {
        parts.push(Matrix::random_using((count, dim), noise, rng) + center);
        for _ in 0..count {
            let star: f64 = mean_star + rng.gen_range(-1.0..1.0);
            stars.push(star.round().clamp(1.0, 5.0));
            asins.push(asin);
        }
    }

    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
    Ok((concatenate(Axis(0), &views)?, stars, asins))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let (embeddings, stars, asins) = synthetic_embeddings(&mut rng)?;
    println!(
        "Embeddings: {} reviews, {} dimensions\n",
        embeddings.nrows(),
        embeddings.ncols()
    );

    let config = AnalysisConfig {
        k_min: 2,
        k_max: 8,
        ..Default::default()
    };
    let progress = |done: usize, total: usize, msg: &str| println!("[{}/{}] {}", done, total, msg);
    let analysis = analyze(&embeddings, &config, &progress)?;

    println!("\n=== K scan ===");
    println!("{:>3} {:>12} {:>10} {:>12} {:>8}", "k", "inertia", "silhouette", "CH", "DB");
    for k in analysis.scan.ks() {
        println!(
            "{:>3} {:>12.2} {:>10.4} {:>12.2} {:>8.4}",
            k,
            analysis.scan.k_to_inertia[&k],
            analysis.scan.k_to_silhouette[&k],
            analysis.scan.k_to_calinski_harabasz[&k],
            analysis.scan.k_to_davies_bouldin[&k],
        );
    }

    let rec = &analysis.recommendation;
    println!("\nRecommended k={} ({})", rec.best_k, rec.method);

    println!("\n=== Final clustering ===");
    match &analysis.evaluation.silhouette {
        Ok(score) => println!("Silhouette: {:.4}", score),
        Err(reason) => println!("Silhouette: {}", reason),
    }
    match (analysis.stability.ari_mean, analysis.stability.ari_min, analysis.stability.ari_max) {
        (Some(mean), Some(min), Some(max)) => println!(
            "Bootstrap ARI over {} runs: mean {:.3} (min {:.3}, max {:.3})",
            analysis.stability.runs, mean, min, max
        ),
        _ => println!("Bootstrap ARI: not enough usable runs"),
    }

    for (cluster_id, rows) in &analysis.representatives {
        println!("  cluster {}: representative rows {:?}", cluster_id, rows);
    }

    println!("\n=== Priority (ratio × (5 − mean star)) ===");
    for p in cluster_priority(&analysis.clustering.labels, &stars)? {
        println!(
            "  cluster {:>2}: size {:>3}, mean star {:.2}, priority {:.3}",
            p.cluster_id, p.cluster_size, p.mean_star, p.priority_score
        );
    }

    println!("\n=== ASIN × cluster (% within ASIN) ===");
    for (asin, row) in group_cluster_share(&asins, &analysis.clustering.labels)? {
        let cells: Vec<String> = row.iter().map(|(c, pct)| format!("{}:{:.0}%", c, pct)).collect();
        println!("  {} {}", asin, cells.join("  "));
    }

    println!("\n=== Alternative methods ===");
    let density = ClusterParams {
        eps: Some(3.0),
        min_samples: Some(5),
        ..Default::default()
    };
    let result = fit(&embeddings, "dbscan", &density, config.random_state)?;
    println!(
        "DBSCAN: {} clusters, {} noise rows ({:.1}%)",
        result.n_clusters,
        result.noise_count,
        100.0 * result.noise_ratio
    );

    let hierarchical = ClusterParams {
        n_clusters: Some(rec.best_k),
        linkage: Some("average".to_string()),
        metric: Some("cosine".to_string()),
        ..Default::default()
    };
    let result = fit(&embeddings, "hierarchical", &hierarchical, config.random_state)?;
    println!(
        "Agglomerative (average, cosine): {} clusters in {:?}",
        result.n_clusters, result.runtime
    );

    Ok(())
}
