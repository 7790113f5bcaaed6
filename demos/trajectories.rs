use std::time::Instant;

use lpqtree::{LpqTree, MetricKind, PointSet, TreeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const STEPS: usize = 32;
const COUNT: usize = 50_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize Rayon explicitly so thread creation happens before timing.
    rayon::ThreadPoolBuilder::new().build_global()?;

    // Bundles of similar trajectories: a few seed paths, each copied with noise
    let mut rng = StdRng::seed_from_u64(17);
    let mut coords = Vec::with_capacity(COUNT * STEPS * 3);
    let seeds: Vec<[f64; 6]> = (0..200)
        .map(|_| {
            [
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ]
        })
        .collect();
    for i in 0..COUNT {
        let [x, y, z, vx, vy, vz] = seeds[i % seeds.len()];
        for step in 0..STEPS {
            let t = step as f64;
            coords.push(x + vx * t + rng.gen_range(-0.5..0.5));
            coords.push(y + vy * t + rng.gen_range(-0.5..0.5));
            coords.push(z + vz * t + rng.gen_range(-0.5..0.5));
        }
    }
    let dim = STEPS * 3;
    let queries = coords[..1000 * dim].to_vec();
    let radius = 40.0;

    let config = TreeConfig::new(MetricKind::L21).with_leaf_size(16);

    let start = Instant::now();
    let mut plain = LpqTree::new(config)?;
    let exact = plain.fit_and_radius_search(PointSet::new(coords.clone(), dim, 3)?, &queries, radius, 0, None)?;
    println!("full-resolution search: {} matches in {:.2?}", exact.nnz(), start.elapsed());

    for group_count in [2, 4, 8] {
        let start = Instant::now();
        let mut two_level = LpqTree::new(config)?;
        let found = two_level.fit_and_radius_search(
            PointSet::new(coords.clone(), dim, 3)?,
            &queries,
            radius,
            0,
            Some(group_count),
        )?;
        println!(
            "two-level search, {} mean groups: {} matches in {:.2?}",
            group_count,
            found.nnz(),
            start.elapsed()
        );
        assert_eq!(found.nnz(), exact.nnz());
    }

    Ok(())
}
