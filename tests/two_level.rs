use lpqtree::{KdIndex, LpqError, LpqTree, MetricKind, PointSet, TreeConfig, mean_points};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Smooth random walks of `steps` 3-D positions, flattened into one row each.
fn trajectories(rng: &mut StdRng, count: usize, steps: usize) -> Vec<f64> {
    let mut coords = Vec::with_capacity(count * steps * 3);
    for _ in 0..count {
        let mut position = [rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0)];
        let heading = [rng.gen_range(-0.3..0.3), rng.gen_range(-0.3..0.3), rng.gen_range(-0.3..0.3)];
        for _ in 0..steps {
            for axis in 0..3 {
                position[axis] += heading[axis] + rng.gen_range(-0.05..0.05);
            }
            coords.extend_from_slice(&position);
        }
    }
    coords
}

/// Copies of the first `count` rows, each coordinate jittered slightly.
fn perturbed(rng: &mut StdRng, coords: &[f64], dim: usize, count: usize) -> Vec<f64> {
    coords[..count * dim]
        .iter()
        .map(|&v| v + rng.gen_range(-0.05..0.05))
        .collect()
}

fn brute_force(full: &PointSet, queries: &[f64], radius: f64, metric: MetricKind) -> Vec<Vec<usize>> {
    queries
        .chunks(full.dim())
        .map(|q| {
            (0..full.rows())
                .filter(|&i| metric.distance(q, full.row(i), full.group_width()) <= radius)
                .collect()
        })
        .collect()
}

#[test]
fn test_two_level_matches_exact_search() {
    let mut rng = StdRng::seed_from_u64(2024);
    let steps = 12;
    let dim = steps * 3;
    let coords = trajectories(&mut rng, 300, steps);
    let queries = perturbed(&mut rng, &coords, dim, 30);
    let group_count = 4;

    for (metric, radius) in [
        (MetricKind::L1, 9.0),
        (MetricKind::L2, 2.5),
        (MetricKind::L11, 9.0),
        (MetricKind::L21, 6.0),
    ] {
        let full = PointSet::new(coords.clone(), dim, 3).unwrap();
        let expected = brute_force(&full, &queries, radius, metric);
        assert!(expected.iter().any(|row| !row.is_empty()), "{metric}: no matches at all");

        let means = mean_points(full.coords(), dim, 3, group_count).unwrap();
        let coarse = KdIndex::build(PointSet::new(means, group_count * 3, 3).unwrap(), 8, metric).unwrap();
        for threads in [1, 3] {
            let mut adj = coarse
                .radius_search_full(&full, &queries, radius, group_count, threads)
                .unwrap();
            adj.sort_rows();
            for (i, want) in expected.iter().enumerate() {
                let (cols, dists) = adj.row(i);
                let mut got = cols.to_vec();
                got.sort_unstable();
                assert_eq!(&got, want, "{metric}, threads = {threads}, row {i}");
                assert!(dists.iter().all(|&d| d <= radius));
            }
        }
    }
}

#[test]
fn test_fit_and_radius_search_agrees_with_plain_search() {
    let mut rng = StdRng::seed_from_u64(99);
    let coords = trajectories(&mut rng, 200, 8);
    let queries = perturbed(&mut rng, &coords, 24, 20);
    let config = TreeConfig::new(MetricKind::L21).with_leaf_size(4);

    let mut plain = LpqTree::new(config).unwrap();
    let mut expected = plain
        .fit_and_radius_search(PointSet::new(coords.clone(), 24, 3).unwrap(), &queries, 4.0, 2, None)
        .unwrap();
    expected.sort_rows();

    let mut two_level = LpqTree::new(config).unwrap();
    let mut actual = two_level
        .fit_and_radius_search(PointSet::new(coords, 24, 3).unwrap(), &queries, 4.0, 2, Some(2))
        .unwrap();
    actual.sort_rows();

    assert_eq!(actual.row_ptr(), expected.row_ptr());
    assert_eq!(actual.cols(), expected.cols());
    for (a, b) in actual.dists().iter().zip(expected.dists()) {
        assert!((a - b).abs() < 1e-9);
    }
    assert_eq!(two_level.data().unwrap().dim(), 6);
}

#[test]
fn test_two_level_keeps_points_at_exact_radius() {
    let mut rng = StdRng::seed_from_u64(5);
    let coords = trajectories(&mut rng, 400, 4);
    let full = PointSet::new(coords, 12, 3).unwrap();
    let means = mean_points(full.coords(), 12, 3, 2).unwrap();
    let coarse = KdIndex::build(PointSet::new(means, 6, 3).unwrap(), 4, MetricKind::L2).unwrap();

    let query = [0.0; 12];
    for i in 0..full.rows() {
        let radius = MetricKind::L2.distance(&query, full.row(i), 3);
        let adj = coarse.radius_search_full(&full, &query, radius, 2, 1).unwrap();
        assert!(adj.cols().contains(&i), "point {i} missed at radius {radius}");
    }
}

#[test]
fn test_two_level_rejects_l22() {
    let mut tree = LpqTree::new(TreeConfig::new(MetricKind::L22)).unwrap();
    tree.fit(PointSet::new(vec![1.0; 12], 6, 3).unwrap()).unwrap();

    let full = PointSet::new(vec![0.0; 12], 6, 3).unwrap();
    assert!(matches!(
        tree.fit_and_radius_search(full, &[0.0; 6], 1.0, 1, Some(1)),
        Err(LpqError::UnsupportedMetric(_))
    ));
    // A rejected call leaves the fitted index in place.
    assert_eq!(tree.index().unwrap().dim(), 6);
    assert_eq!(tree.data().unwrap().row(0), &[1.0; 6]);
}

#[test]
fn test_failed_fit_and_search_keeps_index() {
    let mut tree = LpqTree::new(TreeConfig::new(MetricKind::L21)).unwrap();
    tree.fit(PointSet::new(vec![1.0; 12], 6, 3).unwrap()).unwrap();

    let full = PointSet::new(vec![0.0; 24], 12, 3).unwrap();
    assert!(matches!(
        tree.fit_and_radius_search(full.clone(), &[0.0; 12], -1.0, 1, Some(2)),
        Err(LpqError::InvalidConfig(_))
    ));
    assert!(matches!(
        tree.fit_and_radius_search(full.clone(), &[0.0; 12], 1.0, 1, Some(3)),
        Err(LpqError::InvalidDimension(_))
    ));
    assert!(matches!(
        tree.fit_and_radius_search(full, &[0.0; 5], 1.0, 1, None),
        Err(LpqError::InvalidDimension(_))
    ));
    assert_eq!(tree.index().unwrap().dim(), 6);
}

#[test]
fn test_two_level_checks_full_rows() {
    let full = PointSet::new(vec![0.0; 12], 6, 3).unwrap();
    let means = mean_points(full.coords(), 6, 3, 1).unwrap();
    let coarse = KdIndex::build(PointSet::new(means, 3, 3).unwrap(), 2, MetricKind::L21).unwrap();

    let other = PointSet::new(vec![0.0; 18], 6, 3).unwrap();
    assert!(matches!(
        coarse.radius_search_full(&other, &[0.0; 6], 1.0, 1, 1),
        Err(LpqError::InvalidDimension(_))
    ));
    assert!(matches!(
        coarse.radius_search_full(&full, &[0.0; 6], -1.0, 1, 1),
        Err(LpqError::InvalidConfig(_))
    ));
    let adj = coarse.radius_search_full(&full, &[], 1.0, 1, 4).unwrap();
    assert_eq!(adj.row_ptr(), &[0]);
}
