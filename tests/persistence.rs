use std::path::PathBuf;

use lpqtree::{KdIndex, LpqError, LpqTree, MetricKind, PointSet, TreeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("lpqtree-{}-{}.bin", name, std::process::id()))
}

fn random_coords(seed: u64, rows: usize, dim: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows * dim).map(|_| rng.gen_range(0.0..10.0)).collect()
}

#[test]
fn test_save_load_round_trip() {
    let coords = random_coords(1, 1000, 6);
    let queries = random_coords(2, 50, 6);
    let path = temp_path("round-trip");

    let mut tree = LpqTree::new(TreeConfig::new(MetricKind::L21).with_leaf_size(16)).unwrap();
    tree.fit(PointSet::new(coords.clone(), 6, 3).unwrap()).unwrap();
    let written = tree.save_index(&path).unwrap();
    assert_eq!(written, std::fs::metadata(&path).unwrap().len());

    let mut restored = LpqTree::new(TreeConfig::new(MetricKind::L21)).unwrap();
    restored.load_index(&path, coords).unwrap();
    std::fs::remove_file(&path).unwrap();

    let before = tree.index().unwrap();
    let after = restored.index().unwrap();
    assert_eq!(after.node_count(), before.node_count());
    assert_eq!(after.group_width(), 3);
    assert_eq!(after.leaf_size(), 16);
    assert_eq!(restored.config().leaf_size, 16);

    let expected = tree.radius_search(&queries, 6.0, 2).unwrap();
    let actual = restored.radius_search(&queries, 6.0, 2).unwrap();
    assert!(expected.nnz() > 0);
    assert_eq!(actual, expected);
    assert_eq!(
        restored.knn_search(&queries, 4, 1).unwrap(),
        tree.knn_search(&queries, 4, 1).unwrap()
    );
}

#[test]
fn test_load_rejects_other_points() {
    let coords = random_coords(5, 64, 2);
    let index = KdIndex::build(PointSet::new(coords.clone(), 2, 1).unwrap(), 4, MetricKind::L1).unwrap();
    let mut bytes = Vec::new();
    index.save_to_writer(&mut bytes).unwrap();

    assert!(matches!(
        KdIndex::load_from_reader(&bytes[..], coords[..126].to_vec()),
        Err(LpqError::InvalidDimension(_))
    ));

    let mut corrupted = bytes.clone();
    let last = corrupted.len() - 5;
    corrupted[last] ^= 0x40;
    assert!(matches!(
        KdIndex::load_from_reader(&corrupted[..], coords.clone()),
        Err(LpqError::InvalidPersistence(_))
    ));

    assert!(matches!(
        KdIndex::load_from_reader(&bytes[..bytes.len() / 2], coords),
        Err(LpqError::Io(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let mut tree = LpqTree::new(TreeConfig::default()).unwrap();
    assert!(matches!(
        tree.load_index(temp_path("does-not-exist"), vec![0.0; 4]),
        Err(LpqError::Io(_))
    ));
    assert!(matches!(tree.save_index(temp_path("unfitted")), Err(LpqError::NotFitted)));
}
