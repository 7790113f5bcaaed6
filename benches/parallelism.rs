use criterion::{criterion_group, Criterion, BenchmarkId};
use lpqtree::{KdIndex, MetricKind, PointSet, mean_points};
use plotters::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::Command;

#[derive(Deserialize)]
struct Estimates {
    mean: Stats,
}

#[derive(Deserialize)]
struct Stats {
    point_estimate: f64,
    confidence_interval: ConfidenceInterval,
}

#[derive(Deserialize)]
struct ConfidenceInterval {
    lower_bound: f64,
    upper_bound: f64,
}

const N_POINTS: usize = 100_000;
const N_QUERIES: usize = 20_000;
// Streamline-like points: 12 positions of 3 coordinates each
const STEPS: usize = 12;
const DIM: usize = STEPS * 3;
const GROUP_COUNT: usize = 4;

fn cores_list() -> Vec<usize> {
    let max_cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(8);
    let mut cores_list = Vec::new();
    let mut cores = 1;
    while cores <= max_cores {
        cores_list.push(cores);
        cores *= 2;
    }
    if cores_list.last().map_or(false, |&last| last < max_cores) {
        cores_list.push(max_cores);
    }
    cores_list
}

fn streamlines(rng: &mut StdRng, count: usize) -> Vec<f64> {
    let mut coords = Vec::with_capacity(count * DIM);
    for _ in 0..count {
        let mut p = [rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)];
        let v = [rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0)];
        for _ in 0..STEPS {
            for axis in 0..3 {
                p[axis] += v[axis];
            }
            coords.extend_from_slice(&p);
        }
    }
    coords
}

fn benchmark_parallelism(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let coords = streamlines(&mut rng, N_POINTS);
    let queries = streamlines(&mut rng, N_QUERIES);

    let full = PointSet::new(coords, DIM, 3).unwrap();
    let index = KdIndex::build(full.clone(), 16, MetricKind::L21).unwrap();
    let means = mean_points(full.coords(), DIM, 3, GROUP_COUNT).unwrap();
    let coarse = KdIndex::build(PointSet::new(means, GROUP_COUNT * 3, 3).unwrap(), 16, MetricKind::L21).unwrap();

    let mut group = c.benchmark_group(format!("parallelism_{}k", N_POINTS / 1000));
    group.sample_size(10);

    for &num_threads in &cores_list() {
        // Create a thread pool for this specific number of threads
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .unwrap();

        group.bench_with_input(BenchmarkId::new("radius", num_threads), &num_threads, |b, &_s| {
            b.iter(|| pool.install(|| index.radius_search_batch(&queries, 60.0, 0).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("knn", num_threads), &num_threads, |b, &_s| {
            b.iter(|| pool.install(|| index.knn_search_batch(&queries, 10, 0).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("two_level", num_threads), &num_threads, |b, &_s| {
            b.iter(|| {
                pool.install(|| {
                    coarse
                        .radius_search_full(&full, &queries, 60.0, GROUP_COUNT, 0)
                        .unwrap()
                })
            })
        });
    }
    group.finish();
}

/// Mean time of one method at one core count, with criterion's 95% interval.
struct Sample {
    cores: usize,
    mean: f64,
    lower: f64,
    upper: f64,
}

fn read_samples(group_dir: &Path, method: &str, cores: &[usize]) -> Result<Vec<Sample>, Box<dyn std::error::Error>> {
    let mut samples = Vec::new();
    for &n in cores {
        let path = group_dir.join(method).join(n.to_string()).join("base/estimates.json");
        if !path.exists() {
            continue;
        }
        let estimates: Estimates = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        let mean = estimates.mean;
        samples.push(Sample {
            cores: n,
            mean: mean.point_estimate,
            lower: mean.confidence_interval.lower_bound,
            upper: mean.confidence_interval.upper_bound,
        });
    }
    Ok(samples)
}

/// Speedup over the single-core run as `(cores, speedup, low, high)`.
///
/// The slow end of the interval gives the low speedup. Empty when the
/// single-core run is missing.
fn speedups(samples: &[Sample]) -> Vec<(f64, f64, f64, f64)> {
    let Some(base) = samples.iter().find(|s| s.cores == 1) else {
        return Vec::new();
    };
    samples
        .iter()
        .map(|s| (s.cores as f64, base.mean / s.mean, base.mean / s.upper, base.mean / s.lower))
        .collect()
}

fn commit_tag() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn plot_speedup() -> Result<(), Box<dyn std::error::Error>> {
    let group_dir = format!("target/criterion/parallelism_{}k", N_POINTS / 1000);
    let group_dir = Path::new(&group_dir);
    if !group_dir.exists() {
        return Ok(());
    }

    let cores = cores_list();
    let mut curves = BTreeMap::new();
    for method in ["radius", "knn", "two_level"] {
        let samples = read_samples(group_dir, method, &cores)?;
        println!("{method}:");
        for s in &samples {
            println!("  {:>3} cores  {:>10.2} ms", s.cores, s.mean / 1e6);
        }
        let curve = speedups(&samples);
        for &(n, speedup, _, _) in &curve {
            println!("  {n:>3} cores  speedup {speedup:.2}x  efficiency {:.0}%", 100.0 * speedup / n);
        }
        if !curve.is_empty() {
            curves.insert(method, curve);
        }
    }
    if curves.is_empty() {
        return Ok(());
    }

    let max_cores = cores.iter().copied().max().unwrap_or(1).max(2) as f64;
    let top = curves
        .values()
        .flatten()
        .map(|p| p.3)
        .fold(max_cores, f64::max);

    let out_dir = Path::new("benches/results");
    std::fs::create_dir_all(out_dir)?;
    let out_file = out_dir.join(format!("speedup_{}k_{}.png", N_POINTS / 1000, commit_tag()));
    let area = BitMapBackend::new(&out_file, (900, 900)).into_drawing_area();
    area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&area)
        .caption(
            format!("Speedup, {N_POINTS} streamlines x {N_QUERIES} queries"),
            ("sans-serif", 32).into_font(),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(1.0..max_cores, 0.0..top * 1.05)?;
    chart
        .configure_mesh()
        .x_desc("Threads")
        .y_desc("Speedup over 1 thread")
        .draw()?;

    chart
        .draw_series(LineSeries::new([(1.0, 1.0), (max_cores, max_cores)], BLACK.mix(0.4)))?
        .label("linear")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.mix(0.4)));

    let palette = [RED, BLUE, GREEN];
    for ((method, curve), color) in curves.iter().zip(palette.iter().cycle()) {
        let color = *color;
        for &(n, _, low, high) in curve {
            chart.draw_series(std::iter::once(PathElement::new(vec![(n, low), (n, high)], color.stroke_width(2))))?;
        }
        chart
            .draw_series(LineSeries::new(curve.iter().map(|p| (p.0, p.1)), color.stroke_width(2)))?
            .label(*method)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        chart.draw_series(curve.iter().map(|p| Cross::new((p.0, p.1), 4, color)))?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .border_style(BLACK)
        .draw()?;

    println!("speedup plot written to {}", out_file.display());
    Ok(())
}

criterion_group!(benches, benchmark_parallelism);

fn main() {
    benches();
    if let Err(e) = plot_speedup() {
        eprintln!("speedup plot failed: {e}");
    }
}
