use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use flandmark::model::{AppearanceSpec, EdgeSpec, NodeSpec};
use flandmark::{
    AppearanceKind, BoundingBox, Detector, FeatureMap, Flandmark, HogFeatureMap, ImageData,
    Model, Position, SearchSpace, SparseLbpFeatureMap,
};

const FRAME: u32 = 40;
const WINDOW: u32 = 10;

fn random_pixels(rng: &mut StdRng, width: u32, height: u32) -> Vec<u8> {
    (0..width * height).map(|_| rng.gen()).collect()
}

fn random_weights(rng: &mut StdRng, dimension: usize) -> Vec<f64> {
    (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Star-shaped face model: a nose landmark with six children spread around it.
fn synthetic_model(kind: AppearanceKind) -> Model {
    let mut rng = StdRng::seed_from_u64(17);
    let dimension = kind.dimension(WINDOW, WINDOW).unwrap();
    let centers = [(20, 20), (12, 14), (28, 14), (9, 13), (31, 13), (14, 28), (26, 28)];

    let nodes = centers
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| NodeSpec {
            name: format!("S{}", i),
            search_space: SearchSpace::new(x - 3, y - 3, x + 3, y + 3).unwrap(),
            window_size: (WINDOW, WINDOW),
            appearances: vec![AppearanceSpec {
                kind,
                loss: None,
                w: random_weights(&mut rng, dimension),
            }],
        })
        .collect();
    let edges = (1..centers.len())
        .map(|child| EdgeSpec {
            parent: 0,
            child,
            dimension: 4,
            loss: None,
            w: vec![0.0, 0.0, -0.05, -0.05],
        })
        .collect();

    Model::new("synthetic", (FRAME, FRAME), (1.2, 1.2), nodes, edges).unwrap()
}

fn windows() -> Vec<Position> {
    SearchSpace::new(8, 8, 22, 22)
        .unwrap()
        .positions()
        .map(|p| Position::new(p.x - WINDOW as i32 / 2, p.y - WINDOW as i32 / 2))
        .collect()
}

fn bench_features(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);
    let pixels = random_pixels(&mut rng, FRAME, FRAME);
    let image = ImageData::new(&pixels, FRAME, FRAME);
    let windows = windows();

    let mut hog = HogFeatureMap::new(WINDOW, WINDOW, 9, 4, 2, windows.len()).unwrap();
    c.bench_function("features_hog", |b| {
        b.iter(|| hog.compute(black_box(&image), &windows))
    });

    let mut lbp = SparseLbpFeatureMap::new(WINDOW, WINDOW, 4, windows.len()).unwrap();
    c.bench_function("features_sparse_lbp", |b| {
        b.iter(|| lbp.compute(black_box(&image), &windows))
    });

    let w = random_weights(&mut rng, lbp.dimension());
    let mut q = vec![0.0; windows.len()];
    c.bench_function("features_sparse_lbp_dot_product", |b| {
        b.iter(|| lbp.dot_product_with_wq(black_box(&w), &mut q))
    });
}

fn bench_solver(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(5);
    let pixels = random_pixels(&mut rng, FRAME, FRAME);
    let frame = ImageData::new(&pixels, FRAME, FRAME);

    let mut group = c.benchmark_group("detect_base");
    for distance_transform in [false, true] {
        let mut detector = Flandmark::new(synthetic_model(AppearanceKind::SparseLbp {
            height_of_pyramid: 4,
        }))
        .unwrap();
        detector.set_distance_transform(distance_transform);
        group.bench_with_input(
            BenchmarkId::new("distance_transform", distance_transform),
            &frame,
            |b, frame| b.iter(|| detector.detect_base(frame, None).map(|p| p.len())),
        );
    }
    group.finish();
}

fn detect_single_face(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let (width, height) = (320, 240);
    let pixels = random_pixels(&mut rng, width, height);
    let image = ImageData::new(&pixels, width, height);
    let face = BoundingBox::new(100, 60, 220, 180);

    let mut group = c.benchmark_group("detect_single_face");
    // Limit the measurement time to make sure the benchmark finishes in a feasible amount of time.
    group.measurement_time(Duration::from_secs(20)).sample_size(20);

    let kinds = [
        AppearanceKind::SparseLbp {
            height_of_pyramid: 4,
        },
        AppearanceKind::Hog {
            n_bins: 9,
            cell_size: 4,
            block_size: 2,
        },
    ];
    for kind in kinds {
        let mut detector = flandmark::create_detector_with_model(synthetic_model(kind)).unwrap();
        group.bench_function(kind.name(), |b| {
            b.iter(|| detector.detect(black_box(&image), &face))
        });
    }
    group.finish();
}

criterion_group!(features, bench_features);
criterion_group!(solver, bench_solver);
criterion_group!(detection_perf, detect_single_face);
criterion_main!(features, solver, detection_perf);
