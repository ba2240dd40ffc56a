// This file is part of flandmark-rs, a facial landmark detector implementing the method described in the following paper:
//
//      Detector of Facial Landmarks Learned by the Structured Output SVM,
//      Michal Uricar, Vojtech Franc, Vaclav Hlavac.
//      In VISAPP 2012.
//
// flandmark-rs is distributed under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use flandmark::model::{AppearanceSpec, EdgeSpec, NodeSpec};
use flandmark::{
    AppearanceKind, BoundingBox, Detector, Flandmark, GeneralBoundingBox, ImageData, LossKind,
    Model, Point, Position, SearchSpace,
};

const SIZE: u32 = 8;

/// Two landmarks on an 8x8 frame, both rewarding an isolated bright pixel, joined by an edge
/// that prefers the child to the right of its parent.
fn tiny_model() -> Model {
    let lbp = AppearanceKind::SparseLbp {
        height_of_pyramid: 1,
    };
    let mut w = vec![0.0; 256];
    w[0xff] = 1.0;

    let nodes = vec![
        NodeSpec {
            name: "left".to_string(),
            search_space: SearchSpace::new(2, 2, 4, 4).unwrap(),
            window_size: (3, 3),
            appearances: vec![AppearanceSpec {
                kind: lbp,
                loss: Some(LossKind::NormalizedEuclidean),
                w: w.clone(),
            }],
        },
        NodeSpec {
            name: "right".to_string(),
            search_space: SearchSpace::new(3, 3, 5, 5).unwrap(),
            window_size: (3, 3),
            appearances: vec![AppearanceSpec {
                kind: lbp,
                loss: Some(LossKind::NormalizedEuclidean),
                w,
            }],
        },
    ];
    let edges = vec![EdgeSpec {
        parent: 0,
        child: 1,
        dimension: 5,
        loss: None,
        w: vec![0.3, 0.0, -0.1, -0.1, 0.0],
    }];

    Model::new("tiny", (SIZE, SIZE), (1.0, 1.0), nodes, edges).unwrap()
}

fn tiny_image() -> Vec<u8> {
    let mut data = vec![10u8; (SIZE * SIZE) as usize];
    data[(3 * SIZE + 3) as usize] = 200;
    data[(4 * SIZE + 5) as usize] = 250;
    data
}

/// Crops the whole 8x8 image without resampling.
fn whole_frame_box() -> BoundingBox {
    BoundingBox::new(0, 0, SIZE as i32 - 2, SIZE as i32 - 2)
}

fn brute_force(detector: &Flandmark) -> (f64, Vec<Position>) {
    let w = detector.w();
    let left = SearchSpace::new(2, 2, 4, 4).unwrap();
    let right = SearchSpace::new(3, 3, 5, 5).unwrap();

    let mut best = (f64::NEG_INFINITY, vec![]);
    for p in left.positions() {
        for c in right.positions() {
            let psi = detector.psi(&[p, c]).unwrap();
            let score: f64 = w.iter().zip(psi.iter()).map(|(a, b)| a * b).sum();
            if score > best.0 {
                best = (score, vec![p, c]);
            }
        }
    }
    best
}

#[test]
fn test_detect_base_matches_brute_force() {
    let mut detector = Flandmark::new(tiny_model()).unwrap();
    let data = tiny_image();
    let frame = ImageData::new(&data, SIZE, SIZE);

    let positions = detector.detect_base(&frame, None).unwrap().to_vec();
    // both bright pixels: 1 + 1 + 0.3 * 2 - 0.1 * 4 - 0.1 * 1
    assert_eq!(vec![Position::new(3, 3), Position::new(5, 4)], positions);
    assert!((detector.score() - 2.1).abs() < 1e-9);

    let (score, configuration) = brute_force(&detector);
    assert!((score - detector.score()).abs() < 1e-9);
    assert_eq!(configuration, positions);
}

#[test]
fn test_distance_transform_agrees_with_exhaustive_search() {
    let mut detector = Flandmark::new(tiny_model()).unwrap();
    let data = tiny_image();
    let frame = ImageData::new(&data, SIZE, SIZE);

    let expected = detector.detect_base(&frame, None).unwrap().to_vec();
    let expected_score = detector.score();

    detector.set_distance_transform(true);
    let positions = detector.detect_base(&frame, None).unwrap().to_vec();
    assert_eq!(expected, positions);
    assert!((expected_score - detector.score()).abs() < 1e-9);
}

#[test]
fn test_detect_on_image() {
    let mut detector = flandmark::create_detector_with_model(tiny_model()).unwrap();
    assert_eq!(2, detector.landmarks_count());

    let data = tiny_image();
    let image = ImageData::new(&data, SIZE, SIZE);
    let landmarks = detector.detect(&image, &whole_frame_box()).unwrap();

    // 7x7 box: region starts at -0.5 and every frame pixel spans 7/8 image pixels
    let scale = 7.0 / 8.0;
    assert_eq!(
        vec![
            Point::new(3.0 * scale - 0.5, 3.0 * scale - 0.5),
            Point::new(5.0 * scale - 0.5, 4.0 * scale - 0.5),
        ],
        landmarks
    );
    assert!(detector.timings().overall >= detector.timings().maxsum);
}

#[test]
fn test_general_bbox_without_rotation_matches_detect() {
    let mut detector = Flandmark::new(tiny_model()).unwrap();
    let data = tiny_image();
    let image = ImageData::new(&data, SIZE, SIZE);

    let expected = detector.detect(&image, &whole_frame_box()).unwrap();
    let last = f64::from(SIZE - 2);
    let general = GeneralBoundingBox::new([
        Point::new(0.0, 0.0),
        Point::new(last, 0.0),
        Point::new(last, last),
        Point::new(0.0, last),
    ]);
    assert_eq!(expected, detector.detect_general_bbox(&image, &general).unwrap());
    assert_eq!(
        detector.detect_mirrored(&image, &whole_frame_box()).unwrap(),
        detector
            .detect_general_bbox_mirrored(&image, &general)
            .unwrap()
    );
}

#[test]
fn test_ground_truth_loss_pulls_landmarks_away() {
    let mut detector = Flandmark::new(tiny_model()).unwrap();
    let data = tiny_image();
    let frame = ImageData::new(&data, SIZE, SIZE);

    // a large loss factor outweighs the appearance scores
    detector.set_normalization_factor(10.0);
    let gt = [Position::new(3, 3), Position::new(5, 4)];
    let positions = detector.detect_base(&frame, Some(&gt)).unwrap().to_vec();
    assert_ne!(gt.to_vec(), positions);

    let without_loss = detector.detect_base(&frame, None).unwrap().to_vec();
    assert_eq!(gt.to_vec(), without_loss);
}

#[test]
fn test_create_detector_from_file() {
    let path = std::env::temp_dir().join(format!("flandmark-tiny-{}.bin", std::process::id()));
    flandmark::save_model(&tiny_model(), &path, true).unwrap();

    let mut detector = flandmark::create_detector(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let data = tiny_image();
    let image = ImageData::new(&data, SIZE, SIZE);
    let mut reference = Flandmark::new(tiny_model()).unwrap();
    assert_eq!(
        reference.detect(&image, &whole_frame_box()).unwrap(),
        detector.detect(&image, &whole_frame_box()).unwrap()
    );
}

#[test]
fn test_batch_detection() {
    let mut detector = Flandmark::new(tiny_model()).unwrap();
    let mut data = tiny_image();
    data.extend(tiny_image());
    // two copies of the face stacked vertically
    let image = ImageData::new(&data, SIZE, 2 * SIZE);
    let boxes = [
        whole_frame_box(),
        BoundingBox::new(0, SIZE as i32, SIZE as i32 - 2, 2 * SIZE as i32 - 2),
    ];

    let results: Vec<Vec<Point>> = detector
        .detect_batch(&image, &boxes)
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(detector.detect(&image, &boxes[0]).unwrap(), results[0]);
    assert_eq!(detector.detect(&image, &boxes[1]).unwrap(), results[1]);
    for (a, b) in results[0].iter().zip(results[1].iter()) {
        assert_eq!(a.x, b.x);
        assert!((b.y - a.y - f64::from(SIZE)).abs() < 1e-9);
    }
}
