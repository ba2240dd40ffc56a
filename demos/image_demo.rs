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

use std::env::Args;
use std::time::Duration;

use image::{DynamicImage, Rgb};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use flandmark::{BoundingBox, ImageData};

const OUTPUT_FILE: &str = "landmarks.png";

fn main() {
    env_logger::init();

    let options = match Options::parse(std::env::args()) {
        Ok(options) => options,
        Err(message) => {
            println!("Failed to parse program arguments: {}", message);
            std::process::exit(1)
        }
    };

    let mut detector = match flandmark::create_detector(options.model_path()) {
        Ok(detector) => detector,
        Err(error) => {
            println!("Failed to create detector: {}", error);
            std::process::exit(1)
        }
    };

    let image: DynamicImage = match image::open(options.image_path()) {
        Ok(image) => image,
        Err(message) => {
            println!("Failed to read image: {}", message);
            std::process::exit(1)
        }
    };

    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let bbox = options.bbox();

    let landmarks = {
        let image = ImageData::new(gray.as_raw(), width, height);
        let result = if options.mirrored {
            detector.detect_mirrored(&image, &bbox)
        } else {
            detector.detect(&image, &bbox)
        };
        match result {
            Ok(landmarks) => landmarks,
            Err(error) => {
                println!("Failed to detect landmarks: {}", error);
                std::process::exit(1)
            }
        }
    };

    let timings = detector.timings();
    println!(
        "Found {} landmarks in {} ms (normalization {} ms, features {} ms, max-sum {} ms)",
        landmarks.len(),
        get_millis(timings.overall),
        get_millis(timings.normalized_frame),
        get_millis(timings.features),
        get_millis(timings.maxsum)
    );

    let mut rgb = image.to_rgb8();
    let rect = Rect::at(bbox.min_x(), bbox.min_y()).of_size(
        (bbox.max_x() - bbox.min_x()) as u32,
        (bbox.max_y() - bbox.min_y()) as u32,
    );
    draw_hollow_rect_mut(&mut rgb, rect, Rgb([255, 0, 0]));

    for (i, landmark) in landmarks.iter().enumerate() {
        println!("landmark {}: ({:.1}, {:.1})", i, landmark.x, landmark.y);
        let center = (landmark.x.round() as i32, landmark.y.round() as i32);
        let color = if i == 0 { Rgb([0, 0, 255]) } else { Rgb([0, 255, 0]) };
        draw_filled_circle_mut(&mut rgb, center, 2, color);
    }

    match rgb.save(OUTPUT_FILE) {
        Ok(_) => println!("Saved result to {}", OUTPUT_FILE),
        Err(message) => println!("Failed to save result to a file. Reason: {}", message),
    }
}

fn get_millis(duration: Duration) -> u128 {
    duration.as_millis()
}

struct Options {
    image_path: String,
    model_path: String,
    bbox: [i32; 4],
    mirrored: bool,
}

impl Options {
    fn parse(args: Args) -> Result<Self, String> {
        let args: Vec<String> = args.collect();
        let program = args.first().map(String::as_str).unwrap_or("image_demo");
        let usage = format!(
            "Usage: {} <model-path> <image-path> <min-x> <min-y> <max-x> <max-y> [--mirrored]",
            program
        );

        if args.len() != 7 && args.len() != 8 {
            return Err(usage);
        }
        let mirrored = match args.get(7).map(String::as_str) {
            None => false,
            Some("--mirrored") => true,
            Some(_) => return Err(usage),
        };

        let mut bbox = [0; 4];
        for (value, arg) in bbox.iter_mut().zip(&args[3..7]) {
            *value = arg
                .parse()
                .map_err(|e| format!("Illegal bounding box coordinate '{}': {}", arg, e))?;
        }

        Ok(Options {
            model_path: args[1].clone(),
            image_path: args[2].clone(),
            bbox,
            mirrored,
        })
    }

    fn image_path(&self) -> &str {
        &self.image_path[..]
    }

    fn model_path(&self) -> &str {
        &self.model_path[..]
    }

    fn bbox(&self) -> BoundingBox {
        let [min_x, min_y, max_x, max_y] = self.bbox;
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }
}
