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

use std::cmp;

/// Borrowed view of a row-major 8-bit image.
#[derive(Debug, Clone, Copy)]
pub struct ImageData<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    num_channels: u32,
}

impl<'a> ImageData<'a> {
    /// Gray-scale image of `width` x `height` pixels.
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Self {
        ImageData::with_channels(data, width, height, 1)
    }

    /// Interleaved image with `num_channels` bytes per pixel.
    ///
    /// Only gray-scale images are accepted by the detector; this constructor exists so that
    /// callers get a descriptive error instead of garbage landmarks.
    pub fn with_channels(data: &'a [u8], width: u32, height: u32, num_channels: u32) -> Self {
        ImageData {
            data,
            width,
            height,
            num_channels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn num_channels(&self) -> u32 {
        self.num_channels
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Pixel value, `None` outside of the image.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    #[inline]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

/// Owned gray-scale image, reused between detections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        ImageBuffer {
            data: vec![0; width as usize * height as usize],
            width,
            height,
        }
    }

    pub fn from_vec(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(ImageBuffer {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn as_image_data(&self) -> ImageData<'_> {
        ImageData::new(&self.data, self.width, self.height)
    }

    fn reshape(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.resize(width as usize * height as usize, 0);
    }

    /// Flips the image around its vertical axis.
    pub fn mirror_x(&mut self) {
        let width = self.width as usize;
        if width == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(width) {
            row.reverse();
        }
    }
}

/// Bilinear resize of `src` into `dest`, which is reshaped to `width` x `height`.
pub fn resize_image(src: &ImageData, dest: &mut ImageBuffer, width: u32, height: u32) {
    if src.width() == width && src.height() == height {
        dest.reshape(width, height);
        let len = dest.data.len();
        dest.data.copy_from_slice(&src.data()[..len]);
        return;
    }
    resample(dest, src.width(), src.height(), width, height, |x, y| {
        src.pixel(x, y)
    });
}

/// Bilinear resize of the `crop_width` x `crop_height` window at (`x`, `y`) of `src` into
/// `dest`, which is reshaped to `width` x `height`. The part of the window that lies outside
/// of the image reads as zeros; the window itself is never materialized.
///
/// Returns the number of window pixels outside of the image.
#[allow(clippy::too_many_arguments)]
pub fn crop_resize_image(
    src: &ImageData,
    dest: &mut ImageBuffer,
    x: i32,
    y: i32,
    crop_width: u32,
    crop_height: u32,
    width: u32,
    height: u32,
) -> u64 {
    resample(dest, crop_width, crop_height, width, height, |cx, cy| {
        let px = i32::try_from(i64::from(x) + i64::from(cx));
        let py = i32::try_from(i64::from(y) + i64::from(cy));
        match (px, py) {
            (Ok(px), Ok(py)) => src.get(px, py).unwrap_or(0),
            _ => 0,
        }
    });

    let overlap = |start: i32, len: u32, size: u32| {
        let start = i64::from(start);
        let end = (start + i64::from(len)).min(i64::from(size));
        (end - start.max(0)).max(0) as u64
    };
    let inside = overlap(x, crop_width, src.width()) * overlap(y, crop_height, src.height());
    u64::from(crop_width) * u64::from(crop_height) - inside
}

/// Bilinear resampling of a `src_width` x `src_height` source read through `at`.
fn resample<F>(
    dest: &mut ImageBuffer,
    src_width: u32,
    src_height: u32,
    width: u32,
    height: u32,
    at: F,
) where
    F: Fn(u32, u32) -> u8,
{
    dest.reshape(width, height);

    if src_width == 0 || src_height == 0 {
        dest.data.iter_mut().for_each(|p| *p = 0);
        return;
    }
    if src_width == width && src_height == height {
        for y in 0..height {
            for x in 0..width {
                dest.data[(y * width + x) as usize] = at(x, y);
            }
        }
        return;
    }

    let lf_x_scl = f64::from(src_width) / f64::from(width);
    let lf_y_scl = f64::from(src_height) / f64::from(height);

    for y in 0..height {
        for x in 0..width {
            let lf_x_s = lf_x_scl * f64::from(x);
            let lf_y_s = lf_y_scl * f64::from(y);

            let n_x_s = cmp::min(lf_x_s as u32, src_width - 1);
            let n_y_s = cmp::min(lf_y_s as u32, src_height - 1);
            let n_x_s1 = cmp::min(n_x_s + 1, src_width - 1);
            let n_y_s1 = cmp::min(n_y_s + 1, src_height - 1);

            let lf_weight_x = lf_x_s - f64::from(n_x_s);
            let lf_weight_y = lf_y_s - f64::from(n_y_s);

            let d1 = f64::from(at(n_x_s, n_y_s));
            let d2 = f64::from(at(n_x_s1, n_y_s));
            let d3 = f64::from(at(n_x_s, n_y_s1));
            let d4 = f64::from(at(n_x_s1, n_y_s1));

            let dest_val = (1.0 - lf_weight_y) * ((1.0 - lf_weight_x) * d1 + lf_weight_x * d2)
                + lf_weight_y * ((1.0 - lf_weight_x) * d3 + lf_weight_x * d4);

            dest.data[(y * width + x) as usize] =
                num::clamp((dest_val + 0.5).floor(), 0.0, 255.0) as u8;
        }
    }
}

/// Rotates `src` by `angle` radians around (`cx`, `cy`) with bilinear interpolation.
///
/// A point `p` of the source lands at `R(angle) * (p - c) + c` of the result, i.e. the
/// same convention used to rotate bounding box corners. Pixels mapped from outside of the
/// source are set to zero.
pub fn rotate_image(src: &ImageData, dest: &mut ImageBuffer, angle: f64, cx: f64, cy: f64) {
    dest.reshape(src.width(), src.height());

    let (sa, ca) = angle.sin_cos();

    for y in 0..src.height() {
        for x in 0..src.width() {
            let dx = f64::from(x) - cx;
            let dy = f64::from(y) - cy;
            let sx = cx + dx * ca + dy * sa;
            let sy = cy - dx * sa + dy * ca;

            let value = sample_bilinear(src, sx, sy);
            dest.data[(y * src.width() + x) as usize] =
                num::clamp((value + 0.5).floor(), 0.0, 255.0) as u8;
        }
    }
}

fn sample_bilinear(src: &ImageData, x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    // no pixel within reach, also NaN
    if !(x0 >= -1.0 && y0 >= -1.0 && x0 < f64::from(src.width()) && y0 < f64::from(src.height())) {
        return 0.0;
    }
    let wx = x - x0;
    let wy = y - y0;
    let (x0, y0) = (x0 as i32, y0 as i32);

    let at = |px: i32, py: i32| f64::from(src.get(px, py).unwrap_or(0));

    (1.0 - wy) * ((1.0 - wx) * at(x0, y0) + wx * at(x0 + 1, y0))
        + wy * ((1.0 - wx) * at(x0, y0 + 1) + wx * at(x0 + 1, y0 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32) -> Vec<u8> {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| (y * width + x) as u8))
            .collect()
    }

    #[test]
    fn test_resize_same_size_copies() {
        let data = ramp(4, 3);
        let src = ImageData::new(&data, 4, 3);
        let mut dest = ImageBuffer::default();
        resize_image(&src, &mut dest, 4, 3);
        assert_eq!(&data[..], dest.data());
    }

    #[test]
    fn test_resize_downscale_constant() {
        let data = vec![77u8; 16 * 16];
        let src = ImageData::new(&data, 16, 16);
        let mut dest = ImageBuffer::default();
        resize_image(&src, &mut dest, 5, 7);
        assert_eq!(5, dest.width());
        assert_eq!(7, dest.height());
        assert!(dest.data().iter().all(|&p| p == 77));
    }

    #[test]
    fn test_resize_single_pixel_source() {
        let data = vec![9u8];
        let src = ImageData::new(&data, 1, 1);
        let mut dest = ImageBuffer::default();
        resize_image(&src, &mut dest, 3, 2);
        assert!(dest.data().iter().all(|&p| p == 9));
    }

    #[test]
    fn test_crop_inside() {
        let data = ramp(4, 4);
        let src = ImageData::new(&data, 4, 4);
        let mut dest = ImageBuffer::default();
        let padded = crop_resize_image(&src, &mut dest, 1, 1, 2, 2, 2, 2);
        assert_eq!(0, padded);
        assert_eq!(&[5, 6, 9, 10], dest.data());
    }

    #[test]
    fn test_crop_pads_with_zeros() {
        let data = vec![1u8; 4];
        let src = ImageData::new(&data, 2, 2);
        let mut dest = ImageBuffer::default();
        let padded = crop_resize_image(&src, &mut dest, -1, -1, 3, 3, 3, 3);
        assert_eq!(5, padded);
        assert_eq!(&[0, 0, 0, 0, 1, 1, 0, 1, 1], dest.data());
    }

    #[test]
    fn test_crop_fully_outside() {
        let data = vec![1u8; 4];
        let src = ImageData::new(&data, 2, 2);
        let mut dest = ImageBuffer::default();
        let padded = crop_resize_image(&src, &mut dest, 5, 5, 2, 2, 2, 2);
        assert_eq!(4, padded);
        assert!(dest.data().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_crop_resize_matches_resize_of_crop() {
        let data = ramp(8, 8);
        let src = ImageData::new(&data, 8, 8);
        let mut cropped = ImageBuffer::default();
        crop_resize_image(&src, &mut cropped, 2, 1, 5, 6, 5, 6);

        let mut expected = ImageBuffer::default();
        resize_image(&cropped.as_image_data(), &mut expected, 3, 4);
        let mut dest = ImageBuffer::default();
        crop_resize_image(&src, &mut dest, 2, 1, 5, 6, 3, 4);
        assert_eq!(expected, dest);
    }

    #[test]
    fn test_crop_huge_window_does_not_allocate_it() {
        let data = vec![1u8; 4];
        let src = ImageData::new(&data, 2, 2);
        let mut dest = ImageBuffer::default();
        let (origin, size) = (-1_000_000_000, 2_000_000_000);
        let padded = crop_resize_image(&src, &mut dest, origin, origin, size, size, 4, 4);
        assert_eq!(4_000_000_000_000_000_000 - 4, padded);
        assert_eq!(16, dest.data().len());
    }

    #[test]
    fn test_mirror_x() {
        let mut buf = ImageBuffer::from_vec(vec![1, 2, 3, 4, 5, 6], 3, 2).unwrap();
        buf.mirror_x();
        assert_eq!(&[3, 2, 1, 6, 5, 4], buf.data());
    }

    #[test]
    fn test_rotate_by_zero_is_identity() {
        let data = ramp(5, 4);
        let src = ImageData::new(&data, 5, 4);
        let mut dest = ImageBuffer::default();
        rotate_image(&src, &mut dest, 0.0, 2.0, 1.5);
        assert_eq!(&data[..], dest.data());
    }

    #[test]
    fn test_rotate_quarter_turn_moves_pixel() {
        let mut data = vec![0u8; 25];
        // bright pixel one step right of the center
        data[2 * 5 + 3] = 200;
        let src = ImageData::new(&data, 5, 5);
        let mut dest = ImageBuffer::default();
        rotate_image(&src, &mut dest, std::f64::consts::FRAC_PI_2, 2.0, 2.0);
        // R(90deg) * (1, 0) = (0, 1): the pixel ends up one step below the center
        assert_eq!(200, dest.data()[3 * 5 + 2]);
        assert_eq!(0, dest.data()[2 * 5 + 3]);
    }

    #[test]
    fn test_rotate_about_a_far_center_is_empty() {
        let data = vec![100u8; 25];
        let src = ImageData::new(&data, 5, 5);
        let mut dest = ImageBuffer::default();
        rotate_image(&src, &mut dest, -std::f64::consts::FRAC_PI_4, 5e11, 7.0);
        assert!(dest.data().iter().all(|&v| v == 0));

        rotate_image(&src, &mut dest, f64::NAN, 2.0, 2.0);
        assert_eq!(25, dest.data().len());
        assert!(dest.data().iter().all(|&v| v == 0));
    }
}
